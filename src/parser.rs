//! JSON parser for cycle input files.
//!
//! A cycle input carries the routes' live trips, scheduled service and
//! service changes, plus travel-time tables to seed the store with.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::StopPair;
use crate::processor::RouteInput;
use crate::store::{StoreResult, TimeWindowedStore};

/// Travel time between two consecutive stops, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelTimeSeed {
    pub from: String,
    pub to: String,
    pub seconds: f64,
}

impl TravelTimeSeed {
    pub fn pair(&self) -> StopPair {
        StopPair::new(&self.from, &self.to)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleInput {
    #[serde(default)]
    pub routes: Vec<RouteInput>,
    #[serde(default)]
    pub scheduled_travel_times: Vec<TravelTimeSeed>,
    #[serde(default)]
    pub supplemented_travel_times: Vec<TravelTimeSeed>,
}

impl CycleInput {
    /// Writes the input's travel-time tables into `store`.
    pub async fn seed(&self, store: &dyn TimeWindowedStore) -> StoreResult<()> {
        for seed in &self.scheduled_travel_times {
            store.put_scheduled_travel_time(&seed.pair(), seed.seconds).await?;
        }
        for seed in &self.supplemented_travel_times {
            store
                .put_supplemented_scheduled_travel_time(&seed.pair(), seed.seconds)
                .await?;
        }
        Ok(())
    }
}

/// Decodes a JSON [`CycleInput`] from raw bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not a valid cycle input document.
pub fn parse_cycle_input(bytes: &[u8]) -> Result<CycleInput> {
    serde_json::from_slice(bytes).context("parsing cycle input")
}

/// Reads and decodes a cycle input file.
pub fn load_cycle_input(path: &str) -> Result<CycleInput> {
    let bytes = std::fs::read(path).with_context(|| format!("reading cycle input '{path}'"))?;
    parse_cycle_input(&bytes)
}
