//! Time-windowed store seam.
//!
//! [`TimeWindowedStore`] is the async trait the engine reads observations,
//! schedule data and persisted state through. [`MemoryStore`] implements it in
//! process; a networked backend plugs in behind the same trait.

mod memory;
pub mod snapshots;

pub use memory::MemoryStore;

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use crate::model::StopPair;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store operation '{operation}' timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store payload could not be encoded or decoded: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A vehicle's visit of a stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopVisit {
    pub vehicle_id: String,
    pub timestamp: i64,
}

/// A request for the visits of one stop within an inclusive time range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitQuery {
    pub stop_id: String,
    pub start: i64,
    pub end: i64,
}

#[async_trait]
pub trait TimeWindowedStore: Send + Sync {
    /// Records that `vehicle_id` visited `stop_id`. A later visit by the same
    /// vehicle replaces the earlier one.
    async fn record_stop_visit(
        &self,
        stop_id: &str,
        vehicle_id: &str,
        timestamp: i64,
    ) -> StoreResult<()>;

    async fn query_stop_visits(
        &self,
        stop_id: &str,
        start: i64,
        end: i64,
    ) -> StoreResult<Vec<StopVisit>>;

    /// Pipelined variant of [`query_stop_visits`](Self::query_stop_visits).
    /// Results come back in query order, all at once.
    async fn query_stop_visits_batch(
        &self,
        queries: &[VisitQuery],
    ) -> StoreResult<Vec<Vec<StopVisit>>> {
        let mut results = Vec::with_capacity(queries.len());
        for q in queries {
            results.push(self.query_stop_visits(&q.stop_id, q.start, q.end).await?);
        }
        Ok(results)
    }

    async fn scheduled_travel_times(
        &self,
        pairs: &[StopPair],
    ) -> StoreResult<HashMap<StopPair, f64>>;

    async fn supplemented_scheduled_travel_times(
        &self,
        pairs: &[StopPair],
    ) -> StoreResult<HashMap<StopPair, f64>>;

    async fn scheduled_travel_time(&self, pair: &StopPair) -> StoreResult<Option<f64>> {
        let mut times = self.scheduled_travel_times(std::slice::from_ref(pair)).await?;
        Ok(times.remove(pair))
    }

    async fn supplemented_scheduled_travel_time(
        &self,
        pair: &StopPair,
    ) -> StoreResult<Option<f64>> {
        let mut times = self
            .supplemented_scheduled_travel_times(std::slice::from_ref(pair))
            .await?;
        Ok(times.remove(pair))
    }

    async fn put_scheduled_travel_time(&self, pair: &StopPair, seconds: f64) -> StoreResult<()>;

    async fn put_supplemented_scheduled_travel_time(
        &self,
        pair: &StopPair,
        seconds: f64,
    ) -> StoreResult<()>;

    /// Marks pairs that had no fresh observations at `timestamp`, telling
    /// readers to fall back to schedule.
    async fn mark_supplementary(&self, pairs: &[StopPair], timestamp: i64) -> StoreResult<()>;

    async fn supplementary_marker(&self, pair: &StopPair) -> StoreResult<Option<i64>>;

    async fn status_snapshot(&self, route_id: &str) -> StoreResult<Option<Vec<u8>>>;

    async fn put_status_snapshot(
        &self,
        route_id: &str,
        snapshot: Vec<u8>,
        ttl: Duration,
    ) -> StoreResult<()>;

    async fn put_status_summary(&self, route_id: &str, summary: Vec<u8>) -> StoreResult<()>;

    async fn status_summaries(&self) -> StoreResult<HashMap<String, Vec<u8>>>;

    async fn prior_delay_ledger(&self) -> StoreResult<Option<Vec<u8>>>;

    async fn put_delay_ledger(&self, ledger: Vec<u8>) -> StoreResult<()>;
}

/// Bounds a store call by `timeout`, turning an elapsed deadline into
/// [`StoreError::Timeout`].
pub async fn with_timeout<T, F>(operation: &'static str, timeout: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout { operation, timeout }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_reports_operation() {
        let result: StoreResult<()> = with_timeout("slow_read", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;

        match result {
            Err(StoreError::Timeout { operation, .. }) => assert_eq!(operation, "slow_read"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_with_timeout_passes_through_result() {
        let result = with_timeout("fast_read", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
