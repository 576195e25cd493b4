//! Typed access to persisted route snapshots.
//!
//! Readers never see a snapshot older than the staleness horizon; an expired,
//! missing or unreadable snapshot all read as "no fresh data".

use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

use super::{StoreResult, TimeWindowedStore};
use crate::model::{RouteStatusSnapshot, RouteStatusSummary};

/// Writes the detailed snapshot with `ttl` and its compact summary.
pub async fn put_route_snapshot(
    store: &dyn TimeWindowedStore,
    snapshot: &RouteStatusSnapshot,
    ttl: Duration,
) -> StoreResult<()> {
    let detailed = serde_json::to_vec(snapshot)?;
    let summary = serde_json::to_vec(&snapshot.summary())?;
    store
        .put_status_snapshot(&snapshot.route_id, detailed, ttl)
        .await?;
    store.put_status_summary(&snapshot.route_id, summary).await
}

fn decode_fresh(
    route_id: &str,
    bytes: Option<Vec<u8>>,
    now: i64,
    horizon_secs: i64,
) -> Option<RouteStatusSnapshot> {
    let bytes = bytes?;
    match serde_json::from_slice::<RouteStatusSnapshot>(&bytes) {
        Ok(snapshot) if snapshot.is_fresh(now, horizon_secs) => Some(snapshot),
        Ok(_) => None,
        Err(e) => {
            warn!(route_id, error = %e, "Discarding unreadable route snapshot");
            None
        }
    }
}

/// Returns the route's snapshot if one no older than `horizon_secs` exists.
pub async fn get_route_snapshot(
    store: &dyn TimeWindowedStore,
    route_id: &str,
    now: i64,
    horizon_secs: i64,
) -> StoreResult<Option<RouteStatusSnapshot>> {
    let bytes = store.status_snapshot(route_id).await?;
    Ok(decode_fresh(route_id, bytes, now, horizon_secs))
}

/// Status and timestamp of every route with fresh data.
pub async fn get_all_route_summaries(
    store: &dyn TimeWindowedStore,
    now: i64,
    horizon_secs: i64,
) -> StoreResult<BTreeMap<String, RouteStatusSummary>> {
    let summaries = store.status_summaries().await?;
    Ok(summaries
        .into_iter()
        .filter_map(|(route_id, bytes)| {
            let summary: RouteStatusSummary = match serde_json::from_slice(&bytes) {
                Ok(s) => s,
                Err(e) => {
                    warn!(route_id = %route_id, error = %e, "Discarding unreadable route summary");
                    return None;
                }
            };
            (summary.timestamp > now - horizon_secs).then_some((route_id, summary))
        })
        .collect())
}
