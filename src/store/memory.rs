use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use super::{StopVisit, StoreError, StoreResult, TimeWindowedStore, VisitQuery};
use crate::model::StopPair;

/// Visits older than this, relative to the newest visit, are evicted.
pub const DEFAULT_VISIT_RETENTION_SECS: i64 = 41 * 60;

/// Seconds the newest visit must advance before another eviction sweep.
const EVICTION_STEP_SECS: i64 = 60;

#[derive(Default)]
struct Inner {
    /// stop id -> vehicle id -> visit time
    visits: HashMap<String, HashMap<String, i64>>,
    latest_visit: i64,
    last_eviction: i64,
    scheduled: HashMap<StopPair, f64>,
    supplemented: HashMap<StopPair, f64>,
    supplementary: HashMap<StopPair, i64>,
    snapshots: HashMap<String, (Vec<u8>, Instant)>,
    summaries: HashMap<String, Vec<u8>>,
    ledger: Option<Vec<u8>>,
}

/// In-process [`TimeWindowedStore`].
///
/// Used by the CLI runner and as the substitute store in tests. It can be
/// switched offline to exercise the degraded paths. Stop visits are kept
/// for a retention window behind the newest recorded visit.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    offline: AtomicBool,
    ledger_writes_failing: AtomicBool,
    visit_retention_secs: i64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_visit_retention(DEFAULT_VISIT_RETENTION_SECS)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_visit_retention(visit_retention_secs: i64) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            offline: AtomicBool::new(false),
            ledger_writes_failing: AtomicBool::new(false),
            visit_retention_secs,
        }
    }

    /// While offline every call fails with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// While set, only delay ledger writes fail.
    pub fn set_ledger_writes_failing(&self, failing: bool) {
        self.ledger_writes_failing.store(failing, Ordering::SeqCst);
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Inner {
    fn evict_visits(&mut self, retention_secs: i64) {
        if self.latest_visit - self.last_eviction < EVICTION_STEP_SECS {
            return;
        }
        let cutoff = self.latest_visit - retention_secs;
        for by_vehicle in self.visits.values_mut() {
            by_vehicle.retain(|_, ts| *ts >= cutoff);
        }
        self.visits.retain(|_, by_vehicle| !by_vehicle.is_empty());
        self.last_eviction = self.latest_visit;
    }
}

fn lookup(table: &HashMap<StopPair, f64>, pairs: &[StopPair]) -> HashMap<StopPair, f64> {
    pairs
        .iter()
        .filter_map(|p| table.get(p).map(|t| (p.clone(), *t)))
        .collect()
}

#[async_trait]
impl TimeWindowedStore for MemoryStore {
    async fn record_stop_visit(
        &self,
        stop_id: &str,
        vehicle_id: &str,
        timestamp: i64,
    ) -> StoreResult<()> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        inner
            .visits
            .entry(stop_id.to_string())
            .or_default()
            .insert(vehicle_id.to_string(), timestamp);
        inner.latest_visit = inner.latest_visit.max(timestamp);
        inner.evict_visits(self.visit_retention_secs);
        Ok(())
    }

    async fn query_stop_visits(
        &self,
        stop_id: &str,
        start: i64,
        end: i64,
    ) -> StoreResult<Vec<StopVisit>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        let mut visits: Vec<StopVisit> = inner
            .visits
            .get(stop_id)
            .into_iter()
            .flat_map(|by_vehicle| by_vehicle.iter())
            .filter(|(_, ts)| **ts >= start && **ts <= end)
            .map(|(vehicle_id, ts)| StopVisit {
                vehicle_id: vehicle_id.clone(),
                timestamp: *ts,
            })
            .collect();
        visits.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.vehicle_id.cmp(&b.vehicle_id))
        });
        Ok(visits)
    }

    async fn query_stop_visits_batch(
        &self,
        queries: &[VisitQuery],
    ) -> StoreResult<Vec<Vec<StopVisit>>> {
        self.check_online()?;
        let mut results = Vec::with_capacity(queries.len());
        for q in queries {
            results.push(self.query_stop_visits(&q.stop_id, q.start, q.end).await?);
        }
        debug!(queries = queries.len(), "Batched stop visit read");
        Ok(results)
    }

    async fn scheduled_travel_times(
        &self,
        pairs: &[StopPair],
    ) -> StoreResult<HashMap<StopPair, f64>> {
        self.check_online()?;
        Ok(lookup(&self.inner.read().await.scheduled, pairs))
    }

    async fn supplemented_scheduled_travel_times(
        &self,
        pairs: &[StopPair],
    ) -> StoreResult<HashMap<StopPair, f64>> {
        self.check_online()?;
        Ok(lookup(&self.inner.read().await.supplemented, pairs))
    }

    async fn put_scheduled_travel_time(&self, pair: &StopPair, seconds: f64) -> StoreResult<()> {
        self.check_online()?;
        self.inner
            .write()
            .await
            .scheduled
            .insert(pair.clone(), seconds);
        Ok(())
    }

    async fn put_supplemented_scheduled_travel_time(
        &self,
        pair: &StopPair,
        seconds: f64,
    ) -> StoreResult<()> {
        self.check_online()?;
        self.inner
            .write()
            .await
            .supplemented
            .insert(pair.clone(), seconds);
        Ok(())
    }

    async fn mark_supplementary(&self, pairs: &[StopPair], timestamp: i64) -> StoreResult<()> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        for pair in pairs {
            inner.supplementary.insert(pair.clone(), timestamp);
        }
        Ok(())
    }

    async fn supplementary_marker(&self, pair: &StopPair) -> StoreResult<Option<i64>> {
        self.check_online()?;
        Ok(self.inner.read().await.supplementary.get(pair).copied())
    }

    async fn status_snapshot(&self, route_id: &str) -> StoreResult<Option<Vec<u8>>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        Ok(inner
            .snapshots
            .get(route_id)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(bytes, _)| bytes.clone()))
    }

    async fn put_status_snapshot(
        &self,
        route_id: &str,
        snapshot: Vec<u8>,
        ttl: Duration,
    ) -> StoreResult<()> {
        self.check_online()?;
        self.inner
            .write()
            .await
            .snapshots
            .insert(route_id.to_string(), (snapshot, Instant::now() + ttl));
        Ok(())
    }

    async fn put_status_summary(&self, route_id: &str, summary: Vec<u8>) -> StoreResult<()> {
        self.check_online()?;
        self.inner
            .write()
            .await
            .summaries
            .insert(route_id.to_string(), summary);
        Ok(())
    }

    async fn status_summaries(&self) -> StoreResult<HashMap<String, Vec<u8>>> {
        self.check_online()?;
        Ok(self.inner.read().await.summaries.clone())
    }

    async fn prior_delay_ledger(&self) -> StoreResult<Option<Vec<u8>>> {
        self.check_online()?;
        Ok(self.inner.read().await.ledger.clone())
    }

    async fn put_delay_ledger(&self, ledger: Vec<u8>) -> StoreResult<()> {
        self.check_online()?;
        if self.ledger_writes_failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("delay ledger write rejected".to_string()));
        }
        self.inner.write().await.ledger = Some(ledger);
        Ok(())
    }
}
