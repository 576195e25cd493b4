//! Recomputation cycles.
//!
//! A cycle records trip progress, computes every route's snapshot on a
//! bounded worker pool and then runs the delay ledger once. Ledger updates
//! are serialized: a cycle waits for the previous cycle's ledger write before
//! reading the ledger itself.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn, Instrument};

use crate::config::{EngineConfig, StopNames};
use crate::ledger::{announce, observations_from_snapshot, reconcile, AnnouncementSink, DelayLedger};
use crate::model::RouteStatusSnapshot;
use crate::processor::{RouteInput, RouteProcessor};
use crate::stats::CycleStats;
use crate::store::{with_timeout, StoreResult, TimeWindowedStore};

/// Result of one cycle.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    /// Snapshots of the routes computed and persisted this cycle.
    pub snapshots: BTreeMap<String, RouteStatusSnapshot>,
    pub stats: CycleStats,
}

pub struct CycleRunner {
    store: Arc<dyn TimeWindowedStore>,
    config: Arc<EngineConfig>,
    names: Arc<StopNames>,
    sink: Arc<dyn AnnouncementSink>,
    ledger_lock: Mutex<()>,
}

impl CycleRunner {
    pub fn new(
        store: Arc<dyn TimeWindowedStore>,
        config: Arc<EngineConfig>,
        names: Arc<StopNames>,
        sink: Arc<dyn AnnouncementSink>,
    ) -> Self {
        Self {
            store,
            config,
            names,
            sink,
            ledger_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &dyn TimeWindowedStore {
        self.store.as_ref()
    }

    /// Records every trip's visit to its previous stop, feeding the travel
    /// time estimator. Returns the number of visits written.
    pub async fn record_progress(&self, routes: &[RouteInput]) -> StoreResult<usize> {
        let mut recorded = 0;
        for trip in routes.iter().flat_map(|r| &r.trips) {
            if let (Some(stop), Some(at)) = (&trip.previous_stop, trip.previous_stop_arrival_time) {
                with_timeout(
                    "record stop visit",
                    self.config.store_timeout(),
                    self.store.record_stop_visit(stop, &trip.id, at),
                )
                .await?;
                recorded += 1;
            }
        }
        Ok(recorded)
    }

    /// Runs one full cycle at `now`. Routes whose store access fails are
    /// logged and skipped; their previous snapshot simply ages out.
    #[tracing::instrument(skip_all, fields(routes = routes.len(), now = %now))]
    pub async fn run_cycle(&self, routes: &[RouteInput], now: DateTime<Utc>) -> CycleOutcome {
        let timestamp = now.timestamp();
        let mut stats = CycleStats::new(now);
        stats.routes = routes.len();
        stats.trips = routes.iter().map(|r| r.trips.len()).sum();

        match self.record_progress(routes).await {
            Ok(n) => stats.stop_visits_recorded = n,
            Err(e) => warn!(error = %e, "Recording trip progress failed"),
        }

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = Vec::with_capacity(routes.len());

        for input in routes {
            let sem = semaphore.clone();
            let store = self.store.clone();
            let config = self.config.clone();
            let names = self.names.clone();
            let input = input.clone();
            let route_id = input.route_id.clone();
            let route_span = tracing::info_span!("process_route", route_id = %route_id);

            let task = tokio::spawn(
                async move {
                    let _permit = sem.acquire().await.context("worker pool closed")?;
                    RouteProcessor::new(store.as_ref(), &config, &names)
                        .process_and_persist(&input, timestamp)
                        .await
                }
                .instrument(route_span),
            );
            tasks.push((route_id, task));
        }

        let mut snapshots = BTreeMap::new();
        for (route_id, task) in tasks {
            match task.await {
                Ok(Ok(snapshot)) => {
                    debug!(route_id = %route_id, status = %snapshot.status, "Route processed");
                    stats.routes_processed += 1;
                    stats.count_status(snapshot.status);
                    snapshots.insert(route_id, snapshot);
                }
                Ok(Err(e)) => {
                    warn!(route_id = %route_id, error = %format!("{e:#}"), "Route skipped this cycle");
                    stats.routes_failed += 1;
                }
                Err(e) => {
                    warn!(route_id = %route_id, error = %e, "Route task aborted");
                    stats.routes_failed += 1;
                }
            }
        }

        match self.update_ledger(&snapshots, now).await {
            Ok(records) => stats.delay_records = records,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Delay ledger update abandoned");
                stats = stats.with_error("ledger_error", &format!("{e:#}"));
            }
        }

        info!(
            processed = stats.routes_processed,
            failed = stats.routes_failed,
            delay_records = stats.delay_records,
            "Cycle complete"
        );
        CycleOutcome { snapshots, stats }
    }

    /// Reconciles the persisted ledger with this cycle's snapshots, announces
    /// and writes it back. Returns the number of records kept.
    ///
    /// Events are delivered before the ledger is written, so delivery is
    /// at-least-once: if the write fails, the next cycle starts from the
    /// previous ledger and announces the same events again.
    #[tracing::instrument(skip_all, fields(routes = snapshots.len()))]
    pub async fn update_ledger(
        &self,
        snapshots: &BTreeMap<String, RouteStatusSnapshot>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let _guard = self.ledger_lock.lock().await;
        let timeout = self.config.store_timeout();
        let notification = &self.config.notification;

        let prior = with_timeout("read delay ledger", timeout, self.store.prior_delay_ledger())
            .await
            .context("reading prior delay ledger")?;
        let ledger = DelayLedger::decode(prior.as_deref());

        let observations: Vec<_> = snapshots
            .values()
            .flat_map(|s| observations_from_snapshot(s, notification))
            .collect();
        debug!(
            prior = ledger.len(),
            observations = observations.len(),
            "Reconciling delay ledger"
        );

        let cycle = reconcile(ledger, &observations, now, notification);
        let next = announce(cycle, self.sink.as_ref(), now, notification).await;

        let bytes = next.encode().context("encoding delay ledger")?;
        with_timeout("write delay ledger", timeout, self.store.put_delay_ledger(bytes))
            .await
            .context("writing delay ledger")?;
        Ok(next.len())
    }
}
