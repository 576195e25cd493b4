//! Travel-time estimation from recent stop visits.
//!
//! The estimate for a stop pair is the mean time vehicles seen at both stops
//! took between them. Pairs without such vehicles are marked in the store and
//! fall back to supplemented schedule, then schedule, then zero.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use crate::analyzers::utility::mean;
use crate::config::EngineConfig;
use crate::model::{StopPair, TripObservation};
use crate::store::{StopVisit, StoreResult, TimeWindowedStore, VisitQuery};

/// Visit windows around a reference time.
#[derive(Debug, Clone, Copy)]
pub struct VisitWindow {
    pub start_limit: i64,
    pub end_limit: i64,
    pub lookahead: i64,
}

impl VisitWindow {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            start_limit: config.runtime_start_limit_secs,
            end_limit: config.runtime_end_limit_secs,
            lookahead: config.lookahead_secs,
        }
    }

    fn departure_range(&self, reference: i64) -> (i64, i64) {
        (reference - self.start_limit, reference + self.lookahead)
    }

    fn arrival_range(&self, reference: i64) -> (i64, i64) {
        (reference - self.end_limit, reference + self.lookahead)
    }
}

/// Mean of arrival minus departure over vehicles seen at both stops.
pub fn mean_travel_time(departures: &[StopVisit], arrivals: &[StopVisit]) -> Option<f64> {
    let departed: HashMap<&str, i64> = departures
        .iter()
        .map(|v| (v.vehicle_id.as_str(), v.timestamp))
        .collect();

    let diffs: Vec<f64> = arrivals
        .iter()
        .filter_map(|v| {
            departed
                .get(v.vehicle_id.as_str())
                .map(|at_a| (v.timestamp - at_a) as f64)
        })
        .collect();

    mean(&diffs)
}

/// Average travel time for `pair` around `reference`.
///
/// Returns `None` after marking the pair supplementary when no vehicle was
/// seen at both stops; callers must then fall back to schedule.
pub async fn average_travel_time(
    store: &dyn TimeWindowedStore,
    pair: &StopPair,
    reference: i64,
    window: VisitWindow,
) -> StoreResult<Option<f64>> {
    let (a_start, a_end) = window.departure_range(reference);
    let (b_start, b_end) = window.arrival_range(reference);
    let at_a = store.query_stop_visits(&pair.from, a_start, a_end).await?;
    let at_b = store.query_stop_visits(&pair.to, b_start, b_end).await?;

    let estimate = mean_travel_time(&at_a, &at_b);
    if estimate.is_none() {
        store
            .mark_supplementary(std::slice::from_ref(pair), reference)
            .await?;
    }
    Ok(estimate)
}

/// Travel times for a set of stop pairs, gathered in one batched read.
#[derive(Debug, Clone, Default)]
pub struct TravelTimeTable {
    estimated: HashMap<StopPair, f64>,
    scheduled: HashMap<StopPair, f64>,
    supplemented: HashMap<StopPair, f64>,
}

impl TravelTimeTable {
    pub fn new(
        estimated: HashMap<StopPair, f64>,
        scheduled: HashMap<StopPair, f64>,
        supplemented: HashMap<StopPair, f64>,
    ) -> Self {
        Self {
            estimated,
            scheduled,
            supplemented,
        }
    }

    /// Reads visits for every stop in `pairs` with a single pipelined query,
    /// estimates each pair and fetches schedule times in batch. Pairs left
    /// without an estimate are marked supplementary at `reference`.
    #[tracing::instrument(skip(store, pairs), fields(pairs = pairs.len()))]
    pub async fn gather(
        store: &dyn TimeWindowedStore,
        pairs: &[StopPair],
        reference: i64,
        window: VisitWindow,
    ) -> StoreResult<Self> {
        let stops: Vec<&str> = pairs
            .iter()
            .flat_map(|p| [p.from.as_str(), p.to.as_str()])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let reach = window.start_limit.max(window.end_limit);
        let queries: Vec<VisitQuery> = stops
            .iter()
            .map(|stop| VisitQuery {
                stop_id: stop.to_string(),
                start: reference - reach,
                end: reference + window.lookahead,
            })
            .collect();
        let visits: HashMap<&str, Vec<StopVisit>> = stops
            .iter()
            .copied()
            .zip(store.query_stop_visits_batch(&queries).await?)
            .collect();

        let (a_start, a_end) = window.departure_range(reference);
        let (b_start, b_end) = window.arrival_range(reference);
        let in_range = |visits: Option<&Vec<StopVisit>>, start: i64, end: i64| -> Vec<StopVisit> {
            visits
                .into_iter()
                .flatten()
                .filter(|v| v.timestamp >= start && v.timestamp <= end)
                .cloned()
                .collect()
        };

        let mut estimated = HashMap::new();
        let mut missing = Vec::new();
        for pair in pairs {
            let at_a = in_range(visits.get(pair.from.as_str()), a_start, a_end);
            let at_b = in_range(visits.get(pair.to.as_str()), b_start, b_end);
            match mean_travel_time(&at_a, &at_b) {
                Some(t) => {
                    estimated.insert(pair.clone(), t);
                }
                None => missing.push(pair.clone()),
            }
        }

        if !missing.is_empty() {
            store.mark_supplementary(&missing, reference).await?;
        }
        debug!(
            estimated = estimated.len(),
            supplementary = missing.len(),
            "Travel times gathered"
        );

        Ok(Self {
            estimated,
            scheduled: store.scheduled_travel_times(pairs).await?,
            supplemented: store.supplemented_scheduled_travel_times(pairs).await?,
        })
    }

    pub fn estimated(&self, pair: &StopPair) -> Option<f64> {
        self.estimated.get(pair).copied()
    }

    /// Timetable time, else the supplemented one, else zero for schedule gaps.
    pub fn scheduled(&self, pair: &StopPair) -> f64 {
        self.scheduled
            .get(pair)
            .or_else(|| self.supplemented.get(pair))
            .copied()
            .unwrap_or(0.0)
    }

    /// Supplemented time, else the timetable one, else zero.
    pub fn supplemented(&self, pair: &StopPair) -> f64 {
        self.supplemented
            .get(pair)
            .or_else(|| self.scheduled.get(pair))
            .copied()
            .unwrap_or(0.0)
    }

    /// Observed estimate, falling back to supplemented then scheduled time.
    pub fn actual(&self, pair: &StopPair) -> f64 {
        self.estimated(pair).unwrap_or_else(|| self.supplemented(pair))
    }

    pub fn actual_along(&self, stops: &[String]) -> f64 {
        StopPair::along(stops).map(|p| self.actual(&p)).sum()
    }

    pub fn scheduled_along(&self, stops: &[String]) -> f64 {
        StopPair::along(stops).map(|p| self.scheduled(&p)).sum()
    }

    /// Rounded estimates for display, keyed `<from>-<to>`.
    pub fn estimates(&self) -> BTreeMap<String, i64> {
        self.estimated
            .iter()
            .map(|(pair, t)| (pair.to_string(), t.round() as i64))
            .collect()
    }
}

/// Pace used when projecting trips along a routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    Scheduled,
    Observed,
}

impl Pace {
    pub fn between(self, table: &TravelTimeTable, pair: &StopPair) -> f64 {
        match self {
            Pace::Scheduled => table.supplemented(pair),
            Pace::Observed => table.actual(pair),
        }
    }
}

/// Seconds until `trip` reaches its upcoming stop.
///
/// At observed pace the feed's prediction is rescaled by how the recent
/// travel time into that stop compares to its scheduled time.
pub fn time_until_upcoming_stop(
    trip: &TripObservation,
    timestamp: i64,
    routing: &[String],
    table: &TravelTimeTable,
    pace: Pace,
) -> f64 {
    let predicted = trip.time_until_upcoming_stop(timestamp);
    if pace == Pace::Scheduled {
        return predicted;
    }

    let Some(next_stop) = trip.upcoming_stop() else {
        return predicted;
    };
    let i = match routing.iter().position(|s| s == next_stop) {
        Some(i) if i > 0 => i,
        _ => return predicted,
    };

    let pair = StopPair::new(&routing[i - 1], next_stop);
    let scheduled_between = table.supplemented(&pair);
    let actual_between = table.actual(&pair);
    if scheduled_between > 0.0 && actual_between > 0.0 {
        predicted / scheduled_between * actual_between
    } else {
        predicted
    }
}
