//! Per-route status pipeline.
//!
//! One pass turns a route's live trips into a [`RouteStatusSnapshot`]:
//! routings are inferred, trips grouped onto them, travel times gathered in
//! one batched read, then headways, runtimes, statuses and summaries are
//! derived.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::analyzers::headway::{
    accumulated_extra_travel_time, max_delay, max_headway_discrepancy, overall_runtime_diff,
    process_group, routing_runtime, ProcessedGroup,
};
use crate::analyzers::service_change::service_change_summaries;
use crate::analyzers::status::{direction_status, route_status, DirectionSignals};
use crate::analyzers::summary::{service_summary, SummaryContext};
use crate::config::{EngineConfig, StopNames};
use crate::model::{
    Direction, RouteStatusSnapshot, Routing, ServiceChangeRecord, Status, StopPair,
    TripObservation,
};
use crate::routing::{common_routing, determine_routings, group_trips, routing_key};
use crate::store::snapshots::put_route_snapshot;
use crate::store::{with_timeout, TimeWindowedStore};
use crate::travel_time::{TravelTimeTable, VisitWindow};

/// Timetable facts for a route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduledService {
    /// Trips scheduled to run this cycle, per direction.
    #[serde(default)]
    pub trip_counts: BTreeMap<Direction, usize>,
    /// Timetable headways per direction and routing key.
    #[serde(default)]
    pub headways: BTreeMap<Direction, BTreeMap<String, Vec<i64>>>,
    /// Scheduled destination stops per direction.
    #[serde(default)]
    pub destinations: BTreeMap<Direction, Vec<String>>,
}

/// Everything a cycle knows about one route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteInput {
    pub route_id: String,
    #[serde(default)]
    pub trips: Vec<TripObservation>,
    #[serde(default)]
    pub scheduled: ScheduledService,
    #[serde(default)]
    pub service_changes: Vec<ServiceChangeRecord>,
}

/// Every consecutive stop pair of `routings`, once.
pub fn stop_pairs<'a>(routings: impl IntoIterator<Item = &'a Routing>) -> Vec<StopPair> {
    routings
        .into_iter()
        .flat_map(|r| StopPair::along(r))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Display destinations of a direction: the distinct last stops of its
/// routings, else its scheduled destinations, joined with `/`.
pub fn destination_names(
    routings: &[Routing],
    scheduled: &[String],
    names: &StopNames,
) -> Option<String> {
    let mut stops: Vec<&str> = Vec::new();
    for stop in routings.iter().filter_map(|r| r.last()) {
        if !stops.contains(&stop.as_str()) {
            stops.push(stop);
        }
    }
    if stops.is_empty() {
        for stop in scheduled {
            if !stops.contains(&stop.as_str()) {
                stops.push(stop);
            }
        }
    }

    let mut display: Vec<&str> = Vec::new();
    for name in stops.into_iter().map(|s| names.name(s)) {
        if !display.contains(&name) {
            display.push(name);
        }
    }
    (!display.is_empty()).then(|| display.join("/"))
}

fn non_empty(series: BTreeMap<String, Vec<i64>>) -> BTreeMap<String, Vec<i64>> {
    series.into_iter().filter(|(_, s)| !s.is_empty()).collect()
}

/// Builds a route's snapshot from its input and gathered travel times.
pub fn build_snapshot(
    input: &RouteInput,
    timestamp: i64,
    table: &TravelTimeTable,
    config: &EngineConfig,
    names: &StopNames,
) -> RouteStatusSnapshot {
    let routings = determine_routings(&input.trips);
    let no_routings = Vec::new();

    let mut snapshot = RouteStatusSnapshot {
        route_id: input.route_id.clone(),
        status: Status::NotScheduled,
        direction_statuses: BTreeMap::new(),
        service_summaries: BTreeMap::new(),
        service_change_summaries: BTreeMap::new(),
        destinations: BTreeMap::new(),
        max_delay: BTreeMap::new(),
        accumulated_extra_travel_time: BTreeMap::new(),
        overall_runtime_diff: BTreeMap::new(),
        max_headway_discrepancy: BTreeMap::new(),
        scheduled_headways: BTreeMap::new(),
        actual_routings: routings.clone(),
        common_routings: BTreeMap::new(),
        routing_runtimes: BTreeMap::new(),
        travel_times: table.estimates(),
        trips: BTreeMap::new(),
        timestamp,
    };

    for direction in Direction::ALL {
        let direction_routings = routings.get(&direction).unwrap_or(&no_routings);
        let trips: Vec<&TripObservation> = input
            .trips
            .iter()
            .filter(|t| t.direction == direction)
            .collect();
        let groups: Vec<ProcessedGroup> = group_trips(direction_routings, &trips)
            .iter()
            .map(|g| process_group(g, timestamp, table, config.delay_threshold_secs))
            .collect();

        let timetable = input.scheduled.headways.get(&direction);
        let actual_headways = non_empty(groups.iter().map(|g| (g.key.clone(), g.headways())).collect());
        let scheduled_headways = non_empty(
            groups
                .iter()
                .map(|g| {
                    let series = timetable
                        .and_then(|t| t.get(&g.key))
                        .cloned()
                        .unwrap_or_else(|| g.scheduled_pace_headways());
                    (g.key.clone(), series)
                })
                .collect(),
        );

        let delay = max_delay(&groups);
        let slowness =
            accumulated_extra_travel_time(direction_routings, table, config.slow_pair_threshold_secs);
        let discrepancy = max_headway_discrepancy(&actual_headways, &scheduled_headways);
        let signals = DirectionSignals {
            has_trips: !trips.is_empty(),
            has_scheduled_trips: input
                .scheduled
                .trip_counts
                .get(&direction)
                .is_some_and(|n| *n > 0),
            max_delay: delay,
            service_change: input
                .service_changes
                .iter()
                .any(|r| r.scope.covers(direction)),
            slowness,
            headway_discrepancy: Some(discrepancy),
        };
        let status = direction_status(&signals, config);

        let scheduled_destinations = input
            .scheduled
            .destinations
            .get(&direction)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let destination = destination_names(direction_routings, scheduled_destinations, names);

        let summary = service_summary(&SummaryContext {
            destination: destination.as_deref().unwrap_or(&input.route_id),
            groups: &groups,
            routings: direction_routings,
            table,
            scheduled_headways: &scheduled_headways,
            signals: &signals,
            names,
            config,
        });
        debug!(
            route_id = %input.route_id,
            direction = %direction,
            status = %status,
            trips = trips.len(),
            routings = direction_routings.len(),
            "Direction classified"
        );

        snapshot.direction_statuses.insert(direction, status);
        snapshot.service_summaries.insert(direction, summary);
        if let Some(destination) = destination {
            snapshot.destinations.insert(direction, destination);
        }
        snapshot.max_delay.insert(direction, delay.unwrap_or(0));
        snapshot
            .accumulated_extra_travel_time
            .insert(direction, slowness.unwrap_or(0));
        snapshot.overall_runtime_diff.insert(
            direction,
            overall_runtime_diff(direction_routings, table).unwrap_or(0),
        );
        snapshot.max_headway_discrepancy.insert(direction, discrepancy);
        snapshot.scheduled_headways.insert(direction, scheduled_headways);
        if let Some(common) = common_routing(direction_routings) {
            snapshot.common_routings.insert(direction, common);
        }
        if !direction_routings.is_empty() {
            snapshot.routing_runtimes.insert(
                direction,
                direction_routings
                    .iter()
                    .map(|r| (routing_key(r), routing_runtime(r, table)))
                    .collect(),
            );
        }
        if !groups.is_empty() {
            snapshot.trips.insert(
                direction,
                groups.into_iter().map(|g| (g.key, g.trips)).collect(),
            );
        }
    }

    snapshot.status = route_status(&snapshot.direction_statuses);
    snapshot.service_change_summaries = service_change_summaries(
        &input.route_id,
        &input.service_changes,
        &snapshot.destinations,
        names,
    );
    snapshot
}

/// Runs the pipeline for single routes against a store.
pub struct RouteProcessor<'a> {
    store: &'a dyn TimeWindowedStore,
    config: &'a EngineConfig,
    names: &'a StopNames,
}

impl<'a> RouteProcessor<'a> {
    pub fn new(store: &'a dyn TimeWindowedStore, config: &'a EngineConfig, names: &'a StopNames) -> Self {
        Self {
            store,
            config,
            names,
        }
    }

    /// Gathers the route's travel times and computes its snapshot. Nothing is
    /// written besides supplementary markers.
    #[tracing::instrument(skip_all, fields(route_id = %input.route_id))]
    pub async fn process(&self, input: &RouteInput, timestamp: i64) -> Result<RouteStatusSnapshot> {
        let routings = determine_routings(&input.trips);
        let pairs = stop_pairs(routings.values().flatten());
        let table = with_timeout(
            "gather travel times",
            self.config.store_timeout(),
            TravelTimeTable::gather(self.store, &pairs, timestamp, VisitWindow::from_config(self.config)),
        )
        .await
        .with_context(|| format!("gathering travel times for route {}", input.route_id))?;

        Ok(build_snapshot(input, timestamp, &table, self.config, self.names))
    }

    /// Computes and persists the route's snapshot with the configured TTL.
    pub async fn process_and_persist(
        &self,
        input: &RouteInput,
        timestamp: i64,
    ) -> Result<RouteStatusSnapshot> {
        let snapshot = self.process(input, timestamp).await?;
        with_timeout(
            "persist snapshot",
            self.config.store_timeout(),
            put_route_snapshot(self.store, &snapshot, self.config.snapshot_ttl()),
        )
        .await
        .with_context(|| format!("persisting snapshot for route {}", input.route_id))?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DirectionScope, ServiceChange};
    use crate::store::MemoryStore;
    use std::collections::HashMap;

    fn stops(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn trip(id: &str, direction: Direction, upcoming: &[&str], arrival: i64, delayed_time: i64) -> TripObservation {
        TripObservation {
            id: id.to_string(),
            route_id: "A".to_string(),
            direction,
            upcoming_stops: stops(upcoming),
            upcoming_stop_arrival_time: arrival,
            previous_stop: None,
            previous_stop_arrival_time: None,
            delayed_time,
            assigned: true,
            schedule_discrepancy: 0,
        }
    }

    fn input(trips: Vec<TripObservation>) -> RouteInput {
        RouteInput {
            route_id: "A".to_string(),
            trips,
            scheduled: ScheduledService {
                trip_counts: BTreeMap::from([(Direction::North, 4), (Direction::South, 4)]),
                ..Default::default()
            },
            service_changes: Vec::new(),
        }
    }

    fn table() -> TravelTimeTable {
        TravelTimeTable::new(
            HashMap::new(),
            HashMap::from([
                (StopPair::new("1", "2"), 120.0),
                (StopPair::new("2", "3"), 120.0),
                (StopPair::new("3", "4"), 120.0),
            ]),
            HashMap::new(),
        )
    }

    #[test]
    fn test_delay_wins_and_is_summarized() {
        let input = input(vec![
            trip("t1", Direction::North, &["2", "3", "4"], 1_060, 420),
            trip("t2", Direction::North, &["3", "4"], 1_030, 0),
        ]);
        let names = StopNames::from_pairs([("2", "Two"), ("4", "Four")]);
        let snapshot = build_snapshot(&input, 1_000, &table(), &EngineConfig::default(), &names);

        assert_eq!(snapshot.status, Status::Delay);
        assert_eq!(snapshot.direction_statuses[&Direction::North], Status::Delay);
        assert_eq!(snapshot.direction_statuses[&Direction::South], Status::NoService);
        assert_eq!(snapshot.destinations[&Direction::North], "Four");
        assert_eq!(snapshot.max_delay[&Direction::North], 420);
        assert_eq!(
            snapshot.service_summaries[&Direction::North].as_deref(),
            Some("Four-bound trains are delayed at Two (for 7 mins).")
        );
        assert_eq!(snapshot.service_summaries[&Direction::South], None);
    }

    #[test]
    fn test_service_change_in_both_directions() {
        let mut input = input(vec![
            trip("t1", Direction::North, &["1", "2", "3"], 1_060, 0),
            trip("t2", Direction::South, &["3", "2", "1"], 1_060, 0),
        ]);
        input.service_changes.push(ServiceChangeRecord {
            scope: DirectionScope::Both,
            change: ServiceChange::NoTrainService {
                affects_some_trains: false,
            },
        });
        let snapshot = build_snapshot(&input, 1_000, &table(), &EngineConfig::default(), &StopNames::default());

        assert_eq!(snapshot.direction_statuses[&Direction::North], Status::ServiceChange);
        assert_eq!(snapshot.direction_statuses[&Direction::South], Status::ServiceChange);
        assert_eq!(
            snapshot.service_change_summaries[&DirectionScope::Both],
            vec!["<A> trains are not running."]
        );
    }

    #[test]
    fn test_unscheduled_change_sets_status_without_narration() {
        let mut input = input(vec![trip("t1", Direction::North, &["1", "2", "3"], 1_060, 0)]);
        input.service_changes.push(ServiceChangeRecord {
            scope: DirectionScope::North,
            change: ServiceChange::NotScheduled,
        });
        let snapshot = build_snapshot(&input, 1_000, &table(), &EngineConfig::default(), &StopNames::default());

        assert_eq!(snapshot.direction_statuses[&Direction::North], Status::ServiceChange);
        assert_eq!(snapshot.status, Status::ServiceChange);
        assert!(snapshot.service_change_summaries.is_empty());
    }

    #[test]
    fn test_nothing_scheduled() {
        let mut input = input(Vec::new());
        input.scheduled.trip_counts.clear();
        let snapshot = build_snapshot(&input, 1_000, &table(), &EngineConfig::default(), &StopNames::default());
        assert_eq!(snapshot.status, Status::NotScheduled);
        assert!(snapshot.trips.is_empty());
    }

    #[test]
    fn test_destinations_fall_back_to_schedule() {
        let names = StopNames::from_pairs([("9", "Nine"), ("8", "Eight")]);
        assert_eq!(
            destination_names(&[], &stops(&["9", "8", "9"]), &names).as_deref(),
            Some("Nine/Eight")
        );
        assert_eq!(
            destination_names(&[stops(&["1", "9"])], &stops(&["8"]), &names).as_deref(),
            Some("Nine")
        );
        assert_eq!(destination_names(&[], &[], &names), None);
    }

    #[tokio::test]
    async fn test_runtime_matches_schedule_without_live_samples() {
        let store = MemoryStore::new();
        for (a, b) in [("1", "2"), ("2", "3"), ("3", "4")] {
            store.put_scheduled_travel_time(&StopPair::new(a, b), 150.0).await.unwrap();
        }
        let config = EngineConfig::default();
        let names = StopNames::default();
        let processor = RouteProcessor::new(&store, &config, &names);
        let input = input(vec![trip("t1", Direction::North, &["1", "2", "3", "4"], 1_060, 0)]);

        let snapshot = processor.process_and_persist(&input, 1_000).await.unwrap();

        let runtime = snapshot.routing_runtimes[&Direction::North]["1-4-4"];
        assert_eq!(runtime.actual, 450);
        assert_eq!(runtime.scheduled, 450);
        assert_eq!(snapshot.overall_runtime_diff[&Direction::North], 0);
        assert!(snapshot.travel_times.is_empty());
        assert!(
            store
                .supplementary_marker(&StopPair::new("1", "2"))
                .await
                .unwrap()
                .is_some()
        );
        assert!(store.status_snapshot("A").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_offline_store_fails_the_route() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let config = EngineConfig::default();
        let names = StopNames::default();
        let processor = RouteProcessor::new(&store, &config, &names);
        let input = input(vec![trip("t1", Direction::North, &["1", "2"], 1_060, 0)]);

        assert!(processor.process(&input, 1_000).await.is_err());
    }
}
