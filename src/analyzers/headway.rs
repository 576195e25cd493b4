//! Headway, runtime and delay aggregation over routing groups.

use std::collections::BTreeMap;

use crate::analyzers::utility::round_secs;
use crate::model::{ProcessedTrip, Routing, RoutingRuntime, StopPair, TripObservation};
use crate::routing::{RoutingGroup, BLENDED};
use crate::travel_time::{time_until_upcoming_stop, Pace, TravelTimeTable};

/// A routing group whose trips carry their computed metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedGroup {
    pub key: String,
    pub routing: Routing,
    pub trips: Vec<ProcessedTrip>,
}

impl ProcessedGroup {
    /// Gaps to the train ahead at observed pace.
    pub fn headways(&self) -> Vec<i64> {
        self.trips
            .iter()
            .filter_map(|t| t.estimated_time_behind_next_train)
            .collect()
    }

    /// Gaps to the train ahead at scheduled pace.
    pub fn scheduled_pace_headways(&self) -> Vec<i64> {
        self.trips
            .iter()
            .filter_map(|t| t.time_behind_next_train)
            .collect()
    }

    pub fn max_headway(&self) -> Option<i64> {
        self.headways().into_iter().max()
    }

    pub fn max_delay(&self) -> Option<i64> {
        self.trips.iter().map(|t| t.delayed_time).max()
    }
}

/// Seconds `trailing` runs behind `leading` on `routing`: the leading trip's
/// time to its next stop, plus the travel time for the trailing trip to reach
/// that stop, minus the trailing trip's time to its own next stop.
pub fn time_between_trips(
    leading: &TripObservation,
    trailing: &TripObservation,
    timestamp: i64,
    routing: &[String],
    table: &TravelTimeTable,
    pace: Pace,
) -> Option<f64> {
    let lead_stop = leading.upcoming_stop()?;
    let trail_stop = trailing.upcoming_stop()?;
    let from = routing.iter().position(|s| s == trail_stop)?;
    let to = routing.iter().position(|s| s == lead_stop)?;
    if to < from {
        return None;
    }

    let catch_up: f64 = StopPair::along(&routing[from..=to])
        .map(|p| pace.between(table, &p))
        .sum();

    Some(
        time_until_upcoming_stop(leading, timestamp, routing, table, pace) + catch_up
            - time_until_upcoming_stop(trailing, timestamp, routing, table, pace),
    )
}

/// Computes per-trip metrics for a group whose trips are ordered trailing
/// first.
pub fn process_group(
    group: &RoutingGroup<'_>,
    timestamp: i64,
    table: &TravelTimeTable,
    delay_threshold_secs: i64,
) -> ProcessedGroup {
    let routing = &group.routing;
    let trips = group
        .trips
        .iter()
        .enumerate()
        .map(|(i, trip)| {
            let ahead = group.trips.get(i + 1).copied();
            let behind_at = |pace: Pace| {
                ahead
                    .and_then(|a| time_between_trips(a, trip, timestamp, routing, table, pace))
                    .map(round_secs)
            };
            let until_next =
                time_until_upcoming_stop(trip, timestamp, routing, table, Pace::Observed);

            ProcessedTrip {
                id: trip.id.clone(),
                previous_stop: trip.previous_stop.clone(),
                previous_stop_arrival_time: trip.previous_stop_arrival_time,
                upcoming_stop: trip.upcoming_stop().unwrap_or_default().to_string(),
                upcoming_stop_arrival_time: trip.upcoming_stop_arrival_time,
                estimated_upcoming_stop_arrival_time: timestamp + round_secs(until_next),
                destination: trip.destination().unwrap_or_default().to_string(),
                time_behind_next_train: behind_at(Pace::Scheduled),
                estimated_time_behind_next_train: behind_at(Pace::Observed),
                delayed_time: trip.delayed_time,
                delayed: trip.delayed_time >= delay_threshold_secs,
            }
        })
        .collect();

    ProcessedGroup {
        key: group.key.clone(),
        routing: routing.clone(),
        trips,
    }
}

/// Highest delayed time of any trip in the direction.
pub fn max_delay(groups: &[ProcessedGroup]) -> Option<i64> {
    groups.iter().filter_map(ProcessedGroup::max_delay).max()
}

pub fn routing_runtime(routing: &[String], table: &TravelTimeTable) -> RoutingRuntime {
    RoutingRuntime {
        actual: round_secs(table.actual_along(routing)),
        scheduled: round_secs(table.scheduled_along(routing)),
    }
}

/// Largest runtime excess over schedule among the direction's routings.
pub fn overall_runtime_diff(routings: &[Routing], table: &TravelTimeTable) -> Option<i64> {
    routings
        .iter()
        .map(|r| table.actual_along(r) - table.scheduled_along(r))
        .max_by(f64::total_cmp)
        .map(round_secs)
}

/// Pairs along `routing` running at least `pair_threshold` seconds over
/// schedule, with their excess.
pub fn slow_pairs(
    routing: &[String],
    table: &TravelTimeTable,
    pair_threshold: f64,
) -> Vec<(StopPair, f64)> {
    StopPair::along(routing)
        .map(|p| {
            let diff = table.actual(&p) - table.scheduled(&p);
            (p, diff)
        })
        .filter(|(_, diff)| *diff >= pair_threshold)
        .collect()
}

/// Largest sum of per-pair excesses among the direction's routings, counting
/// only pairs at or above `pair_threshold` so diffuse noise is ignored.
pub fn accumulated_extra_travel_time(
    routings: &[Routing],
    table: &TravelTimeTable,
    pair_threshold: f64,
) -> Option<i64> {
    routings
        .iter()
        .map(|r| {
            slow_pairs(r, table, pair_threshold)
                .iter()
                .map(|(_, diff)| diff)
                .sum::<f64>()
        })
        .max_by(f64::total_cmp)
        .map(round_secs)
}

/// Picks the headway series representing a direction: the blended series
/// when there are several, otherwise the one with the most samples.
pub fn determine_headway_to_use(headways: &BTreeMap<String, Vec<i64>>) -> Option<&Vec<i64>> {
    if headways.len() <= 1 {
        return headways.values().next();
    }
    if let Some(blended) = headways.get(BLENDED) {
        return Some(blended);
    }
    let mut best: Option<&Vec<i64>> = None;
    for series in headways.values() {
        if best.is_none_or(|b| series.len() > b.len()) {
            best = Some(series);
        }
    }
    best
}

/// Actual minus scheduled max headway, floored at zero. Zero when either
/// side has no data.
pub fn max_headway_discrepancy(
    actual: &BTreeMap<String, Vec<i64>>,
    scheduled: &BTreeMap<String, Vec<i64>>,
) -> i64 {
    let actual_max = determine_headway_to_use(actual).and_then(|h| h.iter().max().copied());
    let scheduled_max = determine_headway_to_use(scheduled).and_then(|h| h.iter().max().copied());
    match (actual_max, scheduled_max) {
        (Some(a), Some(s)) => (a - s).max(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Direction;
    use std::collections::HashMap;

    fn stops(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn trip(id: &str, upcoming: &[&str], arrival: i64, delayed_time: i64) -> TripObservation {
        TripObservation {
            id: id.to_string(),
            route_id: "A".to_string(),
            direction: Direction::North,
            upcoming_stops: stops(upcoming),
            upcoming_stop_arrival_time: arrival,
            previous_stop: None,
            previous_stop_arrival_time: None,
            delayed_time,
            assigned: true,
            schedule_discrepancy: 0,
        }
    }

    fn scheduled_table(times: &[(&str, &str, f64)]) -> TravelTimeTable {
        TravelTimeTable::new(
            HashMap::new(),
            times
                .iter()
                .map(|(a, b, t)| (StopPair::new(*a, *b), *t))
                .collect(),
            HashMap::new(),
        )
    }

    #[test]
    fn test_time_between_trips_adds_catch_up_time() {
        let routing = stops(&["A", "B", "C", "D"]);
        let table = scheduled_table(&[("A", "B", 120.0), ("B", "C", 120.0), ("C", "D", 120.0)]);
        let leading = trip("lead", &["C", "D"], 1_030, 0);
        let trailing = trip("trail", &["A", "B", "C", "D"], 1_060, 0);

        // 30s to C, plus A->B->C 240s, minus 60s to A
        let gap = time_between_trips(&leading, &trailing, 1_000, &routing, &table, Pace::Scheduled);
        assert_eq!(gap, Some(210.0));
        assert_eq!(
            time_between_trips(&trailing, &leading, 1_000, &routing, &table, Pace::Scheduled),
            None
        );
    }

    #[test]
    fn test_process_group_sets_gap_to_train_ahead() {
        let routing = stops(&["A", "B", "C", "D"]);
        let table = scheduled_table(&[("A", "B", 120.0), ("B", "C", 120.0), ("C", "D", 120.0)]);
        let leading = trip("lead", &["C", "D"], 1_030, 0);
        let trailing = trip("trail", &["A", "B", "C", "D"], 1_060, 400);
        let group = RoutingGroup {
            key: "A-D-4".into(),
            routing: routing.clone(),
            trips: vec![&trailing, &leading],
        };

        let processed = process_group(&group, 1_000, &table, 300);
        assert_eq!(processed.trips[0].id, "trail");
        assert_eq!(processed.trips[0].time_behind_next_train, Some(210));
        assert_eq!(processed.trips[0].estimated_time_behind_next_train, Some(210));
        assert!(processed.trips[0].delayed);
        assert_eq!(processed.trips[1].time_behind_next_train, None);
        assert!(!processed.trips[1].delayed);
        assert_eq!(processed.max_headway(), Some(210));
        assert_eq!(processed.max_delay(), Some(400));
    }

    #[test]
    fn test_runtime_diff_is_zero_without_live_samples() {
        let routing = stops(&["A", "B", "C"]);
        let table = scheduled_table(&[("A", "B", 100.0), ("B", "C", 140.0)]);
        let runtime = routing_runtime(&routing, &table);
        assert_eq!(runtime, RoutingRuntime { actual: 240, scheduled: 240 });
        assert_eq!(overall_runtime_diff(&[routing], &table), Some(0));
    }

    #[test]
    fn test_accumulated_extra_time_ignores_small_diffs() {
        let routing = stops(&["A", "B", "C", "D"]);
        let table = TravelTimeTable::new(
            HashMap::from([
                (StopPair::new("A", "B"), 159.0),
                (StopPair::new("B", "C"), 300.0),
                (StopPair::new("C", "D"), 100.0),
            ]),
            HashMap::from([
                (StopPair::new("A", "B"), 100.0),
                (StopPair::new("B", "C"), 100.0),
                (StopPair::new("C", "D"), 100.0),
            ]),
            HashMap::new(),
        );

        assert_eq!(accumulated_extra_travel_time(&[routing.clone()], &table, 60.0), Some(200));
        assert_eq!(overall_runtime_diff(&[routing], &table), Some(259));
    }

    #[test]
    fn test_headway_series_selection() {
        let single = BTreeMap::from([("A-D-4".to_string(), vec![300, 420])]);
        assert_eq!(determine_headway_to_use(&single), Some(&vec![300, 420]));

        let several = BTreeMap::from([
            ("A-D-4".to_string(), vec![300]),
            ("A-E-5".to_string(), vec![300, 480, 200]),
        ]);
        assert_eq!(determine_headway_to_use(&several), Some(&vec![300, 480, 200]));

        let mut with_blended = several.clone();
        with_blended.insert(BLENDED.to_string(), vec![240]);
        assert_eq!(determine_headway_to_use(&with_blended), Some(&vec![240]));

        assert_eq!(determine_headway_to_use(&BTreeMap::new()), None);
    }

    #[test]
    fn test_headway_discrepancy_floored_at_zero() {
        let actual = BTreeMap::from([("r".to_string(), vec![600, 900])]);
        let scheduled = BTreeMap::from([("r".to_string(), vec![480])]);
        assert_eq!(max_headway_discrepancy(&actual, &scheduled), 420);
        assert_eq!(max_headway_discrepancy(&scheduled, &actual), 0);
        assert_eq!(max_headway_discrepancy(&actual, &BTreeMap::new()), 0);
    }
}
