//! Per-direction service summaries.
//!
//! Pure string building over already-computed signals; nothing here changes
//! a status.

use std::collections::BTreeMap;

use crate::analyzers::headway::{determine_headway_to_use, slow_pairs, ProcessedGroup};
use crate::analyzers::status::DirectionSignals;
use crate::analyzers::utility::round_mins;
use crate::config::{EngineConfig, StopNames};
use crate::model::{ProcessedTrip, Routing};
use crate::routing::BLENDED;
use crate::travel_time::TravelTimeTable;

/// What the composer reads for one direction.
pub struct SummaryContext<'a> {
    /// Display name of the direction's destination(s).
    pub destination: &'a str,
    pub groups: &'a [ProcessedGroup],
    pub routings: &'a [Routing],
    pub table: &'a TravelTimeTable,
    pub scheduled_headways: &'a BTreeMap<String, Vec<i64>>,
    pub signals: &'a DirectionSignals,
    pub names: &'a StopNames,
    pub config: &'a EngineConfig,
}

fn at_least(value: Option<i64>, threshold: i64) -> bool {
    value.is_some_and(|v| v >= threshold)
}

/// Composes e.g. "Jamaica-bound trains are delayed at Canal St (for 7 mins),
/// and traveling slowly between ...". `None` when there is nothing to report
/// or no trips to report on.
pub fn service_summary(ctx: &SummaryContext<'_>) -> Option<String> {
    if ctx.groups.iter().all(|g| g.trips.is_empty()) {
        return None;
    }

    let clauses: Vec<String> = [delay_clause(ctx), slowness_clause(ctx), headway_clause(ctx)]
        .into_iter()
        .flatten()
        .collect();

    join_clauses(&format!("{}-bound trains are ", ctx.destination), clauses)
}

/// Joins clauses with commas, prefixing the last with "and" when there are
/// several.
pub fn join_clauses(intro: &str, mut clauses: Vec<String>) -> Option<String> {
    let last = clauses.pop()?;
    if clauses.is_empty() {
        Some(format!("{intro}{last}."))
    } else {
        clauses.push(format!("and {last}"));
        Some(format!("{intro}{}.", clauses.join(", ")))
    }
}

fn first_max_by_key<T, K: Ord>(items: impl IntoIterator<Item = T>, key: impl Fn(&T) -> K) -> Option<T> {
    let mut best: Option<(K, T)> = None;
    for item in items {
        let k = key(&item);
        if best.as_ref().is_none_or(|(bk, _)| k > *bk) {
            best = Some((k, item));
        }
    }
    best.map(|(_, item)| item)
}

fn delay_clause(ctx: &SummaryContext<'_>) -> Option<String> {
    if !at_least(ctx.signals.max_delay, ctx.config.delay_threshold_secs) {
        return None;
    }

    let delayed_by_group = ctx
        .groups
        .iter()
        .map(|g| g.trips.iter().filter(|t| t.delayed).collect::<Vec<&ProcessedTrip>>());
    let delayed = first_max_by_key(delayed_by_group, |trips| {
        trips.iter().map(|t| t.delayed_time).max().unwrap_or(0)
    })?;

    let worst = delayed.iter().map(|t| t.delayed_time).max()?;
    let mins = round_mins(worst as f64);
    match delayed.as_slice() {
        [only] => Some(format!(
            "delayed at {} (for {mins} mins)",
            ctx.names.name(&only.upcoming_stop)
        )),
        [first, .., last] => Some(format!(
            "delayed between {} and {} (for {mins} mins)",
            ctx.names.name(&first.upcoming_stop),
            ctx.names.name(&last.upcoming_stop)
        )),
        [] => None,
    }
}

fn slowness_clause(ctx: &SummaryContext<'_>) -> Option<String> {
    if !at_least(ctx.signals.slowness, ctx.config.slow_threshold_secs) {
        return None;
    }

    let per_routing = ctx.routings.iter().map(|r| {
        let pairs = slow_pairs(r, ctx.table, ctx.config.slow_pair_threshold_secs);
        let total: f64 = pairs.iter().map(|(_, diff)| diff).sum();
        (pairs, total)
    });
    let (pairs, total) = per_routing.fold(None, |best: Option<(Vec<_>, f64)>, candidate| match best {
        Some(best) if candidate.1 <= best.1 => Some(best),
        _ => Some(candidate),
    })?;
    let from = &pairs.first()?.0.from;
    let to = &pairs.last()?.0.to;

    Some(format!(
        "traveling slowly between {} and {} (taking {} mins longer)",
        ctx.names.name(from),
        ctx.names.name(to),
        round_mins(total)
    ))
}

/// Trips representing a direction's headways: the blended group if there is
/// one, else the group with the most trips.
fn representative_trips(groups: &[ProcessedGroup]) -> Option<&[ProcessedTrip]> {
    if groups.len() > 1 {
        if let Some(blended) = groups.iter().find(|g| g.key == BLENDED) {
            return Some(&blended.trips);
        }
    }
    first_max_by_key(groups.iter(), |g| g.trips.len()).map(|g| g.trips.as_slice())
}

fn headway_clause(ctx: &SummaryContext<'_>) -> Option<String> {
    let threshold = ctx.config.headway_discrepancy_threshold_secs;
    if !at_least(ctx.signals.headway_discrepancy, threshold) {
        return None;
    }

    let scheduled_max = determine_headway_to_use(ctx.scheduled_headways)?
        .iter()
        .max()
        .copied()?;
    let long_waits: Vec<&ProcessedTrip> = representative_trips(ctx.groups)?
        .iter()
        .filter(|t| t.estimated_time_behind_next_train.is_some_and(|h| h >= threshold))
        .collect();
    let actual_max = long_waits
        .iter()
        .filter_map(|t| t.estimated_time_behind_next_train)
        .max()?;

    Some(format!(
        "have longer wait times between {} and {} (up to {} mins, normally every {} mins)",
        ctx.names.name(&long_waits.first()?.upcoming_stop),
        ctx.names.name(&long_waits.last()?.upcoming_stop),
        round_mins(actual_max as f64),
        round_mins(scheduled_max as f64)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StopPair;
    use std::collections::HashMap;

    fn processed(id: &str, stop: &str, delayed_time: i64, behind: Option<i64>) -> ProcessedTrip {
        ProcessedTrip {
            id: id.to_string(),
            previous_stop: None,
            previous_stop_arrival_time: None,
            upcoming_stop: stop.to_string(),
            upcoming_stop_arrival_time: 0,
            estimated_upcoming_stop_arrival_time: 0,
            destination: "D".to_string(),
            time_behind_next_train: behind,
            estimated_time_behind_next_train: behind,
            delayed_time,
            delayed: delayed_time >= 300,
        }
    }

    fn names() -> StopNames {
        StopNames::from_pairs([
            ("A", "Alpha"),
            ("B", "Bravo"),
            ("C", "Charlie"),
            ("D", "Delta"),
        ])
    }

    fn routing() -> Routing {
        ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect()
    }

    struct Fixture {
        groups: Vec<ProcessedGroup>,
        routings: Vec<Routing>,
        table: TravelTimeTable,
        scheduled: BTreeMap<String, Vec<i64>>,
        names: StopNames,
        config: EngineConfig,
    }

    impl Fixture {
        fn new(trips: Vec<ProcessedTrip>) -> Self {
            Self {
                groups: vec![ProcessedGroup {
                    key: "A-D-4".into(),
                    routing: routing(),
                    trips,
                }],
                routings: vec![routing()],
                table: TravelTimeTable::default(),
                scheduled: BTreeMap::new(),
                names: names(),
                config: EngineConfig::default(),
            }
        }

        fn summarize(&self, signals: &DirectionSignals) -> Option<String> {
            service_summary(&SummaryContext {
                destination: "Delta",
                groups: &self.groups,
                routings: &self.routings,
                table: &self.table,
                scheduled_headways: &self.scheduled,
                signals,
                names: &self.names,
                config: &self.config,
            })
        }
    }

    #[test]
    fn test_single_delayed_trip_is_delayed_at() {
        let f = Fixture::new(vec![processed("t1", "B", 420, None), processed("t2", "C", 0, None)]);
        let signals = DirectionSignals {
            has_trips: true,
            max_delay: Some(420),
            ..Default::default()
        };
        assert_eq!(
            f.summarize(&signals).as_deref(),
            Some("Delta-bound trains are delayed at Bravo (for 7 mins).")
        );
    }

    #[test]
    fn test_several_delayed_trips_are_delayed_between() {
        let f = Fixture::new(vec![processed("t1", "A", 330, None), processed("t2", "C", 610, None)]);
        let signals = DirectionSignals {
            has_trips: true,
            max_delay: Some(610),
            ..Default::default()
        };
        assert_eq!(
            f.summarize(&signals).as_deref(),
            Some("Delta-bound trains are delayed between Alpha and Charlie (for 10 mins).")
        );
    }

    #[test]
    fn test_clauses_joined_with_and() {
        let mut f = Fixture::new(vec![
            processed("t1", "A", 0, Some(720)),
            processed("t2", "B", 400, Some(600)),
            processed("t3", "D", 0, None),
        ]);
        f.table = TravelTimeTable::new(
            HashMap::from([
                (StopPair::new("A", "B"), 400.0),
                (StopPair::new("B", "C"), 250.0),
            ]),
            HashMap::from([
                (StopPair::new("A", "B"), 100.0),
                (StopPair::new("B", "C"), 100.0),
                (StopPair::new("C", "D"), 100.0),
            ]),
            HashMap::new(),
        );
        f.scheduled = BTreeMap::from([("A-D-4".to_string(), vec![360, 480])]);
        let signals = DirectionSignals {
            has_trips: true,
            max_delay: Some(400),
            slowness: Some(450),
            headway_discrepancy: Some(240),
            ..Default::default()
        };

        assert_eq!(
            f.summarize(&signals).as_deref(),
            Some(
                "Delta-bound trains are delayed at Bravo (for 7 mins), \
                 traveling slowly between Alpha and Charlie (taking 8 mins longer), \
                 and have longer wait times between Alpha and Bravo (up to 12 mins, normally every 8 mins)."
            )
        );
    }

    #[test]
    fn test_slowest_routing_compared_before_rounding() {
        let mut f = Fixture::new(vec![processed("t1", "A", 0, None)]);
        f.routings = vec![
            ["A", "B"].iter().map(|s| s.to_string()).collect(),
            ["C", "D"].iter().map(|s| s.to_string()).collect(),
        ];
        f.table = TravelTimeTable::new(
            HashMap::from([
                (StopPair::new("A", "B"), 400.0),
                (StopPair::new("C", "D"), 420.0),
            ]),
            HashMap::from([
                (StopPair::new("A", "B"), 100.0),
                (StopPair::new("C", "D"), 100.0),
            ]),
            HashMap::new(),
        );
        let signals = DirectionSignals {
            has_trips: true,
            slowness: Some(320),
            ..Default::default()
        };

        assert_eq!(
            f.summarize(&signals).as_deref(),
            Some("Delta-bound trains are traveling slowly between Charlie and Delta (taking 5 mins longer).")
        );
    }

    #[test]
    fn test_nothing_to_report() {
        let f = Fixture::new(vec![processed("t1", "A", 0, Some(300))]);
        let signals = DirectionSignals {
            has_trips: true,
            max_delay: Some(0),
            ..Default::default()
        };
        assert_eq!(f.summarize(&signals), None);
    }

    #[test]
    fn test_no_trips_means_no_summary() {
        let f = Fixture::new(vec![]);
        let signals = DirectionSignals {
            max_delay: Some(900),
            ..Default::default()
        };
        assert_eq!(f.summarize(&signals), None);
    }

    #[test]
    fn test_join_two_clauses() {
        let joined = join_clauses("X-bound trains are ", vec!["a".into(), "b".into()]);
        assert_eq!(joined.as_deref(), Some("X-bound trains are a, and b."));
        assert_eq!(join_clauses("X", vec![]), None);
    }
}
