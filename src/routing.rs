//! Routing inference.
//!
//! Clusters the stop sequences of a direction's live trips into the minimal
//! set of maximal routings and assigns each trip to every routing it runs on.

use std::collections::BTreeMap;

use crate::model::{Direction, Routing, TripObservation};

/// Key of the group spanning the stretch shared by all of a direction's
/// routings.
pub const BLENDED: &str = "blended";

/// Stable key of a routing: `<first stop>-<last stop>-<length>`.
pub fn routing_key(routing: &[String]) -> String {
    match (routing.first(), routing.last()) {
        (Some(first), Some(last)) => format!("{}-{}-{}", first, last, routing.len()),
        _ => "empty-0".to_string(),
    }
}

/// Whether every stop of `stops` is also a stop of `routing`, in any order.
pub fn stops_within(stops: &[String], routing: &[String]) -> bool {
    stops.iter().all(|stop| routing.contains(stop))
}

/// Whether `run` appears in `routing` as a contiguous window.
pub fn contains_run(routing: &[String], run: &[String]) -> bool {
    !run.is_empty() && run.len() <= routing.len() && routing.windows(run.len()).any(|w| w == run)
}

/// Folds stop sequences, longest first, into routings none of whose stops
/// all lie on another retained routing.
pub fn determine_routings_for_direction<'a, I>(sequences: I) -> Vec<Routing>
where
    I: IntoIterator<Item = &'a [String]>,
{
    let mut candidates: Vec<&[String]> = sequences.into_iter().filter(|s| !s.is_empty()).collect();
    candidates.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    candidates.into_iter().fold(Vec::new(), |mut retained: Vec<Routing>, stops| {
        if !retained.iter().any(|r| stops_within(stops, r)) {
            retained.push(stops.to_vec());
        }
        retained
    })
}

/// Routings per direction for a route's current trips.
pub fn determine_routings(trips: &[TripObservation]) -> BTreeMap<Direction, Vec<Routing>> {
    Direction::ALL
        .iter()
        .filter_map(|direction| {
            let sequences = trips
                .iter()
                .filter(|t| t.direction == *direction)
                .map(|t| t.upcoming_stops.as_slice());
            let routings = determine_routings_for_direction(sequences);
            (!routings.is_empty()).then_some((*direction, routings))
        })
        .collect()
}

/// The longest contiguous run of at least two stops shared by every routing.
pub fn common_routing(routings: &[Routing]) -> Option<Routing> {
    let (shortest, others) = match routings.iter().min_by_key(|r| r.len()) {
        Some(shortest) if routings.len() > 1 => (shortest, routings),
        _ => return None,
    };

    (2..=shortest.len()).rev().find_map(|len| {
        shortest
            .windows(len)
            .find(|run| others.iter().all(|r| contains_run(r, run)))
            .map(|run| run.to_vec())
    })
}

/// Trips assigned to one routing, in order along it.
#[derive(Debug, Clone)]
pub struct RoutingGroup<'a> {
    pub key: String,
    pub routing: Routing,
    /// Trailing trips first; the last trip is furthest along.
    pub trips: Vec<&'a TripObservation>,
}

fn order_along<'a>(routing: &[String], trips: &mut Vec<&'a TripObservation>) {
    let position = |t: &TripObservation| {
        t.upcoming_stop()
            .and_then(|stop| routing.iter().position(|s| s == stop))
            .unwrap_or(0)
    };
    trips.sort_by(|a, b| {
        position(*a)
            .cmp(&position(*b))
            .then_with(|| b.upcoming_stop_arrival_time.cmp(&a.upcoming_stop_arrival_time))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Assigns each trip to every routing containing its stop run as a
/// contiguous window. When there is more than one routing and they share a
/// common stretch, a [`BLENDED`] group holds every trip whose upcoming stop
/// lies on it.
pub fn group_trips<'a>(routings: &[Routing], trips: &[&'a TripObservation]) -> Vec<RoutingGroup<'a>> {
    let mut groups: Vec<RoutingGroup<'a>> = routings
        .iter()
        .map(|routing| {
            let mut assigned: Vec<&TripObservation> = trips
                .iter()
                .copied()
                .filter(|t| contains_run(routing, &t.upcoming_stops))
                .collect();
            order_along(routing, &mut assigned);
            RoutingGroup {
                key: routing_key(routing),
                routing: routing.clone(),
                trips: assigned,
            }
        })
        .collect();

    if let Some(common) = common_routing(routings) {
        let mut blended: Vec<&TripObservation> = trips
            .iter()
            .copied()
            .filter(|t| t.upcoming_stop().is_some_and(|stop| common.iter().any(|s| s == stop)))
            .collect();
        if !blended.is_empty() {
            order_along(&common, &mut blended);
            groups.push(RoutingGroup {
                key: BLENDED.to_string(),
                routing: common,
                trips: blended,
            });
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stops(ids: &[u32]) -> Vec<String> {
        ids.iter().map(|i| i.to_string()).collect()
    }

    fn trip(id: &str, ids: &[u32], arrival: i64) -> TripObservation {
        TripObservation {
            id: id.to_string(),
            route_id: "A".to_string(),
            direction: Direction::North,
            upcoming_stops: stops(ids),
            upcoming_stop_arrival_time: arrival,
            previous_stop: None,
            previous_stop_arrival_time: None,
            delayed_time: 0,
            assigned: true,
            schedule_discrepancy: 0,
        }
    }

    #[test]
    fn test_dominated_sequences_are_folded() {
        let seqs = vec![stops(&[1, 2, 3]), stops(&[1, 2, 3, 4]), stops(&[2, 3, 4, 5]), stops(&[3, 4, 5]), stops(&[2, 3, 4])];
        let routings = determine_routings_for_direction(seqs.iter().map(Vec::as_slice));

        assert_eq!(routings, vec![stops(&[1, 2, 3, 4]), stops(&[2, 3, 4, 5])]);
    }

    #[test]
    fn test_no_retained_routing_is_covered_by_another() {
        let seqs = vec![
            stops(&[1, 2, 3, 4, 5, 6]),
            stops(&[1, 3, 5]),
            stops(&[7, 8, 9]),
            stops(&[2, 4, 6, 8]),
            stops(&[8, 9]),
            stops(&[6]),
        ];
        let routings = determine_routings_for_direction(seqs.iter().map(Vec::as_slice));

        for (i, a) in routings.iter().enumerate() {
            for (j, b) in routings.iter().enumerate() {
                if i != j {
                    assert!(!stops_within(a, b), "{a:?} lies within {b:?}");
                }
            }
        }
        for s in &seqs {
            assert!(routings.iter().any(|r| stops_within(s, r)), "{s:?} not covered");
        }
    }

    #[test]
    fn test_reordered_and_looping_sequences_fold_into_routing() {
        let seqs = vec![stops(&[1, 2, 3]), stops(&[3, 1]), stops(&[2, 3, 2])];
        let routings = determine_routings_for_direction(seqs.iter().map(Vec::as_slice));

        assert_eq!(routings, vec![stops(&[1, 2, 3])]);
    }

    #[test]
    fn test_trips_assigned_to_containing_routings() {
        let routings = vec![stops(&[1, 2, 3, 4]), stops(&[2, 3, 4, 5])];
        let a = trip("a", &[1, 2, 3], 100);
        let b = trip("b", &[3, 4, 5], 100);
        let c = trip("c", &[2, 3, 4], 100);
        let trips = vec![&a, &b, &c];

        let groups = group_trips(&routings, &trips);
        let ids = |key: &str| -> Vec<&str> {
            groups
                .iter()
                .find(|g| g.key == key)
                .unwrap()
                .trips
                .iter()
                .map(|t| t.id.as_str())
                .collect()
        };

        assert_eq!(ids("1-4-4"), vec!["a", "c"]);
        assert_eq!(ids("2-5-4"), vec!["c", "b"]);
    }

    #[test]
    fn test_blended_group_covers_common_stretch() {
        let routings = vec![stops(&[1, 2, 3, 4]), stops(&[2, 3, 4, 5])];
        assert_eq!(common_routing(&routings), Some(stops(&[2, 3, 4])));

        let a = trip("a", &[1, 2, 3, 4], 100);
        let b = trip("b", &[3, 4, 5], 100);
        let groups = group_trips(&routings, &[&a, &b]);
        let blended = groups.iter().find(|g| g.key == BLENDED).unwrap();
        assert_eq!(blended.trips.len(), 1);
        assert_eq!(blended.trips[0].id, "b");
    }

    #[test]
    fn test_single_routing_has_no_blended_group() {
        let routings = vec![stops(&[1, 2, 3])];
        assert_eq!(common_routing(&routings), None);
        let a = trip("a", &[2, 3], 100);
        assert_eq!(group_trips(&routings, &[&a]).len(), 1);
    }

    #[test]
    fn test_trips_ordered_trailing_first() {
        let routing = vec![stops(&[1, 2, 3, 4, 5])];
        let ahead = trip("ahead", &[4, 5], 200);
        let behind = trip("behind", &[2, 3, 4, 5], 150);
        let same_stop_later = trip("later", &[4, 5], 260);
        let groups = group_trips(&routing, &[&ahead, &behind, &same_stop_later]);
        let ids: Vec<_> = groups[0].trips.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["behind", "later", "ahead"]);
    }

    #[test]
    fn test_determine_routings_splits_by_direction() {
        let mut south = trip("s", &[9, 8, 7], 100);
        south.direction = Direction::South;
        let north = trip("n", &[1, 2], 100);
        let routings = determine_routings(&[north, south]);
        assert_eq!(routings[&Direction::North], vec![stops(&[1, 2])]);
        assert_eq!(routings[&Direction::South], vec![stops(&[9, 8, 7])]);
    }

    #[test]
    fn test_routing_key() {
        assert_eq!(routing_key(&stops(&[101, 102, 103])), "101-103-3");
    }
}
