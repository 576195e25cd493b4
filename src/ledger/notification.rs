use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::NotificationConfig;
use crate::model::{Direction, ProcessedTrip, RouteStatusSnapshot, Routing};
use crate::routing::{routing_key, BLENDED};

/// One cycle's view of a delayed stretch of a routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayObservation {
    pub route_id: String,
    pub direction: Direction,
    pub routing: Routing,
    /// Contiguous run of `routing` between the first and last delayed trip.
    pub stops: Vec<String>,
    pub max_delay: i64,
    pub destinations: Vec<String>,
}

/// A delivered announcement on one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub id: String,
    pub at: DateTime<Utc>,
}

/// A delay event tracked across cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayNotification {
    pub routes: Vec<String>,
    pub direction: Direction,
    pub affected_sections: Vec<Vec<String>>,
    pub routings: Vec<Routing>,
    pub destinations: Vec<String>,
    /// Last announcement per channel.
    #[serde(default)]
    pub announcements: BTreeMap<String, Announcement>,
    pub last_observed: DateTime<Utc>,
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

/// Whether `section` and `stops` share a stop, or cover overlapping
/// intervals of `routing`.
fn sections_overlap(section: &[String], stops: &[String], routing: &[String]) -> bool {
    if section.iter().any(|s| stops.contains(s)) {
        return true;
    }
    let position = |id: Option<&String>| id.and_then(|id| routing.iter().position(|r| r == id));
    let interval = |run: &[String]| match (position(run.first()), position(run.last())) {
        (Some(a), Some(b)) => Some((a.min(b), a.max(b))),
        _ => None,
    };
    match (interval(section), interval(stops)) {
        (Some((a, b)), Some((c, d))) => a.max(c) <= b.min(d),
        _ => false,
    }
}

impl DelayNotification {
    pub fn new(observation: &DelayObservation, now: DateTime<Utc>) -> Self {
        Self {
            routes: vec![observation.route_id.clone()],
            direction: observation.direction,
            affected_sections: vec![observation.stops.clone()],
            routings: vec![observation.routing.clone()],
            destinations: observation.destinations.clone(),
            announcements: BTreeMap::new(),
            last_observed: now,
        }
    }

    /// Same direction, and some affected section overlaps the observed
    /// stretch along the observation's routing.
    pub fn matches(&self, observation: &DelayObservation) -> bool {
        self.direction == observation.direction
            && self
                .affected_sections
                .iter()
                .any(|s| sections_overlap(s, &observation.stops, &observation.routing))
    }

    /// Absorbs an observation: unions routes, sections, routings and
    /// destinations, and marks the record observed at `now`.
    pub fn merge(mut self, observation: &DelayObservation, now: DateTime<Utc>) -> Self {
        push_unique(&mut self.routes, observation.route_id.clone());
        push_unique(&mut self.affected_sections, observation.stops.clone());
        push_unique(&mut self.routings, observation.routing.clone());
        for destination in &observation.destinations {
            push_unique(&mut self.destinations, destination.clone());
        }
        self.last_observed = now;
        self
    }

    pub fn has_route(&self, route_id: &str) -> bool {
        self.routes.iter().any(|r| r == route_id)
    }

    pub fn is_announced(&self) -> bool {
        !self.announcements.is_empty()
    }

    pub fn mins_since_observed(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_observed).num_minutes()
    }

    /// Stable ordering key: routes, direction and first section.
    pub fn key(&self) -> String {
        let section = self
            .affected_sections
            .first()
            .map(|s| s.join("-"))
            .unwrap_or_default();
        format!("{}:{}:{}", self.routes.join("+"), self.direction, section)
    }

    /// Sections not contained in another section.
    pub fn collapsed_sections(&self) -> Vec<Vec<String>> {
        let sections = &self.affected_sections;
        sections
            .iter()
            .enumerate()
            .filter(|(i, section)| {
                !sections.iter().enumerate().any(|(j, other)| {
                    *i != j
                        && other != *section
                        && section.first().is_some_and(|s| other.contains(s))
                        && section.last().is_some_and(|s| other.contains(s))
                })
            })
            .map(|(_, s)| s.clone())
            .collect()
    }
}

/// Builds ledger observations from a route's snapshot: one per routing group
/// holding delayed trips, with trips counted in the blended group first.
pub fn observations_from_snapshot(
    snapshot: &RouteStatusSnapshot,
    config: &NotificationConfig,
) -> Vec<DelayObservation> {
    let route_id = &snapshot.route_id;
    if config.is_excluded(route_id) {
        return Vec::new();
    }

    let mut observations = Vec::new();
    for (direction, groups) in &snapshot.trips {
        let Some(routings) = snapshot.actual_routings.get(direction) else {
            continue;
        };

        let mut keys: Vec<&String> = groups.keys().collect();
        keys.sort_by_key(|k| (*k != BLENDED, *k));

        let mut seen = BTreeSet::new();
        for key in keys {
            let delayed: Vec<&ProcessedTrip> = groups[key]
                .iter()
                .filter(|t| t.delayed && seen.insert(t.id.clone()))
                .collect();
            if delayed.is_empty() {
                continue;
            }

            let (routing, destinations) = if key == BLENDED {
                let Some(common) = snapshot.common_routings.get(direction) else {
                    continue;
                };
                let mut destinations = Vec::new();
                for r in routings {
                    if let Some(last) = r.last() {
                        push_unique(&mut destinations, last.clone());
                    }
                }
                (common, destinations)
            } else {
                let Some(routing) = routings.iter().find(|r| routing_key(r) == *key) else {
                    continue;
                };
                (routing, routing.last().cloned().into_iter().collect())
            };

            let positions: Vec<usize> = delayed
                .iter()
                .filter_map(|t| routing.iter().position(|s| *s == t.upcoming_stop))
                .collect();
            let (Some(&i), Some(&j)) = (positions.iter().min(), positions.iter().max()) else {
                continue;
            };
            if i == j && i == routing.len() - 1 {
                continue;
            }
            let stops = routing[i..=j].to_vec();

            let flipped = config
                .direction_overrides
                .iter()
                .any(|o| o.applies(route_id, &stops));
            observations.push(DelayObservation {
                route_id: route_id.clone(),
                direction: if flipped { direction.opposite() } else { *direction },
                routing: routing.clone(),
                stops,
                max_delay: delayed.iter().map(|t| t.delayed_time).max().unwrap_or(0),
                destinations,
            });
        }
    }
    observations
}
