//! Per-route status snapshot written at the end of each cycle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::service_change::DirectionScope;
use super::trip::{Direction, ProcessedTrip, Routing};

/// Human-readable service status of a direction or a whole route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "Delay")]
    Delay,
    #[serde(rename = "Service Change")]
    ServiceChange,
    #[serde(rename = "Slow")]
    Slow,
    #[serde(rename = "Not Good")]
    NotGood,
    #[serde(rename = "No Service")]
    NoService,
    #[serde(rename = "Not Scheduled")]
    NotScheduled,
    #[serde(rename = "Good Service")]
    GoodService,
}

/// Order in which direction statuses roll up into the route status.
pub const STATUS_PRIORITY: [Status; 7] = [
    Status::Delay,
    Status::ServiceChange,
    Status::Slow,
    Status::NotGood,
    Status::NoService,
    Status::NotScheduled,
    Status::GoodService,
];

impl Status {
    pub fn label(self) -> &'static str {
        match self {
            Status::Delay => "Delay",
            Status::ServiceChange => "Service Change",
            Status::Slow => "Slow",
            Status::NotGood => "Not Good",
            Status::NoService => "No Service",
            Status::NotScheduled => "Not Scheduled",
            Status::GoodService => "Good Service",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything known about a route at one point in time.
///
/// Maps are ordered so two snapshots computed from identical inputs encode to
/// identical bytes apart from `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStatusSnapshot {
    pub route_id: String,
    pub status: Status,
    pub direction_statuses: BTreeMap<Direction, Status>,
    pub service_summaries: BTreeMap<Direction, Option<String>>,
    pub service_change_summaries: BTreeMap<DirectionScope, Vec<String>>,
    pub destinations: BTreeMap<Direction, String>,
    pub max_delay: BTreeMap<Direction, i64>,
    pub accumulated_extra_travel_time: BTreeMap<Direction, i64>,
    pub overall_runtime_diff: BTreeMap<Direction, i64>,
    pub max_headway_discrepancy: BTreeMap<Direction, i64>,
    pub scheduled_headways: BTreeMap<Direction, BTreeMap<String, Vec<i64>>>,
    pub actual_routings: BTreeMap<Direction, Vec<Routing>>,
    pub common_routings: BTreeMap<Direction, Routing>,
    pub routing_runtimes: BTreeMap<Direction, BTreeMap<String, RoutingRuntime>>,
    /// Observed travel times in seconds, keyed `<from>-<to>`.
    pub travel_times: BTreeMap<String, i64>,
    pub trips: BTreeMap<Direction, BTreeMap<String, Vec<ProcessedTrip>>>,
    pub timestamp: i64,
}

/// End-to-end runtime of a routing at observed and scheduled pace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRuntime {
    pub actual: i64,
    pub scheduled: i64,
}

impl RouteStatusSnapshot {
    /// A snapshot older than `horizon_secs` at `now` must be treated as absent.
    pub fn is_fresh(&self, now: i64, horizon_secs: i64) -> bool {
        self.timestamp > now - horizon_secs
    }

    pub fn summary(&self) -> RouteStatusSummary {
        RouteStatusSummary {
            status: self.status,
            timestamp: self.timestamp,
        }
    }
}

/// Compact status entry served for the all-routes listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStatusSummary {
    pub status: Status,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_as_label() {
        let encoded = serde_json::to_string(&Status::NotGood).unwrap();
        assert_eq!(encoded, "\"Not Good\"");
        let decoded: Status = serde_json::from_str("\"Service Change\"").unwrap();
        assert_eq!(decoded, Status::ServiceChange);
    }

    #[test]
    fn test_priority_lists_every_status_once() {
        for status in STATUS_PRIORITY {
            assert_eq!(STATUS_PRIORITY.iter().filter(|s| **s == status).count(), 1);
        }
        assert_eq!(STATUS_PRIORITY[0], Status::Delay);
        assert_eq!(STATUS_PRIORITY[6], Status::GoodService);
    }
}
