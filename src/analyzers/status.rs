//! Status classification.
//!
//! A direction's status is the first matching rule, in order:
//!
//! | Condition                                   | Status         |
//! |---------------------------------------------|----------------|
//! | no active and no scheduled trips            | Not Scheduled  |
//! | no active trips                             | No Service     |
//! | max delay >= delay threshold                | Delay          |
//! | service change in direction or both         | Service Change |
//! | accumulated extra time >= slow threshold    | Slow           |
//! | headway discrepancy >= discrepancy threshold| Not Good       |
//! | otherwise                                   | Good Service   |

use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::model::{Direction, Status, STATUS_PRIORITY};

/// Inputs the classifier needs for one direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionSignals {
    pub has_trips: bool,
    pub has_scheduled_trips: bool,
    pub max_delay: Option<i64>,
    pub service_change: bool,
    pub slowness: Option<i64>,
    pub headway_discrepancy: Option<i64>,
}

pub fn direction_status(signals: &DirectionSignals, config: &EngineConfig) -> Status {
    let at_least = |value: Option<i64>, threshold: i64| value.is_some_and(|v| v >= threshold);

    match signals {
        s if !s.has_trips && !s.has_scheduled_trips => Status::NotScheduled,
        s if !s.has_trips => Status::NoService,
        s if at_least(s.max_delay, config.delay_threshold_secs) => Status::Delay,
        s if s.service_change => Status::ServiceChange,
        s if at_least(s.slowness, config.slow_threshold_secs) => Status::Slow,
        s if at_least(s.headway_discrepancy, config.headway_discrepancy_threshold_secs) => {
            Status::NotGood
        }
        _ => Status::GoodService,
    }
}

/// Rolls direction statuses up into the route status: the first entry of
/// [`STATUS_PRIORITY`] any direction has.
pub fn route_status(direction_statuses: &BTreeMap<Direction, Status>) -> Status {
    STATUS_PRIORITY
        .into_iter()
        .find(|s| direction_statuses.values().any(|d| d == s))
        .unwrap_or(Status::NotScheduled)
}
