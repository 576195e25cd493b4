use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::Status;

/// Counters for one recomputation cycle, appended to the stats CSV.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CycleStats {
    pub timestamp: DateTime<Utc>,
    pub routes: usize,
    pub routes_processed: usize,
    pub routes_failed: usize,
    pub trips: usize,
    pub stop_visits_recorded: usize,

    // route statuses
    pub delay: usize,
    pub service_change: usize,
    pub slow: usize,
    pub not_good: usize,
    pub no_service: usize,
    pub not_scheduled: usize,
    pub good_service: usize,

    // ledger
    pub delay_records: usize,

    // error tracking
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

impl CycleStats {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        CycleStats {
            timestamp,
            ..Default::default()
        }
    }

    pub fn count_status(&mut self, status: Status) {
        let counter = match status {
            Status::Delay => &mut self.delay,
            Status::ServiceChange => &mut self.service_change,
            Status::Slow => &mut self.slow,
            Status::NotGood => &mut self.not_good,
            Status::NoService => &mut self.no_service,
            Status::NotScheduled => &mut self.not_scheduled,
            Status::GoodService => &mut self.good_service,
        };
        *counter += 1;
    }

    /// Records why part of the cycle was abandoned.
    pub fn with_error(mut self, error_type: &str, error_message: &str) -> Self {
        self.error_type = Some(error_type.to_string());
        self.error_message = Some(error_message.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_status() {
        let mut stats = CycleStats::default();
        stats.count_status(Status::Delay);
        stats.count_status(Status::Delay);
        stats.count_status(Status::GoodService);

        assert_eq!(stats.delay, 2);
        assert_eq!(stats.good_service, 1);
        assert_eq!(stats.slow, 0);
    }

    #[test]
    fn test_with_error() {
        let stats = CycleStats::default().with_error("ledger_error", "store offline");
        assert_eq!(stats.error_type.as_deref(), Some("ledger_error"));
        assert_eq!(stats.error_message.as_deref(), Some("store offline"));
    }
}
