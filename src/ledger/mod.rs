//! Delay notification ledger.
//!
//! The ledger is the set of ongoing delay events. Each cycle it is decoded
//! from the store, reconciled against the cycle's delay observations, handed
//! to the announcer, and the announced records are written back.

pub mod announce;
pub mod notification;

pub use announce::{
    announce, AnnouncementSink, EventKind, NotificationEvent, RecordingSink, ALL_CHANNEL,
};
pub use notification::{observations_from_snapshot, Announcement, DelayNotification, DelayObservation};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::NotificationConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DelayLedger {
    records: Vec<DelayNotification>,
}

impl DelayLedger {
    pub fn new(mut records: Vec<DelayNotification>) -> Self {
        records.sort_by_key(DelayNotification::key);
        Self { records }
    }

    pub fn records(&self) -> &[DelayNotification] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Decodes a persisted ledger. Absent or unreadable bytes give an empty
    /// ledger.
    pub fn decode(bytes: Option<&[u8]>) -> Self {
        let Some(bytes) = bytes else {
            return Self::default();
        };
        match serde_json::from_slice(bytes) {
            Ok(ledger) => ledger,
            Err(e) => {
                warn!(error = %e, "Prior delay ledger unreadable, starting empty");
                Self::default()
            }
        }
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Outcome of reconciling a ledger with one cycle's observations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerCycle {
    /// Not observed for the clear timeout; announced once more and dropped.
    pub cleared: Vec<DelayNotification>,
    /// Still active with nothing new to say.
    pub carried: Vec<DelayNotification>,
    /// New records, and records whose route set changed after announcement.
    pub updated: Vec<DelayNotification>,
}

fn take_match(
    records: &mut Vec<DelayNotification>,
    observation: &DelayObservation,
) -> Option<DelayNotification> {
    let i = records.iter().position(|r| r.matches(observation))?;
    Some(records.remove(i))
}

/// Merges `observations` into `prior`.
///
/// An observation is matched against prior records, then records already
/// carried this cycle, then records already updated this cycle. A match
/// becomes an update when it brings a new route to an announced record, or
/// when it was already an update. Unmatched observations open a record only
/// when their max delay reaches the notification threshold.
pub fn reconcile(
    prior: DelayLedger,
    observations: &[DelayObservation],
    now: DateTime<Utc>,
    config: &NotificationConfig,
) -> LedgerCycle {
    let mut pending = prior.records;
    let mut carried = Vec::new();
    let mut updated = Vec::new();

    for observation in observations {
        let (record, previously_updated) = if let Some(r) = take_match(&mut pending, observation) {
            (r, false)
        } else if let Some(r) = take_match(&mut carried, observation) {
            (r, false)
        } else if let Some(r) = take_match(&mut updated, observation) {
            (r, true)
        } else {
            if observation.max_delay >= config.threshold_secs {
                debug!(
                    route_id = %observation.route_id,
                    direction = %observation.direction,
                    max_delay = observation.max_delay,
                    "Opening delay record"
                );
                updated.push(DelayNotification::new(observation, now));
            }
            continue;
        };

        let brings_new_route = !record.has_route(&observation.route_id);
        let announced = record.is_announced();
        let merged = record.merge(observation, now);
        if (brings_new_route && announced) || previously_updated {
            updated.push(merged);
        } else {
            carried.push(merged);
        }
    }

    let mut cleared = Vec::new();
    for record in pending {
        if record.mins_since_observed(now) < config.cleared_timeout_mins {
            carried.push(record);
        } else {
            cleared.push(record);
        }
    }

    LedgerCycle {
        cleared,
        carried,
        updated,
    }
}
