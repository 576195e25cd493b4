//! Turning reconciled ledger records into notification events.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::notification::{Announcement, DelayNotification};
use super::{DelayLedger, LedgerCycle};
use crate::config::NotificationConfig;
use crate::model::Direction;

/// Channel that hears about every route.
pub const ALL_CHANNEL: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    New,
    Updated,
    Ongoing,
    Cleared,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::New => "new",
            EventKind::Updated => "updated",
            EventKind::Ongoing => "ongoing",
            EventKind::Cleared => "cleared",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured announcement handed to a delivery collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub kind: EventKind,
    pub route_ids: Vec<String>,
    pub direction: Direction,
    pub affected_sections: Vec<Vec<String>>,
    pub destinations: Vec<String>,
    /// Channels this event is due on.
    pub channels: Vec<String>,
    pub at: DateTime<Utc>,
}

impl NotificationEvent {
    fn for_record(
        record: &DelayNotification,
        kind: EventKind,
        channels: Vec<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            route_ids: record.routes.clone(),
            direction: record.direction,
            affected_sections: record.collapsed_sections(),
            destinations: record.destinations.clone(),
            channels,
            at,
        }
    }
}

/// Delivers events and returns the id the announcement was published under.
#[async_trait]
pub trait AnnouncementSink: Send + Sync {
    async fn deliver(&self, event: &NotificationEvent) -> Result<String>;
}

/// Keeps delivered events in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<NotificationEvent>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following delivery fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl AnnouncementSink for RecordingSink {
    async fn deliver(&self, event: &NotificationEvent) -> Result<String> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("delivery refused");
        }
        let mut events = self.events.lock().await;
        events.push(event.clone());
        Ok(events.len().to_string())
    }
}

/// Channels an announcement is due on. A route channel is due when the
/// update is required or its last announcement is older than `interval`;
/// the all-routes channel only skips its timer when `force_all` is set.
fn due_channels(
    record: &DelayNotification,
    required_update: bool,
    force_all: bool,
    now: DateTime<Utc>,
    interval: Duration,
) -> Vec<String> {
    let mut channels = vec![ALL_CHANNEL.to_string()];
    for route in &record.routes {
        if !channels.contains(route) {
            channels.push(route.clone());
        }
    }

    channels
        .into_iter()
        .filter(|channel| {
            let timer_elapsed = record
                .announcements
                .get(channel)
                .is_none_or(|last| last.at <= now - interval);
            if channel == ALL_CHANNEL {
                force_all || timer_elapsed
            } else {
                required_update || timer_elapsed
            }
        })
        .collect()
}

async fn deliver(
    sink: &dyn AnnouncementSink,
    record: &mut DelayNotification,
    kind: EventKind,
    required_update: bool,
    force_all: bool,
    now: DateTime<Utc>,
    interval: Duration,
) {
    let channels = due_channels(record, required_update, force_all, now, interval);
    if channels.is_empty() {
        return;
    }

    let event = NotificationEvent::for_record(record, kind, channels, now);
    match sink.deliver(&event).await {
        Ok(id) => {
            info!(
                kind = %kind,
                routes = ?record.routes,
                direction = %record.direction,
                channels = ?event.channels,
                id = %id,
                "Delay announcement delivered"
            );
            for channel in event.channels {
                record.announcements.insert(
                    channel,
                    Announcement {
                        id: id.clone(),
                        at: now,
                    },
                );
            }
        }
        Err(e) => warn!(
            kind = %kind,
            routes = ?record.routes,
            error = %e,
            "Delay announcement failed"
        ),
    }
}

/// Announces a reconciled cycle and returns the ledger to persist: every
/// still-active record that has been announced at least once.
#[tracing::instrument(skip_all, fields(
    cleared = cycle.cleared.len(),
    carried = cycle.carried.len(),
    updated = cycle.updated.len(),
))]
pub async fn announce(
    cycle: LedgerCycle,
    sink: &dyn AnnouncementSink,
    now: DateTime<Utc>,
    config: &NotificationConfig,
) -> DelayLedger {
    let interval = config.reannounce_interval();
    let LedgerCycle {
        mut cleared,
        mut carried,
        mut updated,
    } = cycle;

    for record in &mut cleared {
        deliver(sink, record, EventKind::Cleared, true, false, now, interval).await;
    }

    for record in &mut carried {
        if record.mins_since_observed(now) > 0 {
            continue;
        }
        let kind = if record.is_announced() {
            EventKind::Ongoing
        } else {
            EventKind::New
        };
        deliver(sink, record, kind, false, false, now, interval).await;
    }

    for record in &mut updated {
        let kind = if record.is_announced() {
            EventKind::Updated
        } else {
            EventKind::New
        };
        deliver(sink, record, kind, true, true, now, interval).await;
    }

    DelayLedger::new(
        carried
            .into_iter()
            .chain(updated)
            .filter(DelayNotification::is_announced)
            .collect(),
    )
}
