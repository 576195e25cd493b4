//! Output formatting and persistence for snapshots, events and cycle stats.
//!
//! Supports pretty-printing, JSON serialization, and CSV append.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use crate::ledger::{AnnouncementSink, NotificationEvent};
use crate::model::RouteStatusSnapshot;

/// Logs a snapshot using Rust's debug pretty-print format.
pub fn print_pretty(snapshot: &RouteStatusSnapshot) {
    debug!("{:#?}", snapshot);
}

/// Logs any serializable value as pretty-printed JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Appends a record as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record<T: Serialize>(path: impl AsRef<Path>, record: &T) -> Result<()> {
    let path = path.as_ref();
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    writer.serialize(record)?;
    writer.flush()?;

    Ok(())
}

/// Flat CSV row for a [`NotificationEvent`].
#[derive(Debug, Serialize)]
struct EventRow<'a> {
    id: &'a str,
    at: DateTime<Utc>,
    kind: &'static str,
    routes: String,
    direction: &'static str,
    sections: String,
    destinations: String,
    channels: String,
}

/// Announcement sink appending each event to a CSV file.
pub struct CsvEventSink {
    path: PathBuf,
    sequence: AtomicU64,
}

impl CsvEventSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sequence: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl AnnouncementSink for CsvEventSink {
    async fn deliver(&self, event: &NotificationEvent) -> Result<String> {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("{}-{n}", event.at.timestamp());
        let row = EventRow {
            id: &id,
            at: event.at,
            kind: event.kind.as_str(),
            routes: event.route_ids.join("/"),
            direction: event.direction.as_str(),
            sections: event
                .affected_sections
                .iter()
                .map(|s| s.join("-"))
                .collect::<Vec<_>>()
                .join(";"),
            destinations: event.destinations.join("/"),
            channels: event.channels.join("/"),
        };
        append_record(&self.path, &row)?;
        Ok(id)
    }
}
