use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Remaps the direction of delay observations on a route when any of the
/// listed stops is affected. Covers a route whose trips run the opposite
/// compass direction through a shuffle section of shared track.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DirectionOverride {
    pub route_id: String,
    pub stops: Vec<String>,
}

impl DirectionOverride {
    pub fn applies(&self, route_id: &str, stops: &[String]) -> bool {
        self.route_id == route_id && stops.iter().any(|s| self.stops.contains(s))
    }
}

fn default_direction_overrides() -> Vec<DirectionOverride> {
    vec![DirectionOverride {
        route_id: "M".to_string(),
        stops: ["M11", "M12", "M13", "M14", "M16", "M18"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    }]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Minimum max delay, in seconds, before a new delay is announced.
    pub threshold_secs: i64,
    /// Minutes a delay may go unobserved before it is announced cleared.
    pub cleared_timeout_mins: i64,
    /// Seconds before an unchanged delay is announced again on a channel.
    pub reannounce_interval_secs: i64,
    pub excluded_routes: Vec<String>,
    pub direction_overrides: Vec<DirectionOverride>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            threshold_secs: 600,
            cleared_timeout_mins: 10,
            reannounce_interval_secs: 15 * 60,
            excluded_routes: Vec::new(),
            direction_overrides: default_direction_overrides(),
        }
    }
}

impl NotificationConfig {
    pub fn reannounce_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reannounce_interval_secs)
    }

    pub fn is_excluded(&self, route_id: &str) -> bool {
        self.excluded_routes.iter().any(|r| r == route_id)
    }
}

/// Thresholds and timers for one engine instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub delay_threshold_secs: i64,
    pub slow_threshold_secs: i64,
    pub headway_discrepancy_threshold_secs: i64,
    /// Per stop pair excess that counts towards slowness.
    pub slow_pair_threshold_secs: f64,
    /// How far back visits of the departure stop are considered.
    pub runtime_start_limit_secs: i64,
    /// How far back visits of the arrival stop are considered.
    pub runtime_end_limit_secs: i64,
    pub lookahead_secs: i64,
    /// Snapshot time-to-live, also the staleness horizon for readers.
    pub snapshot_ttl_secs: i64,
    pub store_timeout_ms: u64,
    pub concurrency: usize,
    pub notification: NotificationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            delay_threshold_secs: 300,
            slow_threshold_secs: 300,
            headway_discrepancy_threshold_secs: 120,
            slow_pair_threshold_secs: 60.0,
            runtime_start_limit_secs: 40 * 60,
            runtime_end_limit_secs: 30 * 60,
            lookahead_secs: 60,
            snapshot_ttl_secs: 300,
            store_timeout_ms: 2_000,
            concurrency: 4,
            notification: NotificationConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Loads the config from a JSON file at `path`, or the defaults if none is
    /// given, then applies environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("reading engine config '{path}'"))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("parsing engine config '{path}'"))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies `DELAY_NOTIFICATION_*`, `DELAY_CLEARED_TIMEOUT_MINS` and
    /// `STORE_TIMEOUT_MS` overrides read through `lookup`.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DELAY_NOTIFICATION_THRESHOLD") {
            self.notification.threshold_secs = v
                .trim()
                .parse()
                .context("DELAY_NOTIFICATION_THRESHOLD must be seconds")?;
        }
        if let Some(v) = lookup("DELAY_CLEARED_TIMEOUT_MINS") {
            self.notification.cleared_timeout_mins = v
                .trim()
                .parse()
                .context("DELAY_CLEARED_TIMEOUT_MINS must be minutes")?;
        }
        if let Some(v) = lookup("DELAY_NOTIFICATION_REANNOUNCE_TIME") {
            self.notification.reannounce_interval_secs = v
                .trim()
                .parse()
                .context("DELAY_NOTIFICATION_REANNOUNCE_TIME must be seconds")?;
        }
        if let Some(v) = lookup("DELAY_NOTIFICATION_EXCLUDED_ROUTES") {
            self.notification.excluded_routes = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = lookup("STORE_TIMEOUT_MS") {
            self.store_timeout_ms = v.trim().parse().context("STORE_TIMEOUT_MS must be milliseconds")?;
        }
        Ok(self)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Age past which a stop visit can no longer fall into any query window.
    pub fn visit_retention_secs(&self) -> i64 {
        self.runtime_start_limit_secs.max(self.runtime_end_limit_secs) + self.lookahead_secs
    }

    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs.max(0) as u64)
    }
}
