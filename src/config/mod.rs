//! Engine configuration.
//!
//! [`EngineConfig`] carries every threshold and timer, loaded from an optional
//! JSON file and overridden by environment variables. [`StopNames`] maps stop
//! ids to the display names used in narration.

mod engine;
mod stop_names;

pub use engine::{DirectionOverride, EngineConfig, NotificationConfig};
pub use stop_names::StopNames;
