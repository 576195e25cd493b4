//! Data model shared by the status pipeline and the delay ledger.
//!
//! Trips arrive as [`TripObservation`]s from the feed processor, are grouped
//! onto routings and enriched into [`ProcessedTrip`]s, and leave the pipeline
//! as an immutable [`RouteStatusSnapshot`].

pub mod service_change;
pub mod snapshot;
pub mod trip;

pub use service_change::{DirectionScope, RouteEnd, ServiceChange, ServiceChangeRecord, Span};
pub use snapshot::{RouteStatusSnapshot, RouteStatusSummary, RoutingRuntime, Status, STATUS_PRIORITY};
pub use trip::{Direction, ProcessedTrip, Routing, StopPair, TripObservation};
