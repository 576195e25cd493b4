//! Route analysis.
//!
//! This module turns a direction's routing groups into headway, runtime and
//! delay metrics, classifies them into a status with fixed precedence, and
//! narrates the result as user-facing sentences.

pub mod headway;
pub mod service_change;
pub mod status;
pub mod summary;
pub mod utility;
