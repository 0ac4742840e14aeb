//! # Vakthund Telemetry
//!
//! Installs the `tracing` subscriber that acts as the logging sink for every
//! Vakthund component, including the guarded allocation layer.

pub mod logging;

pub use logging::{EventLogger, TelemetryError};
