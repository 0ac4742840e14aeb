//! ## vakthund-telemetry::logging
//! **Structured logging with `tracing`**
//!
//! ### Expectations:
//! - One subscriber per process, installed during initialization
//! - `RUST_LOG` overrides the configured level
//! - Allocation failures arrive as `error` events with a `code` field

use thiserror::Error;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};
use vakthund_config::TelemetryConfig;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to install tracing subscriber: {0}")]
    Init(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber.
    ///
    /// # Panics
    /// If a global subscriber has already been set.
    pub fn init(config: &TelemetryConfig) {
        Self::builder(config).init()
    }

    /// Like [`EventLogger::init`], but reports an already-installed subscriber
    /// as an error.
    pub fn try_init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
        Self::builder(config).try_init().map_err(TelemetryError::Init)
    }

    /// Resolves the level filter: `RUST_LOG` first, then the configured level.
    pub fn filter(config: &TelemetryConfig) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
    }

    fn builder(
        config: &TelemetryConfig,
    ) -> fmt::SubscriberBuilder<fmt::format::DefaultFields, fmt::format::Format, EnvFilter> {
        fmt()
            .with_env_filter(Self::filter(config))
            .with_thread_names(config.thread_names)
            .with_ansi(config.ansi)
            .with_span_events(FmtSpan::NONE)
    }
}
