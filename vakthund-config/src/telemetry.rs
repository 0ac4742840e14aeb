//! Observability configuration.
//!
//! Parameters for the `tracing` subscriber installed at startup.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Telemetry configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct TelemetryConfig {
    /// Default log level; `RUST_LOG` takes precedence when set.
    #[serde(default = "default_level")]
    #[validate(custom(function = validation::validate_level))]
    pub level: String,

    /// Include thread names in log lines.
    #[serde(default = "default_true")]
    pub thread_names: bool,

    /// Emit ANSI colour codes.
    #[serde(default = "default_true")]
    pub ansi: bool,
}

fn default_level() -> String {
    "info".into()
}

fn default_true() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            thread_names: default_true(),
            ansi: default_true(),
        }
    }
}
