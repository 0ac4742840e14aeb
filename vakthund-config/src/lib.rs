//! # Vakthund Configuration System
//!
//! Hierarchical configuration for the guarded memory layer and its logging sink.
//!
//! ## Features
//! - **Unified Configuration**: Single source of truth across all components
//! - **Validation**: Runtime validation of critical parameters
//! - **Environment Awareness**: `VAKTHUND_*` overrides on top of YAML files

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod error;
mod memory;
mod telemetry;
pub mod validation;

pub use error::ConfigError;
pub use memory::MemoryConfig;
pub use telemetry::TelemetryConfig;

/// Top‑level configuration container for all Vakthund components.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct VakthundConfig {
    /// Guarded allocator parameters.
    #[serde(default)]
    #[validate(nested)]
    pub memory: MemoryConfig,

    /// Logging sink parameters.
    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl VakthundConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default Values
    /// 2. `config/vakthund.yaml` - Base Vakthund settings. If missing, defaults are used.
    /// 3. `config/<environment>.yaml` - Environment‑specific overrides.
    /// 4. `VAKTHUND_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(VakthundConfig::default()));

        if Path::new("config/vakthund.yaml").exists() {
            figment = figment.merge(Yaml::file("config/vakthund.yaml"));
        }

        let env = std::env::var("VAKTHUND_ENV").unwrap_or_else(|_| "production".into());
        let env_file = format!("config/{}.yaml", env);
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        Self::finish(figment)
    }

    /// Load configuration from a specific path for testing/validation.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let figment = Figment::from(Serialized::defaults(VakthundConfig::default()))
            .merge(Yaml::file(path));
        Self::finish(figment)
    }

    fn finish(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed("VAKTHUND_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}
