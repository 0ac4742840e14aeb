//! Memory guard configuration.
//!
//! Parameters consumed by the guarded allocation layer:
//! - Exit status of the fatal out-of-memory path during initialization
//! - Default alignment for SIMD-friendly buffers

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Guarded allocator configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct MemoryConfig {
    /// Process exit status when an allocation fails before the engine is running.
    #[serde(default = "default_exit_code")]
    #[validate(range(min = 1, max = 255))]
    pub fatal_exit_code: i32,

    /// Alignment (bytes) of buffers handed out by `simd_buffer`.
    #[serde(default = "default_simd_alignment")]
    #[validate(custom(function = validation::validate_alignment))]
    pub simd_alignment: usize,
}

fn default_exit_code() -> i32 {
    1
}

fn default_simd_alignment() -> usize {
    64 // One cache line; covers AVX-512 loads.
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            fatal_exit_code: default_exit_code(),
            simd_alignment: default_simd_alignment(),
        }
    }
}
