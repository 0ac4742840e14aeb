// vakthund-config/src/validation.rs
//! Custom validation functions for configuration.
//!
//! Provides shared validation logic used across multiple configuration modules.

use std::borrow::Borrow;

use validator::ValidationError;

/// Largest alignment accepted for guarded aligned buffers (one page).
pub const MAX_ALIGNMENT: usize = 4096;

/// Validate that a given value is a power of two.
pub fn validate_power_of_two<T: Borrow<usize>>(value: T) -> Result<(), ValidationError> {
    if value.borrow().is_power_of_two() {
        Ok(())
    } else {
        Err(ValidationError::new("must_be_power_of_two"))
    }
}

/// Validate an alignment for the aligned allocator back ends.
///
/// POSIX `posix_memalign` additionally requires a multiple of the pointer size.
pub fn validate_alignment<T: Borrow<usize>>(value: T) -> Result<(), ValidationError> {
    let value = *value.borrow();
    validate_power_of_two(value)?;
    if value < std::mem::size_of::<*const ()>() || value > MAX_ALIGNMENT {
        return Err(ValidationError::new("alignment_out_of_range"));
    }
    Ok(())
}

/// Validate a log level name.
pub fn validate_level(level: &str) -> Result<(), ValidationError> {
    let re = regex::Regex::new("^(trace|debug|info|warn|error)$")
        .map_err(|_| ValidationError::new("invalid_regex"))?;
    if re.is_match(&level.to_lowercase()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}
