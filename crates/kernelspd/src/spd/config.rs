//! SPD protocol limits.

use super::boundary::BOUNDARY_LENGTH_MAX;
use super::command::{COMMAND_BYTECOUNT_MAX, COMMAND_HDRLEN};
use super::validation::{Validatable, ValidationResult};

/// Limits applied to control-channel input.
///
/// # Example
///
/// ```
/// use kernelspd::spd::SpdConfig;
///
/// let config = SpdConfig::new()
///     .command_bytecount_max(64 * 1024)
///     .boundary_length_max(512);
/// assert_eq!(config.get_boundary_length_max(), 512);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpdConfig {
    command_bytecount_max: u32,
    boundary_length_max: usize,
}

impl Default for SpdConfig {
    fn default() -> Self {
        Self {
            command_bytecount_max: COMMAND_BYTECOUNT_MAX,
            boundary_length_max: BOUNDARY_LENGTH_MAX,
        }
    }
}

impl SpdConfig {
    /// Create a config with the default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the largest bytecount a single command may declare.
    pub fn command_bytecount_max(mut self, max: u32) -> Self {
        self.command_bytecount_max = max;
        self
    }

    /// Set the longest boundary specification accepted.
    pub fn boundary_length_max(mut self, max: usize) -> Self {
        self.boundary_length_max = max;
        self
    }

    pub fn get_command_bytecount_max(&self) -> u32 {
        self.command_bytecount_max
    }

    pub fn get_boundary_length_max(&self) -> usize {
        self.boundary_length_max
    }
}

impl Validatable for SpdConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if (self.command_bytecount_max as usize) < COMMAND_HDRLEN {
            result.error(
                "command_bytecount_max",
                format!("must be at least the {} byte command header", COMMAND_HDRLEN),
            );
        }
        if self.command_bytecount_max > COMMAND_BYTECOUNT_MAX {
            result.warning(
                "command_bytecount_max",
                format!("above the protocol ceiling {:#x}", COMMAND_BYTECOUNT_MAX),
            );
        }
        if self.boundary_length_max == 0 {
            result.error("boundary_length_max", "must allow a non-empty boundary");
        }
        if (self.command_bytecount_max as usize) < COMMAND_HDRLEN + self.boundary_length_max {
            result.warning(
                "boundary_length_max",
                "longer than any command payload can carry",
            );
        }

        result
    }
}
