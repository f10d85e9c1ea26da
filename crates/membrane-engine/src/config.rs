//! Session configuration and validation.

use membrane_core::ConfigError;
use membrane_memory::MAX_ALIGN;

/// Configuration for a [`Session`](crate::Session).
///
/// The scratch region holds every argument buffer of one operation at
/// once: batched evaluation inputs, loss data sets, encoded strings. Size
/// it for the largest call; running out is reported as
/// [`BridgeError::ResourceExhausted`](membrane_core::BridgeError::ResourceExhausted),
/// never retried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Scratch region size in bytes. Default: 1 MiB.
    pub scratch_bytes: u32,
    /// Scratch allocation alignment in bytes. Power of two, at most
    /// 4096. Default: 16.
    pub scratch_align: u32,
}

impl SessionConfig {
    /// Default scratch region size.
    pub const DEFAULT_SCRATCH_BYTES: u32 = 1 << 20;
    /// Default scratch alignment.
    pub const DEFAULT_SCRATCH_ALIGN: u32 = 16;

    /// Check the configuration before any engine memory is reserved.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.scratch_align.is_power_of_two() || self.scratch_align > MAX_ALIGN {
            return Err(ConfigError::InvalidAlignment {
                align: self.scratch_align,
            });
        }
        if self.scratch_bytes < self.scratch_align {
            return Err(ConfigError::ScratchTooSmall {
                bytes: self.scratch_bytes,
                minimum: self.scratch_align,
            });
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scratch_bytes: Self::DEFAULT_SCRATCH_BYTES,
            scratch_align: Self::DEFAULT_SCRATCH_ALIGN,
        }
    }
}
