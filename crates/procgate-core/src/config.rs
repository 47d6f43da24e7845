//! # Service Configuration
//!
//! Limits that bound every call: the largest transfer accepted, the chunk
//! size moved under one address-space lock acquisition, and the largest
//! mouse delta accepted per axis.
//!
//! Defaults are 256 MiB, 1 MiB and 4096. They can be
//! overridden from the environment:
//!
//! - `PROCGATE_MAX_TRANSFER`: maximum request size in bytes
//! - `PROCGATE_CHUNK_SIZE`: chunk bound in bytes
//! - `PROCGATE_MOUSE_LIMIT`: maximum absolute mouse delta per axis

use std::env;

use tracing::warn;

use crate::error::{GateError, GateResult};

/// Default upper bound for one READ_MEM/WRITE_MEM request (256 MiB).
pub const DEFAULT_MAX_TRANSFER_SIZE: usize = 256 * 1024 * 1024;

/// Default chunk bound (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Default bound on `|dx|` and `|dy|` for MOUSE_MOVE.
pub const DEFAULT_MOUSE_DELTA_LIMIT: u32 = 4096;

/// Limits applied by a [`GateContext`](crate::context::GateContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig
{
    /// Largest `size` a memory request may carry
    pub max_transfer_size: usize,
    /// Largest number of bytes moved per lock acquisition
    pub chunk_size: usize,
    /// Largest accepted absolute delta on either mouse axis
    pub mouse_delta_limit: u32,
}

impl Default for GateConfig
{
    fn default() -> Self
    {
        Self {
            max_transfer_size: DEFAULT_MAX_TRANSFER_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            mouse_delta_limit: DEFAULT_MOUSE_DELTA_LIMIT,
        }
    }
}

impl GateConfig
{
    /// Defaults, overridden by any `PROCGATE_*` variables that parse.
    ///
    /// Unparseable values are logged and ignored. The result still has to pass
    /// [`GateConfig::validate`], which `GateContext::init` runs.
    #[must_use]
    pub fn from_env() -> Self
    {
        let defaults = Self::default();
        Self {
            max_transfer_size: env_override("PROCGATE_MAX_TRANSFER", defaults.max_transfer_size),
            chunk_size: env_override("PROCGATE_CHUNK_SIZE", defaults.chunk_size),
            mouse_delta_limit: env_override("PROCGATE_MOUSE_LIMIT", defaults.mouse_delta_limit),
        }
    }

    /// Builder-style override of the chunk bound.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self
    {
        self.chunk_size = chunk_size;
        self
    }

    /// Builder-style override of the maximum transfer size.
    #[must_use]
    pub fn with_max_transfer_size(mut self, max_transfer_size: usize) -> Self
    {
        self.max_transfer_size = max_transfer_size;
        self
    }

    /// Check the limits are usable together.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if either size is zero or the chunk bound exceeds the
    /// maximum transfer size.
    pub fn validate(&self) -> GateResult<()>
    {
        if self.max_transfer_size == 0 {
            return Err(GateError::InvalidArgument("max_transfer_size must be non-zero".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(GateError::InvalidArgument("chunk_size must be non-zero".to_string()));
        }
        if self.chunk_size > self.max_transfer_size {
            return Err(GateError::InvalidArgument(format!(
                "chunk_size {} exceeds max_transfer_size {}",
                self.chunk_size, self.max_transfer_size
            )));
        }
        Ok(())
    }
}

fn env_override<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, "ignoring unparseable configuration value");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_defaults_are_valid()
    {
        let config = GateConfig::default();
        assert_eq!(config.max_transfer_size, 256 * 1024 * 1024);
        assert_eq!(config.chunk_size, 1024 * 1024);
        assert_eq!(config.mouse_delta_limit, 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_and_inverted_limits()
    {
        assert!(GateConfig::default().with_chunk_size(0).validate().is_err());
        assert!(GateConfig::default().with_max_transfer_size(0).validate().is_err());
        let inverted = GateConfig::default().with_max_transfer_size(64).with_chunk_size(128);
        assert!(matches!(inverted.validate(), Err(GateError::InvalidArgument(_))));
    }

    #[test]
    fn test_env_override_falls_back_on_garbage()
    {
        assert_eq!(env_override("PROCGATE_TEST_UNSET_VARIABLE", 17usize), 17);
    }
}
