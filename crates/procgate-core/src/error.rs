//! # Error Types
//!
//! Every command resolves to either a non-negative result or exactly one of
//! these errors, returned at the single call boundary.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages. At the device boundary each variant collapses to a
//! negative errno (see [`GateError::as_return_code`]).

use thiserror::Error;

use crate::host::Errno;
use crate::types::ProcessId;

/// Main error type for service operations
///
/// ## Error Categories
///
/// 1. **Request errors**: InvalidArgument, NotSupported
/// 2. **Boundary errors**: Fault (copy across the caller/service boundary failed)
/// 3. **Target errors**: NotFound, Io
/// 4. **Resource errors**: OutOfMemory
///
/// None of these mutate shared service state. A short transfer is never an
/// error; callers compare the returned count against what they asked for.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError
{
    /// Malformed request: size, process id, buffer pointer, mouse delta, key
    /// code or wire version out of range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Copying a payload or data buffer from or to the caller failed
    ///
    /// For reads this is reported even when bytes were already pulled out of
    /// the target; those bytes are discarded.
    #[error("Bad address: {0}")]
    Fault(String),

    /// The process id does not name a live process with a user address space
    #[error("Process not found: PID {0}")]
    NotFound(ProcessId),

    /// The scratch buffer for a transfer could not be allocated
    #[error("Out of memory: could not allocate {0} byte scratch buffer")]
    OutOfMemory(usize),

    /// The transfer primitive moved zero bytes on the first chunk
    ///
    /// `errno` is the primitive's own error code when it reported one, or
    /// `EIO` when it simply returned zero.
    #[error("I/O error transferring memory (errno {errno})")]
    Io
    {
        /// Positive errno value reported for the failure
        errno: i32,
    },

    /// Unrecognized command number
    #[error("Command not supported: 0x{0:08x}")]
    NotSupported(u32),
}

impl GateError
{
    /// Positive POSIX errno for this error.
    ///
    /// ```rust
    /// use procgate_core::error::GateError;
    ///
    /// assert_eq!(GateError::NotSupported(7).errno(), libc::ENOTTY);
    /// ```
    #[must_use]
    pub fn errno(&self) -> i32
    {
        match self {
            Self::InvalidArgument(_) => libc::EINVAL,
            Self::Fault(_) => libc::EFAULT,
            Self::NotFound(_) => libc::ESRCH,
            Self::OutOfMemory(_) => libc::ENOMEM,
            Self::Io { errno } => Errno(*errno).positive(),
            Self::NotSupported(_) => libc::ENOTTY,
        }
    }

    /// Negative errno, the value returned across the device boundary.
    #[must_use]
    pub fn as_return_code(&self) -> i64
    {
        -i64::from(self.errno())
    }
}

/// Convenience type alias for `Result<T, GateError>`
///
/// ```rust
/// use procgate_core::error::GateResult;
/// fn foo() -> GateResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type GateResult<T> = std::result::Result<T, GateError>;

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_io_return_code_is_always_negative()
    {
        for errno in [libc::EPERM, -libc::EPERM, 0, i32::MIN] {
            let code = GateError::Io { errno }.as_return_code();
            assert!(code < 0, "errno {errno} became {code}");
        }
        assert_eq!(GateError::Io { errno: -libc::EPERM }.errno(), libc::EPERM);
        assert_eq!(GateError::Io { errno: 0 }.errno(), libc::EIO);
    }
}
