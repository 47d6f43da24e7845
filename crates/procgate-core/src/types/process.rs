//! Process identity and transfer direction.

use std::fmt;

/// Process identifier (PID)
///
/// Signed, as on the wire and in the host's process table. Only positive
/// values can name a process; the validator rejects the rest before any
/// resource is touched.
///
/// ## Example
///
/// ```rust
/// use procgate_core::types::ProcessId;
///
/// let pid = ProcessId::from(4242);
/// assert!(pid.is_valid());
/// assert!(!ProcessId::from(0).is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub i32);

impl ProcessId
{
    /// Raw numeric value.
    #[must_use]
    pub const fn raw(self) -> i32
    {
        self.0
    }

    /// `true` for ids the host can actually assign (strictly positive).
    #[must_use]
    pub const fn is_valid(self) -> bool
    {
        self.0 > 0
    }
}

impl From<i32> for ProcessId
{
    fn from(pid: i32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for i32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Which way bytes move relative to the target process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferDirection
{
    /// Target memory → caller buffer
    Read,
    /// Caller buffer → target memory (forced, ignores page protection)
    Write,
}

impl fmt::Display for TransferDirection
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}
