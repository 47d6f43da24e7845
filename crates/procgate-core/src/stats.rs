//! Per-context counters.
//!
//! Plain relaxed atomics: they are diagnostics, nothing synchronizes on them.
//! The "live" counters let tests check resource discipline, e.g. that no
//! scratch buffer or process handle outlives the call that created it.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters owned by one [`GateContext`](crate::context::GateContext)
#[derive(Debug, Default)]
pub struct ServiceStats
{
    commands: AtomicU64,
    rejected: AtomicU64,
    scratch_allocated: AtomicU64,
    scratch_live: AtomicUsize,
    handles_acquired: AtomicU64,
    handles_live: AtomicUsize,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    input_frames: AtomicU64,
}

/// Point-in-time copy of [`ServiceStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot
{
    /// Commands received, recognized or not
    pub commands: u64,
    /// Requests refused by validation
    pub rejected: u64,
    /// Scratch buffers allocated so far
    pub scratch_allocated: u64,
    /// Scratch buffers currently allocated
    pub scratch_live: usize,
    /// Process handles acquired so far
    pub handles_acquired: u64,
    /// Process handles currently held
    pub handles_live: usize,
    /// Bytes returned by successful READ_MEM calls
    pub bytes_read: u64,
    /// Bytes reported by successful WRITE_MEM calls
    pub bytes_written: u64,
    /// Input frames emitted
    pub input_frames: u64,
}

impl ServiceStats
{
    pub(crate) fn command(&self)
    {
        self.commands.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn rejected(&self)
    {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn scratch_allocated(&self)
    {
        self.scratch_allocated.fetch_add(1, Ordering::Relaxed);
        self.scratch_live.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn scratch_freed(&self)
    {
        self.scratch_live.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn handle_acquired(&self)
    {
        self.handles_acquired.fetch_add(1, Ordering::Relaxed);
        self.handles_live.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn handle_released(&self)
    {
        self.handles_live.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn transferred(&self, direction: crate::types::TransferDirection, bytes: usize)
    {
        let counter = match direction {
            crate::types::TransferDirection::Read => &self.bytes_read,
            crate::types::TransferDirection::Write => &self.bytes_written,
        };
        counter.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn input_frame(&self)
    {
        self.input_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot
    {
        StatsSnapshot {
            commands: self.commands.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            scratch_allocated: self.scratch_allocated.load(Ordering::Relaxed),
            scratch_live: self.scratch_live.load(Ordering::Relaxed),
            handles_acquired: self.handles_acquired.load(Ordering::Relaxed),
            handles_live: self.handles_live.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            input_frames: self.input_frames.load(Ordering::Relaxed),
        }
    }
}
