//! # Memory Transfer Engine
//!
//! Moves bytes between a caller buffer and a target process in bounded
//! chunks.
//!
//! ## Call sequence
//!
//! 1. Allocate a scratch buffer of exactly `size` bytes (`OutOfMemory`)
//! 2. For writes, fill it from the caller (`Fault`)
//! 3. Resolve the target ([`ProcessResolver`], `NotFound`)
//! 4. Walk `[address, address + size)` chunk by chunk, each chunk under its
//!    own shared acquisition of the target's mapping lock
//! 5. Release the process handle
//! 6. For reads, copy the bytes that arrived back to the caller (`Fault`)
//!
//! ## Chunk outcomes
//!
//! The walk is a fold over chunk boundaries producing a [`ChunkStep`]:
//!
//! | Primitive result | Nothing moved yet | Some bytes moved |
//! |---|---|---|
//! | error or `0` | `FailedAt(Io)` | `CompletedWithTotal(so_far)` |
//! | `0 < k < chunk` | `CompletedWithTotal(k)` | `CompletedWithTotal(so_far + k)` |
//! | `k == chunk` | `Continuing(k)` | `Continuing(so_far + k)` |
//!
//! A short total is a successful result, not an error. Nothing is retried and
//! nothing is atomic: a concurrent `munmap` in the target can shorten a
//! transfer.

use std::ops::{ControlFlow, Range};

use tracing::{debug, trace, warn};

use crate::error::{GateError, GateResult};
use crate::host::{Errno, UserMemory};
use crate::resolver::ProcessResolver;
use crate::stats::ServiceStats;
use crate::types::{Address, ProcessId, TransferDirection, UserPtr};

/// State of a transfer after a chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkStep
{
    /// Every chunk so far moved in full
    Continuing(usize),
    /// The transfer is over and moved this many bytes
    CompletedWithTotal(usize),
    /// The transfer failed; `transferred` bytes had moved when it did
    FailedAt
    {
        /// Error reported to the caller
        error: GateError,
        /// Bytes moved between target and scratch before the failure
        transferred: usize,
    },
}

impl ChunkStep
{
    /// Result reported to the caller.
    ///
    /// ## Errors
    ///
    /// The error of a `FailedAt` step.
    pub fn into_result(self) -> GateResult<usize>
    {
        match self {
            Self::Continuing(total) | Self::CompletedWithTotal(total) => Ok(total),
            Self::FailedAt { error, .. } => Err(error),
        }
    }

    fn failed(error: GateError) -> Self
    {
        Self::FailedAt { error, transferred: 0 }
    }
}

/// One slice of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk
{
    /// Offset from the start of the transfer
    pub offset: usize,
    /// Bytes in this chunk
    pub len: usize,
}

impl Chunk
{
    /// Range within the scratch buffer.
    #[must_use]
    pub fn range(&self) -> Range<usize>
    {
        self.offset..self.offset + self.len
    }
}

/// Split `total` bytes into chunks of at most `chunk_size`.
///
/// ```rust
/// use procgate_core::transfer::chunk_spans;
///
/// let lens: Vec<usize> = chunk_spans(10, 4).map(|chunk| chunk.len).collect();
/// assert_eq!(lens, [4, 4, 2]);
/// ```
pub fn chunk_spans(total: usize, chunk_size: usize) -> impl Iterator<Item = Chunk>
{
    let step = chunk_size.max(1);
    (0..total).step_by(step).map(move |offset| Chunk {
        offset,
        len: step.min(total - offset),
    })
}

/// Fold one primitive result into the running step.
fn classify(done: usize, requested: usize, moved: Result<usize, Errno>) -> ControlFlow<ChunkStep, ChunkStep>
{
    match moved {
        Ok(0) | Err(_) if done > 0 => ControlFlow::Break(ChunkStep::CompletedWithTotal(done)),
        Ok(0) => ControlFlow::Break(ChunkStep::failed(GateError::Io { errno: libc::EIO })),
        Err(errno) => ControlFlow::Break(ChunkStep::failed(GateError::Io { errno: errno.positive() })),
        Ok(count) if count < requested => ControlFlow::Break(ChunkStep::CompletedWithTotal(done + count)),
        Ok(_) => ControlFlow::Continue(ChunkStep::Continuing(done + requested)),
    }
}

/// Scratch buffer sized exactly to one request, freed on drop
pub struct ScratchBuffer<'s>
{
    bytes: Vec<u8>,
    stats: &'s ServiceStats,
}

impl<'s> ScratchBuffer<'s>
{
    /// Allocate `size` zeroed bytes.
    ///
    /// ## Errors
    ///
    /// `OutOfMemory` if the allocation cannot be satisfied.
    pub fn allocate(size: usize, stats: &'s ServiceStats) -> GateResult<Self>
    {
        let mut bytes = Vec::new();
        if bytes.try_reserve_exact(size).is_err() {
            warn!(size, "could not allocate scratch buffer");
            return Err(GateError::OutOfMemory(size));
        }
        bytes.resize(size, 0);
        stats.scratch_allocated();
        Ok(Self { bytes, stats })
    }

    /// Buffer length (the request size).
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.bytes.len()
    }

    /// `true` for a zero-sized buffer (never produced by validated requests).
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.bytes.is_empty()
    }

    /// The bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8]
    {
        &self.bytes
    }

    /// The bytes, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8]
    {
        &mut self.bytes
    }
}

impl Drop for ScratchBuffer<'_>
{
    fn drop(&mut self)
    {
        self.stats.scratch_freed();
    }
}

/// A validated memory command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest
{
    /// Target process
    pub pid: ProcessId,
    /// Start of the range in the target
    pub address: Address,
    /// Bytes to move (already bounded by the validator)
    pub size: usize,
    /// Caller buffer
    pub buffer: UserPtr,
    /// Read from or write to the target
    pub direction: TransferDirection,
}

/// Chunked cross-process copy
pub struct TransferEngine<'a>
{
    resolver: ProcessResolver<'a>,
    chunk_size: usize,
    stats: &'a ServiceStats,
}

impl<'a> TransferEngine<'a>
{
    /// Engine moving at most `chunk_size` bytes per lock acquisition.
    #[must_use]
    pub fn new(resolver: ProcessResolver<'a>, chunk_size: usize, stats: &'a ServiceStats) -> Self
    {
        Self {
            resolver,
            chunk_size: chunk_size.max(1),
            stats,
        }
    }

    /// Run a complete memory command against the caller's memory.
    ///
    /// Returns the number of bytes moved, which may be less than
    /// `request.size`.
    ///
    /// ## Errors
    ///
    /// - `OutOfMemory`: scratch buffer allocation failed
    /// - `Fault`: copying from (write) or to (read) the caller failed
    /// - `NotFound`: the target is gone or has no address space
    /// - `Io`: the first chunk moved nothing
    pub fn execute(&self, caller: &dyn UserMemory, request: &TransferRequest) -> GateResult<usize>
    {
        let mut scratch = ScratchBuffer::allocate(request.size, self.stats)?;

        if request.direction == TransferDirection::Write {
            if let Err(errno) = caller.copy_from_user(request.buffer, scratch.as_mut_slice()) {
                warn!(buffer = %request.buffer, errno = errno.0, "failed to copy buffer from user space");
                return Err(GateError::Fault(format!("could not read caller buffer at {}", request.buffer)));
            }
        }

        let step = match self.transfer(request, scratch.as_mut_slice()) {
            ChunkStep::CompletedWithTotal(total) if request.direction == TransferDirection::Read => {
                self.copy_out(caller, request.buffer, &scratch.as_slice()[..total])
            }
            step => step,
        };

        let total = step.into_result()?;
        self.stats.transferred(request.direction, total);
        debug!(
            pid = request.pid.raw(),
            direction = %request.direction,
            requested = request.size,
            total,
            "memory transfer finished"
        );
        Ok(total)
    }

    /// Move bytes between the target and `scratch`, returning the final
    /// step: `CompletedWithTotal` or `FailedAt`.
    ///
    /// For writes `scratch` holds the source bytes; for reads it receives
    /// them. The process handle is taken here and released before returning.
    pub fn transfer(&self, request: &TransferRequest, scratch: &mut [u8]) -> ChunkStep
    {
        let handle = match self.resolver.resolve(request.pid) {
            Ok(handle) => handle,
            Err(error) => return ChunkStep::failed(error),
        };
        let space = match handle.address_space() {
            Ok(space) => space,
            Err(error) => return ChunkStep::failed(error),
        };

        let flow = chunk_spans(scratch.len(), self.chunk_size).try_fold(ChunkStep::Continuing(0), |step, chunk| {
            let ChunkStep::Continuing(done) = step else {
                return ControlFlow::Break(step);
            };
            let addr = request.address + chunk.offset as u64;
            let slice = &mut scratch[chunk.range()];

            let moved = {
                let mapping = space.lock_shared();
                match request.direction {
                    TransferDirection::Read => mapping.read(addr, slice),
                    TransferDirection::Write => mapping.write(addr, slice, true),
                }
            };
            trace!(pid = request.pid.raw(), %addr, len = chunk.len, ?moved, "chunk transferred");

            classify(done, chunk.len, moved)
        });

        drop(space);
        drop(handle);

        match flow {
            ControlFlow::Continue(ChunkStep::Continuing(total)) => ChunkStep::CompletedWithTotal(total),
            ControlFlow::Continue(step) | ControlFlow::Break(step) => step,
        }
    }

    /// Copy read bytes back to the caller, chunk by chunk at matching offsets.
    fn copy_out(&self, caller: &dyn UserMemory, buffer: UserPtr, bytes: &[u8]) -> ChunkStep
    {
        for chunk in chunk_spans(bytes.len(), self.chunk_size) {
            let dst = buffer.checked_add(chunk.offset as u64);
            let copied = dst.map_or(Err(Errno::EFAULT), |dst| caller.copy_to_user(dst, &bytes[chunk.range()]));
            if let Err(errno) = copied {
                warn!(%buffer, offset = chunk.offset, errno = errno.0, "failed to copy buffer to user space");
                return ChunkStep::FailedAt {
                    error: GateError::Fault(format!("could not write caller buffer at {buffer}")),
                    transferred: bytes.len(),
                };
            }
        }
        ChunkStep::CompletedWithTotal(bytes.len())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_chunk_spans_cover_range()
    {
        let chunks: Vec<Chunk> = chunk_spans(10, 4).collect();
        assert_eq!(
            chunks,
            [
                Chunk { offset: 0, len: 4 },
                Chunk { offset: 4, len: 4 },
                Chunk { offset: 8, len: 2 }
            ]
        );
        assert_eq!(chunk_spans(8, 4).count(), 2);
        assert_eq!(chunk_spans(3, 1024).count(), 1);
        assert_eq!(chunk_spans(0, 4).count(), 0);
    }

    #[test]
    fn test_classify_full_chunk_continues()
    {
        assert_eq!(classify(0, 4, Ok(4)), ControlFlow::Continue(ChunkStep::Continuing(4)));
        assert_eq!(classify(8, 4, Ok(4)), ControlFlow::Continue(ChunkStep::Continuing(12)));
    }

    #[test]
    fn test_classify_short_chunk_completes()
    {
        assert_eq!(classify(0, 4, Ok(3)), ControlFlow::Break(ChunkStep::CompletedWithTotal(3)));
        assert_eq!(classify(8, 4, Ok(1)), ControlFlow::Break(ChunkStep::CompletedWithTotal(9)));
    }

    #[test]
    fn test_classify_nothing_moved()
    {
        assert_eq!(
            classify(0, 4, Ok(0)),
            ControlFlow::Break(ChunkStep::FailedAt {
                error: GateError::Io { errno: libc::EIO },
                transferred: 0
            })
        );
        assert_eq!(
            classify(0, 4, Err(Errno(libc::EPERM))),
            ControlFlow::Break(ChunkStep::FailedAt {
                error: GateError::Io { errno: libc::EPERM },
                transferred: 0
            })
        );
        assert_eq!(classify(4, 4, Ok(0)), ControlFlow::Break(ChunkStep::CompletedWithTotal(4)));
        assert_eq!(
            classify(4, 4, Err(Errno(libc::EPERM))),
            ControlFlow::Break(ChunkStep::CompletedWithTotal(4))
        );
    }

    #[test]
    fn test_classify_kernel_style_error_codes()
    {
        let io = |errno| {
            ControlFlow::Break(ChunkStep::FailedAt {
                error: GateError::Io { errno },
                transferred: 0,
            })
        };
        assert_eq!(classify(0, 4, Err(Errno(-libc::EFAULT))), io(libc::EFAULT));
        assert_eq!(classify(0, 4, Err(Errno(0))), io(libc::EIO));
        assert_eq!(classify(0, 4, Err(Errno(i32::MIN))), io(libc::EIO));
    }

    #[test]
    fn test_scratch_buffer_accounting()
    {
        let stats = ServiceStats::default();
        let scratch = ScratchBuffer::allocate(16, &stats).unwrap();
        assert_eq!(scratch.len(), 16);
        assert_eq!(stats.snapshot().scratch_live, 1);
        drop(scratch);
        assert_eq!(stats.snapshot().scratch_live, 0);
        assert_eq!(stats.snapshot().scratch_allocated, 1);
    }

    #[test]
    fn test_step_into_result()
    {
        assert_eq!(ChunkStep::CompletedWithTotal(7).into_result(), Ok(7));
        assert_eq!(
            ChunkStep::FailedAt {
                error: GateError::Fault("x".to_string()),
                transferred: 3
            }
            .into_result(),
            Err(GateError::Fault("x".to_string()))
        );
    }
}
