//! # Host Collaborators
//!
//! The service core never touches a process table, a memory map, or an input
//! device directly. It goes through these traits, which the host supplies:
//!
//! - **[`ProcessTable`]**: read-side traversal of live processes
//! - **[`ExecutionContext`]**: a durably referenced live process
//! - **[`AddressSpace`]**: a process's memory map and its shared lock
//! - **[`UserMemory`]**: checked copies to and from the calling process
//! - **[`InputDevice`]**: the registered virtual input device
//!
//! Two hosts ship with the crate: [`memory`], a fully in-memory host used by
//! the tests, and `platform::linux`, which uses procfs.
//!
//! ## Reference discipline
//!
//! Lookups follow the kernel pattern of a short read-side critical section:
//!
//! ```text
//! traverse()  ──►  find(pid)  ──►  pin()  ──►  drop entry, drop traversal
//! (protection)     (ephemeral)     (durable)
//! ```
//!
//! The ephemeral [`TaskEntry`] borrows from the [`TableTraversal`], so it is a
//! compile error to keep using it after the traversal is gone. The durable
//! reference returned by [`TaskEntry::pin`] is an `Arc` and outlives both.

pub mod memory;

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::input::{DeviceCapabilities, InputEvent};
use crate::types::{Address, ProcessId, UserPtr};

/// Raw error code reported by a host primitive
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[error("host error (errno {0})")]
pub struct Errno(pub i32);

impl Errno
{
    /// Generic I/O failure
    pub const EIO: Errno = Errno(libc::EIO);
    /// Bad address
    pub const EFAULT: Errno = Errno(libc::EFAULT);
    /// Address range overlaps an existing mapping
    pub const EEXIST: Errno = Errno(libc::EEXIST);

    /// The code as a positive errno.
    ///
    /// Primitives that follow the kernel convention hand back a negated
    /// code. Zero, or a value with no positive counterpart, becomes `EIO`.
    ///
    /// ```rust
    /// use procgate_core::host::Errno;
    ///
    /// assert_eq!(Errno(-libc::EPERM).positive(), libc::EPERM);
    /// assert_eq!(Errno(0).positive(), libc::EIO);
    /// ```
    #[must_use]
    pub fn positive(self) -> i32
    {
        match self.0 {
            code if code > 0 => code,
            code => code.checked_neg().filter(|code| *code > 0).unwrap_or(libc::EIO),
        }
    }
}

impl From<io::Error> for Errno
{
    fn from(error: io::Error) -> Self
    {
        Errno(error.raw_os_error().unwrap_or(libc::EIO))
    }
}

/// Host process table
pub trait ProcessTable: Send + Sync
{
    /// Enter a read-only, non-blocking traversal of the table.
    ///
    /// Entries found through the traversal are only valid while it lives.
    fn traverse(&self) -> Box<dyn TableTraversal + '_>;
}

/// Read-side protection over the process table (an RCU read section on a
/// real kernel)
pub trait TableTraversal
{
    /// Look up a process by id, returning an ephemeral reference.
    fn find(&self, pid: ProcessId) -> Option<Box<dyn TaskEntry + '_>>;
}

/// Ephemeral reference to a process, valid only inside a traversal
pub trait TaskEntry
{
    /// Take a durable reference to the process's execution context.
    ///
    /// This increments the context's lifetime counter. It has to happen
    /// before the traversal ends, which the entry's borrow guarantees.
    fn pin(&self) -> Arc<dyn ExecutionContext>;
}

/// A live process, held through a durable reference
pub trait ExecutionContext: Send + Sync
{
    /// Id the process was resolved by.
    fn pid(&self) -> ProcessId;

    /// The process's user address space, or `None` for contexts without one
    /// (kernel threads, processes that are exiting).
    fn address_space(&self) -> Option<Arc<dyn AddressSpace>>;
}

/// A process's memory map
pub trait AddressSpace: Send + Sync
{
    /// Acquire the address-space lock in shared mode.
    ///
    /// Structural changes to the mappings are excluded while the guard lives.
    fn lock_shared(&self) -> Box<dyn MappingGuard + '_>;
}

/// Access to a memory map under its shared lock
///
/// Both primitives behave like partial I/O: they return how many bytes were
/// moved starting at `addr`, stopping early at the first page they cannot
/// access. `Ok(0)` and `Err(_)` both mean nothing was moved.
pub trait MappingGuard
{
    /// Pull bytes from the target into `buf` (unforced).
    ///
    /// ## Errors
    ///
    /// The host's error code when the access fails before moving anything.
    fn read(&self, addr: Address, buf: &mut [u8]) -> Result<usize, Errno>;

    /// Push `data` into the target.
    ///
    /// With `force` set, page protection is bypassed so read-only mappings
    /// can be written.
    ///
    /// ## Errors
    ///
    /// The host's error code when the access fails before moving anything.
    fn write(&self, addr: Address, data: &[u8], force: bool) -> Result<usize, Errno>;
}

/// The calling process's memory, seen from the service
///
/// Copies are all-or-nothing.
pub trait UserMemory
{
    /// Fill `dst` from the caller's memory at `src`.
    ///
    /// ## Errors
    ///
    /// Any error means `dst` may be partially filled and must be discarded.
    fn copy_from_user(&self, src: UserPtr, dst: &mut [u8]) -> Result<(), Errno>;

    /// Copy `src` into the caller's memory at `dst`.
    ///
    /// ## Errors
    ///
    /// Any error means the caller's buffer may be partially written.
    fn copy_to_user(&self, dst: UserPtr, src: &[u8]) -> Result<(), Errno>;
}

/// A registered virtual input device
///
/// Created and destroyed outside the service; the service only emits.
pub trait InputDevice: Send + Sync
{
    /// What the device declared at registration.
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Deliver one frame of events.
    ///
    /// A frame ends with a synchronization event and must reach consumers as
    /// a unit; implementations must not interleave two frames.
    fn emit_frame(&self, frame: &[InputEvent]);
}
