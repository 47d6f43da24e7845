//! # In-Memory Host
//!
//! A complete host that lives in ordinary heap memory: a process table,
//! sparse address spaces made of mapped regions, and a recording input
//! device. It behaves like the kernel primitives the service is written
//! against:
//!
//! - reads and writes are partial I/O that stop at the first unmapped byte
//!   and return `Ok(0)` when nothing could be moved
//! - unforced writes stop at read-only regions, forced writes do not
//! - the mapping lock is a real `RwLock`, so structural changes
//!   ([`MemoryAddressSpace::lock_exclusive`]) wait for in-flight chunks
//!
//! Tests can also inject a one-shot error into a specific access, run a hook
//! just before a specific shared lock acquisition, and count how often the
//! shared lock was taken.
//!
//! ## Example
//!
//! ```rust
//! use procgate_core::host::memory::MemoryHost;
//! use procgate_core::types::Address;
//!
//! let host = MemoryHost::new();
//! let process = host.spawn();
//! let space = process.space().unwrap();
//! space.map_bytes(Address::new(0x1000), b"hello", true).unwrap();
//! assert_eq!(space.peek(Address::new(0x1001), 3).unwrap(), b"ell");
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{
    AddressSpace, Errno, ExecutionContext, InputDevice, MappingGuard, ProcessTable, TableTraversal, TaskEntry,
    UserMemory,
};
use crate::input::{DeviceCapabilities, InputEvent, InputFrame};
use crate::types::{Address, ProcessId, UserPtr};

const FIRST_PID: i32 = 100;

type LockHook = Box<dyn FnOnce() + Send>;

/// In-memory process table
pub struct MemoryHost
{
    processes: RwLock<HashMap<ProcessId, Arc<MemoryProcess>>>,
    next_pid: AtomicI32,
}

impl Default for MemoryHost
{
    fn default() -> Self
    {
        Self {
            processes: RwLock::new(HashMap::new()),
            next_pid: AtomicI32::new(FIRST_PID),
        }
    }
}

impl MemoryHost
{
    /// Empty process table.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    fn insert(&self, space: Option<Arc<MemoryAddressSpace>>) -> Arc<MemoryProcess>
    {
        let pid = ProcessId(self.next_pid.fetch_add(1, Ordering::Relaxed));
        let process = Arc::new(MemoryProcess { pid, space });
        self.processes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pid, Arc::clone(&process));
        process
    }

    /// Start a process with an empty address space.
    pub fn spawn(&self) -> Arc<MemoryProcess>
    {
        self.insert(Some(Arc::new(MemoryAddressSpace::new())))
    }

    /// Start a process that has no user address space.
    pub fn spawn_kernel_thread(&self) -> Arc<MemoryProcess>
    {
        self.insert(None)
    }

    /// Remove a process from the table. Outstanding references keep it alive.
    pub fn reap(&self, pid: ProcessId) -> Option<Arc<MemoryProcess>>
    {
        self.processes.write().unwrap_or_else(PoisonError::into_inner).remove(&pid)
    }

    /// Look a process up outside of any service call.
    #[must_use]
    pub fn process(&self, pid: ProcessId) -> Option<Arc<MemoryProcess>>
    {
        self.processes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&pid)
            .cloned()
    }
}

impl ProcessTable for MemoryHost
{
    fn traverse(&self) -> Box<dyn TableTraversal + '_>
    {
        Box::new(MemoryTraversal {
            processes: self.processes.read().unwrap_or_else(PoisonError::into_inner),
        })
    }
}

struct MemoryTraversal<'a>
{
    processes: RwLockReadGuard<'a, HashMap<ProcessId, Arc<MemoryProcess>>>,
}

impl TableTraversal for MemoryTraversal<'_>
{
    fn find(&self, pid: ProcessId) -> Option<Box<dyn TaskEntry + '_>>
    {
        self.processes
            .get(&pid)
            .map(|process| Box::new(MemoryTaskEntry(process)) as Box<dyn TaskEntry + '_>)
    }
}

struct MemoryTaskEntry<'a>(&'a Arc<MemoryProcess>);

impl TaskEntry for MemoryTaskEntry<'_>
{
    fn pin(&self) -> Arc<dyn ExecutionContext>
    {
        Arc::clone(self.0) as Arc<dyn ExecutionContext>
    }
}

/// A process in a [`MemoryHost`]
///
/// `Arc::strong_count` on the process is its reference count: one for the
/// table, one per durable reference held elsewhere.
pub struct MemoryProcess
{
    pid: ProcessId,
    space: Option<Arc<MemoryAddressSpace>>,
}

impl MemoryProcess
{
    /// Process id.
    #[must_use]
    pub fn pid(&self) -> ProcessId
    {
        self.pid
    }

    /// Address space, absent for kernel threads.
    #[must_use]
    pub fn space(&self) -> Option<&Arc<MemoryAddressSpace>>
    {
        self.space.as_ref()
    }
}

impl ExecutionContext for MemoryProcess
{
    fn pid(&self) -> ProcessId
    {
        self.pid
    }

    fn address_space(&self) -> Option<Arc<dyn AddressSpace>>
    {
        self.space.clone().map(|space| space as Arc<dyn AddressSpace>)
    }
}

struct Region
{
    start: u64,
    len: u64,
    writable: bool,
    bytes: Mutex<Vec<u8>>,
}

impl Region
{
    fn contains(&self, addr: u64) -> bool
    {
        addr >= self.start && addr - self.start < self.len
    }

    fn overlaps(&self, start: u64, len: u64) -> bool
    {
        start < self.start.saturating_add(self.len) && self.start < start.saturating_add(len)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn read_mapped(regions: &[Region], addr: u64, buf: &mut [u8]) -> usize
{
    let mut done = 0;
    while done < buf.len() {
        let Some(cursor) = addr.checked_add(done as u64) else {
            break;
        };
        let Some(region) = regions.iter().find(|region| region.contains(cursor)) else {
            break;
        };
        let offset = (cursor - region.start) as usize;
        let bytes = region.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        let count = (bytes.len() - offset).min(buf.len() - done);
        buf[done..done + count].copy_from_slice(&bytes[offset..offset + count]);
        done += count;
    }
    done
}

#[allow(clippy::cast_possible_truncation)]
fn write_mapped(regions: &[Region], addr: u64, data: &[u8], force: bool) -> usize
{
    let mut done = 0;
    while done < data.len() {
        let Some(cursor) = addr.checked_add(done as u64) else {
            break;
        };
        let Some(region) = regions.iter().find(|region| region.contains(cursor)) else {
            break;
        };
        if !region.writable && !force {
            break;
        }
        let offset = (cursor - region.start) as usize;
        let mut bytes = region.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        let count = (bytes.len() - offset).min(data.len() - done);
        bytes[offset..offset + count].copy_from_slice(&data[done..done + count]);
        done += count;
    }
    done
}

/// Sparse address space of a [`MemoryProcess`]
#[derive(Default)]
pub struct MemoryAddressSpace
{
    regions: RwLock<Vec<Region>>,
    lock_acquisitions: AtomicUsize,
    accesses: AtomicUsize,
    fault: Mutex<Option<(usize, Errno)>>,
    before_lock: Mutex<Option<(usize, LockHook)>>,
}

impl MemoryAddressSpace
{
    /// Address space with nothing mapped.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Map `len` zeroed bytes at `start`.
    ///
    /// ## Errors
    ///
    /// `EEXIST` if the range overlaps an existing region, `EFAULT` if it wraps.
    pub fn map(&self, start: Address, len: usize, writable: bool) -> Result<(), Errno>
    {
        self.map_bytes(start, &vec![0u8; len], writable)
    }

    /// Map a copy of `bytes` at `start`.
    ///
    /// ## Errors
    ///
    /// `EEXIST` if the range overlaps an existing region, `EFAULT` if it wraps.
    pub fn map_bytes(&self, start: Address, bytes: &[u8], writable: bool) -> Result<(), Errno>
    {
        let len = bytes.len() as u64;
        if start.checked_add(len).is_none() {
            return Err(Errno::EFAULT);
        }
        let mut regions = self.regions.write().unwrap_or_else(PoisonError::into_inner);
        if regions.iter().any(|region| region.overlaps(start.value(), len)) {
            return Err(Errno::EEXIST);
        }
        regions.push(Region {
            start: start.value(),
            len,
            writable,
            bytes: Mutex::new(bytes.to_vec()),
        });
        Ok(())
    }

    /// Remove the region starting exactly at `start`. Returns whether one existed.
    pub fn unmap(&self, start: Address) -> bool
    {
        let mut regions = self.regions.write().unwrap_or_else(PoisonError::into_inner);
        let before = regions.len();
        regions.retain(|region| region.start != start.value());
        regions.len() != before
    }

    /// Read `len` bytes directly, bypassing counters and fault injection.
    /// `None` unless the whole range is mapped.
    #[must_use]
    pub fn peek(&self, addr: Address, len: usize) -> Option<Vec<u8>>
    {
        let regions = self.regions.read().unwrap_or_else(PoisonError::into_inner);
        let mut out = vec![0u8; len];
        (read_mapped(&regions, addr.value(), &mut out) == len).then_some(out)
    }

    /// How many times the shared mapping lock was taken through
    /// [`AddressSpace::lock_shared`].
    #[must_use]
    pub fn lock_acquisitions(&self) -> usize
    {
        self.lock_acquisitions.load(Ordering::Relaxed)
    }

    /// Make the access `skip` accesses from now fail with `errno`
    /// (`skip == 0` is the very next read or write through a mapping guard).
    pub fn fail_access(&self, skip: usize, errno: Errno)
    {
        let at = self.accesses.load(Ordering::Relaxed) + skip;
        *self.fault.lock().unwrap_or_else(PoisonError::into_inner) = Some((at, errno));
    }

    /// Run `hook` right before the shared lock is taken for the `skip`th
    /// time from now, with no lock held.
    ///
    /// A transfer takes the shared lock once per chunk, so this parks it on
    /// a chunk boundary for as long as the hook runs.
    pub fn before_lock(&self, skip: usize, hook: impl FnOnce() + Send + 'static)
    {
        let at = self.lock_acquisitions() + skip;
        *self.before_lock.lock().unwrap_or_else(PoisonError::into_inner) = Some((at, Box::new(hook)));
    }

    fn run_lock_hook(&self)
    {
        let hook = {
            let mut slot = self.before_lock.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.take() {
                Some((at, hook)) if at == self.lock_acquisitions() => Some(hook),
                pending => {
                    *slot = pending;
                    None
                }
            }
        };
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Take the mapping lock exclusively, as an `mmap`/`munmap` would.
    ///
    /// Transfers against this address space stall at their next chunk
    /// boundary until the returned guard drops.
    pub fn lock_exclusive(&self) -> ExclusiveMapping<'_>
    {
        ExclusiveMapping {
            _regions: self.regions.write().unwrap_or_else(PoisonError::into_inner),
        }
    }

    fn next_access(&self) -> Result<(), Errno>
    {
        let index = self.accesses.fetch_add(1, Ordering::Relaxed);
        let mut fault = self.fault.lock().unwrap_or_else(PoisonError::into_inner);
        match *fault {
            Some((at, errno)) if at == index => {
                *fault = None;
                Err(errno)
            }
            _ => Ok(()),
        }
    }
}

/// Exclusive hold on a [`MemoryAddressSpace`]'s mapping lock
pub struct ExclusiveMapping<'a>
{
    _regions: RwLockWriteGuard<'a, Vec<Region>>,
}

impl AddressSpace for MemoryAddressSpace
{
    fn lock_shared(&self) -> Box<dyn MappingGuard + '_>
    {
        self.run_lock_hook();
        let regions = self.regions.read().unwrap_or_else(PoisonError::into_inner);
        self.lock_acquisitions.fetch_add(1, Ordering::Relaxed);
        Box::new(MemoryMappingGuard { space: self, regions })
    }
}

struct MemoryMappingGuard<'a>
{
    space: &'a MemoryAddressSpace,
    regions: RwLockReadGuard<'a, Vec<Region>>,
}

impl MappingGuard for MemoryMappingGuard<'_>
{
    fn read(&self, addr: Address, buf: &mut [u8]) -> Result<usize, Errno>
    {
        self.space.next_access()?;
        Ok(read_mapped(&self.regions, addr.value(), buf))
    }

    fn write(&self, addr: Address, data: &[u8], force: bool) -> Result<usize, Errno>
    {
        self.space.next_access()?;
        Ok(write_mapped(&self.regions, addr.value(), data, force))
    }
}

/// A [`MemoryAddressSpace`] can also play the calling process.
impl UserMemory for MemoryAddressSpace
{
    fn copy_from_user(&self, src: UserPtr, dst: &mut [u8]) -> Result<(), Errno>
    {
        let regions = self.regions.read().unwrap_or_else(PoisonError::into_inner);
        if read_mapped(&regions, src.value(), dst) == dst.len() {
            Ok(())
        } else {
            Err(Errno::EFAULT)
        }
    }

    fn copy_to_user(&self, dst: UserPtr, src: &[u8]) -> Result<(), Errno>
    {
        let regions = self.regions.read().unwrap_or_else(PoisonError::into_inner);
        if write_mapped(&regions, dst.value(), src, false) == src.len() {
            Ok(())
        } else {
            Err(Errno::EFAULT)
        }
    }
}

/// Input device that records every frame it is given
#[derive(Default)]
pub struct RecordingInputDevice
{
    capabilities: DeviceCapabilities,
    frames: Mutex<Vec<InputFrame>>,
}

impl RecordingInputDevice
{
    /// Device with the default capabilities.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Device declaring `capabilities`.
    #[must_use]
    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self
    {
        Self {
            capabilities,
            frames: Mutex::new(Vec::new()),
        }
    }

    /// Frames emitted so far, in order.
    #[must_use]
    pub fn frames(&self) -> Vec<InputFrame>
    {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// All emitted events, flattened.
    #[must_use]
    pub fn events(&self) -> Vec<InputEvent>
    {
        self.frames().into_iter().flatten().collect()
    }
}

impl InputDevice for RecordingInputDevice
{
    fn capabilities(&self) -> &DeviceCapabilities
    {
        &self.capabilities
    }

    fn emit_frame(&self, frame: &[InputEvent])
    {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame.iter().copied().collect());
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_read_stops_at_gap()
    {
        let space = MemoryAddressSpace::new();
        space.map_bytes(Address::new(0x1000), &[1, 2, 3, 4], true).unwrap();
        space.map_bytes(Address::new(0x1004), &[5, 6], true).unwrap();

        let guard = space.lock_shared();
        let mut buf = [0u8; 8];
        assert_eq!(guard.read(Address::new(0x1002), &mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], &[3, 4, 5, 6]);
        assert_eq!(guard.read(Address::new(0x2000), &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_forced_write_ignores_protection()
    {
        let space = MemoryAddressSpace::new();
        space.map_bytes(Address::new(0x1000), b"ro", false).unwrap();
        {
            let guard = space.lock_shared();
            assert_eq!(guard.write(Address::new(0x1000), b"xy", false).unwrap(), 0);
            assert_eq!(guard.write(Address::new(0x1000), b"xy", true).unwrap(), 2);
        }
        assert_eq!(space.peek(Address::new(0x1000), 2).unwrap(), b"xy");
    }

    #[test]
    fn test_overlapping_map_rejected()
    {
        let space = MemoryAddressSpace::new();
        space.map(Address::new(0x1000), 0x100, true).unwrap();
        assert_eq!(space.map(Address::new(0x10ff), 1, true), Err(Errno::EEXIST));
        assert!(space.map(Address::new(0x1100), 1, true).is_ok());
        assert!(space.unmap(Address::new(0x1000)));
        assert!(!space.unmap(Address::new(0x1000)));
    }

    #[test]
    fn test_fault_injection_is_one_shot()
    {
        let space = MemoryAddressSpace::new();
        space.map(Address::new(0x1000), 16, true).unwrap();
        space.fail_access(1, Errno(libc::EPERM));

        let guard = space.lock_shared();
        let mut buf = [0u8; 4];
        assert_eq!(guard.read(Address::new(0x1000), &mut buf), Ok(4));
        assert_eq!(guard.read(Address::new(0x1000), &mut buf), Err(Errno(libc::EPERM)));
        assert_eq!(guard.read(Address::new(0x1000), &mut buf), Ok(4));
    }

    #[test]
    fn test_lock_hook_runs_once_before_chosen_acquisition()
    {
        let space = MemoryAddressSpace::new();
        let seen = Arc::new(AtomicUsize::new(usize::MAX));
        let recorded = Arc::clone(&seen);
        space.before_lock(1, move || recorded.store(0, Ordering::Relaxed));

        drop(space.lock_shared());
        assert_eq!(seen.load(Ordering::Relaxed), usize::MAX);
        drop(space.lock_shared());
        assert_eq!(seen.load(Ordering::Relaxed), 0);
        seen.store(7, Ordering::Relaxed);
        drop(space.lock_shared());
        assert_eq!(seen.load(Ordering::Relaxed), 7);
        assert_eq!(space.lock_acquisitions(), 3);
    }

    #[test]
    fn test_user_copies_are_all_or_nothing()
    {
        let space = MemoryAddressSpace::new();
        space.map(Address::new(0x1000), 4, true).unwrap();
        let mut dst = [0u8; 8];
        assert_eq!(space.copy_from_user(UserPtr::new(0x1000), &mut dst), Err(Errno::EFAULT));
        assert_eq!(space.copy_to_user(UserPtr::new(0x1000), &[9; 4]), Ok(()));
        assert_eq!(space.copy_from_user(UserPtr::new(0x1000), &mut dst[..4]), Ok(()));
        assert_eq!(&dst[..4], &[9; 4]);
        assert_eq!(space.lock_acquisitions(), 0);
    }

    #[test]
    fn test_traversal_pins_process()
    {
        let host = MemoryHost::new();
        let process = host.spawn();
        let before = Arc::strong_count(&process);

        let context = {
            let traversal = host.traverse();
            let entry = traversal.find(process.pid()).unwrap();
            entry.pin()
        };
        assert_eq!(context.pid(), process.pid());
        assert_eq!(Arc::strong_count(&process), before + 1);
        drop(context);
        assert_eq!(Arc::strong_count(&process), before);
    }
}
