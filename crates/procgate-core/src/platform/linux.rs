//! # Linux procfs Host
//!
//! Host collaborators backed by `/proc`:
//!
//! - **[`ProcfsProcessTable`]**: processes are the numeric entries of `/proc`
//! - **Address spaces**: `/proc/<pid>/mem`, accessed with positional I/O
//! - **[`ProcfsUserMemory`]**: the calling process, through `/proc/self/mem`
//! - **[`TracingInputDevice`]**: logs frames instead of injecting them
//!
//! ## Notes
//!
//! - The kernel applies ptrace access checks when `/proc/<pid>/mem` is
//!   opened, so resolving someone else's process needs the same privilege a
//!   debugger would. A process that cannot be opened has no usable address
//!   space and resolves to `NotFound`.
//! - Writes through `/proc/<pid>/mem` always bypass page protection, so the
//!   `force` flag has no further effect here.
//! - The real `mmap_lock` is taken by the kernel inside each `pread`/`pwrite`.
//!   The shared lock handed out here only orders this host's own users.
//!
//! ## References
//!
//! - [proc_pid_mem(5)](https://man7.org/linux/man-pages/man5/proc_pid_mem.5.html)
//! - [pread(2)](https://man7.org/linux/man-pages/man2/pread.2.html)

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use tracing::{debug, info};

use crate::host::{
    AddressSpace, Errno, ExecutionContext, InputDevice, MappingGuard, ProcessTable, TableTraversal, TaskEntry,
    UserMemory,
};
use crate::input::{DeviceCapabilities, InputEvent};
use crate::types::{Address, ProcessId, UserPtr};

const PROC_ROOT: &str = "/proc";

fn open_mem(path: &std::path::Path) -> std::io::Result<File>
{
    match OpenOptions::new().read(true).write(true).open(path) {
        Err(error) if error.kind() == ErrorKind::PermissionDenied => OpenOptions::new().read(true).open(path),
        result => result,
    }
}

/// Positional read that keeps going until `buf` is full or the target stops
/// yielding bytes.
fn read_at_most(file: &File, addr: u64, buf: &mut [u8]) -> Result<usize, Errno>
{
    let mut done = 0;
    while done < buf.len() {
        match file.read_at(&mut buf[done..], addr + done as u64) {
            Ok(0) => break,
            Ok(count) => done += count,
            Err(error) if error.kind() == ErrorKind::Interrupted => {}
            Err(_) if done > 0 => break,
            Err(error) => return Err(Errno::from(error)),
        }
    }
    Ok(done)
}

fn write_at_most(file: &File, addr: u64, data: &[u8]) -> Result<usize, Errno>
{
    let mut done = 0;
    while done < data.len() {
        match file.write_at(&data[done..], addr + done as u64) {
            Ok(0) => break,
            Ok(count) => done += count,
            Err(error) if error.kind() == ErrorKind::Interrupted => {}
            Err(_) if done > 0 => break,
            Err(error) => return Err(Errno::from(error)),
        }
    }
    Ok(done)
}

/// Process table over `/proc`
#[derive(Debug, Clone)]
pub struct ProcfsProcessTable
{
    root: PathBuf,
}

impl Default for ProcfsProcessTable
{
    fn default() -> Self
    {
        Self {
            root: PathBuf::from(PROC_ROOT),
        }
    }
}

impl ProcfsProcessTable
{
    /// Table over the system's `/proc`.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }
}

impl ProcessTable for ProcfsProcessTable
{
    fn traverse(&self) -> Box<dyn TableTraversal + '_>
    {
        Box::new(ProcfsTraversal { table: self })
    }
}

struct ProcfsTraversal<'a>
{
    table: &'a ProcfsProcessTable,
}

impl TableTraversal for ProcfsTraversal<'_>
{
    fn find(&self, pid: ProcessId) -> Option<Box<dyn TaskEntry + '_>>
    {
        if !pid.is_valid() {
            return None;
        }
        let dir = self.table.root.join(pid.to_string());
        dir.is_dir().then(|| Box::new(ProcfsEntry { pid, dir }) as Box<dyn TaskEntry + '_>)
    }
}

struct ProcfsEntry
{
    pid: ProcessId,
    dir: PathBuf,
}

impl TaskEntry for ProcfsEntry
{
    fn pin(&self) -> Arc<dyn ExecutionContext>
    {
        // An open mem file keeps the target's mm reachable for as long as we hold it.
        let space = match open_mem(&self.dir.join("mem")) {
            Ok(file) => Some(Arc::new(ProcfsAddressSpace {
                file,
                lock: RwLock::new(()),
            })),
            Err(error) => {
                debug!(pid = self.pid.raw(), %error, "could not open process memory");
                None
            }
        };
        Arc::new(ProcfsTask { pid: self.pid, space })
    }
}

struct ProcfsTask
{
    pid: ProcessId,
    space: Option<Arc<ProcfsAddressSpace>>,
}

impl ExecutionContext for ProcfsTask
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

struct ProcfsAddressSpace
{
    file: File,
    lock: RwLock<()>,
}

impl AddressSpace for ProcfsAddressSpace
{
    fn lock_shared(&self) -> Box<dyn MappingGuard + '_>
    {
        Box::new(ProcfsMappingGuard {
            file: &self.file,
            _lock: self.lock.read().unwrap_or_else(PoisonError::into_inner),
        })
    }
}

struct ProcfsMappingGuard<'a>
{
    file: &'a File,
    _lock: RwLockReadGuard<'a, ()>,
}

impl MappingGuard for ProcfsMappingGuard<'_>
{
    fn read(&self, addr: Address, buf: &mut [u8]) -> Result<usize, Errno>
    {
        read_at_most(self.file, addr.value(), buf)
    }

    fn write(&self, addr: Address, data: &[u8], _force: bool) -> Result<usize, Errno>
    {
        write_at_most(self.file, addr.value(), data)
    }
}

/// The calling process's memory, through `/proc/self/mem`
#[derive(Debug)]
pub struct ProcfsUserMemory
{
    file: File,
}

impl ProcfsUserMemory
{
    /// Open the calling process's memory.
    ///
    /// ## Errors
    ///
    /// Any I/O error from opening `/proc/self/mem`.
    pub fn open() -> std::io::Result<Self>
    {
        let file = OpenOptions::new().read(true).write(true).open("/proc/self/mem")?;
        Ok(Self { file })
    }
}

impl UserMemory for ProcfsUserMemory
{
    fn copy_from_user(&self, src: UserPtr, dst: &mut [u8]) -> Result<(), Errno>
    {
        match read_at_most(&self.file, src.value(), dst) {
            Ok(count) if count == dst.len() => Ok(()),
            _ => Err(Errno::EFAULT),
        }
    }

    fn copy_to_user(&self, dst: UserPtr, src: &[u8]) -> Result<(), Errno>
    {
        match write_at_most(&self.file, dst.value(), src) {
            Ok(count) if count == src.len() => Ok(()),
            _ => Err(Errno::EFAULT),
        }
    }
}

/// Input device that logs each frame through `tracing`
///
/// Stands in for a registered kernel input device when none is available.
#[derive(Debug, Default)]
pub struct TracingInputDevice
{
    capabilities: DeviceCapabilities,
}

impl TracingInputDevice
{
    /// Device with the default capabilities.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }
}

impl InputDevice for TracingInputDevice
{
    fn capabilities(&self) -> &DeviceCapabilities
    {
        &self.capabilities
    }

    fn emit_frame(&self, frame: &[InputEvent])
    {
        let rendered: Vec<String> = frame.iter().map(ToString::to_string).collect();
        info!(device = %self.capabilities.name, events = ?rendered, "input frame");
    }
}
