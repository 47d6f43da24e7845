//! Shared fixture for the integration tests: an in-memory host, a recording
//! input device, and a calling process with an argument slot and a data
//! buffer mapped.

#![allow(dead_code)]

use std::sync::Arc;

use procgate_core::config::GateConfig;
use procgate_core::context::GateContext;
use procgate_core::error::GateResult;
use procgate_core::host::memory::{MemoryAddressSpace, MemoryHost, RecordingInputDevice};
use procgate_core::host::{InputDevice, ProcessTable, UserMemory};
use procgate_core::types::{Address, ProcessId, UserPtr};
use procgate_core::wire::{MemoryRequest, IOCTL_READ_MEM, IOCTL_WRITE_MEM};

/// Where the caller keeps command payloads.
pub const ARG: u64 = 0x1_0000;
/// Where the caller keeps transfer data.
pub const BUF: u64 = 0x20_0000;
/// Size of the caller's data buffer.
pub const BUF_LEN: usize = 1024 * 1024;
/// An address the caller never maps.
pub const UNMAPPED: u64 = 0xdead_0000;

pub struct Harness
{
    pub host: Arc<MemoryHost>,
    pub device: Arc<RecordingInputDevice>,
    pub caller: MemoryAddressSpace,
    pub context: GateContext,
}

impl Harness
{
    pub fn new() -> Self
    {
        Self::with_config(GateConfig::default())
    }

    pub fn with_config(config: GateConfig) -> Self
    {
        Self::build(config, true)
    }

    pub fn without_input() -> Self
    {
        Self::build(GateConfig::default(), false)
    }

    fn build(config: GateConfig, with_input: bool) -> Self
    {
        let host = Arc::new(MemoryHost::new());
        let device = Arc::new(RecordingInputDevice::new());
        let input = with_input.then(|| Arc::clone(&device) as Arc<dyn InputDevice>);
        let processes = Arc::clone(&host) as Arc<dyn ProcessTable>;
        let context = GateContext::init(config, processes, input).unwrap();

        let caller = MemoryAddressSpace::new();
        caller.map(Address::new(ARG), 64, true).unwrap();
        caller.map(Address::new(BUF), BUF_LEN, true).unwrap();

        Self {
            host,
            device,
            caller,
            context,
        }
    }

    /// Place `payload` in the argument slot and issue `command`.
    pub fn dispatch(&self, command: u32, payload: &[u8]) -> GateResult<usize>
    {
        self.caller.copy_to_user(UserPtr::new(ARG), payload).unwrap();
        self.context
            .dispatcher()
            .dispatch(&self.caller, command, UserPtr::new(ARG))
    }

    /// Same as [`Harness::dispatch`], device-file style.
    pub fn ioctl(&self, command: u32, payload: &[u8]) -> i64
    {
        self.caller.copy_to_user(UserPtr::new(ARG), payload).unwrap();
        self.context
            .dispatcher()
            .ioctl(&self.caller, command, UserPtr::new(ARG))
    }

    pub fn read(&self, pid: ProcessId, address: u64, size: u64) -> GateResult<usize>
    {
        self.read_into(pid, address, size, BUF)
    }

    pub fn read_into(&self, pid: ProcessId, address: u64, size: u64, buffer: u64) -> GateResult<usize>
    {
        let request = MemoryRequest {
            pid,
            address: Address::new(address),
            size,
            buffer: UserPtr::new(buffer),
        };
        self.dispatch(IOCTL_READ_MEM, &request.encode())
    }

    /// Stage `data` in the caller buffer and write it to the target.
    pub fn write(&self, pid: ProcessId, address: u64, data: &[u8]) -> GateResult<usize>
    {
        self.caller.copy_to_user(UserPtr::new(BUF), data).unwrap();
        let request = MemoryRequest {
            pid,
            address: Address::new(address),
            size: data.len() as u64,
            buffer: UserPtr::new(BUF),
        };
        self.dispatch(IOCTL_WRITE_MEM, &request.encode())
    }

    /// First `len` bytes of the caller buffer.
    pub fn buffer(&self, len: usize) -> Vec<u8>
    {
        self.caller.peek(Address::new(BUF), len).unwrap()
    }
}

/// Deterministic test pattern.
pub fn pattern(len: usize) -> Vec<u8>
{
    (0..len).map(|index| (index % 251) as u8).collect()
}
