//! Tests for READ_MEM and WRITE_MEM through the dispatcher

mod common;

use std::sync::Arc;

use common::{pattern, Harness, BUF, UNMAPPED};
use procgate_core::config::GateConfig;
use procgate_core::error::GateError;
use procgate_core::host::Errno;
use procgate_core::types::{Address, ProcessId, UserPtr};
use procgate_core::wire::{MemoryRequest, IOCTL_READ_MEM};

#[test]
fn test_read_twelve_bytes()
{
    let harness = Harness::new();
    let target = harness.host.spawn();
    let space = target.space().unwrap();
    space.map_bytes(Address::new(0x40_0000), b"hello, world", true).unwrap();

    assert_eq!(harness.read(target.pid(), 0x40_0000, 12), Ok(12));
    assert_eq!(harness.buffer(12), b"hello, world");

    let stats = harness.context.stats().snapshot();
    assert_eq!(stats.bytes_read, 12);
    assert_eq!(stats.scratch_live, 0);
    assert_eq!(stats.handles_live, 0);
}

#[test]
fn test_write_then_read_round_trip()
{
    let harness = Harness::with_config(GateConfig::default().with_chunk_size(64));
    let target = harness.host.spawn();
    target.space().unwrap().map(Address::new(0x7000_0000), 1000, true).unwrap();
    let data = pattern(1000);

    assert_eq!(harness.write(target.pid(), 0x7000_0000, &data), Ok(1000));
    assert_eq!(target.space().unwrap().peek(Address::new(0x7000_0000), 1000).unwrap(), data);

    harness.caller.map(Address::new(0x30_0000), 1000, true).unwrap();
    assert_eq!(harness.read_into(target.pid(), 0x7000_0000, 1000, 0x30_0000), Ok(1000));
    assert_eq!(harness.caller.peek(Address::new(0x30_0000), 1000).unwrap(), data);

    let stats = harness.context.stats().snapshot();
    assert_eq!(stats.bytes_written, 1000);
    assert_eq!(stats.bytes_read, 1000);
}

#[test]
fn test_one_lock_acquisition_per_chunk()
{
    let harness = Harness::with_config(GateConfig::default().with_chunk_size(16));
    let target = harness.host.spawn();
    let space = target.space().unwrap();
    space.map(Address::new(0x1000), 40, true).unwrap();

    assert_eq!(harness.read(target.pid(), 0x1000, 40), Ok(40));
    assert_eq!(space.lock_acquisitions(), 3);

    assert_eq!(harness.read(target.pid(), 0x1000, 32), Ok(32));
    assert_eq!(space.lock_acquisitions(), 5);
}

#[test]
fn test_short_chunk_returns_accumulated_total()
{
    let harness = Harness::with_config(GateConfig::default().with_chunk_size(16));
    let target = harness.host.spawn();
    let data = pattern(20);
    target.space().unwrap().map_bytes(Address::new(0x1000), &data, true).unwrap();

    assert_eq!(harness.read(target.pid(), 0x1000, 40), Ok(20));
    assert_eq!(harness.buffer(20), data);
    assert_eq!(target.space().unwrap().lock_acquisitions(), 2);
}

#[test]
fn test_short_total_leaves_rest_of_caller_buffer_untouched()
{
    let harness = Harness::with_config(GateConfig::default().with_chunk_size(8));
    let target = harness.host.spawn();
    target.space().unwrap().map_bytes(Address::new(0x1000), &[7u8; 4], true).unwrap();
    harness.caller.map_bytes(Address::new(0x50_0000), &[0xAA; 16], true).unwrap();

    assert_eq!(harness.read_into(target.pid(), 0x1000, 16, 0x50_0000), Ok(4));
    let buffer = harness.caller.peek(Address::new(0x50_0000), 16).unwrap();
    assert_eq!(&buffer[..4], &[7u8; 4]);
    assert_eq!(&buffer[4..], &[0xAA; 12]);
}

#[test]
fn test_first_chunk_failure_is_io_error()
{
    let harness = Harness::new();
    let target = harness.host.spawn();

    assert_eq!(harness.read(target.pid(), 0x1000, 12), Err(GateError::Io { errno: libc::EIO }));

    target.space().unwrap().map(Address::new(0x1000), 12, true).unwrap();
    target.space().unwrap().fail_access(0, Errno(libc::EPERM));
    assert_eq!(harness.read(target.pid(), 0x1000, 12), Err(GateError::Io { errno: libc::EPERM }));

    let stats = harness.context.stats().snapshot();
    assert_eq!(stats.bytes_read, 0);
    assert_eq!(stats.scratch_live, 0);
    assert_eq!(stats.handles_live, 0);
}

#[test]
fn test_negated_or_zero_primitive_error_is_still_a_failure()
{
    let harness = Harness::new();
    let target = harness.host.spawn();
    let space = target.space().unwrap();
    space.map(Address::new(0x1000), 5, true).unwrap();
    let request = MemoryRequest {
        pid: target.pid(),
        address: Address::new(0x1000),
        size: 5,
        buffer: UserPtr::new(BUF),
    }
    .encode();

    space.fail_access(0, Errno(-libc::EIO));
    assert_eq!(harness.ioctl(IOCTL_READ_MEM, &request), -i64::from(libc::EIO));

    space.fail_access(0, Errno(0));
    assert_eq!(harness.ioctl(IOCTL_READ_MEM, &request), -i64::from(libc::EIO));

    space.fail_access(0, Errno(-libc::EPERM));
    assert_eq!(harness.read(target.pid(), 0x1000, 5), Err(GateError::Io { errno: libc::EPERM }));

    assert_eq!(harness.context.stats().snapshot().bytes_read, 0);
}

#[test]
fn test_later_chunk_failure_returns_partial_total()
{
    let harness = Harness::with_config(GateConfig::default().with_chunk_size(16));
    let target = harness.host.spawn();
    let space = target.space().unwrap();
    let data = pattern(48);
    space.map_bytes(Address::new(0x1000), &data, true).unwrap();
    space.fail_access(1, Errno(libc::EPERM));

    assert_eq!(harness.read(target.pid(), 0x1000, 48), Ok(16));
    assert_eq!(harness.buffer(16), &data[..16]);
}

#[test]
fn test_partial_write_stops_at_gap()
{
    let harness = Harness::with_config(GateConfig::default().with_chunk_size(16));
    let target = harness.host.spawn();
    let space = target.space().unwrap();
    space.map(Address::new(0x1000), 24, true).unwrap();

    assert_eq!(harness.write(target.pid(), 0x1000, &pattern(40)), Ok(24));
    assert_eq!(space.peek(Address::new(0x1000), 24).unwrap(), &pattern(40)[..24]);
    assert_eq!(harness.context.stats().snapshot().bytes_written, 24);
}

#[test]
fn test_write_into_read_only_region_is_forced()
{
    let harness = Harness::new();
    let target = harness.host.spawn();
    let space = target.space().unwrap();
    space.map_bytes(Address::new(0x40_0000), &[0x90; 8], false).unwrap();

    assert_eq!(harness.write(target.pid(), 0x40_0000, &[0xCC; 8]), Ok(8));
    assert_eq!(space.peek(Address::new(0x40_0000), 8).unwrap(), [0xCC; 8]);
}

#[test]
fn test_unknown_pid_is_not_found()
{
    let harness = Harness::new();
    let bystander = harness.host.spawn();
    let before = Arc::strong_count(&bystander);

    assert_eq!(harness.read(ProcessId(4242), 0x1000, 12), Err(GateError::NotFound(ProcessId(4242))));

    let stats = harness.context.stats().snapshot();
    assert_eq!(stats.scratch_allocated, 1);
    assert_eq!(stats.scratch_live, 0);
    assert_eq!(stats.handles_acquired, 0);
    assert_eq!(stats.handles_live, 0);
    assert_eq!(Arc::strong_count(&bystander), before);
}

#[test]
fn test_reaped_process_is_not_found()
{
    let harness = Harness::new();
    let target = harness.host.spawn();
    target.space().unwrap().map(Address::new(0x1000), 12, true).unwrap();
    let pid = target.pid();
    harness.host.reap(pid);

    assert_eq!(harness.read(pid, 0x1000, 12), Err(GateError::NotFound(pid)));
}

#[test]
fn test_process_without_address_space_is_not_found()
{
    let harness = Harness::new();
    let kthread = harness.host.spawn_kernel_thread();

    assert_eq!(harness.read(kthread.pid(), 0x1000, 12), Err(GateError::NotFound(kthread.pid())));

    let stats = harness.context.stats().snapshot();
    assert_eq!(stats.handles_acquired, 1);
    assert_eq!(stats.handles_live, 0);
}

#[test]
fn test_handle_released_after_transfer()
{
    let harness = Harness::new();
    let target = harness.host.spawn();
    target.space().unwrap().map(Address::new(0x1000), 12, true).unwrap();
    let before = Arc::strong_count(&target);

    assert_eq!(harness.read(target.pid(), 0x1000, 12), Ok(12));
    assert_eq!(harness.read(target.pid(), 0x9000, 12), Err(GateError::Io { errno: libc::EIO }));

    assert_eq!(Arc::strong_count(&target), before);
    let stats = harness.context.stats().snapshot();
    assert_eq!(stats.handles_acquired, 2);
    assert_eq!(stats.handles_live, 0);
}

#[test]
fn test_read_copy_out_fault_discards_bytes()
{
    let harness = Harness::new();
    let target = harness.host.spawn();
    target.space().unwrap().map(Address::new(0x1000), 12, true).unwrap();

    let result = harness.read_into(target.pid(), 0x1000, 12, UNMAPPED);
    assert!(matches!(result, Err(GateError::Fault(_))));

    let stats = harness.context.stats().snapshot();
    assert_eq!(stats.bytes_read, 0);
    assert_eq!(stats.handles_live, 0);
    assert_eq!(stats.scratch_live, 0);
}

#[test]
fn test_write_copy_in_fault_happens_before_resolution()
{
    let harness = Harness::new();
    let target = harness.host.spawn();
    target.space().unwrap().map(Address::new(0x1000), 12, true).unwrap();

    let request = MemoryRequest {
        pid: target.pid(),
        address: Address::new(0x1000),
        size: 12,
        buffer: UserPtr::new(UNMAPPED),
    };
    let result = harness.dispatch(procgate_core::wire::IOCTL_WRITE_MEM, &request.encode());
    assert!(matches!(result, Err(GateError::Fault(_))));

    let stats = harness.context.stats().snapshot();
    assert_eq!(stats.handles_acquired, 0);
    assert_eq!(stats.scratch_live, 0);
    assert_eq!(target.space().unwrap().lock_acquisitions(), 0);
}

#[test]
fn test_caller_buffer_spanning_a_gap_faults()
{
    let harness = Harness::new();
    let target = harness.host.spawn();
    target.space().unwrap().map(Address::new(0x1000), 64, true).unwrap();

    // 32 bytes starting 16 bytes before the end of the caller's buffer.
    let tail = BUF + common::BUF_LEN as u64 - 16;
    let result = harness.read_into(target.pid(), 0x1000, 32, tail);
    assert!(matches!(result, Err(GateError::Fault(_))));
}
