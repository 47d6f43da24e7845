//! # Request Validator
//!
//! Pure checks run before any resource is touched: no allocation, no
//! process lookup, no device access. The only side effect is a `warn!`
//! naming the rejected value.

use tracing::warn;

use crate::config::GateConfig;
use crate::error::{GateError, GateResult};
use crate::input::DeviceCapabilities;
use crate::wire::{KeyEvent, MemoryRequest, MouseMoveEvent};

/// Check a READ_MEM/WRITE_MEM request and return its size as `usize`.
///
/// ## Errors
///
/// `InvalidArgument` if:
/// - `size == 0` or `size > max_transfer_size`
/// - `pid <= 0`
/// - the caller buffer is null
/// - `address + size` wraps around the address space
pub fn memory_request(request: &MemoryRequest, config: &GateConfig) -> GateResult<usize>
{
    let size = usize::try_from(request.size).unwrap_or(usize::MAX);
    if size == 0 || size > config.max_transfer_size {
        warn!(size = request.size, max = config.max_transfer_size, "rejecting memory request: invalid size");
        return Err(GateError::InvalidArgument(format!(
            "size {} outside 1..={}",
            request.size, config.max_transfer_size
        )));
    }
    if !request.pid.is_valid() {
        warn!(pid = request.pid.raw(), "rejecting memory request: invalid pid");
        return Err(GateError::InvalidArgument(format!("invalid pid {}", request.pid)));
    }
    if request.buffer.is_null() {
        warn!("rejecting memory request: caller buffer is null");
        return Err(GateError::InvalidArgument("caller buffer is null".to_string()));
    }
    if request.address.checked_add(request.size).is_none() {
        warn!(address = %request.address, size = request.size, "rejecting memory request: range wraps");
        return Err(GateError::InvalidArgument(format!(
            "range {} + {} wraps the address space",
            request.address, request.size
        )));
    }
    Ok(size)
}

/// Check both deltas are within `limit`.
///
/// ## Errors
///
/// `InvalidArgument` if `|dx| > limit` or `|dy| > limit`.
pub fn mouse_move(event: &MouseMoveEvent, limit: u32) -> GateResult<()>
{
    if event.dx.unsigned_abs() > limit || event.dy.unsigned_abs() > limit {
        warn!(dx = event.dx, dy = event.dy, limit, "rejecting mouse movement");
        return Err(GateError::InvalidArgument(format!(
            "mouse movement {}/{} exceeds {limit}",
            event.dx, event.dy
        )));
    }
    Ok(())
}

/// Check the key code is one the device declared.
///
/// ## Errors
///
/// `InvalidArgument` if the code is outside `capabilities.key_codes`.
pub fn key_event(event: &KeyEvent, capabilities: &DeviceCapabilities) -> GateResult<()>
{
    if !capabilities.supports_key(event.code) {
        warn!(code = event.code, "rejecting key event: unsupported key");
        return Err(GateError::InvalidArgument(format!(
            "key {} outside {}..{}",
            event.code, capabilities.key_codes.start, capabilities.key_codes.end
        )));
    }
    Ok(())
}
