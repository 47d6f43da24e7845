//! # Wire Format
//!
//! Command numbers and fixed-size payloads exchanged across the device
//! boundary.
//!
//! ## Command numbers
//!
//! Commands use Linux ioctl numbering, `_IOWR(magic, 1, payload_len)`:
//!
//! ```text
//! [dir:2][size:14][magic:8][nr:8]
//! ```
//!
//! | Command | Magic | Payload |
//! |---|---|---|
//! | READ_MEM | `0xBC` | [`MemoryRequest`], 32 bytes |
//! | WRITE_MEM | `0xBD` | [`MemoryRequest`], 32 bytes |
//! | MOUSE_MOVE | `0xBE` | [`MouseMoveEvent`], 12 bytes |
//! | KEY_EVENT | `0xBF` | [`KeyEvent`], 8 bytes |
//!
//! Because the payload length is part of the number, a caller built against
//! a different payload layout is rejected as an unknown command.
//!
//! ## Payloads
//!
//! All integers are little-endian. Every payload starts with a version byte
//! ([`WIRE_VERSION`]) and is padded so multi-byte fields are naturally
//! aligned:
//!
//! ```text
//! MemoryRequest  [version:1][reserved:3][pid:i32][address:u64][size:u64][buffer:u64]
//! MouseMoveEvent [version:1][reserved:3][dx:i32][dy:i32]
//! KeyEvent       [version:1][pressed:1][reserved:2][code:i32]
//! ```
//!
//! Decoders take exactly the payload length; anything else is rejected.

use crate::error::{GateError, GateResult};
use crate::types::{Address, ProcessId, UserPtr};

/// Payload layout version understood by this build.
pub const WIRE_VERSION: u8 = 1;

/// Largest payload of any command.
pub const MAX_PAYLOAD_LEN: usize = MemoryRequest::WIRE_LEN;

const IOC_NRBITS: u32 = 8;
const IOC_TYPEBITS: u32 = 8;
const IOC_SIZEBITS: u32 = 14;
const IOC_TYPESHIFT: u32 = IOC_NRBITS;
const IOC_SIZESHIFT: u32 = IOC_TYPESHIFT + IOC_TYPEBITS;
const IOC_DIRSHIFT: u32 = IOC_SIZESHIFT + IOC_SIZEBITS;
const IOC_READ_WRITE: u32 = 0b11;

#[allow(clippy::cast_possible_truncation)]
const fn iowr(magic: u8, nr: u8, size: usize) -> u32
{
    (IOC_READ_WRITE << IOC_DIRSHIFT) | ((size as u32) << IOC_SIZESHIFT) | ((magic as u32) << IOC_TYPESHIFT) | nr as u32
}

/// Magic of READ_MEM.
pub const MAGIC_READ: u8 = 0xBC;
/// Magic of WRITE_MEM.
pub const MAGIC_WRITE: u8 = 0xBD;
/// Magic of MOUSE_MOVE.
pub const MAGIC_MOUSE: u8 = 0xBE;
/// Magic of KEY_EVENT.
pub const MAGIC_KEY: u8 = 0xBF;

/// Command number of READ_MEM.
pub const IOCTL_READ_MEM: u32 = iowr(MAGIC_READ, 1, MemoryRequest::WIRE_LEN);
/// Command number of WRITE_MEM.
pub const IOCTL_WRITE_MEM: u32 = iowr(MAGIC_WRITE, 1, MemoryRequest::WIRE_LEN);
/// Command number of MOUSE_MOVE.
pub const IOCTL_MOUSE_MOVE: u32 = iowr(MAGIC_MOUSE, 1, MouseMoveEvent::WIRE_LEN);
/// Command number of KEY_EVENT.
pub const IOCTL_KEY_EVENT: u32 = iowr(MAGIC_KEY, 1, KeyEvent::WIRE_LEN);

/// A recognized command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command
{
    /// Copy bytes out of a target process
    ReadMem,
    /// Copy bytes into a target process
    WriteMem,
    /// Inject relative pointer movement
    MouseMove,
    /// Inject a key press or release
    KeyEvent,
}

impl Command
{
    /// Decode a raw command number; `None` if it is not one of ours.
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self>
    {
        match raw {
            IOCTL_READ_MEM => Some(Self::ReadMem),
            IOCTL_WRITE_MEM => Some(Self::WriteMem),
            IOCTL_MOUSE_MOVE => Some(Self::MouseMove),
            IOCTL_KEY_EVENT => Some(Self::KeyEvent),
            _ => None,
        }
    }

    /// Raw command number.
    #[must_use]
    pub const fn raw(self) -> u32
    {
        match self {
            Self::ReadMem => IOCTL_READ_MEM,
            Self::WriteMem => IOCTL_WRITE_MEM,
            Self::MouseMove => IOCTL_MOUSE_MOVE,
            Self::KeyEvent => IOCTL_KEY_EVENT,
        }
    }

    /// Exact payload length copied from the caller.
    #[must_use]
    pub const fn payload_len(self) -> usize
    {
        match self {
            Self::ReadMem | Self::WriteMem => MemoryRequest::WIRE_LEN,
            Self::MouseMove => MouseMoveEvent::WIRE_LEN,
            Self::KeyEvent => KeyEvent::WIRE_LEN,
        }
    }

    /// `true` for the input commands.
    #[must_use]
    pub const fn is_input(self) -> bool
    {
        matches!(self, Self::MouseMove | Self::KeyEvent)
    }
}

fn check_frame(bytes: &[u8], expected: usize, what: &str) -> GateResult<()>
{
    if bytes.len() != expected {
        return Err(GateError::InvalidArgument(format!(
            "{what} payload must be {expected} bytes, got {}",
            bytes.len()
        )));
    }
    if bytes[0] != WIRE_VERSION {
        return Err(GateError::InvalidArgument(format!(
            "{what} payload version {} is not supported (expected {WIRE_VERSION})",
            bytes[0]
        )));
    }
    Ok(())
}

fn le_i32(bytes: &[u8], at: usize) -> i32
{
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    i32::from_le_bytes(raw)
}

fn le_u64(bytes: &[u8], at: usize) -> u64
{
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}

/// READ_MEM / WRITE_MEM payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRequest
{
    /// Target process
    pub pid: ProcessId,
    /// Start of the range in the target
    pub address: Address,
    /// Number of bytes to move
    pub size: u64,
    /// Caller buffer: destination for reads, source for writes
    pub buffer: UserPtr,
}

impl MemoryRequest
{
    /// Encoded length in bytes.
    pub const WIRE_LEN: usize = 32;

    /// Encode for the wire.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::WIRE_LEN]
    {
        let mut out = [0u8; Self::WIRE_LEN];
        out[0] = WIRE_VERSION;
        out[4..8].copy_from_slice(&self.pid.raw().to_le_bytes());
        out[8..16].copy_from_slice(&self.address.value().to_le_bytes());
        out[16..24].copy_from_slice(&self.size.to_le_bytes());
        out[24..32].copy_from_slice(&self.buffer.value().to_le_bytes());
        out
    }

    /// Decode from exactly [`Self::WIRE_LEN`] bytes.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` on a wrong length or version.
    pub fn decode(bytes: &[u8]) -> GateResult<Self>
    {
        check_frame(bytes, Self::WIRE_LEN, "memory request")?;
        Ok(Self {
            pid: ProcessId(le_i32(bytes, 4)),
            address: Address::new(le_u64(bytes, 8)),
            size: le_u64(bytes, 16),
            buffer: UserPtr::new(le_u64(bytes, 24)),
        })
    }
}

/// MOUSE_MOVE payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseMoveEvent
{
    /// Horizontal delta
    pub dx: i32,
    /// Vertical delta
    pub dy: i32,
}

impl MouseMoveEvent
{
    /// Encoded length in bytes.
    pub const WIRE_LEN: usize = 12;

    /// Encode for the wire.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::WIRE_LEN]
    {
        let mut out = [0u8; Self::WIRE_LEN];
        out[0] = WIRE_VERSION;
        out[4..8].copy_from_slice(&self.dx.to_le_bytes());
        out[8..12].copy_from_slice(&self.dy.to_le_bytes());
        out
    }

    /// Decode from exactly [`Self::WIRE_LEN`] bytes.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` on a wrong length or version.
    pub fn decode(bytes: &[u8]) -> GateResult<Self>
    {
        check_frame(bytes, Self::WIRE_LEN, "mouse move")?;
        Ok(Self {
            dx: le_i32(bytes, 4),
            dy: le_i32(bytes, 8),
        })
    }
}

/// KEY_EVENT payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent
{
    /// Key code
    pub code: i32,
    /// Press (`true`) or release (`false`)
    pub pressed: bool,
}

impl KeyEvent
{
    /// Encoded length in bytes.
    pub const WIRE_LEN: usize = 8;

    /// Encode for the wire.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::WIRE_LEN]
    {
        let mut out = [0u8; Self::WIRE_LEN];
        out[0] = WIRE_VERSION;
        out[1] = u8::from(self.pressed);
        out[4..8].copy_from_slice(&self.code.to_le_bytes());
        out
    }

    /// Decode from exactly [`Self::WIRE_LEN`] bytes. Any non-zero `pressed`
    /// byte is a press.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` on a wrong length or version.
    pub fn decode(bytes: &[u8]) -> GateResult<Self>
    {
        check_frame(bytes, Self::WIRE_LEN, "key event")?;
        Ok(Self {
            code: le_i32(bytes, 4),
            pressed: bytes[1] != 0,
        })
    }
}
