//! # Input Event Synthesizer
//!
//! Turns validated MOUSE_MOVE and KEY_EVENT payloads into frames of input
//! events and hands each frame to the registered [`InputDevice`].
//!
//! ## Frames
//!
//! | Command | Frame |
//! |---|---|
//! | MOUSE_MOVE | `REL_X(dx)`, `REL_Y(dy)`, `SYN` |
//! | KEY_EVENT | `KEY(code, pressed)`, `SYN` |
//!
//! A frame is delivered in one [`InputDevice::emit_frame`] call, so consumers
//! never see `dx` applied without `dy`. Emission has no failure mode visible
//! to the caller.

use std::fmt;
use std::ops::Range;

use smallvec::{smallvec, SmallVec};
use tracing::trace;

use crate::host::InputDevice;
use crate::wire::{KeyEvent, MouseMoveEvent};

/// `KEY_ESC`, the first key code the virtual device declares.
pub const KEY_ESC: u16 = 1;
/// `KEY_POWER`, the first key code past the declared range.
pub const KEY_POWER: u16 = 116;
/// Left mouse button.
pub const BTN_LEFT: u16 = 0x110;
/// Right mouse button.
pub const BTN_RIGHT: u16 = 0x111;

/// Relative axis of a pointer event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelAxis
{
    /// Horizontal (`REL_X`)
    X,
    /// Vertical (`REL_Y`)
    Y,
}

impl RelAxis
{
    /// Linux input event code of the axis.
    #[must_use]
    pub const fn code(self) -> u16
    {
        match self {
            Self::X => 0x00,
            Self::Y => 0x01,
        }
    }
}

/// One event on the input pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputEvent
{
    /// Relative pointer movement on one axis
    Relative
    {
        /// Axis moved
        axis: RelAxis,
        /// Signed delta
        value: i32,
    },
    /// Key press or release
    Key
    {
        /// Key code
        code: u16,
        /// `true` for press, `false` for release
        pressed: bool,
    },
    /// End of one atomic update
    Sync,
}

impl fmt::Display for InputEvent
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Relative { axis, value } => write!(f, "EV_REL code={} value={value}", axis.code()),
            Self::Key { code, pressed } => write!(f, "EV_KEY code={code} value={}", u8::from(*pressed)),
            Self::Sync => write!(f, "EV_SYN"),
        }
    }
}

/// Events emitted for one command; never more than three.
pub type InputFrame = SmallVec<[InputEvent; 3]>;

/// What a virtual input device declared when it was registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapabilities
{
    /// Device name as shown to consumers
    pub name: String,
    /// USB-style vendor id
    pub vendor: u16,
    /// USB-style product id
    pub product: u16,
    /// Device version
    pub version: u16,
    /// Key codes accepted by KEY_EVENT (half-open)
    pub key_codes: Range<u16>,
    /// Pointer buttons declared in addition to the key range
    pub buttons: Vec<u16>,
    /// Relative axes declared
    pub relative_axes: Vec<RelAxis>,
}

impl Default for DeviceCapabilities
{
    fn default() -> Self
    {
        Self {
            name: "procgate virtual input".to_string(),
            vendor: 0x0001,
            product: 0x0001,
            version: 1,
            key_codes: KEY_ESC..KEY_POWER,
            buttons: vec![BTN_LEFT, BTN_RIGHT],
            relative_axes: vec![RelAxis::X, RelAxis::Y],
        }
    }
}

impl DeviceCapabilities
{
    /// `true` if KEY_EVENT accepts `code`.
    #[must_use]
    pub fn supports_key(&self, code: i32) -> bool
    {
        u16::try_from(code).is_ok_and(|code| self.key_codes.contains(&code))
    }
}

/// Frame for a pointer movement.
#[must_use]
pub fn mouse_frame(event: &MouseMoveEvent) -> InputFrame
{
    smallvec![
        InputEvent::Relative {
            axis: RelAxis::X,
            value: event.dx,
        },
        InputEvent::Relative {
            axis: RelAxis::Y,
            value: event.dy,
        },
        InputEvent::Sync,
    ]
}

/// Frame for a key transition.
///
/// The code must already be validated against the device's range.
#[must_use]
pub fn key_frame(code: u16, pressed: bool) -> InputFrame
{
    smallvec![InputEvent::Key { code, pressed }, InputEvent::Sync]
}

/// Emits validated input commands through a borrowed device
pub struct InputSynthesizer<'d>
{
    device: &'d dyn InputDevice,
}

impl<'d> InputSynthesizer<'d>
{
    /// Wrap the context's device.
    #[must_use]
    pub fn new(device: &'d dyn InputDevice) -> Self
    {
        Self { device }
    }

    /// Emit `REL_X`, `REL_Y`, `SYN` as one frame.
    pub fn mouse_move(&self, event: &MouseMoveEvent)
    {
        trace!(dx = event.dx, dy = event.dy, "emitting pointer frame");
        self.device.emit_frame(&mouse_frame(event));
    }

    /// Emit `KEY`, `SYN` as one frame.
    ///
    /// Codes outside `u16` cannot pass validation; they are dropped here
    /// rather than truncated.
    pub fn key(&self, event: &KeyEvent)
    {
        let Ok(code) = u16::try_from(event.code) else {
            return;
        };
        trace!(code, pressed = event.pressed, "emitting key frame");
        self.device.emit_frame(&key_frame(code, event.pressed));
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_mouse_frame_order()
    {
        let frame = mouse_frame(&MouseMoveEvent { dx: 4096, dy: -4096 });
        assert_eq!(
            frame.as_slice(),
            &[
                InputEvent::Relative {
                    axis: RelAxis::X,
                    value: 4096
                },
                InputEvent::Relative {
                    axis: RelAxis::Y,
                    value: -4096
                },
                InputEvent::Sync,
            ]
        );
        assert!(!frame.spilled());
    }

    #[test]
    fn test_key_frame_ends_with_sync()
    {
        let frame = key_frame(30, true);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame[0], InputEvent::Key { code: 30, pressed: true });
        assert_eq!(frame[1], InputEvent::Sync);
    }

    #[test]
    fn test_default_capabilities_key_range()
    {
        let caps = DeviceCapabilities::default();
        assert!(!caps.supports_key(0));
        assert!(caps.supports_key(1));
        assert!(caps.supports_key(115));
        assert!(!caps.supports_key(116));
        assert!(!caps.supports_key(-1));
        assert!(!caps.supports_key(i32::from(BTN_LEFT)));
    }

    #[test]
    fn test_event_display()
    {
        let event = InputEvent::Relative {
            axis: RelAxis::Y,
            value: -3,
        };
        assert_eq!(event.to_string(), "EV_REL code=1 value=-3");
        assert_eq!(InputEvent::Key { code: 30, pressed: false }.to_string(), "EV_KEY code=30 value=0");
        assert_eq!(InputEvent::Sync.to_string(), "EV_SYN");
    }
}
