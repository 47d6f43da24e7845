//! # Command Dispatcher
//!
//! The single entry point of the service. For each call it:
//!
//! 1. Decodes the command number (`NotSupported` if unknown)
//! 2. Copies exactly the command's payload length from the caller (`Fault`)
//! 3. Decodes and validates the payload (`InvalidArgument`)
//! 4. Routes memory commands to the [`TransferEngine`] and input commands to
//!    the [`InputSynthesizer`]
//!
//! [`Dispatcher::ioctl`] is the raw device-file form: a non-negative result
//! or a negative errno. [`Dispatcher::dispatch`] returns the same thing as a
//! [`GateResult`].

use tracing::warn;

use crate::context::GateContext;
use crate::error::{GateError, GateResult};
use crate::host::{InputDevice, UserMemory};
use crate::input::InputSynthesizer;
use crate::resolver::ProcessResolver;
use crate::transfer::{TransferEngine, TransferRequest};
use crate::types::{TransferDirection, UserPtr};
use crate::validate;
use crate::wire::{Command, KeyEvent, MemoryRequest, MouseMoveEvent, MAX_PAYLOAD_LEN};

/// Routes commands for one [`GateContext`]
///
/// Holds no state of its own and takes no lock: calls from different threads
/// proceed concurrently and only meet at a target's mapping lock.
pub struct Dispatcher<'c>
{
    context: &'c GateContext,
}

impl<'c> Dispatcher<'c>
{
    pub(crate) fn new(context: &'c GateContext) -> Self
    {
        Self { context }
    }

    /// Handle one command, device-file style.
    ///
    /// Returns the byte count for memory commands, `0` for input commands, or
    /// a negative errno.
    pub fn ioctl(&self, caller: &dyn UserMemory, command: u32, arg: UserPtr) -> i64
    {
        match self.dispatch(caller, command, arg) {
            Ok(count) => i64::try_from(count).unwrap_or(i64::MAX),
            Err(error) => error.as_return_code(),
        }
    }

    /// Handle one command.
    ///
    /// ## Errors
    ///
    /// - `NotSupported`: unknown command, or an input command on a context
    ///   without an input device
    /// - `Fault`: the payload could not be copied from `arg`
    /// - anything the validator or the routed component reports
    pub fn dispatch(&self, caller: &dyn UserMemory, command: u32, arg: UserPtr) -> GateResult<usize>
    {
        self.context.stats().command();

        let Some(decoded) = Command::from_raw(command) else {
            warn!(command = format_args!("0x{command:08x}"), "invalid command");
            return Err(GateError::NotSupported(command));
        };
        if decoded.is_input() && !self.context.supports_input() {
            warn!(?decoded, "input command on a context without an input device");
            return Err(GateError::NotSupported(command));
        }

        let mut buffer = [0u8; MAX_PAYLOAD_LEN];
        let payload = &mut buffer[..decoded.payload_len()];
        if let Err(errno) = caller.copy_from_user(arg, payload) {
            warn!(%arg, errno = errno.0, "could not copy parameters from user space");
            return Err(GateError::Fault(format!("could not read {} byte payload at {arg}", payload.len())));
        }

        match decoded {
            Command::ReadMem => self.memory(caller, payload, TransferDirection::Read),
            Command::WriteMem => self.memory(caller, payload, TransferDirection::Write),
            Command::MouseMove => self.mouse_move(payload),
            Command::KeyEvent => self.key_event(payload),
        }
    }

    fn rejected<T>(&self, result: GateResult<T>) -> GateResult<T>
    {
        if result.is_err() {
            self.context.stats().rejected();
        }
        result
    }

    fn memory(&self, caller: &dyn UserMemory, payload: &[u8], direction: TransferDirection) -> GateResult<usize>
    {
        let config = self.context.config();
        let request = self.rejected(MemoryRequest::decode(payload))?;
        let size = self.rejected(validate::memory_request(&request, config))?;

        let stats = self.context.stats();
        let resolver = ProcessResolver::new(self.context.processes(), stats);
        let engine = TransferEngine::new(resolver, config.chunk_size, stats);
        engine.execute(
            caller,
            &TransferRequest {
                pid: request.pid,
                address: request.address,
                size,
                buffer: request.buffer,
                direction,
            },
        )
    }

    fn input_device(&self) -> GateResult<&'c dyn InputDevice>
    {
        // Checked in `dispatch`; kept fallible so routing never panics.
        self.context
            .input_device()
            .ok_or_else(|| GateError::NotSupported(Command::MouseMove.raw()))
    }

    fn mouse_move(&self, payload: &[u8]) -> GateResult<usize>
    {
        let device = self.input_device()?;
        let event = self.rejected(MouseMoveEvent::decode(payload))?;
        self.rejected(validate::mouse_move(&event, self.context.config().mouse_delta_limit))?;

        InputSynthesizer::new(device).mouse_move(&event);
        self.context.stats().input_frame();
        Ok(0)
    }

    fn key_event(&self, payload: &[u8]) -> GateResult<usize>
    {
        let device = self.input_device()?;
        let event = self.rejected(KeyEvent::decode(payload))?;
        self.rejected(validate::key_event(&event, device.capabilities()))?;

        InputSynthesizer::new(device).key(&event);
        self.context.stats().input_frame();
        Ok(0)
    }
}
