//! # procgate-core
//!
//! A privileged service that lets a caller read and write the memory of
//! another process by pid, and inject relative mouse motion and keyboard
//! events through a registered virtual input device.
//!
//! The service is made of:
//! - A command dispatcher ([`dispatch`]) behind a single ioctl-style entry
//! - A request validator ([`validate`])
//! - A process resolver ([`resolver`]) that turns a pid into a scoped handle
//! - A chunked memory transfer engine ([`transfer`])
//! - An input event synthesizer ([`input`])
//!
//! Everything the service needs from its host (process table, address
//! spaces, the caller's memory, the input device) sits behind the traits in
//! [`host`].
//!
//! ## Platform Support
//!
//! - **Any**: the in-memory host in [`host::memory`]
//! - **Linux**: procfs, in `platform::linux`

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod input;
pub mod platform;
pub mod resolver;
pub mod stats;
pub mod transfer;
pub mod types;
pub mod validate;
pub mod wire;

pub use config::GateConfig;
pub use context::GateContext;
pub use dispatch::Dispatcher;
pub use error::{GateError, GateResult};
pub use stats::StatsSnapshot;
pub use types::{Address, ProcessId, TransferDirection, UserPtr};
pub use wire::{Command, KeyEvent, MemoryRequest, MouseMoveEvent};
