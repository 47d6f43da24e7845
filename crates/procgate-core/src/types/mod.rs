//! # Types
//!
//! Strongly typed values shared by every stage of a command: the target
//! process id, addresses in the target and in the caller, and the transfer
//! direction.

pub mod address;
pub mod process;

// Re-export all public types
pub use address::{Address, UserPtr};
pub use process::{ProcessId, TransferDirection};
