//! # procgate Utilities
//!
//! Shared utilities and logging for procgate.
//!
//! The core library only emits `tracing` events; binaries call one of the
//! initializers here to decide where those events go.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{default_log_file, init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingError};
pub use tracing::{debug, error, info, trace, warn};
