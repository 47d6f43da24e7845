//! # Service Context
//!
//! Everything a running service instance owns: its limits, the host process
//! table, the optional virtual input device, and its counters.
//!
//! A context is built by [`GateContext::init`] and torn down by
//! [`GateContext::shutdown`]. Nothing lives in globals, so several
//! independent contexts can exist side by side (one per test, for example).
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use procgate_core::config::GateConfig;
//! use procgate_core::context::GateContext;
//! use procgate_core::host::memory::{MemoryHost, RecordingInputDevice};
//! use procgate_core::host::InputDevice;
//!
//! let host = Arc::new(MemoryHost::new());
//! let device: Arc<dyn InputDevice> = Arc::new(RecordingInputDevice::new());
//! let context = GateContext::init(GateConfig::default(), host, Some(device))?;
//! assert!(context.supports_input());
//! let stats = context.shutdown();
//! assert_eq!(stats.commands, 0);
//! # Ok::<(), procgate_core::error::GateError>(())
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::config::GateConfig;
use crate::dispatch::Dispatcher;
use crate::error::GateResult;
use crate::host::{InputDevice, ProcessTable};
use crate::stats::{ServiceStats, StatsSnapshot};

/// One service instance
pub struct GateContext
{
    config: GateConfig,
    processes: Arc<dyn ProcessTable>,
    input: Option<Arc<dyn InputDevice>>,
    stats: ServiceStats,
}

impl GateContext
{
    /// Bring a service instance up.
    ///
    /// `input` is the already registered virtual input device, or `None` for
    /// a memory-only service; input commands then answer `NotSupported`.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if `config` fails [`GateConfig::validate`].
    pub fn init(
        config: GateConfig,
        processes: Arc<dyn ProcessTable>,
        input: Option<Arc<dyn InputDevice>>,
    ) -> GateResult<Self>
    {
        config.validate()?;
        info!(
            max_transfer_size = config.max_transfer_size,
            chunk_size = config.chunk_size,
            input = input.as_ref().map(|device| device.capabilities().name.as_str()),
            "service context initialized"
        );
        Ok(Self {
            config,
            processes,
            input,
            stats: ServiceStats::default(),
        })
    }

    /// Tear the instance down, returning its final counters.
    ///
    /// The input device is only released here, never destroyed; its owner
    /// unregisters it.
    pub fn shutdown(self) -> StatsSnapshot
    {
        let snapshot = self.stats.snapshot();
        info!(
            commands = snapshot.commands,
            rejected = snapshot.rejected,
            bytes_read = snapshot.bytes_read,
            bytes_written = snapshot.bytes_written,
            input_frames = snapshot.input_frames,
            "service context shut down"
        );
        snapshot
    }

    /// Entry point for commands.
    #[must_use]
    pub fn dispatcher(&self) -> Dispatcher<'_>
    {
        Dispatcher::new(self)
    }

    /// Active limits.
    #[must_use]
    pub fn config(&self) -> &GateConfig
    {
        &self.config
    }

    /// Host process table.
    #[must_use]
    pub fn processes(&self) -> &dyn ProcessTable
    {
        self.processes.as_ref()
    }

    /// The virtual input device, if this instance has one.
    #[must_use]
    pub fn input_device(&self) -> Option<&dyn InputDevice>
    {
        self.input.as_deref()
    }

    /// `true` if MOUSE_MOVE and KEY_EVENT are available.
    #[must_use]
    pub fn supports_input(&self) -> bool
    {
        self.input.is_some()
    }

    /// Live counters.
    #[must_use]
    pub fn stats(&self) -> &ServiceStats
    {
        &self.stats
    }
}

impl fmt::Debug for GateContext
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("GateContext")
            .field("config", &self.config)
            .field("supports_input", &self.supports_input())
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}
