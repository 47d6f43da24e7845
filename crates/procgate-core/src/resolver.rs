//! # Process Resolver
//!
//! Maps a process id to a [`TargetProcessHandle`], a durable reference to the
//! live process that is released exactly once when the handle drops.
//!
//! ## Ordering
//!
//! 1. Enter a read-side traversal of the process table
//! 2. Find the entry (ephemeral reference, borrowed from the traversal)
//! 3. Pin it (durable reference, lifetime counter incremented)
//! 4. Leave the traversal
//!
//! Step 3 must precede step 4 or the process could be freed in between. The
//! entry's borrow of the traversal makes any other order fail to compile.
//!
//! Resolution never touches the address space.

use std::fmt;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::error::{GateError, GateResult};
use crate::host::{AddressSpace, ExecutionContext, ProcessTable};
use crate::stats::ServiceStats;
use crate::types::ProcessId;

/// Resolves process ids against one process table
pub struct ProcessResolver<'a>
{
    table: &'a dyn ProcessTable,
    stats: &'a ServiceStats,
}

impl<'a> ProcessResolver<'a>
{
    /// Resolver over `table`, counting handles in `stats`.
    #[must_use]
    pub fn new(table: &'a dyn ProcessTable, stats: &'a ServiceStats) -> Self
    {
        Self { table, stats }
    }

    /// Take a durable reference to the process named by `pid`.
    ///
    /// ## Errors
    ///
    /// `NotFound` if no live process has that id.
    pub fn resolve(&self, pid: ProcessId) -> GateResult<TargetProcessHandle<'a>>
    {
        let context = {
            let traversal = self.table.traverse();
            let Some(entry) = traversal.find(pid) else {
                warn!(pid = pid.raw(), "could not locate process");
                return Err(GateError::NotFound(pid));
            };
            entry.pin()
        };

        Ok(TargetProcessHandle::new(context, self.stats))
    }
}

/// RAII handle on a resolved process
///
/// Owned by exactly one transfer. Dropping it releases the durable reference
/// taken during resolution; there is no other way to release it, so every
/// exit path releases exactly once.
pub struct TargetProcessHandle<'s>
{
    context: Arc<dyn ExecutionContext>,
    stats: &'s ServiceStats,
}

impl<'s> TargetProcessHandle<'s>
{
    fn new(context: Arc<dyn ExecutionContext>, stats: &'s ServiceStats) -> Self
    {
        stats.handle_acquired();
        trace!(pid = context.pid().raw(), "acquired process reference");
        Self { context, stats }
    }

    /// Id of the referenced process.
    #[must_use]
    pub fn pid(&self) -> ProcessId
    {
        self.context.pid()
    }

    /// The process's address space.
    ///
    /// ## Errors
    ///
    /// `NotFound` if the process has no user address space.
    pub fn address_space(&self) -> GateResult<Arc<dyn AddressSpace>>
    {
        self.context.address_space().ok_or_else(|| {
            warn!(pid = self.pid().raw(), "no memory map for process");
            GateError::NotFound(self.pid())
        })
    }
}

impl fmt::Debug for TargetProcessHandle<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("TargetProcessHandle").field("pid", &self.pid()).finish()
    }
}

impl Drop for TargetProcessHandle<'_>
{
    fn drop(&mut self)
    {
        trace!(pid = self.context.pid().raw(), "released process reference");
        self.stats.handle_released();
    }
}
