//! Process-wide unwind state and its one-time initialization
//!
//! The first capture in the process builds a [`ProcessUnwindContext`]: the
//! parsed memory maps, a thread-cached memory reader and the symbol cache.
//! Construction runs exactly once no matter how many threads race into it.
//! If the maps cannot be parsed, the subsystem stays disabled for the rest of
//! the process and later captures fail without retrying.

use log::{info, warn};
use std::sync::{Arc, OnceLock};

use crate::domain::{InitState, MapsError};
use crate::maps::{Maps, ProcMaps};
use crate::unwinding::{ElfSymbolCache, LocalProcessMemory, ProcessMemory, SymbolLookup, ThreadCachedMemory};

/// Readers shared by every capture in the process
pub struct ProcessUnwindContext {
    maps: Box<dyn Maps>,
    memory: Arc<dyn ProcessMemory>,
    symbols: Box<dyn SymbolLookup>,
}

impl ProcessUnwindContext {
    /// Assemble a context from already-prepared readers
    pub fn new(maps: Box<dyn Maps>, memory: Arc<dyn ProcessMemory>, symbols: Box<dyn SymbolLookup>) -> Self {
        Self { maps, memory, symbols }
    }

    /// Context for the current process
    ///
    /// # Errors
    /// Returns an error if `/proc/self/maps` cannot be read or parsed
    pub fn local() -> Result<Self, MapsError> {
        let maps = ProcMaps::local();
        maps.parse()?;

        // Best-effort: building the reader cannot fail.
        let memory: Arc<dyn ProcessMemory> =
            Arc::new(ThreadCachedMemory::new(Arc::new(LocalProcessMemory::new())));

        Ok(Self::new(Box::new(maps), memory, Box::new(ElfSymbolCache::new())))
    }

    pub fn maps(&self) -> &dyn Maps {
        self.maps.as_ref()
    }

    pub fn memory(&self) -> &dyn ProcessMemory {
        self.memory.as_ref()
    }

    pub fn symbols(&self) -> &dyn SymbolLookup {
        self.symbols.as_ref()
    }
}

/// Exactly-once latch around a value whose construction may fail
///
/// Concurrent callers block until the single construction finishes, then all
/// observe the same outcome. A failed construction is final.
pub struct InitGuard<C> {
    cell: OnceLock<Option<C>>,
}

impl<C> Default for InitGuard<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> InitGuard<C> {
    #[must_use]
    pub const fn new() -> Self {
        Self { cell: OnceLock::new() }
    }

    /// Run `init` if nobody has yet, then return the value if it exists
    pub fn get_or_init<F>(&self, init: F) -> Option<&C>
    where
        F: FnOnce() -> Option<C>,
    {
        self.cell.get_or_init(init).as_ref()
    }

    /// True iff a usable value exists after initialization has run
    pub fn ensure<F>(&self, init: F) -> bool
    where
        F: FnOnce() -> Option<C>,
    {
        self.get_or_init(init).is_some()
    }

    /// The value, without triggering initialization
    pub fn get(&self) -> Option<&C> {
        self.cell.get().and_then(Option::as_ref)
    }

    pub fn state(&self) -> InitState {
        match self.cell.get() {
            None => InitState::Uninitialized,
            Some(Some(_)) => InitState::Ready,
            Some(None) => InitState::Disabled,
        }
    }
}

static PROCESS_CONTEXT: InitGuard<ProcessUnwindContext> = InitGuard::new();

/// Build the context for this process, logging the outcome
pub fn build_local_context() -> Option<ProcessUnwindContext> {
    match ProcessUnwindContext::local() {
        Ok(ctx) => {
            info!("Unwinder ready ({} mappings)", ctx.maps().len());
            Some(ctx)
        }
        Err(e) => {
            warn!("Backtraces disabled for this process: {e}");
            None
        }
    }
}

/// The guard holding the process-wide context
pub fn process_guard() -> &'static InitGuard<ProcessUnwindContext> {
    &PROCESS_CONTEXT
}

/// Initialize the process-wide context if needed; true iff it is usable
pub fn ensure() -> bool {
    PROCESS_CONTEXT.ensure(build_local_context)
}

/// The process-wide context, initializing it on first use
pub fn process_context() -> Option<&'static ProcessUnwindContext> {
    PROCESS_CONTEXT.get_or_init(build_local_context)
}

/// Current lifecycle state of the process-wide context
pub fn init_state() -> InitState {
    PROCESS_CONTEXT.state()
}
