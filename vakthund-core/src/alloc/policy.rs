//! ## vakthund-core::alloc::policy
//! **Stage-gated failure policy**
//!
//! Every guarded primitive funnels a failed raw allocation through
//! [`enforce`]. While the engine is initializing the failure is logged twice
//! (allocation failure, then fatal) and handed to the [`FatalHandler`], which
//! never returns. In any later stage it is logged once and given back to the
//! caller.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::error;

use crate::error::{AllocationFailed, LogCode};
use crate::lifecycle::LifecycleFlag;

/// Message of the fatal log entry.
pub const FATAL_MESSAGE: &str = "Out of memory. The engine cannot be initialized. Exiting...";

/// Terminates the engine after an allocation failure during initialization.
pub trait FatalHandler: Send + Sync {
    fn terminate(&self, failure: &AllocationFailed) -> !;
}

/// Exits the process with a non-zero status.
#[derive(Debug, Clone, Copy)]
pub struct ProcessExit {
    code: i32,
}

impl ProcessExit {
    /// Codes whose low byte is zero (0, 256, -256, ...) are replaced by 1,
    /// since POSIX truncates the status to 8 bits and would report success.
    pub fn with_code(code: i32) -> Self {
        Self {
            code: if code & 0xFF == 0 { 1 } else { code },
        }
    }

    pub fn code(&self) -> i32 {
        self.code
    }
}

impl Default for ProcessExit {
    fn default() -> Self {
        Self::with_code(1)
    }
}

impl FatalHandler for ProcessExit {
    fn terminate(&self, _failure: &AllocationFailed) -> ! {
        std::process::exit(self.code)
    }
}

/// Counts fatal requests and unwinds instead of exiting.
///
/// Lets the initialization path run inside a test process; the panic can be
/// caught with `std::panic::catch_unwind`.
#[derive(Debug, Default)]
pub struct PanicOnFatal {
    hits: AtomicUsize,
}

impl PanicOnFatal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times termination was requested.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl FatalHandler for PanicOnFatal {
    fn terminate(&self, failure: &AllocationFailed) -> ! {
        self.hits.fetch_add(1, Ordering::SeqCst);
        panic!("fatal allocation failure during initialization: {failure}")
    }
}

/// Applies the stage policy to `failure`.
///
/// Returns the failure for the caller only when the engine is past
/// initialization; otherwise `fatal` terminates.
pub(crate) fn enforce<F: FatalHandler + ?Sized>(
    stage: &LifecycleFlag,
    fatal: &F,
    failure: AllocationFailed,
) -> AllocationFailed {
    let current = stage.get();
    error!(
        code = %LogCode::MemAlloc,
        op = %failure.op,
        size = failure.request.size,
        count = ?failure.request.count,
        alignment = ?failure.request.alignment,
        stage = %current,
        "{failure}"
    );

    if current.is_initializing() {
        error!(code = %LogCode::Fatal, severity = "fatal", "{FATAL_MESSAGE}");
        fatal.terminate(&failure);
    }
    failure
}
