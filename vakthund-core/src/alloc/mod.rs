//! ## vakthund-core::alloc
//! **Guarded allocation layer**
//!
//! ### Policy:
//! - During initialization an allocation failure logs, then exits the process
//! - Once the engine is running the failure is logged and returned to the caller,
//!   which drops the current unit of work and carries on
//!
//! ### Key Submodules:
//! - `raw/`: The unguarded `malloc` family behind a capability trait
//! - `aligned/`: Build-time selected aligned back end (`posix_memalign` or `_aligned_malloc`)
//! - `policy/`: The shared failure routine and the fatal handler capability
//! - `guard/`: `GuardedAllocator`, the front end engine code calls
//! - `strdup/`: Bounded duplication fallback
//! - `fault/`: Fault injection for out-of-memory testing

use std::sync::OnceLock;

use vakthund_config::MemoryConfig;

use crate::lifecycle::LifecycleFlag;

pub mod aligned;
pub mod fault;
pub mod guard;
pub mod policy;
pub mod raw;
pub mod strdup;

pub use aligned::{AlignedBackend, PlatformAligned};
pub use fault::FaultInjector;
pub use guard::GuardedAllocator;
pub use policy::{FatalHandler, PanicOnFatal, ProcessExit, FATAL_MESSAGE};
pub use raw::{RawAllocator, SystemAllocator};

static GLOBAL: OnceLock<GuardedAllocator> = OnceLock::new();

/// Process-wide guarded allocator bound to [`LifecycleFlag::process`].
///
/// Uses default settings unless [`init_global`] ran first.
pub fn global() -> &'static GuardedAllocator {
    GLOBAL.get_or_init(|| GuardedAllocator::system(LifecycleFlag::process().clone()))
}

/// Configures the process-wide allocator. Only the first call has an effect.
pub fn init_global(config: &MemoryConfig) -> &'static GuardedAllocator {
    GLOBAL.get_or_init(|| GuardedAllocator::from_config(LifecycleFlag::process().clone(), config))
}
