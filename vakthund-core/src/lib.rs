//! # vakthund-core
//!
//! Foundation layer for memory management in the Vakthund packet-inspection engine.
//!
//! Every allocation site in the engine goes through a guarded primitive with one
//! failure policy: an out-of-memory condition while the engine is still
//! initializing is fatal, and the same condition while processing live traffic is
//! an ordinary, recoverable error.
//!
//! ### Key Submodules:
//! - `lifecycle`: Lock-free engine stage flag
//! - `alloc`: Guarded `malloc`/`calloc`/`realloc`/`free`, aligned and string primitives
//! - `error`: `AllocationFailed` and the log codes attached to failure entries

pub mod alloc;
pub mod error;
pub mod lifecycle;

pub mod prelude {
    pub use crate::alloc::*;
    pub use crate::error::*;
    pub use crate::lifecycle::*;
}

pub use error::AllocationFailed;
pub use lifecycle::{LifecycleFlag, LifecycleStage};
