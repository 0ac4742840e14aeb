//! ## vakthund-core::lifecycle
//! **Engine lifecycle flag**
//!
//! A lock-free, shareable handle on the engine's coarse phase. The guarded
//! allocator reads it only after a raw allocation has failed, to choose between
//! the fatal and the recoverable failure policy.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::{info, warn};

/// Coarse engine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleStage {
    /// Building configuration and internal tables. Allocation failure is fatal.
    Initializing = 0,
    /// Processing live traffic.
    Running = 1,
    /// Draining and tearing down after live processing. Allocation failure is recoverable.
    ShuttingDown = 2,
}

impl LifecycleStage {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => LifecycleStage::Initializing,
            1 => LifecycleStage::Running,
            _ => LifecycleStage::ShuttingDown,
        }
    }

    #[inline]
    pub fn is_initializing(self) -> bool {
        self == LifecycleStage::Initializing
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleStage::Initializing => "initializing",
            LifecycleStage::Running => "running",
            LifecycleStage::ShuttingDown => "shutting-down",
        })
    }
}

/// Cloneable handle to one shared stage value.
///
/// Clones observe each other's writes. All accesses are `SeqCst`.
#[derive(Clone)]
pub struct LifecycleFlag {
    stage: Arc<AtomicU8>,
}

impl LifecycleFlag {
    /// Creates an independent flag starting at `stage`.
    pub fn new(stage: LifecycleStage) -> Self {
        Self {
            stage: Arc::new(AtomicU8::new(stage as u8)),
        }
    }

    /// The process-wide flag, starting at [`LifecycleStage::Initializing`].
    pub fn process() -> &'static LifecycleFlag {
        static PROCESS: OnceLock<LifecycleFlag> = OnceLock::new();
        PROCESS.get_or_init(|| LifecycleFlag::new(LifecycleStage::Initializing))
    }

    #[inline]
    pub fn get(&self) -> LifecycleStage {
        LifecycleStage::from_raw(self.stage.load(Ordering::SeqCst))
    }

    /// Moves the engine to `stage` and returns the previous stage.
    ///
    /// A move back to `Initializing` once the engine has left it is refused.
    pub fn set(&self, stage: LifecycleStage) -> LifecycleStage {
        let result = self
            .stage
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                let current = LifecycleStage::from_raw(current);
                if stage.is_initializing() && !current.is_initializing() {
                    None
                } else {
                    Some(stage as u8)
                }
            });

        match result {
            Ok(previous) => {
                let previous = LifecycleStage::from_raw(previous);
                if previous != stage {
                    info!(from = %previous, to = %stage, "Engine stage changed");
                }
                previous
            }
            Err(current) => {
                let current = LifecycleStage::from_raw(current);
                warn!(current = %current, "Refusing to return to the initializing stage");
                current
            }
        }
    }
}

impl Default for LifecycleFlag {
    fn default() -> Self {
        Self::new(LifecycleStage::Initializing)
    }
}

impl fmt::Debug for LifecycleFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LifecycleFlag").field(&self.get()).finish()
    }
}
