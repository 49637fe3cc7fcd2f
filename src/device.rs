//! Compute target selection.
//!
//! The target is resolved once, at wrapper construction, and stays fixed for
//! the wrapper's lifetime. It is always passed explicitly; nothing in the
//! crate reads ambient thread-pool or device state.

use serde::{Deserialize, Serialize};
use tracing::info;

/// Where and how heavy numeric work runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputeTarget {
    /// Plain sequential execution.
    SingleThreaded,
    /// Data-parallel execution over the given number of worker threads.
    MultiThreaded { threads: usize },
}

impl ComputeTarget {
    /// Detect a reasonable target from the host: multi-threaded when more
    /// than one core is available, sequential otherwise.
    pub fn detect() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let target = if threads > 1 {
            ComputeTarget::MultiThreaded { threads }
        } else {
            ComputeTarget::SingleThreaded
        };
        info!(?target, "resolved compute target");
        target
    }

    /// Number of worker threads this target allows.
    pub fn threads(&self) -> usize {
        match self {
            ComputeTarget::SingleThreaded => 1,
            ComputeTarget::MultiThreaded { threads } => (*threads).max(1),
        }
    }

    /// Whether data-parallel paths should be taken.
    pub fn is_parallel(&self) -> bool {
        self.threads() > 1
    }
}

impl Default for ComputeTarget {
    fn default() -> Self {
        ComputeTarget::SingleThreaded
    }
}
