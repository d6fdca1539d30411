//! Viewer demand tracking
//!
//! Counts attached streaming connections. The production loop reads the
//! count as a best-effort gate: a race with a concurrent attach or detach
//! only shifts transcoding by one frame.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared viewer counter
#[derive(Debug, Clone, Default)]
pub struct DemandTracker {
    viewers: Arc<AtomicUsize>,
}

impl DemandTracker {
    /// Create a tracker with no viewers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a viewer
    ///
    /// The count is decremented when the returned guard is dropped.
    pub fn attach(&self) -> ViewerGuard {
        self.viewers.fetch_add(1, Ordering::Relaxed);
        ViewerGuard {
            viewers: Arc::clone(&self.viewers),
        }
    }

    /// Register a viewer only while fewer than `limit` are attached
    ///
    /// A `limit` of 0 means unlimited.
    pub fn try_attach(&self, limit: usize) -> Option<ViewerGuard> {
        if limit == 0 {
            return Some(self.attach());
        }

        self.viewers
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                (n < limit).then_some(n + 1)
            })
            .ok()
            .map(|_| ViewerGuard {
                viewers: Arc::clone(&self.viewers),
            })
    }

    /// Snapshot of the current viewer count
    pub fn count(&self) -> usize {
        self.viewers.load(Ordering::Relaxed)
    }

    /// Whether at least one viewer is attached
    pub fn has_viewers(&self) -> bool {
        self.count() > 0
    }
}

/// Scoped registration of one viewer
///
/// Consumed on release and decremented in `Drop`, so a connection handler
/// detaches exactly once on every exit path, unwinding included.
#[derive(Debug)]
#[must_use = "dropping the guard detaches the viewer immediately"]
pub struct ViewerGuard {
    viewers: Arc<AtomicUsize>,
}

impl ViewerGuard {
    /// Detach now instead of at end of scope
    pub fn release(self) {}
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        self.viewers.fetch_sub(1, Ordering::Relaxed);
    }
}
