//! Frame hub: shared state between production and viewers
//!
//! The hub owns the dual-resolution frame store, the viewer demand counter
//! and the new-frame notifier. It is built once at startup and handed to the
//! producer, the HTTP server and the command dispatcher as an `Arc`.
//!
//! # Architecture
//!
//! ```text
//!                            Arc<FrameHub>
//!                     ┌──────────────────────────┐
//!                     │ store:    RwLock<{full,  │
//!                     │                 viewer}> │
//!                     │ demand:   AtomicUsize    │
//!                     │ notifier: watch<u64>     │
//!                     └────────────┬─────────────┘
//!                                  │
//!         ┌────────────────────────┼────────────────────────┐
//!         │                        │                        │
//!         ▼                        ▼                        ▼
//!    [Producer]              [ViewerStream]          [CommandDispatcher]
//!    demand.count()          demand.attach()         store.read_full()
//!    transcode()             watcher.changed()             │
//!    store.store_pair()      store.read_viewer()           ▼
//!    notifier.notify() ────► write part ──► HTTP      snapshot file
//! ```
//!
//! # Zero-Copy Design
//!
//! Frames are `bytes::Bytes`. Reading a slot clones a reference-counted
//! handle, so every viewer shares one allocation per produced frame and no
//! reader can observe one being written.

pub mod demand;
pub mod frame;
pub mod notify;
pub mod store;

pub use demand::{DemandTracker, ViewerGuard};
pub use frame::{Frame, Resolution};
pub use notify::{FrameNotifier, FrameWatcher};
pub use store::FrameStore;

use crate::stats::{PipelineStats, StatsSnapshot};

/// Shared pipeline state
#[derive(Debug, Default)]
pub struct FrameHub {
    store: FrameStore,
    demand: DemandTracker,
    notifier: FrameNotifier,
    stats: PipelineStats,
}

impl FrameHub {
    /// Create a hub with empty slots and no viewers
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &FrameStore {
        &self.store
    }

    pub fn demand(&self) -> &DemandTracker {
        &self.demand
    }

    pub fn notifier(&self) -> &FrameNotifier {
        &self.notifier
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Register a viewer and subscribe it to new-frame events
    ///
    /// Returns `None` when `limit` viewers are already attached (0 = no
    /// limit).
    pub fn attach_viewer(&self, limit: usize) -> Option<(ViewerGuard, FrameWatcher)> {
        let guard = self.demand.try_attach(limit)?;
        self.stats.record_viewer();
        Some((guard, self.notifier.subscribe()))
    }

    /// Counters plus the current viewer count
    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot(self.demand.count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_viewer_counts() {
        let hub = FrameHub::new();

        let (guard, _watcher) = hub.attach_viewer(0).unwrap();
        assert_eq!(hub.demand().count(), 1);
        assert_eq!(hub.notifier().watcher_count(), 1);

        let snap = hub.snapshot();
        assert_eq!(snap.active_viewers, 1);
        assert_eq!(snap.viewers_total, 1);

        drop(guard);
        assert_eq!(hub.demand().count(), 0);
        assert_eq!(hub.snapshot().viewers_total, 1);
    }

    #[test]
    fn test_attach_viewer_limit() {
        let hub = FrameHub::new();

        let _first = hub.attach_viewer(1).unwrap();
        assert!(hub.attach_viewer(1).is_none());
        assert_eq!(hub.snapshot().viewers_total, 1);
    }
}
