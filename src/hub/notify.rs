//! Coalescing broadcast of "new viewer frame" events
//!
//! Built on `tokio::sync::watch` carrying a sequence number. Every watcher
//! tracks the last sequence it saw on its own, so one viewer waking up never
//! consumes the wake-up of another, and several notifications between two
//! waits collapse into a single one.

use tokio::sync::watch;

/// Producer side of the notification channel
#[derive(Debug)]
pub struct FrameNotifier {
    tx: watch::Sender<u64>,
}

impl FrameNotifier {
    /// Create a notifier with no events published yet
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx }
    }

    /// Signal that a new viewer frame is available
    ///
    /// Never blocks and succeeds even when nobody is watching.
    pub fn notify(&self) {
        self.tx.send_modify(|seq| *seq = seq.wrapping_add(1));
    }

    /// Number of events published so far
    pub fn sequence(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Create a watcher that wakes on the next event after this call
    pub fn subscribe(&self) -> FrameWatcher {
        FrameWatcher {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live watchers
    pub fn watcher_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for FrameNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer side, one per streaming connection
#[derive(Debug)]
pub struct FrameWatcher {
    rx: watch::Receiver<u64>,
}

impl FrameWatcher {
    /// Wait until an event newer than the last one seen is published
    ///
    /// Returns `false` once the notifier is gone and no further events can
    /// arrive.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Sequence number of the last event seen by this watcher
    pub fn seen(&mut self) -> u64 {
        *self.rx.borrow_and_update()
    }
}
