//! Dual-resolution frame store
//!
//! Holds the latest full-resolution frame and the latest viewer-resolution
//! frame. Both slots sit behind one `RwLock` so a reader never sees one slot
//! mid-update relative to the other.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::frame::Frame;

#[derive(Debug, Default)]
struct Slots {
    full: Option<Frame>,
    viewer: Option<Frame>,
}

/// Latest-value holder for the two resolution classes
///
/// Written only by the production loop, read concurrently by viewers and the
/// command dispatcher. Critical sections are plain assignments or clones, so
/// the lock is never held across an `.await`.
#[derive(Debug, Default)]
pub struct FrameStore {
    slots: RwLock<Slots>,
}

impl FrameStore {
    /// Create a store with both slots empty
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the full-resolution slot
    pub fn store_full(&self, frame: Frame) {
        self.write().full = Some(frame);
    }

    /// Replace the viewer-resolution slot
    ///
    /// The caller must already have stored the full frame this one was
    /// derived from; [`store_pair`](Self::store_pair) does both at once.
    pub fn store_viewer(&self, frame: Frame) {
        self.write().viewer = Some(frame);
    }

    /// Replace both slots in a single exclusive section
    pub fn store_pair(&self, full: Frame, viewer: Frame) {
        let mut slots = self.write();
        slots.full = Some(full);
        slots.viewer = Some(viewer);
    }

    /// Latest full-resolution frame, if one was ever stored
    pub fn read_full(&self) -> Option<Frame> {
        self.read().full.clone()
    }

    /// Latest viewer-resolution frame, if one was ever produced
    pub fn read_viewer(&self) -> Option<Frame> {
        self.read().viewer.clone()
    }

    /// Both slots as seen at one instant
    pub fn read_pair(&self) -> (Option<Frame>, Option<Frame>) {
        let slots = self.read();
        (slots.full.clone(), slots.viewer.clone())
    }

    // Writers never panic while holding the lock, so a poisoned lock still
    // guards consistent slots.
    fn read(&self) -> RwLockReadGuard<'_, Slots> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slots> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }
}
