//! Single-slot, most-recent-wins frame buffer shared between the transport callback and the
//! pipeline worker.

use std::sync::Arc;
use std::time::Duration;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use crate::common::Frame;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameStoreStats {
    pub received: u64,
    /// Frames overwritten before the pipeline took them.
    pub superseded: u64,
    pub taken: u64,
}

#[derive(Debug, Default)]
struct Slot {
    frame: Option<Frame>,
    stats: FrameStoreStats,
}

/// Holds at most one frame. Cloning gives another handle to the same slot.
#[derive(Debug, Clone, Default)]
pub struct FrameStore {
    inner: Arc<(Mutex<Slot>, Condvar)>,
}

impl FrameStore {
    pub fn new() -> Self {
        Default::default()
    }

    /// Replaces whatever frame is stored. An unconsumed older frame is dropped without error.
    pub fn put(&self, frame: Frame) {
        let (lock, ready) = &*self.inner;
        let mut slot = lock.lock();
        slot.stats.received += 1;
        if let Some(old) = slot.frame.replace(frame) {
            slot.stats.superseded += 1;
            log::trace!("Frame {} superseded before processing", old.seq());
        }
        drop(slot);
        ready.notify_one();
    }

    /// Takes the stored frame, leaving the slot empty. Never blocks on an empty slot.
    pub fn take_current(&self) -> Option<Frame> {
        let mut slot = self.inner.0.lock();
        let frame = slot.frame.take();
        if frame.is_some() {
            slot.stats.taken += 1;
        }
        frame
    }

    /// Waits up to `timeout` for a frame to be stored. Returns whether one is pending;
    /// the frame itself stays in the slot for [`take_current`](Self::take_current).
    pub fn wait_for_frame(&self, timeout: Duration) -> bool {
        let (lock, ready) = &*self.inner;
        let mut slot = lock.lock();
        if slot.frame.is_none() {
            let _ = ready.wait_for(&mut slot, timeout);
        }
        slot.frame.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.0.lock().frame.is_none()
    }

    pub fn stats(&self) -> FrameStoreStats {
        self.inner.0.lock().stats
    }
}
