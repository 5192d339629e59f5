//! Single-slot "latest frame wins" handoff between the pipeline and a renderer.
//!
//! Publishing replaces whatever the slot holds; nothing is queued. A reader
//! always gets a whole `Arc<FrameEnvelope>` or nothing. The lock is held only
//! for the pointer swap, so neither side waits on the other's frame work.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::frame::FrameEnvelope;

#[derive(Debug, Default)]
pub struct FrameBus {
    slot: Mutex<Slot>,
    published: AtomicU64,
    superseded_unread: AtomicU64,
}

#[derive(Debug, Default)]
struct Slot {
    envelope: Option<Arc<FrameEnvelope>>,
    /// Whether `envelope` has been handed to a reader.
    fetched: bool,
}

/// Publish counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BusStats {
    pub published: u64,
    /// Envelopes replaced before any reader fetched them.
    pub superseded_unread: u64,
}

impl FrameBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the slot contents. Never blocks on consumers, never fails.
    pub fn publish(&self, envelope: Arc<FrameEnvelope>) {
        let previous = {
            let mut slot = self.lock();
            let previous = slot.envelope.replace(envelope);
            if previous.is_some() && !slot.fetched {
                self.superseded_unread.fetch_add(1, Ordering::Relaxed);
            }
            slot.fetched = false;
            previous
        };
        self.published.fetch_add(1, Ordering::Relaxed);
        // Last reference to the superseded envelope is dropped outside the lock.
        drop(previous);
    }

    /// Most recent envelope, if any. Returns the same envelope until a newer publish.
    pub fn latest(&self) -> Option<Arc<FrameEnvelope>> {
        let mut slot = self.lock();
        let latest = slot.envelope.clone();
        if latest.is_some() {
            slot.fetched = true;
        }
        latest
    }

    /// Empty the slot.
    pub fn clear(&self) {
        let previous = self.lock().envelope.take();
        drop(previous);
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.published.load(Ordering::Relaxed),
            superseded_unread: self.superseded_unread.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // Critical sections only swap pointers, so a poisoned slot is still consistent.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
