//! Playback queue: an ordered playlist with a cursor.
//!
//! Backed by an index-stable growable array. Popping advances the cursor
//! without removing anything, so the played part of the list stays intact
//! until an explicit `clear`. Emptiness is defined by the cursor alone: a
//! queue whose cursor ran past the end reports empty even though its list
//! is still populated, and a later `add` re-seeds playback at the first
//! new item.

use std::path::PathBuf;

use parking_lot::Mutex;

use crate::library::FileId;

/// One queued track, resolved at enqueue time so the player never needs
/// the library.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub file: FileId,
    pub path: PathBuf,
    pub name: String,
}

/// Queue errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// `add` rejects an empty selection.
    #[error("empty selection")]
    EmptySelection,
}

struct Inner {
    items: Vec<QueueItem>,
    cursor: usize,
}

/// Mutex-guarded playback queue; shared between the control side and the
/// player. The mutex is the queue's own, independent of the player mutex
/// (lock order is always player, then queue).
pub struct PlayQueue {
    inner: Mutex<Inner>,
}

impl PlayQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: Vec::new(),
                cursor: 0,
            }),
        }
    }

    /// Append a whole selection in one atomic step.
    ///
    /// If the cursor had run past the end (queue consumed but never
    /// cleared), the first new item becomes the next track.
    pub fn add(&self, selection: Vec<QueueItem>) -> Result<(), QueueError> {
        if selection.is_empty() {
            return Err(QueueError::EmptySelection);
        }
        self.inner.lock().items.extend(selection);
        Ok(())
    }

    /// Take the cursor item and advance. `None` when the queue is spent.
    pub fn pop(&self) -> Option<QueueItem> {
        let mut inner = self.inner.lock();
        let item = inner.items.get(inner.cursor).cloned()?;
        inner.cursor += 1;
        Some(item)
    }

    /// Drop all items, played or not, and reset the cursor.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.items.clear();
        inner.cursor = 0;
    }

    /// True when no unplayed item remains. Defined by the cursor, not by
    /// the list length.
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        inner.cursor >= inner.items.len()
    }

    pub fn is_filled(&self) -> bool {
        !self.is_empty()
    }

    /// Total items held, including already played ones.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }
}

impl Default for PlayQueue {
    fn default() -> Self {
        Self::new()
    }
}
