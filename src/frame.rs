//! Captured frames and the rolling history ring.
//!
//! - `Frame`: immutable image bytes plus the wall-clock capture stamp.
//! - `SnapshotRing`: fixed-capacity circular store of `Option<Frame>` slots.
//!
//! The ring has no locking of its own. `Recorder` owns it behind its state
//! mutex and is the only writer.

use anyhow::{anyhow, Result};
use std::sync::Arc;

use crate::CaptureTime;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One captured image.
///
/// The byte buffer is shared, so copying a frame into a history snapshot does
/// not duplicate pixel data. Nothing can mutate the bytes after capture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Arc<[u8]>,
    pub captured_at: CaptureTime,
}

impl Frame {
    pub fn new(data: Vec<u8>, captured_at: CaptureTime) -> Self {
        Self {
            data: data.into(),
            captured_at,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ----------------------------------------------------------------------------
// SnapshotRing
// ----------------------------------------------------------------------------

/// Fixed-capacity ring of frame slots.
///
/// A slot is `None` until a frame lands in it, and again whenever a capture
/// tick came back empty. Every index is reduced modulo the capacity.
#[derive(Clone, Debug)]
pub struct SnapshotRing {
    slots: Vec<Option<Frame>>,
}

impl SnapshotRing {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(anyhow!("history size must be > 0"));
        }
        Ok(Self {
            slots: vec![None; capacity],
        })
    }

    /// Store a frame (or an absent marker) at `index`.
    pub fn put(&mut self, index: usize, frame: Option<Frame>) {
        let slot = index % self.slots.len();
        self.slots[slot] = frame;
    }

    pub fn get(&self, index: usize) -> Option<&Frame> {
        self.slots[index % self.slots.len()].as_ref()
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots currently holding a frame.
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Copy every slot, starting at `start` and wrapping around.
    ///
    /// With `start` set to the write cursor this yields the history oldest
    /// first.
    pub fn snapshot_from(&self, start: usize) -> Vec<Option<Frame>> {
        let size = self.slots.len();
        (0..size)
            .map(|offset| self.slots[(start + offset) % size].clone())
            .collect()
    }

    /// Approximate bytes held by the ring.
    pub fn memory_bytes(&self) -> usize {
        self.slots.iter().flatten().map(Frame::len).sum()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
