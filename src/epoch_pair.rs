// src/epoch_pair.rs

use crate::error::{EngineResult, ScheduleError};
use crate::op_heap::{OpHeap, OpHeapEntry};
use crate::ops::{OpId, OpKind, Operation};

/// Two operation heaps serving one queue role across clock wraparound.
///
/// The play clock restarts at 0 every loop, so a single heap keyed by
/// sample index would misorder entries scheduled on either side of a wrap.
/// New entries always go into the primary heap, keyed in the current
/// epoch's frame (keys may run past the loop end into the next epoch).
/// When the play head wraps the designation flips: the primary becomes
/// the secondary, and its keys are read relative to the epoch that just
/// ended.
///
/// Invariant: the secondary must be drained before the next flip. Entries
/// still in it at that point belong to a third epoch and are discarded.
#[derive(Debug)]
pub struct EpochPair {
    heaps: [OpHeap; 2],

    /// Index of the heap accepting new entries
    primary: usize,

    /// Length of the epoch that ended at the last flip
    carried: u32,

    name: &'static str,
}

impl EpochPair {
    pub fn with_capacity(name: &'static str, capacity: usize) -> EngineResult<Self> {
        Ok(Self {
            heaps: [OpHeap::with_capacity(capacity)?, OpHeap::with_capacity(capacity)?],
            primary: 0,
            carried: 0,
            name,
        })
    }

    #[inline]
    fn secondary(&self) -> usize {
        1 - self.primary
    }

    /// Total entries across both epochs.
    #[inline]
    pub fn len(&self) -> usize {
        self.heaps[0].len() + self.heaps[1].len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heaps.iter().all(OpHeap::is_empty)
    }

    /// Insert into the current epoch. `key` is in the current epoch's frame.
    pub fn push(&mut self, op: Operation, key: u32) -> Result<(), ScheduleError> {
        let heap = &mut self.heaps[self.primary];
        let capacity = heap.capacity();
        heap.push(op, key)
            .map_err(|_| ScheduleError::SchedulingOverflow {
                queue: self.name,
                capacity,
            })
    }

    /// Which heap holds the earliest entry, and that entry's key in the
    /// current frame. The secondary wins ties since it is the older epoch.
    fn earliest(&self) -> Option<(usize, u32)> {
        let secondary = self.secondary();
        let older = self.heaps[secondary]
            .front()
            .map(|entry| entry.key.saturating_sub(self.carried));
        let newer = self.heaps[self.primary].front().map(|entry| entry.key);

        match (older, newer) {
            (Some(o), Some(n)) if n < o => Some((self.primary, n)),
            (Some(o), _) => Some((secondary, o)),
            (None, Some(n)) => Some((self.primary, n)),
            (None, None) => None,
        }
    }

    /// Earliest entry with its key translated into the current frame.
    pub fn front(&self) -> Option<OpHeapEntry> {
        let (heap, key) = self.earliest()?;
        self.heaps[heap]
            .front()
            .map(|entry| OpHeapEntry { key, op: entry.op })
    }

    /// Remove the earliest entry, key translated into the current frame.
    pub fn pop(&mut self) -> Option<OpHeapEntry> {
        let (heap, key) = self.earliest()?;
        self.heaps[heap]
            .pop()
            .map(|entry| OpHeapEntry { key, op: entry.op })
    }

    /// Pop the earliest entry if it is due at sample `now`.
    #[inline]
    pub fn pop_due(&mut self, now: u32) -> Option<OpHeapEntry> {
        match self.earliest() {
            Some((_, key)) if key <= now => self.pop(),
            _ => None,
        }
    }

    /// Called when the play head wraps after an epoch of `epoch_length`.
    ///
    /// Entries that outlived two epochs are handed to `discard`. Returns
    /// how many there were.
    pub fn flip(&mut self, epoch_length: u32, mut discard: impl FnMut(OpHeapEntry)) -> usize {
        let secondary = self.secondary();
        let stale = &mut self.heaps[secondary];
        let mut discarded = 0;
        while let Some(entry) = stale.pop() {
            discard(entry);
            discarded += 1;
        }

        self.primary = self.secondary();
        self.carried = epoch_length;
        discarded
    }

    /// Latest entry of `kind` that is due by `now`, key in the current frame.
    ///
    /// Entries from the current epoch are preferred over carried ones.
    pub fn latest_due_of_kind_mut(
        &mut self,
        kind: OpKind,
        now: u32,
    ) -> Option<(u32, &mut Operation)> {
        let carried = self.carried;
        let [a, b] = &mut self.heaps;
        let (primary, secondary) = if self.primary == 0 { (a, b) } else { (b, a) };

        if let Some(entry) = primary.latest_of_kind_mut(kind, now) {
            return Some((entry.key, &mut entry.op));
        }
        secondary
            .latest_of_kind_mut(kind, now.saturating_add(carried))
            .map(|entry| (entry.key.saturating_sub(carried), &mut entry.op))
    }

    /// Remove operation `id` from either epoch, key in the current frame.
    pub fn remove(&mut self, id: OpId) -> Option<OpHeapEntry> {
        if let Some(entry) = self.heaps[self.primary].remove(id) {
            return Some(entry);
        }
        let secondary = self.secondary();
        self.heaps[secondary].remove(id).map(|entry| OpHeapEntry {
            key: entry.key.saturating_sub(self.carried),
            op: entry.op,
        })
    }

    /// Drop every entry and return to the first epoch.
    pub fn clear(&mut self) {
        for heap in &mut self.heaps {
            heap.clear();
        }
        self.primary = 0;
        self.carried = 0;
    }
}
