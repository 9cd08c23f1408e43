// src/op_heap.rs

use crate::error::{EngineError, EngineResult, ScheduleError};
use crate::ops::{OpId, OpKind, Operation};

/// One heap slot: an operation and the sample index it is ordered by.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct OpHeapEntry {
    pub key: u32,
    pub op: Operation,
}

/// Fixed-capacity binary min-heap of operations.
///
/// The entry with the lowest `key` is always at the front. The queued
/// heap is keyed by start time, the active heap by end time.
///
/// Storage is reserved once at construction and never grows, so
/// `push` and `pop` are safe to call from the audio thread.
/// Entries with equal keys come out in unspecified order.
#[derive(Debug)]
pub struct OpHeap {
    entries: Vec<OpHeapEntry>,
    capacity: usize,
}

impl OpHeap {
    pub fn with_capacity(capacity: usize) -> EngineResult<Self> {
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(capacity)
            .map_err(|_| EngineError::AllocationFailure {
                what: "operation heap",
                requested: capacity,
            })?;

        Ok(Self { entries, capacity })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    /// Entry with the lowest key, if any.
    #[inline]
    pub fn front(&self) -> Option<&OpHeapEntry> {
        self.entries.first()
    }

    /// Insert an operation.
    ///
    /// Fails without touching the heap when it is full.
    pub fn push(&mut self, op: Operation, key: u32) -> Result<(), ScheduleError> {
        if self.is_full() {
            return Err(ScheduleError::SchedulingOverflow {
                queue: "operation",
                capacity: self.capacity,
            });
        }

        self.entries.push(OpHeapEntry { key, op });
        self.sift_up(self.entries.len() - 1);

        Ok(())
    }

    /// Remove and return the entry with the lowest key.
    pub fn pop(&mut self) -> Option<OpHeapEntry> {
        let last = self.entries.pop()?;
        if self.entries.is_empty() {
            return Some(last);
        }

        let front = std::mem::replace(&mut self.entries[0], last);
        self.sift_down(0);
        Some(front)
    }

    /// Remove the entry holding operation `id`, wherever it sits.
    pub fn remove(&mut self, id: OpId) -> Option<OpHeapEntry> {
        let index = self.entries.iter().position(|entry| entry.op.id == id)?;
        let last = self.entries.pop()?;
        if index == self.entries.len() {
            return Some(last);
        }

        let removed = std::mem::replace(&mut self.entries[index], last);
        if self.sift_up(index) == index {
            self.sift_down(index);
        }
        Some(removed)
    }

    // Walk up from `index`, moving each parent with a greater key down one
    // level until the hole reaches the right spot. Returns the final index.
    fn sift_up(&mut self, mut index: usize) -> usize {
        let entry = self.entries[index];
        while index > 0 {
            let parent = (index - 1) >> 1;
            if self.entries[parent].key <= entry.key {
                break;
            }
            self.entries[index] = self.entries[parent];
            index = parent;
        }
        self.entries[index] = entry;
        index
    }

    fn sift_down(&mut self, mut index: usize) {
        let entry = self.entries[index];
        let count = self.entries.len();
        loop {
            let mut child = (index << 1) + 1;
            if child >= count {
                break;
            }
            let other = child + 1;
            if other < count && self.entries[other].key <= self.entries[child].key {
                child = other;
            }
            if entry.key <= self.entries[child].key {
                break;
            }
            self.entries[index] = self.entries[child];
            index = child;
        }
        self.entries[index] = entry;
    }

    /// Empty the heap by popping every entry.
    pub fn clear(&mut self) {
        while self.pop().is_some() {}
    }

    /// Latest entry of `kind` keyed at or before `due_by`, for in-place
    /// edits that leave the key untouched.
    pub fn latest_of_kind_mut(&mut self, kind: OpKind, due_by: u32) -> Option<&mut OpHeapEntry> {
        self.entries
            .iter_mut()
            .filter(|entry| entry.op.matches_type(kind) && entry.key <= due_by)
            .max_by_key(|entry| entry.key)
    }

    #[cfg(test)]
    fn is_heap(&self) -> bool {
        (1..self.entries.len()).all(|i| self.entries[(i - 1) / 2].key <= self.entries[i].key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op_at(start: u32) -> Operation {
        Operation::reverse(start, 1)
    }

    /// Push a sequence, checking the lowest stored key is always in front,
    /// then pop everything and check it comes out sorted.
    fn check_sequence(size: usize, sequence: &[u32]) {
        let mut heap = OpHeap::with_capacity(size).unwrap();
        let mut stored: Vec<u32> = Vec::new();

        for &value in sequence {
            let pushed = heap.push(op_at(value), value).is_ok();
            assert_eq!(pushed, stored.len() < size);
            if pushed {
                stored.push(value);
            }

            let lowest = *stored.iter().min().unwrap();
            assert_eq!(heap.front().unwrap().op.start, lowest);
            assert!(heap.is_heap());
        }

        stored.sort();
        for expected in stored {
            assert_eq!(heap.front().unwrap().key, expected);
            assert_eq!(heap.pop().unwrap().op.start, expected);
            assert!(heap.is_heap());
        }
        assert!(heap.is_empty());
        assert!(heap.pop().is_none());
    }

    #[test]
    fn test_front_tracks_minimum() {
        let mut heap = OpHeap::with_capacity(3).unwrap();
        let mut fronts = Vec::new();
        for key in [5, 1, 9] {
            heap.push(op_at(key), key).unwrap();
            fronts.push(heap.front().unwrap().key);
        }
        assert_eq!(fronts, vec![5, 1, 1]);

        assert_eq!(heap.pop().unwrap().key, 1);
        assert_eq!(heap.pop().unwrap().key, 5);
        assert_eq!(heap.pop().unwrap().key, 9);
    }

    #[test]
    fn test_sequences() {
        check_sequence(3, &[5, 1, 9]);
        check_sequence(5, &[5, 1, 9]);
        check_sequence(2, &[5, 1, 9]);
        check_sequence(10, &[5, 9, 3, 3, 7, 4, 10, 33, 1]);
        check_sequence(4, &[5, 9, 3, 3, 7, 4, 10, 33, 1]);
    }

    #[test]
    fn test_push_into_full_heap_is_rejected() {
        let mut heap = OpHeap::with_capacity(2).unwrap();
        heap.push(op_at(7), 7).unwrap();
        heap.push(op_at(3), 3).unwrap();
        let before = heap.entries.clone();

        let result = heap.push(op_at(1), 1);
        assert_eq!(
            result,
            Err(ScheduleError::SchedulingOverflow {
                queue: "operation",
                capacity: 2
            })
        );
        assert_eq!(heap.len(), 2);
        assert_eq!(heap.entries, before);
        assert_eq!(heap.front().unwrap().key, 3);
    }

    #[test]
    fn test_zero_capacity() {
        let mut heap = OpHeap::with_capacity(0).unwrap();
        assert!(heap.is_full());
        assert!(heap.push(op_at(0), 0).is_err());
        assert!(heap.front().is_none());
    }

    #[test]
    fn test_clear_and_latest_of_kind() {
        let mut heap = OpHeap::with_capacity(4).unwrap();
        heap.push(Operation::reverse(2, 10), 2).unwrap();
        heap.push(Operation::relative_jump(4, 10, 8), 4).unwrap();
        heap.push(Operation::reverse(6, 10), 6).unwrap();

        let latest = heap.latest_of_kind_mut(OpKind::Reverse, 10).unwrap();
        assert_eq!(latest.key, 6);
        latest.op.duration = 1;
        // Entries not yet due are skipped.
        assert_eq!(heap.latest_of_kind_mut(OpKind::Reverse, 5).unwrap().key, 2);
        assert!(heap.latest_of_kind_mut(OpKind::Reverse, 1).is_none());
        assert!(heap.latest_of_kind_mut(OpKind::LoopInLoop, 10).is_none());

        heap.clear();
        assert!(heap.is_empty());
        assert_eq!(heap.capacity(), 4);
    }

    #[test]
    fn test_remove_by_id_keeps_order() {
        let mut heap = OpHeap::with_capacity(8).unwrap();
        for (id, key) in [(1, 5), (2, 9), (3, 3), (4, 7), (5, 4), (6, 10), (7, 1)] {
            let mut op = op_at(key);
            op.id = id;
            heap.push(op, key).unwrap();
        }

        assert_eq!(heap.remove(4).unwrap().key, 7);
        assert!(heap.is_heap());
        assert_eq!(heap.remove(7).unwrap().key, 1);
        assert!(heap.is_heap());
        assert!(heap.remove(4).is_none());
        assert_eq!(heap.len(), 5);

        let keys: Vec<u32> = std::iter::from_fn(|| heap.pop().map(|e| e.key)).collect();
        assert_eq!(keys, vec![3, 4, 5, 9, 10]);
    }
}
