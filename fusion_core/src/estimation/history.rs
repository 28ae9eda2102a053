// fusion_core/src/estimation/history.rs

use std::collections::VecDeque;

use crate::frames::StateSnapshot;
use crate::types::Timestamp;

/// Time-ordered window of past snapshots.
///
/// Only snapshots with `time >= head_time - max_delay_window` are kept. Eviction
/// on insert is the only way a snapshot leaves the buffer.
#[derive(Debug, Clone)]
pub struct StateHistoryBuffer {
    snapshots: VecDeque<StateSnapshot>,
    max_delay_window: f64,
}

impl StateHistoryBuffer {
    pub fn new(max_delay_window: f64) -> Self {
        Self {
            snapshots: VecDeque::new(),
            max_delay_window,
        }
    }

    pub fn max_delay_window(&self) -> f64 {
        self.max_delay_window
    }

    /// Inserts a snapshot at its time-ordered position. A snapshot with exactly the
    /// same time as an existing one replaces it.
    ///
    /// Returns how many snapshots were evicted as a result.
    pub fn insert(&mut self, snapshot: StateSnapshot) -> usize {
        let idx = self
            .snapshots
            .partition_point(|s| s.time.total_cmp(&snapshot.time).is_lt());
        match self.snapshots.get_mut(idx) {
            Some(existing) if existing.time.total_cmp(&snapshot.time).is_eq() => {
                *existing = snapshot
            }
            _ => self.snapshots.insert(idx, snapshot),
        }
        self.evict()
    }

    fn evict(&mut self) -> usize {
        let Some(window_start) = self.window_start() else {
            return 0;
        };
        let mut evicted = 0;
        while self
            .snapshots
            .front()
            .is_some_and(|s| s.time < window_start)
        {
            self.snapshots.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// The nearest retained snapshot with `snapshot.time <= time`.
    ///
    /// `None` if `time` lies before the retained window or nothing that old is kept.
    pub fn find_at_or_before(&mut self, time: Timestamp) -> Option<&mut StateSnapshot> {
        let idx = self.index_at_or_before(time)?;
        self.snapshots.get_mut(idx)
    }

    /// Read-only counterpart of `find_at_or_before`.
    pub fn get_at_or_before(&self, time: Timestamp) -> Option<&StateSnapshot> {
        let idx = self.index_at_or_before(time)?;
        self.snapshots.get(idx)
    }

    fn index_at_or_before(&self, time: Timestamp) -> Option<usize> {
        if self.window_start().is_some_and(|start| time < start) {
            return None;
        }
        let idx = self
            .snapshots
            .partition_point(|s| s.time.total_cmp(&time).is_le());
        idx.checked_sub(1)
    }

    /// Time of the newest retained snapshot.
    pub fn head_time(&self) -> Option<Timestamp> {
        self.snapshots.back().map(|s| s.time)
    }

    /// Oldest time a measurement may still be applied at.
    pub fn window_start(&self) -> Option<Timestamp> {
        self.head_time().map(|head| head - self.max_delay_window)
    }

    pub fn head(&self) -> Option<&StateSnapshot> {
        self.snapshots.back()
    }

    /// Mutable access to every snapshot strictly newer than `time`, oldest first.
    /// This is what a re-propagation pass walks.
    pub fn after_mut(&mut self, time: Timestamp) -> impl Iterator<Item = &mut StateSnapshot> {
        let idx = self
            .snapshots
            .partition_point(|s| s.time.total_cmp(&time).is_le());
        self.snapshots.range_mut(idx..)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StateSnapshot> {
        self.snapshots.iter()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::layout::position_layout;

    fn snap(time: Timestamp) -> StateSnapshot {
        StateSnapshot::new(position_layout(), 1.0, time)
    }

    fn times(buffer: &StateHistoryBuffer) -> Vec<Timestamp> {
        buffer.iter().map(|s| s.time).collect()
    }

    #[test]
    fn insert_keeps_time_order() {
        let mut buffer = StateHistoryBuffer::new(10.0);
        for t in [2.0, 0.5, 3.0, 1.0] {
            buffer.insert(snap(t));
        }
        assert_eq!(times(&buffer), vec![0.5, 1.0, 2.0, 3.0]);
        assert_eq!(buffer.head_time(), Some(3.0));
    }

    #[test]
    fn equal_time_insert_replaces() {
        let mut buffer = StateHistoryBuffer::new(10.0);
        buffer.insert(snap(1.0));
        let mut replacement = snap(1.0);
        replacement.vector[0] = 42.0;
        buffer.insert(replacement);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.head().unwrap().vector[0], 42.0);
    }

    #[test]
    fn inserting_new_head_evicts_outside_window() {
        let mut buffer = StateHistoryBuffer::new(1.0);
        for t in [0.0, 0.5, 1.0, 1.5] {
            assert_eq!(buffer.insert(snap(t)), 0);
        }
        // Window becomes [2.0, 3.0]; 0.0 .. 1.5 all fall out.
        assert_eq!(buffer.insert(snap(3.0)), 4);
        assert_eq!(times(&buffer), vec![3.0]);

        // Boundary is inclusive.
        buffer.insert(snap(4.0));
        assert_eq!(times(&buffer), vec![3.0, 4.0]);
    }

    #[test]
    fn find_at_or_before_picks_nearest_older_snapshot() {
        let mut buffer = StateHistoryBuffer::new(5.0);
        for t in [1.0, 2.0, 3.0] {
            buffer.insert(snap(t));
        }
        assert_eq!(buffer.find_at_or_before(2.5).map(|s| s.time), Some(2.0));
        assert_eq!(buffer.find_at_or_before(2.0).map(|s| s.time), Some(2.0));
        assert_eq!(buffer.find_at_or_before(9.0).map(|s| s.time), Some(3.0));
        assert!(buffer.find_at_or_before(0.5).is_none());
    }

    #[test]
    fn lookup_before_window_start_fails() {
        let mut buffer = StateHistoryBuffer::new(1.0);
        buffer.insert(snap(1.0));
        buffer.insert(snap(2.0));
        // Window is [1.0, 2.0]; 0.9 is outside even though nothing was evicted for it.
        assert!(buffer.find_at_or_before(0.9).is_none());
        assert!(buffer.get_at_or_before(1.0).is_some());
    }

    #[test]
    fn after_mut_walks_strictly_newer_snapshots() {
        let mut buffer = StateHistoryBuffer::new(5.0);
        for t in [1.0, 2.0, 3.0, 4.0] {
            buffer.insert(snap(t));
        }
        let walked: Vec<Timestamp> = buffer.after_mut(2.0).map(|s| s.time).collect();
        assert_eq!(walked, vec![3.0, 4.0]);
    }
}
