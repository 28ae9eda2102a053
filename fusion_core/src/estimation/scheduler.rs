// fusion_core/src/estimation/scheduler.rs

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::measurement::Measurement;
use crate::types::Timestamp;

/// A queued measurement plus its insertion sequence number, which breaks ties.
#[derive(Debug)]
struct Pending {
    time: Timestamp,
    seq: u64,
    measurement: Measurement,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    // `BinaryHeap` is a max-heap, so the earliest (time, seq) has to compare greatest.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
struct Queue {
    heap: BinaryHeap<Pending>,
    next_seq: u64,
}

/// Time-ordered pending queue between sensor producers and the single consumer.
///
/// `enqueue` may be called from any number of threads. Measurements come back out
/// of `drain_next` in ascending time order; equal times come out in the order they
/// were enqueued.
#[derive(Debug, Default)]
pub struct MeasurementScheduler {
    queue: Mutex<Queue>,
}

impl MeasurementScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        // A panicking producer cannot leave the heap half-updated, so keep going.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, measurement: Measurement) {
        let mut queue = self.lock();
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.heap.push(Pending {
            time: measurement.time(),
            seq,
            measurement,
        });
    }

    /// Removes and returns the earliest pending measurement.
    pub fn drain_next(&self) -> Option<Measurement> {
        self.lock().heap.pop().map(|pending| pending.measurement)
    }

    /// Time of the earliest pending measurement.
    pub fn peek_time(&self) -> Option<Timestamp> {
        self.lock().heap.peek().map(|pending| pending.time)
    }

    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }
}
