use std::collections::{vec_deque, VecDeque};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::metric::Observation;

pub const DEFAULT_CAPACITY: usize = 5_000;

/// What to throw away once the buffer is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OverflowPolicy {
    /// Evict the oldest queued observation to make room.
    #[default]
    DropOldest,
    /// Keep the queue as is and discard the incoming observation.
    DropNewest,
}

/// Bounded FIFO of observations waiting for the next flush.
#[derive(Debug)]
pub struct Buffer {
    queue: Mutex<VecDeque<Observation>>,
    capacity: usize,
    overflow: OverflowPolicy,
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, OverflowPolicy::default())
    }
}

impl Buffer {
    /// A zero capacity is bumped to one so that a push followed by a flush
    /// always has something to send.
    pub fn new(capacity: usize, overflow: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
            capacity,
            overflow,
        }
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Appends an observation and returns whatever the overflow policy threw
    /// away to make it fit, if anything.
    pub fn push(&self, observation: Observation) -> Option<Observation> {
        let mut queue = self.queue.lock();
        trace!(kind = observation.kind_name(), len = queue.len(), "buffering observation");
        if queue.len() < self.capacity {
            queue.push_back(observation);
            return None;
        }
        match self.overflow {
            OverflowPolicy::DropOldest => {
                let evicted = queue.pop_front();
                queue.push_back(observation);
                debug!(capacity = self.capacity, "Buffer full, evicted the oldest observation");
                evicted
            }
            OverflowPolicy::DropNewest => {
                debug!(capacity = self.capacity, "Buffer full, dropped the incoming observation");
                Some(observation)
            }
        }
    }

    /// Empties the buffer in one go and yields the observations worth encoding.
    ///
    /// `threshold` is drawn once per flush. A metric sampled at rate `r` is
    /// dropped when `threshold > r`, so every metric sharing a rate is either
    /// kept or dropped together within one flush. Events and checks bypass
    /// sampling, metrics without a value are skipped. Nothing filtered out is
    /// put back.
    pub fn drain_batch(&self, threshold: f64) -> DrainBatch {
        let drained = std::mem::take(&mut *self.queue.lock());
        DrainBatch {
            inner: drained.into_iter(),
            threshold,
        }
    }
}

pub struct DrainBatch {
    inner: vec_deque::IntoIter<Observation>,
    threshold: f64,
}

impl Iterator for DrainBatch {
    type Item = Observation;

    fn next(&mut self) -> Option<Self::Item> {
        for observation in self.inner.by_ref() {
            let Some(metric) = observation.as_metric() else {
                return Some(observation);
            };
            if metric.get_value().is_none() {
                trace!(name = metric.get_name(), "skipping metric without a value");
                continue;
            }
            if let Some(rate) = metric.get_rate() {
                if self.threshold > rate.as_probability() {
                    trace!(name = metric.get_name(), "metric sampled out");
                    continue;
                }
            }
            return Some(observation);
        }
        None
    }
}
