//! Fixed-capacity, overwrite-oldest event store.

use std::collections::VecDeque;

use crate::types::IngestedEvent;

/// Default ring buffer capacity.
pub const DEFAULT_BUFFER_SIZE: usize = 500;

/// Fixed-capacity sequence of events with O(1) append and O(k) extraction
/// of "all events with id > cursor".
pub struct RingBuffer {
    capacity: usize,
    events: VecDeque<IngestedEvent>,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity),
        }
    }

    /// Append `event`; when full, overwrite the oldest.
    pub fn push(&mut self, event: IngestedEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn size(&self) -> usize {
        self.events.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of every buffered event, in insertion order.
    pub fn to_array(&self) -> Vec<IngestedEvent> {
        self.events.iter().cloned().collect()
    }

    /// Events whose `id > after_id`, in ascending id order. Scans from the
    /// newest end backward (the common case touches only the recent
    /// suffix) and reverses before returning.
    pub fn since(&self, after_id: i64) -> Vec<IngestedEvent> {
        let mut out = Vec::new();
        for event in self.events.iter().rev() {
            if (event.id as i64) <= after_id {
                break;
            }
            out.push(event.clone());
        }
        out.reverse();
        out
    }
}
