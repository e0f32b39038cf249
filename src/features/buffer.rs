//! Rolling window of normalized features feeding the model.

use std::collections::VecDeque;

use crate::types::NormalizedFeatureRecord;

/// Fixed-capacity FIFO of the most recent records, oldest first.
///
/// Only ever grows by [`append`](Self::append); there is no reset. Once full,
/// every append evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct TemporalBuffer {
    buffer: VecDeque<NormalizedFeatureRecord>,
    capacity: usize,
}

impl TemporalBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Push to the back, evicting from the front down to capacity
    pub fn append(&mut self, item: NormalizedFeatureRecord) {
        self.buffer.push_back(item);
        while self.buffer.len() > self.capacity {
            self.buffer.pop_front();
        }
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ordered copy of the current contents
    pub fn snapshot(&self) -> Vec<NormalizedFeatureRecord> {
        self.buffer.iter().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NormalizedFeatureRecord> {
        self.buffer.iter()
    }
}
