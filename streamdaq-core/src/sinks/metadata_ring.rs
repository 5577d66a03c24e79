//! A bounded history of recently decoded headers, shared between the Grouper (sole writer) and
//! whatever live-plot sink the driver loop wants to read from.
//!
//! The Grouper only ever appends, and the plot sink only ever reads a snapshot, so contention is
//! minimal; a `parking_lot::Mutex` around a `VecDeque` is plenty (the same tradeoff
//! `anni-provider` makes for its small shared caches).

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::header::Header;

pub struct MetadataRing {
    capacity: usize,
    inner: Mutex<VecDeque<Header>>,
}

impl MetadataRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    pub fn push(&self, header: Header) {
        let mut guard = self.inner.lock();
        if guard.len() == self.capacity {
            guard.pop_front();
        }
        guard.push_back(header);
    }

    /// Snapshot of the headers currently retained, oldest first.
    pub fn snapshot(&self) -> Vec<Header> {
        self.inner.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
