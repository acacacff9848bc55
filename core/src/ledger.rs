// Seen ledger — bounded FIFO of recently relayed message ids
//
// A node remembers the last few message ids it accepted so a flood that loops
// back is not relayed twice. Memory is fixed: once full, recording a new id
// evicts the oldest. Re-recording an id already present does not refresh it.

use std::collections::VecDeque;

/// Default number of remembered message ids
pub const DEFAULT_LEDGER_CAPACITY: usize = 10;

/// One slot per possible message id; a larger ledger could never fill
pub const MAX_LEDGER_CAPACITY: usize = u16::MAX as usize + 1;

#[derive(Debug, Clone)]
pub struct SeenLedger {
    /// Oldest id at the front
    order: VecDeque<u16>,
    capacity: usize,
}

impl Default for SeenLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl SeenLedger {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LEDGER_CAPACITY)
    }

    /// Capacity is clamped to `1..=MAX_LEDGER_CAPACITY`. Storage grows as
    /// ids are recorded rather than being reserved up front.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_LEDGER_CAPACITY);
        Self {
            order: VecDeque::with_capacity(capacity.min(DEFAULT_LEDGER_CAPACITY)),
            capacity,
        }
    }

    pub fn contains(&self, message_id: u16) -> bool {
        self.order.contains(&message_id)
    }

    /// Record an id. Returns false if it was already present.
    pub fn record(&mut self, message_id: u16) -> bool {
        if self.contains(message_id) {
            return false;
        }

        self.order.push_back(message_id);
        while self.order.len() > self.capacity {
            self.order.pop_front();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ids oldest first
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.order.iter().copied()
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }
}
