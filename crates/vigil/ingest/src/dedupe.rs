use std::collections::{HashSet, VecDeque};

use vigil_types::Modality;

/// Bounded memory of recently seen `(timestamp, modality)` keys.
///
/// Capture delivery is at-least-once; a redelivered chunk carries the same
/// key and is recognised here. The oldest key is forgotten once capacity is
/// reached.
#[derive(Debug)]
pub struct DedupeWindow {
    seen: HashSet<(u64, Modality)>,
    order: VecDeque<(u64, Modality)>,
    capacity: usize,
}

impl DedupeWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record a key. Returns `false` if it was already present.
    pub fn insert(&mut self, timestamp_ms: u64, modality: &Modality) -> bool {
        let key = (timestamp_ms, modality.clone());
        if self.seen.contains(&key) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(key.clone());
        self.order.push_back(key);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }
}
