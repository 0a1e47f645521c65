use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

/// Process-wide byte budget for buffered scoring state.
///
/// Buffered signal memory is a finite resource shared by every session: the
/// total reserved never exceeds capacity, and a failed reservation is the
/// caller's cue to evict rather than grow.
#[derive(Debug)]
pub struct BufferBudget {
    capacity: usize,
    used: AtomicUsize,
}

impl BufferBudget {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.used())
    }

    /// Reserve `bytes`. Returns `false`, reserving nothing, if that would
    /// exceed capacity.
    pub fn try_reserve(&self, bytes: usize) -> bool {
        let mut current = self.used.load(Ordering::Acquire);
        loop {
            let next = match current.checked_add(bytes) {
                Some(n) if n <= self.capacity => n,
                _ => {
                    debug!(
                        requested = bytes,
                        available = self.capacity.saturating_sub(current),
                        "Buffer reservation refused"
                    );
                    return false;
                }
            };
            match self
                .used
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Return `bytes` to the budget. Never underflows.
    pub fn release(&self, bytes: usize) {
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    pub fn is_exhausted(&self) -> bool {
        self.available() == 0
    }
}
