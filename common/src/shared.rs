//! Single-writer published values shared across pipeline stages

use std::sync::{Arc, RwLock};

/// A published value with single-writer/multi-reader discipline. Readers
/// always receive the most recently stored `Arc`; a store swaps the slot
/// atomically under a short write lock, so a reader never observes a
/// half-written value.
#[derive(Debug)]
pub struct Published<T> {
    slot: RwLock<Arc<T>>,
}

impl<T> Published<T> {
    pub fn new(value: T) -> Self {
        Self {
            slot: RwLock::new(Arc::new(value)),
        }
    }

    /// Clone out the latest published value
    pub fn load(&self) -> Arc<T> {
        self.slot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Publish a new value, superseding the previous one
    pub fn store(&self, value: T) {
        let mut slot = self
            .slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Arc::new(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readers_observe_latest_store() {
        let published = Published::new(1u32);
        let before = published.load();

        published.store(2);

        // The old handle is unchanged; fresh loads see the new value
        assert_eq!(*before, 1);
        assert_eq!(*published.load(), 2);
    }
}
