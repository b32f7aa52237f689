//! Pressed-key tracking
//!
//! Written by the capture thread, read by the poll thread. All access goes
//! through one mutex so a snapshot never observes a half-applied change.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::keys::KeyId;

/// The set of keys currently held down
#[derive(Debug, Default)]
pub struct KeyState {
    pressed: Mutex<BTreeSet<KeyId>>,
}

impl KeyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` as down. Returns true only on the down-edge.
    pub fn mark_down(&self, key: &KeyId) -> bool {
        self.lock().insert(key.clone())
    }

    /// Mark `key` as up. Returns true only if it was down.
    pub fn mark_up(&self, key: &KeyId) -> bool {
        self.lock().remove(key)
    }

    /// Copy of the pressed keys, in sorted order
    pub fn snapshot(&self) -> Vec<KeyId> {
        self.lock().iter().cloned().collect()
    }

    pub fn is_down(&self, key: &KeyId) -> bool {
        self.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<KeyId>> {
        self.pressed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_down_edge_only_once() {
        let state = KeyState::new();
        let w = KeyId::from("w");

        assert!(state.mark_down(&w));
        assert!(!state.mark_down(&w));
        assert!(state.is_down(&w));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_up_requires_down() {
        let state = KeyState::new();
        let w = KeyId::from("w");

        assert!(!state.mark_up(&w));
        state.mark_down(&w);
        assert!(state.mark_up(&w));
        assert!(!state.mark_up(&w));
        assert!(state.is_empty());
    }

    #[test]
    fn test_snapshot_is_sorted_copy() {
        let state = KeyState::new();
        state.mark_down(&KeyId::from("s"));
        state.mark_down(&KeyId::from("a"));

        let snapshot = state.snapshot();
        state.clear();

        assert_eq!(snapshot, vec![KeyId::from("a"), KeyId::from("s")]);
        assert!(state.is_empty());
    }

    #[test]
    fn test_snapshot_during_concurrent_mutation() {
        let state = Arc::new(KeyState::new());
        let writer_state = Arc::clone(&state);

        let writer = thread::spawn(move || {
            for i in 0..2000 {
                let key = KeyId::from(format!("k{}", i % 16));
                writer_state.mark_down(&key);
                writer_state.mark_up(&key);
            }
        });

        for _ in 0..2000 {
            // Each key is down at most once, so a snapshot never holds more
            // than the sixteen distinct keys.
            assert!(state.snapshot().len() <= 16);
        }

        writer.join().unwrap();
        assert!(state.is_empty());
    }
}
