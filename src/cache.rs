use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, OnceLock};

/// Concurrent read-through cache with an at-most-once guarantee per key:
/// under concurrent lookups of the same key, one caller computes while the
/// others wait for the result. The map lock is never held across the
/// computation itself.
#[derive(Debug)]
pub struct SingleFlight<V> {
    slots: Mutex<HashMap<u64, Arc<OnceLock<V>>>>,
}

impl<V> Default for SingleFlight<V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone> SingleFlight<V> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_compute<F: FnOnce() -> V>(&self, key: u64, compute: F) -> V {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.entry(key).or_default().clone()
        };
        slot.get_or_init(compute).clone()
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Content-addressed cache key from hashable parts (sequence content,
/// method fingerprint, deadline bits).
pub fn content_key<T: Hash>(parts: &[T]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for part in parts {
        part.hash(&mut hasher);
    }
    hasher.finish()
}
