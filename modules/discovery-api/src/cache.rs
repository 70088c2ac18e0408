//! Single-slot response cache.
//!
//! The proxy only needs to absorb bursts of identical requests, so the cache
//! holds exactly one entry: a request with a different key evicts whatever
//! was stored. TTL is checked at read time; a stale entry simply stops
//! matching and is overwritten by the next store. Concurrent writers racing
//! on different keys lose nothing but cache hits.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::normalize::NormalizedPoi;

struct Entry {
    key: String,
    data: Vec<NormalizedPoi>,
    stored_at: Instant,
}

pub struct SingleSlotCache {
    slot: Mutex<Option<Entry>>,
    ttl: Duration,
}

impl SingleSlotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            ttl,
        }
    }

    /// Return the cached data when the stored key matches and the entry is
    /// still fresh.
    pub fn get(&self, key: &str) -> Option<Vec<NormalizedPoi>> {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        let entry = slot.as_ref()?;
        if entry.key == key && entry.stored_at.elapsed() < self.ttl {
            Some(entry.data.clone())
        } else {
            None
        }
    }

    /// Overwrite the slot unconditionally, evicting any previous entry.
    pub fn set(&self, key: &str, data: Vec<NormalizedPoi>) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(Entry {
            key: key.to_string(),
            data,
            stored_at: Instant::now(),
        });
    }
}
