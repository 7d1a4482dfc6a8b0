//! Last-notified state memory.

use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::db::HealthState;

/// Key-value memory of the last state notified per target.
///
/// Best effort: losing entries risks a duplicate or missed alert, nothing more.
pub trait StateCache: Send + Sync {
    fn get(&self, key: &str) -> Option<HealthState>;
    fn set(&self, key: &str, state: HealthState);

    /// Drop expired entries eagerly. Optional for implementations that expire lazily.
    fn purge_expired(&self) {}
}

/// In-process cache whose entries expire independently after `ttl`.
pub struct TtlCache {
    entries: DashMap<String, (HealthState, Instant)>,
    ttl: Duration,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl StateCache for TtlCache {
    fn get(&self, key: &str) -> Option<HealthState> {
        // Copy out before touching the map again; holding the ref while removing deadlocks.
        let (state, stored) = *self.entries.get(key)?.value();
        if stored.elapsed() < self.ttl {
            return Some(state);
        }
        self.entries.remove_if(key, |_, (_, t)| t.elapsed() >= self.ttl);
        None
    }

    fn set(&self, key: &str, state: HealthState) {
        self.entries.insert(key.to_string(), (state, Instant::now()));
    }

    fn purge_expired(&self) {
        self.entries.retain(|_, (_, t)| t.elapsed() < self.ttl);
    }
}
