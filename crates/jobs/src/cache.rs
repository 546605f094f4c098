use std::collections::BTreeMap;

use analysis::result::AssembledResult;

use crate::protocol::ResultKey;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: AssembledResult,
    last_used_tick: u64,
}

/// Completed results keyed by request fingerprint.
///
/// Eviction is LRU by `last_used_tick`, with a tie-break by key ordering, so
/// the victim is always the same for the same access history.
#[derive(Debug)]
pub struct ResultCache {
    capacity: usize,
    tick: u64,
    entries: BTreeMap<ResultKey, CacheEntry>,
}

impl ResultCache {
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            tick: 0,
            entries: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &ResultKey) -> bool {
        self.entries.contains_key(key)
    }

    fn bump(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Returns a copy and marks the entry as most recently used.
    pub fn get(&mut self, key: &ResultKey) -> Option<AssembledResult> {
        let tick = self.bump();
        let entry = self.entries.get_mut(key)?;
        entry.last_used_tick = tick;
        Some(entry.value.clone())
    }

    /// Inserts `value`, returning the keys evicted to make room.
    pub fn insert(&mut self, key: ResultKey, value: AssembledResult) -> Vec<ResultKey> {
        if self.capacity == 0 {
            return Vec::new();
        }
        let tick = self.bump();
        self.entries.insert(
            key,
            CacheEntry {
                value,
                last_used_tick: tick,
            },
        );

        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            let victim = self
                .entries
                .iter()
                .min_by(|(ka, a), (kb, b)| {
                    a.last_used_tick
                        .cmp(&b.last_used_tick)
                        .then_with(|| ka.cmp(kb))
                })
                .map(|(k, _)| k.clone());
            let Some(victim) = victim else { break };
            self.entries.remove(&victim);
            evicted.push(victim);
        }
        evicted
    }

    pub fn remove(&mut self, key: &ResultKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
