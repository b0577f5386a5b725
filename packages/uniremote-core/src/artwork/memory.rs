//! Memory tier: LRU bounded by entry count and total cost.

use std::collections::{BTreeMap, HashMap};

use super::ArtworkImage;

struct Entry {
    image: ArtworkImage,
    cost: usize,
    tick: u64,
}

/// Least-recently-used map from normalized key to image.
///
/// Every access stamps the entry with a fresh tick; `order` maps ticks back to
/// keys so the oldest entry is always the first one.
pub(crate) struct MemoryTier {
    entries: HashMap<String, Entry>,
    order: BTreeMap<u64, String>,
    tick: u64,
    total_cost: usize,
    count_limit: usize,
    cost_limit: usize,
}

impl MemoryTier {
    pub(crate) fn new(count_limit: usize, cost_limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            tick: 0,
            total_cost: 0,
            count_limit,
            cost_limit,
        }
    }

    pub(crate) fn get(&mut self, key: &str) -> Option<ArtworkImage> {
        self.tick += 1;
        let tick = self.tick;
        let entry = self.entries.get_mut(key)?;
        self.order.remove(&entry.tick);
        entry.tick = tick;
        self.order.insert(tick, key.to_string());
        Some(entry.image.clone())
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts or replaces `key`, evicting least-recently-used entries until
    /// both limits hold. Returns false if the image alone exceeds the cost limit.
    pub(crate) fn insert(&mut self, key: String, image: ArtworkImage) -> bool {
        self.remove(&key);

        let cost = image.cost();
        if cost > self.cost_limit {
            return false;
        }

        self.tick += 1;
        self.order.insert(self.tick, key.clone());
        self.entries.insert(
            key,
            Entry {
                image,
                cost,
                tick: self.tick,
            },
        );
        self.total_cost += cost;

        while self.entries.len() > self.count_limit || self.total_cost > self.cost_limit {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&oldest) {
                self.total_cost -= evicted.cost;
                log::trace!("[Artwork] Evicted {} from memory", oldest);
            }
        }
        true
    }

    pub(crate) fn remove(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            self.order.remove(&entry.tick);
            self.total_cost -= entry.cost;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn total_cost(&self) -> usize {
        self.total_cost
    }
}
