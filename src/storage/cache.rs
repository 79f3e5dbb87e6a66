//! # LRU Node Cache
//!
//! Bounded cache of decoded nodes keyed by page id, with strict
//! least-recently-used eviction. The persistent page file consults it
//! before touching the disk; the memory backend does not need one.
//!
//! ## Recency Tracking
//!
//! Every access stamps the entry with a monotonically increasing tick.
//! A secondary index (tick → page id) keeps entries ordered by recency,
//! so eviction pops the smallest tick in O(log n) without scanning:
//!
//! ```text
//! entries: page id → (node, dirty, tick)
//! recency: tick → page id            (BTreeMap, oldest first)
//! ```
//!
//! ## Dirty Write-Back
//!
//! Entries inserted via [`put_dirty`](LruCache::put_dirty) carry a dirty
//! flag. Eviction returns the evicted node together with that flag so
//! the owner can write it back; the cache itself never performs I/O.

use std::collections::BTreeMap;

use hashbrown::HashMap;

use super::PageId;
use crate::tree::node::Node;

struct CacheSlot {
    node: Node,
    dirty: bool,
    tick: u64,
}

pub struct LruCache {
    capacity: usize,
    next_tick: u64,
    entries: HashMap<PageId, CacheSlot>,
    recency: BTreeMap<u64, PageId>,
}

impl LruCache {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "cache capacity must be at least 1");
        Self {
            capacity,
            next_tick: 0,
            entries: HashMap::with_capacity(capacity),
            recency: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn touch(&mut self, id: PageId) {
        let tick = self.next_tick;
        self.next_tick += 1;
        if let Some(slot) = self.entries.get_mut(&id) {
            self.recency.remove(&slot.tick);
            slot.tick = tick;
            self.recency.insert(tick, id);
        }
    }

    /// Looks up a node, refreshing its recency.
    pub fn get(&mut self, id: PageId) -> Option<Node> {
        if self.entries.contains_key(&id) {
            self.touch(id);
            Some(self.entries[&id].node.clone())
        } else {
            None
        }
    }

    /// Inserts a clean node (just decoded from disk). Returns the
    /// evicted `(node, dirty)` pair if the cache was full.
    pub fn put_clean(&mut self, node: Node) -> Option<(Node, bool)> {
        self.put(node, false)
    }

    /// Inserts or overwrites a node that is newer than its on-disk
    /// image. Returns the evicted `(node, dirty)` pair if any.
    pub fn put_dirty(&mut self, node: Node) -> Option<(Node, bool)> {
        self.put(node, true)
    }

    fn put(&mut self, node: Node, dirty: bool) -> Option<(Node, bool)> {
        let id = node.page();
        let tick = self.next_tick;
        self.next_tick += 1;

        if let Some(slot) = self.entries.get_mut(&id) {
            self.recency.remove(&slot.tick);
            slot.node = node;
            slot.dirty = slot.dirty || dirty;
            slot.tick = tick;
            self.recency.insert(tick, id);
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.evict()
        } else {
            None
        };

        self.entries.insert(id, CacheSlot { node, dirty, tick });
        self.recency.insert(tick, id);
        evicted
    }

    fn evict(&mut self) -> Option<(Node, bool)> {
        let (&tick, &id) = self.recency.iter().next()?;
        self.recency.remove(&tick);
        let slot = self.entries.remove(&id)?;
        Some((slot.node, slot.dirty))
    }

    /// Drains every entry, dirty ones first in recency order. Used on
    /// sync/close to write everything back.
    pub fn drain_dirty(&mut self) -> Vec<Node> {
        let mut dirty = Vec::new();
        for (_, id) in std::mem::take(&mut self.recency) {
            if let Some(slot) = self.entries.remove(&id) {
                if slot.dirty {
                    dirty.push(slot.node);
                }
            }
        }
        self.next_tick = 0;
        dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::node::NodeKind;

    fn node(page: PageId) -> Node {
        Node::new(page, NodeKind::Leaf, 4)
    }

    #[test]
    fn capacity_is_respected() {
        let mut cache = LruCache::new(3);
        for p in 0..5 {
            cache.put_clean(node(p));
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn least_recently_used_page_is_evicted() {
        let mut cache = LruCache::new(2);
        cache.put_clean(node(1));
        cache.put_clean(node(2));

        // refresh page 1, so page 2 is now the LRU
        assert!(cache.get(1).is_some());

        let evicted = cache.put_clean(node(3)).unwrap();
        assert_eq!(evicted.0.page(), 2);
        assert!(cache.get(1).is_some());
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn dirty_flag_survives_overwrite_and_eviction() {
        let mut cache = LruCache::new(1);
        cache.put_dirty(node(7));
        cache.put_clean(node(7));

        let (evicted, dirty) = cache.put_clean(node(8)).unwrap();
        assert_eq!(evicted.page(), 7);
        assert!(dirty, "dirty flag must not be cleared by a clean overwrite");
    }

    #[test]
    fn drain_returns_only_dirty_nodes() {
        let mut cache = LruCache::new(4);
        cache.put_clean(node(1));
        cache.put_dirty(node(2));
        cache.put_clean(node(3));
        cache.put_dirty(node(4));

        let drained = cache.drain_dirty();
        let pages: Vec<_> = drained.iter().map(|n| n.page()).collect();
        assert_eq!(pages, vec![2, 4]);
        assert!(cache.is_empty());
    }
}
