//! Arena-backed recency list
//!
//! Entries live in a `Vec` of slots and link to each other by slot index, so
//! the doubly linked list needs no shared ownership. The key map stores slot
//! indices. Vacated slots go on a free list and are reused by later inserts.

use std::collections::HashMap;

type Slot = usize;

/// A cached value together with its position in the recency list
#[derive(Debug)]
struct CacheEntry<V> {
    key: String,
    value: V,
    prev: Option<Slot>,
    next: Option<Slot>,
}

/// Bounded least-recently-used index. Not synchronised; `OrderCache` wraps it in a lock.
#[derive(Debug)]
pub(crate) struct LruIndex<V> {
    capacity: usize,
    map: HashMap<String, Slot>,
    slots: Vec<Option<CacheEntry<V>>>,
    free: Vec<Slot>,
    /// Most recently used
    head: Option<Slot>,
    /// Least recently used, the only eviction candidate
    tail: Option<Slot>,
}

impl<V: Clone> LruIndex<V> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: HashMap::with_capacity(capacity + 1),
            slots: Vec::with_capacity(capacity + 1),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Look up `key` and promote it to most recently used
    pub(crate) fn get(&mut self, key: &str) -> Option<V> {
        let slot = *self.map.get(key)?;
        self.move_to_head(slot);
        self.entry(slot).map(|e| e.value.clone())
    }

    /// Insert or replace `key`. Returns the evicted key, if the insert pushed
    /// the index over capacity.
    pub(crate) fn put(&mut self, key: String, value: V) -> Option<String> {
        if let Some(&slot) = self.map.get(&key) {
            if let Some(entry) = self.slots[slot].as_mut() {
                entry.value = value;
            }
            self.move_to_head(slot);
            return None;
        }

        let entry = CacheEntry {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                slot
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };
        self.map.insert(key, slot);
        self.push_front(slot);

        if self.map.len() > self.capacity {
            return self.pop_back();
        }
        None
    }

    /// Remove `key` from both the map and the list
    pub(crate) fn remove(&mut self, key: &str) -> Option<V> {
        let slot = self.map.remove(key)?;
        self.unlink(slot);
        self.release(slot).map(|e| e.value)
    }

    /// Keys in recency order, most recent first
    pub(crate) fn keys_by_recency(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.map.len());
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            match self.entry(slot) {
                Some(entry) => {
                    keys.push(entry.key.clone());
                    cursor = entry.next;
                }
                None => break,
            }
        }
        keys
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &String> {
        self.map.keys()
    }

    fn entry(&self, slot: Slot) -> Option<&CacheEntry<V>> {
        self.slots.get(slot).and_then(|s| s.as_ref())
    }

    fn release(&mut self, slot: Slot) -> Option<CacheEntry<V>> {
        let entry = self.slots[slot].take();
        self.free.push(slot);
        entry
    }

    fn push_front(&mut self, slot: Slot) {
        let old_head = self.head;
        if let Some(entry) = self.slots[slot].as_mut() {
            entry.prev = None;
            entry.next = old_head;
        }
        match old_head {
            Some(h) => {
                if let Some(head) = self.slots[h].as_mut() {
                    head.prev = Some(slot);
                }
            }
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
    }

    fn unlink(&mut self, slot: Slot) {
        let (prev, next) = match self.slots[slot].as_ref() {
            Some(e) => (e.prev, e.next),
            None => return,
        };
        match prev {
            Some(p) => {
                if let Some(entry) = self.slots[p].as_mut() {
                    entry.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(entry) = self.slots[n].as_mut() {
                    entry.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        if let Some(entry) = self.slots[slot].as_mut() {
            entry.prev = None;
            entry.next = None;
        }
    }

    fn move_to_head(&mut self, slot: Slot) {
        if self.head == Some(slot) {
            return;
        }
        self.unlink(slot);
        self.push_front(slot);
    }

    fn pop_back(&mut self) -> Option<String> {
        let slot = self.tail?;
        self.unlink(slot);
        let entry = self.release(slot)?;
        self.map.remove(&entry.key);
        Some(entry.key)
    }

    /// Walk the list in both directions and compare it against the map
    #[cfg(test)]
    fn assert_consistent(&self) {
        let forward = self.keys_by_recency();
        assert_eq!(forward.len(), self.map.len(), "list and map disagree");
        assert!(self.map.len() <= self.capacity);

        let mut backward = Vec::new();
        let mut cursor = self.tail;
        while let Some(slot) = cursor {
            let entry = self.entry(slot).unwrap();
            backward.push(entry.key.clone());
            cursor = entry.prev;
        }
        backward.reverse();
        assert_eq!(forward, backward);

        for key in &forward {
            let slot = self.map[key];
            assert_eq!(&self.entry(slot).unwrap().key, key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    #[test]
    fn test_evicts_least_recently_used() {
        let mut lru = LruIndex::new(2);
        assert_eq!(lru.put("a".into(), 1), None);
        assert_eq!(lru.put("b".into(), 2), None);
        assert_eq!(lru.get("a"), Some(1));

        // "b" is now the tail
        assert_eq!(lru.put("c".into(), 3), Some("b".to_string()));
        assert_eq!(lru.keys_by_recency(), vec!["c", "a"]);
        lru.assert_consistent();
    }

    #[test]
    fn test_replace_keeps_size_and_promotes() {
        let mut lru = LruIndex::new(3);
        lru.put("a".into(), 1);
        lru.put("b".into(), 2);
        lru.put("c".into(), 3);

        assert_eq!(lru.put("a".into(), 10), None);
        assert_eq!(lru.len(), 3);
        assert_eq!(lru.keys_by_recency(), vec!["a", "c", "b"]);
        assert_eq!(lru.get("a"), Some(10));
        lru.assert_consistent();
    }

    #[test]
    fn test_remove_unlinks_and_reuses_slot() {
        let mut lru = LruIndex::new(3);
        lru.put("a".into(), 1);
        lru.put("b".into(), 2);
        lru.put("c".into(), 3);

        assert_eq!(lru.remove("b"), Some(2));
        assert_eq!(lru.remove("b"), None);
        assert_eq!(lru.keys_by_recency(), vec!["c", "a"]);
        lru.assert_consistent();

        lru.put("d".into(), 4);
        assert_eq!(lru.slots.len(), 3, "freed slot should be reused");
        assert_eq!(lru.keys_by_recency(), vec!["d", "c", "a"]);
        lru.assert_consistent();
    }

    #[test]
    fn test_remove_head_and_tail() {
        let mut lru = LruIndex::new(2);
        lru.put("a".into(), 1);
        lru.put("b".into(), 2);

        lru.remove("b");
        lru.assert_consistent();
        lru.remove("a");
        lru.assert_consistent();
        assert_eq!(lru.len(), 0);
        assert!(lru.head.is_none() && lru.tail.is_none());
    }

    #[test]
    fn test_capacity_one() {
        let mut lru = LruIndex::new(1);
        lru.put("a".into(), 1);
        assert_eq!(lru.put("b".into(), 2), Some("a".to_string()));
        assert_eq!(lru.get("a"), None);
        assert_eq!(lru.get("b"), Some(2));
        lru.assert_consistent();
    }

    #[derive(Debug, Clone)]
    enum Op {
        Get(u8),
        Put(u8),
        Remove(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..12).prop_map(Op::Get),
            (0u8..12).prop_map(Op::Put),
            (0u8..12).prop_map(Op::Remove),
        ]
    }

    proptest! {
        /// The index behaves like a recency queue: front is most recent,
        /// evictions always take the back.
        #[test]
        fn prop_matches_reference_model(capacity in 1usize..6, ops in prop::collection::vec(op(), 0..200)) {
            let mut lru = LruIndex::new(capacity);
            let mut model: VecDeque<String> = VecDeque::new();

            for op in ops {
                match op {
                    Op::Get(k) => {
                        let key = k.to_string();
                        let hit = lru.get(&key).is_some();
                        let pos = model.iter().position(|m| *m == key);
                        prop_assert_eq!(hit, pos.is_some());
                        if let Some(pos) = pos {
                            let key = model.remove(pos).unwrap();
                            model.push_front(key);
                        }
                    }
                    Op::Put(k) => {
                        let key = k.to_string();
                        let evicted = lru.put(key.clone(), k as u32);
                        if let Some(pos) = model.iter().position(|m| *m == key) {
                            model.remove(pos);
                        }
                        model.push_front(key);
                        let expected = if model.len() > capacity { model.pop_back() } else { None };
                        prop_assert_eq!(evicted, expected);
                    }
                    Op::Remove(k) => {
                        let key = k.to_string();
                        let removed = lru.remove(&key).is_some();
                        let pos = model.iter().position(|m| *m == key);
                        prop_assert_eq!(removed, pos.is_some());
                        if let Some(pos) = pos {
                            model.remove(pos);
                        }
                    }
                }
                prop_assert!(lru.len() <= capacity);
                prop_assert_eq!(lru.keys_by_recency(), model.iter().cloned().collect::<Vec<_>>());
            }
            lru.assert_consistent();
        }
    }
}
