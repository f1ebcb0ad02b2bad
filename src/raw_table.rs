//! RawTable: the array + hash storage engine.
//!
//! Layout
//! - `array`: dense `Option<V>` slots for integer keys in `[0, array_size)`.
//! - `nodes`: the hash segment, an arena of `hash_size` slots. Chain and
//!   vacancy links are plain arena indices.
//!
//! Invariants
//! - Both sizes are powers of two; `hash_size >= 2`.
//! - An integer key in `[0, array_size)` lives in `array` and nowhere else.
//! - Every chain starts at its main position (`hash & (hash_size - 1)`).
//!   Members that collided are stored wherever free-slot allocation put them
//!   and are reachable from the head through `next`.
//! - Slots on the vacancy list may have been refilled since they were
//!   listed; allocation prunes them lazily. `last_free` only moves down.
//!
//! The engine never calls back into the registry for keys it already stores:
//! each entry keeps the hash it was inserted with.

use crate::error::Result;
use crate::key::{hash_integer, Key};
use crate::registry::HashRegistry;
use crate::sizing::Census;
use std::borrow::Cow;
use tracing::{debug, trace};

pub(crate) struct Entry<V> {
    pub key: Key,
    pub value: V,
    pub hash: u64,
}

pub(crate) struct Node<V> {
    entry: Option<Entry<V>>,
    next: Option<usize>,
    vacancy_next: Option<usize>,
    // Whether this slot is currently threaded on the vacancy list.
    listed: bool,
}

impl<V> Node<V> {
    fn vacant() -> Self {
        Self {
            entry: None,
            next: None,
            vacancy_next: None,
            listed: false,
        }
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.entry.is_none()
    }
}

/// Where a live value is stored.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Slot {
    Array(usize),
    Node(usize),
}

pub(crate) struct RawTable<V> {
    array: Vec<Option<V>>,
    nodes: Vec<Node<V>>,
    array_size_log2: u32,
    hash_size_log2: u32,
    vacancy_head: Option<usize>,
    last_free: usize,
    len: usize,
}

impl<V> RawTable<V> {
    pub fn new(array_size_log2: u32, hash_size_log2: u32) -> Self {
        debug_assert!(hash_size_log2 >= 1);
        let array_size = 1usize << array_size_log2;
        let hash_size = 1usize << hash_size_log2;
        Self {
            array: (0..array_size).map(|_| None).collect(),
            nodes: (0..hash_size).map(|_| Node::vacant()).collect(),
            array_size_log2,
            hash_size_log2,
            vacancy_head: None,
            last_free: hash_size - 1,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn array_size(&self) -> usize {
        1 << self.array_size_log2
    }

    #[inline]
    pub fn hash_size(&self) -> usize {
        1 << self.hash_size_log2
    }

    pub fn array_len(&self) -> usize {
        self.array.iter().filter(|v| v.is_some()).count()
    }

    pub fn hash_len(&self) -> usize {
        self.nodes.iter().filter(|n| !n.is_empty()).count()
    }

    #[inline]
    fn array_index(&self, key: &Key) -> Option<usize> {
        match *key {
            Key::Integer(i) if i >= 0 && (i as u64) < self.array_size() as u64 => {
                Some(i as usize)
            }
            _ => None,
        }
    }

    #[inline]
    fn slot_of(&self, hash: u64) -> usize {
        (hash & (self.hash_size() as u64 - 1)) as usize
    }

    /// Walks the chain rooted at `main` looking for `key`.
    fn find_node(&self, main: usize, key: &Key) -> Option<usize> {
        let mut cur = Some(main);
        while let Some(idx) = cur {
            let node = &self.nodes[idx];
            match &node.entry {
                None => return None,
                Some(e) if e.key == *key => return Some(idx),
                Some(_) => cur = node.next,
            }
        }
        None
    }

    pub fn locate(&self, registry: &HashRegistry, key: &Key) -> Result<Option<Slot>> {
        if let Some(i) = self.array_index(key) {
            return Ok(self.array[i].as_ref().map(|_| Slot::Array(i)));
        }
        let main = self.slot_of(key.hash(registry)?);
        Ok(self.find_node(main, key).map(Slot::Node))
    }

    pub fn value(&self, slot: Slot) -> Option<&V> {
        match slot {
            Slot::Array(i) => self.array[i].as_ref(),
            Slot::Node(i) => self.nodes[i].entry.as_ref().map(|e| &e.value),
        }
    }

    pub fn value_mut(&mut self, slot: Slot) -> Option<&mut V> {
        match slot {
            Slot::Array(i) => self.array[i].as_mut(),
            Slot::Node(i) => self.nodes[i].entry.as_mut().map(|e| &mut e.value),
        }
    }

    /// Inserts or overwrites. A full hash segment triggers one resize, after
    /// which the entry is placed from the top, array check included.
    pub fn insert(&mut self, registry: &HashRegistry, key: Key, value: V) -> Result<Slot> {
        if let Some(i) = self.array_index(&key) {
            return Ok(self.store_in_array(i, value));
        }
        let hash = key.hash(registry)?;
        let entry = match self.insert_hashed(Entry { key, value, hash }) {
            Ok(idx) => return Ok(Slot::Node(idx)),
            Err(entry) => entry,
        };
        self.recompute_size();
        Ok(self.reinsert(entry))
    }

    fn store_in_array(&mut self, i: usize, value: V) -> Slot {
        if self.array[i].replace(value).is_none() {
            self.len += 1;
        }
        Slot::Array(i)
    }

    /// Places an entry whose key is known to be outside the array range.
    /// Hands the entry back when no free slot is left.
    fn insert_hashed(&mut self, entry: Entry<V>) -> core::result::Result<usize, Entry<V>> {
        let main = self.slot_of(entry.hash);
        if let Some(idx) = self.find_node(main, &entry.key) {
            if let Some(existing) = self.nodes[idx].entry.as_mut() {
                existing.value = entry.value;
            }
            return Ok(idx);
        }

        let occupant_home = match &self.nodes[main].entry {
            None => {
                self.nodes[main].entry = Some(entry);
                self.len += 1;
                return Ok(main);
            }
            Some(occupant) => self.slot_of(occupant.hash),
        };

        let Some(free) = self.free_position() else {
            return Err(entry);
        };

        let placed = if occupant_home == main {
            // Occupant heads this chain: the new entry goes right after it.
            let after_head = self.nodes[main].next;
            let node = &mut self.nodes[free];
            node.entry = Some(entry);
            node.next = after_head;
            self.nodes[main].next = Some(free);
            free
        } else {
            // Occupant was displaced from another chain: move it out and
            // take back the main position.
            let prev = self
                .predecessor(occupant_home, main)
                .expect("displaced entry is linked from its home chain");
            let displaced = self.nodes[main].entry.take();
            let displaced_next = self.nodes[main].next.take();
            let node = &mut self.nodes[free];
            node.entry = displaced;
            node.next = displaced_next;
            self.nodes[prev].next = Some(free);
            self.nodes[main].entry = Some(entry);
            main
        };
        self.len += 1;
        Ok(placed)
    }

    /// Insert path used after a resize and when moving entries into a fresh
    /// table. Capacity is guaranteed by the sizing plan.
    fn reinsert(&mut self, entry: Entry<V>) -> Slot {
        if let Some(i) = self.array_index(&entry.key) {
            return self.store_in_array(i, entry.value);
        }
        match self.insert_hashed(entry) {
            Ok(idx) => Slot::Node(idx),
            Err(_) => panic!("resized table has no free slot for a live entry"),
        }
    }

    fn predecessor(&self, head: usize, target: usize) -> Option<usize> {
        let mut cur = head;
        loop {
            match self.nodes[cur].next {
                Some(n) if n == target => return Some(cur),
                Some(n) => cur = n,
                None => return None,
            }
        }
    }

    /// Finds an empty hash slot: vacancy list first, then the backward scan.
    fn free_position(&mut self) -> Option<usize> {
        while let Some(head) = self.vacancy_head {
            let node = &mut self.nodes[head];
            if node.is_empty() {
                return Some(head);
            }
            self.vacancy_head = node.vacancy_next.take();
            node.listed = false;
        }
        loop {
            if self.nodes[self.last_free].is_empty() {
                trace!(slot = self.last_free, "free slot found by scan");
                return Some(self.last_free);
            }
            if self.last_free == 0 {
                return None;
            }
            self.last_free -= 1;
        }
    }

    /// Empties a slot and threads it onto the vacancy list.
    fn release(&mut self, idx: usize) -> Option<Entry<V>> {
        let node = &mut self.nodes[idx];
        let entry = node.entry.take();
        node.next = None;
        if !node.listed {
            node.listed = true;
            node.vacancy_next = self.vacancy_head;
            self.vacancy_head = Some(idx);
        }
        entry
    }

    pub fn erase(&mut self, registry: &HashRegistry, key: &Key) -> Result<Option<V>> {
        if let Some(i) = self.array_index(key) {
            let removed = self.array[i].take();
            if removed.is_some() {
                self.len -= 1;
            }
            return Ok(removed);
        }

        let main = self.slot_of(key.hash(registry)?);
        let mut prev = None;
        let mut cur = main;
        loop {
            let node = &self.nodes[cur];
            match &node.entry {
                None => return Ok(None),
                Some(e) if e.key == *key => break,
                Some(_) => {}
            }
            match node.next {
                Some(n) => {
                    prev = Some(cur);
                    cur = n;
                }
                None => return Ok(None),
            }
        }

        let removed = match (prev, self.nodes[cur].next) {
            (None, None) => self.release(cur),
            (None, Some(next)) => {
                // Pull the successor into the head so the chain stays rooted
                // at its main position.
                let successor = self.nodes[next].entry.take();
                let successor_next = self.nodes[next].next.take();
                let removed = std::mem::replace(&mut self.nodes[cur].entry, successor);
                self.nodes[cur].next = successor_next;
                self.release(next);
                removed
            }
            (Some(p), next) => {
                self.nodes[p].next = next;
                self.release(cur)
            }
        };
        self.len -= 1;
        Ok(removed.map(|e| e.value))
    }

    /// Re-plans both segment sizes from current occupancy, then rebuilds.
    fn recompute_size(&mut self) {
        let mut census = Census::new();
        for (i, v) in self.array.iter().enumerate().skip(1) {
            if v.is_some() {
                census.record(Some(i as i64));
            }
        }
        for node in &self.nodes {
            if let Some(e) = &node.entry {
                census.record(e.key.as_integer());
            }
        }
        let plan = census.plan();
        debug!(
            live = self.len,
            array_part = plan.array_part,
            old_array_size = self.array_size(),
            old_hash_size = self.hash_size(),
            new_array_size = 1usize << plan.array_size_log2,
            new_hash_size = 1usize << plan.hash_size_log2,
            "resizing table"
        );
        self.resize(plan.array_size_log2, plan.hash_size_log2);
    }

    /// Moves every live entry into freshly sized segments and swaps them in.
    pub fn resize(&mut self, array_size_log2: u32, hash_size_log2: u32) {
        let live = self.len;
        let mut fresh = RawTable::new(array_size_log2, hash_size_log2);
        let boundary = self.array_size().min(fresh.array_size());

        let old_array = std::mem::take(&mut self.array);
        for (i, slot) in old_array.into_iter().enumerate() {
            let Some(value) = slot else { continue };
            if i < boundary {
                fresh.store_in_array(i, value);
            } else {
                let key = Key::Integer(i as i64);
                let hash = hash_integer(i as i64);
                fresh.reinsert(Entry { key, value, hash });
            }
        }

        let old_nodes = std::mem::take(&mut self.nodes);
        for entry in old_nodes.into_iter().filter_map(|n| n.entry) {
            fresh.reinsert(entry);
        }

        debug_assert_eq!(fresh.len, live, "resize changed the live entry count");
        *self = fresh;
    }

    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            array: self.array.iter().enumerate(),
            nodes: self.nodes.iter(),
        }
    }

    /// Checks every structural invariant, returning a description of the
    /// first violation found.
    #[cfg(test)]
    pub fn check_invariants(&self, registry: &HashRegistry) -> core::result::Result<(), String> {
        if !self.array.len().is_power_of_two() || self.array.len() != self.array_size() {
            return Err(format!("array segment has length {}", self.array.len()));
        }
        if self.nodes.len() < 2 || self.nodes.len() != self.hash_size() {
            return Err(format!("hash segment has length {}", self.nodes.len()));
        }
        let mut live = self.array_len();
        for (idx, node) in self.nodes.iter().enumerate() {
            let Some(e) = &node.entry else {
                if node.next.is_some() {
                    return Err(format!("empty slot {idx} has a chain link"));
                }
                continue;
            };
            live += 1;
            if self.array_index(&e.key).is_some() {
                return Err(format!("array-range key {:?} stored in slot {idx}", e.key));
            }
            let fresh_hash = e.key.hash(registry).map_err(|err| err.to_string())?;
            if fresh_hash != e.hash {
                return Err(format!("stale hash for {:?}", e.key));
            }
            let home = self.slot_of(e.hash);
            let home_holds_head = self.nodes[home]
                .entry
                .as_ref()
                .is_some_and(|h| self.slot_of(h.hash) == home);
            if !home_holds_head {
                return Err(format!("chain of {:?} is not rooted at slot {home}", e.key));
            }
            // Walk by slot index: keys such as NaN never compare equal.
            let mut cur = Some(home);
            let mut steps = 0;
            while let Some(c) = cur.filter(|&c| c != idx && steps <= self.nodes.len()) {
                cur = self.nodes[c].next;
                steps += 1;
            }
            if cur != Some(idx) {
                return Err(format!("{:?} in slot {idx} unreachable from slot {home}", e.key));
            }
        }
        if live != self.len {
            return Err(format!("len {} but {} live entries", self.len, live));
        }
        Ok(())
    }
}

/// Iterator over live entries, array segment first. Order is unspecified and
/// changes across resizes.
pub struct Iter<'a, V> {
    array: core::iter::Enumerate<core::slice::Iter<'a, Option<V>>>,
    nodes: core::slice::Iter<'a, Node<V>>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (Cow<'a, Key>, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        for (i, slot) in self.array.by_ref() {
            if let Some(v) = slot {
                return Some((Cow::Owned(Key::Integer(i as i64)), v));
            }
        }
        self.nodes
            .by_ref()
            .find_map(|n| n.entry.as_ref())
            .map(|e| (Cow::Borrowed(&e.key), &e.value))
    }
}
