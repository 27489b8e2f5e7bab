//! Map keyed by ordered sequences of keys.
//!
//! Keys of different length are always distinct entries, even when one is a prefix of the other.
//! Positions are compared with the key type's own equality, so whether a position compares by
//! value or by reference is decided by the key type (see [crate::types::KeyPart]).

use std::{
    collections::{BTreeMap, HashMap},
    hash::Hash,
};

use crate::errors::InvalidKeyError;

pub struct CompositeMap<K, V> {
    root: Node<K>,
    /// Entries by insertion slot, so iteration follows insertion order
    entries: BTreeMap<u64, (Vec<K>, V)>,
    next_slot: u64,
}

struct Node<K> {
    slot: Option<u64>,
    children: HashMap<K, Node<K>>,
}

impl<K> Default for Node<K> {
    fn default() -> Self {
        Node {
            slot: None,
            children: HashMap::new(),
        }
    }
}

impl<K, V> Default for CompositeMap<K, V> {
    fn default() -> Self {
        CompositeMap {
            root: Node::default(),
            entries: BTreeMap::new(),
            next_slot: 0,
        }
    }
}

impl<K: Eq + Hash + Clone, V> CompositeMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a map holding the given entries, in order
    pub fn from_entries(
        entries: impl IntoIterator<Item = (Vec<K>, V)>,
    ) -> Result<Self, InvalidKeyError> {
        let mut map = Self::new();
        for (key, value) in entries {
            map.insert(&key, value)?;
        }
        Ok(map)
    }

    /// Stores a value, returning the value previously stored under the same key.
    ///
    /// Replacing a value keeps the entry's original position.
    pub fn insert(&mut self, key: &[K], value: V) -> Result<Option<V>, InvalidKeyError> {
        if key.is_empty() {
            return Err(InvalidKeyError);
        }

        let mut node = &mut self.root;
        for part in key {
            node = node.children.entry(part.clone()).or_default();
        }

        if let Some(slot) = node.slot {
            if let Some((_, existing)) = self.entries.get_mut(&slot) {
                return Ok(Some(std::mem::replace(existing, value)));
            }
        }

        let slot = self.next_slot;
        self.next_slot += 1;
        node.slot = Some(slot);
        self.entries.insert(slot, (key.to_vec(), value));
        Ok(None)
    }

    pub fn get(&self, key: &[K]) -> Option<&V> {
        let slot = self.slot_of(key)?;
        self.entries.get(&slot).map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &[K]) -> bool {
        self.slot_of(key).is_some()
    }

    pub fn remove(&mut self, key: &[K]) -> Option<V> {
        if key.is_empty() {
            return None;
        }
        let slot = take_slot(&mut self.root, key)?;
        self.entries.remove(&slot).map(|(_, value)| value)
    }

    pub fn clear(&mut self) {
        self.root = Node::default();
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &[K]> + '_ {
        self.entries.values().map(|(key, _)| key.as_slice())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.entries.values().map(|(_, value)| value)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&[K], &V)> + '_ {
        self.entries
            .values()
            .map(|(key, value)| (key.as_slice(), value))
    }

    fn slot_of(&self, key: &[K]) -> Option<u64> {
        if key.is_empty() {
            return None;
        }
        let mut node = &self.root;
        for part in key {
            node = node.children.get(part)?;
        }
        node.slot
    }
}

/// Removes the slot stored at `key`, pruning nodes left without slot and children
fn take_slot<K: Eq + Hash>(node: &mut Node<K>, key: &[K]) -> Option<u64> {
    let Some((first, rest)) = key.split_first() else {
        return node.slot.take();
    };

    let child = node.children.get_mut(first)?;
    let slot = take_slot(child, rest)?;
    if child.slot.is_none() && child.children.is_empty() {
        node.children.remove(first);
    }
    Some(slot)
}
