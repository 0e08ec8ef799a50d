//! Dictionary Index Primitives
//!
//! Assign compact integer ids to recurring strings (paths, operation ids,
//! HTTP methods, test keys).
//!
//! - **ArrivalDictionary**: ids assigned in insertion order, permanent
//! - **SortedDictionary**: ids are [`MutableId`] slots whose final value is
//!   the lexicographic rank of the string, rewritten by [`SortedDictionary::sort`]
//! - **DictionarySet**: independent dictionaries grouped under named buckets
//!
//! # Forward references
//!
//! ```text
//! put("/pets/{id}") → slot 0   cells: [0]
//! put("/owners")    → slot 1   cells: [0, 1]
//! sort()                       cells: [1, 0]   ("/owners" < "/pets/{id}")
//! id(slot 0)        → 1
//! ```
//!
//! Holders keep the slot and dereference it through the dictionary, so a
//! single `sort()` updates every reference minted before it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One materialized dictionary entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictEntry {
    pub id: u32,
    pub value: String,
}

/// Common interface of all dictionaries
pub trait StringIndex {
    /// Handle returned by `put`
    type Id: Copy;

    /// Insert a string (idempotent) and return its handle
    fn put(&mut self, value: &str) -> Self::Id;

    /// Look up a string without inserting
    fn get(&self, value: &str) -> Option<Self::Id>;

    /// Current numeric id behind a handle, `None` for a foreign handle
    fn id(&self, handle: Self::Id) -> Option<u32>;

    /// Dense `{id, value}` list ordered by id
    fn entries(&self) -> Vec<DictEntry>;

    /// Bring ids into their final order (no-op for arrival order)
    fn sort(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Arrival-order dictionary: the first string gets id 0, the next 1, ...
#[derive(Debug, Default, Clone)]
pub struct ArrivalDictionary {
    values: Vec<String>,
    ids: HashMap<String, u32>,
}

impl ArrivalDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// String behind an id
    pub fn value(&self, id: u32) -> Option<&str> {
        self.values.get(id as usize).map(String::as_str)
    }
}

impl StringIndex for ArrivalDictionary {
    type Id = u32;

    fn put(&mut self, value: &str) -> u32 {
        if let Some(&id) = self.ids.get(value) {
            return id;
        }

        let id = self.values.len() as u32;
        self.ids.insert(value.to_string(), id);
        self.values.push(value.to_string());
        id
    }

    fn get(&self, value: &str) -> Option<u32> {
        self.ids.get(value).copied()
    }

    fn id(&self, handle: u32) -> Option<u32> {
        ((handle as usize) < self.values.len()).then_some(handle)
    }

    fn entries(&self) -> Vec<DictEntry> {
        self.values
            .iter()
            .enumerate()
            .map(|(id, value)| DictEntry {
                id: id as u32,
                value: value.clone(),
            })
            .collect()
    }

    fn sort(&mut self) {}

    fn len(&self) -> usize {
        self.values.len()
    }
}

/// Handle to a cell in a [`SortedDictionary`]
///
/// Only meaningful to the dictionary that issued it. Elsewhere it resolves
/// to `None` when out of range, or to an unrelated id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutableId(u32);

impl MutableId {
    /// Arena slot (insertion position), stable for the whole run
    pub fn slot(self) -> u32 {
        self.0
    }
}

/// Sortable dictionary whose ids become lexicographic ranks after `sort()`
#[derive(Debug, Default, Clone)]
pub struct SortedDictionary {
    /// Strings by slot
    values: Vec<String>,
    slots: HashMap<String, MutableId>,
    /// Current id of each slot
    cells: Vec<u32>,
    sorted: bool,
}

impl SortedDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no string was added since the last `sort()`
    pub fn is_sorted(&self) -> bool {
        self.sorted || self.values.is_empty()
    }

    /// String behind a handle
    pub fn value(&self, handle: MutableId) -> Option<&str> {
        self.values.get(handle.0 as usize).map(String::as_str)
    }
}

impl StringIndex for SortedDictionary {
    type Id = MutableId;

    fn put(&mut self, value: &str) -> MutableId {
        if let Some(&handle) = self.slots.get(value) {
            return handle;
        }

        let slot = self.values.len() as u32;
        let handle = MutableId(slot);
        self.slots.insert(value.to_string(), handle);
        self.values.push(value.to_string());
        // Provisional id until the next sort
        self.cells.push(slot);
        self.sorted = false;
        handle
    }

    fn get(&self, value: &str) -> Option<MutableId> {
        self.slots.get(value).copied()
    }

    fn id(&self, handle: MutableId) -> Option<u32> {
        self.cells.get(handle.0 as usize).copied()
    }

    fn entries(&self) -> Vec<DictEntry> {
        let mut entries: Vec<DictEntry> = self
            .values
            .iter()
            .zip(&self.cells)
            .map(|(value, &id)| DictEntry {
                id,
                value: value.clone(),
            })
            .collect();
        entries.sort_by_key(|e| e.id);
        entries
    }

    fn sort(&mut self) {
        let mut order: Vec<usize> = (0..self.values.len()).collect();
        order.sort_by(|&a, &b| self.values[a].cmp(&self.values[b]));

        for (rank, slot) in order.into_iter().enumerate() {
            self.cells[slot] = rank as u32;
        }
        self.sorted = true;
    }

    fn len(&self) -> usize {
        self.values.len()
    }
}

/// Independent dictionaries under named buckets, each with its own id space
#[derive(Debug, Clone)]
pub struct DictionarySet<K, D> {
    buckets: BTreeMap<K, D>,
}

impl<K, D> Default for DictionarySet<K, D> {
    fn default() -> Self {
        Self {
            buckets: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Copy, D: StringIndex + Default> DictionarySet<K, D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set with the given buckets pre-registered
    pub fn with_buckets(keys: &[K]) -> Self {
        let mut set = Self::new();
        for &key in keys {
            set.buckets.insert(key, D::default());
        }
        set
    }

    /// Bucket by name, created on first use
    pub fn bucket(&mut self, key: K) -> &mut D {
        self.buckets.entry(key).or_default()
    }

    pub fn get_bucket(&self, key: K) -> Option<&D> {
        self.buckets.get(&key)
    }

    pub fn put(&mut self, key: K, value: &str) -> D::Id {
        self.bucket(key).put(value)
    }

    /// Current id of a handle in a bucket
    pub fn id(&self, key: K, handle: D::Id) -> Option<u32> {
        self.buckets.get(&key).and_then(|d| d.id(handle))
    }

    pub fn sort_all(&mut self) {
        for dictionary in self.buckets.values_mut() {
            dictionary.sort();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &D)> {
        self.buckets.iter()
    }

    /// Total strings across all buckets
    pub fn total_len(&self) -> usize {
        self.buckets.values().map(|d| d.len()).sum()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arrival_put_is_idempotent() {
        let mut dict = ArrivalDictionary::new();

        let a = dict.put("get");
        let b = dict.put("post");
        assert_eq!(dict.put("get"), a);
        assert_ne!(a, b);
        assert_eq!((a, b), (0, 1));

        assert_eq!(dict.get("post"), Some(1));
        assert_eq!(dict.get("put"), None);
        assert_eq!(dict.value(1), Some("post"));
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn test_arrival_sort_keeps_ids() {
        let mut dict = ArrivalDictionary::new();
        dict.put("zeta");
        dict.put("alpha");
        dict.sort();

        assert_eq!(
            dict.entries(),
            vec![
                DictEntry { id: 0, value: "zeta".to_string() },
                DictEntry { id: 1, value: "alpha".to_string() },
            ]
        );
    }

    #[test]
    fn test_sorted_put_is_idempotent() {
        let mut dict = SortedDictionary::new();

        let a = dict.put("/pets");
        assert_eq!(dict.put("/pets"), a);
        let b = dict.put("/owners");
        assert_ne!(a, b);
        assert_eq!(dict.len(), 2);
        assert!(!dict.is_sorted());
    }

    #[test]
    fn test_sort_rewrites_all_handles() {
        let mut dict = SortedDictionary::new();
        let pets_id = dict.put("/pets/{id}");
        let owners = dict.put("/owners");
        let pets = dict.put("/pets");

        // Provisional ids are arrival order
        assert_eq!(dict.id(pets_id), Some(0));
        assert_eq!(dict.id(pets), Some(2));

        dict.sort();
        assert!(dict.is_sorted());
        assert_eq!(dict.id(owners), Some(0));
        assert_eq!(dict.id(pets), Some(1));
        assert_eq!(dict.id(pets_id), Some(2));

        let values: Vec<String> = dict.entries().into_iter().map(|e| e.value).collect();
        assert_eq!(values, vec!["/owners", "/pets", "/pets/{id}"]);

        // Handle issued by a larger dictionary
        let mut other = SortedDictionary::new();
        for v in ["a", "b", "c", "d"] {
            other.put(v);
        }
        assert_eq!(dict.id(other.put("e")), None);
    }

    #[test]
    fn test_sort_is_rederived_not_cumulative() {
        let mut dict = SortedDictionary::new();
        let b = dict.put("b");
        let c = dict.put("c");
        dict.sort();
        dict.sort();
        assert_eq!((dict.id(b), dict.id(c)), (Some(0), Some(1)));

        // Late insert gets a provisional id, next sort re-ranks everything
        let a = dict.put("a");
        assert_eq!(dict.id(a), Some(2));
        dict.sort();
        assert_eq!((dict.id(a), dict.id(b), dict.id(c)), (Some(0), Some(1), Some(2)));

        let entries = dict.entries();
        assert!(entries.windows(2).all(|w| w[0].value <= w[1].value));
        assert!(entries.iter().enumerate().all(|(i, e)| e.id == i as u32));
    }

    #[test]
    fn test_dictionary_set_buckets_are_independent() {
        let mut set: DictionarySet<&'static str, SortedDictionary> =
            DictionarySet::with_buckets(&["paths", "operationIds"]);

        let p = set.put("paths", "/b");
        let o = set.put("operationIds", "/b");
        set.put("paths", "/a");

        assert_eq!(set.total_len(), 3);
        set.sort_all();

        assert_eq!(set.id("paths", p), Some(1));
        assert_eq!(set.id("operationIds", o), Some(0));
        assert_eq!(set.id("missing", o), None);

        let names: Vec<&str> = set.iter().map(|(k, _)| *k).collect();
        assert_eq!(names, vec!["operationIds", "paths"]);
    }
}
