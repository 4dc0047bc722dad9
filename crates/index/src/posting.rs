//! Postings list implementation.
//!
//! A postings list is the ascending list of primary keys that share one indexed
//! value. It is kept as a plain sorted vector because that is also its persisted
//! shape: the backend stores it verbatim as the `pks` column of an index row.

use crate::search::{insertion_point, locate};
use alloc::vec::Vec;
use keel_core::RowKey;

/// A postings list storing primary keys in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingList {
    /// Sorted, duplicate-free primary keys.
    keys: Vec<RowKey>,
}

impl PostingList {
    /// Creates a new empty postings list.
    pub fn new() -> Self {
        Self { keys: Vec::new() }
    }

    /// Builds a list from keys read back from storage.
    ///
    /// Persisted lists are already ordered; the sort only repairs lists written
    /// by something other than this engine.
    pub fn from_keys(mut keys: Vec<RowKey>) -> Self {
        if !keys.windows(2).all(|w| w[0] < w[1]) {
            keys.sort();
            keys.dedup();
        }
        Self { keys }
    }

    /// Inserts a primary key at its ordered position.
    /// Returns false if the key was already present.
    pub fn insert(&mut self, key: RowKey) -> bool {
        if self.keys.is_empty() {
            self.keys.push(key);
            return true;
        }
        let idx = insertion_point(&self.keys, &key);
        if idx < self.keys.len() && self.keys[idx] == key {
            return false;
        }
        self.keys.insert(idx, key);
        true
    }

    /// Removes a primary key.
    /// Returns true if the key was present; a missing key leaves the list untouched.
    pub fn remove(&mut self, key: &RowKey) -> bool {
        match locate(&self.keys, key) {
            Some(idx) => {
                self.keys.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Checks if the list contains a primary key.
    pub fn contains(&self, key: &RowKey) -> bool {
        locate(&self.keys, key).is_some()
    }

    /// Returns the number of primary keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns the keys in stored order.
    pub fn as_slice(&self) -> &[RowKey] {
        &self.keys
    }

    /// Returns an iterator over the keys in stored order.
    pub fn iter(&self) -> impl Iterator<Item = &RowKey> + '_ {
        self.keys.iter()
    }

    /// Consumes the list, returning the keys.
    pub fn into_keys(self) -> Vec<RowKey> {
        self.keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn keys(list: &PostingList) -> Vec<i64> {
        list.iter().filter_map(|k| k.as_int()).collect()
    }

    #[test]
    fn test_posting_list_new() {
        let pl = PostingList::new();
        assert!(pl.is_empty());
        assert_eq!(pl.len(), 0);
    }

    #[test]
    fn test_posting_list_insert_orders() {
        let mut pl = PostingList::new();
        assert!(pl.insert(RowKey::Int(7)));
        assert!(pl.insert(RowKey::Int(3)));
        assert!(pl.insert(RowKey::Int(5)));
        assert_eq!(keys(&pl), vec![3, 5, 7]);
    }

    #[test]
    fn test_posting_list_insert_duplicate() {
        let mut pl = PostingList::new();
        pl.insert(RowKey::Int(1));
        assert!(!pl.insert(RowKey::Int(1)));
        assert_eq!(pl.len(), 1);
    }

    #[test]
    fn test_posting_list_remove() {
        let mut pl = PostingList::from_keys(vec![RowKey::Int(3), RowKey::Int(5), RowKey::Int(7)]);
        assert!(pl.remove(&RowKey::Int(5)));
        assert_eq!(keys(&pl), vec![3, 7]);
        assert!(!pl.remove(&RowKey::Int(5)));
        assert_eq!(keys(&pl), vec![3, 7]);
    }

    #[test]
    fn test_posting_list_remove_last_leaves_empty() {
        let mut pl = PostingList::from_keys(vec![RowKey::Int(1)]);
        assert!(pl.remove(&RowKey::Int(1)));
        assert!(pl.is_empty());
    }

    #[test]
    fn test_posting_list_string_keys() {
        let mut pl = PostingList::new();
        pl.insert("b".into());
        pl.insert("a".into());
        pl.insert("c".into());
        let collected: Vec<_> = pl.iter().filter_map(|k| k.as_str()).collect();
        assert_eq!(collected, vec!["a", "b", "c"]);
        assert!(pl.contains(&"b".into()));
        assert!(!pl.contains(&"d".into()));
    }

    #[test]
    fn test_from_keys_repairs_order() {
        let pl = PostingList::from_keys(vec![RowKey::Int(9), RowKey::Int(2), RowKey::Int(9)]);
        assert_eq!(keys(&pl), vec![2, 9]);
    }

    #[test]
    fn test_large_list_remove_uses_bisect() {
        let mut pl = PostingList::from_keys((0..250).map(RowKey::Int).collect());
        assert!(pl.remove(&RowKey::Int(200)));
        assert!(!pl.contains(&RowKey::Int(200)));
        assert_eq!(pl.len(), 249);
        assert!(!pl.remove(&RowKey::Int(1000)));
    }
}
