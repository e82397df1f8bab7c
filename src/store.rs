//! The shared key table.
//!
//! All mutation is serialized through one `Mutex` held only across a
//! single command's synchronous dispatch — never across an `.await`
//! point — which keeps multi-threaded execution observably equivalent to
//! a single thread owning the table. The hashmap container itself is
//! treated as an external black box, so a plain `std::collections::HashMap`
//! is used rather than reaching for a third-party hashmap crate.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::bulk::Bulk;

/// A keyed mapping from `Bulk` to `Bulk`.
#[derive(Default)]
pub struct Store {
    table: Mutex<HashMap<Bulk, Bulk>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `key -> value`, returning the previous value (if
    /// any). The caller passes owned `Bulk` clones in, and whatever this
    /// function doesn't return is simply dropped when it goes out of
    /// scope.
    pub fn set(&self, key: Bulk, value: Bulk) -> Option<Bulk> {
        let mut table = self.table.lock().expect("store mutex poisoned");
        table.insert(key, value)
    }

    /// Look up `key`, returning a clone of the current value (a cheap
    /// refcount bump).
    pub fn get(&self, key: &[u8]) -> Option<Bulk> {
        let table = self.table.lock().expect("store mutex poisoned");
        table.get(key).cloned()
    }

    /// Remove `key`, returning the removed entry if present.
    pub fn delete(&self, key: &[u8]) -> Option<(Bulk, Bulk)> {
        let mut table = self.table.lock().expect("store mutex poisoned");
        table.remove_entry(key)
    }

    pub fn count(&self) -> usize {
        self.table.lock().expect("store mutex poisoned").len()
    }

    /// Snapshot the current keys. Returning an owned `Vec` gives `KEYS`
    /// exactly the "count, then iterate" snapshot it needs, with no
    /// mutate-during-iterate hazard.
    pub fn keys(&self) -> Vec<Bulk> {
        let table = self.table.lock().expect("store mutex poisoned");
        table.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bulk {
        Bulk::from(s)
    }

    #[test]
    fn set_then_get_returns_most_recent_value() {
        let store = Store::new();
        store.set(b("k"), b("v1"));
        store.set(b("k"), b("v2"));
        assert_eq!(store.get(b"k").unwrap().as_slice(), b"v2");
    }

    #[test]
    fn get_missing_key_is_none() {
        let store = Store::new();
        assert!(store.get(b"missing").is_none());
    }

    #[test]
    fn delete_returns_previous_entry_and_removes_it() {
        let store = Store::new();
        store.set(b("k"), b("v"));
        let (key, value) = store.delete(b"k").unwrap();
        assert_eq!(key.as_slice(), b"k");
        assert_eq!(value.as_slice(), b"v");
        assert!(store.get(b"k").is_none());
        assert!(store.delete(b"k").is_none());
    }

    #[test]
    fn count_tracks_live_keys() {
        let store = Store::new();
        assert_eq!(store.count(), 0);
        store.set(b("a"), b("1"));
        store.set(b("b"), b("2"));
        assert_eq!(store.count(), 2);
        store.delete(b("a"));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn keys_snapshot_has_no_duplicates_and_matches_count() {
        let store = Store::new();
        store.set(b("a"), b("1"));
        store.set(b("b"), b("2"));
        let mut keys: Vec<_> = store.keys().iter().map(|k| k.as_slice().to_vec()).collect();
        keys.sort();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(store.keys().len(), store.count());
    }

    #[test]
    fn empty_value_round_trips() {
        let store = Store::new();
        store.set(b("k"), Bulk::from_vec(Vec::new()));
        assert!(store.get(b"k").unwrap().is_empty());
    }
}
