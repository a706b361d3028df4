//! Shared in-memory table primitive.

use std::collections::BTreeMap;
use std::sync::RwLock;

/// A keyed row table behind a `RwLock`.
///
/// Intended for tests/dev wiring. Not optimized for performance.
#[derive(Debug, Default)]
pub struct Table<K, V> {
    rows: RwLock<BTreeMap<K, V>>,
}

impl<K: Ord + Clone, V: Clone> Table<K, V> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.rows.read().unwrap().get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.rows.read().unwrap().contains_key(key)
    }

    pub fn insert(&self, key: K, value: V) {
        self.rows.write().unwrap().insert(key, value);
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.rows.write().unwrap().remove(key)
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().unwrap().is_empty()
    }

    pub fn values(&self) -> Vec<V> {
        self.rows.read().unwrap().values().cloned().collect()
    }

    /// Keys of rows matching a predicate.
    pub fn keys_where<F: Fn(&V) -> bool>(&self, pred: F) -> Vec<K> {
        self.rows
            .read()
            .unwrap()
            .iter()
            .filter(|(_, v)| pred(v))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Mutate one row in place; returns false when the key is absent.
    pub fn update<F: FnOnce(&mut V)>(&self, key: &K, f: F) -> bool {
        let mut rows = self.rows.write().unwrap();
        match rows.get_mut(key) {
            Some(v) => {
                f(v);
                true
            }
            None => false,
        }
    }
}
