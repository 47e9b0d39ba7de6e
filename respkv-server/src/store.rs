//! # Keyspace
//!
//! Sixteen logical databases, each a map from key to typed value guarded by
//! its own mutex. Expired keys are removed lazily when they are touched.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};

/// Number of logical databases selectable with SELECT.
pub const DATABASES: usize = 16;

/// A stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(Vec<u8>),
    List(VecDeque<Vec<u8>>),
    Set(HashSet<Vec<u8>>),
    Hash(HashMap<Vec<u8>, Vec<u8>>),
}

impl Value {
    /// Name reported by TYPE.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Hash(_) => "hash",
        }
    }

    /// Collections are dropped from the keyspace once they become empty.
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Value::Str(_) => false,
            Value::List(items) => items.is_empty(),
            Value::Set(members) => members.is_empty(),
            Value::Hash(fields) => fields.is_empty(),
        }
    }
}

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlStatus {
    Missing,
    NoExpiry,
    ExpiresIn(Duration),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |deadline| deadline <= now)
    }
}

/// One logical database.
#[derive(Debug, Default)]
pub struct Db {
    entries: HashMap<Vec<u8>, Entry>,
}

impl Db {
    fn purge(&mut self, key: &[u8]) {
        let now = Instant::now();
        if self.entries.get(key).map_or(false, |entry| entry.is_expired(now)) {
            self.entries.remove(key);
        }
    }

    fn purge_all(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }

    pub fn get(&mut self, key: &[u8]) -> Option<&Value> {
        self.purge(key);
        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Value> {
        self.purge(key);
        self.entries.get_mut(key).map(|entry| &mut entry.value)
    }

    /// Returns the value at `key`, inserting `init()` when absent.
    pub fn get_or_insert_with(&mut self, key: &[u8], init: impl FnOnce() -> Value) -> &mut Value {
        self.purge(key);
        &mut self
            .entries
            .entry(key.to_vec())
            .or_insert_with(|| Entry {
                value: init(),
                expires_at: None,
            })
            .value
    }

    pub fn contains(&mut self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Stores `value` and clears any expiry.
    pub fn insert(&mut self, key: Vec<u8>, value: Value) -> Option<Value> {
        self.entries
            .insert(
                key,
                Entry {
                    value,
                    expires_at: None,
                },
            )
            .map(|old| old.value)
    }

    /// Stores `value` and keeps the key's current expiry.
    pub fn replace(&mut self, key: &[u8], value: Value) {
        self.purge(key);
        match self.entries.get_mut(key) {
            Some(entry) => entry.value = value,
            None => {
                self.insert(key.to_vec(), value);
            }
        }
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Value> {
        self.purge(key);
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Drops `key` if it holds an emptied collection.
    pub fn remove_if_empty(&mut self, key: &[u8]) {
        if self
            .entries
            .get(key)
            .map_or(false, |entry| entry.value.is_empty_collection())
        {
            self.entries.remove(key);
        }
    }

    pub fn rename(&mut self, src: &[u8], dst: &[u8]) -> bool {
        self.purge(src);
        match self.entries.remove(src) {
            Some(entry) => {
                self.entries.insert(dst.to_vec(), entry);
                true
            }
            None => false,
        }
    }

    pub fn expire(&mut self, key: &[u8], ttl: Duration) -> bool {
        self.purge(key);
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                true
            }
            None => false,
        }
    }

    pub fn ttl(&mut self, key: &[u8]) -> TtlStatus {
        self.purge(key);
        match self.entries.get(key) {
            None => TtlStatus::Missing,
            Some(Entry {
                expires_at: None, ..
            }) => TtlStatus::NoExpiry,
            Some(Entry {
                expires_at: Some(deadline),
                ..
            }) => TtlStatus::ExpiresIn(deadline.saturating_duration_since(Instant::now())),
        }
    }

    pub fn len(&mut self) -> usize {
        self.purge_all();
        self.entries.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    pub fn keys(&mut self) -> Vec<Vec<u8>> {
        self.purge_all();
        self.entries.keys().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// All logical databases of one server.
#[derive(Debug)]
pub struct Keyspace {
    dbs: Vec<Mutex<Db>>,
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyspace {
    pub fn new() -> Self {
        Keyspace {
            dbs: (0..DATABASES).map(|_| Mutex::new(Db::default())).collect(),
        }
    }

    /// Locks database `index`, or `None` when out of range.
    pub fn db(&self, index: usize) -> Option<MutexGuard<'_, Db>> {
        self.dbs.get(index).map(|db| db.lock())
    }

    pub fn flush_all(&self) {
        for db in &self.dbs {
            db.lock().clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_keys_disappear() {
        let mut db = Db::default();
        db.insert(b"k".to_vec(), Value::Str(b"v".to_vec()));
        assert!(db.expire(b"k", Duration::ZERO));
        assert_eq!(db.get(b"k"), None);
        assert_eq!(db.ttl(b"k"), TtlStatus::Missing);
        assert_eq!(db.len(), 0);
    }

    #[test]
    fn replace_keeps_expiry_and_insert_clears_it() {
        let mut db = Db::default();
        db.insert(b"k".to_vec(), Value::Str(b"1".to_vec()));
        db.expire(b"k", Duration::from_secs(60));

        db.replace(b"k", Value::Str(b"2".to_vec()));
        assert!(matches!(db.ttl(b"k"), TtlStatus::ExpiresIn(_)));

        db.insert(b"k".to_vec(), Value::Str(b"3".to_vec()));
        assert_eq!(db.ttl(b"k"), TtlStatus::NoExpiry);
    }

    #[test]
    fn emptied_collections_are_removed() {
        let mut db = Db::default();
        if let Value::List(items) = db.get_or_insert_with(b"l", || Value::List(VecDeque::new())) {
            items.push_back(b"x".to_vec());
            items.pop_front();
        }
        db.remove_if_empty(b"l");
        assert!(!db.contains(b"l"));
    }

    #[test]
    fn databases_are_isolated() {
        let keyspace = Keyspace::new();
        keyspace
            .db(0)
            .unwrap()
            .insert(b"k".to_vec(), Value::Str(b"zero".to_vec()));
        assert!(!keyspace.db(1).unwrap().contains(b"k"));
        assert!(keyspace.db(DATABASES).is_none());

        keyspace.flush_all();
        assert!(keyspace.db(0).unwrap().is_empty());
    }
}
