//! Named response caches with insertion-order eviction.
//!
//! A [`Cache`] maps [`RequestKey`]s to [`HttpResponse`]s and remembers the
//! order entries were written. Re-putting a key moves it to the tail, so the
//! head is always the oldest write. [`Cache::put_bounded`] evicts from the
//! head before inserting a new key into a full cache, which keeps the entry
//! count at or below the cap after every bounded write.
//!
//! [`CacheStorage`] is the set of named caches for one origin, kept in
//! creation order. Lookups through [`CacheStorage::match_request`] search
//! every cache in that order.
//!
//! Locks recover from poisoning: a panic in another task while holding a
//! cache lock never turns into a panic here.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::{HttpResponse, RequestKey};

#[derive(Default)]
struct Entries {
    order: VecDeque<RequestKey>,
    map: HashMap<RequestKey, HttpResponse>,
}

impl Entries {
    fn unlink(&mut self, key: &RequestKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }
}

/// One named cache.
pub struct Cache {
    name: String,
    entries: RwLock<Entries>,
}

impl Cache {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(Entries::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `response` under `key`, replacing any previous entry and moving
    /// the key to the tail.
    pub fn put(&self, key: RequestKey, response: HttpResponse) {
        let mut entries = self.write();
        entries.unlink(&key);
        entries.order.push_back(key.clone());
        entries.map.insert(key, response);
    }

    /// Like [`put`](Cache::put), but a new key never grows the cache past
    /// `cap`: the oldest entries are evicted first. Returns the evicted keys.
    pub fn put_bounded(&self, key: RequestKey, response: HttpResponse, cap: usize) -> Vec<RequestKey> {
        let mut entries = self.write();
        let mut evicted = Vec::new();

        if entries.map.contains_key(&key) {
            entries.unlink(&key);
        } else {
            if cap == 0 {
                return evicted;
            }
            while entries.map.len() >= cap {
                match entries.order.pop_front() {
                    Some(oldest) => {
                        entries.map.remove(&oldest);
                        evicted.push(oldest);
                    }
                    None => break,
                }
            }
        }

        entries.order.push_back(key.clone());
        entries.map.insert(key, response);
        evicted
    }

    pub fn get(&self, key: &RequestKey) -> Option<HttpResponse> {
        self.read().map.get(key).cloned()
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.read().map.contains_key(key)
    }

    pub fn delete(&self, key: &RequestKey) -> bool {
        let mut entries = self.write();
        let removed = entries.map.remove(key).is_some();
        if removed {
            entries.unlink(key);
        }
        removed
    }

    /// Keys from oldest to newest write.
    pub fn keys(&self) -> Vec<RequestKey> {
        self.read().order.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The named caches belonging to one worker origin.
#[derive(Default)]
pub struct CacheStorage {
    caches: RwLock<Vec<Arc<Cache>>>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cache called `name`, creating it if needed.
    pub fn open(&self, name: &str) -> Arc<Cache> {
        let mut caches = self.caches.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = caches.iter().find(|c| c.name() == name) {
            return Arc::clone(existing);
        }
        let cache = Arc::new(Cache::new(name));
        caches.push(Arc::clone(&cache));
        cache
    }

    pub fn get(&self, name: &str) -> Option<Arc<Cache>> {
        self.caches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn delete(&self, name: &str) -> bool {
        let mut caches = self.caches.write().unwrap_or_else(PoisonError::into_inner);
        let before = caches.len();
        caches.retain(|c| c.name() != name);
        caches.len() != before
    }

    /// Cache names in creation order.
    pub fn keys(&self) -> Vec<String> {
        self.caches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    /// First cached response for `key` across all caches, with the name of
    /// the cache that held it.
    pub fn match_request(&self, key: &RequestKey) -> Option<(String, HttpResponse)> {
        let caches = self.caches.read().unwrap_or_else(PoisonError::into_inner);
        caches
            .iter()
            .find_map(|c| c.get(key).map(|resp| (c.name().to_string(), resp)))
    }
}
