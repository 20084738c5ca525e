//! Time-expiring, capacity-bounded cache.
//!
//! Sits in front of remote reads (chat list, contacts, chat messages) so
//! polling and view refreshes do not hammer the remote with identical
//! requests.
//!
//! Eviction on overflow is FIFO by insertion order, not LRU: keys are
//! per-session / per-chat and churn is low, so recency tracking buys little.
//! Refreshing an existing key updates its value and expiry but keeps its
//! original insertion slot.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Default number of entries.
pub const DEFAULT_CAPACITY: usize = 100;

/// Cache key builders.
///
/// Keys are namespaced by session so a session switch can drop everything
/// with one prefix invalidation. Single keys are dropped with
/// [`TtlCache::remove`]: `chats:work` is also a prefix of `chats:work2`.
pub mod keys {
    use sync_types::ChatId;

    /// Chat list of a session.
    pub fn chats(session: &str) -> String {
        format!("chats:{}", session)
    }

    /// Contact list of a session.
    pub fn contacts(session: &str) -> String {
        format!("contacts:{}", session)
    }

    /// Message page of one chat.
    pub fn messages(session: &str, chat: &ChatId) -> String {
        format!("messages:{}:{}", session, chat)
    }

    /// Prefix covering every chat's message page in a session.
    pub fn all_messages(session: &str) -> String {
        format!("messages:{}:", session)
    }
}

/// A cached value with its absolute expiry.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Cached payload.
    pub value: V,
    /// Instant after which the entry is treated as absent.
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Keyed TTL cache with FIFO eviction.
#[derive(Debug)]
pub struct TtlCache<V> {
    capacity: usize,
    entries: HashMap<String, CacheEntry<V>>,
    /// Keys in insertion order (oldest first).
    order: VecDeque<String>,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Look up `key`; expired entries are evicted and reported absent.
    pub fn get(&mut self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// [`get`](Self::get) with an explicit clock.
    pub fn get_at(&mut self, key: &str, now: Instant) -> Option<V> {
        let expired = self.entries.get(key)?.is_expired(now);
        if expired {
            self.remove(key);
            return None;
        }
        self.entries.get(key).map(|e| e.value.clone())
    }

    /// Store `value` under `key` for `ttl`.
    pub fn set(&mut self, key: impl Into<String>, value: V, ttl: Duration) {
        self.set_at(key, value, ttl, Instant::now());
    }

    /// [`set`](Self::set) with an explicit clock.
    pub fn set_at(&mut self, key: impl Into<String>, value: V, ttl: Duration, now: Instant) {
        let key = key.into();
        let entry = CacheEntry {
            value,
            expires_at: now + ttl,
        };

        if let Some(existing) = self.entries.get_mut(&key) {
            *existing = entry;
            return;
        }

        while self.entries.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }

        self.order.push_back(key.clone());
        self.entries.insert(key, entry);
    }

    /// Drop every entry whose key starts with `prefix`.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate(&mut self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        self.order.retain(|key| !key.starts_with(prefix));
        before - self.entries.len()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Number of stored entries (expired ones included until touched).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop exactly `key`. Returns whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        if self.entries.remove(key).is_none() {
            return false;
        }
        self.order.retain(|k| k != key);
        true
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_types::ChatId;

    const TTL: Duration = Duration::from_secs(10);

    #[test]
    fn hit_before_expiry() {
        let mut cache = TtlCache::new(10);
        let now = Instant::now();
        cache.set_at("a", 1, TTL, now);
        assert_eq!(cache.get_at("a", now + Duration::from_secs(9)), Some(1));
    }

    #[test]
    fn read_past_expiry_is_absent_and_evicted() {
        let mut cache = TtlCache::new(10);
        let now = Instant::now();
        cache.set_at("a", 1, TTL, now);
        assert_eq!(cache.get_at("a", now + TTL), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn overflow_evicts_oldest_insert() {
        let mut cache = TtlCache::new(2);
        let now = Instant::now();
        cache.set_at("a", 1, TTL, now);
        cache.set_at("b", 2, TTL, now);
        // Reading "a" does not protect it: FIFO, not LRU.
        assert_eq!(cache.get_at("a", now), Some(1));
        cache.set_at("c", 3, TTL, now);

        assert_eq!(cache.get_at("a", now), None);
        assert_eq!(cache.get_at("b", now), Some(2));
        assert_eq!(cache.get_at("c", now), Some(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn refresh_keeps_insertion_slot() {
        let mut cache = TtlCache::new(2);
        let now = Instant::now();
        cache.set_at("a", 1, TTL, now);
        cache.set_at("b", 2, TTL, now);
        cache.set_at("a", 10, TTL, now);
        cache.set_at("c", 3, TTL, now);

        assert_eq!(cache.get_at("a", now), None);
        assert_eq!(cache.get_at("b", now), Some(2));
    }

    #[test]
    fn refresh_extends_expiry() {
        let mut cache = TtlCache::new(2);
        let now = Instant::now();
        cache.set_at("a", 1, TTL, now);
        cache.set_at("a", 2, TTL, now + Duration::from_secs(5));
        assert_eq!(cache.get_at("a", now + Duration::from_secs(12)), Some(2));
    }

    #[test]
    fn invalidate_by_prefix() {
        let mut cache = TtlCache::new(10);
        let a = ChatId::from("1@c.us");
        let b = ChatId::from("2@c.us");
        cache.set(keys::chats("s"), 0, TTL);
        cache.set(keys::messages("s", &a), 1, TTL);
        cache.set(keys::messages("s", &b), 2, TTL);

        assert_eq!(cache.invalidate(&keys::messages("s", &a)), 1);
        assert_eq!(cache.get(&keys::messages("s", &b)), Some(2));
        assert_eq!(cache.invalidate(&keys::all_messages("s")), 1);
        assert_eq!(cache.get(&keys::chats("s")), Some(0));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn remove_leaves_longer_keys_alone() {
        let mut cache = TtlCache::new(10);
        cache.set(keys::chats("work"), 1, TTL);
        cache.set(keys::chats("work2"), 2, TTL);
        cache.set(keys::messages("s", &ChatId::from("1@c.us")), 3, TTL);
        cache.set(keys::messages("s", &ChatId::from("1@c.us2")), 4, TTL);

        assert!(cache.remove(&keys::chats("work")));
        assert!(!cache.remove(&keys::chats("work")));
        assert_eq!(cache.get(&keys::chats("work2")), Some(2));

        assert!(cache.remove(&keys::messages("s", &ChatId::from("1@c.us"))));
        assert_eq!(cache.get(&keys::messages("s", &ChatId::from("1@c.us2"))), Some(4));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn clear_empties_everything() {
        let mut cache = TtlCache::default();
        cache.set("a", 1, TTL);
        cache.set("b", 2, TTL);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), DEFAULT_CAPACITY);
    }
}
