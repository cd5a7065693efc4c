//! Expiring map shared by the grant store and the user-override store.
//!
//! Expiry is enforced twice: on the read path, so a stale entry is never
//! observed, and by a periodic sweep that bounds memory growth. An entry is
//! considered expired strictly after its expiry instant (`now > expires_at`).

use std::collections::HashMap;
use std::hash::Hash;

/// Values stored in an [`ExpiringMap`] report their own expiry.
/// `None` means the value never expires.
pub trait Expires {
    fn expires_at(&self) -> Option<u64>;
}

#[derive(Debug, Default)]
pub struct ExpiringMap<K, V> {
    inner: HashMap<K, V>,
}

impl<K, V> ExpiringMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Expires,
{
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    fn is_expired(value: &V, now: u64) -> bool {
        value.expires_at().map_or(false, |at| now > at)
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.inner.insert(key, value)
    }

    /// Get a live entry; an expired one is removed and `None` returned.
    pub fn get(&mut self, key: &K, now: u64) -> Option<&V> {
        if self.expire_if_needed(key, now) {
            return None;
        }
        self.inner.get(key)
    }

    pub fn get_mut(&mut self, key: &K, now: u64) -> Option<&mut V> {
        if self.expire_if_needed(key, now) {
            return None;
        }
        self.inner.get_mut(key)
    }

    pub fn contains(&mut self, key: &K, now: u64) -> bool {
        self.get(key, now).is_some()
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.remove(key)
    }

    /// Remove every expired entry, returning them so the caller can log each.
    pub fn sweep(&mut self, now: u64) -> Vec<(K, V)> {
        let expired: Vec<K> = self
            .inner
            .iter()
            .filter(|(_, v)| Self::is_expired(v, now))
            .map(|(k, _)| k.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|k| self.inner.remove(&k).map(|v| (k, v)))
            .collect()
    }

    /// Keep only entries matching the predicate (used for cascade deletes).
    pub fn retain<F>(&mut self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        self.inner.retain(f);
    }

    /// Iterate entries without an expiry check; call [`sweep`] first when
    /// stale entries must not be visible.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.inner.values()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn expire_if_needed(&mut self, key: &K, now: u64) -> bool {
        let expired = self
            .inner
            .get(key)
            .map_or(false, |v| Self::is_expired(v, now));
        if expired {
            self.inner.remove(key);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Entry {
        expires_at: Option<u64>,
    }

    impl Expires for Entry {
        fn expires_at(&self) -> Option<u64> {
            self.expires_at
        }
    }

    #[test]
    fn test_lazy_expiry_on_read() {
        let mut map = ExpiringMap::new();
        map.insert("a", Entry {
            expires_at: Some(100),
        });

        assert!(map.get(&"a", 100).is_some()); // still live at the instant
        assert!(map.get(&"a", 101).is_none()); // removed on read
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn test_never_expiring_entries() {
        let mut map = ExpiringMap::new();
        map.insert("a", Entry { expires_at: None });
        assert!(map.get(&"a", u64::MAX).is_some());
    }

    #[test]
    fn test_sweep_returns_removed() {
        let mut map = ExpiringMap::new();
        map.insert("a", Entry {
            expires_at: Some(10),
        });
        map.insert("b", Entry {
            expires_at: Some(500),
        });
        map.insert("c", Entry { expires_at: None });

        let removed = map.sweep(100);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].0, "a");
        assert_eq!(map.len(), 2);
    }
}
