//! Ordered view of volatile keys, shared by the lazy read path and the
//! active background sweeper.

use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
pub struct ExpiryIndex {
    by_time: BTreeSet<(u64, Bytes)>,
    by_key: HashMap<Bytes, u64>,
}

impl ExpiryIndex {
    pub fn new() -> Self {
        ExpiryIndex {
            by_time: BTreeSet::new(),
            by_key: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn get(&self, key: &Bytes) -> Option<u64> {
        self.by_key.get(key).copied()
    }

    /// Insert or overwrite the expiry for `key`.
    pub fn insert(&mut self, key: Bytes, when_millis: u64) {
        if let Some(&old) = self.by_key.get(&key) {
            self.by_time.remove(&(old, key.clone()));
        }
        self.by_time.insert((when_millis, key.clone()));
        self.by_key.insert(key, when_millis);
    }

    /// Same as `insert`, named for the update call site in `EXPIRE`/`PERSIST` handlers.
    pub fn update(&mut self, key: Bytes, when_millis: u64) {
        self.insert(key, when_millis);
    }

    pub fn remove(&mut self, key: &Bytes) -> bool {
        if let Some(when) = self.by_key.remove(key) {
            self.by_time.remove(&(when, key.clone()));
            true
        } else {
            false
        }
    }

    /// Keys whose `expire_at <= now`, removed from the index as they're
    /// returned. The caller still owns deleting them from the keyspace.
    pub fn pop_expired(&mut self, now_millis: u64, limit: usize) -> Vec<Bytes> {
        let mut out = Vec::new();
        while out.len() < limit {
            let Some((when, key)) = self.by_time.iter().next().cloned() else {
                break;
            };
            if when > now_millis {
                break;
            }
            self.by_time.remove(&(when, key.clone()));
            self.by_key.remove(&key);
            out.push(key);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_expired_respects_the_limit_and_ordering() {
        let mut idx = ExpiryIndex::new();
        idx.insert(Bytes::from_static(b"a"), 100);
        idx.insert(Bytes::from_static(b"b"), 50);
        idx.insert(Bytes::from_static(b"c"), 200);

        let popped = idx.pop_expired(150, 10);
        assert_eq!(popped, vec![Bytes::from_static(b"b"), Bytes::from_static(b"a")]);
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn update_replaces_prior_timestamp() {
        let mut idx = ExpiryIndex::new();
        idx.insert(Bytes::from_static(b"a"), 100);
        idx.update(Bytes::from_static(b"a"), 10);
        assert_eq!(idx.get(&Bytes::from_static(b"a")), Some(10));
        assert_eq!(idx.pop_expired(10, 10), vec![Bytes::from_static(b"a")]);
    }

    #[test]
    fn remove_drops_key_from_both_indexes() {
        let mut idx = ExpiryIndex::new();
        idx.insert(Bytes::from_static(b"a"), 100);
        assert!(idx.remove(&Bytes::from_static(b"a")));
        assert!(idx.is_empty());
        assert!(idx.pop_expired(1_000, 10).is_empty());
    }
}
