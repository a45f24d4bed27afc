use crate::eviction::{EvictionMeta, EvictionPolicy};
use crate::types::Value;

/// An entry in the keyspace — a value plus its TTL and eviction bookkeeping.
#[derive(Debug, Clone)]
pub struct KeyEntry {
    pub value: Value,
    /// Expiry time as milliseconds since the Unix epoch. `None` = persistent.
    pub expire_at: Option<u64>,
    pub eviction: EvictionMeta,
}

impl KeyEntry {
    pub fn new(value: Value, policy: EvictionPolicy, now_millis: u64) -> Self {
        KeyEntry {
            value,
            expire_at: None,
            eviction: EvictionMeta::fresh(policy, now_millis),
        }
    }

    pub fn with_expiry(
        value: Value,
        expire_at: u64,
        policy: EvictionPolicy,
        now_millis: u64,
    ) -> Self {
        KeyEntry {
            value,
            expire_at: Some(expire_at),
            eviction: EvictionMeta::fresh(policy, now_millis),
        }
    }

    pub fn is_expired(&self, now_millis: u64) -> bool {
        self.expire_at.is_some_and(|at| now_millis >= at)
    }

    /// Seconds, or -1 for persistent, -2 for expired/absent.
    pub fn ttl_seconds(&self, now_millis: u64) -> i64 {
        match self.expire_at {
            None => -1,
            Some(at) if now_millis >= at => -2,
            Some(at) => ((at - now_millis + 999) / 1000) as i64,
        }
    }

    /// Milliseconds, or -1 for persistent, -2 for expired/absent.
    pub fn ttl_millis(&self, now_millis: u64) -> i64 {
        match self.expire_at {
            None => -1,
            Some(at) if now_millis >= at => -2,
            Some(at) => (at - now_millis) as i64,
        }
    }

    pub fn touch(&mut self, now_millis: u64, lfu_log_factor: u32) {
        self.eviction.touch(now_millis, lfu_log_factor);
    }

    pub fn idle_seconds(&self, now_millis: u64) -> Option<u64> {
        self.eviction
            .last_access_millis()
            .map(|last| now_millis.saturating_sub(last) / 1000)
    }
}
