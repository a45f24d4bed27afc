pub mod entry;

use crate::eviction::EvictionPolicy;
use crate::expiry::ExpiryIndex;
use crate::glob::glob_match;
use crate::memory::MemoryAccountant;
use bytes::Bytes;
use entry::KeyEntry;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Keys are distributed across a fixed number of shards so unrelated keys
/// never contend on the same lock.
pub const NUM_SHARDS: usize = 16;

#[derive(Debug, Default)]
pub struct Shard {
    pub map: RwLock<HashMap<Bytes, KeyEntry>>,
}

/// One of the process's logical databases: a sharded keyspace plus its own
/// expiry index. Eviction policy and memory accounting are shared across
/// every database (see `Engine`), since `max_memory` budgets the whole
/// process.
#[derive(Debug)]
pub struct Database {
    shards: Vec<Shard>,
    pub expiry: Mutex<ExpiryIndex>,
    policy: EvictionPolicy,
    lfu_log_factor: u32,
}

impl Database {
    pub fn new(policy: EvictionPolicy, lfu_log_factor: u32) -> Self {
        let mut shards = Vec::with_capacity(NUM_SHARDS);
        shards.resize_with(NUM_SHARDS, Shard::default);
        Database {
            shards,
            expiry: Mutex::new(ExpiryIndex::new()),
            policy,
            lfu_log_factor,
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    /// Raw shard access, used by the dispatcher to acquire the exact lock
    /// set a command's key extraction demands. Command handlers should not
    /// call this directly; they receive guards already held by the caller.
    pub fn shard(&self, index: usize) -> &Shard {
        &self.shards[index]
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn lfu_log_factor(&self) -> u32 {
        self.lfu_log_factor
    }

    // ---- Self-locking convenience API -----------------------------------
    // Used outside the dispatch path: the active-expiry sweeper, eviction
    // sampling, KEYS/SCAN/RANDOMKEY, and FLUSHDB. Each call takes exactly
    // one shard lock for its own duration, so it composes safely with the
    // dispatcher's shard locking as long as it never runs nested inside a
    // handler invocation that already holds that shard.

    pub fn get_cloned(&self, key: &[u8], now_millis: u64) -> Option<KeyEntry> {
        let idx = self.shard_index(key);
        let mut guard = self.shards[idx].map.write();
        if guard.get(key).is_some_and(|e| e.is_expired(now_millis)) {
            guard.remove(key);
            self.expiry.lock().remove(&Bytes::copy_from_slice(key));
            return None;
        }
        guard.get(key).cloned()
    }

    pub fn exists(&self, key: &[u8], now_millis: u64) -> bool {
        self.get_cloned(key, now_millis).is_some()
    }

    pub fn delete(&self, key: &[u8]) -> Option<KeyEntry> {
        let idx = self.shard_index(key);
        let removed = self.shards[idx].map.write().remove(key);
        if removed.is_some() {
            self.expiry.lock().remove(&Bytes::copy_from_slice(key));
        }
        removed
    }

    pub fn type_of(&self, key: &[u8], now_millis: u64) -> Option<&'static str> {
        self.get_cloned(key, now_millis).map(|e| e.value.type_name())
    }

    /// Insert a fully-formed entry under its own shard lock. Used by `MOVE`
    /// to transfer a value into another database's keyspace.
    pub fn insert_entry(&self, key: Bytes, entry: KeyEntry) -> Option<KeyEntry> {
        if let Some(at) = entry.expire_at {
            self.expiry.lock().insert(key.clone(), at);
        }
        let idx = self.shard_index(&key);
        self.shards[idx].map.write().insert(key, entry)
    }

    pub fn keys_matching(&self, pattern: &str, now_millis: u64) -> Vec<Bytes> {
        let mut out = Vec::new();
        for shard in &self.shards {
            let guard = shard.map.read();
            out.extend(
                guard
                    .iter()
                    .filter(|(_, e)| !e.is_expired(now_millis))
                    .filter(|(k, _)| glob_match(pattern, &String::from_utf8_lossy(k)))
                    .map(|(k, _)| k.clone()),
            );
        }
        out
    }

    pub fn random_key(&self, now_millis: u64) -> Option<Bytes> {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let start = rng.gen_range(0..self.shards.len());
        for offset in 0..self.shards.len() {
            let idx = (start + offset) % self.shards.len();
            let guard = self.shards[idx].map.read();
            let candidate = guard
                .iter()
                .find(|(_, e)| !e.is_expired(now_millis))
                .map(|(k, _)| k.clone());
            if candidate.is_some() {
                return candidate;
            }
        }
        None
    }

    pub fn dbsize(&self) -> usize {
        self.shards.iter().map(|s| s.map.read().len()).sum()
    }

    pub fn flush(&self) {
        for shard in &self.shards {
            shard.map.write().clear();
        }
        *self.expiry.lock() = ExpiryIndex::new();
    }

    /// Bounded active-expiry sweep: pop up to `limit` expired keys from the
    /// index and remove them from the keyspace. Returns the count removed.
    pub fn active_expire(&self, now_millis: u64, limit: usize) -> usize {
        let expired = self.expiry.lock().pop_expired(now_millis, limit);
        let count = expired.len();
        for key in expired {
            let idx = self.shard_index(&key);
            self.shards[idx].map.write().remove(&key);
        }
        count
    }

    pub fn estimated_memory(&self) -> usize {
        self.shards
            .iter()
            .map(|s| {
                s.map
                    .read()
                    .iter()
                    .map(|(k, e)| k.len() + e.value.approx_size() + 48)
                    .sum::<usize>()
            })
            .sum()
    }

    /// Sample up to `SAMPLE_SIZE` shards and return the best eviction
    /// candidate for the configured policy, or `None` if nothing qualifies.
    pub fn sample_eviction_candidate(&self) -> Option<Bytes> {
        use crate::eviction::{PolicyFamily, SAMPLE_SIZE};
        use rand::Rng;

        if self.policy == EvictionPolicy::None {
            return None;
        }
        let volatile_only = self.policy.volatile_only();
        let mut rng = rand::thread_rng();
        let mut best: Option<(Bytes, u64, u8)> = None;

        for _ in 0..SAMPLE_SIZE {
            let idx = rng.gen_range(0..self.shards.len());
            let guard = self.shards[idx].map.read();
            for (key, entry) in guard.iter() {
                if volatile_only && entry.expire_at.is_none() {
                    continue;
                }
                match self.policy.family() {
                    PolicyFamily::Ttl => {
                        let at = entry.expire_at.unwrap_or(u64::MAX);
                        if best.as_ref().is_none_or(|(_, best_at, _)| at < *best_at) {
                            best = Some((key.clone(), at, 0));
                        }
                    }
                    PolicyFamily::Lru => {
                        let last = entry.eviction.last_access_millis().unwrap_or(0);
                        if best.as_ref().is_none_or(|(_, best_last, _)| last < *best_last) {
                            best = Some((key.clone(), last, 0));
                        }
                    }
                    PolicyFamily::Lfu => {
                        let counter = entry.eviction.lfu_counter().unwrap_or(0);
                        if best.as_ref().is_none_or(|(_, _, best_c)| counter < *best_c) {
                            best = Some((key.clone(), 0, counter));
                        }
                    }
                    PolicyFamily::Random | PolicyFamily::None => {
                        return Some(key.clone());
                    }
                }
            }
        }
        if best.is_some() {
            return best.map(|(k, _, _)| k);
        }

        // Candidate pool empty under the configured policy's restriction
        // (e.g. `VolatileLru` with no volatile keys in the sampled shards).
        // Fall back to a plain random pick so a write under memory pressure
        // still has a chance to free space.
        for _ in 0..SAMPLE_SIZE {
            let idx = rng.gen_range(0..self.shards.len());
            let guard = self.shards[idx].map.read();
            if let Some((key, _)) = guard.iter().next() {
                return Some(key.clone());
            }
        }
        None
    }

    /// Age every LFU counter by elapsed ticks since its last access. Run
    /// periodically by the active-expiry sweeper so an idle key's counter
    /// decays even though nothing ever reads or writes it.
    pub fn decay_lfu_counters(&self, now_millis: u64, decay_period_millis: u64) {
        use crate::eviction::PolicyFamily;
        if self.policy.family() != PolicyFamily::Lfu {
            return;
        }
        for shard in &self.shards {
            let mut guard = shard.map.write();
            for entry in guard.values_mut() {
                entry.eviction.decay(now_millis, decay_period_millis);
            }
        }
    }
}

pub type SharedDatabase = Arc<Database>;

/// The full engine keyspace: a fixed-size array of databases plus the
/// process-wide memory accountant (memory is budgeted across all
/// databases combined, per the `max_memory` contract).
#[derive(Debug)]
pub struct ValueStore {
    pub databases: Vec<Database>,
    pub memory: Arc<MemoryAccountant>,
}

impl ValueStore {
    pub fn new(num_databases: usize, policy: EvictionPolicy, lfu_log_factor: u32, max_memory: usize) -> Self {
        let mut databases = Vec::with_capacity(num_databases);
        for _ in 0..num_databases {
            databases.push(Database::new(policy, lfu_log_factor));
        }
        ValueStore {
            databases,
            memory: Arc::new(MemoryAccountant::new(max_memory)),
        }
    }

    pub fn db(&self, index: usize) -> &Database {
        &self.databases[index]
    }

    pub fn swap(&mut self, a: usize, b: usize) -> bool {
        if a >= self.databases.len() || b >= self.databases.len() {
            return false;
        }
        self.databases.swap(a, b);
        true
    }

    pub fn flush_all(&self) {
        for db in &self.databases {
            db.flush();
        }
    }

    pub fn estimated_memory(&self) -> usize {
        self.databases.iter().map(|db| db.estimated_memory()).sum()
    }
}

pub type ShardReadGuard<'a> = RwLockReadGuard<'a, HashMap<Bytes, KeyEntry>>;
pub type ShardWriteGuard<'a> = RwLockWriteGuard<'a, HashMap<Bytes, KeyEntry>>;
