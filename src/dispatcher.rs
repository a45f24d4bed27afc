//! Parses an argv, extracts the read/write key sets, acquires the shard
//! locks those keys map to, and invokes the registered handler.

use crate::clock::SharedClock;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::eviction::EvictionPolicy;
use crate::pubsub::PubSubHub;
use crate::registry::{CommandRegistry, KeySpec};
use crate::reply::Reply;
use crate::store::entry::KeyEntry;
use crate::store::{Database, ShardReadGuard, ShardWriteGuard, ValueStore};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything a handler needs beyond its own locked keys: other databases
/// (for `MOVE`), the clock, the pub/sub hub, and the static config.
pub struct EngineHandles<'a> {
    pub store: &'a ValueStore,
    pub clock: &'a SharedClock,
    pub pubsub: &'a PubSubHub,
    pub config: &'a EngineConfig,
    pub persistence_hook: &'a (dyn Fn(usize, &[Bytes]) + Send + Sync),
}

/// Per-invocation context: which database, what time the dispatcher
/// resolved "now" to, and the shard locks already held for this command's
/// declared key set.
pub struct CommandContext<'a> {
    pub db_index: usize,
    pub now_millis: u64,
    pub guards: ShardGuards<'a>,
}

enum ShardSlot<'a> {
    Read(ShardReadGuard<'a>),
    Write(ShardWriteGuard<'a>),
}

/// The shard locks a dispatched command holds for the duration of its
/// handler. Stands in for the literal per-key locks of the original
/// contract (see DESIGN.md) — a key maps to exactly one shard, and the
/// shard is write-locked whenever any key hashing to it is in the write set.
pub struct ShardGuards<'a> {
    db: &'a Database,
    slots: BTreeMap<usize, ShardSlot<'a>>,
}

impl<'a> ShardGuards<'a> {
    pub fn get(&self, key: &[u8]) -> Option<&KeyEntry> {
        let idx = self.db.shard_index(key);
        match self.slots.get(&idx)? {
            ShardSlot::Read(g) => g.get(key),
            ShardSlot::Write(g) => g.get(key),
        }
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut KeyEntry> {
        let idx = self.db.shard_index(key);
        match self.slots.get_mut(&idx)? {
            ShardSlot::Write(g) => g.get_mut(key),
            ShardSlot::Read(_) => None,
        }
    }

    /// Insert under the write-locked shard, keeping `Database::expiry` in
    /// sync so the active sweeper sees every TTL set through a command.
    pub fn insert(&mut self, key: Bytes, entry: KeyEntry) -> Option<KeyEntry> {
        let idx = self.db.shard_index(&key);
        let expire_at = entry.expire_at;
        let Some(ShardSlot::Write(g)) = self.slots.get_mut(&idx) else {
            return None;
        };
        let key_for_expiry = key.clone();
        let previous = g.insert(key, entry);
        match expire_at {
            Some(at) => {
                self.db.expiry.lock().insert(key_for_expiry, at);
            }
            None => {
                self.db.expiry.lock().remove(&key_for_expiry);
            }
        }
        previous
    }

    /// Remove under the write-locked shard, dropping any expiry-index entry
    /// for the key along with it.
    pub fn remove(&mut self, key: &[u8]) -> Option<KeyEntry> {
        let idx = self.db.shard_index(key);
        let removed = match self.slots.get_mut(&idx) {
            Some(ShardSlot::Write(g)) => g.remove(key),
            _ => None,
        };
        if removed.is_some() {
            self.db.expiry.lock().remove(&Bytes::copy_from_slice(key));
        }
        removed
    }

    /// Set or clear a live entry's TTL in place, updating the expiry index
    /// to match. Used by `EXPIRE`/`PERSIST`/`GETEX` instead of mutating
    /// `expire_at` directly through `get_mut`.
    pub fn set_expire_at(&mut self, key: &Bytes, expire_at: Option<u64>) -> bool {
        let Some(entry) = self.get_mut(key) else {
            return false;
        };
        entry.expire_at = expire_at;
        match expire_at {
            Some(at) => {
                self.db.expiry.lock().insert(key.clone(), at);
            }
            None => {
                self.db.expiry.lock().remove(key);
            }
        }
        true
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }
}

pub struct Dispatcher {
    pub registry: Arc<CommandRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Dispatcher { registry }
    }

    /// Run one command against `store`'s database `db_index`.
    pub fn dispatch(
        &self,
        db_index: usize,
        argv: &[Bytes],
        store: &ValueStore,
        clock: &SharedClock,
        pubsub: &PubSubHub,
        config: &EngineConfig,
        persistence_hook: &(dyn Fn(usize, &[Bytes]) + Send + Sync),
    ) -> Reply {
        match self.try_dispatch(db_index, argv, store, clock, pubsub, config, persistence_hook) {
            Ok(reply) => reply,
            Err(err) => Reply::from(err),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn try_dispatch(
        &self,
        db_index: usize,
        argv: &[Bytes],
        store: &ValueStore,
        clock: &SharedClock,
        pubsub: &PubSubHub,
        config: &EngineConfig,
        persistence_hook: &(dyn Fn(usize, &[Bytes]) + Send + Sync),
    ) -> EngineResult<Reply> {
        let Some(name) = argv.first() else {
            return Err(EngineError::SyntaxError);
        };
        let name = String::from_utf8_lossy(name).to_ascii_uppercase();

        let spec = self
            .registry
            .lookup(&name, None)
            .ok_or_else(|| EngineError::UnknownCommand(name.clone()))?;

        let key_spec: KeySpec = (spec.key_extractor)(argv);
        let db = store.db(db_index);
        let now_millis = clock.now_millis();

        // Reject the write outright if memory is over budget and eviction
        // can't buy back enough room, rather than let the handler commit a
        // write that pushes usage further over `max_memory`.
        if !key_spec.write_keys.is_empty() && store.memory.over_budget() {
            if config.eviction_policy != EvictionPolicy::None {
                self.maybe_evict(store, db, config);
            }
            if store.memory.over_budget() {
                return Err(EngineError::OutOfMemory);
            }
        }

        let guards = self.lock_shards(db, &key_spec, now_millis);
        let mut ctx = CommandContext {
            db_index,
            now_millis,
            guards,
        };
        let handles = EngineHandles {
            store,
            clock,
            pubsub,
            config,
            persistence_hook,
        };

        let result = (spec.handler)(&mut ctx, argv, &handles);

        if result.is_ok() && !key_spec.write_keys.is_empty() {
            for key in &key_spec.write_keys {
                if let Some(entry) = ctx.guards.get_mut(key) {
                    entry.touch(now_millis, config.lfu_log_factor);
                }
            }
        }
        drop(ctx);

        // Reads also count as an access for LRU/LFU purposes; the shard was
        // only read-locked during the handler, so re-acquire it briefly here
        // to stamp recency (matches spec's "each read/write stamps
        // last_access", and is what protects a just-read key from eviction).
        if result.is_ok() && !key_spec.read_keys.is_empty() {
            for key in &key_spec.read_keys {
                let idx = db.shard_index(key);
                let mut guard = db.shard(idx).map.write();
                if let Some(entry) = guard.get_mut(key.as_ref()) {
                    entry.touch(now_millis, config.lfu_log_factor);
                }
            }
        }

        if let Ok(reply) = &result {
            if spec.sync && !key_spec.write_keys.is_empty() {
                (persistence_hook)(db_index, argv);
                for channel in &key_spec.write_keys {
                    pubsub.publish_keyspace_event(db_index, channel);
                }
            }
            debug!(command = %name, "dispatched");
            self.maybe_evict(store, db, config);
            let _ = reply;
        }

        result
    }

    fn lock_shards<'a>(
        &self,
        db: &'a Database,
        key_spec: &KeySpec,
        now_millis: u64,
    ) -> ShardGuards<'a> {
        let mut write_shards = std::collections::BTreeSet::new();
        let mut read_shards = std::collections::BTreeSet::new();
        for key in &key_spec.write_keys {
            write_shards.insert(db.shard_index(key));
        }
        for key in &key_spec.read_keys {
            let idx = db.shard_index(key);
            if !write_shards.contains(&idx) {
                read_shards.insert(idx);
            }
        }

        // Pre-pass: evict lazily-expired keys among the touched set so the
        // handler never observes a stale value. Done under a brief write
        // lock even for shards the command will only read afterward.
        for idx in write_shards.iter().chain(read_shards.iter()) {
            let mut guard = db.shard(*idx).map.write();
            let expired: Vec<Bytes> = guard
                .iter()
                .filter(|(_, e)| e.is_expired(now_millis))
                .map(|(k, _)| k.clone())
                .collect();
            for key in expired {
                guard.remove(&key);
                db.expiry.lock().remove(&key);
            }
        }

        let mut slots = BTreeMap::new();
        for idx in write_shards {
            slots.insert(idx, ShardSlot::Write(db.shard(idx).map.write()));
        }
        for idx in read_shards {
            slots.insert(idx, ShardSlot::Read(db.shard(idx).map.read()));
        }

        ShardGuards { db, slots }
    }

    fn maybe_evict(&self, store: &ValueStore, db: &Database, config: &EngineConfig) {
        if config.eviction_policy == EvictionPolicy::None {
            return;
        }
        let mut attempts = 0;
        while store.memory.over_budget() && attempts < 64 {
            attempts += 1;
            let Some(key) = db.sample_eviction_candidate() else {
                warn!("no eviction candidate found under memory pressure");
                break;
            };
            if let Some(entry) = db.delete(&key) {
                store.memory.record_remove(key.len() + entry.value.approx_size() + 48);
                debug!(key = %String::from_utf8_lossy(&key), "evicted key under memory pressure");
            }
        }
    }
}
