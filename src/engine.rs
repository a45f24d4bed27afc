//! Top-level entry point tying the keyspace, dispatcher, pub/sub hub, and
//! background maintenance tasks together behind a single `dispatch` call.

use crate::clock::{SharedClock, SystemClock};
use crate::commands::register_builtins;
use crate::config::EngineConfig;
use crate::dispatcher::Dispatcher;
use crate::eviction::EvictionPolicy;
use crate::pubsub::PubSubHub;
use crate::registry::CommandRegistry;
use crate::reply::Reply;
use crate::store::ValueStore;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Everything the core engine owns: the keyspace, command registry, pub/sub
/// hub, clock, and the one out-of-scope seam (`persistence_hook`) a
/// collaborator plugs into.
pub struct Engine {
    store: ValueStore,
    dispatcher: Dispatcher,
    clock: SharedClock,
    pubsub: PubSubHub,
    config: EngineConfig,
    persistence_hook: Box<dyn Fn(usize, &[Bytes]) + Send + Sync>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Arc<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: EngineConfig, clock: SharedClock) -> Arc<Self> {
        Self::build(config, clock, Box::new(|_, _| {}))
    }

    /// Swap in a custom persistence hook, invoked with `(db_index, argv)`
    /// after every successful sync-flagged write. Defaults to a no-op.
    pub fn with_persistence_hook(config: EngineConfig, clock: SharedClock, hook: Box<dyn Fn(usize, &[Bytes]) + Send + Sync>) -> Arc<Self> {
        Self::build(config, clock, hook)
    }

    fn build(config: EngineConfig, clock: SharedClock, hook: Box<dyn Fn(usize, &[Bytes]) + Send + Sync>) -> Arc<Self> {
        let registry = Arc::new(CommandRegistry::new());
        register_builtins(&registry);
        let store = ValueStore::new(config.databases, config.eviction_policy, config.lfu_log_factor, config.max_memory);

        let engine = Arc::new(Engine {
            store,
            dispatcher: Dispatcher::new(registry),
            clock,
            pubsub: PubSubHub::new(),
            config,
            persistence_hook: hook,
        });

        engine.clone().spawn_background_tasks();
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pubsub(&self) -> &PubSubHub {
        &self.pubsub
    }

    pub fn store(&self) -> &ValueStore {
        &self.store
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Run one command against database `db_index`.
    pub fn dispatch(&self, db_index: usize, argv: &[Bytes]) -> Reply {
        self.dispatcher.dispatch(db_index, argv, &self.store, &self.clock, &self.pubsub, &self.config, self.persistence_hook.as_ref())
    }

    /// Spawn the active-expiry sweeper. Runs for the engine's lifetime;
    /// dropped along with the last `Arc<Engine>`.
    fn spawn_background_tasks(self: Arc<Self>) {
        if self.config.eviction_interval == Duration::ZERO {
            return;
        }
        let period = self.config.eviction_interval;
        let engine = Arc::downgrade(&self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                let now = engine.clock.now_millis();
                let decay_period = engine.config.lfu_decay_time.as_millis() as u64;
                let mut swept = 0;
                for db in &engine.store.databases {
                    swept += db.active_expire(now, engine.config.active_expire_sample_size);
                    db.decay_lfu_counters(now, decay_period);
                }
                if swept > 0 {
                    debug!(count = swept, "active-expiry sweep removed keys");
                }
                if engine.config.eviction_policy != EvictionPolicy::None && engine.store.memory.over_budget() {
                    engine.run_eviction_pass();
                }
            }
        });
    }

    fn run_eviction_pass(&self) {
        let mut attempts = 0;
        for db in &self.store.databases {
            while self.store.memory.over_budget() && attempts < 256 {
                attempts += 1;
                let Some(key) = db.sample_eviction_candidate() else {
                    break;
                };
                if let Some(entry) = db.delete(&key) {
                    self.store.memory.record_remove(key.len() + entry.value.approx_size() + 48);
                }
            }
        }
    }
}
