use crate::eviction::EvictionPolicy;
use std::time::Duration;

/// Immutable engine configuration, built once at construction. Dynamic
/// reconfiguration is out of scope; a new `Engine` is built to change these.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub databases: usize,
    pub eviction_policy: EvictionPolicy,
    pub eviction_interval: Duration,
    pub max_memory: usize,
    pub lfu_log_factor: u32,
    pub lfu_decay_time: Duration,
    pub active_expire_sample_size: usize,

    // Carried from the teacher's encoding/replication fields. The core
    // engine never reads these; they're kept as plain data so a future
    // wire frontend or persistence collaborator can consult the same
    // config object rather than a second one.
    pub snapshot_interval: Duration,
    pub data_dir: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            databases: 16,
            eviction_policy: EvictionPolicy::None,
            eviction_interval: Duration::from_millis(100),
            max_memory: 0,
            lfu_log_factor: 10,
            lfu_decay_time: Duration::from_secs(60),
            active_expire_sample_size: 20,
            snapshot_interval: Duration::from_secs(3600),
            data_dir: ".".to_string(),
        }
    }
}

/// Builder-style helper mirroring the teacher's key/value config parsing,
/// narrowed to the options the core engine actually recognizes.
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        EngineConfigBuilder {
            config: EngineConfig::default(),
        }
    }

    pub fn databases(mut self, n: usize) -> Self {
        self.config.databases = n.max(1);
        self
    }

    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.config.eviction_policy = policy;
        self
    }

    pub fn max_memory(mut self, bytes: usize) -> Self {
        self.config.max_memory = bytes;
        self
    }

    pub fn lfu_log_factor(mut self, factor: u32) -> Self {
        self.config.lfu_log_factor = factor;
        self
    }

    pub fn eviction_interval(mut self, interval: Duration) -> Self {
        self.config.eviction_interval = interval;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let cfg = EngineConfigBuilder::new()
            .databases(4)
            .max_memory(1024)
            .eviction_policy(EvictionPolicy::AllKeysLru)
            .build();
        assert_eq!(cfg.databases, 4);
        assert_eq!(cfg.max_memory, 1024);
        assert_eq!(cfg.eviction_policy, EvictionPolicy::AllKeysLru);
    }
}
