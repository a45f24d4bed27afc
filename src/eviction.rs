//! Eviction policy and per-key recency/frequency bookkeeping.
//!
//! Victim selection is sampled rather than exhaustive: a fixed number of
//! shards are probed and the best candidate among them is evicted. This
//! mirrors how a sharded keyspace avoids a full scan under memory pressure.

use std::fmt;
use std::str::FromStr;

/// How victims are chosen when `max_memory` is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    None,
    AllKeysLru,
    AllKeysLfu,
    AllKeysRandom,
    VolatileLru,
    VolatileLfu,
    VolatileRandom,
    VolatileTtl,
}

/// The access-pattern family a policy belongs to, independent of whether it
/// restricts itself to volatile keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyFamily {
    None,
    Lru,
    Lfu,
    Random,
    Ttl,
}

impl EvictionPolicy {
    pub fn family(&self) -> PolicyFamily {
        match self {
            EvictionPolicy::None => PolicyFamily::None,
            EvictionPolicy::AllKeysLru | EvictionPolicy::VolatileLru => PolicyFamily::Lru,
            EvictionPolicy::AllKeysLfu | EvictionPolicy::VolatileLfu => PolicyFamily::Lfu,
            EvictionPolicy::AllKeysRandom | EvictionPolicy::VolatileRandom => PolicyFamily::Random,
            EvictionPolicy::VolatileTtl => PolicyFamily::Ttl,
        }
    }

    /// Whether the candidate pool is restricted to keys carrying a TTL.
    pub fn volatile_only(&self) -> bool {
        matches!(
            self,
            EvictionPolicy::VolatileLru
                | EvictionPolicy::VolatileLfu
                | EvictionPolicy::VolatileRandom
                | EvictionPolicy::VolatileTtl
        )
    }
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "noeviction" => Ok(EvictionPolicy::None),
            "all_keys_lru" | "allkeys-lru" => Ok(EvictionPolicy::AllKeysLru),
            "all_keys_lfu" | "allkeys-lfu" => Ok(EvictionPolicy::AllKeysLfu),
            "all_keys_random" | "allkeys-random" => Ok(EvictionPolicy::AllKeysRandom),
            "volatile_lru" | "volatile-lru" => Ok(EvictionPolicy::VolatileLru),
            "volatile_lfu" | "volatile-lfu" => Ok(EvictionPolicy::VolatileLfu),
            "volatile_random" | "volatile-random" => Ok(EvictionPolicy::VolatileRandom),
            "volatile_ttl" | "volatile-ttl" => Ok(EvictionPolicy::VolatileTtl),
            other => Err(format!("unknown eviction policy '{other}'")),
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EvictionPolicy::None => "none",
            EvictionPolicy::AllKeysLru => "all_keys_lru",
            EvictionPolicy::AllKeysLfu => "all_keys_lfu",
            EvictionPolicy::AllKeysRandom => "all_keys_random",
            EvictionPolicy::VolatileLru => "volatile_lru",
            EvictionPolicy::VolatileLfu => "volatile_lfu",
            EvictionPolicy::VolatileRandom => "volatile_random",
            EvictionPolicy::VolatileTtl => "volatile_ttl",
        };
        f.write_str(s)
    }
}

/// Per-key eviction bookkeeping. `None` under a no-eviction or mismatched
/// policy keeps the entry free of any accounting overhead.
#[derive(Debug, Clone, Copy)]
pub enum EvictionMeta {
    None,
    Lru { last_access_millis: u64 },
    Lfu { counter: u8, last_access_millis: u64 },
}

/// Number of shards sampled per victim-selection attempt.
pub const SAMPLE_SIZE: usize = 5;

impl EvictionMeta {
    pub fn fresh(policy: EvictionPolicy, now_millis: u64) -> Self {
        match policy.family() {
            PolicyFamily::Lru => EvictionMeta::Lru {
                last_access_millis: now_millis,
            },
            PolicyFamily::Lfu => EvictionMeta::Lfu {
                counter: 5,
                last_access_millis: now_millis,
            },
            PolicyFamily::Random | PolicyFamily::Ttl | PolicyFamily::None => EvictionMeta::None,
        }
    }

    pub fn last_access_millis(&self) -> Option<u64> {
        match self {
            EvictionMeta::Lru { last_access_millis } => Some(*last_access_millis),
            EvictionMeta::Lfu {
                last_access_millis, ..
            } => Some(*last_access_millis),
            EvictionMeta::None => None,
        }
    }

    pub fn lfu_counter(&self) -> Option<u8> {
        match self {
            EvictionMeta::Lfu { counter, .. } => Some(*counter),
            _ => None,
        }
    }

    /// Record an access. For LFU, increments the counter probabilistically
    /// so frequently-hit keys saturate slower (`1/(counter*log_factor + 1)`).
    pub fn touch(&mut self, now_millis: u64, log_factor: u32) {
        match self {
            EvictionMeta::Lru { last_access_millis } => *last_access_millis = now_millis,
            EvictionMeta::Lfu {
                counter,
                last_access_millis,
            } => {
                *last_access_millis = now_millis;
                if *counter < u8::MAX {
                    let p = 1.0 / (*counter as f64 * log_factor.max(1) as f64 + 1.0);
                    if rand::random::<f64>() < p {
                        *counter += 1;
                    }
                }
            }
            EvictionMeta::None => {}
        }
    }

    /// Decay the LFU counter by one tick's worth, given how many decay
    /// periods have elapsed since the last access.
    pub fn decay(&mut self, now_millis: u64, decay_period_millis: u64) {
        if let EvictionMeta::Lfu {
            counter,
            last_access_millis,
        } = self
        {
            if decay_period_millis == 0 {
                return;
            }
            let elapsed = now_millis.saturating_sub(*last_access_millis);
            let ticks = (elapsed / decay_period_millis).min(u8::MAX as u64) as u8;
            *counter = counter.saturating_sub(ticks);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_round_trips_through_display_and_from_str() {
        for p in [
            EvictionPolicy::None,
            EvictionPolicy::AllKeysLru,
            EvictionPolicy::VolatileTtl,
        ] {
            let s = p.to_string();
            assert_eq!(EvictionPolicy::from_str(&s).unwrap(), p);
        }
    }

    #[test]
    fn volatile_only_is_correct_per_variant() {
        assert!(EvictionPolicy::VolatileLru.volatile_only());
        assert!(!EvictionPolicy::AllKeysLru.volatile_only());
    }

    #[test]
    fn lfu_decay_reduces_counter_over_elapsed_periods() {
        let mut meta = EvictionMeta::Lfu {
            counter: 10,
            last_access_millis: 0,
        };
        meta.decay(10_000, 1_000);
        assert_eq!(meta.lfu_counter(), Some(0));
    }
}
