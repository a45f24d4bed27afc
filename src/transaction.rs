//! The calling contract a script host (out of scope; see `Engine`'s
//! `persistence_hook`-style seam) uses to touch the keyspace: declare a key
//! set up front, then read/write only within it. Declaring, rather than
//! trusting the script, is what lets the gate take the same shard locks the
//! dispatcher would and catch a key the script forgot to declare.

use crate::error::{EngineError, EngineResult};
use crate::store::entry::KeyEntry;
use crate::store::{Database, ShardWriteGuard};
use crate::types::Value;
use bytes::Bytes;
use std::collections::BTreeMap;

/// Exclusive access to a declared key set within one database, held for the
/// duration of a single script invocation.
pub struct ScriptGate<'a> {
    db: &'a Database,
    declared: BTreeMap<usize, (ShardWriteGuard<'a>, Vec<Bytes>)>,
    now_millis: u64,
}

impl<'a> ScriptGate<'a> {
    /// Lock the shards covering `keys` and build a gate that rejects access
    /// to anything outside that declared set.
    pub fn open(db: &'a Database, keys: &[Bytes], now_millis: u64) -> Self {
        let mut by_shard: BTreeMap<usize, Vec<Bytes>> = BTreeMap::new();
        for key in keys {
            by_shard.entry(db.shard_index(key)).or_default().push(key.clone());
        }
        let mut declared = BTreeMap::new();
        for (idx, shard_keys) in by_shard {
            declared.insert(idx, (db.shard(idx).map.write(), shard_keys));
        }
        ScriptGate { db, declared, now_millis }
    }

    fn check_declared(&self, key: &[u8]) -> EngineResult<usize> {
        let idx = self.db.shard_index(key);
        let Some((_, keys)) = self.declared.get(&idx) else {
            return Err(EngineError::UndeclaredKey(String::from_utf8_lossy(key).to_string()));
        };
        if keys.iter().any(|k| k.as_ref() == key) {
            Ok(idx)
        } else {
            Err(EngineError::UndeclaredKey(String::from_utf8_lossy(key).to_string()))
        }
    }

    /// Whether each of `keys` currently exists (and isn't expired).
    pub fn keys_exist(&mut self, keys: &[Bytes]) -> EngineResult<Vec<bool>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let idx = self.check_declared(key)?;
            let (guard, _) = self.declared.get(&idx).expect("checked above");
            let exists = guard.get(key.as_ref()).is_some_and(|e| !e.is_expired(self.now_millis));
            out.push(exists);
        }
        Ok(out)
    }

    /// Fetch the raw value bytes (strings only) for each declared key,
    /// `None` for a missing or non-string key.
    pub fn get_values(&mut self, keys: &[Bytes]) -> EngineResult<Vec<Option<Vec<u8>>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let idx = self.check_declared(key)?;
            let (guard, _) = self.declared.get(&idx).expect("checked above");
            let value = guard
                .get(key.as_ref())
                .filter(|e| !e.is_expired(self.now_millis))
                .and_then(|e| e.value.as_str())
                .map(|s| s.as_bytes().to_vec());
            out.push(value);
        }
        Ok(out)
    }

    /// Overwrite each declared key with a fresh string value, clearing any
    /// existing TTL.
    pub fn set_values(&mut self, pairs: &[(Bytes, Vec<u8>)]) -> EngineResult<()> {
        for (key, value) in pairs {
            let idx = self.check_declared(key)?;
            let (guard, _) = self.declared.get_mut(&idx).expect("checked above");
            guard.insert(
                key.clone(),
                KeyEntry::new(Value::Str(crate::types::rstring::StrValue::new(value.clone())), self.db.eviction_policy(), self.now_millis),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eviction::EvictionPolicy;

    #[test]
    fn rejects_touching_an_undeclared_key() {
        let db = Database::new(EvictionPolicy::None, 10);
        let mut gate = ScriptGate::open(&db, &[Bytes::from_static(b"a")], 0);
        let err = gate.get_values(&[Bytes::from_static(b"b")]).unwrap_err();
        assert_eq!(err, EngineError::UndeclaredKey("b".to_string()));
    }

    #[test]
    fn set_then_get_round_trips_within_declared_set() {
        let db = Database::new(EvictionPolicy::None, 10);
        let key = Bytes::from_static(b"a");
        let mut gate = ScriptGate::open(&db, &[key.clone()], 0);
        gate.set_values(&[(key.clone(), b"hello".to_vec())]).unwrap();
        assert_eq!(gate.get_values(&[key]).unwrap(), vec![Some(b"hello".to_vec())]);
    }
}
