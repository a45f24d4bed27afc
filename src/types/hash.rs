use std::collections::HashMap;

/// A hash field's stored value plus an optional per-field expiry (millis
/// since epoch). Field TTLs are independent of the key's own TTL.
#[derive(Debug, Clone)]
struct FieldEntry {
    value: Vec<u8>,
    expire_at: Option<u64>,
}

impl FieldEntry {
    fn is_live(&self, now: u64) -> bool {
        self.expire_at.is_none_or(|at| at > now)
    }
}

/// Hash-kind value. Field TTLs (`HEXPIRE`/`HPEXPIRE`/...) are a field on
/// each entry rather than a separate side table, so expiring a field is a
/// single map mutation.
#[derive(Debug, Clone, Default)]
pub struct HashValue {
    data: HashMap<String, FieldEntry>,
}

impl HashValue {
    pub fn new() -> Self {
        HashValue {
            data: HashMap::new(),
        }
    }

    /// Drop fields whose TTL has passed. Call before any operation whose
    /// result (len, iteration, existence) must reflect live fields only.
    pub fn sweep_expired(&mut self, now: u64) {
        self.data.retain(|_, e| e.is_live(now));
    }

    pub fn len(&self, now: u64) -> usize {
        self.data.values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self, now: u64) -> bool {
        self.len(now) == 0
    }

    pub fn get(&self, field: &str, now: u64) -> Option<&Vec<u8>> {
        self.data
            .get(field)
            .filter(|e| e.is_live(now))
            .map(|e| &e.value)
    }

    /// Set a field, clearing any TTL it previously had. Returns true if the
    /// field is new (didn't exist, or existed but had expired).
    pub fn set(&mut self, field: String, value: Vec<u8>, now: u64) -> bool {
        let existed = self.data.get(&field).is_some_and(|e| e.is_live(now));
        self.data.insert(
            field,
            FieldEntry {
                value,
                expire_at: None,
            },
        );
        !existed
    }

    pub fn del(&mut self, field: &str) -> bool {
        self.data.remove(field).is_some()
    }

    pub fn exists(&self, field: &str, now: u64) -> bool {
        self.data.get(field).is_some_and(|e| e.is_live(now))
    }

    pub fn keys(&self, now: u64) -> Vec<&String> {
        self.data
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .map(|(k, _)| k)
            .collect()
    }

    pub fn values(&self, now: u64) -> Vec<&Vec<u8>> {
        self.data
            .values()
            .filter(|e| e.is_live(now))
            .map(|e| &e.value)
            .collect()
    }

    pub fn entries(&self, now: u64) -> Vec<(&String, &Vec<u8>)> {
        self.data
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .map(|(k, e)| (k, &e.value))
            .collect()
    }

    pub fn incr_by(&mut self, field: &str, delta: i64, now: u64) -> Result<i64, &'static str> {
        let current = match self.data.get(field).filter(|e| e.is_live(now)) {
            Some(e) => {
                let s = std::str::from_utf8(&e.value).map_err(|_| "hash value is not an integer")?;
                s.parse::<i64>()
                    .map_err(|_| "hash value is not an integer")?
            }
            None => 0,
        };
        let new_val = current
            .checked_add(delta)
            .ok_or("increment or decrement would overflow")?;
        self.data.insert(
            field.to_string(),
            FieldEntry {
                value: new_val.to_string().into_bytes(),
                expire_at: None,
            },
        );
        Ok(new_val)
    }

    pub fn incr_by_float(&mut self, field: &str, delta: f64, now: u64) -> Result<f64, &'static str> {
        let current = match self.data.get(field).filter(|e| e.is_live(now)) {
            Some(e) => {
                let s = std::str::from_utf8(&e.value).map_err(|_| "hash value is not a valid float")?;
                s.parse::<f64>()
                    .map_err(|_| "hash value is not a valid float")?
            }
            None => 0.0,
        };
        let new_val = current + delta;
        if new_val.is_nan() || new_val.is_infinite() {
            return Err("value is NaN or Infinity");
        }
        self.data.insert(
            field.to_string(),
            FieldEntry {
                value: format!("{new_val}").into_bytes(),
                expire_at: None,
            },
        );
        Ok(new_val)
    }

    pub fn setnx(&mut self, field: String, value: Vec<u8>, now: u64) -> bool {
        if self.exists(&field, now) {
            return false;
        }
        self.data.insert(
            field,
            FieldEntry {
                value,
                expire_at: None,
            },
        );
        true
    }

    pub fn iter(&self, now: u64) -> impl Iterator<Item = (&String, &Vec<u8>)> {
        self.data.iter().filter(move |(_, e)| e.is_live(now)).map(|(k, e)| (k, &e.value))
    }

    /// Check if any live field name or value exceeds the given byte length.
    pub fn has_long_entry(&self, max_bytes: usize, now: u64) -> bool {
        self.data
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .any(|(k, e)| k.len() > max_bytes || e.value.len() > max_bytes)
    }

    /// Set a field's expiry time (millis since epoch). No-op, returns false,
    /// if the field doesn't exist or has already expired.
    pub fn set_field_expiry(&mut self, field: &str, expire_at: u64, now: u64) -> bool {
        match self.data.get_mut(field) {
            Some(e) if e.is_live(now) => {
                e.expire_at = Some(expire_at);
                true
            }
            _ => false,
        }
    }

    /// Remove a field's TTL, making it persistent. Returns false if the
    /// field doesn't exist, has expired, or had no TTL set.
    pub fn persist_field(&mut self, field: &str, now: u64) -> bool {
        match self.data.get_mut(field) {
            Some(e) if e.is_live(now) && e.expire_at.is_some() => {
                e.expire_at = None;
                true
            }
            _ => false,
        }
    }

    /// `None` for "field doesn't exist", `Some(None)` for "exists, no TTL",
    /// `Some(Some(ms))` for "exists, expires at ms".
    pub fn field_expiry(&self, field: &str, now: u64) -> Option<Option<u64>> {
        self.data
            .get(field)
            .filter(|e| e.is_live(now))
            .map(|e| e.expire_at)
    }

    /// Byte footprint of every stored field, live or not — used for memory
    /// accounting where an exact "now" isn't available.
    pub fn raw_byte_size(&self) -> usize {
        self.data
            .iter()
            .map(|(k, e)| k.len() + e.value.len() + 16)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_reports_new_field() {
        let mut h = HashValue::new();
        assert!(h.set("f".into(), b"1".to_vec(), 0));
        assert!(!h.set("f".into(), b"2".to_vec(), 0));
    }

    #[test]
    fn field_expiry_hides_field_after_now_passes() {
        let mut h = HashValue::new();
        h.set("f".into(), b"1".to_vec(), 0);
        h.set_field_expiry("f", 100, 0);
        assert_eq!(h.get("f", 50), Some(&b"1".to_vec()));
        assert_eq!(h.get("f", 150), None);
        assert_eq!(h.len(150), 0);
    }

    #[test]
    fn set_clears_existing_field_ttl() {
        let mut h = HashValue::new();
        h.set("f".into(), b"1".to_vec(), 0);
        h.set_field_expiry("f", 100, 0);
        h.set("f".into(), b"2".to_vec(), 50);
        assert_eq!(h.field_expiry("f", 50), Some(None));
    }

    #[test]
    fn incr_by_overflow_is_rejected() {
        let mut h = HashValue::new();
        h.set("f".into(), i64::MAX.to_string().into_bytes(), 0);
        assert!(h.incr_by("f", 1, 0).is_err());
    }
}
