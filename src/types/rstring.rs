/// A string-kind value — binary-safe bytes, with integer/float views parsed
/// on demand. There is no separate stored "integer" or "float" kind; a
/// client that writes `SET k 42` and later `INCR k` is always operating on
/// the same `Vec<u8>` representation, exactly as canonical decimal bytes.
#[derive(Debug, Clone, Default)]
pub struct StrValue {
    data: Vec<u8>,
}

impl StrValue {
    pub fn new(data: Vec<u8>) -> Self {
        StrValue { data }
    }

    pub fn from_i64(n: i64) -> Self {
        StrValue {
            data: n.to_string().into_bytes(),
        }
    }

    pub fn from_f64(n: f64) -> Self {
        StrValue {
            data: format_float(n).into_bytes(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Parse as a canonical signed decimal integer: no leading zeros (except
    /// a bare "0"), no leading `+`, no surrounding whitespace.
    pub fn as_i64(&self) -> Option<i64> {
        let s = std::str::from_utf8(&self.data).ok()?;
        if !is_canonical_integer(s) {
            return None;
        }
        s.parse::<i64>().ok()
    }

    /// Parse as a float; scientific notation is accepted (matches `f64::from_str`).
    pub fn as_f64(&self) -> Option<f64> {
        let s = std::str::from_utf8(&self.data).ok()?.trim();
        if s.is_empty() {
            return None;
        }
        s.parse::<f64>().ok().filter(|f| !f.is_nan())
    }

    pub fn set(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    /// Append data and return the new length.
    pub fn append(&mut self, data: &[u8]) -> usize {
        self.data.extend_from_slice(data);
        self.data.len()
    }

    /// Inclusive byte range (GETRANGE semantics): negative indices count
    /// from the end, bounds are clamped.
    pub fn getrange(&self, start: i64, end: i64) -> &[u8] {
        let len = self.data.len() as i64;
        if len == 0 {
            return &[];
        }
        if start < 0 && end < 0 && start > end {
            return &[];
        }

        let mut s = if start < 0 { len + start } else { start };
        let mut e = if end < 0 { len + end } else { end };
        if s < 0 {
            s = 0;
        }
        if e < 0 {
            e = 0;
        }
        if e >= len {
            e = len - 1;
        }
        if s > e {
            return &[];
        }
        &self.data[s as usize..=e as usize]
    }

    /// Maximum string size: 512 MiB, matching the teacher's limit.
    pub const MAX_SIZE: usize = 512 * 1024 * 1024;

    /// Overwrite a byte range starting at `offset`, zero-padding as needed.
    pub fn setrange(&mut self, offset: usize, data: &[u8]) -> Result<usize, &'static str> {
        let needed = offset + data.len();
        if needed > Self::MAX_SIZE {
            return Err("string exceeds maximum allowed size (512MB)");
        }
        if needed > self.data.len() {
            self.data.resize(needed, 0);
        }
        self.data[offset..offset + data.len()].copy_from_slice(data);
        Ok(self.data.len())
    }

    pub fn incr_by(&mut self, delta: i64) -> Result<i64, &'static str> {
        let current = if self.data.is_empty() {
            0
        } else {
            self.as_i64().ok_or("value is not an integer or out of range")?
        };
        let new_val = current
            .checked_add(delta)
            .ok_or("increment or decrement would overflow")?;
        self.data = new_val.to_string().into_bytes();
        Ok(new_val)
    }

    pub fn incr_by_float(&mut self, delta: f64) -> Result<f64, &'static str> {
        let current = if self.data.is_empty() {
            0.0
        } else {
            self.as_f64().ok_or("value is not a valid float")?
        };
        let new_val = current + delta;
        if new_val.is_nan() || new_val.is_infinite() {
            return Err("increment would produce NaN or Infinity");
        }
        self.data = format_float(new_val).into_bytes();
        Ok(new_val)
    }
}

fn is_canonical_integer(s: &str) -> bool {
    let body = s.strip_prefix('-').unwrap_or(s);
    if body.is_empty() || !body.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    body == "0" || !body.starts_with('0')
}

/// Format a float the way Redis does: the shortest representation that
/// round-trips, falling back to fixed precision if it doesn't.
fn format_float(n: f64) -> String {
    if n == 0.0 && n.is_sign_negative() {
        return "0".to_string();
    }
    let simple = format!("{n}");
    if simple.parse::<f64>().ok() == Some(n) {
        simple
    } else {
        format!("{n:.17}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_integer_parsing() {
        assert_eq!(StrValue::new(b"42".to_vec()).as_i64(), Some(42));
        assert_eq!(StrValue::new(b"-42".to_vec()).as_i64(), Some(-42));
        assert_eq!(StrValue::new(b"0".to_vec()).as_i64(), Some(0));
        assert_eq!(StrValue::new(b"007".to_vec()).as_i64(), None);
        assert_eq!(StrValue::new(b"+1".to_vec()).as_i64(), None);
        assert_eq!(StrValue::new(b" 1".to_vec()).as_i64(), None);
    }

    #[test]
    fn incr_overflow_is_rejected() {
        let mut s = StrValue::from_i64(i64::MAX);
        assert!(s.incr_by(1).is_err());
    }

    #[test]
    fn getrange_clamps_bounds() {
        let s = StrValue::new(b"Hello World".to_vec());
        assert_eq!(s.getrange(0, -1), b"Hello World");
        assert_eq!(s.getrange(-5, -1), b"World");
        assert_eq!(s.getrange(0, 1000), b"Hello World");
    }
}
