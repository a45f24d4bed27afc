pub mod hash;
pub mod list;
pub mod rstring;
pub mod set;
pub mod sorted_set;

/// The core value kind stored in the keyspace.
#[derive(Debug, Clone)]
pub enum Value {
    Str(rstring::StrValue),
    List(list::ListValue),
    Hash(hash::HashValue),
    Set(set::SetValue),
    SortedSet(sorted_set::SortedSetValue),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
            Value::SortedSet(_) => "zset",
        }
    }

    pub fn as_str(&self) -> Option<&rstring::StrValue> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str_mut(&mut self) -> Option<&mut rstring::StrValue> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&list::ListValue> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut list::ListValue> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<&hash::HashValue> {
        match self {
            Value::Hash(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_hash_mut(&mut self) -> Option<&mut hash::HashValue> {
        match self {
            Value::Hash(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&set::SetValue> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_set_mut(&mut self) -> Option<&mut set::SetValue> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sorted_set(&self) -> Option<&sorted_set::SortedSetValue> {
        match self {
            Value::SortedSet(z) => Some(z),
            _ => None,
        }
    }

    pub fn as_sorted_set_mut(&mut self) -> Option<&mut sorted_set::SortedSetValue> {
        match self {
            Value::SortedSet(z) => Some(z),
            _ => None,
        }
    }

    /// Rough in-memory footprint, used by the memory accountant. Not exact;
    /// good enough to drive `maxmemory` accounting and eviction decisions.
    pub fn approx_size(&self) -> usize {
        match self {
            Value::Str(s) => s.len(),
            Value::List(l) => l.iter().map(|v| v.len() + 8).sum::<usize>(),
            Value::Hash(h) => h.raw_byte_size(),
            Value::Set(s) => s.iter().map(|m| m.len() + 8).sum::<usize>(),
            Value::SortedSet(z) => z.iter().map(|(m, _)| m.len() + 16).sum::<usize>(),
        }
    }
}
