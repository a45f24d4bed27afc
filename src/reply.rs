use bytes::Bytes;

/// A neutral, wire-agnostic command result. The (out-of-scope) network
/// frontend is responsible for encoding this to RESP or any other wire
/// format; the engine itself never serializes.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Double(f64),
    Bulk(Option<Bytes>),
    Array(Option<Vec<Reply>>),
}

impl Reply {
    pub fn ok() -> Reply {
        Reply::Simple("OK".to_string())
    }

    pub fn nil() -> Reply {
        Reply::Bulk(None)
    }

    pub fn from_bytes(data: Vec<u8>) -> Reply {
        Reply::Bulk(Some(Bytes::from(data)))
    }

    pub fn from_i64(n: i64) -> Reply {
        Reply::Integer(n)
    }

    pub fn array_of_bulk(items: Vec<Option<Vec<u8>>>) -> Reply {
        Reply::Array(Some(
            items
                .into_iter()
                .map(|item| Reply::Bulk(item.map(Bytes::from)))
                .collect(),
        ))
    }
}

impl From<crate::error::EngineError> for Reply {
    fn from(err: crate::error::EngineError) -> Reply {
        Reply::Error(err.to_string())
    }
}
