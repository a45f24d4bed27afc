/// Error kinds the engine surfaces to callers (dispatcher, scripting gate,
/// or a direct embedder).
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR no such key")]
    NoSuchKey,

    #[error("ERR index out of range")]
    IndexOutOfRange,

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("ERR value is not a valid float")]
    NotAFloat,

    #[error("ERR increment or decrement would overflow")]
    Overflow,

    #[error("ERR syntax error")]
    SyntaxError,

    #[error("OOM command not allowed when used memory > 'maxmemory'")]
    OutOfMemory,

    #[error("ERR command not allowed under the current eviction policy")]
    PolicyMismatch,

    #[error("ERR script touched key '{0}' outside its declared key set")]
    UndeclaredKey(String),

    #[error("ERR {0}")]
    Generic(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
