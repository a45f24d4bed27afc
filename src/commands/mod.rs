//! Built-in command handlers, registered into a `CommandRegistry`.
//!
//! Each module owns one data-type family and exposes a
//! `register(registry: &CommandRegistry)` function. `register_builtins`
//! sweeps all of them, so wiring up a fresh registry is one call.

pub mod hashes;
pub mod keys;
pub mod lists;
pub mod pubsub;
pub mod sets;
pub mod sorted_sets;
pub mod strings;

use crate::error::{EngineError, EngineResult};
use crate::registry::CommandRegistry;
use bytes::Bytes;

pub fn register_builtins(registry: &CommandRegistry) {
    strings::register(registry);
    keys::register(registry);
    lists::register(registry);
    hashes::register(registry);
    sets::register(registry);
    sorted_sets::register(registry);
    pubsub::register(registry);
}

pub(crate) fn arg_str(arg: &Bytes) -> std::borrow::Cow<'_, str> {
    String::from_utf8_lossy(arg)
}

pub(crate) fn parse_i64(arg: &Bytes) -> EngineResult<i64> {
    arg_str(arg).trim().parse::<i64>().map_err(|_| EngineError::NotAnInteger)
}

pub(crate) fn parse_f64(arg: &Bytes) -> EngineResult<f64> {
    let v: f64 = arg_str(arg).trim().parse().map_err(|_| EngineError::NotAFloat)?;
    if v.is_nan() {
        return Err(EngineError::NotAFloat);
    }
    Ok(v)
}

pub(crate) fn require_arity(argv: &[Bytes], min: usize, name: &str) -> EngineResult<()> {
    if argv.len() < min {
        return Err(EngineError::WrongArity(name.to_string()));
    }
    Ok(())
}

pub(crate) fn upper(arg: &Bytes) -> String {
    arg_str(arg).to_ascii_uppercase()
}
