//! Maps command names (+ optional subcommand) to their handler, key
//! extraction rule, and metadata. Registration is process-local and
//! thread-safe, replacing a flat `match` dispatch with data the dispatcher
//! looks up at call time.

use crate::dispatcher::{CommandContext, EngineHandles};
use crate::error::EngineResult;
use crate::reply::Reply;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// The read/write key sets and channel names a command touches, derived
/// from its argv by the command's `key_extractor`.
#[derive(Debug, Clone, Default)]
pub struct KeySpec {
    pub read_keys: Vec<Bytes>,
    pub write_keys: Vec<Bytes>,
    pub channels: Vec<Bytes>,
}

impl KeySpec {
    pub fn read(keys: impl IntoIterator<Item = Bytes>) -> Self {
        KeySpec {
            read_keys: keys.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn write(keys: impl IntoIterator<Item = Bytes>) -> Self {
        KeySpec {
            write_keys: keys.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn none() -> Self {
        KeySpec::default()
    }
}

pub type KeyExtractorFn = fn(&[Bytes]) -> KeySpec;
pub type HandlerFn = fn(&mut CommandContext, &[Bytes], &EngineHandles) -> EngineResult<Reply>;

pub struct CommandSpec {
    pub name: &'static str,
    pub subcommand: Option<&'static str>,
    pub description: &'static str,
    pub categories: &'static [&'static str],
    /// Whether this command's effect must be appended to the (out-of-scope)
    /// persistence log and announced as a keyspace event.
    pub sync: bool,
    pub key_extractor: KeyExtractorFn,
    pub handler: HandlerFn,
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("subcommand", &self.subcommand)
            .field("sync", &self.sync)
            .finish()
    }
}

fn registry_key(name: &str, subcommand: Option<&str>) -> (String, Option<String>) {
    (
        name.to_ascii_uppercase(),
        subcommand.map(|s| s.to_ascii_uppercase()),
    )
}

#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: RwLock<HashMap<(String, Option<String>), Arc<CommandSpec>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        CommandRegistry {
            commands: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, spec: CommandSpec) {
        let key = registry_key(spec.name, spec.subcommand);
        self.commands.write().insert(key, Arc::new(spec));
    }

    pub fn remove_command(&self, name: &str, subcommand: Option<&str>) -> bool {
        self.commands
            .write()
            .remove(&registry_key(name, subcommand))
            .is_some()
    }

    pub fn lookup(&self, name: &str, subcommand: Option<&str>) -> Option<Arc<CommandSpec>> {
        self.commands
            .read()
            .get(&registry_key(name, subcommand))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.commands.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.read().is_empty()
    }
}
