//! `PUBLISH` and the `PUBSUB` introspection subcommands. `SUBSCRIBE` and its
//! siblings are connection-state operations tied to a long-lived subscriber
//! handle and are not one-shot dispatched commands; a connection layer calls
//! `PubSubHub::new_subscriber`/`subscribe`/`psubscribe` directly instead.

use crate::commands::{require_arity, upper};
use crate::dispatcher::{CommandContext, EngineHandles};
use crate::error::{EngineError, EngineResult};
use crate::registry::{CommandRegistry, CommandSpec, KeySpec};
use crate::reply::Reply;
use bytes::Bytes;

pub fn register(registry: &CommandRegistry) {
    registry.register(CommandSpec {
        name: "PUBLISH",
        subcommand: None,
        description: "Publish a message to a channel",
        categories: &["pubsub"],
        sync: false,
        key_extractor: |_argv| KeySpec::none(),
        handler: publish,
    });
    registry.register(CommandSpec {
        name: "PUBSUB",
        subcommand: None,
        description: "Introspect the pub/sub hub's channels and patterns",
        categories: &["pubsub"],
        sync: false,
        key_extractor: |_argv| KeySpec::none(),
        handler: pubsub,
    });
}

fn publish(_ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 3, "publish")?;
    let delivered = handles.pubsub.publish(&argv[1], &argv[2]);
    Ok(Reply::Integer(delivered as i64))
}

fn pubsub(_ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "pubsub")?;
    match upper(&argv[1]).as_str() {
        "CHANNELS" => {
            let pattern = argv.get(2).map(|p| String::from_utf8_lossy(p).to_string());
            let channels = handles.pubsub.channels_matching(pattern.as_deref());
            Ok(Reply::array_of_bulk(channels.into_iter().map(|c| Some(c.to_vec())).collect()))
        }
        "NUMSUB" => {
            let counts = handles.pubsub.numsub(&argv[2..]);
            let mut items = Vec::new();
            for (channel, count) in counts {
                items.push(Reply::Bulk(Some(channel)));
                items.push(Reply::Integer(count as i64));
            }
            Ok(Reply::Array(Some(items)))
        }
        "NUMPAT" => Ok(Reply::Integer(handles.pubsub.numpat() as i64)),
        _ => Err(EngineError::SyntaxError),
    }
}
