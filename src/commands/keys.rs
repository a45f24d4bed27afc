use crate::commands::{parse_i64, require_arity, upper};
use crate::dispatcher::{CommandContext, EngineHandles};
use crate::error::{EngineError, EngineResult};
use crate::registry::{CommandRegistry, CommandSpec, KeySpec};
use crate::reply::Reply;
use bytes::Bytes;

pub fn register(registry: &CommandRegistry) {
    registry.register(CommandSpec {
        name: "DEL",
        subcommand: None,
        description: "Delete one or more keys",
        categories: &["generic", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv[1..].iter().cloned()),
        handler: del,
    });
    registry.register(CommandSpec {
        name: "EXISTS",
        subcommand: None,
        description: "Count how many of the given keys exist",
        categories: &["generic", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv[1..].iter().cloned()),
        handler: exists,
    });
    for name in ["EXPIRE", "PEXPIRE", "EXPIREAT", "PEXPIREAT"] {
        registry.register(CommandSpec {
            name,
            subcommand: None,
            description: "Set a key's time to live, subject to NX/XX/GT/LT modifiers",
            categories: &["generic", "write"],
            sync: true,
            key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
            handler: expire,
        });
    }
    registry.register(CommandSpec {
        name: "TTL",
        subcommand: None,
        description: "Remaining time to live in seconds",
        categories: &["generic", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: ttl,
    });
    registry.register(CommandSpec {
        name: "PTTL",
        subcommand: None,
        description: "Remaining time to live in milliseconds",
        categories: &["generic", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: pttl,
    });
    registry.register(CommandSpec {
        name: "EXPIRETIME",
        subcommand: None,
        description: "Absolute expiry time in seconds",
        categories: &["generic", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: expiretime,
    });
    registry.register(CommandSpec {
        name: "PEXPIRETIME",
        subcommand: None,
        description: "Absolute expiry time in milliseconds",
        categories: &["generic", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: pexpiretime,
    });
    registry.register(CommandSpec {
        name: "PERSIST",
        subcommand: None,
        description: "Remove a key's time to live",
        categories: &["generic", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: persist,
    });
    registry.register(CommandSpec {
        name: "TYPE",
        subcommand: None,
        description: "Return the kind of value stored at a key",
        categories: &["generic", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: type_of,
    });
    registry.register(CommandSpec {
        name: "RENAME",
        subcommand: None,
        description: "Rename a key, overwriting the destination",
        categories: &["generic", "write"],
        sync: true,
        key_extractor: |argv| {
            let mut spec = KeySpec::write(argv.get(1).cloned());
            spec.write_keys.extend(argv.get(2).cloned());
            spec
        },
        handler: rename,
    });
    registry.register(CommandSpec {
        name: "MOVE",
        subcommand: None,
        description: "Move a key to another database",
        categories: &["generic", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: move_key,
    });
    registry.register(CommandSpec {
        name: "RANDOMKEY",
        subcommand: None,
        description: "Return a random key from the current database",
        categories: &["generic", "read"],
        sync: false,
        key_extractor: |_| KeySpec::none(),
        handler: randomkey,
    });
    registry.register(CommandSpec {
        name: "TOUCH",
        subcommand: None,
        description: "Touch access metadata for existing keys",
        categories: &["generic", "write"],
        sync: false,
        key_extractor: |argv| KeySpec::write(argv[1..].iter().cloned()),
        handler: touch,
    });
}

fn del(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "del")?;
    let mut count = 0i64;
    for key in &argv[1..] {
        if let Some(entry) = ctx.guards.remove(key) {
            handles.store.memory.record_remove(key.len() + entry.value.approx_size() + 48);
            count += 1;
        }
    }
    Ok(Reply::Integer(count))
}

fn exists(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "exists")?;
    let count = argv[1..].iter().filter(|k| ctx.guards.contains_key(k)).count();
    Ok(Reply::Integer(count as i64))
}

#[derive(Clone, Copy, PartialEq)]
enum Modifier {
    None,
    Nx,
    Xx,
    Gt,
    Lt,
}

fn expire(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 3, "expire")?;
    let name = upper(&argv[0]);
    let key = argv[1].clone();
    let amount = parse_i64(&argv[2])?;

    let mut modifier = Modifier::None;
    for opt in &argv[3..] {
        modifier = match upper(opt).as_str() {
            "NX" => Modifier::Nx,
            "XX" => Modifier::Xx,
            "GT" => Modifier::Gt,
            "LT" => Modifier::Lt,
            _ => return Err(EngineError::SyntaxError),
        };
    }

    let Some(entry) = ctx.guards.get(&key) else {
        return Ok(Reply::Integer(0));
    };
    let current = entry.expire_at;

    let is_relative = matches!(name.as_str(), "EXPIRE" | "PEXPIRE");
    let new_at = match name.as_str() {
        "EXPIRE" => ctx.now_millis + (amount as u64).saturating_mul(1000),
        "PEXPIRE" => ctx.now_millis + amount as u64,
        "EXPIREAT" => (amount as u64).saturating_mul(1000),
        "PEXPIREAT" => amount as u64,
        _ => unreachable!(),
    };

    let allowed = match modifier {
        Modifier::None => true,
        Modifier::Nx => current.is_none(),
        Modifier::Xx => current.is_some(),
        Modifier::Gt => match current {
            Some(at) => new_at > at,
            None => false,
        },
        Modifier::Lt => match current {
            // A persistent key has no finite TTL to compare against; both the
            // relative and absolute forms treat "no TTL" as +infinity so LT
            // always succeeds, keeping the two forms symmetric.
            Some(at) => new_at < at,
            None => true,
        },
    };
    let _ = is_relative;

    if !allowed {
        return Ok(Reply::Integer(0));
    }

    ctx.guards.set_expire_at(&key, Some(new_at));
    Ok(Reply::Integer(1))
}

fn ttl(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "ttl")?;
    match ctx.guards.get(&argv[1]) {
        Some(entry) => Ok(Reply::Integer(entry.ttl_seconds(ctx.now_millis))),
        None => Ok(Reply::Integer(-2)),
    }
}

fn pttl(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "pttl")?;
    match ctx.guards.get(&argv[1]) {
        Some(entry) => Ok(Reply::Integer(entry.ttl_millis(ctx.now_millis))),
        None => Ok(Reply::Integer(-2)),
    }
}

fn expiretime(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "expiretime")?;
    match ctx.guards.get(&argv[1]) {
        Some(entry) => Ok(Reply::Integer(match entry.expire_at {
            Some(at) => (at / 1000) as i64,
            None => -1,
        })),
        None => Ok(Reply::Integer(-2)),
    }
}

fn pexpiretime(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "pexpiretime")?;
    match ctx.guards.get(&argv[1]) {
        Some(entry) => Ok(Reply::Integer(match entry.expire_at {
            Some(at) => at as i64,
            None => -1,
        })),
        None => Ok(Reply::Integer(-2)),
    }
}

fn persist(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "persist")?;
    let key = argv[1].clone();
    let had_ttl = ctx.guards.get(&key).is_some_and(|e| e.expire_at.is_some());
    if !had_ttl {
        return Ok(Reply::Integer(0));
    }
    ctx.guards.set_expire_at(&key, None);
    Ok(Reply::Integer(1))
}

fn type_of(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "type")?;
    match ctx.guards.get(&argv[1]) {
        Some(entry) => Ok(Reply::Simple(entry.value.type_name().to_string())),
        None => Ok(Reply::Simple("none".to_string())),
    }
}

fn rename(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 3, "rename")?;
    let src = argv[1].clone();
    let dst = argv[2].clone();
    let Some(entry) = ctx.guards.remove(&src) else {
        return Err(EngineError::NoSuchKey);
    };
    let old_dst_size = ctx.guards.get(&dst).map(|e| dst.len() + e.value.approx_size() + 48);
    let src_size = src.len() + entry.value.approx_size() + 48;
    let new_size = dst.len() + entry.value.approx_size() + 48;
    ctx.guards.insert(dst, entry);

    handles.store.memory.record_remove(src_size);
    match old_dst_size {
        Some(old) => handles.store.memory.record_delta(old, new_size),
        None => handles.store.memory.record_insert(new_size),
    }
    Ok(Reply::ok())
}

fn move_key(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 3, "move")?;
    let key = argv[1].clone();
    let target = parse_i64(&argv[2])?;
    if target < 0 || target as usize >= handles.store.databases.len() {
        return Err(EngineError::SyntaxError);
    }
    let target = target as usize;
    if target == ctx.db_index {
        return Err(EngineError::SyntaxError);
    }

    // Hold the destination shard's write lock across the existence check
    // and the insert so a concurrent MOVE/SET into the same destination key
    // can't race between the check and the transfer.
    let target_db = handles.store.db(target);
    let target_idx = target_db.shard_index(&key);
    let mut target_guard = target_db.shard(target_idx).map.write();
    if target_guard
        .get(key.as_ref())
        .is_some_and(|e| !e.is_expired(ctx.now_millis))
    {
        return Ok(Reply::Integer(0));
    }
    let Some(entry) = ctx.guards.get(&key) else {
        return Ok(Reply::Integer(0));
    };
    let entry = ctx.guards.remove(&key).expect("checked present above");
    // Memory is accounted across the whole store, not per database, so a
    // transfer between databases is a net-zero change.
    if let Some(at) = entry.expire_at {
        target_db.expiry.lock().insert(key.clone(), at);
    }
    target_guard.insert(key, entry);
    Ok(Reply::Integer(1))
}

fn randomkey(ctx: &mut CommandContext, _argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    match handles.store.db(ctx.db_index).random_key(ctx.now_millis) {
        Some(key) => Ok(Reply::Bulk(Some(key))),
        None => Ok(Reply::nil()),
    }
}

/// The dispatcher already touches every declared write key on success; this
/// handler's job is just to report how many of them actually existed.
fn touch(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "touch")?;
    let count = argv[1..].iter().filter(|k| ctx.guards.contains_key(k)).count();
    Ok(Reply::Integer(count as i64))
}
