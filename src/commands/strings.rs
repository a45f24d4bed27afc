use crate::commands::{parse_f64, parse_i64, require_arity, upper};
use crate::dispatcher::{CommandContext, EngineHandles};
use crate::error::{EngineError, EngineResult};
use crate::registry::{CommandRegistry, CommandSpec, KeySpec};
use crate::reply::Reply;
use crate::store::entry::KeyEntry;
use crate::types::Value;
use crate::types::rstring::StrValue;
use bytes::Bytes;

pub fn register(registry: &CommandRegistry) {
    registry.register(CommandSpec {
        name: "SET",
        subcommand: None,
        description: "Set a string value, with optional expiry and conditionals",
        categories: &["string", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: set,
    });
    registry.register(CommandSpec {
        name: "GET",
        subcommand: None,
        description: "Get a string value",
        categories: &["string", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: get,
    });
    registry.register(CommandSpec {
        name: "MGET",
        subcommand: None,
        description: "Get multiple string values, preserving argument order",
        categories: &["string", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv[1..].iter().cloned()),
        handler: mget,
    });
    registry.register(CommandSpec {
        name: "MSET",
        subcommand: None,
        description: "Set multiple key/value pairs atomically",
        categories: &["string", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv[1..].iter().step_by(2).cloned()),
        handler: mset,
    });
    registry.register(CommandSpec {
        name: "GETDEL",
        subcommand: None,
        description: "Get a string value and delete the key",
        categories: &["string", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: getdel,
    });
    registry.register(CommandSpec {
        name: "GETEX",
        subcommand: None,
        description: "Get a string value and optionally modify its TTL",
        categories: &["string", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: getex,
    });
    registry.register(CommandSpec {
        name: "INCR",
        subcommand: None,
        description: "Increment an integer value by one",
        categories: &["string", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: incr,
    });
    registry.register(CommandSpec {
        name: "DECR",
        subcommand: None,
        description: "Decrement an integer value by one",
        categories: &["string", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: decr,
    });
    registry.register(CommandSpec {
        name: "INCRBY",
        subcommand: None,
        description: "Increment an integer value by a signed amount",
        categories: &["string", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: incrby,
    });
    registry.register(CommandSpec {
        name: "DECRBY",
        subcommand: None,
        description: "Decrement an integer value by a signed amount",
        categories: &["string", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: decrby,
    });
    registry.register(CommandSpec {
        name: "INCRBYFLOAT",
        subcommand: None,
        description: "Increment a float value by a signed amount",
        categories: &["string", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: incrbyfloat,
    });
}

/// Milliseconds-since-epoch expiry requested by `SET`/`GETEX` options.
enum ExpiryOpt {
    None,
    Keep,
    Persist,
    At(u64),
}

fn parse_expiry_opts(argv: &[Bytes], start: usize, now_millis: u64) -> EngineResult<(ExpiryOpt, bool, bool, bool)> {
    let mut expiry = ExpiryOpt::None;
    let mut nx = false;
    let mut xx = false;
    let mut get = false;
    let mut i = start;
    while i < argv.len() {
        match upper(&argv[i]).as_str() {
            "NX" => nx = true,
            "XX" => xx = true,
            "GET" => get = true,
            "KEEPTTL" => expiry = ExpiryOpt::Keep,
            "PERSIST" => expiry = ExpiryOpt::Persist,
            "EX" => {
                i += 1;
                let secs = parse_i64(argv.get(i).ok_or(EngineError::SyntaxError)?)?;
                if secs <= 0 {
                    return Err(EngineError::SyntaxError);
                }
                expiry = ExpiryOpt::At(now_millis + (secs as u64) * 1000);
            }
            "PX" => {
                i += 1;
                let ms = parse_i64(argv.get(i).ok_or(EngineError::SyntaxError)?)?;
                if ms <= 0 {
                    return Err(EngineError::SyntaxError);
                }
                expiry = ExpiryOpt::At(now_millis + ms as u64);
            }
            "EXAT" => {
                i += 1;
                let ts = parse_i64(argv.get(i).ok_or(EngineError::SyntaxError)?)?;
                expiry = ExpiryOpt::At((ts as u64).saturating_mul(1000));
            }
            "PXAT" => {
                i += 1;
                let ts = parse_i64(argv.get(i).ok_or(EngineError::SyntaxError)?)?;
                expiry = ExpiryOpt::At(ts as u64);
            }
            _ => return Err(EngineError::SyntaxError),
        }
        i += 1;
    }
    Ok((expiry, nx, xx, get))
}

fn entry_size(key: &Bytes, entry: &KeyEntry) -> usize {
    key.len() + entry.value.approx_size() + 48
}

fn set(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 3, "set")?;
    let key = argv[1].clone();
    let value = argv[2].to_vec();
    let (expiry, nx, xx, get) = parse_expiry_opts(argv, 3, ctx.now_millis)?;

    let existing = ctx.guards.get(&key);
    let old_value = existing.and_then(|e| e.value.as_str().map(|s| Bytes::copy_from_slice(s.as_bytes())));
    let old_size = existing.map(|e| entry_size(&key, e));
    let exists = existing.is_some();
    let existing_expire_at = existing.and_then(|e| e.expire_at);

    if (nx && exists) || (xx && !exists) {
        return Ok(match (get, old_value) {
            (true, Some(v)) => Reply::Bulk(Some(v)),
            _ => Reply::nil(),
        });
    }

    let policy = handles.store.db(ctx.db_index).eviction_policy();
    let expire_at = match expiry {
        ExpiryOpt::At(at) => Some(at),
        ExpiryOpt::Keep => existing_expire_at,
        ExpiryOpt::None | ExpiryOpt::Persist => None,
    };

    let new_entry = match expire_at {
        Some(at) => KeyEntry::with_expiry(Value::Str(StrValue::new(value)), at, policy, ctx.now_millis),
        None => KeyEntry::new(Value::Str(StrValue::new(value)), policy, ctx.now_millis),
    };
    let new_size = entry_size(&key, &new_entry);
    ctx.guards.insert(key, new_entry);

    match old_size {
        Some(old) => handles.store.memory.record_delta(old, new_size),
        None => handles.store.memory.record_insert(new_size),
    }

    match (get, old_value) {
        (true, Some(v)) => Ok(Reply::Bulk(Some(v))),
        (true, None) => Ok(Reply::nil()),
        (false, _) => Ok(Reply::ok()),
    }
}

fn get(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "get")?;
    match ctx.guards.get(&argv[1]) {
        Some(entry) => {
            let s = entry.value.as_str().ok_or(EngineError::WrongType)?;
            Ok(Reply::Bulk(Some(Bytes::copy_from_slice(s.as_bytes()))))
        }
        None => Ok(Reply::nil()),
    }
}

fn mget(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "mget")?;
    let items = argv[1..]
        .iter()
        .map(|key| match ctx.guards.get(key) {
            Some(entry) => entry.value.as_str().map(|s| s.as_bytes().to_vec()),
            None => Some(Vec::new()),
        })
        .collect();
    Ok(Reply::array_of_bulk(items))
}

fn mset(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    if argv.len() < 3 || argv.len() % 2 != 1 {
        return Err(EngineError::WrongArity("mset".to_string()));
    }
    let policy = handles.store.db(ctx.db_index).eviction_policy();
    for pair in argv[1..].chunks(2) {
        let key = pair[0].clone();
        let value = pair[1].to_vec();
        let old_size = ctx.guards.get(&key).map(|e| entry_size(&key, e));
        let entry = KeyEntry::new(Value::Str(StrValue::new(value)), policy, ctx.now_millis);
        let new_size = entry_size(&key, &entry);
        ctx.guards.insert(key, entry);
        match old_size {
            Some(old) => handles.store.memory.record_delta(old, new_size),
            None => handles.store.memory.record_insert(new_size),
        }
    }
    Ok(Reply::ok())
}

fn getdel(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "getdel")?;
    let key = argv[1].clone();
    let Some(entry) = ctx.guards.get(&key) else {
        return Ok(Reply::nil());
    };
    let s = entry.value.as_str().ok_or(EngineError::WrongType)?.as_bytes().to_vec();
    let size = entry_size(&key, entry);
    ctx.guards.remove(&key);
    handles.store.memory.record_remove(size);
    Ok(Reply::Bulk(Some(Bytes::from(s))))
}

fn getex(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "getex")?;
    let key = argv[1].clone();
    let (expiry, _, _, _) = parse_expiry_opts(argv, 2, ctx.now_millis)?;
    let Some(entry) = ctx.guards.get(&key) else {
        return Ok(Reply::nil());
    };
    let value = entry.value.as_str().ok_or(EngineError::WrongType)?.as_bytes().to_vec();

    match expiry {
        ExpiryOpt::At(at) => {
            ctx.guards.set_expire_at(&key, Some(at));
        }
        ExpiryOpt::Persist => {
            ctx.guards.set_expire_at(&key, None);
        }
        ExpiryOpt::None | ExpiryOpt::Keep => {}
    }
    Ok(Reply::Bulk(Some(Bytes::from(value))))
}

fn incr_shared(ctx: &mut CommandContext, handles: &EngineHandles, key: &Bytes, delta: i64) -> EngineResult<Reply> {
    let policy = handles.store.db(ctx.db_index).eviction_policy();

    if let Some(entry) = ctx.guards.get_mut(key) {
        let s = entry.value.as_str_mut().ok_or(EngineError::WrongType)?;
        let old_size = key.len() + s.len() + 48;
        let new_val = s.incr_by(delta).map_err(|_| EngineError::Overflow)?;
        let new_size = key.len() + s.len() + 48;
        handles.store.memory.record_delta(old_size, new_size);
        return Ok(Reply::Integer(new_val));
    }
    let entry = KeyEntry::new(Value::Str(StrValue::from_i64(delta)), policy, ctx.now_millis);
    let size = entry_size(key, &entry);
    ctx.guards.insert(key.clone(), entry);
    handles.store.memory.record_insert(size);
    Ok(Reply::Integer(delta))
}

fn incr(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "incr")?;
    incr_shared(ctx, handles, &argv[1], 1)
}

fn decr(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "decr")?;
    incr_shared(ctx, handles, &argv[1], -1)
}

fn incrby(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 3, "incrby")?;
    let delta = parse_i64(&argv[2])?;
    incr_shared(ctx, handles, &argv[1], delta)
}

fn decrby(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 3, "decrby")?;
    let delta = parse_i64(&argv[2])?;
    incr_shared(ctx, handles, &argv[1], delta.checked_neg().ok_or(EngineError::Overflow)?)
}

fn incrbyfloat(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 3, "incrbyfloat")?;
    let key = argv[1].clone();
    let delta = parse_f64(&argv[2])?;
    let policy = handles.store.db(ctx.db_index).eviction_policy();

    if let Some(entry) = ctx.guards.get_mut(&key) {
        let s = entry.value.as_str_mut().ok_or(EngineError::WrongType)?;
        let old_size = key.len() + s.len() + 48;
        let new_val = s.incr_by_float(delta).map_err(|_| EngineError::NotAFloat)?;
        let _ = new_val;
        let new_size = key.len() + s.len() + 48;
        handles.store.memory.record_delta(old_size, new_size);
        return Ok(Reply::Bulk(Some(Bytes::copy_from_slice(s.as_bytes()))));
    }
    let entry = KeyEntry::new(Value::Str(StrValue::from_f64(delta)), policy, ctx.now_millis);
    let size = entry_size(&key, &entry);
    let bytes = entry.value.as_str().unwrap().as_bytes().to_vec();
    ctx.guards.insert(key, entry);
    handles.store.memory.record_insert(size);
    Ok(Reply::Bulk(Some(Bytes::from(bytes))))
}
