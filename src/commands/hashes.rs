use crate::commands::{parse_f64, parse_i64, require_arity};
use crate::dispatcher::{CommandContext, EngineHandles};
use crate::error::{EngineError, EngineResult};
use crate::registry::{CommandRegistry, CommandSpec, KeySpec};
use crate::reply::Reply;
use crate::store::entry::KeyEntry;
use crate::types::Value;
use crate::types::hash::HashValue;
use bytes::Bytes;

pub fn register(registry: &CommandRegistry) {
    registry.register(CommandSpec {
        name: "HSET",
        subcommand: None,
        description: "Set one or more hash fields",
        categories: &["hash", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: hset,
    });
    registry.register(CommandSpec {
        name: "HSETNX",
        subcommand: None,
        description: "Set a hash field only if it doesn't exist",
        categories: &["hash", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: hsetnx,
    });
    registry.register(CommandSpec {
        name: "HGET",
        subcommand: None,
        description: "Get a hash field",
        categories: &["hash", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: hget,
    });
    registry.register(CommandSpec {
        name: "HMGET",
        subcommand: None,
        description: "Get multiple hash fields",
        categories: &["hash", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: hmget,
    });
    registry.register(CommandSpec {
        name: "HDEL",
        subcommand: None,
        description: "Delete one or more hash fields",
        categories: &["hash", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: hdel,
    });
    registry.register(CommandSpec {
        name: "HEXISTS",
        subcommand: None,
        description: "Check whether a hash field exists",
        categories: &["hash", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: hexists,
    });
    registry.register(CommandSpec {
        name: "HKEYS",
        subcommand: None,
        description: "List hash field names",
        categories: &["hash", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: hkeys,
    });
    registry.register(CommandSpec {
        name: "HVALS",
        subcommand: None,
        description: "List hash field values",
        categories: &["hash", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: hvals,
    });
    registry.register(CommandSpec {
        name: "HGETALL",
        subcommand: None,
        description: "Get every field/value pair in a hash",
        categories: &["hash", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: hgetall,
    });
    registry.register(CommandSpec {
        name: "HLEN",
        subcommand: None,
        description: "Count the live fields in a hash",
        categories: &["hash", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: hlen,
    });
    registry.register(CommandSpec {
        name: "HSTRLEN",
        subcommand: None,
        description: "Return the byte length of a hash field's value",
        categories: &["hash", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: hstrlen,
    });
    registry.register(CommandSpec {
        name: "HINCRBY",
        subcommand: None,
        description: "Increment a hash field by an integer amount",
        categories: &["hash", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: hincrby,
    });
    registry.register(CommandSpec {
        name: "HINCRBYFLOAT",
        subcommand: None,
        description: "Increment a hash field by a float amount",
        categories: &["hash", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: hincrbyfloat,
    });
    registry.register(CommandSpec {
        name: "HRANDFIELD",
        subcommand: None,
        description: "Return one or more random hash fields",
        categories: &["hash", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: hrandfield,
    });
    registry.register(CommandSpec {
        name: "HEXPIRE",
        subcommand: None,
        description: "Set a per-field expiry time, in seconds",
        categories: &["hash", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: |c, a, h| hexpire(c, a, h, 1000),
    });
    registry.register(CommandSpec {
        name: "HPEXPIRE",
        subcommand: None,
        description: "Set a per-field expiry time, in milliseconds",
        categories: &["hash", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: |c, a, h| hexpire(c, a, h, 1),
    });
    registry.register(CommandSpec {
        name: "HTTL",
        subcommand: None,
        description: "Remaining per-field TTL, in seconds",
        categories: &["hash", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: |c, a, h| httl(c, a, h, 1000),
    });
    registry.register(CommandSpec {
        name: "HPTTL",
        subcommand: None,
        description: "Remaining per-field TTL, in milliseconds",
        categories: &["hash", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: |c, a, h| httl(c, a, h, 1),
    });
    registry.register(CommandSpec {
        name: "HEXPIRETIME",
        subcommand: None,
        description: "Absolute per-field expiry time, in seconds",
        categories: &["hash", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: |c, a, h| hexpiretime(c, a, h, 1000),
    });
    registry.register(CommandSpec {
        name: "HPEXPIRETIME",
        subcommand: None,
        description: "Absolute per-field expiry time, in milliseconds",
        categories: &["hash", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: |c, a, h| hexpiretime(c, a, h, 1),
    });
}

fn entry_size(key: &Bytes, entry: &KeyEntry) -> usize {
    key.len() + entry.value.approx_size() + 48
}

/// Fetch or create the hash at `key`, returning a mutable reference plus the
/// entry's prior byte size (`None` if the key is new).
fn hash_mut<'a>(
    ctx: &'a mut CommandContext,
    handles: &EngineHandles,
    key: &Bytes,
) -> EngineResult<(&'a mut HashValue, Option<usize>)> {
    let policy = handles.store.db(ctx.db_index).eviction_policy();
    let old_size = ctx.guards.get(key).map(|e| entry_size(key, e));
    let is_hash = ctx.guards.get(key).is_some_and(|e| e.value.as_hash().is_some());
    if !is_hash {
        ctx.guards.insert(key.clone(), KeyEntry::new(Value::Hash(HashValue::new()), policy, ctx.now_millis));
    }
    let entry = ctx.guards.get_mut(key).expect("just inserted or pre-existing");
    let hash = entry.value.as_hash_mut().expect("just ensured hash");
    Ok((hash, old_size))
}

fn hset(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    if argv.len() < 4 || argv.len() % 2 != 0 {
        return Err(EngineError::WrongArity("hset".to_string()));
    }
    let key = argv[1].clone();
    let now = ctx.now_millis;
    let (hash, old_size) = hash_mut(ctx, handles, &key)?;
    let mut added = 0i64;
    for pair in argv[2..].chunks(2) {
        let field = String::from_utf8_lossy(&pair[0]).to_string();
        if hash.set(field, pair[1].to_vec(), now) {
            added += 1;
        }
    }
    let new_size = entry_size(&key, ctx.guards.get(&key).expect("just written"));
    match old_size {
        Some(old) => handles.store.memory.record_delta(old, new_size),
        None => handles.store.memory.record_insert(new_size),
    }
    Ok(Reply::Integer(added))
}

fn hsetnx(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 4, "hsetnx")?;
    let key = argv[1].clone();
    let field = String::from_utf8_lossy(&argv[2]).to_string();
    let value = argv[3].to_vec();
    let now = ctx.now_millis;
    let (hash, old_size) = hash_mut(ctx, handles, &key)?;
    let set = hash.setnx(field, value, now);
    let new_size = entry_size(&key, ctx.guards.get(&key).expect("just written"));
    match old_size {
        Some(old) => handles.store.memory.record_delta(old, new_size),
        None => handles.store.memory.record_insert(new_size),
    }
    Ok(Reply::Integer(set as i64))
}

fn hget(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 3, "hget")?;
    let now = ctx.now_millis;
    let Some(entry) = ctx.guards.get(&argv[1]) else {
        return Ok(Reply::nil());
    };
    let hash = entry.value.as_hash().ok_or(EngineError::WrongType)?;
    let field = String::from_utf8_lossy(&argv[2]);
    match hash.get(&field, now) {
        Some(v) => Ok(Reply::Bulk(Some(Bytes::from(v.clone())))),
        None => Ok(Reply::nil()),
    }
}

fn hmget(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 3, "hmget")?;
    let now = ctx.now_millis;
    let entry = ctx.guards.get(&argv[1]);
    let hash = match entry {
        Some(e) => Some(e.value.as_hash().ok_or(EngineError::WrongType)?),
        None => None,
    };
    let items = argv[2..]
        .iter()
        .map(|f| {
            let field = String::from_utf8_lossy(f);
            hash.and_then(|h| h.get(&field, now)).cloned()
        })
        .collect();
    Ok(Reply::array_of_bulk(items))
}

fn hdel(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 3, "hdel")?;
    let key = argv[1].clone();
    let Some(entry) = ctx.guards.get_mut(&key) else {
        return Ok(Reply::Integer(0));
    };
    let hash = entry.value.as_hash_mut().ok_or(EngineError::WrongType)?;
    let mut removed = 0i64;
    for field in &argv[2..] {
        if hash.del(&String::from_utf8_lossy(field)) {
            removed += 1;
        }
    }
    let now = ctx.now_millis;
    let emptied = ctx.guards.get(&key).map(|e| e.value.as_hash().map(|h| h.is_empty(now)).unwrap_or(false)).unwrap_or(false);
    if emptied {
        if let Some(removed_entry) = ctx.guards.remove(&key) {
            handles.store.memory.record_remove(entry_size(&key, &removed_entry));
        }
    }
    Ok(Reply::Integer(removed))
}

fn hexists(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 3, "hexists")?;
    let now = ctx.now_millis;
    let Some(entry) = ctx.guards.get(&argv[1]) else {
        return Ok(Reply::Integer(0));
    };
    let hash = entry.value.as_hash().ok_or(EngineError::WrongType)?;
    Ok(Reply::Integer(hash.exists(&String::from_utf8_lossy(&argv[2]), now) as i64))
}

fn hkeys(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "hkeys")?;
    let now = ctx.now_millis;
    let Some(entry) = ctx.guards.get(&argv[1]) else {
        return Ok(Reply::Array(Some(vec![])));
    };
    let hash = entry.value.as_hash().ok_or(EngineError::WrongType)?;
    let items = hash.keys(now).into_iter().map(|k| Some(k.clone().into_bytes())).collect();
    Ok(Reply::array_of_bulk(items))
}

fn hvals(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "hvals")?;
    let now = ctx.now_millis;
    let Some(entry) = ctx.guards.get(&argv[1]) else {
        return Ok(Reply::Array(Some(vec![])));
    };
    let hash = entry.value.as_hash().ok_or(EngineError::WrongType)?;
    let items = hash.values(now).into_iter().map(|v| Some(v.clone())).collect();
    Ok(Reply::array_of_bulk(items))
}

fn hgetall(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "hgetall")?;
    let now = ctx.now_millis;
    let Some(entry) = ctx.guards.get(&argv[1]) else {
        return Ok(Reply::Array(Some(vec![])));
    };
    let hash = entry.value.as_hash().ok_or(EngineError::WrongType)?;
    let mut items = Vec::new();
    for (k, v) in hash.entries(now) {
        items.push(Reply::Bulk(Some(Bytes::from(k.clone().into_bytes()))));
        items.push(Reply::Bulk(Some(Bytes::from(v.clone()))));
    }
    Ok(Reply::Array(Some(items)))
}

fn hlen(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "hlen")?;
    let now = ctx.now_millis;
    match ctx.guards.get(&argv[1]) {
        Some(entry) => {
            let hash = entry.value.as_hash().ok_or(EngineError::WrongType)?;
            Ok(Reply::Integer(hash.len(now) as i64))
        }
        None => Ok(Reply::Integer(0)),
    }
}

fn hstrlen(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 3, "hstrlen")?;
    let now = ctx.now_millis;
    let Some(entry) = ctx.guards.get(&argv[1]) else {
        return Ok(Reply::Integer(0));
    };
    let hash = entry.value.as_hash().ok_or(EngineError::WrongType)?;
    let len = hash.get(&String::from_utf8_lossy(&argv[2]), now).map_or(0, |v| v.len());
    Ok(Reply::Integer(len as i64))
}

fn hincrby(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 4, "hincrby")?;
    let key = argv[1].clone();
    let field = String::from_utf8_lossy(&argv[2]).to_string();
    let delta = parse_i64(&argv[3])?;
    let now = ctx.now_millis;
    let (hash, old_size) = hash_mut(ctx, handles, &key)?;
    let new_val = hash.incr_by(&field, delta, now).map_err(|_| EngineError::Overflow)?;
    let new_size = entry_size(&key, ctx.guards.get(&key).expect("just written"));
    match old_size {
        Some(old) => handles.store.memory.record_delta(old, new_size),
        None => handles.store.memory.record_insert(new_size),
    }
    Ok(Reply::Integer(new_val))
}

fn hincrbyfloat(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 4, "hincrbyfloat")?;
    let key = argv[1].clone();
    let field = String::from_utf8_lossy(&argv[2]).to_string();
    let delta = parse_f64(&argv[3])?;
    let now = ctx.now_millis;
    let (hash, old_size) = hash_mut(ctx, handles, &key)?;
    let new_val = hash.incr_by_float(&field, delta, now).map_err(|_| EngineError::NotAFloat)?;
    let new_size = entry_size(&key, ctx.guards.get(&key).expect("just written"));
    match old_size {
        Some(old) => handles.store.memory.record_delta(old, new_size),
        None => handles.store.memory.record_insert(new_size),
    }
    Ok(Reply::Bulk(Some(Bytes::from(crate::types::rstring::StrValue::from_f64(new_val).into_bytes()))))
}

fn hrandfield(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "hrandfield")?;
    let now = ctx.now_millis;
    let Some(entry) = ctx.guards.get(&argv[1]) else {
        return Ok(Reply::nil());
    };
    let hash = entry.value.as_hash().ok_or(EngineError::WrongType)?;
    let fields = hash.keys(now);
    if fields.is_empty() {
        return Ok(if argv.len() > 2 { Reply::Array(Some(vec![])) } else { Reply::nil() });
    }
    use rand::seq::SliceRandom;
    let mut rng = rand::thread_rng();

    match argv.get(2) {
        None => {
            let field = fields.choose(&mut rng).expect("non-empty checked above");
            Ok(Reply::Bulk(Some(Bytes::from((*field).clone().into_bytes()))))
        }
        Some(count_arg) => {
            let with_values = argv.get(3).map(|a| a.eq_ignore_ascii_case(b"WITHVALUES")).unwrap_or(false);
            let count = parse_i64(count_arg)?;
            let chosen: Vec<&String> = if count >= 0 {
                fields.choose_multiple(&mut rng, (count as usize).min(fields.len())).cloned().collect()
            } else {
                (0..(-count) as usize).filter_map(|_| fields.choose(&mut rng).cloned()).collect()
            };
            let mut items = Vec::new();
            for field in chosen {
                items.push(Reply::Bulk(Some(Bytes::from(field.clone().into_bytes()))));
                if with_values {
                    if let Some(v) = hash.get(field, now) {
                        items.push(Reply::Bulk(Some(Bytes::from(v.clone()))));
                    }
                }
            }
            Ok(Reply::Array(Some(items)))
        }
    }
}

fn hexpire(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles, unit_millis: u64) -> EngineResult<Reply> {
    require_arity(argv, 4, "hexpire")?;
    let amount = parse_i64(&argv[2])?;
    let now = ctx.now_millis;
    let expire_at = now + (amount.max(0) as u64).saturating_mul(unit_millis);
    let Some(entry) = ctx.guards.get_mut(&argv[1]) else {
        return Ok(Reply::array_of_bulk(argv[3..].iter().map(|_| None).collect()));
    };
    let hash = entry.value.as_hash_mut().ok_or(EngineError::WrongType)?;
    let mut results = Vec::new();
    for field in &argv[3..] {
        let f = String::from_utf8_lossy(field);
        results.push(Reply::Integer(if hash.set_field_expiry(&f, expire_at, now) { 1 } else { -2 }));
    }
    Ok(Reply::Array(Some(results)))
}

fn httl(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles, unit_millis: u64) -> EngineResult<Reply> {
    require_arity(argv, 3, "httl")?;
    let now = ctx.now_millis;
    let Some(entry) = ctx.guards.get(&argv[1]) else {
        return Ok(Reply::array_of_bulk(argv[2..].iter().map(|_| None).collect()));
    };
    let hash = entry.value.as_hash().ok_or(EngineError::WrongType)?;
    let mut results = Vec::new();
    for field in &argv[2..] {
        let f = String::from_utf8_lossy(field);
        results.push(Reply::Integer(match hash.field_expiry(&f, now) {
            None => -2,
            Some(None) => -1,
            Some(Some(at)) => ((at - now) / unit_millis).max(0) as i64,
        }));
    }
    Ok(Reply::Array(Some(results)))
}

fn hexpiretime(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles, unit_millis: u64) -> EngineResult<Reply> {
    require_arity(argv, 3, "hexpiretime")?;
    let now = ctx.now_millis;
    let Some(entry) = ctx.guards.get(&argv[1]) else {
        return Ok(Reply::array_of_bulk(argv[2..].iter().map(|_| None).collect()));
    };
    let hash = entry.value.as_hash().ok_or(EngineError::WrongType)?;
    let mut results = Vec::new();
    for field in &argv[2..] {
        let f = String::from_utf8_lossy(field);
        results.push(Reply::Integer(match hash.field_expiry(&f, now) {
            None => -2,
            Some(None) => -1,
            Some(Some(at)) => (at / unit_millis) as i64,
        }));
    }
    Ok(Reply::Array(Some(results)))
}
