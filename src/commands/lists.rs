use crate::commands::{parse_i64, require_arity, upper};
use crate::dispatcher::{CommandContext, EngineHandles};
use crate::error::{EngineError, EngineResult};
use crate::registry::{CommandRegistry, CommandSpec, KeySpec};
use crate::reply::Reply;
use crate::store::entry::KeyEntry;
use crate::types::Value;
use crate::types::list::ListValue;
use bytes::Bytes;

pub fn register(registry: &CommandRegistry) {
    registry.register(CommandSpec {
        name: "LPUSH",
        subcommand: None,
        description: "Push values onto the head of a list",
        categories: &["list", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: |c, a, h| push(c, a, h, true, false),
    });
    registry.register(CommandSpec {
        name: "RPUSH",
        subcommand: None,
        description: "Push values onto the tail of a list",
        categories: &["list", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: |c, a, h| push(c, a, h, false, false),
    });
    registry.register(CommandSpec {
        name: "LPUSHX",
        subcommand: None,
        description: "Push values onto the head of a list only if it exists",
        categories: &["list", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: |c, a, h| push(c, a, h, true, true),
    });
    registry.register(CommandSpec {
        name: "RPUSHX",
        subcommand: None,
        description: "Push values onto the tail of a list only if it exists",
        categories: &["list", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: |c, a, h| push(c, a, h, false, true),
    });
    registry.register(CommandSpec {
        name: "LPOP",
        subcommand: None,
        description: "Pop one or more values from the head of a list",
        categories: &["list", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: |c, a, h| pop(c, a, h, true),
    });
    registry.register(CommandSpec {
        name: "RPOP",
        subcommand: None,
        description: "Pop one or more values from the tail of a list",
        categories: &["list", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: |c, a, h| pop(c, a, h, false),
    });
    registry.register(CommandSpec {
        name: "LRANGE",
        subcommand: None,
        description: "Return a range of a list, inclusive on both ends",
        categories: &["list", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: lrange,
    });
    registry.register(CommandSpec {
        name: "LINDEX",
        subcommand: None,
        description: "Return the element at an index",
        categories: &["list", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: lindex,
    });
    registry.register(CommandSpec {
        name: "LSET",
        subcommand: None,
        description: "Set the element at an index",
        categories: &["list", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: lset,
    });
    registry.register(CommandSpec {
        name: "LTRIM",
        subcommand: None,
        description: "Trim a list to the given range",
        categories: &["list", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: ltrim,
    });
    registry.register(CommandSpec {
        name: "LREM",
        subcommand: None,
        description: "Remove matching elements from a list",
        categories: &["list", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: lrem,
    });
    registry.register(CommandSpec {
        name: "LLEN",
        subcommand: None,
        description: "Return the length of a list",
        categories: &["list", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: llen,
    });
    registry.register(CommandSpec {
        name: "LMOVE",
        subcommand: None,
        description: "Atomically move an element between two lists",
        categories: &["list", "write"],
        sync: true,
        key_extractor: |argv| {
            let mut spec = KeySpec::write(argv.get(1).cloned());
            spec.write_keys.extend(argv.get(2).cloned());
            spec
        },
        handler: lmove,
    });
}

fn entry_size(key: &Bytes, entry: &KeyEntry) -> usize {
    key.len() + entry.value.approx_size() + 48
}

fn push(
    ctx: &mut CommandContext,
    argv: &[Bytes],
    handles: &EngineHandles,
    left: bool,
    only_if_exists: bool,
) -> EngineResult<Reply> {
    require_arity(argv, 3, "push")?;
    let key = argv[1].clone();
    let policy = handles.store.db(ctx.db_index).eviction_policy();

    let existed = ctx.guards.contains_key(&key);
    if only_if_exists && !existed {
        return Ok(Reply::Integer(0));
    }

    if !existed {
        ctx.guards.insert(key.clone(), KeyEntry::new(Value::List(ListValue::new()), policy, ctx.now_millis));
    }
    let old_size = ctx.guards.get(&key).map(|e| entry_size(&key, e));
    let entry = ctx.guards.get_mut(&key).expect("just inserted or pre-existing");
    let list = entry.value.as_list_mut().ok_or(EngineError::WrongType)?;
    for value in &argv[2..] {
        if left {
            list.lpush(value.to_vec());
        } else {
            list.rpush(value.to_vec());
        }
    }
    let len = list.len();
    let new_size = entry_size(&key, entry);
    match old_size {
        Some(old) => handles.store.memory.record_delta(old, new_size),
        None => handles.store.memory.record_insert(new_size),
    }
    Ok(Reply::Integer(len as i64))
}

fn pop(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles, left: bool) -> EngineResult<Reply> {
    require_arity(argv, 2, "pop")?;
    let key = argv[1].clone();
    let count = match argv.get(2) {
        Some(c) => Some(parse_i64(c)?.max(0) as usize),
        None => None,
    };

    let Some(entry) = ctx.guards.get_mut(&key) else {
        return Ok(if count.is_some() { Reply::Array(None) } else { Reply::nil() });
    };
    let list = entry.value.as_list_mut().ok_or(EngineError::WrongType)?;

    let n = count.unwrap_or(1);
    let mut popped = Vec::with_capacity(n);
    for _ in 0..n {
        match if left { list.lpop() } else { list.rpop() } {
            Some(v) => popped.push(v),
            None => break,
        }
    }
    let emptied = list.is_empty();
    if emptied {
        if let Some(removed) = ctx.guards.remove(&key) {
            handles.store.memory.record_remove(entry_size(&key, &removed));
        }
    }

    match count {
        Some(_) => Ok(Reply::array_of_bulk(popped.into_iter().map(Some).collect())),
        None => Ok(match popped.into_iter().next() {
            Some(v) => Reply::Bulk(Some(Bytes::from(v))),
            None => Reply::nil(),
        }),
    }
}

fn lrange(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 4, "lrange")?;
    let start = parse_i64(&argv[2])?;
    let stop = parse_i64(&argv[3])?;
    let Some(entry) = ctx.guards.get(&argv[1]) else {
        return Ok(Reply::Array(Some(vec![])));
    };
    let list = entry.value.as_list().ok_or(EngineError::WrongType)?;
    let items = list.lrange(start, stop).into_iter().map(|v| Some(v.clone())).collect();
    Ok(Reply::array_of_bulk(items))
}

fn lindex(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 3, "lindex")?;
    let idx = parse_i64(&argv[2])?;
    let Some(entry) = ctx.guards.get(&argv[1]) else {
        return Ok(Reply::nil());
    };
    let list = entry.value.as_list().ok_or(EngineError::WrongType)?;
    match list.lindex(idx) {
        Some(v) => Ok(Reply::Bulk(Some(Bytes::from(v.clone())))),
        None => Ok(Reply::nil()),
    }
}

fn lset(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 4, "lset")?;
    let idx = parse_i64(&argv[2])?;
    let value = argv[3].to_vec();
    let Some(entry) = ctx.guards.get_mut(&argv[1]) else {
        return Err(EngineError::NoSuchKey);
    };
    let list = entry.value.as_list_mut().ok_or(EngineError::WrongType)?;
    if list.lset(idx, value) {
        Ok(Reply::ok())
    } else {
        Err(EngineError::IndexOutOfRange)
    }
}

fn ltrim(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 4, "ltrim")?;
    let key = argv[1].clone();
    let start = parse_i64(&argv[2])?;
    let stop = parse_i64(&argv[3])?;
    let Some(entry) = ctx.guards.get_mut(&key) else {
        return Ok(Reply::ok());
    };
    let list = entry.value.as_list_mut().ok_or(EngineError::WrongType)?;
    list.ltrim(start, stop);
    if list.is_empty() {
        if let Some(removed) = ctx.guards.remove(&key) {
            handles.store.memory.record_remove(entry_size(&key, &removed));
        }
    }
    Ok(Reply::ok())
}

fn lrem(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 4, "lrem")?;
    let key = argv[1].clone();
    let count = parse_i64(&argv[2])?;
    let value = &argv[3];
    let Some(entry) = ctx.guards.get_mut(&key) else {
        return Ok(Reply::Integer(0));
    };
    let list = entry.value.as_list_mut().ok_or(EngineError::WrongType)?;
    let removed = list.lrem(count, value);
    if list.is_empty() {
        if let Some(removed_entry) = ctx.guards.remove(&key) {
            handles.store.memory.record_remove(entry_size(&key, &removed_entry));
        }
    }
    Ok(Reply::Integer(removed))
}

fn llen(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "llen")?;
    match ctx.guards.get(&argv[1]) {
        Some(entry) => {
            let list = entry.value.as_list().ok_or(EngineError::WrongType)?;
            Ok(Reply::Integer(list.len() as i64))
        }
        None => Ok(Reply::Integer(0)),
    }
}

fn lmove(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 5, "lmove")?;
    let src = argv[1].clone();
    let dst = argv[2].clone();
    let from_left = match upper(&argv[3]).as_str() {
        "LEFT" => true,
        "RIGHT" => false,
        _ => return Err(EngineError::SyntaxError),
    };
    let to_left = match upper(&argv[4]).as_str() {
        "LEFT" => true,
        "RIGHT" => false,
        _ => return Err(EngineError::SyntaxError),
    };

    let Some(src_entry) = ctx.guards.get_mut(&src) else {
        return Ok(Reply::nil());
    };
    let src_list = src_entry.value.as_list_mut().ok_or(EngineError::WrongType)?;
    let Some(value) = (if from_left { src_list.lpop() } else { src_list.rpop() }) else {
        return Ok(Reply::nil());
    };
    let src_emptied = src_list.is_empty();
    if src_emptied {
        if let Some(removed) = ctx.guards.remove(&src) {
            handles.store.memory.record_remove(entry_size(&src, &removed));
        }
    }

    let policy = handles.store.db(ctx.db_index).eviction_policy();
    let dst_existed = ctx.guards.contains_key(&dst);
    if !dst_existed {
        ctx.guards.insert(dst.clone(), KeyEntry::new(Value::List(ListValue::new()), policy, ctx.now_millis));
    }
    let old_dst_size = if dst_existed { ctx.guards.get(&dst).map(|e| entry_size(&dst, e)) } else { None };
    let dst_entry = ctx.guards.get_mut(&dst).expect("just inserted or pre-existing");
    let dst_list = dst_entry.value.as_list_mut().ok_or(EngineError::WrongType)?;
    if to_left {
        dst_list.lpush(value.clone());
    } else {
        dst_list.rpush(value.clone());
    }
    let new_dst_size = entry_size(&dst, dst_entry);
    match old_dst_size {
        Some(old) => handles.store.memory.record_delta(old, new_dst_size),
        None => handles.store.memory.record_insert(new_dst_size),
    }

    Ok(Reply::Bulk(Some(Bytes::from(value))))
}
