use crate::commands::{parse_i64, require_arity};
use crate::dispatcher::{CommandContext, EngineHandles};
use crate::error::{EngineError, EngineResult};
use crate::registry::{CommandRegistry, CommandSpec, KeySpec};
use crate::reply::Reply;
use crate::store::entry::KeyEntry;
use crate::types::Value;
use crate::types::set::SetValue;
use bytes::Bytes;

pub fn register(registry: &CommandRegistry) {
    registry.register(CommandSpec {
        name: "SADD",
        subcommand: None,
        description: "Add one or more members to a set",
        categories: &["set", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: sadd,
    });
    registry.register(CommandSpec {
        name: "SREM",
        subcommand: None,
        description: "Remove one or more members from a set",
        categories: &["set", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: srem,
    });
    registry.register(CommandSpec {
        name: "SISMEMBER",
        subcommand: None,
        description: "Check whether a value is a member of a set",
        categories: &["set", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: sismember,
    });
    registry.register(CommandSpec {
        name: "SMEMBERS",
        subcommand: None,
        description: "List every member of a set",
        categories: &["set", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: smembers,
    });
    registry.register(CommandSpec {
        name: "SCARD",
        subcommand: None,
        description: "Count the members of a set",
        categories: &["set", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: scard,
    });
    registry.register(CommandSpec {
        name: "SPOP",
        subcommand: None,
        description: "Remove and return one or more random members",
        categories: &["set", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: spop,
    });
    registry.register(CommandSpec {
        name: "SRANDMEMBER",
        subcommand: None,
        description: "Return one or more random members without removing them",
        categories: &["set", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: srandmember,
    });
    registry.register(CommandSpec {
        name: "SMOVE",
        subcommand: None,
        description: "Move a member from one set to another",
        categories: &["set", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(vec![argv.get(1).cloned(), argv.get(2).cloned()].into_iter().flatten()),
        handler: smove,
    });
    registry.register(CommandSpec {
        name: "SDIFF",
        subcommand: None,
        description: "Members present in the first set but none of the rest",
        categories: &["set", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv[1..].iter().cloned()),
        handler: |c, a, h| setop(c, a, h, SetOp::Diff, false),
    });
    registry.register(CommandSpec {
        name: "SDIFFSTORE",
        subcommand: None,
        description: "Store the difference of sets into a destination key",
        categories: &["set", "write"],
        sync: true,
        key_extractor: |argv| store_key_spec(argv),
        handler: |c, a, h| setop(c, a, h, SetOp::Diff, true),
    });
    registry.register(CommandSpec {
        name: "SINTER",
        subcommand: None,
        description: "Members present in every given set",
        categories: &["set", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv[1..].iter().cloned()),
        handler: |c, a, h| setop(c, a, h, SetOp::Inter, false),
    });
    registry.register(CommandSpec {
        name: "SINTERSTORE",
        subcommand: None,
        description: "Store the intersection of sets into a destination key",
        categories: &["set", "write"],
        sync: true,
        key_extractor: |argv| store_key_spec(argv),
        handler: |c, a, h| setop(c, a, h, SetOp::Inter, true),
    });
    registry.register(CommandSpec {
        name: "SUNION",
        subcommand: None,
        description: "Members present in any of the given sets",
        categories: &["set", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv[1..].iter().cloned()),
        handler: |c, a, h| setop(c, a, h, SetOp::Union, false),
    });
    registry.register(CommandSpec {
        name: "SUNIONSTORE",
        subcommand: None,
        description: "Store the union of sets into a destination key",
        categories: &["set", "write"],
        sync: true,
        key_extractor: |argv| store_key_spec(argv),
        handler: |c, a, h| setop(c, a, h, SetOp::Union, true),
    });
}

/// `*STORE` variants write the destination key and only read the sources.
fn store_key_spec(argv: &[Bytes]) -> KeySpec {
    let mut spec = KeySpec::write(argv.get(1).cloned());
    spec.read_keys = argv[2..].to_vec();
    spec
}

fn entry_size(key: &Bytes, entry: &KeyEntry) -> usize {
    key.len() + entry.value.approx_size() + 48
}

fn set_mut<'a>(
    ctx: &'a mut CommandContext,
    handles: &EngineHandles,
    key: &Bytes,
) -> EngineResult<(&'a mut SetValue, Option<usize>)> {
    let policy = handles.store.db(ctx.db_index).eviction_policy();
    let existed = ctx.guards.contains_key(key);
    let old_size = ctx.guards.get(key).map(|e| entry_size(key, e));
    if !existed {
        ctx.guards.insert(key.clone(), KeyEntry::new(Value::Set(SetValue::new()), policy, ctx.now_millis));
    }
    let entry = ctx.guards.get_mut(key).expect("just inserted or pre-existing");
    let set = entry.value.as_set_mut().ok_or(EngineError::WrongType)?;
    Ok((set, old_size))
}

fn sadd(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 3, "sadd")?;
    let key = argv[1].clone();
    let (set, old_size) = set_mut(ctx, handles, &key)?;
    let mut added = 0i64;
    for member in &argv[2..] {
        if set.add(member.to_vec()) {
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

fn srem(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 3, "srem")?;
    let key = argv[1].clone();
    let Some(entry) = ctx.guards.get_mut(&key) else {
        return Ok(Reply::Integer(0));
    };
    let set = entry.value.as_set_mut().ok_or(EngineError::WrongType)?;
    let mut removed = 0i64;
    for member in &argv[2..] {
        if set.remove(member) {
            removed += 1;
        }
    }
    let emptied = ctx.guards.get(&key).map(|e| e.value.as_set().map(|s| s.is_empty()).unwrap_or(false)).unwrap_or(false);
    if emptied {
        if let Some(removed_entry) = ctx.guards.remove(&key) {
            handles.store.memory.record_remove(entry_size(&key, &removed_entry));
        }
    }
    Ok(Reply::Integer(removed))
}

fn sismember(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 3, "sismember")?;
    let Some(entry) = ctx.guards.get(&argv[1]) else {
        return Ok(Reply::Integer(0));
    };
    let set = entry.value.as_set().ok_or(EngineError::WrongType)?;
    Ok(Reply::Integer(set.contains(&argv[2]) as i64))
}

fn smembers(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "smembers")?;
    let Some(entry) = ctx.guards.get(&argv[1]) else {
        return Ok(Reply::Array(Some(vec![])));
    };
    let set = entry.value.as_set().ok_or(EngineError::WrongType)?;
    let items = set.members().into_iter().map(|m| Some(m.clone())).collect();
    Ok(Reply::array_of_bulk(items))
}

fn scard(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "scard")?;
    match ctx.guards.get(&argv[1]) {
        Some(entry) => {
            let set = entry.value.as_set().ok_or(EngineError::WrongType)?;
            Ok(Reply::Integer(set.len() as i64))
        }
        None => Ok(Reply::Integer(0)),
    }
}

fn spop(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "spop")?;
    let key = argv[1].clone();
    let count = match argv.get(2) {
        Some(c) => Some(parse_i64(c)?.max(0) as usize),
        None => None,
    };
    let Some(entry) = ctx.guards.get_mut(&key) else {
        return Ok(if count.is_some() { Reply::Array(Some(vec![])) } else { Reply::nil() });
    };
    let set = entry.value.as_set_mut().ok_or(EngineError::WrongType)?;

    let popped: Vec<Vec<u8>> = match count {
        None => set.pop().into_iter().collect(),
        Some(n) => (0..n).filter_map(|_| set.pop()).collect(),
    };

    let emptied = ctx.guards.get(&key).map(|e| e.value.as_set().map(|s| s.is_empty()).unwrap_or(false)).unwrap_or(false);
    if emptied {
        if let Some(removed_entry) = ctx.guards.remove(&key) {
            handles.store.memory.record_remove(entry_size(&key, &removed_entry));
        }
    }

    match count {
        None => Ok(match popped.into_iter().next() {
            Some(m) => Reply::Bulk(Some(Bytes::from(m))),
            None => Reply::nil(),
        }),
        Some(_) => Ok(Reply::array_of_bulk(popped.into_iter().map(Some).collect())),
    }
}

fn srandmember(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "srandmember")?;
    let Some(entry) = ctx.guards.get(&argv[1]) else {
        return Ok(if argv.len() > 2 { Reply::Array(Some(vec![])) } else { Reply::nil() });
    };
    let set = entry.value.as_set().ok_or(EngineError::WrongType)?;
    match argv.get(2) {
        None => Ok(match set.random_member() {
            Some(m) => Reply::Bulk(Some(Bytes::from(m.clone()))),
            None => Reply::nil(),
        }),
        Some(count_arg) => {
            let count = parse_i64(count_arg)?;
            let members = set.random_members(count);
            Ok(Reply::array_of_bulk(members.into_iter().map(Some).collect()))
        }
    }
}

fn smove(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 4, "smove")?;
    let src = argv[1].clone();
    let dst = argv[2].clone();
    let member = argv[3].clone();

    let src_old_size = ctx.guards.get(&src).map(|e| entry_size(&src, e));
    let removed = {
        let Some(entry) = ctx.guards.get_mut(&src) else {
            return Ok(Reply::Integer(0));
        };
        let set = entry.value.as_set_mut().ok_or(EngineError::WrongType)?;
        set.remove(&member)
    };
    if !removed {
        return Ok(Reply::Integer(0));
    }

    let src_emptied = ctx.guards.get(&src).and_then(|e| e.value.as_set()).map(|s| s.is_empty()).unwrap_or(false);
    if src_emptied {
        if let Some(removed_entry) = ctx.guards.remove(&src) {
            handles.store.memory.record_remove(entry_size(&src, &removed_entry));
        }
    } else if let Some(old) = src_old_size {
        let new_size = entry_size(&src, ctx.guards.get(&src).expect("still present"));
        handles.store.memory.record_delta(old, new_size);
    }

    let (dst_set, dst_old_size) = set_mut(ctx, handles, &dst)?;
    dst_set.add(member.to_vec());
    let dst_new_size = entry_size(&dst, ctx.guards.get(&dst).expect("just written"));
    match dst_old_size {
        Some(old) => handles.store.memory.record_delta(old, dst_new_size),
        None => handles.store.memory.record_insert(dst_new_size),
    }

    Ok(Reply::Integer(1))
}

enum SetOp {
    Diff,
    Inter,
    Union,
}

fn setop(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles, op: SetOp, store: bool) -> EngineResult<Reply> {
    let min_args = if store { 3 } else { 2 };
    require_arity(argv, min_args, if store { "sdiffstore" } else { "sdiff" })?;

    let source_keys = if store { &argv[2..] } else { &argv[1..] };
    let mut sets = Vec::with_capacity(source_keys.len());
    for key in source_keys {
        let set = match ctx.guards.get(key) {
            Some(entry) => entry.value.as_set().ok_or(EngineError::WrongType)?.clone(),
            None => SetValue::new(),
        };
        sets.push(set);
    }

    let result = sets
        .into_iter()
        .reduce(|acc, s| match op {
            SetOp::Diff => acc.difference(&s),
            SetOp::Inter => acc.intersect(&s),
            SetOp::Union => acc.union(&s),
        })
        .unwrap_or_default();

    if store {
        let dst = argv[1].clone();
        let old_size = ctx.guards.get(&dst).map(|e| entry_size(&dst, e));
        if result.is_empty() {
            if let Some(old) = ctx.guards.remove(&dst) {
                handles.store.memory.record_remove(entry_size(&dst, &old));
            }
            return Ok(Reply::Integer(0));
        }
        let count = result.len() as i64;
        let policy = handles.store.db(ctx.db_index).eviction_policy();
        let entry = KeyEntry::new(Value::Set(result), policy, ctx.now_millis);
        let new_size = entry_size(&dst, &entry);
        ctx.guards.insert(dst, entry);
        match old_size {
            Some(old) => handles.store.memory.record_delta(old, new_size),
            None => handles.store.memory.record_insert(new_size),
        }
        Ok(Reply::Integer(count))
    } else {
        let items = result.members().into_iter().map(|m| Some(m.clone())).collect();
        Ok(Reply::array_of_bulk(items))
    }
}
