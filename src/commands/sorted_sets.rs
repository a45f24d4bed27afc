use crate::commands::{parse_f64, parse_i64, require_arity, upper};
use crate::dispatcher::{CommandContext, EngineHandles};
use crate::error::{EngineError, EngineResult};
use crate::registry::{CommandRegistry, CommandSpec, KeySpec};
use crate::reply::Reply;
use crate::store::entry::KeyEntry;
use crate::types::Value;
use crate::types::sorted_set::SortedSetValue;
use bytes::Bytes;

pub fn register(registry: &CommandRegistry) {
    registry.register(CommandSpec {
        name: "ZADD",
        subcommand: None,
        description: "Add or update members of a sorted set",
        categories: &["sortedset", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: zadd,
    });
    registry.register(CommandSpec {
        name: "ZREM",
        subcommand: None,
        description: "Remove one or more members from a sorted set",
        categories: &["sortedset", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: zrem,
    });
    registry.register(CommandSpec {
        name: "ZSCORE",
        subcommand: None,
        description: "Get a member's score",
        categories: &["sortedset", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: zscore,
    });
    registry.register(CommandSpec {
        name: "ZCARD",
        subcommand: None,
        description: "Count the members of a sorted set",
        categories: &["sortedset", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: zcard,
    });
    registry.register(CommandSpec {
        name: "ZRANK",
        subcommand: None,
        description: "Rank of a member, ascending",
        categories: &["sortedset", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: |c, a, h| zrank(c, a, h, false),
    });
    registry.register(CommandSpec {
        name: "ZREVRANK",
        subcommand: None,
        description: "Rank of a member, descending",
        categories: &["sortedset", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: |c, a, h| zrank(c, a, h, true),
    });
    registry.register(CommandSpec {
        name: "ZINCRBY",
        subcommand: None,
        description: "Increment a member's score",
        categories: &["sortedset", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: zincrby,
    });
    registry.register(CommandSpec {
        name: "ZRANGE",
        subcommand: None,
        description: "Return a range of members by rank, score, or lex order",
        categories: &["sortedset", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: zrange,
    });
    registry.register(CommandSpec {
        name: "ZRANGEBYSCORE",
        subcommand: None,
        description: "Return members within a score range",
        categories: &["sortedset", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: |c, a, h| zrangebyscore(c, a, h, false),
    });
    registry.register(CommandSpec {
        name: "ZREVRANGEBYSCORE",
        subcommand: None,
        description: "Return members within a score range, descending",
        categories: &["sortedset", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: |c, a, h| zrangebyscore(c, a, h, true),
    });
    registry.register(CommandSpec {
        name: "ZRANGEBYLEX",
        subcommand: None,
        description: "Return members within a lexicographic range",
        categories: &["sortedset", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: zrangebylex,
    });
    registry.register(CommandSpec {
        name: "ZPOPMIN",
        subcommand: None,
        description: "Pop the lowest-scoring members",
        categories: &["sortedset", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: |c, a, h| zpop(c, a, h, true),
    });
    registry.register(CommandSpec {
        name: "ZPOPMAX",
        subcommand: None,
        description: "Pop the highest-scoring members",
        categories: &["sortedset", "write"],
        sync: true,
        key_extractor: |argv| KeySpec::write(argv.get(1).cloned()),
        handler: |c, a, h| zpop(c, a, h, false),
    });
    registry.register(CommandSpec {
        name: "ZRANDMEMBER",
        subcommand: None,
        description: "Return one or more random members",
        categories: &["sortedset", "read"],
        sync: false,
        key_extractor: |argv| KeySpec::read(argv.get(1).cloned()),
        handler: zrandmember,
    });
    registry.register(CommandSpec {
        name: "ZUNIONSTORE",
        subcommand: None,
        description: "Store the union of sorted sets, aggregating scores",
        categories: &["sortedset", "write"],
        sync: true,
        key_extractor: zset_store_key_spec,
        handler: |c, a, h| zsetop(c, a, h, ZSetOp::Union, true),
    });
    registry.register(CommandSpec {
        name: "ZINTERSTORE",
        subcommand: None,
        description: "Store the intersection of sorted sets, aggregating scores",
        categories: &["sortedset", "write"],
        sync: true,
        key_extractor: zset_store_key_spec,
        handler: |c, a, h| zsetop(c, a, h, ZSetOp::Inter, true),
    });
    registry.register(CommandSpec {
        name: "ZUNION",
        subcommand: None,
        description: "Union of sorted sets, aggregating scores",
        categories: &["sortedset", "read"],
        sync: false,
        key_extractor: zset_read_key_spec,
        handler: |c, a, h| zsetop(c, a, h, ZSetOp::Union, false),
    });
    registry.register(CommandSpec {
        name: "ZINTER",
        subcommand: None,
        description: "Intersection of sorted sets, aggregating scores",
        categories: &["sortedset", "read"],
        sync: false,
        key_extractor: zset_read_key_spec,
        handler: |c, a, h| zsetop(c, a, h, ZSetOp::Inter, false),
    });
    registry.register(CommandSpec {
        name: "ZDIFF",
        subcommand: None,
        description: "Members in the first sorted set absent from the rest",
        categories: &["sortedset", "read"],
        sync: false,
        key_extractor: zset_read_key_spec,
        handler: |c, a, h| zsetop(c, a, h, ZSetOp::Diff, false),
    });
}

fn entry_size(key: &Bytes, entry: &KeyEntry) -> usize {
    key.len() + entry.value.approx_size() + 48
}

fn zset_mut<'a>(
    ctx: &'a mut CommandContext,
    handles: &EngineHandles,
    key: &Bytes,
) -> EngineResult<(&'a mut SortedSetValue, Option<usize>)> {
    let policy = handles.store.db(ctx.db_index).eviction_policy();
    let existed = ctx.guards.contains_key(key);
    let old_size = ctx.guards.get(key).map(|e| entry_size(key, e));
    if !existed {
        ctx.guards.insert(key.clone(), KeyEntry::new(Value::SortedSet(SortedSetValue::new()), policy, ctx.now_millis));
    }
    let entry = ctx.guards.get_mut(key).expect("just inserted or pre-existing");
    let zset = entry.value.as_sorted_set_mut().ok_or(EngineError::WrongType)?;
    Ok((zset, old_size))
}

fn reply_score(score: f64) -> Reply {
    Reply::Bulk(Some(Bytes::from(crate::types::rstring::StrValue::from_f64(score).into_bytes())))
}

/// Parses a `ZADD`/range score token: `+inf`, `-inf`, or a float, optionally
/// prefixed with `(` for an exclusive bound.
fn parse_score_bound(arg: &Bytes) -> EngineResult<(f64, bool)> {
    let s = String::from_utf8_lossy(arg);
    let (body, inclusive) = match s.strip_prefix('(') {
        Some(rest) => (rest, false),
        None => (s.as_ref(), true),
    };
    let value = match body {
        "+inf" | "+Inf" | "inf" => f64::INFINITY,
        "-inf" | "-Inf" => f64::NEG_INFINITY,
        other => other.parse::<f64>().map_err(|_| EngineError::NotAFloat)?,
    };
    Ok((value, inclusive))
}

fn parse_lex_bound(arg: &Bytes) -> EngineResult<(Vec<u8>, bool)> {
    match arg.first() {
        Some(b'-') if arg.len() == 1 => Ok((vec![], true)),
        Some(b'+') if arg.len() == 1 => Ok((vec![], true)),
        Some(b'[') => Ok((arg[1..].to_vec(), true)),
        Some(b'(') => Ok((arg[1..].to_vec(), false)),
        _ => Err(EngineError::SyntaxError),
    }
}

fn zadd(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 4, "zadd")?;
    let key = argv[1].clone();

    let mut idx = 2;
    let mut nx = false;
    let mut xx = false;
    let mut gt = false;
    let mut lt = false;
    let mut ch = false;
    let mut incr = false;
    while idx < argv.len() {
        match upper(&argv[idx]).as_str() {
            "NX" => { nx = true; idx += 1; }
            "XX" => { xx = true; idx += 1; }
            "GT" => { gt = true; idx += 1; }
            "LT" => { lt = true; idx += 1; }
            "CH" => { ch = true; idx += 1; }
            "INCR" => { incr = true; idx += 1; }
            _ => break,
        }
    }
    if nx && (gt || lt) {
        return Err(EngineError::SyntaxError);
    }
    let pairs = &argv[idx..];
    if pairs.is_empty() || pairs.len() % 2 != 0 || (incr && pairs.len() != 2) {
        return Err(EngineError::SyntaxError);
    }

    let (zset, old_size) = zset_mut(ctx, handles, &key)?;
    let mut added = 0i64;
    let mut changed = 0i64;
    let mut incr_result: Option<Option<f64>> = None;

    for pair in pairs.chunks(2) {
        let score = parse_f64(&pair[0])?;
        let member = pair[1].to_vec();
        let existing = zset.score(&member);

        if incr {
            if (nx && existing.is_some()) || (xx && existing.is_none()) {
                incr_result = Some(None);
                break;
            }
            let base = existing.unwrap_or(0.0);
            let new_score = base + score;
            if let Some(cur) = existing {
                if (gt && new_score <= cur) || (lt && new_score >= cur) {
                    incr_result = Some(None);
                    break;
                }
            }
            zset.add(member, new_score);
            incr_result = Some(Some(new_score));
            break;
        }

        match existing {
            None => {
                if xx {
                    continue;
                }
                zset.add(member, score);
                added += 1;
                changed += 1;
            }
            Some(cur) => {
                if nx {
                    continue;
                }
                if (gt && score <= cur) || (lt && score >= cur) {
                    continue;
                }
                if score != cur {
                    zset.add(member, score);
                    changed += 1;
                }
            }
        }
    }

    let emptied = ctx.guards.get(&key).and_then(|e| e.value.as_sorted_set()).map(|z| z.is_empty()).unwrap_or(false);
    if emptied {
        if let Some(removed) = ctx.guards.remove(&key) {
            handles.store.memory.record_remove(entry_size(&key, &removed));
        }
    } else {
        let new_size = entry_size(&key, ctx.guards.get(&key).expect("still present"));
        match old_size {
            Some(old) => handles.store.memory.record_delta(old, new_size),
            None => handles.store.memory.record_insert(new_size),
        }
    }

    if let Some(result) = incr_result {
        return Ok(match result {
            Some(score) => reply_score(score),
            None => Reply::nil(),
        });
    }
    Ok(Reply::Integer(if ch { changed } else { added }))
}

fn zrem(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 3, "zrem")?;
    let key = argv[1].clone();
    let Some(entry) = ctx.guards.get_mut(&key) else {
        return Ok(Reply::Integer(0));
    };
    let zset = entry.value.as_sorted_set_mut().ok_or(EngineError::WrongType)?;
    let mut removed = 0i64;
    for member in &argv[2..] {
        if zset.remove(member) {
            removed += 1;
        }
    }
    let emptied = ctx.guards.get(&key).and_then(|e| e.value.as_sorted_set()).map(|z| z.is_empty()).unwrap_or(false);
    if emptied {
        if let Some(removed_entry) = ctx.guards.remove(&key) {
            handles.store.memory.record_remove(entry_size(&key, &removed_entry));
        }
    }
    Ok(Reply::Integer(removed))
}

fn zscore(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 3, "zscore")?;
    let Some(entry) = ctx.guards.get(&argv[1]) else {
        return Ok(Reply::nil());
    };
    let zset = entry.value.as_sorted_set().ok_or(EngineError::WrongType)?;
    Ok(match zset.score(&argv[2]) {
        Some(s) => reply_score(s),
        None => Reply::nil(),
    })
}

fn zcard(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "zcard")?;
    match ctx.guards.get(&argv[1]) {
        Some(entry) => {
            let zset = entry.value.as_sorted_set().ok_or(EngineError::WrongType)?;
            Ok(Reply::Integer(zset.len() as i64))
        }
        None => Ok(Reply::Integer(0)),
    }
}

fn zrank(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles, reverse: bool) -> EngineResult<Reply> {
    require_arity(argv, 3, "zrank")?;
    let Some(entry) = ctx.guards.get(&argv[1]) else {
        return Ok(Reply::nil());
    };
    let zset = entry.value.as_sorted_set().ok_or(EngineError::WrongType)?;
    let rank = if reverse { zset.rev_rank(&argv[2]) } else { zset.rank(&argv[2]) };
    Ok(match rank {
        Some(r) => Reply::Integer(r as i64),
        None => Reply::nil(),
    })
}

fn zincrby(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 4, "zincrby")?;
    let key = argv[1].clone();
    let delta = parse_f64(&argv[2])?;
    let member = argv[3].to_vec();
    let (zset, old_size) = zset_mut(ctx, handles, &key)?;
    let new_score = zset.incr_by(member, delta);
    let new_size = entry_size(&key, ctx.guards.get(&key).expect("just written"));
    match old_size {
        Some(old) => handles.store.memory.record_delta(old, new_size),
        None => handles.store.memory.record_insert(new_size),
    }
    Ok(reply_score(new_score))
}

fn zrange(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 4, "zrange")?;
    let mut by_score = false;
    let mut by_lex = false;
    let mut rev = false;
    let mut with_scores = false;
    let mut limit: Option<(i64, i64)> = None;
    let mut i = 4;
    while i < argv.len() {
        match upper(&argv[i]).as_str() {
            "BYSCORE" => { by_score = true; i += 1; }
            "BYLEX" => { by_lex = true; i += 1; }
            "REV" => { rev = true; i += 1; }
            "WITHSCORES" => { with_scores = true; i += 1; }
            "LIMIT" => {
                if i + 2 >= argv.len() {
                    return Err(EngineError::SyntaxError);
                }
                limit = Some((parse_i64(&argv[i + 1])?, parse_i64(&argv[i + 2])?));
                i += 3;
            }
            _ => return Err(EngineError::SyntaxError),
        }
    }

    let Some(entry) = ctx.guards.get(&argv[1]) else {
        return Ok(Reply::Array(Some(vec![])));
    };
    let zset = entry.value.as_sorted_set().ok_or(EngineError::WrongType)?;

    let mut results: Vec<(Vec<u8>, f64)> = if by_score {
        let (min_arg, max_arg) = if rev { (&argv[3], &argv[2]) } else { (&argv[2], &argv[3]) };
        let (min, min_incl) = parse_score_bound(min_arg)?;
        let (max, max_incl) = parse_score_bound(max_arg)?;
        let mut items: Vec<_> = zset
            .range_by_score(min, max)
            .into_iter()
            .filter(|(_, s)| (min_incl || *s != min) && (max_incl || *s != max))
            .map(|(m, s)| (m.to_vec(), s))
            .collect();
        if rev {
            items.reverse();
        }
        items
    } else if by_lex {
        let (min_arg, max_arg) = if rev { (&argv[3], &argv[2]) } else { (&argv[2], &argv[3]) };
        let (min, min_incl) = parse_lex_bound(min_arg)?;
        let (max, max_incl) = parse_lex_bound(max_arg)?;
        let mut items: Vec<_> = zset
            .range_by_lex(&min, min_incl, &max, max_incl)
            .into_iter()
            .map(|(m, s)| (m.to_vec(), s))
            .collect();
        if rev {
            items.reverse();
        }
        items
    } else {
        let start = parse_i64(&argv[2])?;
        let stop = parse_i64(&argv[3])?;
        if rev {
            zset.rev_range(start, stop).into_iter().map(|(m, s)| (m.to_vec(), s)).collect()
        } else {
            zset.range(start, stop).into_iter().map(|(m, s)| (m.to_vec(), s)).collect()
        }
    };

    if let Some((offset, count)) = limit {
        let offset = offset.max(0) as usize;
        results = results.into_iter().skip(offset).collect();
        if count >= 0 {
            results.truncate(count as usize);
        }
    }

    Ok(build_member_reply(results, with_scores))
}

fn build_member_reply(items: Vec<(Vec<u8>, f64)>, with_scores: bool) -> Reply {
    let mut out = Vec::new();
    for (member, score) in items {
        out.push(Reply::Bulk(Some(Bytes::from(member))));
        if with_scores {
            out.push(reply_score(score));
        }
    }
    Reply::Array(Some(out))
}

fn zrangebyscore(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles, reverse: bool) -> EngineResult<Reply> {
    require_arity(argv, 4, "zrangebyscore")?;
    let (min_arg, max_arg) = if reverse { (&argv[3], &argv[2]) } else { (&argv[2], &argv[3]) };
    let (min, min_incl) = parse_score_bound(min_arg)?;
    let (max, max_incl) = parse_score_bound(max_arg)?;

    let mut with_scores = false;
    let mut limit: Option<(i64, i64)> = None;
    let mut i = 4;
    while i < argv.len() {
        match upper(&argv[i]).as_str() {
            "WITHSCORES" => { with_scores = true; i += 1; }
            "LIMIT" => {
                if i + 2 >= argv.len() {
                    return Err(EngineError::SyntaxError);
                }
                limit = Some((parse_i64(&argv[i + 1])?, parse_i64(&argv[i + 2])?));
                i += 3;
            }
            _ => return Err(EngineError::SyntaxError),
        }
    }

    let Some(entry) = ctx.guards.get(&argv[1]) else {
        return Ok(Reply::Array(Some(vec![])));
    };
    let zset = entry.value.as_sorted_set().ok_or(EngineError::WrongType)?;
    let mut items: Vec<_> = zset
        .range_by_score(min, max)
        .into_iter()
        .filter(|(_, s)| (min_incl || *s != min) && (max_incl || *s != max))
        .map(|(m, s)| (m.to_vec(), s))
        .collect();
    if reverse {
        items.reverse();
    }

    if let Some((offset, count)) = limit {
        let offset = offset.max(0) as usize;
        items = items.into_iter().skip(offset).collect();
        if count >= 0 {
            items.truncate(count as usize);
        }
    }

    Ok(build_member_reply(items, with_scores))
}

fn zrangebylex(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 4, "zrangebylex")?;
    let (min, min_incl) = parse_lex_bound(&argv[2])?;
    let (max, max_incl) = parse_lex_bound(&argv[3])?;

    let mut limit: Option<(i64, i64)> = None;
    let mut i = 4;
    while i < argv.len() {
        match upper(&argv[i]).as_str() {
            "LIMIT" => {
                if i + 2 >= argv.len() {
                    return Err(EngineError::SyntaxError);
                }
                limit = Some((parse_i64(&argv[i + 1])?, parse_i64(&argv[i + 2])?));
                i += 3;
            }
            _ => return Err(EngineError::SyntaxError),
        }
    }

    let Some(entry) = ctx.guards.get(&argv[1]) else {
        return Ok(Reply::Array(Some(vec![])));
    };
    let zset = entry.value.as_sorted_set().ok_or(EngineError::WrongType)?;
    let mut items: Vec<_> = zset.range_by_lex(&min, min_incl, &max, max_incl).into_iter().map(|(m, s)| (m.to_vec(), s)).collect();

    if let Some((offset, count)) = limit {
        let offset = offset.max(0) as usize;
        items = items.into_iter().skip(offset).collect();
        if count >= 0 {
            items.truncate(count as usize);
        }
    }

    Ok(build_member_reply(items, false))
}

fn zpop(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles, min: bool) -> EngineResult<Reply> {
    require_arity(argv, 2, "zpopmin")?;
    let key = argv[1].clone();
    let count = match argv.get(2) {
        Some(c) => parse_i64(c)?.max(0) as usize,
        None => 1,
    };
    let Some(entry) = ctx.guards.get_mut(&key) else {
        return Ok(Reply::Array(Some(vec![])));
    };
    let zset = entry.value.as_sorted_set_mut().ok_or(EngineError::WrongType)?;
    let mut popped = Vec::new();
    for _ in 0..count {
        let item = if min { zset.pop_min() } else { zset.pop_max() };
        match item {
            Some(pair) => popped.push(pair),
            None => break,
        }
    }
    let emptied = ctx.guards.get(&key).and_then(|e| e.value.as_sorted_set()).map(|z| z.is_empty()).unwrap_or(false);
    if emptied {
        if let Some(removed) = ctx.guards.remove(&key) {
            handles.store.memory.record_remove(entry_size(&key, &removed));
        }
    }
    Ok(build_member_reply(popped, true))
}

fn zrandmember(ctx: &mut CommandContext, argv: &[Bytes], _handles: &EngineHandles) -> EngineResult<Reply> {
    require_arity(argv, 2, "zrandmember")?;
    let Some(entry) = ctx.guards.get(&argv[1]) else {
        return Ok(if argv.len() > 2 { Reply::Array(Some(vec![])) } else { Reply::nil() });
    };
    let zset = entry.value.as_sorted_set().ok_or(EngineError::WrongType)?;
    let all: Vec<(Vec<u8>, f64)> = zset.iter().map(|(m, s)| (m.to_vec(), s)).collect();
    if all.is_empty() {
        return Ok(if argv.len() > 2 { Reply::Array(Some(vec![])) } else { Reply::nil() });
    }

    use rand::seq::SliceRandom;
    let mut rng = rand::thread_rng();

    match argv.get(2) {
        None => {
            let (member, _) = all.choose(&mut rng).expect("non-empty checked above");
            Ok(Reply::Bulk(Some(Bytes::from(member.clone()))))
        }
        Some(count_arg) => {
            let with_scores = argv.get(3).map(|a| a.eq_ignore_ascii_case(b"WITHSCORES")).unwrap_or(false);
            let count = parse_i64(count_arg)?;
            let chosen: Vec<(Vec<u8>, f64)> = if count >= 0 {
                all.choose_multiple(&mut rng, (count as usize).min(all.len())).cloned().collect()
            } else {
                (0..(-count) as usize).filter_map(|_| all.choose(&mut rng).cloned()).collect()
            };
            Ok(build_member_reply(chosen, with_scores))
        }
    }
}

enum ZSetOp {
    Union,
    Inter,
    Diff,
}

enum Aggregate {
    Sum,
    Min,
    Max,
}

fn zset_read_key_spec(argv: &[Bytes]) -> KeySpec {
    let Some(numkeys) = argv.get(1).and_then(|a| parse_i64(a).ok()) else {
        return KeySpec::none();
    };
    let n = numkeys.max(0) as usize;
    KeySpec::read(argv.iter().skip(2).take(n).cloned())
}

fn zset_store_key_spec(argv: &[Bytes]) -> KeySpec {
    let Some(numkeys) = argv.get(2).and_then(|a| parse_i64(a).ok()) else {
        return KeySpec::write(argv.get(1).cloned());
    };
    let n = numkeys.max(0) as usize;
    let mut spec = KeySpec::write(argv.get(1).cloned());
    spec.read_keys = argv.iter().skip(3).take(n).cloned().collect();
    spec
}

fn zsetop(ctx: &mut CommandContext, argv: &[Bytes], handles: &EngineHandles, op: ZSetOp, store: bool) -> EngineResult<Reply> {
    let base = if store { 2 } else { 1 };
    require_arity(argv, base + 2, "zunionstore")?;
    let numkeys = parse_i64(&argv[base])? as usize;
    if numkeys == 0 || base + 1 + numkeys > argv.len() {
        return Err(EngineError::SyntaxError);
    }
    let keys = &argv[base + 1..base + 1 + numkeys];

    let mut weights = vec![1.0; numkeys];
    let mut aggregate = Aggregate::Sum;
    let mut with_scores = false;
    let mut i = base + 1 + numkeys;
    while i < argv.len() {
        match upper(&argv[i]).as_str() {
            "WEIGHTS" => {
                if i + numkeys >= argv.len() {
                    return Err(EngineError::SyntaxError);
                }
                for (slot, w) in weights.iter_mut().zip(&argv[i + 1..i + 1 + numkeys]) {
                    *slot = parse_f64(w)?;
                }
                i += 1 + numkeys;
            }
            "AGGREGATE" => {
                if i + 1 >= argv.len() {
                    return Err(EngineError::SyntaxError);
                }
                aggregate = match upper(&argv[i + 1]).as_str() {
                    "SUM" => Aggregate::Sum,
                    "MIN" => Aggregate::Min,
                    "MAX" => Aggregate::Max,
                    _ => return Err(EngineError::SyntaxError),
                };
                i += 2;
            }
            "WITHSCORES" => { with_scores = true; i += 1; }
            _ => return Err(EngineError::SyntaxError),
        }
    }

    let mut members: Vec<std::collections::HashMap<Vec<u8>, f64>> = Vec::with_capacity(numkeys);
    for key in keys {
        let map = match ctx.guards.get(key) {
            Some(entry) => {
                let zset = entry.value.as_sorted_set().ok_or(EngineError::WrongType)?;
                zset.iter().map(|(m, s)| (m.to_vec(), s)).collect()
            }
            None => std::collections::HashMap::new(),
        };
        members.push(map);
    }

    let mut combined: std::collections::HashMap<Vec<u8>, f64> = std::collections::HashMap::new();
    match op {
        ZSetOp::Union => {
            for (map, weight) in members.iter().zip(&weights) {
                for (member, score) in map {
                    let weighted = score * weight;
                    combined
                        .entry(member.clone())
                        .and_modify(|s| *s = aggregate_scores(&aggregate, *s, weighted))
                        .or_insert(weighted);
                }
            }
        }
        ZSetOp::Inter => {
            if let Some((first, rest)) = members.split_first() {
                'outer: for (member, score) in first {
                    let mut acc = score * weights[0];
                    for (map, weight) in rest.iter().zip(&weights[1..]) {
                        match map.get(member) {
                            Some(s) => acc = aggregate_scores(&aggregate, acc, s * weight),
                            None => continue 'outer,
                        }
                    }
                    combined.insert(member.clone(), acc);
                }
            }
        }
        ZSetOp::Diff => {
            if let Some((first, rest)) = members.split_first() {
                for (member, score) in first {
                    if rest.iter().all(|map| !map.contains_key(member)) {
                        combined.insert(member.clone(), *score);
                    }
                }
            }
        }
    }

    if store {
        let dst = argv[1].clone();
        let old_size = ctx.guards.get(&dst).map(|e| entry_size(&dst, e));
        if combined.is_empty() {
            if let Some(old) = ctx.guards.remove(&dst) {
                handles.store.memory.record_remove(entry_size(&dst, &old));
            }
            return Ok(Reply::Integer(0));
        }
        let mut zset = SortedSetValue::new();
        for (member, score) in &combined {
            zset.add(member.clone(), *score);
        }
        let count = zset.len() as i64;
        let policy = handles.store.db(ctx.db_index).eviction_policy();
        let entry = KeyEntry::new(Value::SortedSet(zset), policy, ctx.now_millis);
        let new_size = entry_size(&dst, &entry);
        ctx.guards.insert(dst, entry);
        match old_size {
            Some(old) => handles.store.memory.record_delta(old, new_size),
            None => handles.store.memory.record_insert(new_size),
        }
        Ok(Reply::Integer(count))
    } else {
        let mut items: Vec<(Vec<u8>, f64)> = combined.into_iter().collect();
        items.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then_with(|| a.0.cmp(&b.0)));
        Ok(build_member_reply(items, with_scores))
    }
}

fn aggregate_scores(agg: &Aggregate, a: f64, b: f64) -> f64 {
    match agg {
        Aggregate::Sum => a + b,
        Aggregate::Min => a.min(b),
        Aggregate::Max => a.max(b),
    }
}
