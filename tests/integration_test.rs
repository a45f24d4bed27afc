use bytes::Bytes;
use sugardb::clock::ManualClock;
use sugardb::config::EngineConfigBuilder;
use sugardb::engine::Engine;
use sugardb::eviction::EvictionPolicy;
use sugardb::reply::Reply;

fn argv(parts: &[&str]) -> Vec<Bytes> {
    parts.iter().map(|p| Bytes::from(p.to_string())).collect()
}

fn engine_with_clock() -> (std::sync::Arc<Engine>, std::sync::Arc<ManualClock>) {
    let clock = ManualClock::new(1_000_000);
    let engine = Engine::with_clock(EngineConfigBuilder::new().databases(4).build(), clock.clone());
    (engine, clock)
}

#[tokio::test]
async fn set_with_ttl_expires_after_the_deadline() {
    let (engine, clock) = engine_with_clock();
    engine.dispatch(0, &argv(&["SET", "k", "v", "EX", "10"]));
    assert_eq!(engine.dispatch(0, &argv(&["TTL", "k"])), Reply::Integer(10));

    clock.advance_millis(11_000);
    assert_eq!(engine.dispatch(0, &argv(&["GET", "k"])), Reply::nil());
    assert_eq!(engine.dispatch(0, &argv(&["TTL", "k"])), Reply::Integer(-2));
}

#[tokio::test]
async fn mset_and_mget_round_trip_with_missing_keys() {
    let (engine, _clock) = engine_with_clock();
    engine.dispatch(0, &argv(&["MSET", "a", "1", "b", "2", "c", "3"]));
    let reply = engine.dispatch(0, &argv(&["MGET", "a", "c", "b", "nope", "a"]));
    assert_eq!(
        reply,
        Reply::Array(Some(vec![
            Reply::Bulk(Some(Bytes::from_static(b"1"))),
            Reply::Bulk(Some(Bytes::from_static(b"3"))),
            Reply::Bulk(Some(Bytes::from_static(b"2"))),
            Reply::Bulk(None),
            Reply::Bulk(Some(Bytes::from_static(b"1"))),
        ]))
    );
}

#[tokio::test]
async fn list_push_range_and_removal() {
    let (engine, _clock) = engine_with_clock();
    engine.dispatch(0, &argv(&["LPUSH", "L", "x", "y", "z"]));
    let reply = engine.dispatch(0, &argv(&["LRANGE", "L", "0", "-1"]));
    assert_eq!(
        reply,
        Reply::Array(Some(vec![
            Reply::Bulk(Some(Bytes::from_static(b"z"))),
            Reply::Bulk(Some(Bytes::from_static(b"y"))),
            Reply::Bulk(Some(Bytes::from_static(b"x"))),
        ]))
    );

    engine.dispatch(0, &argv(&["LREM", "L", "-1", "y"]));
    let reply = engine.dispatch(0, &argv(&["LRANGE", "L", "0", "-1"]));
    assert_eq!(
        reply,
        Reply::Array(Some(vec![
            Reply::Bulk(Some(Bytes::from_static(b"z"))),
            Reply::Bulk(Some(Bytes::from_static(b"x"))),
        ]))
    );
}

#[tokio::test]
async fn hash_field_ttl_reports_persistent_and_missing_fields() {
    let (engine, _clock) = engine_with_clock();
    engine.dispatch(0, &argv(&["HSET", "h", "f1", "v1", "f2", "v2"]));
    engine.dispatch(0, &argv(&["HEXPIRE", "h", "100", "f1"]));
    let reply = engine.dispatch(0, &argv(&["HTTL", "h", "f1", "f2", "f3"]));
    assert_eq!(reply, Reply::Array(Some(vec![Reply::Integer(100), Reply::Integer(-1), Reply::Integer(-2)])));
}

#[tokio::test]
async fn expireat_modifiers_follow_the_frozen_nx_xx_gt_lt_rules() {
    let (engine, _clock) = engine_with_clock();
    engine.dispatch(0, &argv(&["SET", "k", "v"]));

    let ts = 2_147_483_647i64;
    assert_eq!(engine.dispatch(0, &argv(&["EXPIREAT", "k", &ts.to_string(), "NX"])), Reply::Integer(1));
    assert_eq!(engine.dispatch(0, &argv(&["EXPIREAT", "k", &ts.to_string(), "NX"])), Reply::Integer(0));
    assert_eq!(engine.dispatch(0, &argv(&["EXPIREAT", "k", &(ts + 1).to_string(), "XX", "GT"])), Reply::Integer(1));
    assert_eq!(engine.dispatch(0, &argv(&["EXPIREAT", "k", &(ts - 1).to_string(), "LT"])), Reply::Integer(1));
    assert_eq!(engine.dispatch(0, &argv(&["EXPIREAT", "k", &(ts + 10).to_string(), "LT"])), Reply::Integer(0));
}

#[tokio::test]
async fn expire_lt_succeeds_against_a_persistent_key() {
    let (engine, _clock) = engine_with_clock();
    engine.dispatch(0, &argv(&["SET", "k", "v"]));
    assert_eq!(engine.dispatch(0, &argv(&["EXPIRE", "k", "100", "LT"])), Reply::Integer(1));
}

#[tokio::test]
async fn incr_and_decr_are_inverses() {
    let (engine, _clock) = engine_with_clock();
    engine.dispatch(0, &argv(&["SET", "counter", "10"]));
    engine.dispatch(0, &argv(&["INCRBY", "counter", "5"]));
    engine.dispatch(0, &argv(&["DECRBY", "counter", "5"]));
    assert_eq!(engine.dispatch(0, &argv(&["GET", "counter"])), Reply::Bulk(Some(Bytes::from_static(b"10"))));
}

#[tokio::test]
async fn rename_preserves_value_and_ttl() {
    let (engine, _clock) = engine_with_clock();
    engine.dispatch(0, &argv(&["SET", "old", "v", "EX", "50"]));
    engine.dispatch(0, &argv(&["RENAME", "old", "new"]));
    assert_eq!(engine.dispatch(0, &argv(&["GET", "new"])), Reply::Bulk(Some(Bytes::from_static(b"v"))));
    assert_eq!(engine.dispatch(0, &argv(&["TTL", "new"])), Reply::Integer(50));
    assert_eq!(engine.dispatch(0, &argv(&["EXISTS", "old"])), Reply::Integer(0));
}

#[tokio::test]
async fn sorted_set_orders_by_score_then_member() {
    let (engine, _clock) = engine_with_clock();
    engine.dispatch(0, &argv(&["ZADD", "z", "1", "b", "1", "a", "2", "c"]));
    let reply = engine.dispatch(0, &argv(&["ZRANGE", "z", "0", "-1"]));
    assert_eq!(
        reply,
        Reply::Array(Some(vec![
            Reply::Bulk(Some(Bytes::from_static(b"a"))),
            Reply::Bulk(Some(Bytes::from_static(b"b"))),
            Reply::Bulk(Some(Bytes::from_static(b"c"))),
        ]))
    );
}

#[tokio::test]
async fn publish_delivers_to_channel_and_pattern_subscribers() {
    let (engine, _clock) = engine_with_clock();
    let (id, mut rx, _dropped) = engine.pubsub().new_subscriber();
    engine.pubsub().subscribe(id, Bytes::from_static(b"news"));

    let (pid, mut prx, _) = engine.pubsub().new_subscriber();
    engine.pubsub().psubscribe(pid, Bytes::from_static(b"n*"));

    let reply = engine.dispatch(0, &argv(&["PUBLISH", "news", "hello"]));
    assert_eq!(reply, Reply::Integer(2));
    assert!(rx.try_recv().is_ok());
    assert!(prx.try_recv().is_ok());
}

#[tokio::test]
async fn memory_budget_is_respected_after_repeated_writes_beyond_capacity() {
    let clock = ManualClock::new(1_000_000);
    let config = EngineConfigBuilder::new()
        .databases(1)
        .eviction_policy(EvictionPolicy::AllKeysLru)
        .max_memory(4_096)
        .build();
    let engine = Engine::with_clock(config, clock);

    for i in 0..200 {
        engine.dispatch(0, &argv(&["SET", &format!("k{i}"), "x"]));
        if i == 50 {
            engine.dispatch(0, &argv(&["GET", "k50"]));
        }
    }

    assert!(!engine.store().memory.over_budget());
    assert!(engine.store().db(0).dbsize() < 200);
}

#[tokio::test]
async fn move_transfers_a_key_between_databases() {
    let (engine, _clock) = engine_with_clock();
    engine.dispatch(0, &argv(&["SET", "k", "v"]));
    assert_eq!(engine.dispatch(0, &argv(&["MOVE", "k", "1"])), Reply::Integer(1));
    assert_eq!(engine.dispatch(0, &argv(&["EXISTS", "k"])), Reply::Integer(0));
    assert_eq!(engine.dispatch(1, &argv(&["GET", "k"])), Reply::Bulk(Some(Bytes::from_static(b"v"))));
}
