use bytes::Bytes;
use std::time::Instant;
use sugardb::config::EngineConfigBuilder;
use sugardb::engine::Engine;

fn argv(parts: &[&str]) -> Vec<Bytes> {
    parts.iter().map(|p| Bytes::from(p.to_string())).collect()
}

fn bench_set_get(engine: &Engine, iterations: usize) -> (f64, f64) {
    let start = Instant::now();
    for i in 0..iterations {
        engine.dispatch(0, &argv(&["SET", &format!("bench_key_{i}"), &format!("value_{i}")]));
    }
    let set_ops = iterations as f64 / start.elapsed().as_secs_f64();

    let start = Instant::now();
    for i in 0..iterations {
        engine.dispatch(0, &argv(&["GET", &format!("bench_key_{i}")]));
    }
    let get_ops = iterations as f64 / start.elapsed().as_secs_f64();

    (set_ops, get_ops)
}

fn bench_incr(engine: &Engine, iterations: usize) -> f64 {
    engine.dispatch(0, &argv(&["SET", "bench_counter", "0"]));
    let start = Instant::now();
    for _ in 0..iterations {
        engine.dispatch(0, &argv(&["INCR", "bench_counter"]));
    }
    iterations as f64 / start.elapsed().as_secs_f64()
}

fn bench_lpush_lpop(engine: &Engine, iterations: usize) -> (f64, f64) {
    let start = Instant::now();
    for i in 0..iterations {
        engine.dispatch(0, &argv(&["LPUSH", "bench_list", &format!("item_{i}")]));
    }
    let push_ops = iterations as f64 / start.elapsed().as_secs_f64();

    let start = Instant::now();
    for _ in 0..iterations {
        engine.dispatch(0, &argv(&["LPOP", "bench_list"]));
    }
    let pop_ops = iterations as f64 / start.elapsed().as_secs_f64();

    (push_ops, pop_ops)
}

fn bench_hset_hget(engine: &Engine, iterations: usize) -> (f64, f64) {
    let start = Instant::now();
    for i in 0..iterations {
        engine.dispatch(0, &argv(&["HSET", "bench_hash", &format!("field_{i}"), &format!("value_{i}")]));
    }
    let hset_ops = iterations as f64 / start.elapsed().as_secs_f64();

    let start = Instant::now();
    for i in 0..iterations {
        engine.dispatch(0, &argv(&["HGET", "bench_hash", &format!("field_{i}")]));
    }
    let hget_ops = iterations as f64 / start.elapsed().as_secs_f64();

    (hset_ops, hget_ops)
}

fn bench_sadd(engine: &Engine, iterations: usize) -> f64 {
    let start = Instant::now();
    for i in 0..iterations {
        engine.dispatch(0, &argv(&["SADD", "bench_set", &format!("member_{i}")]));
    }
    iterations as f64 / start.elapsed().as_secs_f64()
}

fn bench_zadd(engine: &Engine, iterations: usize) -> f64 {
    let start = Instant::now();
    for i in 0..iterations {
        engine.dispatch(0, &argv(&["ZADD", "bench_zset", &i.to_string(), &format!("member_{i}")]));
    }
    iterations as f64 / start.elapsed().as_secs_f64()
}

#[tokio::main]
async fn main() {
    let config = EngineConfigBuilder::new().databases(1).build();
    let engine = Engine::new(config);
    let iterations = 10_000;

    println!("=== SugarDB core engine benchmark ({iterations} operations) ===\n");

    let (set_ops, get_ops) = bench_set_get(&engine, iterations);
    println!("SET:    {set_ops:>10.0} ops/sec");
    println!("GET:    {get_ops:>10.0} ops/sec");

    let incr_ops = bench_incr(&engine, iterations);
    println!("INCR:   {incr_ops:>10.0} ops/sec");

    let (push_ops, pop_ops) = bench_lpush_lpop(&engine, iterations);
    println!("LPUSH:  {push_ops:>10.0} ops/sec");
    println!("LPOP:   {pop_ops:>10.0} ops/sec");

    let (hset_ops, hget_ops) = bench_hset_hget(&engine, iterations);
    println!("HSET:   {hset_ops:>10.0} ops/sec");
    println!("HGET:   {hget_ops:>10.0} ops/sec");

    let sadd_ops = bench_sadd(&engine, iterations);
    println!("SADD:   {sadd_ops:>10.0} ops/sec");

    let zadd_ops = bench_zadd(&engine, iterations);
    println!("ZADD:   {zadd_ops:>10.0} ops/sec");

    println!("\n=== Done ===");
}
