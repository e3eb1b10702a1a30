//! Throughput Benchmark for QuillKV
//!
//! Measures the hash table, the keyspace and the full request path of a
//! single client (parse, dispatch, reply) without any sockets.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use quillkv::commands::{process_input_buffer, CommandCtx, CommandTable};
use quillkv::connection::{Client, ReadOutcome};
use quillkv::protocol::inline::split_args;
use quillkv::server::ServerStats;
use quillkv::storage::{BytesKey, Db, Dict, Object, Shared};
use std::io::Cursor;

const NOW_MS: i64 = 1_700_000_000_000;

/// Benchmark raw hash table operations
fn bench_dict(c: &mut Criterion) {
    let mut group = c.benchmark_group("dict");
    group.throughput(Throughput::Elements(1));

    group.bench_function("add_with_growth", |b| {
        b.iter(|| {
            let mut d: Dict<Bytes, u64, BytesKey> = Dict::default();
            for i in 0..1024u64 {
                let _ = d.add(Bytes::from(format!("key:{}", i)), i);
            }
            black_box(d.len())
        });
    });

    let mut d: Dict<Bytes, u64, BytesKey> = Dict::default();
    for i in 0..10_000u64 {
        let _ = d.add(Bytes::from(format!("key:{}", i)), i);
    }

    group.bench_function("find_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i % 10_000));
            black_box(d.get(&key));
            i += 1;
        });
    });

    group.bench_function("find_missing", |b| {
        let key = Bytes::from("nonexistent");
        b.iter(|| black_box(d.get(&key)));
    });

    group.finish();
}

/// Benchmark keyspace lookups, including the expiry check
fn bench_db(c: &mut Criterion) {
    let mut db = Db::new(0);
    for i in 0..10_000 {
        db.set(
            Bytes::from(format!("key:{}", i)),
            Object::string(format!("value:{}", i)),
        );
    }
    for i in 0..1_000 {
        db.set_expire(Bytes::from(format!("key:{}", i)), NOW_MS + 60_000);
    }

    let mut group = c.benchmark_group("db");
    group.throughput(Throughput::Elements(1));

    group.bench_function("lookup_read", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i % 10_000));
            black_box(db.lookup_read(&key, NOW_MS));
            i += 1;
        });
    });

    group.bench_function("set_overwrite", |b| {
        let value = Object::string("x".repeat(64));
        let mut i = 0u64;
        b.iter(|| {
            db.set(Bytes::from(format!("key:{}", i % 10_000)), value.clone());
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark inline request splitting
fn bench_split_args(c: &mut Criterion) {
    let line = Bytes::from_static(b"SET  user:1000:session   some-opaque-token-value");

    let mut group = c.benchmark_group("inline");
    group.throughput(Throughput::Bytes(line.len() as u64));
    group.bench_function("split_args", |b| b.iter(|| black_box(split_args(&line))));
    group.finish();
}

/// Benchmark a pipelined batch through dispatch and back out
fn bench_pipeline(c: &mut Criterion) {
    let mut batch = String::new();
    for i in 0..100 {
        batch.push_str(&format!("SET key:{} value:{}\r\n", i, i));
        batch.push_str(&format!("GET key:{}\r\n", i));
    }
    let batch = batch.into_bytes();

    let mut dbs: Vec<Db> = (0..16).map(Db::new).collect();
    let shared = Shared::new();
    let commands = CommandTable::new();
    let mut stats = ServerStats::new(NOW_MS);

    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements(200));

    group.bench_function("100_set_100_get", |b| {
        b.iter(|| {
            let mut client = Client::new(1, NOW_MS);
            let mut src = Cursor::new(batch.as_slice());
            while let Ok(ReadOutcome::Data(_)) = client.read_from(&mut src, NOW_MS) {}

            let mut ctx = CommandCtx {
                dbs: &mut dbs,
                shared: &shared,
                commands: &commands,
                stats: &mut stats,
                now_ms: NOW_MS,
                connected_clients: 1,
                shutdown: false,
            };
            let _ = process_input_buffer(&mut client, &mut ctx);

            let mut out = Vec::with_capacity(4096);
            while client.has_pending_replies() {
                let _ = client.write_to(&mut out, NOW_MS);
            }
            black_box(out.len())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_dict,
    bench_db,
    bench_split_args,
    bench_pipeline,
);

criterion_main!(benches);
