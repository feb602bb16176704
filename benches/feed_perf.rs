//! Performance benchmarks for feed assembly and loading.
//!
//! Run with: `cargo bench --bench feed_perf`

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::sync::Arc;

use dtweet::feed::{FeedAssembler, assemble};
use dtweet::gateway::ContractGateway;
use dtweet::{Account, LocalLedger, Tweet};

const SIZES: &[usize] = &[100, 1_000, 10_000];
const AUTHORS: usize = 50;

fn author(n: usize) -> Account {
    format!("0x{n:040x}")
        .parse()
        .expect("generated address is valid")
}

/// Deterministic records: every seventh deleted, timestamps shuffled.
fn records(count: usize) -> Vec<Tweet> {
    (0..count)
        .map(|i| Tweet {
            id: i as u64 + 1,
            author: author(i % AUTHORS),
            content: format!("tweet number {i} about nothing in particular"),
            timestamp: ((i * 7_919) % 100_003) as u64,
            like_count: (i % 13) as u64,
            deleted: i % 7 == 0,
        })
        .collect()
}

fn bench_assemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble");
    for &size in SIZES {
        let input = records(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| assemble(black_box(input.clone())));
        });
    }
    group.finish();
}

fn bench_load_all(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime");

    let mut group = c.benchmark_group("load_all");
    for &size in &SIZES[..2] {
        let ledger = Arc::new(LocalLedger::new());
        for (i, tweet) in records(size).into_iter().enumerate() {
            ledger.seed_tweet(&tweet.author, &tweet.content, i as u64, tweet.deleted);
        }
        let gateway = ContractGateway::new(ledger);
        let assembler = FeedAssembler::new(gateway.reader());

        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(BenchmarkId::from_parameter(size), |b| {
            b.iter(|| runtime.block_on(assembler.load_all()).expect("feed loads"));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_assemble, bench_load_all);
criterion_main!(benches);
