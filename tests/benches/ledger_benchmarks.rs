//! # Ledger Benchmarks
//!
//! - Decode + sender recovery of one signed transfer
//! - Admission of a batch from distinct senders followed by one settlement tick
//!
//! Run with `cargo bench -p lc-tests`.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use lc_03_transaction_codec::TransactionCodec;
use lc_tests::fixtures::{LedgerHarness, Wallet};
use shared_types::{Address, DEFAULT_CHAIN_ID};

const SINK: Address = [0x5E; 20];

fn bench_decode_and_recover(c: &mut Criterion) {
    let wallet = Wallet::random();
    let raw = wallet.transfer(SINK, "1", 0).unwrap();
    let codec = TransactionCodec::new(DEFAULT_CHAIN_ID);

    c.bench_function("codec/decode_and_recover", |b| {
        b.iter(|| codec.decode_hex_and_recover(black_box(&raw)).unwrap())
    });
}

fn bench_admit_and_settle(c: &mut Criterion) {
    let mut group = c.benchmark_group("settlement/admit_and_settle");
    for size in [10usize, 100, 500] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let h = LedgerHarness::in_memory().unwrap();
                    let raws: Vec<String> = (0..size)
                        .map(|_| {
                            let wallet = Wallet::random();
                            h.fund(&wallet.address(), "10").unwrap();
                            wallet.transfer(SINK, "1", 0).unwrap()
                        })
                        .collect();
                    (h, raws)
                },
                |(h, raws)| {
                    for raw in &raws {
                        h.ledger.submit_raw_transaction(raw).unwrap();
                    }
                    black_box(h.ledger.settle().unwrap())
                },
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_decode_and_recover, bench_admit_and_settle);
criterion_main!(benches);
