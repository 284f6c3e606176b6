//! Benchmarks for the artifact codecs.
//!
//! Run with: `cargo bench --bench compression` in the core/ directory.
//!
//! Benchmark groups:
//! 1. compress: Each method over chunk dumps of growing size
//! 2. decompress: The reverse direction over the same inputs

use bumpalo::Bump;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use dem_core::{
    api::{Engine, EngineOptions},
    ast::{Node, Operator},
    compression::CompressionMethod,
};
use pprof::criterion::{Output, PProfProfiler};

/// Dump of a chunk with `n` distinct string constants and `n` additions.
fn dump(n: usize) -> Vec<u8> {
    let arena = Bump::new();
    let engine = Engine::new(&arena, EngineOptions::default());
    let mut nodes: Vec<Node> = (0..n)
        .map(|i| Node::let_(&format!("v{i}"), Node::str(&format!("constant number {i}"))))
        .collect();
    let sum = (0..n).fold(Node::int(0), |acc, i| {
        Node::binary(Operator::Add, acc, Node::int((i % 100) as i32))
    });
    nodes.push(sum);
    let chunk = engine
        .compile(&Node::block(nodes))
        .expect("benchmark program compiles");
    chunk.dump()
}

fn bench_compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress");

    for n in [10, 100, 1000] {
        let input = dump(n);
        group.throughput(Throughput::Bytes(input.len() as u64));
        for method in CompressionMethod::ALL {
            let compressor = method.compressor();
            group.bench_with_input(BenchmarkId::new(method.name(), n), &input, |b, input| {
                b.iter(|| black_box(compressor.compress(black_box(input))))
            });
        }
    }

    group.finish();
}

fn bench_decompress(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompress");

    for n in [10, 100, 1000] {
        let input = dump(n);
        group.throughput(Throughput::Bytes(input.len() as u64));
        for method in CompressionMethod::ALL {
            let compressor = method.compressor();
            let packed = compressor.compress(&input).expect("compression succeeds");
            group.bench_with_input(BenchmarkId::new(method.name(), n), &packed, |b, packed| {
                b.iter(|| black_box(compressor.decompress(black_box(packed))))
            });
        }
    }

    group.finish();
}

// Configure Criterion with profiling support
criterion_group! {
    name = benches;
    config = Criterion::default().with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)));
    targets = bench_compress, bench_decompress
}
criterion_main!(benches);
