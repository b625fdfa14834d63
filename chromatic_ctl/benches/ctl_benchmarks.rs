//! Throughput benchmarks for the codec, filter, coupling and fiber stages
//!
//! Run with: cargo bench --bench ctl_benchmarks

use chromatic_ctl::config::FiberConfig;
use chromatic_ctl::{
    process_coupling_sequence, ChromaticCell, Codec, CouplingConfig, FilterConfig,
    InterpretiveFilter, MemoryConfig, MultiFiberAssembly, PipelineConfig,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const SENTENCE: &str = "It wasn't the WORST idea, but nobody expected it to work at all! ";

fn corpus(repeats: usize) -> String {
    SENTENCE.repeat(repeats)
}

fn observation(repeats: usize) -> Vec<ChromaticCell> {
    Codec::default().encode(&corpus(repeats)).unwrap()
}

/// Benchmark text encoding and decoding at different lengths
fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    let codec = Codec::default();

    for repeats in [1, 16, 128].iter() {
        let text = corpus(*repeats);
        let cells = codec.encode(&text).unwrap();

        group.bench_with_input(BenchmarkId::new("encode", repeats), &text, |b, text| {
            b.iter(|| black_box(codec.encode(text).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("decode", repeats), &cells, |b, cells| {
            b.iter(|| black_box(codec.decode(cells)));
        });
    }

    group.finish();
}

/// Benchmark the interpretive filter with and without memory integration
fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter");
    let default_filter = InterpretiveFilter::default();
    let mut no_memory = FilterConfig::default();
    no_memory.memory_integration.enabled = false;
    let memoryless_filter = InterpretiveFilter::new(no_memory, MemoryConfig::default());

    for repeats in [1, 16, 128].iter() {
        let l = observation(*repeats);
        group.bench_with_input(BenchmarkId::new("with_memory", repeats), &l, |b, l| {
            b.iter(|| black_box(default_filter.run(l).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("without_memory", repeats), &l, |b, l| {
            b.iter(|| black_box(memoryless_filter.run(l).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark full coupling snapshots over filtered streams
fn bench_coupling(c: &mut Criterion) {
    let config = CouplingConfig::default();
    let l = observation(64);
    let r = InterpretiveFilter::default().run(&l).unwrap().cells;

    c.bench_function("coupling_snapshot", |b| {
        b.iter(|| black_box(process_coupling_sequence(&l, &r, &config).unwrap()));
    });
}

/// Benchmark parallel fiber assembly as the fiber count grows
fn bench_fibers(c: &mut Criterion) {
    let mut group = c.benchmark_group("fiber_assembly");
    let l = observation(32);

    for count in [1, 4, 8].iter() {
        let mut config = PipelineConfig::default();
        config.fibers = (0..*count)
            .map(|idx| {
                let mut filter = FilterConfig::default();
                filter.smoothing.lambda = 0.3 + 0.05 * idx as f64;
                FiberConfig::new(format!("fiber_{idx}"), filter, MemoryConfig::default())
            })
            .collect();
        let assembly = MultiFiberAssembly::from_config(&config).unwrap();

        group.bench_with_input(BenchmarkId::new("run_full", count), &l, |b, l| {
            b.iter(|| black_box(assembly.run_full(l).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_codec, bench_filter, bench_coupling, bench_fibers);

criterion_main!(benches);
