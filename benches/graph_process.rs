use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use launchcore::{Counters, EngineConfig, Graph, StateSnapshot};

fn build_graph(tracks: usize, fx_slots: usize, max_block: usize) -> (Graph, EngineConfig) {
    let config = EngineConfig {
        track_count: tracks,
        scene_count: 4,
        max_fx_slots: fx_slots,
        max_block,
        ..EngineConfig::default()
    };
    let graph = Graph::build(&config).unwrap();
    (graph, config)
}

fn bench_process_no_plugins(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph process (silent, no plugins)");
    for &tracks in &[4usize, 8, 16] {
        let (mut graph, config) = build_graph(tracks, 2, 128);
        let snapshot = StateSnapshot::new(&config);
        let counters = Counters::new();
        group.bench_with_input(BenchmarkId::from_parameter(tracks), &tracks, |b, _| {
            b.iter(|| {
                graph.process(black_box(&snapshot), black_box(128), black_box(0), &counters);
            })
        });
    }
    group.finish();
}

fn bench_process_block_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph process (block size)");
    for &block in &[32usize, 64, 128, 256] {
        let (mut graph, config) = build_graph(8, 2, block);
        let snapshot = StateSnapshot::new(&config);
        let counters = Counters::new();
        group.bench_with_input(BenchmarkId::from_parameter(block), &block, |b, &block| {
            b.iter(|| {
                graph.process(black_box(&snapshot), black_box(block), black_box(0), &counters);
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_process_no_plugins, bench_process_block_sizes);
criterion_main!(benches);
