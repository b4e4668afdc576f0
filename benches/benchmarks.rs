//! Benchmarks for the pagination engine

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use folio::{
    calculate_breaks, Balancer, BalancerState, BlockKey, BlockMeasurer, CapacityModel, EngineConfig, MeasuredBlock, MemoryHost,
    PageConfig, Paginator,
};

fn default_capacity() -> CapacityModel {
    CapacityModel::new(PageConfig::letter()).unwrap()
}

/// Deterministic block heights between 20 and 420px
fn heights(count: usize) -> Vec<f32> {
    (0..count).map(|i| 20.0 + ((i * 37) % 400) as f32).collect()
}

fn measured(count: usize) -> Vec<MeasuredBlock> {
    heights(count)
        .into_iter()
        .enumerate()
        .map(|(i, h)| MeasuredBlock::new(BlockKey(i as u64), h, i % 17 == 0))
        .collect()
}

fn bench_breaks_small(c: &mut Criterion) {
    c.bench_function("calculate_breaks_100_blocks", |b| {
        let blocks = measured(100);
        let capacity = default_capacity();
        b.iter(|| {
            black_box(calculate_breaks(black_box(&blocks), &capacity));
        });
    });
}

fn bench_breaks_large(c: &mut Criterion) {
    c.bench_function("calculate_breaks_10k_blocks", |b| {
        let blocks = measured(10_000);
        let capacity = default_capacity();
        b.iter(|| {
            black_box(calculate_breaks(black_box(&blocks), &capacity));
        });
    });
}

fn bench_balancer_pass(c: &mut Criterion) {
    c.bench_function("balancer_single_edit", |b| {
        let count = 2_000;
        let mut paginator = Paginator::new(MemoryHost::with_heights(&heights(count)), EngineConfig::default());
        paginator.paginate_now(0);

        let pages = paginator.pages().assignment();
        let capacity = default_capacity();
        let balancer = Balancer::default();

        // A block on the first page grows to 600px
        let mut grown = BlockMeasurer::new();
        grown.measure_all(paginator.host(), &paginator.host().block_order()).unwrap();
        paginator.host_mut().set_height(BlockKey(1), 600.0);
        grown.invalidate(BlockKey(1));
        grown.measure(paginator.host(), BlockKey(1)).unwrap();

        b.iter(|| {
            let result = balancer.run(pages.clone(), &grown, &capacity, BalancerState::new(), 0);
            black_box(result.moves.len());
        });
    });
}

fn bench_full_pass(c: &mut Criterion) {
    c.bench_function("paginator_full_pass_1k_blocks", |b| {
        let host = MemoryHost::with_heights(&heights(1_000));
        let mut paginator = Paginator::new(host, EngineConfig::default());
        paginator.paginate_now(0);

        let mut now = 0;
        b.iter(|| {
            now += 1_000;
            paginator.on_structural_key(now);
            black_box(paginator.on_frame(now + 16));
        });
    });
}

criterion_group!(
    benches,
    bench_breaks_small,
    bench_breaks_large,
    bench_balancer_pass,
    bench_full_pass,
);

criterion_main!(benches);
