//! Benchmarks for the per-cycle hot paths.
//!
//! Run with: `cargo bench --bench htm_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use neocortex::prelude::*;

fn random_input(rng: &mut Random, len: usize, active: usize) -> Vec<u8> {
    let bits = rng.sample((0..len).collect::<Vec<_>>(), active);
    let mut input = vec![0u8; len];
    for b in bits {
        input[b] = 1;
    }
    input
}

fn sp_config(columns: u32, global: bool) -> HtmConfig {
    HtmConfig {
        input_dimensions: vec![1024],
        column_dimensions: vec![columns],
        potential_radius: if global { -1 } else { 64 },
        global_inhibition: global,
        num_active_columns_per_inh_area: if global {
            f64::from(columns) * 0.02
        } else {
            10.0
        },
        cells_per_column: 8,
        ..Default::default()
    }
}

// =============================================================================
// SPATIAL POOLER
// =============================================================================

fn bench_spatial_pooler_init(c: &mut Criterion) {
    let mut group = c.benchmark_group("sp_init");
    group.sample_size(10);

    for &columns in &[512u32, 2048] {
        group.bench_with_input(BenchmarkId::new("serial", columns), &columns, |b, &n| {
            b.iter(|| {
                let mut mem = Connections::new(sp_config(n, true)).unwrap();
                black_box(SpatialPooler::new(&mut mem).unwrap());
            });
        });

        #[cfg(feature = "rayon")]
        group.bench_with_input(BenchmarkId::new("parallel", columns), &columns, |b, &n| {
            b.iter(|| {
                let mut mem = Connections::new(sp_config(n, true)).unwrap();
                black_box(SpatialPooler::new_parallel(&mut mem).unwrap());
            });
        });
    }
    group.finish();
}

fn bench_spatial_pooler_compute(c: &mut Criterion) {
    let mut group = c.benchmark_group("sp_compute");
    group.sample_size(50);

    for &(columns, global, learn) in &[
        (2048u32, true, false),
        (2048, true, true),
        (1024, false, true),
    ] {
        let mut mem = Connections::new(sp_config(columns, global)).unwrap();
        let mut sp = SpatialPooler::new(&mut mem).unwrap();
        let mut rng = Random::new(7);
        let inputs: Vec<Vec<u8>> = (0..32).map(|_| random_input(&mut rng, 1024, 40)).collect();

        let name = format!(
            "{}_{}",
            if global { "global" } else { "local" },
            if learn { "learn" } else { "infer" }
        );
        group.throughput(Throughput::Elements(u64::from(columns)));
        let mut i = 0;
        group.bench_function(BenchmarkId::new(name, columns), |b| {
            b.iter(|| {
                i = (i + 1) % inputs.len();
                black_box(sp.compute(&mut mem, &inputs[i], learn).unwrap())
            });
        });
    }
    group.finish();
}

// =============================================================================
// CONNECTIONS
// =============================================================================

fn bench_compute_activity(c: &mut Criterion) {
    let mut group = c.benchmark_group("connections_activity");

    let mut mem = Connections::new(HtmConfig {
        input_dimensions: vec![64],
        column_dimensions: vec![1024],
        cells_per_column: 16,
        ..Default::default()
    })
    .unwrap();
    let num_cells = mem.num_cells();
    let mut rng = Random::new(3);

    for _ in 0..4096 {
        let cell = rng.get_usize(num_cells) as CellIdx;
        let segment = mem.create_segment(cell).unwrap();
        let mut sources: Vec<CellIdx> = rng
            .sample((0..num_cells as CellIdx).collect(), 20);
        sources.sort_unstable();
        mem.grow_synapses(segment, &sources, 20, 0.4 + rng.get_real64() * 0.2, &mut rng)
            .unwrap();
    }

    for &active in &[160usize, 640] {
        let mut cells: Vec<CellIdx> = rng.sample((0..num_cells as CellIdx).collect(), active);
        cells.sort_unstable();
        group.throughput(Throughput::Elements(active as u64));
        group.bench_with_input(BenchmarkId::from_parameter(active), &cells, |b, cells| {
            b.iter(|| black_box(mem.compute_activity(cells, 0.5)));
        });
    }
    group.finish();
}

// =============================================================================
// TEMPORAL MEMORY
// =============================================================================

fn bench_temporal_memory_compute(c: &mut Criterion) {
    let mut group = c.benchmark_group("tm_compute");
    group.sample_size(50);

    let mut mem = Connections::new(HtmConfig {
        input_dimensions: vec![64],
        column_dimensions: vec![2048],
        cells_per_column: 32,
        ..Default::default()
    })
    .unwrap();
    let mut rng = Random::new(11);
    let sequence: Vec<Vec<ColumnIdx>> = (0..20)
        .map(|_| {
            let mut columns: Vec<ColumnIdx> = rng.sample((0..2048).collect(), 40);
            columns.sort_unstable();
            columns
        })
        .collect();

    let mut tm = TemporalMemory::new(&mem);
    for _ in 0..10 {
        for columns in &sequence {
            tm.compute(&mut mem, columns, true).unwrap();
        }
    }

    let mut i = 0;
    group.bench_function("serial", |b| {
        b.iter(|| {
            i = (i + 1) % sequence.len();
            black_box(tm.compute(&mut mem, &sequence[i], true).unwrap())
        });
    });

    #[cfg(feature = "rayon")]
    group.bench_function("parallel", |b| {
        b.iter(|| {
            i = (i + 1) % sequence.len();
            black_box(tm.compute_parallel(&mut mem, &sequence[i], true).unwrap())
        });
    });

    group.finish();
}

criterion_group!(
    sp_benches,
    bench_spatial_pooler_init,
    bench_spatial_pooler_compute,
);

criterion_group!(connections_benches, bench_compute_activity);

criterion_group!(tm_benches, bench_temporal_memory_compute);

criterion_main!(sp_benches, connections_benches, tm_benches);
