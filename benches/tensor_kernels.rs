use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use mesh_ddm::config::{FctOptions, KernelOptions, MonoType};
use mesh_ddm::fct::{FctEvolution, PeriodicSegment};
use mesh_ddm::kernels::{DofToQuad, ElementBatch, eval_gradients, eval_values};

fn random_vec(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn bench_eval_values(c: &mut Criterion) {
    let opts = KernelOptions::default();
    let mut group = c.benchmark_group("eval_values_3d");
    // (d1d, q1d): the first two are monomorphized, the last one is generic
    for &(d1d, q1d) in &[(2usize, 4usize), (4, 8), (5, 7)] {
        let basis = DofToQuad::lagrange_gauss(d1d, q1d).unwrap();
        let batch = ElementBatch::new(3, 1, 512);
        let x = random_vec(batch.ne * batch.nodal_len(d1d), 42);
        let mut y = vec![0.0; batch.ne * batch.quad_len(q1d)];
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("d{d1d}q{q1d}")),
            &(d1d, q1d),
            |b, _| b.iter(|| eval_values(batch, &basis, black_box(&x), &mut y, &opts).unwrap()),
        );
    }
    group.finish();
}

fn bench_eval_gradients(c: &mut Criterion) {
    let opts = KernelOptions::default();
    let basis = DofToQuad::lagrange_gauss(3, 5).unwrap();
    let batch = ElementBatch::new(3, 1, 512);
    let x = random_vec(batch.ne * batch.nodal_len(3), 7);
    let mut y = vec![0.0; batch.ne * 3 * 125];
    c.bench_function("eval_gradients_3d_d3q5", |b| {
        b.iter(|| eval_gradients(batch, &basis, black_box(&x), &mut y, &opts).unwrap())
    });
}

fn bench_fct_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("fct_mult");
    for mono in [MonoType::DiscUpwFct, MonoType::ResDistLim] {
        let seg = PeriodicSegment::new(4096, 1.0, 1.0).unwrap();
        let opts = FctOptions {
            mono_type: mono,
            sub_cell: false,
            ..Default::default()
        };
        let mut ev = FctEvolution::new(seg.problem(), &opts).unwrap();
        let u = random_vec(seg.layout().num_dofs(), 3);
        let mut du = vec![0.0; u.len()];
        ev.compute_bounds(&u).unwrap();
        group.bench_function(mono.name(), |b| {
            b.iter(|| ev.mult(black_box(&u), &mut du).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_eval_values, bench_eval_gradients, bench_fct_step);
criterion_main!(benches);
