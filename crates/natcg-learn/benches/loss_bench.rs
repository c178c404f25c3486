use candle_core::{Device, Tensor};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use natcg_learn::{HypersphereState, OutputsBuffer, SoftBoundaryLoss};

fn bench_loss(c: &mut Criterion) {
    let dim = 4096;
    let objective = SoftBoundaryLoss::new(0.05, 2.0, 1e-6).unwrap();
    let center: Vec<f32> = (0..dim).map(|i| (i as f32 * 0.003).cos()).collect();
    let state = HypersphereState::from_parts(center, 12.0, 0.0, &Device::Cpu).unwrap();

    let data: Vec<f32> = (0..16 * dim).map(|i| (i as f32 * 0.01).sin()).collect();
    let latents = Tensor::from_vec(data, (16, dim), &Device::Cpu).unwrap();

    c.bench_function("SoftBoundaryLoss::loss [16×4096]", |b| {
        b.iter(|| objective.loss(&state, black_box(&latents)).unwrap())
    });

    let mut outputs = OutputsBuffer::new(630, dim);
    let row: Vec<f32> = (0..dim).map(|i| (i as f32 * 0.02).sin()).collect();
    for i in 0..630 {
        outputs.write_row(i, &row).unwrap();
    }
    c.bench_function("SoftBoundaryLoss::update_r [630×4096]", |b| {
        b.iter(|| objective.update_r(&state, 1, black_box(&outputs)).unwrap())
    });
}

criterion_group!(benches, bench_loss);
criterion_main!(benches);
