use criterion::{Criterion, criterion_group, criterion_main};
use fluidsim::params::FluidConfig;
use fluidsim::system::{FluidSystem, ParticleSystem};

fn bench_step(c: &mut Criterion) {
    let mut sys = FluidSystem::new(&FluidConfig::default());
    sys.reset(1024, 7).unwrap();

    // all-pairs scan, so this is the quadratic worst case
    c.bench_function("step_1k", |b| b.iter(|| sys.update(1.0)));
}

criterion_group!(benches, bench_step);
criterion_main!(benches);
