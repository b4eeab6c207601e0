use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pusher_slot::game::{
    physics::{simulate, PhysicsConfig},
    scoring::score_play,
    slot::{spin, SlotConfig},
};
use pusher_slot::DeterministicRng;

fn scoring(c: &mut Criterion) {
    let physics = PhysicsConfig::default();
    let slot = SlotConfig::default();

    let mut group = c.benchmark_group("scoring");
    for medals in [1u64, 50, 5_000] {
        group.bench_function(BenchmarkId::new("simulate", medals), |b| {
            b.iter(|| black_box(simulate(black_box("abc"), medals, 100_000, &physics)))
        });

        group.bench_function(BenchmarkId::new("score_play", medals), |b| {
            let mut n = 0u64;
            b.iter(|| {
                n += 1;
                let seed = format!("seed-{n}");
                black_box(score_play(&seed, medals, 100_000, &physics, &slot))
            })
        });
    }

    group.bench_function("spin", |b| {
        let mut rng = DeterministicRng::new(42);
        b.iter(|| black_box(spin(&mut rng, &slot)))
    });
    group.finish();
}

criterion_group!(benches, scoring);
criterion_main!(benches);
