use std::time::Duration;

use bevy::prelude::Entity;
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use expedition_runtime::{DifficultyId, MissionParams, MissionType};
use expedition_sim::{
    generate_missions, DifficultyTier, ExpeditionConfig, ExpeditionData, SpawnJobQueue,
    StagedWorldSpawner, WorldSpawner,
};
use rand::{rngs::SmallRng, SeedableRng};

fn tiers(count: i32) -> Vec<DifficultyTier> {
    (0..count)
        .map(|value| DifficultyTier::new(format!("Tier{value}"), value))
        .collect()
}

fn bench_catalog(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog");

    for limit in [3usize, 8, 32, 128] {
        let tiers = tiers(6);
        group.bench_with_input(BenchmarkId::new("missions", limit), &limit, |b, &limit| {
            b.iter_batched(
                || (ExpeditionData::default(), SmallRng::seed_from_u64(7)),
                |(mut data, mut rng)| {
                    generate_missions(&mut data, &tiers, limit, &mut rng);
                    data
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_spawn_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn_queue");
    let config = ExpeditionConfig::builtin();

    for jobs in [1u32, 16, 64] {
        group.bench_with_input(BenchmarkId::new("drain", jobs), &jobs, |b, &jobs| {
            b.iter_batched(
                || {
                    let mut queue = SpawnJobQueue::new();
                    for index in 0..jobs {
                        let mission = MissionParams {
                            index,
                            mission_type: MissionType::Destruction,
                            seed: index * 31,
                            difficulty: DifficultyId::default(),
                        };
                        let station = Entity::from_raw(index);
                        let job = StagedWorldSpawner.begin(&mission, station, &config);
                        queue.enqueue(station, mission, job);
                    }
                    queue
                },
                |mut queue| {
                    while !queue.is_empty() {
                        queue.process(Duration::from_millis(2));
                    }
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(expedition_benches, bench_catalog, bench_spawn_queue);
criterion_main!(expedition_benches);
