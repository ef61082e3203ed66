use bevy::prelude::*;

use crate::{
    components::{ExpeditionData, ExpeditionStage, ExpeditionWorld},
    resources::ExpeditionClock,
    spawn_queue::SpawnJobQueue,
};

#[derive(Resource, Default, Debug, Clone, PartialEq)]
pub struct ExpeditionMetrics {
    pub tick: u64,
    pub clock_secs: f64,
    pub stations: u32,
    pub stations_cooling_down: u32,
    pub offered_missions: u32,
    pub expeditions_generating: u32,
    pub expeditions_active: u32,
    pub expeditions_final_countdown: u32,
    pub queued_jobs: u32,
    pub jobs_enqueued: u64,
    pub jobs_finished: u64,
    pub jobs_failed: u64,
    pub jobs_cancelled: u64,
}

pub fn collect_metrics(
    clock: Res<ExpeditionClock>,
    queue: Res<SpawnJobQueue>,
    mut metrics: ResMut<ExpeditionMetrics>,
    stations: Query<&ExpeditionData>,
    worlds: Query<&ExpeditionWorld>,
) {
    metrics.tick = clock.tick;
    metrics.clock_secs = clock.now.as_secs_f64();

    let mut station_count = 0u32;
    let mut cooling = 0u32;
    let mut offered = 0u32;
    for data in stations.iter() {
        station_count += 1;
        if data.cooldown {
            cooling += 1;
        }
        offered += data.missions.len() as u32;
    }
    metrics.stations = station_count;
    metrics.stations_cooling_down = cooling;
    metrics.offered_missions = offered;

    let (mut generating, mut active, mut countdown) = (0u32, 0u32, 0u32);
    for world in worlds.iter() {
        match world.stage {
            ExpeditionStage::Generating => generating += 1,
            ExpeditionStage::Active => active += 1,
            ExpeditionStage::FinalCountdown => countdown += 1,
            ExpeditionStage::Terminated => {}
        }
    }
    metrics.expeditions_generating = generating;
    metrics.expeditions_active = active;
    metrics.expeditions_final_countdown = countdown;

    let stats = queue.stats();
    metrics.queued_jobs = queue.len() as u32;
    metrics.jobs_enqueued = stats.enqueued;
    metrics.jobs_finished = stats.finished;
    metrics.jobs_failed = stats.failed;
    metrics.jobs_cancelled = stats.cancelled;
}
