//! Time-sliced queue of expedition spawn jobs.
//!
//! Jobs are stepped front to back within a wall-clock budget each tick. A job
//! that finishes, fails or is cancelled is swept out of the queue in the same
//! tick; cancelled jobs never report a completion.

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use bevy::prelude::*;
use expedition_runtime::MissionParams;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use thiserror::Error;

use crate::expedition_config::{ExpeditionConfig, ExpeditionConfigHandle};

const QUEUE_TARGET: &str = "salvage::expeditions";

/// Shared cancel flag. Cancelling is idempotent and visible to every clone.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` only for the call that actually flipped the flag.
    pub fn cancel(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What a generator produced for a mission.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnedExpedition {
    pub mission: MissionParams,
    pub rooms: u32,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpawnFailure {
    #[error("spawn job cancelled")]
    Cancelled,
    #[error("expedition generation failed: {0}")]
    Generation(String),
}

pub enum JobStep {
    Pending,
    Complete(Result<SpawnedExpedition, SpawnFailure>),
}

/// One unit of cooperative generation work.
pub trait SpawnJob: Send + Sync {
    fn step(&mut self, token: &CancellationToken) -> JobStep;
}

/// Starts generation jobs for claimed missions.
pub trait WorldSpawner: Send + Sync {
    fn begin(
        &self,
        mission: &MissionParams,
        station: Entity,
        config: &ExpeditionConfig,
    ) -> Box<dyn SpawnJob>;
}

#[derive(Resource, Clone)]
pub struct WorldSpawnerHandle(pub Arc<dyn WorldSpawner>);

impl WorldSpawnerHandle {
    pub fn new(spawner: impl WorldSpawner + 'static) -> Self {
        Self(Arc::new(spawner))
    }

    pub fn spawner(&self) -> &dyn WorldSpawner {
        self.0.as_ref()
    }
}

impl Default for WorldSpawnerHandle {
    fn default() -> Self {
        Self::new(StagedWorldSpawner)
    }
}

/// Deterministic stand-in for the dungeon and biome generators.
///
/// Walks `3 + 2 * tier value` stages plus a seed-driven extra of up to two,
/// laying out a few rooms per stage. Tier values above
/// [`MAX_STAGED_TIER`] generate like that tier.
#[derive(Debug, Clone, Copy, Default)]
pub struct StagedWorldSpawner;

pub const MAX_STAGED_TIER: u32 = 32;

impl WorldSpawner for StagedWorldSpawner {
    fn begin(
        &self,
        mission: &MissionParams,
        _station: Entity,
        config: &ExpeditionConfig,
    ) -> Box<dyn SpawnJob> {
        let tier_value = config
            .difficulty_tiers()
            .iter()
            .find(|tier| tier.id == mission.difficulty)
            .map(|tier| tier.value.clamp(0, MAX_STAGED_TIER as i32) as u32)
            .unwrap_or(0);
        let mut rng = SmallRng::seed_from_u64(u64::from(mission.seed));
        let stages = 3 + tier_value * 2 + rng.gen_range(0..=2u32);
        Box::new(StagedSpawnJob {
            mission: mission.clone(),
            duration: config.mission_duration(&mission.difficulty),
            rng,
            stages,
            completed: 0,
            rooms: 0,
        })
    }
}

struct StagedSpawnJob {
    mission: MissionParams,
    duration: Duration,
    rng: SmallRng,
    stages: u32,
    completed: u32,
    rooms: u32,
}

impl SpawnJob for StagedSpawnJob {
    fn step(&mut self, token: &CancellationToken) -> JobStep {
        if token.is_cancelled() {
            return JobStep::Complete(Err(SpawnFailure::Cancelled));
        }
        self.rooms = self.rooms.saturating_add(self.rng.gen_range(1..=4));
        self.completed += 1;
        if self.completed < self.stages {
            return JobStep::Pending;
        }
        JobStep::Complete(Ok(SpawnedExpedition {
            mission: self.mission.clone(),
            rooms: self.rooms,
            duration: self.duration,
        }))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpawnJobId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Finished,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpawnQueueStats {
    pub enqueued: u64,
    pub finished: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub steps: u64,
}

#[derive(Debug)]
pub struct SpawnCompletion {
    pub id: SpawnJobId,
    pub station: Entity,
    pub mission: MissionParams,
    pub result: Result<SpawnedExpedition, SpawnFailure>,
}

struct QueuedJob {
    id: SpawnJobId,
    station: Entity,
    mission: MissionParams,
    token: CancellationToken,
    job: Box<dyn SpawnJob>,
    status: JobStatus,
}

impl QueuedJob {
    fn is_live(&self) -> bool {
        self.status == JobStatus::Running && !self.token.is_cancelled()
    }
}

#[derive(Resource, Default)]
pub struct SpawnJobQueue {
    jobs: VecDeque<QueuedJob>,
    next_id: u64,
    stats: SpawnQueueStats,
}

impl SpawnJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a job. No deduplication: a station may hold several jobs.
    pub fn enqueue(
        &mut self,
        station: Entity,
        mission: MissionParams,
        job: Box<dyn SpawnJob>,
    ) -> (SpawnJobId, CancellationToken) {
        let id = SpawnJobId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        let token = CancellationToken::new();
        self.jobs.push_back(QueuedJob {
            id,
            station,
            mission,
            token: token.clone(),
            job,
            status: JobStatus::Running,
        });
        self.stats.enqueued += 1;
        (id, token)
    }

    pub fn cancel(&mut self, id: SpawnJobId) -> bool {
        let Some(entry) = self.jobs.iter().find(|entry| entry.id == id) else {
            return false;
        };
        let cancelled = entry.token.cancel();
        if cancelled {
            self.stats.cancelled += 1;
        }
        cancelled
    }

    /// Cancels every live job for `station`, returning how many were newly cancelled.
    pub fn cancel_station(&mut self, station: Entity) -> usize {
        let mut count = 0;
        for entry in self.jobs.iter().filter(|entry| entry.station == station) {
            if entry.token.cancel() {
                count += 1;
            }
        }
        self.stats.cancelled += count as u64;
        count
    }

    pub fn has_live_job(&self, station: Entity) -> bool {
        self.jobs
            .iter()
            .any(|entry| entry.station == station && entry.is_live())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn stats(&self) -> SpawnQueueStats {
        self.stats
    }

    /// Steps jobs in FIFO order until `budget` is spent. At least one step
    /// runs per call so a zero budget still makes progress.
    pub fn process(&mut self, budget: Duration) -> Vec<SpawnCompletion> {
        let started = Instant::now();
        let mut completions = Vec::new();
        let mut stepped = false;

        'jobs: for entry in self.jobs.iter_mut() {
            while entry.is_live() {
                if stepped && started.elapsed() >= budget {
                    break 'jobs;
                }
                stepped = true;
                self.stats.steps += 1;

                let JobStep::Complete(result) = entry.job.step(&entry.token) else {
                    continue;
                };
                entry.status = if result.is_ok() {
                    JobStatus::Finished
                } else {
                    JobStatus::Failed
                };
                if entry.token.is_cancelled() {
                    break;
                }
                match entry.status {
                    JobStatus::Finished => self.stats.finished += 1,
                    _ => self.stats.failed += 1,
                }
                completions.push(SpawnCompletion {
                    id: entry.id,
                    station: entry.station,
                    mission: entry.mission.clone(),
                    result,
                });
            }
        }

        self.jobs.retain(QueuedJob::is_live);
        completions
    }
}

/// Reported once per job that ran to an end without being cancelled.
#[derive(Event, Debug, Clone)]
pub struct ExpeditionSpawnComplete {
    pub station: Entity,
    pub mission: MissionParams,
    pub success: bool,
    pub expedition: Option<SpawnedExpedition>,
    pub failure: Option<SpawnFailure>,
}

impl From<SpawnCompletion> for ExpeditionSpawnComplete {
    fn from(completion: SpawnCompletion) -> Self {
        let (expedition, failure) = match completion.result {
            Ok(expedition) => (Some(expedition), None),
            Err(failure) => (None, Some(failure)),
        };
        Self {
            station: completion.station,
            mission: completion.mission,
            success: expedition.is_some(),
            expedition,
            failure,
        }
    }
}

pub fn process_spawn_queue(
    config: Res<ExpeditionConfigHandle>,
    mut queue: ResMut<SpawnJobQueue>,
    mut completions: EventWriter<ExpeditionSpawnComplete>,
) {
    if queue.is_empty() {
        return;
    }
    for completion in queue.process(config.config().job_budget()) {
        tracing::debug!(
            target: QUEUE_TARGET,
            job = completion.id.0,
            station = ?completion.station,
            mission = completion.mission.index,
            success = completion.result.is_ok(),
            "spawn_job.completed"
        );
        completions.send(completion.into());
    }
}
