//! Per-station expedition state machine.
//!
//! A station cycles through offer, claim, spawn, arrival, finish and
//! cooldown. Transitions on [`ExpeditionData`] and [`ExpeditionWorld`] are
//! plain methods; the systems below feed them from events and the clock and
//! fan the results out as console refreshes and announcements.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use bevy::{ecs::entity::Entities, math::Vec2, prelude::*};
use expedition_runtime::{MissionParams, MissionType};
use thiserror::Error;

use crate::{
    catalog::generate_catalog,
    components::{
        ActiveNpc, ExpeditionConsole, ExpeditionData, ExpeditionStage, ExpeditionWorld, FtlTravel,
        Ghost, MapGrid, MapRoot, Mind, MobState, NpcFactionMember, Placement,
        SalvageMobRestrictions, StationData, StationMember,
    },
    expedition_config::{DifficultyTier, ExpeditionConfig, ExpeditionConfigHandle},
    resources::{DefaultMap, ExpeditionClock, ExpeditionRng},
    spawn_queue::{ExpeditionSpawnComplete, SpawnJobQueue, WorldSpawnerHandle},
};

const EXPEDITION_TARGET: &str = "salvage::expeditions";

#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimMission {
    pub console: Entity,
    pub index: u32,
}

#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinishMission {
    pub console: Entity,
}

#[derive(Event, Debug, Clone, Copy, Default)]
pub struct RoundStarted;

/// Request to push fresh state to consoles.
///
/// `Console` refreshes also flag in-flight grids as cooling down so the
/// claim buttons stay disabled while the grid is travelling.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleRefresh {
    Station(Entity),
    Console(Entity),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FinishDenial {
    #[error("expedition cannot be finished right now")]
    NotEligible,
    #[error("shuttle not found")]
    ShuttleNotFound,
    #[error("{target:?} is not aboard the shuttle")]
    NotEveryoneAboard { target: Entity },
}

#[derive(Event, Debug, Clone)]
pub struct ConsoleDenied {
    pub console: Entity,
    pub sound: String,
    pub reason: FinishDenial,
}

#[derive(Event, Debug, Clone, PartialEq)]
pub struct ExpeditionAnnouncement {
    pub map: Entity,
    pub message: String,
}

/// Station and home map of each live expedition world, kept so shutdown can
/// still find them after the world component is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpeditionLink {
    pub station: Entity,
    pub home_map: Entity,
    pub mission: u32,
    pub completed: bool,
}

#[derive(Resource, Debug, Default, Clone)]
pub struct ExpeditionRegistry {
    worlds: HashMap<Entity, ExpeditionLink>,
}

impl ExpeditionRegistry {
    pub fn register(&mut self, world: Entity, link: ExpeditionLink) {
        self.worlds.insert(world, link);
    }

    pub fn link(&self, world: Entity) -> Option<&ExpeditionLink> {
        self.worlds.get(&world)
    }

    pub fn mark_completed(&mut self, world: Entity) {
        if let Some(link) = self.worlds.get_mut(&world) {
            link.completed = true;
        }
    }

    pub fn take(&mut self, world: Entity) -> Option<ExpeditionLink> {
        self.worlds.remove(&world)
    }

    pub fn world_for_station(&self, station: Entity) -> Option<Entity> {
        self.worlds
            .iter()
            .find(|(_, link)| link.station == station)
            .map(|(world, _)| *world)
    }

    pub fn len(&self) -> usize {
        self.worlds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worlds.is_empty()
    }
}

/// Pending attempt to hand orphaned grids to the primary station.
#[derive(Resource, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReparentRetry {
    pending: bool,
    attempt: u32,
    due: Duration,
}

impl ReparentRetry {
    pub fn schedule(now: Duration) -> Self {
        Self {
            pending: true,
            attempt: 0,
            due: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Outcome of an accepted early-finish request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarlyFinish {
    Shortened { end_time: Duration },
    Unchanged,
}

impl ExpeditionData {
    /// State of a freshly placed console: no run, offer due immediately.
    pub fn reset_for_console(&mut self, now: Duration) {
        self.active_mission = 0;
        self.claimed = false;
        self.cooldown = false;
        self.can_finish = false;
        self.next_offer = now;
        self.cooldown_time = Duration::ZERO;
    }

    /// Marks `index` as claimed. An index missing from the catalog gets a
    /// synthesized mission on the given tier with a fresh index.
    pub fn begin_claim(&mut self, index: u32, fallback_tier: &DifficultyTier) -> MissionParams {
        let mission = match self.missions.get(&index) {
            Some(mission) => mission.clone(),
            None => {
                let index = self.next_index;
                self.next_index += 1;
                MissionParams {
                    index,
                    mission_type: MissionType::default(),
                    seed: 0,
                    difficulty: fallback_tier.id.clone(),
                }
            }
        };
        self.claimed = true;
        self.active_mission = mission.index;
        self.cooldown = true;
        mission
    }

    pub fn record_spawn_success(&mut self, index: u32) {
        self.active_mission = index;
        self.cooldown = true;
    }

    /// Rolls back a claim whose spawn failed. Returns `false` when a newer
    /// claim has since replaced `index`.
    pub fn record_spawn_failure(&mut self, index: u32) -> bool {
        if self.active_mission != index {
            return false;
        }
        self.active_mission = 0;
        self.cooldown = false;
        self.claimed = false;
        true
    }

    /// Clears the finish button. Returns `false` if it was already clear.
    pub fn accept_early_finish(&mut self) -> bool {
        std::mem::replace(&mut self.can_finish, false)
    }

    /// Ends the current run and starts the lockout. Completed runs use the
    /// regular cooldown, anything else the failure cooldown.
    pub fn finish_run(&mut self, now: Duration, completed: bool, config: &ExpeditionConfig) {
        let lockout = if completed {
            config.cooldown()
        } else {
            config.failed_cooldown()
        };
        self.next_offer = now + lockout;
        self.cooldown_time = lockout;
        self.active_mission = 0;
        self.cooldown = true;
        self.can_finish = false;
    }

    /// Reopens the offer window for a new round. A run already underway
    /// keeps its world, so `claimed` and `can_finish` are left alone.
    pub fn reset_for_round(&mut self, now: Duration, cooldown: Duration) {
        self.next_offer = now + cooldown;
        self.cooldown_time = cooldown;
        self.cooldown = false;
        self.active_mission = 0;
    }

    pub fn offer_due(&self, now: Duration) -> bool {
        self.active_mission == 0 && now >= self.next_offer
    }

    /// Opens the next offer window. The caller regenerates the catalog.
    pub fn reoffer(&mut self, now: Duration, cooldown: Duration) {
        self.cooldown = false;
        self.claimed = false;
        self.next_offer = now + cooldown;
    }
}

impl ExpeditionWorld {
    /// Pulls the deadline in to `now + window`, never pushing it out.
    pub fn request_early_finish(&mut self, now: Duration, window: Duration) -> EarlyFinish {
        let deadline = now + window;
        if self.end_time <= deadline {
            return EarlyFinish::Unchanged;
        }
        self.stage = ExpeditionStage::FinalCountdown;
        self.end_time = deadline;
        EarlyFinish::Shortened { end_time: deadline }
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self.stage,
            ExpeditionStage::Active | ExpeditionStage::FinalCountdown
        )
    }
}

/// Grid carrying the console, or the console itself when it stands alone.
pub fn station_of(console: Entity, placement: Option<&Placement>) -> Entity {
    placement.and_then(|placement| placement.grid).unwrap_or(console)
}

/// A mob on `map` that blocks departure: player controlled, not an NPC,
/// not hostile to `protected_faction` and not standing on `grid`. When
/// several qualify the lowest entity id is reported.
pub fn find_straggler<'a, I>(
    mobs: I,
    map: Entity,
    grid: Option<Entity>,
    protected_faction: &str,
) -> Option<Entity>
where
    I: IntoIterator<
        Item = (
            Entity,
            &'a Mind,
            &'a Placement,
            bool,
            bool,
            Option<&'a NpcFactionMember>,
        ),
    >,
{
    mobs.into_iter()
        .filter(|(_, mind, placement, npc, restricted, faction)| {
            placement.map == map
                && mind.has_mind
                && !npc
                && !restricted
                && !faction.is_some_and(|faction| faction.is_hostile_to(protected_faction))
                && placement.grid != grid
        })
        .map(|(entity, ..)| entity)
        .min()
}

pub fn initialize_consoles(
    mut commands: Commands,
    clock: Res<ExpeditionClock>,
    config: Res<ExpeditionConfigHandle>,
    mut rng: ResMut<ExpeditionRng>,
    consoles: Query<(Entity, Option<&Placement>), Added<ExpeditionConsole>>,
    mut stations: Query<&mut ExpeditionData>,
    mut refresh: EventWriter<ConsoleRefresh>,
) {
    let config = config.config();
    let mut created: BTreeMap<Entity, ExpeditionData> = BTreeMap::new();

    for (console, placement) in consoles.iter() {
        let station = station_of(console, placement);
        if let Ok(mut data) = stations.get_mut(station) {
            data.reset_for_console(clock.now);
            generate_catalog(&mut data, config, &mut rng.0);
        } else {
            let data = created.entry(station).or_default();
            data.reset_for_console(clock.now);
            generate_catalog(data, config, &mut rng.0);
        }
        tracing::debug!(
            target: EXPEDITION_TARGET,
            console = ?console,
            station = ?station,
            "console.initialized"
        );
        refresh.send(ConsoleRefresh::Console(console));
    }

    for (station, data) in created {
        match commands.get_entity(station) {
            Some(mut entity) => {
                entity.insert(data);
            }
            None => tracing::warn!(
                target: EXPEDITION_TARGET,
                station = ?station,
                "console.station_missing"
            ),
        }
    }
}

pub fn refresh_moved_consoles(
    consoles: Query<Entity, (With<ExpeditionConsole>, Changed<Placement>)>,
    mut refresh: EventWriter<ConsoleRefresh>,
) {
    for console in consoles.iter() {
        refresh.send(ConsoleRefresh::Console(console));
    }
}

pub fn handle_round_start(
    mut rounds: EventReader<RoundStarted>,
    clock: Res<ExpeditionClock>,
    config: Res<ExpeditionConfigHandle>,
    mut rng: ResMut<ExpeditionRng>,
    mut retry: ResMut<ReparentRetry>,
    mut stations: Query<(Entity, &mut ExpeditionData)>,
    mut refresh: EventWriter<ConsoleRefresh>,
) {
    if rounds.read().count() == 0 {
        return;
    }
    let config = config.config();
    *retry = ReparentRetry::schedule(clock.now);

    let mut count = 0usize;
    for (station, mut data) in stations.iter_mut() {
        generate_catalog(&mut data, config, &mut rng.0);
        data.reset_for_round(clock.now, config.cooldown());
        refresh.send(ConsoleRefresh::Station(station));
        count += 1;
    }
    tracing::info!(target: EXPEDITION_TARGET, stations = count, "round.started");
}

/// Hands every grid without an owning station to the primary station, the
/// lowest `StationData` entity. Retries on a timer until one exists.
pub fn retry_reparent_orphaned_grids(
    mut commands: Commands,
    clock: Res<ExpeditionClock>,
    config: Res<ExpeditionConfigHandle>,
    mut retry: ResMut<ReparentRetry>,
    mut stations: Query<(Entity, &mut StationData)>,
    grids: Query<(Entity, Option<&StationMember>), With<MapGrid>>,
) {
    if !retry.pending || clock.now < retry.due {
        return;
    }
    let config = config.config();

    let Some(primary) = stations.iter().map(|(entity, _)| entity).min() else {
        if retry.attempt < config.reparent_max_attempts() {
            retry.attempt += 1;
            retry.due = clock.now + config.reparent_retry_interval();
            tracing::debug!(
                target: EXPEDITION_TARGET,
                attempt = retry.attempt,
                "reparent.no_station=retrying"
            );
        } else {
            retry.pending = false;
            tracing::debug!(
                target: EXPEDITION_TARGET,
                attempts = retry.attempt,
                "reparent.no_station=skipped"
            );
        }
        return;
    };
    retry.pending = false;

    let mut reparented = 0usize;
    for (grid, member) in grids.iter() {
        let owned = member.is_some_and(|member| stations.contains(member.station));
        if owned {
            continue;
        }
        if let Ok((_, mut data)) = stations.get_mut(primary) {
            data.grids.insert(grid);
        }
        commands.entity(grid).insert(StationMember { station: primary });
        reparented += 1;
    }
    tracing::info!(
        target: EXPEDITION_TARGET,
        station = ?primary,
        grids = reparented,
        "reparent.completed"
    );
}

#[allow(clippy::too_many_arguments)]
pub fn handle_claim_requests(
    mut commands: Commands,
    mut claims: EventReader<ClaimMission>,
    config: Res<ExpeditionConfigHandle>,
    spawner: Res<WorldSpawnerHandle>,
    mut queue: ResMut<SpawnJobQueue>,
    consoles: Query<Option<&Placement>, With<ExpeditionConsole>>,
    mut stations: Query<&mut ExpeditionData>,
    mut refresh: EventWriter<ConsoleRefresh>,
) {
    let config = config.config();
    let fallback_tier = config.default_tier();
    let mut created: BTreeMap<Entity, ExpeditionData> = BTreeMap::new();

    for claim in claims.read() {
        let Ok(placement) = consoles.get(claim.console) else {
            tracing::warn!(
                target: EXPEDITION_TARGET,
                console = ?claim.console,
                "claim.not_a_console"
            );
            continue;
        };
        let station = station_of(claim.console, placement);

        if queue.has_live_job(station) {
            tracing::warn!(
                target: EXPEDITION_TARGET,
                station = ?station,
                "claim.concurrent_spawn"
            );
        }

        let mission = match stations.get_mut(station) {
            Ok(mut data) => data.begin_claim(claim.index, &fallback_tier),
            Err(_) => created
                .entry(station)
                .or_default()
                .begin_claim(claim.index, &fallback_tier),
        };

        if mission.index != claim.index {
            tracing::info!(
                target: EXPEDITION_TARGET,
                station = ?station,
                requested = claim.index,
                mission = mission.index,
                "claim.synthesized_mission"
            );
        }

        let job = spawner.spawner().begin(&mission, station, config);
        let (job_id, _) = queue.enqueue(station, mission.clone(), job);
        tracing::info!(
            target: EXPEDITION_TARGET,
            station = ?station,
            mission = mission.index,
            difficulty = %mission.difficulty,
            mission_type = mission.mission_type.as_str(),
            job = job_id.0,
            "expedition.claimed"
        );
        refresh.send(ConsoleRefresh::Station(station));
    }

    for (station, data) in created {
        if let Some(mut entity) = commands.get_entity(station) {
            entity.insert(data);
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn handle_finish_requests(
    mut finishes: EventReader<FinishMission>,
    clock: Res<ExpeditionClock>,
    config: Res<ExpeditionConfigHandle>,
    consoles: Query<(&ExpeditionConsole, Option<&Placement>)>,
    mut stations: Query<&mut ExpeditionData>,
    mut worlds: Query<&mut ExpeditionWorld>,
    mobs: Query<
        (
            Entity,
            &Mind,
            &Placement,
            Has<ActiveNpc>,
            Has<SalvageMobRestrictions>,
            Option<&NpcFactionMember>,
        ),
        With<MobState>,
    >,
    mut denied: EventWriter<ConsoleDenied>,
    mut announcements: EventWriter<ExpeditionAnnouncement>,
    mut refresh: EventWriter<ConsoleRefresh>,
) {
    let config = config.config();

    for request in finishes.read() {
        let Ok((console, placement)) = consoles.get(request.console) else {
            continue;
        };
        let station = station_of(request.console, placement);
        let mut deny = |reason: FinishDenial| {
            tracing::info!(
                target: EXPEDITION_TARGET,
                console = ?request.console,
                reason = %reason,
                "early_finish.denied"
            );
            denied.send(ConsoleDenied {
                console: request.console,
                sound: console.error_sound.clone(),
                reason,
            });
        };

        let Ok(mut data) = stations.get_mut(station) else {
            deny(FinishDenial::NotEligible);
            continue;
        };
        if !data.can_finish {
            deny(FinishDenial::NotEligible);
            continue;
        }
        let Some(placement) = placement else {
            deny(FinishDenial::ShuttleNotFound);
            refresh.send(ConsoleRefresh::Station(station));
            continue;
        };

        if config.proximity_check() {
            if let Some(target) = find_straggler(
                mobs.iter(),
                placement.map,
                placement.grid,
                config.protected_faction(),
            ) {
                deny(FinishDenial::NotEveryoneAboard { target });
                refresh.send(ConsoleRefresh::Station(station));
                continue;
            }
        }

        data.accept_early_finish();
        refresh.send(ConsoleRefresh::Station(station));

        let Ok(mut world) = worlds.get_mut(placement.map) else {
            continue;
        };
        let window = config.early_finish_window();
        match world.request_early_finish(clock.now, window) {
            EarlyFinish::Shortened { end_time } => {
                tracing::info!(
                    target: EXPEDITION_TARGET,
                    station = ?station,
                    end_secs = end_time.as_secs_f32(),
                    "early_finish.shortened"
                );
                announcements.send(ExpeditionAnnouncement {
                    map: placement.map,
                    message: format!(
                        "Expedition ending early, departing in {} seconds.",
                        window.as_secs()
                    ),
                });
            }
            EarlyFinish::Unchanged => {
                tracing::debug!(
                    target: EXPEDITION_TARGET,
                    station = ?station,
                    "early_finish.already_ending"
                );
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn apply_spawn_completions(
    mut commands: Commands,
    mut completions: EventReader<ExpeditionSpawnComplete>,
    clock: Res<ExpeditionClock>,
    config: Res<ExpeditionConfigHandle>,
    default_map: Res<DefaultMap>,
    mut registry: ResMut<ExpeditionRegistry>,
    mut stations: Query<&mut ExpeditionData>,
    mut placements: Query<(Entity, &mut Placement)>,
    mut refresh: EventWriter<ConsoleRefresh>,
) {
    let config = config.config();

    for completion in completions.read() {
        let station = completion.station;
        let index = completion.mission.index;

        let Some(expedition) = completion.expedition.as_ref().filter(|_| completion.success)
        else {
            tracing::warn!(
                target: EXPEDITION_TARGET,
                station = ?station,
                mission = index,
                error = ?completion.failure,
                "expedition.spawn_failed"
            );
            if let Ok(mut data) = stations.get_mut(station) {
                if data.record_spawn_failure(index) {
                    refresh.send(ConsoleRefresh::Station(station));
                }
            }
            continue;
        };

        if commands.get_entity(station).is_none() {
            tracing::warn!(
                target: EXPEDITION_TARGET,
                station = ?station,
                mission = index,
                "expedition.station_gone"
            );
            continue;
        }
        if let Some(existing) = registry.world_for_station(station) {
            tracing::warn!(
                target: EXPEDITION_TARGET,
                station = ?station,
                mission = index,
                world = ?existing,
                "expedition.discarded_duplicate"
            );
            let running = registry.link(existing).map(|link| link.mission);
            if let (Some(running), Ok(mut data)) = (running, stations.get_mut(station)) {
                data.active_mission = running;
                refresh.send(ConsoleRefresh::Station(station));
            }
            continue;
        }

        let home_map = placements
            .get(station)
            .map(|(_, placement)| placement.map)
            .ok()
            .or(default_map.0);
        let Some(home_map) = home_map else {
            tracing::warn!(
                target: EXPEDITION_TARGET,
                station = ?station,
                mission = index,
                "expedition.station_unplaced"
            );
            if let Ok(mut data) = stations.get_mut(station) {
                if data.record_spawn_failure(index) {
                    refresh.send(ConsoleRefresh::Station(station));
                }
            }
            continue;
        };

        let arrival_time = clock.now + config.travel_time();
        let end_time = arrival_time + expedition.duration;
        let world = commands
            .spawn((
                MapRoot,
                ExpeditionWorld {
                    stage: ExpeditionStage::Generating,
                    arrival_time,
                    end_time,
                    station,
                    home_map,
                    mission: expedition.mission.clone(),
                    completed: false,
                },
            ))
            .id();

        let mut moved = 0usize;
        for (entity, mut placement) in placements.iter_mut() {
            if placement.map == home_map && (entity == station || placement.is_aboard(station)) {
                placement.map = world;
                moved += 1;
            }
        }
        commands.entity(station).insert(FtlTravel {
            destination: world,
            arrival: arrival_time,
        });

        if let Ok(mut data) = stations.get_mut(station) {
            data.record_spawn_success(index);
        }
        registry.register(
            world,
            ExpeditionLink {
                station,
                home_map,
                mission: index,
                completed: false,
            },
        );
        refresh.send(ConsoleRefresh::Station(station));

        tracing::info!(
            target: EXPEDITION_TARGET,
            station = ?station,
            world = ?world,
            mission = index,
            rooms = expedition.rooms,
            moved,
            arrival_secs = arrival_time.as_secs_f32(),
            end_secs = end_time.as_secs_f32(),
            "expedition.spawned"
        );
    }
}

#[allow(clippy::too_many_arguments)]
pub fn advance_expeditions(
    mut commands: Commands,
    clock: Res<ExpeditionClock>,
    entities: &Entities,
    mut registry: ResMut<ExpeditionRegistry>,
    mut worlds: Query<(Entity, &mut ExpeditionWorld)>,
    mut stations: Query<&mut ExpeditionData>,
    mut announcements: EventWriter<ExpeditionAnnouncement>,
    mut refresh: EventWriter<ConsoleRefresh>,
) {
    let now = clock.now;

    for (world_entity, mut world) in worlds.iter_mut() {
        if !entities.contains(world.station) {
            tracing::warn!(
                target: EXPEDITION_TARGET,
                world = ?world_entity,
                "expedition.station_lost=despawning"
            );
            commands.entity(world_entity).despawn();
            continue;
        }

        if world.stage == ExpeditionStage::Generating && now >= world.arrival_time {
            world.stage = ExpeditionStage::Active;
            commands.entity(world.station).remove::<FtlTravel>();
            if let Ok(mut data) = stations.get_mut(world.station) {
                data.can_finish = true;
            }
            refresh.send(ConsoleRefresh::Station(world.station));
            let remaining = world.end_time.saturating_sub(now);
            announcements.send(ExpeditionAnnouncement {
                map: world_entity,
                message: format!(
                    "Expedition arrived. Departure in {} minutes.",
                    remaining.as_secs().div_ceil(60)
                ),
            });
            tracing::info!(
                target: EXPEDITION_TARGET,
                world = ?world_entity,
                station = ?world.station,
                mission = world.mission.index,
                "expedition.arrived"
            );
        }

        if world.is_running() && now >= world.end_time {
            world.completed = true;
            world.stage = ExpeditionStage::Terminated;
            registry.mark_completed(world_entity);
            tracing::info!(
                target: EXPEDITION_TARGET,
                world = ?world_entity,
                station = ?world.station,
                mission = world.mission.index,
                "expedition.completed"
            );
            commands.entity(world_entity).despawn();
        }
    }
}

/// Tears down after an expedition world goes away, however it went.
#[allow(clippy::too_many_arguments)]
pub fn handle_expedition_shutdown(
    mut commands: Commands,
    mut removed: RemovedComponents<ExpeditionWorld>,
    clock: Res<ExpeditionClock>,
    config: Res<ExpeditionConfigHandle>,
    default_map: Res<DefaultMap>,
    entities: &Entities,
    mut registry: ResMut<ExpeditionRegistry>,
    mut queue: ResMut<SpawnJobQueue>,
    mut stations: Query<&mut ExpeditionData>,
    mut placements: Query<(Entity, &mut Placement, Has<Ghost>)>,
    mut refresh: EventWriter<ConsoleRefresh>,
) {
    let config = config.config();

    for world in removed.read() {
        let Some(link) = registry.take(world) else {
            continue;
        };

        let cancelled = queue.cancel_station(link.station);

        let (mut returned, mut ghosts, mut despawned) = (0usize, 0usize, 0usize);
        for (entity, mut placement, is_ghost) in placements.iter_mut() {
            if placement.map != world {
                continue;
            }
            if entity == link.station || placement.is_aboard(link.station) {
                placement.map = link.home_map;
                returned += 1;
            } else if let (true, Some(default)) = (is_ghost, default_map.0) {
                placement.map = default;
                placement.grid = None;
                placement.position = Vec2::ZERO;
                ghosts += 1;
            } else {
                commands.entity(entity).despawn();
                despawned += 1;
            }
        }

        tracing::info!(
            target: EXPEDITION_TARGET,
            world = ?world,
            station = ?link.station,
            mission = link.mission,
            completed = link.completed,
            cancelled,
            returned,
            ghosts,
            despawned,
            "expedition.shutdown"
        );

        if !entities.contains(link.station) {
            continue;
        }
        commands.entity(link.station).remove::<FtlTravel>();
        if let Ok(mut data) = stations.get_mut(link.station) {
            data.finish_run(clock.now, link.completed, config);
            refresh.send(ConsoleRefresh::Station(link.station));
        }
    }
}

pub fn offer_new_missions(
    clock: Res<ExpeditionClock>,
    config: Res<ExpeditionConfigHandle>,
    mut rng: ResMut<ExpeditionRng>,
    mut stations: Query<(Entity, &mut ExpeditionData)>,
    mut refresh: EventWriter<ConsoleRefresh>,
) {
    let config = config.config();
    for (station, mut data) in stations.iter_mut() {
        if !data.offer_due(clock.now) {
            continue;
        }
        data.reoffer(clock.now, config.cooldown());
        generate_catalog(&mut data, config, &mut rng.0);
        refresh.send(ConsoleRefresh::Station(station));
        tracing::debug!(
            target: EXPEDITION_TARGET,
            station = ?station,
            next_offer_secs = data.next_offer.as_secs_f32(),
            "catalog.offered"
        );
    }
}
