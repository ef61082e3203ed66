//! Salvage expedition simulation for the headless station server.
//!
//! Stations offer a rotating catalog of missions through their expedition
//! consoles. Claiming one queues a cancellable spawn job; once the job lands
//! the station grid travels to the generated map, runs the mission against
//! the clock and comes home to a cooldown. [`build_headless_app`] wires the
//! whole loop into a Bevy [`App`]; each [`run_tick`] advances it one step.

pub mod catalog;
mod components;
pub mod console;
mod expedition_config;
pub mod lifecycle;
pub mod metrics;
pub mod network;
mod resources;
pub mod shipyard_save;
pub mod spawn_queue;
pub mod station;

use std::sync::Arc;

use bevy::prelude::*;

pub use catalog::{choose_difficulties, generate_catalog, generate_missions};
pub use components::{
    Actor, ActiveNpc, ConsoleUi, ExpeditionConsole, ExpeditionConsoleBundle, ExpeditionData,
    ExpeditionStage, ExpeditionWorld, Eye, FtlTravel, Ghost, MapGrid, MapRoot, Mind, MobState,
    NpcFactionMember, Placement, PlayerSession, SalvageMobRestrictions, ShipyardConsole,
    ShuttleDeed, StationData, StationMember,
};
pub use console::{console_state, ConsoleStatePushed};
pub use expedition_config::{
    apply_cooldown_change, load_expedition_config_from_env, DifficultyTier, ExpeditionConfig,
    ExpeditionConfigError, ExpeditionConfigHandle, ExpeditionConfigMetadata,
    ExpeditionConfigWatcher, BUILTIN_EXPEDITION_CONFIG,
};
pub use lifecycle::{
    ClaimMission, ConsoleDenied, ConsoleRefresh, EarlyFinish, ExpeditionAnnouncement,
    ExpeditionLink, ExpeditionRegistry, FinishDenial, FinishMission, ReparentRetry, RoundStarted,
};
pub use metrics::ExpeditionMetrics;
pub use resources::{DefaultMap, ExpeditionClock, ExpeditionRng, ShipyardMap};
pub use shipyard_save::{
    GridExportError, GridExporter, GridExporterHandle, JsonGridExporter, SaveShipRequest,
    SavedEntity, SavedGrid, ShipSaveData, ShipSaveError, ShipSaved,
};
pub use spawn_queue::{
    CancellationToken, ExpeditionSpawnComplete, JobStatus, JobStep, SpawnFailure, SpawnJob,
    SpawnJobQueue, SpawnQueueStats, SpawnedExpedition, StagedWorldSpawner, WorldSpawner,
    WorldSpawnerHandle,
};
pub use station::{spawn_map, spawn_station, StationLayout};

const SERVER_TARGET: &str = "salvage::server";

/// Construct an [`App`] using the config named by `EXPEDITION_CONFIG_PATH`,
/// watching the file for changes when one was loaded.
pub fn build_headless_app() -> App {
    let (config, metadata) = load_expedition_config_from_env();
    build_app(config, metadata)
}

/// Construct an [`App`] around a fixed config. Nothing is watched on disk.
pub fn build_app_with_config(config: Arc<ExpeditionConfig>) -> App {
    build_app(config, ExpeditionConfigMetadata::new(None))
}

fn build_app(config: Arc<ExpeditionConfig>, metadata: ExpeditionConfigMetadata) -> App {
    let mut app = App::new();

    let rng = ExpeditionRng::from_seed(config.rng_seed());
    if let Some(path) = metadata.path() {
        match ExpeditionConfigWatcher::spawn(path) {
            Ok(watcher) => {
                app.insert_resource(watcher);
            }
            Err(err) => {
                tracing::warn!(
                    target: SERVER_TARGET,
                    path = %path.display(),
                    error = %err,
                    "expedition_config.watch_failed=hot_reload_disabled"
                );
            }
        }
    }

    app.insert_resource(ExpeditionConfigHandle::new(config))
        .insert_resource(metadata)
        .insert_resource(rng)
        .init_resource::<ExpeditionClock>()
        .init_resource::<DefaultMap>()
        .init_resource::<ShipyardMap>()
        .init_resource::<SpawnJobQueue>()
        .init_resource::<WorldSpawnerHandle>()
        .init_resource::<GridExporterHandle>()
        .init_resource::<ExpeditionRegistry>()
        .init_resource::<ReparentRetry>()
        .init_resource::<ExpeditionMetrics>()
        .add_event::<ClaimMission>()
        .add_event::<FinishMission>()
        .add_event::<RoundStarted>()
        .add_event::<ConsoleRefresh>()
        .add_event::<ConsoleDenied>()
        .add_event::<ConsoleStatePushed>()
        .add_event::<ExpeditionAnnouncement>()
        .add_event::<ExpeditionSpawnComplete>()
        .add_event::<SaveShipRequest>()
        .add_event::<ShipSaveData>()
        .add_event::<ShipSaved>()
        .add_plugins(MinimalPlugins)
        .add_systems(
            Update,
            (
                resources::advance_clock,
                expedition_config::reload_expedition_config,
                lifecycle::initialize_consoles,
                lifecycle::refresh_moved_consoles,
                lifecycle::handle_round_start,
                lifecycle::retry_reparent_orphaned_grids,
                lifecycle::handle_claim_requests,
                lifecycle::handle_finish_requests,
                spawn_queue::process_spawn_queue,
                lifecycle::apply_spawn_completions,
                lifecycle::advance_expeditions,
                lifecycle::handle_expedition_shutdown,
                lifecycle::offer_new_missions,
                console::push_console_states,
                shipyard_save::process_ship_save_requests,
                metrics::collect_metrics,
            )
                .chain(),
        );

    app
}

/// Execute a single simulation tick.
///
/// Runs the chained systems registered in [`build_app_with_config`]: clock,
/// config reload, console setup, round start, claims, finishes, spawn queue,
/// expedition clock, shutdown, re-offers, console pushes, ship saves and
/// metrics. Callers drain outbound events themselves.
pub fn run_tick(app: &mut App) {
    app.update();
}
