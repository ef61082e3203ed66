//! Saving a player's shuttle from a shipyard console.
//!
//! The grid is parked on the shipyard map, stripped of session bindings,
//! exported, handed back to the player and then removed from the world
//! together with every deed that points at it.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::{ecs::system::SystemParam, math::Vec2, prelude::*};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    components::{
        Actor, ExpeditionConsole, Eye, MapGrid, MobState, Placement, PlayerSession,
        ShipyardConsole, ShuttleDeed,
    },
    expedition_config::ExpeditionConfigHandle,
    resources::ShipyardMap,
};

const SHIPYARD_TARGET: &str = "salvage::shipyard";

pub const UNKNOWN_SHIP_NAME: &str = "Unknown_Ship";

/// Parking spot on the shipyard map, clear of purchased shuttles.
pub const SHIPYARD_OFFSET: Vec2 = Vec2::new(500.0, 1.0);

#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveShipRequest {
    pub console: Entity,
    pub actor: Option<Entity>,
}

/// Exported ship contents sent to the requesting player.
#[derive(Event, Debug, Clone, PartialEq)]
pub struct ShipSaveData {
    pub player: Entity,
    pub user_id: String,
    pub ship_name: String,
    pub contents: String,
}

#[derive(Event, Debug, Clone, PartialEq)]
pub struct ShipSaved {
    pub grid: Entity,
    pub ship_name: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedEntity {
    pub position: [f32; 2],
    pub rotation: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedGrid {
    pub name: String,
    pub entities: Vec<SavedEntity>,
}

#[derive(Debug, Error)]
pub enum GridExportError {
    #[error("failed to serialize grid: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write grid export to {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Writes a grid snapshot somewhere it can be read back from `path`.
pub trait GridExporter: Send + Sync {
    fn export(&self, grid: &SavedGrid, path: &Path) -> Result<(), GridExportError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonGridExporter;

impl GridExporter for JsonGridExporter {
    fn export(&self, grid: &SavedGrid, path: &Path) -> Result<(), GridExportError> {
        let encoded = serde_json::to_string_pretty(grid)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| GridExportError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, encoded).map_err(|source| GridExportError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Resource, Clone)]
pub struct GridExporterHandle(pub Arc<dyn GridExporter>);

impl GridExporterHandle {
    pub fn new(exporter: impl GridExporter + 'static) -> Self {
        Self(Arc::new(exporter))
    }
}

impl Default for GridExporterHandle {
    fn default() -> Self {
        Self::new(JsonGridExporter)
    }
}

#[derive(Debug, Error)]
pub enum ShipSaveError {
    #[error("save request has no actor")]
    NoActor,
    #[error("{0:?} is not a shipyard console")]
    NotAShipyardConsole(Entity),
    #[error("no ID card in shipyard console slot")]
    NoIdCard,
    #[error("ID card {0:?} does not carry a shuttle deed")]
    NoDeed(Entity),
    #[error("shuttle deed does not reference a shuttle")]
    InvalidShuttle,
    #[error("shuttle {0:?} is not a grid")]
    NotAGrid(Entity),
    #[error("no player session bound to {0:?}")]
    NoSession(Entity),
    #[error("shipyard map is not available")]
    NoShipyardMap,
    #[error(transparent)]
    Export(#[from] GridExportError),
    #[error("failed to read exported grid from {path:?}: {source}")]
    ReadBack {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(SystemParam)]
pub struct ShipSaveParams<'w, 's> {
    pub config: Res<'w, ExpeditionConfigHandle>,
    pub exporter: Res<'w, GridExporterHandle>,
    pub shipyard: Res<'w, ShipyardMap>,
    pub consoles: Query<'w, 's, &'static ShipyardConsole>,
    pub deeds: Query<'w, 's, (Entity, &'static ShuttleDeed)>,
    pub grids: Query<'w, 's, &'static MapGrid>,
    pub sessions: Query<'w, 's, &'static PlayerSession>,
    pub placements: Query<
        'w,
        's,
        (
            Entity,
            &'static mut Placement,
            Has<MobState>,
            Has<ExpeditionConsole>,
            Has<Actor>,
            Has<Eye>,
        ),
    >,
}

struct ValidatedSave {
    actor: Entity,
    grid: Entity,
    ship_name: String,
    user_id: String,
    player_name: String,
}

/// File name for an export; anything outside `[A-Za-z0-9 _-]` becomes `_`.
pub fn export_file_name(ship_name: &str) -> String {
    let stem: String = ship_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = stem.trim();
    if stem.is_empty() {
        format!("{UNKNOWN_SHIP_NAME}.json")
    } else {
        format!("{stem}.json")
    }
}

fn validate(
    params: &ShipSaveParams,
    request: &SaveShipRequest,
) -> Result<ValidatedSave, ShipSaveError> {
    let actor = request.actor.ok_or(ShipSaveError::NoActor)?;
    let console = params
        .consoles
        .get(request.console)
        .map_err(|_| ShipSaveError::NotAShipyardConsole(request.console))?;
    let card = console.target_id.ok_or(ShipSaveError::NoIdCard)?;
    let (_, deed) = params
        .deeds
        .get(card)
        .map_err(|_| ShipSaveError::NoDeed(card))?;
    let grid = deed.shuttle.ok_or(ShipSaveError::InvalidShuttle)?;
    if !params.grids.contains(grid) {
        return Err(ShipSaveError::NotAGrid(grid));
    }
    let session = params
        .sessions
        .get(actor)
        .map_err(|_| ShipSaveError::NoSession(actor))?;

    Ok(ValidatedSave {
        actor,
        grid,
        ship_name: deed
            .shuttle_name
            .clone()
            .unwrap_or_else(|| UNKNOWN_SHIP_NAME.to_string()),
        user_id: session.user_id.clone(),
        player_name: session.name.clone(),
    })
}

fn save_ship(
    commands: &mut Commands,
    params: &mut ShipSaveParams,
    request: &SaveShipRequest,
    save_data: &mut EventWriter<ShipSaveData>,
    saved: &mut EventWriter<ShipSaved>,
) -> Result<(), ShipSaveError> {
    let save = validate(params, request)?;
    let shipyard = params.shipyard.0.ok_or(ShipSaveError::NoShipyardMap)?;
    let grid = save.grid;

    tracing::info!(
        target: SHIPYARD_TARGET,
        ship = %save.ship_name,
        player = %save.player_name,
        "ship_save.started"
    );

    let mut entities = Vec::new();
    let mut aboard = Vec::new();
    let mut stripped = 0usize;
    let mut grid_placed = false;
    for (entity, mut placement, mob, console, actor, eye) in params.placements.iter_mut() {
        if entity == grid {
            placement.map = shipyard;
            placement.position = SHIPYARD_OFFSET;
            placement.rotation = 0.0;
            grid_placed = true;
            continue;
        }
        if !placement.is_aboard(grid) {
            continue;
        }
        placement.map = shipyard;
        if actor || eye {
            commands.entity(entity).remove::<(Actor, Eye)>();
            stripped += usize::from(actor) + usize::from(eye);
        }

        let mut tags = Vec::new();
        if mob {
            tags.push("mob".to_string());
        }
        if console {
            tags.push("expedition_console".to_string());
        }
        entities.push((
            entity,
            SavedEntity {
                position: placement.position.to_array(),
                rotation: placement.rotation,
                tags,
            },
        ));
        aboard.push(entity);
    }
    if !grid_placed {
        commands.entity(grid).insert(Placement {
            map: shipyard,
            grid: Some(grid),
            position: SHIPYARD_OFFSET,
            rotation: 0.0,
        });
    }
    tracing::debug!(
        target: SHIPYARD_TARGET,
        grid = ?grid,
        entities = entities.len(),
        stripped,
        "ship_save.cleaned"
    );

    entities.sort_by_key(|(entity, _)| *entity);
    let name = params
        .grids
        .get(grid)
        .map(|grid| grid.name.clone())
        .unwrap_or_else(|_| save.ship_name.clone());
    let snapshot = SavedGrid {
        name,
        entities: entities.into_iter().map(|(_, saved)| saved).collect(),
    };

    let path = params
        .config
        .config()
        .exports_dir()
        .join(export_file_name(&save.ship_name));
    params.exporter.0.export(&snapshot, &path)?;
    let contents = fs::read_to_string(&path).map_err(|source| ShipSaveError::ReadBack {
        path: path.clone(),
        source,
    })?;

    save_data.send(ShipSaveData {
        player: save.actor,
        user_id: save.user_id.clone(),
        ship_name: save.ship_name.clone(),
        contents,
    });
    if let Err(err) = fs::remove_file(&path) {
        tracing::warn!(
            target: SHIPYARD_TARGET,
            path = %path.display(),
            error = %err,
            "ship_save.cleanup_failed"
        );
    }

    for entity in aboard {
        commands.entity(entity).despawn();
    }
    commands.entity(grid).despawn();

    let mut deeds_removed = 0usize;
    for (holder, deed) in params.deeds.iter() {
        if deed.shuttle == Some(grid) {
            commands.entity(holder).remove::<ShuttleDeed>();
            deeds_removed += 1;
        }
    }

    tracing::info!(
        target: SHIPYARD_TARGET,
        ship = %save.ship_name,
        user = %save.user_id,
        deeds_removed,
        "ship_save.completed"
    );
    saved.send(ShipSaved {
        grid,
        ship_name: save.ship_name,
        user_id: save.user_id,
    });
    Ok(())
}

pub fn process_ship_save_requests(
    mut commands: Commands,
    mut requests: EventReader<SaveShipRequest>,
    mut params: ShipSaveParams,
    mut save_data: EventWriter<ShipSaveData>,
    mut saved: EventWriter<ShipSaved>,
) {
    for request in requests.read() {
        if let Err(err) = save_ship(
            &mut commands,
            &mut params,
            request,
            &mut save_data,
            &mut saved,
        ) {
            tracing::warn!(
                target: SHIPYARD_TARGET,
                console = ?request.console,
                error = %err,
                "ship_save.failed"
            );
        }
    }
}
