use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use bevy::{math::Vec2, prelude::*};
use expedition_runtime::{ExpeditionConsoleState, MissionParams};

/// Where an entity sits: the map it is on and the grid carrying it, if any.
///
/// A grid's own placement names itself as its grid.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub map: Entity,
    pub grid: Option<Entity>,
    pub position: Vec2,
    pub rotation: f32,
}

impl Placement {
    pub fn on_grid(map: Entity, grid: Entity) -> Self {
        Self {
            map,
            grid: Some(grid),
            position: Vec2::ZERO,
            rotation: 0.0,
        }
    }

    pub fn floating(map: Entity) -> Self {
        Self {
            map,
            grid: None,
            position: Vec2::ZERO,
            rotation: 0.0,
        }
    }

    pub fn is_aboard(&self, grid: Entity) -> bool {
        self.grid == Some(grid)
    }
}

/// Root entity of a map.
#[derive(Component, Debug, Default, Clone, Copy)]
pub struct MapRoot;

/// A grid (ship or station hull) that other entities can stand on.
#[derive(Component, Debug, Clone, Default)]
pub struct MapGrid {
    pub name: String,
}

impl MapGrid {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Station-level record of the grids a station owns.
#[derive(Component, Debug, Clone, Default)]
pub struct StationData {
    pub grids: BTreeSet<Entity>,
}

/// Marks a grid as belonging to a station.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationMember {
    pub station: Entity,
}

/// Present on a grid while it is travelling to an expedition map.
#[derive(Component, Debug, Clone, Copy)]
pub struct FtlTravel {
    pub destination: Entity,
    pub arrival: Duration,
}

/// Per-station expedition state: offered catalog, active mission and timers.
#[derive(Component, Debug, Clone)]
pub struct ExpeditionData {
    pub missions: BTreeMap<u32, MissionParams>,
    pub next_index: u32,
    /// Index of the claimed mission, 0 when none.
    pub active_mission: u32,
    pub claimed: bool,
    pub cooldown: bool,
    pub cooldown_time: Duration,
    pub next_offer: Duration,
    pub can_finish: bool,
}

impl Default for ExpeditionData {
    fn default() -> Self {
        Self {
            missions: BTreeMap::new(),
            next_index: 1,
            active_mission: 0,
            claimed: false,
            cooldown: false,
            cooldown_time: Duration::ZERO,
            next_offer: Duration::ZERO,
            can_finish: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpeditionStage {
    Generating,
    Active,
    FinalCountdown,
    Terminated,
}

/// A spawned expedition map. Lives on the map root entity.
#[derive(Component, Debug, Clone)]
pub struct ExpeditionWorld {
    pub stage: ExpeditionStage,
    pub arrival_time: Duration,
    pub end_time: Duration,
    /// Owning station grid. Not ownership: the station outlives the world.
    pub station: Entity,
    pub home_map: Entity,
    pub mission: MissionParams,
    pub completed: bool,
}

/// Console through which a station claims and finishes expeditions.
#[derive(Component, Debug, Clone)]
pub struct ExpeditionConsole {
    pub error_sound: String,
}

impl Default for ExpeditionConsole {
    fn default() -> Self {
        Self {
            error_sound: "/Audio/Effects/Cargo/buzz_sigh.ogg".to_string(),
        }
    }
}

/// UI surface of a console; receives pushed state snapshots.
#[derive(Component, Debug, Clone, Default)]
pub struct ConsoleUi {
    pub state: Option<ExpeditionConsoleState>,
    pub revision: u64,
}

impl ConsoleUi {
    pub fn set_state(&mut self, state: ExpeditionConsoleState) {
        self.state = Some(state);
        self.revision = self.revision.wrapping_add(1);
    }
}

#[derive(Bundle, Debug, Clone)]
pub struct ExpeditionConsoleBundle {
    pub console: ExpeditionConsole,
    pub ui: ConsoleUi,
    pub placement: Placement,
}

impl ExpeditionConsoleBundle {
    pub fn new(placement: Placement) -> Self {
        Self {
            console: ExpeditionConsole::default(),
            ui: ConsoleUi::default(),
            placement,
        }
    }
}

/// Controlling mind of a mob; `has_mind` is false once the player ghosts.
#[derive(Component, Debug, Clone, Copy)]
pub struct Mind {
    pub has_mind: bool,
}

/// A living creature.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct MobState;

/// Mob currently driven by NPC behaviour.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct ActiveNpc;

/// Expedition fauna that may never leave its map.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct SalvageMobRestrictions;

#[derive(Component, Debug, Clone, Default)]
pub struct NpcFactionMember {
    pub hostile_factions: BTreeSet<String>,
}

impl NpcFactionMember {
    pub fn hostile_to(factions: &[&str]) -> Self {
        Self {
            hostile_factions: factions.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn is_hostile_to(&self, faction: &str) -> bool {
        self.hostile_factions.contains(faction)
    }
}

#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Ghost;

/// Connected player session bound to an entity.
#[derive(Component, Debug, Clone)]
pub struct PlayerSession {
    pub user_id: String,
    pub name: String,
}

/// Session input binding. Not persisted with saved grids.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Actor;

/// Session camera binding. Not persisted with saved grids.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Eye;

#[derive(Component, Debug, Clone, Default)]
pub struct ShipyardConsole {
    /// ID card inserted in the console slot.
    pub target_id: Option<Entity>,
}

/// Ownership record of a shuttle, carried on an ID card.
#[derive(Component, Debug, Clone, Default)]
pub struct ShuttleDeed {
    pub shuttle: Option<Entity>,
    pub shuttle_name: Option<String>,
}
