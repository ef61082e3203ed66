//! Helpers for laying out maps and station grids in a world.

use bevy::prelude::*;

use crate::components::{ConsoleUi, ExpeditionConsoleBundle, MapGrid, MapRoot, Placement};

/// Entities making up one station: its map, hull grid and expedition console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationLayout {
    pub map: Entity,
    pub grid: Entity,
    pub console: Entity,
}

pub fn spawn_map(world: &mut World) -> Entity {
    world.spawn(MapRoot).id()
}

/// Spawns a grid on `map` with an expedition console aboard. The console is
/// picked up by the lifecycle systems on the next update.
pub fn spawn_station(world: &mut World, map: Entity, name: &str) -> StationLayout {
    let grid = world.spawn(MapGrid::named(name)).id();
    world.entity_mut(grid).insert(Placement::on_grid(map, grid));
    let console = world
        .spawn(ExpeditionConsoleBundle::new(Placement::on_grid(map, grid)))
        .id();
    StationLayout { map, grid, console }
}

/// Latest state pushed to a console, if any.
pub fn console_view(world: &World, console: Entity) -> Option<&ConsoleUi> {
    world.get::<ConsoleUi>(console)
}
