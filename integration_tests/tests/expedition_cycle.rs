mod common;

use std::time::Duration;

use anyhow::{ensure, Context, Result};
use bevy::prelude::*;
use common::{buffered, Station};
use expedition_sim::{
    ClaimMission, ExpeditionAnnouncement, ExpeditionClock, ExpeditionData, ExpeditionRegistry,
    ExpeditionStage, ExpeditionWorld, FtlTravel, Placement,
};

fn world_of(app: &App, station: Entity) -> Option<Entity> {
    app.world
        .resource::<ExpeditionRegistry>()
        .world_for_station(station)
}

fn now(app: &App) -> Duration {
    app.world.resource::<ExpeditionClock>().now
}

#[test]
fn claimed_mission_travels_runs_and_returns_home() -> Result<()> {
    let mut station = Station::new();
    let layout = station.layout;
    let index = station.mission_on("Short");

    station.send(ClaimMission {
        console: layout.console,
        index,
    });
    station.tick();
    ensure!(station.data().claimed, "claim should be recorded");
    ensure!(station.data().active_mission == index);

    station.tick_until(20, |app| world_of(app, layout.grid).is_some());
    let world = world_of(&station.app, layout.grid).context("expedition world spawned")?;

    let grid_map = station.app.world.get::<Placement>(layout.grid).map(|p| p.map);
    let console_map = station.app.world.get::<Placement>(layout.console).map(|p| p.map);
    ensure!(grid_map == Some(world), "grid should be on the expedition map");
    ensure!(console_map == Some(world), "console travels with its grid");

    let arrived = station.tick_until(20, |app| {
        app.world
            .get::<ExpeditionWorld>(world)
            .is_some_and(|world| world.stage == ExpeditionStage::Active)
    });
    ensure!(arrived, "expedition should arrive after the travel time");
    ensure!(station.data().can_finish);
    ensure!(station.app.world.get::<FtlTravel>(layout.grid).is_none());
    let announcements = buffered::<ExpeditionAnnouncement>(&station.app);
    ensure!(
        announcements
            .iter()
            .any(|a| a.map == world && a.message.starts_with("Expedition arrived")),
        "arrival should be announced on the expedition map"
    );

    let ended = station.tick_until(80, |app| app.world.get_entity(world).is_none());
    ensure!(ended, "expedition should end on its own clock");

    let home = station.app.world.get::<Placement>(layout.grid).map(|p| p.map);
    ensure!(home == Some(layout.map), "grid should be back on its home map");
    let data = station.data();
    ensure!(data.cooldown);
    ensure!(!data.can_finish);
    ensure!(data.active_mission == 0);
    ensure!(data.cooldown_time == Duration::from_secs(30));
    ensure!(data.next_offer == now(&station.app) + Duration::from_secs(30));
    Ok(())
}

#[test]
fn cooldown_ends_with_a_fresh_catalog() -> Result<()> {
    let mut station = Station::new();
    let layout = station.layout;
    let index = station.mission_on("Short");

    station.send(ClaimMission {
        console: layout.console,
        index,
    });
    station.tick_until(20, |app| world_of(app, layout.grid).is_some());
    let world = world_of(&station.app, layout.grid).context("expedition world spawned")?;
    station.tick_until(100, |app| app.world.get_entity(world).is_none());
    ensure!(station.data().cooldown);

    let grid = layout.grid;
    let reoffered = station.tick_until(400, |app| {
        app.world
            .get::<ExpeditionData>(grid)
            .is_some_and(|data| !data.cooldown)
    });
    ensure!(reoffered, "station should offer missions again after the lockout");

    let data = station.data();
    ensure!(!data.claimed);
    ensure!(data.missions.len() == 4);
    ensure!(data.missions.keys().all(|&fresh| fresh > index));
    Ok(())
}

#[test]
fn deleting_the_expedition_map_applies_the_failure_lockout() -> Result<()> {
    let mut station = Station::new();
    let layout = station.layout;
    let index = station.mission_on("Long");

    station.send(ClaimMission {
        console: layout.console,
        index,
    });
    station.tick_until(20, |app| world_of(app, layout.grid).is_some());
    let world = world_of(&station.app, layout.grid).context("expedition world spawned")?;
    station.tick_until(20, |app| {
        app.world
            .get::<ExpeditionWorld>(world)
            .is_some_and(|world| world.is_running())
    });

    let wreck = station.app.world.spawn(Placement::floating(world)).id();
    station.app.world.despawn(world);
    station.tick();

    ensure!(
        station.app.world.get_entity(wreck).is_none(),
        "loose entities go with the map"
    );
    let home = station.app.world.get::<Placement>(layout.grid).map(|p| p.map);
    ensure!(home == Some(layout.map));
    ensure!(station.data().cooldown_time == Duration::from_secs(60));
    ensure!(station.app.world.resource::<ExpeditionRegistry>().is_empty());
    Ok(())
}
