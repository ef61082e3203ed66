mod common;

use std::time::Duration;

use anyhow::{ensure, Context, Result};
use common::{buffered, Station};
use expedition_sim::{
    ClaimMission, ConsoleDenied, ExpeditionAnnouncement, ExpeditionClock, ExpeditionRegistry,
    ExpeditionStage, ExpeditionWorld, FinishDenial, FinishMission, Mind, MobState, Placement,
};

fn arrived_station() -> Result<(Station, bevy::prelude::Entity)> {
    let mut station = Station::new();
    let layout = station.layout;
    let index = station.mission_on("Long");
    station.send(ClaimMission {
        console: layout.console,
        index,
    });
    let grid = layout.grid;
    let arrived = station.tick_until(30, |app| {
        app.world
            .resource::<ExpeditionRegistry>()
            .world_for_station(grid)
            .and_then(|world| app.world.get::<ExpeditionWorld>(world))
            .is_some_and(|world| world.stage == ExpeditionStage::Active)
    });
    ensure!(arrived, "expedition should arrive");
    let world = station
        .app
        .world
        .resource::<ExpeditionRegistry>()
        .world_for_station(grid)
        .context("expedition world registered")?;
    Ok((station, world))
}

#[test]
fn crew_left_behind_blocks_departure() -> Result<()> {
    let (mut station, world) = arrived_station()?;
    let console = station.layout.console;
    let straggler = station
        .app
        .world
        .spawn((MobState, Mind { has_mind: true }, Placement::floating(world)))
        .id();

    station.send(FinishMission { console });
    station.tick();

    let denials = buffered::<ConsoleDenied>(&station.app);
    ensure!(denials.len() == 1);
    ensure!(denials[0].reason == FinishDenial::NotEveryoneAboard { target: straggler });
    ensure!(station.data().can_finish, "a denied request keeps the button");
    let stage = station.app.world.get::<ExpeditionWorld>(world).map(|w| w.stage);
    ensure!(stage == Some(ExpeditionStage::Active));
    Ok(())
}

#[test]
fn boarding_then_finishing_shortens_the_run_once() -> Result<()> {
    let (mut station, world) = arrived_station()?;
    let layout = station.layout;
    let crew = station
        .app
        .world
        .spawn((MobState, Mind { has_mind: true }, Placement::floating(world)))
        .id();
    if let Some(mut placement) = station.app.world.get_mut::<Placement>(crew) {
        placement.grid = Some(layout.grid);
    }

    station.send(FinishMission {
        console: layout.console,
    });
    station.tick();

    let now = station.app.world.resource::<ExpeditionClock>().now;
    let expedition = station
        .app
        .world
        .get::<ExpeditionWorld>(world)
        .context("world still running")?;
    ensure!(expedition.stage == ExpeditionStage::FinalCountdown);
    ensure!(expedition.end_time == now + Duration::from_secs(2));
    ensure!(!station.data().can_finish);
    ensure!(buffered::<ExpeditionAnnouncement>(&station.app)
        .iter()
        .any(|a| a.message == "Expedition ending early, departing in 2 seconds."));

    station.send(FinishMission {
        console: layout.console,
    });
    station.tick();
    let denials = buffered::<ConsoleDenied>(&station.app);
    ensure!(denials.iter().any(|d| d.reason == FinishDenial::NotEligible));

    let ended = station.tick_until(40, |app| app.world.get_entity(world).is_none());
    ensure!(ended);
    let crew_map = station.app.world.get::<Placement>(crew).map(|p| p.map);
    ensure!(crew_map == Some(layout.map), "crew aboard come home with the grid");
    ensure!(station.data().cooldown_time == Duration::from_secs(30));
    Ok(())
}
