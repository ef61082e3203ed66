mod common;

use std::time::Duration;

use anyhow::{ensure, Context, Result};
use common::Station;
use expedition_sim::{
    ExpeditionClock, MapGrid, ReparentRetry, RoundStarted, StationData, StationMember,
};

#[test]
fn round_start_resets_every_station_and_adopts_orphans() -> Result<()> {
    let mut station = Station::new();
    let before: Vec<u32> = station.data().missions.keys().copied().collect();
    let stray = station.app.world.spawn(MapGrid::named("Derelict")).id();

    station.send(RoundStarted);
    station.tick();

    let now = station.app.world.resource::<ExpeditionClock>().now;
    let data = station.data();
    ensure!(data.missions.len() == 4);
    ensure!(data.missions.keys().all(|index| !before.contains(index)));
    ensure!(data.active_mission == 0);
    ensure!(!data.cooldown && !data.claimed && !data.can_finish);
    ensure!(data.next_offer == now + Duration::from_secs(30));

    let retry = station.app.world.resource::<ReparentRetry>();
    ensure!(!retry.is_pending());

    let mut owners = station.app.world.query::<(bevy::prelude::Entity, &StationData)>();
    let (owner, owned) = owners
        .iter(&station.app.world)
        .next()
        .map(|(entity, data)| (entity, data.grids.clone()))
        .context("primary station exists")?;
    ensure!(owned.contains(&stray));
    ensure!(owned.contains(&station.layout.grid));
    let member = station.app.world.get::<StationMember>(stray).copied();
    ensure!(member == Some(StationMember { station: owner }));
    Ok(())
}
