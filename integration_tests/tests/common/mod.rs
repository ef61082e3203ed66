#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use bevy::prelude::*;
use expedition_sim::{
    build_app_with_config, run_tick, spawn_map, spawn_station, DefaultMap, ExpeditionConfig,
    ExpeditionData, StationData, StationLayout,
};

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Fast clock: 100ms ticks, half a second of travel, 30s/60s lockouts.
pub fn test_config() -> Arc<ExpeditionConfig> {
    let config = ExpeditionConfig::from_file(&fixture_path("expedition_config.json"))
        .expect("fixture config parses");
    Arc::new(config)
}

pub struct Station {
    pub app: App,
    pub layout: StationLayout,
}

impl Station {
    /// One station on the default map, already ticked once so its console
    /// holds a catalog.
    pub fn new() -> Self {
        let mut app = build_app_with_config(test_config());
        let map = spawn_map(&mut app.world);
        app.world.resource_mut::<DefaultMap>().0 = Some(map);
        app.world.spawn(StationData::default());
        let layout = spawn_station(&mut app.world, map, "Pioneer");
        run_tick(&mut app);
        Self { app, layout }
    }

    pub fn data(&self) -> &ExpeditionData {
        self.app
            .world
            .get::<ExpeditionData>(self.layout.grid)
            .expect("station carries expedition data")
    }

    pub fn send<E: Event>(&mut self, event: E) {
        self.app.world.resource_mut::<Events<E>>().send(event);
    }

    pub fn tick(&mut self) {
        run_tick(&mut self.app);
    }

    /// Ticks until `done` holds, giving up after `max` ticks.
    pub fn tick_until(&mut self, max: usize, mut done: impl FnMut(&App) -> bool) -> bool {
        for _ in 0..max {
            self.tick();
            if done(&self.app) {
                return true;
            }
        }
        false
    }

    /// Mission index on the given difficulty tier.
    pub fn mission_on(&self, difficulty: &str) -> u32 {
        self.data()
            .missions
            .values()
            .find(|mission| mission.difficulty.as_str() == difficulty)
            .map(|mission| mission.index)
            .expect("catalog offers the tier")
    }
}

/// Every event of type `E` still buffered in the world.
pub fn buffered<E: Event + Clone>(app: &App) -> Vec<E> {
    let events = app.world.resource::<Events<E>>();
    let mut reader = events.get_reader();
    reader.read(events).cloned().collect()
}
