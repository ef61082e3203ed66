use std::time::Duration;

use bevy::prelude::*;
use rand::{rngs::SmallRng, SeedableRng};

use crate::expedition_config::ExpeditionConfigHandle;

/// Game clock shared by offers, cooldowns and expedition deadlines.
///
/// Advances by the configured tick length on every update so that runs are
/// reproducible regardless of wall-clock speed.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpeditionClock {
    pub now: Duration,
    pub tick: u64,
}

impl ExpeditionClock {
    pub fn at(now: Duration) -> Self {
        Self { now, tick: 0 }
    }

    pub fn advance(&mut self, step: Duration) {
        self.now += step;
        self.tick = self.tick.wrapping_add(1);
    }
}

/// Random source for catalog generation.
#[derive(Resource, Debug, Clone)]
pub struct ExpeditionRng(pub SmallRng);

impl ExpeditionRng {
    pub fn from_seed(seed: u64) -> Self {
        Self(SmallRng::seed_from_u64(seed))
    }
}

/// Map that ghosts are returned to when an expedition map is torn down.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct DefaultMap(pub Option<Entity>);

/// Staging map that saved ships are moved onto before export.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct ShipyardMap(pub Option<Entity>);

pub fn advance_clock(config: Res<ExpeditionConfigHandle>, mut clock: ResMut<ExpeditionClock>) {
    clock.advance(config.config().tick_length());
}
