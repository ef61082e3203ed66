//! Console presentation: turns station data into UI state snapshots.

use std::collections::BTreeMap;

use bevy::prelude::*;
use expedition_runtime::ExpeditionConsoleState;

use crate::{
    components::{ConsoleUi, ExpeditionConsole, ExpeditionData, FtlTravel, Placement},
    lifecycle::{station_of, ConsoleRefresh},
};

#[derive(Event, Debug, Clone, PartialEq)]
pub struct ConsoleStatePushed {
    pub console: Entity,
    pub station: Entity,
    pub state: ExpeditionConsoleState,
}

pub fn console_state(data: &ExpeditionData) -> ExpeditionConsoleState {
    ExpeditionConsoleState {
        next_offer: data.next_offer,
        claimed: data.claimed,
        cooldown: data.cooldown,
        active_mission: data.active_mission,
        missions: data.missions.values().cloned().collect(),
        can_finish: data.can_finish,
        cooldown_time: data.cooldown_time,
    }
}

/// Collapses the tick's refresh requests into one push per console.
/// The flag records whether a direct console refresh asked for the
/// travelling-grid lockout.
fn collect_targets<'a, I>(
    refreshes: impl IntoIterator<Item = &'a ConsoleRefresh>,
    consoles: I,
) -> BTreeMap<Entity, bool>
where
    I: IntoIterator<Item = (Entity, Entity)> + Clone,
{
    let mut targets = BTreeMap::new();
    for refresh in refreshes {
        match *refresh {
            ConsoleRefresh::Station(station) => {
                for (console, bound) in consoles.clone() {
                    if bound == station {
                        targets.entry(console).or_insert(false);
                    }
                }
            }
            ConsoleRefresh::Console(console) => {
                targets.insert(console, true);
            }
        }
    }
    targets
}

pub fn push_console_states(
    mut refreshes: EventReader<ConsoleRefresh>,
    stations: Query<&ExpeditionData>,
    travelling: Query<(), With<FtlTravel>>,
    mut consoles: Query<
        (Entity, Option<&Placement>, Option<&mut ConsoleUi>),
        With<ExpeditionConsole>,
    >,
    mut pushed: EventWriter<ConsoleStatePushed>,
) {
    if refreshes.is_empty() {
        return;
    }
    let bindings: Vec<(Entity, Entity)> = consoles
        .iter()
        .map(|(console, placement, _)| (console, station_of(console, placement)))
        .collect();
    let targets = collect_targets(refreshes.read(), bindings.iter().copied());

    for (console, lockout) in targets {
        let Ok((_, placement, ui)) = consoles.get_mut(console) else {
            continue;
        };
        let Some(mut ui) = ui else {
            continue;
        };
        let station = station_of(console, placement);

        let mut state = match stations.get(station) {
            Ok(data) => console_state(data),
            Err(_) => ExpeditionConsoleState::unavailable(),
        };
        if lockout && travelling.contains(station) {
            state.cooldown = true;
        }

        ui.set_state(state.clone());
        pushed.send(ConsoleStatePushed {
            console,
            station,
            state,
        });
    }
}
