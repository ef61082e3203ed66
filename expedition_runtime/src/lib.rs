//! Shared data contracts for salvage expeditions.
//!
//! This crate holds the types exchanged between the simulation server and
//! expedition consoles (mission descriptors, console state snapshots, the
//! text command surface) without depending on the Bevy runtime in
//! `expedition_sim`.

mod command_text;
mod commands;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use command_text::{parse_command_line, CommandParseError};
pub use commands::CommandPayload;

/// Identifier of the tier every station falls back to when no tiers are configured.
pub const DEFAULT_DIFFICULTY: &str = "NFModerate";

/// Named difficulty tier identifier (e.g. `NFHazardous`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DifficultyId(pub String);

impl DifficultyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DifficultyId {
    fn default() -> Self {
        Self(DEFAULT_DIFFICULTY.to_string())
    }
}

impl fmt::Display for DifficultyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DifficultyId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Objective family of an expedition.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MissionType {
    #[default]
    Destruction,
    Elimination,
}

impl MissionType {
    pub const ALL: [MissionType; 2] = [MissionType::Destruction, MissionType::Elimination];

    pub fn as_str(self) -> &'static str {
        match self {
            MissionType::Destruction => "destruction",
            MissionType::Elimination => "elimination",
        }
    }
}

impl fmt::Display for MissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One offered or active mission. Immutable once generated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MissionParams {
    pub index: u32,
    pub mission_type: MissionType,
    pub seed: u32,
    pub difficulty: DifficultyId,
}

/// Read-only view of a station's expedition data pushed to its consoles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpeditionConsoleState {
    pub next_offer: Duration,
    pub claimed: bool,
    pub cooldown: bool,
    pub active_mission: u32,
    pub missions: Vec<MissionParams>,
    pub can_finish: bool,
    pub cooldown_time: Duration,
}

impl ExpeditionConsoleState {
    /// State shown by a console whose station has no expedition data.
    /// Buttons stay disabled until the station is initialised.
    pub fn unavailable() -> Self {
        Self {
            next_offer: Duration::ZERO,
            claimed: false,
            cooldown: true,
            active_mission: 0,
            missions: Vec::new(),
            can_finish: false,
            cooldown_time: Duration::from_secs(1),
        }
    }

    pub fn mission(&self, index: u32) -> Option<&MissionParams> {
        self.missions.iter().find(|mission| mission.index == index)
    }
}

/// Wire frame carrying a console state update to connected clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleFrame {
    pub console: u64,
    pub station: u64,
    pub state: ExpeditionConsoleState,
}

impl ConsoleFrame {
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
