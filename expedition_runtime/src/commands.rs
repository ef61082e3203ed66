/// Commands accepted by the headless expedition server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandPayload {
    /// Advance the simulation by `steps` ticks.
    Tick { steps: u32 },
    /// Claim mission `index` from a console. Without a console the server's
    /// default console is used.
    Claim {
        index: u32,
        console_bits: Option<u64>,
    },
    /// Request an early finish of the running expedition.
    Finish { console_bits: Option<u64> },
    RoundStart,
    /// Save the shuttle referenced by the deed in a shipyard console.
    SaveShip { console_bits: u64, actor_bits: u64 },
    Status,
}

impl CommandPayload {
    pub fn verb(&self) -> &'static str {
        match self {
            CommandPayload::Tick { .. } => "tick",
            CommandPayload::Claim { .. } => "claim",
            CommandPayload::Finish { .. } => "finish",
            CommandPayload::RoundStart => "round_start",
            CommandPayload::SaveShip { .. } => "save_ship",
            CommandPayload::Status => "status",
        }
    }
}
