//! Simulation errors surfaced to the tick loop

use super::state::{Phase, Slot};

/// A tick could not complete. The room loop logs these and carries on.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("No combatant bound to slot {slot:?} during {phase:?}")]
    MissingCombatant { slot: Slot, phase: Phase },
}

/// The room loop is gone; callers drop the connection.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("Room loop has stopped")]
    Closed,
}
