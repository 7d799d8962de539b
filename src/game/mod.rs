//! Game simulation modules

pub mod ai;
pub mod bag;
pub mod combat;
pub mod error;
pub mod phase;
pub mod physics;
pub mod room;
pub mod snapshot;
pub mod state;
pub mod tuning;

pub use error::{RoomError, SimError};
pub use room::{JoinOutcome, Room, RoomHandle, RoomSettings, RoomStatus};
