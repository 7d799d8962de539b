//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::state::{Animation, BackgroundKey, Phase, Quickening, Slot};

/// Playable roster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Character {
    #[serde(rename = "The Potzer")]
    Potzer,
    #[serde(rename = "The Kylander")]
    Kylander,
    /// Also the persona worn by the swap slot during the special level
    #[serde(rename = "Darichris")]
    Darichris,
}

impl Character {
    pub const ROSTER: [Character; 3] = [Character::Potzer, Character::Kylander, Character::Darichris];
    pub const BOSS: Character = Character::Darichris;

    pub fn name(self) -> &'static str {
        match self {
            Character::Potzer => "The Potzer",
            Character::Kylander => "The Kylander",
            Character::Darichris => "Darichris",
        }
    }

    /// Exact roster lookup; anything else is not a character.
    pub fn from_name(name: &str) -> Option<Character> {
        Self::ROSTER.into_iter().find(|c| c.name() == name)
    }
}

/// Single player against the opponent policy, or two humans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    #[serde(alias = "one", alias = "ONE", alias = "SINGLE")]
    Single,
    #[serde(alias = "TWO")]
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
    #[serde(other)]
    Unknown,
}

/// One intent inside an `actions` batch. Unknown types decode to `Unknown` and are skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Move { direction: Direction },
    Jump,
    Duck {
        #[serde(default)]
        active: bool,
    },
    Attack,
    #[serde(other)]
    Unknown,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Leave the title screen for mode selection
    OpenModeSelect,

    SelectMode { mode: GameMode },

    SelectCharacter { name: String },

    /// Batch of combat intents for the sender's combatant
    Actions { actions: Vec<Action> },

    ChangeBackground,

    /// Full reset that keeps connected players in their slots
    ReturnToTitle,

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Slot binding for this connection, with the state at binding time
    SlotAssigned { slot: Slot, state: RoomSnapshot },

    /// Periodic full room state
    RoomState { state: RoomSnapshot },

    /// Both human slots are taken; the connection is closed after this
    RoomFull { message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Audio/visual cues raised by the simulation since the previous snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    /// Swing that found nothing, or was ducked
    Whoosh,
    Hit,
    Clash,
    /// Both combatants swinging at once
    SwordEffects,
}

/// Full room state in a snapshot
#[derive(Debug, Clone, Serialize)]
pub struct RoomSnapshot {
    /// Server tick number
    pub tick: u64,
    pub phase: Phase,
    pub phase_timer_ms: f32,
    pub score_a: u32,
    pub score_b: u32,
    pub round_winner: Option<Slot>,
    pub match_winner: Option<Slot>,
    pub special_level_active: bool,
    pub special_swap_slot: Option<Slot>,
    pub background_key: BackgroundKey,
    pub background_index: u8,
    pub mode: Option<GameMode>,
    pub ai_active: bool,
    /// Slot A has chosen in two-player mode and slot B is not connected yet
    pub waiting_for_b: bool,
    pub quickening: Quickening,
    pub clash_flash_ticks: u32,
    pub victory_cue_index: Option<u8>,
    pub church_victory_index: u8,
    pub combatants: Vec<CombatantSnapshot>,
    pub effects: Vec<Effect>,
}

/// Combatant state in a snapshot
#[derive(Debug, Clone, Serialize)]
pub struct CombatantSnapshot {
    pub slot: Slot,
    /// Driven by the opponent policy
    pub synthetic: bool,
    pub base_identity: Option<Character>,
    pub display_identity: Option<Character>,
    pub x: f32,
    pub y: f32,
    pub vertical_velocity: f32,
    pub facing: i8,
    /// Health (0-100)
    pub health: i32,
    pub is_attacking: bool,
    pub is_ducking: bool,
    pub is_jumping: bool,
    pub animation: Animation,
    pub attack_timer: u32,
    pub cooldown_timer: u32,
    pub knockback_timer: u32,
}
