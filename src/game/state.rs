//! Room data model: match-level state and per-combatant records

use serde::Serialize;
use uuid::Uuid;

use crate::ws::protocol::{Character, Effect, GameMode};

use super::bag::ShuffleBag;
use super::tuning::{
    CHURCH_BG_COUNT, GROUND_LEVEL, MAX_HEALTH, MAX_WINS, SPAWN_X_A, SPAWN_X_B,
    SPRITE_CENTER_OFFSET_Y, VICTORY_BG_COUNT, VICTORY_CUE_COUNT,
};

/// Identifies a WebSocket connection for the lifetime of the socket
pub type ConnectionId = Uuid;

/// Match lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Title,
    ModeSelect,
    CharacterSelectA,
    CharacterSelectB,
    Controls,
    Playing,
    Special,
    ChurchIntro,
    ChurchVictory,
    ChurchVictoryImmediate,
    SpecialEnd,
    Victory,
    Final,
    GameOver,
    Slideshow,
    SlideshowToTitle,
}

impl Phase {
    pub const ALL: [Phase; 16] = [
        Phase::Title,
        Phase::ModeSelect,
        Phase::CharacterSelectA,
        Phase::CharacterSelectB,
        Phase::Controls,
        Phase::Playing,
        Phase::Special,
        Phase::ChurchIntro,
        Phase::ChurchVictory,
        Phase::ChurchVictoryImmediate,
        Phase::SpecialEnd,
        Phase::Victory,
        Phase::Final,
        Phase::GameOver,
        Phase::Slideshow,
        Phase::SlideshowToTitle,
    ];

    /// Phases in which combatants move and fight
    pub fn is_active_play(self) -> bool {
        matches!(self, Phase::Playing | Phase::Special)
    }
}

/// One of the two logical combatant slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }

    fn spawn_x(self) -> f32 {
        match self {
            Slot::A => SPAWN_X_A,
            Slot::B => SPAWN_X_B,
        }
    }

    fn spawn_facing(self) -> i8 {
        match self {
            Slot::A => 1,
            Slot::B => -1,
        }
    }
}

/// Who drives a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupant {
    Human(ConnectionId),
    Synthetic,
}

impl Occupant {
    pub fn connection(self) -> Option<ConnectionId> {
        match self {
            Occupant::Human(id) => Some(id),
            Occupant::Synthetic => None,
        }
    }
}

/// Animation tag consumed by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Animation {
    #[default]
    Idle,
    Walk,
    Jump,
    Duck,
    Attack,
    JumpAttack,
}

/// Celebration running on the phase timer after a knockout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Quickening {
    #[default]
    None,
    Light,
    Dark,
}

impl Quickening {
    pub fn is_active(self) -> bool {
        self != Quickening::None
    }
}

/// Background family selected for the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundKey {
    #[default]
    Paris,
    Church,
    ChurchVictory,
    Victory,
    Slideshow,
}

/// Authoritative state of one combatant
#[derive(Debug, Clone)]
pub struct CombatantState {
    pub slot: Slot,
    pub occupant: Occupant,
    pub base_identity: Option<Character>,
    pub display_identity: Option<Character>,

    // Kinematics
    pub x: f32,
    pub y: f32,
    pub vertical_velocity: f32,
    pub facing: i8,

    pub health: i32,

    // Actions
    pub is_attacking: bool,
    pub is_ducking: bool,
    pub is_jumping: bool,
    pub animation: Animation,
    pub moving_this_tick: bool,

    // Timers (ticks)
    pub attack_timer: u32,
    pub cooldown_timer: u32,
    pub knockback_timer: u32,
    pub duck_ticks: u32,

    pub has_landed_hit_this_attack: bool,
    pub missed_swing: bool,
}

impl CombatantState {
    pub fn new(slot: Slot, occupant: Occupant) -> Self {
        Self {
            slot,
            occupant,
            base_identity: None,
            display_identity: None,
            x: slot.spawn_x(),
            y: GROUND_LEVEL,
            vertical_velocity: 0.0,
            facing: slot.spawn_facing(),
            health: MAX_HEALTH,
            is_attacking: false,
            is_ducking: false,
            is_jumping: false,
            animation: Animation::Idle,
            moving_this_tick: false,
            attack_timer: 0,
            cooldown_timer: 0,
            knockback_timer: 0,
            duck_ticks: 0,
            has_landed_hit_this_attack: false,
            missed_swing: false,
        }
    }

    pub fn with_identity(mut self, identity: Option<Character>) -> Self {
        self.set_identity(identity);
        self
    }

    /// Set the chosen character; the display identity follows it.
    pub fn set_identity(&mut self, identity: Option<Character>) {
        self.base_identity = identity;
        self.display_identity = identity;
    }

    /// Back to the spawn pose with full health for a new round.
    pub fn reset_for_round(&mut self, swap_slot: Option<Slot>) {
        let occupant = self.occupant;
        let base = self.base_identity;
        *self = CombatantState::new(self.slot, occupant);
        self.base_identity = base;
        self.display_identity = if swap_slot == Some(self.slot) {
            Some(Character::BOSS)
        } else {
            base
        };
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    pub fn is_synthetic(&self) -> bool {
        self.occupant == Occupant::Synthetic
    }

    /// Point used for all overlap tests
    pub fn hit_origin(&self) -> (f32, f32) {
        (self.x, self.y - SPRITE_CENTER_OFFSET_Y)
    }

    pub fn can_start_attack(&self) -> bool {
        !self.is_attacking && self.cooldown_timer == 0 && !self.is_ducking
    }

    /// Arm a new swing. `cooldown` is applied up front (used by the opponent policy).
    pub fn start_attack(&mut self, duration: u32, cooldown: Option<u32>) {
        self.is_attacking = true;
        self.attack_timer = duration;
        self.has_landed_hit_this_attack = false;
        self.is_ducking = false;
        self.duck_ticks = 0;
        self.animation = if self.is_jumping {
            Animation::JumpAttack
        } else {
            Animation::Attack
        };
        if let Some(cooldown) = cooldown {
            self.cooldown_timer = cooldown;
        }
    }

    pub fn start_jump(&mut self, velocity: f32) {
        self.is_jumping = true;
        self.vertical_velocity = velocity;
        self.is_ducking = false;
        self.duck_ticks = 0;
        self.animation = if self.is_attacking {
            Animation::JumpAttack
        } else {
            Animation::Jump
        };
    }

    pub fn set_ducking(&mut self, active: bool) {
        self.is_ducking = active;
        self.duck_ticks = 0;
        self.animation = if active { Animation::Duck } else { Animation::Idle };
    }
}

/// The two slots of the room
#[derive(Debug, Clone, Default)]
pub struct Combatants {
    a: Option<CombatantState>,
    b: Option<CombatantState>,
}

impl Combatants {
    pub fn get(&self, slot: Slot) -> Option<&CombatantState> {
        match slot {
            Slot::A => self.a.as_ref(),
            Slot::B => self.b.as_ref(),
        }
    }

    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut CombatantState> {
        match slot {
            Slot::A => self.a.as_mut(),
            Slot::B => self.b.as_mut(),
        }
    }

    /// Both combatants, A first, when both slots are bound
    pub fn pair_mut(&mut self) -> Option<(&mut CombatantState, &mut CombatantState)> {
        match (self.a.as_mut(), self.b.as_mut()) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        }
    }

    pub fn insert(&mut self, combatant: CombatantState) {
        match combatant.slot {
            Slot::A => self.a = Some(combatant),
            Slot::B => self.b = Some(combatant),
        }
    }

    pub fn remove(&mut self, slot: Slot) -> Option<CombatantState> {
        match slot {
            Slot::A => self.a.take(),
            Slot::B => self.b.take(),
        }
    }

    pub fn is_vacant(&self, slot: Slot) -> bool {
        self.get(slot).is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CombatantState> {
        self.a.iter().chain(self.b.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CombatantState> {
        self.a.iter_mut().chain(self.b.iter_mut())
    }

    /// Slot bound to the given connection, if any
    pub fn slot_of(&self, connection_id: ConnectionId) -> Option<Slot> {
        self.iter()
            .find(|c| c.occupant == Occupant::Human(connection_id))
            .map(|c| c.slot)
    }

    pub fn humans(&self) -> impl Iterator<Item = (Slot, ConnectionId)> + '_ {
        self.iter()
            .filter_map(|c| c.occupant.connection().map(|id| (c.slot, id)))
    }

    pub fn human_count(&self) -> usize {
        self.humans().count()
    }
}

/// The single room's authoritative state, owned by the room loop
#[derive(Debug, Clone)]
pub struct MatchState {
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
    /// Last city backdrop shown; advanced at each ordinary round start
    pub city_index: Option<u8>,

    pub combatants: Combatants,

    // Lobby
    pub mode: Option<GameMode>,
    pub ai_active: bool,
    pub selection_complete_a: bool,
    pub selection_complete_b: bool,
    pub waiting_for_b: bool,
    pub chosen_a: Option<Character>,
    pub chosen_b: Option<Character>,

    // Cosmetics and cues
    pub quickening: Quickening,
    pub clash_flash_ticks: u32,
    pub sword_cue_playing: bool,
    pub victory_cue_index: Option<u8>,
    pub church_victory_index: u8,
    pub effects: Vec<Effect>,
    pub victory_bgs: ShuffleBag,
    pub victory_cues: ShuffleBag,
    pub church_bgs: ShuffleBag,

    /// Simulation time, advanced by the clamped tick step
    pub clock_ms: u64,
}

impl MatchState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Title,
            phase_timer_ms: 0.0,
            score_a: 0,
            score_b: 0,
            round_winner: None,
            match_winner: None,
            special_level_active: false,
            special_swap_slot: None,
            background_key: BackgroundKey::Paris,
            background_index: 0,
            city_index: None,
            combatants: Combatants::default(),
            mode: None,
            ai_active: false,
            selection_complete_a: false,
            selection_complete_b: false,
            waiting_for_b: false,
            chosen_a: None,
            chosen_b: None,
            quickening: Quickening::None,
            clash_flash_ticks: 0,
            sword_cue_playing: false,
            victory_cue_index: None,
            church_victory_index: 0,
            effects: Vec::new(),
            victory_bgs: ShuffleBag::new(VICTORY_BG_COUNT),
            victory_cues: ShuffleBag::new(VICTORY_CUE_COUNT),
            church_bgs: ShuffleBag::new(CHURCH_BG_COUNT),
            clock_ms: 0,
        }
    }

    pub fn score(&self, slot: Slot) -> u32 {
        match slot {
            Slot::A => self.score_a,
            Slot::B => self.score_b,
        }
    }

    /// Add one round win, saturating at the match-winning count. Returns the new score.
    pub fn award_round(&mut self, slot: Slot) -> u32 {
        let score = match slot {
            Slot::A => &mut self.score_a,
            Slot::B => &mut self.score_b,
        };
        *score = (*score + 1).min(MAX_WINS);
        *score
    }

    pub fn set_phase(&mut self, phase: Phase, timer_ms: f32) {
        self.phase = phase;
        self.phase_timer_ms = timer_ms.max(0.0);
    }

    pub fn emit(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn chosen(&self, slot: Slot) -> Option<Character> {
        match slot {
            Slot::A => self.chosen_a,
            Slot::B => self.chosen_b,
        }
    }

    /// Leave the special level and put every combatant back in its own identity.
    pub fn end_special_level(&mut self) {
        self.special_level_active = false;
        self.special_swap_slot = None;
        for combatant in self.combatants.iter_mut() {
            combatant.display_identity = combatant.base_identity;
        }
    }

    /// Lobby reset that keeps the listed human bindings (re-seated at default poses).
    pub fn reset_to_lobby(&mut self, keep: &[(Slot, ConnectionId, Option<Character>)]) {
        let clock_ms = self.clock_ms;
        *self = MatchState::new();
        self.clock_ms = clock_ms;
        for (slot, connection_id, identity) in keep {
            self.combatants.insert(
                CombatantState::new(*slot, Occupant::Human(*connection_id)).with_identity(*identity),
            );
        }
    }
}

impl Default for MatchState {
    fn default() -> Self {
        Self::new()
    }
}
