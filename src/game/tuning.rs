//! Gameplay tuning constants
//!
//! Durations suffixed `_TICKS` count simulation ticks; `_MS` values are wall-clock
//! milliseconds consumed by the phase timer.

// Play field
pub const FIELD_WIDTH: f32 = 800.0;
pub const FIELD_HEIGHT: f32 = 600.0;
pub const GROUND_LEVEL: f32 = FIELD_HEIGHT - 50.0;
pub const SPRITE_HALF_WIDTH: f32 = 35.0;
/// Sprites are bottom-aligned; hit origins sit this far above the feet.
pub const SPRITE_CENTER_OFFSET_Y: f32 = 25.0;

pub const SPAWN_X_A: f32 = 150.0;
pub const SPAWN_X_B: f32 = FIELD_WIDTH - 150.0;

// Movement
pub const PLAYER_SPEED: f32 = 10.0;
pub const JUMP_VELOCITY: f32 = -15.0;
pub const GRAVITY: f32 = 1.0;

// Attacks
pub const MAX_HEALTH: i32 = 100;
pub const HIT_DAMAGE: i32 = 10;
pub const ATTACK_RANGE: f32 = 85.0;
pub const ATTACK_DURATION_TICKS: u32 = 24;
pub const ATTACK_COOLDOWN_TICKS: u32 = 15;
/// Forward extension of the hit box from the attacker's origin.
pub const ATTACK_REACH: f32 = 50.0;
pub const HIT_BOX_HALF_WIDTH: f32 = 45.0;

// Clashes
pub const CLASH_RANGE_X: f32 = 110.0;
pub const CLASH_RANGE_Y: f32 = 80.0;
/// A swing with less than this share of its duration left cannot clash.
pub const CLASH_MIN_REMAINING_FRACTION: f32 = 0.25;
pub const CLASH_RESIDUAL_ATTACK_TICKS: u32 = 3;
pub const CLASH_STUN_TICKS: u32 = 30;
pub const CLASH_KNOCKBACK: f32 = 60.0;
pub const CLASH_KNOCKBACK_TICKS: u32 = 35;
pub const CLASH_LAUNCH_VELOCITY: f32 = -10.0;
pub const CLASH_FLASH_TICKS: u32 = 8;

// Match structure
pub const MAX_WINS: u32 = 5;
pub const SPECIAL_LEVEL_WINS: u32 = 3;

// Phase durations
pub const CONTROLS_SCREEN_MS: f32 = 1000.0;
pub const CHURCH_INTRO_MS: f32 = 4000.0;
pub const VICTORY_SCREEN_MS: f32 = 4000.0;
pub const SLIDESHOW_SLIDE_MS: f32 = 6000.0;
pub const SLIDESHOW_TO_TITLE_MS: f32 = 200.0;
pub const QUICKENING_FLASHES: u32 = 6;
pub const QUICKENING_FLASH_MS: f32 = 100.0;
pub const QUICKENING_MS: f32 = (QUICKENING_FLASHES * 2) as f32 * QUICKENING_FLASH_MS + 500.0;

// Cosmetic pools
pub const CITY_BG_COUNT: u8 = 7;
pub const CHURCH_BG_COUNT: u8 = 3;
pub const CHURCH_VICTORY_BG_COUNT: u8 = 2;
pub const VICTORY_BG_COUNT: u8 = 10;
pub const VICTORY_CUE_COUNT: u8 = 5;
pub const SLIDESHOW_COUNT: u8 = 12;

// Opponent policy
pub const AI_SPEED_MULTIPLIER: f32 = 0.6;
pub const AI_PREFERRED_DISTANCE: f32 = 75.0;
pub const AI_DISTANCE_BUFFER: f32 = 30.0;
pub const AI_ATTACK_RANGE_SLACK: f32 = 15.0;
pub const AI_ATTACK_PROBABILITY: f64 = 0.12;
pub const AI_BOSS_ATTACK_PROBABILITY: f64 = 0.35;
pub const AI_COUNTER_ATTACK_BONUS: f64 = 0.2;
pub const AI_ATTACK_COOLDOWN_BONUS_TICKS: u32 = 60;
pub const AI_DUCK_PROBABILITY: f64 = 0.18;
pub const AI_DUCK_THREAT_MARGIN: f32 = 40.0;
pub const AI_DUCK_INTERVAL_MS: u64 = 2200;
pub const AI_JUMP_PROBABILITY: f64 = 0.15;
pub const AI_JUMP_INTERVAL_MS: u64 = 3500;
pub const AI_IDLE_PROBABILITY: f64 = 0.3;
pub const AI_RETREAT_SLOWDOWN: f32 = 0.5;
