//! Combatant movement, gravity and action timers

use crate::ws::protocol::{Action, Direction};

use super::state::{Animation, CombatantState};
use super::tuning::{
    ATTACK_COOLDOWN_TICKS, ATTACK_DURATION_TICKS, FIELD_WIDTH, GRAVITY, GROUND_LEVEL,
    JUMP_VELOCITY, PLAYER_SPEED, SPRITE_HALF_WIDTH,
};

/// Per-tick integrator for a single combatant
#[derive(Debug, Clone, Copy, Default)]
pub struct PhysicsSystem {
    /// Clear a duck held for longer than this many ticks. `None` keeps ducks indefinitely.
    pub duck_timeout_ticks: Option<u32>,
}

impl PhysicsSystem {
    pub fn new(duck_timeout_ticks: Option<u32>) -> Self {
        Self { duck_timeout_ticks }
    }

    /// Advance one combatant by one tick
    pub fn step(&self, c: &mut CombatantState) {
        // Knocked back: no input, gravity only
        if c.knockback_timer > 0 {
            c.knockback_timer -= 1;
            c.is_attacking = false;
            c.is_ducking = false;
            if c.is_jumping {
                Self::integrate_airborne(c);
            }
            return;
        }

        self.resolve_ducking(c);

        if c.is_jumping && Self::integrate_airborne(c) && !c.is_attacking && !c.is_ducking {
            c.animation = Self::grounded_animation(c);
        }

        c.cooldown_timer = c.cooldown_timer.saturating_sub(1);

        if c.is_attacking {
            c.attack_timer = c.attack_timer.saturating_sub(1);
            if c.attack_timer == 0 {
                if !c.has_landed_hit_this_attack {
                    c.missed_swing = true;
                }
                c.is_attacking = false;
                c.cooldown_timer = c.cooldown_timer.max(ATTACK_COOLDOWN_TICKS);
                c.animation = if c.is_jumping {
                    Animation::Jump
                } else if c.is_ducking {
                    Animation::Duck
                } else {
                    Self::grounded_animation(c)
                };
            }
        }

        Self::wrap_horizontal(c);
        c.moving_this_tick = false;
    }

    fn resolve_ducking(&self, c: &mut CombatantState) {
        if !c.is_ducking {
            c.duck_ticks = 0;
            return;
        }

        if c.is_jumping || c.is_attacking {
            c.is_ducking = false;
            c.duck_ticks = 0;
            c.animation = if c.is_jumping {
                Animation::Jump
            } else {
                Animation::Attack
            };
            return;
        }

        c.duck_ticks += 1;
        if let Some(limit) = self.duck_timeout_ticks {
            if c.duck_ticks > limit {
                c.is_ducking = false;
                c.duck_ticks = 0;
                c.animation = Animation::Idle;
            }
        }
    }

    /// Gravity step. Returns true when the combatant touched down this tick.
    fn integrate_airborne(c: &mut CombatantState) -> bool {
        c.y += c.vertical_velocity;
        c.vertical_velocity += GRAVITY;
        if c.y >= GROUND_LEVEL {
            c.y = GROUND_LEVEL;
            c.is_jumping = false;
            c.vertical_velocity = 0.0;
            return true;
        }
        false
    }

    fn grounded_animation(c: &CombatantState) -> Animation {
        if c.moving_this_tick {
            Animation::Walk
        } else {
            Animation::Idle
        }
    }

    /// Leaving the field on one side re-enters on the other
    pub fn wrap_horizontal(c: &mut CombatantState) {
        if c.x > FIELD_WIDTH + SPRITE_HALF_WIDTH {
            c.x = -SPRITE_HALF_WIDTH + 1.0;
        } else if c.x < -SPRITE_HALF_WIDTH {
            c.x = FIELD_WIDTH + SPRITE_HALF_WIDTH - 1.0;
        }
    }

    /// Keep a sprite fully on screen
    pub fn clamp_to_field(x: f32) -> f32 {
        x.clamp(SPRITE_HALF_WIDTH, FIELD_WIDTH - SPRITE_HALF_WIDTH)
    }

    /// Shift horizontally by `dx`, facing the direction of travel
    pub fn walk(c: &mut CombatantState, dx: f32) {
        c.x += dx;
        if dx > 0.0 {
            c.facing = 1;
        } else if dx < 0.0 {
            c.facing = -1;
        }
        if !c.is_jumping {
            c.animation = Animation::Walk;
        }
        c.moving_this_tick = true;
        Self::wrap_horizontal(c);
    }

    /// Apply one player intent. Returns false when the combatant's state forbids it.
    pub fn apply_action(c: &mut CombatantState, action: &Action) -> bool {
        match action {
            Action::Move { direction } => {
                if c.is_attacking || c.is_ducking {
                    return false;
                }
                let dx = match direction {
                    Direction::Left => -PLAYER_SPEED,
                    Direction::Right => PLAYER_SPEED,
                    Direction::Unknown => return false,
                };
                Self::walk(c, dx);
                true
            }
            Action::Jump => {
                if c.is_jumping || c.is_ducking || c.is_attacking {
                    return false;
                }
                c.start_jump(JUMP_VELOCITY);
                true
            }
            Action::Duck { active } => {
                if c.is_jumping || c.is_attacking || c.is_ducking == *active {
                    return false;
                }
                c.set_ducking(*active);
                true
            }
            Action::Attack => {
                if !c.can_start_attack() {
                    return false;
                }
                c.start_attack(ATTACK_DURATION_TICKS, None);
                true
            }
            Action::Unknown => false,
        }
    }
}
