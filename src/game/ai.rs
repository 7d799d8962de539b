//! Scripted opponent for single-player mode

use rand::Rng;

use super::physics::PhysicsSystem;
use super::state::{Animation, CombatantState};
use super::tuning::{
    AI_ATTACK_COOLDOWN_BONUS_TICKS, AI_ATTACK_PROBABILITY, AI_ATTACK_RANGE_SLACK,
    AI_BOSS_ATTACK_PROBABILITY, AI_COUNTER_ATTACK_BONUS, AI_DISTANCE_BUFFER, AI_DUCK_INTERVAL_MS,
    AI_DUCK_PROBABILITY, AI_DUCK_THREAT_MARGIN, AI_IDLE_PROBABILITY, AI_JUMP_INTERVAL_MS,
    AI_JUMP_PROBABILITY, AI_PREFERRED_DISTANCE, AI_RETREAT_SLOWDOWN, AI_SPEED_MULTIPLIER,
    ATTACK_COOLDOWN_TICKS, ATTACK_DURATION_TICKS, ATTACK_RANGE, CLASH_RANGE_X, JUMP_VELOCITY,
    PLAYER_SPEED,
};

/// What the policy chose this tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Decision {
    pub ducked: bool,
    pub attacked: bool,
    pub moved: bool,
    pub jumped: bool,
}

impl Decision {
    pub fn is_idle(&self) -> bool {
        *self == Decision::default()
    }
}

/// Opponent policy. The only memory kept between ticks is when it last ducked and jumped.
#[derive(Debug, Clone, Default)]
pub struct OpponentPolicy {
    last_duck_ms: Option<u64>,
    last_jump_ms: Option<u64>,
}

impl OpponentPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Integrate the synthetic combatant, then decide its intents for this tick.
    ///
    /// `as_boss` is set while it wears the boss persona; `now_ms` is simulation time.
    pub fn act<R: Rng + ?Sized>(
        &mut self,
        ai: &mut CombatantState,
        target: &CombatantState,
        as_boss: bool,
        now_ms: u64,
        physics: &PhysicsSystem,
        rng: &mut R,
    ) -> Decision {
        let mut decision = Decision::default();
        if !ai.is_alive() {
            return decision;
        }

        physics.step(ai);
        if ai.knockback_timer > 0 {
            return decision;
        }

        let dx = target.x - ai.x;
        let distance = dx.abs();
        let toward: i8 = if dx > 0.0 { 1 } else { -1 };
        let threatened = target.is_attacking;

        // Defensive duck
        let duck_threat =
            threatened && distance < ATTACK_RANGE + AI_DUCK_THREAT_MARGIN && !ai.is_jumping;
        if duck_threat && rng.gen_bool(AI_DUCK_PROBABILITY) {
            if Self::since(self.last_duck_ms, now_ms) > AI_DUCK_INTERVAL_MS {
                ai.set_ducking(true);
                self.last_duck_ms = Some(now_ms);
                decision.ducked = true;
            }
        } else if ai.is_ducking {
            ai.set_ducking(false);
        }

        // Attack
        let mut attack_probability = if as_boss {
            AI_BOSS_ATTACK_PROBABILITY
        } else {
            AI_ATTACK_PROBABILITY
        };
        if threatened && distance < CLASH_RANGE_X {
            attack_probability += AI_COUNTER_ATTACK_BONUS;
        }
        let in_band = distance >= AI_PREFERRED_DISTANCE - AI_DISTANCE_BUFFER
            && distance <= ATTACK_RANGE + AI_ATTACK_RANGE_SLACK;
        if ai.can_start_attack() && in_band && rng.gen_bool(attack_probability.min(1.0)) {
            ai.facing = toward;
            ai.start_attack(
                ATTACK_DURATION_TICKS,
                Some(ATTACK_COOLDOWN_TICKS + AI_ATTACK_COOLDOWN_BONUS_TICKS),
            );
            decision.attacked = true;
        }

        // Keep to the preferred distance
        if !ai.is_attacking && !ai.is_ducking && !rng.gen_bool(AI_IDLE_PROBABILITY) {
            let speed = (PLAYER_SPEED * AI_SPEED_MULTIPLIER).trunc();
            if distance > AI_PREFERRED_DISTANCE + AI_DISTANCE_BUFFER {
                PhysicsSystem::walk(ai, f32::from(toward) * speed);
                decision.moved = true;
            } else if distance < AI_PREFERRED_DISTANCE - AI_DISTANCE_BUFFER {
                // Back off slowly under a swing so the clash stays on the table
                let speed = if threatened {
                    speed * AI_RETREAT_SLOWDOWN
                } else {
                    speed
                };
                PhysicsSystem::walk(ai, -f32::from(toward) * speed);
                ai.facing = toward;
                decision.moved = true;
            } else {
                if !ai.is_jumping {
                    ai.animation = Animation::Idle;
                }
                ai.facing = toward;
            }
        }

        // Occasional hop, never out of a clash opportunity
        if !ai.is_jumping
            && !ai.is_ducking
            && !threatened
            && rng.gen_bool(AI_JUMP_PROBABILITY)
            && Self::since(self.last_jump_ms, now_ms) > AI_JUMP_INTERVAL_MS
        {
            ai.start_jump(JUMP_VELOCITY);
            self.last_jump_ms = Some(now_ms);
            decision.jumped = true;
        }

        PhysicsSystem::wrap_horizontal(ai);
        decision
    }

    fn since(last: Option<u64>, now_ms: u64) -> u64 {
        last.map(|t| now_ms.saturating_sub(t)).unwrap_or(u64::MAX)
    }
}
