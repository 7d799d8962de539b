//! Combat resolution: clashes, hits, evasions and knockouts

use crate::ws::protocol::{Character, Effect};

use super::physics::PhysicsSystem;
use super::state::{CombatantState, MatchState, Slot};
use super::tuning::{
    ATTACK_DURATION_TICKS, ATTACK_REACH, CLASH_FLASH_TICKS, CLASH_KNOCKBACK,
    CLASH_KNOCKBACK_TICKS, CLASH_LAUNCH_VELOCITY, CLASH_MIN_REMAINING_FRACTION, CLASH_RANGE_X,
    CLASH_RANGE_Y, CLASH_RESIDUAL_ATTACK_TICKS, CLASH_STUN_TICKS, HIT_BOX_HALF_WIDTH, HIT_DAMAGE,
};

/// Outcome of one attacker's swing against the other combatant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strike {
    Landed { attacker: Slot, defender: Slot, damage: i32 },
    /// Defender ducked under the swing
    Evaded { attacker: Slot, defender: Slot },
}

/// A combatant reached zero health
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Knockout {
    /// Ordinary round win
    Round { winner: Slot },
    /// The boss persona fell during the special level
    BossDefeated { victor: Slot },
    /// The boss persona felled its opponent during the special level
    BossTriumph { boss: Slot },
}

/// Everything the resolver decided this tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub clash: bool,
    pub strikes: Vec<Strike>,
    pub knockout: Option<Knockout>,
}

/// Special-level context needed to classify a knockout
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecialContext {
    pub active: bool,
    pub swap_slot: Option<Slot>,
}

impl SpecialContext {
    pub fn from_state(state: &MatchState) -> Self {
        Self {
            active: state.special_level_active,
            swap_slot: state.special_swap_slot,
        }
    }

    fn holds_boss_identity(&self, c: &CombatantState) -> bool {
        self.active
            && self.swap_slot == Some(c.slot)
            && c.display_identity == Some(Character::BOSS)
    }
}

/// Combat resolver for the two-combatant room
pub struct CombatSystem;

impl CombatSystem {
    /// Resolve interactions between two living combatants for this tick.
    ///
    /// A clash is checked first and excludes everything else. Otherwise each
    /// attacker is tested against the other; evaluation stops at the first knockout.
    pub fn resolve(
        a: &mut CombatantState,
        b: &mut CombatantState,
        special: SpecialContext,
    ) -> Resolution {
        let mut resolution = Resolution::default();
        if !a.is_alive() || !b.is_alive() {
            return resolution;
        }

        if Self::is_clash(a, b) {
            Self::apply_clash(a, b);
            resolution.clash = true;
            return resolution;
        }

        for attacker_is_a in [true, false] {
            let (attacker, defender) = if attacker_is_a {
                (&mut *a, &mut *b)
            } else {
                (&mut *b, &mut *a)
            };
            if !attacker.is_alive() || !defender.is_alive() {
                continue;
            }
            if let Some(strike) = Self::check_strike(attacker, defender) {
                resolution.strikes.push(strike);
                if !defender.is_alive() {
                    resolution.knockout = Some(Self::classify_knockout(attacker, defender, special));
                    break;
                }
            }
        }

        resolution
    }

    /// Both swings meet: fresh enough, unspent, and within the clash window
    pub fn is_clash(a: &CombatantState, b: &CombatantState) -> bool {
        let min_remaining = ATTACK_DURATION_TICKS as f32 * CLASH_MIN_REMAINING_FRACTION;
        let (ax, ay) = a.hit_origin();
        let (bx, by) = b.hit_origin();

        a.is_attacking
            && b.is_attacking
            && !a.has_landed_hit_this_attack
            && !b.has_landed_hit_this_attack
            && a.attack_timer as f32 > min_remaining
            && b.attack_timer as f32 > min_remaining
            && (ax - bx).abs() < CLASH_RANGE_X
            && (ay - by).abs() < CLASH_RANGE_Y
    }

    fn apply_clash(a: &mut CombatantState, b: &mut CombatantState) {
        // Push apart along the separation axis; A goes left when it is on the left
        let a_dir = if a.x < b.x { -1.0 } else { 1.0 };

        for (c, dir) in [(&mut *a, a_dir), (&mut *b, -a_dir)] {
            c.has_landed_hit_this_attack = true;
            c.attack_timer = c.attack_timer.min(CLASH_RESIDUAL_ATTACK_TICKS);
            c.cooldown_timer = c.cooldown_timer.max(CLASH_STUN_TICKS);
            c.x = PhysicsSystem::clamp_to_field(c.x + dir * CLASH_KNOCKBACK);
            c.knockback_timer = CLASH_KNOCKBACK_TICKS;
            if !c.is_jumping {
                c.is_jumping = true;
                c.vertical_velocity = CLASH_LAUNCH_VELOCITY;
            }
        }
    }

    /// Forward hit box of `attacker` against `defender`'s origin
    pub fn in_reach(attacker: &CombatantState, defender: &CombatantState) -> bool {
        let (ax, ay) = attacker.hit_origin();
        let (dx, dy) = defender.hit_origin();
        let strike_x = ax + f32::from(attacker.facing) * ATTACK_REACH;

        (strike_x - dx).abs() < HIT_BOX_HALF_WIDTH && (ay - dy).abs() < CLASH_RANGE_Y
    }

    fn check_strike(attacker: &mut CombatantState, defender: &mut CombatantState) -> Option<Strike> {
        if !attacker.is_attacking || attacker.has_landed_hit_this_attack {
            return None;
        }
        if !Self::in_reach(attacker, defender) {
            return None;
        }

        // One outcome per swing either way
        attacker.has_landed_hit_this_attack = true;

        if defender.is_ducking {
            return Some(Strike::Evaded {
                attacker: attacker.slot,
                defender: defender.slot,
            });
        }

        defender.health = (defender.health - HIT_DAMAGE).max(0);
        Some(Strike::Landed {
            attacker: attacker.slot,
            defender: defender.slot,
            damage: HIT_DAMAGE,
        })
    }

    fn classify_knockout(
        attacker: &CombatantState,
        defender: &CombatantState,
        special: SpecialContext,
    ) -> Knockout {
        if special.holds_boss_identity(defender) {
            Knockout::BossDefeated {
                victor: attacker.slot,
            }
        } else if special.active {
            Knockout::BossTriumph {
                boss: special.swap_slot.unwrap_or(attacker.slot),
            }
        } else {
            Knockout::Round {
                winner: attacker.slot,
            }
        }
    }

    /// Queue the cues for a resolution and start the clash flash.
    pub fn apply_effects(state: &mut MatchState, resolution: &Resolution) {
        if resolution.clash {
            state.clash_flash_ticks = CLASH_FLASH_TICKS;
            state.emit(Effect::Clash);
        }
        for strike in &resolution.strikes {
            match strike {
                Strike::Landed { .. } => state.emit(Effect::Hit),
                Strike::Evaded { .. } => state.emit(Effect::Whoosh),
            }
        }
    }

    /// Start the sword-effects cue once when both begin swinging; re-arm when that stops.
    pub fn update_sword_cue(state: &mut MatchState) {
        let both_swinging = matches!(
            (state.combatants.get(Slot::A), state.combatants.get(Slot::B)),
            (Some(a), Some(b)) if a.is_attacking && b.is_attacking
        );

        if both_swinging && !state.sword_cue_playing {
            state.sword_cue_playing = true;
            state.emit(Effect::SwordEffects);
        } else if !both_swinging {
            state.sword_cue_playing = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Occupant;
    use crate::game::tuning::{GROUND_LEVEL, MAX_HEALTH};

    fn pair(ax: f32, bx: f32) -> (CombatantState, CombatantState) {
        let mut a = CombatantState::new(Slot::A, Occupant::Synthetic)
            .with_identity(Some(Character::Kylander));
        let mut b = CombatantState::new(Slot::B, Occupant::Synthetic)
            .with_identity(Some(Character::Potzer));
        a.x = ax;
        b.x = bx;
        (a, b)
    }

    fn swing(c: &mut CombatantState) {
        c.start_attack(ATTACK_DURATION_TICKS, None);
    }

    #[test]
    fn test_simultaneous_swings_clash_without_damage() {
        let (mut a, mut b) = pair(380.0, 420.0);
        swing(&mut a);
        swing(&mut b);

        let resolution = CombatSystem::resolve(&mut a, &mut b, SpecialContext::default());

        assert!(resolution.clash);
        assert!(resolution.strikes.is_empty());
        assert_eq!(a.health, MAX_HEALTH);
        assert_eq!(b.health, MAX_HEALTH);
        assert!(a.is_jumping && b.is_jumping);
        assert_eq!(a.vertical_velocity, CLASH_LAUNCH_VELOCITY);
        assert_eq!(a.x - 380.0, -(b.x - 420.0));
        assert_eq!(a.x, 380.0 - CLASH_KNOCKBACK);
        assert_eq!(a.knockback_timer, CLASH_KNOCKBACK_TICKS);
        assert_eq!(b.cooldown_timer, CLASH_STUN_TICKS);
        assert_eq!(a.attack_timer, CLASH_RESIDUAL_ATTACK_TICKS);
        assert!(a.has_landed_hit_this_attack && b.has_landed_hit_this_attack);
    }

    #[test]
    fn test_clash_positions_are_clamped_to_field() {
        let (mut a, mut b) = pair(40.0, 100.0);
        swing(&mut a);
        swing(&mut b);

        CombatSystem::resolve(&mut a, &mut b, SpecialContext::default());

        assert_eq!(a.x, PhysicsSystem::clamp_to_field(-20.0));
    }

    #[test]
    fn test_nearly_finished_swing_does_not_clash() {
        let (mut a, mut b) = pair(380.0, 420.0);
        swing(&mut a);
        swing(&mut b);
        a.attack_timer = 2;

        let resolution = CombatSystem::resolve(&mut a, &mut b, SpecialContext::default());

        assert!(!resolution.clash);
    }

    #[test]
    fn test_hit_costs_fixed_damage_once_per_swing() {
        let (mut a, mut b) = pair(400.0, 450.0);
        swing(&mut a);

        let first = CombatSystem::resolve(&mut a, &mut b, SpecialContext::default());
        let second = CombatSystem::resolve(&mut a, &mut b, SpecialContext::default());

        assert_eq!(
            first.strikes,
            vec![Strike::Landed {
                attacker: Slot::A,
                defender: Slot::B,
                damage: HIT_DAMAGE
            }]
        );
        assert!(second.strikes.is_empty());
        assert_eq!(b.health, MAX_HEALTH - HIT_DAMAGE);
    }

    #[test]
    fn test_ducking_defender_always_evades() {
        let (mut a, mut b) = pair(400.0, 450.0);
        swing(&mut a);
        b.set_ducking(true);

        let resolution = CombatSystem::resolve(&mut a, &mut b, SpecialContext::default());

        assert_eq!(
            resolution.strikes,
            vec![Strike::Evaded {
                attacker: Slot::A,
                defender: Slot::B
            }]
        );
        assert_eq!(b.health, MAX_HEALTH);
        assert!(a.has_landed_hit_this_attack);
    }

    #[test]
    fn test_airborne_defender_is_still_hit() {
        let (mut a, mut b) = pair(400.0, 450.0);
        swing(&mut a);
        b.is_jumping = true;
        b.y = GROUND_LEVEL - 30.0;

        let resolution = CombatSystem::resolve(&mut a, &mut b, SpecialContext::default());

        assert!(matches!(resolution.strikes[..], [Strike::Landed { .. }]));
    }

    #[test]
    fn test_swing_facing_away_misses() {
        let (mut a, mut b) = pair(400.0, 450.0);
        a.facing = -1;
        swing(&mut a);

        let resolution = CombatSystem::resolve(&mut a, &mut b, SpecialContext::default());

        assert!(resolution.strikes.is_empty());
        assert!(!a.has_landed_hit_this_attack);
    }

    #[test]
    fn test_lethal_hit_outside_special_level_is_round_win() {
        let (mut a, mut b) = pair(400.0, 450.0);
        swing(&mut a);
        b.health = HIT_DAMAGE;

        let resolution = CombatSystem::resolve(&mut a, &mut b, SpecialContext::default());

        assert_eq!(resolution.knockout, Some(Knockout::Round { winner: Slot::A }));
        assert_eq!(b.health, 0);
    }

    #[test]
    fn test_felling_the_boss_is_boss_defeated() {
        let (mut a, mut b) = pair(400.0, 450.0);
        b.display_identity = Some(Character::BOSS);
        swing(&mut a);
        b.health = 5;
        let special = SpecialContext {
            active: true,
            swap_slot: Some(Slot::B),
        };

        let resolution = CombatSystem::resolve(&mut a, &mut b, special);

        assert_eq!(resolution.knockout, Some(Knockout::BossDefeated { victor: Slot::A }));
        assert_eq!(b.health, 0);
    }

    #[test]
    fn test_boss_felling_opponent_is_boss_triumph() {
        let (mut a, mut b) = pair(400.0, 450.0);
        a.display_identity = Some(Character::BOSS);
        swing(&mut a);
        b.health = HIT_DAMAGE;
        let special = SpecialContext {
            active: true,
            swap_slot: Some(Slot::A),
        };

        let resolution = CombatSystem::resolve(&mut a, &mut b, special);

        assert_eq!(resolution.knockout, Some(Knockout::BossTriumph { boss: Slot::A }));
    }

    #[test]
    fn test_no_second_strike_after_knockout() {
        let (mut a, mut b) = pair(400.0, 450.0);
        swing(&mut a);
        swing(&mut b);
        // B's swing is too old to clash but still in reach
        b.attack_timer = 2;
        b.health = HIT_DAMAGE;

        let resolution = CombatSystem::resolve(&mut a, &mut b, SpecialContext::default());

        assert_eq!(resolution.strikes.len(), 1);
        assert_eq!(a.health, MAX_HEALTH);
        assert!(!b.has_landed_hit_this_attack);
    }

    #[test]
    fn test_sword_cue_fires_once_per_overlap() {
        let mut state = MatchState::new();
        let (mut a, mut b) = pair(100.0, 700.0);
        swing(&mut a);
        swing(&mut b);
        state.combatants.insert(a);
        state.combatants.insert(b);

        CombatSystem::update_sword_cue(&mut state);
        CombatSystem::update_sword_cue(&mut state);
        assert_eq!(state.effects, vec![Effect::SwordEffects]);

        if let Some(a) = state.combatants.get_mut(Slot::A) {
            a.is_attacking = false;
        }
        CombatSystem::update_sword_cue(&mut state);
        assert!(!state.sword_cue_playing);
    }
}
