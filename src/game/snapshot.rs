//! Snapshot building and throttling

use crate::ws::protocol::{CombatantSnapshot, RoomSnapshot};

use super::state::{CombatantState, MatchState};

/// Builds room snapshots for network transmission
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (phase changes, joins, menu choices)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    /// Build a snapshot and hand over the pending effects.
    pub fn build(&self, tick: u64, state: &mut MatchState) -> RoomSnapshot {
        let effects = std::mem::take(&mut state.effects);
        let mut snapshot = Self::peek(tick, state);
        snapshot.effects = effects;
        snapshot
    }

    /// Snapshot without consuming pending effects (used for one-off targeted messages)
    pub fn peek(tick: u64, state: &MatchState) -> RoomSnapshot {
        RoomSnapshot {
            tick,
            phase: state.phase,
            phase_timer_ms: state.phase_timer_ms,
            score_a: state.score_a,
            score_b: state.score_b,
            round_winner: state.round_winner,
            match_winner: state.match_winner,
            special_level_active: state.special_level_active,
            special_swap_slot: state.special_swap_slot,
            background_key: state.background_key,
            background_index: state.background_index,
            mode: state.mode,
            ai_active: state.ai_active,
            waiting_for_b: state.waiting_for_b,
            quickening: state.quickening,
            clash_flash_ticks: state.clash_flash_ticks,
            victory_cue_index: state.victory_cue_index,
            church_victory_index: state.church_victory_index,
            combatants: state.combatants.iter().map(combatant_snapshot).collect(),
            effects: Vec::new(),
        }
    }
}

fn combatant_snapshot(c: &CombatantState) -> CombatantSnapshot {
    CombatantSnapshot {
        slot: c.slot,
        synthetic: c.is_synthetic(),
        base_identity: c.base_identity,
        display_identity: c.display_identity,
        x: c.x,
        y: c.y,
        vertical_velocity: c.vertical_velocity,
        facing: c.facing,
        health: c.health,
        is_attacking: c.is_attacking,
        is_ducking: c.is_ducking,
        is_jumping: c.is_jumping,
        animation: c.animation,
        attack_timer: c.attack_timer,
        cooldown_timer: c.cooldown_timer,
        knockback_timer: c.knockback_timer,
    }
}
