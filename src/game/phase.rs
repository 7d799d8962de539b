//! Match lifecycle: timer expiry and knockout transitions

use rand::Rng;

use super::combat::Knockout;
use super::state::{BackgroundKey, MatchState, Phase, Quickening, Slot};
use super::tuning::{
    CHURCH_INTRO_MS, CHURCH_VICTORY_BG_COUNT, CITY_BG_COUNT, MAX_WINS, QUICKENING_MS,
    SLIDESHOW_COUNT, SLIDESHOW_SLIDE_MS, SLIDESHOW_TO_TITLE_MS, SPECIAL_LEVEL_WINS,
    VICTORY_SCREEN_MS,
};

/// What to do when the phase timer runs out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Stay,
    GameOver,
    Final,
    /// Round won inside the special level; `favorable` when the swap slot won it
    ChurchVictory { favorable: bool },
    ChurchIntro { swap_slot: Slot },
    Victory,
    StartRound { end_special: bool },
    Slideshow { index: u8 },
    SlideshowToTitle,
    Title,
}

/// Phase state machine. `decide` is pure; `apply` performs the mutation.
pub struct PhaseMachine;

impl PhaseMachine {
    /// Count the phase timer down by `elapsed_ms`.
    ///
    /// Returns `(from, to)` when the timer expired and the phase changed.
    pub fn advance<R: Rng + ?Sized>(
        state: &mut MatchState,
        elapsed_ms: f32,
        rng: &mut R,
    ) -> Option<(Phase, Phase)> {
        if state.phase_timer_ms <= 0.0 {
            return None;
        }
        state.phase_timer_ms = (state.phase_timer_ms - elapsed_ms).max(0.0);
        if state.phase_timer_ms > 0.0 {
            return None;
        }

        let from = state.phase;
        let transition = Self::decide(state);
        state.quickening = Quickening::None;
        Self::apply(state, transition, rng);
        (state.phase != from).then_some((from, state.phase))
    }

    /// Pick the transition for an expired timer from the current phase and flags.
    pub fn decide(state: &MatchState) -> Transition {
        if state.quickening.is_active() {
            return Self::decide_after_knockout(state);
        }

        match state.phase {
            Phase::Controls | Phase::ChurchIntro => Transition::StartRound { end_special: false },
            Phase::ChurchVictory | Phase::ChurchVictoryImmediate => {
                Transition::StartRound { end_special: true }
            }
            Phase::Victory if state.match_winner.is_none() => {
                Transition::StartRound { end_special: false }
            }
            Phase::Final | Phase::GameOver => Transition::Slideshow { index: 0 },
            Phase::Slideshow if state.background_index + 1 >= SLIDESHOW_COUNT => {
                Transition::SlideshowToTitle
            }
            Phase::Slideshow => Transition::Slideshow {
                index: state.background_index + 1,
            },
            Phase::SlideshowToTitle => Transition::Title,
            _ => Transition::Stay,
        }
    }

    fn decide_after_knockout(state: &MatchState) -> Transition {
        if state.phase == Phase::SpecialEnd {
            return Transition::GameOver;
        }
        if state.match_winner.is_some() {
            return Transition::Final;
        }
        if state.phase == Phase::Special && state.special_level_active {
            return Transition::ChurchVictory {
                favorable: state.round_winner.is_some()
                    && state.round_winner == state.special_swap_slot,
            };
        }
        match state.round_winner {
            Some(winner)
                if !state.special_level_active && state.score(winner) == SPECIAL_LEVEL_WINS =>
            {
                Transition::ChurchIntro {
                    swap_slot: winner.other(),
                }
            }
            _ => Transition::Victory,
        }
    }

    pub fn apply<R: Rng + ?Sized>(state: &mut MatchState, transition: Transition, rng: &mut R) {
        match transition {
            Transition::Stay => {}
            Transition::GameOver => state.set_phase(Phase::GameOver, VICTORY_SCREEN_MS),
            Transition::Final => state.set_phase(Phase::Final, VICTORY_SCREEN_MS),
            Transition::ChurchVictory { favorable } => {
                let index = if favorable {
                    rng.gen_range(0..CHURCH_VICTORY_BG_COUNT)
                } else {
                    0
                };
                Self::show_church_victory(state, index);
                state.set_phase(Phase::ChurchVictory, VICTORY_SCREEN_MS);
            }
            Transition::ChurchIntro { swap_slot } => {
                state.special_level_active = true;
                state.special_swap_slot = Some(swap_slot);
                state.set_phase(Phase::ChurchIntro, CHURCH_INTRO_MS);
            }
            Transition::Victory => {
                state.background_key = BackgroundKey::Victory;
                state.background_index = state.victory_bgs.draw(rng);
                state.victory_cue_index = Some(state.victory_cues.draw(rng));
                state.set_phase(Phase::Victory, VICTORY_SCREEN_MS);
            }
            Transition::StartRound { end_special } => {
                if end_special {
                    state.end_special_level();
                    state.church_victory_index = 0;
                }
                Self::start_round(state, rng);
            }
            Transition::Slideshow { index } => {
                state.background_key = BackgroundKey::Slideshow;
                state.background_index = index;
                state.set_phase(Phase::Slideshow, SLIDESHOW_SLIDE_MS);
            }
            Transition::SlideshowToTitle => {
                state.set_phase(Phase::SlideshowToTitle, SLIDESHOW_TO_TITLE_MS)
            }
            Transition::Title => Self::return_to_title(state),
        }
    }

    /// Apply a knockout reported by the combat resolver.
    pub fn on_knockout<R: Rng + ?Sized>(state: &mut MatchState, knockout: Knockout, rng: &mut R) {
        if !state.phase.is_active_play() {
            return;
        }

        match knockout {
            Knockout::Round { winner } => {
                state.round_winner = Some(winner);
                if state.award_round(winner) >= MAX_WINS {
                    state.match_winner = Some(winner);
                }
                state.quickening = Quickening::Light;
                state.phase_timer_ms = QUICKENING_MS;
            }
            Knockout::BossDefeated { victor } => {
                state.match_winner = Some(victor);
                state.quickening = Quickening::Dark;
                state.set_phase(Phase::SpecialEnd, QUICKENING_MS);
            }
            Knockout::BossTriumph { boss } => {
                state.round_winner = Some(boss);
                let index = rng.gen_range(0..CHURCH_VICTORY_BG_COUNT);
                Self::show_church_victory(state, index);
                state.set_phase(Phase::ChurchVictoryImmediate, VICTORY_SCREEN_MS);
            }
        }
    }

    /// Reset both combatants and pick the backdrop for a fresh round.
    pub fn start_round<R: Rng + ?Sized>(state: &mut MatchState, rng: &mut R) {
        state.effects.clear();
        state.clash_flash_ticks = 0;
        state.sword_cue_playing = false;
        state.round_winner = None;
        state.quickening = Quickening::None;
        state.victory_cue_index = None;

        let swap_slot = state
            .special_level_active
            .then_some(state.special_swap_slot)
            .flatten();
        for combatant in state.combatants.iter_mut() {
            combatant.reset_for_round(swap_slot);
        }

        if state.special_level_active {
            state.background_key = BackgroundKey::Church;
            state.background_index = state.church_bgs.draw(rng);
            state.set_phase(Phase::Special, 0.0);
        } else {
            let index = state
                .city_index
                .map(|i| (i + 1) % CITY_BG_COUNT)
                .unwrap_or(0);
            state.city_index = Some(index);
            state.background_key = BackgroundKey::Paris;
            state.background_index = index;
            state.set_phase(Phase::Playing, 0.0);
        }
    }

    fn show_church_victory(state: &mut MatchState, index: u8) {
        state.church_victory_index = index;
        state.background_key = BackgroundKey::ChurchVictory;
        state.background_index = index;
        state.end_special_level();
    }

    /// Back to the title screen after the slideshow. Human bindings survive; the
    /// opponent policy leaves slot B and the mode must be chosen again.
    fn return_to_title(state: &mut MatchState) {
        let synthetic_in_b = state
            .combatants
            .get(Slot::B)
            .is_some_and(|c| c.is_synthetic());
        if synthetic_in_b {
            state.combatants.remove(Slot::B);
        }
        state.ai_active = false;
        state.mode = None;
        state.selection_complete_a = false;
        state.selection_complete_b = false;
        state.waiting_for_b = false;
        state.chosen_b = None;

        state.set_phase(Phase::Title, 0.0);
        state.background_key = BackgroundKey::Paris;
        state.background_index = 0;
        state.score_a = 0;
        state.score_b = 0;
        state.round_winner = None;
        state.match_winner = None;
        state.victory_cue_index = None;
        state.church_victory_index = 0;
        state.end_special_level();
        for combatant in state.combatants.iter_mut() {
            combatant.reset_for_round(None);
        }
    }
}
