//! The single shared room and its authoritative tick loop

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::util::time::{tick_duration, StepClock, SIMULATION_TPS, SNAPSHOT_TPS};
use crate::ws::protocol::{Action, Character, ClientMsg, Effect, GameMode, ServerMsg};

use super::ai::OpponentPolicy;
use super::combat::{CombatSystem, SpecialContext};
use super::error::{RoomError, SimError};
use super::phase::PhaseMachine;
use super::physics::PhysicsSystem;
use super::snapshot::SnapshotBuilder;
use super::state::{
    BackgroundKey, CombatantState, ConnectionId, MatchState, Occupant, Phase, Slot,
};
use super::tuning::{CHURCH_BG_COUNT, CITY_BG_COUNT, CONTROLS_SCREEN_MS};

/// Room construction settings
#[derive(Debug, Clone, Copy, Default)]
pub struct RoomSettings {
    /// Fixed RNG seed; a random one is drawn when absent
    pub seed: Option<u64>,
    pub duck_timeout_ticks: Option<u32>,
}

/// Result of a join request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Assigned(Slot),
    Full,
}

/// Commands queued to the room loop
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        connection_id: ConnectionId,
        outbox: mpsc::Sender<ServerMsg>,
        reply: oneshot::Sender<JoinOutcome>,
    },
    Leave {
        connection_id: ConnectionId,
    },
    Client {
        connection_id: ConnectionId,
        msg: ClientMsg,
    },
}

/// Liveness view published by the loop every tick
#[derive(Debug, Clone, Copy)]
pub struct RoomStatus {
    pub running: bool,
    pub phase: Phase,
    pub players_count: usize,
    pub tick: u64,
}

impl Default for RoomStatus {
    fn default() -> Self {
        Self {
            running: false,
            phase: Phase::Title,
            players_count: 0,
            tick: 0,
        }
    }
}

/// Handle to the running room
#[derive(Clone)]
pub struct RoomHandle {
    command_tx: mpsc::Sender<RoomCommand>,
    snapshot_tx: broadcast::Sender<ServerMsg>,
    status: Arc<RwLock<RoomStatus>>,
}

impl RoomHandle {
    /// Ask for a slot. Targeted messages for this connection go to `outbox`.
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        outbox: mpsc::Sender<ServerMsg>,
    ) -> Result<JoinOutcome, RoomError> {
        let (reply, outcome) = oneshot::channel();
        self.command_tx
            .send(RoomCommand::Join {
                connection_id,
                outbox,
                reply,
            })
            .await
            .map_err(|_| RoomError::Closed)?;
        outcome.await.map_err(|_| RoomError::Closed)
    }

    pub async fn send(&self, connection_id: ConnectionId, msg: ClientMsg) -> Result<(), RoomError> {
        self.command_tx
            .send(RoomCommand::Client { connection_id, msg })
            .await
            .map_err(|_| RoomError::Closed)
    }

    pub async fn leave(&self, connection_id: ConnectionId) -> Result<(), RoomError> {
        self.command_tx
            .send(RoomCommand::Leave { connection_id })
            .await
            .map_err(|_| RoomError::Closed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.snapshot_tx.subscribe()
    }

    pub fn status(&self) -> RoomStatus {
        *self.status.read()
    }
}

/// The authoritative room. Owns `MatchState`; nothing else mutates it.
pub struct Room {
    state: MatchState,
    tick: u64,
    rng: ChaCha8Rng,
    physics: PhysicsSystem,
    policy: OpponentPolicy,
    outboxes: HashMap<ConnectionId, mpsc::Sender<ServerMsg>>,
    command_rx: mpsc::Receiver<RoomCommand>,
    snapshot_tx: broadcast::Sender<ServerMsg>,
    snapshot_builder: SnapshotBuilder,
    status: Arc<RwLock<RoomStatus>>,
}

impl Room {
    pub fn new(settings: RoomSettings) -> (Self, RoomHandle) {
        let (command_tx, command_rx) = mpsc::channel(256);
        let (snapshot_tx, _) = broadcast::channel(64);
        let status = Arc::new(RwLock::new(RoomStatus::default()));

        let handle = RoomHandle {
            command_tx,
            snapshot_tx: snapshot_tx.clone(),
            status: status.clone(),
        };

        let seed = settings.seed.unwrap_or_else(rand::random);
        info!(seed, "Room created");

        let room = Self {
            state: MatchState::new(),
            tick: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            physics: PhysicsSystem::new(settings.duck_timeout_ticks),
            policy: OpponentPolicy::new(),
            outboxes: HashMap::new(),
            command_rx,
            snapshot_tx,
            snapshot_builder: SnapshotBuilder::new(SIMULATION_TPS / SNAPSHOT_TPS),
            status,
        };

        (room, handle)
    }

    /// Run the authoritative tick loop until every handle is dropped
    pub async fn run(mut self) {
        info!("Room loop started");

        let mut tick_interval = interval(tick_duration());
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut clock = StepClock::new();

        loop {
            tick_interval.tick().await;
            let elapsed = clock.step();

            if !self.process_commands() {
                break;
            }

            if let Err(e) = self.run_tick(elapsed) {
                error!(tick = self.tick, phase = ?self.state.phase, error = %e, "Tick failed");
            }

            self.publish();
        }

        self.status.write().running = false;
        info!("Room loop stopped");
    }

    /// Drain the command queue. Returns false once every sender is gone.
    fn process_commands(&mut self) -> bool {
        loop {
            match self.command_rx.try_recv() {
                Ok(command) => self.handle_command(command),
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn handle_command(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Join {
                connection_id,
                outbox,
                reply,
            } => {
                let outcome = self.handle_join(connection_id, outbox);
                if reply.send(outcome).is_err() {
                    debug!(connection_id = %connection_id, "Join reply dropped");
                }
            }
            RoomCommand::Leave { connection_id } => self.handle_leave(connection_id),
            RoomCommand::Client { connection_id, msg } => {
                self.handle_client_msg(connection_id, msg)
            }
        }
    }

    fn handle_client_msg(&mut self, connection_id: ConnectionId, msg: ClientMsg) {
        if let ClientMsg::Ping { t } = msg {
            self.send_to(connection_id, ServerMsg::Pong { t });
            return;
        }

        let Some(slot) = self.state.combatants.slot_of(connection_id) else {
            debug!(connection_id = %connection_id, "Message from unbound connection dropped");
            return;
        };

        match msg {
            ClientMsg::OpenModeSelect => self.handle_open_mode_select(slot),
            ClientMsg::SelectMode { mode } => self.handle_select_mode(slot, mode),
            ClientMsg::SelectCharacter { name } => self.handle_select_character(slot, &name),
            ClientMsg::Actions { actions } => self.handle_actions(slot, &actions),
            ClientMsg::ChangeBackground => self.handle_change_background(slot),
            ClientMsg::ReturnToTitle => self.handle_return_to_title(slot),
            ClientMsg::Ping { .. } => {}
        }
    }

    /// Bind the connection to slot A, else B, else turn it away.
    fn handle_join(
        &mut self,
        connection_id: ConnectionId,
        outbox: mpsc::Sender<ServerMsg>,
    ) -> JoinOutcome {
        if let Some(slot) = self.state.combatants.slot_of(connection_id) {
            warn!(connection_id = %connection_id, slot = ?slot, "Connection already seated");
            return JoinOutcome::Assigned(slot);
        }

        let combatants = &self.state.combatants;
        let slot = if combatants.is_vacant(Slot::A) {
            Slot::A
        } else if combatants.is_vacant(Slot::B) && combatants.human_count() < 2 {
            Slot::B
        } else {
            info!(connection_id = %connection_id, "Room full, rejecting connection");
            return JoinOutcome::Full;
        };

        let identity = self.state.chosen(slot);
        self.state.combatants.insert(
            CombatantState::new(slot, Occupant::Human(connection_id)).with_identity(identity),
        );
        self.outboxes.insert(connection_id, outbox);

        // A second player arriving after the first already picked moves straight to their pick
        if slot == Slot::B
            && self.state.mode == Some(GameMode::Two)
            && self.state.selection_complete_a
            && !self.state.selection_complete_b
        {
            self.state.waiting_for_b = false;
            self.state.set_phase(Phase::CharacterSelectB, 0.0);
        }

        info!(
            connection_id = %connection_id,
            slot = ?slot,
            players = self.state.combatants.human_count(),
            "Player joined room"
        );

        self.send_slot_assignment(connection_id, slot);
        self.snapshot_builder.force_next();
        JoinOutcome::Assigned(slot)
    }

    fn handle_leave(&mut self, connection_id: ConnectionId) {
        self.outboxes.remove(&connection_id);
        let Some(slot) = self.state.combatants.slot_of(connection_id) else {
            return;
        };
        self.state.combatants.remove(slot);
        info!(connection_id = %connection_id, slot = ?slot, "Player left room");

        if slot == Slot::A && self.state.ai_active {
            self.remove_synthetic();
        }

        let remaining: Vec<(Slot, ConnectionId)> = self.state.combatants.humans().collect();
        match remaining.first() {
            None => {
                info!("Room empty, resetting");
                self.state.reset_to_lobby(&[]);
                self.policy = OpponentPolicy::new();
            }
            Some(&(remaining_slot, remaining_id)) => {
                info!(connection_id = %remaining_id, "One player remains, resetting room to title");
                let identity = self
                    .state
                    .combatants
                    .get(remaining_slot)
                    .and_then(|c| c.base_identity);
                self.state
                    .reset_to_lobby(&[(Slot::A, remaining_id, identity)]);
                self.state.chosen_a = identity;
                self.policy = OpponentPolicy::new();
                self.send_slot_assignment(remaining_id, Slot::A);
            }
        }
        self.snapshot_builder.force_next();
    }

    fn handle_open_mode_select(&mut self, slot: Slot) {
        if self.state.phase != Phase::Title {
            debug!(slot = ?slot, phase = ?self.state.phase, "Mode select ignored");
            return;
        }
        self.change_phase(Phase::ModeSelect, 0.0);
    }

    fn handle_select_mode(&mut self, slot: Slot, mode: GameMode) {
        if self.state.phase != Phase::ModeSelect {
            debug!(slot = ?slot, phase = ?self.state.phase, "Mode choice out of phase");
            return;
        }
        let human_in_b = self
            .state
            .combatants
            .get(Slot::B)
            .is_some_and(|c| !c.is_synthetic());
        if mode == GameMode::Single && human_in_b {
            debug!(slot = ?slot, "Single player unavailable while slot B is seated");
            return;
        }

        self.remove_synthetic();
        let state = &mut self.state;
        state.mode = Some(mode);
        state.ai_active = mode == GameMode::Single;
        state.selection_complete_a = false;
        state.selection_complete_b = false;
        state.waiting_for_b = false;
        state.chosen_a = None;
        state.chosen_b = None;
        for combatant in state.combatants.iter_mut() {
            combatant.set_identity(None);
        }
        self.change_phase(Phase::CharacterSelectA, 0.0);
    }

    fn handle_select_character(&mut self, slot: Slot, name: &str) {
        let Some(pick) = Character::from_name(name) else {
            debug!(slot = ?slot, name, "Unknown character ignored");
            return;
        };

        let ready = match (self.state.phase, slot) {
            (Phase::CharacterSelectA, Slot::A) => {
                self.seat_identity(Slot::A, pick);
                self.state.selection_complete_a = true;
                match self.state.mode {
                    Some(GameMode::Single) => {
                        self.seat_synthetic_opponent(pick);
                        true
                    }
                    Some(GameMode::Two) => {
                        let b_connected = self
                            .state
                            .combatants
                            .get(Slot::B)
                            .is_some_and(|c| !c.is_synthetic());
                        if b_connected {
                            self.change_phase(Phase::CharacterSelectB, 0.0);
                        } else {
                            self.state.waiting_for_b = true;
                        }
                        false
                    }
                    None => false,
                }
            }
            (Phase::CharacterSelectB, Slot::B)
                if self.state.mode == Some(GameMode::Two) && self.state.selection_complete_a =>
            {
                self.seat_identity(Slot::B, pick);
                self.state.selection_complete_b = true;
                true
            }
            (phase, _) => {
                debug!(slot = ?slot, phase = ?phase, "Character choice out of phase");
                false
            }
        };

        if ready {
            self.change_phase(Phase::Controls, CONTROLS_SCREEN_MS);
        }
        self.snapshot_builder.force_next();
    }

    fn seat_identity(&mut self, slot: Slot, pick: Character) {
        match slot {
            Slot::A => self.state.chosen_a = Some(pick),
            Slot::B => self.state.chosen_b = Some(pick),
        }
        if let Some(combatant) = self.state.combatants.get_mut(slot) {
            combatant.set_identity(Some(pick));
        }
    }

    /// Put the opponent policy in slot B with a roster pick distinct from `pick` and the boss.
    fn seat_synthetic_opponent(&mut self, pick: Character) {
        let pool: Vec<Character> = Character::ROSTER
            .into_iter()
            .filter(|c| *c != pick && *c != Character::BOSS)
            .collect();
        let fallback: Vec<Character> = Character::ROSTER
            .into_iter()
            .filter(|c| *c != pick)
            .collect();
        let opponent = pool
            .choose(&mut self.rng)
            .or_else(|| fallback.choose(&mut self.rng))
            .copied()
            .unwrap_or(Character::ROSTER[0]);

        self.state.ai_active = true;
        self.state.chosen_b = Some(opponent);
        self.state.selection_complete_b = true;
        self.state.combatants.insert(
            CombatantState::new(Slot::B, Occupant::Synthetic).with_identity(Some(opponent)),
        );
        self.policy = OpponentPolicy::new();
        info!(opponent = opponent.name(), "Opponent policy seated in slot B");
    }

    fn remove_synthetic(&mut self) {
        let synthetic_in_b = self
            .state
            .combatants
            .get(Slot::B)
            .is_some_and(CombatantState::is_synthetic);
        if synthetic_in_b {
            self.state.combatants.remove(Slot::B);
            info!("Opponent policy removed");
        }
        self.state.ai_active = false;
    }

    fn handle_actions(&mut self, slot: Slot, actions: &[Action]) {
        if !self.state.phase.is_active_play() {
            return;
        }
        let Some(combatant) = self.state.combatants.get_mut(slot) else {
            return;
        };
        if !combatant.is_alive() || combatant.knockback_timer > 0 {
            return;
        }
        for action in actions {
            PhysicsSystem::apply_action(combatant, action);
        }
    }

    fn handle_change_background(&mut self, slot: Slot) {
        let state = &mut self.state;
        match state.phase {
            Phase::Special => {
                state.background_key = BackgroundKey::Church;
                state.background_index = (state.background_index + 1) % CHURCH_BG_COUNT;
            }
            Phase::Playing if state.special_level_active => {
                state.background_key = BackgroundKey::Church;
                state.background_index = (state.background_index + 1) % CHURCH_BG_COUNT;
            }
            Phase::Playing => {
                let index = (state.background_index + 1) % CITY_BG_COUNT;
                state.city_index = Some(index);
                state.background_index = index;
            }
            phase => {
                debug!(slot = ?slot, phase = ?phase, "Background change ignored");
                return;
            }
        }
        self.snapshot_builder.force_next();
    }

    /// Full reset that keeps every human in their slot
    fn handle_return_to_title(&mut self, slot: Slot) {
        info!(slot = ?slot, "Return to title requested");
        let keep: Vec<(Slot, ConnectionId, Option<Character>)> = self
            .state
            .combatants
            .humans()
            .map(|(slot, id)| (slot, id, None))
            .collect();
        self.state.reset_to_lobby(&keep);
        self.policy = OpponentPolicy::new();
        for (slot, id, _) in keep {
            self.send_slot_assignment(id, slot);
        }
        self.snapshot_builder.force_next();
    }

    /// Run a single simulation tick
    fn run_tick(&mut self, elapsed: Duration) -> Result<(), SimError> {
        self.tick += 1;
        self.state.clock_ms += elapsed.as_millis() as u64;
        self.state.clash_flash_ticks = self.state.clash_flash_ticks.saturating_sub(1);

        let elapsed_ms = elapsed.as_secs_f32() * 1000.0;
        if let Some((from, to)) = PhaseMachine::advance(&mut self.state, elapsed_ms, &mut self.rng)
        {
            info!(from = ?from, to = ?to, "Phase transition");
            if to == Phase::Title {
                self.policy = OpponentPolicy::new();
            }
            self.snapshot_builder.force_next();
        }

        if self.state.phase.is_active_play() {
            self.simulate_play()?;
        }
        Ok(())
    }

    /// Physics, opponent policy and combat for one tick of active play
    fn simulate_play(&mut self) -> Result<(), SimError> {
        let phase = self.state.phase;
        let special = SpecialContext::from_state(&self.state);
        let clock_ms = self.state.clock_ms;

        let missing = [Slot::A, Slot::B]
            .into_iter()
            .find(|slot| self.state.combatants.is_vacant(*slot));
        let Some((a, b)) = self.state.combatants.pair_mut() else {
            return Err(SimError::MissingCombatant {
                slot: missing.unwrap_or(Slot::B),
                phase,
            });
        };

        self.physics.step(a);
        if b.is_synthetic() {
            let as_boss = special.active
                && special.swap_slot == Some(Slot::B)
                && b.display_identity == Some(Character::BOSS);
            self.policy
                .act(b, a, as_boss, clock_ms, &self.physics, &mut self.rng);
        } else {
            self.physics.step(b);
        }

        for combatant in [&mut *a, &mut *b] {
            if combatant.missed_swing {
                combatant.missed_swing = false;
                self.state.effects.push(Effect::Whoosh);
            }
        }

        let resolution = CombatSystem::resolve(a, b, special);
        CombatSystem::apply_effects(&mut self.state, &resolution);
        CombatSystem::update_sword_cue(&mut self.state);

        if let Some(knockout) = resolution.knockout {
            info!(knockout = ?knockout, score_a = self.state.score_a, score_b = self.state.score_b, "Knockout");
            PhaseMachine::on_knockout(&mut self.state, knockout, &mut self.rng);
            self.snapshot_builder.force_next();
        }
        Ok(())
    }

    /// Broadcast a snapshot when due and refresh the status cell
    fn publish(&mut self) {
        if self.snapshot_builder.should_send() {
            let snapshot = self.snapshot_builder.build(self.tick, &mut self.state);
            // No receivers is fine: nobody is watching
            let _ = self.snapshot_tx.send(ServerMsg::RoomState { state: snapshot });
        }

        *self.status.write() = RoomStatus {
            running: true,
            phase: self.state.phase,
            players_count: self.state.combatants.human_count(),
            tick: self.tick,
        };
    }

    fn change_phase(&mut self, phase: Phase, timer_ms: f32) {
        let from = self.state.phase;
        self.state.set_phase(phase, timer_ms);
        info!(from = ?from, to = ?phase, "Phase transition");
        self.snapshot_builder.force_next();
    }

    fn send_slot_assignment(&mut self, connection_id: ConnectionId, slot: Slot) {
        let state = SnapshotBuilder::peek(self.tick, &self.state);
        self.send_to(connection_id, ServerMsg::SlotAssigned { slot, state });
    }

    /// Fire-and-forget send to one connection
    fn send_to(&mut self, connection_id: ConnectionId, msg: ServerMsg) {
        let Some(outbox) = self.outboxes.get(&connection_id) else {
            return;
        };
        if let Err(e) = outbox.try_send(msg) {
            warn!(connection_id = %connection_id, error = %e, "Dropped message for slow connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Animation;
    use crate::game::tuning::{
        ATTACK_DURATION_TICKS, HIT_DAMAGE, MAX_HEALTH, MAX_WINS, VICTORY_SCREEN_MS,
    };
    use crate::util::time::max_step;
    use crate::ws::protocol::Direction;
    use uuid::Uuid;

    const STEP: Duration = Duration::from_millis(16);

    fn room() -> Room {
        Room::new(RoomSettings {
            seed: Some(99),
            duck_timeout_ticks: None,
        })
        .0
    }

    fn join(room: &mut Room) -> (ConnectionId, JoinOutcome, mpsc::Receiver<ServerMsg>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(16);
        let outcome = room.handle_join(id, tx);
        (id, outcome, rx)
    }

    fn send(room: &mut Room, id: ConnectionId, msg: ClientMsg) {
        room.handle_client_msg(id, msg);
    }

    fn tick_until(room: &mut Room, phase: Phase) {
        for _ in 0..10_000 {
            if room.state.phase == phase {
                return;
            }
            room.run_tick(STEP).unwrap();
        }
        panic!("never reached {phase:?}, stuck in {:?}", room.state.phase);
    }

    /// Seat one human in single-player mode and play until the round starts.
    fn single_player_round(room: &mut Room) -> ConnectionId {
        let (id, _, _) = join(room);
        send(room, id, ClientMsg::OpenModeSelect);
        send(room, id, ClientMsg::SelectMode { mode: GameMode::Single });
        send(
            room,
            id,
            ClientMsg::SelectCharacter {
                name: "The Kylander".to_string(),
            },
        );
        tick_until(room, Phase::Playing);
        id
    }

    #[test]
    fn test_third_connection_is_turned_away() {
        let mut room = room();
        let (_, first, mut first_rx) = join(&mut room);
        let (_, second, _) = join(&mut room);
        let (_, third, _) = join(&mut room);

        assert_eq!(first, JoinOutcome::Assigned(Slot::A));
        assert_eq!(second, JoinOutcome::Assigned(Slot::B));
        assert_eq!(third, JoinOutcome::Full);
        assert!(matches!(
            first_rx.try_recv(),
            Ok(ServerMsg::SlotAssigned { slot: Slot::A, .. })
        ));
    }

    #[test]
    fn test_single_player_seats_distinct_opponent() {
        let mut room = room();
        let id = single_player_round(&mut room);

        let b = room.state.combatants.get(Slot::B).unwrap();
        assert!(b.is_synthetic());
        assert_eq!(b.base_identity, Some(Character::Potzer));
        assert!(room.state.ai_active);
        assert_eq!(
            room.state.combatants.get(Slot::A).unwrap().occupant,
            Occupant::Human(id)
        );
        assert_eq!(room.state.background_key, BackgroundKey::Paris);
    }

    #[test]
    fn test_joining_beside_opponent_policy_is_rejected() {
        let mut room = room();
        single_player_round(&mut room);

        let (_, outcome, _) = join(&mut room);

        assert_eq!(outcome, JoinOutcome::Full);
    }

    #[test]
    fn test_two_player_waits_for_second_connection() {
        let mut room = room();
        let (a, _, _) = join(&mut room);
        send(&mut room, a, ClientMsg::OpenModeSelect);
        send(&mut room, a, ClientMsg::SelectMode { mode: GameMode::Two });
        send(
            &mut room,
            a,
            ClientMsg::SelectCharacter {
                name: "The Potzer".to_string(),
            },
        );

        assert!(room.state.waiting_for_b);
        assert_eq!(room.state.phase, Phase::CharacterSelectA);

        let (b, outcome, _) = join(&mut room);
        assert_eq!(outcome, JoinOutcome::Assigned(Slot::B));
        assert_eq!(room.state.phase, Phase::CharacterSelectB);
        assert!(!room.state.waiting_for_b);

        send(
            &mut room,
            b,
            ClientMsg::SelectCharacter {
                name: "Darichris".to_string(),
            },
        );
        assert_eq!(room.state.phase, Phase::Controls);
        tick_until(&mut room, Phase::Playing);
        assert!(!room.state.ai_active);
    }

    #[test]
    fn test_character_choice_out_of_phase_is_ignored() {
        let mut room = room();
        let (a, _, _) = join(&mut room);

        send(
            &mut room,
            a,
            ClientMsg::SelectCharacter {
                name: "The Potzer".to_string(),
            },
        );
        send(
            &mut room,
            a,
            ClientMsg::SelectMode { mode: GameMode::Single },
        );

        assert_eq!(room.state.phase, Phase::Title);
        assert_eq!(room.state.chosen_a, None);
        assert_eq!(room.state.mode, None);
    }

    #[test]
    fn test_actions_only_apply_during_play() {
        let mut room = room();
        let (a, _, _) = join(&mut room);
        let before = room.state.combatants.get(Slot::A).unwrap().x;

        send(
            &mut room,
            a,
            ClientMsg::Actions {
                actions: vec![Action::Move {
                    direction: Direction::Right,
                }],
            },
        );

        assert_eq!(room.state.combatants.get(Slot::A).unwrap().x, before);
    }

    #[test]
    fn test_ducking_defender_takes_no_damage() {
        let mut room = room();
        let (a, _, _) = join(&mut room);
        let (b, _, _) = join(&mut room);
        send(&mut room, a, ClientMsg::OpenModeSelect);
        send(&mut room, a, ClientMsg::SelectMode { mode: GameMode::Two });
        send(
            &mut room,
            a,
            ClientMsg::SelectCharacter {
                name: "The Kylander".to_string(),
            },
        );
        send(
            &mut room,
            b,
            ClientMsg::SelectCharacter {
                name: "The Potzer".to_string(),
            },
        );
        tick_until(&mut room, Phase::Playing);

        room.state.combatants.get_mut(Slot::A).unwrap().x = 400.0;
        room.state.combatants.get_mut(Slot::B).unwrap().x = 450.0;
        room.state.combatants.get_mut(Slot::B).unwrap().facing = 1;
        send(
            &mut room,
            b,
            ClientMsg::Actions {
                actions: vec![Action::Duck { active: true }],
            },
        );
        send(
            &mut room,
            a,
            ClientMsg::Actions {
                actions: vec![Action::Attack],
            },
        );
        for _ in 0..ATTACK_DURATION_TICKS {
            room.run_tick(STEP).unwrap();
        }

        let defender = room.state.combatants.get(Slot::B).unwrap();
        assert_eq!(defender.health, MAX_HEALTH);
        assert_eq!(defender.animation, Animation::Duck);
        assert!(room.state.effects.contains(&Effect::Whoosh));
        assert!(!room.state.effects.contains(&Effect::Hit));
    }

    #[test]
    fn test_unevaded_hit_costs_one_hit_of_damage() {
        let mut room = room();
        let a_id = single_player_round(&mut room);

        // Park the opponent policy in a long knockback so it stays put
        {
            let b = room.state.combatants.get_mut(Slot::B).unwrap();
            b.x = 450.0;
            b.knockback_timer = 500;
        }
        room.state.combatants.get_mut(Slot::A).unwrap().x = 400.0;
        send(
            &mut room,
            a_id,
            ClientMsg::Actions {
                actions: vec![Action::Attack],
            },
        );
        for _ in 0..ATTACK_DURATION_TICKS {
            room.run_tick(STEP).unwrap();
        }

        let b = room.state.combatants.get(Slot::B).unwrap();
        assert_eq!(b.health, MAX_HEALTH - HIT_DAMAGE);
        assert_eq!(room.state.effects.iter().filter(|e| **e == Effect::Hit).count(), 1);
    }

    #[test]
    fn test_host_leaving_single_player_empties_room() {
        let mut room = room();
        let id = single_player_round(&mut room);

        room.handle_leave(id);

        assert_eq!(room.state.phase, Phase::Title);
        assert!(room.state.combatants.is_vacant(Slot::A));
        assert!(room.state.combatants.is_vacant(Slot::B));
        assert!(!room.state.ai_active);
        assert_eq!(room.state.mode, None);
    }

    #[test]
    fn test_remaining_player_is_rebound_to_slot_a() {
        let mut room = room();
        let (a, _, _) = join(&mut room);
        let (b, _, mut b_rx) = join(&mut room);
        room.state.score_b = 2;
        while b_rx.try_recv().is_ok() {}

        room.handle_leave(a);

        assert_eq!(room.state.phase, Phase::Title);
        assert_eq!(room.state.combatants.slot_of(b), Some(Slot::A));
        assert_eq!(room.state.score_b, 0);
        assert!(matches!(
            b_rx.try_recv(),
            Ok(ServerMsg::SlotAssigned { slot: Slot::A, .. })
        ));

        let (_, outcome, _) = join(&mut room);
        assert_eq!(outcome, JoinOutcome::Assigned(Slot::B));
    }

    #[test]
    fn test_return_to_title_keeps_bindings() {
        let mut room = room();
        let id = single_player_round(&mut room);
        room.state.score_a = 3;

        send(&mut room, id, ClientMsg::ReturnToTitle);

        assert_eq!(room.state.phase, Phase::Title);
        assert_eq!(room.state.score_a, 0);
        assert_eq!(room.state.combatants.slot_of(id), Some(Slot::A));
        assert!(room.state.combatants.is_vacant(Slot::B));
        assert_eq!(room.state.combatants.get(Slot::A).unwrap().base_identity, None);
    }

    #[test]
    fn test_change_background_cycles_city_index() {
        let mut room = room();
        let id = single_player_round(&mut room);
        let start = room.state.background_index;

        send(&mut room, id, ClientMsg::ChangeBackground);

        assert_eq!(room.state.background_index, (start + 1) % CITY_BG_COUNT);
        assert_eq!(room.state.city_index, Some(room.state.background_index));
    }

    #[test]
    fn test_change_background_cycles_church_in_special() {
        let mut room = room();
        let id = single_player_round(&mut room);
        room.state.special_level_active = true;
        room.state.special_swap_slot = Some(Slot::B);
        room.state.set_phase(Phase::Special, 0.0);
        room.state.background_key = BackgroundKey::Church;
        room.state.background_index = CHURCH_BG_COUNT - 1;
        let city = room.state.city_index;

        send(&mut room, id, ClientMsg::ChangeBackground);

        assert_eq!(room.state.background_key, BackgroundKey::Church);
        assert_eq!(room.state.background_index, 0);
        assert_eq!(room.state.city_index, city);
    }

    #[test]
    fn test_change_background_ignored_outside_play() {
        let mut room = room();
        let (id, _, _) = join(&mut room);
        send(&mut room, id, ClientMsg::OpenModeSelect);

        send(&mut room, id, ClientMsg::ChangeBackground);

        assert_eq!(room.state.phase, Phase::ModeSelect);
        assert_eq!(room.state.background_key, BackgroundKey::Paris);
        assert_eq!(room.state.background_index, 0);
        assert_eq!(room.state.city_index, None);
    }

    #[test]
    fn test_single_player_match_frees_slot_b_at_title() {
        let mut room = room();
        let host = single_player_round(&mut room);
        room.state.score_a = MAX_WINS;
        room.state.match_winner = Some(Slot::A);
        room.state.set_phase(Phase::Final, VICTORY_SCREEN_MS);

        tick_until(&mut room, Phase::Title);

        assert!(!room.state.ai_active);
        assert_eq!(room.state.mode, None);
        assert!(room.state.combatants.is_vacant(Slot::B));
        assert_eq!(room.state.combatants.slot_of(host), Some(Slot::A));

        let (guest, outcome, _) = join(&mut room);
        assert_eq!(outcome, JoinOutcome::Assigned(Slot::B));
        assert_eq!(room.state.combatants.human_count(), 2);

        send(&mut room, host, ClientMsg::OpenModeSelect);
        send(&mut room, host, ClientMsg::SelectMode { mode: GameMode::Two });
        assert_eq!(room.state.phase, Phase::CharacterSelectA);
        assert_eq!(room.state.combatants.slot_of(guest), Some(Slot::B));
    }

    #[test]
    fn test_missing_combatant_is_a_tick_error() {
        let mut room = room();
        single_player_round(&mut room);
        room.state.combatants.remove(Slot::B);

        let err = room.run_tick(STEP).unwrap_err();

        assert!(matches!(
            err,
            SimError::MissingCombatant {
                slot: Slot::B,
                phase: Phase::Playing
            }
        ));
    }

    #[test]
    fn test_ping_answers_sender_only() {
        let mut room = room();
        let (a, _, mut a_rx) = join(&mut room);
        let (_, _, mut b_rx) = join(&mut room);
        while a_rx.try_recv().is_ok() {}
        while b_rx.try_recv().is_ok() {}

        send(&mut room, a, ClientMsg::Ping { t: 42 });

        assert!(matches!(a_rx.try_recv(), Ok(ServerMsg::Pong { t: 42 })));
        assert!(b_rx.try_recv().is_err());
    }

    #[test]
    fn test_clamped_step_drives_phase_timer() {
        let mut room = room();
        room.state.set_phase(Phase::Controls, CONTROLS_SCREEN_MS);
        room.run_tick(max_step()).unwrap();
        assert!(room.state.phase_timer_ms < CONTROLS_SCREEN_MS);
        assert!(room.state.phase_timer_ms >= CONTROLS_SCREEN_MS - 34.0);
    }

    #[tokio::test]
    async fn test_room_loop_keeps_ticking_after_tick_error() {
        let (mut room, handle) = Room::new(RoomSettings {
            seed: Some(3),
            duck_timeout_ticks: None,
        });
        let (outbox, _inbox) = mpsc::channel(16);
        room.handle_join(Uuid::new_v4(), outbox);
        room.state.set_phase(Phase::Playing, 0.0);
        assert!(room.run_tick(STEP).is_err());
        tokio::spawn(room.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let first = handle.status();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = handle.status();

        assert!(first.running);
        assert_eq!(second.phase, Phase::Playing);
        assert!(second.tick > first.tick);
    }

    #[tokio::test]
    async fn test_room_loop_serves_joins_and_snapshots() {
        let (room, handle) = Room::new(RoomSettings {
            seed: Some(1),
            duck_timeout_ticks: None,
        });
        tokio::spawn(room.run());

        let mut snapshots = handle.subscribe();
        let (outbox, mut inbox) = mpsc::channel(16);
        let id = Uuid::new_v4();
        let outcome = tokio_test::assert_ok!(handle.join(id, outbox).await);
        assert_eq!(outcome, JoinOutcome::Assigned(Slot::A));

        let assigned = tokio::time::timeout(Duration::from_secs(1), inbox.recv()).await;
        assert!(matches!(
            assigned,
            Ok(Some(ServerMsg::SlotAssigned { slot: Slot::A, .. }))
        ));

        let snapshot = tokio::time::timeout(Duration::from_secs(1), snapshots.recv()).await;
        assert!(matches!(snapshot, Ok(Ok(ServerMsg::RoomState { .. }))));

        tokio_test::assert_ok!(handle.send(id, ClientMsg::OpenModeSelect).await);
        tokio::time::sleep(Duration::from_millis(100)).await;
        let status = handle.status();
        assert!(status.running);
        assert_eq!(status.phase, Phase::ModeSelect);
        assert_eq!(status.players_count, 1);
    }
}
