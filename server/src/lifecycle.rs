//! Match lifecycle: waiting, countdown, running, game over and restart
//!
//! The controller owns the [`Match`] and is the only code that changes its
//! phase. Every handler runs to completion on the server's event loop and
//! queues the packets it wants sent in an outbox, which the network layer
//! drains after each call. Timers are described by the match's
//! [`TimerHandle`]; the network layer turns them into real intervals and
//! reports firings back through [`MatchController::on_timer`].

use crate::ai::AiPolicy;
use crate::client_manager::AI_NAME;
use crate::config::MatchConfig;
use crate::game::{Match, MatchPhase, Occupant, SlotState, TimerHandle, TimerKind};
use crate::score::ScoreSink;
use log::{debug, error, info};
use shared::{CountdownValue, Direction, EndReason, MatchResult, Packet, Phase, Slot};
use std::collections::BTreeSet;

/// Recipient of an outgoing packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every client holding a slot
    All,
    Slot(Slot),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub target: Target,
    pub packet: Packet,
}

pub struct MatchController {
    game: Match,
    config: MatchConfig,
    scores: Box<dyn ScoreSink>,
    outbox: Vec<Outgoing>,
}

impl MatchController {
    pub fn new(config: MatchConfig, scores: Box<dyn ScoreSink>) -> Self {
        let game = Match::new(config.grid, config.oracle());
        Self {
            game,
            config,
            scores,
            outbox: Vec::new(),
        }
    }

    pub fn game(&self) -> &Match {
        &self.game
    }

    pub fn phase(&self) -> Phase {
        self.game.phase().tag()
    }

    pub fn timer(&self) -> Option<TimerHandle> {
        self.game.timer()
    }

    /// Takes every packet queued since the last drain
    pub fn drain_outbox(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    /// Seats a human in `slot`
    ///
    /// The second occupant starts the countdown; a lone occupant is told to
    /// wait for an opponent.
    pub fn join(&mut self, slot: Slot, name: &str, client_id: u32) {
        if self.game.slot(slot).is_some() {
            error!("Slot {} is already occupied; ignoring join from {}", slot.number(), name);
            return;
        }

        self.game.occupy(slot, name, Occupant::Human { client_id });
        info!("{} took slot {}", name, slot.number());

        if self.game.is_full() {
            self.start_countdown();
        } else {
            self.broadcast_state();
            self.send(Target::Slot(slot), Packet::WaitingForOpponent);
        }
    }

    /// Seats a human in slot one against the AI in slot two and starts the
    /// countdown straight away
    pub fn start_ai_match(&mut self, name: &str, client_id: u32) {
        if self.game.slot(Slot::Two).is_some() {
            error!("Slot 2 is already occupied; cannot start an AI match for {}", name);
            return;
        }

        self.game.occupy(Slot::One, name, Occupant::Human { client_id });
        self.game.occupy(Slot::Two, AI_NAME, Occupant::Ai(AiPolicy::new()));
        info!("{} started a match against {}", name, AI_NAME);

        self.start_countdown();
    }

    /// Queues a heading change for the next tick
    ///
    /// Ignored unless the match is running, the slot is human, its board is
    /// alive and the heading is not a reversal.
    pub fn change_direction(&mut self, slot: Slot, direction: Direction) {
        if *self.game.phase() != MatchPhase::Running {
            return;
        }
        if let Some(state) = self.game.slot_mut(slot) {
            if !state.occupant.is_ai() && !state.board.request_direction(direction) {
                debug!("Dropped {:?} from slot {}", direction, slot.number());
            }
        }
    }

    /// Registers a restart vote after a finished match
    ///
    /// An AI opponent always agrees. Once both slots have voted a new
    /// countdown begins.
    pub fn request_restart(&mut self, slot: Slot) {
        if self.game.slot(slot).is_none() {
            return;
        }
        let opponent = slot.opponent();
        let opponent_is_ai = self
            .game
            .slot(opponent)
            .map(|state| state.occupant.is_ai())
            .unwrap_or(false);

        let MatchPhase::Over { restart_votes } = self.game.phase_mut() else {
            debug!("Restart request from slot {} outside game over", slot.number());
            return;
        };
        restart_votes.insert(slot);
        if opponent_is_ai {
            restart_votes.insert(opponent);
        }
        let agreed = Slot::BOTH.iter().all(|slot| restart_votes.contains(slot));

        if agreed {
            info!("Both slots agreed to a rematch");
            self.send(Target::All, Packet::BothReadyForRestart);
            self.start_countdown();
        } else {
            self.send(Target::Slot(slot), Packet::RestartAcknowledged);
            self.send(Target::Slot(opponent), Packet::OpponentRequestedRestart);
        }
    }

    /// Removes the occupant of `slot`
    ///
    /// Leaving a live match hands the win to a human opponent by forfeit.
    /// An AI opponent is dissolved with its human; the returned slot is the
    /// AI slot that was cleared, so the registry can release it too.
    pub fn leave(&mut self, slot: Slot) -> Option<Slot> {
        let departed = self.game.vacate(slot)?;
        let live = matches!(
            self.game.phase(),
            MatchPhase::CountingDown { .. } | MatchPhase::Running
        );
        self.game.cancel_timer();
        info!("{} left slot {}", departed.name, slot.number());

        let opponent = slot.opponent();
        let remaining = self.game.slot(opponent).map(|state| state.occupant);

        if live {
            self.record_score(&departed);
            if let Some(state) = self.game.slot(opponent).cloned() {
                self.record_score(&state);
            }
        }

        let dissolved = match remaining {
            Some(Occupant::Ai(_)) => {
                self.game.vacate(opponent);
                info!("Dissolved AI opponent in slot {}", opponent.number());
                Some(opponent)
            }
            Some(Occupant::Human { .. }) => {
                if live {
                    self.send(
                        Target::All,
                        Packet::MatchOver(MatchResult {
                            winner: Some(opponent),
                            reason: EndReason::OpponentLeft,
                        }),
                    );
                }
                None
            }
            None => None,
        };

        self.game.set_phase(MatchPhase::Idle);
        self.game.reset_boards();
        self.broadcast_state();
        if matches!(remaining, Some(Occupant::Human { .. })) {
            self.send(Target::Slot(opponent), Packet::WaitingForOpponent);
        }

        dissolved
    }

    /// Handles a firing of the timer tagged `epoch`
    ///
    /// Firings from a cancelled or superseded timer are ignored.
    pub fn on_timer(&mut self, epoch: u64) {
        let Some(timer) = self.game.live_timer(epoch) else {
            debug!("Ignoring stale timer epoch {}", epoch);
            return;
        };

        match timer.kind {
            TimerKind::Countdown => self.advance_countdown(),
            TimerKind::Tick => self.run_tick(),
        }
    }

    fn start_countdown(&mut self) {
        self.game.cancel_timer();
        self.game.reset_boards();
        let from = self.config.countdown_from;
        self.game.set_phase(MatchPhase::CountingDown { remaining: from });
        info!("Countdown started");

        self.broadcast_state();
        self.announce_countdown(from);
        self.game.arm_timer(TimerKind::Countdown, self.config.countdown_interval);
    }

    fn advance_countdown(&mut self) {
        let MatchPhase::CountingDown { remaining } = *self.game.phase() else {
            error!("Countdown timer fired outside the countdown");
            self.game.cancel_timer();
            return;
        };

        if remaining > 0 {
            let next = remaining - 1;
            self.game.set_phase(MatchPhase::CountingDown { remaining: next });
            self.announce_countdown(next);
        } else {
            self.send(Target::All, Packet::CountdownTick { value: None });
            self.start_running();
        }
    }

    fn announce_countdown(&mut self, remaining: u8) {
        let value = if remaining > 0 {
            CountdownValue::Number(remaining)
        } else {
            CountdownValue::Go
        };
        self.send(Target::All, Packet::CountdownTick { value: Some(value) });
    }

    fn start_running(&mut self) {
        if !self.game.is_full() {
            self.abort("countdown finished without two occupants");
            return;
        }

        self.game.set_phase(MatchPhase::Running);
        self.game.arm_timer(TimerKind::Tick, self.config.tick_duration);
        info!(
            "Match running at {:.2} ticks per second",
            self.config.tick_rate_hz()
        );
        self.broadcast_state();
    }

    fn run_tick(&mut self) {
        if *self.game.phase() != MatchPhase::Running {
            error!("Tick timer fired outside a running match");
            self.game.cancel_timer();
            return;
        }

        let Some([first, second]) = self.game.step() else {
            self.abort("tick with an empty slot");
            return;
        };

        let result = match (first.terminated, second.terminated) {
            (true, true) => Some(MatchResult::draw()),
            (true, false) => Some(MatchResult {
                winner: Some(Slot::Two),
                reason: first.cause.map(EndReason::from).unwrap_or(EndReason::Collision),
            }),
            (false, true) => Some(MatchResult {
                winner: Some(Slot::One),
                reason: second.cause.map(EndReason::from).unwrap_or(EndReason::Collision),
            }),
            (false, false) => None,
        };

        match result {
            Some(result) => self.finish(result),
            None => self.broadcast_state(),
        }
    }

    fn finish(&mut self, result: MatchResult) {
        self.game.cancel_timer();
        self.game.set_phase(MatchPhase::Over {
            restart_votes: BTreeSet::new(),
        });
        info!(
            "Match over after {} ticks: winner slot {}, {:?}",
            self.game.tick(),
            result.winner_slot(),
            result.reason
        );

        for slot in self.game.occupied_slots() {
            if let Some(state) = self.game.slot(slot).cloned() {
                self.record_score(&state);
            }
        }

        self.broadcast_state();
        self.send(Target::All, Packet::MatchOver(result));
    }

    /// Drops back to idle after an inconsistency instead of surfacing it
    fn abort(&mut self, reason: &str) {
        error!("Invariant violated ({}); resetting match to idle", reason);
        self.game.cancel_timer();
        self.game.set_phase(MatchPhase::Idle);
        self.game.reset_boards();
        self.broadcast_state();
        for slot in self.game.occupied_slots() {
            self.send(Target::Slot(slot), Packet::WaitingForOpponent);
        }
    }

    fn record_score(&mut self, state: &SlotState) {
        if let Err(e) = self.scores.record(&state.name, state.board.score) {
            error!("Failed to record score for {}: {}", state.name, e);
        }
    }

    fn broadcast_state(&mut self) {
        let snapshot = self.game.snapshot();
        self.send(Target::All, Packet::MatchState(snapshot));
    }

    fn send(&mut self, target: Target, packet: Packet) {
        self.outbox.push(Outgoing { target, packet });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::MemoryScoreSink;
    use shared::Coord;
    use std::io;
    use std::time::Duration;

    struct FailingSink;

    impl ScoreSink for FailingSink {
        fn record(&mut self, _name: &str, _score: u32) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    fn test_config() -> MatchConfig {
        MatchConfig {
            seed: Some(21),
            ..MatchConfig::default()
        }
    }

    fn controller() -> (MatchController, MemoryScoreSink) {
        let sink = MemoryScoreSink::default();
        let controller = MatchController::new(test_config(), Box::new(sink.clone()));
        (controller, sink)
    }

    fn packets(outgoing: &[Outgoing]) -> Vec<&Packet> {
        outgoing.iter().map(|out| &out.packet).collect()
    }

    fn countdown_values(outgoing: &[Outgoing]) -> Vec<Option<CountdownValue>> {
        outgoing
            .iter()
            .filter_map(|out| match out.packet {
                Packet::CountdownTick { value } => Some(value),
                _ => None,
            })
            .collect()
    }

    fn fire(controller: &mut MatchController) {
        let epoch = controller.timer().expect("timer armed").epoch;
        controller.on_timer(epoch);
    }

    /// Runs the countdown through to the first running state
    fn run_countdown(controller: &mut MatchController) {
        while controller.phase() == Phase::CountingDown {
            fire(controller);
        }
    }

    fn two_humans() -> (MatchController, MemoryScoreSink) {
        let (mut controller, sink) = controller();
        controller.join(Slot::One, "ada", 1);
        controller.join(Slot::Two, "grace", 2);
        run_countdown(&mut controller);
        controller.drain_outbox();
        (controller, sink)
    }

    fn place(
        controller: &mut MatchController,
        slot: Slot,
        snake: &[(i32, i32)],
        direction: Direction,
    ) {
        let board = &mut controller.game.slot_mut(slot).unwrap().board;
        board.snake = snake.iter().map(|&(x, y)| Coord::new(x, y)).collect();
        board.direction = direction;
        board.food = Coord::new(0, 19);
    }

    #[test]
    fn test_first_join_waits_for_opponent() {
        let (mut controller, _) = controller();
        controller.join(Slot::One, "ada", 1);

        assert_eq!(controller.phase(), Phase::Idle);
        assert_eq!(controller.timer(), None);

        let out = controller.drain_outbox();
        assert!(matches!(out[0].packet, Packet::MatchState(_)));
        assert_eq!(
            out[1],
            Outgoing {
                target: Target::Slot(Slot::One),
                packet: Packet::WaitingForOpponent,
            }
        );
    }

    #[test]
    fn test_second_join_runs_full_countdown() {
        let (mut controller, _) = controller();
        controller.join(Slot::One, "ada", 1);
        controller.drain_outbox();

        controller.join(Slot::Two, "grace", 2);
        assert_eq!(controller.phase(), Phase::CountingDown);
        let timer = controller.timer().unwrap();
        assert_eq!(timer.kind, TimerKind::Countdown);
        assert_eq!(timer.period, Duration::from_secs(1));

        let mut out = controller.drain_outbox();
        assert!(matches!(out[0].packet, Packet::MatchState(_)));
        for _ in 0..4 {
            assert_eq!(controller.phase(), Phase::CountingDown);
            fire(&mut controller);
            out.extend(controller.drain_outbox());
        }

        assert_eq!(
            countdown_values(&out),
            vec![
                Some(CountdownValue::Number(3)),
                Some(CountdownValue::Number(2)),
                Some(CountdownValue::Number(1)),
                Some(CountdownValue::Go),
                None,
            ]
        );
        assert_eq!(controller.phase(), Phase::Running);
        assert_eq!(controller.timer().unwrap().kind, TimerKind::Tick);
        assert_eq!(
            controller.timer().unwrap().period,
            Duration::from_millis(150)
        );
    }

    #[test]
    fn test_input_ignored_outside_running() {
        let (mut controller, _) = controller();
        controller.join(Slot::One, "ada", 1);
        controller.join(Slot::Two, "grace", 2);

        controller.change_direction(Slot::One, Direction::Up);
        let board = &controller.game().slot(Slot::One).unwrap().board;
        assert_eq!(board.pending_direction, None);
    }

    #[test]
    fn test_input_applied_on_next_tick() {
        let (mut controller, _) = two_humans();
        place(&mut controller, Slot::One, &[(5, 5), (4, 5)], Direction::Right);

        controller.change_direction(Slot::One, Direction::Left);
        controller.change_direction(Slot::One, Direction::Down);
        assert_eq!(
            controller.game().slot(Slot::One).unwrap().board.direction,
            Direction::Right
        );

        fire(&mut controller);

        let board = &controller.game().slot(Slot::One).unwrap().board;
        assert_eq!(board.direction, Direction::Down);
        assert_eq!(board.head(), Some(Coord::new(5, 6)));
        let out = controller.drain_outbox();
        assert!(matches!(
            out.as_slice(),
            [Outgoing {
                target: Target::All,
                packet: Packet::MatchState(_),
            }]
        ));
    }

    #[test]
    fn test_single_wall_hit_awards_opponent() {
        let (mut controller, sink) = two_humans();
        place(&mut controller, Slot::One, &[(19, 5), (18, 5)], Direction::Right);
        place(&mut controller, Slot::Two, &[(5, 5), (4, 5)], Direction::Right);

        fire(&mut controller);

        assert_eq!(controller.phase(), Phase::Over);
        assert_eq!(controller.timer(), None);
        let out = controller.drain_outbox();
        let over = out
            .iter()
            .find_map(|o| match &o.packet {
                Packet::MatchOver(result) => Some(*result),
                _ => None,
            })
            .unwrap();
        assert_eq!(over.winner_slot(), 2);
        assert_eq!(over.reason, EndReason::WallCollision);
        assert_eq!(sink.entries().len(), 2);
    }

    #[test]
    fn test_simultaneous_wall_hits_draw() {
        let (mut controller, sink) = two_humans();
        place(&mut controller, Slot::One, &[(19, 5), (18, 5)], Direction::Right);
        place(&mut controller, Slot::Two, &[(0, 5), (1, 5)], Direction::Left);

        fire(&mut controller);

        let out = controller.drain_outbox();
        assert!(packets(&out).contains(&&Packet::MatchOver(MatchResult::draw())));
        assert_eq!(
            sink.entries(),
            vec![("ada".to_string(), 0), ("grace".to_string(), 0)]
        );
    }

    #[test]
    fn test_self_collision_reason() {
        let (mut controller, _) = two_humans();
        place(
            &mut controller,
            Slot::Two,
            &[(5, 5), (6, 5), (6, 6), (5, 6)],
            Direction::Down,
        );
        place(&mut controller, Slot::One, &[(5, 5), (4, 5)], Direction::Right);

        fire(&mut controller);

        let out = controller.drain_outbox();
        assert!(packets(&out).contains(&&Packet::MatchOver(MatchResult {
            winner: Some(Slot::One),
            reason: EndReason::SelfCollision,
        })));
    }

    #[test]
    fn test_restart_needs_both_humans() {
        let (mut controller, _) = two_humans();
        place(&mut controller, Slot::One, &[(19, 5), (18, 5)], Direction::Right);
        fire(&mut controller);
        controller.drain_outbox();

        controller.request_restart(Slot::One);
        assert_eq!(controller.phase(), Phase::Over);
        assert_eq!(
            controller.drain_outbox(),
            vec![
                Outgoing {
                    target: Target::Slot(Slot::One),
                    packet: Packet::RestartAcknowledged,
                },
                Outgoing {
                    target: Target::Slot(Slot::Two),
                    packet: Packet::OpponentRequestedRestart,
                },
            ]
        );

        controller.request_restart(Slot::Two);
        assert_eq!(controller.phase(), Phase::CountingDown);
        let out = controller.drain_outbox();
        assert_eq!(out[0].packet, Packet::BothReadyForRestart);

        let board = &controller.game().slot(Slot::One).unwrap().board;
        assert!(!board.terminated);
        assert_eq!(board.owner_name, "ada");
    }

    #[test]
    fn test_restart_against_ai_starts_immediately() {
        let (mut controller, _) = controller();
        controller.start_ai_match("ada", 1);
        run_countdown(&mut controller);
        place(&mut controller, Slot::One, &[(19, 5), (18, 5)], Direction::Right);
        fire(&mut controller);
        assert_eq!(controller.phase(), Phase::Over);
        controller.drain_outbox();

        controller.request_restart(Slot::One);

        assert_eq!(controller.phase(), Phase::CountingDown);
        let out = controller.drain_outbox();
        assert_eq!(out[0].packet, Packet::BothReadyForRestart);
        assert_eq!(
            countdown_values(&out),
            vec![Some(CountdownValue::Number(3))]
        );
    }

    #[test]
    fn test_restart_ignored_while_running() {
        let (mut controller, _) = two_humans();
        controller.request_restart(Slot::One);

        assert_eq!(controller.phase(), Phase::Running);
        assert!(controller.drain_outbox().is_empty());
    }

    #[test]
    fn test_forfeit_while_running() {
        let (mut controller, sink) = two_humans();

        assert_eq!(controller.leave(Slot::One), None);

        assert_eq!(controller.phase(), Phase::Idle);
        assert_eq!(controller.timer(), None);
        assert!(controller.game().slot(Slot::One).is_none());
        assert!(controller.game().slot(Slot::Two).is_some());
        assert_eq!(sink.entries().len(), 2);

        let out = controller.drain_outbox();
        assert!(packets(&out).contains(&&Packet::MatchOver(MatchResult {
            winner: Some(Slot::Two),
            reason: EndReason::OpponentLeft,
        })));
        assert_eq!(
            out.last(),
            Some(&Outgoing {
                target: Target::Slot(Slot::Two),
                packet: Packet::WaitingForOpponent,
            })
        );
    }

    #[test]
    fn test_forfeit_during_countdown_cancels_timer() {
        let (mut controller, _) = controller();
        controller.join(Slot::One, "ada", 1);
        controller.join(Slot::Two, "grace", 2);
        let countdown = controller.timer().unwrap();

        controller.leave(Slot::Two);

        assert_eq!(controller.timer(), None);
        controller.drain_outbox();
        controller.on_timer(countdown.epoch);
        assert_eq!(controller.phase(), Phase::Idle);
        assert!(controller.drain_outbox().is_empty());
    }

    #[test]
    fn test_leaving_ai_match_dissolves_ai() {
        let (mut controller, _) = controller();
        controller.start_ai_match("ada", 1);
        run_countdown(&mut controller);

        assert_eq!(controller.leave(Slot::One), Some(Slot::Two));

        assert_eq!(controller.phase(), Phase::Idle);
        assert!(controller.game().occupied_slots().is_empty());
        let out = controller.drain_outbox();
        assert!(!out
            .iter()
            .any(|o| matches!(o.packet, Packet::MatchOver(_))));
    }

    #[test]
    fn test_leave_after_game_over_is_quiet() {
        let (mut controller, sink) = two_humans();
        place(&mut controller, Slot::One, &[(19, 5), (18, 5)], Direction::Right);
        fire(&mut controller);
        controller.drain_outbox();
        let recorded = sink.entries().len();

        controller.leave(Slot::Two);

        assert_eq!(controller.phase(), Phase::Idle);
        assert_eq!(sink.entries().len(), recorded);
        let out = controller.drain_outbox();
        assert!(!out
            .iter()
            .any(|o| matches!(o.packet, Packet::MatchOver(_))));
    }

    #[test]
    fn test_tick_with_emptied_slot_aborts_to_idle() {
        let (mut controller, _) = two_humans();
        controller.game.vacate(Slot::Two);

        fire(&mut controller);

        assert_eq!(controller.phase(), Phase::Idle);
        assert_eq!(controller.timer(), None);
        let out = controller.drain_outbox();
        assert!(out
            .iter()
            .any(|o| o.target == Target::All && matches!(o.packet, Packet::MatchState(_))));
        assert!(out.contains(&Outgoing {
            target: Target::Slot(Slot::One),
            packet: Packet::WaitingForOpponent,
        }));
        assert!(!out
            .iter()
            .any(|o| matches!(o.packet, Packet::MatchOver(_))));
    }

    #[test]
    fn test_stale_tick_from_previous_round_is_ignored() {
        let (mut controller, _) = two_humans();
        let old_tick = controller.timer().unwrap().epoch;
        place(&mut controller, Slot::One, &[(19, 5), (18, 5)], Direction::Right);
        fire(&mut controller);
        controller.request_restart(Slot::One);
        controller.request_restart(Slot::Two);
        controller.drain_outbox();

        controller.on_timer(old_tick);

        assert_eq!(controller.phase(), Phase::CountingDown);
        assert!(controller.drain_outbox().is_empty());
    }

    #[test]
    fn test_score_failure_does_not_block_game_over() {
        let mut controller = MatchController::new(test_config(), Box::new(FailingSink));
        controller.join(Slot::One, "ada", 1);
        controller.join(Slot::Two, "grace", 2);
        run_countdown(&mut controller);
        place(&mut controller, Slot::One, &[(19, 5), (18, 5)], Direction::Right);

        fire(&mut controller);

        assert_eq!(controller.phase(), Phase::Over);
        let out = controller.drain_outbox();
        assert!(out
            .iter()
            .any(|o| matches!(o.packet, Packet::MatchOver(_))));
    }

    #[test]
    fn test_ai_match_plays_until_game_over() {
        let (mut controller, _) = controller();
        controller.start_ai_match("ada", 1);
        run_countdown(&mut controller);

        // The human never steers, so their snake reaches the wall first
        for _ in 0..100 {
            if controller.phase() != Phase::Running {
                break;
            }
            fire(&mut controller);
        }

        assert_eq!(controller.phase(), Phase::Over);
        let out = controller.drain_outbox();
        let result = out
            .iter()
            .find_map(|o| match &o.packet {
                Packet::MatchOver(result) => Some(*result),
                _ => None,
            })
            .unwrap();
        assert_eq!(result.winner, Some(Slot::Two));
        assert_eq!(result.reason, EndReason::WallCollision);
    }
}
