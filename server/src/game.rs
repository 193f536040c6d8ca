//! The match aggregate: both slots, the lifecycle phase and the active timer

use crate::ai::AiPolicy;
use crate::board::Board;
use crate::oracle::PositionOracle;
use crate::resolver::{self, TickOutcome};
use log::debug;
use shared::{Grid, MatchSnapshot, Phase, Slot};
use std::collections::BTreeSet;
use std::time::Duration;

/// What drives a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupant {
    Human { client_id: u32 },
    Ai(AiPolicy),
}

impl Occupant {
    pub fn is_ai(&self) -> bool {
        matches!(self, Occupant::Ai(_))
    }
}

#[derive(Debug, Clone)]
pub struct SlotState {
    pub name: String,
    pub occupant: Occupant,
    pub board: Board,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchPhase {
    Idle,
    /// `remaining` is the value on display; zero means "GO" is showing
    CountingDown {
        remaining: u8,
    },
    Running,
    Over {
        restart_votes: BTreeSet<Slot>,
    },
}

impl MatchPhase {
    pub fn tag(&self) -> Phase {
        match self {
            MatchPhase::Idle => Phase::Idle,
            MatchPhase::CountingDown { .. } => Phase::CountingDown,
            MatchPhase::Running => Phase::Running,
            MatchPhase::Over { .. } => Phase::Over,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Countdown,
    Tick,
}

/// A periodic timer owned by the match
///
/// Arming a new timer bumps the epoch; firings carrying an older epoch
/// belong to a superseded timer and are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    pub epoch: u64,
    pub kind: TimerKind,
    pub period: Duration,
}

#[derive(Debug)]
pub struct Match {
    grid: Grid,
    slots: [Option<SlotState>; 2],
    phase: MatchPhase,
    tick: u32,
    timer: Option<TimerHandle>,
    epoch: u64,
    oracle: PositionOracle,
}

impl Match {
    pub fn new(grid: Grid, oracle: PositionOracle) -> Self {
        Self {
            grid,
            slots: [None, None],
            phase: MatchPhase::Idle,
            tick: 0,
            timer: None,
            epoch: 0,
            oracle,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn phase(&self) -> &MatchPhase {
        &self.phase
    }

    pub fn phase_mut(&mut self) -> &mut MatchPhase {
        &mut self.phase
    }

    pub fn set_phase(&mut self, phase: MatchPhase) {
        debug!("Match phase {:?} -> {:?}", self.phase.tag(), phase.tag());
        self.phase = phase;
    }

    pub fn slot(&self, slot: Slot) -> Option<&SlotState> {
        self.slots[slot.index()].as_ref()
    }

    pub fn slot_mut(&mut self, slot: Slot) -> Option<&mut SlotState> {
        self.slots[slot.index()].as_mut()
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn occupied_slots(&self) -> Vec<Slot> {
        Slot::BOTH
            .into_iter()
            .filter(|slot| self.slots[slot.index()].is_some())
            .collect()
    }

    /// Seats an occupant with a fresh board, replacing any previous one
    pub fn occupy(&mut self, slot: Slot, name: &str, occupant: Occupant) {
        let board = Board::fresh(slot, name, occupant.is_ai(), &self.grid, &mut self.oracle);
        self.slots[slot.index()] = Some(SlotState {
            name: name.to_string(),
            occupant,
            board,
        });
    }

    pub fn vacate(&mut self, slot: Slot) -> Option<SlotState> {
        self.slots[slot.index()].take()
    }

    /// Replaces every occupied slot's board with a fresh one
    pub fn reset_boards(&mut self) {
        self.tick = 0;
        for slot in Slot::BOTH {
            if let Some(state) = self.slots[slot.index()].as_mut() {
                state.board = Board::fresh(
                    slot,
                    &state.name,
                    state.occupant.is_ai(),
                    &self.grid,
                    &mut self.oracle,
                );
            }
        }
    }

    pub fn timer(&self) -> Option<TimerHandle> {
        self.timer
    }

    /// Arms a timer, superseding whichever one was active
    pub fn arm_timer(&mut self, kind: TimerKind, period: Duration) -> TimerHandle {
        self.epoch += 1;
        let handle = TimerHandle {
            epoch: self.epoch,
            kind,
            period,
        };
        self.timer = Some(handle);
        handle
    }

    pub fn cancel_timer(&mut self) {
        self.timer = None;
    }

    /// The active timer if `epoch` still refers to it
    pub fn live_timer(&self, epoch: u64) -> Option<TimerHandle> {
        self.timer.filter(|timer| timer.epoch == epoch)
    }

    /// Advances both boards by one tick
    ///
    /// AI slots pick their heading first, then each board is resolved in
    /// turn. Debuffs earned this tick are placed only after both boards
    /// have moved, One's drop before Two's. Returns None when either slot
    /// is empty.
    pub fn step(&mut self) -> Option<[TickOutcome; 2]> {
        let Match {
            grid,
            slots,
            oracle,
            tick,
            ..
        } = self;
        let grid: &Grid = grid;
        let [first, second] = slots;
        let (Some(first), Some(second)) = (first.as_mut(), second.as_mut()) else {
            return None;
        };

        for state in [&mut *first, &mut *second] {
            if let Occupant::Ai(policy) = state.occupant {
                if !state.board.terminated {
                    let direction = policy.choose_move(&state.board, grid);
                    state.board.request_direction(direction);
                }
            }
        }

        let first_outcome = resolver::tick(&mut first.board, grid, oracle);
        let second_outcome = resolver::tick(&mut second.board, grid, oracle);
        if first_outcome.debuff_for_opponent {
            resolver::drop_debuff(&mut second.board, grid, oracle);
        }
        if second_outcome.debuff_for_opponent {
            resolver::drop_debuff(&mut first.board, grid, oracle);
        }
        *tick += 1;

        Some([first_outcome, second_outcome])
    }

    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot {
            tick: self.tick,
            grid_size: self.grid.size,
            phase: self.phase.tag(),
            slots: [
                self.slots[0].as_ref().map(|state| state.board.snapshot()),
                self.slots[1].as_ref().map(|state| state.board.snapshot()),
            ],
        }
    }
}
