//! Single-board movement and collision resolution
//!
//! Each tick the lifecycle controller calls [`tick`] once per live board.
//! The two calls of a tick are resolved before any match-level decision is
//! taken, so a tick where both boards die is a draw regardless of order.
//! Debuffs earned during a tick are only reported; [`drop_debuff`] places
//! them once both boards have moved.

use crate::board::Board;
use crate::oracle::PositionOracle;
use log::debug;
use shared::{
    Coord, EndReason, Grid, DEBUFF_PENALTY, DEBUFF_SHRINK_AMOUNT, DEBUFF_TRIGGER_COUNT, FOOD_SCORE,
    MIN_SNAKE_LENGTH,
};

/// Why a board stopped advancing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collision {
    Wall,
    SelfHit,
    /// Snake shrank to nothing
    Emptied,
}

impl From<Collision> for EndReason {
    fn from(collision: Collision) -> Self {
        match collision {
            Collision::Wall => EndReason::WallCollision,
            Collision::SelfHit => EndReason::SelfCollision,
            Collision::Emptied => EndReason::Collision,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub terminated: bool,
    pub cause: Option<Collision>,
    pub ate_food: bool,
    pub ate_debuff: bool,
    /// Third food since the last trigger: the opponent is owed a debuff
    pub debuff_for_opponent: bool,
}

impl TickOutcome {
    fn terminated_by(cause: Collision) -> Self {
        Self {
            terminated: true,
            cause: Some(cause),
            ..Self::default()
        }
    }
}

/// Advances `board` by one cell
///
/// The new head is checked against every current segment, tail included:
/// moving into the cell the tail is about to vacate is a self-collision.
/// Eating the third food since the last trigger sets
/// [`TickOutcome::debuff_for_opponent`].
pub fn tick(board: &mut Board, grid: &Grid, oracle: &mut PositionOracle) -> TickOutcome {
    if board.terminated {
        return TickOutcome {
            terminated: true,
            ..TickOutcome::default()
        };
    }

    board.apply_pending_direction();

    let Some(head) = board.head() else {
        board.terminated = true;
        return TickOutcome::terminated_by(Collision::Emptied);
    };
    let next_head = grid.step(head, board.direction);

    if !grid.contains(next_head) {
        board.terminated = true;
        debug!("{} hit the wall at {:?}", board.owner_name, next_head);
        return TickOutcome::terminated_by(Collision::Wall);
    }

    if board.snake.contains(&next_head) {
        board.terminated = true;
        debug!("{} ran into itself at {:?}", board.owner_name, next_head);
        return TickOutcome::terminated_by(Collision::SelfHit);
    }

    let mut outcome = TickOutcome::default();

    if next_head == board.food {
        outcome.ate_food = true;
        board.score += FOOD_SCORE;
        board.food_eaten_counter += 1;
        board.food = oracle.sample(grid, &board.occupied_cells());

        if board.food_eaten_counter >= DEBUFF_TRIGGER_COUNT {
            board.food_eaten_counter = 0;
            outcome.debuff_for_opponent = true;
        }
    }

    let mut shrunk = false;
    if let Some(index) = board.debuffs.iter().position(|cell| *cell == next_head) {
        board.debuffs.remove(index);
        outcome.ate_debuff = true;
        board.score = board.score.saturating_sub(DEBUFF_PENALTY);

        let removable = board.len().saturating_sub(MIN_SNAKE_LENGTH);
        let shrink = DEBUFF_SHRINK_AMOUNT.min(removable);
        board.snake.truncate(board.len() - shrink);
        shrunk = shrink > 0;
    }

    board.snake.push_front(next_head);
    if !outcome.ate_food && !shrunk && board.len() > MIN_SNAKE_LENGTH {
        board.snake.pop_back();
    }

    if board.is_empty() {
        board.terminated = true;
        return TickOutcome::terminated_by(Collision::Emptied);
    }

    outcome
}

/// Places a debuff earned by the other board onto `target`
///
/// Called after both boards of the tick have moved, so the cell is sampled
/// against the target's current layout. Terminated boards get nothing.
pub fn drop_debuff(target: &mut Board, grid: &Grid, oracle: &mut PositionOracle) -> Option<Coord> {
    if target.terminated {
        return None;
    }

    let cell = oracle.sample(grid, &target.occupied_cells());
    target.debuffs.push(cell);
    debug!("Debuff dropped on {} at {:?}", target.owner_name, cell);
    Some(cell)
}
