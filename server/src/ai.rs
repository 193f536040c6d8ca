//! Scripted opponent steering
//!
//! The policy only looks at its own board. It keeps moves that survive the
//! next tick, prefers moves that also leave a survivable follow-up, and
//! among those heads for the food.

use crate::board::Board;
use shared::{Coord, Direction, Grid};
use std::collections::VecDeque;

/// Stateless food-seeking policy for an AI-controlled slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AiPolicy;

impl AiPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Picks the heading for the next tick
    ///
    /// Never returns the reverse of the current heading. When every turn is
    /// fatal the current heading is kept.
    pub fn choose_move(&self, board: &Board, grid: &Grid) -> Direction {
        let Some(head) = board.head() else {
            return board.direction;
        };

        let safe: Vec<(Direction, Coord)> = Direction::ALL
            .iter()
            .copied()
            .filter(|direction| !direction.is_opposite(board.direction))
            .map(|direction| (direction, grid.step(head, direction)))
            .filter(|(_, cell)| is_safe(grid, &board.snake, *cell))
            .collect();

        if safe.is_empty() {
            return board.direction;
        }

        let untrapped: Vec<(Direction, Coord)> = safe
            .iter()
            .copied()
            .filter(|(direction, cell)| has_follow_up(board, grid, *direction, *cell))
            .collect();

        let candidates = if untrapped.is_empty() { safe } else { untrapped };

        let mut best = candidates[0];
        let mut best_distance = best.1.manhattan(&board.food);
        for &(direction, cell) in &candidates[1..] {
            let distance = cell.manhattan(&board.food);
            if distance < best_distance
                || (distance == best_distance && direction == board.direction)
            {
                best = (direction, cell);
                best_distance = distance;
            }
        }

        best.0
    }
}

/// In bounds and off every current segment, tail included
fn is_safe(grid: &Grid, snake: &VecDeque<Coord>, cell: Coord) -> bool {
    grid.contains(cell) && !snake.contains(&cell)
}

/// Whether some second move exists after moving to `cell`
fn has_follow_up(board: &Board, grid: &Grid, direction: Direction, cell: Coord) -> bool {
    let mut moved = board.snake.clone();
    moved.push_front(cell);
    if cell != board.food {
        moved.pop_back();
    }

    Direction::ALL
        .iter()
        .copied()
        .filter(|next| !next.is_opposite(direction))
        .any(|next| is_safe(grid, &moved, grid.step(cell, next)))
}
