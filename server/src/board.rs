//! Per-slot simulation state

use crate::oracle::PositionOracle;
use shared::{BoardSnapshot, Coord, Direction, Grid, Slot, MIN_SNAKE_LENGTH};
use std::collections::{HashSet, VecDeque};

/// One player's snake and the pickups on their grid
///
/// Boards are never reset in place: a new round builds a fresh one with
/// [`Board::fresh`]. The snake head is at the front of the deque.
#[derive(Debug, Clone)]
pub struct Board {
    pub snake: VecDeque<Coord>,
    pub direction: Direction,
    /// Heading requested since the last tick, applied when the next tick starts
    pub pending_direction: Option<Direction>,
    pub score: u32,
    pub food: Coord,
    pub debuffs: Vec<Coord>,
    pub food_eaten_counter: u32,
    pub terminated: bool,
    pub owner_name: String,
    pub color: String,
    pub is_ai: bool,
}

impl Board {
    /// Builds a round-start board: a minimum-length snake near the left
    /// middle of the grid heading right, with food placed off the snake.
    pub fn fresh(
        slot: Slot,
        owner_name: &str,
        is_ai: bool,
        grid: &Grid,
        oracle: &mut PositionOracle,
    ) -> Self {
        let head = Coord::new((grid.size / 4).max(MIN_SNAKE_LENGTH as i32 - 1), grid.size / 2);
        let snake: VecDeque<Coord> = (0..MIN_SNAKE_LENGTH as i32)
            .map(|offset| Coord::new(head.x - offset, head.y))
            .collect();

        let mut board = Self::with_snake(snake, Direction::Right, Coord::default());
        board.owner_name = owner_name.to_string();
        board.color = slot.color().to_string();
        board.is_ai = is_ai;
        board.food = oracle.sample(grid, &board.occupied_cells());
        board
    }

    /// Board with an explicit layout; used for scripted setups
    pub fn with_snake(
        snake: impl IntoIterator<Item = Coord>,
        direction: Direction,
        food: Coord,
    ) -> Self {
        Self {
            snake: snake.into_iter().collect(),
            direction,
            pending_direction: None,
            score: 0,
            food,
            debuffs: Vec::new(),
            food_eaten_counter: 0,
            terminated: false,
            owner_name: String::new(),
            color: String::new(),
            is_ai: false,
        }
    }

    pub fn head(&self) -> Option<Coord> {
        self.snake.front().copied()
    }

    pub fn len(&self) -> usize {
        self.snake.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snake.is_empty()
    }

    /// Records a heading change for the next tick
    ///
    /// Requests that reverse the current heading are dropped, as are any
    /// for a terminated board. Returns whether the request was accepted.
    pub fn request_direction(&mut self, direction: Direction) -> bool {
        if self.terminated || self.direction.is_opposite(direction) {
            return false;
        }
        self.pending_direction = Some(direction);
        true
    }

    /// Promotes the pending heading, if any, to the current one
    pub fn apply_pending_direction(&mut self) {
        if let Some(direction) = self.pending_direction.take() {
            self.direction = direction;
        }
    }

    /// Snake, food and debuff cells: everything a new spawn must avoid
    pub fn occupied_cells(&self) -> HashSet<Coord> {
        let mut cells: HashSet<Coord> = self.snake.iter().copied().collect();
        cells.insert(self.food);
        cells.extend(self.debuffs.iter().copied());
        cells
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            snake: self.snake.iter().copied().collect(),
            direction: self.direction,
            score: self.score,
            food: self.food,
            debuffs: self.debuffs.clone(),
            terminated: self.terminated,
            owner_name: self.owner_name.clone(),
            color: self.color.clone(),
            is_ai: self.is_ai,
        }
    }
}
