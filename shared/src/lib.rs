use serde::{Deserialize, Serialize};

pub const GRID_SIZE: i32 = 20;
pub const TICK_RATE_MS: u64 = 150;
pub const COUNTDOWN_FROM: u8 = 3;
pub const COUNTDOWN_INTERVAL_MS: u64 = 1000;
pub const MIN_SNAKE_LENGTH: usize = 2;
pub const DEBUFF_TRIGGER_COUNT: u32 = 3;
pub const DEBUFF_SHRINK_AMOUNT: usize = 2;
pub const FOOD_SCORE: u32 = 10;
pub const DEBUFF_PENALTY: u32 = 5;
/// Receive buffer size for clients; a full-grid snapshot of both boards fits
pub const MAX_DATAGRAM_SIZE: usize = 65_536;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan(&self, other: &Coord) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Enumeration order used wherever candidates are scanned
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    pub fn is_opposite(self, other: Direction) -> bool {
        self.opposite() == other
    }

    /// Screen coordinates: y grows downwards
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

/// Square playing field shared by both boards
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub size: i32,
}

impl Grid {
    pub fn new(size: i32) -> Self {
        Self { size }
    }

    pub fn contains(&self, cell: Coord) -> bool {
        (0..self.size).contains(&cell.x) && (0..self.size).contains(&cell.y)
    }

    pub fn area(&self) -> usize {
        (self.size.max(0) as usize).pow(2)
    }

    /// Neighbour of `cell` in `direction`; may lie outside the grid
    pub fn step(&self, cell: Coord, direction: Direction) -> Coord {
        let (dx, dy) = direction.delta();
        Coord::new(cell.x + dx, cell.y + dy)
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::new(GRID_SIZE)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    One,
    Two,
}

impl Slot {
    pub const BOTH: [Slot; 2] = [Slot::One, Slot::Two];

    pub fn number(self) -> u8 {
        match self {
            Slot::One => 1,
            Slot::Two => 2,
        }
    }

    pub fn from_number(number: u8) -> Option<Slot> {
        match number {
            1 => Some(Slot::One),
            2 => Some(Slot::Two),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        self.number() as usize - 1
    }

    pub fn opponent(self) -> Slot {
        match self {
            Slot::One => Slot::Two,
            Slot::Two => Slot::One,
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Slot::One => "green",
            Slot::Two => "blue",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    CountingDown,
    Running,
    Over,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum CountdownValue {
    Number(u8),
    Go,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Collision,
    WallCollision,
    SelfCollision,
    OpponentLeft,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult {
    /// `None` is a draw
    pub winner: Option<Slot>,
    pub reason: EndReason,
}

impl MatchResult {
    pub fn draw() -> Self {
        Self {
            winner: None,
            reason: EndReason::Collision,
        }
    }

    /// 1 or 2 for a winner, 0 for a draw
    pub fn winner_slot(&self) -> u8 {
        self.winner.map(Slot::number).unwrap_or(0)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BoardSnapshot {
    pub snake: Vec<Coord>,
    pub direction: Direction,
    pub score: u32,
    pub food: Coord,
    pub debuffs: Vec<Coord>,
    pub terminated: bool,
    pub owner_name: String,
    pub color: String,
    pub is_ai: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MatchSnapshot {
    pub tick: u32,
    pub grid_size: i32,
    pub phase: Phase,
    pub slots: [Option<BoardSnapshot>; 2],
}

impl MatchSnapshot {
    pub fn board(&self, slot: Slot) -> Option<&BoardSnapshot> {
        self.slots[slot.index()].as_ref()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Join {
        name: String,
    },
    RequestAiMatch {
        name: String,
    },
    ChangeDirection {
        direction: Direction,
    },
    RequestRestart,
    Heartbeat,
    Disconnect,

    Joined {
        slot: Slot,
    },
    Rejected {
        reason: String,
    },
    MatchState(MatchSnapshot),
    /// `None` clears the countdown display
    CountdownTick {
        value: Option<CountdownValue>,
    },
    MatchOver(MatchResult),
    WaitingForOpponent,
    RestartAcknowledged,
    OpponentRequestedRestart,
    BothReadyForRestart,
}
