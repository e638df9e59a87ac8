//! Player / Agent model and the turn algebra.

use std::collections::VecDeque;
use std::fmt;

use crate::grid::Cell;

/// Opaque, session-stable participant identifier.
///
/// Networked players use a hyphenated UUID (36 bytes); the identifier is
/// only ever compared and sorted, never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PlayerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// RGB color, components in `0.0..=1.0`.
pub type Color = [f32; 3];

/// The eight selectable player colors.
pub const PALETTE: [Color; 8] = [
    [1.0, 0.42, 0.19],
    [1.0, 0.65, 0.0],
    [1.0, 1.0, 0.0],
    [0.56, 0.93, 0.56],
    [0.0, 1.0, 1.0],
    [0.0, 0.57, 1.0],
    [0.68, 0.26, 1.0],
    [0.93, 0.51, 0.93],
];

/// Facing direction. Discriminants match the wire/table index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up = 0,
    Right = 1,
    Down = 2,
    Left = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Self::Up, Self::Right, Self::Down, Self::Left];

    /// Direction for any table index, wrapping modulo 4.
    pub fn from_index(index: i32) -> Self {
        Self::ALL[index.rem_euclid(4) as usize]
    }

    pub fn index(self) -> i32 {
        self as i32
    }

    /// Unit vector, screen coordinates (y grows downward).
    pub fn unit(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Right => (1, 0),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
        }
    }

    /// Apply a turn delta: 4 wraps to 0 and -1 wraps to 3.
    pub fn turned(self, turn: Turn) -> Self {
        Self::from_index(self.index() + i32::from(turn.delta()))
    }
}

/// A relative direction change consumed once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Turn {
    Left,
    Straight,
    Right,
}

/// A delta outside `{-1, 0, +1}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("turn delta must be -1, 0 or +1, got {0}")]
pub struct InvalidTurn(pub i8);

impl Turn {
    pub fn delta(self) -> i8 {
        match self {
            Self::Left => -1,
            Self::Straight => 0,
            Self::Right => 1,
        }
    }

    /// The turn that rotates `from` into `to`, if they are not opposite.
    pub fn between(from: Direction, to: Direction) -> Option<Self> {
        match (to.index() - from.index()).rem_euclid(4) {
            0 => Some(Self::Straight),
            1 => Some(Self::Right),
            3 => Some(Self::Left),
            _ => None,
        }
    }
}

impl TryFrom<i8> for Turn {
    type Error = InvalidTurn;

    fn try_from(delta: i8) -> Result<Self, Self::Error> {
        match delta {
            -1 => Ok(Self::Left),
            0 => Ok(Self::Straight),
            1 => Ok(Self::Right),
            other => Err(InvalidTurn(other)),
        }
    }
}

/// Who decides this player's turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Controller {
    /// A person, local or remote; turns arrive through Turn Intake.
    Human,
    /// Local random-walk opponent planned by the master.
    Robot,
}

/// A participant and its trail.
#[derive(Debug, Clone)]
pub struct Player {
    id: PlayerId,
    color: Color,
    controller: Controller,
    direction: Direction,
    /// Oldest first; append-only while alive.
    track: Vec<Cell>,
    committed: bool,
    turn_queue: VecDeque<Turn>,
}

impl Player {
    pub fn new(id: impl Into<PlayerId>, color: Color) -> Self {
        Self {
            id: id.into(),
            color,
            controller: Controller::Human,
            direction: Direction::Up,
            track: Vec::new(),
            committed: false,
            turn_queue: VecDeque::new(),
        }
    }

    pub fn robot(id: impl Into<PlayerId>, color: Color) -> Self {
        Self {
            controller: Controller::Robot,
            ..Self::new(id, color)
        }
    }

    pub fn id(&self) -> &PlayerId {
        &self.id
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn controller(&self) -> Controller {
        self.controller
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn track(&self) -> &[Cell] {
        &self.track
    }

    pub fn head(&self) -> Option<Cell> {
        self.track.last().copied()
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn commit(&mut self) {
        self.committed = true;
    }

    /// Put the player on its start cell, facing `facing`.
    pub fn place(&mut self, start: Cell, facing: Direction) {
        self.track.clear();
        self.track.push(start);
        self.direction = facing;
    }

    /// Append `head + unit(direction)` and face `direction`.
    pub fn move_in(&mut self, direction: Direction) {
        debug_assert!(!self.track.is_empty(), "move_in before place");
        if let Some(head) = self.head() {
            self.track.push(head.step(direction));
        }
        self.direction = direction;
    }

    /// Consume at most one queued turn and advance one cell.
    /// Returns the turn that was applied (straight when the queue was empty).
    pub fn next_step(&mut self) -> Turn {
        let turn = self.turn_queue.pop_front().unwrap_or(Turn::Straight);
        self.move_in(self.direction.turned(turn));
        turn
    }

    pub fn enqueue_turn(&mut self, turn: Turn) {
        self.turn_queue.push_back(turn);
    }

    pub fn pending_turns(&self) -> usize {
        self.turn_queue.len()
    }

    pub(crate) fn replace_turns(&mut self, turn: Turn) {
        self.turn_queue.clear();
        self.turn_queue.push_back(turn);
    }

    /// Append a head received from the authority verbatim.
    /// The facing is inferred when the step is a unit move.
    pub fn push_head(&mut self, cell: Cell) {
        if let Some(head) = self.head()
            && let Some(direction) = Direction::ALL
                .into_iter()
                .find(|&d| head.step(d) == cell)
        {
            self.direction = direction;
        }
        self.track.push(cell);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placed(direction: Direction) -> Player {
        let mut player = Player::new("A", PALETTE[0]);
        player.place(Cell::new(4, 4), direction);
        player
    }

    #[test]
    fn test_turn_wraps_modulo_four() {
        assert_eq!(Direction::Left.turned(Turn::Right), Direction::Up);
        assert_eq!(Direction::Up.turned(Turn::Left), Direction::Left);
        assert_eq!(Direction::Right.turned(Turn::Straight), Direction::Right);
        assert_eq!(Direction::Down.turned(Turn::Right), Direction::Left);
    }

    #[test]
    fn test_turn_try_from_delta() {
        assert_eq!(Turn::try_from(-1), Ok(Turn::Left));
        assert_eq!(Turn::try_from(0), Ok(Turn::Straight));
        assert_eq!(Turn::try_from(1), Ok(Turn::Right));
        assert_eq!(Turn::try_from(2), Err(InvalidTurn(2)));
    }

    #[test]
    fn test_turn_between() {
        assert_eq!(Turn::between(Direction::Up, Direction::Up), Some(Turn::Straight));
        assert_eq!(Turn::between(Direction::Up, Direction::Right), Some(Turn::Right));
        assert_eq!(Turn::between(Direction::Up, Direction::Left), Some(Turn::Left));
        assert_eq!(Turn::between(Direction::Up, Direction::Down), None);
    }

    #[test]
    fn test_next_step_without_turn_keeps_direction() {
        let mut player = placed(Direction::Right);
        assert_eq!(player.next_step(), Turn::Straight);
        assert_eq!(player.direction(), Direction::Right);
        assert_eq!(player.track(), &[Cell::new(4, 4), Cell::new(5, 4)]);
    }

    #[test]
    fn test_next_step_consumes_one_turn_in_order() {
        let mut player = placed(Direction::Up);
        player.enqueue_turn(Turn::Left);
        player.enqueue_turn(Turn::Left);

        assert_eq!(player.next_step(), Turn::Left);
        assert_eq!(player.direction(), Direction::Left);
        assert_eq!(player.pending_turns(), 1);

        assert_eq!(player.next_step(), Turn::Left);
        assert_eq!(player.direction(), Direction::Down);
        assert_eq!(player.head(), Some(Cell::new(3, 5)));
        assert_eq!(player.pending_turns(), 0);
    }

    #[test]
    fn test_push_head_infers_direction() {
        let mut player = placed(Direction::Up);
        player.push_head(Cell::new(5, 4));
        assert_eq!(player.direction(), Direction::Right);
        assert_eq!(player.track().len(), 2);
    }
}
