//! Lightcycle Simulation Core
//!
//! Deterministic, fixed-tick grid simulation shared by the master (which
//! runs it authoritatively) and the replicas (which mirror the master's
//! broadcast heads into the same structures).
//!
//! # Constraints
//!
//! The Simulation Core MUST NOT:
//! - Perform I/O operations (file, network, etc.)
//! - Read wall-clock time
//! - Use ambient/unseeded randomness (robots take an explicit `Rng`)
//!
//! Identical turn sequences therefore produce bit-identical tracks on every
//! device.

#![deny(unsafe_code)]

pub mod grid;
pub mod player;
pub mod robot;

use std::collections::{HashMap, HashSet};

use rand::Rng;

pub use grid::{Cell, CellState, Grid, MAX_SIDE, MIN_SIDE};
pub use player::{Color, Controller, Direction, InvalidTurn, PALETTE, Player, PlayerId, Turn};
pub use robot::RobotPolicy;

/// One fixed-period simulation step.
pub type Tick = u64;

// ============================================================================
// Tick Results
// ============================================================================

/// The turn a player consumed on a tick (straight when its queue was empty).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedTurn {
    pub tick: Tick,
    pub player_id: PlayerId,
    pub turn: Turn,
}

/// A player eliminated on a tick, with the cell that killed it.
#[derive(Debug, Clone, PartialEq)]
pub struct Removal {
    pub player_id: PlayerId,
    pub pos: Cell,
    pub color: Color,
}

/// Everything one authoritative step produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    /// Post-step tick.
    pub tick: Tick,
    /// Turns consumed, canonical order.
    pub applied: Vec<AppliedTurn>,
    /// Players removed this tick, canonical order.
    pub removals: Vec<Removal>,
    /// Heads of the survivors, canonical order.
    pub heads: Vec<Cell>,
}

/// Replica-side application failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error("position frame carries {got} heads for {expected} players")]
    HeadCountMismatch { expected: usize, got: usize },
    #[error("removal for unknown player {0}")]
    UnknownPlayer(PlayerId),
}

// ============================================================================
// StateDigest
// ============================================================================

/// StateDigest algorithm identifier.
pub const STATE_DIGEST_ALGO_ID: &str = "statedigest-v1-fnv1a64-le-tick-idasc-tracks";

const FNV1A_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV1A_PRIME: u64 = 0x100000001b3;

#[derive(Debug, Clone)]
struct Fnv1a64 {
    state: u64,
}

impl Fnv1a64 {
    fn new() -> Self {
        Self {
            state: FNV1A_OFFSET_BASIS,
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= u64::from(byte);
            self.state = self.state.wrapping_mul(FNV1A_PRIME);
        }
    }

    fn finish(self) -> u64 {
        self.state
    }
}

// ============================================================================
// Spawn Layout
// ============================================================================

/// Start cell and facing for canonical slot `index` of `count` players.
///
/// Slots are spread evenly around the perimeter; every player starts on the
/// wall facing inward.
pub fn spawn_point(side: usize, count: usize, index: usize) -> (Cell, Direction) {
    let count = count.max(1);
    let gap = 4 * side / count;
    let run = gap / 3 + index * gap;
    let facing = Direction::from_index(((run / side) % 4) as i32);
    let offset = (run % side) as i32;
    let max = side as i32 - 1;

    let start = match facing {
        Direction::Up => Cell::new(max - offset, max),
        Direction::Right => Cell::new(0, max - offset),
        Direction::Down => Cell::new(offset, 0),
        Direction::Left => Cell::new(max, offset),
    };
    (start, facing)
}

// ============================================================================
// World
// ============================================================================

/// Grid plus players. Owns the canonical player order once finalized.
#[derive(Debug, Clone)]
pub struct World {
    tick: Tick,
    grid: Grid,
    players: HashMap<PlayerId, Player>,
    /// Sorted ascending at finalization; positional frames follow this order.
    player_ids: Vec<PlayerId>,
    /// Fatal cells of removed players; these stay occupied for the match.
    terminals: HashSet<Cell>,
    finalized: bool,
}

impl World {
    /// Create an empty world with `side` cells per edge.
    pub fn new(side: usize) -> Self {
        Self {
            tick: 0,
            grid: Grid::new(side),
            players: HashMap::new(),
            player_ids: Vec::new(),
            terminals: HashSet::new(),
            finalized: false,
        }
    }

    /// Build and finalize in one go.
    pub fn with_players(side: usize, players: impl IntoIterator<Item = Player>) -> Self {
        let mut world = Self::new(side);
        for player in players {
            world.add_player(player);
        }
        world.finalize();
        world
    }

    /// Add a lobby player. Returns false for a duplicate id or after finalization.
    pub fn add_player(&mut self, player: Player) -> bool {
        if self.finalized || self.players.contains_key(player.id()) {
            return false;
        }
        self.players.insert(player.id().clone(), player);
        true
    }

    /// Drop a lobby player (peer left before the game started).
    pub fn remove_lobby_player(&mut self, id: &PlayerId) -> Option<Player> {
        if self.finalized {
            return None;
        }
        self.players.remove(id)
    }

    /// Freeze the canonical order and place every player on its start cell.
    pub fn finalize(&mut self) {
        let mut ids: Vec<PlayerId> = self.players.keys().cloned().collect();
        ids.sort();

        let side = self.grid.side();
        let count = ids.len();
        for (index, id) in ids.iter().enumerate() {
            let (start, facing) = spawn_point(side, count, index);
            if let Some(player) = self.players.get_mut(id) {
                player.place(start, facing);
            }
        }

        self.player_ids = ids;
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Canonical order of the living players.
    pub fn player_ids(&self) -> &[PlayerId] {
        &self.player_ids
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn player_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    /// All players; canonical order once finalized, arbitrary before.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        let ordered = self.finalized;
        let canonical = self.player_ids.iter().filter_map(|id| self.players.get(id));
        let lobby = self.players.values().filter(move |_| !ordered);
        canonical.chain(lobby)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn all_committed(&self) -> bool {
        self.players.values().all(Player::is_committed)
    }

    /// The session is over once at most one player is left.
    pub fn is_decided(&self) -> bool {
        self.finalized && self.player_ids.len() <= 1
    }

    pub fn winner(&self) -> Option<&PlayerId> {
        match self.player_ids.as_slice() {
            [only] if self.finalized => Some(only),
            _ => None,
        }
    }

    /// Queue a turn for a living player. Returns false for unknown ids.
    pub fn enqueue_turn(&mut self, id: &PlayerId, turn: Turn) -> bool {
        match self.players.get_mut(id) {
            Some(player) => {
                player.enqueue_turn(turn);
                true
            }
            None => false,
        }
    }

    /// Let every robot pick this tick's turn.
    pub fn plan_robots<R: Rng + ?Sized>(&mut self, policy: &RobotPolicy, rng: &mut R) {
        for id in &self.player_ids {
            let Some(player) = self.players.get(id) else {
                continue;
            };
            if player.controller() != Controller::Robot {
                continue;
            }
            let choice = policy.choose(&self.grid, player, rng);
            let turn = Turn::between(player.direction(), choice).unwrap_or(Turn::Straight);
            if let Some(player) = self.players.get_mut(id) {
                player.replace_turns(turn);
            }
        }
    }

    /// Whether every living track has the same length.
    pub fn tracks_aligned(&self) -> bool {
        let mut lengths = self.players.values().map(|p| p.track().len());
        match lengths.next() {
            Some(first) => lengths.all(|len| len == first),
            None => true,
        }
    }

    /// Advance one authoritative tick.
    ///
    /// 1. every living player consumes at most one queued turn and moves;
    /// 2. every head is tested against the pre-tick occupancy;
    /// 3. surviving heads are marked, colliding players are removed.
    ///
    /// # Panics
    /// If `tick != self.tick()`.
    pub fn advance(&mut self, tick: Tick) -> TickOutcome {
        assert_eq!(
            tick, self.tick,
            "advance() tick mismatch: expected {}, got {}",
            self.tick, tick
        );

        let mut applied = Vec::with_capacity(self.player_ids.len());
        for id in &self.player_ids {
            if let Some(player) = self.players.get_mut(id) {
                applied.push(AppliedTurn {
                    tick,
                    player_id: id.clone(),
                    turn: player.next_step(),
                });
            }
        }

        // Evaluate against the snapshot before marking any head.
        let mut survivors = Vec::new();
        let mut collided = Vec::new();
        for id in &self.player_ids {
            let head = self
                .players
                .get(id)
                .and_then(Player::head)
                .unwrap_or(Cell::new(-1, -1));
            if self.grid.occupied(head) {
                collided.push((id.clone(), head));
            } else {
                survivors.push(head);
            }
        }
        for head in survivors {
            self.grid.mark(head);
        }

        let removals = collided
            .into_iter()
            .filter_map(|(id, pos)| self.eliminate(&id, pos))
            .collect();

        self.tick += 1;

        TickOutcome {
            tick: self.tick,
            applied,
            removals,
            heads: self.heads(),
        }
    }

    /// Current heads in canonical order.
    pub fn heads(&self) -> Vec<Cell> {
        self.player_ids
            .iter()
            .filter_map(|id| self.players.get(id).and_then(Player::head))
            .collect()
    }

    /// Replica path: append the master's heads verbatim, one per canonical slot.
    pub fn apply_positions(&mut self, heads: &[Cell]) -> Result<(), ApplyError> {
        if heads.len() != self.player_ids.len() {
            return Err(ApplyError::HeadCountMismatch {
                expected: self.player_ids.len(),
                got: heads.len(),
            });
        }
        for (id, &head) in self.player_ids.iter().zip(heads) {
            if let Some(player) = self.players.get_mut(id) {
                player.push_head(head);
                self.grid.mark(head);
            }
        }
        self.tick += 1;
        Ok(())
    }

    /// Replica path: apply a removal broadcast by the master.
    pub fn apply_removal(&mut self, id: &PlayerId, pos: Cell) -> Result<Removal, ApplyError> {
        let player = self
            .players
            .get_mut(id)
            .ok_or_else(|| ApplyError::UnknownPlayer(id.clone()))?;
        if player.head() != Some(pos) {
            player.push_head(pos);
        }
        self.eliminate(id, pos)
            .ok_or_else(|| ApplyError::UnknownPlayer(id.clone()))
    }

    /// Delete a player and clear its own trail.
    ///
    /// A cell stays occupied while it is a wall, lies on a living player's
    /// track, or is the fatal cell of any removed player.
    fn eliminate(&mut self, id: &PlayerId, pos: Cell) -> Option<Removal> {
        let player = self.players.remove(id)?;
        self.player_ids.retain(|other| other != id);
        self.terminals.insert(pos);

        let living: HashSet<Cell> = self
            .players
            .values()
            .flat_map(|p| p.track().iter().copied())
            .collect();
        for &cell in player.track() {
            if !living.contains(&cell) && !self.terminals.contains(&cell) {
                self.grid.clear(cell);
            }
        }
        self.grid.mark(pos);

        Some(Removal {
            player_id: id.clone(),
            pos,
            color: player.color(),
        })
    }

    /// FNV-1a 64 over the tick and every living track in canonical order.
    pub fn state_digest(&self) -> u64 {
        let mut hasher = Fnv1a64::new();
        hasher.update(&self.tick.to_le_bytes());

        for id in &self.player_ids {
            let Some(player) = self.players.get(id) else {
                continue;
            };
            hasher.update(id.as_str().as_bytes());
            hasher.update(&(player.track().len() as u64).to_le_bytes());
            for cell in player.track() {
                hasher.update(&cell.x.to_le_bytes());
                hasher.update(&cell.y.to_le_bytes());
            }
        }

        hasher.finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
