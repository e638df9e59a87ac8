//! Random-walk robot opponent.
//!
//! Each tick a robot keeps going straight unless its way is blocked or a
//! small random chance fires, in which case it picks uniformly among the
//! currently open neighbouring directions.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::grid::Grid;
use crate::player::{Direction, Player};

/// Default probability of a spontaneous direction change per tick.
pub const DEFAULT_CHANGE_CHANCE: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotPolicy {
    pub change_chance: f64,
}

impl Default for RobotPolicy {
    fn default() -> Self {
        Self {
            change_chance: DEFAULT_CHANGE_CHANCE,
        }
    }
}

impl RobotPolicy {
    /// Pick the robot's next facing.
    pub fn choose<R: Rng + ?Sized>(&self, grid: &Grid, player: &Player, rng: &mut R) -> Direction {
        let current = player.direction();
        let open = open_directions(grid, player);

        if !open.contains(&current) || rng.gen_bool(self.change_chance.clamp(0.0, 1.0)) {
            if let Some(&choice) = open.choose(rng) {
                return choice;
            }
        }
        current
    }
}

/// Directions whose neighbouring cell is free.
pub fn open_directions(grid: &Grid, player: &Player) -> Vec<Direction> {
    let Some(head) = player.head() else {
        return Vec::new();
    };
    Direction::ALL
        .into_iter()
        .filter(|&d| !grid.occupied(head.step(d)))
        .collect()
}
