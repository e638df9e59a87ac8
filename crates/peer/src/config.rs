//! Session configuration.
//!
//! Defaults reproduce the timing of the reference game. A host may load
//! overrides from JSON, where every duration is written in milliseconds.

use std::time::Duration;

use lightcycle_sim::{MAX_SIDE, MIN_SIDE, PALETTE};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ============================================================================
// Defaults
// ============================================================================

/// Logical grid size; the matrix has `grid_size / 3` cells per edge.
pub const GRID_SIZE: usize = 300;

/// Logical units per matrix cell.
pub const CELL_SCALE: usize = 3;

/// Fixed tick period in milliseconds.
pub const TICK_PERIOD_MS: u64 = 100;

/// Delay from start to the first tick deadline.
pub const FIRST_TICK_DELAY_MS: u64 = 80;

/// Lead between the master's commit and the agreed start instant.
pub const START_LEAD_MS: u64 = 2000;

/// Pause after the running loop ends, before the winner exit.
pub const TERMINAL_DELAY_MS: u64 = 1000;

pub const MAX_PLAYERS: usize = PALETTE.len();

pub const MIN_PLAYERS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub grid_size: usize,
    #[serde(with = "millis")]
    pub tick_period: Duration,
    #[serde(with = "millis")]
    pub first_tick_delay: Duration,
    #[serde(with = "millis")]
    pub start_lead: Duration,
    #[serde(with = "millis")]
    pub terminal_delay: Duration,
    pub robot_change_chance: f64,
    pub max_players: usize,
    pub min_players: usize,
    /// Record every consumed turn on the master.
    pub record_replay: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grid_size: GRID_SIZE,
            tick_period: Duration::from_millis(TICK_PERIOD_MS),
            first_tick_delay: Duration::from_millis(FIRST_TICK_DELAY_MS),
            start_lead: Duration::from_millis(START_LEAD_MS),
            terminal_delay: Duration::from_millis(TERMINAL_DELAY_MS),
            robot_change_chance: lightcycle_sim::robot::DEFAULT_CHANGE_CHANCE,
            max_players: MAX_PLAYERS,
            min_players: MIN_PLAYERS,
            record_replay: true,
        }
    }
}

impl SessionConfig {
    /// Parse a JSON override document and validate the result.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Cells per grid edge.
    pub fn side(&self) -> usize {
        self.grid_size / CELL_SCALE
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_size % CELL_SCALE != 0 {
            return Err(ConfigError::GridSizeNotMultiple(self.grid_size));
        }
        let side = self.side();
        if !(MIN_SIDE..=MAX_SIDE).contains(&side) {
            return Err(ConfigError::GridSizeOutOfRange {
                grid_size: self.grid_size,
                min: MIN_SIDE * CELL_SCALE,
                max: MAX_SIDE * CELL_SCALE,
            });
        }
        if self.tick_period.is_zero() {
            return Err(ConfigError::ZeroTickPeriod);
        }
        if !(0.0..=1.0).contains(&self.robot_change_chance) {
            return Err(ConfigError::ChanceOutOfRange(self.robot_change_chance));
        }
        if self.min_players == 0
            || self.min_players > self.max_players
            || self.max_players > MAX_PLAYERS
        {
            return Err(ConfigError::PlayerLimits {
                min: self.min_players,
                max: self.max_players,
            });
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
