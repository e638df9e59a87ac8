use lightcycle_sim::PlayerId;
use lightcycle_wire::WireError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("grid size {0} is not a multiple of 3")]
    GridSizeNotMultiple(usize),
    #[error("grid size {grid_size} outside {min}..={max}")]
    GridSizeOutOfRange {
        grid_size: usize,
        min: usize,
        max: usize,
    },
    #[error("tick period must be non-zero")]
    ZeroTickPeriod,
    #[error("robot change chance {0} is not a probability")]
    ChanceOutOfRange(f64),
    #[error("invalid player limits: min {min}, max {max}")]
    PlayerLimits { min: usize, max: usize },
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("session handle closed")]
    Closed,
    #[error("no connection to peer {0}")]
    UnknownPeer(PlayerId),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("player id {0} is not a 36-byte identifier")]
    InvalidPlayerId(PlayerId),
    #[error("robots can only join an offline lobby")]
    RobotsInNetworkSession,
    #[error("too many players: limit is {0}")]
    TooManyPlayers(usize),
    #[error("all transport events ended before the session finished")]
    Disconnected,
}
