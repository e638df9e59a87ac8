//! Lightcycle Wire Protocol
//!
//! Everything that crosses the Transport between devices, plus the replay
//! schema. Every participant MUST link this crate so the byte layouts stay
//! identical on all devices.
//!
//! # Channels
//!
//! - **Control** (reliable + ordered): JSON `commit` / `sync` messages and the
//!   discovery payload ([`control`]).
//! - **Turn-forward** (best-effort stream, replica → master): 2-byte ASCII
//!   turn deltas ([`frame`]).
//! - **State replication** (best-effort stream, master → replicas): untagged
//!   position frames and tagged removal frames ([`frame`]).
//!
//! Replay artifacts are Protobuf (prost) and never travel between peers.

#![deny(unsafe_code)]

pub mod control;
pub mod frame;

use prost::Message;

pub use control::{ControlDecode, ControlMessage, PeerInfo};
pub use frame::{
    FrameDecoder, ID_LEN, REMOVAL_FRAME_LEN, REMOVAL_TAG, ReplicationFrame, TURN_FRAME_LEN,
    TurnDecoder, decode_turn, encode_positions, encode_removal, encode_turn,
};

pub use lightcycle_sim::Tick;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("turn frame {0:?} is not a sign followed by a digit")]
    MalformedTurn([u8; 2]),
    #[error("player id must be 36 bytes on the wire, got {0}")]
    IdLength(usize),
    #[error("removal frame id is not valid UTF-8")]
    InvalidId,
    #[error("coordinate ({x}, {y}) does not fit in a byte")]
    CoordinateOutOfRange { x: i32, y: i32 },
    #[error("position frame would begin with the removal tag")]
    AmbiguousPosition,
    #[error("position frame received with no living players")]
    NoPlayers,
    #[error("control message has no action")]
    MissingAction,
    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Replay Artifact Types
// ============================================================================

/// One turn consumed by one player on one tick.
#[derive(Clone, PartialEq, Message)]
pub struct AppliedTurnProto {
    #[prost(uint64, tag = "1")]
    pub tick: Tick,

    #[prost(string, tag = "2")]
    pub player_id: String,

    /// -1, 0 or +1.
    #[prost(sint32, tag = "3")]
    pub delta: i32,
}

/// Canonical slot of a participant at match start.
#[derive(Clone, PartialEq, Message)]
pub struct ParticipantProto {
    #[prost(string, tag = "1")]
    pub player_id: String,

    /// True when the master planned this player's turns.
    #[prost(bool, tag = "2")]
    pub robot: bool,
}

/// Tuning parameter key-value pair.
#[derive(Clone, PartialEq, Message)]
pub struct TuningParameter {
    #[prost(string, tag = "1")]
    pub key: String,

    #[prost(double, tag = "2")]
    pub value: f64,
}

/// Build fingerprint for replay scope verification.
#[derive(Clone, PartialEq, Message)]
pub struct BuildFingerprint {
    /// SHA-256 of the executable bytes.
    #[prost(string, tag = "1")]
    pub binary_sha256: String,

    #[prost(string, tag = "2")]
    pub target_triple: String,

    /// "release" or "dev".
    #[prost(string, tag = "3")]
    pub profile: String,

    #[prost(string, tag = "4")]
    pub git_commit: String,
}

/// Complete record of a finished match, produced by the master.
#[derive(Clone, PartialEq, Message)]
pub struct ReplayArtifact {
    /// Schema version, starts at 1.
    #[prost(uint32, tag = "1")]
    pub replay_format_version: u32,

    /// Cells per grid edge.
    #[prost(uint32, tag = "2")]
    pub grid_side: u32,

    /// Participants in canonical (ascending id) order.
    #[prost(message, repeated, tag = "3")]
    pub participants: Vec<ParticipantProto>,

    #[prost(string, tag = "4")]
    pub state_digest_algo_id: String,

    /// Sorted by key.
    #[prost(message, repeated, tag = "5")]
    pub tuning_parameters: Vec<TuningParameter>,

    /// Every consumed turn, tick-major then canonical order.
    #[prost(message, repeated, tag = "6")]
    pub turns: Vec<AppliedTurnProto>,

    #[prost(message, optional, tag = "7")]
    pub build_fingerprint: Option<BuildFingerprint>,

    /// StateDigest at `checkpoint_tick`.
    #[prost(uint64, tag = "8")]
    pub final_digest: u64,

    /// Post-step tick of the last simulated step.
    #[prost(uint64, tag = "9")]
    pub checkpoint_tick: Tick,

    #[prost(string, tag = "10")]
    pub end_reason: String,

    /// Empty when no player survived.
    #[prost(string, tag = "11")]
    pub winner: String,
}

impl ReplayArtifact {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, prost::DecodeError> {
        Self::decode(bytes)
    }
}

impl From<&lightcycle_sim::AppliedTurn> for AppliedTurnProto {
    fn from(applied: &lightcycle_sim::AppliedTurn) -> Self {
        Self {
            tick: applied.tick,
            player_id: applied.player_id.as_str().to_string(),
            delta: i32::from(applied.turn.delta()),
        }
    }
}

impl TryFrom<&AppliedTurnProto> for lightcycle_sim::AppliedTurn {
    type Error = lightcycle_sim::InvalidTurn;

    fn try_from(proto: &AppliedTurnProto) -> Result<Self, Self::Error> {
        let delta = i8::try_from(proto.delta).unwrap_or(i8::MAX);
        Ok(Self {
            tick: proto.tick,
            player_id: lightcycle_sim::PlayerId::from(proto.player_id.as_str()),
            turn: lightcycle_sim::Turn::try_from(delta)?,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
