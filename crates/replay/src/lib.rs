//! Lightcycle Replay System
//!
//! The master records every turn it consumes; a finished match becomes a
//! [`ReplayArtifact`] that can be re-simulated from scratch to prove the
//! outcome is reproducible.
//!
//! # Architecture
//!
//! - `ReplayRecorder`: collects participants and applied turns during a match
//! - `verify_replay`: re-runs the recorded turns and checks the final digest
//! - Build fingerprint acquisition for same-build verification scope

#![deny(unsafe_code)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use lightcycle_sim::{
    AppliedTurn, MAX_SIDE, MIN_SIDE, PALETTE, Player, PlayerId, STATE_DIGEST_ALGO_ID, Tick, World,
};
use lightcycle_wire::{
    AppliedTurnProto, BuildFingerprint, ParticipantProto, ReplayArtifact, TuningParameter,
};
use prost::Message;
use sha2::{Digest, Sha256};

/// Current artifact schema version.
pub const REPLAY_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Replay Recorder
// ============================================================================

/// Configuration for replay recording.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub grid_side: usize,
    pub robot_change_chance: f64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            grid_side: 100,
            robot_change_chance: lightcycle_sim::robot::DEFAULT_CHANGE_CHANCE,
        }
    }
}

/// Build fingerprint data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFingerprintData {
    pub binary_sha256: String,
    pub target_triple: String,
    pub profile: String,
    pub git_commit: String,
}

/// Records match data for replay artifact generation.
pub struct ReplayRecorder {
    config: ReplayConfig,
    participants: Vec<(PlayerId, bool)>,
    turns: Vec<AppliedTurn>,
    build_fingerprint: Option<BuildFingerprintData>,
}

impl ReplayRecorder {
    pub fn new(config: ReplayConfig) -> Self {
        Self {
            config,
            participants: Vec::new(),
            turns: Vec::new(),
            build_fingerprint: None,
        }
    }

    /// Record the canonical participant list once the order is frozen.
    pub fn record_participants<'a>(&mut self, players: impl IntoIterator<Item = &'a Player>) {
        self.participants = players
            .into_iter()
            .map(|p| {
                (
                    p.id().clone(),
                    p.controller() == lightcycle_sim::Controller::Robot,
                )
            })
            .collect();
    }

    /// Record the turns consumed on one tick.
    pub fn record_turns(&mut self, applied: &[AppliedTurn]) {
        self.turns.extend_from_slice(applied);
    }

    pub fn set_build_fingerprint(&mut self, fingerprint: BuildFingerprintData) {
        self.build_fingerprint = Some(fingerprint);
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// Finalize the replay artifact.
    pub fn finalize(
        self,
        final_digest: u64,
        checkpoint_tick: Tick,
        end_reason: &str,
        winner: Option<&PlayerId>,
    ) -> ReplayArtifact {
        let participants = self
            .participants
            .iter()
            .map(|(id, robot)| ParticipantProto {
                player_id: id.as_str().to_string(),
                robot: *robot,
            })
            .collect();

        let tuning_parameters = vec![TuningParameter {
            key: "robot_change_chance".to_string(),
            value: self.config.robot_change_chance,
        }];

        let build_fingerprint = self.build_fingerprint.map(|f| BuildFingerprint {
            binary_sha256: f.binary_sha256,
            target_triple: f.target_triple,
            profile: f.profile,
            git_commit: f.git_commit,
        });

        ReplayArtifact {
            replay_format_version: REPLAY_FORMAT_VERSION,
            grid_side: self.config.grid_side as u32,
            participants,
            state_digest_algo_id: STATE_DIGEST_ALGO_ID.to_string(),
            tuning_parameters,
            turns: self.turns.iter().map(AppliedTurnProto::from).collect(),
            build_fingerprint,
            final_digest,
            checkpoint_tick,
            end_reason: end_reason.to_string(),
            winner: winner.map(|w| w.as_str().to_string()).unwrap_or_default(),
        }
    }
}

// ============================================================================
// Replay Verification
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VerifyError {
    #[error("build fingerprint mismatch: expected {expected}, got {actual}")]
    BuildMismatch { expected: String, actual: String },
    #[error("unsupported replay format version {0}")]
    UnsupportedVersion(u32),
    #[error("turn stream invalid: {reason}")]
    TurnStreamInvalid { reason: String },
    #[error("final digest mismatch: expected {expected:#x}, got {actual:#x}")]
    FinalDigestMismatch { expected: u64, actual: u64 },
    #[error("winner mismatch: expected {expected:?}, got {actual:?}")]
    WinnerMismatch { expected: String, actual: String },
    #[error("invalid replay format: {reason}")]
    InvalidFormat { reason: String },
}

/// Options for replay verification.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// - true: fail on build mismatch (CI)
    /// - false: ignore it (dev)
    pub strict_build_check: bool,
    pub current_build: Option<BuildFingerprintData>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            strict_build_check: true,
            current_build: None,
        }
    }
}

/// Verify a replay artifact produces the recorded outcome.
///
/// 1. Check the build fingerprint (strict mode only)
/// 2. Validate the turn stream (range, known players, no duplicates)
/// 3. Rebuild the world from the canonical participant list
/// 4. Re-apply each tick's turns; every living player must have exactly one
/// 5. Compare final digest and winner
pub fn verify_replay(
    artifact: &ReplayArtifact,
    options: &VerifyOptions,
) -> Result<(), VerifyError> {
    if let (Some(recorded), Some(current)) = (&artifact.build_fingerprint, &options.current_build)
    {
        let mismatch = recorded.binary_sha256 != current.binary_sha256
            || recorded.target_triple != current.target_triple
            || recorded.profile != current.profile;
        if mismatch && options.strict_build_check {
            return Err(VerifyError::BuildMismatch {
                expected: recorded.binary_sha256.clone(),
                actual: current.binary_sha256.clone(),
            });
        }
    }

    if artifact.replay_format_version != REPLAY_FORMAT_VERSION {
        return Err(VerifyError::UnsupportedVersion(
            artifact.replay_format_version,
        ));
    }

    let side = artifact.grid_side as usize;
    if !(MIN_SIDE..=MAX_SIDE).contains(&side) {
        return Err(VerifyError::InvalidFormat {
            reason: format!("grid side {side} outside {MIN_SIDE}..={MAX_SIDE}"),
        });
    }

    let turns_by_tick = validate_turn_stream(artifact)?;

    let mut world = World::with_players(
        side,
        artifact
            .participants
            .iter()
            .enumerate()
            .map(|(i, p)| Player::new(p.player_id.as_str(), PALETTE[i % PALETTE.len()])),
    );

    for tick in 0..artifact.checkpoint_tick {
        let recorded = turns_by_tick.get(&tick).map(Vec::as_slice).unwrap_or(&[]);

        let living: HashSet<&PlayerId> = world.player_ids().iter().collect();
        let named: HashSet<&PlayerId> = recorded.iter().map(|t| &t.player_id).collect();
        if living != named {
            return Err(VerifyError::TurnStreamInvalid {
                reason: format!(
                    "tick {tick}: {} turns recorded for {} living players",
                    named.len(),
                    living.len()
                ),
            });
        }

        for applied in recorded {
            world.enqueue_turn(&applied.player_id, applied.turn);
        }
        let _ = world.advance(tick);
    }

    let actual_digest = world.state_digest();
    if actual_digest != artifact.final_digest {
        return Err(VerifyError::FinalDigestMismatch {
            expected: artifact.final_digest,
            actual: actual_digest,
        });
    }

    let actual_winner = world
        .winner()
        .map(|w| w.as_str().to_string())
        .unwrap_or_default();
    if actual_winner != artifact.winner {
        return Err(VerifyError::WinnerMismatch {
            expected: artifact.winner.clone(),
            actual: actual_winner,
        });
    }

    Ok(())
}

/// Check the turn stream and group it by tick.
fn validate_turn_stream(
    artifact: &ReplayArtifact,
) -> Result<HashMap<Tick, Vec<AppliedTurn>>, VerifyError> {
    let known: HashSet<&str> = artifact
        .participants
        .iter()
        .map(|p| p.player_id.as_str())
        .collect();
    if known.len() != artifact.participants.len() {
        return Err(VerifyError::InvalidFormat {
            reason: "duplicate participant id".to_string(),
        });
    }

    let mut seen: HashSet<(&str, Tick)> = HashSet::new();
    let mut by_tick: HashMap<Tick, Vec<AppliedTurn>> = HashMap::new();

    for proto in &artifact.turns {
        if proto.tick >= artifact.checkpoint_tick {
            return Err(VerifyError::TurnStreamInvalid {
                reason: format!(
                    "turn for {} at tick {} is outside [0, {})",
                    proto.player_id, proto.tick, artifact.checkpoint_tick
                ),
            });
        }
        if !known.contains(proto.player_id.as_str()) {
            return Err(VerifyError::TurnStreamInvalid {
                reason: format!("turn references unknown player {}", proto.player_id),
            });
        }
        if !seen.insert((proto.player_id.as_str(), proto.tick)) {
            return Err(VerifyError::TurnStreamInvalid {
                reason: format!(
                    "duplicate turn for player {} at tick {}",
                    proto.player_id, proto.tick
                ),
            });
        }

        let applied = AppliedTurn::try_from(proto).map_err(|e| VerifyError::InvalidFormat {
            reason: e.to_string(),
        })?;
        by_tick.entry(applied.tick).or_default().push(applied);
    }

    Ok(by_tick)
}

// ============================================================================
// Build Fingerprint Acquisition
// ============================================================================

/// Acquire the current build fingerprint.
///
/// Fails only if the running executable cannot be read.
pub fn acquire_build_fingerprint() -> io::Result<BuildFingerprintData> {
    let exe_path = std::env::current_exe()?;

    let mut file = fs::File::open(&exe_path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    let binary_sha256 = format!("{:x}", hasher.finalize());

    let profile = if cfg!(debug_assertions) {
        "dev"
    } else {
        "release"
    };

    Ok(BuildFingerprintData {
        binary_sha256,
        target_triple: target_triple(),
        profile: profile.to_string(),
        git_commit: std::env::var("LIGHTCYCLE_GIT_COMMIT")
            .unwrap_or_else(|_| "unknown".to_string()),
    })
}

fn target_triple() -> String {
    format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS)
}

// ============================================================================
// Replay I/O
// ============================================================================

/// Write a replay artifact to a new file. Refuses to overwrite.
pub fn write_replay(artifact: &ReplayArtifact, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    if path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("Replay artifact already exists at {}", path.display()),
        ));
    }

    let encoded = artifact.encode_to_vec();
    let mut file = fs::File::create(path)?;
    file.write_all(&encoded)?;

    Ok(())
}

pub fn read_replay(path: &Path) -> io::Result<ReplayArtifact> {
    let data = fs::read(path)?;
    ReplayArtifact::decode(data.as_slice()).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Failed to decode replay: {e}"),
        )
    })
}

// ============================================================================
// Tests
// ============================================================================
