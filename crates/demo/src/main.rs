//! Lightcycle demo driver.
//!
//! Plays complete matches on one machine: several sessions wired together
//! through the in-process network, or one session against robots. Every
//! participant is steered by the autopilot. The master's replay is verified
//! at the end and can be written to disk.

#![deny(unsafe_code)]

mod autopilot;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use lightcycle_peer::{
    LoopbackNetwork, OfflineTransport, Session, SessionConfig, SessionHandle, SessionOutcome,
    new_player_id,
};
use lightcycle_replay::{
    VerifyOptions, acquire_build_fingerprint, read_replay, verify_replay, write_replay,
};
use lightcycle_sim::PALETTE;
use lightcycle_wire::{PeerInfo, ReplayArtifact};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use autopilot::Autopilot;

#[derive(Parser, Debug)]
#[command(name = "lightcycle-demo", about = "Lockstep lightcycle matches on one machine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Several peers over the in-process network.
    Network {
        #[arg(long, default_value_t = 3)]
        peers: usize,
        /// Split every stream write into chunks of this many bytes.
        #[arg(long)]
        fragment: Option<usize>,
        #[command(flatten)]
        common: MatchArgs,
    },
    /// One device against robots.
    Offline {
        #[arg(long, default_value_t = 3)]
        robots: usize,
        #[command(flatten)]
        common: MatchArgs,
    },
    /// Re-simulate a recorded replay.
    Verify {
        #[arg(value_name = "REPLAY")]
        path: PathBuf,
        /// Fail when the replay was recorded by a different build.
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Args, Debug)]
struct MatchArgs {
    /// Seed for the autopilots and robots.
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// JSON session config; durations in milliseconds.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Write the master's replay here.
    #[arg(long, value_name = "FILE")]
    replay_out: Option<PathBuf>,
}

impl MatchArgs {
    fn session_config(&self) -> Result<SessionConfig> {
        let Some(path) = &self.config else {
            return Ok(SessionConfig::default());
        };
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        SessionConfig::from_json(&json).with_context(|| format!("parsing {}", path.display()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Network {
            peers,
            fragment,
            common,
        } => {
            let outcomes = run_network(peers, fragment, &common).await?;
            finish_match(&outcomes, &common)
        }
        Command::Offline { robots, common } => {
            let outcome = run_offline(robots, &common).await?;
            finish_match(std::slice::from_ref(&outcome), &common)
        }
        Command::Verify { path, strict } => verify_file(&path, strict),
    }
}

async fn run_network(
    count: usize,
    fragment: Option<usize>,
    args: &MatchArgs,
) -> Result<Vec<SessionOutcome>> {
    let config = args.session_config()?;
    if count < config.min_players || count > config.max_players {
        bail!(
            "peer count {count} outside {}..={}",
            config.min_players,
            config.max_players
        );
    }

    let network = match fragment {
        Some(chunk) => LoopbackNetwork::with_fragmentation(chunk),
        None => LoopbackNetwork::new(),
    };
    let fingerprint = acquire_build_fingerprint()
        .inspect_err(|e| warn!(error = %e, "build fingerprint unavailable"))
        .ok();

    let mut handles = Vec::with_capacity(count);
    let mut tasks = Vec::with_capacity(count);
    for index in 0..count {
        let id = new_player_id();
        let color = PALETTE[index % PALETTE.len()];
        let (handle, inbox) = SessionHandle::channel();
        let transport = network.join(PeerInfo::new(&id, color), handle.clone());
        let autopilot = Autopilot::new(
            id.clone(),
            handle.clone(),
            config.robot_change_chance,
            args.seed.wrapping_add(index as u64),
        );

        let mut session = Session::new(config.clone(), id, color, transport, autopilot, inbox)?;
        if let Some(fingerprint) = fingerprint.clone() {
            session.set_build_fingerprint(fingerprint);
        }
        tasks.push(tokio::spawn(session.run()));
        handles.push(handle);
    }

    for handle in &handles {
        handle.commit()?;
    }

    let mut outcomes = Vec::with_capacity(count);
    for task in tasks {
        outcomes.push(task.await.context("session task panicked")??);
    }
    Ok(outcomes)
}

async fn run_offline(robots: usize, args: &MatchArgs) -> Result<SessionOutcome> {
    let config = args.session_config()?;
    let id = new_player_id();
    let (handle, inbox) = SessionHandle::channel();
    let autopilot = Autopilot::new(
        id.clone(),
        handle.clone(),
        config.robot_change_chance,
        args.seed,
    );

    let mut session = Session::new(config, id, PALETTE[0], OfflineTransport, autopilot, inbox)?;
    session.seed_robots(args.seed);
    session.add_robots(robots)?;
    if let Ok(fingerprint) = acquire_build_fingerprint() {
        session.set_build_fingerprint(fingerprint);
    }
    handle.commit()?;

    Ok(session.run().await?)
}

fn finish_match(outcomes: &[SessionOutcome], args: &MatchArgs) -> Result<()> {
    let winners: Vec<_> = outcomes.iter().map(|o| o.winner.clone()).collect();
    if winners.windows(2).any(|w| w[0] != w[1]) {
        bail!("peers disagree on the winner: {winners:?}");
    }

    let replay = outcomes
        .iter()
        .find_map(|o| o.replay.as_ref())
        .context("no session recorded a replay")?;
    match winners.first().cloned().flatten() {
        Some(winner) => info!(%winner, ticks = replay.checkpoint_tick, "match won"),
        None => info!(ticks = replay.checkpoint_tick, "no survivors"),
    }

    verify(replay, false)?;
    if let Some(path) = &args.replay_out {
        write_replay(replay, path).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "replay written");
    }
    Ok(())
}

fn verify_file(path: &Path, strict: bool) -> Result<()> {
    let replay = read_replay(path).with_context(|| format!("reading {}", path.display()))?;
    verify(&replay, strict)
}

fn verify(replay: &ReplayArtifact, strict: bool) -> Result<()> {
    let options = VerifyOptions {
        strict_build_check: strict,
        current_build: acquire_build_fingerprint().ok(),
    };
    verify_replay(replay, &options).context("replay verification failed")?;
    info!(
        turns = replay.turns.len(),
        digest = %format!("{:#018x}", replay.final_digest),
        "replay verified"
    );
    Ok(())
}
