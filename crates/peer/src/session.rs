//! Session state machine.
//!
//! `Lobby → Committing → Starting → Running → Finished`
//!
//! A session is one task. Before `Running` it only reacts to events; once
//! the agreed start instant passes it runs either the master tick loop or
//! the replica frame loop, then finishes with the terminal delay and the
//! winner exit.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use lightcycle_replay::{BuildFingerprintData, ReplayConfig, ReplayRecorder};
use lightcycle_sim::{Color, Player, PlayerId, RobotPolicy, Tick, World};
use lightcycle_wire::{ControlDecode, ControlMessage, FrameDecoder, ID_LEN, ReplayArtifact};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::hooks::SessionHooks;
use crate::intake::{IntakeResult, TurnIntake};
use crate::roles::{Role, elect};
use crate::transport::{Recipients, SessionEvent, SessionInbox, Transport, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Discovering peers; nobody has committed.
    Lobby,
    /// At least one player committed.
    Committing,
    /// Order and roles fixed; waiting for the start instant.
    Starting,
    Running,
    Finished,
}

/// Result of a finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub winner: Option<PlayerId>,
    /// Ticks stepped (master) or applied (replica).
    pub ticks: Tick,
    /// Present on the master when recording is enabled.
    pub replay: Option<ReplayArtifact>,
}

/// A fresh 36-byte player id.
pub fn new_player_id() -> PlayerId {
    PlayerId::new(Uuid::new_v4().hyphenated().to_string())
}

/// Seconds since the UNIX epoch.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn check_id(id: &PlayerId) -> Result<(), SessionError> {
    if id.as_str().len() == ID_LEN {
        Ok(())
    } else {
        Err(SessionError::InvalidPlayerId(id.clone()))
    }
}

pub struct Session<T: Transport, H: SessionHooks> {
    pub(crate) config: SessionConfig,
    pub(crate) local_id: PlayerId,
    pub(crate) phase: Phase,
    pub(crate) world: World,
    pub(crate) role: Option<Role>,
    /// Agreed start, seconds since the UNIX epoch.
    pub(crate) start_time: Option<f64>,
    /// A sync that arrived before the local commit set was complete.
    pending_sync: Option<f64>,
    pub(crate) transport: T,
    pub(crate) hooks: H,
    inbox: mpsc::UnboundedReceiver<SessionEvent>,
    inbox_open: bool,
    pub(crate) intake: TurnIntake,
    pub(crate) frames: FrameDecoder,
    pub(crate) robot_policy: RobotPolicy,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) recorder: Option<ReplayRecorder>,
    build_fingerprint: Option<BuildFingerprintData>,
    has_robots: bool,
}

impl<T: Transport, H: SessionHooks> Session<T, H> {
    /// Create a session for the local player.
    ///
    /// `inbox` is the receiving half of the [`SessionHandle`] given to the
    /// transport binding and the input source.
    pub fn new(
        config: SessionConfig,
        local_id: PlayerId,
        color: Color,
        transport: T,
        hooks: H,
        inbox: SessionInbox,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        check_id(&local_id)?;

        let mut world = World::new(config.side());
        world.add_player(Player::new(local_id.clone(), color));

        Ok(Self {
            robot_policy: RobotPolicy {
                change_chance: config.robot_change_chance,
            },
            world,
            local_id,
            phase: Phase::Lobby,
            role: None,
            start_time: None,
            pending_sync: None,
            transport,
            hooks,
            inbox: inbox.into_inner(),
            inbox_open: true,
            intake: TurnIntake::new(),
            frames: FrameDecoder::new(),
            rng: ChaCha8Rng::from_entropy(),
            recorder: None,
            build_fingerprint: None,
            has_robots: false,
            config,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn role(&self) -> Option<&Role> {
        self.role.as_ref()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn local_id(&self) -> &PlayerId {
        &self.local_id
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    /// Seed the robot RNG for reproducible offline matches.
    pub fn seed_robots(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    pub fn set_build_fingerprint(&mut self, fingerprint: BuildFingerprintData) {
        self.build_fingerprint = Some(fingerprint);
    }

    /// Add `count` committed robots to an offline lobby.
    ///
    /// Robots are stepped by the master, so they are refused once a peer
    /// has joined, and discovery stops as soon as one is added.
    pub fn add_robots(&mut self, count: usize) -> Result<(), SessionError> {
        if self.phase != Phase::Lobby || self.world.player_count() > 1 + self.robot_count() {
            return Err(SessionError::RobotsInNetworkSession);
        }
        if self.world.player_count() + count > self.config.max_players {
            return Err(SessionError::TooManyPlayers(self.config.max_players));
        }
        if count == 0 {
            return Ok(());
        }

        self.transport.stop_discovery();
        self.has_robots = true;

        let used: Vec<Color> = self.world.players().map(Player::color).collect();
        let mut palette = lightcycle_sim::PALETTE
            .into_iter()
            .filter(|c| !used.contains(c));
        for _ in 0..count {
            let color = palette.next().unwrap_or(lightcycle_sim::PALETTE[0]);
            let mut robot = Player::robot(new_player_id(), color);
            robot.commit();
            info!(robot = %robot.id(), "robot added");
            self.hooks.on_player_found(&robot);
            self.world.add_player(robot);
        }
        Ok(())
    }

    fn robot_count(&self) -> usize {
        self.world
            .players()
            .filter(|p| p.controller() == lightcycle_sim::Controller::Robot)
            .count()
    }

    // ========================================================================
    // Event handling
    // ========================================================================

    pub(crate) fn handle_event(&mut self, event: SessionEvent) -> Result<(), SessionError> {
        match event {
            SessionEvent::Transport(event) => self.handle_transport(event),
            SessionEvent::LocalTurn(delta) => {
                let result = self.intake.local(
                    &mut self.world,
                    self.role.as_ref(),
                    &self.local_id,
                    delta,
                    &mut self.transport,
                );
                if !result.is_accepted() {
                    debug!(delta, ?result, "local turn dropped");
                }
                Ok(())
            }
            SessionEvent::LocalCommit => self.commit_local(),
        }
    }

    fn handle_transport(&mut self, event: TransportEvent) -> Result<(), SessionError> {
        match event {
            TransportEvent::PeerJoined { info } => {
                self.player_found(Player::new(info.player_id(), info.color));
                Ok(())
            }
            TransportEvent::PeerLeft { peer } => self.peer_left(&peer),
            TransportEvent::Control { from, payload } => {
                match ControlMessage::decode(&payload) {
                    Ok(ControlDecode::Known(message)) => self.handle_control(&from, message),
                    Ok(ControlDecode::Unknown { action }) => {
                        warn!(%from, %action, "unknown control action ignored");
                        Ok(())
                    }
                    Err(e) => {
                        warn!(%from, error = %e, "undecodable control message ignored");
                        Ok(())
                    }
                }
            }
            TransportEvent::StreamBytes { from, bytes } => {
                match &self.role {
                    Some(Role::Master) => {
                        for result in self.intake.remote(&mut self.world, &from, &bytes) {
                            if result != IntakeResult::Queued {
                                debug!(%from, ?result, "remote turn dropped");
                            }
                        }
                    }
                    Some(Role::Replica { master }) if *master == from => self.frames.push(&bytes),
                    _ => warn!(%from, len = bytes.len(), "unexpected stream bytes dropped"),
                }
                Ok(())
            }
        }
    }

    fn handle_control(
        &mut self,
        from: &PlayerId,
        message: ControlMessage,
    ) -> Result<(), SessionError> {
        match message {
            ControlMessage::Commit { id } => {
                self.player_committed(&PlayerId::from(id));
                Ok(())
            }
            ControlMessage::Sync { time } => {
                let from_master = match &self.role {
                    Some(Role::Replica { master }) => Some(master == from),
                    Some(Role::Master) => Some(false),
                    None => None,
                };
                match from_master {
                    Some(true) => self.adopt_start(time),
                    Some(false) => warn!(%from, "sync from a non-master peer ignored"),
                    None => {
                        debug!(%from, time, "sync held until the commit set is complete");
                        self.pending_sync = Some(time);
                    }
                }
                Ok(())
            }
        }
    }

    fn player_found(&mut self, player: Player) {
        if !matches!(self.phase, Phase::Lobby | Phase::Committing) || self.has_robots {
            warn!(player = %player.id(), phase = ?self.phase, "late peer ignored");
            return;
        }
        if check_id(player.id()).is_err() {
            warn!(player = %player.id(), "peer id is not a 36-byte identifier; ignored");
            return;
        }
        if self.world.player_count() >= self.config.max_players {
            warn!(player = %player.id(), max = self.config.max_players, "lobby full; peer ignored");
            return;
        }
        if self.world.player(player.id()).is_some() {
            return;
        }

        info!(player = %player.id(), "player found");
        self.hooks.on_player_found(&player);
        self.world.add_player(player);
    }

    fn peer_left(&mut self, peer: &PlayerId) -> Result<(), SessionError> {
        match self.phase {
            Phase::Lobby | Phase::Committing => {
                if self.world.remove_lobby_player(peer).is_some() {
                    info!(player = %peer, "player left the lobby");
                    self.check_all_committed();
                }
            }
            // No heartbeat: a peer lost mid-game is only reported.
            _ => warn!(player = %peer, phase = ?self.phase, "peer left"),
        }
        Ok(())
    }

    fn commit_local(&mut self) -> Result<(), SessionError> {
        let already = self
            .world
            .player(&self.local_id)
            .is_none_or(Player::is_committed);
        if already || !matches!(self.phase, Phase::Lobby | Phase::Committing) {
            return Ok(());
        }
        let message = ControlMessage::commit(&self.local_id);
        if let Err(e) = self.transport.send_control(Recipients::All, &message) {
            warn!(error = %e, "commit broadcast failed");
        }
        let local = self.local_id.clone();
        self.player_committed(&local);
        Ok(())
    }

    fn player_committed(&mut self, id: &PlayerId) {
        if !matches!(self.phase, Phase::Lobby | Phase::Committing) {
            debug!(player = %id, "commit after finalization ignored");
            return;
        }
        let Some(player) = self.world.player_mut(id) else {
            warn!(player = %id, "commit from unknown player ignored");
            return;
        };
        player.commit();
        info!(player = %id, "player committed");
        self.hooks.on_player_committed(id);
        self.phase = Phase::Committing;
        self.check_all_committed();
    }

    fn check_all_committed(&mut self) {
        if !matches!(self.phase, Phase::Lobby | Phase::Committing) {
            return;
        }
        if self.world.player_count() < self.config.min_players || !self.world.all_committed() {
            return;
        }
        self.all_players_committed();
    }

    fn all_players_committed(&mut self) {
        self.transport.stop_discovery();
        self.world.finalize();
        let role = elect(&self.world, &self.local_id);
        info!(
            players = self.world.player_count(),
            master = %role.master(&self.local_id),
            local_is_master = role.is_master(),
            "all players committed"
        );

        if role.is_master() && self.config.record_replay {
            let mut recorder = ReplayRecorder::new(ReplayConfig {
                grid_side: self.config.side(),
                robot_change_chance: self.config.robot_change_chance,
            });
            recorder.record_participants(self.world.players());
            if let Some(fingerprint) = self.build_fingerprint.take() {
                recorder.set_build_fingerprint(fingerprint);
            }
            self.recorder = Some(recorder);
        }

        self.role = Some(role);
        self.phase = Phase::Starting;

        if self.role.as_ref().is_some_and(Role::is_master) {
            let start = unix_now() + self.config.start_lead.as_secs_f64();
            let sync = ControlMessage::Sync { time: start };
            if let Err(e) = self.transport.send_control(Recipients::All, &sync) {
                warn!(error = %e, "sync broadcast failed");
            }
            self.adopt_start(start);
        } else if let Some(time) = self.pending_sync.take() {
            self.adopt_start(time);
        }
    }

    fn adopt_start(&mut self, time: f64) {
        if self.start_time.is_some() {
            return;
        }
        info!(start = time, "start instant agreed");
        self.start_time = Some(time);
        if let Some(role) = &self.role {
            self.hooks.on_all_committed(self.world.player_ids(), role);
        }
    }

    // ========================================================================
    // Suspension points
    // ========================================================================

    /// Handle events until `deadline`.
    pub(crate) async fn pump_until(&mut self, deadline: Instant) -> Result<(), SessionError> {
        while self.inbox_open {
            tokio::select! {
                _ = sleep_until(deadline) => return Ok(()),
                event = self.inbox.recv() => match event {
                    Some(event) => self.handle_event(event)?,
                    None => self.inbox_open = false,
                },
            }
        }
        sleep_until(deadline).await;
        Ok(())
    }

    /// Handle the next event. Fails once no event can ever arrive.
    pub(crate) async fn next_event(&mut self) -> Result<(), SessionError> {
        match self.inbox.recv().await {
            Some(event) => self.handle_event(event),
            None => {
                self.inbox_open = false;
                Err(SessionError::Disconnected)
            }
        }
    }

    // ========================================================================
    // Driver
    // ========================================================================

    /// Drive the session to completion.
    pub async fn run(mut self) -> Result<SessionOutcome, SessionError> {
        while self.start_time.is_none() {
            self.next_event().await?;
        }

        let start = self.start_time.unwrap_or_else(unix_now);
        let lead = Duration::try_from_secs_f64(start - unix_now()).unwrap_or(Duration::ZERO);
        let start_at = Instant::now() + lead;
        self.pump_until(start_at).await?;

        self.phase = Phase::Running;
        info!(role = ?self.role, "running");
        let result = if self.role.as_ref().is_some_and(Role::is_master) {
            self.run_master(start_at).await
        } else {
            self.run_replica().await
        };

        self.phase = Phase::Finished;
        sleep(self.config.terminal_delay).await;

        let winner = self.world.winner().cloned();
        info!(winner = ?winner, ticks = self.world.tick(), "session finished");
        self.hooks.on_winner_exit(winner.as_ref());
        self.transport.end_all();
        result?;

        let replay = self.recorder.take().map(|recorder| {
            recorder.finalize(
                self.world.state_digest(),
                self.world.tick(),
                "decided",
                winner.as_ref(),
            )
        });

        Ok(SessionOutcome {
            winner,
            ticks: self.world.tick(),
            replay,
        })
    }
}
