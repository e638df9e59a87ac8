//! Input source that steers the local player with the robot heuristic.
//!
//! It reads the session's own view of the world after every tick, so on a
//! replica it steers from the master's broadcast positions exactly like a
//! person watching the screen would.

use lightcycle_peer::{RemovalEvent, Role, SessionHandle, SessionHooks};
use lightcycle_sim::{PlayerId, RobotPolicy, Turn, World};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

pub struct Autopilot {
    local: PlayerId,
    handle: SessionHandle,
    policy: RobotPolicy,
    rng: ChaCha8Rng,
}

impl Autopilot {
    pub fn new(local: PlayerId, handle: SessionHandle, change_chance: f64, seed: u64) -> Self {
        Self {
            local,
            handle,
            policy: RobotPolicy { change_chance },
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl SessionHooks for Autopilot {
    fn on_all_committed(&mut self, player_ids: &[PlayerId], role: &Role) {
        info!(
            local = %self.local,
            players = player_ids.len(),
            master = role.is_master(),
            "match starting"
        );
    }

    fn on_player_removed(&mut self, event: &RemovalEvent) {
        debug!(local = %self.local, removed = %event.player_id, "derez");
    }

    fn on_tick(&mut self, world: &World) {
        let Some(player) = world.player(&self.local) else {
            return;
        };
        let choice = self.policy.choose(world.grid(), player, &mut self.rng);
        let turn = Turn::between(player.direction(), choice).unwrap_or(Turn::Straight);
        if turn == Turn::Straight {
            return;
        }
        if let Err(e) = self.handle.turn(turn.delta()) {
            warn!(local = %self.local, error = %e, "turn not delivered");
        }
    }

    fn on_winner_exit(&mut self, winner: Option<&PlayerId>) {
        let won = winner == Some(&self.local);
        info!(local = %self.local, won, "leaving match");
    }
}
