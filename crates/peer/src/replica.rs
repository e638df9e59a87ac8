//! Replica frame receiver.
//!
//! No local clock: the loop only moves when bytes from the master arrive.
//! Each frame is applied verbatim; positions are never re-derived from
//! directions.

use lightcycle_wire::ReplicationFrame;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::hooks::SessionHooks;
use crate::session::Session;
use crate::transport::Transport;

impl<T: Transport, H: SessionHooks> Session<T, H> {
    /// Apply master frames until at most one player is left and no removal
    /// animation is pending.
    ///
    /// A tick is only left after its closing frame: the survivors' positions,
    /// or the removal that empties the board. Every removal of the final tick
    /// is therefore applied before the winner is read.
    pub(crate) async fn run_replica(&mut self) -> Result<(), SessionError> {
        let mut tick_open = false;
        while self.world.player_count() > 1 || tick_open || self.hooks.animation_pending() {
            match self.frames.next_frame(self.world.player_count()) {
                Ok(Some(frame)) => {
                    let removal = matches!(frame, ReplicationFrame::Removal { .. });
                    self.apply_frame(frame);
                    tick_open = removal && self.world.player_count() > 0;
                }
                Ok(None) if self.world.player_count() > 1 || tick_open => {
                    self.next_event().await?
                }
                // Nothing left to decode; wait out the animation.
                Ok(None) => sleep(self.config.tick_period).await,
                Err(e) => warn!(error = %e, "malformed replication frame dropped"),
            }
        }
        Ok(())
    }

    pub(crate) fn apply_frame(&mut self, frame: ReplicationFrame) {
        match frame {
            ReplicationFrame::Position { coords } => {
                match self.world.apply_positions(&coords) {
                    Ok(()) => {
                        debug!(tick = self.world.tick(), "positions applied");
                        self.hooks.on_tick(&self.world);
                    }
                    Err(e) => warn!(error = %e, "position frame rejected"),
                }
            }
            ReplicationFrame::Removal { player_id, pos } => {
                match self.world.apply_removal(&player_id, pos) {
                    Ok(removal) => {
                        info!(player = %player_id, x = pos.x, y = pos.y, "player removed");
                        self.hooks.on_player_removed(&removal);
                    }
                    Err(e) => warn!(error = %e, "removal frame rejected"),
                }
            }
        }
    }
}
