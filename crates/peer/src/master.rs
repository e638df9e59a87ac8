//! Master tick scheduler.
//!
//! Deadlines advance by a fixed period from the previous deadline, so the
//! tick rate never drifts with processing time. Between deadlines the task
//! keeps handling events, which is where forwarded turns are queued.

use lightcycle_wire::{encode_positions, encode_removal};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::hooks::SessionHooks;
use crate::session::Session;
use crate::transport::{Recipients, Transport};

impl<T: Transport, H: SessionHooks> Session<T, H> {
    /// Run authoritative ticks until at most one player is left and no
    /// removal animation is pending.
    pub(crate) async fn run_master(&mut self, start: Instant) -> Result<(), SessionError> {
        let mut deadline = start + self.config.first_tick_delay;

        while self.world.player_count() > 1 || self.hooks.animation_pending() {
            self.pump_until(deadline).await?;
            deadline += self.config.tick_period;
            // Only the animation is left; the survivor stays put.
            if self.world.player_count() > 1 {
                self.step()?;
            }
        }
        Ok(())
    }

    /// One authoritative tick: step, collide, broadcast.
    pub(crate) fn step(&mut self) -> Result<(), SessionError> {
        self.world.plan_robots(&self.robot_policy, &mut self.rng);

        let tick = self.world.tick();
        let outcome = self.world.advance(tick);
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record_turns(&outcome.applied);
        }

        // Removals go out before the survivors' positions.
        for removal in &outcome.removals {
            info!(
                player = %removal.player_id,
                x = removal.pos.x,
                y = removal.pos.y,
                tick = outcome.tick,
                "player removed"
            );
            let frame = encode_removal(&removal.player_id, removal.pos)?;
            if let Err(e) = self.transport.write_stream(Recipients::All, &frame) {
                warn!(error = %e, "removal broadcast failed");
            }
            self.hooks.on_player_removed(removal);
        }

        if !outcome.heads.is_empty() {
            let frame = encode_positions(&outcome.heads)?;
            if let Err(e) = self.transport.write_stream(Recipients::All, &frame) {
                warn!(error = %e, "position broadcast failed");
            }
        }

        debug!(tick = outcome.tick, alive = outcome.heads.len(), "tick");
        self.hooks.on_tick(&self.world);
        Ok(())
    }
}
