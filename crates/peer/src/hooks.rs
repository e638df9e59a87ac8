//! Callbacks into the rendering and menu layers.

use lightcycle_sim::{Player, PlayerId, World};

use crate::roles::Role;

/// Cosmetic record of one elimination.
pub use lightcycle_sim::Removal as RemovalEvent;

/// Optional session callbacks. Every method defaults to a no-op.
pub trait SessionHooks: Send {
    fn on_player_found(&mut self, _player: &Player) {}

    fn on_player_committed(&mut self, _id: &PlayerId) {}

    /// The canonical order is frozen and the start instant is known.
    fn on_all_committed(&mut self, _player_ids: &[PlayerId], _role: &Role) {}

    fn on_player_removed(&mut self, _event: &RemovalEvent) {}

    /// A tick was stepped (master) or applied (replica).
    fn on_tick(&mut self, _world: &World) {}

    fn on_winner_exit(&mut self, _winner: Option<&PlayerId>) {}

    /// Keeps the running loop alive while removal animations play.
    fn animation_pending(&self) -> bool {
        false
    }
}

/// Hooks that ignore every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl SessionHooks for NoHooks {}
