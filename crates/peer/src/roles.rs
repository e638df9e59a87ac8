//! Master election.
//!
//! Runs once, when the commit set is complete. The smallest human id in the
//! canonical order becomes master; every other device is a replica of it.
//! Robots never own a device, so they are skipped.

use lightcycle_sim::{Controller, PlayerId, World};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Runs the authoritative tick loop.
    Master,
    /// Applies frames streamed by `master`.
    Replica { master: PlayerId },
}

impl Role {
    pub fn is_master(&self) -> bool {
        matches!(self, Self::Master)
    }

    pub fn master<'a>(&'a self, local: &'a PlayerId) -> &'a PlayerId {
        match self {
            Self::Master => local,
            Self::Replica { master } => master,
        }
    }
}

/// Smallest human id of a finalized world.
pub fn master_of(world: &World) -> Option<&PlayerId> {
    world
        .players()
        .filter(|p| p.controller() == Controller::Human)
        .map(|p| p.id())
        .min()
        .or_else(|| world.player_ids().first())
}

/// Role of `local` in a finalized world.
pub fn elect(world: &World, local: &PlayerId) -> Role {
    match master_of(world) {
        Some(master) if master != local => Role::Replica {
            master: master.clone(),
        },
        _ => Role::Master,
    }
}
