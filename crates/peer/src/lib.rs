//! Lightcycle Peer Session
//!
//! Runs one device's side of a lockstep match without a dedicated server:
//! - Lobby and commit handling over the reliable control channel
//! - Master election once the commit set is complete
//! - Turn intake (local queue on the master, forwarded frames on replicas)
//! - Master tick scheduler broadcasting removal and position frames
//! - Replica frame receiver applying the master's broadcasts verbatim
//! - Replay recording on the master
//!
//! # Architecture
//!
//! A [`Session`] is driven by a single task. The transport binding and the
//! input source talk to it only through a [`SessionHandle`]; outbound
//! traffic goes through the [`Transport`] trait; the rendering layer is
//! notified through [`SessionHooks`].
//!
//! ```text
//! input ─turn()─▶ SessionHandle ─▶ Session ─▶ Transport ─▶ peers
//!                      ▲              │
//!       transport ─────┘              └─▶ SessionHooks ─▶ rendering
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod hooks;
pub mod intake;
mod master;
mod replica;
pub mod roles;
pub mod session;
pub mod transport;

pub use config::SessionConfig;
pub use error::{ConfigError, SessionError, TransportError};
pub use hooks::{NoHooks, RemovalEvent, SessionHooks};
pub use intake::{IntakeResult, TurnIntake};
pub use roles::{Role, elect, master_of};
pub use session::{Phase, Session, SessionOutcome, new_player_id, unix_now};
pub use transport::{
    LoopbackNetwork, LoopbackTransport, OfflineTransport, Recipients, SessionHandle,
    SessionInbox, Transport, TransportEvent,
};
