//! Transport seam.
//!
//! The session never owns sockets. Outbound traffic goes through the
//! [`Transport`] trait; inbound traffic is pushed by the transport binding
//! into a [`SessionHandle`], which feeds the session task's event queue.
//!
//! [`LoopbackNetwork`] connects several sessions inside one process and is
//! what the demo and the integration tests run on.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lightcycle_sim::PlayerId;
use lightcycle_wire::{ControlMessage, PeerInfo};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::TransportError;

// ============================================================================
// Seams
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    All,
    Peer(PlayerId),
}

/// Outbound half of a peer-to-peer transport.
pub trait Transport: Send {
    /// Reliable, ordered delivery.
    fn send_control(
        &mut self,
        to: Recipients,
        message: &ControlMessage,
    ) -> Result<(), TransportError>;

    /// Best-effort ordered byte stream.
    fn write_stream(&mut self, to: Recipients, bytes: &[u8]) -> Result<(), TransportError>;

    fn stop_discovery(&mut self);

    fn end_all(&mut self);
}

/// Inbound traffic as seen by the session.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    PeerJoined { info: PeerInfo },
    PeerLeft { peer: PlayerId },
    Control { from: PlayerId, payload: Vec<u8> },
    StreamBytes { from: PlayerId, bytes: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SessionEvent {
    Transport(TransportEvent),
    LocalTurn(i8),
    LocalCommit,
}

/// Receiving half of a [`SessionHandle`], consumed by [`crate::Session::new`].
#[derive(Debug)]
pub struct SessionInbox(mpsc::UnboundedReceiver<SessionEvent>);

impl SessionInbox {
    pub(crate) fn into_inner(self) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.0
    }
}

/// Cloneable entry point into a running session.
///
/// Transport bindings deliver network traffic through it; input sources
/// call [`SessionHandle::turn`] and [`SessionHandle::commit`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    pub fn channel() -> (Self, SessionInbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, SessionInbox(rx))
    }

    pub fn deliver(&self, event: TransportEvent) -> Result<(), TransportError> {
        self.send(SessionEvent::Transport(event))
    }

    /// Local input: -1 left, 0 straight, +1 right.
    pub fn turn(&self, delta: i8) -> Result<(), TransportError> {
        self.send(SessionEvent::LocalTurn(delta))
    }

    pub fn commit(&self) -> Result<(), TransportError> {
        self.send(SessionEvent::LocalCommit)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, event: SessionEvent) -> Result<(), TransportError> {
        self.tx.send(event).map_err(|_| TransportError::Closed)
    }
}

// ============================================================================
// Offline
// ============================================================================

/// Transport with no peers, for single-device matches against robots.
#[derive(Debug, Default)]
pub struct OfflineTransport;

impl Transport for OfflineTransport {
    fn send_control(
        &mut self,
        _to: Recipients,
        _message: &ControlMessage,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    fn write_stream(&mut self, _to: Recipients, _bytes: &[u8]) -> Result<(), TransportError> {
        Ok(())
    }

    fn stop_discovery(&mut self) {}

    fn end_all(&mut self) {}
}

// ============================================================================
// Loopback
// ============================================================================

struct Member {
    info: PeerInfo,
    handle: SessionHandle,
    discovering: bool,
    /// Peers this member has been introduced to.
    connected: Vec<PlayerId>,
}

#[derive(Default)]
struct Hub {
    members: BTreeMap<PlayerId, Member>,
    /// Stream writes are split into chunks of this size when set.
    fragment: Option<usize>,
}

/// In-process network connecting several sessions.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver stream bytes in chunks of `chunk` bytes.
    pub fn with_fragmentation(chunk: usize) -> Self {
        let network = Self::default();
        network.lock().fragment = Some(chunk.max(1));
        network
    }

    /// Attach a session. Every other member still discovering is introduced
    /// to it, and it to them.
    pub fn join(&self, info: PeerInfo, handle: SessionHandle) -> LoopbackTransport {
        let id = info.player_id();
        let mut hub = self.lock();

        let mut connected = Vec::new();
        for (peer_id, member) in hub.members.iter_mut() {
            if !member.discovering {
                continue;
            }
            deliver(&member.handle, TransportEvent::PeerJoined { info: info.clone() });
            deliver(
                &handle,
                TransportEvent::PeerJoined {
                    info: member.info.clone(),
                },
            );
            member.connected.push(id.clone());
            connected.push(peer_id.clone());
        }

        hub.members.insert(
            id.clone(),
            Member {
                info,
                handle,
                discovering: true,
                connected,
            },
        );

        LoopbackTransport {
            id,
            network: self.clone(),
        }
    }

    pub fn member_count(&self) -> usize {
        self.lock().members.len()
    }

    fn lock(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn deliver(handle: &SessionHandle, event: TransportEvent) {
    if handle.deliver(event).is_err() {
        debug!("loopback delivery to a finished session dropped");
    }
}

/// One member's view of a [`LoopbackNetwork`].
pub struct LoopbackTransport {
    id: PlayerId,
    network: LoopbackNetwork,
}

impl LoopbackTransport {
    pub fn id(&self) -> &PlayerId {
        &self.id
    }

    /// Targets of `to` among this member's connections.
    fn targets(
        hub: &Hub,
        from: &PlayerId,
        to: &Recipients,
    ) -> Result<Vec<SessionHandle>, TransportError> {
        let member = hub.members.get(from).ok_or(TransportError::Closed)?;
        match to {
            Recipients::All => Ok(member
                .connected
                .iter()
                .filter_map(|peer| hub.members.get(peer))
                .map(|m| m.handle.clone())
                .collect()),
            Recipients::Peer(peer) => {
                if !member.connected.contains(peer) {
                    return Err(TransportError::UnknownPeer(peer.clone()));
                }
                hub.members
                    .get(peer)
                    .map(|m| vec![m.handle.clone()])
                    .ok_or_else(|| TransportError::UnknownPeer(peer.clone()))
            }
        }
    }
}

impl Transport for LoopbackTransport {
    fn send_control(
        &mut self,
        to: Recipients,
        message: &ControlMessage,
    ) -> Result<(), TransportError> {
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "control message not encodable");
                return Ok(());
            }
        };
        let hub = self.network.lock();
        for handle in Self::targets(&hub, &self.id, &to)? {
            deliver(
                &handle,
                TransportEvent::Control {
                    from: self.id.clone(),
                    payload: payload.clone(),
                },
            );
        }
        Ok(())
    }

    fn write_stream(&mut self, to: Recipients, bytes: &[u8]) -> Result<(), TransportError> {
        let hub = self.network.lock();
        let chunk = hub.fragment.unwrap_or(bytes.len()).max(1);
        for handle in Self::targets(&hub, &self.id, &to)? {
            for piece in bytes.chunks(chunk) {
                deliver(
                    &handle,
                    TransportEvent::StreamBytes {
                        from: self.id.clone(),
                        bytes: piece.to_vec(),
                    },
                );
            }
        }
        Ok(())
    }

    fn stop_discovery(&mut self) {
        if let Some(member) = self.network.lock().members.get_mut(&self.id) {
            member.discovering = false;
        }
    }

    fn end_all(&mut self) {
        let mut hub = self.network.lock();
        let Some(member) = hub.members.remove(&self.id) else {
            return;
        };
        for peer in &member.connected {
            if let Some(other) = hub.members.get_mut(peer) {
                other.connected.retain(|p| p != &self.id);
                deliver(
                    &other.handle,
                    TransportEvent::PeerLeft {
                        peer: self.id.clone(),
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str) -> PeerInfo {
        PeerInfo::new(&PlayerId::from(id), [1.0, 0.0, 0.0])
    }

    #[test]
    fn test_join_introduces_both_sides() {
        let network = LoopbackNetwork::new();
        let (a, a_rx) = SessionHandle::channel();
        let mut a_rx = a_rx.into_inner();
        let (b, b_rx) = SessionHandle::channel();
        let mut b_rx = b_rx.into_inner();
        let _ta = network.join(info("a"), a);
        let _tb = network.join(info("b"), b);

        assert_eq!(
            a_rx.try_recv().unwrap(),
            SessionEvent::Transport(TransportEvent::PeerJoined { info: info("b") })
        );
        assert_eq!(
            b_rx.try_recv().unwrap(),
            SessionEvent::Transport(TransportEvent::PeerJoined { info: info("a") })
        );
        assert_eq!(network.member_count(), 2);
    }

    #[test]
    fn test_stopped_discovery_hides_late_joiners() {
        let network = LoopbackNetwork::new();
        let (a, a_rx) = SessionHandle::channel();
        let mut a_rx = a_rx.into_inner();
        let mut ta = network.join(info("a"), a);
        ta.stop_discovery();

        let (b, b_rx) = SessionHandle::channel();
        let mut b_rx = b_rx.into_inner();
        let mut tb = network.join(info("b"), b);
        assert!(a_rx.try_recv().is_err());
        assert!(b_rx.try_recv().is_err());
        assert_eq!(
            tb.write_stream(Recipients::Peer(PlayerId::from("a")), b"+1"),
            Err(TransportError::UnknownPeer(PlayerId::from("a")))
        );
    }

    #[test]
    fn test_stream_fragmentation_and_end_all() {
        let network = LoopbackNetwork::with_fragmentation(1);
        let (a, a_rx) = SessionHandle::channel();
        let mut a_rx = a_rx.into_inner();
        let (b, b_rx) = SessionHandle::channel();
        let mut b_rx = b_rx.into_inner();
        let mut ta = network.join(info("a"), a);
        let _tb = network.join(info("b"), b);
        let _ = a_rx.try_recv();
        let _ = b_rx.try_recv();

        ta.write_stream(Recipients::All, &[1, 2, 3]).unwrap();
        for byte in [1u8, 2, 3] {
            assert_eq!(
                b_rx.try_recv().unwrap(),
                SessionEvent::Transport(TransportEvent::StreamBytes {
                    from: PlayerId::from("a"),
                    bytes: vec![byte],
                })
            );
        }

        ta.end_all();
        assert_eq!(
            b_rx.try_recv().unwrap(),
            SessionEvent::Transport(TransportEvent::PeerLeft {
                peer: PlayerId::from("a")
            })
        );
        assert_eq!(network.member_count(), 1);
    }

    #[test]
    fn test_handle_reports_closed_session() {
        let (handle, rx) = SessionHandle::channel();
        drop(rx);
        assert!(handle.is_closed());
        assert_eq!(handle.turn(1), Err(TransportError::Closed));
    }
}
