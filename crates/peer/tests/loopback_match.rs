//! Full matches between several sessions over the in-process network.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use lightcycle_peer::{
    LoopbackNetwork, Role, Session, SessionConfig, SessionHandle, SessionHooks, SessionOutcome,
};
use lightcycle_replay::{VerifyOptions, verify_replay};
use lightcycle_sim::{PALETTE, PlayerId, World};
use lightcycle_wire::PeerInfo;
use tokio::task::JoinHandle;

#[derive(Clone, Default)]
struct Trace {
    digests: Arc<Mutex<Vec<u64>>>,
    master: Arc<Mutex<Option<bool>>>,
    exited: Arc<Mutex<bool>>,
}

impl SessionHooks for Trace {
    fn on_all_committed(&mut self, _player_ids: &[PlayerId], role: &Role) {
        *self.master.lock().unwrap() = Some(role.is_master());
    }

    fn on_tick(&mut self, world: &World) {
        self.digests.lock().unwrap().push(world.state_digest());
    }

    fn on_winner_exit(&mut self, _winner: Option<&PlayerId>) {
        *self.exited.lock().unwrap() = true;
    }
}

struct Peer {
    id: PlayerId,
    handle: SessionHandle,
    trace: Trace,
    task: JoinHandle<SessionOutcome>,
}

fn id(n: u8) -> PlayerId {
    PlayerId::new(format!("{n:08}-aaaa-bbbb-cccc-dddddddddddd"))
}

fn config() -> SessionConfig {
    SessionConfig {
        grid_size: 27,
        ..Default::default()
    }
}

/// Join peers in the given order and start their session tasks.
fn spawn_peers(network: &LoopbackNetwork, order: &[u8]) -> Vec<Peer> {
    order
        .iter()
        .map(|&n| {
            let id = id(n);
            let color = PALETTE[n as usize];
            let (handle, inbox) = SessionHandle::channel();
            let transport = network.join(PeerInfo::new(&id, color), handle.clone());
            let trace = Trace::default();
            let session =
                Session::new(config(), id.clone(), color, transport, trace.clone(), inbox).unwrap();
            let task = tokio::spawn(async move { session.run().await.unwrap() });
            Peer {
                id,
                handle,
                trace,
                task,
            }
        })
        .collect()
}

async fn finish(peers: Vec<Peer>) -> Vec<(Peer, SessionOutcome)> {
    let mut done = Vec::new();
    for mut peer in peers {
        let outcome = (&mut peer.task).await.unwrap();
        done.push((peer, outcome));
    }
    done
}

fn lenient() -> VerifyOptions {
    VerifyOptions {
        strict_build_check: false,
        current_build: None,
    }
}

fn assert_replicas_follow_master(results: &[(Peer, SessionOutcome)]) {
    let master = results
        .iter()
        .find(|(p, _)| *p.trace.master.lock().unwrap() == Some(true))
        .expect("one master");
    let master_digests = master.0.trace.digests.lock().unwrap().clone();

    for (peer, _) in results {
        assert!(*peer.trace.exited.lock().unwrap(), "{} never exited", peer.id);
        let digests = peer.trace.digests.lock().unwrap().clone();
        assert!(!digests.is_empty());
        assert!(
            master_digests.starts_with(&digests),
            "{} diverged from the master",
            peer.id
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_three_peers_straight_run() {
    let network = LoopbackNetwork::new();
    let peers = spawn_peers(&network, &[2, 3, 1]);
    for peer in &peers {
        peer.handle.commit().unwrap();
    }

    let results = finish(peers).await;

    // Player 1 runs up the middle; 2 and 3 meet head on along row 1, pass
    // through the same cell on the same tick, then die on each other's trail.
    for (peer, outcome) in &results {
        assert_eq!(outcome.winner, Some(id(1)), "winner seen by {}", peer.id);
        let is_master = peer.id == id(1);
        assert_eq!(*peer.trace.master.lock().unwrap(), Some(is_master));
        assert_eq!(outcome.replay.is_some(), is_master);
    }

    let (_, master) = results.iter().find(|(p, _)| p.id == id(1)).unwrap();
    assert_eq!(master.ticks, 5);
    let replay = master.replay.as_ref().unwrap();
    assert_eq!(replay.participants.len(), 3);
    assert!(verify_replay(replay, &lenient()).is_ok());

    assert_replicas_follow_master(&results);
}

#[tokio::test(start_paused = true)]
async fn test_forwarded_turn_reaches_master() {
    let network = LoopbackNetwork::new();
    let peers = spawn_peers(&network, &[1, 2, 3]);
    for peer in &peers {
        peer.handle.commit().unwrap();
    }

    // Inside the start lead: roles are fixed, the first tick is not due.
    tokio::time::sleep(Duration::from_millis(500)).await;
    // Player 2 starts on the left wall facing right; a left turn sends it
    // into the top wall on the first tick.
    peers[1].handle.turn(-1).unwrap();

    let results = finish(peers).await;

    // With 2 gone, 3 crosses in front of 1, which dies on 3's trail.
    for (peer, outcome) in &results {
        assert_eq!(outcome.winner, Some(id(3)), "winner seen by {}", peer.id);
    }
    let (_, master) = results.iter().find(|(p, _)| p.id == id(1)).unwrap();
    assert_eq!(master.ticks, 7);
    let replay = master.replay.as_ref().unwrap();
    assert!(
        replay
            .turns
            .iter()
            .any(|t| t.tick == 0 && t.player_id == id(2).as_str() && t.delta == -1)
    );
    assert!(verify_replay(replay, &lenient()).is_ok());

    assert_replicas_follow_master(&results);
}

#[tokio::test(start_paused = true)]
async fn test_last_players_die_on_the_same_tick() {
    let network = LoopbackNetwork::new();
    let peers = spawn_peers(&network, &[1, 2]);
    for peer in &peers {
        peer.handle.commit().unwrap();
    }

    let results = finish(peers).await;

    // Both run straight into opposite walls on tick 7.
    for (peer, outcome) in &results {
        assert_eq!(outcome.winner, None, "winner seen by {}", peer.id);
    }
    let (_, master) = results.iter().find(|(p, _)| p.id == id(1)).unwrap();
    assert_eq!(master.ticks, 8);
    let replay = master.replay.as_ref().unwrap();
    assert!(replay.winner.is_empty());
    assert!(verify_replay(replay, &lenient()).is_ok());

    assert_replicas_follow_master(&results);
}

#[tokio::test(start_paused = true)]
async fn test_byte_at_a_time_delivery() {
    let network = LoopbackNetwork::with_fragmentation(1);
    let peers = spawn_peers(&network, &[3, 1, 2]);
    for peer in &peers {
        peer.handle.commit().unwrap();
    }

    let results = finish(peers).await;
    for (_, outcome) in &results {
        assert_eq!(outcome.winner, Some(id(1)));
    }
    assert_replicas_follow_master(&results);
}
