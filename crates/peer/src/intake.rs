//! Turn intake.
//!
//! Local input is queued directly on the master and forwarded as a 2-byte
//! turn frame on a replica. The master decodes each replica's forward
//! stream independently and queues the deltas on that replica's player.

use std::collections::HashMap;

use lightcycle_sim::{PlayerId, Turn, World};
use lightcycle_wire::{TurnDecoder, encode_turn};
use tracing::warn;

use crate::roles::Role;
use crate::transport::{Recipients, Transport};

/// Outcome of one turn submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeResult {
    /// Appended to the player's queue on this device.
    Queued,
    /// Sent to the master as a turn frame.
    Forwarded,
    /// Dropped: delta outside {-1, 0, +1} or not a turn frame.
    DroppedInvalid,
    /// Dropped: the canonical order is not fixed yet.
    DroppedNotRunning,
    /// Dropped: the player is unknown or already eliminated.
    DroppedNotPlaying,
    /// Dropped: the forward could not be written.
    DroppedTransport,
}

impl IntakeResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Queued | Self::Forwarded)
    }
}

#[derive(Debug, Default)]
pub struct TurnIntake {
    decoders: HashMap<PlayerId, TurnDecoder>,
}

impl TurnIntake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit a turn from the local input source.
    pub fn local<T: Transport>(
        &mut self,
        world: &mut World,
        role: Option<&Role>,
        local: &PlayerId,
        delta: i8,
        transport: &mut T,
    ) -> IntakeResult {
        let Ok(turn) = Turn::try_from(delta) else {
            return IntakeResult::DroppedInvalid;
        };
        let Some(role) = role else {
            return IntakeResult::DroppedNotRunning;
        };
        if world.player(local).is_none() {
            return IntakeResult::DroppedNotPlaying;
        }

        match role {
            Role::Master => {
                world.enqueue_turn(local, turn);
                IntakeResult::Queued
            }
            Role::Replica { master } => {
                let to = Recipients::Peer(master.clone());
                match transport.write_stream(to, &encode_turn(turn)) {
                    Ok(()) => IntakeResult::Forwarded,
                    Err(e) => {
                        warn!(error = %e, "turn forward failed");
                        IntakeResult::DroppedTransport
                    }
                }
            }
        }
    }

    /// Master side: decode forwarded bytes from `from` and queue every
    /// complete turn. Partial frames stay buffered for the next call.
    pub fn remote(
        &mut self,
        world: &mut World,
        from: &PlayerId,
        bytes: &[u8],
    ) -> Vec<IntakeResult> {
        let decoder = self.decoders.entry(from.clone()).or_default();
        decoder.push(bytes);

        let mut results = Vec::new();
        while let Some(decoded) = decoder.next_delta() {
            let result = match decoded.map(Turn::try_from) {
                Ok(Ok(turn)) if world.is_finalized() => {
                    if world.enqueue_turn(from, turn) {
                        IntakeResult::Queued
                    } else {
                        IntakeResult::DroppedNotPlaying
                    }
                }
                Ok(Ok(_)) => IntakeResult::DroppedNotRunning,
                Ok(Err(e)) => {
                    warn!(player = %from, delta = e.0, "turn delta out of range");
                    IntakeResult::DroppedInvalid
                }
                Err(e) => {
                    warn!(player = %from, error = %e, "malformed turn frame");
                    IntakeResult::DroppedInvalid
                }
            };
            results.push(result);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use lightcycle_sim::{PALETTE, Player};

    #[derive(Default)]
    struct RecordingTransport {
        streams: Vec<(Recipients, Vec<u8>)>,
        fail: bool,
    }

    impl Transport for RecordingTransport {
        fn send_control(
            &mut self,
            _to: Recipients,
            _message: &lightcycle_wire::ControlMessage,
        ) -> Result<(), TransportError> {
            Ok(())
        }

        fn write_stream(&mut self, to: Recipients, bytes: &[u8]) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::Closed);
            }
            self.streams.push((to, bytes.to_vec()));
            Ok(())
        }

        fn stop_discovery(&mut self) {}

        fn end_all(&mut self) {}
    }

    fn world() -> World {
        World::with_players(
            9,
            [Player::new("A", PALETTE[0]), Player::new("B", PALETTE[1])],
        )
    }

    #[test]
    fn test_master_queues_local_turns() {
        let mut world = world();
        let mut intake = TurnIntake::new();
        let mut transport = RecordingTransport::default();
        let a = PlayerId::from("A");

        let result = intake.local(&mut world, Some(&Role::Master), &a, -1, &mut transport);
        assert_eq!(result, IntakeResult::Queued);
        assert_eq!(world.player(&a).unwrap().pending_turns(), 1);
        assert!(transport.streams.is_empty());
    }

    #[test]
    fn test_replica_forwards_local_turns_to_master() {
        let mut world = world();
        let mut intake = TurnIntake::new();
        let mut transport = RecordingTransport::default();
        let role = Role::Replica {
            master: PlayerId::from("A"),
        };

        let result = intake.local(&mut world, Some(&role), &PlayerId::from("B"), 1, &mut transport);
        assert_eq!(result, IntakeResult::Forwarded);
        assert_eq!(
            transport.streams,
            vec![(Recipients::Peer(PlayerId::from("A")), b"+1".to_vec())]
        );
        // Replicas never queue locally.
        assert_eq!(world.player(&PlayerId::from("B")).unwrap().pending_turns(), 0);

        transport.fail = true;
        let result = intake.local(&mut world, Some(&role), &PlayerId::from("B"), 0, &mut transport);
        assert_eq!(result, IntakeResult::DroppedTransport);
    }

    #[test]
    fn test_local_turn_rejections() {
        let mut world = world();
        let mut intake = TurnIntake::new();
        let mut transport = RecordingTransport::default();
        let a = PlayerId::from("A");

        assert_eq!(
            intake.local(&mut world, Some(&Role::Master), &a, 2, &mut transport),
            IntakeResult::DroppedInvalid
        );
        assert_eq!(
            intake.local(&mut world, None, &a, 1, &mut transport),
            IntakeResult::DroppedNotRunning
        );
        assert_eq!(
            intake.local(&mut world, Some(&Role::Master), &PlayerId::from("Z"), 1, &mut transport),
            IntakeResult::DroppedNotPlaying
        );
    }

    #[test]
    fn test_remote_frames_split_across_reads() {
        let mut world = world();
        let mut intake = TurnIntake::new();
        let b = PlayerId::from("B");

        assert!(intake.remote(&mut world, &b, b"-").is_empty());
        assert_eq!(
            intake.remote(&mut world, &b, b"1+0+"),
            vec![IntakeResult::Queued, IntakeResult::Queued]
        );
        assert_eq!(intake.remote(&mut world, &b, b"1"), vec![IntakeResult::Queued]);
        assert_eq!(world.player(&b).unwrap().pending_turns(), 3);

        // Queue order is arrival order: -1, 0, +1.
        let outcome = world.advance(0);
        let applied: Vec<Turn> = outcome
            .applied
            .iter()
            .filter(|t| t.player_id == b)
            .map(|t| t.turn)
            .collect();
        assert_eq!(applied, vec![Turn::Left]);
    }

    #[test]
    fn test_remote_garbage_is_dropped_per_frame() {
        let mut world = world();
        let mut intake = TurnIntake::new();
        let b = PlayerId::from("B");

        let results = intake.remote(&mut world, &b, b"xx+5-1");
        assert_eq!(
            results,
            vec![
                IntakeResult::DroppedInvalid,
                IntakeResult::DroppedInvalid,
                IntakeResult::Queued
            ]
        );
        assert_eq!(
            intake.remote(&mut world, &PlayerId::from("Z"), b"+1"),
            vec![IntakeResult::DroppedNotPlaying]
        );
    }

    #[test]
    fn test_remote_turns_before_finalize_are_dropped() {
        let mut world = World::new(9);
        world.add_player(Player::new("B", PALETTE[1]));
        let mut intake = TurnIntake::new();
        assert_eq!(
            intake.remote(&mut world, &PlayerId::from("B"), b"+1"),
            vec![IntakeResult::DroppedNotRunning]
        );
    }
}
