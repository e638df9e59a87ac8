//! Binary replication framing.
//!
//! | Frame        | Bytes                                   | Direction        |
//! |--------------|-----------------------------------------|------------------|
//! | Turn-forward | `+`/`-` then one ASCII digit            | replica → master |
//! | Removal      | `0x6F`, 36-byte id, x, y (39 total)     | master → replica |
//! | Position     | `2 × playerCount` bytes of (x, y) pairs | master → replica |
//!
//! Position frames carry no tag: a frame whose first byte is not `0x6F` is a
//! position frame and that byte is already its first x coordinate. This is
//! kept for interoperability; a future revision should tag every frame.

use std::collections::VecDeque;

use lightcycle_sim::{Cell, PlayerId, Turn};

use crate::WireError;

/// First byte of a removal frame.
pub const REMOVAL_TAG: u8 = 0x6F;

/// Byte length of a player id on the wire (hyphenated UUID).
pub const ID_LEN: usize = 36;

/// Total removal frame length, tag included.
pub const REMOVAL_FRAME_LEN: usize = 1 + ID_LEN + 2;

/// Turn-forward frame length.
pub const TURN_FRAME_LEN: usize = 2;

// ============================================================================
// Turn-forward
// ============================================================================

/// Encode a turn as sign + digit: `-1`, `+0`, `+1`.
pub fn encode_turn(turn: Turn) -> [u8; TURN_FRAME_LEN] {
    let delta = turn.delta();
    let sign = if delta < 0 { b'-' } else { b'+' };
    [sign, b'0' + delta.unsigned_abs()]
}

/// Decode a sign + digit frame back to its signed delta.
pub fn decode_turn(frame: [u8; TURN_FRAME_LEN]) -> Result<i8, WireError> {
    let [sign, digit] = frame;
    if !digit.is_ascii_digit() {
        return Err(WireError::MalformedTurn(frame));
    }
    let magnitude = (digit - b'0') as i8;
    match sign {
        b'+' => Ok(magnitude),
        b'-' => Ok(-magnitude),
        _ => Err(WireError::MalformedTurn(frame)),
    }
}

/// Master-side reassembly of one peer's turn-forward stream.
#[derive(Debug, Default)]
pub struct TurnDecoder {
    buffer: VecDeque<u8>,
}

impl TurnDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes);
    }

    /// Next complete frame, or `None` while fewer than two bytes are buffered.
    /// A malformed frame is consumed and reported so the stream keeps moving.
    pub fn next_delta(&mut self) -> Option<Result<i8, WireError>> {
        if self.buffer.len() < TURN_FRAME_LEN {
            return None;
        }
        let sign = self.buffer.pop_front()?;
        let digit = self.buffer.pop_front()?;
        Some(decode_turn([sign, digit]))
    }
}

// ============================================================================
// Replication frames
// ============================================================================

/// A decoded master → replica frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationFrame {
    /// One head per living player, canonical order.
    Position { coords: Vec<Cell> },
    Removal { player_id: PlayerId, pos: Cell },
}

impl ReplicationFrame {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        match self {
            Self::Position { coords } => encode_positions(coords),
            Self::Removal { player_id, pos } => encode_removal(player_id, *pos),
        }
    }
}

fn coord_bytes(cell: Cell) -> Result<[u8; 2], WireError> {
    match (u8::try_from(cell.x), u8::try_from(cell.y)) {
        (Ok(x), Ok(y)) => Ok([x, y]),
        _ => Err(WireError::CoordinateOutOfRange {
            x: cell.x,
            y: cell.y,
        }),
    }
}

/// Encode a position frame: `(x, y)` pairs, no tag.
pub fn encode_positions(heads: &[Cell]) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::with_capacity(2 * heads.len());
    for &head in heads {
        out.extend_from_slice(&coord_bytes(head)?);
    }
    if out.first() == Some(&REMOVAL_TAG) {
        return Err(WireError::AmbiguousPosition);
    }
    Ok(out)
}

/// Encode a removal frame: tag, 36-byte id, x, y.
pub fn encode_removal(player_id: &PlayerId, pos: Cell) -> Result<Vec<u8>, WireError> {
    let id = player_id.as_str().as_bytes();
    if id.len() != ID_LEN {
        return Err(WireError::IdLength(id.len()));
    }
    let mut out = Vec::with_capacity(REMOVAL_FRAME_LEN);
    out.push(REMOVAL_TAG);
    out.extend_from_slice(id);
    out.extend_from_slice(&coord_bytes(pos)?);
    Ok(out)
}

/// Replica-side parser for the master's byte stream.
///
/// Bytes are pushed as they arrive; [`FrameDecoder::next_frame`] yields a
/// frame only once it is complete, so a caller simply waits for more input
/// whenever it returns `Ok(None)`.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: VecDeque<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes);
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Pop the next complete frame.
    ///
    /// `player_count` is the number of living players, which fixes the length
    /// of a position frame. Malformed frames are consumed before the error is
    /// returned.
    pub fn next_frame(
        &mut self,
        player_count: usize,
    ) -> Result<Option<ReplicationFrame>, WireError> {
        let Some(&first) = self.buffer.front() else {
            return Ok(None);
        };

        if first == REMOVAL_TAG {
            if self.buffer.len() < REMOVAL_FRAME_LEN {
                return Ok(None);
            }
            let frame: Vec<u8> = self.buffer.drain(..REMOVAL_FRAME_LEN).collect();
            let id = std::str::from_utf8(&frame[1..=ID_LEN]).map_err(|_| WireError::InvalidId)?;
            let pos = Cell::from((frame[ID_LEN + 1], frame[ID_LEN + 2]));
            return Ok(Some(ReplicationFrame::Removal {
                player_id: PlayerId::from(id),
                pos,
            }));
        }

        if player_count == 0 {
            self.buffer.pop_front();
            return Err(WireError::NoPlayers);
        }

        let len = 2 * player_count;
        if self.buffer.len() < len {
            return Ok(None);
        }
        let bytes: Vec<u8> = self.buffer.drain(..len).collect();
        let coords = bytes
            .chunks_exact(2)
            .map(|pair| Cell::from((pair[0], pair[1])))
            .collect();
        Ok(Some(ReplicationFrame::Position { coords }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UUID: &str = "11111111-1111-1111-1111-111111111111";

    #[test]
    fn test_turn_encoding() {
        assert_eq!(&encode_turn(Turn::Left), b"-1");
        assert_eq!(&encode_turn(Turn::Straight), b"+0");
        assert_eq!(&encode_turn(Turn::Right), b"+1");

        assert_eq!(decode_turn(*b"-1").unwrap(), -1);
        assert_eq!(decode_turn(*b"+0").unwrap(), 0);
        assert_eq!(decode_turn(*b"+1").unwrap(), 1);
    }

    #[test]
    fn test_malformed_turn_rejected() {
        assert!(matches!(
            decode_turn(*b"x1"),
            Err(WireError::MalformedTurn(_))
        ));
        assert!(matches!(
            decode_turn(*b"+a"),
            Err(WireError::MalformedTurn(_))
        ));
    }

    #[test]
    fn test_turn_decoder_reassembles_split_frames() {
        let mut decoder = TurnDecoder::new();
        decoder.push(b"-");
        assert!(decoder.next_delta().is_none());
        decoder.push(b"1+0?1+1");

        assert_eq!(decoder.next_delta().unwrap().unwrap(), -1);
        assert_eq!(decoder.next_delta().unwrap().unwrap(), 0);
        assert!(decoder.next_delta().unwrap().is_err());
        assert_eq!(decoder.next_delta().unwrap().unwrap(), 1);
        assert!(decoder.next_delta().is_none());
    }

    #[test]
    fn test_removal_frame_roundtrip() {
        let id = PlayerId::from(UUID);
        let bytes = encode_removal(&id, Cell::new(5, 7)).unwrap();
        assert_eq!(bytes.len(), REMOVAL_FRAME_LEN);
        assert_eq!(bytes[0], REMOVAL_TAG);

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);
        let frame = decoder.next_frame(3).unwrap().unwrap();
        assert_eq!(
            frame,
            ReplicationFrame::Removal {
                player_id: id,
                pos: Cell::new(5, 7)
            }
        );
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_position_frame_roundtrip() {
        let coords = vec![Cell::new(1, 1), Cell::new(2, 3), Cell::new(0, 9)];
        let bytes = encode_positions(&coords).unwrap();
        assert_eq!(bytes, vec![1, 1, 2, 3, 0, 9]);

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);
        assert_eq!(
            decoder.next_frame(3).unwrap(),
            Some(ReplicationFrame::Position { coords })
        );
    }

    #[test]
    fn test_untagged_four_bytes_decode_as_two_heads() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&[3, 4, 10, 2]);
        assert_eq!(
            decoder.next_frame(2).unwrap(),
            Some(ReplicationFrame::Position {
                coords: vec![Cell::new(3, 4), Cell::new(10, 2)]
            })
        );
    }

    #[test]
    fn test_removal_then_positions_in_one_stream() {
        let mut stream = encode_removal(&PlayerId::from(UUID), Cell::new(9, 9)).unwrap();
        stream.extend(encode_positions(&[Cell::new(4, 4), Cell::new(6, 6)]).unwrap());

        let mut decoder = FrameDecoder::new();
        // Deliver one byte at a time.
        let mut frames = Vec::new();
        for byte in stream {
            decoder.push(&[byte]);
            let count = if frames.is_empty() { 3 } else { 2 };
            if let Some(frame) = decoder.next_frame(count).unwrap() {
                frames.push(frame);
            }
        }

        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], ReplicationFrame::Removal { .. }));
        assert!(matches!(frames[1], ReplicationFrame::Position { .. }));
    }

    #[test]
    fn test_partial_removal_waits_for_more_bytes() {
        let bytes = encode_removal(&PlayerId::from(UUID), Cell::new(1, 2)).unwrap();
        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes[..20]);
        assert_eq!(decoder.next_frame(2).unwrap(), None);
        decoder.push(&bytes[20..]);
        assert!(decoder.next_frame(2).unwrap().is_some());
    }

    #[test]
    fn test_removal_id_must_be_36_bytes() {
        let err = encode_removal(&PlayerId::from("A"), Cell::new(1, 1)).unwrap_err();
        assert!(matches!(err, WireError::IdLength(1)));
    }

    #[test]
    fn test_coordinates_must_fit_a_byte() {
        let err = encode_positions(&[Cell::new(-1, 3)]).unwrap_err();
        assert!(matches!(err, WireError::CoordinateOutOfRange { x: -1, y: 3 }));
        let err = encode_positions(&[Cell::new(300, 3)]).unwrap_err();
        assert!(matches!(err, WireError::CoordinateOutOfRange { .. }));
    }

    #[test]
    fn test_position_frame_may_not_start_with_tag() {
        let err = encode_positions(&[Cell::new(i32::from(REMOVAL_TAG), 3)]).unwrap_err();
        assert!(matches!(err, WireError::AmbiguousPosition));
    }

    #[test]
    fn test_invalid_utf8_id_is_consumed() {
        let mut bytes = vec![REMOVAL_TAG];
        bytes.extend(std::iter::repeat_n(0xFF, ID_LEN));
        bytes.extend([1, 1, 2, 2]);

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);
        assert!(matches!(decoder.next_frame(1), Err(WireError::InvalidId)));
        // Stream resumes at the next frame.
        assert_eq!(
            decoder.next_frame(1).unwrap(),
            Some(ReplicationFrame::Position {
                coords: vec![Cell::new(1, 1)]
            })
        );
    }
}
