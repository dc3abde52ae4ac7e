//! Wire codec: frames are flat sequences of little-endian signed 32-bit
//! integers. Field 0 of every frame is the message kind; the remaining
//! fields are kind-specific (see [`MessageKind`]).
//!
//! There is deliberately no length prefix and no version byte, matching the
//! original implementation this protocol was distilled from. A single
//! stream read is assumed to deliver exactly one frame; see the doc comment
//! on [`decode`] for the caveat this implies.

use std::fmt;

/// The four message kinds that appear on the wire. The discriminant is the
/// value carried in field 0 of every frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageKind {
    Prepare = 0,
    PrepareAck = 1,
    Accept = 2,
    AcceptAck = 3,
}

impl MessageKind {
    /// The number of `i32` fields that must follow the kind tag for a
    /// well-formed frame of this kind.
    #[must_use]
    pub fn field_count(self) -> usize {
        match self {
            MessageKind::Prepare | MessageKind::Accept => 3,
            MessageKind::PrepareAck => 3,
            MessageKind::AcceptAck => 2,
        }
    }

    #[must_use]
    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(MessageKind::Prepare),
            1 => Some(MessageKind::PrepareAck),
            2 => Some(MessageKind::Accept),
            3 => Some(MessageKind::AcceptAck),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Prepare => "prepare",
            MessageKind::PrepareAck => "prepare_ack",
            MessageKind::Accept => "accept",
            MessageKind::AcceptAck => "accept_ack",
        };
        f.write_str(name)
    }
}

/// A decoded frame: the message kind plus its kind-specific payload fields.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    pub kind: MessageKind,
    pub fields: Vec<i32>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DecodeError {
    /// The byte slice length wasn't a multiple of 4.
    TrailingBytes,
    /// The byte slice was empty (no kind tag present).
    Empty,
    /// Field 0 didn't correspond to a known message kind.
    UnknownKind(i32),
    /// The frame had fewer fields than its kind requires.
    TooFewFields { kind: MessageKind, expected: usize, got: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::TrailingBytes => write!(f, "trailing partial 4-byte group"),
            DecodeError::Empty => write!(f, "empty frame"),
            DecodeError::UnknownKind(tag) => write!(f, "unknown message kind tag {tag}"),
            DecodeError::TooFewFields { kind, expected, got } => write!(
                f,
                "frame of kind {kind} requires {expected} fields, got {got}"
            ),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Serialize a sequence of signed 32-bit integers into their little-endian
/// byte representation. The output is always exactly `4 * xs.len()` bytes.
#[must_use]
pub fn serialize(xs: &[i32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(xs.len() * 4);
    for &x in xs {
        bytes.extend_from_slice(&x.to_le_bytes());
    }
    bytes
}

/// Deserialize a byte slice into the sequence of little-endian signed
/// 32-bit integers it encodes. Consumes the slice until exhausted; a
/// trailing partial 4-byte group is a decode failure.
pub fn deserialize(bytes: &[u8]) -> Result<Vec<i32>, DecodeError> {
    if bytes.len() % 4 != 0 {
        return Err(DecodeError::TrailingBytes);
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| {
            let array: [u8; 4] = chunk.try_into().expect("chunks_exact(4) yields 4 bytes");
            i32::from_le_bytes(array)
        })
        .collect())
}

/// Decode a raw frame (as read off the wire) into a [`Frame`]: deserialize
/// the integers, read the kind tag from field 0, and check that enough
/// fields follow for that kind.
///
/// Note on framing: this assumes the byte slice passed in is exactly one
/// logical frame. Because the wire format has no length prefix, a stream
/// transport that coalesces or splits writes across reads can hand this
/// function a concatenation of multiple frames or a partial frame; both
/// show up as [`DecodeError`]s or as extra/missing trailing fields rather
/// than as a clean higher-level error. See `DESIGN.md` for why this
/// implementation doesn't add a length prefix.
pub fn decode(bytes: &[u8]) -> Result<Frame, DecodeError> {
    let ints = deserialize(bytes)?;
    let (&tag, fields) = ints.split_first().ok_or(DecodeError::Empty)?;
    let kind = MessageKind::from_tag(tag).ok_or(DecodeError::UnknownKind(tag))?;
    let expected = kind.field_count();
    if fields.len() < expected {
        return Err(DecodeError::TooFewFields {
            kind,
            expected,
            got: fields.len(),
        });
    }
    Ok(Frame {
        kind,
        fields: fields.to_vec(),
    })
}

/// Encode a frame for the wire: the kind tag followed by its fields.
#[must_use]
pub fn encode(kind: MessageKind, fields: &[i32]) -> Vec<u8> {
    let mut ints = Vec::with_capacity(fields.len() + 1);
    ints.push(kind as i32);
    ints.extend_from_slice(fields);
    serialize(&ints)
}

#[cfg(test)]
mod tests {
    use super::{decode, deserialize, serialize, DecodeError, MessageKind};

    #[test]
    fn round_trip_example() {
        // serialize(PREPARE, 42, 7, 0x41) = the bytes from scenario E in the spec.
        let bytes = serialize(&[0, 42, 7, 0x41]);
        assert_eq!(
            bytes,
            vec![0, 0, 0, 0, 42, 0, 0, 0, 7, 0, 0, 0, 65, 0, 0, 0]
        );
        assert_eq!(deserialize(&bytes).unwrap(), vec![0, 42, 7, 65]);
    }

    #[test]
    fn serialize_length_is_four_times_input_len() {
        let xs = [1, -1, i32::MIN, i32::MAX, 0];
        assert_eq!(serialize(&xs).len(), 4 * xs.len());
    }

    #[test]
    fn round_trip_arbitrary() {
        let xs = vec![0, -1, i32::MIN, i32::MAX, 12345, -98765];
        assert_eq!(deserialize(&serialize(&xs)).unwrap(), xs);
    }

    #[test]
    fn trailing_partial_group_is_an_error() {
        let mut bytes = serialize(&[1, 2]);
        bytes.push(0); // one stray byte
        assert_eq!(deserialize(&bytes), Err(DecodeError::TrailingBytes));
    }

    #[test]
    fn empty_frame_is_an_error() {
        assert_eq!(decode(&[]), Err(DecodeError::Empty));
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let bytes = serialize(&[99]);
        assert_eq!(decode(&bytes), Err(DecodeError::UnknownKind(99)));
    }

    #[test]
    fn too_few_fields_is_an_error() {
        // PREPARE needs 3 fields; only supply 1.
        let bytes = serialize(&[MessageKind::Prepare as i32, 7]);
        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::TooFewFields {
                kind: MessageKind::Prepare,
                expected: 3,
                got: 1,
            })
        ));
    }

    #[test]
    fn decode_accept_ack() {
        let bytes = serialize(&[MessageKind::AcceptAck as i32, 3, 9]);
        let frame = decode(&bytes).unwrap();
        assert_eq!(frame.kind, MessageKind::AcceptAck);
        assert_eq!(frame.fields, vec![3, 9]);
    }
}
