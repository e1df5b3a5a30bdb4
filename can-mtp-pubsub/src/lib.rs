//! Topic publish envelope carried over the `can-mtp` transport.
//!
//! A publish message is a transport payload with a tiny header:
//!
//! ```text
//! byte 0      kind (0x03 = publish)
//! bytes 1..3  topic length, little-endian u16
//! ...         topic bytes
//! next 2      payload length, little-endian u16
//! ...         payload bytes
//! ```
//!
//! The crate provides the pure codec ([`encode_publish`] /
//! [`decode_publish`]) and a [`Publish`] extension trait that encodes into
//! a transport-sized scratch buffer and hands the result to
//! [`MtpNode::send_to`]. Receivers decode inside their message callback:
//!
//! ```rust,ignore
//! use can_mtp_pubsub::{Publish, decode_publish};
//!
//! node.publish("lights/kitchen", "on")?;
//!
//! // in the receiving node's callback:
//! if let Ok(envelope) = decode_publish(bytes) {
//!     handle(envelope.topic, envelope.payload);
//! }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

use core::fmt;

use can_mtp::{BusAdapter, Clock, MtpError, MtpNode};

/// Envelope kind marker for publish messages.
pub const KIND_PUBLISH: u8 = 0x03;

/// Fixed envelope overhead: the kind byte plus two length prefixes.
pub const ENVELOPE_OVERHEAD: usize = 5;

/// A decoded publish envelope, borrowing the transport payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope<'a> {
    /// Topic bytes.
    pub topic: &'a [u8],
    /// Payload bytes.
    pub payload: &'a [u8],
}

/// Failure to encode or transmit a publish message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishError {
    /// The encoded envelope does not fit the available buffer.
    TooLarge {
        /// Bytes the envelope needs.
        needed: usize,
        /// Bytes the buffer offers.
        capacity: usize,
    },
    /// The transport rejected the send.
    Transport(MtpError),
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::TooLarge { needed, capacity } => {
                write!(f, "envelope needs {needed} bytes, buffer holds {capacity}")
            }
            PublishError::Transport(err) => write!(f, "transport: {err}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PublishError {}

/// Failure to decode a publish envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ends before the lengths it declares.
    Truncated,
    /// The leading kind byte is not a known envelope kind.
    UnknownKind(u8),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated => f.write_str("truncated envelope"),
            DecodeError::UnknownKind(kind) => write!(f, "unknown envelope kind {kind:#04x}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

/// Encode a publish envelope into `out`, returning the encoded length.
pub fn encode_publish(topic: &[u8], payload: &[u8], out: &mut [u8]) -> Result<usize, PublishError> {
    let needed = ENVELOPE_OVERHEAD + topic.len() + payload.len();
    if topic.len() > usize::from(u16::MAX)
        || payload.len() > usize::from(u16::MAX)
        || needed > out.len()
    {
        return Err(PublishError::TooLarge {
            needed,
            capacity: out.len(),
        });
    }
    out[0] = KIND_PUBLISH;
    out[1..3].copy_from_slice(&(topic.len() as u16).to_le_bytes());
    out[3..3 + topic.len()].copy_from_slice(topic);
    let at = 3 + topic.len();
    out[at..at + 2].copy_from_slice(&(payload.len() as u16).to_le_bytes());
    out[at + 2..needed].copy_from_slice(payload);
    Ok(needed)
}

/// Decode a publish envelope.
///
/// Bytes beyond the declared payload length are ignored.
pub fn decode_publish(bytes: &[u8]) -> Result<Envelope<'_>, DecodeError> {
    let (&kind, rest) = bytes.split_first().ok_or(DecodeError::Truncated)?;
    if kind != KIND_PUBLISH {
        return Err(DecodeError::UnknownKind(kind));
    }
    let (topic, rest) = take_prefixed(rest)?;
    let (payload, _) = take_prefixed(rest)?;
    Ok(Envelope { topic, payload })
}

/// Split off a little-endian u16 length prefix and that many bytes.
fn take_prefixed(bytes: &[u8]) -> Result<(&[u8], &[u8]), DecodeError> {
    if bytes.len() < 2 {
        return Err(DecodeError::Truncated);
    }
    let len = usize::from(u16::from_le_bytes([bytes[0], bytes[1]]));
    let rest = &bytes[2..];
    if rest.len() < len {
        return Err(DecodeError::Truncated);
    }
    Ok(rest.split_at(len))
}

/// Publish helpers for transport nodes.
pub trait Publish {
    /// Publish under the node's own arbitration id.
    fn publish(
        &mut self,
        topic: impl AsRef<[u8]>,
        payload: impl AsRef<[u8]>,
    ) -> Result<(), PublishError>;

    /// Publish under an explicit arbitration id.
    fn publish_to(
        &mut self,
        address: u32,
        topic: impl AsRef<[u8]>,
        payload: impl AsRef<[u8]>,
    ) -> Result<(), PublishError>;
}

impl<B, C, H, const MAX_BUFFER: usize> Publish for MtpNode<B, C, H, MAX_BUFFER>
where
    B: BusAdapter,
    C: Clock,
    H: FnMut(u32, &[u8]),
{
    fn publish(
        &mut self,
        topic: impl AsRef<[u8]>,
        payload: impl AsRef<[u8]>,
    ) -> Result<(), PublishError> {
        self.publish_to(self.address(), topic, payload)
    }

    fn publish_to(
        &mut self,
        address: u32,
        topic: impl AsRef<[u8]>,
        payload: impl AsRef<[u8]>,
    ) -> Result<(), PublishError> {
        let mut scratch = [0u8; MAX_BUFFER];
        let len = encode_publish(topic.as_ref(), payload.as_ref(), &mut scratch)?;
        self.send_to(address, &scratch[..len])
            .map_err(PublishError::Transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_expected_wire_layout() {
        let mut buf = [0u8; 16];
        let len = encode_publish(b"t", b"hi", &mut buf).unwrap();
        assert_eq!(len, 8);
        assert_eq!(
            &buf[..len],
            &[0x03, 0x01, 0x00, b't', 0x02, 0x00, b'h', b'i']
        );
    }

    #[test]
    fn roundtrips_topic_and_payload() {
        let mut buf = [0u8; 64];
        let len = encode_publish(b"sensors/temp", b"21.5", &mut buf).unwrap();
        let envelope = decode_publish(&buf[..len]).unwrap();
        assert_eq!(envelope.topic, b"sensors/temp");
        assert_eq!(envelope.payload, b"21.5");
    }

    #[test]
    fn empty_topic_and_payload_are_valid() {
        let mut buf = [0u8; 8];
        let len = encode_publish(b"", b"", &mut buf).unwrap();
        assert_eq!(len, ENVELOPE_OVERHEAD);
        let envelope = decode_publish(&buf[..len]).unwrap();
        assert!(envelope.topic.is_empty());
        assert!(envelope.payload.is_empty());
    }

    #[test]
    fn rejects_envelopes_that_do_not_fit() {
        let mut buf = [0u8; 8];
        match encode_publish(b"topic", b"payload", &mut buf) {
            Err(PublishError::TooLarge { needed, capacity }) => {
                assert_eq!(needed, 17);
                assert_eq!(capacity, 8);
            }
            other => panic!("expected TooLarge: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_kind() {
        assert_eq!(
            decode_publish(&[0x07, 0x00, 0x00, 0x00, 0x00]),
            Err(DecodeError::UnknownKind(0x07))
        );
    }

    #[test]
    fn rejects_truncated_envelopes() {
        assert_eq!(decode_publish(&[]), Err(DecodeError::Truncated));
        // Topic length declared but bytes missing.
        assert_eq!(
            decode_publish(&[0x03, 0x05, 0x00, b'a']),
            Err(DecodeError::Truncated)
        );
        // Payload length prefix missing entirely.
        assert_eq!(
            decode_publish(&[0x03, 0x01, 0x00, b'a']),
            Err(DecodeError::Truncated)
        );
        // Payload shorter than declared.
        assert_eq!(
            decode_publish(&[0x03, 0x01, 0x00, b'a', 0x02, 0x00, b'x']),
            Err(DecodeError::Truncated)
        );
    }
}
