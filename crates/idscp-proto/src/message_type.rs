//! Message types carried in the frame header.
//!
//! The message type identifies how the payload of a frame is interpreted. It
//! doubles as the dispatch key of the handshake state machine: every
//! handshake state expects exactly one message type, and anything else fails
//! the handshake.
//!
//! # Ranges
//!
//! - `0x0001-0x000F`: Session start
//! - `0x0010-0x001F`: Remote attestation
//! - `0x0020-0x002F`: Self-description exchange
//! - `0x0030-0x003F`: Application data (pass-through)
//! - `0x00FF`: Error

use serde_repr::{Deserialize_repr, Serialize_repr};

/// Frame message types
///
/// Serialized as a Big Endian `u16` in the frame header. The `#[repr(u16)]`
/// keeps numeric values stable for wire compatibility.
///
/// # Security
///
/// - **Unknown Types**: [`MessageType::from_u16`] returns `None` for unknown
///   values rather than panicking. Frames with unknown types are rejected
///   with [`CodecError::InvalidMessageType`](crate::CodecError::InvalidMessageType)
///   and end the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u16)]
pub enum MessageType {
    /// Handshake start, sent by the initiating connector
    Hello = 0x0001,

    /// Attestation challenge (nonce, attestation type, property mask)
    AttestationChallenge = 0x0010,
    /// Evidence produced over a challenge nonce
    AttestationResponse = 0x0011,
    /// Verdict on the peer's evidence
    AttestationResult = 0x0012,

    /// Self-description document
    Metadata = 0x0020,

    /// Application data once the handshake is over
    Raw = 0x0030,

    /// Error frame
    Error = 0x00FF,
}

impl MessageType {
    /// Every known message type, in wire order
    pub const ALL: [Self; 7] = [
        Self::Hello,
        Self::AttestationChallenge,
        Self::AttestationResponse,
        Self::AttestationResult,
        Self::Metadata,
        Self::Raw,
        Self::Error,
    ];

    /// Convert to raw u16 value
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Convert from raw u16 value
    ///
    /// Total over all `u16` values; returns `None` for unknown types so the
    /// caller can reject the frame explicitly.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Hello),
            0x0010 => Some(Self::AttestationChallenge),
            0x0011 => Some(Self::AttestationResponse),
            0x0012 => Some(Self::AttestationResult),
            0x0020 => Some(Self::Metadata),
            0x0030 => Some(Self::Raw),
            0x00FF => Some(Self::Error),
            _ => None,
        }
    }

    /// Whether this message belongs to the attestation exchange
    #[must_use]
    pub const fn is_attestation(self) -> bool {
        matches!(
            self,
            Self::AttestationChallenge | Self::AttestationResponse | Self::AttestationResult
        )
    }
}
