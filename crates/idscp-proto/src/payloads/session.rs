//! Session payload types: handshake start, self-description and errors.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Handshake start, sent by the initiating connector
///
/// The acceptor answers with an
/// [`AttestationChallenge`](super::attestation::AttestationChallenge).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Handshake protocol version
    pub version: u8,
    /// Initiator asks to attest the acceptor as well
    pub mutual_attestation: bool,
}

impl Hello {
    /// The only handshake version spoken by this implementation
    pub const VERSION: u8 = 1;
}

/// Self-description exchanged after attestation succeeds
///
/// The document is opaque to the handshake; its schema belongs to the
/// connector's metadata model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfDescription {
    /// Serialized self-description document
    pub document: String,
}

/// Error codes carried in [`ErrorPayload`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u16)]
pub enum ErrorCode {
    /// Message not expected in the current handshake state
    ProtocolViolation = 0x0001,
    /// Handshake version not supported
    UnsupportedVersion = 0x0002,
    /// Remote attestation failed
    AttestationFailed = 0x0003,
    /// Handshake did not complete in time
    HandshakeTimeout = 0x0004,
    /// Frame could not be decoded
    MalformedFrame = 0x0005,
}

/// Error frame payload
///
/// Sent once when a connector abandons the handshake. The message is meant
/// for logs on the other side and must not carry internal details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
}
