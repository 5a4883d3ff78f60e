//! Error types for the handshake core.
//!
//! - [`HandshakeError`]: why a handshake failed. Produced inside the state
//!   machine and turned into the ERROR state plus at most one reply frame; it
//!   never crosses [`crate::machine::ProtocolMachine::feed_event`].
//! - [`SessionError`]: returned to callers waiting on a session.
//!
//! Attestation failures are not errors. They are reported as
//! [`crate::attestation::FailureReason`] inside a
//! [`crate::attestation::RatResult`].

use std::time::Duration;

use idscp_proto::{
    CodecError, MessageType,
    payloads::session::{ErrorCode, ErrorPayload},
};
use thiserror::Error;

use crate::{attestation::FailureReason, machine::ProtocolState};

/// Reasons a handshake ends in the ERROR state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// Message type not expected in the current state
    #[error("unexpected {message_type:?} in state {state:?}")]
    UnexpectedMessage {
        /// State when the message arrived
        state: ProtocolState,
        /// Type of the offending message
        message_type: MessageType,
    },

    /// Peer speaks a handshake version we do not
    #[error("unsupported handshake version: {0}")]
    UnsupportedVersion(u8),

    /// Inbound frame could not be decoded
    #[error("malformed frame: {0}")]
    MalformedFrame(CodecError),

    /// Peer reported an error
    #[error("peer error {code:?}: {message}")]
    PeerError {
        /// Code sent by the peer
        code: ErrorCode,
        /// Message sent by the peer
        message: String,
    },

    /// The peer's evidence did not verify
    #[error("peer attestation failed: {0}")]
    AttestationFailed(FailureReason),

    /// We could not produce evidence for the peer's challenge
    #[error("local attestation failed: {0}")]
    QuoteFailed(FailureReason),

    /// The peer rejected our evidence
    #[error("peer rejected our attestation: {}", .reason.as_deref().unwrap_or("no reason given"))]
    PeerRejected {
        /// Reason code sent by the peer
        reason: Option<String>,
    },

    /// Handshake did not complete within timeout
    #[error("handshake timeout after {elapsed:?}")]
    Timeout {
        /// How long the handshake had been running
        elapsed: Duration,
    },

    /// Operation not valid in the current state
    #[error("cannot {operation} in state {state:?}")]
    InvalidState {
        /// Current state
        state: ProtocolState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Outbound message could not be encoded
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl HandshakeError {
    /// Whether the failure was reported by the peer
    ///
    /// Peer-reported failures are never answered.
    #[must_use]
    pub fn is_peer_reported(&self) -> bool {
        matches!(self, Self::PeerError { .. } | Self::PeerRejected { .. })
    }

    /// Error frame payload to send for a locally detected failure
    ///
    /// Returns `None` for peer-reported failures and for failed verification
    /// of the peer, which is answered with a failing attestation result
    /// instead.
    #[must_use]
    pub fn error_payload(&self) -> Option<ErrorPayload> {
        let code = match self {
            Self::UnexpectedMessage { .. } | Self::InvalidState { .. } | Self::Codec(_) => {
                ErrorCode::ProtocolViolation
            },
            Self::UnsupportedVersion(_) => ErrorCode::UnsupportedVersion,
            Self::MalformedFrame(_) => ErrorCode::MalformedFrame,
            Self::QuoteFailed(_) => ErrorCode::AttestationFailed,
            Self::Timeout { .. } => ErrorCode::HandshakeTimeout,
            Self::AttestationFailed(_) | Self::PeerError { .. } | Self::PeerRejected { .. } => {
                return None;
            },
        };

        Some(ErrorPayload { code, message: self.to_string() })
    }
}

/// Errors returned to callers of the session adapter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Handshake did not reach a terminal state in time
    #[error("handshake still in state {state:?} after {waited:?}")]
    Timeout {
        /// State when the wait gave up
        state: ProtocolState,
        /// How long the caller waited
        waited: Duration,
    },

    /// Session closed before the handshake finished
    #[error("session closed")]
    Closed,
}
