//! Frame payloads.
//!
//! Each message type has a corresponding payload type. Structured payloads
//! are CBOR-encoded; [`Payload::Raw`] carries application bytes verbatim.
//!
//! # Security Properties
//!
//! - **Bounded Deserialization**: Payloads are size-checked by the frame
//!   layer before CBOR parsing begins.
//! - **Explicit Schema**: Each payload has an explicit Rust struct. There is
//!   no generic map parsing that could accept unexpected shapes.

pub mod attestation;
pub mod session;

use bytes::{BufMut, Bytes};

use crate::{
    Frame, FrameHeader, MessageType,
    errors::{CodecError, Result},
};

/// All possible frame payloads
///
/// The payload type is determined by the [`MessageType`] in the frame header,
/// so only the inner struct is serialized (no variant tag in CBOR).
///
/// # Invariants
///
/// - **Type Uniqueness**: Each variant corresponds to exactly one
///   `MessageType`, returned by [`Payload::message_type`].
/// - **Serialization Consistency**: Encoding a payload and decoding it with
///   the same message type produces an equal value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Handshake start
    Hello(session::Hello),
    /// Attestation challenge
    AttestationChallenge(attestation::AttestationChallenge),
    /// Evidence over a challenge nonce
    AttestationResponse(attestation::AttestationResponse),
    /// Verdict on the peer's evidence
    AttestationResult(attestation::AttestationResult),
    /// Self-description document
    Metadata(session::SelfDescription),
    /// Application bytes, never interpreted
    Raw(Bytes),
    /// Error report
    Error(session::ErrorPayload),
}

fn to_cbor<T: serde::Serialize>(value: &T, dst: &mut impl BufMut) -> Result<()> {
    ciborium::ser::into_writer(value, dst.writer())
        .map_err(|e| CodecError::CborEncode(e.to_string()))
}

fn from_cbor<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| CodecError::CborDecode(e.to_string()))
}

impl Payload {
    /// Get the message type for this payload variant
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::Hello(_) => MessageType::Hello,
            Self::AttestationChallenge(_) => MessageType::AttestationChallenge,
            Self::AttestationResponse(_) => MessageType::AttestationResponse,
            Self::AttestationResult(_) => MessageType::AttestationResult,
            Self::Metadata(_) => MessageType::Metadata,
            Self::Raw(_) => MessageType::Raw,
            Self::Error(_) => MessageType::Error,
        }
    }

    /// Encode payload to buffer
    ///
    /// Serializes only the inner value, NOT the variant tag.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CborEncode`] if serialization fails. The size
    /// limit is enforced later by [`Frame::encode`].
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        match self {
            Self::Hello(inner) => to_cbor(inner, dst),
            Self::AttestationChallenge(inner) => to_cbor(inner, dst),
            Self::AttestationResponse(inner) => to_cbor(inner, dst),
            Self::AttestationResult(inner) => to_cbor(inner, dst),
            Self::Metadata(inner) => to_cbor(inner, dst),
            Self::Raw(bytes) => {
                dst.put_slice(bytes);
                Ok(())
            },
            Self::Error(inner) => to_cbor(inner, dst),
        }
    }

    /// Decode payload bytes for a known message type
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CborDecode`] if the bytes are not a valid
    /// encoding of the payload for `message_type`.
    pub fn decode(message_type: MessageType, bytes: &[u8]) -> Result<Self> {
        let payload = match message_type {
            MessageType::Hello => Self::Hello(from_cbor(bytes)?),
            MessageType::AttestationChallenge => Self::AttestationChallenge(from_cbor(bytes)?),
            MessageType::AttestationResponse => Self::AttestationResponse(from_cbor(bytes)?),
            MessageType::AttestationResult => Self::AttestationResult(from_cbor(bytes)?),
            MessageType::Metadata => Self::Metadata(from_cbor(bytes)?),
            MessageType::Raw => Self::Raw(Bytes::copy_from_slice(bytes)),
            MessageType::Error => Self::Error(from_cbor(bytes)?),
        };

        Ok(payload)
    }

    /// Convert payload into a frame
    ///
    /// Encodes the payload, sets the message type in the header and lets
    /// [`Frame::new`] fill in the payload size.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CborEncode`] if serialization fails
    pub fn into_frame(self, mut header: FrameHeader) -> Result<Frame> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        header.message_type = self.message_type().to_u16().to_be_bytes();
        Ok(Frame::new(header, buf))
    }

    /// Parse payload from a frame
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The header's message type is unknown
    /// - The payload does not decode for that message type
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let message_type = frame
            .header
            .message_type_enum()
            .ok_or(CodecError::InvalidMessageType(frame.header.message_type()))?;
        Self::decode(message_type, &frame.payload)
    }
}
