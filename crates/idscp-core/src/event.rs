//! Inbound protocol events.
//!
//! One [`Event`] is created per inbound frame and consumed by the state
//! machine. Decoding never fails: a frame that cannot be decoded becomes an
//! ERROR-typed event carrying the decode failure, which the state machine
//! answers by failing the handshake.

use bytes::Bytes;
use idscp_proto::{
    CodecError, Frame, FrameHeader, MessageType, Payload,
    payloads::session::{ErrorCode, ErrorPayload},
};

/// A decoded inbound frame
///
/// Keeps the raw bytes next to the decoded payload: once the handshake is
/// over, frames are forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    message_type: MessageType,
    raw: Bytes,
    payload: Payload,
    decode_error: Option<CodecError>,
}

impl Event {
    /// Decode an event from a raw frame
    #[must_use]
    pub fn from_bytes(raw: Bytes) -> Self {
        match Frame::decode(&raw).and_then(|frame| Payload::from_frame(&frame)) {
            Ok(payload) => {
                Self { message_type: payload.message_type(), raw, payload, decode_error: None }
            },
            Err(err) => Self {
                message_type: MessageType::Error,
                raw,
                payload: Payload::Error(ErrorPayload {
                    code: ErrorCode::MalformedFrame,
                    message: err.to_string(),
                }),
                decode_error: Some(err),
            },
        }
    }

    /// Build an event from a payload, encoding it as a frame with sequence 0
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the payload cannot be encoded.
    pub fn from_payload(payload: Payload) -> Result<Self, CodecError> {
        let raw = payload.clone().into_frame(FrameHeader::new(payload.message_type()))?.to_bytes()?;
        Ok(Self { message_type: payload.message_type(), raw, payload, decode_error: None })
    }

    /// Type discriminator ([`MessageType::Error`] for undecodable frames)
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Raw frame bytes as received
    #[must_use]
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Decoded payload
    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Why decoding failed, for events built from undecodable frames
    #[must_use]
    pub fn decode_error(&self) -> Option<&CodecError> {
        self.decode_error.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use idscp_proto::payloads::session::{Hello, SelfDescription};

    use super::*;

    #[test]
    fn encoded_event_decodes_to_same_type_and_payload() {
        let payload = Payload::Metadata(SelfDescription { document: "connector-a".into() });
        let sent = Event::from_payload(payload.clone()).unwrap();

        let received = Event::from_bytes(sent.raw().clone());

        assert_eq!(received.message_type(), MessageType::Metadata);
        assert_eq!(received.payload(), &payload);
        assert_eq!(received.decode_error(), None);
    }

    #[test]
    fn truncated_frame_becomes_error_event() {
        let event =
            Event::from_payload(Payload::Hello(Hello { version: 1, mutual_attestation: false }))
                .unwrap();
        let truncated = event.raw().slice(..event.raw().len() - 1);

        let decoded = Event::from_bytes(truncated.clone());

        assert_eq!(decoded.message_type(), MessageType::Error);
        assert!(matches!(decoded.decode_error(), Some(CodecError::FrameTruncated { .. })));
        assert!(matches!(
            decoded.payload(),
            Payload::Error(ErrorPayload { code: ErrorCode::MalformedFrame, .. })
        ));
        assert_eq!(decoded.raw(), &truncated);
    }

    #[test]
    fn unknown_type_becomes_error_event() {
        let mut raw = Event::from_payload(Payload::Raw(Bytes::from_static(b"x")))
            .unwrap()
            .raw()
            .to_vec();
        raw[6..8].copy_from_slice(&0x7777u16.to_be_bytes());

        let decoded = Event::from_bytes(Bytes::from(raw));

        assert_eq!(decoded.decode_error(), Some(&CodecError::InvalidMessageType(0x7777)));
    }

    #[test]
    fn garbage_becomes_error_event() {
        let decoded = Event::from_bytes(Bytes::from_static(b"definitely not a frame"));
        assert_eq!(decoded.message_type(), MessageType::Error);
        assert_eq!(decoded.decode_error(), Some(&CodecError::InvalidMagic));
    }
}
