//! Frame type combining header and payload.
//!
//! A `Frame` is the unit delivered by the transport:
//! - 16-byte raw binary header (Big Endian)
//! - Variable-length payload bytes (already encoded)
//!
//! This is a pure data holder. For typed access see `Payload::into_frame()`
//! and `Payload::from_frame()`.

use bytes::{BufMut, Bytes};

use crate::{
    FrameHeader,
    errors::{CodecError, Result},
};

/// Complete protocol frame
///
/// Layout on the wire:
/// `[FrameHeader: 16 bytes] + [payload: variable bytes]`
///
/// # Invariants
///
/// - **Size Consistency**: `payload.len()` matches `header.payload_size()`.
///   Enforced by [`Frame::new`] and verified by [`Frame::decode`].
///
/// - **Size Limit**: `payload.len()` never exceeds
///   [`FrameHeader::MAX_PAYLOAD_SIZE`] on the wire. Oversized frames are
///   rejected during encoding and decoding.
///
/// # Security
///
/// A decoded `Frame` is only structurally valid. Nothing about it is trusted
/// until the handshake has attested the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header (16 bytes)
    pub header: FrameHeader,

    /// Raw payload bytes (CBOR, or verbatim for raw frames)
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame with automatic payload_size calculation
    ///
    /// The size limit is not checked here; oversized frames are rejected by
    /// [`Frame::encode`].
    #[must_use]
    pub fn new(mut header: FrameHeader, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();

        #[allow(clippy::cast_possible_truncation)]
        {
            header.payload_size = (payload.len() as u32).to_be_bytes();
        }

        Self { header, payload }
    }

    /// Total encoded length (header + payload)
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        FrameHeader::SIZE + self.payload.len()
    }

    /// Encode frame into buffer
    ///
    /// Writes: `[header (16 bytes)] + [payload (variable)]`
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::PayloadTooLarge`] if payload exceeds
    /// [`FrameHeader::MAX_PAYLOAD_SIZE`].
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        if self.payload.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(CodecError::PayloadTooLarge {
                size: self.payload.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Encode into a freshly allocated buffer.
    ///
    /// # Errors
    ///
    /// Same as [`Frame::encode`].
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Decode frame from wire format
    ///
    /// Returns a Frame with raw payload bytes; use `Payload::from_frame()` for
    /// the typed payload.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Header parsing fails (invalid magic, version, or size limits)
    /// - Payload is truncated (fewer bytes than header claims)
    ///
    /// Trailing bytes after the claimed payload are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = FrameHeader::from_bytes(bytes)?;

        let payload_size = header.payload_size() as usize;
        let total_size = FrameHeader::SIZE + payload_size;

        if bytes.len() < total_size {
            return Err(CodecError::FrameTruncated {
                expected: payload_size,
                actual: bytes.len().saturating_sub(FrameHeader::SIZE),
            });
        }

        let payload = Bytes::copy_from_slice(&bytes[FrameHeader::SIZE..total_size]);

        Ok(Self { header: *header, payload })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::MessageType;

    impl Arbitrary for Frame {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
            (any::<FrameHeader>(), prop::collection::vec(any::<u8>(), 0..512))
                .prop_map(|(header, payload_bytes)| Frame::new(header, payload_bytes))
                .boxed()
        }
    }

    proptest! {
        #[test]
        fn frame_round_trip(frame in any::<Frame>()) {
            let wire = frame.to_bytes().expect("should encode");
            prop_assert_eq!(wire.len(), frame.encoded_len());

            let parsed = Frame::decode(&wire).expect("should decode");
            prop_assert_eq!(frame, parsed);
        }

        #[test]
        fn frame_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
            let _ = Frame::decode(&bytes);
        }
    }

    #[test]
    fn frame_with_payload() {
        let payload_bytes = vec![1, 2, 3, 4];
        let frame = Frame::new(FrameHeader::new(MessageType::Raw), payload_bytes.clone());

        assert_eq!(frame.header.payload_size(), payload_bytes.len() as u32);

        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("should encode");

        let parsed = Frame::decode(&wire).expect("should decode");
        assert_eq!(frame.payload, parsed.payload);
        assert_eq!(parsed.header.message_type_enum(), Some(MessageType::Raw));
    }

    #[test]
    fn reject_truncated_frame() {
        let frame = Frame::new(FrameHeader::new(MessageType::Raw), vec![0u8; 100]);
        let header_bytes = frame.header.to_bytes();

        let result = Frame::decode(&header_bytes);
        assert_eq!(result, Err(CodecError::FrameTruncated { expected: 100, actual: 0 }));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let frame = Frame::new(FrameHeader::new(MessageType::Raw), vec![9, 9]);
        let mut wire = frame.to_bytes().expect("should encode").to_vec();
        wire.extend_from_slice(&[0xAA, 0xBB]);

        let parsed = Frame::decode(&wire).expect("should decode");
        assert_eq!(&parsed.payload[..], &[9, 9]);
    }

    #[test]
    fn reject_oversized_payload_on_encode() {
        let frame = Frame::new(
            FrameHeader::new(MessageType::Raw),
            vec![0u8; FrameHeader::MAX_PAYLOAD_SIZE as usize + 1],
        );

        let mut wire = Vec::new();
        assert!(matches!(frame.encode(&mut wire), Err(CodecError::PayloadTooLarge { .. })));
    }
}
