//! Frame header implementation with zero-copy parsing.
//!
//! The `FrameHeader` is a fixed 16-byte structure serialized as raw binary
//! (Big Endian). The session adapter reads the message type without touching
//! the payload, which keeps pass-through routing after the handshake cheap.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    MessageType,
    errors::{CodecError, Result},
};

/// Fixed 16-byte frame header (Big Endian network byte order)
///
/// Fields are stored as raw byte arrays so the struct has alignment 1 and no
/// padding, which lets `zerocopy` cast untrusted bytes directly.
///
/// ```text
/// 0       4    5    6      8          12         16
/// ┌───────┬────┬────┬──────┬──────────┬──────────┐
/// │ magic │ver │rsvd│ type │ sequence │ pay size │
/// └───────┴────┴────┴──────┴──────────┴──────────┘
/// ```
///
/// # Security Properties
///
/// - **Zero-Copy Safety**: Every 16-byte pattern is a valid `FrameHeader`, so
///   casting arbitrary network bytes cannot cause undefined behavior.
///   Semantic validation (magic, version, size) happens in
///   [`FrameHeader::from_bytes`].
///
/// - **Sequence Numbers**: `sequence` counts the frames a sender has emitted
///   on a session. It is informational (logged on receipt); replay protection
///   for the handshake comes from the attestation nonce, not the header.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    magic: [u8; 4],                   // 0x49445343 ("IDSC")
    version: u8,                      // 0x01
    reserved: u8,                     // written as zero, ignored on read
    pub(crate) message_type: [u8; 2], // u16 message type
    sequence: [u8; 4],                // u32 per-sender frame counter
    pub(crate) payload_size: [u8; 4], // u32 payload length
}

impl FrameHeader {
    /// Size of the serialized header (16 bytes)
    pub const SIZE: usize = 16;

    /// Magic number: "IDSC" in ASCII (0x49445343)
    pub const MAGIC: u32 = 0x4944_5343;

    /// Current wire version
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size (1 MiB)
    ///
    /// Evidence blobs and self-descriptions are a few kilobytes at most.
    pub const MAX_PAYLOAD_SIZE: u32 = 1024 * 1024;

    /// Create a new header with the specified message type and sequence 0.
    #[must_use]
    pub fn new(message_type: MessageType) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION,
            reserved: 0,
            message_type: message_type.to_u16().to_be_bytes(),
            sequence: [0; 4],
            payload_size: [0; 4],
        }
    }

    /// Builder-style setter for the sequence number.
    #[must_use]
    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence.to_be_bytes();
        self
    }

    /// Parse header from network bytes (zero-copy, safe)
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if:
    /// - Buffer is too short (< 16 bytes)
    /// - Magic number is invalid
    /// - Wire version is unsupported
    /// - Payload size exceeds maximum
    ///
    /// The message type is NOT validated here; an unknown type is a payload
    /// level concern and surfaces from [`crate::Payload::from_frame`].
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| CodecError::FrameTooShort { expected: Self::SIZE, actual: bytes.len() })?
            .0;

        if u32::from_be_bytes(header.magic) != Self::MAGIC {
            return Err(CodecError::InvalidMagic);
        }

        if header.version != Self::VERSION {
            return Err(CodecError::UnsupportedVersion(header.version));
        }

        let payload_size = u32::from_be_bytes(header.payload_size);
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(CodecError::PayloadTooLarge {
                size: payload_size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize header to bytes
    #[must_use]
    #[allow(clippy::wrong_self_convention)]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(IntoBytes::as_bytes(self));
        arr
    }

    /// Get the magic number
    #[must_use]
    pub fn magic(&self) -> u32 {
        u32::from_be_bytes(self.magic)
    }

    /// Get the wire version
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Get the raw message type
    #[must_use]
    pub fn message_type(&self) -> u16 {
        u16::from_be_bytes(self.message_type)
    }

    /// Get the message type as an enum (if known)
    #[must_use]
    pub fn message_type_enum(&self) -> Option<MessageType> {
        MessageType::from_u16(self.message_type())
    }

    /// Get the sender's sequence number
    #[must_use]
    pub fn sequence(&self) -> u32 {
        u32::from_be_bytes(self.sequence)
    }

    /// Get the payload size
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }
}

impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("magic", &format!("{:#010x}", self.magic()))
            .field("version", &self.version())
            .field("message_type", &format!("{:#06x}", self.message_type()))
            .field("sequence", &self.sequence())
            .field("payload_size", &self.payload_size())
            .finish()
    }
}
