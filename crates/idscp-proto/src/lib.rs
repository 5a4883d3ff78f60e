//! # IDSCP Protocol: Wire Format
//!
//! This crate implements the binary framing layer for the IDSCP attested
//! handshake between two connectors.
//!
//! ## Protocol Design
//!
//! Every message on the channel is a single frame:
//! - **FrameHeader**: 16 bytes of raw binary (Big Endian), parsed zero-copy
//! - **Payload**: CBOR-encoded structured data, or verbatim bytes for
//!   [`MessageType::Raw`]
//!
//! The header's message type is both the wire tag and the dispatch key of the
//! handshake state machine in `idscp-core`. Payloads never carry their own
//! variant tag, so a frame cannot claim one type in the header and another in
//! the body.
//!
//! ## Security Properties
//!
//! - **No Unsafe Deserialization**: Header parsing uses `zerocopy` with
//!   compile-time layout verification.
//! - **Size Limits**: Payloads are capped at [`FrameHeader::MAX_PAYLOAD_SIZE`]
//!   before any allocation happens. Handshake messages are small; anything
//!   larger is treated as hostile.
//! - **Explicit Validation**: All parsing functions return `Result`. There is
//!   no unchecked fast path.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod frame;
pub mod header;
pub mod message_type;
pub mod payloads;

pub use errors::{CodecError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use message_type::MessageType;
pub use payloads::Payload;
