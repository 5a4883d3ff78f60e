//! Exhaustive positive space fuzzer for frame encoding/decoding
//!
//! Where `event_decode` feeds arbitrary bytes, this target walks every
//! message type against edge-case sequence numbers and payload sizes, with
//! the fuzzer choosing the combination and the payload contents.

#![no_main]

use idscp_proto::{Frame, FrameHeader, MessageType};
use libfuzzer_sys::fuzz_target;

const SEQUENCES: &[u32] = &[0, 1, 0x1000, u32::MAX / 2, u32::MAX - 1, u32::MAX];

const PAYLOAD_SIZES: &[usize] = &[0, 1, 15, 16, 17, 255, 256, 4096];

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    let message_type = MessageType::ALL[data[0] as usize % MessageType::ALL.len()];
    let sequence = SEQUENCES[data[1] as usize % SEQUENCES.len()];
    let body = &data[2..];

    for &payload_size in PAYLOAD_SIZES {
        let payload = if payload_size <= body.len() {
            body[..payload_size].to_vec()
        } else {
            vec![0u8; payload_size]
        };

        let header = FrameHeader::new(message_type).with_sequence(sequence);
        let frame = Frame::new(header, payload.clone());

        let bytes = frame.to_bytes().expect("encode should never fail for a bounded payload");
        assert_eq!(bytes.len(), FrameHeader::SIZE + payload_size);

        let decoded = Frame::decode(&bytes).expect("decode should succeed for valid encoding");
        assert_eq!(decoded.header.message_type_enum(), Some(message_type));
        assert_eq!(decoded.header.sequence(), sequence);
        assert_eq!(decoded.payload.as_ref(), payload.as_slice());

        // Trailing bytes belong to the next frame
        let mut padded = bytes.to_vec();
        padded.extend_from_slice(body);
        assert_eq!(Frame::decode(&padded).expect("trailing bytes ignored"), decoded);

        // Any strict prefix is truncated
        if payload_size > 0 {
            assert!(Frame::decode(&bytes[..bytes.len() - 1]).is_err());
        }
    }
});
