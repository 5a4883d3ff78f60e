//! Snapshot tests for wire format stability.
//!
//! Each frame type is encoded and compared against its hex form. If the wire
//! format changes, these tests fail, so a peer built from an older revision
//! is not broken by accident.

use bytes::Bytes;
use insta::assert_snapshot;
use idscp_proto::{
    Frame, FrameHeader, MessageType, Payload,
    payloads::{
        attestation::{AttestationResult, Verdict},
        session::{ErrorCode, ErrorPayload, Hello, SelfDescription},
    },
};

/// Helper to encode frame to hex string for snapshot
fn frame_to_hex(frame: &Frame) -> String {
    let mut buf = Vec::new();
    frame.encode(&mut buf).expect("encoding should succeed");
    hex::encode(&buf)
}

fn encode(payload: Payload, sequence: u32) -> String {
    let header = FrameHeader::new(payload.message_type()).with_sequence(sequence);
    let frame = payload.into_frame(header).expect("frame creation should succeed");
    frame_to_hex(&frame)
}

// =============================================================================
// Handshake Frames
// =============================================================================

#[test]
fn snapshot_hello_frame() {
    let hello = Payload::Hello(Hello { version: 1, mutual_attestation: false });

    assert_snapshot!(
        encode(hello, 0),
        @"4944534301000001000000000000001ea26776657273696f6e01726d757475616c5f6174746573746174696f6ef4"
    );
}

#[test]
fn snapshot_hello_frame_mutual_with_sequence() {
    let hello = Payload::Hello(Hello { version: 1, mutual_attestation: true });

    assert_snapshot!(
        encode(hello, 3),
        @"4944534301000001000000030000001ea26776657273696f6e01726d757475616c5f6174746573746174696f6ef5"
    );
}

#[test]
fn snapshot_metadata_frame() {
    let metadata = Payload::Metadata(SelfDescription { document: "connector".to_string() });

    assert_snapshot!(
        encode(metadata, 0),
        @"49445343010000200000000000000014a168646f63756d656e7469636f6e6e6563746f72"
    );
}

// =============================================================================
// Attestation Frames
// =============================================================================

#[test]
fn snapshot_passing_result_omits_reason() {
    let result =
        Payload::AttestationResult(AttestationResult { verdict: Verdict::Pass, reason: None });

    assert_snapshot!(
        encode(result, 0),
        @"4944534301000012000000000000000ea167766572646963746470617373"
    );
}

#[test]
fn snapshot_failing_result_frame() {
    let result = Payload::AttestationResult(AttestationResult {
        verdict: Verdict::Fail,
        reason: Some("nonce-mismatch".to_string()),
    });

    assert_snapshot!(
        encode(result, 0),
        @"49445343010000120000000000000024a26776657264696374646661696c66726561736f6e6e6e6f6e63652d6d69736d61746368"
    );
}

// =============================================================================
// Error and Pass-Through Frames
// =============================================================================

#[test]
fn snapshot_error_frame() {
    let error = Payload::Error(ErrorPayload {
        code: ErrorCode::ProtocolViolation,
        message: "unexpected message".to_string(),
    });

    assert_snapshot!(
        encode(error, 0),
        @"49445343010000ff0000000000000022a264636f646501676d65737361676572756e6578706563746564206d657373616765"
    );
}

#[test]
fn snapshot_raw_frame_is_verbatim() {
    let raw = Payload::Raw(Bytes::from_static(b"app data"));

    assert_snapshot!(encode(raw, 0), @"494453430100003000000000000000086170702064617461");
}

#[test]
fn decode_accepts_snapshot_bytes() {
    let bytes = hex::decode(
        "4944534301000001000000000000001ea26776657273696f6e01726d757475616c5f6174746573746174696f6ef4",
    )
    .expect("valid hex");

    let frame = Frame::decode(&bytes).expect("frame should decode");
    assert_eq!(frame.header.message_type_enum(), Some(MessageType::Hello));
    assert_eq!(
        Payload::from_frame(&frame).expect("payload should decode"),
        Payload::Hello(Hello { version: 1, mutual_attestation: false })
    );
}
