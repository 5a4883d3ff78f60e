//! Arbitrary bytes through the event decoder
//!
//! `Event::from_bytes` must never panic, and a frame that decodes must
//! survive re-encoding unchanged.

#![no_main]

use idscp_core::Event;
use idscp_proto::{Frame, FrameHeader, MessageType, Payload};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let event = Event::from_bytes(data.to_vec().into());

    if event.decode_error().is_some() {
        assert_eq!(event.message_type(), MessageType::Error);
        return;
    }

    let frame = Frame::decode(data).expect("event decoded, so the frame does");
    let payload = Payload::from_frame(&frame).expect("event decoded, so the payload does");
    assert_eq!(&payload, event.payload());
    assert_eq!(payload.message_type(), event.message_type());

    let reencoded = frame.to_bytes().expect("re-encode");
    assert_eq!(reencoded.len(), FrameHeader::SIZE + frame.payload.len());
    assert_eq!(Frame::decode(&reencoded).expect("re-decode"), frame);
});
