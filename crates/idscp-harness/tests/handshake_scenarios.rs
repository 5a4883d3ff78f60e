//! End-to-end handshake scenarios between two simulated connectors.

use bytes::Bytes;
use idscp_core::{Event, ProtocolState, SessionId, attestation::FailureReason};
use idscp_harness::{
    Behavior,
    scenario::{OracleFn, Scenario, Side, World, oracle},
};
use idscp_proto::{
    MessageType, Payload,
    payloads::{
        attestation::{AttestationType, PropertyMask},
        session::SelfDescription,
    },
};

fn frame(payload: Payload) -> Bytes {
    Event::from_payload(payload).expect("payload encodes").raw().clone()
}

fn check(f: impl FnOnce(&World) + 'static) -> OracleFn {
    Box::new(move |world| {
        f(world);
        Ok(())
    })
}

#[test]
fn one_way_handshake_reaches_end_on_both_sides() {
    Scenario::new()
        .oracle(oracle::all_of(vec![
            oracle::both_completed(),
            oracle::no_error_ping_pong(),
            check(|world| {
                assert_eq!(world.initiator_outcome(), &Ok(ProtocolState::End));
                assert_eq!(world.acceptor_outcome(), &Ok(ProtocolState::End));

                assert!(world.acceptor().attestation_result().unwrap().is_pass());
                assert_eq!(world.initiator().attestation_result(), None);

                assert_eq!(world.acceptor().metadata().as_deref(), Some("initiator connector"));
                assert_eq!(world.initiator().metadata().as_deref(), Some("acceptor connector"));

                assert_eq!(
                    world.sent_by(Side::Initiator),
                    vec![
                        MessageType::Hello,
                        MessageType::AttestationResponse,
                        MessageType::Metadata
                    ]
                );
                assert_eq!(
                    world.sent_by(Side::Acceptor),
                    vec![
                        MessageType::AttestationChallenge,
                        MessageType::AttestationResult,
                        MessageType::Metadata
                    ]
                );
            }),
        ]))
        .run()
        .unwrap();
}

#[test]
fn mutual_handshake_attests_both_connectors() {
    Scenario::new()
        .mutual()
        .oracle(oracle::all_of(vec![
            oracle::both_completed(),
            check(|world| {
                assert!(world.acceptor().attestation_result().unwrap().is_pass());
                assert!(world.initiator().attestation_result().unwrap().is_pass());
                assert_eq!(world.initiator_service().quotes(), 1);
                assert_eq!(world.initiator_service().verifications(), 1);
                assert_eq!(world.acceptor_service().quotes(), 1);
                assert_eq!(world.acceptor_service().verifications(), 1);
            }),
        ]))
        .run()
        .unwrap();
}

#[test]
fn replayed_quote_fails_and_later_frames_pass_through() {
    let late = frame(Payload::Metadata(SelfDescription { document: "late".into() }));
    let expected = late.clone();

    Scenario::new()
        .with_initiator_behavior(Behavior::Replaying)
        .then_send(late)
        .oracle(oracle::all_of(vec![
            oracle::both_failed(),
            oracle::acceptor_rejected(FailureReason::NonceMismatch),
            oracle::no_error_ping_pong(),
            check(move |world| {
                // Nonce mismatch is decided before the service is asked
                assert_eq!(world.acceptor_service().verifications(), 0);

                // The late Metadata frame reached the application untouched
                let [message] = world.pass_through() else {
                    panic!("expected one pass-through frame, got {:?}", world.pass_through());
                };
                assert_eq!(message.session, SessionId(0x2000));
                assert_eq!(message.payload, expected);
                assert_eq!(world.acceptor().metadata(), None);
                assert_eq!(world.acceptor().state(), ProtocolState::Error);
            }),
        ]))
        .run()
        .unwrap();
}

#[test]
fn measurement_timeout_fails_as_unavailable() {
    Scenario::new()
        .with_acceptor_behavior(Behavior::Unresponsive)
        .oracle(oracle::all_of(vec![
            oracle::both_failed(),
            oracle::acceptor_rejected(FailureReason::MeasurementUnavailable),
            check(|world| {
                assert_eq!(
                    world.sent_by(Side::Acceptor),
                    vec![MessageType::AttestationChallenge, MessageType::AttestationResult]
                );
            }),
        ]))
        .run()
        .unwrap();
}

#[test]
fn tampered_platform_is_rejected() {
    Scenario::new()
        .with_initiator_behavior(Behavior::Tampered)
        .oracle(oracle::all_of(vec![
            oracle::both_failed(),
            oracle::acceptor_rejected(FailureReason::MeasurementMismatch),
            check(|world| {
                let evidence = world.acceptor().attestation_result().unwrap().evidence.unwrap();
                assert_eq!(evidence.property_mask, PropertyMask::BASIC_SET);
            }),
        ]))
        .run()
        .unwrap();
}

#[test]
fn undecodable_evidence_is_rejected() {
    Scenario::new()
        .with_initiator_behavior(Behavior::Malformed)
        .oracle(oracle::all_of(vec![
            oracle::both_failed(),
            oracle::acceptor_rejected(FailureReason::EvidenceMalformed),
        ]))
        .run()
        .unwrap();
}

#[test]
fn verifier_policy_rejection_is_reported() {
    Scenario::new()
        .with_acceptor_behavior(Behavior::Rejecting)
        .oracle(oracle::all_of(vec![
            oracle::both_failed(),
            oracle::acceptor_rejected(FailureReason::RejectedByService),
        ]))
        .run()
        .unwrap();
}

#[test]
fn prover_outage_sends_one_error_frame() {
    Scenario::new()
        .with_initiator_behavior(Behavior::Failing)
        .oracle(oracle::all_of(vec![
            oracle::both_failed(),
            oracle::no_error_ping_pong(),
            check(|world| {
                assert_eq!(
                    world.sent_by(Side::Initiator),
                    vec![MessageType::Hello, MessageType::Error]
                );
                assert_eq!(world.acceptor().attestation_result(), None);
            }),
        ]))
        .run()
        .unwrap();
}

#[test]
fn empty_advanced_mask_fails_closed() {
    Scenario::new()
        .with_acceptor_config(|config| {
            config.attestation_type = AttestationType::Advanced;
            config.property_mask = PropertyMask::empty();
        })
        .oracle(oracle::all_of(vec![
            oracle::both_failed(),
            oracle::acceptor_rejected(FailureReason::MeasurementMismatch),
        ]))
        .run()
        .unwrap();
}

#[test]
fn masked_property_without_reference_fails_closed() {
    Scenario::new()
        .with_acceptor_config(|config| {
            config.attestation_type = AttestationType::Advanced;
            // Property 12 is measured but has no reference value
            config.property_mask = PropertyMask::KERNEL | PropertyMask::from_properties([12]);
        })
        .oracle(oracle::all_of(vec![
            oracle::both_failed(),
            oracle::acceptor_rejected(FailureReason::MeasurementMismatch),
        ]))
        .run()
        .unwrap();
}

#[test]
fn mutual_handshake_rejects_tampered_acceptor() {
    Scenario::new()
        .mutual()
        .with_acceptor_behavior(Behavior::Tampered)
        .oracle(oracle::all_of(vec![
            oracle::both_failed(),
            oracle::no_error_ping_pong(),
            check(|world| {
                assert!(world.acceptor().attestation_result().unwrap().is_pass());
                assert_eq!(
                    world.initiator().attestation_result().unwrap().reason,
                    Some(FailureReason::MeasurementMismatch)
                );
            }),
        ]))
        .run()
        .unwrap();
}
