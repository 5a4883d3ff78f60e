//! Oracle functions for scenario verification.
//!
//! Oracles run once both connectors settled. They receive the whole world and
//! assert invariants over it.

use idscp_core::{ProtocolState, attestation::FailureReason};
use idscp_proto::MessageType;

use crate::scenario::World;

/// Oracle function type.
///
/// Returns `Ok(())` if all invariants hold, `Err(message)` otherwise.
pub type OracleFn = Box<dyn FnOnce(&World) -> Result<(), String>>;

/// Both connectors reached `End`
pub fn both_completed() -> OracleFn {
    Box::new(|world| {
        let states = (world.initiator().state(), world.acceptor().state());
        if states == (ProtocolState::End, ProtocolState::End) {
            Ok(())
        } else {
            Err(format!("expected both connectors in End, got {states:?}"))
        }
    })
}

/// Both connectors ended in `Error`
pub fn both_failed() -> OracleFn {
    Box::new(|world| {
        let states = (world.initiator().state(), world.acceptor().state());
        if states == (ProtocolState::Error, ProtocolState::Error) {
            Ok(())
        } else {
            Err(format!("expected both connectors in Error, got {states:?}"))
        }
    })
}

/// The acceptor attested the initiator and rejected it for `reason`
pub fn acceptor_rejected(reason: FailureReason) -> OracleFn {
    Box::new(move |world| match world.acceptor().attestation_result() {
        Some(result) if result.reason == Some(reason) && !result.is_pass() => Ok(()),
        other => Err(format!("expected acceptor to reject with {reason}, got {other:?}")),
    })
}

/// At most one `Error` frame crossed the wire
///
/// A failure reported by the peer is never answered, so two connectors can
/// not bounce errors back and forth.
pub fn no_error_ping_pong() -> OracleFn {
    Box::new(|world| {
        let errors = world
            .deliveries()
            .iter()
            .filter(|delivery| delivery.message_type == MessageType::Error)
            .count();
        if errors <= 1 {
            Ok(())
        } else {
            Err(format!("{errors} error frames exchanged, expected at most one"))
        }
    })
}

/// Combine multiple oracles into one.
pub fn all_of(oracles: Vec<OracleFn>) -> OracleFn {
    Box::new(move |world| {
        for oracle in oracles {
            oracle(world)?;
        }
        Ok(())
    })
}
