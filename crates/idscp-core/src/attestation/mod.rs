//! Attestation coordinator.
//!
//! Runs both halves of remote attestation for one session:
//!
//! - **Verifier**: [`AttestationCoordinator::begin_attestation`] issues a
//!   challenge over a fresh nonce, and
//!   [`AttestationCoordinator::handle_response`] checks the evidence the peer
//!   sent back.
//! - **Prover**: [`AttestationCoordinator::handle_peer_challenge`] asks the
//!   local measurement service to quote over the peer's nonce.
//!
//! # Verification Order
//!
//! ```text
//! response ──> pending challenge? ──no──> no-pending-challenge
//!                    │yes
//!                    ↓
//!              evidence decodes? ──no──> evidence-malformed
//!                    │yes
//!                    ↓
//!              nonces match? ────no──> nonce-mismatch (service not called)
//!                    │yes
//!                    ↓
//!              service Verify ──timeout/error──> measurement-unavailable
//!                    │          ──fail─────────> rejected-by-service
//!                    ↓pass
//!              verdict::evaluate ──mismatch──> measurement-mismatch
//!                    │
//!                    ↓
//!                  pass
//! ```
//!
//! Every failure is reported as data in the [`RatResult`]. The pending
//! challenge is consumed by the first response, so a nonce is never accepted
//! twice.

pub mod measurement;
pub mod tpmd;
pub mod verdict;

use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use idscp_proto::payloads::attestation::{self as wire, AttestationType, PropertyMask, Verdict};
use serde::{Deserialize, Serialize};

use self::measurement::{
    AttestationRequest, AttestationResponse, Evidence, MeasurementService, Operation,
    ServiceStatus,
};
use crate::env::Environment;

/// Length of challenge nonces in bytes
pub const NONCE_LEN: usize = 32;

/// Why attestation did not pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// Measurement service timed out, was unreachable or replied with garbage
    MeasurementUnavailable,
    /// Evidence was not produced over the pending challenge nonce
    NonceMismatch,
    /// Evidence could not be decoded
    EvidenceMalformed,
    /// A measured property differs from its reference value
    MeasurementMismatch,
    /// Measurement service examined the evidence and rejected it
    RejectedByService,
    /// A response arrived without an outstanding challenge
    NoPendingChallenge,
}

impl FailureReason {
    /// Stable reason code, as sent in attestation results
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MeasurementUnavailable => "measurement-unavailable",
            Self::NonceMismatch => "nonce-mismatch",
            Self::EvidenceMalformed => "evidence-malformed",
            Self::MeasurementMismatch => "measurement-mismatch",
            Self::RejectedByService => "rejected-by-service",
            Self::NoPendingChallenge => "no-pending-challenge",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the evidence claimed, kept for callers after the handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSummary {
    /// Attestation type the peer measured
    pub attestation_type: AttestationType,
    /// Properties the peer measured
    pub property_mask: PropertyMask,
    /// Measured value per property index
    pub measurements: BTreeMap<u8, Vec<u8>>,
}

impl From<&Evidence> for EvidenceSummary {
    fn from(evidence: &Evidence) -> Self {
        Self {
            attestation_type: evidence.attestation_type,
            property_mask: evidence.property_mask,
            measurements: evidence.measurements.clone(),
        }
    }
}

/// Outcome of remote attestation of the peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatResult {
    /// Overall verdict
    pub verdict: Verdict,
    /// Evidence summary, when evidence could be decoded
    pub evidence: Option<EvidenceSummary>,
    /// Failure reason, when the verdict is not a pass
    pub reason: Option<FailureReason>,
}

impl RatResult {
    /// A passing result
    #[must_use]
    pub fn pass(evidence: EvidenceSummary) -> Self {
        Self { verdict: Verdict::Pass, evidence: Some(evidence), reason: None }
    }

    /// A failing result
    #[must_use]
    pub fn fail(reason: FailureReason, evidence: Option<EvidenceSummary>) -> Self {
        Self { verdict: Verdict::Fail, evidence, reason: Some(reason) }
    }

    /// Whether the peer passed attestation
    #[must_use]
    pub fn is_pass(&self) -> bool {
        self.verdict.is_pass()
    }

    /// Result message reporting this outcome to the peer
    #[must_use]
    pub fn to_wire(&self) -> wire::AttestationResult {
        wire::AttestationResult {
            verdict: self.verdict,
            reason: self.reason.map(|reason| reason.as_str().to_string()),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingChallenge {
    nonce: Vec<u8>,
    attestation_type: AttestationType,
    mask: PropertyMask,
}

/// Coordinates one session's attestation exchange with the measurement
/// service
pub struct AttestationCoordinator<E: Environment> {
    env: E,
    service: Arc<dyn MeasurementService>,
    expected: BTreeMap<u8, Vec<u8>>,
    measurement_timeout: Duration,
    pending: Option<PendingChallenge>,
}

impl<E: Environment> AttestationCoordinator<E> {
    /// Create a coordinator with no pending challenge
    pub fn new(
        env: E,
        service: Arc<dyn MeasurementService>,
        expected: BTreeMap<u8, Vec<u8>>,
        measurement_timeout: Duration,
    ) -> Self {
        Self { env, service, expected, measurement_timeout, pending: None }
    }

    /// Whether a challenge is waiting for its response
    #[must_use]
    pub fn has_pending_challenge(&self) -> bool {
        self.pending.is_some()
    }

    /// Issue a challenge over a fresh nonce
    ///
    /// Replaces any earlier pending challenge.
    pub fn begin_attestation(
        &mut self,
        attestation_type: AttestationType,
        property_mask: PropertyMask,
    ) -> wire::AttestationChallenge {
        let mut nonce = vec![0u8; NONCE_LEN];
        self.env.random_bytes(&mut nonce);

        self.pending = Some(PendingChallenge {
            nonce: nonce.clone(),
            attestation_type,
            mask: attestation_type.effective_mask(property_mask),
        });

        wire::AttestationChallenge { nonce, attestation_type, property_mask }
    }

    /// Verify the peer's response to the pending challenge
    ///
    /// The challenge is consumed once a verdict exists. If this future is
    /// dropped while the measurement service is still answering, the
    /// challenge stays pending and the same response can be delivered again.
    pub async fn handle_response(&mut self, response: &wire::AttestationResponse) -> RatResult {
        let Some(pending) = self.pending.clone() else {
            return RatResult::fail(FailureReason::NoPendingChallenge, None);
        };

        let result = self.verify(&pending, response).await;
        self.pending = None;
        result
    }

    async fn verify(
        &self,
        pending: &PendingChallenge,
        response: &wire::AttestationResponse,
    ) -> RatResult {
        let evidence = match Evidence::from_cbor(&response.evidence) {
            Ok(evidence) => evidence,
            Err(e) => {
                tracing::warn!(error = %e, "peer evidence does not decode");
                return RatResult::fail(FailureReason::EvidenceMalformed, None);
            },
        };
        let summary = EvidenceSummary::from(&evidence);

        let nonce_match = response.nonce == pending.nonce && evidence.nonce == pending.nonce;
        if !nonce_match {
            return RatResult::fail(FailureReason::NonceMismatch, Some(summary));
        }

        let request = AttestationRequest {
            operation: Operation::Verify,
            attestation_type: pending.attestation_type,
            property_mask: pending.mask,
            nonce: pending.nonce.clone(),
            evidence: Some(response.evidence.clone()),
        };

        let reply = match self.call_service(request).await {
            Ok(reply) => reply,
            Err(reason) => return RatResult::fail(reason, Some(summary)),
        };

        match reply.status {
            ServiceStatus::Pass => {},
            ServiceStatus::Fail => {
                tracing::warn!(
                    reason = reply.reason.as_deref().unwrap_or(""),
                    "measurement service rejected peer evidence"
                );
                return RatResult::fail(FailureReason::RejectedByService, Some(summary));
            },
            ServiceStatus::Error => {
                tracing::error!(
                    reason = reply.reason.as_deref().unwrap_or(""),
                    "measurement service could not verify peer evidence"
                );
                return RatResult::fail(FailureReason::MeasurementUnavailable, Some(summary));
            },
        }

        match verdict::evaluate(&self.expected, &reply.measurements, pending.mask, nonce_match) {
            Ok(()) => RatResult::pass(summary),
            Err(reason) => RatResult::fail(reason, Some(summary)),
        }
    }

    /// Produce evidence for the peer's challenge
    ///
    /// # Errors
    ///
    /// Returns [`FailureReason::RejectedByService`] if the service refuses to
    /// quote and [`FailureReason::MeasurementUnavailable`] if it cannot be
    /// reached, times out, or replies without evidence.
    pub async fn handle_peer_challenge(
        &self,
        challenge: &wire::AttestationChallenge,
    ) -> Result<wire::AttestationResponse, FailureReason> {
        let request = AttestationRequest {
            operation: Operation::Quote,
            attestation_type: challenge.attestation_type,
            property_mask: challenge.attestation_type.effective_mask(challenge.property_mask),
            nonce: challenge.nonce.clone(),
            evidence: None,
        };

        let reply = self.call_service(request).await?;

        match (reply.status, reply.evidence) {
            (ServiceStatus::Pass, Some(evidence)) => {
                Ok(wire::AttestationResponse { nonce: challenge.nonce.clone(), evidence })
            },
            (ServiceStatus::Pass, None) => {
                tracing::error!("measurement service quote carried no evidence");
                Err(FailureReason::MeasurementUnavailable)
            },
            (ServiceStatus::Fail, _) => Err(FailureReason::RejectedByService),
            (ServiceStatus::Error, _) => {
                tracing::error!(
                    reason = reply.reason.as_deref().unwrap_or(""),
                    "measurement service could not quote"
                );
                Err(FailureReason::MeasurementUnavailable)
            },
        }
    }

    /// Drop the pending challenge
    pub fn reset(&mut self) {
        self.pending = None;
    }

    async fn call_service(
        &self,
        request: AttestationRequest,
    ) -> Result<AttestationResponse, FailureReason> {
        let operation = request.operation;

        match tokio::time::timeout(self.measurement_timeout, self.service.measure(request)).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => {
                tracing::error!(?operation, error = %e, "measurement service call failed");
                Err(FailureReason::MeasurementUnavailable)
            },
            Err(_) => {
                tracing::error!(
                    ?operation,
                    timeout = ?self.measurement_timeout,
                    "measurement service timed out"
                );
                Err(FailureReason::MeasurementUnavailable)
            },
        }
    }
}
