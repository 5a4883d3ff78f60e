//! Simulated measurement service.
//!
//! Stands in for the platform's measurement daemon. The simulated platform
//! reports a fixed value per property ([`platform_values`]) and "signs" its
//! evidence with a keyless digest ([`sim_quote`]). The digest only detects
//! accidental corruption; it proves nothing, which is all a simulation needs.

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use idscp_core::attestation::measurement::{
    AttestationRequest, AttestationResponse, Evidence, MeasurementError, MeasurementService,
    Operation, ServiceStatus,
};
use idscp_proto::payloads::attestation::PropertyMask;

/// How the simulated service behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behavior {
    /// Quotes the simulated platform and verifies quotes faithfully
    #[default]
    Honest,
    /// Never replies; callers hit their measurement timeout
    Unresponsive,
    /// Quotes with evidence that does not decode
    Malformed,
    /// Every call fails as if the daemon were unreachable
    Failing,
    /// Quotes honestly but rejects every piece of evidence it verifies
    Rejecting,
    /// Quotes over altered property values (a compromised platform)
    Tampered,
    /// Quotes over a stale nonce, as a replayed quote would be
    Replaying,
}

/// Measurement service with scripted [`Behavior`]
#[derive(Debug, Default)]
pub struct SimMeasurementService {
    behavior: Behavior,
    quotes: AtomicUsize,
    verifications: AtomicUsize,
}

impl SimMeasurementService {
    /// Service with the given behavior
    pub fn new(behavior: Behavior) -> Self {
        Self { behavior, ..Self::default() }
    }

    /// Configured behavior
    pub fn behavior(&self) -> Behavior {
        self.behavior
    }

    /// Number of `Quote` requests received
    pub fn quotes(&self) -> usize {
        self.quotes.load(Ordering::Relaxed)
    }

    /// Number of `Verify` requests received
    pub fn verifications(&self) -> usize {
        self.verifications.load(Ordering::Relaxed)
    }

    fn quote(
        &self,
        mut request: AttestationRequest,
    ) -> Result<AttestationResponse, MeasurementError> {
        let mut measurements = platform_values(request.property_mask);
        match self.behavior {
            Behavior::Malformed => {
                return Ok(AttestationResponse {
                    status: ServiceStatus::Pass,
                    evidence: Some(vec![0xff; 16]),
                    measurements: BTreeMap::new(),
                    reason: None,
                });
            },
            Behavior::Tampered => {
                for value in measurements.values_mut() {
                    value.iter_mut().for_each(|byte| *byte = !*byte);
                }
            },
            Behavior::Replaying => request.nonce.iter_mut().for_each(|byte| *byte = !*byte),
            _ => {},
        }

        let evidence = Evidence {
            quote: sim_quote(&request.nonce, &measurements),
            nonce: request.nonce,
            attestation_type: request.attestation_type,
            property_mask: request.property_mask,
            measurements: measurements.clone(),
        };

        Ok(AttestationResponse {
            status: ServiceStatus::Pass,
            evidence: Some(evidence.to_cbor()?),
            measurements,
            reason: None,
        })
    }

    fn verify(&self, request: &AttestationRequest) -> AttestationResponse {
        if self.behavior == Behavior::Rejecting {
            return AttestationResponse::failure(ServiceStatus::Fail, "policy rejects all evidence");
        }

        let Some(bytes) = request.evidence.as_deref() else {
            return AttestationResponse::failure(ServiceStatus::Error, "no evidence to verify");
        };

        let evidence = match Evidence::from_cbor(bytes) {
            Ok(evidence) => evidence,
            Err(e) => return AttestationResponse::failure(ServiceStatus::Fail, e.to_string()),
        };

        if evidence.nonce != request.nonce
            || evidence.quote != sim_quote(&evidence.nonce, &evidence.measurements)
        {
            return AttestationResponse::failure(ServiceStatus::Fail, "quote does not verify");
        }

        AttestationResponse {
            status: ServiceStatus::Pass,
            evidence: None,
            measurements: evidence.measurements,
            reason: None,
        }
    }
}

#[async_trait]
impl MeasurementService for SimMeasurementService {
    async fn measure(
        &self,
        request: AttestationRequest,
    ) -> Result<AttestationResponse, MeasurementError> {
        match request.operation {
            Operation::Quote => self.quotes.fetch_add(1, Ordering::Relaxed),
            Operation::Verify => self.verifications.fetch_add(1, Ordering::Relaxed),
        };

        match self.behavior {
            Behavior::Unresponsive => std::future::pending().await,
            Behavior::Failing => Err(MeasurementError::Unavailable("simulated outage".into())),
            _ => match request.operation {
                Operation::Quote => self.quote(request),
                Operation::Verify => Ok(self.verify(&request)),
            },
        }
    }
}

/// Value the simulated platform reports for each property in `mask`
pub fn platform_values(mask: PropertyMask) -> BTreeMap<u8, Vec<u8>> {
    mask.properties()
        .map(|index| {
            let value = (0..20u8).map(|i| index.wrapping_mul(31).wrapping_add(i)).collect();
            (index, value)
        })
        .collect()
}

/// Keyless 32-byte digest over a nonce and property values
///
/// Four FNV-1a lanes with distinct offsets.
pub fn sim_quote(nonce: &[u8], measurements: &BTreeMap<u8, Vec<u8>>) -> Vec<u8> {
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut lanes = [
        0xcbf2_9ce4_8422_2325_u64,
        0x8422_2325_cbf2_9ce4,
        0x9ce4_8422_2325_cbf2,
        0x2325_cbf2_9ce4_8422,
    ];

    let measured = measurements
        .iter()
        .flat_map(|(index, value)| std::iter::once(*index).chain(value.iter().copied()));
    let bytes = nonce.iter().copied().chain(measured);
    for byte in bytes {
        for lane in &mut lanes {
            *lane = (*lane ^ u64::from(byte)).wrapping_mul(PRIME);
        }
    }

    lanes.iter().flat_map(|lane| lane.to_be_bytes()).collect()
}
