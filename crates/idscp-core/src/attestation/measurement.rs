//! Contract with the local measurement service.
//!
//! The measurement service is an external process with access to the
//! platform's trust anchor. The coordinator asks it for two things:
//!
//! - [`Operation::Quote`]: produce [`Evidence`] over a nonce chosen by the
//!   peer, so the peer can verify us.
//! - [`Operation::Verify`]: check evidence the peer produced over our nonce
//!   and report the property values it vouches for.
//!
//! Requests and replies are CBOR maps. How the service produces and checks
//! quotes is its own business.

use std::collections::BTreeMap;

use async_trait::async_trait;
use idscp_proto::payloads::attestation::{AttestationType, PropertyMask};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Requested service operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Produce evidence over a peer nonce
    Quote,
    /// Verify peer evidence
    Verify,
}

/// Status of a service reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Operation succeeded; for `Verify`, the evidence checked out
    Pass,
    /// Evidence was examined and rejected
    Fail,
    /// The service could not perform the operation
    Error,
}

/// Request sent to the measurement service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRequest {
    /// Requested operation
    pub operation: Operation,
    /// Attestation type selector
    pub attestation_type: AttestationType,
    /// Properties to measure
    pub property_mask: PropertyMask,
    /// Challenge nonce the evidence is bound to
    pub nonce: Vec<u8>,
    /// Peer evidence (`Verify` only)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub evidence: Option<Vec<u8>>,
}

/// Reply from the measurement service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationResponse {
    /// Outcome of the operation
    pub status: ServiceStatus,
    /// Encoded [`Evidence`] (`Quote` only)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub evidence: Option<Vec<u8>>,
    /// Property values the service measured or vouches for
    #[serde(default)]
    pub measurements: BTreeMap<u8, Vec<u8>>,
    /// Reason, when the status is not a pass
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
}

impl AttestationResponse {
    /// A failed reply with a reason
    #[must_use]
    pub fn failure(status: ServiceStatus, reason: impl Into<String>) -> Self {
        Self { status, evidence: None, measurements: BTreeMap::new(), reason: Some(reason.into()) }
    }
}

/// Evidence produced by a `Quote`, carried opaquely in the handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// Nonce the quote was produced over
    pub nonce: Vec<u8>,
    /// Attestation type that was measured
    pub attestation_type: AttestationType,
    /// Properties that were measured
    pub property_mask: PropertyMask,
    /// Measured value per property index
    pub measurements: BTreeMap<u8, Vec<u8>>,
    /// Quote over nonce and measurements, checked by the verifying service
    pub quote: Vec<u8>,
}

impl Evidence {
    /// Encode as CBOR
    ///
    /// # Errors
    ///
    /// Returns [`MeasurementError::Encode`] if serialization fails.
    pub fn to_cbor(&self) -> Result<Vec<u8>, MeasurementError> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)
            .map_err(|e| MeasurementError::Encode(e.to_string()))?;
        Ok(buf)
    }

    /// Decode from CBOR
    ///
    /// # Errors
    ///
    /// Returns [`MeasurementError::Decode`] if the bytes are not evidence.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, MeasurementError> {
        ciborium::de::from_reader(bytes).map_err(|e| MeasurementError::Decode(e.to_string()))
    }
}

/// Failures talking to the measurement service
///
/// All of them surface as `measurement-unavailable` in the attestation
/// verdict.
#[derive(Debug, Error)]
pub enum MeasurementError {
    /// Service endpoint could not be reached
    #[error("measurement service unreachable at {endpoint}: {source}")]
    Unreachable {
        /// Endpoint that was tried
        endpoint: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// I/O failure on an established connection
    #[error("measurement service I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reply exceeded the size limit
    #[error("measurement reply too large: {size} bytes (max {max})")]
    ReplyTooLarge {
        /// Announced reply size
        size: usize,
        /// Maximum accepted size
        max: usize,
    },

    /// Request could not be encoded
    #[error("failed to encode measurement message: {0}")]
    Encode(String),

    /// Reply could not be decoded
    #[error("malformed measurement message: {0}")]
    Decode(String),

    /// Service reported it cannot serve requests
    #[error("measurement service unavailable: {0}")]
    Unavailable(String),
}

/// Local measurement service
///
/// One handle is shared by every session in the process. Each call is
/// independent and keyed by the nonce it carries.
#[async_trait]
pub trait MeasurementService: Send + Sync + 'static {
    /// Perform one request/reply exchange
    ///
    /// # Errors
    ///
    /// Returns [`MeasurementError`] if the service cannot be reached or its
    /// reply cannot be decoded. A reply with a failing status is not an
    /// error.
    async fn measure(
        &self,
        request: AttestationRequest,
    ) -> Result<AttestationResponse, MeasurementError>;
}
