//! Handshake configuration.

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use idscp_proto::payloads::attestation::{AttestationType, PropertyMask};
use serde::{Deserialize, Serialize};

/// Which side of the handshake a connector plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Passively accepts a connection and challenges the initiator first
    #[default]
    Acceptor,
    /// Actively opens the channel by sending `Hello`
    Initiator,
}

/// Handshake configuration
///
/// Deserializes with every field optional, so an embedding server can keep it
/// in its own configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Side of the handshake
    pub role: Role,
    /// Attestation type requested from the peer
    pub attestation_type: AttestationType,
    /// Properties requested from the peer for [`AttestationType::Advanced`]
    pub property_mask: PropertyMask,
    /// Reference value per property index that the peer must report
    ///
    /// A masked property without a reference value fails verification.
    pub expected_measurements: BTreeMap<u8, Vec<u8>>,
    /// Upper bound on a single measurement service call
    pub measurement_timeout: Duration,
    /// Upper bound on the whole handshake, measured from its first message
    pub handshake_timeout: Duration,
    /// Initiator only: ask to attest the acceptor as well
    pub mutual_attestation: bool,
    /// Self-description document sent to the peer after attestation
    pub self_description: String,
    /// Control socket of the local measurement daemon
    pub tpmd_socket: PathBuf,
}

impl ProtocolConfig {
    /// Default control socket of the measurement daemon
    pub const DEFAULT_TPMD_SOCKET: &'static str = "/var/run/tpmd/control.sock";

    /// Same configuration, playing `role`
    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Mask measured for the configured attestation type
    #[must_use]
    pub fn effective_mask(&self) -> PropertyMask {
        self.attestation_type.effective_mask(self.property_mask)
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            role: Role::Acceptor,
            attestation_type: AttestationType::Basic,
            property_mask: PropertyMask::empty(),
            expected_measurements: BTreeMap::new(),
            measurement_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(30),
            mutual_attestation: false,
            self_description: String::new(),
            tpmd_socket: PathBuf::from(Self::DEFAULT_TPMD_SOCKET),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ProtocolConfig::default();

        assert_eq!(config.role, Role::Acceptor);
        assert_eq!(config.measurement_timeout, Duration::from_secs(5));
        assert_eq!(config.handshake_timeout, Duration::from_secs(30));
        assert!(!config.mutual_attestation);
        assert_eq!(config.effective_mask(), PropertyMask::BASIC_SET);
        assert_eq!(config.tpmd_socket, PathBuf::from("/var/run/tpmd/control.sock"));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        // {"role": "initiator", "mutual_attestation": true} in CBOR
        let mut partial = Vec::new();
        use ciborium::cbor;
        let value = cbor!({
            "role" => "initiator",
            "mutual_attestation" => true,
        })
        .unwrap();
        ciborium::ser::into_writer(&value, &mut partial).unwrap();

        let config: ProtocolConfig = ciborium::de::from_reader(partial.as_slice()).unwrap();

        assert_eq!(config.role, Role::Initiator);
        assert!(config.mutual_attestation);
        assert_eq!(config.handshake_timeout, ProtocolConfig::default().handshake_timeout);
    }

    #[test]
    fn advanced_type_uses_custom_mask() {
        let config = ProtocolConfig {
            attestation_type: AttestationType::Advanced,
            property_mask: PropertyMask::KERNEL,
            ..ProtocolConfig::default()
        };

        assert_eq!(config.effective_mask(), PropertyMask::KERNEL);
    }
}
