//! Remote attestation payload types.
//!
//! The attestation exchange is a challenge/response over a fresh nonce:
//!
//! ```text
//! verifier                         prover
//!    │ AttestationChallenge{nonce}    │
//!    │───────────────────────────────>│
//!    │ AttestationResponse{nonce, ev} │
//!    │<───────────────────────────────│
//!    │ AttestationResult{verdict}     │
//!    │───────────────────────────────>│
//! ```
//!
//! Evidence is produced by the prover's local measurement service and is
//! opaque at this layer.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Platform properties selected for measurement (32-bit mask)
    ///
    /// Bit `n` selects platform configuration register `n`. Only the
    /// registers with a well-known meaning are named; every other bit is
    /// retained as-is so masks chosen by a peer survive a round trip.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(from = "u32", into = "u32")]
    pub struct PropertyMask: u32 {
        /// Core firmware code
        const FIRMWARE = 1 << 0;
        /// Core firmware configuration
        const FIRMWARE_CONFIG = 1 << 1;
        /// Option ROM code
        const OPTION_ROMS = 1 << 2;
        /// Option ROM configuration
        const OPTION_ROM_CONFIG = 1 << 3;
        /// Boot loader code
        const BOOT_LOADER = 1 << 4;
        /// Boot loader configuration
        const BOOT_LOADER_CONFIG = 1 << 5;
        /// Platform state transitions
        const PLATFORM_STATE = 1 << 6;
        /// Secure boot policy
        const SECURE_BOOT_POLICY = 1 << 7;
        /// Kernel image
        const KERNEL = 1 << 8;
        /// Kernel command line and configuration
        const KERNEL_CONFIG = 1 << 9;
        /// Runtime components
        const RUNTIME = 1 << 10;

        const _ = !0;
    }
}

impl PropertyMask {
    /// Properties 0-10, measured by [`AttestationType::Basic`]
    pub const BASIC_SET: Self = Self::from_bits_retain(0x0000_07FF);

    /// Properties 0-23, measured by [`AttestationType::All`]
    pub const ALL_SET: Self = Self::from_bits_retain(0x00FF_FFFF);

    /// Indices of the selected properties, ascending
    pub fn properties(self) -> impl Iterator<Item = u8> {
        (0u8..32).filter(move |index| self.bits() & (1u32 << index) != 0)
    }

    /// Build a mask from property indices (indices >= 32 are ignored)
    #[must_use]
    pub fn from_properties(indices: impl IntoIterator<Item = u8>) -> Self {
        let bits = indices
            .into_iter()
            .filter(|index| *index < 32)
            .fold(0u32, |bits, index| bits | (1u32 << index));
        Self::from_bits_retain(bits)
    }
}

impl From<u32> for PropertyMask {
    fn from(bits: u32) -> Self {
        Self::from_bits_retain(bits)
    }
}

impl From<PropertyMask> for u32 {
    fn from(mask: PropertyMask) -> Self {
        mask.bits()
    }
}

/// Which properties an attestation covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationType {
    /// Fixed set of firmware and boot properties ([`PropertyMask::BASIC_SET`])
    Basic,
    /// Every property ([`PropertyMask::ALL_SET`])
    All,
    /// Caller-selected properties
    Advanced,
}

impl AttestationType {
    /// Mask actually measured for this type
    ///
    /// `custom` is only consulted for [`AttestationType::Advanced`].
    #[must_use]
    pub fn effective_mask(self, custom: PropertyMask) -> PropertyMask {
        match self {
            Self::Basic => PropertyMask::BASIC_SET,
            Self::All => PropertyMask::ALL_SET,
            Self::Advanced => custom,
        }
    }
}

/// Outcome of verifying a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Every condition held
    Pass,
    /// At least one condition failed
    Fail,
    /// No decision could be reached
    Indeterminate,
}

impl Verdict {
    /// Whether this verdict lets the handshake continue
    #[must_use]
    pub const fn is_pass(self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Challenge sent by the verifying side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationChallenge {
    /// Fresh random nonce the evidence must be bound to
    pub nonce: Vec<u8>,
    /// Requested attestation type
    pub attestation_type: AttestationType,
    /// Requested properties (meaningful for [`AttestationType::Advanced`])
    pub property_mask: PropertyMask,
}

/// Evidence produced by the proving side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationResponse {
    /// Nonce from the challenge being answered
    pub nonce: Vec<u8>,
    /// Evidence blob from the prover's measurement service
    pub evidence: Vec<u8>,
}

/// Verdict reported back to the prover
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationResult {
    /// The verifier's verdict
    pub verdict: Verdict,
    /// Failure reason code, when the verdict is not a pass
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
}
