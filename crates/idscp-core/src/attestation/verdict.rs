//! Attestation verdict.
//!
//! A pure function of its inputs: the same expected values, measured values,
//! mask and nonce check always give the same outcome.

use std::collections::BTreeMap;

use idscp_proto::payloads::attestation::PropertyMask;

use super::FailureReason;

/// Decide whether a peer's measurements are acceptable
///
/// Passes only if the nonce matched and, for every property selected by
/// `mask`, the measured value equals the expected one. A masked property with
/// no expected value or no measured value fails. Properties outside the mask
/// are ignored. An empty mask selects nothing to compare and fails.
///
/// # Errors
///
/// Returns the first failing condition, checked in this order:
/// [`FailureReason::NonceMismatch`], then
/// [`FailureReason::MeasurementMismatch`].
pub fn evaluate(
    expected: &BTreeMap<u8, Vec<u8>>,
    actual: &BTreeMap<u8, Vec<u8>>,
    mask: PropertyMask,
    nonce_match: bool,
) -> Result<(), FailureReason> {
    if !nonce_match {
        return Err(FailureReason::NonceMismatch);
    }

    let mut selected = mask.properties().peekable();
    if selected.peek().is_none() {
        return Err(FailureReason::MeasurementMismatch);
    }

    let all_match = selected.all(|index| match (expected.get(&index), actual.get(&index)) {
        (Some(expected), Some(actual)) => expected == actual,
        _ => false,
    });

    if all_match { Ok(()) } else { Err(FailureReason::MeasurementMismatch) }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn measurements() -> impl Strategy<Value = BTreeMap<u8, Vec<u8>>> {
        prop::collection::btree_map(0u8..32, prop::collection::vec(any::<u8>(), 0..4), 0..8)
    }

    fn values(mask: PropertyMask) -> BTreeMap<u8, Vec<u8>> {
        mask.properties().map(|index| (index, vec![index; 20])).collect()
    }

    #[test]
    fn matching_measurements_pass() {
        let mask = PropertyMask::BASIC_SET;
        assert_eq!(evaluate(&values(mask), &values(mask), mask, true), Ok(()));
    }

    #[test]
    fn nonce_mismatch_fails_even_with_matching_measurements() {
        let mask = PropertyMask::BASIC_SET;
        assert_eq!(
            evaluate(&values(mask), &values(mask), mask, false),
            Err(FailureReason::NonceMismatch)
        );
    }

    #[test]
    fn single_differing_property_fails() {
        let mask = PropertyMask::BASIC_SET;
        let mut actual = values(mask);
        actual.insert(4, vec![0xFF; 20]);

        assert_eq!(
            evaluate(&values(mask), &actual, mask, true),
            Err(FailureReason::MeasurementMismatch)
        );
    }

    #[test]
    fn missing_reference_value_fails() {
        let mask = PropertyMask::KERNEL | PropertyMask::RUNTIME;
        let expected = values(PropertyMask::KERNEL);

        assert_eq!(
            evaluate(&expected, &values(mask), mask, true),
            Err(FailureReason::MeasurementMismatch)
        );
    }

    #[test]
    fn properties_outside_mask_are_ignored() {
        let mask = PropertyMask::KERNEL;
        let mut actual = values(mask);
        actual.insert(3, vec![0xEE]);

        assert_eq!(evaluate(&values(mask), &actual, mask, true), Ok(()));
    }

    #[test]
    fn empty_mask_fails() {
        let empty = PropertyMask::empty();
        let measured = values(PropertyMask::BASIC_SET);

        assert_eq!(
            evaluate(&measured, &measured, empty, true),
            Err(FailureReason::MeasurementMismatch)
        );
    }

    proptest! {
        #[test]
        fn evaluate_is_deterministic(
            bits in any::<u32>(),
            expected in measurements(),
            actual in measurements(),
            nonce_match in any::<bool>(),
        ) {
            let mask = PropertyMask::from_bits_retain(bits);
            let first = evaluate(&expected, &actual, mask, nonce_match);
            let second = evaluate(&expected, &actual, mask, nonce_match);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn no_partial_pass(bits in 1u32.., flip in 0u8..32) {
            let mask = PropertyMask::from_bits_retain(bits);
            prop_assume!(mask.properties().any(|index| index == flip));

            let expected = values(mask);
            let mut actual = expected.clone();
            actual.insert(flip, vec![0xFF; 21]);

            prop_assert_eq!(
                evaluate(&expected, &actual, mask, true),
                Err(FailureReason::MeasurementMismatch)
            );
        }
    }
}
