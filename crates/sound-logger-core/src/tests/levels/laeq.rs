use crate::{is_valid_level, laeq, round2};

/// WHAT: A constant window averages to itself
/// WHY: Eight identical tau samples must reproduce the level exactly
#[test]
fn given_constant_levels_when_averaging_then_laeq_equals_input() {
    let levels = vec![70.0; 8];

    let value = laeq(&levels).unwrap();

    assert!((value - 70.0).abs() < f64::EPSILON);
}

/// WHAT: Energy averaging is dominated by the louder sample
/// WHY: LAeq is a mean of energies, not of dB values
#[test]
fn given_asymmetric_levels_when_averaging_then_energy_mean_applies() {
    let value = laeq(&[60.0, 80.0]).unwrap();

    // 10*log10((1e6 + 1e8) / 2)
    assert!((value - 77.03).abs() < 0.01);
}

/// WHAT: Empty windows yield no value
/// WHY: A missing aggregate is skipped, never written as a placeholder
#[test]
fn given_empty_window_when_averaging_then_none() {
    assert_eq!(laeq(&[]), None);
}

/// WHAT: Rounding keeps two decimals
/// WHY: Stored rows carry two-decimal dB values
#[test]
fn given_fractional_value_when_rounding_then_two_decimals_remain() {
    assert!((round2(77.034_99) - 77.03).abs() < f64::EPSILON);
    assert!((round2(77.035_01) - 77.04).abs() < f64::EPSILON);
}

/// WHAT: Validity gate rejects non-finite and absurd magnitudes
/// WHY: Every stored value must be finite and below 1000 dB in magnitude
#[test]
fn given_invalid_levels_when_validating_then_rejected() {
    assert!(is_valid_level(54.32));
    assert!(is_valid_level(-12.5));
    assert!(!is_valid_level(f64::NAN));
    assert!(!is_valid_level(f64::INFINITY));
    assert!(!is_valid_level(f64::NEG_INFINITY));
    assert!(!is_valid_level(1_000.0));
}
