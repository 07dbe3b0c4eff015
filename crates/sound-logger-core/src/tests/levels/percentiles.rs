use crate::{percentile, percentile_set};

/// WHAT: Percentile labels follow the exceedance convention
/// WHY: L50/L90/L10 over 10..=100 must interpolate to 55/19/91
#[test]
fn given_decade_values_when_computing_set_then_interpolated_levels_match() {
    let values: Vec<f64> = (1..=10).map(|v| f64::from(v) * 10.0).collect();

    let set = percentile_set(&values).unwrap();

    assert!((set.l50 - 55.0).abs() < f64::EPSILON);
    assert!((set.l90 - 19.0).abs() < f64::EPSILON);
    assert!((set.l10 - 91.0).abs() < f64::EPSILON);
    assert!((set.l5 - 95.5).abs() < f64::EPSILON);
    assert!((set.l95 - 14.5).abs() < f64::EPSILON);
}

/// WHAT: Non-finite samples are dropped before ranking
/// WHY: A single NaN in the window must not poison the statistics
#[test]
fn given_nan_samples_when_computing_set_then_finite_subset_is_ranked() {
    let values = vec![40.0, f64::NAN, 60.0, f64::INFINITY, 50.0];

    let set = percentile_set(&values).unwrap();

    assert!((set.l50 - 50.0).abs() < f64::EPSILON);
}

/// WHAT: Entirely invalid windows yield no row
/// WHY: Missing percentile aggregates are skipped, not zero-filled
#[test]
fn given_only_invalid_samples_when_computing_set_then_none() {
    assert!(percentile_set(&[f64::NAN, f64::INFINITY]).is_none());
    assert!(percentile_set(&[]).is_none());
}

/// WHAT: Single-element windows return the element for every rank
/// WHY: Interpolation must degrade gracefully at n=1
#[test]
fn given_single_value_when_ranking_then_value_returned() {
    assert!((percentile(&[42.0], 90.0).unwrap() - 42.0).abs() < f64::EPSILON);
    assert!((percentile(&[42.0], 5.0).unwrap() - 42.0).abs() < f64::EPSILON);
}

/// WHAT: Unsorted input ranks identically to sorted input
/// WHY: Callers pass rows in timestamp order, not level order
#[test]
fn given_unsorted_values_when_ranking_then_order_does_not_matter() {
    let a = percentile(&[30.0, 10.0, 20.0], 50.0).unwrap();
    let b = percentile(&[10.0, 20.0, 30.0], 50.0).unwrap();

    assert!((a - b).abs() < f64::EPSILON);
}
