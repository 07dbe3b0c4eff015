use crate::{group_uncertainty, interval_uncertainty, lden_uncertainty};

fn quiet_background() -> Vec<f64> {
    vec![30.0; 60]
}

/// WHAT: A spread-free group carries only the residual contribution
/// WHY: Identical levels have zero energy deviation, so u'k vanishes
#[test]
fn given_constant_group_when_computing_then_spread_term_vanishes() {
    let group = group_uncertainty(&[60.0, 60.0, 60.0], &quiet_background()).unwrap();

    assert!((group.level_db - 60.0).abs() < 1e-9);
    // Background correction barely moves a level 30 dB above the residual.
    assert!((group.corrected_db - 60.0).abs() < 0.01);
    // Only the residual sensitivity term remains, and it is tiny.
    assert!(group.expanded > 0.0);
    assert!(group.expanded < 0.05);
}

/// WHAT: Wider level spread increases the group uncertainty
/// WHY: u'k derives from the energy-domain standard deviation
#[test]
fn given_spread_groups_when_computing_then_uncertainty_grows_with_spread() {
    let tight = group_uncertainty(&[60.0, 60.5, 59.5], &quiet_background()).unwrap();
    let wide = group_uncertainty(&[55.0, 65.0, 60.0], &quiet_background()).unwrap();

    assert!(wide.expanded > tight.expanded);
}

/// WHAT: Degenerate groups produce no result
/// WHY: Fewer than two levels, no background, or background above the
///      signal make the Annex G correction meaningless
#[test]
fn given_degenerate_groups_when_computing_then_none() {
    assert!(group_uncertainty(&[60.0], &quiet_background()).is_none());
    assert!(group_uncertainty(&[60.0, 61.0], &[]).is_none());
    assert!(group_uncertainty(&[60.0, 61.0], &[f64::NAN]).is_none());
    // Residual P90 at the signal level: nothing left after subtraction.
    assert!(group_uncertainty(&[40.0, 40.0], &[70.0; 10]).is_none());
}

/// WHAT: Interval combination needs all four groups
/// WHY: A missing group aborts the indicator's uncertainty
#[test]
fn given_three_groups_when_combining_then_none() {
    let g = group_uncertainty(&[60.0, 61.0, 59.0], &quiet_background()).unwrap();

    assert!(interval_uncertainty(&[g, g, g], 60.0).is_none());
}

/// WHAT: Interval result folds in reference offset and instrument floor
/// WHY: L_ref = L + 1.0 and U >= 0.2 dB by construction
#[test]
fn given_four_groups_when_combining_then_reference_and_floor_hold() {
    let g = group_uncertainty(&[60.0, 61.0, 59.0], &quiet_background()).unwrap();

    let interval = interval_uncertainty(&[g, g, g, g], 60.0).unwrap();

    assert!((interval.reference_db - 61.0).abs() < f64::EPSILON);
    assert!(interval.expanded >= 0.2);
    assert!(interval.expanded < 5.0);
}

/// WHAT: Combined U(Lden) is bounded by the worst component
/// WHY: The energy-weighted quadrature is a weighted mean, not a sum
#[test]
fn given_interval_uncertainties_when_combining_then_bounded_by_max() {
    let g = group_uncertainty(&[60.0, 61.0, 59.0], &quiet_background()).unwrap();
    let day = interval_uncertainty(&[g, g, g, g], 60.0).unwrap();
    let evening = interval_uncertainty(&[g, g, g, g], 55.0).unwrap();
    let night = interval_uncertainty(&[g, g, g, g], 50.0).unwrap();

    let combined = lden_uncertainty(day, evening, night);

    let max = day.expanded.max(evening.expanded).max(night.expanded);
    assert!(combined > 0.0);
    assert!(combined <= max + 0.01);
}
