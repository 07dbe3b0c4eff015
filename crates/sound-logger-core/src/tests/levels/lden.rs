use crate::lden;

/// WHAT: Penalized components that equalize produce the common level
/// WHY: lday=60, levening+5=60 and lnight+10=60 must compose to 60.00
#[test]
fn given_equalizing_penalties_when_composing_then_lden_is_common_level() {
    let value = lden(60.0, 55.0, 50.0);

    assert!((value - 60.0).abs() < 0.01);
}

/// WHAT: Evening and night penalties raise the composite
/// WHY: Identical raw components must not yield the raw level
#[test]
fn given_flat_day_when_composing_then_penalties_dominate() {
    let value = lden(50.0, 50.0, 50.0);

    // 10*log10(0.5*1e5 + (1/6)*10^5.5 + (1/3)*1e6)
    assert!(value > 50.0);
    assert!((value - 56.40).abs() < 0.05);
}
