use crate::{SensorVariant, Weighting};

/// WHAT: By-id entries resolve to the right hardware revision
/// WHY: The presence loop picks the driver from the entry keywords
#[test]
fn given_by_id_entries_when_matching_then_revision_identified() {
    assert_eq!(
        SensorVariant::matching("usb-Convergence_Instruments_NSRT_mk3_12345-if00"),
        Some(SensorVariant::Mk3)
    );
    assert_eq!(
        SensorVariant::matching("usb-Convergence_Instruments_NSRT_mk4_98765-if00"),
        Some(SensorVariant::Mk4)
    );
    assert_eq!(
        SensorVariant::matching("usb-SomeVendor_Widget_0001-if00"),
        None
    );
    // All keywords must match, not just some.
    assert_eq!(SensorVariant::matching("usb-NSRT_mk3-if00"), None);
}

/// WHAT: Weighting register values round-trip
/// WHY: The configured curve must be verifiable after a device reset
#[test]
fn given_weightings_when_encoding_then_register_round_trips() {
    for weighting in [Weighting::A, Weighting::C, Weighting::Z] {
        let value = weighting.register_value();
        assert_eq!(Weighting::from_register_value(value).unwrap(), weighting);
    }

    assert!(Weighting::from_register_value(9).is_err());
}

/// WHAT: Weighting letters name the parameter families
/// WHY: `LAeq`/`LCeq`/`LZeq` derive from the curve letter
#[test]
fn given_weightings_when_naming_then_letters_match() {
    assert_eq!(Weighting::A.letter(), 'A');
    assert_eq!(Weighting::C.letter(), 'C');
    assert_eq!(Weighting::Z.letter(), 'Z');
}
