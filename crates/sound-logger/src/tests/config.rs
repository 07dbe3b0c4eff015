use crate::config::{Parameters, UpdatedParameters};

use serde_json::json;
use sound_logger_core::Weighting;

fn params(acoustic: &[&str]) -> Parameters {
    Parameters {
        acoustic_sequences: acoustic.iter().map(|s| s.to_string()).collect(),
        spectrum_sequences: Vec::new(),
        audio_sequences: Vec::new(),
    }
}

/// WHAT: A single weighting class resolves to its letter
/// WHY: The device is configured from the parameter names
#[test]
fn given_single_class_when_extracting_weighting_then_letter_returned() {
    assert_eq!(
        params(&["LAeq", "LAF", "LAFmax"]).weighting().unwrap(),
        Weighting::A
    );
    assert_eq!(params(&["LCeq"]).weighting().unwrap(), Weighting::C);
    assert_eq!(params(&["LZF", "LZeq"]).weighting().unwrap(), Weighting::Z);
}

/// WHAT: Mixed weighting classes are rejected
/// WHY: The meter applies exactly one weighting curve at a time
#[test]
fn given_mixed_classes_when_extracting_weighting_then_error() {
    assert!(params(&["LAeq", "LCeq"]).weighting().is_err());
}

/// WHAT: No recognized parameter is rejected
/// WHY: An empty acquisition set is a configuration error, not a no-op
#[test]
fn given_no_valid_parameters_when_extracting_weighting_then_error() {
    assert!(params(&[]).weighting().is_err());
    assert!(params(&["Lmystery"]).weighting().is_err());
}

/// WHAT: Unsupported names are dropped from the enabled set
/// WHY: Unknown sequences must not create tables or sampler rows
#[test]
fn given_unsupported_names_when_filtering_then_only_known_remain() {
    let parameters = params(&["LAeq", "Lmystery", "LAFmin"]);

    assert_eq!(parameters.enabled_sequences(), vec!["LAeq", "LAFmin"]);
}

/// WHAT: Remote updates normalize scalars and nulls into lists
/// WHY: The device document may carry a single value where a list belongs
#[test]
fn given_scalar_update_when_building_parameters_then_wrapped_in_list() {
    let update = UpdatedParameters {
        acoustic_sequences: Some(json!(["LAeq", "LAF"])),
        spectrum_sequences: Some(json!(null)),
        audio_sequences: Some(json!("1")),
    };

    let parameters = Parameters::from_update(&update);

    assert_eq!(parameters.acoustic_sequences, vec!["LAeq", "LAF"]);
    assert!(parameters.spectrum_sequences.is_empty());
    assert_eq!(parameters.audio_sequences, vec!["1"]);
    assert!(parameters.audio_enabled());
}

/// WHAT: An all-null update block is recognized as empty
/// WHY: The reset state of updated_parameters must not trigger restarts
#[test]
fn given_null_update_when_checking_then_empty() {
    let update: UpdatedParameters =
        serde_json::from_value(json!({
            "AcousticSequences": null,
            "SpectrumSequences": null,
            "AudioSequences": null,
        }))
        .unwrap();

    assert!(update.is_empty());
}

/// WHAT: Saved parameters load back identically
/// WHY: Remote rewrites go through disk before the pipeline restarts
#[test]
fn given_saved_parameters_when_loading_then_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("parameters.json");

    let parameters = Parameters {
        acoustic_sequences: vec!["LAeq".into(), "LAF".into()],
        spectrum_sequences: Vec::new(),
        audio_sequences: vec!["1".into()],
    };
    parameters.save(&path).unwrap();

    let loaded = Parameters::load(&path).unwrap();
    assert_eq!(loaded.acoustic_sequences, parameters.acoustic_sequences);
    assert_eq!(loaded.audio_sequences, parameters.audio_sequences);
    assert!(loaded.audio_enabled());
}
