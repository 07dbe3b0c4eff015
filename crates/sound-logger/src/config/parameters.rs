//! Acquisition parameters file.
//!
//! `config/parameters.json` names the sequences to acquire. Exactly one
//! weighting class may be present in `AcousticSequences`; mixing A/C/Z
//! parameters is rejected at load time. Remote parameter updates rewrite
//! the file atomically and restart the pipeline.

use crate::{AppError, AppResult};

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::panic::Location;
use std::path::Path;

use error_location::ErrorLocation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sound_logger_core::Weighting;
use tracing::{info, warn};

const A_WEIGHTED: [&str; 4] = ["LAeq", "LAF", "LAFmin", "LAFmax"];
const C_WEIGHTED: [&str; 4] = ["LCeq", "LCF", "LCFmin", "LCFmax"];
const Z_WEIGHTED: [&str; 4] = ["LZeq", "LZF", "LZFmin", "LZFmax"];

/// Sequence selection loaded from the parameters file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Parameters {
    /// Per-second acoustic parameters to acquire and store.
    #[serde(rename = "AcousticSequences", default)]
    pub acoustic_sequences: Vec<String>,
    /// Reserved for spectrum acquisition.
    #[serde(rename = "SpectrumSequences", default)]
    pub spectrum_sequences: Vec<String>,
    /// Non-empty enables minute-aligned audio capture.
    #[serde(rename = "AudioSequences", default)]
    pub audio_sequences: Vec<String>,
}

/// `updated_parameters` block of the remote device document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatedParameters {
    /// Replacement acoustic sequences, single value or list.
    #[serde(rename = "AcousticSequences", default)]
    pub acoustic_sequences: Option<Value>,
    /// Replacement spectrum sequences, single value or list.
    #[serde(rename = "SpectrumSequences", default)]
    pub spectrum_sequences: Option<Value>,
    /// Replacement audio sequences, single value or list.
    #[serde(rename = "AudioSequences", default)]
    pub audio_sequences: Option<Value>,
}

impl UpdatedParameters {
    /// Whether the remote actually requested a change.
    pub fn is_empty(&self) -> bool {
        self.acoustic_sequences.is_none()
            && self.spectrum_sequences.is_none()
            && self.audio_sequences.is_none()
    }
}

impl Parameters {
    /// Loads and validates the parameters file.
    #[track_caller]
    pub fn load(path: &Path) -> AppResult<Self> {
        let contents = fs::read_to_string(path).map_err(|e| AppError::ConfigError {
            reason: format!("read {path:?}: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let parameters: Parameters =
            serde_json::from_str(&contents).map_err(|e| AppError::ConfigError {
                reason: format!("parse {path:?}: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })?;

        parameters.weighting()?;

        info!(path = ?path, sequences = ?parameters.acoustic_sequences, "Parameters loaded");

        Ok(parameters)
    }

    /// Single weighting class of the acoustic sequences.
    ///
    /// Errors when no supported parameter is present or when classes are
    /// mixed; unsupported names are warned about and ignored.
    #[track_caller]
    pub fn weighting(&self) -> AppResult<Weighting> {
        let names: BTreeSet<&str> = self.acoustic_sequences.iter().map(String::as_str).collect();

        let a = A_WEIGHTED.iter().any(|p| names.contains(p));
        let c = C_WEIGHTED.iter().any(|p| names.contains(p));
        let z = Z_WEIGHTED.iter().any(|p| names.contains(p));

        let classes = usize::from(a) + usize::from(c) + usize::from(z);
        if classes == 0 {
            return Err(AppError::ConfigError {
                reason: format!(
                    "no valid weighting parameters found in {:?}",
                    self.acoustic_sequences
                ),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        if classes > 1 {
            return Err(AppError::ConfigError {
                reason: format!(
                    "mixed weighting parameters not allowed: {:?}",
                    self.acoustic_sequences
                ),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let unsupported: Vec<&str> = names
            .iter()
            .copied()
            .filter(|n| {
                !A_WEIGHTED.contains(n) && !C_WEIGHTED.contains(n) && !Z_WEIGHTED.contains(n)
            })
            .collect();
        if !unsupported.is_empty() {
            warn!(?unsupported, "Ignoring unsupported acoustic parameters");
        }

        if a {
            Ok(Weighting::A)
        } else if c {
            Ok(Weighting::C)
        } else {
            Ok(Weighting::Z)
        }
    }

    /// The acoustic sequences the pipeline recognizes, in file order.
    pub fn enabled_sequences(&self) -> Vec<String> {
        self.acoustic_sequences
            .iter()
            .filter(|n| {
                let n = n.as_str();
                A_WEIGHTED.contains(&n) || C_WEIGHTED.contains(&n) || Z_WEIGHTED.contains(&n)
            })
            .cloned()
            .collect()
    }

    /// Whether audio capture is enabled.
    pub fn audio_enabled(&self) -> bool {
        !self.audio_sequences.is_empty()
    }

    /// Builds the replacement parameter set from a remote update. Single
    /// values are wrapped into lists; null fields become empty lists.
    pub fn from_update(update: &UpdatedParameters) -> Self {
        Self {
            acoustic_sequences: normalize(&update.acoustic_sequences),
            spectrum_sequences: normalize(&update.spectrum_sequences),
            audio_sequences: normalize(&update.audio_sequences),
        }
    }

    /// Saves the parameters file using the atomic write pattern: write to a
    /// temporary file first, then rename, so a crash cannot corrupt it.
    #[track_caller]
    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        let temp_path = path.with_extension("json.tmp");

        let mut temp_file = fs::File::create(&temp_path)?;
        temp_file.write_all(contents.as_bytes())?;
        temp_file.sync_all()?;
        fs::rename(&temp_path, path)?;

        info!(path = ?path, "Parameters saved (atomic write)");

        Ok(())
    }
}

fn normalize(value: &Option<Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(single)) => vec![single.clone()],
        Some(other) => vec![other.to_string()],
    }
}
