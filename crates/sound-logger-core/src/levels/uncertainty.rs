//! Expanded measurement uncertainty following ISO 1996-2 Annex G.
//!
//! Each daily indicator (Lday, Levening, Lnight) is split into four time
//! groups. Per group, the spread of the equivalent levels and the residual
//! background (L90 of the instantaneous samples) combine into an expanded
//! group uncertainty; the groups are then energy-weighted into the interval
//! uncertainty, and the three intervals combine into U(Lden).

use super::laeq::round2;
use super::percentiles::percentile;

/// Residual-level uncertainty numerator, in dB, before the 1/sqrt(n) scaling.
const RESIDUAL_UNCERTAINTY_DB: f64 = 4.0;
/// Position uncertainty applied to every group.
const POSITION_UNCERTAINTY: f64 = 0.05;
/// Instrument uncertainty folded into the interval result.
const INSTRUMENT_UNCERTAINTY_DB: f64 = 0.2;
/// Offset between the measured indicator and its reference level.
const REFERENCE_OFFSET_DB: f64 = 1.0;

/// Per-group uncertainty components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupUncertainty {
    /// Energy-average level of the group, in dB.
    pub level_db: f64,
    /// Level corrected for residual background, in dB.
    pub corrected_db: f64,
    /// Expanded uncertainty of the corrected level.
    pub expanded: f64,
    /// Energy weight token of the group (quarter-weighted linear energy).
    pub weighted_energy: f64,
}

/// Interval (Lday / Levening / Lnight) uncertainty result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalUncertainty {
    /// Reference level: the indicator plus the fixed offset.
    pub reference_db: f64,
    /// Expanded uncertainty of the reference level.
    pub expanded: f64,
}

/// Computes the uncertainty components for one time group.
///
/// `levels` are the group's equivalent levels in dB, `background` the
/// instantaneous fast-weighted samples over the same window. Returns `None`
/// when the group has fewer than two levels, no finite background samples,
/// or when the residual background swamps the measured energy (the
/// background correction would have no solution).
pub fn group_uncertainty(levels: &[f64], background: &[f64]) -> Option<GroupUncertainty> {
    let n = levels.len();
    if n < 2 {
        return None;
    }

    let energies: Vec<f64> = levels.iter().map(|l| 10f64.powf(0.1 * l)).collect();
    let mean_energy = energies.iter().sum::<f64>() / n as f64;
    let level_db = 10.0 * mean_energy.log10();

    let squared: f64 = energies.iter().map(|e| (e - mean_energy).powi(2)).sum();
    let deviation = (squared / (n - 1) as f64).sqrt();
    let group_u = 10.0 * (mean_energy + deviation).log10() - level_db;

    let finite: Vec<f64> = background.iter().copied().filter(|v| v.is_finite()).collect();
    let residual_db = round2(percentile(&finite, 90.0)?);

    let residual_energy = 10f64.powf(0.1 * residual_db);
    if mean_energy <= residual_energy {
        return None;
    }

    let corrected_db = 10.0 * (mean_energy - residual_energy).log10();

    let u_prime = group_u / (n as f64).sqrt();
    let u_residual = RESIDUAL_UNCERTAINTY_DB / (n as f64).sqrt();

    let margin = 10f64.powf(-0.1 * (level_db - residual_db));
    let c_level = 1.0 / (1.0 - margin);
    let c_residual = c_level * margin;

    let expanded =
        (c_level.powi(2) * u_prime.powi(2) + c_residual.powi(2) * u_residual.powi(2)).sqrt();

    Some(GroupUncertainty {
        level_db,
        corrected_db,
        expanded,
        weighted_energy: 10f64.powf(0.1 * corrected_db) * 0.25,
    })
}

/// Combines the four group results of one interval with the measured
/// indicator into the interval's reference level and expanded uncertainty.
///
/// Returns `None` when the interval does not have its four groups.
pub fn interval_uncertainty(
    groups: &[GroupUncertainty],
    indicator_db: f64,
) -> Option<IntervalUncertainty> {
    if groups.len() < 4 {
        return None;
    }

    let total_energy: f64 = groups.iter().map(|g| g.weighted_energy).sum();
    if total_energy <= 0.0 {
        return None;
    }

    let log_factor = 10.0 * 2.7f64.log10();

    let weighted_sq: f64 = groups
        .iter()
        .map(|g| {
            let cl = g.weighted_energy / total_energy;
            (g.expanded * cl).powi(2)
        })
        .sum();

    let position_sq: f64 = groups
        .iter()
        .map(|g| {
            let cp = log_factor * 10f64.powf(0.1 * g.corrected_db) / total_energy;
            (cp * POSITION_UNCERTAINTY).powi(2)
        })
        .sum();

    let u_weight = (weighted_sq + position_sq).sqrt();

    Some(IntervalUncertainty {
        reference_db: indicator_db + REFERENCE_OFFSET_DB,
        expanded: (u_weight.powi(2) + INSTRUMENT_UNCERTAINTY_DB.powi(2)).sqrt(),
    })
}

/// Combined expanded uncertainty of Lden from the three interval results.
///
/// The intervals are energy-weighted with the same 12/4/8-hour split and
/// +5/+10 dB penalties as Lden itself; the result is rounded to two
/// decimals.
pub fn lden_uncertainty(
    day: IntervalUncertainty,
    evening: IntervalUncertainty,
    night: IntervalUncertainty,
) -> f64 {
    let a = 12.0 * 10f64.powf(0.1 * day.reference_db);
    let b = 4.0 * 10f64.powf(0.1 * (evening.reference_db + 5.0));
    let c = 8.0 * 10f64.powf(0.1 * (night.reference_db + 10.0));

    let numerator = (a.powi(2) * day.expanded.powi(2)
        + b.powi(2) * evening.expanded.powi(2)
        + c.powi(2) * night.expanded.powi(2))
    .sqrt();

    round2(numerator / (a + b + c))
}
