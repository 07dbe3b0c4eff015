use super::laeq::round2;

/// Statistical level set stored per percentile row.
///
/// Follows the "level exceeded N% of the time" convention: `L5` is the 95th
/// percentile of the window, `L95` the 5th.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentileSet {
    /// Level exceeded 5% of the time (95th percentile).
    pub l5: f64,
    /// Level exceeded 10% of the time (90th percentile).
    pub l10: f64,
    /// Median level.
    pub l50: f64,
    /// Level exceeded 90% of the time (10th percentile).
    pub l90: f64,
    /// Level exceeded 95% of the time (5th percentile).
    pub l95: f64,
}

/// Percentile with linear interpolation between closest ranks.
///
/// `values` does not need to be ordered; non-finite entries must already be
/// filtered out. Returns `None` for an empty input.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        return Some(sorted[lower]);
    }

    let fraction = rank - lower as f64;
    Some(sorted[lower] + fraction * (sorted[upper] - sorted[lower]))
}

/// Computes the L5/L10/L50/L90/L95 set over a window of instantaneous
/// levels, dropping non-finite values first. Returns `None` when nothing
/// finite remains.
pub fn percentile_set(values: &[f64]) -> Option<PercentileSet> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }

    Some(PercentileSet {
        l5: round2(percentile(&finite, 95.0)?),
        l10: round2(percentile(&finite, 90.0)?),
        l50: round2(percentile(&finite, 50.0)?),
        l90: round2(percentile(&finite, 10.0)?),
        l95: round2(percentile(&finite, 5.0)?),
    })
}
