/// Largest magnitude a sound level row may carry, in dB.
const MAX_LEVEL_DB: f64 = 1_000.0;

/// Rounds a level to two decimals, the precision every stored row carries.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Whether a computed level may be stored: finite and below 1000 dB in
/// magnitude. NaN and infinities from degenerate windows are rejected here
/// rather than at the database.
pub fn is_valid_level(value: f64) -> bool {
    value.is_finite() && value.abs() < MAX_LEVEL_DB
}

/// Equivalent continuous sound level over a set of dB values.
///
/// `LAeq = 10·log10(mean(10^(x/10)))`, rounded to two decimals. Returns
/// `None` for an empty input window.
pub fn laeq(sound_levels: &[f64]) -> Option<f64> {
    if sound_levels.is_empty() {
        return None;
    }

    let energy_sum: f64 = sound_levels.iter().map(|l| 10f64.powf(l / 10.0)).sum();
    let mean = energy_sum / sound_levels.len() as f64;

    Some(round2(10.0 * mean.log10()))
}
