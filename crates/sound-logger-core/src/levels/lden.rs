use super::laeq::round2;

/// Day-evening-night composite noise indicator.
///
/// `Lden = 10·log10(12/24·10^(Lday/10) + 4/24·10^((Levening+5)/10)
/// + 8/24·10^((Lnight+10)/10))`, rounded to two decimals. Evening carries a
/// +5 dB penalty and night +10 dB.
pub fn lden(lday: f64, levening: f64, lnight: f64) -> f64 {
    let day = (12.0 / 24.0) * 10f64.powf(lday / 10.0);
    let evening = (4.0 / 24.0) * 10f64.powf((levening + 5.0) / 10.0);
    let night = (8.0 / 24.0) * 10f64.powf((lnight + 10.0) / 10.0);

    round2(10.0 * (day + evening + night).log10())
}
