//! Phase difference to B0 field offset
//!
//! `ω = Δφ / ΔTE` (rad/s) and `f = ω / 2π` (Hz).

use std::f64::consts::PI;

/// Angular frequency offset in rad/s, 0 outside the mask
///
/// `delta_te` is the echo time difference in seconds and must be positive;
/// callers validate it before any computation.
pub fn phase_to_angular_frequency(dphi: &[f64], delta_te: f64, mask: &[u8]) -> Vec<f64> {
    dphi.iter()
        .zip(mask.iter())
        .map(|(&p, &m)| if m != 0 { p / delta_te } else { 0.0 })
        .collect()
}

/// Convert angular frequency (rad/s) to frequency (Hz)
pub fn field_to_hz(rad_per_s: &[f64]) -> Vec<f64> {
    rad_per_s.iter().map(|&w| w / (2.0 * PI)).collect()
}
