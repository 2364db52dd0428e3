//! Edge weights for quality-guided phase unwrapping
//!
//! Each edge between 6-connected voxels gets a quality in [1, 255] built from:
//! - Phase coherence: `1 - |wrap(Δφ)| / π`
//! - Magnitude coherence: `(min / max)²`
//! - Magnitude weight: `0.5 + 0.5 * min(1, m / (0.5 * max m))` for both voxels
//!
//! Reference:
//! Dymerska B, et al. Phase unwrapping with a rapid opensource minimum spanning
//! tree algorithm (ROMEO). Magnetic Resonance in Medicine. 2021;85(4):2294-2308.

use std::f64::consts::PI;

use crate::fft::{idx3d, wrap_angle};

/// Which weight components contribute to the edge quality
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightComponents {
    pub magnitude_coherence: bool,
    pub magnitude_weight: bool,
}

impl Default for WeightComponents {
    fn default() -> Self {
        WeightComponents {
            magnitude_coherence: true,
            magnitude_weight: true,
        }
    }
}

/// Calculate edge weights for region-growing unwrapping
///
/// Edges with either end outside the mask get 0. In-mask edges are at least
/// 1 so every voxel of a connected mask component stays reachable.
///
/// # Arguments
/// * `phase` - Wrapped phase (nx * ny * nz)
/// * `mag` - Optional magnitude (nx * ny * nz) for the magnitude terms
/// * `mask` - Binary mask (nx * ny * nz)
/// * `nx`, `ny`, `nz` - Array dimensions
/// * `components` - Enabled magnitude terms
///
/// # Returns
/// Weights of size 3 * nx * ny * nz, layout [dim][x][y][z], stored at the
/// lower corner of each edge
pub fn calculate_weights(
    phase: &[f64],
    mag: Option<&[f64]>,
    mask: &[u8],
    nx: usize, ny: usize, nz: usize,
    components: WeightComponents,
) -> Vec<u8> {
    let n_total = nx * ny * nz;
    let mut weights = vec![0u8; 3 * n_total];

    let max_mag = mag
        .map(|m| m.iter().cloned().filter(|v| v.is_finite()).fold(0.0_f64, f64::max))
        .unwrap_or(1.0);
    let half_max_mag = 0.5 * max_mag + 1e-12;

    for dim in 0..3_usize {
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let (ni, nj, nk) = match dim {
                        0 => (i + 1, j, k),
                        1 => (i, j + 1, k),
                        _ => (i, j, k + 1),
                    };
                    if ni >= nx || nj >= ny || nk >= nz {
                        continue;
                    }

                    let idx = idx3d(i, j, k, nx, ny);
                    let idx_n = idx3d(ni, nj, nk, nx, ny);
                    if mask[idx] == 0 || mask[idx_n] == 0 {
                        continue;
                    }

                    let pc = 1.0 - wrap_angle(phase[idx_n] - phase[idx]).abs() / PI;

                    let (mc, mw) = match mag {
                        Some(m) => {
                            let (m1, m2) = (m[idx], m[idx_n]);
                            let mc = if components.magnitude_coherence {
                                let (lo, hi) = (m1.min(m2), m1.max(m2));
                                if hi > 1e-12 { (lo / hi).powi(2) } else { 0.0 }
                            } else {
                                1.0
                            };
                            let mw = if components.magnitude_weight {
                                (0.5 + 0.5 * (m1 / half_max_mag).min(1.0))
                                    * (0.5 + 0.5 * (m2 / half_max_mag).min(1.0))
                            } else {
                                1.0
                            };
                            (mc, mw)
                        }
                        None => (1.0, 1.0),
                    };

                    let weight = pc * mc * mw;
                    let weight = if weight.is_finite() { weight.clamp(0.0, 1.0) } else { 0.0 };
                    weights[dim * n_total + idx] = ((weight * 255.0) as u8).max(1);
                }
            }
        }
    }

    weights
}
