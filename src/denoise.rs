//! Spatial denoising of the unwrapped phase difference
//!
//! A rank-order (median) filter suppresses isolated unwrapping spikes, then the
//! median of the in-mask values is subtracted so that the arbitrary constant
//! left by unwrapping is removed.

use crate::fft::idx3d;

/// Median of a sample buffer (mean of the two middle values for even counts)
///
/// Reorders `values`. Returns `None` for an empty buffer.
fn median_in_place(values: &mut [f64]) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    let mid = n / 2;
    let (lower, upper_mid, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    let upper_mid = *upper_mid;
    if n % 2 == 1 {
        Some(upper_mid)
    } else {
        let lower_mid = lower.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        Some((lower_mid + upper_mid) / 2.0)
    }
}

/// 3D median filter with zero padding
///
/// The window is `kernel[0] x kernel[1] x kernel[2]` voxels centred on each
/// voxel; samples beyond the volume border count as 0. Kernel sizes should be
/// odd (an even size is treated as the next odd size down).
///
/// # Arguments
/// * `data` - Input volume (nx * ny * nz)
/// * `nx`, `ny`, `nz` - Array dimensions
/// * `kernel` - Window size along x, y, z
pub fn median_filter_3d(
    data: &[f64],
    nx: usize, ny: usize, nz: usize,
    kernel: [usize; 3],
) -> Vec<f64> {
    let rx = (kernel[0].max(1) - 1) / 2;
    let ry = (kernel[1].max(1) - 1) / 2;
    let rz = (kernel[2].max(1) - 1) / 2;
    let window_len = (2 * rx + 1) * (2 * ry + 1) * (2 * rz + 1);

    let mut out = vec![0.0; nx * ny * nz];
    let mut window = Vec::with_capacity(window_len);

    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                window.clear();
                for dk in 0..=2 * rz {
                    for dj in 0..=2 * ry {
                        for di in 0..=2 * rx {
                            let (si, sj, sk) = (i + di, j + dj, k + dk);
                            let inside = si >= rx && sj >= ry && sk >= rz
                                && si - rx < nx && sj - ry < ny && sk - rz < nz;
                            window.push(if inside {
                                data[idx3d(si - rx, sj - ry, sk - rz, nx, ny)]
                            } else {
                                0.0
                            });
                        }
                    }
                }
                out[idx3d(i, j, k, nx, ny)] = median_in_place(&mut window).unwrap_or(0.0);
            }
        }
    }

    out
}

/// Median of the values inside a mask, `None` if the mask is empty
pub fn masked_median(data: &[f64], mask: &[u8]) -> Option<f64> {
    let mut values: Vec<f64> = data.iter()
        .zip(mask.iter())
        .filter(|(_, &m)| m != 0)
        .map(|(&v, _)| v)
        .collect();
    median_in_place(&mut values)
}

/// Median-filter the unwrapped phase and remove its in-mask median
///
/// # Returns
/// Tuple of (denoised phase, 0 outside the mask; removed offset in radians)
pub fn denoise_phase(
    phase: &[f64],
    mask: &[u8],
    nx: usize, ny: usize, nz: usize,
    kernel: [usize; 3],
) -> (Vec<f64>, f64) {
    let mut filtered = median_filter_3d(phase, nx, ny, nz, kernel);
    for (v, &m) in filtered.iter_mut().zip(mask.iter()) {
        if m == 0 {
            *v = 0.0;
        }
    }

    let offset = masked_median(&filtered, mask).unwrap_or(0.0);
    for (v, &m) in filtered.iter_mut().zip(mask.iter()) {
        if m != 0 {
            *v -= offset;
        }
    }

    (filtered, offset)
}
