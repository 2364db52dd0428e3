//! Mask generation utilities
//!
//! Signal masks from relative magnitude thresholds, connected-component
//! labelling, and geometric masks for synthetic data. All masks use Fortran
//! ordering to match NIfTI convention: index = x + y*nx + z*nx*ny.

use std::collections::VecDeque;

use crate::fft::idx3d;

/// Binary signal mask from a fraction of the maximum magnitude
///
/// `mask[v] = 1` iff `mag[v] > fraction * max(mag)`. An all-zero (or empty)
/// magnitude gives an all-zero mask. Non-finite samples (NaN, ±inf) are
/// never in the mask and do not set the maximum.
pub fn threshold_mask(mag: &[f64], fraction: f64) -> Vec<u8> {
    let max_mag = mag.iter()
        .cloned()
        .filter(|v| v.is_finite())
        .fold(0.0_f64, f64::max);

    if max_mag <= 0.0 {
        return vec![0u8; mag.len()];
    }

    let threshold = fraction * max_mag;
    mag.iter().map(|&m| u8::from(m.is_finite() && m > threshold)).collect()
}

/// Number of voxels inside a mask
pub fn mask_count(mask: &[u8]) -> usize {
    mask.iter().filter(|&&m| m > 0).count()
}

/// Mask as a 0/1 float volume
pub fn mask_to_f64(mask: &[u8]) -> Vec<f64> {
    mask.iter().map(|&m| if m > 0 { 1.0 } else { 0.0 }).collect()
}

/// Label 6-connected components of a mask
///
/// Returns labels (0 = background, 1..=n = component) and the number of
/// components. Labels are assigned in Fortran scan order.
pub fn label_components(mask: &[u8], nx: usize, ny: usize, nz: usize) -> (Vec<u32>, usize) {
    let mut labels = vec![0u32; nx * ny * nz];
    let mut n_components = 0usize;
    let mut queue = VecDeque::new();

    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let start = idx3d(i, j, k, nx, ny);
                if mask[start] == 0 || labels[start] != 0 {
                    continue;
                }

                n_components += 1;
                let label = n_components as u32;
                labels[start] = label;
                queue.push_back((i, j, k));

                while let Some((ci, cj, ck)) = queue.pop_front() {
                    let mut visit = |ni: usize, nj: usize, nk: usize| {
                        let idx = idx3d(ni, nj, nk, nx, ny);
                        if mask[idx] != 0 && labels[idx] == 0 {
                            labels[idx] = label;
                            queue.push_back((ni, nj, nk));
                        }
                    };
                    if ci > 0 { visit(ci - 1, cj, ck); }
                    if ci + 1 < nx { visit(ci + 1, cj, ck); }
                    if cj > 0 { visit(ci, cj - 1, ck); }
                    if cj + 1 < ny { visit(ci, cj + 1, ck); }
                    if ck > 0 { visit(ci, cj, ck - 1); }
                    if ck + 1 < nz { visit(ci, cj, ck + 1); }
                }
            }
        }
    }

    (labels, n_components)
}

/// Create a binary sphere mask on a 3D volume
///
/// Voxels within `radius` (in voxels) of the center are 1, all others 0.
pub fn create_sphere_mask(
    nx: usize, ny: usize, nz: usize,
    center_x: f64, center_y: f64, center_z: f64,
    radius: f64,
) -> Vec<u8> {
    let mut mask = vec![0u8; nx * ny * nz];
    let r2 = radius * radius;

    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let dx = i as f64 - center_x;
                let dy = j as f64 - center_y;
                let dz = k as f64 - center_z;
                if dx * dx + dy * dy + dz * dz <= r2 {
                    mask[idx3d(i, j, k, nx, ny)] = 1;
                }
            }
        }
    }

    mask
}
