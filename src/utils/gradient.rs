//! Gradient operators for fieldmaps
//!
//! Central-difference gradient with one-sided differences at the volume
//! border (numpy.gradient edge_order=1 convention), and the B0 field gradient
//! in mT/m derived from a Hz fieldmap.

use crate::fft::idx3d;

/// Proton gyromagnetic ratio in Hz/mT
pub const GAMMA_1H_HZ_PER_MT: f64 = 42.58e3;

/// Derivative along one axis of length `n` at position `p`
///
/// `at(q)` returns the sample at position `q` along the axis.
#[inline]
fn axis_derivative(at: impl Fn(usize) -> f64, p: usize, n: usize, h: f64) -> f64 {
    if n < 2 {
        0.0
    } else if p == 0 {
        (at(1) - at(0)) / h
    } else if p == n - 1 {
        (at(n - 1) - at(n - 2)) / h
    } else {
        (at(p + 1) - at(p - 1)) / (2.0 * h)
    }
}

/// Central-difference gradient of a 3D volume
///
/// Interior voxels use `(f[i+1] - f[i-1]) / 2h`, border voxels use one-sided
/// differences, and axes of length 1 have zero derivative.
///
/// # Arguments
/// * `x` - Input array (nx * ny * nz)
/// * `nx`, `ny`, `nz` - Array dimensions
/// * `hx`, `hy`, `hz` - Sample spacing along each axis
///
/// # Returns
/// Tuple of (gx, gy, gz) gradient components
pub fn central_gradient(
    x: &[f64],
    nx: usize, ny: usize, nz: usize,
    hx: f64, hy: f64, hz: f64,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let n_total = nx * ny * nz;
    let mut gx = vec![0.0; n_total];
    let mut gy = vec![0.0; n_total];
    let mut gz = vec![0.0; n_total];

    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let idx = idx3d(i, j, k, nx, ny);
                gx[idx] = axis_derivative(|p| x[idx3d(p, j, k, nx, ny)], i, nx, hx);
                gy[idx] = axis_derivative(|p| x[idx3d(i, p, k, nx, ny)], j, ny, hy);
                gz[idx] = axis_derivative(|p| x[idx3d(i, j, p, nx, ny)], k, nz, hz);
            }
        }
    }

    (gx, gy, gz)
}

/// Spatial gradient of a Hz fieldmap in mT/m
///
/// Each gradient component (Hz/m) is divided by `gamma` (Hz/mT) and
/// multiplied by the mask, so voxels outside the mask are exactly zero.
///
/// # Arguments
/// * `field_hz` - Frequency offset map (nx * ny * nz)
/// * `mask` - Binary mask
/// * `nx`, `ny`, `nz` - Array dimensions
/// * `spacing_m` - Voxel spacing (dx, dy, dz) in metres
/// * `gamma` - Gyromagnetic ratio in Hz/mT
///
/// # Returns
/// Stacked components [gx | gy | gz], length 3 * nx * ny * nz
pub fn field_gradient_mt_per_m(
    field_hz: &[f64],
    mask: &[u8],
    nx: usize, ny: usize, nz: usize,
    spacing_m: (f64, f64, f64),
    gamma: f64,
) -> Vec<f64> {
    let n_total = nx * ny * nz;
    let (dx, dy, dz) = spacing_m;
    let (gx, gy, gz) = central_gradient(field_hz, nx, ny, nz, dx, dy, dz);

    let mut stacked = vec![0.0; 3 * n_total];
    for (c, component) in [gx, gy, gz].iter().enumerate() {
        let out = &mut stacked[c * n_total..(c + 1) * n_total];
        for i in 0..n_total {
            if mask[i] != 0 {
                out[i] = component[i] / gamma;
            }
        }
    }

    stacked
}
