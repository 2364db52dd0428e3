//! 3D FFT and shared indexing helpers
//!
//! Transforms operate on Fortran (column-major) ordered volumes to match the
//! NIfTI convention used throughout the crate: index = x + y*nx + z*nx*ny.

use num_complex::Complex64;
use rustfft::{FftDirection, FftPlanner};
use std::f64::consts::PI;

const TWO_PI: f64 = 2.0 * PI;

/// Index into a 3D array stored in Fortran order (column-major)
/// index = x + y*nx + z*nx*ny
#[inline(always)]
pub fn idx3d(i: usize, j: usize, k: usize, nx: usize, ny: usize) -> usize {
    i + j * nx + k * nx * ny
}

/// Wrap angle to [-π, π]
#[inline]
pub fn wrap_angle(angle: f64) -> f64 {
    let mut a = angle % TWO_PI;
    if a > PI {
        a -= TWO_PI;
    } else if a < -PI {
        a += TWO_PI;
    }
    a
}

/// Apply 1D transforms along x, then y, then z
fn transform_3d(data: &mut [Complex64], nx: usize, ny: usize, nz: usize, direction: FftDirection) {
    let mut planner = FftPlanner::new();
    let zero = Complex64::new(0.0, 0.0);

    // x-axis is contiguous (stride 1)
    let fft_x = planner.plan_fft(nx, direction);
    let mut scratch_x = vec![zero; fft_x.get_inplace_scratch_len()];
    for k in 0..nz {
        for j in 0..ny {
            let start = idx3d(0, j, k, nx, ny);
            fft_x.process_with_scratch(&mut data[start..start + nx], &mut scratch_x);
        }
    }

    // y-axis (stride nx): gather, transform, scatter
    let fft_y = planner.plan_fft(ny, direction);
    let mut scratch_y = vec![zero; fft_y.get_inplace_scratch_len()];
    let mut buffer_y = vec![zero; ny];
    for k in 0..nz {
        for i in 0..nx {
            for j in 0..ny {
                buffer_y[j] = data[idx3d(i, j, k, nx, ny)];
            }
            fft_y.process_with_scratch(&mut buffer_y, &mut scratch_y);
            for j in 0..ny {
                data[idx3d(i, j, k, nx, ny)] = buffer_y[j];
            }
        }
    }

    // z-axis (stride nx*ny)
    let fft_z = planner.plan_fft(nz, direction);
    let mut scratch_z = vec![zero; fft_z.get_inplace_scratch_len()];
    let mut buffer_z = vec![zero; nz];
    for j in 0..ny {
        for i in 0..nx {
            for k in 0..nz {
                buffer_z[k] = data[idx3d(i, j, k, nx, ny)];
            }
            fft_z.process_with_scratch(&mut buffer_z, &mut scratch_z);
            for k in 0..nz {
                data[idx3d(i, j, k, nx, ny)] = buffer_z[k];
            }
        }
    }
}

/// 3D FFT (in-place, complex-to-complex)
///
/// Matches numpy.fft.fftn behavior (no normalization).
pub fn fft3d(data: &mut [Complex64], nx: usize, ny: usize, nz: usize) {
    transform_3d(data, nx, ny, nz, FftDirection::Forward);
}

/// 3D IFFT (in-place, complex-to-complex)
///
/// Matches numpy.fft.ifftn behavior (includes 1/N normalization).
pub fn ifft3d(data: &mut [Complex64], nx: usize, ny: usize, nz: usize) {
    transform_3d(data, nx, ny, nz, FftDirection::Inverse);

    let n_total = (nx * ny * nz) as f64;
    for val in data.iter_mut() {
        *val /= n_total;
    }
}
