//! Laplacian-based phase unwrapping
//!
//! Wrapped finite differences between neighbouring in-mask voxels equal the
//! true differences wherever the phase changes by less than π per voxel. The
//! phase is recovered by solving the masked Poisson equation
//!
//!   Σₙ w (φᵢ − φₙ) = Σₙ w wrap(ψᵢ − ψₙ)
//!
//! over in-mask neighbour pairs (Neumann conditions at the mask and volume
//! borders). The system is solved with conjugate gradients, preconditioned
//! by the unmasked Neumann Poisson solve (DCT via a mirror-extended FFT).
//! Each component is then anchored to the wrapped input at its first voxel
//! and snapped to the nearest value congruent to it modulo 2π.
//!
//! Reference:
//! Schofield MA, Zhu Y. Fast phase unwrapping algorithm for interferometric
//! applications. Optics letters. 2003 Jul 15;28(14):1194-6.
//! Ghiglia DC, Romero LA. Robust two-dimensional weighted and unweighted phase
//! unwrapping that uses fast transforms and iterative methods. JOSA A. 1994.

use std::f64::consts::PI;

use num_complex::Complex64;

use crate::fft::{fft3d, idx3d, ifft3d, wrap_angle};
use crate::solvers::pcg_solve;
use crate::utils::mask::label_components;

const TWO_PI: f64 = 2.0 * PI;

const PCG_TOL: f64 = 1e-10;
const PCG_MAX_ITER: usize = 1000;

/// Neighbouring in-mask voxel pairs (a, b, 1/h²), each pair listed once
fn masked_edges(
    mask: &[u8],
    nx: usize, ny: usize, nz: usize,
    weights: [f64; 3],
) -> Vec<(usize, usize, f64)> {
    let mut edges = Vec::new();
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let a = idx3d(i, j, k, nx, ny);
                if mask[a] == 0 {
                    continue;
                }
                if i + 1 < nx && mask[a + 1] != 0 {
                    edges.push((a, a + 1, weights[0]));
                }
                if j + 1 < ny && mask[a + nx] != 0 {
                    edges.push((a, a + nx, weights[1]));
                }
                if k + 1 < nz && mask[a + nx * ny] != 0 {
                    edges.push((a, a + nx * ny, weights[2]));
                }
            }
        }
    }
    edges
}

/// Masked graph Laplacian: (Ax)ᵢ = Σₙ w (xᵢ − xₙ)
fn apply_masked_laplacian(edges: &[(usize, usize, f64)], x: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; x.len()];
    for &(a, b, w) in edges {
        let d = w * (x[a] - x[b]);
        out[a] += d;
        out[b] -= d;
    }
    out
}

/// Right-hand side from wrapped differences across in-mask edges
fn wrapped_divergence(edges: &[(usize, usize, f64)], phase: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; phase.len()];
    for &(a, b, w) in edges {
        let d = w * wrap_angle(phase[a] - phase[b]);
        out[a] += d;
        out[b] -= d;
    }
    out
}

#[inline]
fn mirror(i: usize, n: usize) -> usize {
    if i < n { i } else { 2 * n - 1 - i }
}

/// Solve the unmasked Neumann Poisson problem A x = f on the full grid
///
/// Mirror-extending to 2n per axis turns the Neumann problem into a periodic
/// one, diagonalised by the FFT. The constant mode is set to zero.
fn solve_poisson_neumann(
    f: &[f64],
    nx: usize, ny: usize, nz: usize,
    weights: [f64; 3],
) -> Vec<f64> {
    let (mx, my, mz) = (2 * nx, 2 * ny, 2 * nz);

    let mut ext = vec![Complex64::new(0.0, 0.0); mx * my * mz];
    for k in 0..mz {
        for j in 0..my {
            for i in 0..mx {
                let src = idx3d(mirror(i, nx), mirror(j, ny), mirror(k, nz), nx, ny);
                ext[idx3d(i, j, k, mx, my)] = Complex64::new(f[src], 0.0);
            }
        }
    }
    fft3d(&mut ext, mx, my, mz);

    for k in 0..mz {
        let lam_z = weights[2] * (2.0 - 2.0 * (TWO_PI * k as f64 / mz as f64).cos());
        for j in 0..my {
            let lam_y = weights[1] * (2.0 - 2.0 * (TWO_PI * j as f64 / my as f64).cos());
            for i in 0..mx {
                let lam_x = weights[0] * (2.0 - 2.0 * (TWO_PI * i as f64 / mx as f64).cos());
                let lam = lam_x + lam_y + lam_z;
                let idx = idx3d(i, j, k, mx, my);

                if lam > 1e-12 {
                    ext[idx] /= lam;
                } else {
                    ext[idx] = Complex64::new(0.0, 0.0);
                }
            }
        }
    }
    ifft3d(&mut ext, mx, my, mz);

    let mut out = Vec::with_capacity(nx * ny * nz);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                out.push(ext[idx3d(i, j, k, mx, my)].re);
            }
        }
    }
    out
}

/// Laplacian phase unwrapping
///
/// # Arguments
/// * `phase` - Wrapped phase (nx * ny * nz)
/// * `mask` - Binary mask (nx * ny * nz), 1 = inside ROI
/// * `nx`, `ny`, `nz` - Array dimensions
/// * `vsx`, `vsy`, `vsz` - Voxel sizes in mm
///
/// # Returns
/// Unwrapped phase, congruent to the input modulo 2π inside the mask and 0
/// outside it
pub fn laplacian_unwrap(
    phase: &[f64],
    mask: &[u8],
    nx: usize, ny: usize, nz: usize,
    vsx: f64, vsy: f64, vsz: f64,
) -> Vec<f64> {
    let n_total = nx * ny * nz;
    let weights = [1.0 / (vsx * vsx), 1.0 / (vsy * vsy), 1.0 / (vsz * vsz)];

    let edges = masked_edges(mask, nx, ny, nz, weights);
    let rhs = wrapped_divergence(&edges, phase);

    let estimate = pcg_solve(
        |x| apply_masked_laplacian(&edges, x),
        |r| {
            let mut z = solve_poisson_neumann(r, nx, ny, nz, weights);
            for (zi, &m) in z.iter_mut().zip(mask.iter()) {
                if m == 0 {
                    *zi = 0.0;
                }
            }
            z
        },
        &rhs,
        &vec![0.0; n_total],
        PCG_TOL,
        PCG_MAX_ITER,
    );

    // Per-component constant: match the wrapped input at the first voxel
    let (labels, n_components) = label_components(mask, nx, ny, nz);
    let mut shifts: Vec<Option<f64>> = vec![None; n_components];
    for idx in 0..n_total {
        let label = labels[idx];
        if label > 0 && shifts[label as usize - 1].is_none() {
            shifts[label as usize - 1] = Some(estimate[idx] - phase[idx]);
        }
    }

    (0..n_total)
        .map(|idx| {
            let label = labels[idx];
            if label == 0 {
                return 0.0;
            }
            let est = estimate[idx] - shifts[label as usize - 1].unwrap_or(0.0);
            let wrapped = phase[idx];
            wrapped + TWO_PI * ((est - wrapped) / TWO_PI).round()
        })
        .collect()
}
