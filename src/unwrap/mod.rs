//! Phase unwrapping
//!
//! Two methods are available:
//! - Region growing: quality-guided flood fill over ROMEO-style edge weights
//! - Laplacian: FFT Poisson solve of the wrapped Laplacian, snapped back to
//!   the wrapped input modulo 2π
//!
//! Every 6-connected mask component is unwrapped on its own, seeded at the
//! component voxel closest to its centroid. Before unwrapping, the mask is
//! checked for phase residues (2x2 loops whose wrapped differences do not sum
//! to zero). A mask dominated by residues cannot be integrated and is reported
//! as an [`FieldmapError::UnwrapFailure`]. Single components above the limit
//! are still unwrapped and listed in [`UnwrapResult::noisy_components`].

pub mod laplacian;
pub mod romeo;

pub use laplacian::*;
pub use romeo::*;

use std::f64::consts::PI;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FieldmapError, Result};
use crate::fft::{idx3d, wrap_angle};
use crate::region_grow::{grow_region_unwrap, OUTSIDE, PENDING};
use crate::utils::mask::label_components;

const TWO_PI: f64 = 2.0 * PI;

/// Fewer loops than this over the whole mask never fail the residue check
pub const MIN_CHECKED_LOOPS: usize = 64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnwrapMethod {
    #[default]
    RegionGrowing,
    Laplacian,
}

impl FromStr for UnwrapMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "region_growing" | "romeo" => Ok(UnwrapMethod::RegionGrowing),
            "laplacian" => Ok(UnwrapMethod::Laplacian),
            other => Err(format!(
                "unknown unwrap method '{}' (expected region_growing or laplacian)", other
            )),
        }
    }
}

/// Residue statistics of one mask component
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ResidueCount {
    /// Elementary loops with all four corners in the component
    pub loops: usize,
    /// Loops whose wrapped differences sum to a non-zero multiple of 2π
    pub residues: usize,
}

impl ResidueCount {
    pub fn fraction(&self) -> f64 {
        if self.loops == 0 {
            0.0
        } else {
            self.residues as f64 / self.loops as f64
        }
    }
}

/// Mask component whose residue fraction exceeds the limit
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoisyComponent {
    /// Component label (1-based, Fortran scan order of first voxel)
    pub label: usize,
    pub voxels: usize,
    pub residues: ResidueCount,
}

impl std::fmt::Display for NoisyComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "mask component {} ({} voxels) has {} residues in {} loops ({:.1}%)",
            self.label, self.voxels, self.residues.residues, self.residues.loops,
            100.0 * self.residues.fraction()
        )
    }
}

/// Unwrapped phase and the components that may hold local errors
#[derive(Clone, Debug)]
pub struct UnwrapResult {
    /// Unwrapped phase, 0 outside the mask
    pub phase: Vec<f64>,
    pub noisy_components: Vec<NoisyComponent>,
}

/// Count phase residues per mask component
///
/// Loops are the elementary 2x2 squares in the xy, xz and yz planes. Only loops
/// whose four corners share one component label are counted.
///
/// # Returns
/// One entry per component, index `label - 1`
pub fn count_residues(
    phase: &[f64],
    labels: &[u32],
    n_components: usize,
    nx: usize, ny: usize, nz: usize,
) -> Vec<ResidueCount> {
    let mut counts = vec![ResidueCount::default(); n_components];

    // (a, b) axis pairs spanning each loop plane
    let planes: [((usize, usize, usize), (usize, usize, usize)); 3] = [
        ((1, 0, 0), (0, 1, 0)),
        ((1, 0, 0), (0, 0, 1)),
        ((0, 1, 0), (0, 0, 1)),
    ];

    for &(a, b) in &planes {
        let (ex, ey, ez) = (a.0 + b.0, a.1 + b.1, a.2 + b.2);
        if nx <= ex || ny <= ey || nz <= ez {
            continue;
        }

        for k in 0..nz - ez {
            for j in 0..ny - ey {
                for i in 0..nx - ex {
                    let p0 = idx3d(i, j, k, nx, ny);
                    let p1 = idx3d(i + a.0, j + a.1, k + a.2, nx, ny);
                    let p2 = idx3d(i + a.0 + b.0, j + a.1 + b.1, k + a.2 + b.2, nx, ny);
                    let p3 = idx3d(i + b.0, j + b.1, k + b.2, nx, ny);

                    let label = labels[p0];
                    if label == 0 || labels[p1] != label || labels[p2] != label || labels[p3] != label {
                        continue;
                    }

                    let circulation = wrap_angle(phase[p1] - phase[p0])
                        + wrap_angle(phase[p2] - phase[p1])
                        + wrap_angle(phase[p3] - phase[p2])
                        + wrap_angle(phase[p0] - phase[p3]);

                    let entry = &mut counts[label as usize - 1];
                    entry.loops += 1;
                    if (circulation / TWO_PI).round() != 0.0 {
                        entry.residues += 1;
                    }
                }
            }
        }
    }

    counts
}

/// Seed voxel of each component: the member voxel closest to the centroid
///
/// Ties go to the first voxel in Fortran scan order.
fn component_seeds(
    labels: &[u32],
    n_components: usize,
    nx: usize, ny: usize, nz: usize,
) -> Vec<(usize, usize, usize)> {
    let mut sums = vec![(0.0f64, 0.0f64, 0.0f64, 0usize); n_components];
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let label = labels[idx3d(i, j, k, nx, ny)];
                if label > 0 {
                    let s = &mut sums[label as usize - 1];
                    s.0 += i as f64;
                    s.1 += j as f64;
                    s.2 += k as f64;
                    s.3 += 1;
                }
            }
        }
    }

    let centroids: Vec<(f64, f64, f64)> = sums.iter()
        .map(|&(x, y, z, n)| {
            let n = n.max(1) as f64;
            (x / n, y / n, z / n)
        })
        .collect();

    let mut best = vec![((0usize, 0usize, 0usize), f64::INFINITY); n_components];
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let label = labels[idx3d(i, j, k, nx, ny)];
                if label == 0 {
                    continue;
                }
                let c = label as usize - 1;
                let (cx, cy, cz) = centroids[c];
                let d2 = (i as f64 - cx).powi(2) + (j as f64 - cy).powi(2) + (k as f64 - cz).powi(2);
                if d2 < best[c].1 {
                    best[c] = ((i, j, k), d2);
                }
            }
        }
    }

    best.into_iter().map(|(seed, _)| seed).collect()
}

/// Unwrap a wrapped phase volume inside a mask
///
/// # Arguments
/// * `phase` - Phase in radians (nx * ny * nz); re-wrapped to [-π, π] first
/// * `mag` - Optional magnitude used for the region-growing edge weights
/// * `mask` - Binary mask (nx * ny * nz)
/// * `dims` - Array dimensions (nx, ny, nz)
/// * `voxel_size` - Voxel sizes in mm (Laplacian method only)
/// * `method` - Unwrapping algorithm
/// * `max_residue_fraction` - Largest tolerated residue fraction over the mask
///   (values >= 1 disable the check)
///
/// # Returns
/// Unwrapped phase, 0 outside the mask. Each component differs from the
/// wrapped input by integer multiples of 2π. Components above the residue
/// limit are unwrapped anyway and listed as noisy.
///
/// # Errors
/// `UnwrapFailure` for non-finite phase inside the mask, or when the residue
/// fraction of the whole mask exceeds the limit over at least
/// [`MIN_CHECKED_LOOPS`] loops.
pub fn unwrap_phase(
    phase: &[f64],
    mag: Option<&[f64]>,
    mask: &[u8],
    dims: (usize, usize, usize),
    voxel_size: (f64, f64, f64),
    method: UnwrapMethod,
    max_residue_fraction: f64,
) -> Result<UnwrapResult> {
    let (nx, ny, nz) = dims;
    let n_total = nx * ny * nz;

    if phase.len() != n_total || mask.len() != n_total || mag.map_or(false, |m| m.len() != n_total) {
        return Err(FieldmapError::GeometryMismatch(format!(
            "unwrap inputs do not match a {}x{}x{} grid", nx, ny, nz
        )));
    }

    let mut wrapped = vec![0.0; n_total];
    for i in 0..n_total {
        if mask[i] == 0 {
            continue;
        }
        if !phase[i].is_finite() {
            return Err(FieldmapError::UnwrapFailure(format!(
                "non-finite phase inside the mask at voxel ({}, {}, {})",
                i % nx, (i / nx) % ny, i / (nx * ny)
            )));
        }
        wrapped[i] = wrap_angle(phase[i]);
    }

    let (labels, n_components) = label_components(mask, nx, ny, nz);
    if n_components == 0 {
        return Ok(UnwrapResult { phase: wrapped, noisy_components: Vec::new() });
    }

    let mut noisy_components = Vec::new();
    if max_residue_fraction < 1.0 {
        let counts = count_residues(&wrapped, &labels, n_components, nx, ny, nz);
        let total = counts.iter().fold(ResidueCount::default(), |acc, c| ResidueCount {
            loops: acc.loops + c.loops,
            residues: acc.residues + c.residues,
        });
        if total.loops >= MIN_CHECKED_LOOPS && total.fraction() > max_residue_fraction {
            return Err(FieldmapError::UnwrapFailure(format!(
                "mask has {} residues in {} loops ({:.1}% > {:.1}%)",
                total.residues, total.loops,
                100.0 * total.fraction(), 100.0 * max_residue_fraction
            )));
        }

        let mut voxels = vec![0usize; n_components];
        for &label in labels.iter().filter(|&&l| l > 0) {
            voxels[label as usize - 1] += 1;
        }
        noisy_components = counts.iter()
            .enumerate()
            .filter(|(_, count)| count.fraction() > max_residue_fraction)
            .map(|(c, &residues)| NoisyComponent { label: c + 1, voxels: voxels[c], residues })
            .collect();
    }

    let unwrapped = match method {
        UnwrapMethod::RegionGrowing => {
            let weights = calculate_weights(&wrapped, mag, mask, nx, ny, nz, WeightComponents::default());
            let mut state: Vec<u8> = mask.iter()
                .map(|&m| if m != 0 { PENDING } else { OUTSIDE })
                .collect();

            for seed in component_seeds(&labels, n_components, nx, ny, nz) {
                grow_region_unwrap(&mut wrapped, &weights, &mut state, nx, ny, nz, seed);
            }
            wrapped
        }
        UnwrapMethod::Laplacian => {
            let (vsx, vsy, vsz) = voxel_size;
            laplacian_unwrap(&wrapped, mask, nx, ny, nz, vsx, vsy, vsz)
        }
    };

    Ok(UnwrapResult { phase: unwrapped, noisy_components })
}
