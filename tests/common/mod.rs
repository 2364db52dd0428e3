//! Common test utilities for b0map-core integration tests

#![allow(dead_code)]

use std::f64::consts::PI;
use std::path::PathBuf;

use b0map_core::echoes::EchoSet;
use b0map_core::fft::{idx3d, wrap_angle};
use b0map_core::phase::DEFAULT_PHASE_SCALE;
use b0map_core::utils::mask::create_sphere_mask;
use b0map_core::volume::Volume;

/// Compute RMSE between two arrays, only within mask (non-zero values)
pub fn rmse(a: &[f64], b: &[f64], mask: &[u8]) -> f64 {
    let mut sum_sq = 0.0;
    let mut count = 0usize;
    for i in 0..a.len() {
        if mask[i] > 0 {
            let diff = a[i] - b[i];
            sum_sq += diff * diff;
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    (sum_sq / count as f64).sqrt()
}

/// Mean of `a - b` within mask
pub fn mean_difference(a: &[f64], b: &[f64], mask: &[u8]) -> f64 {
    let (sum, count) = a.iter()
        .zip(b.iter())
        .zip(mask.iter())
        .filter(|(_, &m)| m > 0)
        .fold((0.0, 0usize), |(s, n), ((&x, &y), _)| (s + (x - y), n + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

/// Voxels whose whole (2r+1)^3 neighbourhood lies inside the mask
pub fn erode(mask: &[u8], dims: (usize, usize, usize), r: usize) -> Vec<u8> {
    let (nx, ny, nz) = dims;
    let mut out = vec![0u8; mask.len()];
    for k in r..nz.saturating_sub(r) {
        for j in r..ny.saturating_sub(r) {
            for i in r..nx.saturating_sub(r) {
                let mut inside = true;
                'window: for dk in 0..=2 * r {
                    for dj in 0..=2 * r {
                        for di in 0..=2 * r {
                            if mask[idx3d(i + di - r, j + dj - r, k + dk - r, nx, ny)] == 0 {
                                inside = false;
                                break 'window;
                            }
                        }
                    }
                }
                out[idx3d(i, j, k, nx, ny)] = inside as u8;
            }
        }
    }
    out
}

pub fn diagonal_affine(vs: (f64, f64, f64)) -> [f64; 16] {
    [
        vs.0, 0.0, 0.0, 0.0,
        0.0, vs.1, 0.0, 0.0,
        0.0, 0.0, vs.2, 0.0,
        0.0, 0.0, 0.0, 1.0,
    ]
}

/// Fresh per-test scratch directory under the system temp dir
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("b0map_it_{}_{}", name, std::process::id()));
    std::fs::remove_dir_all(&dir).ok();
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Synthetic two-echo acquisition of a sphere in a known field
pub struct TestData {
    /// Ground truth frequency offset (Hz)
    pub field_hz: Vec<f64>,
    /// Object support (sphere)
    pub object: Vec<u8>,
    pub t2star_ms: f64,
    pub echo_times: Vec<f64>,
    pub dims: (usize, usize, usize),
    pub voxel_size: (f64, f64, f64),
    /// Magnitude stack, one frame per echo
    pub magnitude: Volume,
    /// Stored phase stack (12-bit convention, scale π/4096)
    pub phase: Volume,
}

impl TestData {
    /// Sphere of radius `radius` voxels in a field that varies by
    /// `hz_per_voxel` along x, centred on zero at the volume centre
    pub fn sphere_in_gradient(n: usize, radius: f64, hz_per_voxel: f64) -> Self {
        let dims = (n, n, n);
        let voxel_size = (2.0, 2.0, 2.0);
        let echo_times: Vec<f64> = vec![0.004, 0.006];
        let t2star_ms = 30.0;
        let receiver_offset = 0.3;
        let c = (n as f64 - 1.0) / 2.0;

        let object = create_sphere_mask(n, n, n, c, c, c, radius);
        let n_total = n * n * n;

        let mut field_hz = vec![0.0; n_total];
        for k in 0..n {
            for j in 0..n {
                for i in 0..n {
                    field_hz[idx3d(i, j, k, n, n)] = hz_per_voxel * (i as f64 - c);
                }
            }
        }

        let mut mag = Vec::with_capacity(2 * n_total);
        let mut phase = Vec::with_capacity(2 * n_total);
        for &te in &echo_times {
            let decay = 1000.0 * (-te * 1e3 / t2star_ms).exp();
            mag.extend(object.iter().map(|&m| if m > 0 { decay } else { 20.0 }));
            phase.extend(field_hz.iter().map(|&f| {
                wrap_angle(receiver_offset + 2.0 * PI * f * te) / DEFAULT_PHASE_SCALE
            }));
        }

        let affine = diagonal_affine(voxel_size);
        TestData {
            field_hz,
            object,
            t2star_ms,
            echo_times,
            dims,
            voxel_size,
            magnitude: Volume::new(mag, dims, 2, voxel_size, affine).unwrap(),
            phase: Volume::new(phase, dims, 2, voxel_size, affine).unwrap(),
        }
    }

    pub fn echo_set(&self) -> EchoSet {
        EchoSet::new(self.echo_times.clone(), self.magnitude.clone(), self.phase.clone()).unwrap()
    }
}

/// Result of comparing an output map against ground truth
#[derive(Debug)]
pub struct TestResult {
    pub name: String,
    pub rmse: f64,
    pub offset: f64,
}

impl TestResult {
    /// RMSE after removing the mean difference (maps defined up to a constant)
    pub fn up_to_constant(name: &str, output: &[f64], ground_truth: &[f64], mask: &[u8]) -> Self {
        let offset = mean_difference(output, ground_truth, mask);
        let shifted: Vec<f64> = ground_truth.iter().map(|&g| g + offset).collect();
        TestResult {
            name: name.to_string(),
            rmse: rmse(output, &shifted, mask),
            offset,
        }
    }

    pub fn print(&self) {
        println!("{:<15} RMSE={:.6}  offset={:.4}", self.name, self.rmse, self.offset);
    }
}
