//! Phase processing
//!
//! Stored phase is converted to radians, the inter-echo difference is taken
//! and wrapped back to [-π, π], and the result is unwrapped inside the mask.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fft::wrap_angle;
use crate::unwrap::{unwrap_phase, UnwrapMethod, UnwrapResult};

/// Default scale for 12-bit signed phase images ([-4096, 4095] -> [-π, π))
pub const DEFAULT_PHASE_SCALE: f64 = PI / 4096.0;

/// How stored phase values are converted to radians
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseRescale {
    /// Multiply by a fixed scale factor
    #[default]
    Scale,
    /// Detect the stored range and map it linearly onto [-π, π]
    Auto,
}

/// Stored phase range found by [`detect_phase_range`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PhaseRange {
    /// Already within [-1.1π, 1.1π]
    Radians,
    /// Non-negative integers [0, max]
    Unsigned { max: f64 },
    /// Integers spanning [min, max] with min < 0
    Signed { min: f64, max: f64 },
}

/// Classify the stored range of raw phase values
///
/// Non-finite samples are ignored. All echoes of an acquisition should be
/// classified together so they share one mapping.
pub fn detect_phase_range<'a>(frames: impl IntoIterator<Item = &'a [f64]>) -> PhaseRange {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for frame in frames {
        for &v in frame.iter().filter(|v| v.is_finite()) {
            min = min.min(v);
            max = max.max(v);
        }
    }

    if !min.is_finite() || (min >= -PI * 1.1 && max <= PI * 1.1) {
        PhaseRange::Radians
    } else if min >= 0.0 {
        PhaseRange::Unsigned { max }
    } else {
        PhaseRange::Signed { min, max }
    }
}

/// Map raw phase to radians for a detected range
pub fn apply_phase_range(raw: &[f64], range: PhaseRange) -> Vec<f64> {
    match range {
        PhaseRange::Radians => raw.to_vec(),
        PhaseRange::Unsigned { max } => raw.iter().map(|&v| (v / max) * 2.0 * PI - PI).collect(),
        PhaseRange::Signed { min, max } => {
            let span = max - min;
            raw.iter().map(|&v| ((v - min) / span) * 2.0 * PI - PI).collect()
        }
    }
}

/// Raw phase to radians with a fixed scale factor
pub fn rescale_phase(raw: &[f64], scale: f64) -> Vec<f64> {
    raw.iter().map(|&v| v * scale).collect()
}

/// Wrapped phase difference `wrap(p1 - p0)`
pub fn phase_difference(p0: &[f64], p1: &[f64]) -> Vec<f64> {
    p0.iter()
        .zip(p1.iter())
        .map(|(&a, &b)| wrap_angle(b - a))
        .collect()
}

/// Unwrapped phase difference between two echoes
///
/// # Arguments
/// * `raw0`, `raw1` - Stored phase of the earlier and later echo
/// * `mag0` - Earlier echo magnitude, used as unwrapping quality
/// * `mask` - Binary mask
/// * `dims` - Array dimensions (nx, ny, nz)
/// * `voxel_size` - Voxel sizes in mm
/// * `rescale` - Conversion of stored values to radians
/// * `phase_scale` - Scale factor for [`PhaseRescale::Scale`]
/// * `method` - Unwrapping algorithm
/// * `max_residue_fraction` - Residue limit passed to the unwrapper
///
/// # Returns
/// Unwrapped phase difference in radians (0 outside the mask) with any
/// noisy mask components
pub fn process_phase(
    raw0: &[f64],
    raw1: &[f64],
    mag0: &[f64],
    mask: &[u8],
    dims: (usize, usize, usize),
    voxel_size: (f64, f64, f64),
    rescale: PhaseRescale,
    phase_scale: f64,
    method: UnwrapMethod,
    max_residue_fraction: f64,
) -> Result<UnwrapResult> {
    let (p0, p1) = match rescale {
        PhaseRescale::Scale => (rescale_phase(raw0, phase_scale), rescale_phase(raw1, phase_scale)),
        PhaseRescale::Auto => {
            let range = detect_phase_range([raw0, raw1]);
            (apply_phase_range(raw0, range), apply_phase_range(raw1, range))
        }
    };

    let dphi = phase_difference(&p0, &p1);
    unwrap_phase(&dphi, Some(mag0), mask, dims, voxel_size, method, max_residue_fraction)
}
