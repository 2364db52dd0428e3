//! Fieldmap reconstruction pipeline
//!
//! mask -> T2* -> phase difference + unwrapping -> median denoising ->
//! rad/s and Hz maps -> field gradient. Inputs are validated before the first
//! stage runs; outputs are written only once everything has been computed.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::FieldmapConfig;
use crate::denoise::denoise_phase;
use crate::echoes::{read_echo_times, EchoSet};
use crate::error::{FieldmapError, Result};
use crate::fieldmap::{field_to_hz, phase_to_angular_frequency};
use crate::nifti_io::{encode_for_path, write_atomic};
use crate::phase::process_phase;
use crate::relaxometry::t2star_two_echo;
use crate::unwrap::NoisyComponent;
use crate::utils::gradient::field_gradient_mt_per_m;
use crate::utils::mask::{mask_count, mask_to_f64, threshold_mask};
use crate::volume::Volume;

pub const DPHI_FILE: &str = "dphi.nii.gz";
pub const RAD_PER_S_FILE: &str = "dB0_rad_s.nii.gz";
pub const HZ_FILE: &str = "dB0_Hz.nii.gz";
pub const GRADIENT_FILE: &str = "grad_dB0.nii.gz";
pub const T2STAR_FILE: &str = "T2star_ms.nii.gz";
pub const MASK_FILE: &str = "mask.nii.gz";

/// Reconstruction stages, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Mask,
    Relaxometry,
    PhaseUnwrap,
    Denoise,
    FieldMap,
    Gradient,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Mask,
        Stage::Relaxometry,
        Stage::PhaseUnwrap,
        Stage::Denoise,
        Stage::FieldMap,
        Stage::Gradient,
    ];

    /// 1-based position in the pipeline
    pub fn number(self) -> usize {
        Stage::ALL.iter().position(|&s| s == self).map_or(0, |p| p + 1)
    }

    pub fn description(self) -> &'static str {
        match self {
            Stage::Mask => "Thresholding first-echo magnitude",
            Stage::Relaxometry => "Estimating T2*",
            Stage::PhaseUnwrap => "Computing and unwrapping phase difference",
            Stage::Denoise => "Median filtering and offset removal",
            Stage::FieldMap => "Converting to rad/s and Hz",
            Stage::Gradient => "Computing field gradient",
        }
    }
}

/// Reconstruction results, all on the input grid
#[derive(Clone, Debug)]
pub struct FieldmapOutputs {
    /// Denoised, unwrapped phase difference (rad)
    pub dphi: Volume,
    /// Angular frequency offset (rad/s)
    pub rad_per_s: Volume,
    /// Frequency offset (Hz)
    pub hz: Volume,
    /// Field gradient (mT/m), frames x, y, z
    pub gradient: Volume,
    /// T2* (ms)
    pub t2star_ms: Volume,
    /// Signal mask (0/1)
    pub mask: Volume,
    /// In-mask median removed from the phase difference (rad)
    pub phase_offset: f64,
    /// Number of voxels in the mask
    pub mask_voxels: usize,
    /// Mask components above the residue limit; their phase may hold local
    /// unwrapping errors
    pub noisy_components: Vec<NoisyComponent>,
}

impl FieldmapOutputs {
    /// Output volumes with their file names
    pub fn named_volumes(&self) -> [(&'static str, &Volume); 6] {
        [
            (DPHI_FILE, &self.dphi),
            (RAD_PER_S_FILE, &self.rad_per_s),
            (HZ_FILE, &self.hz),
            (GRADIENT_FILE, &self.gradient),
            (T2STAR_FILE, &self.t2star_ms),
            (MASK_FILE, &self.mask),
        ]
    }

    /// Write every output into `dir`
    ///
    /// All files are encoded before the first one is written, and each file is
    /// written through a temporary sibling and a rename.
    pub fn save(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)
            .map_err(|e| FieldmapError::Io(format!("Failed to create output directory '{}': {}", dir.display(), e)))?;

        let encoded = self.named_volumes()
            .iter()
            .map(|&(name, volume)| {
                let path = dir.join(name);
                encode_for_path(volume, &path).map(|bytes| (path, bytes))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut written = Vec::with_capacity(encoded.len());
        for (path, bytes) in encoded {
            write_atomic(&path, &bytes)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Reconstruct fieldmap, gradient and T2* from an echo set
pub fn reconstruct(echoes: &EchoSet, config: &FieldmapConfig) -> Result<FieldmapOutputs> {
    reconstruct_with_progress(echoes, config, |_| {})
}

/// Same as [`reconstruct`] but calls `progress(stage)` before each stage
pub fn reconstruct_with_progress<F>(
    echoes: &EchoSet,
    config: &FieldmapConfig,
    mut progress: F,
) -> Result<FieldmapOutputs>
where
    F: FnMut(Stage),
{
    config.validate()?;
    let pair = echoes.pair(config.echo_pair)?;

    let grid = &echoes.magnitude;
    let (nx, ny, nz) = grid.dims;

    progress(Stage::Mask);
    let mask = threshold_mask(pair.mag0, config.mask_threshold);
    let mask_voxels = mask_count(&mask);

    progress(Stage::Relaxometry);
    let t2star = t2star_two_echo(pair.mag0, pair.mag1, pair.delta_te, &mask, config.t2star_policy);

    progress(Stage::PhaseUnwrap);
    let unwrapped = process_phase(
        pair.phase0, pair.phase1, pair.mag0, &mask,
        grid.dims, grid.voxel_size,
        config.phase_rescale, config.phase_scale,
        config.unwrap_method, config.max_residue_fraction,
    )?;

    progress(Stage::Denoise);
    let (dphi, phase_offset) = denoise_phase(&unwrapped.phase, &mask, nx, ny, nz, config.median_kernel);

    progress(Stage::FieldMap);
    let rad_per_s = phase_to_angular_frequency(&dphi, pair.delta_te, &mask);
    let hz = field_to_hz(&rad_per_s);

    progress(Stage::Gradient);
    let gradient = field_gradient_mt_per_m(
        &hz, &mask, nx, ny, nz, grid.spacing_m(), config.gyromagnetic_ratio,
    );

    Ok(FieldmapOutputs {
        dphi: grid.derive_3d(dphi),
        rad_per_s: grid.derive_3d(rad_per_s),
        hz: grid.derive_3d(hz),
        gradient: grid.derive_4d(gradient, 3),
        t2star_ms: grid.derive_3d(t2star),
        mask: grid.derive_3d(mask_to_f64(&mask)),
        phase_offset,
        mask_voxels,
        noisy_components: unwrapped.noisy_components,
    })
}

/// Input and output locations for a file-to-file run
#[derive(Clone, Debug)]
pub struct RunPaths {
    /// One stacked magnitude file, or one 3D file per echo
    pub magnitude: Vec<PathBuf>,
    /// One stacked phase file, or one 3D file per echo
    pub phase: Vec<PathBuf>,
    pub echo_times: PathBuf,
    pub out_dir: PathBuf,
}

/// Load inputs from disk into an echo set
pub fn load_echo_set(paths: &RunPaths) -> Result<EchoSet> {
    let magnitudes = paths.magnitude.iter()
        .map(|p| Volume::load(p))
        .collect::<Result<Vec<_>>>()?;
    let phases = paths.phase.iter()
        .map(|p| Volume::load(p))
        .collect::<Result<Vec<_>>>()?;
    let echo_times = read_echo_times(&paths.echo_times)?;
    EchoSet::from_echo_volumes(echo_times, magnitudes, phases)
}

/// Load, reconstruct and write outputs
pub fn run_files<F>(paths: &RunPaths, config: &FieldmapConfig, progress: F) -> Result<FieldmapOutputs>
where
    F: FnMut(Stage),
{
    let echoes = load_echo_set(paths)?;
    let outputs = reconstruct_with_progress(&echoes, config, progress)?;
    outputs.save(&paths.out_dir)?;
    Ok(outputs)
}
