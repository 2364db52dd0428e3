//! Volume model
//!
//! A [`Volume`] is a sampled scalar field on a 3D voxel grid, optionally
//! stacked along a fourth axis (echo index or gradient component), plus the
//! voxel-to-millimetre affine. Samples are stored in Fortran order:
//! index = x + y*nx + z*nx*ny + t*nx*ny*nz.

use std::path::Path;

use crate::error::{FieldmapError, Result};
use crate::nifti_io;

/// Affines are stored as float32 in NIfTI files
const AFFINE_TOLERANCE: f64 = 1e-4;

#[derive(Clone, Debug)]
pub struct Volume {
    /// Samples, Fortran order, frames consecutive
    pub data: Vec<f64>,
    /// Spatial dimensions (nx, ny, nz)
    pub dims: (usize, usize, usize),
    /// Number of stacked 3D frames (1 for a plain 3D volume)
    pub n_vols: usize,
    /// Voxel sizes in mm
    pub voxel_size: (f64, f64, f64),
    /// Voxel index to physical mm (4x4, row-major)
    pub affine: [f64; 16],
}

impl Volume {
    pub fn new(
        data: Vec<f64>,
        dims: (usize, usize, usize),
        n_vols: usize,
        voxel_size: (f64, f64, f64),
        affine: [f64; 16],
    ) -> Result<Self> {
        let expected = dims.0 * dims.1 * dims.2 * n_vols;
        if data.len() != expected {
            return Err(FieldmapError::GeometryMismatch(format!(
                "{} samples do not fill a {}x{}x{}x{} grid ({} expected)",
                data.len(), dims.0, dims.1, dims.2, n_vols, expected
            )));
        }
        Ok(Volume { data, dims, n_vols, voxel_size, affine })
    }

    /// Load a volume from a .nii or .nii.gz file
    pub fn load(path: &Path) -> Result<Self> {
        nifti_io::read_nifti_file(path)
    }

    /// Save the volume atomically (temporary file, then rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        nifti_io::save_nifti_to_file(path, self)
    }

    /// Number of voxels in one 3D frame
    #[inline]
    pub fn n_voxels(&self) -> usize {
        self.dims.0 * self.dims.1 * self.dims.2
    }

    /// Borrow frame `t` of a stacked volume
    pub fn volume(&self, t: usize) -> &[f64] {
        let n = self.n_voxels();
        &self.data[t * n..(t + 1) * n]
    }

    /// Copy frame `t` into a new 3D volume on the same grid
    pub fn frame(&self, t: usize) -> Result<Volume> {
        if t >= self.n_vols {
            return Err(FieldmapError::GeometryMismatch(format!(
                "Frame {} requested from a volume with {} frames", t, self.n_vols
            )));
        }
        Ok(self.derive_3d(self.volume(t).to_vec()))
    }

    /// Stack 3D frames that share one grid into a 4D volume
    pub fn stack(frames: &[Volume]) -> Result<Volume> {
        let first = frames.first()
            .ok_or_else(|| FieldmapError::GeometryMismatch("Cannot stack zero volumes".to_string()))?;

        let mut data = Vec::with_capacity(first.n_voxels() * frames.len());
        for (i, frame) in frames.iter().enumerate() {
            if frame.n_vols != 1 {
                return Err(FieldmapError::GeometryMismatch(format!(
                    "Volume {} has {} frames; only 3D volumes can be stacked", i, frame.n_vols
                )));
            }
            if !first.same_grid(frame) {
                return Err(FieldmapError::GeometryMismatch(format!(
                    "Volume {} does not share the grid of volume 0", i
                )));
            }
            data.extend_from_slice(&frame.data);
        }

        Volume::new(data, first.dims, frames.len(), first.voxel_size, first.affine)
    }

    /// New 3D volume on this grid
    pub fn derive_3d(&self, data: Vec<f64>) -> Volume {
        debug_assert_eq!(data.len(), self.n_voxels());
        Volume {
            data,
            dims: self.dims,
            n_vols: 1,
            voxel_size: self.voxel_size,
            affine: self.affine,
        }
    }

    /// New stacked volume on this grid
    pub fn derive_4d(&self, data: Vec<f64>, n_vols: usize) -> Volume {
        debug_assert_eq!(data.len(), self.n_voxels() * n_vols);
        Volume {
            data,
            dims: self.dims,
            n_vols,
            voxel_size: self.voxel_size,
            affine: self.affine,
        }
    }

    /// True if spatial dimensions and affine agree (frame count is ignored)
    pub fn same_grid(&self, other: &Volume) -> bool {
        self.dims == other.dims
            && self.affine.iter()
                .zip(other.affine.iter())
                .all(|(a, b)| (a - b).abs() <= AFFINE_TOLERANCE * a.abs().max(b.abs()).max(1.0))
    }

    /// Voxel spacing in metres from the affine diagonal
    pub fn spacing_m(&self) -> (f64, f64, f64) {
        (
            self.affine[0].abs() / 1e3,
            self.affine[5].abs() / 1e3,
            self.affine[10].abs() / 1e3,
        )
    }
}

/// Fail with `GeometryMismatch` unless every named volume shares the first one's grid
pub fn check_same_grid(volumes: &[(&str, &Volume)]) -> Result<()> {
    let Some(&(ref_name, reference)) = volumes.first() else {
        return Ok(());
    };

    for &(name, vol) in &volumes[1..] {
        if vol.dims != reference.dims {
            return Err(FieldmapError::GeometryMismatch(format!(
                "{} is {:?} but {} is {:?}", name, vol.dims, ref_name, reference.dims
            )));
        }
        if !reference.same_grid(vol) {
            return Err(FieldmapError::GeometryMismatch(format!(
                "{} and {} have different affines", name, ref_name
            )));
        }
    }
    Ok(())
}
