//! Reconstruction parameters
//!
//! All protocol-dependent constants travel in [`FieldmapConfig`]. Values can
//! be loaded from TOML; fields left out of the file keep their defaults:
//!
//! ```toml
//! mask_threshold = 0.1
//! phase_scale = 0.000766990393942820  # π / 4096
//! phase_rescale = "scale"             # or "auto"
//! median_kernel = [3, 3, 3]
//! gyromagnetic_ratio = 42580.0        # Hz/mT
//! unwrap_method = "region_growing"    # or "laplacian"
//! max_residue_fraction = 0.25
//! t2star_policy = "zero"              # or "pass_through"
//! echo_pair = [0, 1]
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FieldmapError, Result};
use crate::phase::{PhaseRescale, DEFAULT_PHASE_SCALE};
use crate::relaxometry::DegeneratePolicy;
use crate::unwrap::UnwrapMethod;
use crate::utils::gradient::GAMMA_1H_HZ_PER_MT;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldmapConfig {
    /// Mask keeps voxels with first-echo magnitude above this fraction of the maximum
    pub mask_threshold: f64,
    /// Stored phase to radians factor (used with `PhaseRescale::Scale`)
    pub phase_scale: f64,
    pub phase_rescale: PhaseRescale,
    /// Median filter window (x, y, z), odd sizes
    pub median_kernel: [usize; 3],
    /// Hz/mT
    pub gyromagnetic_ratio: f64,
    pub unwrap_method: UnwrapMethod,
    /// Largest tolerated residue fraction over the mask (>= 1 disables the check)
    pub max_residue_fraction: f64,
    pub t2star_policy: DegeneratePolicy,
    /// Echo indices (earlier, later) used for the reconstruction
    pub echo_pair: [usize; 2],
}

impl Default for FieldmapConfig {
    fn default() -> Self {
        FieldmapConfig {
            mask_threshold: 0.1,
            phase_scale: DEFAULT_PHASE_SCALE,
            phase_rescale: PhaseRescale::Scale,
            median_kernel: [3, 3, 3],
            gyromagnetic_ratio: GAMMA_1H_HZ_PER_MT,
            unwrap_method: UnwrapMethod::RegionGrowing,
            max_residue_fraction: 0.25,
            t2star_policy: DegeneratePolicy::Zero,
            echo_pair: [0, 1],
        }
    }
}

impl FieldmapConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: FieldmapConfig = toml::from_str(content)
            .map_err(|e| FieldmapError::InvalidConfig(format!("Failed to parse TOML config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| FieldmapError::Io(format!("Failed to read config file '{}': {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self)
            .map_err(|e| FieldmapError::InvalidConfig(format!("Failed to serialize config: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.mask_threshold) {
            return Err(FieldmapError::InvalidConfig(format!(
                "mask_threshold must be in [0, 1), got {}", self.mask_threshold
            )));
        }
        if !(self.phase_scale.is_finite() && self.phase_scale > 0.0) {
            return Err(FieldmapError::InvalidConfig(format!(
                "phase_scale must be positive, got {}", self.phase_scale
            )));
        }
        if let Some(&k) = self.median_kernel.iter().find(|&&k| k == 0 || k % 2 == 0) {
            return Err(FieldmapError::InvalidConfig(format!(
                "median_kernel sizes must be odd, got {} in {:?}", k, self.median_kernel
            )));
        }
        if !(self.gyromagnetic_ratio.is_finite() && self.gyromagnetic_ratio > 0.0) {
            return Err(FieldmapError::InvalidConfig(format!(
                "gyromagnetic_ratio must be positive, got {}", self.gyromagnetic_ratio
            )));
        }
        if !(self.max_residue_fraction >= 0.0) {
            return Err(FieldmapError::InvalidConfig(format!(
                "max_residue_fraction must be non-negative, got {}", self.max_residue_fraction
            )));
        }
        if self.echo_pair[0] == self.echo_pair[1] {
            return Err(FieldmapError::InvalidConfig(format!(
                "echo_pair must name two different echoes, got {:?}", self.echo_pair
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = FieldmapConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mask_threshold, 0.1);
        assert!((config.phase_scale - std::f64::consts::PI / 4096.0).abs() < 1e-15);
        assert_eq!(config.median_kernel, [3, 3, 3]);
        assert_eq!(config.gyromagnetic_ratio, 42.58e3);
        assert_eq!(config.echo_pair, [0, 1]);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = FieldmapConfig::from_toml_str(
            "mask_threshold = 0.2\nunwrap_method = \"laplacian\"\nt2star_policy = \"pass_through\"\n",
        ).unwrap();
        assert_eq!(config.mask_threshold, 0.2);
        assert_eq!(config.unwrap_method, UnwrapMethod::Laplacian);
        assert_eq!(config.t2star_policy, DegeneratePolicy::PassThrough);
        assert_eq!(config.median_kernel, [3, 3, 3]);
        assert_eq!(config.phase_rescale, PhaseRescale::Scale);
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = FieldmapConfig::default();
        config.phase_rescale = PhaseRescale::Auto;
        config.echo_pair = [1, 2];
        let text = config.to_toml_string().unwrap();
        assert_eq!(FieldmapConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = FieldmapConfig::from_toml_str("mask_treshold = 0.2\n");
        assert!(matches!(result, Err(FieldmapError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            FieldmapConfig { mask_threshold: 1.0, ..Default::default() },
            FieldmapConfig { mask_threshold: -0.1, ..Default::default() },
            FieldmapConfig { phase_scale: 0.0, ..Default::default() },
            FieldmapConfig { median_kernel: [3, 2, 3], ..Default::default() },
            FieldmapConfig { median_kernel: [0, 3, 3], ..Default::default() },
            FieldmapConfig { gyromagnetic_ratio: f64::NAN, ..Default::default() },
            FieldmapConfig { max_residue_fraction: -1.0, ..Default::default() },
            FieldmapConfig { echo_pair: [1, 1], ..Default::default() },
        ];
        for config in bad {
            assert!(
                matches!(config.validate(), Err(FieldmapError::InvalidConfig(_))),
                "{:?} should be rejected", config
            );
        }
    }

    #[test]
    fn test_from_file_missing() {
        let path = std::env::temp_dir().join("b0map_missing_config_9f2c.toml");
        let result = FieldmapConfig::from_file(&path);
        assert!(matches!(result, Err(FieldmapError::Io(_))));
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("b0map_config_{}.toml", std::process::id()));
        fs::write(&path, "median_kernel = [5, 5, 1]\ngyromagnetic_ratio = 10.705e3\n").unwrap();
        let config = FieldmapConfig::from_file(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(config.median_kernel, [5, 5, 1]);
        assert_eq!(config.gyromagnetic_ratio, 10.705e3);
    }
}
