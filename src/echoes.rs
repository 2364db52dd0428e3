//! Echo set: echo times plus magnitude and phase stacks
//!
//! All preconditions on the acquisition (echo count, echo time ordering,
//! shared geometry) are checked when the set is built, so the reconstruction
//! never discovers them halfway through.

use std::fs;
use std::path::Path;

use crate::error::{FieldmapError, Result};
use crate::volume::{check_same_grid, Volume};

#[derive(Clone, Debug)]
pub struct EchoSet {
    /// Echo times in seconds, strictly increasing
    pub echo_times: Vec<f64>,
    /// Magnitude, one frame per echo
    pub magnitude: Volume,
    /// Phase (stored values), one frame per echo
    pub phase: Volume,
}

/// The two echoes taking part in a reconstruction
#[derive(Clone, Copy, Debug)]
pub struct EchoPair<'a> {
    /// Later minus earlier echo time in seconds (> 0)
    pub delta_te: f64,
    pub mag0: &'a [f64],
    pub mag1: &'a [f64],
    pub phase0: &'a [f64],
    pub phase1: &'a [f64],
}

impl EchoSet {
    pub fn new(echo_times: Vec<f64>, magnitude: Volume, phase: Volume) -> Result<Self> {
        validate_echo_times(&echo_times)?;

        check_same_grid(&[("magnitude", &magnitude), ("phase", &phase)])?;
        if magnitude.n_vols != phase.n_vols {
            return Err(FieldmapError::GeometryMismatch(format!(
                "magnitude has {} echoes but phase has {}", magnitude.n_vols, phase.n_vols
            )));
        }
        if magnitude.n_vols != echo_times.len() {
            return Err(FieldmapError::InvalidEchoTimes(format!(
                "{} echo times given for {} echo volumes", echo_times.len(), magnitude.n_vols
            )));
        }

        Ok(EchoSet { echo_times, magnitude, phase })
    }

    /// Build a set from per-echo files' volumes
    ///
    /// Each list is either a single stacked (4D) volume or one 3D volume per echo.
    pub fn from_echo_volumes(
        echo_times: Vec<f64>,
        magnitudes: Vec<Volume>,
        phases: Vec<Volume>,
    ) -> Result<Self> {
        let magnitude = assemble_stack(magnitudes, "magnitude")?;
        let phase = assemble_stack(phases, "phase")?;
        Self::new(echo_times, magnitude, phase)
    }

    pub fn n_echoes(&self) -> usize {
        self.echo_times.len()
    }

    /// Select the echoes `[earlier, later]` for reconstruction
    pub fn pair(&self, echo_pair: [usize; 2]) -> Result<EchoPair<'_>> {
        let [e0, e1] = echo_pair;
        let n = self.n_echoes();
        if e0 >= n || e1 >= n {
            return Err(FieldmapError::InvalidEchoTimes(format!(
                "echo pair {:?} out of range for {} echoes", echo_pair, n
            )));
        }

        let delta_te = self.echo_times[e1] - self.echo_times[e0];
        if !(delta_te > 0.0) {
            return Err(FieldmapError::InvalidEchoTimes(format!(
                "echo {} (TE {} s) must come after echo {} (TE {} s)",
                e1, self.echo_times[e1], e0, self.echo_times[e0]
            )));
        }

        Ok(EchoPair {
            delta_te,
            mag0: self.magnitude.volume(e0),
            mag1: self.magnitude.volume(e1),
            phase0: self.phase.volume(e0),
            phase1: self.phase.volume(e1),
        })
    }
}

fn assemble_stack(mut volumes: Vec<Volume>, what: &str) -> Result<Volume> {
    if volumes.len() > 1 {
        return Volume::stack(&volumes);
    }
    volumes.pop()
        .ok_or_else(|| FieldmapError::Io(format!("no {} volumes given", what)))
}

/// At least two finite, strictly increasing echo times
pub fn validate_echo_times(echo_times: &[f64]) -> Result<()> {
    if echo_times.len() < 2 {
        return Err(FieldmapError::InvalidEchoTimes(format!(
            "at least 2 echo times are required, got {}", echo_times.len()
        )));
    }
    if let Some(te) = echo_times.iter().find(|te| !te.is_finite() || **te < 0.0) {
        return Err(FieldmapError::InvalidEchoTimes(format!(
            "echo time {} is not a non-negative number of seconds", te
        )));
    }
    for (i, w) in echo_times.windows(2).enumerate() {
        if w[1] <= w[0] {
            return Err(FieldmapError::InvalidEchoTimes(format!(
                "echo times must be strictly increasing: TE{} = {} s, TE{} = {} s",
                i, w[0], i + 1, w[1]
            )));
        }
    }
    Ok(())
}

/// Parse an echo-time list in seconds
///
/// Values may be separated by commas, whitespace or newlines. Text after `#`
/// on a line is ignored.
pub fn parse_echo_times(content: &str) -> Result<Vec<f64>> {
    let mut echo_times = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("");
        for token in line.split(|c: char| c == ',' || c == ';' || c.is_whitespace()) {
            if token.is_empty() {
                continue;
            }
            let te: f64 = token.parse().map_err(|_| {
                FieldmapError::InvalidEchoTimes(format!(
                    "line {}: '{}' is not a number", line_no + 1, token
                ))
            })?;
            echo_times.push(te);
        }
    }
    Ok(echo_times)
}

/// Read an echo-time list file
pub fn read_echo_times(path: &Path) -> Result<Vec<f64>> {
    let content = fs::read_to_string(path)
        .map_err(|e| FieldmapError::Io(format!("Failed to read echo times '{}': {}", path.display(), e)))?;
    parse_echo_times(&content)
}
