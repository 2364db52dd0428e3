//! Command-line B0 fieldmap and T2* reconstruction
//!
//! Usage: b0map --mag mag.nii.gz --phase phs.nii.gz --te te.csv --out-dir out

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;

use b0map_core::config::FieldmapConfig;
use b0map_core::denoise::masked_median;
use b0map_core::phase::PhaseRescale;
use b0map_core::pipeline::{self, RunPaths, Stage};
use b0map_core::relaxometry::DegeneratePolicy;
use b0map_core::unwrap::UnwrapMethod;

/// Median filter window: one size for all axes ("3") or one per axis ("3,3,1")
#[derive(Clone, Copy, Debug)]
struct Kernel([usize; 3]);

impl FromStr for Kernel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let sizes = s.split(',')
            .map(|t| t.trim().parse::<usize>().map_err(|_| format!("Invalid kernel size '{}'", t)))
            .collect::<Result<Vec<_>, _>>()?;
        match sizes.as_slice() {
            &[k] => Ok(Kernel([k, k, k])),
            &[kx, ky, kz] => Ok(Kernel([kx, ky, kz])),
            _ => Err("Expected 1 or 3 comma-separated sizes".to_string()),
        }
    }
}

/// Echo indices "earlier,later"
#[derive(Clone, Copy, Debug)]
struct EchoPairArg([usize; 2]);

impl FromStr for EchoPairArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s.split_once(',').ok_or("Expected two indices separated by ','".to_string())?;
        Ok(EchoPairArg([
            a.trim().parse().map_err(|_| format!("Invalid echo index '{}'", a))?,
            b.trim().parse().map_err(|_| format!("Invalid echo index '{}'", b))?,
        ]))
    }
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
/// Reconstruct a B0 fieldmap (rad/s, Hz), its gradient (mT/m) and a T2* map
/// from multi-echo gradient-echo magnitude and phase images.
///
/// Outputs written to the output directory: dphi, dB0_rad_s, dB0_Hz,
/// grad_dB0, T2star_ms and mask (.nii.gz).
struct Args {
    #[arg(long, num_args = 1.., default_value = "mag.nii.gz")]
    /// Magnitude: one 4D echo stack or one 3D file per echo
    mag: Vec<PathBuf>,

    #[arg(long, num_args = 1.., default_value = "phs.nii.gz")]
    /// Phase: one 4D echo stack or one 3D file per echo
    phase: Vec<PathBuf>,

    #[arg(long, default_value = "te.csv")]
    /// Echo times in seconds (comma, whitespace or newline separated)
    te: PathBuf,

    #[arg(short, long, default_value = ".")]
    /// Output directory
    out_dir: PathBuf,

    #[arg(short, long)]
    /// TOML configuration file; flags below override its values
    config: Option<PathBuf>,

    #[arg(long)]
    /// Mask threshold as a fraction of the maximum first-echo magnitude
    mask_threshold: Option<f64>,

    #[arg(long, conflicts_with = "auto_phase_scale")]
    /// Stored phase to radians scale factor (default π/4096)
    phase_scale: Option<f64>,

    #[arg(long)]
    /// Detect the stored phase range and map it onto [-π, π]
    auto_phase_scale: bool,

    #[arg(long)]
    /// Median filter window, e.g. 3 or 3,3,1
    median_kernel: Option<Kernel>,

    #[arg(long)]
    /// Gyromagnetic ratio in Hz/mT
    gamma: Option<f64>,

    #[arg(long)]
    /// Unwrapping method: region-growing or laplacian
    unwrap: Option<UnwrapMethod>,

    #[arg(long)]
    /// Largest tolerated phase residue fraction over the mask
    max_residue_fraction: Option<f64>,

    #[arg(long)]
    /// Echo pair used for the reconstruction, e.g. 0,1
    echo_pair: Option<EchoPairArg>,

    #[arg(long)]
    /// Keep negative/infinite T2* values inside the mask instead of zeroing them
    keep_degenerate_t2star: bool,
}

impl Args {
    fn build_config(&self) -> anyhow::Result<FieldmapConfig> {
        let mut config = match &self.config {
            Some(path) => FieldmapConfig::from_file(path)
                .with_context(|| format!("Loading config {}", path.display()))?,
            None => FieldmapConfig::default(),
        };

        if let Some(v) = self.mask_threshold { config.mask_threshold = v; }
        if let Some(v) = self.phase_scale {
            config.phase_scale = v;
            config.phase_rescale = PhaseRescale::Scale;
        }
        if self.auto_phase_scale { config.phase_rescale = PhaseRescale::Auto; }
        if let Some(Kernel(k)) = self.median_kernel { config.median_kernel = k; }
        if let Some(v) = self.gamma { config.gyromagnetic_ratio = v; }
        if let Some(m) = self.unwrap { config.unwrap_method = m; }
        if let Some(v) = self.max_residue_fraction { config.max_residue_fraction = v; }
        if let Some(EchoPairArg(p)) = self.echo_pair { config.echo_pair = p; }
        if self.keep_degenerate_t2star { config.t2star_policy = DegeneratePolicy::PassThrough; }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

fn print_config(config: &FieldmapConfig) {
    println!("[INFO] Mask threshold: {}", config.mask_threshold);
    match config.phase_rescale {
        PhaseRescale::Scale => println!("[INFO] Phase scale: {:.6e} rad/unit", config.phase_scale),
        PhaseRescale::Auto => println!("[INFO] Phase scale: auto-detected"),
    }
    println!("[INFO] Unwrapping: {:?}, residue limit {}", config.unwrap_method, config.max_residue_fraction);
    println!("[INFO] Median kernel: {:?}", config.median_kernel);
    println!("[INFO] Gyromagnetic ratio: {} Hz/mT", config.gyromagnetic_ratio);
    println!("[INFO] Echo pair: {:?}", config.echo_pair);
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let total_start = Instant::now();

    let config = args.build_config()?;
    print_config(&config);

    let paths = RunPaths {
        magnitude: args.mag.clone(),
        phase: args.phase.clone(),
        echo_times: args.te.clone(),
        out_dir: args.out_dir.clone(),
    };

    println!("[INFO] Loading NIfTI data...");
    let start = Instant::now();
    let echoes = pipeline::load_echo_set(&paths).context("Loading inputs")?;
    let (nx, ny, nz) = echoes.magnitude.dims;
    let (vsx, vsy, vsz) = echoes.magnitude.voxel_size;
    println!("[INFO] Loaded in {:.2?}", start.elapsed());
    println!("[INFO] Volume: {}x{}x{}, Voxel: {:.2}x{:.2}x{:.2} mm", nx, ny, nz, vsx, vsy, vsz);
    println!("[INFO] Echo times (s): {:?}", echoes.echo_times);

    let mut stage_start: Option<(Stage, Instant)> = None;
    let outputs = pipeline::reconstruct_with_progress(&echoes, &config, |stage| {
        if let Some((prev, t)) = stage_start.take() {
            println!("[INFO] {} completed in {:.2?}", prev.description(), t.elapsed());
        }
        println!("\n[STEP {}] {}...", stage.number(), stage.description());
        stage_start = Some((stage, Instant::now()));
    })
    .context("Reconstruction failed")?;
    if let Some((prev, t)) = stage_start {
        println!("[INFO] {} completed in {:.2?}", prev.description(), t.elapsed());
    }

    let n_total = nx * ny * nz;
    println!(
        "\n[INFO] Mask: {} / {} voxels ({:.1}%)",
        outputs.mask_voxels, n_total, 100.0 * outputs.mask_voxels as f64 / n_total.max(1) as f64
    );
    println!("[INFO] Removed phase offset: {:.4} rad", outputs.phase_offset);
    for component in &outputs.noisy_components {
        println!("[WARN] {}; phase there may hold local unwrapping errors", component);
    }

    let mask: Vec<u8> = outputs.mask.data.iter().map(|&m| (m > 0.5) as u8).collect();
    let (hz_min, hz_max) = outputs.hz.data.iter()
        .zip(mask.iter())
        .filter(|(_, &m)| m != 0)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (&v, _)| (lo.min(v), hi.max(v)));
    if outputs.mask_voxels > 0 {
        println!("[INFO] Field offset range: [{:.2}, {:.2}] Hz", hz_min, hz_max);
    }
    if let Some(t2s) = masked_median(&outputs.t2star_ms.data, &mask) {
        println!("[INFO] Median T2* in mask: {:.2} ms", t2s);
    }

    println!("\n[INFO] Saving outputs to {}...", args.out_dir.display());
    let start = Instant::now();
    let written = outputs.save(&args.out_dir).context("Saving outputs")?;
    for path in &written {
        println!("[INFO]   {}", path.display());
    }
    println!("[INFO] Saved in {:.2?}", start.elapsed());

    println!("\n[INFO] Total time: {:.2?}", total_start.elapsed());
    Ok(())
}
