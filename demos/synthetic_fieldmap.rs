//! Fieldmap reconstruction on a synthetic two-echo acquisition
//!
//! Writes mag.nii.gz, phs.nii.gz and te.csv for a spherical phantom in a
//! known field, runs the file-to-file pipeline and compares the result.
//!
//! Usage: cargo run --release --example synthetic_fieldmap [output_dir]

use std::f64::consts::PI;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;

use b0map_core::config::FieldmapConfig;
use b0map_core::fft::{idx3d, wrap_angle};
use b0map_core::phase::DEFAULT_PHASE_SCALE;
use b0map_core::pipeline::{self, RunPaths};
use b0map_core::utils::mask::create_sphere_mask;
use b0map_core::volume::Volume;

fn main() -> anyhow::Result<()> {
    let total_start = Instant::now();

    let output_dir = std::env::args().nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("b0map_synthetic"));
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    // ========================================================================
    // Phantom
    // ========================================================================
    let n = 48;
    let (nx, ny, nz) = (n, n, n);
    let voxel_size = (2.0, 2.0, 2.0);
    let echo_times: [f64; 2] = [0.0046, 0.0092];
    let t2star_ms = 35.0;
    let c = (n as f64 - 1.0) / 2.0;

    println!("[INFO] Building {}x{}x{} phantom...", nx, ny, nz);
    let object = create_sphere_mask(nx, ny, nz, c, c, c, 20.0);

    // Linear shim error along x plus a Gaussian bump near an "air cavity"
    let mut field_hz = vec![0.0; nx * ny * nz];
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let (x, y, z) = (i as f64 - c, j as f64 - c, k as f64 - c);
                let r2 = (x - 6.0).powi(2) + (y + 4.0).powi(2) + z.powi(2);
                field_hz[idx3d(i, j, k, nx, ny)] = 4.0 * x + 120.0 * (-r2 / 50.0).exp();
            }
        }
    }

    let n_total = nx * ny * nz;
    let mut mag = Vec::with_capacity(2 * n_total);
    let mut phase = Vec::with_capacity(2 * n_total);
    for &te in &echo_times {
        let signal = 1000.0 * (-te * 1e3 / t2star_ms).exp();
        mag.extend(object.iter().map(|&m| if m > 0 { signal } else { 15.0 }));
        phase.extend(field_hz.iter().map(|&f| (wrap_angle(0.7 + 2.0 * PI * f * te) / DEFAULT_PHASE_SCALE).round()));
    }

    let affine = [
        voxel_size.0, 0.0, 0.0, -c * voxel_size.0,
        0.0, voxel_size.1, 0.0, -c * voxel_size.1,
        0.0, 0.0, voxel_size.2, -c * voxel_size.2,
        0.0, 0.0, 0.0, 1.0,
    ];
    let mag = Volume::new(mag, (nx, ny, nz), 2, voxel_size, affine)?;
    let phase = Volume::new(phase, (nx, ny, nz), 2, voxel_size, affine)?;

    let paths = RunPaths {
        magnitude: vec![output_dir.join("mag.nii.gz")],
        phase: vec![output_dir.join("phs.nii.gz")],
        echo_times: output_dir.join("te.csv"),
        out_dir: output_dir.join("fieldmap"),
    };
    mag.save(&paths.magnitude[0])?;
    phase.save(&paths.phase[0])?;
    std::fs::write(&paths.echo_times, format!("{},{}\n", echo_times[0], echo_times[1]))?;
    println!("[INFO] Inputs written to {}", output_dir.display());

    // ========================================================================
    // Reconstruction
    // ========================================================================
    let start = Instant::now();
    let outputs = pipeline::run_files(&paths, &FieldmapConfig::default(), |stage| {
        println!("[STEP {}] {}...", stage.number(), stage.description());
    })?;
    println!("[INFO] Reconstruction completed in {:.2?}", start.elapsed());

    // ========================================================================
    // Comparison (field is recovered up to a constant)
    // ========================================================================
    let in_mask: Vec<usize> = (0..n_total).filter(|&i| outputs.mask.data[i] > 0.5).collect();
    let count = in_mask.len().max(1) as f64;
    let offset = in_mask.iter().map(|&i| outputs.hz.data[i] - field_hz[i]).sum::<f64>() / count;
    let rmse = (in_mask.iter()
        .map(|&i| (outputs.hz.data[i] - field_hz[i] - offset).powi(2))
        .sum::<f64>() / count)
        .sqrt();
    let t2s_err = in_mask.iter()
        .map(|&i| (outputs.t2star_ms.data[i] - t2star_ms).abs())
        .fold(0.0, f64::max);

    println!("\n[INFO] Mask voxels: {}", outputs.mask_voxels);
    println!("[INFO] Field RMSE (up to constant): {:.3} Hz, constant {:.2} Hz", rmse, offset);
    println!("[INFO] Max T2* error: {:.2e} ms", t2s_err);
    println!("[INFO] Outputs in {}", paths.out_dir.display());
    println!("[INFO] Total time: {:.2?}", total_start.elapsed());

    Ok(())
}
