//! B0map-Core: multi-echo GRE B0 fieldmap and T2* reconstruction
//!
//! This crate reconstructs a static field inhomogeneity map (rad/s and Hz),
//! its spatial gradient (mT/m) and a two-echo T2* map from magnitude and
//! phase images.
//!
//! # Modules
//! - `volume`, `nifti_io`: Volumes with affines, NIfTI-1 load/save
//! - `echoes`: Echo times and echo stacks
//! - `phase`: Phase rescaling and inter-echo difference
//! - `unwrap`: Phase unwrapping (region growing, Laplacian)
//! - `solvers`: Preconditioned conjugate gradient
//! - `relaxometry`: T2* estimation
//! - `denoise`: Median filtering and offset removal
//! - `fieldmap`: Phase to frequency conversion
//! - `utils`: Masks and gradient operators
//! - `pipeline`: End-to-end reconstruction
//! - `config`: Reconstruction parameters

// Core modules
pub mod error;
pub mod fft;
pub mod priority_queue;
pub mod region_grow;
pub mod solvers;

// Algorithm modules
pub mod unwrap;
pub mod phase;
pub mod relaxometry;
pub mod denoise;
pub mod fieldmap;
pub mod utils;

// Data and orchestration
pub mod volume;
pub mod echoes;
pub mod config;
pub mod pipeline;

// I/O modules
pub mod nifti_io;

pub use config::FieldmapConfig;
pub use echoes::EchoSet;
pub use error::{FieldmapError, Result};
pub use pipeline::{reconstruct, reconstruct_with_progress, FieldmapOutputs, Stage};
pub use volume::Volume;
