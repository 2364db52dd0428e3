//! Iterative solvers
//!
//! - PCG: Preconditioned conjugate gradient (Laplacian unwrapping)

pub mod cg;

pub use cg::*;
