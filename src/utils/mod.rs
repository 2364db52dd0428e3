//! Utility functions for fieldmap processing
//!
//! - Mask operations (thresholding, connected components, synthetic spheres)
//! - Gradient operators (central differences, field gradient in mT/m)

pub mod gradient;
pub mod mask;

pub use gradient::*;
pub use mask::*;
