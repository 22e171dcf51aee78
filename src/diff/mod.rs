//! Differentiable operations (measurements and their backward passes).
//!
//! Each submodule pairs a forward measurement with its analytic gradient.
//! Discrete decisions (coverage, K-nearest membership, binning) live in
//! `render`; everything here is a smooth function of its inputs wherever it
//! is evaluated.

pub mod barycentric_grad;
pub mod blend_grad;
pub mod distance_grad;
pub mod project_grad;
pub mod raster_grad;

pub use project_grad::{CameraGrads, ProjectionGrad};
pub use raster_grad::{FragmentMeasure, FragmentOptions};
