//! Optimization components for fitting meshes through the rasterizer.
//!
//! - Adam optimizer for vertex positions
//! - Scalar image losses (L2, soft silhouette IoU)

pub mod adam;
pub mod loss;

pub use adam::AdamVec3;
pub use loss::{l2_loss_and_grad, silhouette_loss_and_grad};
