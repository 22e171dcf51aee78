//! Core data structures.
//!
//! This module contains the fundamental types used throughout the system:
//! - `Mesh` / `MeshBatch`: triangle meshes, packed into ragged flat buffers
//! - `Camera`: extrinsics plus perspective or orthographic projection
//!
//! All types here are "pure data" - no rasterization logic.

mod camera;
mod mesh;

pub use camera::{perspective_scales, Camera, Projection};
pub use mesh::{Mesh, MeshBatch, MeshRange};
