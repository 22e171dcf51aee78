//! # meshrast-rs: Differentiable mesh rasterization in Rust
//!
//! This crate rasterizes batches of triangle meshes into per-pixel lists of the
//! K nearest faces, with barycentric coordinates, depths and signed edge
//! distances for each, and backpropagates gradients from those outputs to
//! vertex positions and camera parameters.
//!
//! ## Architecture
//!
//! - `core`: Fundamental data structures (meshes, packed batches, cameras)
//! - `render`: Forward pipeline (transform, clipping, coarse/fine rasterization)
//!   and the rasterizer's backward entry point
//! - `diff`: Differentiable measurements (barycentrics, distances, projection)
//! - `shade`: Attribute interpolation and blending of fragments
//! - `io`: OBJ loading/saving
//! - `optim`: Adam and image losses for fitting meshes
//!
//! Selection (which faces a pixel sees) is discrete and carries no gradient;
//! measurement (where in the face, how deep, how far from an edge) does.

// Core data structures
pub mod core;

// Error types
pub mod error;

// I/O operations (OBJ)
pub mod io;

// Forward rasterization pipeline
pub mod render;

// Differentiable operations (backward passes)
pub mod diff;

// Shading on top of fragments
pub mod shade;

// Optimization (Adam, losses)
pub mod optim;

// Re-export commonly used types at crate root for convenience
pub use core::{Camera, Mesh, MeshBatch, Projection};
pub use error::{RasterError, Result};
pub use io::LoadError;
pub use render::{Fragments, MeshRasterizer, RasterizationSettings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
