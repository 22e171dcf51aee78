//! Error types for the rasterization pipeline.
//!
//! Every failure is reported synchronously for the whole render call; there is
//! no per-mesh partial recovery.

use thiserror::Error;

/// Errors that can occur while validating inputs or rasterizing a batch.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RasterError {
    #[error("Invalid camera: {0}")]
    InvalidCamera(String),

    #[error("Invalid rasterization settings: {0}")]
    InvalidSettings(String),

    #[error("Invalid mesh {mesh}: {msg}")]
    InvalidMesh { mesh: usize, msg: String },

    #[error("Wrong number of cameras ({cameras}) for {meshes} meshes")]
    CameraCountMismatch { cameras: usize, meshes: usize },

    #[error(
        "Too many faces in bin ({bin_x}, {bin_y}) of mesh {mesh}: {count} > max_faces_per_bin = {max}; \
         increase max_faces_per_bin or use a smaller bin_size"
    )]
    BinOverflow {
        mesh: usize,
        bin_x: usize,
        bin_y: usize,
        count: usize,
        max: usize,
    },

    #[error("Gradient buffer shape mismatch: {0}")]
    GradShapeMismatch(String),
}

pub type Result<T> = std::result::Result<T, RasterError>;
