//! I/O for meshes.
//!
//! - OBJ format (triangle mesh load/save)

mod obj;

use crate::error::RasterError;
use thiserror::Error;

/// Errors that can occur while loading or saving mesh files.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {msg}")]
    Parse { line: usize, msg: String },

    #[error(transparent)]
    Mesh(#[from] RasterError),
}

pub use obj::{load_obj, read_obj, save_obj};
