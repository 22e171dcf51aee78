//! Forward rasterization pipeline (CPU implementation).
//!
//! - Transform packed vertices to screen space
//! - Cull and near-clip faces
//! - Coarse pass: bin faces into square screen tiles
//! - Fine pass: keep the K nearest covering faces per pixel
//!
//! `MeshRasterizer::backward` runs the analytic backward pass using the
//! per-fragment gradients from `diff`.

pub mod bins;
pub mod clip;
pub mod fragments;
pub mod knn;
pub mod raster;
pub mod rasterizer;
pub mod settings;
pub mod transform;

pub use bins::BinAssignments;
pub use fragments::{Fragment, FragmentGrads, Fragments, NO_FACE, SENTINEL};
pub use rasterizer::{MeshGrads, MeshRasterizer, RasterContext, RasterOutput};
pub use settings::{NearClipPolicy, RasterizationSettings};
