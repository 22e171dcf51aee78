//! Shading collaborators that consume fragments.
//!
//! Attribute interpolation and per-pixel blending, each with a backward pass
//! that produces `FragmentGrads` for `MeshRasterizer::backward`.

mod blend;
mod interpolate;

pub use blend::{
    hard_rgb_blend, sigmoid_alpha_blend, sigmoid_alpha_blend_backward, softmax_rgb_blend,
    softmax_rgb_blend_backward, BlendGrads, BlendOutput, BlendParams,
};
pub use interpolate::{interpolate_face_attributes, interpolate_face_attributes_backward};
