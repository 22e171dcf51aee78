//! Barycentric interpolation of per-vertex attributes over fragments.

use crate::error::{RasterError, Result};
use crate::render::Fragments;
use nalgebra::Vector3;
use rayon::prelude::*;

/// Per-slot attribute `Σ b_i a[face_i]`; zero for empty slots.
///
/// `faces` and `vertex_attrs` are the packed face and per-vertex buffers of
/// the rasterized batch.
pub fn interpolate_face_attributes(
    fragments: &Fragments,
    faces: &[[usize; 3]],
    vertex_attrs: &[Vector3<f32>],
) -> Vec<Vector3<f32>> {
    (0..fragments.len())
        .into_par_iter()
        .map(|i| {
            let face = fragments.pix_to_face[i];
            if face < 0 {
                return Vector3::zeros();
            }
            let ids = faces[face as usize];
            let b = fragments.bary_coords[i];
            vertex_attrs[ids[0]] * b[0] + vertex_attrs[ids[1]] * b[1] + vertex_attrs[ids[2]] * b[2]
        })
        .collect()
}

/// Backward of `interpolate_face_attributes`.
///
/// Returns (dL/d vertex_attrs, dL/d bary_coords per slot).
pub fn interpolate_face_attributes_backward(
    fragments: &Fragments,
    faces: &[[usize; 3]],
    vertex_attrs: &[Vector3<f32>],
    d_out: &[Vector3<f32>],
) -> Result<(Vec<Vector3<f32>>, Vec<Vector3<f32>>)> {
    if d_out.len() != fragments.len() {
        return Err(RasterError::GradShapeMismatch(format!(
            "expected {} attribute gradients, got {}",
            fragments.len(),
            d_out.len()
        )));
    }
    let num_verts = vertex_attrs.len();

    let d_bary: Vec<Vector3<f32>> = (0..fragments.len())
        .into_par_iter()
        .map(|i| {
            let face = fragments.pix_to_face[i];
            if face < 0 {
                return Vector3::zeros();
            }
            let ids = faces[face as usize];
            Vector3::new(
                vertex_attrs[ids[0]].dot(&d_out[i]),
                vertex_attrs[ids[1]].dot(&d_out[i]),
                vertex_attrs[ids[2]].dot(&d_out[i]),
            )
        })
        .collect();

    let d_attrs = (0..fragments.len())
        .into_par_iter()
        .fold(
            || vec![Vector3::zeros(); num_verts],
            |mut acc, i| {
                let face = fragments.pix_to_face[i];
                if face >= 0 {
                    let ids = faces[face as usize];
                    let b = fragments.bary_coords[i];
                    for j in 0..3 {
                        acc[ids[j]] += d_out[i] * b[j];
                    }
                }
                acc
            },
        )
        .reduce(
            || vec![Vector3::zeros(); num_verts],
            |mut a, b| {
                for (x, y) in a.iter_mut().zip(b) {
                    *x += y;
                }
                a
            },
        );

    Ok((d_attrs, d_bary))
}
