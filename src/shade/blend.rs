//! Image-level blending of the K fragments of each pixel.
//!
//! Colors are given per fragment slot, in the same (N, H, W, K) layout as the
//! fragment buffers. Outputs are per pixel.

use crate::diff::blend_grad::{
    sigmoid_alpha_backward, sigmoid_alpha_forward, softmax_backward, softmax_forward,
    SoftmaxParams,
};
use crate::error::{RasterError, Result};
use crate::render::{FragmentGrads, Fragments};
use nalgebra::Vector3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendParams {
    /// Sharpness of the coverage sigmoid, in the NDC units of `Fragments::dists`.
    ///
    /// Distances are Euclidean, not squared, so the 1e-4 default makes the
    /// sigmoid a near step: gradients only reach fragments within about 1e-3
    /// NDC of an edge. Silhouette fitting wants a value on the order of the
    /// pixel size (2 / image size) together with a matching `blur_radius`.
    pub sigma: f32,
    /// Depth softmax temperature
    pub gamma: f32,
    pub background: Vector3<f32>,
}

impl Default for BlendParams {
    fn default() -> Self {
        Self {
            sigma: 1e-4,
            gamma: 1e-4,
            background: Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

/// Per-pixel RGB and alpha, row-major over (N, H, W).
#[derive(Clone, Debug)]
pub struct BlendOutput {
    pub rgb: Vec<Vector3<f32>>,
    pub alpha: Vec<f32>,
}

/// Gradients of a blend w.r.t. its per-slot inputs.
#[derive(Clone, Debug)]
pub struct BlendGrads {
    pub d_colors: Vec<Vector3<f32>>,
    /// `d_zbuf` and `d_dists` filled in; `d_bary` zero
    pub fragment: FragmentGrads,
}

fn check_slots(fragments: &Fragments, colors: &[Vector3<f32>]) -> Result<()> {
    if colors.len() != fragments.len() {
        return Err(RasterError::GradShapeMismatch(format!(
            "expected {} slot colors, got {}",
            fragments.len(),
            colors.len()
        )));
    }
    Ok(())
}

fn check_pixels(fragments: &Fragments, len: usize, what: &str) -> Result<()> {
    if len != fragments.num_pixels() {
        return Err(RasterError::GradShapeMismatch(format!(
            "expected {} per-pixel {what}, got {len}",
            fragments.num_pixels()
        )));
    }
    Ok(())
}

fn valid_mask(faces: &[i64]) -> Vec<bool> {
    faces.iter().map(|&f| f >= 0).collect()
}

/// Color of the nearest face, background where no face covers the pixel.
///
/// Alpha is 1 for every pixel, background included.
pub fn hard_rgb_blend(
    colors: &[Vector3<f32>],
    fragments: &Fragments,
    params: &BlendParams,
) -> Result<BlendOutput> {
    check_slots(fragments, colors)?;
    let k = fragments.k;
    let (rgb, alpha) = (0..fragments.num_pixels())
        .into_par_iter()
        .map(|pix| {
            let rgb = if fragments.pix_to_face[pix * k] < 0 {
                params.background
            } else {
                colors[pix * k]
            };
            (rgb, 1.0)
        })
        .unzip();
    Ok(BlendOutput { rgb, alpha })
}

/// Silhouette blend: alpha = 1 - Π_k (1 - σ(-d_k / sigma)); rgb is the nearest slot's color.
pub fn sigmoid_alpha_blend(
    colors: &[Vector3<f32>],
    fragments: &Fragments,
    params: &BlendParams,
) -> Result<BlendOutput> {
    check_slots(fragments, colors)?;
    let k = fragments.k;
    let (rgb, alpha) = (0..fragments.num_pixels())
        .into_par_iter()
        .map(|pix| {
            let slots = pix * k..(pix + 1) * k;
            let valid = valid_mask(&fragments.pix_to_face[slots.clone()]);
            let alpha = sigmoid_alpha_forward(&fragments.dists[slots], &valid, params.sigma);
            (colors[pix * k], alpha)
        })
        .unzip();
    Ok(BlendOutput { rgb, alpha })
}

pub fn sigmoid_alpha_blend_backward(
    fragments: &Fragments,
    params: &BlendParams,
    d_rgb: &[Vector3<f32>],
    d_alpha: &[f32],
) -> Result<BlendGrads> {
    check_pixels(fragments, d_rgb.len(), "rgb gradients")?;
    check_pixels(fragments, d_alpha.len(), "alpha gradients")?;
    let k = fragments.k;
    let mut grads = BlendGrads {
        d_colors: vec![Vector3::zeros(); fragments.len()],
        fragment: FragmentGrads::zeros_like(fragments),
    };

    grads
        .d_colors
        .par_chunks_mut(k)
        .zip(grads.fragment.d_dists.par_chunks_mut(k))
        .enumerate()
        .for_each(|(pix, (d_colors, d_dists))| {
            let slots = pix * k..(pix + 1) * k;
            let valid = valid_mask(&fragments.pix_to_face[slots.clone()]);
            d_colors[0] = d_rgb[pix];
            let dd = sigmoid_alpha_backward(&fragments.dists[slots], &valid, params.sigma, d_alpha[pix]);
            d_dists.copy_from_slice(&dd);
        });
    Ok(grads)
}

fn softmax_params(params: &BlendParams, znear: f32, zfar: f32) -> SoftmaxParams {
    SoftmaxParams {
        sigma: params.sigma,
        gamma: params.gamma,
        znear,
        zfar,
        background: params.background,
    }
}

/// Depth-weighted softmax over the K slots, blended with the background.
pub fn softmax_rgb_blend(
    colors: &[Vector3<f32>],
    fragments: &Fragments,
    params: &BlendParams,
    znear: f32,
    zfar: f32,
) -> Result<BlendOutput> {
    check_slots(fragments, colors)?;
    let k = fragments.k;
    let sp = softmax_params(params, znear, zfar);
    let (rgb, alpha) = (0..fragments.num_pixels())
        .into_par_iter()
        .map(|pix| {
            let slots = pix * k..(pix + 1) * k;
            let valid = valid_mask(&fragments.pix_to_face[slots.clone()]);
            let out = softmax_forward(
                &colors[slots.clone()],
                &fragments.dists[slots.clone()],
                &fragments.zbuf[slots],
                &valid,
                &sp,
            );
            (out.rgb, out.alpha)
        })
        .unzip();
    Ok(BlendOutput { rgb, alpha })
}

pub fn softmax_rgb_blend_backward(
    colors: &[Vector3<f32>],
    fragments: &Fragments,
    params: &BlendParams,
    znear: f32,
    zfar: f32,
    d_rgb: &[Vector3<f32>],
    d_alpha: &[f32],
) -> Result<BlendGrads> {
    check_slots(fragments, colors)?;
    check_pixels(fragments, d_rgb.len(), "rgb gradients")?;
    check_pixels(fragments, d_alpha.len(), "alpha gradients")?;
    let k = fragments.k;
    let sp = softmax_params(params, znear, zfar);
    let mut grads = BlendGrads {
        d_colors: vec![Vector3::zeros(); fragments.len()],
        fragment: FragmentGrads::zeros_like(fragments),
    };

    grads
        .d_colors
        .par_chunks_mut(k)
        .zip(grads.fragment.d_dists.par_chunks_mut(k))
        .zip(grads.fragment.d_zbuf.par_chunks_mut(k))
        .enumerate()
        .for_each(|(pix, ((d_colors, d_dists), d_zbuf))| {
            let slots = pix * k..(pix + 1) * k;
            let valid = valid_mask(&fragments.pix_to_face[slots.clone()]);
            let g = softmax_backward(
                &colors[slots.clone()],
                &fragments.dists[slots.clone()],
                &fragments.zbuf[slots],
                &valid,
                &sp,
                &d_rgb[pix],
                d_alpha[pix],
            );
            d_colors.copy_from_slice(&g.d_colors);
            d_dists.copy_from_slice(&g.d_dists);
            d_zbuf.copy_from_slice(&g.d_zbuf);
        });
    Ok(grads)
}
