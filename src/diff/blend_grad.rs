//! Gradients for per-pixel blending of the K nearest fragments.
//!
//! Two soft blending rules are differentiable w.r.t. the fragment distances
//! (and, for softmax, depths and colors):
//!
//! Sigmoid alpha (silhouette):
//!   p_k   = σ(-d_k / sigma) * valid_k
//!   alpha = 1 - Π_k (1 - p_k)
//!
//! Softmax RGB:
//!   zi_k  = (zfar - z_k) / (zfar - znear) * valid_k
//!   m     = max(max_k zi_k, eps)
//!   w_k   = p_k * exp((zi_k - m) / gamma)
//!   δ     = max(exp((eps - m) / gamma), eps)
//!   rgb   = (Σ w_k c_k + δ bg) / (Σ w_k + δ)
//!   alpha = 1 - Π_k (1 - p_k)
//!
//! The shift `m` cancels between numerator and denominator, so it is held
//! constant in the backward pass.

use nalgebra::Vector3;

const EPS: f32 = 1e-10;

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Coverage probabilities p_k for one pixel's K slots.
pub fn coverage_probs(dists: &[f32], valid: &[bool], sigma: f32) -> Vec<f32> {
    dists
        .iter()
        .zip(valid)
        .map(|(&d, &ok)| if ok { sigmoid(-d / sigma) } else { 0.0 })
        .collect()
}

/// Π_{j != k} (1 - p_j) for every k, via prefix/suffix products.
fn exclusive_products(probs: &[f32]) -> Vec<f32> {
    let n = probs.len();
    let mut out = vec![1.0f32; n];
    let mut acc = 1.0f32;
    for k in 0..n {
        out[k] = acc;
        acc *= 1.0 - probs[k];
    }
    acc = 1.0;
    for k in (0..n).rev() {
        out[k] *= acc;
        acc *= 1.0 - probs[k];
    }
    out
}

/// d p_k / d d_k
#[inline]
fn d_prob_d_dist(p: f32, sigma: f32) -> f32 {
    -p * (1.0 - p) / sigma
}

/// Forward sigmoid-alpha blend for one pixel.
pub fn sigmoid_alpha_forward(dists: &[f32], valid: &[bool], sigma: f32) -> f32 {
    let probs = coverage_probs(dists, valid, sigma);
    1.0 - probs.iter().fold(1.0f32, |acc, p| acc * (1.0 - p))
}

/// Backward sigmoid-alpha blend: dL/d(dists) for one pixel.
pub fn sigmoid_alpha_backward(dists: &[f32], valid: &[bool], sigma: f32, d_alpha: f32) -> Vec<f32> {
    let probs = coverage_probs(dists, valid, sigma);
    let excl = exclusive_products(&probs);
    probs
        .iter()
        .zip(excl)
        .zip(valid)
        .map(|((&p, ex), &ok)| {
            if ok {
                d_alpha * ex * d_prob_d_dist(p, sigma)
            } else {
                0.0
            }
        })
        .collect()
}

/// Inputs of the softmax blend shared by forward and backward.
#[derive(Clone, Copy, Debug)]
pub struct SoftmaxParams {
    pub sigma: f32,
    pub gamma: f32,
    pub znear: f32,
    pub zfar: f32,
    pub background: Vector3<f32>,
}

#[derive(Clone, Debug)]
pub struct SoftmaxForward {
    pub rgb: Vector3<f32>,
    pub alpha: f32,
}

#[derive(Clone, Debug)]
pub struct SoftmaxGrads {
    pub d_colors: Vec<Vector3<f32>>,
    pub d_dists: Vec<f32>,
    pub d_zbuf: Vec<f32>,
}

struct SoftmaxState {
    probs: Vec<f32>,
    /// exp((zi_k - m) / gamma), zero for invalid slots
    z_weights: Vec<f32>,
    weights: Vec<f32>,
    denom: f32,
    rgb: Vector3<f32>,
}

fn softmax_state(
    colors: &[Vector3<f32>],
    dists: &[f32],
    zbuf: &[f32],
    valid: &[bool],
    params: &SoftmaxParams,
) -> SoftmaxState {
    let probs = coverage_probs(dists, valid, params.sigma);
    let z_range = params.zfar - params.znear;
    let z_inv: Vec<f32> = zbuf
        .iter()
        .zip(valid)
        .map(|(&z, &ok)| if ok { (params.zfar - z) / z_range } else { 0.0 })
        .collect();
    let m = z_inv.iter().copied().fold(EPS, f32::max);

    let z_weights: Vec<f32> = z_inv
        .iter()
        .zip(valid)
        .map(|(&zi, &ok)| if ok { ((zi - m) / params.gamma).exp() } else { 0.0 })
        .collect();
    let weights: Vec<f32> = probs.iter().zip(&z_weights).map(|(p, e)| p * e).collect();
    let delta = ((EPS - m) / params.gamma).exp().max(EPS);
    let denom = weights.iter().sum::<f32>() + delta;

    let mut num = params.background * delta;
    for (w, c) in weights.iter().zip(colors) {
        num += c * *w;
    }

    SoftmaxState {
        probs,
        z_weights,
        weights,
        denom,
        rgb: num / denom,
    }
}

/// Forward softmax blend for one pixel.
pub fn softmax_forward(
    colors: &[Vector3<f32>],
    dists: &[f32],
    zbuf: &[f32],
    valid: &[bool],
    params: &SoftmaxParams,
) -> SoftmaxForward {
    let state = softmax_state(colors, dists, zbuf, valid, params);
    let alpha = 1.0 - state.probs.iter().fold(1.0f32, |acc, p| acc * (1.0 - p));
    SoftmaxForward {
        rgb: state.rgb,
        alpha,
    }
}

/// Backward softmax blend for one pixel.
pub fn softmax_backward(
    colors: &[Vector3<f32>],
    dists: &[f32],
    zbuf: &[f32],
    valid: &[bool],
    params: &SoftmaxParams,
    d_rgb: &Vector3<f32>,
    d_alpha: f32,
) -> SoftmaxGrads {
    let state = softmax_state(colors, dists, zbuf, valid, params);
    let excl = exclusive_products(&state.probs);
    let z_range = params.zfar - params.znear;
    let k = colors.len();

    let mut d_colors = vec![Vector3::zeros(); k];
    let mut d_dists = vec![0.0f32; k];
    let mut d_zbuf = vec![0.0f32; k];

    for i in 0..k {
        if !valid[i] {
            continue;
        }
        let w = state.weights[i];
        d_colors[i] = d_rgb * (w / state.denom);

        // rgb = N / D  =>  dL/dw_i = <d_rgb, c_i - rgb> / D
        let d_w = d_rgb.dot(&(colors[i] - state.rgb)) / state.denom;

        // w_i = p_i * e_i
        let d_p = d_w * state.z_weights[i] + d_alpha * excl[i];
        d_dists[i] = d_p * d_prob_d_dist(state.probs[i], params.sigma);

        // e_i = exp((zi_i - m) / gamma), zi_i = (zfar - z_i) / (zfar - znear)
        let d_zi = d_w * w / params.gamma;
        d_zbuf[i] = -d_zi / z_range;
    }

    SoftmaxGrads {
        d_colors,
        d_dists,
        d_zbuf,
    }
}
