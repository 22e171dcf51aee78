//! Signed distance from a pixel to a triangle's boundary, and its gradients.
//!
//! Forward:
//!   d_e  = min_t |p - (a + t (b - a))|,  t ∈ [0, 1]    (per edge)
//!   dist = min(d_01, d_12, d_20), negated when p is inside the triangle
//!
//! The closest-edge choice and the inside sign are selections (no gradient);
//! the distance to the selected edge is the measured, differentiable quantity.
//! At the minimizing `t` the derivative of the squared distance w.r.t. `t` is
//! zero (or `t` is clamped), so `t` can be held fixed in the backward pass.

use nalgebra::Vector2;

const SEG_EPS: f32 = 1e-12;

/// Closest-point parameter of `p` on segment `ab`, clamped to [0, 1].
#[inline]
fn closest_t(p: &Vector2<f32>, a: &Vector2<f32>, b: &Vector2<f32>) -> f32 {
    let v = b - a;
    let l2 = v.norm_squared();
    if l2 <= SEG_EPS {
        return 0.0;
    }
    ((p - a).dot(&v) / l2).clamp(0.0, 1.0)
}

/// Squared distance from `p` to segment `ab`.
pub fn point_segment_dist_sq(p: &Vector2<f32>, a: &Vector2<f32>, b: &Vector2<f32>) -> f32 {
    let t = closest_t(p, a, b);
    (p - (a + (b - a) * t)).norm_squared()
}

/// Euclidean distance from `p` to segment `ab`.
pub fn point_segment_dist(p: &Vector2<f32>, a: &Vector2<f32>, b: &Vector2<f32>) -> f32 {
    point_segment_dist_sq(p, a, b).sqrt()
}

/// Gradient of `point_segment_dist` w.r.t. (a, b) given upstream `g`.
///
/// Zero when the point lies on the segment, where the distance has a kink.
pub fn point_segment_dist_grad(
    p: &Vector2<f32>,
    a: &Vector2<f32>,
    b: &Vector2<f32>,
    g: f32,
) -> (Vector2<f32>, Vector2<f32>) {
    let t = closest_t(p, a, b);
    let diff = p - (a + (b - a) * t);
    let d = diff.norm();
    if d <= 1e-12 {
        return (Vector2::zeros(), Vector2::zeros());
    }
    // d/dq of |p - q| is -(p - q)/|p - q|, and q = (1 - t) a + t b.
    let d_q = -diff / d * g;
    (d_q * (1.0 - t), d_q * t)
}

/// Which edge a distance was measured to: edge `i` joins v[i] and v[(i + 1) % 3].
pub fn closest_edge(p: &Vector2<f32>, v: &[Vector2<f32>; 3]) -> (usize, f32) {
    let mut best = (0, f32::INFINITY);
    for e in 0..3 {
        let d = point_segment_dist(p, &v[e], &v[(e + 1) % 3]);
        if d < best.1 {
            best = (e, d);
        }
    }
    best
}

/// Signed distance from `p` to the triangle boundary (negative inside).
pub fn signed_edge_distance(p: &Vector2<f32>, v: &[Vector2<f32>; 3], inside: bool) -> f32 {
    let (_, d) = closest_edge(p, v);
    if inside {
        -d
    } else {
        d
    }
}

/// Backward of `signed_edge_distance` w.r.t. the three vertices.
pub fn signed_edge_distance_grad(
    p: &Vector2<f32>,
    v: &[Vector2<f32>; 3],
    inside: bool,
    d_dist: f32,
) -> [Vector2<f32>; 3] {
    let mut d_v = [Vector2::zeros(); 3];
    if d_dist == 0.0 {
        return d_v;
    }
    let (e, _) = closest_edge(p, v);
    let g = if inside { -d_dist } else { d_dist };
    let (da, db) = point_segment_dist_grad(p, &v[e], &v[(e + 1) % 3], g);
    d_v[e] += da;
    d_v[(e + 1) % 3] += db;
    d_v
}
