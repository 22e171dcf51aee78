//! Barycentric coordinates and their gradients.
//!
//! Forward (2D, screen space):
//!   E(p, a, b) = (p.x - a.x) * (b.y - a.y) - (p.y - a.y) * (b.x - a.x)
//!   A  = E(v2, v0, v1)
//!   w0 = E(p, v1, v2) / A
//!   w1 = E(p, v2, v0) / A
//!   w2 = E(p, v0, v1) / A
//!
//! The weights sum to one for either winding, are linear in `p` and rational in
//! the vertices, so they are differentiable wherever `A != 0`. Degenerate faces
//! are culled before they get here.
//!
//! Also provided: perspective correction (reweighting by 1/z) and clipping of
//! barycentrics to the triangle, each with its backward pass.

use nalgebra::{Vector2, Vector3};

/// Faces whose |signed area| in NDC² falls below this are treated as degenerate.
pub const AREA_EPS: f32 = 1e-8;

/// 2D edge function (twice the signed area of triangle (a, b, p)).
#[inline]
pub fn edge_function(p: &Vector2<f32>, a: &Vector2<f32>, b: &Vector2<f32>) -> f32 {
    (p.x - a.x) * (b.y - a.y) - (p.y - a.y) * (b.x - a.x)
}

/// Gradient of `edge_function` w.r.t. (p, a, b) scaled by upstream `g`.
#[inline]
pub fn edge_function_grad(
    p: &Vector2<f32>,
    a: &Vector2<f32>,
    b: &Vector2<f32>,
    g: f32,
) -> (Vector2<f32>, Vector2<f32>, Vector2<f32>) {
    let d_p = Vector2::new(b.y - a.y, -(b.x - a.x)) * g;
    let d_a = Vector2::new(p.y - b.y, b.x - p.x) * g;
    let d_b = Vector2::new(-(p.y - a.y), p.x - a.x) * g;
    (d_p, d_a, d_b)
}

/// Signed double area of the triangle (negative when counter-clockwise in NDC).
#[inline]
pub fn signed_area(v: &[Vector2<f32>; 3]) -> f32 {
    edge_function(&v[2], &v[0], &v[1])
}

/// Screen-space barycentric coordinates of `p`.
///
/// Assumes the triangle is not degenerate.
pub fn barycentric(p: &Vector2<f32>, v: &[Vector2<f32>; 3]) -> Vector3<f32> {
    let area = signed_area(v);
    Vector3::new(
        edge_function(p, &v[1], &v[2]) / area,
        edge_function(p, &v[2], &v[0]) / area,
        edge_function(p, &v[0], &v[1]) / area,
    )
}

/// Gradient of `barycentric` w.r.t. the three vertices, given upstream `d_bary`.
pub fn barycentric_grad_verts(
    p: &Vector2<f32>,
    v: &[Vector2<f32>; 3],
    d_bary: &Vector3<f32>,
) -> [Vector2<f32>; 3] {
    let area = signed_area(v);
    let inv_area = 1.0 / area;
    let bary = barycentric(p, v);

    // w_i = E_i / A
    // dL/dE_i = d_w_i / A
    // dL/dA   = -sum_i d_w_i * w_i / A
    let d_area = -d_bary.dot(&bary) * inv_area;

    let mut d_v = [Vector2::zeros(); 3];

    // E0 = E(p, v1, v2)
    let (_, da, db) = edge_function_grad(p, &v[1], &v[2], d_bary.x * inv_area);
    d_v[1] += da;
    d_v[2] += db;

    // E1 = E(p, v2, v0)
    let (_, da, db) = edge_function_grad(p, &v[2], &v[0], d_bary.y * inv_area);
    d_v[2] += da;
    d_v[0] += db;

    // E2 = E(p, v0, v1)
    let (_, da, db) = edge_function_grad(p, &v[0], &v[1], d_bary.z * inv_area);
    d_v[0] += da;
    d_v[1] += db;

    // A = E(v2, v0, v1)
    let (dp, da, db) = edge_function_grad(&v[2], &v[0], &v[1], d_area);
    d_v[2] += dp;
    d_v[0] += da;
    d_v[1] += db;

    d_v
}

/// Perspective-correct barycentrics: b'_i = (b_i / z_i) / sum_j (b_j / z_j).
///
/// Evaluated in the multiplied-through form b_i * z_j * z_k so that no single
/// depth is divided by. Returns `None` when the denominator vanishes.
pub fn perspective_correct(bary: &Vector3<f32>, z: &Vector3<f32>) -> Option<Vector3<f32>> {
    let top = Vector3::new(
        bary.x * z.y * z.z,
        z.x * bary.y * z.z,
        z.x * z.y * bary.z,
    );
    let denom = top.x + top.y + top.z;
    if denom.abs() < AREA_EPS || !denom.is_finite() {
        return None;
    }
    Some(top / denom)
}

/// Backward of `perspective_correct`: returns (d_bary, d_z).
pub fn perspective_correct_grad(
    bary: &Vector3<f32>,
    z: &Vector3<f32>,
    d_out: &Vector3<f32>,
) -> (Vector3<f32>, Vector3<f32>) {
    let top = Vector3::new(
        bary.x * z.y * z.z,
        z.x * bary.y * z.z,
        z.x * z.y * bary.z,
    );
    let denom = top.x + top.y + top.z;
    if denom.abs() < AREA_EPS || !denom.is_finite() {
        return (*d_out, Vector3::zeros());
    }
    let out = top / denom;

    // out_i = top_i / D  =>  dL/dtop_i = (d_out_i - <d_out, out>) / D
    let d_top = (d_out - Vector3::repeat(d_out.dot(&out))) / denom;

    let d_bary = Vector3::new(d_top.x * z.y * z.z, d_top.y * z.x * z.z, d_top.z * z.x * z.y);
    let d_z = Vector3::new(
        d_top.y * bary.y * z.z + d_top.z * z.y * bary.z,
        d_top.x * bary.x * z.z + d_top.z * z.x * bary.z,
        d_top.x * bary.x * z.y + d_top.y * z.x * bary.y,
    );
    (d_bary, d_z)
}

/// Clamp barycentrics to be non-negative and renormalize them to sum to one.
///
/// Used when a blurred face matches a pixel outside the triangle.
pub fn clip_barycentric(bary: &Vector3<f32>) -> Vector3<f32> {
    let c = bary.map(|b| b.max(0.0));
    let s = c.x + c.y + c.z;
    if s <= AREA_EPS {
        return c;
    }
    c / s
}

/// Backward of `clip_barycentric`.
pub fn clip_barycentric_grad(bary: &Vector3<f32>, d_out: &Vector3<f32>) -> Vector3<f32> {
    let c = bary.map(|b| b.max(0.0));
    let s = c.x + c.y + c.z;
    let d_c = if s <= AREA_EPS {
        *d_out
    } else {
        let out = c / s;
        (d_out - Vector3::repeat(d_out.dot(&out))) / s
    };
    Vector3::new(
        if bary.x > 0.0 { d_c.x } else { 0.0 },
        if bary.y > 0.0 { d_c.y } else { 0.0 },
        if bary.z > 0.0 { d_c.z } else { 0.0 },
    )
}
