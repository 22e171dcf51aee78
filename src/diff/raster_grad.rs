//! Per-fragment measurement and its backward pass.
//!
//! For one (pixel, face) pair this module computes the continuous outputs the
//! rasterizer writes into a fragment slot:
//!
//!   b   = barycentric(p, v.xy)                    (screen space)
//!   b'  = perspective_correct(b, v.z)             (optional)
//!   b'' = clip_barycentric(b')                    (optional)
//!   z   = sum_i b''_i * v_i.z
//!   d   = signed_edge_distance(p, v.xy)
//!
//! All of these are algebraic in the vertex positions. The rasterizer decides
//! *whether* a fragment exists (coverage, K-nearest membership); this module
//! only measures and differentiates.

use super::barycentric_grad::{
    barycentric, barycentric_grad_verts, clip_barycentric, clip_barycentric_grad,
    perspective_correct, perspective_correct_grad,
};
use super::distance_grad::{signed_edge_distance, signed_edge_distance_grad};
use nalgebra::{Matrix3, Vector2, Vector3};

/// Which optional stages of the measurement are enabled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FragmentOptions {
    pub perspective_correct: bool,
    pub clip_barycentric: bool,
}

/// Continuous outputs for one (pixel, face) pair.
#[derive(Clone, Copy, Debug)]
pub struct FragmentMeasure {
    /// Barycentrics after perspective correction and clipping
    pub bary: Vector3<f32>,
    /// Interpolated view-space depth
    pub z: f32,
    /// Signed distance to the closest edge (negative inside), NDC units
    pub dist: f32,
    /// Whether the pixel center lies inside the triangle (all screen barycentrics >= 0)
    pub inside: bool,
}

fn xy(verts: &[Vector3<f32>; 3]) -> [Vector2<f32>; 3] {
    [verts[0].xy(), verts[1].xy(), verts[2].xy()]
}

fn depths(verts: &[Vector3<f32>; 3]) -> Vector3<f32> {
    Vector3::new(verts[0].z, verts[1].z, verts[2].z)
}

/// Index of the lexicographically smallest vertex by (x, y, z).
///
/// Faces are measured starting from this vertex (a rotation, so winding is
/// kept). Coincident faces listed in different vertex orders then produce
/// bit-identical depths and tie on face index.
fn canonical_start(verts: &[Vector3<f32>; 3]) -> usize {
    (1..3).fold(0, |best, i| {
        let (a, b) = (&verts[i], &verts[best]);
        let ord = a
            .x
            .total_cmp(&b.x)
            .then(a.y.total_cmp(&b.y))
            .then(a.z.total_cmp(&b.z));
        if ord.is_lt() {
            i
        } else {
            best
        }
    })
}

fn rotate(verts: &[Vector3<f32>; 3], r: usize) -> [Vector3<f32>; 3] {
    [verts[r], verts[(r + 1) % 3], verts[(r + 2) % 3]]
}

/// Per-vertex values in rotated order → listed order.
fn unrotate(v: &Vector3<f32>, r: usize) -> Vector3<f32> {
    let mut out = Vector3::zeros();
    for i in 0..3 {
        out[(i + r) % 3] = v[i];
    }
    out
}

/// Per-vertex values in listed order → rotated order.
fn rotate_values(v: &Vector3<f32>, r: usize) -> Vector3<f32> {
    Vector3::new(v[r], v[(r + 1) % 3], v[(r + 2) % 3])
}

/// Measure a fragment. Returns `None` if perspective correction is singular.
pub fn measure_fragment(
    p: &Vector2<f32>,
    verts: &[Vector3<f32>; 3],
    opts: FragmentOptions,
) -> Option<FragmentMeasure> {
    let r = canonical_start(verts);
    let verts = &rotate(verts, r);
    let v2 = xy(verts);
    let z = depths(verts);

    let b = barycentric(p, &v2);
    let inside = b.x >= 0.0 && b.y >= 0.0 && b.z >= 0.0;

    let b_persp = if opts.perspective_correct {
        perspective_correct(&b, &z)?
    } else {
        b
    };
    let b_out = if opts.clip_barycentric {
        clip_barycentric(&b_persp)
    } else {
        b_persp
    };

    Some(FragmentMeasure {
        bary: unrotate(&b_out, r),
        z: b_out.dot(&z),
        dist: signed_edge_distance(p, &v2, inside),
        inside,
    })
}

/// Backward of `measure_fragment` w.r.t. the three screen-space vertices.
///
/// Upstream gradients are w.r.t. the fragment's depth, barycentrics and signed
/// distance; the result holds d(x, y, z) for each vertex.
pub fn measure_fragment_grad(
    p: &Vector2<f32>,
    verts: &[Vector3<f32>; 3],
    opts: FragmentOptions,
    d_z: f32,
    d_bary: &Vector3<f32>,
    d_dist: f32,
) -> [Vector3<f32>; 3] {
    let r = canonical_start(verts);
    let verts = &rotate(verts, r);
    let d_bary = &rotate_values(d_bary, r);
    let v2 = xy(verts);
    let z = depths(verts);

    // Recompute forward intermediates.
    let b = barycentric(p, &v2);
    let inside = b.x >= 0.0 && b.y >= 0.0 && b.z >= 0.0;
    let b_persp = if opts.perspective_correct {
        perspective_correct(&b, &z).unwrap_or(b)
    } else {
        b
    };
    let b_out = if opts.clip_barycentric {
        clip_barycentric(&b_persp)
    } else {
        b_persp
    };

    // z_pix = <b_out, z>
    let mut d_vz = b_out * d_z;
    let d_b_out = d_bary + z * d_z;

    let d_b_persp = if opts.clip_barycentric {
        clip_barycentric_grad(&b_persp, &d_b_out)
    } else {
        d_b_out
    };

    let d_b = if opts.perspective_correct {
        let (d_b, d_z_persp) = perspective_correct_grad(&b, &z, &d_b_persp);
        d_vz += d_z_persp;
        d_b
    } else {
        d_b_persp
    };

    let d_xy_bary = barycentric_grad_verts(p, &v2, &d_b);
    let d_xy_dist = signed_edge_distance_grad(p, &v2, inside, d_dist);

    let mut out = [Vector3::zeros(); 3];
    for i in 0..3 {
        let d_xy = d_xy_bary[i] + d_xy_dist[i];
        out[(i + r) % 3] = Vector3::new(d_xy.x, d_xy.y, d_vz[i]);
    }
    out
}

/// Re-express barycentrics of a clipped sub-triangle in its source face.
///
/// Row `i` of `map` holds the source-face barycentrics of sub-vertex `i`, so
/// source = mapᵀ · sub.
#[inline]
pub fn map_barycentric(map: &Matrix3<f32>, sub: &Vector3<f32>) -> Vector3<f32> {
    map.transpose() * sub
}

/// Backward of `map_barycentric` w.r.t. the sub-triangle barycentrics.
#[inline]
pub fn map_barycentric_grad(map: &Matrix3<f32>, d_source: &Vector3<f32>) -> Vector3<f32> {
    map * d_source
}
