//! Face culling and near-plane clipping.
//!
//! Turns packed faces into the list of triangles the rasterizer actually
//! visits. Faces are dropped when they:
//! - touch a non-finite vertex
//! - lie entirely in front of the near plane or beyond the far plane
//! - fall entirely outside the NDC square (expanded by the blur radius)
//! - have (near) zero screen area
//! - face away from the camera (clockwise on screen) and backface culling is enabled
//!
//! Faces straddling the near plane follow `NearClipPolicy`. Clipped pieces keep
//! their source face index and a barycentric map back to the source face, so
//! fragments always describe packed faces.

use super::settings::{NearClipPolicy, RasterizationSettings};
use super::transform::{camera_index, ScreenVerts};
use crate::core::{Camera, MeshBatch};
use crate::diff::barycentric_grad::{signed_area, AREA_EPS};
use nalgebra::{Matrix3, Vector2, Vector3};
use rayon::prelude::*;

/// Where a raster face's vertices come from.
#[derive(Clone, Debug)]
pub enum FaceSource {
    /// The packed face itself; vertices are its three packed vertices.
    Direct,
    /// A piece of the packed face clipped at the near plane.
    Clipped {
        /// View-space positions of the piece's vertices
        view: [Vector3<f32>; 3],
        /// Row i: source-face barycentrics of piece vertex i
        map: Matrix3<f32>,
    },
}

/// A triangle ready for binning and the fine pass.
#[derive(Clone, Debug)]
pub struct RasterFace {
    /// Screen-space vertices (x_ndc, y_ndc, z_view)
    pub verts: [Vector3<f32>; 3],
    /// Packed index of the source face
    pub face: usize,
    pub mesh: usize,
    pub source: FaceSource,
    /// Passed through unclipped although it crosses the near plane
    pub straddles_near: bool,
    /// Screen bounding box (min_x, max_x, min_y, max_y) expanded by the blur radius
    pub bbox: [f32; 4],
}

impl RasterFace {
    fn new(
        verts: [Vector3<f32>; 3],
        face: usize,
        mesh: usize,
        source: FaceSource,
        straddles_near: bool,
        blur_radius: f32,
    ) -> Self {
        let min_x = verts[0].x.min(verts[1].x).min(verts[2].x) - blur_radius;
        let max_x = verts[0].x.max(verts[1].x).max(verts[2].x) + blur_radius;
        let min_y = verts[0].y.min(verts[1].y).min(verts[2].y) - blur_radius;
        let max_y = verts[0].y.max(verts[1].y).max(verts[2].y) + blur_radius;
        Self {
            verts,
            face,
            mesh,
            source,
            straddles_near,
            bbox: [min_x, max_x, min_y, max_y],
        }
    }

    pub fn xy(&self) -> [Vector2<f32>; 3] {
        [self.verts[0].xy(), self.verts[1].xy(), self.verts[2].xy()]
    }

    /// Barycentric map to the source face (identity for direct faces).
    pub fn bary_map(&self) -> Option<&Matrix3<f32>> {
        match &self.source {
            FaceSource::Direct => None,
            FaceSource::Clipped { map, .. } => Some(map),
        }
    }
}

/// Counts of faces removed or split, for logging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClipStats {
    pub non_finite: usize,
    pub behind_or_beyond: usize,
    pub outside_view: usize,
    pub degenerate: usize,
    pub backfacing: usize,
    pub near_dropped: usize,
    pub clipped: usize,
    pub passed_through: usize,
}

enum Outcome {
    Keep(Vec<RasterFace>),
    NonFinite,
    BehindOrBeyond,
    NearDropped,
}

/// Clip a view-space triangle against z >= znear (Sutherland–Hodgman).
///
/// Returns the resulting polygon (3 or 4 vertices, or empty) with the
/// source-face barycentrics of each vertex; input winding is preserved.
pub fn clip_near(view: &[Vector3<f32>; 3], znear: f32) -> Vec<(Vector3<f32>, Vector3<f32>)> {
    let bary = [Vector3::x(), Vector3::y(), Vector3::z()];
    let mut out = Vec::with_capacity(4);
    for i in 0..3 {
        let j = (i + 1) % 3;
        let (a, b) = (view[i], view[j]);
        let a_in = a.z >= znear;
        let b_in = b.z >= znear;
        if a_in {
            out.push((a, bary[i]));
        }
        if a_in != b_in {
            let t = (znear - a.z) / (b.z - a.z);
            let mut p = a + (b - a) * t;
            p.z = znear;
            out.push((p, bary[i] + (bary[j] - bary[i]) * t));
        }
    }
    out
}

fn face_outcome(
    face_idx: usize,
    mesh_idx: usize,
    ids: &[usize; 3],
    sv: &ScreenVerts,
    camera: &Camera,
    settings: &RasterizationSettings,
) -> Outcome {
    let view = [sv.view[ids[0]], sv.view[ids[1]], sv.view[ids[2]]];
    let screen = [sv.screen[ids[0]], sv.screen[ids[1]], sv.screen[ids[2]]];
    let blur = settings.blur_radius;

    let all_finite = view
        .iter()
        .chain(screen.iter())
        .all(|v| v.iter().all(|c| c.is_finite()));
    // View depth alone decides near/far; screen x/y may be non-finite at z = 0.
    if !view.iter().all(|v| v.iter().all(|c| c.is_finite())) {
        return Outcome::NonFinite;
    }

    let n_behind = view.iter().filter(|v| v.z < camera.znear).count();
    if n_behind == 3 || view.iter().all(|v| v.z > camera.zfar) {
        return Outcome::BehindOrBeyond;
    }

    if n_behind == 0 {
        if !all_finite {
            return Outcome::NonFinite;
        }
        return Outcome::Keep(vec![RasterFace::new(
            screen,
            face_idx,
            mesh_idx,
            FaceSource::Direct,
            false,
            blur,
        )]);
    }

    match settings.near_clip {
        NearClipPolicy::Drop => Outcome::NearDropped,
        NearClipPolicy::PassThrough => {
            if !all_finite {
                return Outcome::NonFinite;
            }
            Outcome::Keep(vec![RasterFace::new(
                screen,
                face_idx,
                mesh_idx,
                FaceSource::Direct,
                true,
                blur,
            )])
        }
        NearClipPolicy::Clip => {
            let poly = clip_near(&view, camera.znear);
            let pieces = (1..poly.len().saturating_sub(1))
                .map(|i| {
                    let corners = [poly[0], poly[i], poly[i + 1]];
                    let view_piece = [corners[0].0, corners[1].0, corners[2].0];
                    let map = Matrix3::from_rows(&[
                        corners[0].1.transpose(),
                        corners[1].1.transpose(),
                        corners[2].1.transpose(),
                    ]);
                    RasterFace::new(
                        [
                            camera.view_to_screen(&view_piece[0]),
                            camera.view_to_screen(&view_piece[1]),
                            camera.view_to_screen(&view_piece[2]),
                        ],
                        face_idx,
                        mesh_idx,
                        FaceSource::Clipped {
                            view: view_piece,
                            map,
                        },
                        false,
                        blur,
                    )
                })
                .collect();
            Outcome::Keep(pieces)
        }
    }
}

/// Cull and clip all faces of the batch.
pub fn cull_and_clip(
    batch: &MeshBatch,
    sv: &ScreenVerts,
    cameras: &[Camera],
    settings: &RasterizationSettings,
) -> (Vec<RasterFace>, ClipStats) {
    let outcomes: Vec<Outcome> = batch
        .ranges()
        .iter()
        .enumerate()
        .flat_map(|(mi, range)| range.faces().map(move |fi| (mi, fi)))
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|(mi, fi)| {
            let camera = &cameras[camera_index(cameras.len(), mi)];
            face_outcome(fi, mi, &batch.faces()[fi], sv, camera, settings)
        })
        .collect();

    let mut stats = ClipStats::default();
    let mut faces = Vec::with_capacity(batch.num_faces());
    for outcome in outcomes {
        match outcome {
            Outcome::NonFinite => stats.non_finite += 1,
            Outcome::BehindOrBeyond => stats.behind_or_beyond += 1,
            Outcome::NearDropped => stats.near_dropped += 1,
            Outcome::Keep(pieces) => {
                for piece in pieces {
                    if matches!(piece.source, FaceSource::Clipped { .. }) {
                        stats.clipped += 1;
                    }
                    if piece.straddles_near {
                        stats.passed_through += 1;
                    }
                    let [min_x, max_x, min_y, max_y] = piece.bbox;
                    if max_x < -1.0 || min_x > 1.0 || max_y < -1.0 || min_y > 1.0 {
                        stats.outside_view += 1;
                        continue;
                    }
                    let area = signed_area(&piece.xy());
                    if !(area.abs() > AREA_EPS) {
                        stats.degenerate += 1;
                        continue;
                    }
                    if settings.cull_backfaces && area > 0.0 {
                        stats.backfacing += 1;
                        continue;
                    }
                    faces.push(piece);
                }
            }
        }
    }

    if stats.non_finite > 0 {
        tracing::warn!(count = stats.non_finite, "dropped faces with non-finite vertices");
    }
    tracing::debug!(kept = faces.len(), ?stats, "cull_and_clip");
    (faces, stats)
}
