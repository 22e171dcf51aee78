//! Fine rasterization: per-pixel coverage tests and K-nearest selection.
//!
//! Pixel (y, x) samples NDC point (-1 + (2x + 1) / W, 1 - (2y + 1) / H), so
//! row 0 is the top of the image and +Y is up.

use super::bins::BinAssignments;
use super::clip::RasterFace;
use super::knn::{Candidate, TopK};
use super::fragments::Fragment;
use super::settings::RasterizationSettings;
use crate::diff::raster_grad::{map_barycentric, measure_fragment};
use crate::diff::FragmentOptions;
use nalgebra::Vector2;
use rayon::prelude::*;

/// NDC sample point of pixel (y, x).
#[inline]
pub fn pixel_center_ndc(y: usize, x: usize, height: usize, width: usize) -> Vector2<f32> {
    Vector2::new(
        -1.0 + (2 * x + 1) as f32 / width as f32,
        1.0 - (2 * y + 1) as f32 / height as f32,
    )
}

pub(crate) fn fragment_options(settings: &RasterizationSettings) -> FragmentOptions {
    FragmentOptions {
        perspective_correct: settings.perspective_correct,
        clip_barycentric: settings.clip_barycentric(),
    }
}

/// Test one raster face against one pixel and build its fragment if covered.
pub fn shade_candidate(
    face: &RasterFace,
    p: &Vector2<f32>,
    blur_radius: f32,
    opts: FragmentOptions,
) -> Option<Fragment> {
    let [min_x, max_x, min_y, max_y] = face.bbox;
    if p.x < min_x || p.x > max_x || p.y < min_y || p.y > max_y {
        return None;
    }

    let m = measure_fragment(p, &face.verts, opts)?;
    let covered = m.inside || (blur_radius > 0.0 && m.dist <= blur_radius);
    if !covered || !m.z.is_finite() {
        return None;
    }
    // Unclipped faces crossing the near plane can reach behind the camera.
    if face.straddles_near && m.z <= 0.0 {
        return None;
    }

    let bary = match face.bary_map() {
        Some(map) => map_barycentric(map, &m.bary),
        None => m.bary,
    };
    Some(Fragment {
        face: face.face as i64,
        depth: m.z,
        bary: [bary.x, bary.y, bary.z],
        dist: m.dist,
    })
}

/// Fine pass over every mesh and pixel.
///
/// Returns the per-slot candidates in (N, H, W, K) order.
#[tracing::instrument(level = "debug", skip_all)]
pub fn rasterize_fine(
    faces: &[RasterFace],
    bins: &BinAssignments,
    num_meshes: usize,
    settings: &RasterizationSettings,
) -> Vec<Candidate> {
    let (h, w) = (settings.image_height as usize, settings.image_width as usize);
    let k = settings.faces_per_pixel;
    let blur = settings.blur_radius;
    let opts = fragment_options(settings);

    let mut slots = vec![Candidate::EMPTY; num_meshes * h * w * k];
    slots
        .par_chunks_mut(w * k)
        .enumerate()
        .for_each(|(row_idx, row)| {
            let (mesh, y) = (row_idx / h, row_idx % h);
            for (x, pixel) in row.chunks_mut(k).enumerate() {
                let p = pixel_center_ndc(y, x, h, w);
                let mut topk = TopK::new(pixel);
                for &fi in bins.candidates(mesh, y, x) {
                    if let Some(fragment) = shade_candidate(&faces[fi], &p, blur, opts) {
                        topk.insert(Candidate {
                            fragment,
                            source: fi,
                        });
                    }
                }
            }
        });

    slots
}
