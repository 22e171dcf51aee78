//! Coarse rasterization: assign raster faces to square screen bins.
//!
//! The fine pass then only tests the faces of the bin a pixel belongs to.
//! With `bin_size == 0` every mesh gets a single bin spanning the whole image
//! (naive rasterization) and no per-bin limit applies.

use super::clip::RasterFace;
use super::settings::RasterizationSettings;
use crate::error::{RasterError, Result};
use rayon::prelude::*;

/// Per (mesh, bin) candidate lists of raster face indices, ascending.
#[derive(Clone, Debug, PartialEq)]
pub struct BinAssignments {
    pub bin_size: u32,
    pub bins_y: usize,
    pub bins_x: usize,
    pub num_meshes: usize,
    bins: Vec<Vec<usize>>,
}

/// NDC x of the left edge of pixel column `col` (also the right edge of `col - 1`).
#[inline]
pub(crate) fn ndc_x_edge(col: usize, width: usize) -> f32 {
    -1.0 + 2.0 * col as f32 / width as f32
}

/// NDC y of the top edge of pixel row `row`. Row 0 is the top (y = +1).
#[inline]
pub(crate) fn ndc_y_edge(row: usize, height: usize) -> f32 {
    1.0 - 2.0 * row as f32 / height as f32
}

impl BinAssignments {
    /// Bin `(mesh, bin_y, bin_x)` candidates.
    pub fn bin(&self, mesh: usize, bin_y: usize, bin_x: usize) -> &[usize] {
        &self.bins[(mesh * self.bins_y + bin_y) * self.bins_x + bin_x]
    }

    /// Candidates for pixel (y, x) of `mesh`.
    #[inline]
    pub fn candidates(&self, mesh: usize, y: usize, x: usize) -> &[usize] {
        if self.bin_size == 0 {
            return self.bin(mesh, 0, 0);
        }
        let bs = self.bin_size as usize;
        self.bin(mesh, y / bs, x / bs)
    }

    /// Largest candidate count over all bins.
    pub fn max_occupancy(&self) -> usize {
        self.bins.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Largest raster face index referenced by any bin.
    pub fn max_index(&self) -> Option<usize> {
        self.bins.iter().filter_map(|b| b.last().copied()).max()
    }

    /// Whether these assignments can drive a fine pass with the given shape.
    pub fn matches(&self, settings: &RasterizationSettings, num_meshes: usize) -> bool {
        let (by, bx) = grid_shape(settings, self.bin_size);
        self.num_meshes == num_meshes && self.bins_y == by && self.bins_x == bx
    }
}

fn grid_shape(settings: &RasterizationSettings, bin_size: u32) -> (usize, usize) {
    if bin_size == 0 {
        return (1, 1);
    }
    let bs = bin_size as usize;
    (
        (settings.image_height as usize).div_ceil(bs),
        (settings.image_width as usize).div_ceil(bs),
    )
}

/// Raster face indices of each mesh, ascending.
fn faces_by_mesh(faces: &[RasterFace], num_meshes: usize) -> Vec<Vec<usize>> {
    let mut by_mesh = vec![Vec::new(); num_meshes];
    for (i, f) in faces.iter().enumerate() {
        by_mesh[f.mesh].push(i);
    }
    by_mesh
}

/// Coarse pass.
#[tracing::instrument(level = "debug", skip_all, fields(faces = faces.len()))]
pub fn bin_faces(
    faces: &[RasterFace],
    num_meshes: usize,
    num_packed_faces: usize,
    settings: &RasterizationSettings,
) -> Result<BinAssignments> {
    let bin_size = settings.resolved_bin_size();
    let by_mesh = faces_by_mesh(faces, num_meshes);

    if bin_size == 0 {
        tracing::debug!("naive rasterization, no binning");
        return Ok(BinAssignments {
            bin_size,
            bins_y: 1,
            bins_x: 1,
            num_meshes,
            bins: by_mesh,
        });
    }

    let (bins_y, bins_x) = grid_shape(settings, bin_size);
    let (h, w) = (settings.image_height as usize, settings.image_width as usize);
    let bs = bin_size as usize;
    let max_faces = settings.resolved_max_faces_per_bin(num_packed_faces);

    let rows: Vec<Vec<Vec<usize>>> = (0..num_meshes * bins_y)
        .into_par_iter()
        .map(|task| {
            let (mesh, bin_y) = (task / bins_y, task % bins_y);
            let y_top = ndc_y_edge(bin_y * bs, h);
            let y_bottom = ndc_y_edge(((bin_y + 1) * bs).min(h), h);

            (0..bins_x)
                .map(|bin_x| {
                    let x_left = ndc_x_edge(bin_x * bs, w);
                    let x_right = ndc_x_edge(((bin_x + 1) * bs).min(w), w);

                    let bin: Vec<usize> = by_mesh[mesh]
                        .iter()
                        .copied()
                        .filter(|&i| {
                            let [min_x, max_x, min_y, max_y] = faces[i].bbox;
                            max_x >= x_left && min_x <= x_right && max_y >= y_bottom && min_y <= y_top
                        })
                        .collect();

                    if bin.len() > max_faces {
                        return Err(RasterError::BinOverflow {
                            mesh,
                            bin_x,
                            bin_y,
                            count: bin.len(),
                            max: max_faces,
                        });
                    }
                    Ok(bin)
                })
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    let assignments = BinAssignments {
        bin_size,
        bins_y,
        bins_x,
        num_meshes,
        bins: rows.into_iter().flatten().collect(),
    };
    tracing::debug!(
        bin_size,
        bins_y,
        bins_x,
        max_occupancy = assignments.max_occupancy(),
        "coarse pass done"
    );
    Ok(assignments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::clip::FaceSource;
    use nalgebra::Vector3;

    fn tri(face: usize, cx: f32, cy: f32, r: f32) -> RasterFace {
        RasterFace {
            verts: [
                Vector3::new(cx - r, cy - r, 1.0),
                Vector3::new(cx + r, cy - r, 1.0),
                Vector3::new(cx, cy + r, 1.0),
            ],
            face,
            mesh: 0,
            source: FaceSource::Direct,
            straddles_near: false,
            bbox: [cx - r, cx + r, cy - r, cy + r],
        }
    }

    #[test]
    fn test_small_face_lands_in_one_bin() {
        let mut s = RasterizationSettings::square(64);
        s.bin_size = Some(16);
        // Center of the top-left bin: pixel (8, 8) -> NDC (-0.75, 0.75)
        let faces = vec![tri(0, -0.75, 0.75, 0.05)];
        let bins = bin_faces(&faces, 1, 1, &s).unwrap();
        assert_eq!((bins.bins_y, bins.bins_x), (4, 4));
        assert_eq!(bins.bin(0, 0, 0), &[0]);
        assert_eq!(bins.candidates(0, 8, 8), &[0]);
        assert!(bins.bin(0, 3, 3).is_empty());
        assert!(bins.bin(0, 1, 0).is_empty());
    }

    #[test]
    fn test_overflow_is_an_error() {
        let mut s = RasterizationSettings::square(32);
        s.bin_size = Some(16);
        s.max_faces_per_bin = Some(2);
        let faces: Vec<_> = (0..3).map(|i| tri(i, 0.0, 0.0, 0.5)).collect();
        let err = bin_faces(&faces, 1, 3, &s).unwrap_err();
        assert!(matches!(err, RasterError::BinOverflow { count: 3, max: 2, .. }));
    }

    #[test]
    fn test_naive_single_bin_ignores_limit() {
        let mut s = RasterizationSettings::square(32);
        s.bin_size = Some(0);
        s.max_faces_per_bin = Some(1);
        let faces: Vec<_> = (0..3).map(|i| tri(i, 0.0, 0.0, 0.5)).collect();
        let bins = bin_faces(&faces, 1, 3, &s).unwrap();
        assert_eq!(bins.candidates(0, 31, 0), &[0, 1, 2]);
    }
}
