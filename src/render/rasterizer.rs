//! The mesh rasterizer: forward pass to K-nearest fragments and its backward pass.
//!
//! Forward: transform → cull/clip → coarse (bins) → fine (K-nearest per pixel).
//! Backward: upstream fragment gradients → screen vertices → view vertices →
//! world vertices and camera parameters.

use super::bins::{bin_faces, BinAssignments};
use super::clip::{cull_and_clip, ClipStats, FaceSource, RasterFace};
use super::fragments::{FragmentGrads, Fragments};
use super::raster::{fragment_options, pixel_center_ndc, rasterize_fine};
use super::settings::RasterizationSettings;
use super::transform::{camera_index, transform_batch, validate_cameras, ScreenVerts};
use crate::core::{Camera, MeshBatch};
use crate::diff::project_grad::{view_to_screen_grad, world_to_view_grad};
use crate::diff::raster_grad::{map_barycentric_grad, measure_fragment_grad};
use crate::diff::{CameraGrads, ProjectionGrad};
use crate::error::{RasterError, Result};
use nalgebra::Vector3;
use rayon::prelude::*;
use std::time::Instant;

/// Everything the backward pass needs from a forward call.
#[derive(Clone, Debug)]
pub struct RasterContext {
    /// The batch that was rasterized
    pub batch: MeshBatch,
    pub screen: ScreenVerts,
    /// Triangles after culling and clipping
    pub faces: Vec<RasterFace>,
    pub stats: ClipStats,
    /// Raster face behind every fragment slot, `usize::MAX` when empty
    slot_sources: Vec<usize>,
}

impl RasterContext {
    /// Raster face that produced slot `i` of the fragment buffers.
    pub fn slot_source(&self, i: usize) -> Option<&RasterFace> {
        self.slot_sources.get(i).and_then(|&s| self.faces.get(s))
    }
}

#[derive(Clone, Debug)]
pub struct RasterOutput {
    pub fragments: Fragments,
    pub context: RasterContext,
}

/// Gradients w.r.t. the packed world-space vertices and every camera.
#[derive(Clone, Debug)]
pub struct MeshGrads {
    pub d_verts: Vec<Vector3<f32>>,
    pub d_cameras: Vec<CameraGrads>,
}

/// Rasterizes a mesh batch with one shared camera or one camera per mesh.
#[derive(Clone, Debug)]
pub struct MeshRasterizer {
    pub cameras: Vec<Camera>,
    pub settings: RasterizationSettings,
}

struct LocalGrads {
    d_view: Vec<Vector3<f32>>,
    d_projection: Vec<ProjectionGrad>,
}

impl LocalGrads {
    fn new(num_verts: usize, cameras: &[Camera]) -> Self {
        Self {
            d_view: vec![Vector3::zeros(); num_verts],
            d_projection: cameras
                .iter()
                .map(|c| ProjectionGrad::zeros_like(&c.projection))
                .collect(),
        }
    }

    fn merge(mut self, other: Self) -> Self {
        for (a, b) in self.d_view.iter_mut().zip(other.d_view) {
            *a += b;
        }
        for (a, b) in self.d_projection.iter_mut().zip(other.d_projection) {
            *a += b;
        }
        self
    }
}

impl MeshRasterizer {
    pub fn new(cameras: Vec<Camera>, settings: RasterizationSettings) -> Self {
        Self { cameras, settings }
    }

    /// One camera shared by every mesh.
    pub fn with_camera(camera: Camera, settings: RasterizationSettings) -> Self {
        Self::new(vec![camera], settings)
    }

    fn prepare(&self, batch: &MeshBatch) -> Result<RasterContext> {
        self.settings.validate()?;
        validate_cameras(&self.cameras, batch.len())?;
        batch.validate()?;

        let screen = transform_batch(batch, &self.cameras)?;
        let (faces, stats) = cull_and_clip(batch, &screen, &self.cameras, &self.settings);
        Ok(RasterContext {
            batch: batch.clone(),
            screen,
            faces,
            stats,
            slot_sources: Vec::new(),
        })
    }

    /// Coarse pass only; the result can be fed to `rasterize_with_bins`.
    pub fn compute_bins(&self, batch: &MeshBatch) -> Result<BinAssignments> {
        let ctx = self.prepare(batch)?;
        bin_faces(&ctx.faces, batch.len(), batch.num_faces(), &self.settings)
    }

    /// Rasterize every mesh of the batch to its K nearest fragments per pixel.
    #[tracing::instrument(level = "debug", skip_all, fields(meshes = batch.len(), faces = batch.num_faces()))]
    pub fn rasterize(&self, batch: &MeshBatch) -> Result<RasterOutput> {
        let start = Instant::now();
        let ctx = self.prepare(batch)?;
        let bins = bin_faces(&ctx.faces, batch.len(), batch.num_faces(), &self.settings)?;
        let out = self.fine(ctx, &bins);
        tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, "rasterize done");
        Ok(out)
    }

    /// Rasterize with bins from an earlier `compute_bins` call on the same inputs.
    pub fn rasterize_with_bins(
        &self,
        batch: &MeshBatch,
        bins: &BinAssignments,
    ) -> Result<RasterOutput> {
        let ctx = self.prepare(batch)?;
        let in_range = bins.max_index().map_or(true, |i| i < ctx.faces.len());
        if !bins.matches(&self.settings, batch.len()) || !in_range {
            return Err(RasterError::InvalidSettings(
                "bin assignments were computed for different inputs".to_string(),
            ));
        }
        Ok(self.fine(ctx, bins))
    }

    fn fine(&self, mut ctx: RasterContext, bins: &BinAssignments) -> RasterOutput {
        let n = ctx.batch.len();
        let (h, w) = (
            self.settings.image_height as usize,
            self.settings.image_width as usize,
        );
        let k = self.settings.faces_per_pixel;

        let slots = rasterize_fine(&ctx.faces, bins, n, &self.settings);
        let fragments: Vec<_> = slots.iter().map(|c| c.fragment).collect();
        ctx.slot_sources = slots.iter().map(|c| c.source).collect();

        RasterOutput {
            fragments: Fragments::from_slots(n, h, w, k, &fragments),
            context: ctx,
        }
    }

    /// Backpropagate fragment gradients to vertex positions and cameras.
    ///
    /// Only depth, barycentrics and distances carry gradient; which faces a
    /// pixel sees is treated as fixed. Maps of near-clipped faces are held
    /// constant.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn backward(&self, output: &RasterOutput, grads: &FragmentGrads) -> Result<MeshGrads> {
        let frags = &output.fragments;
        let ctx = &output.context;
        let n_slots = frags.len();
        if grads.d_zbuf.len() != n_slots
            || grads.d_bary.len() != n_slots
            || grads.d_dists.len() != n_slots
        {
            return Err(RasterError::GradShapeMismatch(format!(
                "expected {n_slots} entries per buffer, got zbuf={} bary={} dists={}",
                grads.d_zbuf.len(),
                grads.d_bary.len(),
                grads.d_dists.len()
            )));
        }
        if frags.height != self.settings.image_height as usize
            || frags.width != self.settings.image_width as usize
            || frags.k != self.settings.faces_per_pixel
            || ctx.slot_sources.len() != n_slots
        {
            return Err(RasterError::GradShapeMismatch(
                "fragments were not produced with these settings".to_string(),
            ));
        }
        validate_cameras(&self.cameras, ctx.batch.len())?;

        let (h, w, k) = (frags.height, frags.width, frags.k);
        let opts = fragment_options(&self.settings);
        let cameras = &self.cameras;
        let packed_faces = ctx.batch.faces();
        let num_verts = ctx.batch.num_verts();

        let local = (0..n_slots)
            .into_par_iter()
            .fold(
                || LocalGrads::new(num_verts, cameras),
                |mut acc, i| {
                    let Some(face) = ctx.slot_source(i) else {
                        return acc;
                    };
                    let pix = i / k;
                    let (y, x) = ((pix / w) % h, pix % w);
                    let p = pixel_center_ndc(y, x, h, w);
                    let ci = camera_index(cameras.len(), face.mesh);
                    let camera = &cameras[ci];

                    let d_bary = match face.bary_map() {
                        Some(map) => map_barycentric_grad(map, &grads.d_bary[i]),
                        None => grads.d_bary[i],
                    };
                    let d_screen = measure_fragment_grad(
                        &p,
                        &face.verts,
                        opts,
                        grads.d_zbuf[i],
                        &d_bary,
                        grads.d_dists[i],
                    );

                    let ids = packed_faces[face.face];
                    match &face.source {
                        FaceSource::Direct => {
                            for j in 0..3 {
                                let (d_view, d_proj) =
                                    view_to_screen_grad(camera, &ctx.screen.view[ids[j]], &d_screen[j]);
                                acc.d_view[ids[j]] += d_view;
                                acc.d_projection[ci] += d_proj;
                            }
                        }
                        FaceSource::Clipped { view, map } => {
                            for j in 0..3 {
                                let (d_view, d_proj) =
                                    view_to_screen_grad(camera, &view[j], &d_screen[j]);
                                acc.d_projection[ci] += d_proj;
                                for s in 0..3 {
                                    acc.d_view[ids[s]] += d_view * map[(j, s)];
                                }
                            }
                        }
                    }
                    acc
                },
            )
            .reduce(|| LocalGrads::new(num_verts, cameras), LocalGrads::merge);

        let mut d_cameras: Vec<CameraGrads> = cameras.iter().map(CameraGrads::zeros_like).collect();
        for (ci, d_proj) in local.d_projection.into_iter().enumerate() {
            d_cameras[ci].d_projection += d_proj;
        }

        let mut d_verts = vec![Vector3::zeros(); num_verts];
        let world = ctx.batch.verts();
        for (mi, range) in ctx.batch.ranges().iter().enumerate() {
            let ci = camera_index(cameras.len(), mi);
            let rotation = &cameras[ci].rotation;
            for vi in range.verts() {
                let (d_world, d_rot, d_trans) =
                    world_to_view_grad(rotation, &world[vi], &local.d_view[vi]);
                d_verts[vi] = d_world;
                d_cameras[ci].d_rotation += d_rot;
                d_cameras[ci].d_translation += d_trans;
            }
        }

        Ok(MeshGrads { d_verts, d_cameras })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Mesh;
    use crate::render::fragments::NO_FACE;
    use crate::render::NearClipPolicy;

    fn frontal_triangle(z: f32) -> Mesh {
        Mesh::new(
            vec![
                Vector3::new(-0.5, -0.5, z),
                Vector3::new(0.5, -0.5, z),
                Vector3::new(0.0, 0.5, z),
            ],
            vec![[0, 1, 2]],
        )
    }

    #[test]
    fn test_bins_and_naive_agree() {
        let batch =
            MeshBatch::from_meshes(&[frontal_triangle(2.0), frontal_triangle(1.0)]).unwrap();
        let mut s = RasterizationSettings::square(32);
        s.faces_per_pixel = 2;
        s.bin_size = Some(8);
        let cam = Camera::orthographic(0.1, 10.0);
        let binned = MeshRasterizer::with_camera(cam.clone(), s.clone())
            .rasterize(&batch)
            .unwrap();
        s.bin_size = Some(0);
        let naive = MeshRasterizer::with_camera(cam, s).rasterize(&batch).unwrap();
        assert_eq!(binned.fragments.pix_to_face, naive.fragments.pix_to_face);
        assert_eq!(binned.fragments.zbuf, naive.fragments.zbuf);
    }

    #[test]
    fn test_reused_bins_give_same_fragments() {
        let batch = MeshBatch::from_meshes(&[frontal_triangle(2.0)]).unwrap();
        let mut s = RasterizationSettings::square(16);
        s.bin_size = Some(4);
        let r = MeshRasterizer::with_camera(Camera::orthographic(0.1, 10.0), s);
        let bins = r.compute_bins(&batch).unwrap();
        let a = r.rasterize_with_bins(&batch, &bins).unwrap();
        let b = r.rasterize(&batch).unwrap();
        assert_eq!(a.fragments.pix_to_face, b.fragments.pix_to_face);
    }

    #[test]
    fn test_near_clip_policies() {
        // Vertex 2 sits in front of the near plane.
        let mesh = Mesh::new(
            vec![
                Vector3::new(-0.5, -0.5, 2.0),
                Vector3::new(0.5, -0.5, 2.0),
                Vector3::new(0.0, 0.5, 0.05),
            ],
            vec![[0, 1, 2]],
        );
        let batch = MeshBatch::from_meshes(&[mesh]).unwrap();
        let cam = Camera::perspective(1.0, 1.0, 0.5, 10.0);
        let mut s = RasterizationSettings::square(16);

        s.near_clip = NearClipPolicy::Drop;
        let out = MeshRasterizer::with_camera(cam.clone(), s.clone())
            .rasterize(&batch)
            .unwrap();
        assert!(out.fragments.pix_to_face.iter().all(|&f| f == NO_FACE));
        assert_eq!(out.context.stats.near_dropped, 1);

        s.near_clip = NearClipPolicy::Clip;
        let out = MeshRasterizer::with_camera(cam, s).rasterize(&batch).unwrap();
        assert_eq!(out.context.stats.clipped, 2);
        let zs: Vec<f32> = out.fragments.zbuf.iter().copied().filter(|&z| z >= 0.0).collect();
        assert!(!zs.is_empty());
        assert!(zs.iter().all(|&z| z >= 0.5 - 1e-4));
        for b in out.fragments.bary_coords.iter().filter(|b| b[0] >= 0.0) {
            assert!((b[0] + b[1] + b[2] - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_backward_rejects_wrong_shapes() {
        let batch = MeshBatch::from_meshes(&[frontal_triangle(2.0)]).unwrap();
        let r = MeshRasterizer::with_camera(
            Camera::orthographic(0.1, 10.0),
            RasterizationSettings::square(8),
        );
        let out = r.rasterize(&batch).unwrap();
        let mut grads = FragmentGrads::zeros_like(&out.fragments);
        grads.d_zbuf.pop();
        assert!(matches!(
            r.backward(&out, &grads),
            Err(RasterError::GradShapeMismatch(_))
        ));
    }
}
