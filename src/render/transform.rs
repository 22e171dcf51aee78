//! Geometry transform: packed world-space vertices → view and screen space.
//!
//! Screen space is (x_ndc, y_ndc, z_view): NDC for coverage tests, with the
//! view depth retained for depth sorting and perspective-correct interpolation.

use crate::core::{Camera, MeshBatch};
use crate::error::{RasterError, Result};
use nalgebra::Vector3;
use rayon::prelude::*;

/// Per packed vertex positions after the geometry transform.
#[derive(Clone, Debug)]
pub struct ScreenVerts {
    pub view: Vec<Vector3<f32>>,
    pub screen: Vec<Vector3<f32>>,
}

/// Index of the camera used for mesh `mesh_idx` (shared or one per mesh).
#[inline]
pub fn camera_index(num_cameras: usize, mesh_idx: usize) -> usize {
    if num_cameras == 1 {
        0
    } else {
        mesh_idx
    }
}

/// Check that there is one shared camera or exactly one per mesh, and that each is valid.
pub fn validate_cameras(cameras: &[Camera], num_meshes: usize) -> Result<()> {
    if cameras.len() != 1 && cameras.len() != num_meshes {
        return Err(RasterError::CameraCountMismatch {
            cameras: cameras.len(),
            meshes: num_meshes,
        });
    }
    cameras.iter().try_for_each(Camera::validate)
}

/// Transform every packed vertex with its mesh's camera.
pub fn transform_batch(batch: &MeshBatch, cameras: &[Camera]) -> Result<ScreenVerts> {
    validate_cameras(cameras, batch.len())?;

    let mut view = vec![Vector3::zeros(); batch.num_verts()];
    let mut screen = vec![Vector3::zeros(); batch.num_verts()];

    for (mi, range) in batch.ranges().iter().enumerate() {
        let camera = &cameras[camera_index(cameras.len(), mi)];
        let src = &batch.verts()[range.verts()];
        view[range.verts()]
            .par_iter_mut()
            .zip(screen[range.verts()].par_iter_mut())
            .zip(src.par_iter())
            .for_each(|((v, s), p)| {
                *v = camera.world_to_view(p);
                *s = camera.view_to_screen(v);
            });
    }

    Ok(ScreenVerts { view, screen })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Mesh;

    #[test]
    fn test_camera_count_must_match() {
        let m = Mesh::new(vec![Vector3::new(0.0, 0.0, 1.0); 3], vec![[0, 1, 2]]);
        let batch = MeshBatch::from_meshes(&[m.clone(), m.clone(), m]).unwrap();
        let cams = vec![Camera::orthographic(0.1, 10.0); 2];
        assert!(matches!(
            transform_batch(&batch, &cams),
            Err(RasterError::CameraCountMismatch { cameras: 2, meshes: 3 })
        ));
        assert!(transform_batch(&batch, &cams[..1]).is_ok());
    }

    #[test]
    fn test_per_mesh_cameras() {
        let m = Mesh::new(vec![Vector3::new(0.5, 0.0, 1.0); 3], vec![[0, 1, 2]]);
        let batch = MeshBatch::from_meshes(&[m.clone(), m]).unwrap();
        let mut shifted = Camera::orthographic(0.1, 10.0);
        shifted.translation = Vector3::new(-0.5, 0.0, 1.0);
        let sv = transform_batch(&batch, &[Camera::orthographic(0.1, 10.0), shifted]).unwrap();
        assert_eq!(sv.screen[0], Vector3::new(0.5, 0.0, 1.0));
        assert_eq!(sv.screen[3], Vector3::new(0.0, 0.0, 2.0));
    }
}
