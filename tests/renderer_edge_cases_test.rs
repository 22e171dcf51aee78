//! Renderer edge case tests
//!
//! Tests for edge cases in the rasterization pipeline, particularly:
//! - Invalid cameras and settings
//! - Malformed meshes
//! - Bin overflow
//! - Degenerate, non-finite and off-screen faces
//! - Near-plane handling

use nalgebra::{Matrix3, Vector3};
use meshrast_rs::core::{Camera, Mesh, MeshBatch, MeshRange, Projection};
use meshrast_rs::render::{
    FragmentGrads, MeshRasterizer, NearClipPolicy, RasterizationSettings, NO_FACE,
};
use meshrast_rs::RasterError;

fn create_test_triangle(z: f32) -> Mesh {
    Mesh::new(
        vec![
            Vector3::new(-0.5, -0.5, z),
            Vector3::new(0.5, -0.5, z),
            Vector3::new(0.0, 0.5, z),
        ],
        vec![[0, 1, 2]],
    )
}

fn single(mesh: Mesh) -> MeshBatch {
    MeshBatch::from_meshes(&[mesh]).unwrap()
}

fn all_empty(r: &MeshRasterizer, batch: &MeshBatch) -> bool {
    let out = r.rasterize(batch).unwrap();
    out.fragments.pix_to_face.iter().all(|&f| f == NO_FACE)
}

#[test]
fn test_invalid_camera_is_rejected_before_rasterizing() {
    let batch = single(create_test_triangle(2.0));
    let s = RasterizationSettings::square(8);

    let mut cam = Camera::perspective(1.0, 1.0, 0.5, 10.0);
    cam.znear = 20.0;
    let err = MeshRasterizer::with_camera(cam, s.clone()).rasterize(&batch).unwrap_err();
    assert!(matches!(err, RasterError::InvalidCamera(_)));

    let cam = Camera::perspective(0.0, 1.0, 0.5, 10.0);
    assert!(matches!(
        MeshRasterizer::with_camera(cam, s.clone()).rasterize(&batch),
        Err(RasterError::InvalidCamera(_))
    ));

    let mut cam = Camera::orthographic(0.1, 10.0);
    cam.projection = Projection::Orthographic {
        min_x: 1.0,
        max_x: 1.0,
        min_y: -1.0,
        max_y: 1.0,
    };
    assert!(MeshRasterizer::with_camera(cam, s.clone()).rasterize(&batch).is_err());

    let mut cam = Camera::orthographic(0.1, 10.0);
    cam.rotation = Matrix3::from_element(f32::NAN);
    assert!(matches!(
        MeshRasterizer::with_camera(cam, s).rasterize(&batch),
        Err(RasterError::InvalidCamera(_))
    ));
}

#[test]
fn test_camera_count_must_be_one_or_one_per_mesh() {
    let batch = MeshBatch::from_meshes(&[create_test_triangle(2.0), create_test_triangle(3.0)]).unwrap();
    let cams = vec![Camera::orthographic(0.1, 10.0); 3];
    let err = MeshRasterizer::new(cams, RasterizationSettings::square(8))
        .rasterize(&batch)
        .unwrap_err();
    assert_eq!(err, RasterError::CameraCountMismatch { cameras: 3, meshes: 2 });
}

#[test]
fn test_invalid_settings_are_rejected() {
    let batch = single(create_test_triangle(2.0));
    let mut s = RasterizationSettings::square(8);
    s.image_width = 0;
    assert!(matches!(
        MeshRasterizer::with_camera(Camera::orthographic(0.1, 10.0), s).rasterize(&batch),
        Err(RasterError::InvalidSettings(_))
    ));
}

#[test]
fn test_settings_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.json");
    std::fs::write(&good, r#"{ "image_height": 32, "image_width": 48, "faces_per_pixel": 2 }"#).unwrap();
    let s = RasterizationSettings::from_json_file(&good).unwrap();
    assert_eq!((s.image_height, s.image_width, s.faces_per_pixel), (32, 48, 2));

    let bad = dir.path().join("bad.json");
    std::fs::write(&bad, r#"{ "near_clip": "sideways" }"#).unwrap();
    assert!(matches!(
        RasterizationSettings::from_json_file(&bad),
        Err(RasterError::InvalidSettings(_))
    ));
    assert!(RasterizationSettings::from_json_file(&dir.path().join("missing.json")).is_err());
}

#[test]
fn test_out_of_range_face_index_fails_whole_batch() {
    let mut bad = create_test_triangle(2.0);
    bad.faces.push([0, 2, 7]);
    let err = MeshBatch::from_meshes(&[create_test_triangle(2.0), bad]).unwrap_err();
    assert!(matches!(err, RasterError::InvalidMesh { mesh: 1, .. }));

    // Hand-packed buffers with a gap in the ranges.
    let tri = create_test_triangle(2.0);
    let ranges = vec![MeshRange {
        vert_start: 0,
        num_verts: 2,
        face_start: 0,
        num_faces: 1,
    }];
    assert!(MeshBatch::new(tri.verts, tri.faces, ranges).is_err());
}

#[test]
fn test_bin_overflow_fails_the_call() {
    let tris: Vec<Vector3<f32>> = (0..8)
        .flat_map(|i| create_test_triangle(1.0 + i as f32).verts)
        .collect();
    let faces = (0..8).map(|i| [3 * i, 3 * i + 1, 3 * i + 2]).collect();
    let batch = single(Mesh::new(tris, faces));
    let mut s = RasterizationSettings::square(32);
    s.bin_size = Some(8);
    s.max_faces_per_bin = Some(4);
    let err = MeshRasterizer::with_camera(Camera::orthographic(0.1, 20.0), s.clone())
        .rasterize(&batch)
        .unwrap_err();
    assert!(matches!(err, RasterError::BinOverflow { mesh: 0, count: 8, max: 4, .. }));

    // Naive rasterization has no per-bin limit.
    s.bin_size = Some(0);
    assert!(MeshRasterizer::with_camera(Camera::orthographic(0.1, 20.0), s)
        .rasterize(&batch)
        .is_ok());
}

#[test]
fn test_degenerate_faces_produce_no_fragments() {
    let mesh = Mesh::new(
        vec![
            Vector3::new(-0.5, -0.5, 2.0),
            Vector3::new(0.5, 0.5, 2.0),
            Vector3::new(0.0, 0.0, 2.0),
        ],
        vec![[0, 1, 2], [0, 0, 1]],
    );
    let r = MeshRasterizer::with_camera(Camera::orthographic(0.1, 10.0), RasterizationSettings::square(16));
    let out = r.rasterize(&single(mesh)).unwrap();
    assert_eq!(out.context.stats.degenerate, 2);
    assert!(out.fragments.pix_to_face.iter().all(|&f| f == NO_FACE));
}

#[test]
fn test_non_finite_vertices_are_dropped() {
    let mut mesh = create_test_triangle(2.0);
    mesh.verts.push(Vector3::new(f32::NAN, 0.0, 2.0));
    mesh.faces.push([0, 1, 3]);
    let r = MeshRasterizer::with_camera(Camera::orthographic(0.1, 10.0), RasterizationSettings::square(16));
    let out = r.rasterize(&single(mesh)).unwrap();
    assert_eq!(out.context.stats.non_finite, 1);
    assert!(out.fragments.pix_to_face.iter().all(|&f| f == NO_FACE || f == 0));
    assert!(out.fragments.pix_to_face.contains(&0));
}

#[test]
fn test_faces_outside_view_or_depth_range_are_culled() {
    let r = MeshRasterizer::with_camera(Camera::orthographic(0.5, 10.0), RasterizationSettings::square(8));

    let mut off_screen = create_test_triangle(2.0);
    for v in &mut off_screen.verts {
        v.x += 5.0;
    }
    assert!(all_empty(&r, &single(off_screen)));
    assert!(all_empty(&r, &single(create_test_triangle(0.2))));
    assert!(all_empty(&r, &single(create_test_triangle(11.0))));
}

#[test]
fn test_backface_culling() {
    let front = create_test_triangle(2.0);
    let mut back = front.clone();
    back.faces = vec![[0, 2, 1]];
    let mut s = RasterizationSettings::square(8);
    s.cull_backfaces = true;
    let r = MeshRasterizer::with_camera(Camera::orthographic(0.1, 10.0), s);
    // Counter-clockwise on screen faces the camera.
    assert!(!all_empty(&r, &single(front)));
    assert!(all_empty(&r, &single(back)));
}

#[test]
fn test_blur_radius_extends_coverage_outside_the_face() {
    let batch = single(create_test_triangle(2.0));
    let cam = Camera::orthographic(0.1, 10.0);
    let sharp = MeshRasterizer::with_camera(cam.clone(), RasterizationSettings::square(16))
        .rasterize(&batch)
        .unwrap();
    let mut s = RasterizationSettings::square(16);
    s.blur_radius = 0.2;
    let blurred = MeshRasterizer::with_camera(cam, s).rasterize(&batch).unwrap();

    let count = |f: &[i64]| f.iter().filter(|&&x| x >= 0).count();
    assert!(count(&blurred.fragments.pix_to_face) > count(&sharp.fragments.pix_to_face));
    for (i, &face) in blurred.fragments.pix_to_face.iter().enumerate() {
        if face >= 0 {
            let d = blurred.fragments.dists[i];
            assert!(d <= 0.2 + 1e-6);
            // Clipped barycentrics stay inside the face.
            assert!(blurred.fragments.bary_coords[i].iter().all(|&b| b >= 0.0));
        }
    }
}

#[test]
fn test_pass_through_keeps_straddling_faces() {
    let mesh = Mesh::new(
        vec![
            Vector3::new(-0.5, -0.5, 2.0),
            Vector3::new(0.5, -0.5, 2.0),
            Vector3::new(0.0, 0.5, 0.3),
        ],
        vec![[0, 1, 2]],
    );
    let mut s = RasterizationSettings::square(16);
    s.near_clip = NearClipPolicy::PassThrough;
    let out = MeshRasterizer::with_camera(Camera::perspective(1.0, 1.0, 0.5, 10.0), s)
        .rasterize(&single(mesh))
        .unwrap();
    assert_eq!(out.context.stats.passed_through, 1);
    assert!(out.fragments.pix_to_face.contains(&0));
    assert!(out
        .fragments
        .zbuf
        .iter()
        .zip(&out.fragments.pix_to_face)
        .all(|(&z, &f)| f < 0 || z > 0.0));
}

#[test]
fn test_backward_with_zero_upstream_is_zero() {
    let batch = single(create_test_triangle(2.0));
    let r = MeshRasterizer::with_camera(Camera::perspective(1.0, 1.0, 0.5, 10.0), RasterizationSettings::square(8));
    let out = r.rasterize(&batch).unwrap();
    let grads = r.backward(&out, &FragmentGrads::zeros_like(&out.fragments)).unwrap();
    assert_eq!(grads.d_verts.len(), 3);
    assert!(grads.d_verts.iter().all(|g| *g == Vector3::zeros()));
    assert_eq!(grads.d_cameras.len(), 1);
}

#[test]
fn test_empty_batch_and_empty_mesh() {
    let r = MeshRasterizer::with_camera(Camera::orthographic(0.1, 10.0), RasterizationSettings::square(4));
    let out = r
        .rasterize(&MeshBatch::from_meshes(&[Mesh::default(), create_test_triangle(2.0)]).unwrap())
        .unwrap();
    assert_eq!(out.fragments.batch, 2);
    assert!(out.fragments.is_background(0, 2, 2));
    assert!(!out.fragments.is_background(1, 2, 2));
}
