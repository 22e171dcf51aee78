//! meshrast-render: rasterize OBJ meshes to depth maps and silhouettes.
//!
//! Usage:
//!   meshrast-render --mesh bunny.obj --eye 0,0,-3 --target 0,0,0 --out depth.png
//!   meshrast-render --mesh a.obj --mesh b.obj --settings raster.json --silhouette sil.png

use anyhow::{bail, Context, Result};
use clap::Parser;
use image::{GrayImage, Luma};
use meshrast_rs::core::{Camera, MeshBatch, Projection};
use meshrast_rs::io::load_obj;
use meshrast_rs::render::{Fragments, MeshRasterizer, RasterizationSettings};
use meshrast_rs::shade::{sigmoid_alpha_blend, BlendParams};
use nalgebra::Vector3;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn parse_vec3(s: &str) -> std::result::Result<Vector3<f32>, String> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>().map_err(|e| format!("'{p}': {e}")))
        .collect::<std::result::Result<_, _>>()?;
    match parts.as_slice() {
        [x, y, z] => Ok(Vector3::new(*x, *y, *z)),
        _ => Err(format!("expected x,y,z, got '{s}'")),
    }
}

fn parse_size(s: &str) -> std::result::Result<(u32, u32), String> {
    let (h, w) = s
        .split_once('x')
        .ok_or_else(|| format!("expected HxW, got '{s}'"))?;
    let h = h.parse().map_err(|e| format!("height '{h}': {e}"))?;
    let w = w.parse().map_err(|e| format!("width '{w}': {e}"))?;
    Ok((h, w))
}

#[derive(Parser, Debug)]
#[command(name = "meshrast-render")]
#[command(about = "Rasterize triangle meshes to depth maps and silhouettes", version)]
struct Args {
    /// OBJ file; repeat to render a batch (one image per mesh)
    #[arg(long, required = true)]
    mesh: Vec<PathBuf>,

    /// Camera position "x,y,z"
    #[arg(long, value_parser = parse_vec3, default_value = "0,0,-3")]
    eye: Vector3<f32>,

    /// Point the camera looks at "x,y,z"
    #[arg(long, value_parser = parse_vec3, default_value = "0,0,0")]
    target: Vector3<f32>,

    /// Up direction "x,y,z"
    #[arg(long, value_parser = parse_vec3, default_value = "0,1,0")]
    up: Vector3<f32>,

    /// Vertical field of view in degrees
    #[arg(long, default_value_t = 60.0)]
    fov: f32,

    #[arg(long, default_value_t = 0.1)]
    znear: f32,

    #[arg(long, default_value_t = 100.0)]
    zfar: f32,

    /// Image size "HxW" (overrides the settings file)
    #[arg(long, value_parser = parse_size)]
    size: Option<(u32, u32)>,

    /// Faces kept per pixel (overrides the settings file)
    #[arg(long)]
    faces_per_pixel: Option<usize>,

    /// Blur radius in NDC units (overrides the settings file)
    #[arg(long)]
    blur_radius: Option<f32>,

    /// RasterizationSettings as JSON
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Sigmoid sharpness for the silhouette
    #[arg(long, default_value_t = 1e-4)]
    sigma: f32,

    /// Output depth map (PNG)
    #[arg(long, default_value = "depth.png")]
    out: PathBuf,

    /// Optional silhouette output (PNG)
    #[arg(long)]
    silhouette: Option<PathBuf>,
}

fn load_settings(args: &Args) -> Result<RasterizationSettings> {
    let mut settings = match &args.settings {
        Some(path) => RasterizationSettings::from_json_file(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => RasterizationSettings::default(),
    };
    if let Some((h, w)) = args.size {
        settings.image_height = h;
        settings.image_width = w;
    }
    if let Some(k) = args.faces_per_pixel {
        settings.faces_per_pixel = k;
    }
    if let Some(r) = args.blur_radius {
        settings.blur_radius = r;
    }
    settings.validate()?;
    Ok(settings)
}

/// `out.png` for a single mesh, `out_<n>.png` for batches.
fn output_path(base: &Path, mesh_idx: usize, num_meshes: usize) -> PathBuf {
    if num_meshes == 1 {
        return base.to_path_buf();
    }
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    let ext = base
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "png".to_string());
    base.with_file_name(format!("{stem}_{mesh_idx}.{ext}"))
}

/// Nearest-slot depth, near = bright, background = black.
fn depth_image(frags: &Fragments, mesh_idx: usize) -> GrayImage {
    let (h, w) = (frags.height, frags.width);
    let depth = |y: usize, x: usize| frags.depth_at(mesh_idx, y, x, 0);
    let covered = (0..h).flat_map(|y| (0..w).map(move |x| (y, x)));
    let (zmin, zmax) = covered
        .filter(|&(y, x)| !frags.is_background(mesh_idx, y, x))
        .map(|(y, x)| depth(y, x))
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), z| {
            (lo.min(z), hi.max(z))
        });
    let range = (zmax - zmin).max(1e-6);

    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        if frags.is_background(mesh_idx, y, x) {
            return Luma([0]);
        }
        let t = (depth(y, x) - zmin) / range;
        Luma([(55.0 + 200.0 * (1.0 - t)).round() as u8])
    })
}

fn silhouette_image(alpha: &[f32], frags: &Fragments, mesh_idx: usize) -> GrayImage {
    let (h, w) = (frags.height, frags.width);
    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        let a = alpha[frags.pixel_index(mesh_idx, y as usize, x as usize)];
        Luma([(a.clamp(0.0, 1.0) * 255.0).round() as u8])
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();
    println!("meshrast-render v{}", meshrast_rs::VERSION);

    let settings = load_settings(&args)?;
    if args.sigma <= 0.0 {
        bail!("--sigma must be positive");
    }

    let meshes = args
        .mesh
        .iter()
        .map(|p| load_obj(p).with_context(|| format!("loading {}", p.display())))
        .collect::<Result<Vec<_>>>()?;
    let batch = MeshBatch::from_meshes(&meshes)?;

    let aspect = settings.image_width as f32 / settings.image_height as f32;
    let camera = Camera::look_at(
        args.eye,
        args.target,
        args.up,
        Projection::Perspective {
            fov_y: args.fov.to_radians(),
            aspect_ratio: aspect,
        },
        args.znear,
        args.zfar,
    )?;

    let rasterizer = MeshRasterizer::with_camera(camera, settings);
    let output = rasterizer.rasterize(&batch)?;
    let frags = &output.fragments;
    let covered = frags.pix_to_face.iter().step_by(frags.k).filter(|&&f| f >= 0).count();
    println!(
        "Rasterized {} meshes ({} faces): {} covered pixels",
        batch.len(),
        batch.num_faces(),
        covered
    );

    for n in 0..batch.len() {
        let path = output_path(&args.out, n, batch.len());
        depth_image(frags, n)
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Wrote {}", path.display());
    }

    if let Some(sil_path) = &args.silhouette {
        let params = BlendParams {
            sigma: args.sigma,
            ..Default::default()
        };
        let colors = vec![Vector3::zeros(); frags.len()];
        let blended = sigmoid_alpha_blend(&colors, frags, &params)?;
        for n in 0..batch.len() {
            let path = output_path(sil_path, n, batch.len());
            silhouette_image(&blended.alpha, frags, n)
                .save(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}
