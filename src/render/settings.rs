//! Rasterization settings (the per-call configuration).
//!
//! Settings are plain serde data so they can be stored next to a scene as JSON
//! and loaded with `RasterizationSettings::from_json_file`.

use crate::error::{RasterError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What to do with faces that cross the camera's near plane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NearClipPolicy {
    /// Clip against the near plane into one or two sub-triangles.
    #[default]
    Clip,
    /// Drop any face with a vertex in front of the near plane.
    Drop,
    /// Rasterize unclipped; depth near the plane may be wrong.
    PassThrough,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterizationSettings {
    /// Output height in pixels
    pub image_height: u32,

    /// Output width in pixels
    pub image_width: u32,

    /// Distance (NDC units) outside a face within which pixels still match it
    pub blur_radius: f32,

    /// Number of nearest faces (K) kept per pixel
    pub faces_per_pixel: usize,

    /// Bin edge in pixels; `Some(0)` rasterizes naively, `None` picks a default
    pub bin_size: Option<u32>,

    /// Candidate faces allowed per bin before the call fails
    pub max_faces_per_bin: Option<usize>,

    pub perspective_correct: bool,

    /// Clamp barycentrics into the face; defaults to `blur_radius > 0`
    pub clip_barycentric_coords: Option<bool>,

    pub cull_backfaces: bool,

    pub near_clip: NearClipPolicy,
}

impl Default for RasterizationSettings {
    fn default() -> Self {
        Self {
            image_height: 256,
            image_width: 256,
            blur_radius: 0.0,
            faces_per_pixel: 1,
            bin_size: None,
            max_faces_per_bin: None,
            perspective_correct: false,
            clip_barycentric_coords: None,
            cull_backfaces: false,
            near_clip: NearClipPolicy::Clip,
        }
    }
}

impl RasterizationSettings {
    /// Square image of `size` pixels with defaults elsewhere.
    pub fn square(size: u32) -> Self {
        Self {
            image_height: size,
            image_width: size,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| RasterError::InvalidSettings(format!("JSON: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RasterError::InvalidSettings(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.image_height == 0 || self.image_width == 0 {
            return Err(RasterError::InvalidSettings(format!(
                "image size must be positive, got {}x{}",
                self.image_height, self.image_width
            )));
        }
        if self.faces_per_pixel == 0 {
            return Err(RasterError::InvalidSettings(
                "faces_per_pixel must be at least 1".to_string(),
            ));
        }
        if !(self.blur_radius.is_finite() && self.blur_radius >= 0.0) {
            return Err(RasterError::InvalidSettings(format!(
                "blur_radius must be finite and non-negative, got {}",
                self.blur_radius
            )));
        }
        if self.max_faces_per_bin == Some(0) {
            return Err(RasterError::InvalidSettings(
                "max_faces_per_bin must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn clip_barycentric(&self) -> bool {
        self.clip_barycentric_coords
            .unwrap_or(self.blur_radius > 0.0)
    }

    /// Bin size in pixels, 0 meaning naive rasterization.
    ///
    /// Default: 2^max(ceil(log2(max(H, W))) - 4, 4)
    pub fn resolved_bin_size(&self) -> u32 {
        self.bin_size.unwrap_or_else(|| {
            let max_dim = self.image_height.max(self.image_width) as f32;
            let exp = (max_dim.log2().ceil() as i32 - 4).max(4);
            1u32 << exp
        })
    }

    /// Default: max(10000, num_faces / 5)
    pub fn resolved_max_faces_per_bin(&self, num_faces: usize) -> usize {
        self.max_faces_per_bin
            .unwrap_or_else(|| (num_faces / 5).max(10_000))
    }
}
