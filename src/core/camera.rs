//! Camera model (extrinsics plus perspective or orthographic projection).
//!
//! Cameras are used to:
//! - Transform mesh vertices from world space to view space
//! - Project view-space points to normalized device coordinates (NDC)
//! - Provide the near/far planes used by face culling and clipping
//!
//! Conventions: view space looks down +Z; NDC has +X right and +Y up, with the
//! image covering [-1, 1] on both axes.

use crate::error::{RasterError, Result};
use nalgebra::{Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Projection from view space to NDC.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// Pinhole projection with a vertical field of view (radians).
    Perspective { fov_y: f32, aspect_ratio: f32 },

    /// Orthographic projection of the view-space box [min_x, max_x] × [min_y, max_y].
    Orthographic {
        min_x: f32,
        max_x: f32,
        min_y: f32,
        max_y: f32,
    },
}

impl Projection {
    pub fn is_perspective(&self) -> bool {
        matches!(self, Projection::Perspective { .. })
    }
}

/// A camera with extrinsics and a projection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Camera {
    /// Rotation from world to view coordinates
    pub rotation: Matrix3<f32>,

    /// Translation from world to view coordinates
    pub translation: Vector3<f32>,

    pub projection: Projection,

    /// Near clipping plane (view-space depth)
    pub znear: f32,

    /// Far clipping plane (view-space depth)
    pub zfar: f32,
}

impl Camera {
    pub fn new(
        rotation: Matrix3<f32>,
        translation: Vector3<f32>,
        projection: Projection,
        znear: f32,
        zfar: f32,
    ) -> Self {
        Self {
            rotation,
            translation,
            projection,
            znear,
            zfar,
        }
    }

    /// Perspective camera with identity extrinsics.
    pub fn perspective(fov_y: f32, aspect_ratio: f32, znear: f32, zfar: f32) -> Self {
        Self::new(
            Matrix3::identity(),
            Vector3::zeros(),
            Projection::Perspective {
                fov_y,
                aspect_ratio,
            },
            znear,
            zfar,
        )
    }

    /// Orthographic camera with identity extrinsics covering [-1, 1]².
    pub fn orthographic(znear: f32, zfar: f32) -> Self {
        Self::new(
            Matrix3::identity(),
            Vector3::zeros(),
            Projection::Orthographic {
                min_x: -1.0,
                max_x: 1.0,
                min_y: -1.0,
                max_y: 1.0,
            },
            znear,
            zfar,
        )
    }

    /// Camera placed at `eye` looking at `target`.
    ///
    /// View axes: +Z towards the target, +Y along the projected `up`, and +X
    /// completing a frame in which +X maps to the image's right side.
    pub fn look_at(
        eye: Vector3<f32>,
        target: Vector3<f32>,
        up: Vector3<f32>,
        projection: Projection,
        znear: f32,
        zfar: f32,
    ) -> Result<Self> {
        let forward = target - eye;
        if forward.norm() <= f32::EPSILON {
            return Err(RasterError::InvalidCamera(
                "look_at: eye and target coincide".to_string(),
            ));
        }
        let z_axis = forward.normalize();
        let x_raw = up.cross(&z_axis);
        if x_raw.norm() <= 1e-6 {
            return Err(RasterError::InvalidCamera(
                "look_at: up vector is parallel to the viewing direction".to_string(),
            ));
        }
        // With +Z forward and +Y up, +X = Y × Z points right on screen.
        let y_axis = z_axis.cross(&x_raw).normalize();
        let x_axis = y_axis.cross(&z_axis);

        let rotation = Matrix3::from_rows(&[
            x_axis.transpose(),
            y_axis.transpose(),
            z_axis.transpose(),
        ]);
        let translation = -(rotation * eye);
        let camera = Self::new(rotation, translation, projection, znear, zfar);
        camera.validate()?;
        Ok(camera)
    }

    /// Fail fast on parameters that would make rasterization meaningless.
    pub fn validate(&self) -> Result<()> {
        let finite = self.rotation.iter().all(|v| v.is_finite())
            && self.translation.iter().all(|v| v.is_finite())
            && self.znear.is_finite()
            && self.zfar.is_finite();
        if !finite {
            return Err(RasterError::InvalidCamera(
                "non-finite extrinsics or clipping planes".to_string(),
            ));
        }
        if self.znear >= self.zfar {
            return Err(RasterError::InvalidCamera(format!(
                "znear ({}) must be less than zfar ({})",
                self.znear, self.zfar
            )));
        }
        match self.projection {
            Projection::Perspective {
                fov_y,
                aspect_ratio,
            } => {
                if self.znear <= 0.0 {
                    return Err(RasterError::InvalidCamera(format!(
                        "perspective znear must be positive, got {}",
                        self.znear
                    )));
                }
                if !(fov_y > 0.0 && fov_y < std::f32::consts::PI) {
                    return Err(RasterError::InvalidCamera(format!(
                        "fov_y must be in (0, pi), got {fov_y}"
                    )));
                }
                if !(aspect_ratio > 0.0 && aspect_ratio.is_finite()) {
                    return Err(RasterError::InvalidCamera(format!(
                        "aspect_ratio must be positive, got {aspect_ratio}"
                    )));
                }
            }
            Projection::Orthographic {
                min_x,
                max_x,
                min_y,
                max_y,
            } => {
                if !(max_x > min_x && max_y > min_y) {
                    return Err(RasterError::InvalidCamera(format!(
                        "degenerate orthographic bounds x=[{min_x}, {max_x}] y=[{min_y}, {max_y}]"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Transform a point from world coordinates to view coordinates.
    ///
    /// p_view = R * p_world + t
    pub fn world_to_view(&self, point_world: &Vector3<f32>) -> Vector3<f32> {
        self.rotation * point_world + self.translation
    }

    /// Project a view-space point to NDC (x, y).
    ///
    /// Perspective points with z <= 0 produce non-finite or mirrored results;
    /// callers cull or clip those before rasterizing.
    pub fn view_to_ndc(&self, point_view: &Vector3<f32>) -> Vector2<f32> {
        match self.projection {
            Projection::Perspective {
                fov_y,
                aspect_ratio,
            } => {
                let (sx, sy) = perspective_scales(fov_y, aspect_ratio);
                let z_inv = 1.0 / point_view.z;
                Vector2::new(sx * point_view.x * z_inv, sy * point_view.y * z_inv)
            }
            Projection::Orthographic {
                min_x,
                max_x,
                min_y,
                max_y,
            } => Vector2::new(
                (2.0 * point_view.x - (max_x + min_x)) / (max_x - min_x),
                (2.0 * point_view.y - (max_y + min_y)) / (max_y - min_y),
            ),
        }
    }

    /// Screen-space position: NDC x, y and the retained view-space depth.
    pub fn view_to_screen(&self, point_view: &Vector3<f32>) -> Vector3<f32> {
        let ndc = self.view_to_ndc(point_view);
        Vector3::new(ndc.x, ndc.y, point_view.z)
    }

    /// Convenience: world → screen in one step.
    pub fn world_to_screen(&self, point_world: &Vector3<f32>) -> Vector3<f32> {
        self.view_to_screen(&self.world_to_view(point_world))
    }

    /// Get the camera center in world coordinates.
    pub fn camera_center(&self) -> Vector3<f32> {
        // C = -R^T * t
        -self.rotation.transpose() * self.translation
    }
}

/// NDC scale factors (sx, sy) of a perspective projection.
///
/// x_ndc = sx * x / z, y_ndc = sy * y / z
pub fn perspective_scales(fov_y: f32, aspect_ratio: f32) -> (f32, f32) {
    let t = (0.5 * fov_y).tan();
    (1.0 / (t * aspect_ratio), 1.0 / t)
}
