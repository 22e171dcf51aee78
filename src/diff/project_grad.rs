//! Gradients for the geometry transform (world → view → screen).
//!
//! Forward:
//! - View:         p_view = R * p_world + t
//! - Perspective:  x_ndc = sx * x / z,  y_ndc = sy * y / z
//!                 sx = 1 / (tan(fov/2) * aspect), sy = 1 / tan(fov/2)
//! - Orthographic: x_ndc = (2x - (max_x + min_x)) / (max_x - min_x)   (same for y)
//! - Screen z keeps the view depth: z_screen = z_view
//!
//! We keep these functions small so they can be composed in tests.

use crate::core::{perspective_scales, Camera, Projection};
use nalgebra::{Matrix3, Vector3};
use std::ops::AddAssign;

/// Gradient w.r.t. the projection parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProjectionGrad {
    Perspective {
        d_fov_y: f32,
        d_aspect_ratio: f32,
    },
    Orthographic {
        d_min_x: f32,
        d_max_x: f32,
        d_min_y: f32,
        d_max_y: f32,
    },
}

impl ProjectionGrad {
    pub fn zeros_like(projection: &Projection) -> Self {
        match projection {
            Projection::Perspective { .. } => ProjectionGrad::Perspective {
                d_fov_y: 0.0,
                d_aspect_ratio: 0.0,
            },
            Projection::Orthographic { .. } => ProjectionGrad::Orthographic {
                d_min_x: 0.0,
                d_max_x: 0.0,
                d_min_y: 0.0,
                d_max_y: 0.0,
            },
        }
    }
}

impl AddAssign for ProjectionGrad {
    fn add_assign(&mut self, rhs: Self) {
        match (self, rhs) {
            (
                ProjectionGrad::Perspective {
                    d_fov_y,
                    d_aspect_ratio,
                },
                ProjectionGrad::Perspective {
                    d_fov_y: f,
                    d_aspect_ratio: a,
                },
            ) => {
                *d_fov_y += f;
                *d_aspect_ratio += a;
            }
            (
                ProjectionGrad::Orthographic {
                    d_min_x,
                    d_max_x,
                    d_min_y,
                    d_max_y,
                },
                ProjectionGrad::Orthographic {
                    d_min_x: a,
                    d_max_x: b,
                    d_min_y: c,
                    d_max_y: d,
                },
            ) => {
                *d_min_x += a;
                *d_max_x += b;
                *d_min_y += c;
                *d_max_y += d;
            }
            // Gradients of one camera always share its projection kind.
            _ => {}
        }
    }
}

/// Accumulated gradient w.r.t. all parameters of one camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraGrads {
    pub d_rotation: Matrix3<f32>,
    pub d_translation: Vector3<f32>,
    pub d_projection: ProjectionGrad,
}

impl CameraGrads {
    pub fn zeros_like(camera: &Camera) -> Self {
        Self {
            d_rotation: Matrix3::zeros(),
            d_translation: Vector3::zeros(),
            d_projection: ProjectionGrad::zeros_like(&camera.projection),
        }
    }
}

impl AddAssign for CameraGrads {
    fn add_assign(&mut self, rhs: Self) {
        self.d_rotation += rhs.d_rotation;
        self.d_translation += rhs.d_translation;
        self.d_projection += rhs.d_projection;
    }
}

/// Backward of `Camera::view_to_screen` for one point.
///
/// `d_screen` = dL/d(x_ndc, y_ndc, z). Returns dL/dp_view and the projection gradient.
pub fn view_to_screen_grad(
    camera: &Camera,
    point_view: &Vector3<f32>,
    d_screen: &Vector3<f32>,
) -> (Vector3<f32>, ProjectionGrad) {
    let (x, y, z) = (point_view.x, point_view.y, point_view.z);
    match camera.projection {
        Projection::Perspective {
            fov_y,
            aspect_ratio,
        } => {
            let (sx, sy) = perspective_scales(fov_y, aspect_ratio);
            let z_inv = 1.0 / z;
            let z_inv2 = z_inv * z_inv;

            let d_x = d_screen.x * sx * z_inv;
            let d_y = d_screen.y * sy * z_inv;
            let d_z = d_screen.z - d_screen.x * sx * x * z_inv2 - d_screen.y * sy * y * z_inv2;

            // sx = 1/(t a), sy = 1/t, t = tan(fov/2), dt/dfov = (1 + t²)/2
            let t = (0.5 * fov_y).tan();
            let dt_dfov = 0.5 * (1.0 + t * t);
            let dsy_dfov = -dt_dfov / (t * t);
            let dsx_dfov = dsy_dfov / aspect_ratio;
            let dsx_daspect = -1.0 / (t * aspect_ratio * aspect_ratio);

            let d_fov_y = d_screen.x * x * z_inv * dsx_dfov + d_screen.y * y * z_inv * dsy_dfov;
            let d_aspect_ratio = d_screen.x * x * z_inv * dsx_daspect;

            (
                Vector3::new(d_x, d_y, d_z),
                ProjectionGrad::Perspective {
                    d_fov_y,
                    d_aspect_ratio,
                },
            )
        }
        Projection::Orthographic {
            min_x,
            max_x,
            min_y,
            max_y,
        } => {
            let wx = max_x - min_x;
            let wy = max_y - min_y;
            let nx = (2.0 * x - (max_x + min_x)) / wx;
            let ny = (2.0 * y - (max_y + min_y)) / wy;
            (
                Vector3::new(d_screen.x * 2.0 / wx, d_screen.y * 2.0 / wy, d_screen.z),
                ProjectionGrad::Orthographic {
                    d_min_x: d_screen.x * (nx - 1.0) / wx,
                    d_max_x: -d_screen.x * (1.0 + nx) / wx,
                    d_min_y: d_screen.y * (ny - 1.0) / wy,
                    d_max_y: -d_screen.y * (1.0 + ny) / wy,
                },
            )
        }
    }
}

/// Backward of `Camera::world_to_view` for one point.
///
/// p_view = R p_world + t  =>  dL/dp_world = Rᵀ g,  dL/dR = g p_worldᵀ,  dL/dt = g
pub fn world_to_view_grad(
    rotation: &Matrix3<f32>,
    point_world: &Vector3<f32>,
    d_view: &Vector3<f32>,
) -> (Vector3<f32>, Matrix3<f32>, Vector3<f32>) {
    (
        rotation.transpose() * d_view,
        d_view * point_world.transpose(),
        *d_view,
    )
}
