//! Adam optimizer for per-vertex positions.

use crate::error::{RasterError, Result};
use nalgebra::Vector3;

pub struct AdamVec3 {
    pub lr: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
    t: u32,
    m: Vec<Vector3<f32>>,
    v: Vec<Vector3<f32>>,
}

impl AdamVec3 {
    pub fn new(lr: f32, beta1: f32, beta2: f32, eps: f32) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            eps,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// Standard betas (0.9, 0.999) and eps 1e-8.
    pub fn with_lr(lr: f32) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8)
    }

    /// Number of steps taken so far.
    pub fn steps(&self) -> u32 {
        self.t
    }

    /// Drop moment estimates (e.g. after the vertex buffer was rebuilt).
    pub fn reset(&mut self) {
        self.t = 0;
        self.m.clear();
        self.v.clear();
    }

    pub fn step(&mut self, params: &mut [Vector3<f32>], grads: &[Vector3<f32>]) -> Result<()> {
        if params.len() != grads.len() {
            return Err(RasterError::GradShapeMismatch(format!(
                "{} parameters but {} gradients",
                params.len(),
                grads.len()
            )));
        }
        if self.m.len() != params.len() {
            self.m.resize(params.len(), Vector3::zeros());
            self.v.resize(params.len(), Vector3::zeros());
        }

        self.t += 1;
        let t = self.t as f32;
        let b1 = self.beta1;
        let b2 = self.beta2;

        let bias1 = 1.0 - b1.powf(t);
        let bias2 = 1.0 - b2.powf(t);

        for ((p, g), (m, v)) in params
            .iter_mut()
            .zip(grads)
            .zip(self.m.iter_mut().zip(self.v.iter_mut()))
        {
            *m = *m * b1 + g * (1.0 - b1);
            *v = *v * b2 + g.component_mul(g) * (1.0 - b2);

            let m_hat = *m / bias1;
            let v_hat = *v / bias2;

            // elementwise update
            *p -= m_hat.component_div(&v_hat.map(|x| x.sqrt() + self.eps)) * self.lr;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_first_step_moves_by_lr_against_gradient() {
        let mut adam = AdamVec3::with_lr(0.1);
        let mut p = vec![Vector3::new(1.0, -1.0, 0.0)];
        adam.step(&mut p, &[Vector3::new(2.0, -3.0, 0.0)]).unwrap();
        assert_relative_eq!(p[0].x, 0.9, epsilon = 1e-5);
        assert_relative_eq!(p[0].y, -0.9, epsilon = 1e-5);
        assert_relative_eq!(p[0].z, 0.0);
        assert_eq!(adam.steps(), 1);
    }

    #[test]
    fn test_mismatched_lengths_are_rejected() {
        let mut adam = AdamVec3::with_lr(0.1);
        let mut p = vec![Vector3::zeros(); 2];
        assert!(adam.step(&mut p, &[Vector3::zeros()]).is_err());
    }
}
