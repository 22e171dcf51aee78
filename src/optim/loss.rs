//! Image losses over scalar images (depth maps, silhouettes).

use crate::error::{RasterError, Result};

fn check_len(rendered: &[f32], target: &[f32]) -> Result<()> {
    if rendered.len() != target.len() {
        return Err(RasterError::GradShapeMismatch(format!(
            "rendered has {} pixels, target {}",
            rendered.len(),
            target.len()
        )));
    }
    Ok(())
}

/// Mean squared error, returning (loss, d_rendered).
pub fn l2_loss_and_grad(rendered: &[f32], target: &[f32]) -> Result<(f32, Vec<f32>)> {
    check_len(rendered, target)?;
    let n = rendered.len().max(1) as f32;
    let mut loss = 0.0f32;
    let d = rendered
        .iter()
        .zip(target)
        .map(|(r, t)| {
            let diff = r - t;
            loss += diff * diff;
            diff * (2.0 / n)
        })
        .collect();
    Ok((loss / n, d))
}

/// Soft IoU loss between a rendered alpha mask and a target mask in [0, 1].
///
/// L = 1 - Σ a t / Σ (a + t - a t)
pub fn silhouette_loss_and_grad(alpha: &[f32], target: &[f32]) -> Result<(f32, Vec<f32>)> {
    check_len(alpha, target)?;
    let inter: f32 = alpha.iter().zip(target).map(|(a, t)| a * t).sum();
    let union: f32 = alpha
        .iter()
        .zip(target)
        .map(|(a, t)| a + t - a * t)
        .sum::<f32>()
        .max(1e-6);

    let d = target
        .iter()
        .map(|t| -(t * union - inter * (1.0 - t)) / (union * union))
        .collect();
    Ok((1.0 - inter / union, d))
}
