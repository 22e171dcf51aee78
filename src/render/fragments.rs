//! Fragment buffers: the rasterizer's output contract for shading.
//!
//! Four aligned buffers, row-major over (batch, height, width, K):
//! - `pix_to_face`: packed face index, or -1
//! - `zbuf`: interpolated view depth, or -1
//! - `bary_coords`: barycentrics w.r.t. the packed face, or [-1, -1, -1]
//! - `dists`: signed distance to the closest face edge (NDC), or -1

use nalgebra::Vector3;

/// Face index stored in unused slots.
pub const NO_FACE: i64 = -1;

/// Value stored in depth, barycentric and distance entries of unused slots.
pub const SENTINEL: f32 = -1.0;

/// One (pixel, K-slot) record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fragment {
    pub face: i64,
    pub depth: f32,
    pub bary: [f32; 3],
    pub dist: f32,
}

impl Fragment {
    pub const EMPTY: Fragment = Fragment {
        face: NO_FACE,
        depth: SENTINEL,
        bary: [SENTINEL; 3],
        dist: SENTINEL,
    };

    pub fn is_empty(&self) -> bool {
        self.face < 0
    }
}

#[derive(Clone, Debug)]
pub struct Fragments {
    pub batch: usize,
    pub height: usize,
    pub width: usize,
    pub k: usize,
    pub pix_to_face: Vec<i64>,
    pub zbuf: Vec<f32>,
    pub bary_coords: Vec<[f32; 3]>,
    pub dists: Vec<f32>,
}

impl Fragments {
    /// All slots empty.
    pub fn empty(batch: usize, height: usize, width: usize, k: usize) -> Self {
        let n = batch * height * width * k;
        Self {
            batch,
            height,
            width,
            k,
            pix_to_face: vec![NO_FACE; n],
            zbuf: vec![SENTINEL; n],
            bary_coords: vec![[SENTINEL; 3]; n],
            dists: vec![SENTINEL; n],
        }
    }

    /// Assemble buffers from per-slot records laid out as (N, H, W, K).
    pub fn from_slots(batch: usize, height: usize, width: usize, k: usize, slots: &[Fragment]) -> Self {
        debug_assert_eq!(slots.len(), batch * height * width * k);
        Self {
            batch,
            height,
            width,
            k,
            pix_to_face: slots.iter().map(|f| f.face).collect(),
            zbuf: slots.iter().map(|f| f.depth).collect(),
            bary_coords: slots.iter().map(|f| f.bary).collect(),
            dists: slots.iter().map(|f| f.dist).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.pix_to_face.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pix_to_face.is_empty()
    }

    /// Flat index of slot `k` of pixel (n, y, x).
    #[inline]
    pub fn index(&self, n: usize, y: usize, x: usize, k: usize) -> usize {
        ((n * self.height + y) * self.width + x) * self.k + k
    }

    /// Flat pixel index (without the K axis).
    #[inline]
    pub fn pixel_index(&self, n: usize, y: usize, x: usize) -> usize {
        (n * self.height + y) * self.width + x
    }

    pub fn num_pixels(&self) -> usize {
        self.batch * self.height * self.width
    }

    pub fn slot(&self, n: usize, y: usize, x: usize, k: usize) -> Fragment {
        let i = self.index(n, y, x, k);
        Fragment {
            face: self.pix_to_face[i],
            depth: self.zbuf[i],
            bary: self.bary_coords[i],
            dist: self.dists[i],
        }
    }

    pub fn face_at(&self, n: usize, y: usize, x: usize, k: usize) -> i64 {
        self.pix_to_face[self.index(n, y, x, k)]
    }

    pub fn depth_at(&self, n: usize, y: usize, x: usize, k: usize) -> f32 {
        self.zbuf[self.index(n, y, x, k)]
    }

    pub fn bary_at(&self, n: usize, y: usize, x: usize, k: usize) -> Vector3<f32> {
        Vector3::from(self.bary_coords[self.index(n, y, x, k)])
    }

    pub fn dist_at(&self, n: usize, y: usize, x: usize, k: usize) -> f32 {
        self.dists[self.index(n, y, x, k)]
    }

    /// A pixel is background when even its nearest slot is empty.
    pub fn is_background(&self, n: usize, y: usize, x: usize) -> bool {
        self.face_at(n, y, x, 0) < 0
    }
}

/// Upstream gradients w.r.t. the continuous fragment outputs.
///
/// Same (N, H, W, K) layout as `Fragments`. Entries of empty slots are ignored.
#[derive(Clone, Debug)]
pub struct FragmentGrads {
    pub d_zbuf: Vec<f32>,
    pub d_bary: Vec<Vector3<f32>>,
    pub d_dists: Vec<f32>,
}

impl FragmentGrads {
    pub fn zeros_like(fragments: &Fragments) -> Self {
        let n = fragments.len();
        Self {
            d_zbuf: vec![0.0; n],
            d_bary: vec![Vector3::zeros(); n],
            d_dists: vec![0.0; n],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_layout() {
        let f = Fragments::empty(2, 3, 4, 5);
        assert_eq!(f.len(), 2 * 3 * 4 * 5);
        assert_eq!(f.index(0, 0, 0, 1), 1);
        assert_eq!(f.index(0, 0, 1, 0), 5);
        assert_eq!(f.index(0, 1, 0, 0), 20);
        assert_eq!(f.index(1, 0, 0, 0), 60);
        assert!(f.is_background(1, 2, 3));
        assert_eq!(f.slot(1, 2, 3, 4), Fragment::EMPTY);
    }
}
