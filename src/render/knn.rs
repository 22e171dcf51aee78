//! K-nearest fragment selection per pixel.
//!
//! Candidates are ordered by (depth, packed face index). The key is a strict
//! total order, so the kept set and its order do not depend on the order in
//! which candidates arrive.

use super::fragments::Fragment;
use std::cmp::Ordering;

/// A fragment plus the raster face that produced it (needed by backward).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub fragment: Fragment,
    /// Index into the rasterizer's face list, `usize::MAX` when empty
    pub source: usize,
}

impl Candidate {
    pub const EMPTY: Candidate = Candidate {
        fragment: Fragment::EMPTY,
        source: usize::MAX,
    };
}

/// Depth first, then packed face index.
#[inline]
pub fn fragment_order(a: &Fragment, b: &Fragment) -> Ordering {
    a.depth.total_cmp(&b.depth).then(a.face.cmp(&b.face))
}

/// Bounded sorted list over a caller-owned slot slice of length K.
pub struct TopK<'a> {
    slots: &'a mut [Candidate],
    len: usize,
}

impl<'a> TopK<'a> {
    /// Reset all slots to empty.
    pub fn new(slots: &'a mut [Candidate]) -> Self {
        slots.fill(Candidate::EMPTY);
        Self { slots, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Insert keeping ascending order; evicts the farthest entry when full.
    /// Returns whether the candidate was kept.
    pub fn insert(&mut self, cand: Candidate) -> bool {
        let k = self.slots.len();
        if k == 0 {
            return false;
        }
        if self.is_full() {
            let last = &self.slots[k - 1].fragment;
            if fragment_order(&cand.fragment, last) != Ordering::Less {
                return false;
            }
        }

        let pos = self.slots[..self.len]
            .partition_point(|c| fragment_order(&c.fragment, &cand.fragment) == Ordering::Less);
        let end = if self.is_full() { k - 1 } else { self.len };
        self.slots.copy_within(pos..end, pos + 1);
        self.slots[pos] = cand;
        if !self.is_full() {
            self.len += 1;
        }
        true
    }
}
