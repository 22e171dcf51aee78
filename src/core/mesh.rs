//! Triangle meshes and the packed (ragged) mesh batch.
//!
//! A batch of N meshes is stored as one flat vertex buffer and one flat face
//! buffer. Each mesh owns a contiguous range of both, described by a
//! `MeshRange`. Faces in the packed buffer index into the packed vertex buffer.

use crate::error::{RasterError, Result};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A single triangle mesh with mesh-local face indices.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Mesh {
    /// Vertex positions (world space)
    pub verts: Vec<Vector3<f32>>,

    /// Triangles as triples of indices into `verts`
    pub faces: Vec<[usize; 3]>,
}

impl Mesh {
    pub fn new(verts: Vec<Vector3<f32>>, faces: Vec<[usize; 3]>) -> Self {
        Self { verts, faces }
    }

    /// Check that every face index references a vertex of this mesh.
    pub fn validate(&self, mesh_idx: usize) -> Result<()> {
        for (fi, face) in self.faces.iter().enumerate() {
            for &vi in face {
                if vi >= self.verts.len() {
                    return Err(RasterError::InvalidMesh {
                        mesh: mesh_idx,
                        msg: format!(
                            "face {fi} references vertex {vi}, but the mesh has {} vertices",
                            self.verts.len()
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Location of one mesh inside the packed buffers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshRange {
    pub vert_start: usize,
    pub num_verts: usize,
    pub face_start: usize,
    pub num_faces: usize,
}

impl MeshRange {
    pub fn verts(&self) -> std::ops::Range<usize> {
        self.vert_start..self.vert_start + self.num_verts
    }

    pub fn faces(&self) -> std::ops::Range<usize> {
        self.face_start..self.face_start + self.num_faces
    }
}

/// A batch of meshes packed into contiguous arrays.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MeshBatch {
    verts: Vec<Vector3<f32>>,
    faces: Vec<[usize; 3]>,
    ranges: Vec<MeshRange>,
}

impl MeshBatch {
    /// Build a batch from already-packed buffers.
    ///
    /// The ranges must tile both buffers in order, and every face of mesh `m`
    /// must reference only vertices of mesh `m`.
    pub fn new(
        verts: Vec<Vector3<f32>>,
        faces: Vec<[usize; 3]>,
        ranges: Vec<MeshRange>,
    ) -> Result<Self> {
        let batch = Self {
            verts,
            faces,
            ranges,
        };
        batch.validate()?;
        Ok(batch)
    }

    /// Pack a list of meshes, rebasing their local face indices.
    pub fn from_meshes(meshes: &[Mesh]) -> Result<Self> {
        let total_verts = meshes.iter().map(|m| m.verts.len()).sum();
        let total_faces = meshes.iter().map(|m| m.faces.len()).sum();
        let mut verts = Vec::with_capacity(total_verts);
        let mut faces = Vec::with_capacity(total_faces);
        let mut ranges = Vec::with_capacity(meshes.len());

        for (mi, mesh) in meshes.iter().enumerate() {
            mesh.validate(mi)?;
            let range = MeshRange {
                vert_start: verts.len(),
                num_verts: mesh.verts.len(),
                face_start: faces.len(),
                num_faces: mesh.faces.len(),
            };
            verts.extend_from_slice(&mesh.verts);
            faces.extend(mesh.faces.iter().map(|f| {
                [
                    f[0] + range.vert_start,
                    f[1] + range.vert_start,
                    f[2] + range.vert_start,
                ]
            }));
            ranges.push(range);
        }

        Ok(Self {
            verts,
            faces,
            ranges,
        })
    }

    /// Check range tiling and that face indices stay inside their own mesh.
    pub fn validate(&self) -> Result<()> {
        let mut next_vert = 0;
        let mut next_face = 0;
        for (mi, r) in self.ranges.iter().enumerate() {
            if r.vert_start != next_vert || r.face_start != next_face {
                return Err(RasterError::InvalidMesh {
                    mesh: mi,
                    msg: "mesh ranges must be contiguous and in order".to_string(),
                });
            }
            next_vert += r.num_verts;
            next_face += r.num_faces;
        }
        if next_vert != self.verts.len() || next_face != self.faces.len() {
            return Err(RasterError::InvalidMesh {
                mesh: self.ranges.len(),
                msg: format!(
                    "ranges cover {next_vert} verts / {next_face} faces, buffers hold {} / {}",
                    self.verts.len(),
                    self.faces.len()
                ),
            });
        }

        for (mi, r) in self.ranges.iter().enumerate() {
            let vrange = r.verts();
            for fi in r.faces() {
                for &vi in &self.faces[fi] {
                    if !vrange.contains(&vi) {
                        return Err(RasterError::InvalidMesh {
                            mesh: mi,
                            msg: format!(
                                "packed face {fi} references vertex {vi} outside {:?}",
                                vrange
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Number of meshes in the batch.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn num_verts(&self) -> usize {
        self.verts.len()
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    pub fn verts(&self) -> &[Vector3<f32>] {
        &self.verts
    }

    pub fn faces(&self) -> &[[usize; 3]] {
        &self.faces
    }

    pub fn ranges(&self) -> &[MeshRange] {
        &self.ranges
    }

    /// Range of mesh `mesh_idx`, `None` past the end of the batch.
    pub fn mesh_range(&self, mesh_idx: usize) -> Option<MeshRange> {
        self.ranges.get(mesh_idx).copied()
    }

    pub fn verts_of_mesh(&self, mesh_idx: usize) -> Option<&[Vector3<f32>]> {
        let range = self.ranges.get(mesh_idx)?;
        self.verts.get(range.verts())
    }

    /// Packed (batch-wide) vertex indices of mesh `mesh_idx`'s faces.
    pub fn faces_of_mesh(&self, mesh_idx: usize) -> Option<&[[usize; 3]]> {
        let range = self.ranges.get(mesh_idx)?;
        self.faces.get(range.faces())
    }

    /// Mesh that owns packed face `face_idx`.
    pub fn mesh_of_face(&self, face_idx: usize) -> Option<usize> {
        // Ranges are sorted by face_start; empty meshes share a start with the next one.
        let pos = self
            .ranges
            .partition_point(|r| r.face_start + r.num_faces <= face_idx);
        (pos < self.ranges.len() && self.ranges[pos].faces().contains(&face_idx)).then_some(pos)
    }

    /// Same topology with new vertex positions.
    pub fn with_verts(&self, verts: Vec<Vector3<f32>>) -> Result<Self> {
        if verts.len() != self.verts.len() {
            return Err(RasterError::InvalidMesh {
                mesh: 0,
                msg: format!(
                    "expected {} vertices, got {}",
                    self.verts.len(),
                    verts.len()
                ),
            });
        }
        Ok(Self {
            verts,
            faces: self.faces.clone(),
            ranges: self.ranges.clone(),
        })
    }
}
