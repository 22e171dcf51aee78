//! Wavefront OBJ loading and saving for triangle meshes.
//!
//! Only geometry is read:
//! ```text
//! v x y z [w]       # vertex position (w ignored)
//! f i j k ...       # polygon, 1-based; i, i/t, i//n, i/t/n; negative = relative
//! ```
//! Polygons with more than three corners are fan-triangulated. Other records
//! (normals, texture coordinates, groups, materials) are skipped.

use super::LoadError;
use crate::core::Mesh;
use nalgebra::Vector3;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

fn parse_err(line: usize, msg: impl Into<String>) -> LoadError {
    LoadError::Parse {
        line,
        msg: msg.into(),
    }
}

/// Resolve one `f` corner (e.g. `3`, `3/1`, `-1//2`) to a 0-based vertex index.
fn parse_corner(token: &str, num_verts: usize, line: usize) -> Result<usize, LoadError> {
    let idx_str = token.split('/').next().unwrap_or("");
    let idx: i64 = idx_str
        .parse()
        .map_err(|_| parse_err(line, format!("bad face index '{token}'")))?;
    let resolved = match idx {
        0 => return Err(parse_err(line, "face index 0 is not valid in OBJ")),
        i if i > 0 => i - 1,
        i => num_verts as i64 + i,
    };
    if resolved < 0 || resolved as usize >= num_verts {
        return Err(parse_err(
            line,
            format!("face index {idx} out of range for {num_verts} vertices"),
        ));
    }
    Ok(resolved as usize)
}

/// Parse OBJ text from any reader.
pub fn read_obj<R: BufRead>(reader: R) -> Result<Mesh, LoadError> {
    let mut verts = Vec::new();
    let mut faces = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let lineno = i + 1;
        let content = line.split('#').next().unwrap_or("").trim();
        let mut tokens = content.split_whitespace();
        match tokens.next() {
            Some("v") => {
                let coords: Vec<f32> = tokens
                    .take(3)
                    .map(|t| {
                        t.parse()
                            .map_err(|_| parse_err(lineno, format!("bad coordinate '{t}'")))
                    })
                    .collect::<Result<_, _>>()?;
                if coords.len() != 3 {
                    return Err(parse_err(lineno, "vertex needs three coordinates"));
                }
                verts.push(Vector3::new(coords[0], coords[1], coords[2]));
            }
            Some("f") => {
                let corners: Vec<usize> = tokens
                    .map(|t| parse_corner(t, verts.len(), lineno))
                    .collect::<Result<_, _>>()?;
                if corners.len() < 3 {
                    return Err(parse_err(lineno, "face needs at least three vertices"));
                }
                for j in 1..corners.len() - 1 {
                    faces.push([corners[0], corners[j], corners[j + 1]]);
                }
            }
            _ => {}
        }
    }

    let mesh = Mesh::new(verts, faces);
    mesh.validate(0)?;
    tracing::debug!(verts = mesh.verts.len(), faces = mesh.faces.len(), "parsed OBJ");
    Ok(mesh)
}

/// Load a triangle mesh from an OBJ file.
pub fn load_obj(path: &Path) -> Result<Mesh, LoadError> {
    let file = File::open(path)?;
    read_obj(BufReader::new(file))
}

/// Save a triangle mesh to an OBJ file.
pub fn save_obj(mesh: &Mesh, path: &Path) -> Result<(), LoadError> {
    mesh.validate(0)?;
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);

    writeln!(w, "# meshrast-rs")?;
    writeln!(w, "# {} vertices, {} faces", mesh.verts.len(), mesh.faces.len())?;
    for v in &mesh.verts {
        writeln!(w, "v {} {} {}", v.x, v.y, v.z)?;
    }
    for f in &mesh.faces {
        writeln!(w, "f {} {} {}", f[0] + 1, f[1] + 1, f[2] + 1)?;
    }
    w.flush()?;
    Ok(())
}
