use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use glam::{Vec2, Vec3};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{Geometry, GeometryError, VertexLayout};

/// Floats per vertex in [`ObjMesh::vertices`].
const STRIDE: usize = 8;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unable to read model {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("line {line}: index {index} does not refer to one of the {len} declared {kind}")]
    Index {
        line: usize,
        index: i64,
        len: usize,
        kind: &'static str,
    },
    #[error("model does not define any vertex positions")]
    NoPositions,
    #[error("model does not define any faces")]
    NoFaces,
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// GPU ready mesh buffers produced from an OBJ file.
///
/// Vertices are interleaved as `position.xyz normal.xyz uv.xy`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjMesh {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
    /// Number of `v` lines in the source.
    pub position_count: usize,
}

impl ObjMesh {
    /// Reads and parses a model file. Any failure here is meant to abort
    /// startup.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mesh = load_obj_from_str(&data)?;
        debug!(
            "parsed {}: {} vertices, {} triangles",
            path.display(),
            mesh.vertex_count(),
            mesh.triangle_count()
        );
        Ok(mesh)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / STRIDE
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn into_geometry(self) -> Result<Geometry, ModelError> {
        Ok(Geometry::new(
            VertexLayout::PositionNormalUv,
            self.vertices,
            Some(self.indices),
        )?)
    }
}

/// Parses an OBJ file from memory and returns interleaved vertex/index arrays.
pub fn load_obj_from_str(data: &str) -> Result<ObjMesh, ModelError> {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut texcoords = Vec::new();
    let mut faces: Vec<[FaceIndex; 3]> = Vec::new();

    for (line_no, line) in data.lines().enumerate() {
        let line_no = line_no + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        match tag {
            "v" => positions.push(parse_vec3(parts, line_no)?),
            "vn" => normals.push(parse_vec3(parts, line_no)?),
            "vt" => texcoords.push(parse_vec2(parts, line_no)?),
            "f" => {
                let polygon = parse_face(parts, line_no)?;
                triangulate_face(&polygon, &mut faces);
            }
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(ModelError::NoPositions);
    }
    if faces.is_empty() {
        return Err(ModelError::NoFaces);
    }

    let sources = Sources {
        positions: &positions,
        normals: &normals,
        texcoords: &texcoords,
    };
    let mut mesh = build_mesh(&sources, &faces)?;
    fill_missing_normals(&mut mesh);
    Ok(mesh)
}

fn parse_floats<'a, const N: usize>(
    mut parts: impl Iterator<Item = &'a str>,
    line: usize,
) -> Result<[f32; N], ModelError> {
    let mut out = [0.0; N];
    for slot in &mut out {
        let text = parts.next().ok_or_else(|| ModelError::Syntax {
            line,
            message: "missing vector component".into(),
        })?;
        *slot = text.parse::<f32>().map_err(|err| ModelError::Syntax {
            line,
            message: format!("invalid number `{text}`: {err}"),
        })?;
    }
    Ok(out)
}

fn parse_vec3<'a>(parts: impl Iterator<Item = &'a str>, line: usize) -> Result<Vec3, ModelError> {
    parse_floats::<3>(parts, line).map(Vec3::from)
}

fn parse_vec2<'a>(parts: impl Iterator<Item = &'a str>, line: usize) -> Result<Vec2, ModelError> {
    parse_floats::<2>(parts, line).map(Vec2::from)
}

fn parse_face<'a>(
    parts: impl Iterator<Item = &'a str>,
    line: usize,
) -> Result<Vec<FaceIndex>, ModelError> {
    let mut indices = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let v = parse_index(segments.next(), line)?.ok_or_else(|| ModelError::Syntax {
            line,
            message: format!("missing vertex index in `{part}`"),
        })?;
        let vt = parse_index(segments.next(), line)?;
        let vn = parse_index(segments.next(), line)?;
        indices.push(FaceIndex { line, v, vt, vn });
    }
    if indices.len() < 3 {
        return Err(ModelError::Syntax {
            line,
            message: "faces must reference at least 3 vertices".into(),
        });
    }
    Ok(indices)
}

fn parse_index(segment: Option<&str>, line: usize) -> Result<Option<i64>, ModelError> {
    match segment {
        None | Some("") => Ok(None),
        Some(text) => text
            .parse::<i64>()
            .map(Some)
            .map_err(|err| ModelError::Syntax {
                line,
                message: format!("invalid index `{text}`: {err}"),
            }),
    }
}

fn triangulate_face(polygon: &[FaceIndex], faces: &mut Vec<[FaceIndex; 3]>) {
    if polygon.len() < 3 {
        return;
    }
    for i in 1..(polygon.len() - 1) {
        faces.push([polygon[0], polygon[i], polygon[i + 1]]);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
    position: usize,
    texcoord: Option<usize>,
    normal: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct FaceIndex {
    line: usize,
    v: i64,
    vt: Option<i64>,
    vn: Option<i64>,
}

struct Sources<'a> {
    positions: &'a [Vec3],
    normals: &'a [Vec3],
    texcoords: &'a [Vec2],
}

fn build_mesh(sources: &Sources<'_>, faces: &[[FaceIndex; 3]]) -> Result<ObjMesh, ModelError> {
    let mut lookup: HashMap<Key, u32> = HashMap::new();
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for face in faces {
        for idx in face {
            let key = Key {
                position: resolve(idx.v, sources.positions.len(), idx.line, "positions")?,
                texcoord: idx
                    .vt
                    .map(|vt| resolve(vt, sources.texcoords.len(), idx.line, "texture coordinates"))
                    .transpose()?,
                normal: idx
                    .vn
                    .map(|vn| resolve(vn, sources.normals.len(), idx.line, "normals"))
                    .transpose()?,
            };
            let next_index = (vertices.len() / STRIDE) as u32;
            let entry = lookup.entry(key).or_insert_with(|| {
                let position = sources.positions[key.position];
                let normal = key.normal.map(|i| sources.normals[i]).unwrap_or(Vec3::ZERO);
                let uv = key.texcoord.map(|i| sources.texcoords[i]).unwrap_or(Vec2::ZERO);
                vertices.extend_from_slice(&[position.x, position.y, position.z]);
                vertices.extend_from_slice(&[normal.x, normal.y, normal.z]);
                // OBJ puts v=0 at the bottom of the image
                vertices.extend_from_slice(&[uv.x, 1.0 - uv.y]);
                next_index
            });
            indices.push(*entry);
        }
    }

    Ok(ObjMesh {
        vertices,
        indices,
        position_count: sources.positions.len(),
    })
}

fn resolve(index: i64, len: usize, line: usize, kind: &'static str) -> Result<usize, ModelError> {
    fix_index(index, len).ok_or(ModelError::Index {
        line,
        index,
        len,
        kind,
    })
}

fn fix_index(index: i64, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = index as usize - 1;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let abs = index.unsigned_abs() as usize;
        (abs <= len).then_some(len - abs)
    } else {
        None
    }
}

fn lacks_normal(vertex: &[f32]) -> bool {
    vertex[3] == 0.0 && vertex[4] == 0.0 && vertex[5] == 0.0
}

/// Gives every vertex without a file normal the average of its adjacent
/// face normals. Normals read from the file are kept.
fn fill_missing_normals(mesh: &mut ObjMesh) {
    let missing: Vec<bool> = mesh.vertices.chunks_exact(STRIDE).map(lacks_normal).collect();
    if !missing.contains(&true) {
        return;
    }
    let vertex_count = missing.len();
    let mut accum = vec![Vec3::ZERO; vertex_count];
    let position = |vertices: &[f32], i: usize| Vec3::from_slice(&vertices[i * STRIDE..i * STRIDE + 3]);

    for triangle in mesh.indices.chunks_exact(3) {
        let [i0, i1, i2] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        let p0 = position(&mesh.vertices, i0);
        let p1 = position(&mesh.vertices, i1);
        let p2 = position(&mesh.vertices, i2);
        let normal = (p1 - p0).cross(p2 - p0);
        if normal.length_squared() > f32::EPSILON {
            let normal = normal.normalize();
            accum[i0] += normal;
            accum[i1] += normal;
            accum[i2] += normal;
        }
    }

    for (i, normal) in accum.into_iter().enumerate() {
        if !missing[i] {
            continue;
        }
        let normal = normal.normalize_or_zero();
        mesh.vertices[i * STRIDE + 3..i * STRIDE + 6].copy_from_slice(&normal.to_array());
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::geometry::tests::CountingSink;

    #[test]
    fn parses_simple_triangle() {
        let obj = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.vertices.len(), 3 * STRIDE);
    }

    #[test]
    fn computes_missing_normals() {
        let obj = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let mesh = load_obj_from_str(obj).unwrap();
        for chunk in mesh.vertices.chunks_exact(STRIDE) {
            let normal = Vec3::new(chunk[3], chunk[4], chunk[5]);
            assert!((normal.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn file_normals_survive_when_others_are_computed() {
        let obj = "\
v 0 0 0
v 1 0 0
v 0 1 0
v 1 1 0
vn 1 0 0
f 1//1 2//1 3//1
f 2 4 3
";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.vertex_count(), 6);
        let normals: Vec<[f32; 3]> = mesh
            .vertices
            .chunks_exact(STRIDE)
            .map(|chunk| [chunk[3], chunk[4], chunk[5]])
            .collect();
        assert_eq!(&normals[..3], &[[1.0, 0.0, 0.0]; 3]);
        for normal in &normals[3..] {
            assert!((Vec3::from_array(*normal) - Vec3::Z).length() < 1e-5);
        }
    }

    #[test]
    fn positions_and_faces_map_to_vertices_and_triples() {
        let obj = "\
# a quad split into two triangles
o quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
s off
usemtl none
f 1 2 3
f 1 3 4
";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.position_count, 4);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn quads_are_fan_triangulated() {
        let obj = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn maps_texcoords_and_normals() {
        let obj = "\
v 0 0 0
v 1 0 0
v 0 1 0
vt 0 0
vt 1 0
vt 0 1
vn 0 0 1
f 1/1/1 2/2/1 3/3/1
";
        let mesh = load_obj_from_str(obj).unwrap();
        let second = &mesh.vertices[STRIDE..2 * STRIDE];
        assert_eq!(&second[3..6], &[0.0, 0.0, 1.0]);
        assert_eq!(&second[6..8], &[1.0, 1.0]);
    }

    #[test]
    fn negative_indices_are_relative() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn file_without_faces_fails() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\n";
        assert!(matches!(load_obj_from_str(obj), Err(ModelError::NoFaces)));
    }

    #[test]
    fn out_of_range_index_reports_line() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 9\n";
        match load_obj_from_str(obj) {
            Err(ModelError::Index { line, index, .. }) => {
                assert_eq!(line, 4);
                assert_eq!(index, 9);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ObjMesh::load(dir.path().join("absent.obj"));
        assert!(matches!(result, Err(ModelError::Io { .. })));
    }

    #[test]
    fn loaded_model_renders_like_geometry() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "v 0 0 0\nv 1 0 0\nv 0 1 0\nv 1 1 0\nf 1 2 3\nf 2 4 3").unwrap();
        let geometry = ObjMesh::load(file.path()).unwrap().into_geometry().unwrap();
        let mut sink = CountingSink::default();
        geometry.draw_command().issue(&mut sink);
        assert_eq!(sink.elements / 3, 2);
    }
}
