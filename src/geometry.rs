use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Attribute layout of a flat, interleaved vertex array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VertexLayout {
    /// `position.xyz normal.xyz`
    PositionNormal,
    /// `position.xyz normal.xyz uv.xy`
    PositionNormalUv,
}

impl VertexLayout {
    /// Number of floats per vertex.
    pub const fn stride(self) -> usize {
        match self {
            Self::PositionNormal => 6,
            Self::PositionNormalUv => 8,
        }
    }
}

/// Primitive assembly for a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topology {
    Triangles,
    Lines,
}

impl Topology {
    pub const fn vertices_per_primitive(self) -> u32 {
        match self {
            Self::Triangles => 3,
            Self::Lines => 2,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("geometry has no vertices")]
    Empty,
    #[error("{len} floats is not a whole number of {stride}-float vertices")]
    Stride { len: usize, stride: usize },
    #[error("index {index} is out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
    #[error("{count} elements do not form whole {topology:?} primitives")]
    PartialPrimitive { count: usize, topology: Topology },
}

/// The draw a mesh issues each time it is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawCommand {
    Indexed { count: u32 },
    Vertices { count: u32 },
}

impl DrawCommand {
    pub fn element_count(self) -> u32 {
        match self {
            Self::Indexed { count } | Self::Vertices { count } => count,
        }
    }

    pub fn primitive_count(self, topology: Topology) -> u32 {
        self.element_count() / topology.vertices_per_primitive()
    }

    /// Issues the draw against whatever pipeline and bindings the sink holds.
    pub fn issue<S: DrawSink + ?Sized>(self, sink: &mut S) {
        match self {
            Self::Indexed { count } => sink.draw_indexed(0..count),
            Self::Vertices { count } => sink.draw(0..count),
        }
    }
}

/// Receiver of raw draw calls. Implemented by the GPU render pass and by
/// counters in tests.
pub trait DrawSink {
    fn draw_indexed(&mut self, indices: Range<u32>);
    fn draw(&mut self, vertices: Range<u32>);
}

/// Canonical GPU vertex. Every layout is widened to this before upload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// CPU-side mesh data: validated vertex attributes plus optional indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    layout: VertexLayout,
    topology: Topology,
    vertices: Vec<f32>,
    indices: Option<Vec<u32>>,
}

impl Geometry {
    /// Builds a triangle mesh.
    pub fn new(
        layout: VertexLayout,
        vertices: Vec<f32>,
        indices: Option<Vec<u32>>,
    ) -> Result<Self, GeometryError> {
        Self::with_topology(layout, Topology::Triangles, vertices, indices)
    }

    pub fn with_topology(
        layout: VertexLayout,
        topology: Topology,
        vertices: Vec<f32>,
        indices: Option<Vec<u32>>,
    ) -> Result<Self, GeometryError> {
        if vertices.is_empty() {
            return Err(GeometryError::Empty);
        }
        let stride = layout.stride();
        if vertices.len() % stride != 0 {
            return Err(GeometryError::Stride {
                len: vertices.len(),
                stride,
            });
        }
        let vertex_count = vertices.len() / stride;
        let elements = match &indices {
            Some(indices) => {
                if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertex_count) {
                    return Err(GeometryError::IndexOutOfRange {
                        index,
                        vertex_count,
                    });
                }
                indices.len()
            }
            None => vertex_count,
        };
        if elements == 0 || elements % topology.vertices_per_primitive() as usize != 0 {
            return Err(GeometryError::PartialPrimitive {
                count: elements,
                topology,
            });
        }
        Ok(Self {
            layout,
            topology,
            vertices,
            indices,
        })
    }

    pub fn layout(&self) -> VertexLayout {
        self.layout
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / self.layout.stride()
    }

    pub fn indices(&self) -> Option<&[u32]> {
        self.indices.as_deref()
    }

    pub fn draw_command(&self) -> DrawCommand {
        match &self.indices {
            Some(indices) => DrawCommand::Indexed {
                count: indices.len() as u32,
            },
            None => DrawCommand::Vertices {
                count: self.vertex_count() as u32,
            },
        }
    }

    pub fn primitive_count(&self) -> u32 {
        self.draw_command().primitive_count(self.topology)
    }

    /// Widens the attribute array into the canonical [`Vertex`] format.
    pub fn to_vertices(&self) -> Vec<Vertex> {
        self.vertices
            .chunks_exact(self.layout.stride())
            .map(|chunk| Vertex {
                position: [chunk[0], chunk[1], chunk[2]],
                normal: [chunk[3], chunk[4], chunk[5]],
                uv: match self.layout {
                    VertexLayout::PositionNormal => [0.0, 0.0],
                    VertexLayout::PositionNormalUv => [chunk[6], chunk[7]],
                },
            })
            .collect()
    }

    /// Axis-aligned cube with per-face normals and texture coordinates
    /// (24 vertices, 36 indices).
    pub fn cube(half_extent: f32) -> Self {
        const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            // normal, u axis, v axis (u x v == normal)
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ];
        const CORNERS: [(f32, f32, [f32; 2]); 4] = [
            (-1.0, -1.0, [0.0, 1.0]),
            (1.0, -1.0, [1.0, 1.0]),
            (1.0, 1.0, [1.0, 0.0]),
            (-1.0, 1.0, [0.0, 0.0]),
        ];

        let mut vertices = Vec::with_capacity(24 * 8);
        let mut indices = Vec::with_capacity(36);
        for (face, (normal, u, v)) in FACES.iter().enumerate() {
            let (normal, u, v) = (Vec3::from(*normal), Vec3::from(*u), Vec3::from(*v));
            for (su, sv, uv) in CORNERS {
                let p = (normal + u * su + v * sv) * half_extent;
                vertices.extend_from_slice(&[p.x, p.y, p.z, normal.x, normal.y, normal.z]);
                vertices.extend_from_slice(&uv);
            }
            let base = face as u32 * 4;
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self {
            layout: VertexLayout::PositionNormalUv,
            topology: Topology::Triangles,
            vertices,
            indices: Some(indices),
        }
    }

    /// Eight shared corners with zero normals (36 indices). Enough for the
    /// flat program, which ignores normals.
    pub fn corner_cube(half_extent: f32) -> Self {
        let h = half_extent;
        #[rustfmt::skip]
        let vertices = vec![
            -h, -h, -h,   0.0, 0.0, 0.0,
             h, -h, -h,   0.0, 0.0, 0.0,
            -h, -h,  h,   0.0, 0.0, 0.0,
             h, -h,  h,   0.0, 0.0, 0.0,
            -h,  h, -h,   0.0, 0.0, 0.0,
             h,  h, -h,   0.0, 0.0, 0.0,
            -h,  h,  h,   0.0, 0.0, 0.0,
             h,  h,  h,   0.0, 0.0, 0.0,
        ];
        #[rustfmt::skip]
        let indices = vec![
            0, 1, 3,   0, 3, 2,
            4, 6, 7,   5, 4, 7,
            3, 6, 2,   6, 3, 7,
            0, 4, 1,   1, 4, 5,
            6, 0, 2,   4, 0, 6,
            3, 1, 7,   7, 1, 5,
        ];
        Self {
            layout: VertexLayout::PositionNormal,
            topology: Topology::Triangles,
            vertices,
            indices: Some(indices),
        }
    }

    /// A single line segment from the origin to +X. Debug overlays place it
    /// with a model matrix.
    pub fn unit_line() -> Self {
        Self {
            layout: VertexLayout::PositionNormal,
            topology: Topology::Lines,
            vertices: vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            indices: None,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Counts what a mesh would submit.
    #[derive(Default)]
    pub(crate) struct CountingSink {
        pub calls: usize,
        pub elements: u32,
    }

    impl DrawSink for CountingSink {
        fn draw_indexed(&mut self, indices: Range<u32>) {
            self.calls += 1;
            self.elements += indices.len() as u32;
        }

        fn draw(&mut self, vertices: Range<u32>) {
            self.calls += 1;
            self.elements += vertices.len() as u32;
        }
    }

    #[test]
    fn corner_cube_issues_twelve_triangles() {
        let cube = Geometry::corner_cube(0.2);
        assert_eq!(cube.vertex_count(), 8);
        let mut sink = CountingSink::default();
        cube.draw_command().issue(&mut sink);
        assert_eq!(sink.calls, 1);
        assert_eq!(sink.elements / 3, 12);
        assert_eq!(cube.primitive_count(), 12);
    }

    #[test]
    fn non_indexed_draw_uses_vertex_count() {
        let vertices: Vec<f32> = (0..9 * 6).map(|i| i as f32).collect();
        let geometry = Geometry::new(VertexLayout::PositionNormal, vertices, None).unwrap();
        assert_eq!(geometry.draw_command(), DrawCommand::Vertices { count: 9 });
        assert_eq!(geometry.primitive_count(), 3);
    }

    #[test]
    fn rejects_ragged_vertex_data() {
        let err = Geometry::new(VertexLayout::PositionNormalUv, vec![0.0; 10], None).unwrap_err();
        assert_eq!(err, GeometryError::Stride { len: 10, stride: 8 });
    }

    #[test]
    fn rejects_out_of_range_indices() {
        let err = Geometry::new(
            VertexLayout::PositionNormal,
            vec![0.0; 18],
            Some(vec![0, 1, 3]),
        )
        .unwrap_err();
        assert_eq!(
            err,
            GeometryError::IndexOutOfRange {
                index: 3,
                vertex_count: 3
            }
        );
    }

    #[test]
    fn lit_cube_faces_point_outward() {
        let cube = Geometry::cube(0.5);
        assert_eq!(cube.vertex_count(), 24);
        let vertices = cube.to_vertices();
        let indices = cube.indices().unwrap();
        for triangle in indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|i| Vec3::from(vertices[triangle[i] as usize].position));
            let winding_normal = (b - a).cross(c - a).normalize();
            let normal = Vec3::from(vertices[triangle[0] as usize].normal);
            assert!(winding_normal.dot(normal) > 0.99);
        }
    }

    #[test]
    fn unit_line_is_one_segment() {
        let line = Geometry::unit_line();
        assert_eq!(line.topology(), Topology::Lines);
        assert_eq!(line.primitive_count(), 1);
    }
}
