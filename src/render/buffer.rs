use std::ops::Range;

use log::debug;
use wgpu::util::DeviceExt;

use crate::geometry::{DrawCommand, DrawSink, Geometry, Topology, Vertex};

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

/// Buffer layout matching [`Vertex`]: position, normal, uv.
pub fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &VERTEX_ATTRIBUTES,
    }
}

impl DrawSink for wgpu::RenderPass<'_> {
    fn draw_indexed(&mut self, indices: Range<u32>) {
        wgpu::RenderPass::draw_indexed(self, indices, 0, 0..1);
    }

    fn draw(&mut self, vertices: Range<u32>) {
        wgpu::RenderPass::draw(self, vertices, 0..1);
    }
}

/// GPU copy of a static mesh.
///
/// Owns its vertex buffer and, for indexed meshes, its index buffer. Both are
/// destroyed when the value is dropped; the type is deliberately not `Clone`.
pub struct GeometryBuffer {
    label: String,
    vertex: wgpu::Buffer,
    index: Option<wgpu::Buffer>,
    topology: Topology,
    command: DrawCommand,
}

impl GeometryBuffer {
    pub fn new(device: &wgpu::Device, label: &str, geometry: &Geometry) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&geometry.to_vertices()),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = geometry.indices().map(|indices| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}-indices")),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            })
        });
        debug!(
            "uploaded geometry {label}: {} vertices, {} indices",
            geometry.vertex_count(),
            geometry.indices().map_or(0, <[u32]>::len)
        );
        Self {
            label: label.to_string(),
            vertex,
            index,
            topology: geometry.topology(),
            command: geometry.draw_command(),
        }
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn command(&self) -> DrawCommand {
        self.command
    }

    /// Binds the buffers and issues one draw with whatever pipeline and bind
    /// groups the pass currently holds.
    pub fn render(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex.slice(..));
        if let Some(index) = &self.index {
            pass.set_index_buffer(index.slice(..), wgpu::IndexFormat::Uint32);
        }
        self.command.issue(pass);
    }
}

impl Drop for GeometryBuffer {
    fn drop(&mut self) {
        self.vertex.destroy();
        if let Some(index) = &self.index {
            index.destroy();
        }
        debug!("released geometry {}", self.label);
    }
}
