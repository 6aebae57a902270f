use std::collections::HashMap;
use std::num::NonZeroU64;

use glam::{Mat4, Vec3};
use log::{debug, info};

use crate::frame::DepthMode;
use crate::geometry::Topology;
use crate::program::{
    CompileError, ProgramKind, ProgramState, ShaderSources, FRAGMENT_ENTRY, VERTEX_ENTRY,
};
use crate::uniform::{align_to, UniformError, UniformValue};

use super::buffer::vertex_layout;
use super::target::DEPTH_FORMAT;

/// A compiled pair of shader stages and the pipelines built from them.
///
/// Uniform setters write into the CPU-side [`ProgramState`]; the renderer
/// copies the recorded blocks into GPU buffers when a frame is submitted.
pub struct ShaderProgram {
    state: ProgramState,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    target_format: wgpu::TextureFormat,
    pipelines: HashMap<(Topology, DepthMode), wgpu::RenderPipeline>,
    frame_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    object_layout: wgpu::BindGroupLayout,
    objects: ObjectUniforms,
}

impl ShaderProgram {
    /// Compiles both stages and links the default triangle pipeline. Any
    /// failure carries the validator's log.
    pub fn load(
        device: &wgpu::Device,
        kind: ProgramKind,
        sources: &ShaderSources,
        target_format: wgpu::TextureFormat,
        texture_layout: Option<&wgpu::BindGroupLayout>,
    ) -> Result<Self, CompileError> {
        let vertex = compile(device, &format!("{kind}-vertex"), &sources.vertex)
            .map_err(|log| CompileError::Vertex { log })?;
        let fragment = compile(device, &format!("{kind}-fragment"), &sources.fragment)
            .map_err(|log| CompileError::Fragment { log })?;

        let state = ProgramState::new(kind);
        let frame_size = state.frame().layout().size() as u64;
        let object_size = state.object().layout().size() as u64;

        let frame_layout = uniform_layout(device, &format!("{kind}-frame-layout"), frame_size, false);
        let object_layout =
            uniform_layout(device, &format!("{kind}-object-layout"), object_size, true);

        let mut bind_group_layouts = vec![&frame_layout, &object_layout];
        if kind.uses_texture() {
            let texture_layout = texture_layout.ok_or_else(|| CompileError::Link {
                log: format!("{kind} samples a texture but no texture layout was given"),
            })?;
            bind_group_layouts.push(texture_layout);
        }
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{kind}-pipeline-layout")),
            bind_group_layouts: &bind_group_layouts,
            push_constant_ranges: &[],
        });

        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{kind}-frame-uniforms")),
            size: frame_size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{kind}-frame-bind-group")),
            layout: &frame_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            }],
        });

        let stride = align_to(
            object_size as usize,
            device.limits().min_uniform_buffer_offset_alignment as usize,
        ) as u64;
        let objects = ObjectUniforms::new(device, kind, &object_layout, object_size, stride, 64);

        let mut program = Self {
            state,
            vertex,
            fragment,
            pipeline_layout,
            target_format,
            pipelines: HashMap::new(),
            frame_buffer,
            frame_bind_group,
            object_layout,
            objects,
        };
        program.prepare(device, Topology::Triangles, DepthMode::Test)?;
        info!("compiled {kind} program");
        Ok(program)
    }

    pub fn kind(&self) -> ProgramKind {
        self.state.kind()
    }

    pub fn state(&self) -> &ProgramState {
        &self.state
    }

    pub fn set_uniform(
        &mut self,
        name: &str,
        value: impl Into<UniformValue>,
    ) -> Result<(), UniformError> {
        self.state.set_uniform(name, value)
    }

    pub fn set_projection(&mut self, projection: Mat4) -> Result<(), UniformError> {
        self.state.set_projection(projection)
    }

    pub fn set_view(&mut self, view: Mat4) -> Result<(), UniformError> {
        self.state.set_view(view)
    }

    pub fn set_model(&mut self, model: Mat4) -> Result<(), UniformError> {
        self.state.set_model(model)
    }

    pub fn set_color(&mut self, color: Vec3) -> Result<(), UniformError> {
        self.state.set_color(color)
    }

    /// Builds the pipeline for `(topology, depth)` unless it already exists.
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        topology: Topology,
        depth: DepthMode,
    ) -> Result<(), CompileError> {
        if self.pipelines.contains_key(&(topology, depth)) {
            return Ok(());
        }
        let pipeline = self.build_pipeline(device, topology, depth)?;
        self.pipelines.insert((topology, depth), pipeline);
        Ok(())
    }

    pub fn pipeline(&self, topology: Topology, depth: DepthMode) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(&(topology, depth))
    }

    pub fn frame_bind_group(&self) -> &wgpu::BindGroup {
        &self.frame_bind_group
    }

    pub fn object_bind_group(&self) -> &wgpu::BindGroup {
        &self.objects.bind_group
    }

    /// Writes the frame block and packs `blocks` into the object buffer, one
    /// per aligned slot. Returns the dynamic offset of each block.
    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        frame: Option<&[u8]>,
        blocks: &[&[u8]],
    ) -> Vec<u32> {
        if let Some(frame) = frame {
            queue.write_buffer(&self.frame_buffer, 0, frame);
        }
        if blocks.is_empty() {
            return Vec::new();
        }
        if blocks.len() as u64 > self.objects.capacity {
            let capacity = (blocks.len() as u64).next_power_of_two();
            self.objects = ObjectUniforms::new(
                device,
                self.kind(),
                &self.object_layout,
                self.objects.size,
                self.objects.stride,
                capacity,
            );
        }

        let stride = self.objects.stride as usize;
        let mut packed = vec![0u8; stride * blocks.len()];
        let mut offsets = Vec::with_capacity(blocks.len());
        for (slot, block) in blocks.iter().enumerate() {
            let start = slot * stride;
            packed[start..start + block.len()].copy_from_slice(block);
            offsets.push(start as u32);
        }
        queue.write_buffer(&self.objects.buffer, 0, &packed);
        offsets
    }

    fn build_pipeline(
        &self,
        device: &wgpu::Device,
        topology: Topology,
        depth: DepthMode,
    ) -> Result<wgpu::RenderPipeline, CompileError> {
        let kind = self.kind();
        let (depth_write_enabled, depth_compare) = match depth {
            DepthMode::Test => (true, wgpu::CompareFunction::Less),
            DepthMode::Ignore => (false, wgpu::CompareFunction::Always),
        };
        let primitive_topology = match topology {
            Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
            Topology::Lines => wgpu::PrimitiveTopology::LineList,
        };
        let label = format!("{kind}-{topology:?}-{depth:?}").to_lowercase();

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&label),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.vertex,
                entry_point: Some(VERTEX_ENTRY),
                compilation_options: Default::default(),
                buffers: &[vertex_layout()],
            },
            primitive: wgpu::PrimitiveState {
                topology: primitive_topology,
                front_face: wgpu::FrontFace::Ccw,
                // mirrored scale steps flip the winding, so nothing is culled
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled,
                depth_compare,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &self.fragment,
                entry_point: Some(FRAGMENT_ENTRY),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.target_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(CompileError::Link {
                log: err.to_string(),
            });
        }
        debug!("built pipeline {label}");
        Ok(pipeline)
    }
}

/// Per-draw uniform storage addressed with dynamic offsets.
struct ObjectUniforms {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    size: u64,
    stride: u64,
    capacity: u64,
}

impl ObjectUniforms {
    fn new(
        device: &wgpu::Device,
        kind: ProgramKind,
        layout: &wgpu::BindGroupLayout,
        size: u64,
        stride: u64,
        capacity: u64,
    ) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{kind}-object-uniforms")),
            size: stride * capacity,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{kind}-object-bind-group")),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(size),
                }),
            }],
        });
        debug!("{kind} object uniforms sized for {capacity} draws");
        Self {
            buffer,
            bind_group,
            size,
            stride,
            capacity,
        }
    }
}

fn uniform_layout(
    device: &wgpu::Device,
    label: &str,
    size: u64,
    has_dynamic_offset: bool,
) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset,
                min_binding_size: NonZeroU64::new(size),
            },
            count: None,
        }],
    })
}

/// Compiles one stage, returning the validator's message on failure.
fn compile(device: &wgpu::Device, label: &str, source: &str) -> Result<wgpu::ShaderModule, String> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(err.to_string()),
        None => Ok(module),
    }
}
