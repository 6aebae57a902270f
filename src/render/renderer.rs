use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use crate::assets::SceneAssets;
use crate::frame::FrameRecording;
use crate::program::{CompileError, ProgramKind};
use crate::texture::TextureImage;

use super::buffer::GeometryBuffer;
use super::shader::ShaderProgram;
use super::target::{clear_color, RenderTarget};
use super::texture::{self, GpuTexture};

/// GPU renderer backed by wgpu that submits recorded frames.
pub struct Renderer {
    window: Arc<Window>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    target: RenderTarget,
    flat: ShaderProgram,
    phong: ShaderProgram,
    meshes: Vec<GeometryBuffer>,
    textures: Vec<GpuTexture>,
    fallback_texture: GpuTexture,
}

impl Renderer {
    /// Initializes the GPU context for `window` and uploads every asset the
    /// scene uses.
    pub async fn new(window: Arc<Window>, assets: &SceneAssets) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });
        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;
        info!("using adapter {}", adapter.get_info().name);

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("caribbean-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .context("failed to create GPU device")?;

        let target = RenderTarget::new(surface, &adapter, &device, size)?;
        let surface_format = target.format();

        let texture_layout = texture::bind_group_layout(&device);
        let flat = load_program(&device, assets, ProgramKind::Flat, surface_format, None)?;
        let phong = load_program(
            &device,
            assets,
            ProgramKind::Phong,
            surface_format,
            Some(&texture_layout),
        )?;

        let meshes = assets
            .meshes
            .iter()
            .map(|(name, geometry)| GeometryBuffer::new(&device, name, geometry))
            .collect();
        let textures = assets
            .textures
            .iter()
            .map(|(name, image)| {
                GpuTexture::upload(&device, &queue, &texture_layout, image, name)
                    .with_context(|| format!("failed to upload texture `{name}`"))
            })
            .collect::<Result<Vec<_>>>()?;
        let fallback_texture = GpuTexture::upload(
            &device,
            &queue,
            &texture_layout,
            &TextureImage::white(),
            "fallback-white",
        )?;

        Ok(Self {
            window,
            device,
            queue,
            target,
            flat,
            phong,
            meshes,
            textures,
            fallback_texture,
        })
    }

    /// Returns the identifier of the window owned by the renderer.
    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.target.size()
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.target.resize(&self.device, new_size);
    }

    /// Reconfigures the surface at its current size after it was lost.
    pub fn reconfigure(&mut self) {
        let size = self.target.size();
        self.target.resize(&self.device, size);
    }

    /// Builds any pipeline the recording needs that does not exist yet.
    pub fn prepare(&mut self, recording: &FrameRecording) -> Result<(), CompileError> {
        for draw in recording.draws() {
            let program = match draw.program {
                ProgramKind::Flat => &mut self.flat,
                ProgramKind::Phong => &mut self.phong,
            };
            program.prepare(&self.device, draw.topology, draw.depth)?;
        }
        Ok(())
    }

    /// Clears the frame and submits every recorded draw in order.
    pub fn render(&mut self, recording: &FrameRecording) -> Result<(), wgpu::SurfaceError> {
        let offsets = self.upload_uniforms(recording);

        let output = self.target.acquire()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("scene-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear_color(recording.clear_color)),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: self.target.depth_view(),
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for (draw, offset) in recording.draws().iter().zip(&offsets) {
            let program = self.program(draw.program);
            let Some(pipeline) = program.pipeline(draw.topology, draw.depth) else {
                warn!("no pipeline prepared for {}, skipping", draw.label);
                continue;
            };
            let Some(mesh) = self.meshes.get(draw.mesh.0) else {
                warn!("unknown mesh {:?} for {}, skipping", draw.mesh, draw.label);
                continue;
            };
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, program.frame_bind_group(), &[]);
            pass.set_bind_group(1, program.object_bind_group(), &[*offset]);
            if draw.program.uses_texture() {
                let texture = draw
                    .texture
                    .and_then(|id| self.textures.get(id.0))
                    .unwrap_or(&self.fallback_texture);
                pass.set_bind_group(2, texture.bind_group(), &[]);
            }
            mesh.render(&mut pass);
        }

        drop(pass);
        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    fn program(&self, kind: ProgramKind) -> &ShaderProgram {
        match kind {
            ProgramKind::Flat => &self.flat,
            ProgramKind::Phong => &self.phong,
        }
    }

    /// Writes frame blocks and packs each program's object blocks, returning
    /// the dynamic offset of every draw in recording order.
    fn upload_uniforms(&mut self, recording: &FrameRecording) -> Vec<u32> {
        let draws = recording.draws();
        let mut offsets = vec![0; draws.len()];
        for kind in ProgramKind::ALL {
            let (slots, blocks): (Vec<usize>, Vec<&[u8]>) = draws
                .iter()
                .enumerate()
                .filter(|(_, draw)| draw.program == kind)
                .map(|(slot, draw)| (slot, draw.object_uniforms.as_slice()))
                .unzip();
            let program = match kind {
                ProgramKind::Flat => &mut self.flat,
                ProgramKind::Phong => &mut self.phong,
            };
            let uploaded = program.upload(
                &self.device,
                &self.queue,
                recording.frame_uniforms(kind),
                &blocks,
            );
            for (slot, offset) in slots.into_iter().zip(uploaded) {
                offsets[slot] = offset;
            }
        }
        offsets
    }
}

fn load_program(
    device: &wgpu::Device,
    assets: &SceneAssets,
    kind: ProgramKind,
    format: wgpu::TextureFormat,
    texture_layout: Option<&wgpu::BindGroupLayout>,
) -> Result<ShaderProgram> {
    let sources = assets
        .shader(kind)
        .with_context(|| format!("no sources loaded for the {kind} program"))?;
    ShaderProgram::load(device, kind, sources, format, texture_layout)
        .with_context(|| format!("failed to build the {kind} program"))
}
