use anyhow::{Context, Result};
use glam::Vec3;
use log::debug;
use winit::dpi::PhysicalSize;

pub(crate) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

/// The window surface and the depth attachment sized to match it.
pub struct RenderTarget {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    _depth_texture: wgpu::Texture,
    depth_view: wgpu::TextureView,
}

impl RenderTarget {
    pub fn new(
        surface: wgpu::Surface<'static>,
        adapter: &wgpu::Adapter,
        device: &wgpu::Device,
        size: PhysicalSize<u32>,
    ) -> Result<Self> {
        let caps = surface.get_capabilities(adapter);
        let format = pick_surface_format(&caps.formats)
            .context("surface reports no supported formats")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(device, &config);
        let (depth_texture, depth_view) = depth_attachment(device, config.width, config.height);
        debug!("surface configured as {format:?} at {}x{}", config.width, config.height);
        Ok(Self {
            surface,
            config,
            _depth_texture: depth_texture,
            depth_view,
        })
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        PhysicalSize::new(self.config.width, self.config.height)
    }

    /// Reconfigures the surface and rebuilds the depth attachment. Zero-sized
    /// requests, as sent while minimized, are ignored.
    pub fn resize(&mut self, device: &wgpu::Device, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.config.width = size.width;
        self.config.height = size.height;
        self.surface.configure(device, &self.config);
        let (texture, view) = depth_attachment(device, size.width, size.height);
        self._depth_texture = texture;
        self.depth_view = view;
        debug!("surface resized to {}x{}", size.width, size.height);
    }

    pub fn acquire(&self) -> Result<wgpu::SurfaceTexture, wgpu::SurfaceError> {
        self.surface.get_current_texture()
    }

    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth_view
    }
}

fn depth_attachment(
    device: &wgpu::Device,
    width: u32,
    height: u32,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("scene-depth"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

/// Scene colours are written as-is, so a format without the sRGB encode is
/// preferred. Falls back to the first format offered.
pub fn pick_surface_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    formats
        .iter()
        .find(|format| !format.is_srgb())
        .or_else(|| formats.first())
        .copied()
}

pub fn clear_color(color: Vec3) -> wgpu::Color {
    let color = color.as_dvec3();
    wgpu::Color {
        r: color.x,
        g: color.y,
        b: color.z,
        a: 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::TextureFormat;

    #[test]
    fn prefers_formats_without_srgb_encode() {
        let offered = [TextureFormat::Bgra8UnormSrgb, TextureFormat::Bgra8Unorm];
        assert_eq!(pick_surface_format(&offered), Some(TextureFormat::Bgra8Unorm));
    }

    #[test]
    fn falls_back_to_the_first_format() {
        let offered = [TextureFormat::Rgba8UnormSrgb, TextureFormat::Bgra8UnormSrgb];
        assert_eq!(pick_surface_format(&offered), Some(TextureFormat::Rgba8UnormSrgb));
        assert_eq!(pick_surface_format(&[]), None);
    }

    #[test]
    fn clear_color_is_opaque() {
        let color = clear_color(Vec3::new(0.0, 0.5, 1.0));
        assert_eq!((color.r, color.g, color.b, color.a), (0.0, 0.5, 1.0, 1.0));
    }
}
