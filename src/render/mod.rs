//! GPU half of the renderer: everything here talks to wgpu.

pub mod buffer;
pub mod renderer;
pub mod shader;
pub mod target;
pub mod texture;

pub use buffer::GeometryBuffer;
pub use renderer::Renderer;
pub use shader::ShaderProgram;
pub use target::RenderTarget;
pub use texture::GpuTexture;
