//! CaribbeanGL: a small teaching renderer for a decorative island scene.
//!
//! Everything that decides *what* is drawn lives in plain Rust modules that
//! run without a GPU: scene parsing, the camera, animation, input, uniform
//! layout and the per-frame draw recording. The [`render`] module is the
//! only part that touches wgpu; it uploads assets and submits a recorded
//! frame.

pub mod animation;
pub mod app;
pub mod assets;
pub mod camera;
pub mod frame;
pub mod geometry;
pub mod input;
pub mod obj;
pub mod pacing;
pub mod program;
pub mod render;
pub mod scene;
pub mod texture;
pub mod uniform;

pub use animation::{Animations, Oscillator};
pub use app::{AppSettings, AppState, RenderMode, Viewport};
pub use assets::SceneAssets;
pub use camera::{Camera, CameraMovement, CameraSettings, LookDirection};
pub use frame::{DepthMode, DrawCall, FrameRecording, MeshCatalog, MeshId, TextureId};
pub use geometry::{DrawCommand, DrawSink, Geometry, GeometryError, Topology, VertexLayout};
pub use input::{Action, InputState, KeyBindings, KeyCode, NamedKey};
pub use obj::{load_obj_from_str, ModelError, ObjMesh};
pub use pacing::FramePacer;
pub use program::{CompileError, ProgramKind, ProgramState, ShaderSources};
pub use render::{GeometryBuffer, Renderer, ShaderProgram};
pub use scene::SceneDescription;
pub use texture::{TextureError, TextureImage};
pub use uniform::{UniformBlock, UniformError, UniformLayout, UniformType, UniformValue};
