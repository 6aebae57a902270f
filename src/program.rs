use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::{Mat3, Mat4, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::uniform::{UniformBlock, UniformError, UniformLayout, UniformType, UniformValue};

/// The two shader programs the renderer knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProgramKind {
    /// Per-draw flat colour.
    Flat,
    /// Material colour lit by a directional sun and one point light, with an
    /// optional diffuse texture.
    Phong,
}

impl ProgramKind {
    pub const ALL: [ProgramKind; 2] = [ProgramKind::Flat, ProgramKind::Phong];

    /// File stem of the program's stage sources.
    pub fn name(self) -> &'static str {
        match self {
            ProgramKind::Flat => "flat",
            ProgramKind::Phong => "phong",
        }
    }

    pub fn uses_texture(self) -> bool {
        matches!(self, ProgramKind::Phong)
    }

    /// Members of the `Frame` uniform struct at `@group(0)`.
    pub fn frame_layout(self) -> UniformLayout {
        use UniformType::*;
        match self {
            ProgramKind::Flat => {
                UniformLayout::new("flat.frame", &[("projection", Mat4), ("view", Mat4)])
            }
            ProgramKind::Phong => UniformLayout::new(
                "phong.frame",
                &[
                    ("projection", Mat4),
                    ("view", Mat4),
                    ("view_position", Vec3),
                    ("sun_direction", Vec3),
                    ("sun_color", Vec3),
                    ("sun_ambient", F32),
                    ("sun_diffuse", F32),
                    ("sun_specular", F32),
                    ("point_position", Vec3),
                    ("point_color", Vec3),
                    ("point_intensity", F32),
                ],
            ),
        }
    }

    /// Members of the `Object` uniform struct at `@group(1)`.
    pub fn object_layout(self) -> UniformLayout {
        use UniformType::*;
        match self {
            ProgramKind::Flat => {
                UniformLayout::new("flat.object", &[("model", Mat4), ("color", Vec3)])
            }
            ProgramKind::Phong => UniformLayout::new(
                "phong.object",
                &[
                    ("model", Mat4),
                    ("normal_matrix", Mat3),
                    ("color", Vec3),
                    ("shininess", F32),
                    ("specular_strength", F32),
                    ("use_texture", U32),
                ],
            ),
        }
    }
}

/// Entry point every vertex stage must define.
pub const VERTEX_ENTRY: &str = "vs_main";
/// Entry point every fragment stage must define.
pub const FRAGMENT_ENTRY: &str = "fs_main";

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("unable to read shader source {}", .path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("vertex stage failed to compile:\n{log}")]
    Vertex { log: String },
    #[error("fragment stage failed to compile:\n{log}")]
    Fragment { log: String },
    #[error("program failed to link:\n{log}")]
    Link { log: String },
}

/// WGSL text of both stages of one program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSources {
    pub vertex: String,
    pub fragment: String,
}

impl ShaderSources {
    /// Reads `<dir>/<name>.vert.wgsl` and `<dir>/<name>.frag.wgsl`.
    pub fn load(dir: &Path, kind: ProgramKind) -> Result<Self, CompileError> {
        let read = |stage: &str| {
            let path = dir.join(format!("{}.{stage}.wgsl", kind.name()));
            fs::read_to_string(&path).map_err(|source| CompileError::Source { path, source })
        };
        Self::new(read("vert")?, read("frag")?)
    }

    /// Rejects stages that do not define their entry point.
    pub fn new(vertex: String, fragment: String) -> Result<Self, CompileError> {
        if !defines_entry(&vertex, VERTEX_ENTRY) {
            return Err(CompileError::Vertex {
                log: format!("entry point `{VERTEX_ENTRY}` not found"),
            });
        }
        if !defines_entry(&fragment, FRAGMENT_ENTRY) {
            return Err(CompileError::Fragment {
                log: format!("entry point `{FRAGMENT_ENTRY}` not found"),
            });
        }
        Ok(Self { vertex, fragment })
    }
}

fn defines_entry(source: &str, entry: &str) -> bool {
    source.lines().any(|line| {
        line.split("//")
            .next()
            .and_then(|code| code.split_once("fn "))
            .is_some_and(|(_, rest)| {
                rest.trim_start()
                    .strip_prefix(entry)
                    .is_some_and(|tail| tail.trim_start().starts_with('('))
            })
    })
}

impl std::fmt::Display for ProgramKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Current uniform values of one program.
///
/// Setters look a name up in the per-object block first and fall back to the
/// per-frame block. The object block is snapshotted into every recorded draw,
/// so later writes never affect draws already recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramState {
    kind: ProgramKind,
    frame: UniformBlock,
    object: UniformBlock,
}

impl ProgramState {
    pub fn new(kind: ProgramKind) -> Self {
        Self {
            kind,
            frame: UniformBlock::new(Arc::new(kind.frame_layout())),
            object: UniformBlock::new(Arc::new(kind.object_layout())),
        }
    }

    pub fn kind(&self) -> ProgramKind {
        self.kind
    }

    pub fn frame(&self) -> &UniformBlock {
        &self.frame
    }

    pub fn object(&self) -> &UniformBlock {
        &self.object
    }

    pub fn set_uniform(
        &mut self,
        name: &str,
        value: impl Into<UniformValue>,
    ) -> Result<(), UniformError> {
        if self.object.contains(name) {
            self.object.set(name, value)
        } else {
            self.frame.set(name, value)
        }
    }

    pub fn set_projection(&mut self, projection: Mat4) -> Result<(), UniformError> {
        self.set_uniform("projection", projection)
    }

    pub fn set_view(&mut self, view: Mat4) -> Result<(), UniformError> {
        self.set_uniform("view", view)
    }

    /// Sets the model matrix, and the normal matrix when the program has one.
    pub fn set_model(&mut self, model: Mat4) -> Result<(), UniformError> {
        self.set_uniform("model", model)?;
        if self.object.contains("normal_matrix") {
            let normal = Mat3::from_mat4(model).inverse().transpose();
            let normal = if normal.is_finite() { normal } else { Mat3::IDENTITY };
            self.set_uniform("normal_matrix", normal)?;
        }
        Ok(())
    }

    pub fn set_color(&mut self, color: Vec3) -> Result<(), UniformError> {
        self.set_uniform("color", color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phong_layouts_match_shader_structs() {
        let frame = ProgramKind::Phong.frame_layout();
        let offsets: Vec<_> = frame.fields().iter().map(|f| f.offset).collect();
        assert_eq!(
            offsets,
            vec![0, 64, 128, 144, 160, 172, 176, 180, 192, 208, 220]
        );
        assert_eq!(frame.size(), 224);
        assert_eq!(ProgramKind::Phong.object_layout().size(), 144);
        assert_eq!(ProgramKind::Flat.frame_layout().size(), 128);
        assert_eq!(ProgramKind::Flat.object_layout().size(), 80);
    }

    #[test]
    fn set_uniform_routes_to_the_owning_block() {
        let mut state = ProgramState::new(ProgramKind::Flat);
        state.set_color(Vec3::new(0.2, 0.4, 0.6)).unwrap();
        state.set_view(Mat4::from_translation(Vec3::X)).unwrap();
        assert_eq!(state.object().get_floats("color").unwrap(), vec![0.2, 0.4, 0.6]);
        assert_eq!(state.frame().get_floats("view").unwrap()[12], 1.0);
    }

    #[test]
    fn flat_program_rejects_lighting_uniforms() {
        let mut state = ProgramState::new(ProgramKind::Flat);
        assert!(matches!(
            state.set_uniform("sun_ambient", 0.2),
            Err(UniformError::Unknown { .. })
        ));
    }

    #[test]
    fn set_model_updates_normal_matrix() {
        let mut state = ProgramState::new(ProgramKind::Phong);
        state
            .set_model(Mat4::from_scale(Vec3::new(2.0, 4.0, 1.0)))
            .unwrap();
        let normal = state.object().get_floats("normal_matrix").unwrap();
        assert!((normal[0] - 0.5).abs() < 1e-6);
        assert!((normal[5] - 0.25).abs() < 1e-6);
        assert!((normal[10] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn sources_load_from_the_asset_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("flat.vert.wgsl"), "@vertex\nfn vs_main() {}\n").unwrap();
        fs::write(dir.path().join("flat.frag.wgsl"), "@fragment fn fs_main ( ) {}").unwrap();
        let sources = ShaderSources::load(dir.path(), ProgramKind::Flat).unwrap();
        assert!(sources.vertex.contains("vs_main"));

        assert!(matches!(
            ShaderSources::load(dir.path(), ProgramKind::Phong),
            Err(CompileError::Source { .. })
        ));
    }

    #[test]
    fn missing_entry_points_are_stage_errors() {
        let vertex = "@vertex fn main() {}".to_string();
        let fragment = "@fragment fn fs_main() {}".to_string();
        assert!(matches!(
            ShaderSources::new(vertex, fragment.clone()),
            Err(CompileError::Vertex { .. })
        ));
        let vertex = "@vertex fn vs_main() {}".to_string();
        let commented = "// fn fs_main() {}".to_string();
        assert!(matches!(
            ShaderSources::new(vertex, commented),
            Err(CompileError::Fragment { .. })
        ));
    }

    #[test]
    fn degenerate_model_falls_back_to_identity_normals() {
        let mut state = ProgramState::new(ProgramKind::Phong);
        state.set_model(Mat4::from_scale(Vec3::ZERO)).unwrap();
        let normal = state.object().get_floats("normal_matrix").unwrap();
        assert_eq!(normal[0], 1.0);
    }
}
