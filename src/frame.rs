use std::collections::BTreeMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::geometry::{DrawCommand, Geometry, Topology};
use crate::program::{ProgramKind, ProgramState};

/// Whether a draw tests against and writes the depth buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DepthMode {
    #[default]
    Test,
    /// Always passes and leaves the depth buffer untouched, so the draw
    /// only covers what was drawn before it.
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub usize);

/// What the frame recorder needs to know about an uploaded mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshEntry {
    pub name: String,
    pub topology: Topology,
    pub command: DrawCommand,
}

/// Name to id table for meshes. Ids are assigned in registration order,
/// which is also the order the renderer uploads them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshCatalog {
    entries: Vec<MeshEntry>,
}

impl MeshCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `geometry` under `name`; re-registering a name replaces the
    /// entry but keeps its id.
    pub fn register(&mut self, name: impl Into<String>, geometry: &Geometry) -> MeshId {
        let entry = MeshEntry {
            name: name.into(),
            topology: geometry.topology(),
            command: geometry.draw_command(),
        };
        if let Some(id) = self.id(&entry.name) {
            self.entries[id.0] = entry;
            return id;
        }
        self.entries.push(entry);
        MeshId(self.entries.len() - 1)
    }

    pub fn id(&self, name: &str) -> Option<MeshId> {
        self.entries
            .iter()
            .position(|entry| entry.name == name)
            .map(MeshId)
    }

    pub fn get(&self, id: MeshId) -> Option<&MeshEntry> {
        self.entries.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One recorded draw, with the object uniforms as they were when it was
/// recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub label: String,
    pub program: ProgramKind,
    pub topology: Topology,
    pub depth: DepthMode,
    pub mesh: MeshId,
    pub command: DrawCommand,
    pub texture: Option<TextureId>,
    pub object_uniforms: Vec<u8>,
}

impl DrawCall {
    pub fn primitive_count(&self) -> u32 {
        self.command.primitive_count(self.topology)
    }
}

/// Everything one loop iteration wants drawn, in submission order.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecording {
    pub clear_color: Vec3,
    frame_uniforms: BTreeMap<ProgramKind, Vec<u8>>,
    draws: Vec<DrawCall>,
}

impl FrameRecording {
    pub fn new(clear_color: Vec3) -> Self {
        Self {
            clear_color,
            frame_uniforms: BTreeMap::new(),
            draws: Vec::new(),
        }
    }

    /// Captures the per-frame block of `program`. Call again to overwrite.
    pub fn set_frame_uniforms(&mut self, program: &ProgramState) {
        self.frame_uniforms
            .insert(program.kind(), program.frame().bytes().to_vec());
    }

    pub fn frame_uniforms(&self, program: ProgramKind) -> Option<&[u8]> {
        self.frame_uniforms.get(&program).map(Vec::as_slice)
    }

    /// Appends a draw of `mesh` with the program's current object uniforms.
    pub fn draw(
        &mut self,
        label: impl Into<String>,
        program: &ProgramState,
        mesh: MeshId,
        entry: &MeshEntry,
        depth: DepthMode,
        texture: Option<TextureId>,
    ) {
        self.draws.push(DrawCall {
            label: label.into(),
            program: program.kind(),
            topology: entry.topology,
            depth,
            mesh,
            command: entry.command,
            texture,
            object_uniforms: program.object().bytes().to_vec(),
        });
    }

    pub fn draws(&self) -> &[DrawCall] {
        &self.draws
    }

    pub fn triangle_count(&self) -> u32 {
        self.primitives(Topology::Triangles)
    }

    pub fn line_count(&self) -> u32 {
        self.primitives(Topology::Lines)
    }

    fn primitives(&self, topology: Topology) -> u32 {
        self.draws
            .iter()
            .filter(|draw| draw.topology == topology)
            .map(DrawCall::primitive_count)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_ids_follow_registration_order() {
        let mut catalog = MeshCatalog::new();
        let cube = catalog.register("cube", &Geometry::cube(0.2));
        let line = catalog.register("line", &Geometry::unit_line());
        assert_eq!(cube, MeshId(0));
        assert_eq!(line, MeshId(1));
        assert_eq!(catalog.register("cube", &Geometry::corner_cube(0.2)), MeshId(0));
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.id("line"), Some(MeshId(1)));
        assert_eq!(catalog.get(line).unwrap().topology, Topology::Lines);
    }

    #[test]
    fn draws_snapshot_object_uniforms() {
        let mut catalog = MeshCatalog::new();
        let cube = catalog.register("cube", &Geometry::cube(0.2));
        let entry = catalog.get(cube).unwrap().clone();
        let mut program = ProgramState::new(ProgramKind::Flat);
        let mut frame = FrameRecording::new(Vec3::ZERO);

        program.set_color(Vec3::X).unwrap();
        frame.draw("red", &program, cube, &entry, DepthMode::Test, None);
        program.set_color(Vec3::Y).unwrap();
        frame.draw("green", &program, cube, &entry, DepthMode::Ignore, None);

        let draws = frame.draws();
        assert_eq!(draws.len(), 2);
        assert_ne!(draws[0].object_uniforms, draws[1].object_uniforms);
        assert_eq!(draws[1].depth, DepthMode::Ignore);
        assert_eq!(frame.triangle_count(), 24);
        assert_eq!(frame.line_count(), 0);
    }

    #[test]
    fn frame_uniforms_are_kept_per_program() {
        let mut frame = FrameRecording::new(Vec3::ONE);
        let flat = ProgramState::new(ProgramKind::Flat);
        frame.set_frame_uniforms(&flat);
        assert_eq!(frame.frame_uniforms(ProgramKind::Flat).map(<[u8]>::len), Some(128));
        assert!(frame.frame_uniforms(ProgramKind::Phong).is_none());
    }
}
