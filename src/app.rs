use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use glam::{Mat4, Vec2, Vec3};
use log::info;
use serde::{Deserialize, Serialize};

use crate::animation::Animations;
use crate::assets::DEBUG_LINE_MESH;
use crate::camera::{Camera, CameraMovement, CameraSettings, LookDirection};
use crate::frame::{DepthMode, FrameRecording, MeshCatalog, TextureId};
use crate::input::{Action, InputState, KeyBindings, KeyCode};
use crate::program::{ProgramKind, ProgramState};
use crate::scene::SceneDescription;
use crate::uniform::UniformError;

/// Length of the debug axes in world units.
const AXIS_LENGTH: f32 = 5.0;
/// Arm length of the cross drawn at a point light.
const MARKER_SIZE: f32 = 0.5;

/// Which program the scene items are drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RenderMode {
    Flat,
    #[default]
    Phong,
}

impl RenderMode {
    pub fn program(self) -> ProgramKind {
        match self {
            RenderMode::Flat => ProgramKind::Flat,
            RenderMode::Phong => ProgramKind::Phong,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            RenderMode::Flat => RenderMode::Phong,
            RenderMode::Phong => RenderMode::Flat,
        }
    }
}

impl FromStr for RenderMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "flat" => Ok(RenderMode::Flat),
            "phong" => Ok(RenderMode::Phong),
            other => Err(anyhow!("unknown render mode `{other}`, expected flat or phong")),
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program().name())
    }
}

/// Framebuffer size in pixels; never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

/// Knobs the caller picks before the loop starts.
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub mode: RenderMode,
    pub bindings: KeyBindings,
    pub viewport: Viewport,
    pub camera: CameraSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            mode: RenderMode::default(),
            bindings: KeyBindings::default(),
            viewport: Viewport::new(1920, 1080),
            camera: CameraSettings::default(),
        }
    }
}

/// All mutable state of a running demo.
///
/// Window events are fed in through the `handle_*` methods; once per loop
/// iteration the caller runs [`AppState::update`] and then
/// [`AppState::record_frame`].
#[derive(Debug)]
pub struct AppState {
    scene: SceneDescription,
    meshes: MeshCatalog,
    textures: Vec<String>,
    camera: Camera,
    input: InputState,
    bindings: KeyBindings,
    animations: Animations,
    flat: ProgramState,
    phong: ProgramState,
    mode: RenderMode,
    viewport: Viewport,
    last_cursor: Option<Vec2>,
    clouds_enabled: bool,
    debug_lines: bool,
    quit_requested: bool,
}

impl AppState {
    pub fn new(
        scene: SceneDescription,
        meshes: MeshCatalog,
        textures: Vec<String>,
        settings: AppSettings,
    ) -> Self {
        let camera = Camera::with_orientation(
            scene.camera.position,
            scene.camera.yaw,
            scene.camera.pitch,
            settings.camera,
        );
        Self {
            animations: scene.animations(),
            scene,
            meshes,
            textures,
            camera,
            input: InputState::new(),
            bindings: settings.bindings,
            flat: ProgramState::new(ProgramKind::Flat),
            phong: ProgramState::new(ProgramKind::Phong),
            mode: settings.mode,
            viewport: settings.viewport,
            last_cursor: None,
            clouds_enabled: true,
            debug_lines: false,
            quit_requested: false,
        }
    }

    pub fn scene(&self) -> &SceneDescription {
        &self.scene
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn animations(&self) -> &Animations {
        &self.animations
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn clouds_enabled(&self) -> bool {
        self.clouds_enabled
    }

    pub fn debug_lines(&self) -> bool {
        self.debug_lines
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    pub fn request_quit(&mut self) {
        self.quit_requested = true;
    }

    /// Routes a key event. Held actions follow the key state; the others fire
    /// once per fresh press.
    pub fn handle_key(&mut self, key: KeyCode, pressed: bool, repeat: bool) {
        let Some(action) = self.bindings.action_for(key) else {
            return;
        };
        if action.is_held() {
            self.input.set_held(action, pressed);
            return;
        }
        if !pressed || repeat {
            return;
        }
        match action {
            Action::ToggleClouds => {
                self.clouds_enabled = !self.clouds_enabled;
                info!("clouds {}", on_off(self.clouds_enabled));
            }
            Action::ToggleDebugLines => {
                self.debug_lines = !self.debug_lines;
                info!("debug lines {}", on_off(self.debug_lines));
            }
            Action::ToggleRenderMode => {
                self.mode = self.mode.toggled();
                info!("render mode {}", self.mode);
            }
            Action::Quit => self.quit_requested = true,
            _ => {}
        }
    }

    /// Releases every held action, e.g. when the window loses focus.
    pub fn release_all(&mut self) {
        self.input.clear();
    }

    /// Feeds an absolute cursor position. The first position only primes the
    /// tracker so the camera does not jump.
    pub fn handle_cursor(&mut self, x: f32, y: f32) {
        let position = Vec2::new(x, y);
        if let Some(last) = self.last_cursor {
            // screen y grows downward
            self.camera
                .process_mouse_movement(position.x - last.x, last.y - position.y);
        }
        self.last_cursor = Some(position);
    }

    pub fn handle_scroll(&mut self, dy: f32) {
        self.camera.process_mouse_scroll(dy);
    }

    pub fn handle_resize(&mut self, width: u32, height: u32) {
        self.viewport = Viewport::new(width, height);
    }

    /// Applies held actions and advances every animation by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        const MOVES: [(Action, CameraMovement); 4] = [
            (Action::MoveForward, CameraMovement::Forward),
            (Action::MoveBackward, CameraMovement::Backward),
            (Action::MoveLeft, CameraMovement::Left),
            (Action::MoveRight, CameraMovement::Right),
        ];
        const LOOKS: [(Action, LookDirection); 4] = [
            (Action::LookUp, LookDirection::Up),
            (Action::LookDown, LookDirection::Down),
            (Action::LookLeft, LookDirection::Left),
            (Action::LookRight, LookDirection::Right),
        ];
        for (action, movement) in MOVES {
            if self.input.is_held(action) {
                self.camera.process_keyboard(movement, dt);
            }
        }
        for (action, direction) in LOOKS {
            if self.input.is_held(action) {
                self.camera.look(direction, dt);
            }
        }
        self.animations.advance(dt);
    }

    /// Records the scene's draws in document order with the current camera,
    /// lights and animation values.
    pub fn record_frame(&mut self) -> Result<FrameRecording, UniformError> {
        let mut frame = FrameRecording::new(self.scene.clear_color);
        let projection = self.camera.projection_matrix(self.viewport.aspect());
        let view = self.camera.view_matrix();
        let program = match self.mode {
            RenderMode::Flat => &mut self.flat,
            RenderMode::Phong => &mut self.phong,
        };
        program.set_projection(projection)?;
        program.set_view(view)?;
        if program.kind() == ProgramKind::Phong {
            let sun = &self.scene.sun;
            program.set_uniform("view_position", self.camera.position())?;
            program.set_uniform("sun_direction", sun.direction)?;
            program.set_uniform("sun_color", sun.color)?;
            program.set_uniform("sun_ambient", sun.ambient)?;
            program.set_uniform("sun_diffuse", sun.diffuse)?;
            program.set_uniform("sun_specular", sun.specular)?;
            let light = self
                .scene
                .point_light
                .as_ref()
                .map(|light| light.resolve(&self.animations));
            program.set_uniform(
                "point_position",
                light.map_or(Vec3::ZERO, |light| light.position),
            )?;
            program.set_uniform("point_color", light.map_or(Vec3::ZERO, |light| light.color))?;
            program.set_uniform(
                "point_intensity",
                light.map_or(0.0, |light| light.intensity),
            )?;
        }
        frame.set_frame_uniforms(program);

        for item in &self.scene.items {
            if item.is_cloud() && !self.clouds_enabled {
                continue;
            }
            let Some(mesh) = self.meshes.id(&item.mesh) else {
                continue;
            };
            let Some(entry) = self.meshes.get(mesh) else {
                continue;
            };
            let texture = item.texture.as_ref().and_then(|name| {
                self.textures
                    .iter()
                    .position(|candidate| candidate == name)
                    .map(TextureId)
            });
            program.set_model(item.model_matrix(&self.animations))?;
            program.set_color(item.color)?;
            if program.kind() == ProgramKind::Phong {
                program.set_uniform("shininess", item.material.shininess)?;
                program.set_uniform("specular_strength", item.material.specular)?;
                program.set_uniform("use_texture", texture.is_some())?;
            }
            frame.draw(&item.name, program, mesh, entry, item.depth, texture);
        }

        if self.debug_lines {
            self.record_debug_lines(&mut frame, projection, view)?;
        }
        Ok(frame)
    }

    fn record_debug_lines(
        &mut self,
        frame: &mut FrameRecording,
        projection: Mat4,
        view: Mat4,
    ) -> Result<(), UniformError> {
        let Some(mesh) = self.meshes.id(DEBUG_LINE_MESH) else {
            return Ok(());
        };
        let Some(entry) = self.meshes.get(mesh).cloned() else {
            return Ok(());
        };
        let flat = &mut self.flat;
        flat.set_projection(projection)?;
        flat.set_view(view)?;
        frame.set_frame_uniforms(flat);

        let mut segments = vec![
            ("axis-x", Vec3::ZERO, Vec3::X, AXIS_LENGTH, Vec3::X),
            ("axis-y", Vec3::ZERO, Vec3::Y, AXIS_LENGTH, Vec3::Y),
            ("axis-z", Vec3::ZERO, Vec3::Z, AXIS_LENGTH, Vec3::Z),
        ];
        if let Some(light) = &self.scene.point_light {
            let light = light.resolve(&self.animations);
            for direction in [Vec3::X, Vec3::Y, Vec3::Z] {
                let start = light.position - direction * (MARKER_SIZE / 2.0);
                segments.push(("light-marker", start, direction, MARKER_SIZE, light.color));
            }
        }

        for (label, start, direction, length, color) in segments {
            flat.set_model(segment_matrix(start, direction, length))?;
            flat.set_color(color)?;
            frame.draw(label, flat, mesh, &entry, DepthMode::Test, None);
        }
        Ok(())
    }
}

/// Maps the unit +X segment onto `start + t * direction * length`.
fn segment_matrix(start: Vec3, direction: Vec3, length: f32) -> Mat4 {
    let rotation = glam::Quat::from_rotation_arc(Vec3::X, direction.normalize());
    Mat4::from_scale_rotation_translation(Vec3::splat(length), rotation, start)
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}
