use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{error, info, warn};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode as WinitKey, PhysicalKey};
use winit::window::{Window, WindowId};

use caribbean_gl::pacing::DEFAULT_FPS;
use caribbean_gl::{
    AppSettings, AppState, FramePacer, KeyBindings, KeyCode, NamedKey, RenderMode, Renderer,
    SceneAssets, SceneDescription, Viewport,
};

const WINDOW_TITLE: &str = "CaribbeanGL";
/// Pixels of trackpad travel counted as one wheel notch.
const PIXELS_PER_LINE: f32 = 20.0;

#[derive(Parser, Debug)]
#[command(name = "caribbean-gl", about = "Decorative island scene renderer")]
struct Cli {
    /// Built-in scene name or path to a scene XML file
    #[arg(long, default_value = "caribbean")]
    scene: String,

    /// Directory holding models/, textures/ and shaders/
    #[arg(long, default_value = "assets")]
    assets: PathBuf,

    /// Program the scene is drawn with (flat or phong)
    #[arg(long, default_value_t = RenderMode::Phong)]
    mode: RenderMode,

    /// Target frames per second; 0 disables pacing
    #[arg(long, default_value_t = DEFAULT_FPS)]
    fps: f32,

    #[arg(long, default_value_t = 1920)]
    width: u32,

    #[arg(long, default_value_t = 1080)]
    height: u32,

    /// Extra key binding such as `Q=quit`; repeatable
    #[arg(long = "bind", value_name = "KEY=ACTION")]
    bindings: Vec<String>,

    /// Load everything and print a draw summary without opening a window
    #[arg(long)]
    summary_only: bool,

    /// Frames simulated by --summary-only
    #[arg(long, default_value_t = 120)]
    frames: u32,
}

/// Everything the run needs, resolved from the command line.
#[derive(Debug)]
struct RunSettings {
    scene: String,
    assets: PathBuf,
    fps: f32,
    app: AppSettings,
    summary_only: bool,
    frames: u32,
}

impl RunSettings {
    fn from_cli(cli: Cli) -> Result<Self> {
        let bindings = KeyBindings::default()
            .with_overrides(&cli.bindings)
            .context("invalid --bind")?;
        Ok(Self {
            scene: cli.scene,
            assets: cli.assets,
            fps: cli.fps,
            app: AppSettings {
                mode: cli.mode,
                bindings,
                viewport: Viewport::new(cli.width, cli.height),
                ..AppSettings::default()
            },
            summary_only: cli.summary_only,
            frames: cli.frames,
        })
    }
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let settings = RunSettings::from_cli(Cli::parse())?;
    let scene = SceneDescription::load(&settings.scene)?;
    info!(
        "scene {} with {} items ({} models, {} textures)",
        scene.name,
        scene.items.len(),
        scene.models.len(),
        scene.textures.len()
    );
    let assets = SceneAssets::load(&scene, &settings.assets)
        .with_context(|| format!("failed to load assets from {}", settings.assets.display()))?;

    if settings.summary_only {
        run_headless(scene, &assets, settings)
    } else {
        run_interactive(scene, assets, settings)
    }
}

fn run_headless(scene: SceneDescription, assets: &SceneAssets, settings: RunSettings) -> Result<()> {
    let dt = if settings.fps > 0.0 {
        1.0 / settings.fps
    } else {
        1.0 / DEFAULT_FPS
    };
    let mut app = AppState::new(scene, assets.catalog(), assets.texture_names(), settings.app);
    for _ in 0..settings.frames {
        app.update(dt);
        app.record_frame()?;
    }
    let frame = app.record_frame()?;

    let scene = app.scene();
    println!(
        "Scene {}: {} items, {} meshes, {} textures",
        scene.name,
        scene.items.len(),
        assets.meshes.len(),
        assets.textures.len()
    );
    println!(
        "Frame {} ({} mode): {} draws, {} triangles, {} lines",
        settings.frames,
        app.mode(),
        frame.draws().len(),
        frame.triangle_count(),
        frame.line_count()
    );
    for (name, _) in &scene.animations {
        if let Some(value) = app.animations().get(name) {
            println!(" - {name} = {value:.3}");
        }
    }
    Ok(())
}

fn run_interactive(scene: SceneDescription, assets: SceneAssets, settings: RunSettings) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to create the event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let window_size = LogicalSize::new(
        settings.app.viewport.width as f64,
        settings.app.viewport.height as f64,
    );
    let app = AppState::new(scene, assets.catalog(), assets.texture_names(), settings.app);
    let mut frame_loop = FrameLoop {
        app,
        assets,
        window_size,
        renderer: None,
        pacer: FramePacer::new(settings.fps),
        state: LoopState::Initializing,
        last_error: None,
    };
    info!("frame loop {:?}", frame_loop.state);

    event_loop
        .run_app(&mut frame_loop)
        .context("event loop failed")?;

    match frame_loop.last_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Initializing,
    Running,
    Terminating,
}

struct FrameLoop {
    app: AppState,
    assets: SceneAssets,
    window_size: LogicalSize<f64>,
    renderer: Option<Renderer>,
    pacer: FramePacer,
    state: LoopState,
    last_error: Option<anyhow::Error>,
}

impl FrameLoop {
    fn transition(&mut self, state: LoopState) {
        if self.state != state {
            info!("frame loop {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.last_error = Some(err);
        self.transition(LoopState::Terminating);
        event_loop.exit();
    }

    fn initialize(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attributes = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(self.window_size);
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .context("failed to create window")?,
        );
        let size = window.inner_size();
        self.app.handle_resize(size.width, size.height);
        let renderer = block_on(Renderer::new(window, &self.assets))?;
        self.renderer = Some(renderer);
        self.pacer.reset();
        Ok(())
    }

    fn iterate(&mut self) -> Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };
        let dt = self.pacer.tick();
        self.app.update(dt);
        let recording = self.app.record_frame()?;
        renderer.prepare(&recording)?;
        match renderer.render(&recording) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                warn!("surface lost; reconfiguring");
                renderer.reconfigure();
            }
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("surface timeout; skipping frame");
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(anyhow!("GPU is out of memory"));
            }
            Err(err) => {
                warn!("surface error: {err}");
            }
        }
        self.pacer.wait();
        Ok(())
    }
}

impl ApplicationHandler for FrameLoop {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state != LoopState::Initializing {
            return;
        }
        match self.initialize(event_loop) {
            Ok(()) => self.transition(LoopState::Running),
            Err(err) => self.fail(event_loop, err.context("initialization failed")),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        if window_id != renderer.window_id() {
            return;
        }
        match event {
            WindowEvent::CloseRequested => self.app.request_quit(),
            WindowEvent::Resized(size) => {
                renderer.resize(size);
                self.app.handle_resize(size.width, size.height);
            }
            WindowEvent::Focused(false) => self.app.release_all(),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    if let Some(key) = map_keycode(code) {
                        self.app
                            .handle_key(key, event.state.is_pressed(), event.repeat);
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.app.handle_cursor(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let dy = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32 / PIXELS_PER_LINE,
                };
                self.app.handle_scroll(dy);
            }
            _ => {}
        }
        if self.app.quit_requested() {
            self.transition(LoopState::Terminating);
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.state != LoopState::Running {
            return;
        }
        if let Err(err) = self.iterate() {
            self.fail(event_loop, err);
            return;
        }
        if self.app.quit_requested() {
            self.transition(LoopState::Terminating);
            event_loop.exit();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.transition(LoopState::Terminating);
        if self.renderer.take().is_some() {
            info!("released GPU resources");
        }
    }
}

fn map_keycode(code: WinitKey) -> Option<KeyCode> {
    Some(match code {
        WinitKey::Space => KeyCode::Named(NamedKey::Space),
        WinitKey::Enter => KeyCode::Named(NamedKey::Enter),
        WinitKey::Tab => KeyCode::Named(NamedKey::Tab),
        WinitKey::ArrowLeft => KeyCode::Named(NamedKey::Left),
        WinitKey::ArrowRight => KeyCode::Named(NamedKey::Right),
        WinitKey::ArrowUp => KeyCode::Named(NamedKey::Up),
        WinitKey::ArrowDown => KeyCode::Named(NamedKey::Down),
        WinitKey::Escape => KeyCode::Named(NamedKey::Escape),
        WinitKey::ShiftLeft => KeyCode::Named(NamedKey::LeftShift),
        WinitKey::ShiftRight => KeyCode::Named(NamedKey::RightShift),
        WinitKey::ControlLeft => KeyCode::Named(NamedKey::LeftCtrl),
        WinitKey::ControlRight => KeyCode::Named(NamedKey::RightCtrl),
        WinitKey::Digit0 => KeyCode::Digit(0),
        WinitKey::Digit1 => KeyCode::Digit(1),
        WinitKey::Digit2 => KeyCode::Digit(2),
        WinitKey::Digit3 => KeyCode::Digit(3),
        WinitKey::Digit4 => KeyCode::Digit(4),
        WinitKey::Digit5 => KeyCode::Digit(5),
        WinitKey::Digit6 => KeyCode::Digit(6),
        WinitKey::Digit7 => KeyCode::Digit(7),
        WinitKey::Digit8 => KeyCode::Digit(8),
        WinitKey::Digit9 => KeyCode::Digit(9),
        WinitKey::KeyA => KeyCode::Character('A'),
        WinitKey::KeyB => KeyCode::Character('B'),
        WinitKey::KeyC => KeyCode::Character('C'),
        WinitKey::KeyD => KeyCode::Character('D'),
        WinitKey::KeyE => KeyCode::Character('E'),
        WinitKey::KeyF => KeyCode::Character('F'),
        WinitKey::KeyG => KeyCode::Character('G'),
        WinitKey::KeyH => KeyCode::Character('H'),
        WinitKey::KeyI => KeyCode::Character('I'),
        WinitKey::KeyJ => KeyCode::Character('J'),
        WinitKey::KeyK => KeyCode::Character('K'),
        WinitKey::KeyL => KeyCode::Character('L'),
        WinitKey::KeyM => KeyCode::Character('M'),
        WinitKey::KeyN => KeyCode::Character('N'),
        WinitKey::KeyO => KeyCode::Character('O'),
        WinitKey::KeyP => KeyCode::Character('P'),
        WinitKey::KeyQ => KeyCode::Character('Q'),
        WinitKey::KeyR => KeyCode::Character('R'),
        WinitKey::KeyS => KeyCode::Character('S'),
        WinitKey::KeyT => KeyCode::Character('T'),
        WinitKey::KeyU => KeyCode::Character('U'),
        WinitKey::KeyV => KeyCode::Character('V'),
        WinitKey::KeyW => KeyCode::Character('W'),
        WinitKey::KeyX => KeyCode::Character('X'),
        WinitKey::KeyY => KeyCode::Character('Y'),
        WinitKey::KeyZ => KeyCode::Character('Z'),
        _ => return None,
    })
}
