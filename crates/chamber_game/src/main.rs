//! Chamber -- window, GPU context, and a single sprite drawn every frame.
//!
//! winit drives the event loop via `ApplicationHandler`. Each `RedrawRequested`:
//!
//!   1. `begin_frame()` -- measure wall-clock delta, feed accumulator
//!   2. `while should_step()` -- run fixed-dt simulation steps
//!   3. Clear, draw the player sprite, present

mod scene;

use std::path::Path;
use std::sync::Arc;

use winit::application::ApplicationHandler;
use winit::error::{EventLoopError, OsError};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use chamber_core::resource::ResourceLoader;
use chamber_core::time::TimeState;
use chamber_platform::{load_platform_config, ConfigError, PlatformConfig};
use chamber_render::{GpuContext, RenderError, WgpuBackend};
use scene::{apply_resize, Scene, PLAYER_TEXTURE_PATH};

const CONFIG_PATH: &str = "chamber.json";
const ASSET_ROOT: &str = "assets";
pub(crate) const PLAYER_PNG: &[u8] = include_bytes!("../../../assets/player.png");

#[derive(Debug, thiserror::Error)]
enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("event loop: {0}")]
    EventLoop(#[from] EventLoopError),
    #[error("failed to create window: {0}")]
    Window(#[from] OsError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Everything that exists once the window and GPU surface are up.
///
/// Field order is drop order: GPU objects owned by the scene go before the
/// backend holding the device, and the window outlives its surface.
struct EngineState {
    scene: Scene<WgpuBackend>,
    backend: WgpuBackend,
    time: TimeState,
    viewport: (u32, u32),
    window: Arc<Window>,
}

impl EngineState {
    fn new(window: Arc<Window>, config: &PlatformConfig) -> Result<Self, InitError> {
        let gpu = GpuContext::new(window.clone(), config.vsync)?;
        let viewport = gpu.size;
        let mut backend = WgpuBackend::new(gpu);

        let loader = ResourceLoader::new(ASSET_ROOT).with_bundled(PLAYER_TEXTURE_PATH, PLAYER_PNG);
        let scene = Scene::new(&mut backend, &loader, viewport)?;

        Ok(Self {
            scene,
            backend,
            time: TimeState::new(),
            viewport,
            window,
        })
    }

    /// Simulation step. The demo has no game state yet.
    fn fixed_update(&mut self, _dt: f64) {}

    fn redraw(&mut self) {
        self.time.begin_frame();
        while self.time.should_step() {
            self.fixed_update(self.time.fixed_dt);
        }

        if let Err(err) = self.scene.render(&mut self.backend, self.viewport) {
            log::error!("Frame failed: {err}");
        }
        self.window.pre_present_notify();
        self.backend.present();
    }

    fn resize(&mut self, width: u32, height: u32) {
        if apply_resize(&mut self.backend, &mut self.viewport, width, height) {
            self.backend.resize_surface(width, height);
            log::info!("Resized to {}x{}", width, height);
        }
    }
}

struct App {
    config: PlatformConfig,
    state: Option<EngineState>,
    init_error: Option<InitError>,
}

impl App {
    fn new(config: PlatformConfig) -> Self {
        Self {
            config,
            state: None,
            init_error: None,
        }
    }

    fn init(&self, event_loop: &ActiveEventLoop) -> Result<EngineState, InitError> {
        let window = chamber_platform::window::create_window(event_loop, &self.config)?;
        log::info!(
            "Window created: {}x{}",
            self.config.width,
            self.config.height
        );
        let state = EngineState::new(window, &self.config)?;
        // Hidden until there is something to draw.
        state.window.set_visible(true);
        Ok(state)
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        match self.init(event_loop) {
            Ok(state) => self.state = Some(state),
            Err(err) => {
                self.init_error = Some(err);
                event_loop.exit();
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting.");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => state.resize(size.width, size.height),
            WindowEvent::RedrawRequested => state.redraw(),
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Release GPU resources while the event loop still owns the window.
        self.state = None;
    }
}

fn run() -> Result<(), InitError> {
    let config = load_platform_config(Path::new(CONFIG_PATH))?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.init_error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Chamber starting...");

    if let Err(err) = run() {
        log::error!("{err}");
        std::process::exit(1);
    }
}
