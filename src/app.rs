use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::driver::{DEFAULT_MAX_CATCH_UP, DEFAULT_TICK_RATE_HZ, FixedTicker};
use crate::gpu::{GpuContext, GpuError};
use crate::input::Input;
use crate::level::{Level, LevelError};
use crate::render_context::RenderContext;
use crate::shader::{ShaderError, ShaderProgram};
use crate::texture::PendingTexture;
use crate::wgpu_backend::WgpuBackend;

/// File names looked up in [`AppConfig::shader_dir`].
pub const VERTEX_SHADER_FILE: &str = "mesh.vert.wgsl";
pub const FRAGMENT_SHADER_FILE: &str = "mesh.frag.wgsl";

/// Failures that stop the app.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("event loop failed: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("failed to open window: {0}")]
    Window(#[from] winit::error::OsError),
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error(transparent)]
    Shader(#[from] ShaderError),
    #[error(transparent)]
    Level(#[from] LevelError),
}

/// Configuration for the app window and loop.
#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Simulation ticks per second.
    pub tick_rate_hz: u32,
    /// Most ticks run for one redraw after a stall.
    pub max_catch_up: u32,
    pub clear_color: [f64; 4],
    /// Directory holding the mesh shader sources; the built-in shader when `None`.
    pub shader_dir: Option<PathBuf>,
    /// Image applied to the player cube.
    pub texture: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "stackview".to_string(),
            width: 640,
            height: 480,
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            max_catch_up: DEFAULT_MAX_CATCH_UP,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            shader_dir: None,
            texture: None,
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz;
        self
    }

    pub fn max_catch_up(mut self, ticks: u32) -> Self {
        self.max_catch_up = ticks;
        self
    }

    pub fn clear_color(mut self, rgba: [f64; 4]) -> Self {
        self.clear_color = rgba;
        self
    }

    pub fn shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = Some(dir.into());
        self
    }

    pub fn texture(mut self, path: impl Into<PathBuf>) -> Self {
        self.texture = Some(path.into());
        self
    }
}

/// Opens the window and runs the level until it is closed.
///
/// # Example
/// ```no_run
/// use stackview::AppConfig;
///
/// stackview::run(AppConfig::new().title("Chase").size(1280, 720)).unwrap();
/// ```
pub fn run(config: AppConfig) -> Result<(), AppError> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = StackviewApp::Pending { config };
    event_loop.run_app(&mut app)?;

    match app {
        StackviewApp::Failed(err) => Err(err),
        _ => Ok(()),
    }
}

struct Session {
    window: Arc<Window>,
    gpu: GpuContext,
    backend: WgpuBackend,
    level: Level,
    ctx: RenderContext,
    input: Input,
    ticker: FixedTicker,
    last_frame: Instant,
    /// The backend holds a complete frame from the last tick.
    frame_ready: bool,
}

impl Session {
    fn start(event_loop: &ActiveEventLoop, config: &AppConfig) -> Result<Self, AppError> {
        let window_attrs = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(winit::dpi::LogicalSize::new(config.width, config.height));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let gpu = GpuContext::new(window.clone())?;
        let mut backend = WgpuBackend::new(&gpu, config.clear_color);

        let program = match &config.shader_dir {
            Some(dir) => ShaderProgram::load(
                &mut backend,
                &dir.join(VERTEX_SHADER_FILE),
                &dir.join(FRAGMENT_SHADER_FILE),
            )?,
            None => ShaderProgram::builtin_mesh(&mut backend)?,
        };
        let texture = config.texture.as_ref().map(PendingTexture::spawn);

        let mut ctx = RenderContext::new();
        let level = Level::new(&mut backend, &mut ctx, program, gpu.aspect(), texture)?;

        Ok(Self {
            window,
            gpu,
            backend,
            level,
            ctx,
            input: Input::new(),
            ticker: FixedTicker::new(config.tick_rate_hz, config.max_catch_up),
            last_frame: Instant::now(),
            frame_ready: false,
        })
    }

    fn redraw(&mut self) {
        let now = Instant::now();
        let ticks = self.ticker.advance(now.duration_since(self.last_frame));
        self.last_frame = now;

        for _ in 0..ticks {
            self.input.update();
            self.level.update(&self.input, &mut self.ctx);
            self.backend.begin_frame();
            match self.level.render(&mut self.ctx, &mut self.backend) {
                Ok(()) => self.frame_ready = true,
                Err(err) => {
                    tracing::error!(error = %err, "frame aborted");
                    self.frame_ready = false;
                }
            }
        }

        if self.frame_ready {
            if let Err(err) = self.backend.present(&self.gpu) {
                tracing::error!(error = %err, "present failed");
            }
        }
        self.window.request_redraw();
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.gpu.resize(width, height);
        self.level.resize(self.gpu.aspect(), &mut self.ctx);
        tracing::debug!(width, height, "resized");
    }
}

enum StackviewApp {
    Pending { config: AppConfig },
    Running(Box<Session>),
    Failed(AppError),
}

impl ApplicationHandler for StackviewApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let StackviewApp::Pending { config } = self {
            match Session::start(event_loop, config) {
                Ok(session) => {
                    tracing::info!(
                        width = session.gpu.width(),
                        height = session.gpu.height(),
                        "window opened"
                    );
                    session.window.request_redraw();
                    *self = StackviewApp::Running(Box::new(session));
                }
                Err(err) => {
                    *self = StackviewApp::Failed(err);
                    event_loop.exit();
                }
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let StackviewApp::Running(session) = self else {
            return;
        };

        session.input.handle_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                session.resize(size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                session.redraw();
            }
            _ => {}
        }
    }
}
