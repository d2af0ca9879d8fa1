//! Application runner and event loop.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::raw_window_handle::HasDisplayHandle;
use winit::window::{Window, WindowId};
use zeta_gpu::{GpuContextBuilder, SurfaceContext};
use zeta_present::{FrameOutcome, PresentConfig, Presenter, ResizeStatus};

use crate::app::ZetaApp;
use crate::events::{EventQueue, NativeEvent};
use crate::limiter::FrameLimiter;
use crate::logging::init_logging;
use crate::window::WindowHandle;

/// Frames between FPS log lines.
const FPS_REPORT_INTERVAL: u64 = 200;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    /// Enable vsync (FIFO presentation).
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Frames the CPU may record ahead of the GPU.
    pub frames_in_flight: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Zeta".to_string(),
            width: 1280,
            height: 720,
            target_fps: None,
            vsync: false,
            validation: cfg!(debug_assertions),
            frames_in_flight: 2,
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the target FPS.
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Set the number of frames in flight.
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Presentation settings derived from this config.
    pub fn present_config(&self) -> PresentConfig {
        PresentConfig::default()
            .with_frames_in_flight(self.frames_in_flight)
            .with_vsync(self.vsync)
    }
}

/// Run a `ZetaApp` with the given configuration.
///
/// This function initializes logging, creates the window, GPU context and
/// presenter, and runs the event loop until the window is closed or a frame
/// fails unrecoverably.
pub fn run_app<A: ZetaApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    init_logging();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
        events: EventQueue::new(),
        failure: None,
    };

    event_loop.run_app(&mut runner)?;

    match runner.failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Internal application runner that implements winit's `ApplicationHandler`.
struct AppRunner<A: ZetaApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
    events: EventQueue,
    /// First fatal error, returned from [`run_app`].
    failure: Option<anyhow::Error>,
}

/// Internal application state.
///
/// The presenter owns the surface, so it is declared (and shut down) before
/// the window it was created from.
struct AppState<A: ZetaApp> {
    presenter: Presenter<SurfaceContext, A>,
    window: WindowHandle,
    limiter: FrameLimiter,
    last_frame_time: Instant,
}

impl<A: ZetaApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => {
                error!("Failed to initialize application: {e:#}");
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.events.push(NativeEvent::Quit);
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    let serial = state.window.next_serial();
                    self.events.push(NativeEvent::Resize {
                        serial,
                        width: size.width,
                        height: size.height,
                    });
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.repeat {
                    return;
                }
                if let PhysicalKey::Code(code) = event.physical_key {
                    self.events.push(NativeEvent::Key {
                        code,
                        pressed: event.state.is_pressed(),
                    });
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(state) = &mut self.state else {
            return;
        };

        let mut quit = false;
        for event in self.events.drain() {
            match event {
                NativeEvent::Quit => quit = true,
                NativeEvent::Resize {
                    serial,
                    width,
                    height,
                } => {
                    debug!(serial, width, height, "Resize event");
                    state.presenter.notify_configure(serial, width, height);
                }
                NativeEvent::Key { code, pressed } => {
                    state.presenter.recorder_mut().on_key(code, pressed);
                }
            }
        }

        if quit {
            self.stop(event_loop);
            return;
        }

        match state.run_frame() {
            // Nothing to draw until the window has an area again; sleep until
            // the next event instead of spinning.
            Ok(FrameOutcome::Skipped) => event_loop.set_control_flow(ControlFlow::Wait),
            Ok(_) => event_loop.set_control_flow(ControlFlow::Poll),
            Err(e) => {
                error!("Frame error: {e:#}");
                self.failure = Some(e);
                self.stop(event_loop);
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = self.state.take() {
            state.cleanup();
        }
    }
}

impl<A: ZetaApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        // Create window
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = WindowHandle::new(Arc::new(event_loop.create_window(window_attrs)?));

        // Create GPU context
        let gpu = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .display(window.window().display_handle()?.as_raw())
            .validation(self.config.validation)
            .build()?;

        // Initialize the application before any surface exists so a failure
        // here has nothing to release.
        let app = A::init(&gpu, &self.config)?;

        // SAFETY: the window is stored next to the presenter in `AppState`
        // and is only dropped after the presenter has destroyed the surface.
        let surface = unsafe { SurfaceContext::from_window(&gpu, window.window().as_ref())? };

        let size = window.inner_size();
        let presenter = Presenter::init(
            gpu,
            surface,
            size.width,
            size.height,
            self.config.present_config(),
            app,
        )?;

        Ok(AppState {
            presenter,
            window,
            limiter: FrameLimiter::new(self.config.target_fps),
            last_frame_time: Instant::now(),
        })
    }

    fn stop(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(state) = self.state.take() {
            state.cleanup();
        }
        event_loop.exit();
    }
}

impl<A: ZetaApp> AppState<A> {
    /// One loop iteration: resize handshake, update, draw, pacing.
    fn run_frame(&mut self) -> anyhow::Result<FrameOutcome> {
        self.limiter.begin();

        let now = Instant::now();
        let dt = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;

        match self.presenter.poll_resize(&mut self.window)? {
            ResizeStatus::Recreated { width, height } => {
                self.presenter.recorder_mut().on_resize(width, height);
                info!("Resized to {}x{}", width, height);
            }
            ResizeStatus::Deferred { width, height } => {
                debug!("Resize to {}x{} deferred", width, height);
            }
            ResizeStatus::Stable => {}
        }

        self.presenter.recorder_mut().update(dt);

        let outcome = match self.presenter.draw_frame() {
            Ok(outcome) => outcome,
            Err(e) if e.is_recoverable() => {
                // Keep polling so the next iteration rebuilds the swapchain
                warn!("Frame dropped: {e}");
                FrameOutcome::NeedsResize
            }
            Err(e) => return Err(e.into()),
        };

        if let FrameOutcome::Presented { .. } = outcome {
            let fps = self.limiter.end();
            if self.limiter.frames() % FPS_REPORT_INTERVAL == 0 {
                info!("FPS: {:.1}", fps);
            }
        }

        Ok(outcome)
    }

    fn cleanup(self) {
        let Self {
            mut presenter,
            window,
            limiter,
            ..
        } = self;

        // Print FPS statistics
        if let Some((min, max, avg)) = limiter.stats() {
            info!("FPS Statistics:");
            info!("  Min: {:.1}", min);
            info!("  Max: {:.1}", max);
            info!("  Avg: {:.1}", avg);
            info!("  Total frames: {}", presenter.frame_count());
        }

        info!("Starting cleanup...");
        presenter.recorder_mut().cleanup();

        if let Err(e) = presenter.shutdown() {
            error!("Presenter shutdown failed: {e}");
        }
        drop(window);

        info!("Cleanup complete");
    }
}
