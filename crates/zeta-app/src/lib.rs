//! Application framework for the Zeta engine.
//!
//! This crate wires a winit window to the presentation core:
//! - Window creation and the GPU context
//! - Native events (quit, resize, keys) queued between frames
//! - The resize handshake and swapchain recreation
//! - Frame pacing and FPS reporting
//!
//! # Example
//!
//! ```no_run
//! use zeta_app::{run_app, AppConfig, FrameContext, FrameRecorder, GpuContext, ZetaApp};
//!
//! struct MyApp;
//!
//! impl FrameRecorder<GpuContext> for MyApp {
//!     fn record(&mut self, gpu: &GpuContext, frame: &FrameContext) -> zeta_present::Result<()> {
//!         // Record draw commands; leave `frame.image` in PRESENT_SRC_KHR layout.
//!         Ok(())
//!     }
//! }
//!
//! impl ZetaApp for MyApp {
//!     fn init(_gpu: &GpuContext, _config: &AppConfig) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::default())
//! }
//! ```

mod app;
mod events;
mod limiter;
mod logging;
mod runner;
mod window;

pub use app::ZetaApp;
pub use events::{EventQueue, NativeEvent};
pub use limiter::FrameLimiter;
pub use logging::init_logging;
pub use runner::{run_app, AppConfig};
pub use window::{ConfigureSerials, WindowHandle};

// Re-export commonly used types for convenience
pub use winit::keyboard::KeyCode;
pub use zeta_gpu::{GpuContext, GpuContextBuilder};
pub use zeta_present::{ClearRecorder, FrameContext, FrameRecorder, PresentConfig};
