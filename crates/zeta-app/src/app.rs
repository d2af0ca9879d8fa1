//! `ZetaApp` trait definition.

use winit::keyboard::KeyCode;
use zeta_gpu::GpuContext;
use zeta_present::FrameRecorder;

use crate::runner::AppConfig;

/// Trait for Zeta applications.
///
/// The application is the frame recorder: the runner hands it to the
/// presenter, which calls [`FrameRecorder::record`] once per presented frame
/// with the acquired swapchain image. Everything else (window, swapchain,
/// frame slots, resize handling) is owned by the runner.
pub trait ZetaApp: FrameRecorder<GpuContext> + Sized {
    /// Initialize the application.
    ///
    /// Called once after the window and GPU context exist and before the
    /// first swapchain is built.
    fn init(gpu: &GpuContext, config: &AppConfig) -> anyhow::Result<Self>;

    /// Update application state.
    ///
    /// Called every loop iteration before the frame is drawn, with the delta
    /// time in seconds since the previous iteration.
    #[allow(unused_variables)]
    fn update(&mut self, dt: f32) {}

    /// Handle a key press or release.
    #[allow(unused_variables)]
    fn on_key(&mut self, code: KeyCode, pressed: bool) {}

    /// Called after the swapchain was rebuilt at a new size.
    #[allow(unused_variables)]
    fn on_resize(&mut self, width: u32, height: u32) {}

    /// Called once before the presenter shuts down. The GPU may still be busy.
    fn cleanup(&mut self) {}
}
