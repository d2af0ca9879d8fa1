//! Frame presentation core for the Zeta engine.
//!
//! This crate owns everything between "the application wants a frame" and
//! "the image is on screen":
//! - [`SwapchainManager`]: the presentable image chain and its recreation
//! - [`FrameSynchronizer`]: the ring of frame slots, per-image present signals
//!   and the images-in-flight table
//! - [`FrameDriver`]: the per-frame wait/acquire/record/submit/present cycle
//! - [`ResizeCoordinator`]: coalescing and acknowledging resize requests
//! - [`Presenter`]: the facade the application drives
//!
//! The GPU and the windowing system are reached only through the
//! [`DeviceContext`], [`PresentSurface`] and [`ConfigureAck`] traits. The
//! Vulkan implementations for `zeta-gpu` types live in [`vulkan`].
//!
//! # Example
//!
//! ```ignore
//! use zeta_present::{ClearRecorder, PresentConfig, Presenter};
//!
//! let mut presenter = Presenter::init(gpu, surface, 1280, 720, PresentConfig::default(),
//!     ClearRecorder::new([0.1, 0.1, 0.1, 1.0]))?;
//!
//! loop {
//!     presenter.poll_resize(&mut window)?;
//!     presenter.draw_frame()?;
//! }
//!
//! presenter.shutdown()?;
//! ```

pub mod config;
pub mod device;
pub mod driver;
pub mod error;
pub mod presenter;
pub mod record;
pub mod resize;
pub mod swapchain;
pub mod sync;
pub mod vulkan;

pub use config::PresentConfig;
pub use device::{ConfigureAck, DeviceContext, ImageBarrier, PresentSurface, Submission};
pub use driver::{FrameDriver, FrameOutcome, FrameState};
pub use error::{PresentError, Result};
pub use presenter::Presenter;
pub use record::{ClearRecorder, FrameContext, FrameRecorder};
pub use resize::{ResizeCoordinator, ResizeRequest, ResizeState, ResizeStatus};
pub use swapchain::{AcquiredImage, SwapchainImage, SwapchainManager, SwapchainState};
pub use sync::{FrameSlot, FrameSynchronizer, ImagesInFlight};

pub use zeta_gpu::swapchain::SwapchainDescriptor;
pub use zeta_gpu::SurfaceSupport;
