//! Vulkan device context for the Zeta engine.
//!
//! This crate provides:
//! - Vulkan instance creation and physical device selection
//! - A logical device with a single graphics queue
//! - Window surfaces and the swapchain extension loader
//! - Command pool, fence and semaphore helpers
//! - Raw swapchain calls (create, acquire, present)

pub mod command;
pub mod context;
pub mod error;
pub mod instance;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use context::{GpuContext, GpuContextBuilder};
pub use error::{GpuError, Result};
pub use surface::{SurfaceContext, SurfaceSupport};
pub use sync::{create_fence, create_semaphore, reset_fence, wait_for_fence};
