//! Test support for the Zeta engine.
//!
//! [`MockGpu`] is a software stand-in for a Vulkan device and window surface.
//! It implements the `zeta-present` device and surface seams on top of a
//! deterministic queue timeline: submitted work only completes when the CPU
//! blocks on it (a fence wait, an acquire of a busy image, or an idle wait).
//! Every call is checked against the synchronization rules a validation layer
//! would enforce, and every observable step is appended to an event log.

pub mod mock;

pub use mock::{
    AcquireStep, FenceState, HandleKind, MockConfig, MockDevice, MockEvent, MockFault, MockGpu,
    MockSurface, PresentStep,
};

use thiserror::Error;

/// Failures of the scenario helpers themselves (not of the code under test).
#[derive(Error, Debug)]
pub enum TestError {
    #[error("validation failed: {0:?}")]
    Validation(Vec<String>),
    #[error("presentation error: {0}")]
    Present(#[from] zeta_present::PresentError),
}

pub type Result<T> = std::result::Result<T, TestError>;
