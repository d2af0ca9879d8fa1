//! Shared helpers for the presentation scenarios.

#![allow(dead_code)]

use ash::vk;
use zeta_present::{ClearRecorder, PresentConfig, Presenter};
use zeta_test::{MockEvent, MockGpu, MockSurface};

pub type MockPresenter = Presenter<MockSurface, ClearRecorder>;

pub const WIDTH: u32 = 800;
pub const HEIGHT: u32 = 600;

/// Presenter over `gpu` with an 800x600 window.
pub fn presenter(gpu: &MockGpu, config: PresentConfig) -> MockPresenter {
    Presenter::init(
        gpu.device(),
        gpu.surface(),
        WIDTH,
        HEIGHT,
        config,
        ClearRecorder::new([0.1, 0.2, 0.3, 1.0]),
    )
    .expect("presenter init")
}

/// Window collaborator that ignores configure acknowledgements.
pub fn ignore_ack(_serial: u32) {}

/// Position of the first event matching `predicate`.
pub fn position(events: &[MockEvent], predicate: impl Fn(&MockEvent) -> bool) -> Option<usize> {
    events.iter().position(predicate)
}

/// Fence waits in order, with whether each one found the fence signaled.
pub fn fence_waits(events: &[MockEvent]) -> Vec<(vk::Fence, bool)> {
    events
        .iter()
        .filter_map(|event| match event {
            MockEvent::FenceWait {
                fence,
                was_signaled,
            } => Some((*fence, *was_signaled)),
            _ => None,
        })
        .collect()
}

/// The most recent swapchain creation.
pub fn last_created(events: &[MockEvent]) -> Option<MockEvent> {
    events
        .iter()
        .rev()
        .find(|event| matches!(event, MockEvent::SwapchainCreated { .. }))
        .cloned()
}
