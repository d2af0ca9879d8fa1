//! Resize coordination.
//!
//! Resize notifications arrive at any time between frames. The coordinator
//! coalesces them into a single pending request, acknowledges the newest
//! configure serial exactly once, and runs swapchain recreation at a safe
//! point chosen by the caller.

use crate::device::ConfigureAck;
use crate::error::{PresentError, Result};
use tracing::debug;

/// A resize raised by the windowing system or by a stale swapchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeRequest {
    pub serial: u32,
    pub width: u32,
    pub height: u32,
    /// The serial has already been echoed back to the window system.
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeState {
    #[default]
    Stable,
    PendingConfigure(ResizeRequest),
    Recreating(ResizeRequest),
}

/// Result of [`ResizeCoordinator::process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeStatus {
    /// Nothing was pending.
    Stable,
    /// The swapchain was rebuilt at this size.
    Recreated { width: u32, height: u32 },
    /// The size has zero area; the request stays pending.
    Deferred { width: u32, height: u32 },
}

#[derive(Debug, Default)]
pub struct ResizeCoordinator {
    state: ResizeState,
    last_acknowledged: Option<u32>,
}

impl ResizeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ResizeState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        !matches!(self.state, ResizeState::Stable)
    }

    /// Newest serial echoed back to the window system.
    pub fn last_acknowledged(&self) -> Option<u32> {
        self.last_acknowledged
    }

    /// Record a configure event, replacing any pending request.
    pub fn notify(&mut self, serial: u32, width: u32, height: u32) {
        if let ResizeState::PendingConfigure(previous) = self.state {
            debug!(
                "Coalescing resize {} ({}x{}) into {} ({}x{})",
                previous.serial, previous.width, previous.height, serial, width, height
            );
        }

        self.state = ResizeState::PendingConfigure(ResizeRequest {
            serial,
            width,
            height,
            acknowledged: self.last_acknowledged == Some(serial),
        });
    }

    /// The swapchain went stale without a configure event.
    ///
    /// A pending request already carries the newest size and is kept.
    pub fn invalidate(&mut self, width: u32, height: u32) {
        if let ResizeState::PendingConfigure(_) = self.state {
            return;
        }

        debug!("Swapchain invalidated at {}x{}", width, height);
        self.state = ResizeState::PendingConfigure(ResizeRequest {
            serial: self.last_acknowledged.unwrap_or(0),
            width,
            height,
            acknowledged: true,
        });
    }

    /// Acknowledge and apply the pending request, if any.
    ///
    /// `recreate` runs with the coalesced size. A degenerate extent defers
    /// the request to the next call; any other error propagates and leaves
    /// it pending.
    pub fn process<W, F>(&mut self, window: &mut W, recreate: F) -> Result<ResizeStatus>
    where
        W: ConfigureAck + ?Sized,
        F: FnOnce(u32, u32) -> Result<()>,
    {
        let ResizeState::PendingConfigure(mut request) = self.state else {
            return Ok(ResizeStatus::Stable);
        };

        if !request.acknowledged {
            window.ack_configure(request.serial);
            request.acknowledged = true;
            self.last_acknowledged = Some(request.serial);
        }

        self.state = ResizeState::Recreating(request);
        match recreate(request.width, request.height) {
            Ok(()) => {
                self.state = ResizeState::Stable;
                Ok(ResizeStatus::Recreated {
                    width: request.width,
                    height: request.height,
                })
            }
            Err(PresentError::DegenerateExtent { .. }) => {
                debug!(
                    "Deferring resize to {}x{} until the surface has area",
                    request.width, request.height
                );
                self.state = ResizeState::PendingConfigure(request);
                Ok(ResizeStatus::Deferred {
                    width: request.width,
                    height: request.height,
                })
            }
            Err(e) => {
                self.state = ResizeState::PendingConfigure(request);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn degenerate(width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            Err(PresentError::DegenerateExtent { width, height })
        } else {
            Ok(())
        }
    }

    #[test]
    fn stable_without_requests() {
        let mut coordinator = ResizeCoordinator::new();
        let mut acks = Vec::new();
        let status = coordinator
            .process(&mut |serial: u32| acks.push(serial), |_, _| Ok(()))
            .unwrap();
        assert_eq!(status, ResizeStatus::Stable);
        assert!(acks.is_empty());
    }

    #[test]
    fn coalesces_to_latest_serial() {
        let mut coordinator = ResizeCoordinator::new();
        coordinator.notify(5, 640, 480);
        coordinator.notify(7, 1024, 768);

        let mut acks = Vec::new();
        let mut recreated = Vec::new();
        let status = coordinator
            .process(&mut |serial: u32| acks.push(serial), |w, h| {
                recreated.push((w, h));
                Ok(())
            })
            .unwrap();

        assert_eq!(acks, vec![7]);
        assert_eq!(recreated, vec![(1024, 768)]);
        assert_eq!(
            status,
            ResizeStatus::Recreated {
                width: 1024,
                height: 768
            }
        );
        assert_eq!(coordinator.state(), ResizeState::Stable);
    }

    #[test]
    fn zero_size_defers_then_recreates() {
        let mut coordinator = ResizeCoordinator::new();
        let mut acks = Vec::new();

        coordinator.notify(1, 0, 0);
        let status = coordinator
            .process(&mut |serial: u32| acks.push(serial), degenerate)
            .unwrap();
        assert_eq!(status, ResizeStatus::Deferred { width: 0, height: 0 });
        assert!(coordinator.is_pending());

        coordinator.notify(2, 800, 600);
        let status = coordinator
            .process(&mut |serial: u32| acks.push(serial), degenerate)
            .unwrap();
        assert_eq!(
            status,
            ResizeStatus::Recreated {
                width: 800,
                height: 600
            }
        );
        assert_eq!(acks, vec![1, 2]);
    }

    #[test]
    fn deferred_request_is_not_acknowledged_twice() {
        let mut coordinator = ResizeCoordinator::new();
        let mut acks = Vec::new();

        coordinator.notify(3, 0, 600);
        coordinator
            .process(&mut |serial: u32| acks.push(serial), degenerate)
            .unwrap();
        coordinator
            .process(&mut |serial: u32| acks.push(serial), degenerate)
            .unwrap();
        // Re-delivery of the acknowledged serial
        coordinator.notify(3, 0, 600);
        coordinator
            .process(&mut |serial: u32| acks.push(serial), degenerate)
            .unwrap();

        assert_eq!(acks, vec![3]);
        assert_eq!(coordinator.last_acknowledged(), Some(3));
    }

    #[test]
    fn invalidate_needs_no_acknowledgement() {
        let mut coordinator = ResizeCoordinator::new();
        coordinator.invalidate(800, 600);

        let mut acks = Vec::new();
        let status = coordinator
            .process(&mut |serial: u32| acks.push(serial), |_, _| Ok(()))
            .unwrap();
        assert!(acks.is_empty());
        assert_eq!(
            status,
            ResizeStatus::Recreated {
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn invalidate_keeps_pending_configure() {
        let mut coordinator = ResizeCoordinator::new();
        coordinator.notify(9, 1280, 720);
        coordinator.invalidate(800, 600);

        match coordinator.state() {
            ResizeState::PendingConfigure(request) => {
                assert_eq!(request.serial, 9);
                assert_eq!((request.width, request.height), (1280, 720));
                assert!(!request.acknowledged);
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn fatal_error_keeps_request_pending() {
        let mut coordinator = ResizeCoordinator::new();
        coordinator.notify(4, 800, 600);
        let result = coordinator.process(&mut |_: u32| {}, |_, _| Err(PresentError::DeviceLost));

        assert!(matches!(result, Err(PresentError::DeviceLost)));
        assert!(matches!(
            coordinator.state(),
            ResizeState::PendingConfigure(ResizeRequest {
                serial: 4,
                acknowledged: true,
                ..
            })
        ));
    }
}
