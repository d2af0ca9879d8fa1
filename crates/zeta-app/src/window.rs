//! Window adapter for the configure handshake.
//!
//! winit has no configure serials, so the adapter hands out its own
//! monotonically increasing ones and treats acknowledgement as bookkeeping.

use std::sync::Arc;

use winit::dpi::PhysicalSize;
use winit::window::Window;
use zeta_present::ConfigureAck;

/// Serial source and acknowledgement record for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigureSerials {
    next: u32,
    last_acked: Option<u32>,
}

impl Default for ConfigureSerials {
    fn default() -> Self {
        Self {
            next: 1,
            last_acked: None,
        }
    }
}

impl ConfigureSerials {
    /// Allocate the serial for a new size notification.
    pub fn next_serial(&mut self) -> u32 {
        let serial = self.next;
        self.next = self.next.wrapping_add(1);
        serial
    }

    pub fn last_acknowledged(&self) -> Option<u32> {
        self.last_acked
    }
}

impl ConfigureAck for ConfigureSerials {
    fn ack_configure(&mut self, serial: u32) {
        tracing::trace!(serial, "configure acknowledged");
        self.last_acked = Some(serial);
    }
}

/// The application window plus its configure serials.
#[derive(Debug, Clone)]
pub struct WindowHandle {
    window: Arc<Window>,
    serials: ConfigureSerials,
}

impl WindowHandle {
    pub fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            serials: ConfigureSerials::default(),
        }
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn inner_size(&self) -> PhysicalSize<u32> {
        self.window.inner_size()
    }

    pub fn next_serial(&mut self) -> u32 {
        self.serials.next_serial()
    }

    pub fn last_acknowledged(&self) -> Option<u32> {
        self.serials.last_acknowledged()
    }
}

impl ConfigureAck for WindowHandle {
    fn ack_configure(&mut self, serial: u32) {
        self.serials.ack_configure(serial);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serials_increase_from_one() {
        let mut serials = ConfigureSerials::default();
        assert_eq!(serials.next_serial(), 1);
        assert_eq!(serials.next_serial(), 2);
        assert_eq!(serials.next_serial(), 3);
    }

    #[test]
    fn serials_wrap() {
        let mut serials = ConfigureSerials {
            next: u32::MAX,
            last_acked: None,
        };
        assert_eq!(serials.next_serial(), u32::MAX);
        assert_eq!(serials.next_serial(), 0);
    }

    #[test]
    fn ack_records_latest_serial() {
        let mut serials = ConfigureSerials::default();
        assert_eq!(serials.last_acknowledged(), None);

        serials.ack_configure(4);
        serials.ack_configure(7);
        assert_eq!(serials.last_acknowledged(), Some(7));
    }
}
