//! Native window events queued for the frame loop.
//!
//! winit delivers events from its callbacks; the runner only reacts to them
//! between frames, draining an unbounded channel once per loop iteration.

use crossbeam::channel::{self, Receiver, Sender};
use winit::keyboard::KeyCode;

/// Event from the windowing system, as seen by the frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeEvent {
    /// The user asked to close the window.
    Quit,
    /// The window was resized; `serial` orders resize events.
    Resize { serial: u32, width: u32, height: u32 },
    /// A key changed state.
    Key { code: KeyCode, pressed: bool },
}

/// FIFO of native events drained once per loop iteration.
#[derive(Debug)]
pub struct EventQueue {
    tx: Sender<NativeEvent>,
    rx: Receiver<NativeEvent>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self { tx, rx }
    }

    pub fn push(&self, event: NativeEvent) {
        // The queue owns a receiver, so the channel cannot be disconnected.
        let _ = self.tx.send(event);
    }

    /// Take every event queued so far, oldest first.
    pub fn drain(&self) -> Vec<NativeEvent> {
        self.rx.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
