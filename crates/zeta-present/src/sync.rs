//! Frame synchronization.
//!
//! A fixed ring of frame slots bounds how far the CPU may run ahead of the
//! GPU. Present signals are indexed by swapchain image, not by slot, and are
//! rebuilt whenever the image count changes.

use crate::device::DeviceContext;
use crate::error::{PresentError, Result};
use ash::vk;
use tracing::{debug, trace};

/// Per-slot synchronization primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlot {
    /// Semaphore signaled when the acquired image is ready.
    pub acquire_signal: vk::Semaphore,
    /// Fence signaled when the slot's submission completes.
    pub fence: vk::Fence,
    /// Primary command buffer re-recorded every time the slot is used.
    pub command_buffer: vk::CommandBuffer,
}

/// Image index to the fence of the slot last rendering into it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImagesInFlight {
    fences: Vec<Option<vk::Fence>>,
}

impl ImagesInFlight {
    /// A table with `image_count` empty entries.
    pub fn new(image_count: u32) -> Self {
        Self {
            fences: vec![None; image_count as usize],
        }
    }

    /// Resize to `image_count` and clear every entry.
    pub fn reset(&mut self, image_count: u32) {
        self.fences.clear();
        self.fences.resize(image_count as usize, None);
    }

    pub fn len(&self) -> usize {
        self.fences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }

    /// Fence registered for `image_index`, if any.
    pub fn get(&self, image_index: u32) -> Option<vk::Fence> {
        self.fences.get(image_index as usize).copied().flatten()
    }

    /// Register `fence` for `image_index`, returning the fence it replaces.
    pub fn assign(&mut self, image_index: u32, fence: vk::Fence) -> Result<Option<vk::Fence>> {
        let image_count = self.fences.len() as u32;
        let entry = self
            .fences
            .get_mut(image_index as usize)
            .ok_or(PresentError::InvalidImageIndex {
                index: image_index,
                image_count,
            })?;
        Ok(entry.replace(fence))
    }
}

/// Owns the frame-slot ring, the present signals and the images-in-flight table.
pub struct FrameSynchronizer {
    command_pool: vk::CommandPool,
    slots: Vec<FrameSlot>,
    /// Slots whose acquire signal was left signaled by an abandoned frame.
    stale: Vec<bool>,
    present_signals: Vec<vk::Semaphore>,
    images_in_flight: ImagesInFlight,
    fence_timeout_ns: u64,
}

impl FrameSynchronizer {
    /// Create `frames_in_flight` slots with pre-signaled fences.
    ///
    /// Present signals are created later by [`Self::resize`], once the image
    /// count is known. On failure everything created so far is released.
    pub fn initialize<D: DeviceContext>(
        device: &D,
        frames_in_flight: usize,
        fence_timeout_ns: u64,
    ) -> Result<Self> {
        if frames_in_flight == 0 {
            return Err(PresentError::InvalidConfig(
                "frames in flight must be at least 1".to_string(),
            ));
        }

        let command_pool = device.create_command_pool(device.graphics_queue_family())?;
        let mut sync = Self {
            command_pool,
            slots: Vec::with_capacity(frames_in_flight),
            stale: vec![false; frames_in_flight],
            present_signals: Vec::new(),
            images_in_flight: ImagesInFlight::default(),
            fence_timeout_ns,
        };

        if let Err(e) = sync.create_slots(device, frames_in_flight) {
            sync.destroy(device);
            return Err(e);
        }

        debug!("Frame synchronizer initialized with {} slots", frames_in_flight);
        Ok(sync)
    }

    fn create_slots<D: DeviceContext>(&mut self, device: &D, count: usize) -> Result<()> {
        let command_buffers = device.allocate_command_buffers(self.command_pool, count as u32)?;
        for command_buffer in command_buffers {
            let acquire_signal = device.create_semaphore()?;
            let fence = match device.create_fence(true) {
                Ok(fence) => fence,
                Err(e) => {
                    device.destroy_semaphore(acquire_signal);
                    return Err(e);
                }
            };
            self.slots.push(FrameSlot {
                acquire_signal,
                fence,
                command_buffer,
            });
        }
        Ok(())
    }

    /// Number of slots in the ring.
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, slot: usize) -> Option<&FrameSlot> {
        self.slots.get(slot)
    }

    pub fn images_in_flight(&self) -> &ImagesInFlight {
        &self.images_in_flight
    }

    /// Present signal for `image_index`.
    pub fn present_signal(&self, image_index: u32) -> Result<vk::Semaphore> {
        self.present_signals
            .get(image_index as usize)
            .copied()
            .ok_or(PresentError::InvalidImageIndex {
                index: image_index,
                image_count: self.present_signals.len() as u32,
            })
    }

    fn require_slot(&self, slot: usize) -> Result<&FrameSlot> {
        self.slots.get(slot).ok_or_else(|| {
            PresentError::InvalidConfig(format!(
                "slot {slot} out of range ({} slots)",
                self.slots.len()
            ))
        })
    }

    /// Block until the slot's previous submission has completed.
    pub fn wait_for_slot<D: DeviceContext>(&self, device: &D, slot: usize) -> Result<()> {
        let fence = self.require_slot(slot)?.fence;
        device.wait_for_fence(fence, self.fence_timeout_ns)
    }

    /// Wait for any frame still rendering into `image_index`, then register
    /// the slot's fence against it.
    pub fn track_image<D: DeviceContext>(
        &mut self,
        device: &D,
        image_index: u32,
        slot: usize,
    ) -> Result<()> {
        let fence = self.require_slot(slot)?.fence;
        if image_index as usize >= self.images_in_flight.len() {
            return Err(PresentError::InvalidImageIndex {
                index: image_index,
                image_count: self.images_in_flight.len() as u32,
            });
        }

        if let Some(previous) = self.images_in_flight.get(image_index) {
            if previous != fence {
                trace!(image_index, "Waiting on fence of previous frame using image");
                device.wait_for_fence(previous, self.fence_timeout_ns)?;
            }
        }

        self.images_in_flight.assign(image_index, fence)?;
        Ok(())
    }

    /// Mark new work in flight for `slot` by resetting its fence.
    pub fn begin_frame<D: DeviceContext>(&self, device: &D, slot: usize) -> Result<()> {
        let fence = self.require_slot(slot)?.fence;
        device.reset_fence(fence)
    }

    /// Rebuild the present signals for `image_count` images and clear the
    /// images-in-flight table. The device must be idle.
    pub fn resize<D: DeviceContext>(&mut self, device: &D, image_count: u32) -> Result<()> {
        for semaphore in self.present_signals.drain(..) {
            device.destroy_semaphore(semaphore);
        }
        self.images_in_flight.reset(image_count);

        let mut signals = Vec::with_capacity(image_count as usize);
        for _ in 0..image_count {
            match device.create_semaphore() {
                Ok(semaphore) => signals.push(semaphore),
                Err(e) => {
                    for semaphore in signals {
                        device.destroy_semaphore(semaphore);
                    }
                    self.images_in_flight.reset(0);
                    return Err(e);
                }
            }
        }
        self.present_signals = signals;

        debug!("Present signals rebuilt for {} images", image_count);
        Ok(())
    }

    /// Flag the slot's acquire signal as signaled with no pending waiter.
    pub fn mark_acquire_stale(&mut self, slot: usize) {
        if let Some(stale) = self.stale.get_mut(slot) {
            *stale = true;
        }
    }

    pub fn is_acquire_stale(&self, slot: usize) -> bool {
        self.stale.get(slot).copied().unwrap_or(false)
    }

    /// Replace the acquire signal of `slot` with a fresh semaphore.
    ///
    /// Only valid after an idle barrier, when the old signal has no pending
    /// operation.
    pub fn retire_acquire_signal<D: DeviceContext>(&mut self, device: &D, slot: usize) -> Result<()> {
        self.require_slot(slot)?;
        let replacement = device.create_semaphore()?;
        let entry = &mut self.slots[slot];

        let old = std::mem::replace(&mut entry.acquire_signal, replacement);
        device.destroy_semaphore(old);
        if let Some(stale) = self.stale.get_mut(slot) {
            *stale = false;
        }
        trace!(slot, "Retired stale acquire signal");
        Ok(())
    }

    /// Retire every flagged acquire signal. The device must be idle.
    pub fn retire_stale_acquire_signals<D: DeviceContext>(&mut self, device: &D) -> Result<usize> {
        let mut retired = 0;
        for slot in 0..self.slots.len() {
            if self.is_acquire_stale(slot) {
                self.retire_acquire_signal(device, slot)?;
                retired += 1;
            }
        }
        Ok(retired)
    }

    /// Release present signals, slot primitives and the command pool.
    /// The device must be idle.
    pub fn destroy<D: DeviceContext>(&mut self, device: &D) {
        for semaphore in self.present_signals.drain(..) {
            device.destroy_semaphore(semaphore);
        }
        for slot in self.slots.drain(..) {
            device.destroy_semaphore(slot.acquire_signal);
            device.destroy_fence(slot.fence);
        }
        self.stale.clear();
        self.images_in_flight.reset(0);

        if self.command_pool != vk::CommandPool::null() {
            device.destroy_command_pool(self.command_pool);
            self.command_pool = vk::CommandPool::null();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn fence(raw: u64) -> vk::Fence {
        vk::Fence::from_raw(raw)
    }

    #[test]
    fn new_table_is_empty() {
        let table = ImagesInFlight::new(3);
        assert_eq!(table.len(), 3);
        assert!((0..3).all(|i| table.get(i).is_none()));
    }

    #[test]
    fn assign_replaces_previous_fence() {
        let mut table = ImagesInFlight::new(3);
        assert_eq!(table.assign(1, fence(10)).unwrap(), None);
        assert_eq!(table.assign(1, fence(11)).unwrap(), Some(fence(10)));
        assert_eq!(table.get(1), Some(fence(11)));
    }

    #[test]
    fn assign_rejects_out_of_range_index() {
        let mut table = ImagesInFlight::new(2);
        assert!(matches!(
            table.assign(2, fence(1)),
            Err(PresentError::InvalidImageIndex {
                index: 2,
                image_count: 2
            })
        ));
        assert_eq!(table.get(2), None);
    }

    #[test]
    fn reset_resizes_and_clears() {
        let mut table = ImagesInFlight::new(2);
        table.assign(0, fence(1)).unwrap();
        table.reset(4);
        assert_eq!(table.len(), 4);
        assert_eq!(table.get(0), None);

        table.reset(0);
        assert!(table.is_empty());
    }
}
