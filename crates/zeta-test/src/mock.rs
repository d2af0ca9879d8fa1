//! Mock GPU timeline.

use crate::{Result as TestResult, TestError};
use ash::vk::{self, Handle};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::warn;
use zeta_present::{
    DeviceContext, ImageBarrier, PresentError, PresentSurface, Result, Submission,
    SurfaceSupport, SwapchainDescriptor,
};

/// Kind of a live mock handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HandleKind {
    Semaphore,
    Fence,
    CommandPool,
    CommandBuffer,
    Swapchain,
    Image,
}

/// Host-visible state of a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceState {
    Unsignaled,
    /// Attached to a submission that has not completed yet.
    Pending,
    Signaled,
}

/// Scripted result of the next acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStep {
    Image(u32),
    Suboptimal(u32),
    OutOfDate,
    Fail(vk::Result),
}

/// Scripted result of the next presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStep {
    Optimal,
    Suboptimal,
    OutOfDate,
    Fail(vk::Result),
}

/// One-shot failure injected into the next matching call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFault {
    CreateSemaphore(vk::Result),
    CreateFence(vk::Result),
    CreateSwapchain(vk::Result),
    Submit(vk::Result),
    WaitIdle(vk::Result),
}

/// Observable step on the mock timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    FenceWait {
        fence: vk::Fence,
        /// The fence was already signaled, so the wait did not block.
        was_signaled: bool,
    },
    FenceReset {
        fence: vk::Fence,
    },
    Submit {
        id: u64,
        fence: vk::Fence,
        wait: vk::Semaphore,
        signal: Option<vk::Semaphore>,
        images: Vec<vk::Image>,
    },
    SubmissionCompleted {
        id: u64,
        fence: vk::Fence,
    },
    Acquire {
        swapchain: vk::SwapchainKHR,
        /// `None` when the swapchain was out of date.
        index: Option<u32>,
        suboptimal: bool,
    },
    Present {
        swapchain: vk::SwapchainKHR,
        index: u32,
        step: PresentStep,
    },
    WaitIdle,
    SwapchainCreated {
        handle: vk::SwapchainKHR,
        old: vk::SwapchainKHR,
        min_image_count: u32,
        image_count: u32,
        extent: vk::Extent2D,
    },
    SwapchainDestroyed {
        handle: vk::SwapchainKHR,
    },
    SurfaceDestroyed,
    DeviceDropped,
}

/// Surface properties reported by the mock.
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
    /// Images created beyond the requested minimum.
    pub extra_images: u32,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 8,
                current_extent: vk::Extent2D {
                    width: u32::MAX,
                    height: u32::MAX,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                max_image_array_layers: 1,
                supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::TRANSFER_DST,
                ..Default::default()
            },
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            extra_images: 0,
        }
    }
}

impl MockConfig {
    pub fn with_image_count_range(mut self, min: u32, max: u32) -> Self {
        self.capabilities.min_image_count = min;
        self.capabilities.max_image_count = max;
        self
    }

    /// Image usage the surface reports as supported.
    pub fn with_usage_flags(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.capabilities.supported_usage_flags = usage;
        self
    }

    /// Report a fixed surface size, as compositors without window-defined
    /// extents do.
    pub fn with_fixed_extent(mut self, width: u32, height: u32) -> Self {
        self.capabilities.current_extent = vk::Extent2D { width, height };
        self
    }

    pub fn with_extra_images(mut self, extra: u32) -> Self {
        self.extra_images = extra;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageUse {
    Available,
    Acquired,
    Presenting,
}

#[derive(Debug)]
struct SwapchainRecord {
    images: Vec<u64>,
    usage: Vec<ImageUse>,
    cursor: usize,
}

#[derive(Debug)]
struct ImageRecord {
    layout: vk::ImageLayout,
}

#[derive(Debug, Default)]
struct CommandBufferRecord {
    recording: bool,
    pending: bool,
    barriers: Vec<ImageBarrier>,
    touched: Vec<u64>,
}

#[derive(Debug)]
enum QueueOp {
    Submit {
        id: u64,
        command_buffer: Option<u64>,
        images: Vec<u64>,
        fence: u64,
    },
    Present {
        swapchain: u64,
        index: u32,
    },
}

#[derive(Debug, Default)]
struct MockState {
    config: MockConfig,
    next_handle: u64,
    next_submission: u64,
    live: BTreeMap<u64, HandleKind>,
    fences: BTreeMap<u64, FenceState>,
    /// `true` while a signal has been queued that no wait has consumed.
    semaphores: BTreeMap<u64, bool>,
    pools: BTreeMap<u64, Vec<u64>>,
    command_buffers: BTreeMap<u64, CommandBufferRecord>,
    swapchains: BTreeMap<u64, SwapchainRecord>,
    images: BTreeMap<u64, ImageRecord>,
    queue: VecDeque<QueueOp>,
    acquire_script: VecDeque<AcquireStep>,
    present_script: VecDeque<PresentStep>,
    faults: Vec<MockFault>,
    events: Vec<MockEvent>,
    messages: Vec<String>,
    surface_destroyed: bool,
}

impl MockState {
    fn allocate(&mut self, kind: HandleKind) -> u64 {
        self.next_handle += 1;
        let raw = self.next_handle;
        self.live.insert(raw, kind);
        raw
    }

    fn release(&mut self, raw: u64, kind: HandleKind) -> bool {
        match self.live.get(&raw).copied() {
            Some(found) if found == kind => {
                self.live.remove(&raw);
                true
            }
            Some(found) => {
                self.validation(format!("destroying {kind:?} {raw:#x} which is a {found:?}"));
                false
            }
            None => {
                self.validation(format!("destroying unknown or already destroyed {kind:?} {raw:#x}"));
                false
            }
        }
    }

    fn validation(&mut self, message: String) {
        warn!("Mock validation: {}", message);
        self.messages.push(message);
    }

    fn take_fault(&mut self, matches: impl Fn(&MockFault) -> Option<vk::Result>) -> Option<vk::Result> {
        let position = self.faults.iter().position(|fault| matches(fault).is_some())?;
        let fault = self.faults.remove(position);
        matches(&fault)
    }

    /// Complete the oldest queued operation.
    fn retire_one(&mut self) -> bool {
        let Some(op) = self.queue.pop_front() else {
            return false;
        };
        match op {
            QueueOp::Submit {
                id,
                command_buffer,
                fence,
                ..
            } => {
                self.fences.insert(fence, FenceState::Signaled);
                if let Some(cmd) = command_buffer.and_then(|cmd| self.command_buffers.get_mut(&cmd)) {
                    cmd.pending = false;
                }
                self.events.push(MockEvent::SubmissionCompleted {
                    id,
                    fence: vk::Fence::from_raw(fence),
                });
            }
            QueueOp::Present { swapchain, index } => {
                if let Some(record) = self.swapchains.get_mut(&swapchain) {
                    if let Some(usage) = record.usage.get_mut(index as usize) {
                        *usage = ImageUse::Available;
                    }
                }
            }
        }
        true
    }

    fn retire_until(&mut self, mut done: impl FnMut(&Self) -> bool) {
        while !done(self) {
            if !self.retire_one() {
                break;
            }
        }
    }

    fn image_busy(&self, image: u64) -> bool {
        self.queue.iter().any(|op| match op {
            QueueOp::Submit { images, .. } => images.contains(&image),
            QueueOp::Present { swapchain, index } => self
                .swapchains
                .get(swapchain)
                .and_then(|record| record.images.get(*index as usize))
                .is_some_and(|raw| *raw == image),
        })
    }

    fn acquire_index(&mut self, swapchain: u64, requested: Option<u32>) -> Option<u32> {
        let (usage, cursor) = {
            let record = self.swapchains.get(&swapchain)?;
            (record.usage.clone(), record.cursor)
        };
        let count = usage.len();

        let index = if let Some(index) = requested {
            if index as usize >= count {
                self.validation(format!("scripted acquire of image {index} beyond {count} images"));
                return None;
            }
            if usage[index as usize] == ImageUse::Acquired {
                self.validation(format!(
                    "image {index} acquired while still held by the application"
                ));
            }
            index
        } else {
            let candidate = (0..count)
                .map(|offset| (cursor + offset) % count)
                .find(|&i| usage[i] != ImageUse::Acquired)?;
            candidate as u32
        };

        // Block until the presentation engine releases the image
        self.retire_until(|state| {
            state
                .swapchains
                .get(&swapchain)
                .map_or(true, |record| record.usage[index as usize] != ImageUse::Presenting)
        });

        let record = self.swapchains.get_mut(&swapchain)?;
        record.usage[index as usize] = ImageUse::Acquired;
        record.cursor = (index as usize + 1) % count;
        Some(index)
    }
}

/// Shared handle to the mock GPU.
///
/// Cloning is cheap; every clone observes the same timeline.
#[derive(Clone, Default)]
pub struct MockGpu {
    state: Arc<Mutex<MockState>>,
}

impl MockGpu {
    pub fn new(config: MockConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                config,
                ..MockState::default()
            })),
        }
    }

    /// A device bound to this timeline.
    pub fn device(&self) -> MockDevice {
        MockDevice {
            state: Arc::clone(&self.state),
        }
    }

    /// A surface bound to this timeline.
    pub fn surface(&self) -> MockSurface {
        MockSurface {
            state: Arc::clone(&self.state),
        }
    }

    /// Queue results for upcoming acquisitions. Unscripted acquisitions hand
    /// out images round-robin.
    pub fn script_acquire(&self, steps: impl IntoIterator<Item = AcquireStep>) {
        self.state.lock().acquire_script.extend(steps);
    }

    /// Queue results for upcoming presentations. Unscripted presentations are optimal.
    pub fn script_present(&self, steps: impl IntoIterator<Item = PresentStep>) {
        self.state.lock().present_script.extend(steps);
    }

    pub fn inject(&self, fault: MockFault) {
        self.state.lock().faults.push(fault);
    }

    /// Change the size the surface reports; `None` lets the window decide.
    pub fn set_surface_extent(&self, extent: Option<(u32, u32)>) {
        let (width, height) = extent.unwrap_or((u32::MAX, u32::MAX));
        self.state.lock().config.capabilities.current_extent = vk::Extent2D { width, height };
    }

    pub fn set_image_count_range(&self, min: u32, max: u32) {
        let mut state = self.state.lock();
        state.config.capabilities.min_image_count = min;
        state.config.capabilities.max_image_count = max;
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.state.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    pub fn validation_messages(&self) -> Vec<String> {
        self.state.lock().messages.clone()
    }

    /// Fail if any validation message was recorded.
    pub fn check(&self) -> TestResult<()> {
        let messages = self.validation_messages();
        if messages.is_empty() {
            Ok(())
        } else {
            Err(TestError::Validation(messages))
        }
    }

    pub fn live_handle_count(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn live_handles(&self) -> Vec<(u64, HandleKind)> {
        self.state
            .lock()
            .live
            .iter()
            .map(|(raw, kind)| (*raw, *kind))
            .collect()
    }

    pub fn surface_destroyed(&self) -> bool {
        self.state.lock().surface_destroyed
    }

    pub fn fence_state(&self, fence: vk::Fence) -> Option<FenceState> {
        self.state.lock().fences.get(&fence.as_raw()).copied()
    }

    /// Queue operations that have not completed yet.
    pub fn pending_operations(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Let the GPU finish everything queued so far.
    pub fn drain(&self) {
        let mut state = self.state.lock();
        while state.retire_one() {}
    }
}

impl std::fmt::Debug for MockGpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockGpu")
            .field("live_handles", &state.live.len())
            .field("pending", &state.queue.len())
            .field("messages", &state.messages.len())
            .finish_non_exhaustive()
    }
}

/// Mock logical device.
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.state.lock().events.push(MockEvent::DeviceDropped);
    }
}

impl std::fmt::Debug for MockDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDevice").finish_non_exhaustive()
    }
}

impl DeviceContext for MockDevice {
    fn graphics_queue_family(&self) -> u32 {
        0
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        let mut state = self.state.lock();
        if let Some(result) = state.take_fault(|fault| match fault {
            MockFault::CreateSemaphore(result) => Some(*result),
            _ => None,
        }) {
            return Err(result.into());
        }
        let raw = state.allocate(HandleKind::Semaphore);
        state.semaphores.insert(raw, false);
        Ok(vk::Semaphore::from_raw(raw))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut state = self.state.lock();
        if state.release(semaphore.as_raw(), HandleKind::Semaphore) {
            state.semaphores.remove(&semaphore.as_raw());
        }
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let mut state = self.state.lock();
        if let Some(result) = state.take_fault(|fault| match fault {
            MockFault::CreateFence(result) => Some(*result),
            _ => None,
        }) {
            return Err(result.into());
        }
        let raw = state.allocate(HandleKind::Fence);
        let initial = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        state.fences.insert(raw, initial);
        Ok(vk::Fence::from_raw(raw))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.lock();
        if state.fences.get(&fence.as_raw()) == Some(&FenceState::Pending) {
            state.validation(format!("destroying fence {:#x} while in flight", fence.as_raw()));
        }
        if state.release(fence.as_raw(), HandleKind::Fence) {
            state.fences.remove(&fence.as_raw());
        }
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> Result<()> {
        let mut state = self.state.lock();
        let raw = fence.as_raw();
        match state.fences.get(&raw).copied() {
            Some(FenceState::Signaled) => {
                state.events.push(MockEvent::FenceWait {
                    fence,
                    was_signaled: true,
                });
                Ok(())
            }
            Some(FenceState::Pending) => {
                state.events.push(MockEvent::FenceWait {
                    fence,
                    was_signaled: false,
                });
                state.retire_until(|state| state.fences.get(&raw) != Some(&FenceState::Pending));
                Ok(())
            }
            Some(FenceState::Unsignaled) => {
                state.validation(format!(
                    "waiting on fence {raw:#x} that no submission will signal"
                ));
                Err(PresentError::Timeout)
            }
            None => {
                state.validation(format!("waiting on unknown fence {raw:#x}"));
                Err(PresentError::Timeout)
            }
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        let mut state = self.state.lock();
        let raw = fence.as_raw();
        if state.fences.get(&raw) == Some(&FenceState::Pending) {
            state.validation(format!("resetting fence {raw:#x} while in flight"));
        }
        state.fences.insert(raw, FenceState::Unsignaled);
        state.events.push(MockEvent::FenceReset { fence });
        Ok(())
    }

    fn create_command_pool(&self, _queue_family: u32) -> Result<vk::CommandPool> {
        let mut state = self.state.lock();
        let raw = state.allocate(HandleKind::CommandPool);
        state.pools.insert(raw, Vec::new());
        Ok(vk::CommandPool::from_raw(raw))
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let mut state = self.state.lock();
        if !state.pools.contains_key(&pool.as_raw()) {
            state.validation(format!("allocating from unknown pool {:#x}", pool.as_raw()));
            return Err(vk::Result::ERROR_UNKNOWN.into());
        }

        let mut buffers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let raw = state.allocate(HandleKind::CommandBuffer);
            state
                .command_buffers
                .insert(raw, CommandBufferRecord::default());
            if let Some(owned) = state.pools.get_mut(&pool.as_raw()) {
                owned.push(raw);
            }
            buffers.push(vk::CommandBuffer::from_raw(raw));
        }
        Ok(buffers)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        let mut state = self.state.lock();
        let raw = pool.as_raw();
        if !state.release(raw, HandleKind::CommandPool) {
            return;
        }
        for cmd in state.pools.remove(&raw).unwrap_or_default() {
            let pending = state
                .command_buffers
                .remove(&cmd)
                .is_some_and(|record| record.pending);
            if pending {
                state.validation(format!("command buffer {cmd:#x} freed while in flight"));
            }
            state.live.remove(&cmd);
        }
    }

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        let mut state = self.state.lock();
        let raw = command_buffer.as_raw();
        let pending = match state.command_buffers.get_mut(&raw) {
            Some(record) => {
                let pending = record.pending;
                record.recording = false;
                record.barriers.clear();
                record.touched.clear();
                pending
            }
            None => {
                state.validation(format!("resetting unknown command buffer {raw:#x}"));
                return Ok(());
            }
        };
        if pending {
            state.validation(format!("resetting command buffer {raw:#x} while in flight"));
        }
        Ok(())
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        let mut state = self.state.lock();
        let raw = command_buffer.as_raw();
        match state.command_buffers.get_mut(&raw) {
            Some(record) if !record.recording => record.recording = true,
            Some(_) => state.validation(format!("command buffer {raw:#x} begun twice")),
            None => state.validation(format!("beginning unknown command buffer {raw:#x}")),
        }
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        let mut state = self.state.lock();
        let raw = command_buffer.as_raw();
        match state.command_buffers.get_mut(&raw) {
            Some(record) if record.recording => record.recording = false,
            _ => state.validation(format!("ending command buffer {raw:#x} that is not recording")),
        }
        Ok(())
    }

    fn cmd_image_barrier(&self, command_buffer: vk::CommandBuffer, barrier: &ImageBarrier) {
        let mut state = self.state.lock();
        let raw = command_buffer.as_raw();
        let image = barrier.image.as_raw();
        match state.command_buffers.get_mut(&raw) {
            Some(record) if record.recording => {
                record.barriers.push(*barrier);
                if !record.touched.contains(&image) {
                    record.touched.push(image);
                }
            }
            _ => state.validation(format!("barrier recorded outside recording on {raw:#x}")),
        }
    }

    fn cmd_clear_color(&self, command_buffer: vk::CommandBuffer, image: vk::Image, _color: [f32; 4]) {
        let mut state = self.state.lock();
        let raw = command_buffer.as_raw();
        let image = image.as_raw();
        let expected = match state.command_buffers.get_mut(&raw) {
            Some(record) if record.recording => {
                if !record.touched.contains(&image) {
                    record.touched.push(image);
                }
                record
                    .barriers
                    .iter()
                    .rev()
                    .find(|barrier| barrier.image.as_raw() == image)
                    .map(|barrier| barrier.new_layout)
            }
            _ => {
                state.validation(format!("clear recorded outside recording on {raw:#x}"));
                return;
            }
        };
        if expected != Some(vk::ImageLayout::TRANSFER_DST_OPTIMAL) {
            state.validation(format!(
                "clearing image {image:#x} in layout {expected:?} instead of TRANSFER_DST_OPTIMAL"
            ));
        }
    }

    fn submit(&self, submission: &Submission) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(result) = state.take_fault(|fault| match fault {
            MockFault::Submit(result) => Some(*result),
            _ => None,
        }) {
            return Err(result.into());
        }

        let fence = submission.fence.as_raw();
        match state.fences.get(&fence).copied() {
            Some(FenceState::Unsignaled) => {}
            Some(other) => state.validation(format!(
                "submitting with fence {fence:#x} in state {other:?}"
            )),
            None => state.validation(format!("submitting with unknown fence {fence:#x}")),
        }

        let wait = submission.wait_semaphore.as_raw();
        match state.semaphores.get(&wait).copied() {
            Some(true) => {
                state.semaphores.insert(wait, false);
            }
            Some(false) => state.validation(format!(
                "waiting on semaphore {wait:#x} with no pending signal"
            )),
            None => state.validation(format!("waiting on unknown semaphore {wait:#x}")),
        }

        if let Some(signal) = submission.signal_semaphore {
            let signal = signal.as_raw();
            match state.semaphores.get(&signal).copied() {
                Some(false) => {
                    state.semaphores.insert(signal, true);
                }
                Some(true) => state.validation(format!(
                    "signaling semaphore {signal:#x} that is already signaled"
                )),
                None => state.validation(format!("signaling unknown semaphore {signal:#x}")),
            }
        }

        let mut images = Vec::new();
        if let Some(cmd) = submission.command_buffer {
            let raw = cmd.as_raw();
            let recorded = state.command_buffers.get_mut(&raw).map(|record| {
                let flags = (record.recording, record.pending);
                record.pending = true;
                (flags, record.barriers.clone(), record.touched.clone())
            });
            let (barriers, touched) = match recorded {
                Some(((recording, pending), barriers, touched)) => {
                    if recording {
                        state.validation(format!("submitting command buffer {raw:#x} still recording"));
                    }
                    if pending {
                        state.validation(format!("submitting command buffer {raw:#x} already in flight"));
                    }
                    (barriers, touched)
                }
                None => {
                    state.validation(format!("submitting unknown command buffer {raw:#x}"));
                    (Vec::new(), Vec::new())
                }
            };

            for image in &touched {
                if state.image_busy(*image) {
                    state.validation(format!(
                        "image {image:#x} written by two in-flight submissions"
                    ));
                }
            }

            for barrier in barriers {
                let image = barrier.image.as_raw();
                let current = state.images.get(&image).map(|record| record.layout);
                match current {
                    Some(layout) => {
                        if barrier.old_layout != vk::ImageLayout::UNDEFINED
                            && barrier.old_layout != layout
                        {
                            state.validation(format!(
                                "image {image:#x} transitioned from {:?} but is in {layout:?}",
                                barrier.old_layout
                            ));
                        }
                        if let Some(record) = state.images.get_mut(&image) {
                            record.layout = barrier.new_layout;
                        }
                    }
                    None => state.validation(format!("barrier on unknown image {image:#x}")),
                }
            }
            images = touched;
        }

        state.fences.insert(fence, FenceState::Pending);
        state.next_submission += 1;
        let id = state.next_submission;
        state.events.push(MockEvent::Submit {
            id,
            fence: submission.fence,
            wait: submission.wait_semaphore,
            signal: submission.signal_semaphore,
            images: images.iter().map(|raw| vk::Image::from_raw(*raw)).collect(),
        });
        state.queue.push_back(QueueOp::Submit {
            id,
            command_buffer: submission.command_buffer.map(|cmd| cmd.as_raw()),
            images,
            fence,
        });
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(result) = state.take_fault(|fault| match fault {
            MockFault::WaitIdle(result) => Some(*result),
            _ => None,
        }) {
            return Err(result.into());
        }
        while state.retire_one() {}
        state.events.push(MockEvent::WaitIdle);
        Ok(())
    }
}

/// Mock window surface.
pub struct MockSurface {
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSurface").finish_non_exhaustive()
    }
}

impl PresentSurface for MockSurface {
    type Device = MockDevice;

    fn query_support(&self, _device: &MockDevice) -> Result<SurfaceSupport> {
        let state = self.state.lock();
        if state.surface_destroyed {
            return Err(PresentError::SurfaceLost);
        }
        Ok(SurfaceSupport {
            capabilities: state.config.capabilities,
            formats: state.config.formats.clone(),
            present_modes: state.config.present_modes.clone(),
        })
    }

    fn create_swapchain(
        &self,
        _device: &MockDevice,
        descriptor: &SwapchainDescriptor,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<vk::SwapchainKHR> {
        let mut state = self.state.lock();
        if let Some(result) = state.take_fault(|fault| match fault {
            MockFault::CreateSwapchain(result) => Some(*result),
            _ => None,
        }) {
            return Err(result.into());
        }

        let caps = state.config.capabilities;
        if descriptor.min_image_count < caps.min_image_count {
            state.validation(format!(
                "requested {} images, surface minimum is {}",
                descriptor.min_image_count, caps.min_image_count
            ));
        }
        if caps.max_image_count > 0 && descriptor.min_image_count > caps.max_image_count {
            state.validation(format!(
                "requested {} images, surface maximum is {}",
                descriptor.min_image_count, caps.max_image_count
            ));
        }
        if descriptor.extent.width == 0 || descriptor.extent.height == 0 {
            state.validation("swapchain with zero-area extent".to_string());
        }
        if old_swapchain != vk::SwapchainKHR::null()
            && !state.swapchains.contains_key(&old_swapchain.as_raw())
        {
            state.validation(format!(
                "old swapchain {:#x} is not live",
                old_swapchain.as_raw()
            ));
        }

        let mut image_count = descriptor.min_image_count + state.config.extra_images;
        if caps.max_image_count > 0 {
            image_count = image_count.min(caps.max_image_count);
        }

        let handle = state.allocate(HandleKind::Swapchain);
        let mut images = Vec::with_capacity(image_count as usize);
        for _ in 0..image_count {
            let image = state.allocate(HandleKind::Image);
            state.images.insert(
                image,
                ImageRecord {
                    layout: vk::ImageLayout::UNDEFINED,
                },
            );
            images.push(image);
        }
        state.swapchains.insert(
            handle,
            SwapchainRecord {
                usage: vec![ImageUse::Available; images.len()],
                images,
                cursor: 0,
            },
        );

        let handle = vk::SwapchainKHR::from_raw(handle);
        state.events.push(MockEvent::SwapchainCreated {
            handle,
            old: old_swapchain,
            min_image_count: descriptor.min_image_count,
            image_count,
            extent: descriptor.extent,
        });
        Ok(handle)
    }

    fn swapchain_images(
        &self,
        _device: &MockDevice,
        swapchain: vk::SwapchainKHR,
    ) -> Result<Vec<vk::Image>> {
        let state = self.state.lock();
        state
            .swapchains
            .get(&swapchain.as_raw())
            .map(|record| {
                record
                    .images
                    .iter()
                    .map(|raw| vk::Image::from_raw(*raw))
                    .collect()
            })
            .ok_or_else(|| vk::Result::ERROR_UNKNOWN.into())
    }

    fn destroy_swapchain(&self, _device: &MockDevice, swapchain: vk::SwapchainKHR) {
        let mut state = self.state.lock();
        let raw = swapchain.as_raw();
        let Some(images) = state.swapchains.get(&raw).map(|record| record.images.clone()) else {
            state.validation(format!("destroying unknown swapchain {raw:#x}"));
            return;
        };

        let in_use = images.iter().any(|image| state.image_busy(*image));
        if in_use {
            state.validation(format!("destroying swapchain {raw:#x} while its images are in use"));
        }

        for image in images {
            state.images.remove(&image);
            state.live.remove(&image);
        }
        state.swapchains.remove(&raw);
        state.release(raw, HandleKind::Swapchain);
        state
            .events
            .push(MockEvent::SwapchainDestroyed { handle: swapchain });
    }

    fn acquire_next_image(
        &self,
        _device: &MockDevice,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        _timeout_ns: u64,
    ) -> Result<(u32, bool)> {
        let mut state = self.state.lock();
        let raw = swapchain.as_raw();

        let (requested, suboptimal) = match state.acquire_script.pop_front() {
            None => (None, false),
            Some(AcquireStep::Image(index)) => (Some(index), false),
            Some(AcquireStep::Suboptimal(index)) => (Some(index), true),
            Some(AcquireStep::OutOfDate) => {
                state.events.push(MockEvent::Acquire {
                    swapchain,
                    index: None,
                    suboptimal: false,
                });
                return Err(PresentError::OutOfDate);
            }
            Some(AcquireStep::Fail(result)) => return Err(result.into()),
        };

        match state.semaphores.get(&semaphore.as_raw()).copied() {
            Some(false) => {}
            Some(true) => state.validation(format!(
                "acquiring with semaphore {:#x} that is already signaled",
                semaphore.as_raw()
            )),
            None => state.validation(format!(
                "acquiring with unknown semaphore {:#x}",
                semaphore.as_raw()
            )),
        }

        let Some(index) = state.acquire_index(raw, requested) else {
            state.validation(format!("no image available on swapchain {raw:#x}"));
            return Err(PresentError::Timeout);
        };

        state.semaphores.insert(semaphore.as_raw(), true);
        state.events.push(MockEvent::Acquire {
            swapchain,
            index: Some(index),
            suboptimal,
        });
        Ok((index, suboptimal))
    }

    fn queue_present(
        &self,
        _device: &MockDevice,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool> {
        let mut state = self.state.lock();
        let raw = swapchain.as_raw();
        let step = state.present_script.pop_front().unwrap_or(PresentStep::Optimal);
        if let PresentStep::Fail(result) = step {
            return Err(result.into());
        }

        let image = state
            .swapchains
            .get(&raw)
            .and_then(|record| {
                let usage = record.usage.get(image_index as usize)?;
                Some((record.images[image_index as usize], *usage))
            });
        match image {
            Some((image, ImageUse::Acquired)) => {
                let layout = state.images.get(&image).map(|record| record.layout);
                if layout != Some(vk::ImageLayout::PRESENT_SRC_KHR) {
                    state.validation(format!(
                        "presenting image {image_index} in layout {layout:?}"
                    ));
                }
            }
            Some((_, usage)) => state.validation(format!(
                "presenting image {image_index} that is {usage:?}, not acquired"
            )),
            None => state.validation(format!(
                "presenting image {image_index} of unknown swapchain {raw:#x}"
            )),
        }

        match state.semaphores.get(&wait_semaphore.as_raw()).copied() {
            Some(true) => {
                state.semaphores.insert(wait_semaphore.as_raw(), false);
            }
            _ => state.validation(format!(
                "presenting image {image_index} without a pending present signal"
            )),
        }

        if let Some(record) = state.swapchains.get_mut(&raw) {
            if let Some(usage) = record.usage.get_mut(image_index as usize) {
                *usage = ImageUse::Presenting;
            }
        }
        state.queue.push_back(QueueOp::Present {
            swapchain: raw,
            index: image_index,
        });
        state.events.push(MockEvent::Present {
            swapchain,
            index: image_index,
            step,
        });

        match step {
            PresentStep::OutOfDate => Err(PresentError::OutOfDate),
            PresentStep::Suboptimal => Ok(true),
            PresentStep::Optimal | PresentStep::Fail(_) => Ok(false),
        }
    }

    fn destroy_surface(&self, _device: &MockDevice) {
        let mut state = self.state.lock();
        if state.surface_destroyed {
            state.validation("surface destroyed twice".to_string());
        }
        if !state.swapchains.is_empty() {
            state.validation("surface destroyed while swapchains are live".to_string());
        }
        state.surface_destroyed = true;
        state.events.push(MockEvent::SurfaceDestroyed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fences_start_in_requested_state() {
        let gpu = MockGpu::default();
        let device = gpu.device();
        let signaled = device.create_fence(true).unwrap();
        let unsignaled = device.create_fence(false).unwrap();

        assert_eq!(gpu.fence_state(signaled), Some(FenceState::Signaled));
        assert_eq!(gpu.fence_state(unsignaled), Some(FenceState::Unsignaled));
    }

    #[test]
    fn blocking_wait_retires_submission() {
        let gpu = MockGpu::default();
        let device = gpu.device();
        let fence = device.create_fence(false).unwrap();
        let wait = device.create_semaphore().unwrap();
        gpu.state.lock().semaphores.insert(wait.as_raw(), true);

        device
            .submit(&Submission {
                command_buffer: None,
                wait_semaphore: wait,
                wait_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                signal_semaphore: None,
                fence,
            })
            .unwrap();
        assert_eq!(gpu.fence_state(fence), Some(FenceState::Pending));

        device.wait_for_fence(fence, u64::MAX).unwrap();
        assert_eq!(gpu.fence_state(fence), Some(FenceState::Signaled));
        assert!(gpu.events().contains(&MockEvent::FenceWait {
            fence,
            was_signaled: false
        }));
        gpu.check().unwrap();
    }

    #[test]
    fn waiting_on_orphan_fence_times_out() {
        let gpu = MockGpu::default();
        let device = gpu.device();
        let fence = device.create_fence(false).unwrap();

        assert!(matches!(
            device.wait_for_fence(fence, 0),
            Err(PresentError::Timeout)
        ));
        assert_eq!(gpu.validation_messages().len(), 1);
    }

    #[test]
    fn double_destroy_is_reported() {
        let gpu = MockGpu::default();
        let device = gpu.device();
        let semaphore = device.create_semaphore().unwrap();
        device.destroy_semaphore(semaphore);
        device.destroy_semaphore(semaphore);

        assert_eq!(gpu.live_handle_count(), 0);
        assert_eq!(gpu.validation_messages().len(), 1);
    }

    #[test]
    fn destroying_pool_frees_its_buffers() {
        let gpu = MockGpu::default();
        let device = gpu.device();
        let pool = device.create_command_pool(0).unwrap();
        device.allocate_command_buffers(pool, 3).unwrap();
        assert_eq!(gpu.live_handle_count(), 4);

        device.destroy_command_pool(pool);
        assert_eq!(gpu.live_handle_count(), 0);
        gpu.check().unwrap();
    }

    #[test]
    fn injected_fault_fires_once() {
        let gpu = MockGpu::default();
        let device = gpu.device();
        gpu.inject(MockFault::CreateSemaphore(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));

        assert!(matches!(
            device.create_semaphore(),
            Err(PresentError::AllocationFailure(_))
        ));
        assert!(device.create_semaphore().is_ok());
    }
}
