//! Frame loop scenarios against the mock GPU timeline.

mod common;

use ash::vk;
use common::{fence_waits, ignore_ack, position, presenter};
use zeta_present::{
    ClearRecorder, FrameContext, FrameOutcome, FrameRecorder, FrameState, PresentConfig,
    PresentError, Presenter,
};
use zeta_test::{
    AcquireStep, FenceState, MockConfig, MockDevice, MockEvent, MockFault, MockGpu, PresentStep,
};

#[test]
fn third_frame_blocks_on_first_slot() {
    let gpu = MockGpu::default();
    let mut presenter = presenter(&gpu, PresentConfig::default());
    let fence0 = presenter.synchronizer().slot(0).unwrap().fence;

    for _ in 0..2 {
        assert!(matches!(
            presenter.draw_frame().unwrap(),
            FrameOutcome::Presented { .. }
        ));
    }
    assert!(fence_waits(&gpu.events()).iter().all(|(_, signaled)| *signaled));

    gpu.clear_events();
    let outcome = presenter.draw_frame().unwrap();
    assert_eq!(
        outcome,
        FrameOutcome::Presented {
            image_index: 2,
            slot: 0
        }
    );

    let events = gpu.events();
    assert_eq!(
        events.first(),
        Some(&MockEvent::FenceWait {
            fence: fence0,
            was_signaled: false
        })
    );
    gpu.check().unwrap();
}

#[test]
fn cpu_never_runs_more_than_frames_in_flight_ahead() {
    for frames_in_flight in 1..=3 {
        let gpu = MockGpu::default();
        let config = PresentConfig::default().with_frames_in_flight(frames_in_flight);
        let mut presenter = presenter(&gpu, config);

        let frames = 12;
        for _ in 0..frames {
            presenter.draw_frame().unwrap();
        }

        let events = gpu.events();
        let submits: Vec<(usize, u64)> = events
            .iter()
            .enumerate()
            .filter_map(|(at, event)| match event {
                MockEvent::Submit { id, .. } => Some((at, *id)),
                _ => None,
            })
            .collect();
        let acquires: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, event)| matches!(event, MockEvent::Acquire { .. }))
            .map(|(at, _)| at)
            .collect();
        assert_eq!(submits.len(), frames);
        assert_eq!(acquires.len(), frames);

        for frame in frames_in_flight..frames {
            let (_, earlier_id) = submits[frame - frames_in_flight];
            let completed = position(&events, |event| {
                matches!(event, MockEvent::SubmissionCompleted { id, .. } if *id == earlier_id)
            })
            .expect("earlier submission completed");
            assert!(
                completed < acquires[frame],
                "frame {frame} started before frame {} finished",
                frame - frames_in_flight
            );
        }
        gpu.check().unwrap();
    }
}

#[test]
fn reacquired_image_waits_on_previous_fence() {
    let gpu = MockGpu::default();
    let mut presenter = presenter(&gpu, PresentConfig::default().with_frames_in_flight(2));
    assert_eq!(presenter.image_count(), 3);
    gpu.script_acquire([
        AcquireStep::Image(0),
        AcquireStep::Image(1),
        AcquireStep::Image(2),
        AcquireStep::Image(0),
    ]);

    for _ in 0..3 {
        presenter.draw_frame().unwrap();
    }
    let image0 = presenter.swapchain().images()[0].image;
    let first_fence_on_image0 = gpu
        .events()
        .iter()
        .find_map(|event| match event {
            MockEvent::Submit { fence, images, .. } if images.contains(&image0) => Some(*fence),
            _ => None,
        })
        .unwrap();

    gpu.clear_events();
    assert_eq!(
        presenter.draw_frame().unwrap(),
        FrameOutcome::Presented {
            image_index: 0,
            slot: 1
        }
    );

    let events = gpu.events();
    let acquired = position(&events, |event| {
        matches!(event, MockEvent::Acquire { index: Some(0), .. })
    })
    .unwrap();
    let image_wait = position(&events, |event| {
        matches!(event, MockEvent::FenceWait { fence, .. } if *fence == first_fence_on_image0)
    })
    .unwrap();
    let submitted = position(&events, |event| matches!(event, MockEvent::Submit { .. })).unwrap();

    assert!(acquired < image_wait);
    assert!(image_wait < submitted);
    gpu.check().unwrap();
}

#[test]
fn irregular_acquisition_order_stays_valid() {
    let gpu = MockGpu::default();
    let mut presenter = presenter(&gpu, PresentConfig::default().with_frames_in_flight(2));
    let order = [0, 2, 1, 1, 0, 2, 2, 1, 0, 0, 1, 2];
    gpu.script_acquire(order.iter().map(|&index| AcquireStep::Image(index)));

    for expected in order {
        match presenter.draw_frame().unwrap() {
            FrameOutcome::Presented { image_index, .. } => assert_eq!(image_index, expected),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    gpu.check().unwrap();
}

#[test]
fn clear_content_targets_acquired_image() {
    let gpu = MockGpu::default();
    let mut presenter = presenter(&gpu, PresentConfig::default());

    presenter.draw_frame().unwrap();
    let image = presenter.swapchain().images()[0].image;
    let present_signal = presenter.synchronizer().present_signal(0).unwrap();

    let submit = gpu
        .events()
        .into_iter()
        .find(|event| matches!(event, MockEvent::Submit { .. }))
        .unwrap();
    match submit {
        MockEvent::Submit { images, signal, .. } => {
            assert_eq!(images, vec![image]);
            assert_eq!(signal, Some(present_signal));
        }
        _ => unreachable!(),
    }
    gpu.check().unwrap();
}

#[test]
fn out_of_date_acquire_does_not_advance_slot() {
    let gpu = MockGpu::default();
    let mut presenter = presenter(&gpu, PresentConfig::default());
    gpu.script_acquire([AcquireStep::OutOfDate]);

    assert_eq!(presenter.draw_frame().unwrap(), FrameOutcome::NeedsResize);
    assert_eq!(presenter.current_slot(), 0);
    assert_eq!(presenter.frame_count(), 0);
    assert_eq!(presenter.frame_state(), FrameState::NeedsResize);

    assert_eq!(presenter.draw_frame().unwrap(), FrameOutcome::Skipped);

    presenter.poll_resize(&mut ignore_ack).unwrap();
    assert_eq!(presenter.frame_state(), FrameState::Idle);
    assert_eq!(
        presenter.draw_frame().unwrap(),
        FrameOutcome::Presented {
            image_index: 0,
            slot: 0
        }
    );
    gpu.check().unwrap();
}

#[test]
fn suboptimal_acquire_replaces_acquire_signal() {
    let gpu = MockGpu::default();
    let mut presenter = presenter(&gpu, PresentConfig::default());
    let stale = presenter.synchronizer().slot(0).unwrap().acquire_signal;
    gpu.script_acquire([AcquireStep::Suboptimal(0)]);

    assert_eq!(presenter.draw_frame().unwrap(), FrameOutcome::NeedsResize);
    assert_eq!(presenter.current_slot(), 0);
    assert!(presenter.synchronizer().is_acquire_stale(0));

    presenter.poll_resize(&mut ignore_ack).unwrap();
    let fresh = presenter.synchronizer().slot(0).unwrap().acquire_signal;
    assert_ne!(fresh, stale);
    assert!(!presenter.synchronizer().is_acquire_stale(0));

    assert!(matches!(
        presenter.draw_frame().unwrap(),
        FrameOutcome::Presented { slot: 0, .. }
    ));
    gpu.check().unwrap();
}

#[test]
fn suboptimal_present_advances_slot() {
    let gpu = MockGpu::default();
    let mut presenter = presenter(&gpu, PresentConfig::default());
    gpu.script_present([PresentStep::Suboptimal]);

    assert_eq!(presenter.draw_frame().unwrap(), FrameOutcome::NeedsResize);
    assert_eq!(presenter.current_slot(), 1);
    assert_eq!(presenter.frame_count(), 1);

    presenter.poll_resize(&mut ignore_ack).unwrap();
    assert_eq!(
        presenter.draw_frame().unwrap(),
        FrameOutcome::Presented {
            image_index: 0,
            slot: 1
        }
    );
    gpu.check().unwrap();
}

#[test]
fn out_of_date_present_advances_slot() {
    let gpu = MockGpu::default();
    let mut presenter = presenter(&gpu, PresentConfig::default());
    gpu.script_present([PresentStep::OutOfDate]);

    assert_eq!(presenter.draw_frame().unwrap(), FrameOutcome::NeedsResize);
    assert_eq!(presenter.current_slot(), 1);
    assert!(presenter.resize_state() != zeta_present::ResizeState::Stable);

    presenter.poll_resize(&mut ignore_ack).unwrap();
    assert!(matches!(
        presenter.draw_frame().unwrap(),
        FrameOutcome::Presented { .. }
    ));
    gpu.check().unwrap();
}

#[test]
fn surface_loss_on_acquire_is_fatal() {
    let gpu = MockGpu::default();
    let mut presenter = presenter(&gpu, PresentConfig::default());
    gpu.script_acquire([AcquireStep::Fail(vk::Result::ERROR_SURFACE_LOST_KHR)]);

    assert!(matches!(
        presenter.draw_frame(),
        Err(PresentError::SurfaceLost)
    ));
    assert_eq!(presenter.frame_state(), FrameState::Acquire);
}

#[test]
fn device_loss_on_present_is_fatal() {
    let gpu = MockGpu::default();
    let mut presenter = presenter(&gpu, PresentConfig::default());
    gpu.script_present([PresentStep::Fail(vk::Result::ERROR_DEVICE_LOST)]);

    assert!(matches!(presenter.draw_frame(), Err(PresentError::DeviceLost)));
    assert_eq!(presenter.frame_state(), FrameState::Present);
}

#[test]
fn out_of_date_submit_retires_slot() {
    let gpu = MockGpu::default();
    let mut presenter = presenter(&gpu, PresentConfig::default());
    let fence0 = presenter.synchronizer().slot(0).unwrap().fence;
    gpu.inject(MockFault::Submit(vk::Result::ERROR_OUT_OF_DATE_KHR));

    assert_eq!(presenter.draw_frame().unwrap(), FrameOutcome::NeedsResize);
    assert_eq!(presenter.current_slot(), 1);
    assert_ne!(gpu.fence_state(fence0), Some(FenceState::Unsignaled));

    presenter.poll_resize(&mut ignore_ack).unwrap();
    for _ in 0..3 {
        assert!(matches!(
            presenter.draw_frame().unwrap(),
            FrameOutcome::Presented { .. }
        ));
    }
    gpu.check().unwrap();
}

struct FailingRecorder {
    inner: ClearRecorder,
    failing_frames: &'static [u64],
}

impl FailingRecorder {
    fn new(failing_frames: &'static [u64]) -> Self {
        Self {
            inner: ClearRecorder::default(),
            failing_frames,
        }
    }
}

impl FrameRecorder<MockDevice> for FailingRecorder {
    fn wait_stage(&self) -> vk::PipelineStageFlags {
        FrameRecorder::<MockDevice>::wait_stage(&self.inner)
    }

    fn image_usage(&self) -> vk::ImageUsageFlags {
        FrameRecorder::<MockDevice>::image_usage(&self.inner)
    }

    fn record(&mut self, device: &MockDevice, frame: &FrameContext) -> zeta_present::Result<()> {
        if self.failing_frames.contains(&frame.frame_number) {
            return Err(PresentError::Unsupported("scripted recorder failure".to_string()));
        }
        self.inner.record(device, frame)
    }
}

fn failing_presenter(
    gpu: &MockGpu,
    failing_frames: &'static [u64],
) -> Presenter<zeta_test::MockSurface, FailingRecorder> {
    Presenter::init(
        gpu.device(),
        gpu.surface(),
        800,
        600,
        PresentConfig::default().with_frames_in_flight(2),
        FailingRecorder::new(failing_frames),
    )
    .unwrap()
}

#[test]
fn failing_recorder_never_strands_slot_fence() {
    let gpu = MockGpu::default();
    let mut presenter = failing_presenter(&gpu, &[1]);
    let fence1 = presenter.synchronizer().slot(1).unwrap().fence;

    presenter.draw_frame().unwrap();
    assert!(matches!(
        presenter.draw_frame(),
        Err(PresentError::Unsupported(_))
    ));
    assert_ne!(gpu.fence_state(fence1), Some(FenceState::Unsignaled));
    assert_eq!(presenter.frame_state(), FrameState::NeedsResize);
    assert_eq!(presenter.current_slot(), 0);
    assert_ne!(presenter.resize_state(), zeta_present::ResizeState::Stable);
    assert_eq!(presenter.draw_frame().unwrap(), FrameOutcome::Skipped);

    presenter.poll_resize(&mut ignore_ack).unwrap();
    for _ in 0..4 {
        assert!(matches!(
            presenter.draw_frame().unwrap(),
            FrameOutcome::Presented { .. }
        ));
    }
    gpu.check().unwrap();
}

#[test]
fn failing_recorder_releases_acquired_image() {
    let gpu = MockGpu::new(MockConfig::default().with_image_count_range(2, 2));
    let mut presenter = failing_presenter(&gpu, &[0, 1]);
    assert_eq!(presenter.image_count(), 2);

    for _ in 0..2 {
        assert!(matches!(
            presenter.draw_frame(),
            Err(PresentError::Unsupported(_))
        ));
        assert!(matches!(
            presenter.poll_resize(&mut ignore_ack).unwrap(),
            zeta_present::ResizeStatus::Recreated { .. }
        ));
    }

    for _ in 0..4 {
        assert!(matches!(
            presenter.draw_frame().unwrap(),
            FrameOutcome::Presented { .. }
        ));
    }
    gpu.check().unwrap();
}
