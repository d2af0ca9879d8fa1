//! Resize handshake and swapchain recreation scenarios.

mod common;

use ash::vk;
use common::{ignore_ack, last_created, position, presenter, HEIGHT, WIDTH};
use zeta_present::{
    ClearRecorder, FrameDriver, FrameOutcome, FrameSynchronizer, PresentConfig, PresentError,
    Presenter, ResizeState, ResizeStatus, SwapchainManager,
};
use zeta_test::{AcquireStep, MockConfig, MockEvent, MockFault, MockGpu};

#[test]
fn latest_configure_serial_wins() {
    let gpu = MockGpu::default();
    let mut presenter = presenter(&gpu, PresentConfig::default());

    presenter.notify_configure(5, 640, 480);
    presenter.notify_configure(7, 1024, 768);

    let mut acks = Vec::new();
    let status = presenter
        .poll_resize(&mut |serial: u32| acks.push(serial))
        .unwrap();

    assert_eq!(
        status,
        ResizeStatus::Recreated {
            width: 1024,
            height: 768
        }
    );
    assert_eq!(acks, vec![7]);
    assert_eq!(
        presenter.extent(),
        Some(vk::Extent2D {
            width: 1024,
            height: 768
        })
    );
    match last_created(&gpu.events()) {
        Some(MockEvent::SwapchainCreated { extent, .. }) => {
            assert_eq!((extent.width, extent.height), (1024, 768));
        }
        other => panic!("unexpected event {other:?}"),
    }
    gpu.check().unwrap();
}

#[test]
fn zero_size_is_skipped_until_usable() {
    let gpu = MockGpu::default();
    let mut presenter = presenter(&gpu, PresentConfig::default());
    let before = presenter.swapchain().state().unwrap().handle;

    presenter.notify_resize(0, 0);
    gpu.clear_events();
    assert_eq!(
        presenter.poll_resize(&mut ignore_ack).unwrap(),
        ResizeStatus::Deferred {
            width: 0,
            height: 0
        }
    );
    assert_eq!(presenter.draw_frame().unwrap(), FrameOutcome::Skipped);
    assert!(gpu.events().is_empty());
    assert_eq!(presenter.swapchain().state().unwrap().handle, before);

    presenter.notify_resize(800, 600);
    assert_eq!(
        presenter.poll_resize(&mut ignore_ack).unwrap(),
        ResizeStatus::Recreated {
            width: 800,
            height: 600
        }
    );
    assert!(matches!(
        presenter.draw_frame().unwrap(),
        FrameOutcome::Presented { .. }
    ));
    gpu.check().unwrap();
}

#[test]
fn degenerate_recreate_leaves_swapchain_presentable() {
    let gpu = MockGpu::default();
    let device = gpu.device();
    let config = PresentConfig::default();
    let mut swapchain = SwapchainManager::new(gpu.surface(), &config);
    let handle = swapchain.create(&device, WIDTH, HEIGHT).unwrap().handle;

    gpu.clear_events();
    assert!(matches!(
        swapchain.recreate(&device, 0, HEIGHT),
        Err(PresentError::DegenerateExtent { width: 0, .. })
    ));
    assert!(matches!(
        swapchain.recreate(&device, WIDTH, 0),
        Err(PresentError::DegenerateExtent { height: 0, .. })
    ));
    assert!(gpu.events().is_empty(), "no idle wait or rebuild expected");
    assert_eq!(swapchain.state().unwrap().handle, handle);

    let mut sync = FrameSynchronizer::initialize(&device, 1, config.fence_timeout_ns).unwrap();
    sync.resize(&device, swapchain.image_count()).unwrap();
    let mut driver = FrameDriver::new(1, 0);
    let outcome = driver
        .run_frame(&device, &swapchain, &mut sync, &mut ClearRecorder::default())
        .unwrap();
    assert!(matches!(outcome, FrameOutcome::Presented { .. }));

    zeta_present::DeviceContext::wait_idle(&device).unwrap();
    sync.destroy(&device);
    swapchain.destroy_with_surface(&device);
    assert_eq!(gpu.live_handle_count(), 0);
    gpu.check().unwrap();
}

#[test]
fn recreation_respects_surface_image_limits() {
    let gpu = MockGpu::default();
    let mut presenter = presenter(&gpu, PresentConfig::default());
    assert_eq!(presenter.image_count(), 3);
    presenter.draw_frame().unwrap();

    gpu.set_image_count_range(4, 8);
    presenter.notify_resize(1024, 768);
    presenter.poll_resize(&mut ignore_ack).unwrap();
    match last_created(&gpu.events()) {
        Some(MockEvent::SwapchainCreated {
            min_image_count, ..
        }) => assert_eq!(min_image_count, 4),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(presenter.image_count(), 4);
    assert_eq!(presenter.synchronizer().images_in_flight().len(), 4);
    presenter.draw_frame().unwrap();

    gpu.set_image_count_range(1, 2);
    presenter.notify_resize(800, 600);
    presenter.poll_resize(&mut ignore_ack).unwrap();
    assert_eq!(presenter.image_count(), 2);
    assert_eq!(presenter.synchronizer().images_in_flight().len(), 2);
    presenter.draw_frame().unwrap();

    gpu.check().unwrap();
}

#[test]
fn old_swapchain_destroyed_after_replacement_exists() {
    let gpu = MockGpu::default();
    let mut presenter = presenter(&gpu, PresentConfig::default());
    let old = presenter.swapchain().state().unwrap().handle;
    presenter.draw_frame().unwrap();
    presenter.draw_frame().unwrap();

    gpu.clear_events();
    presenter.notify_resize(1280, 720);
    presenter.poll_resize(&mut ignore_ack).unwrap();
    let new = presenter.swapchain().state().unwrap().handle;
    assert_ne!(new, old);

    let events = gpu.events();
    let idle = position(&events, |event| matches!(event, MockEvent::WaitIdle)).unwrap();
    let created = position(&events, |event| {
        matches!(event, MockEvent::SwapchainCreated { handle, old: hint, .. }
            if *handle == new && *hint == old)
    })
    .unwrap();
    let destroyed = position(&events, |event| {
        matches!(event, MockEvent::SwapchainDestroyed { handle } if *handle == old)
    })
    .unwrap();

    assert!(idle < created);
    assert!(created < destroyed);
    gpu.check().unwrap();
}

#[test]
fn fixed_surface_extent_overrides_request() {
    let gpu = MockGpu::new(MockConfig::default().with_fixed_extent(640, 480));
    let presenter = presenter(&gpu, PresentConfig::default());

    assert_eq!(
        presenter.extent(),
        Some(vk::Extent2D {
            width: 640,
            height: 480
        })
    );
}

#[test]
fn minimized_surface_defers_recreation() {
    let gpu = MockGpu::default();
    let mut presenter = presenter(&gpu, PresentConfig::default());
    gpu.set_surface_extent(Some((0, 0)));

    presenter.notify_resize(1024, 768);
    let mut acks = Vec::new();
    assert_eq!(
        presenter
            .poll_resize(&mut |serial: u32| acks.push(serial))
            .unwrap(),
        ResizeStatus::Deferred {
            width: 1024,
            height: 768
        }
    );
    assert_eq!(presenter.draw_frame().unwrap(), FrameOutcome::Skipped);

    gpu.set_surface_extent(None);
    assert_eq!(
        presenter
            .poll_resize(&mut |serial: u32| acks.push(serial))
            .unwrap(),
        ResizeStatus::Recreated {
            width: 1024,
            height: 768
        }
    );
    assert_eq!(acks.len(), 1);
    assert!(matches!(
        presenter.draw_frame().unwrap(),
        FrameOutcome::Presented { .. }
    ));
    gpu.check().unwrap();
}

#[test]
fn failed_recreation_keeps_request_pending() {
    let gpu = MockGpu::default();
    let mut presenter = presenter(&gpu, PresentConfig::default());
    let before = presenter.swapchain().state().unwrap().handle;

    gpu.inject(MockFault::CreateSwapchain(vk::Result::ERROR_SURFACE_LOST_KHR));
    presenter.notify_resize(1024, 768);
    assert!(matches!(
        presenter.poll_resize(&mut ignore_ack),
        Err(PresentError::SurfaceLost)
    ));
    assert!(matches!(
        presenter.resize_state(),
        ResizeState::PendingConfigure(_)
    ));
    assert_eq!(presenter.swapchain().state().unwrap().handle, before);

    assert!(matches!(
        presenter.poll_resize(&mut ignore_ack).unwrap(),
        ResizeStatus::Recreated { .. }
    ));
    gpu.check().unwrap();
}

#[test]
fn invalidation_is_not_acknowledged() {
    let gpu = MockGpu::default();
    let mut presenter = presenter(&gpu, PresentConfig::default());
    gpu.script_acquire([AcquireStep::OutOfDate]);

    assert_eq!(presenter.draw_frame().unwrap(), FrameOutcome::NeedsResize);
    let mut acks = Vec::new();
    let status = presenter
        .poll_resize(&mut |serial: u32| acks.push(serial))
        .unwrap();

    assert!(acks.is_empty());
    assert_eq!(
        status,
        ResizeStatus::Recreated {
            width: WIDTH,
            height: HEIGHT
        }
    );
}

#[test]
fn init_with_zero_area_window_starts_pending() {
    let gpu = MockGpu::default();
    let mut presenter = Presenter::init(
        gpu.device(),
        gpu.surface(),
        0,
        0,
        PresentConfig::default(),
        ClearRecorder::default(),
    )
    .unwrap();

    assert_eq!(presenter.extent(), None);
    assert!(matches!(
        presenter.resize_state(),
        ResizeState::PendingConfigure(_)
    ));
    assert_eq!(presenter.draw_frame().unwrap(), FrameOutcome::Skipped);

    presenter.notify_resize(WIDTH, HEIGHT);
    assert!(matches!(
        presenter.poll_resize(&mut ignore_ack).unwrap(),
        ResizeStatus::Recreated { .. }
    ));
    assert_eq!(presenter.image_count(), 3);
    assert_eq!(presenter.synchronizer().images_in_flight().len(), 3);
    assert!(matches!(
        presenter.draw_frame().unwrap(),
        FrameOutcome::Presented { .. }
    ));
    gpu.check().unwrap();
}
