//! Viewer application: an animated clear colour.

use ash::vk;
use tracing::info;

use zeta_app::{AppConfig, ClearRecorder, FrameContext, FrameRecorder, GpuContext, KeyCode, ZetaApp};

/// Seconds for one full trip around the hue wheel.
const HUE_PERIOD: f32 = 8.0;

/// Command line parameters.
#[derive(Debug, Clone)]
pub struct ViewerParams {
    pub target_fps: u32,
    pub vsync: bool,
    pub frames_in_flight: usize,
}

impl Default for ViewerParams {
    fn default() -> Self {
        Self {
            target_fps: 250,
            vsync: false,
            frames_in_flight: 2,
        }
    }
}

impl ViewerParams {
    /// Parse viewer parameters from command line arguments.
    pub fn from_args() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();
        Self::parse(&args)
    }

    fn parse(args: &[String]) -> Self {
        let mut params = Self::default();

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--fps" => {
                    if let Some(v) = args.get(i + 1).and_then(|v| v.parse().ok()) {
                        params.target_fps = v;
                        i += 1;
                    }
                }
                "--vsync" => params.vsync = true,
                "--frames-in-flight" => {
                    if let Some(v) = args.get(i + 1).and_then(|v| v.parse().ok()) {
                        params.frames_in_flight = v;
                        i += 1;
                    }
                }
                _ => {}
            }
            i += 1;
        }

        params
    }
}

/// Clears every frame to a colour that cycles through the hue wheel.
pub struct Viewer {
    clear: ClearRecorder,
    time: f32,
    paused: bool,
}

impl ZetaApp for Viewer {
    fn init(_gpu: &GpuContext, config: &AppConfig) -> anyhow::Result<Self> {
        info!(
            "Viewer starting at {}x{}, {} frames in flight",
            config.width, config.height, config.frames_in_flight
        );
        Ok(Self {
            clear: ClearRecorder::new(hue_to_rgba(0.0)),
            time: 0.0,
            paused: false,
        })
    }

    fn update(&mut self, dt: f32) {
        if self.paused {
            return;
        }
        self.time = (self.time + dt) % HUE_PERIOD;
        self.clear.set_color(hue_to_rgba(self.time / HUE_PERIOD));
    }

    fn on_key(&mut self, code: KeyCode, pressed: bool) {
        info!("Key {:?} {}", code, if pressed { "pressed" } else { "released" });
        if code == KeyCode::Space && pressed {
            self.paused = !self.paused;
        }
    }

    fn on_resize(&mut self, width: u32, height: u32) {
        info!("Viewer now {}x{}", width, height);
    }
}

impl FrameRecorder<GpuContext> for Viewer {
    fn wait_stage(&self) -> vk::PipelineStageFlags {
        FrameRecorder::<GpuContext>::wait_stage(&self.clear)
    }

    fn image_usage(&self) -> vk::ImageUsageFlags {
        FrameRecorder::<GpuContext>::image_usage(&self.clear)
    }

    fn record(&mut self, gpu: &GpuContext, frame: &FrameContext) -> zeta_present::Result<()> {
        self.clear.record(gpu, frame)
    }
}

/// Fully saturated colour for `hue` in `[0, 1)`.
fn hue_to_rgba(hue: f32) -> [f32; 4] {
    let h = hue.rem_euclid(1.0) * 6.0;
    let x = 1.0 - (h % 2.0 - 1.0).abs();
    let (r, g, b) = match h {
        h if h < 1.0 => (1.0, x, 0.0),
        h if h < 2.0 => (x, 1.0, 0.0),
        h if h < 3.0 => (0.0, 1.0, x),
        h if h < 4.0 => (0.0, x, 1.0),
        h if h < 5.0 => (x, 0.0, 1.0),
        _ => (1.0, 0.0, x),
    };
    [r, g, b, 1.0]
}
