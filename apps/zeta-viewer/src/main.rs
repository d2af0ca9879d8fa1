//! Zeta Engine Demo Viewer
//!
//! Opens a window and presents an animated clear colour every frame,
//! exercising swapchain recreation on resize and minimize.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p zeta-viewer -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--fps <N>`: Frame rate limit (default: 250, 0 for unlimited)
//! - `--vsync`: Present with FIFO instead of mailbox
//! - `--frames-in-flight <N>`: Frames recorded ahead of the GPU (default: 2)
//! - `-h, --help`: Print help message
//!
//! ## Keys
//!
//! - `Space`: Pause or resume the colour animation
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;

use zeta_app::{run_app, AppConfig};

use crate::app::{Viewer, ViewerParams};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> anyhow::Result<()> {
    // Check for help flag before starting the app
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    let params = ViewerParams::from_args();

    let mut config = AppConfig::new("Zeta Engine - Viewer")
        .with_size(WIDTH, HEIGHT)
        .with_vsync(params.vsync)
        .with_frames_in_flight(params.frames_in_flight);
    if params.target_fps > 0 {
        config = config.with_target_fps(params.target_fps);
    }

    run_app::<Viewer>(config)
}

fn print_help() {
    eprintln!(
        "Zeta Engine Demo Viewer

USAGE:
    cargo run -p zeta-viewer -- [OPTIONS]

OPTIONS:
    --fps <N>               Frame rate limit (default: 250, 0 for unlimited)
    --vsync                 Present with FIFO instead of mailbox
    --frames-in-flight <N>  Frames recorded ahead of the GPU (default: 2)
    -h, --help              Print this help message

KEYS:
    Space                   Pause or resume the colour animation

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
