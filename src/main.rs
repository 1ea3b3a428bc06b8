//! Application entry point.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the cpal capture backend and the app (enumerates devices).
//! 4. Run [`eframe::run_native`], which blocks the main thread until the window
//!    is closed. Capture starts when the user presses **Start**.

use eframe::egui;
use peak_meter::{app::PeakMeterApp, audio::CpalBackend, config::AppConfig};

fn native_options(config: &AppConfig) -> eframe::NativeOptions {
    let (w, h) = config.ui.window_size;
    let mut vp = egui::ViewportBuilder::default()
        .with_inner_size([w, h])
        .with_min_inner_size([280.0, 180.0]);

    if config.ui.always_on_top {
        vp = vp.with_always_on_top();
    }

    eframe::NativeOptions {
        viewport: vp,
        ..Default::default()
    }
}

fn main() -> eframe::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Peak meter starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Backend + app
    let backend = CpalBackend::new(config.audio.passthrough_output);
    let options = native_options(&config);
    let app = PeakMeterApp::new(backend, config);

    // 4. UI loop
    eframe::run_native(
        "Peak Meter",
        options,
        Box::new(move |_cc| Ok(Box::new(app))),
    )
}
