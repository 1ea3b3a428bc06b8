//! Peak meter window, an egui/eframe application.
//!
//! # Architecture
//!
//! [`PeakMeterApp`] is the top-level [`eframe::App`]. It owns the
//! [`CaptureSession`] and the receiving end of the meter channel:
//!
//! * the session builds the pipeline when the user presses **Start**;
//! * the audio thread replaces the [`MeterUpdate`] in a `watch` channel once
//!   per quantum;
//! * while capture runs the app repaints on a short timer and shows the value
//!   whenever it has changed.
//!
//! # Layout
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ Input device: [ USB Mic        ▾ ] 🔄 │
//! │ [ Start ] [ Stop ]                   │
//! │                                      │
//! │                 125                  │  ← brightness (0–255)
//! │ ██████████████░░░░░░░░░░░░░░░░░░░░░░ │
//! │ Capturing from USB Mic               │
//! │ 48000 Hz · 2 ch · passthrough        │
//! │ peak 0.0050 · 1234 quanta            │
//! └──────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use eframe::egui;
use tokio::sync::watch;

use crate::audio::{CaptureBackend, CaptureError, DeviceDescriptor, PipelineInfo};
use crate::config::{AppConfig, AppPaths};
use crate::meter::MeterUpdate;
use crate::session::CaptureSession;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// What the status line shows.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    /// No pipeline; waiting for the user.
    Idle,
    /// Capture is running on the named device.
    Running { device: String },
    /// The last start attempt failed.
    Failed { message: String },
}

impl Status {
    pub fn label(&self) -> String {
        match self {
            Status::Idle => "Idle".into(),
            Status::Running { device } => format!("Capturing from {device}"),
            Status::Failed { message } => message.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// PeakMeterApp
// ---------------------------------------------------------------------------

/// The single-window peak meter.
pub struct PeakMeterApp<B: CaptureBackend> {
    session: CaptureSession<B>,
    /// Latest per-quantum update from the audio thread.
    updates_rx: watch::Receiver<MeterUpdate>,

    // ── Device selector ──────────────────────────────────────────────────
    devices: Vec<DeviceDescriptor>,
    selected: Option<usize>,

    // ── Display ──────────────────────────────────────────────────────────
    /// Text of the brightness read-out.
    output_text: String,
    latest: Option<MeterUpdate>,
    status: Status,

    config: AppConfig,
    /// Where the preferred device is saved; `None` disables saving.
    settings_file: Option<PathBuf>,
}

impl<B: CaptureBackend> PeakMeterApp<B> {
    /// Create the app and enumerate devices.
    ///
    /// The device named by `config.audio.preferred_device` is preselected
    /// when present; otherwise the first device is.
    pub fn new(backend: B, config: AppConfig) -> Self {
        let (updates_tx, updates_rx) = watch::channel(MeterUpdate::default());
        let session = CaptureSession::new(backend, config.meter.overflow, updates_tx);

        let mut app = Self {
            session,
            updates_rx,
            devices: Vec::new(),
            selected: None,
            output_text: "0".into(),
            latest: None,
            status: Status::Idle,
            config,
            settings_file: Some(AppPaths::new().settings_file),
        };
        app.refresh_devices();
        app
    }

    /// Never write `settings.toml`.
    pub fn without_persistence(mut self) -> Self {
        self.settings_file = None;
        self
    }

    // ── Actions ──────────────────────────────────────────────────────────

    /// Re-enumerate input devices, keeping the current selection by name.
    pub fn refresh_devices(&mut self) {
        let previous = self
            .selected_device()
            .map(|d| d.name.clone())
            .or_else(|| self.config.audio.preferred_device.clone());

        self.devices = self.session.list_input_devices();
        self.selected = previous
            .and_then(|name| self.devices.iter().position(|d| d.name == name))
            .or(if self.devices.is_empty() { None } else { Some(0) });
    }

    /// Start capture on the selected device.
    ///
    /// A failure is shown in the status line; nothing is retried.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        let device = self.selected_device().cloned();
        match self.session.start_capture(device.as_ref()) {
            Ok(()) => {
                let name = device.map(|d| d.name).unwrap_or_default();
                self.remember_device(&name);
                self.status = Status::Running { device: name };
                Ok(())
            }
            Err(e) => {
                self.status = Status::Failed {
                    message: e.to_string(),
                };
                Err(e)
            }
        }
    }

    /// Stop capture and clear the read-out.
    pub fn stop(&mut self) {
        self.session.stop_capture();
        // The last value belongs to the stopped pipeline.
        let _ = self.updates_rx.borrow_and_update();
        self.latest = None;
        self.output_text = "0".into();
        self.status = Status::Idle;
    }

    /// Store the device as preferred for the next launch (best-effort).
    fn remember_device(&mut self, name: &str) {
        if self.config.audio.preferred_device.as_deref() == Some(name) {
            return;
        }
        self.config.audio.preferred_device = Some(name.to_owned());
        if let Some(ref path) = self.settings_file {
            if let Err(e) = self.config.save_to(path) {
                log::warn!("Failed to save settings: {e}");
            }
        }
    }

    // ── Channel polling ──────────────────────────────────────────────────

    /// Show the newest meter update if one arrived since the last poll.
    pub fn poll_updates(&mut self) {
        if !self.updates_rx.has_changed().unwrap_or(false) {
            return;
        }
        let update = *self.updates_rx.borrow_and_update();
        self.output_text = update.text();
        self.latest = Some(update);
    }

    /// How soon the next frame must be drawn to pick up audio updates.
    ///
    /// The audio thread never touches the UI, so the window polls while a
    /// pipeline is producing and sleeps otherwise.
    pub fn repaint_interval(&self) -> Option<Duration> {
        self.session
            .is_running()
            .then(|| Duration::from_millis(self.config.ui.repaint_interval_ms))
    }

    /// Stream format of the running pipeline, e.g. `48000 Hz · 2 ch`.
    pub fn stream_summary(&self) -> Option<String> {
        let pipeline = &self.session.active()?.pipeline;
        let mut summary = format!("{} Hz · {} ch", pipeline.sample_rate(), pipeline.channels());
        if pipeline.has_passthrough() {
            summary.push_str(" · passthrough");
        }
        Some(summary)
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    pub fn selected_device(&self) -> Option<&DeviceDescriptor> {
        self.selected.and_then(|i| self.devices.get(i))
    }

    pub fn select(&mut self, index: Option<usize>) {
        self.selected = index.filter(|&i| i < self.devices.len());
    }

    pub fn output_text(&self) -> &str {
        &self.output_text
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn session(&self) -> &CaptureSession<B> {
        &self.session
    }

    #[cfg(test)]
    pub(crate) fn session_mut(&mut self) -> &mut CaptureSession<B> {
        &mut self.session
    }

    // ── Panels ───────────────────────────────────────────────────────────

    fn draw_device_row(&mut self, ui: &mut egui::Ui) {
        let running = self.session.is_running();

        ui.horizontal(|ui| {
            ui.label("Input device:");

            let current = self
                .selected_device()
                .map(|d| d.name.clone())
                .unwrap_or_else(|| "(none)".into());

            ui.add_enabled_ui(!running, |ui| {
                egui::ComboBox::from_id_salt("input-device")
                    .selected_text(current)
                    .width(200.0)
                    .show_ui(ui, |ui| {
                        for (i, device) in self.devices.iter().enumerate() {
                            ui.selectable_value(&mut self.selected, Some(i), &device.name);
                        }
                    });

                if ui.small_button("🔄").on_hover_text("Refresh devices").clicked() {
                    self.refresh_devices();
                }
            });
        });
    }

    fn draw_controls(&mut self, ui: &mut egui::Ui) {
        let running = self.session.is_running();

        ui.horizontal(|ui| {
            if ui
                .add_enabled(!running && self.selected.is_some(), egui::Button::new("Start"))
                .clicked()
            {
                // Failure is already reflected in `self.status`.
                let _ = self.start();
            }
            if ui.add_enabled(running, egui::Button::new("Stop")).clicked() {
                self.stop();
            }
        });
    }

    fn draw_readout(&self, ui: &mut egui::Ui) {
        let brightness = self.latest.map(|u| u.brightness).unwrap_or(0);

        ui.add_space(8.0);
        ui.vertical_centered(|ui| {
            ui.label(
                egui::RichText::new(self.output_text.as_str())
                    .size(48.0)
                    .strong()
                    .color(brightness_color(brightness)),
            );
        });
        ui.add(egui::ProgressBar::new(f32::from(brightness) / 255.0).desired_height(8.0));
    }

    fn draw_status(&self, ui: &mut egui::Ui) {
        let color = match self.status {
            Status::Idle => egui::Color32::from_rgb(140, 140, 140),
            Status::Running { .. } => egui::Color32::from_rgb(80, 200, 120),
            Status::Failed { .. } => egui::Color32::from_rgb(255, 136, 68),
        };
        ui.label(egui::RichText::new(self.status.label()).color(color).size(11.0));

        let grey = egui::Color32::from_rgb(140, 140, 140);
        if let Some(summary) = self.stream_summary() {
            ui.label(egui::RichText::new(summary).color(grey).size(11.0));
            ui.label(
                egui::RichText::new(format!(
                    "peak {:.4} · {} quanta",
                    self.session.peak_state().peak(),
                    self.session.peak_state().quanta()
                ))
                .color(grey)
                .size(11.0),
            );
        }
    }
}

/// Grey ramp from dark to white following the brightness value.
fn brightness_color(brightness: u8) -> egui::Color32 {
    let level = 60 + (u16::from(brightness) * 195 / 255) as u8;
    egui::Color32::from_rgb(level, level, level)
}

// ---------------------------------------------------------------------------
// eframe::App impl
// ---------------------------------------------------------------------------

impl<B: CaptureBackend> eframe::App for PeakMeterApp<B> {
    /// Called every frame by eframe. Polls the meter channel, then renders.
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_updates();

        if let Some(interval) = self.repaint_interval() {
            ctx.request_repaint_after(interval);
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            self.draw_device_row(ui);
            self.draw_controls(ui);
            ui.separator();
            self.draw_readout(ui);
            ui.add_space(4.0);
            self.draw_status(ui);
        });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.session.stop_capture();
        log::info!("Peak meter closing");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
