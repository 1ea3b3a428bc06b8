//! Peak Meter: live input-level read-out.
//!
//! Captures audio from a selected input device, takes the peak magnitude of
//! every buffer the audio engine delivers, maps it through a cubic curve to a
//! 0–255 brightness and shows that number in an egui window.
//!
//! | Module | Role |
//! |--------|------|
//! | [`audio`] | device enumeration, cpal pipeline, frame views |
//! | [`meter`] | peak + brightness math, per-quantum processor |
//! | [`session`] | capture session manager (start / stop) |
//! | [`app`] | eframe window |
//! | [`config`] | `settings.toml` persistence |

pub mod app;
pub mod audio;
pub mod config;
pub mod meter;
pub mod session;
