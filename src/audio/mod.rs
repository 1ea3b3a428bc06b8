//! Audio capture: device enumeration, pipeline construction, frame views.
//!
//! # Pipeline
//!
//! ```text
//! Input device → cpal callback → FrameBuffer → QuantumProcessor
//! (silence)    → cpal output stream → default output device
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use peak_meter::audio::{CaptureBackend, CpalBackend};
//! use peak_meter::meter::{OverflowPolicy, PeakState, QuantumProcessor};
//!
//! let backend = CpalBackend::new(true);
//! let devices = backend.input_devices().unwrap();
//!
//! let (tx, mut rx) = tokio::sync::watch::channel(Default::default());
//! let processor = QuantumProcessor::new(OverflowPolicy::Saturate, Arc::new(PeakState::new()), tx);
//! let _pipeline = backend.start_pipeline(&devices[0], processor).unwrap();
//!
//! if rx.has_changed().unwrap_or(false) {
//!     println!("brightness {}", rx.borrow_and_update().text());
//! }
//! ```

pub mod capture;
pub mod devices;
pub mod frame;

pub use capture::{CaptureBackend, CaptureError, CpalBackend, CpalPipeline, PipelineInfo};
pub use devices::{find_input_device, list_input_devices, DeviceDescriptor};
pub use frame::FrameBuffer;

#[cfg(test)]
pub use capture::{MockBackend, MockPipeline};
