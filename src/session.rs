//! Capture session manager.
//!
//! [`CaptureSession`] owns the capture backend and at most one running
//! pipeline. It is driven from the UI thread:
//!
//! ```text
//! list_input_devices() ──▶ user picks a device
//! start_capture(Some(&device)) ──▶ pipeline running, quanta flow to the UI
//! stop_capture() ──▶ pipeline dropped, callback unregistered
//! ```
//!
//! # Example
//!
//! ```rust
//! use peak_meter::session::CaptureSession;
//! use peak_meter::audio::CaptureError;
//! # use peak_meter::audio::{CaptureBackend, DeviceDescriptor, PipelineInfo};
//! # use peak_meter::meter::QuantumProcessor;
//! # struct Idle;
//! # impl PipelineInfo for Idle {
//! #     fn sample_rate(&self) -> u32 { 0 }
//! #     fn channels(&self) -> u16 { 0 }
//! #     fn has_passthrough(&self) -> bool { false }
//! # }
//! # struct NoDevices;
//! # impl CaptureBackend for NoDevices {
//! #     type Pipeline = Idle;
//! #     fn input_devices(&self) -> Result<Vec<DeviceDescriptor>, CaptureError> { Ok(vec![]) }
//! #     fn start_pipeline(&self, _: &DeviceDescriptor, _: QuantumProcessor) -> Result<Idle, CaptureError> { Ok(Idle) }
//! # }
//!
//! let (tx, _rx) = tokio::sync::watch::channel(Default::default());
//! let mut session = CaptureSession::new(NoDevices, Default::default(), tx);
//!
//! assert!(session.list_input_devices().is_empty());
//! assert_eq!(session.start_capture(None), Err(CaptureError::NoSelection));
//! ```

use std::sync::Arc;

use tokio::sync::watch;

use crate::audio::{CaptureBackend, CaptureError, DeviceDescriptor};
use crate::meter::{MeterUpdate, OverflowPolicy, PeakState, QuantumProcessor};

// ---------------------------------------------------------------------------
// ActiveCapture
// ---------------------------------------------------------------------------

/// The running pipeline together with the device it was opened on.
pub struct ActiveCapture<P> {
    pub device: DeviceDescriptor,
    pub pipeline: P,
}

// ---------------------------------------------------------------------------
// CaptureSession
// ---------------------------------------------------------------------------

pub struct CaptureSession<B: CaptureBackend> {
    backend: B,
    policy: OverflowPolicy,
    peak_state: Arc<PeakState>,
    updates: watch::Sender<MeterUpdate>,
    active: Option<ActiveCapture<B::Pipeline>>,
}

impl<B: CaptureBackend> CaptureSession<B> {
    /// Create an idle session. Every pipeline it starts folds brightness with
    /// `policy` and publishes updates on `updates`.
    pub fn new(backend: B, policy: OverflowPolicy, updates: watch::Sender<MeterUpdate>) -> Self {
        Self {
            backend,
            policy,
            peak_state: Arc::new(PeakState::new()),
            updates,
            active: None,
        }
    }

    /// Query the backend for capture devices.
    ///
    /// Enumeration failures are logged and reported as an empty list.
    pub fn list_input_devices(&self) -> Vec<DeviceDescriptor> {
        match self.backend.input_devices() {
            Ok(devices) => {
                log::info!("Found {} input device(s)", devices.len());
                devices
            }
            Err(e) => {
                log::warn!("Input device enumeration failed: {e}");
                Vec::new()
            }
        }
    }

    /// Build and start the pipeline for `device`.
    ///
    /// # Errors
    ///
    /// * [`CaptureError::NoSelection`] when `device` is `None`.
    /// * [`CaptureError::AlreadyRunning`] when a pipeline is active; call
    ///   [`stop_capture`](Self::stop_capture) first.
    /// * Whatever the backend reports. Device failures are logged here; the
    ///   session stays idle.
    pub fn start_capture(&mut self, device: Option<&DeviceDescriptor>) -> Result<(), CaptureError> {
        let device = device.ok_or(CaptureError::NoSelection)?;

        if self.active.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }

        self.peak_state.reset();
        let processor = QuantumProcessor::new(
            self.policy,
            Arc::clone(&self.peak_state),
            self.updates.clone(),
        );

        match self.backend.start_pipeline(device, processor) {
            Ok(pipeline) => {
                log::info!("Capture started on '{}'", device.name);
                self.active = Some(ActiveCapture {
                    device: device.clone(),
                    pipeline,
                });
                Ok(())
            }
            Err(e) => {
                match &e {
                    CaptureError::DeviceUnavailable { reason, .. } => {
                        log::warn!("Audio device input unavailable because {reason}");
                    }
                    other => log::warn!("Capture did not start: {other}"),
                }
                Err(e)
            }
        }
    }

    /// Stop the running pipeline, if any.
    ///
    /// Returns `true` when a pipeline was stopped.
    pub fn stop_capture(&mut self) -> bool {
        match self.active.take() {
            Some(active) => {
                log::info!("Capture stopped on '{}'", active.device.name);
                drop(active.pipeline);
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Device of the running pipeline.
    pub fn active_device(&self) -> Option<&DeviceDescriptor> {
        self.active.as_ref().map(|a| &a.device)
    }

    pub fn active(&self) -> Option<&ActiveCapture<B::Pipeline>> {
        self.active.as_ref()
    }

    /// Peak of the last processed quantum, shared with the audio thread.
    pub fn peak_state(&self) -> &Arc<PeakState> {
        &self.peak_state
    }

    #[cfg(test)]
    pub(crate) fn backend(&self) -> &B {
        &self.backend
    }

    #[cfg(test)]
    pub(crate) fn active_mut(&mut self) -> Option<&mut ActiveCapture<B::Pipeline>> {
        self.active.as_mut()
    }
}

impl<B: CaptureBackend> Drop for CaptureSession<B> {
    fn drop(&mut self) {
        self.stop_capture();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{FrameBuffer, MockBackend, PipelineInfo};

    fn session(backend: MockBackend) -> (CaptureSession<MockBackend>, watch::Receiver<MeterUpdate>) {
        let (tx, rx) = watch::channel(MeterUpdate::default());
        (CaptureSession::new(backend, OverflowPolicy::Saturate, tx), rx)
    }

    #[test]
    fn lists_devices_in_provider_order() {
        let (s, _rx) = session(MockBackend::with_devices(&["Line In", "USB Mic"]));
        let names: Vec<String> = s.list_input_devices().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["Line In", "USB Mic"]);
    }

    #[test]
    fn enumeration_failure_yields_empty_list() {
        let mut backend = MockBackend::with_devices(&[]);
        backend.devices = Err(CaptureError::Enumeration("host gone".into()));
        let (s, _rx) = session(backend);
        assert!(s.list_input_devices().is_empty());
    }

    #[test]
    fn zero_devices_and_no_selection_fails_cleanly() {
        let (mut s, _rx) = session(MockBackend::with_devices(&[]));
        assert!(s.list_input_devices().is_empty());
        assert_eq!(s.start_capture(None), Err(CaptureError::NoSelection));
        assert!(!s.is_running());
    }

    #[test]
    fn start_registers_pipeline_on_selected_device() {
        let (mut s, _rx) = session(MockBackend::with_devices(&["Mic A", "Mic B"]));
        let devices = s.list_input_devices();

        s.start_capture(devices.get(1)).unwrap();

        assert!(s.is_running());
        assert_eq!(s.active_device().map(|d| d.name.as_str()), Some("Mic B"));
        assert_eq!(s.backend().live_pipelines(), 1);
        let active = s.active().unwrap();
        assert_eq!(active.pipeline.sample_rate(), 48_000);
        assert!(active.pipeline.has_passthrough());
    }

    #[test]
    fn second_start_is_rejected_while_running() {
        let (mut s, _rx) = session(MockBackend::with_devices(&["Mic"]));
        let devices = s.list_input_devices();

        s.start_capture(devices.first()).unwrap();
        assert_eq!(s.start_capture(devices.first()), Err(CaptureError::AlreadyRunning));
        assert_eq!(s.backend().live_pipelines(), 1);
    }

    #[test]
    fn device_unavailable_leaves_session_idle() {
        let (mut s, _rx) = session(MockBackend::failing(CaptureError::DeviceUnavailable {
            device: "Broken Mic".into(),
            reason: "exclusive access".into(),
        }));
        let devices = s.list_input_devices();

        let err = s.start_capture(devices.first()).unwrap_err();

        assert!(matches!(err, CaptureError::DeviceUnavailable { .. }));
        assert!(!s.is_running());
        assert_eq!(s.backend().live_pipelines(), 0);
    }

    #[test]
    fn stop_releases_pipeline_and_allows_restart() {
        let (mut s, _rx) = session(MockBackend::with_devices(&["Mic"]));
        let devices = s.list_input_devices();

        s.start_capture(devices.first()).unwrap();
        assert!(s.stop_capture());
        assert_eq!(s.backend().live_pipelines(), 0);
        assert!(!s.stop_capture());

        s.start_capture(devices.first()).unwrap();
        assert!(s.is_running());
    }

    #[test]
    fn quanta_reach_ui_channel_and_peak_state() {
        let (mut s, mut rx) = session(MockBackend::with_devices(&["Mic"]));
        let devices = s.list_input_devices();
        s.start_capture(devices.first()).unwrap();

        let data = [0.0_f32, 0.004, -0.003];
        let active = s.active_mut().unwrap();
        active.pipeline.processor.process(FrameBuffer::new(&data));

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().text(), "64");
        assert_eq!(s.peak_state().peak(), 0.004);
        assert_eq!(s.peak_state().quanta(), 1);
    }

    #[test]
    fn restart_resets_peak_state() {
        let (mut s, _rx) = session(MockBackend::with_devices(&["Mic"]));
        let devices = s.list_input_devices();
        s.start_capture(devices.first()).unwrap();

        let data = [0.5_f32];
        s.active_mut().unwrap().pipeline.processor.process(FrameBuffer::new(&data));
        s.stop_capture();
        s.start_capture(devices.first()).unwrap();

        assert_eq!(s.peak_state().peak(), 0.0);
        assert_eq!(s.peak_state().quanta(), 0);
    }
}
