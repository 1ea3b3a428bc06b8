//! Capture pipeline construction via `cpal`.
//!
//! [`CaptureBackend`] is the seam between the session manager and the host
//! audio subsystem. [`CpalBackend`] builds the real pipeline:
//!
//! ```text
//! input device ──▶ input stream ──▶ QuantumProcessor (tap)
//! (silence)    ──▶ output stream ──▶ default output device
//! ```
//!
//! The returned [`CpalPipeline`] is a RAII guard. Dropping it stops both
//! streams and unregisters the quantum callback.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, StreamConfig};
use thiserror::Error;

use crate::meter::QuantumProcessor;

use super::devices::{self, DeviceDescriptor};
use super::frame::FrameBuffer;

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up audio capture.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CaptureError {
    #[error("no input device selected")]
    NoSelection,

    #[error("audio device input unavailable ({device}): {reason}")]
    DeviceUnavailable { device: String, reason: String },

    #[error("failed to create audio pipeline: {0}")]
    GraphCreation(String),

    #[error("capture is already running")]
    AlreadyRunning,

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to enumerate input devices: {0}")]
    Enumeration(String),
}

impl CaptureError {
    /// Map a stream build failure on the input device.
    fn from_input_build(device: &DeviceDescriptor, err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => Self::DeviceUnavailable {
                device: device.name.clone(),
                reason: err.to_string(),
            },
            other => Self::GraphCreation(other.to_string()),
        }
    }

    fn from_input_play(device: &DeviceDescriptor, err: cpal::PlayStreamError) -> Self {
        match err {
            cpal::PlayStreamError::DeviceNotAvailable => Self::DeviceUnavailable {
                device: device.name.clone(),
                reason: err.to_string(),
            },
            other => Self::GraphCreation(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureBackend
// ---------------------------------------------------------------------------

/// Host audio capability used by [`crate::session::CaptureSession`].
pub trait CaptureBackend {
    /// Live pipeline. Dropping it must stop capture.
    type Pipeline: PipelineInfo;

    /// Capture-capable devices in provider order.
    fn input_devices(&self) -> Result<Vec<DeviceDescriptor>, CaptureError>;

    /// Build and start a pipeline for `device`, calling `processor` once per
    /// quantum on the engine's audio thread.
    ///
    /// On error nothing may be left running.
    fn start_pipeline(
        &self,
        device: &DeviceDescriptor,
        processor: QuantumProcessor,
    ) -> Result<Self::Pipeline, CaptureError>;
}

/// What a running pipeline reports about itself for the status line.
pub trait PipelineInfo {
    /// Source sample rate in Hz.
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;
    /// Whether the output side of the pipeline is running.
    fn has_passthrough(&self) -> bool;
}

// ---------------------------------------------------------------------------
// CpalPipeline
// ---------------------------------------------------------------------------

/// RAII guard over the running streams.
pub struct CpalPipeline {
    _source: cpal::Stream,
    sink: Option<cpal::Stream>,
    sample_rate: u32,
    channels: u16,
}

impl std::fmt::Debug for CpalPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalPipeline")
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("passthrough", &self.has_passthrough())
            .finish()
    }
}

impl PipelineInfo for CpalPipeline {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn has_passthrough(&self) -> bool {
        self.sink.is_some()
    }
}

// ---------------------------------------------------------------------------
// CpalBackend
// ---------------------------------------------------------------------------

/// [`CaptureBackend`] over the default `cpal` host.
pub struct CpalBackend {
    host: cpal::Host,
    passthrough_output: bool,
}

impl CpalBackend {
    /// Use the platform's default host.
    ///
    /// With `passthrough_output` set, the pipeline also opens the default
    /// output device and keeps it fed with silence.
    pub fn new(passthrough_output: bool) -> Self {
        let host = cpal::default_host();
        log::info!("Audio host: {}", host.id().name());
        Self {
            host,
            passthrough_output,
        }
    }

    /// Build the silent output stream. Failures are logged and yield `None`.
    fn build_sink(&self) -> Option<cpal::Stream> {
        let device = match self.host.default_output_device() {
            Some(d) => d,
            None => {
                log::warn!("No output device; running without passthrough");
                return None;
            }
        };

        let supported = match device.default_output_config() {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Output config unavailable ({e}); running without passthrough");
                return None;
            }
        };

        let format = supported.sample_format();
        let config: StreamConfig = supported.into();

        let built = match format {
            SampleFormat::F32 => build_silent_output::<f32>(&device, &config),
            SampleFormat::I16 => build_silent_output::<i16>(&device, &config),
            SampleFormat::U16 => build_silent_output::<u16>(&device, &config),
            SampleFormat::I32 => build_silent_output::<i32>(&device, &config),
            other => {
                log::warn!("Unsupported output format {other}; running without passthrough");
                return None;
            }
        };

        match built {
            Ok(stream) => Some(stream),
            Err(e) => {
                log::warn!("Failed to build output stream ({e}); running without passthrough");
                None
            }
        }
    }
}

impl CaptureBackend for CpalBackend {
    type Pipeline = CpalPipeline;

    fn input_devices(&self) -> Result<Vec<DeviceDescriptor>, CaptureError> {
        devices::list_input_devices(&self.host)
    }

    fn start_pipeline(
        &self,
        descriptor: &DeviceDescriptor,
        processor: QuantumProcessor,
    ) -> Result<CpalPipeline, CaptureError> {
        let device = devices::find_input_device(&self.host, descriptor)?;

        let supported = device
            .default_input_config()
            .map_err(|e| CaptureError::DeviceUnavailable {
                device: descriptor.name.clone(),
                reason: e.to_string(),
            })?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        let format = supported.sample_format();
        let config: StreamConfig = supported.into();

        log::info!(
            "Opening '{}' ({} Hz, {} ch, {})",
            descriptor.name,
            sample_rate,
            channels,
            format
        );

        let sink = if self.passthrough_output {
            self.build_sink()
        } else {
            None
        };

        let source = match format {
            SampleFormat::F32 => build_f32_input(&device, &config, processor),
            SampleFormat::I16 => build_converting_input::<i16>(&device, &config, processor),
            SampleFormat::U16 => build_converting_input::<u16>(&device, &config, processor),
            SampleFormat::I32 => build_converting_input::<i32>(&device, &config, processor),
            other => return Err(CaptureError::UnsupportedFormat(other.to_string())),
        }
        .map_err(|e| CaptureError::from_input_build(descriptor, e))?;

        let (source, sink) = start_streams(descriptor, source, sink)?;

        Ok(CpalPipeline {
            _source: source,
            sink,
            sample_rate,
            channels,
        })
    }
}

/// Start `sink` (when present) and then `source`.
///
/// The sink goes first so the first quantum has somewhere to go. On error
/// both streams are dropped before returning, so nothing keeps running.
fn start_streams<S: StreamTrait>(
    descriptor: &DeviceDescriptor,
    source: S,
    sink: Option<S>,
) -> Result<(S, Option<S>), CaptureError> {
    if let Some(ref s) = sink {
        s.play()
            .map_err(|e| CaptureError::GraphCreation(format!("output stream: {e}")))?;
    }
    source
        .play()
        .map_err(|e| CaptureError::from_input_play(descriptor, e))?;
    Ok((source, sink))
}

// ---------------------------------------------------------------------------
// Stream builders
// ---------------------------------------------------------------------------

fn stream_error(err: cpal::StreamError) {
    log::error!("cpal stream error: {err}");
}

/// Native `f32` input: the callback slice is the quantum, no copy.
fn build_f32_input(
    device: &cpal::Device,
    config: &StreamConfig,
    mut processor: QuantumProcessor,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    device.build_input_stream(
        config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            processor.process(FrameBuffer::new(data));
        },
        stream_error,
        None,
    )
}

/// Integer input: samples are converted into a scratch buffer owned by the
/// callback. Its capacity is kept between quanta.
fn build_converting_input<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut processor: QuantumProcessor,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: cpal::FromSample<T>,
{
    let mut scratch: Vec<f32> = Vec::with_capacity(4096);
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            convert_into(&mut scratch, data);
            processor.process(FrameBuffer::new(&scratch));
        },
        stream_error,
        None,
    )
}

/// Replace the contents of `scratch` with `data` converted to `f32`.
fn convert_into<T>(scratch: &mut Vec<f32>, data: &[T])
where
    T: SizedSample,
    f32: cpal::FromSample<T>,
{
    scratch.clear();
    scratch.extend(data.iter().map(|&s| <f32 as cpal::FromSample<T>>::from_sample_(s)));
}

/// Output stream that writes equilibrium (silence) every callback.
fn build_silent_output<T: SizedSample>(
    device: &cpal::Device,
    config: &StreamConfig,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    device.build_output_stream(
        config,
        |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            for s in data.iter_mut() {
                *s = T::EQUILIBRIUM;
            }
        },
        stream_error,
        None,
    )
}

// ---------------------------------------------------------------------------
// MockBackend  (test-only)
// ---------------------------------------------------------------------------

/// A test double that records started pipelines instead of touching audio
/// hardware. The processor handed to [`CaptureBackend::start_pipeline`] is
/// kept in the returned pipeline so tests can drive quanta by hand.
#[cfg(test)]
pub struct MockBackend {
    pub devices: Result<Vec<DeviceDescriptor>, CaptureError>,
    pub start_error: Option<CaptureError>,
    pub passthrough_output: bool,
    pub live: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
pub struct MockPipeline {
    pub device: DeviceDescriptor,
    pub processor: QuantumProcessor,
    passthrough: bool,
    live: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
impl MockBackend {
    pub fn with_devices(names: &[&str]) -> Self {
        Self {
            devices: Ok(names
                .iter()
                .enumerate()
                .map(|(i, n)| DeviceDescriptor::new(i, *n))
                .collect()),
            start_error: None,
            passthrough_output: true,
            live: Default::default(),
        }
    }

    pub fn failing(error: CaptureError) -> Self {
        Self {
            start_error: Some(error),
            ..Self::with_devices(&["Broken Mic"])
        }
    }

    /// Pipelines currently alive (started and not dropped).
    pub fn live_pipelines(&self) -> usize {
        self.live.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl PipelineInfo for MockPipeline {
    fn sample_rate(&self) -> u32 {
        48_000
    }

    fn channels(&self) -> u16 {
        2
    }

    fn has_passthrough(&self) -> bool {
        self.passthrough
    }
}

#[cfg(test)]
impl Drop for MockPipeline {
    fn drop(&mut self) {
        self.live.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl CaptureBackend for MockBackend {
    type Pipeline = MockPipeline;

    fn input_devices(&self) -> Result<Vec<DeviceDescriptor>, CaptureError> {
        self.devices.clone()
    }

    fn start_pipeline(
        &self,
        device: &DeviceDescriptor,
        processor: QuantumProcessor,
    ) -> Result<MockPipeline, CaptureError> {
        if let Some(ref e) = self.start_error {
            return Err(e.clone());
        }
        self.live.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(MockPipeline {
            device: device.clone(),
            processor,
            passthrough: self.passthrough_output,
            live: std::sync::Arc::clone(&self.live),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_not_available_maps_to_unavailable() {
        let d = DeviceDescriptor::new(0, "Mic");
        let err = CaptureError::from_input_build(&d, cpal::BuildStreamError::DeviceNotAvailable);
        assert!(matches!(err, CaptureError::DeviceUnavailable { ref device, .. } if device == "Mic"));
    }

    #[test]
    fn other_build_errors_map_to_graph_creation() {
        let d = DeviceDescriptor::new(0, "Mic");
        let err = CaptureError::from_input_build(
            &d,
            cpal::BuildStreamError::StreamConfigNotSupported,
        );
        assert!(matches!(err, CaptureError::GraphCreation(_)));
    }

    #[test]
    fn play_errors_map_like_build_errors() {
        let d = DeviceDescriptor::new(0, "Mic");
        let err = CaptureError::from_input_play(&d, cpal::PlayStreamError::DeviceNotAvailable);
        assert!(matches!(err, CaptureError::DeviceUnavailable { ref device, .. } if device == "Mic"));

        let err = CaptureError::from_input_play(
            &d,
            cpal::PlayStreamError::BackendSpecific {
                err: cpal::BackendSpecificError {
                    description: "clock stopped".into(),
                },
            },
        );
        assert!(matches!(err, CaptureError::GraphCreation(ref m) if m.contains("clock stopped")));
    }

    #[test]
    fn error_display_names_the_device() {
        let err = CaptureError::DeviceUnavailable {
            device: "USB Mic".into(),
            reason: "in use".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("USB Mic"), "message: {msg}");
        assert!(msg.contains("in use"), "message: {msg}");
    }

    #[test]
    fn integer_samples_are_converted_to_unit_range() {
        let mut scratch = vec![9.0_f32; 8];

        convert_into(&mut scratch, &[0_i16, i16::MIN, 16_384]);
        assert_eq!(scratch, [0.0, -1.0, 0.5]);

        // u16 is offset binary: 32768 is silence.
        convert_into(&mut scratch, &[32_768_u16]);
        assert_eq!(scratch, [0.0]);
    }

    #[test]
    fn mock_tracks_live_pipelines() {
        use crate::meter::{OverflowPolicy, PeakState};

        let backend = MockBackend::with_devices(&["Mic"]);
        let (tx, _rx) = tokio::sync::watch::channel(Default::default());
        let processor = QuantumProcessor::new(
            OverflowPolicy::Saturate,
            std::sync::Arc::new(PeakState::new()),
            tx,
        );
        let device = DeviceDescriptor::new(0, "Mic");

        let pipeline = backend.start_pipeline(&device, processor).unwrap();
        assert_eq!(backend.live_pipelines(), 1);
        drop(pipeline);
        assert_eq!(backend.live_pipelines(), 0);
    }

    // -- start_streams -----------------------------------------------------

    type EventLog = std::rc::Rc<std::cell::RefCell<Vec<String>>>;

    #[derive(Debug)]
    struct FakeStream {
        name: &'static str,
        fail_play: bool,
        log: EventLog,
    }

    impl FakeStream {
        fn new(name: &'static str, fail_play: bool, log: &EventLog) -> Self {
            Self {
                name,
                fail_play,
                log: EventLog::clone(log),
            }
        }
    }

    impl StreamTrait for FakeStream {
        fn play(&self) -> Result<(), cpal::PlayStreamError> {
            self.log.borrow_mut().push(format!("play {}", self.name));
            if self.fail_play {
                Err(cpal::PlayStreamError::DeviceNotAvailable)
            } else {
                Ok(())
            }
        }

        fn pause(&self) -> Result<(), cpal::PauseStreamError> {
            Ok(())
        }
    }

    impl Drop for FakeStream {
        fn drop(&mut self) {
            self.log.borrow_mut().push(format!("drop {}", self.name));
        }
    }

    fn events(log: &EventLog) -> Vec<String> {
        log.borrow().clone()
    }

    #[test]
    fn sink_starts_before_source() {
        let log = EventLog::default();
        let d = DeviceDescriptor::new(0, "Mic");

        let (source, sink) = start_streams(
            &d,
            FakeStream::new("source", false, &log),
            Some(FakeStream::new("sink", false, &log)),
        )
        .unwrap();

        assert_eq!(events(&log), ["play sink", "play source"]);
        assert!(sink.is_some());
        drop((source, sink));
    }

    #[test]
    fn without_passthrough_only_source_is_started() {
        let log = EventLog::default();
        let d = DeviceDescriptor::new(0, "Mic");

        let (_source, sink) =
            start_streams(&d, FakeStream::new("source", false, &log), None).unwrap();

        assert!(sink.is_none());
        assert_eq!(events(&log), ["play source"]);
    }

    #[test]
    fn failed_source_drops_both_streams() {
        let log = EventLog::default();
        let d = DeviceDescriptor::new(0, "Mic");

        let err = start_streams(
            &d,
            FakeStream::new("source", true, &log),
            Some(FakeStream::new("sink", false, &log)),
        )
        .unwrap_err();

        assert!(matches!(err, CaptureError::DeviceUnavailable { .. }));
        let ev = events(&log);
        assert_eq!(&ev[..2], ["play sink", "play source"]);
        assert!(ev.contains(&"drop source".to_string()));
        assert!(ev.contains(&"drop sink".to_string()));
    }

    #[test]
    fn failed_sink_never_starts_source() {
        let log = EventLog::default();
        let d = DeviceDescriptor::new(0, "Mic");

        let err = start_streams(
            &d,
            FakeStream::new("source", false, &log),
            Some(FakeStream::new("sink", true, &log)),
        )
        .unwrap_err();

        assert!(matches!(err, CaptureError::GraphCreation(ref m) if m.starts_with("output stream")));
        let ev = events(&log);
        assert!(!ev.contains(&"play source".to_string()));
        assert_eq!(ev.len(), 3, "events: {ev:?}");
    }
}
