//! Per-quantum processing on the audio thread.
//!
//! [`QuantumProcessor::process`] is called once for every buffer the capture
//! engine delivers. It scans the buffer for its peak, derives a brightness,
//! records the peak in the shared [`PeakState`] and publishes a
//! [`MeterUpdate`] to the UI.
//!
//! The UI side is a `tokio::sync::watch` channel. Each quantum replaces the
//! previous value, so the UI always reads the newest update no matter how far
//! behind it is, and the audio thread never waits.
//!
//! ```text
//! cpal callback ──▶ FrameBuffer ──▶ peak ──▶ brightness
//!                                    │            │
//!                                    ▼            ▼
//!                               PeakState    MeterUpdate ──send_replace──▶ UI
//! ```

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::audio::FrameBuffer;

use super::peak::{brightness, peak, OverflowPolicy};

// ---------------------------------------------------------------------------
// MeterUpdate
// ---------------------------------------------------------------------------

/// The value published to the UI after each quantum.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeterUpdate {
    /// Peak magnitude of the quantum.
    pub peak: f32,
    /// Brightness derived from `peak`.
    pub brightness: u8,
}

impl MeterUpdate {
    /// Base-10 text shown in the read-out.
    pub fn text(&self) -> String {
        self.brightness.to_string()
    }
}

// ---------------------------------------------------------------------------
// PeakState
// ---------------------------------------------------------------------------

/// Last computed peak, shared between the audio thread and the UI.
///
/// The audio thread is the only writer. The peak is stored as raw `f32` bits
/// in an atomic so neither side takes a lock.
#[derive(Debug, Default)]
pub struct PeakState {
    peak_bits: AtomicU32,
    quanta: AtomicU64,
}

impl PeakState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the peak and count one more processed quantum.
    pub fn store(&self, peak: f32) {
        self.peak_bits.store(peak.to_bits(), Ordering::Relaxed);
        self.quanta.fetch_add(1, Ordering::Relaxed);
    }

    /// Most recent peak (`0.0` before the first quantum).
    pub fn peak(&self) -> f32 {
        f32::from_bits(self.peak_bits.load(Ordering::Relaxed))
    }

    /// Number of quanta processed since creation or the last [`reset`](Self::reset).
    pub fn quanta(&self) -> u64 {
        self.quanta.load(Ordering::Relaxed)
    }

    /// Clear the peak and counter. Called when a new capture starts.
    pub fn reset(&self) {
        self.peak_bits.store(0.0_f32.to_bits(), Ordering::Relaxed);
        self.quanta.store(0, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// QuantumProcessor
// ---------------------------------------------------------------------------

/// Callback state moved into the capture stream.
pub struct QuantumProcessor {
    policy: OverflowPolicy,
    state: Arc<PeakState>,
    updates: watch::Sender<MeterUpdate>,
}

impl QuantumProcessor {
    /// Create a processor that folds brightness with `policy`, records peaks
    /// in `state` and publishes updates on `updates`.
    pub fn new(
        policy: OverflowPolicy,
        state: Arc<PeakState>,
        updates: watch::Sender<MeterUpdate>,
    ) -> Self {
        Self {
            policy,
            state,
            updates,
        }
    }

    /// Process one quantum.
    ///
    /// Never blocks. The returned update is the one now held by the channel.
    pub fn process(&mut self, frame: FrameBuffer<'_>) -> MeterUpdate {
        let peak = peak(frame.samples());
        let update = MeterUpdate {
            peak,
            brightness: brightness(peak, self.policy),
        };

        self.state.store(peak);

        // Stores even when every receiver is gone; the stream is dropped later.
        self.updates.send_replace(update);

        update
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
