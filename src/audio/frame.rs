//! Read-only view over one quantum of interleaved samples.
//!
//! A [`FrameBuffer`] borrows the slice handed to the capture callback, so it
//! cannot outlive the callback that produced it.

/// One quantum's worth of interleaved `f32` samples.
#[derive(Debug, Clone, Copy)]
pub struct FrameBuffer<'a> {
    samples: &'a [f32],
}

impl<'a> FrameBuffer<'a> {
    /// Wrap the samples delivered for one quantum.
    pub fn new(samples: &'a [f32]) -> Self {
        Self { samples }
    }

    /// All samples in the view, interleaved.
    pub fn samples(&self) -> &'a [f32] {
        self.samples
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
