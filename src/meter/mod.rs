//! Quantum peak metering.
//!
//! ```text
//! FrameBuffer → peak (max |s|) → x = peak * 1000 → x³ → u8 → UI text
//! ```
//!
//! [`peak`] and [`brightness`] are the pure numeric core;
//! [`QuantumProcessor`] runs them once per capture callback and publishes
//! the result.

pub mod peak;
pub mod processor;

pub use peak::{brightness, peak, OverflowPolicy, PEAK_SCALE};
pub use processor::{MeterUpdate, PeakState, QuantumProcessor};
