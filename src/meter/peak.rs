//! Peak detection and the cubic brightness curve.
//!
//! Both functions are pure and allocation-free so they can run directly on the
//! audio thread.
//!
//! # Example
//!
//! ```rust
//! use peak_meter::meter::{brightness, peak, OverflowPolicy};
//!
//! let samples = [0.0_f32, -0.004, 0.002, 0.003];
//! let p = peak(&samples);
//! assert_eq!(p, 0.004);
//!
//! // (0.004 * 1000)^3 = 64
//! assert_eq!(brightness(p, OverflowPolicy::Saturate), 64);
//! ```

use serde::{Deserialize, Serialize};

/// Multiplier applied to the peak before the cubic curve.
pub const PEAK_SCALE: f32 = 1000.0;

// ---------------------------------------------------------------------------
// OverflowPolicy
// ---------------------------------------------------------------------------

/// How a cubic result outside `0..=255` is folded into a byte.
///
/// | Variant    | `300.0` | `1_000_000.0` | `inf` / `NaN` |
/// |------------|---------|---------------|---------------|
/// | `Saturate` | 255     | 255           | 255           |
/// | `Wrap`     | 44      | 64            | 0             |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Clamp to 255.
    Saturate,
    /// Keep the low eight bits, like an unchecked byte cast.
    Wrap,
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        Self::Saturate
    }
}

// ---------------------------------------------------------------------------
// peak / brightness
// ---------------------------------------------------------------------------

/// Maximum absolute sample value in `samples`.
///
/// Returns `0.0` for an empty slice. `NaN` samples never win the comparison
/// (`f32::max` returns the non-NaN operand), so the result is always a finite
/// or infinite value `>= 0.0`.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
}

/// Map a peak magnitude to a display brightness.
///
/// `round((peak * 1000)^3)`, folded into a byte according to `policy`.
/// The scaling happens in `f32` and the cube in `f64`.
pub fn brightness(peak: f32, policy: OverflowPolicy) -> u8 {
    let x = f64::from(peak * PEAK_SCALE);
    let raw = x.powf(3.0).round();

    match policy {
        OverflowPolicy::Saturate => {
            if raw.is_nan() {
                u8::MAX
            } else {
                // +inf clamps to 255.
                raw.clamp(0.0, 255.0) as u8
            }
        }
        OverflowPolicy::Wrap => {
            if !raw.is_finite() {
                0
            } else {
                raw.rem_euclid(256.0) as u8
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
