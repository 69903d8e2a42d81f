//! Clamping helpers shared by the config `sanitized()` methods.
//!
//! Out-of-range values are replaced, never rejected. Each replacement is
//! logged once at `warn` with the field name.

use tracing::warn;

/// Periods and counts must be at least 1.
pub(crate) fn period(field: &'static str, value: usize, fallback: usize) -> usize {
    if value >= 1 {
        value
    } else {
        warn!(field, value, fallback, "period must be >= 1, clamped");
        fallback.max(1)
    }
}

/// Counts with an upper bound, such as bar offsets added to an index.
pub(crate) fn at_most(field: &'static str, value: usize, max: usize) -> usize {
    if value <= max {
        value
    } else {
        warn!(field, value, max, "count too large, clamped");
        max
    }
}

/// Finite and strictly positive.
pub(crate) fn positive(field: &'static str, value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        warn!(field, value, fallback, "value must be > 0, clamped");
        fallback
    }
}

/// Finite and zero or more.
pub(crate) fn non_negative(field: &'static str, value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        warn!(field, value, fallback, "value must be >= 0, clamped");
        fallback
    }
}

/// Finite and within `[lo, hi]`. NaN takes the fallback; out-of-range values
/// are pinned to the nearest bound.
pub(crate) fn within(field: &'static str, value: f64, lo: f64, hi: f64, fallback: f64) -> f64 {
    if !value.is_finite() {
        warn!(field, value, fallback, "value is not a number, clamped");
        return fallback;
    }
    if value < lo || value > hi {
        let pinned = value.clamp(lo, hi);
        warn!(field, value, pinned, "value out of range, clamped");
        return pinned;
    }
    value
}
