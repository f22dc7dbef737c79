//! Physical limits of the printable area on a keychain blank.
//!
//! All lengths are millimetres. Clamping helpers never reject a value:
//! out-of-range input is pulled to the nearest bound, NaN keeps the
//! current value.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::transform::Footprint;

/// Size, position, and rotation envelope of the blank.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintBounds {
    /// Side length of the square printable area.
    pub blank_extent_mm: f64,
    /// Smallest printed side length of the canonical canvas.
    pub min_scale_mm: f64,
    /// Largest printed side length of the canonical canvas.
    pub max_scale_mm: f64,
    /// Largest offset from the blank center on either axis.
    pub max_offset_mm: f64,
    /// Scale used when the gate does not recommend one.
    pub default_scale_mm: f64,
}

impl PrintBounds {
    /// Default printable area side length.
    pub const DEFAULT_BLANK_EXTENT_MM: f64 = 70.0;
    /// Default minimum scale.
    pub const DEFAULT_MIN_SCALE_MM: f64 = 5.0;
    /// Default maximum scale.
    pub const DEFAULT_MAX_SCALE_MM: f64 = 39.0;
    /// Default maximum offset.
    pub const DEFAULT_MAX_OFFSET_MM: f64 = 15.0;
    /// Default fallback scale.
    pub const DEFAULT_SCALE_MM: f64 = 36.0;

    /// Half the printable area side length.
    #[must_use]
    pub fn half_extent(&self) -> f64 {
        self.blank_extent_mm / 2.0
    }

    /// Clamp a requested scale into `[min_scale_mm, max_scale_mm]`.
    ///
    /// NaN keeps `current`.
    #[must_use]
    pub fn clamp_scale(&self, requested: f64, current: f64) -> f64 {
        if requested.is_nan() {
            return current;
        }
        clamp_into(requested, self.min_scale_mm, self.max_scale_mm)
    }

    /// Initial scale for a printable verdict.
    ///
    /// A recommendation goes through the same clamp as user input; a
    /// missing or NaN recommendation falls back to `default_scale_mm`.
    #[must_use]
    pub fn initial_scale(&self, recommended: Option<f64>) -> f64 {
        let fallback = clamp_into(self.default_scale_mm, self.min_scale_mm, self.max_scale_mm);
        recommended.map_or(fallback, |s| self.clamp_scale(s, fallback))
    }

    /// Wrap a requested rotation into `[0, 2π)`.
    ///
    /// Non-finite input keeps `current`.
    #[must_use]
    pub fn wrap_rotation(requested: f64, current: f64) -> f64 {
        if !requested.is_finite() {
            return current;
        }
        let wrapped = requested.rem_euclid(TAU);
        // rem_euclid of a tiny negative value rounds up to exactly TAU.
        if wrapped >= TAU { 0.0 } else { wrapped }
    }

    /// Offsets that keep `footprint` inside the blank, per axis.
    #[must_use]
    pub fn offset_range(&self, footprint: &Footprint) -> OffsetRange {
        let half = self.half_extent();
        OffsetRange {
            x: self.axis_range(-half - footprint.min_x, half - footprint.max_x),
            y: self.axis_range(-half - footprint.min_y, half - footprint.max_y),
        }
    }

    fn axis_range(&self, fit_min: f64, fit_max: f64) -> AxisRange {
        let limit = self.max_offset_mm.abs();
        let min = fit_min.max(-limit);
        let max = fit_max.min(limit);
        if min <= max {
            AxisRange { min, max }
        } else {
            // The footprint is wider than the blank: pin it to the best fit.
            let mid = clamp_into((fit_min + fit_max) / 2.0, -limit, limit);
            AxisRange { min: mid, max: mid }
        }
    }
}

impl Default for PrintBounds {
    fn default() -> Self {
        Self {
            blank_extent_mm: Self::DEFAULT_BLANK_EXTENT_MM,
            min_scale_mm: Self::DEFAULT_MIN_SCALE_MM,
            max_scale_mm: Self::DEFAULT_MAX_SCALE_MM,
            max_offset_mm: Self::DEFAULT_MAX_OFFSET_MM,
            default_scale_mm: Self::DEFAULT_SCALE_MM,
        }
    }
}

/// Valid offsets for a footprint on both axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetRange {
    /// Horizontal range.
    pub x: AxisRange,
    /// Vertical range.
    pub y: AxisRange,
}

/// Closed interval of valid offsets on one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisRange {
    /// Lowest valid offset.
    pub min: f64,
    /// Highest valid offset.
    pub max: f64,
}

impl AxisRange {
    /// Clamp `requested` into the range. NaN keeps `current`, itself
    /// pulled into range.
    #[must_use]
    pub fn clamp(self, requested: f64, current: f64) -> f64 {
        let value = if requested.is_nan() { current } else { requested };
        clamp_into(value, self.min, self.max)
    }

    /// Whether `value` lies inside the range.
    #[must_use]
    pub fn contains(self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// `f64::clamp` without the panic on inverted bounds.
fn clamp_into(value: f64, min: f64, max: f64) -> f64 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn scale_clamps_both_ends() {
        let b = PrintBounds::default();
        assert!((b.clamp_scale(100.0, 36.0) - 39.0).abs() < f64::EPSILON);
        assert!((b.clamp_scale(-10.0, 36.0) - 5.0).abs() < f64::EPSILON);
        assert!((b.clamp_scale(20.0, 36.0) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn scale_infinities_hit_the_bounds() {
        let b = PrintBounds::default();
        assert!((b.clamp_scale(f64::INFINITY, 20.0) - 39.0).abs() < f64::EPSILON);
        assert!((b.clamp_scale(f64::NEG_INFINITY, 20.0) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn scale_nan_keeps_current() {
        let b = PrintBounds::default();
        assert!((b.clamp_scale(f64::NAN, 20.0) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn initial_scale_falls_back_and_clamps() {
        let b = PrintBounds::default();
        assert!((b.initial_scale(None) - 36.0).abs() < f64::EPSILON);
        assert!((b.initial_scale(Some(28.0)) - 28.0).abs() < f64::EPSILON);
        assert!((b.initial_scale(Some(80.0)) - 39.0).abs() < f64::EPSILON);
        assert!((b.initial_scale(Some(f64::NAN)) - 36.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rotation_wraps() {
        let r = PrintBounds::wrap_rotation(TAU + 1.0, 0.0);
        assert!((r - 1.0).abs() < 1e-12);
        let r = PrintBounds::wrap_rotation(-1.0, 0.0);
        assert!((r - (TAU - 1.0)).abs() < 1e-12);
        assert!(PrintBounds::wrap_rotation(TAU, 0.5).abs() < f64::EPSILON);
        let r = PrintBounds::wrap_rotation(-1e-20, 0.5);
        assert!((0.0..TAU).contains(&r));
    }

    #[test]
    fn rotation_non_finite_keeps_current() {
        assert!((PrintBounds::wrap_rotation(f64::NAN, 0.5) - 0.5).abs() < f64::EPSILON);
        assert!((PrintBounds::wrap_rotation(f64::INFINITY, 0.5) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn small_footprint_gets_full_offset_range() {
        let b = PrintBounds::default();
        let fp = Footprint {
            min_x: -5.0,
            min_y: -5.0,
            max_x: 5.0,
            max_y: 5.0,
        };
        let range = b.offset_range(&fp);
        assert_eq!(range.x, AxisRange { min: -15.0, max: 15.0 });
        assert_eq!(range.y, AxisRange { min: -15.0, max: 15.0 });
    }

    #[test]
    fn large_footprint_narrows_offset_range() {
        let b = PrintBounds::default();
        let fp = Footprint {
            min_x: -25.0,
            min_y: -10.0,
            max_x: 25.0,
            max_y: 10.0,
        };
        let range = b.offset_range(&fp);
        assert_eq!(range.x, AxisRange { min: -10.0, max: 10.0 });
        assert_eq!(range.y, AxisRange { min: -15.0, max: 15.0 });
    }

    #[test]
    fn oversized_footprint_is_pinned() {
        let b = PrintBounds {
            blank_extent_mm: 20.0,
            ..PrintBounds::default()
        };
        let fp = Footprint {
            min_x: -12.0,
            min_y: -12.0,
            max_x: 14.0,
            max_y: 12.0,
        };
        let range = b.offset_range(&fp);
        assert!((range.x.min - range.x.max).abs() < f64::EPSILON);
        assert!((range.x.min - -1.0).abs() < f64::EPSILON);
        assert!((range.y.min - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn axis_clamp_handles_nan_and_infinity() {
        let axis = AxisRange {
            min: -10.0,
            max: 10.0,
        };
        assert!((axis.clamp(f64::INFINITY, 0.0) - 10.0).abs() < f64::EPSILON);
        assert!((axis.clamp(f64::NEG_INFINITY, 0.0) - -10.0).abs() < f64::EPSILON);
        assert!((axis.clamp(f64::NAN, 3.0) - 3.0).abs() < f64::EPSILON);
        // A stale current value is still pulled into range.
        assert!((axis.clamp(f64::NAN, 14.0) - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn bounds_partial_json_uses_defaults() {
        let b: PrintBounds = serde_json::from_str(r#"{"max_scale_mm": 30.0}"#).unwrap();
        assert!((b.max_scale_mm - 30.0).abs() < f64::EPSILON);
        assert!((b.blank_extent_mm - 70.0).abs() < f64::EPSILON);
    }
}
