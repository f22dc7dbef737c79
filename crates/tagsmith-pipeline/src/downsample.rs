//! Resampling filters and working-resolution reduction.
//!
//! Large uploads are reduced so the longest axis matches the configured
//! `working_resolution` before isolation, so border sampling,
//! morphology, and component labelling run on a bounded pixel grid.
//!
//! If the image is already at or below the target resolution it is
//! returned unchanged.

use std::fmt;

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::types::RgbaImage;

/// Resampling filter used when shrinking or fitting an image.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResampleFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest.
    Lanczos3,
}

impl ResampleFilter {
    /// Convert to the `image` crate's `FilterType`.
    #[must_use]
    pub const fn to_image_filter(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Triangle => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for ResampleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Shrink `image` so the longest axis is at most `max_dimension` pixels,
/// preserving aspect ratio.
///
/// Takes ownership so an image that needs no reduction is passed
/// through without a copy. Returns the image and whether it was
/// resampled. A `max_dimension` of zero is treated as 1.
#[must_use]
pub fn downsample(
    image: RgbaImage,
    max_dimension: u32,
    filter: ResampleFilter,
) -> (RgbaImage, bool) {
    let max_dimension = max_dimension.max(1);
    let (w, h) = image.dimensions();
    let long_axis = w.max(h);

    if long_axis <= max_dimension {
        return (image, false);
    }

    let (new_w, new_h) = fit_within(w, h, max_dimension);
    let resized = image::imageops::resize(&image, new_w, new_h, filter.to_image_filter());
    (resized, true)
}

/// Target size for fitting `(w, h)` inside a `max` x `max` square.
///
/// Both outputs are at least 1.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn fit_within(w: u32, h: u32, max: u32) -> (u32, u32) {
    let ratio = f64::from(max) / f64::from(w.max(h));
    let scale = |v: u32| ((f64::from(v) * ratio).round() as u32).clamp(1, max);
    (scale(w), scale(h))
}
