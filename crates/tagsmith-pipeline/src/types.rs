//! Shared types for the tagsmith logo preparation pipeline.

use std::hash::Hasher;

use image::ImageEncoder;
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;

use crate::downsample::ResampleFilter;

/// Re-export `GrayImage` so downstream crates can reference mask data
/// without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbaImage` so downstream crates can reference decoded and
/// canonical rasters without depending on `image` directly.
pub use image::RgbaImage;

/// Default upload limit: 5 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an image buffer.
    #[must_use]
    pub fn of<P: image::Pixel>(image: &image::ImageBuffer<P, Vec<P::Subpixel>>) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Total pixel count.
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Axis-aligned pixel rectangle.
///
/// `min_*` are inclusive, `max_*` are exclusive, so a box covering pixels
/// 30 through 69 on both axes is `(30, 30)-(70, 70)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge (inclusive).
    pub min_x: u32,
    /// Top edge (inclusive).
    pub min_y: u32,
    /// Right edge (exclusive).
    pub max_x: u32,
    /// Bottom edge (exclusive).
    pub max_y: u32,
}

impl BoundingBox {
    /// Width in pixels.
    #[must_use]
    pub const fn width(self) -> u32 {
        self.max_x - self.min_x
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(self) -> u32 {
        self.max_y - self.min_y
    }

    /// The longer of the two sides.
    #[must_use]
    pub fn longest_side(self) -> u32 {
        self.width().max(self.height())
    }

    /// Geometric center in continuous pixel coordinates.
    #[must_use]
    pub fn center(self) -> (f64, f64) {
        (
            f64::from(self.min_x + self.max_x) / 2.0,
            f64::from(self.min_y + self.max_y) / 2.0,
        )
    }

    /// Smallest box enclosing every pixel for which `is_content` holds.
    ///
    /// Returns `None` when no pixel qualifies.
    pub fn enclosing(
        width: u32,
        height: u32,
        mut is_content: impl FnMut(u32, u32) -> bool,
    ) -> Option<Self> {
        let mut found: Option<Self> = None;
        for y in 0..height {
            for x in 0..width {
                if !is_content(x, y) {
                    continue;
                }
                found = Some(match found {
                    None => Self {
                        min_x: x,
                        min_y: y,
                        max_x: x + 1,
                        max_y: y + 1,
                    },
                    Some(b) => Self {
                        min_x: b.min_x.min(x),
                        min_y: b.min_y.min(y),
                        max_x: b.max_x.max(x + 1),
                        max_y: b.max_y.max(y + 1),
                    },
                });
            }
        }
        found
    }
}

/// Per-pixel subject membership aligned 1:1 with the image it was
/// derived from.
///
/// [`AlphaMask::SUBJECT`] marks subject pixels and
/// [`AlphaMask::BACKGROUND`] marks background. Intermediate values are
/// allowed and compared against an opacity threshold by consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlphaMask(GrayImage);

impl AlphaMask {
    /// Mask value for subject pixels.
    pub const SUBJECT: u8 = 255;
    /// Mask value for background pixels.
    pub const BACKGROUND: u8 = 0;

    /// Wrap a single-channel image as a mask.
    #[must_use]
    pub const fn new(mask: GrayImage) -> Self {
        Self(mask)
    }

    /// Mask dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.0)
    }

    /// Raw mask value at `(x, y)`.
    #[must_use]
    pub fn value(&self, x: u32, y: u32) -> u8 {
        self.0.get_pixel(x, y).0[0]
    }

    /// Number of pixels with a value above `threshold`.
    #[must_use]
    pub fn count_above(&self, threshold: u8) -> u64 {
        self.0.pixels().filter(|p| p.0[0] > threshold).count() as u64
    }

    /// Borrow the underlying single-channel image.
    #[must_use]
    pub const fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    /// Consume the mask and return the underlying image.
    #[must_use]
    pub fn into_gray(self) -> GrayImage {
        self.0
    }
}

/// A cropped, centered, fixed-size square image with a transparent
/// background.
///
/// Constructed only by the centering stage or by [`Self::from_canvas`],
/// both of which measure the content box and fingerprint from the
/// pixels, so the fields always agree with the raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalImage {
    image: RgbaImage,
    content: BoundingBox,
    fingerprint: u64,
}

impl CanonicalImage {
    /// Adopt an already-prepared square canvas.
    ///
    /// The content box is measured from pixels whose alpha is above
    /// `opacity_threshold`.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::CanvasNotSquare`] if the canvas is not
    /// square, or [`SegmentationError::EmptyMask`] if no pixel is opaque
    /// enough to count as content.
    pub fn from_canvas(image: RgbaImage, opacity_threshold: u8) -> Result<Self, SegmentationError> {
        if image.width() != image.height() {
            return Err(SegmentationError::CanvasNotSquare {
                width: image.width(),
                height: image.height(),
            });
        }
        let content = BoundingBox::enclosing(image.width(), image.height(), |x, y| {
            image.get_pixel(x, y).0[3] > opacity_threshold
        })
        .ok_or(SegmentationError::EmptyMask)?;
        let fingerprint = fingerprint(&image);
        Ok(Self {
            image,
            content,
            fingerprint,
        })
    }

    /// The canvas pixels.
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Consume and return the canvas pixels.
    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Canvas side length in pixels.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.image.width()
    }

    /// Bounding box of the content on the canvas.
    #[must_use]
    pub const fn content(&self) -> BoundingBox {
        self.content
    }

    /// Content fingerprint: identical canvases have identical
    /// fingerprints.
    #[must_use]
    pub const fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Offset of the content center from the canvas center, in pixels.
    #[must_use]
    pub fn center_offset(&self) -> (f64, f64) {
        let (cx, cy) = self.content.center();
        let half = f64::from(self.size()) / 2.0;
        (cx - half, cy - half)
    }

    /// Encode the canvas as PNG, the payload sent to the
    /// manufacturability gate.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Encode`] if PNG encoding fails.
    pub fn encode_png(&self) -> Result<Vec<u8>, PipelineError> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        encoder
            .write_image(
                self.image.as_raw(),
                self.image.width(),
                self.image.height(),
                image::ExtendedColorType::Rgba8,
            )
            .map_err(|e| PipelineError::Encode(e.to_string()))?;
        Ok(buf)
    }
}

/// 64-bit SipHash-1-3 fingerprint over an image's dimensions and pixels.
#[must_use]
pub fn fingerprint(image: &RgbaImage) -> u64 {
    // Fixed keys: fingerprints must be stable across processes.
    let mut hasher = SipHasher13::new_with_keys(0x7461_6773_6d69_7468, 0x6361_6e6f_6e69_6361);
    hasher.write_u32(image.width());
    hasher.write_u32(image.height());
    hasher.write(image.as_raw());
    hasher.finish()
}

/// Parameters for the background isolator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationConfig {
    /// Border band thickness as a fraction of the shorter image side.
    pub border_fraction: f64,
    /// Pixels with alpha below this are treated as transparent.
    pub alpha_threshold: u8,
    /// Minimum RGB distance from the background color for a pixel to
    /// count as subject.
    pub color_tolerance: f64,
    /// Multiplier applied to the border color spread; the effective
    /// tolerance is `max(color_tolerance, spread * spread_factor)`.
    pub spread_factor: f64,
    /// Radius of the square structuring element for closing/opening.
    /// Zero disables morphological cleanup.
    pub cleanup_radius: u8,
    /// Components smaller than this fraction of the largest component
    /// are discarded as noise.
    pub min_component_fraction: f64,
    /// Foreground coverage below this fraction means no subject.
    pub min_subject_fraction: f64,
    /// Foreground coverage at or above this fraction (color model only)
    /// means nothing is distinguishable from the border.
    pub max_subject_fraction: f64,
}

impl IsolationConfig {
    /// Default border band fraction.
    pub const DEFAULT_BORDER_FRACTION: f64 = 0.04;
    /// Default alpha threshold.
    pub const DEFAULT_ALPHA_THRESHOLD: u8 = 128;
    /// Default color tolerance.
    pub const DEFAULT_COLOR_TOLERANCE: f64 = 48.0;
    /// Default spread factor.
    pub const DEFAULT_SPREAD_FACTOR: f64 = 3.0;
    /// Default cleanup radius.
    pub const DEFAULT_CLEANUP_RADIUS: u8 = 1;
    /// Default minimum component fraction.
    pub const DEFAULT_MIN_COMPONENT_FRACTION: f64 = 0.02;
    /// Default minimum subject fraction.
    pub const DEFAULT_MIN_SUBJECT_FRACTION: f64 = 0.001;
    /// Default maximum subject fraction.
    pub const DEFAULT_MAX_SUBJECT_FRACTION: f64 = 0.995;
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            border_fraction: Self::DEFAULT_BORDER_FRACTION,
            alpha_threshold: Self::DEFAULT_ALPHA_THRESHOLD,
            color_tolerance: Self::DEFAULT_COLOR_TOLERANCE,
            spread_factor: Self::DEFAULT_SPREAD_FACTOR,
            cleanup_radius: Self::DEFAULT_CLEANUP_RADIUS,
            min_component_fraction: Self::DEFAULT_MIN_COMPONENT_FRACTION,
            min_subject_fraction: Self::DEFAULT_MIN_SUBJECT_FRACTION,
            max_subject_fraction: Self::DEFAULT_MAX_SUBJECT_FRACTION,
        }
    }
}

/// Parameters for canonical centering and crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CenteringConfig {
    /// Mask values above this count as content.
    pub opacity_threshold: u8,
    /// Margin around the content box as a fraction of its longer side.
    pub margin_fraction: f64,
    /// Side length of the square canonical canvas in pixels.
    pub canvas_size: u32,
    /// Resampling filter used to fit the crop onto the canvas.
    pub filter: ResampleFilter,
}

impl CenteringConfig {
    /// Default opacity threshold.
    pub const DEFAULT_OPACITY_THRESHOLD: u8 = 127;
    /// Default margin fraction (8%).
    pub const DEFAULT_MARGIN_FRACTION: f64 = 0.08;
    /// Default canonical canvas size.
    pub const DEFAULT_CANVAS_SIZE: u32 = 512;
}

impl Default for CenteringConfig {
    fn default() -> Self {
        Self {
            opacity_threshold: Self::DEFAULT_OPACITY_THRESHOLD,
            margin_fraction: Self::DEFAULT_MARGIN_FRACTION,
            canvas_size: Self::DEFAULT_CANVAS_SIZE,
            filter: ResampleFilter::Triangle,
        }
    }
}

/// Configuration for the whole preparation pipeline.
///
/// Fields are public with no construction-time validation; stages clamp
/// out-of-range values where a sensible clamp exists (for example a zero
/// `canvas_size` is treated as 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: usize,
    /// Longest axis, in pixels, the decoded image is reduced to before
    /// isolation.
    pub working_resolution: u32,
    /// Filter used for the working-resolution reduction.
    pub downsample_filter: ResampleFilter,
    /// Background isolator parameters.
    pub isolation: IsolationConfig,
    /// Centering and crop parameters.
    pub centering: CenteringConfig,
}

impl PipelineConfig {
    /// Default working resolution.
    pub const DEFAULT_WORKING_RESOLUTION: u32 = 1024;
    /// Default downsample filter.
    pub const DEFAULT_DOWNSAMPLE_FILTER: ResampleFilter = ResampleFilter::Triangle;
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            working_resolution: Self::DEFAULT_WORKING_RESOLUTION,
            downsample_filter: Self::DEFAULT_DOWNSAMPLE_FILTER,
            isolation: IsolationConfig::default(),
            centering: CenteringConfig::default(),
        }
    }
}

/// Upload rejected before the pipeline could start.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum InputError {
    /// The upload contained no bytes.
    #[error("uploaded file is empty")]
    Empty,

    /// The upload exceeds the byte limit.
    #[error("uploaded file is {len} bytes, limit is {limit} bytes")]
    TooLarge {
        /// Length of the upload.
        len: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The encoding is not recognized or not accepted.
    #[error("unsupported image format (accepted: PNG, JPEG, BMP, WebP)")]
    UnsupportedFormat,

    /// The encoding was recognized but the data could not be decoded.
    #[error("corrupt image data: {0}")]
    CorruptData(String),

    /// The declared pixel dimensions exceed the decoder limits.
    #[error("image dimensions exceed decoder limits: {0}")]
    DimensionsTooLarge(String),
}

/// The isolator or centering stage could not find a usable subject.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum SegmentationError {
    /// Nothing in the image is distinguishable from the background.
    #[error("no subject distinguishable from the background was detected")]
    NoSubjectDetected,

    /// The mask has no pixel above the opacity threshold.
    #[error("mask contains no content above the opacity threshold")]
    EmptyMask,

    /// The mask is not aligned with the image.
    #[error("mask is {mask:?} but image is {image:?}")]
    MaskMismatch {
        /// Mask dimensions.
        mask: Dimensions,
        /// Image dimensions.
        image: Dimensions,
    },

    /// A canonical canvas must be square.
    #[error("canonical canvas must be square, got {width}x{height}")]
    CanvasNotSquare {
        /// Canvas width.
        width: u32,
        /// Canvas height.
        height: u32,
    },
}

impl SegmentationError {
    /// User-facing suggestion accompanying the error.
    #[must_use]
    pub const fn retry_hint(&self) -> &'static str {
        match self {
            Self::NoSubjectDetected | Self::EmptyMask => {
                "try an image with a clear subject on a plain or transparent background"
            }
            Self::MaskMismatch { .. } | Self::CanvasNotSquare { .. } => {
                "try uploading the image again"
            }
        }
    }
}

/// Errors that can occur during logo preparation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum PipelineError {
    /// The upload was rejected.
    #[error(transparent)]
    Input(#[from] InputError),

    /// No subject could be isolated.
    #[error(transparent)]
    Segmentation(#[from] SegmentationError),

    /// Encoding the canonical image failed.
    #[error("failed to encode canonical image: {0}")]
    Encode(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_exclusive_max() {
        let b = BoundingBox {
            min_x: 30,
            min_y: 30,
            max_x: 70,
            max_y: 70,
        };
        assert_eq!(b.width(), 40);
        assert_eq!(b.height(), 40);
        assert_eq!(b.center(), (50.0, 50.0));
    }

    #[test]
    fn enclosing_single_pixel() {
        let b = BoundingBox::enclosing(10, 10, |x, y| x == 3 && y == 7).unwrap();
        assert_eq!(
            b,
            BoundingBox {
                min_x: 3,
                min_y: 7,
                max_x: 4,
                max_y: 8
            }
        );
    }

    #[test]
    fn enclosing_nothing_is_none() {
        assert!(BoundingBox::enclosing(10, 10, |_, _| false).is_none());
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let a = RgbaImage::from_pixel(4, 4, image::Rgba([1, 2, 3, 255]));
        let b = RgbaImage::from_pixel(4, 4, image::Rgba([1, 2, 3, 254]));
        assert_eq!(fingerprint(&a), fingerprint(&a.clone()));
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_distinguishes_dimensions() {
        let wide = RgbaImage::new(8, 2);
        let tall = RgbaImage::new(2, 8);
        assert_ne!(fingerprint(&wide), fingerprint(&tall));
    }

    #[test]
    fn from_canvas_measures_content() {
        let canvas = RgbaImage::from_fn(20, 20, |x, y| {
            if (5..15).contains(&x) && (5..15).contains(&y) {
                image::Rgba([9, 9, 9, 255])
            } else {
                image::Rgba([0, 0, 0, 0])
            }
        });
        let canonical = CanonicalImage::from_canvas(canvas, 127).unwrap();
        assert_eq!(canonical.size(), 20);
        assert_eq!(canonical.content().width(), 10);
        assert_eq!(canonical.center_offset(), (0.0, 0.0));
    }

    #[test]
    fn from_canvas_rejects_non_square() {
        let canvas = RgbaImage::from_pixel(20, 10, image::Rgba([9, 9, 9, 255]));
        assert!(matches!(
            CanonicalImage::from_canvas(canvas, 127),
            Err(SegmentationError::CanvasNotSquare {
                width: 20,
                height: 10
            })
        ));
    }

    #[test]
    fn from_canvas_rejects_transparent() {
        let canvas = RgbaImage::new(16, 16);
        assert_eq!(
            CanonicalImage::from_canvas(canvas, 127),
            Err(SegmentationError::EmptyMask)
        );
    }

    #[test]
    fn encode_png_round_trips_through_decoder() {
        let canvas = RgbaImage::from_pixel(8, 8, image::Rgba([200, 10, 10, 255]));
        let canonical = CanonicalImage::from_canvas(canvas, 127).unwrap();
        let png = canonical.encode_png().unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(&decoded, canonical.image());
    }

    #[test]
    fn pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(config.working_resolution, 1024);
        assert_eq!(config.centering.canvas_size, 512);
        assert!((config.centering.margin_fraction - 0.08).abs() < f64::EPSILON);
        assert_eq!(config.isolation.cleanup_radius, 1);
    }

    #[test]
    fn pipeline_config_partial_json_uses_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"centering": {"canvas_size": 256}}"#).unwrap();
        assert_eq!(config.centering.canvas_size, 256);
        assert_eq!(config.centering.opacity_threshold, 127);
        assert_eq!(config.working_resolution, 1024);
    }

    #[test]
    fn error_display_too_large() {
        let err = InputError::TooLarge {
            len: 10,
            limit: 5,
        };
        assert_eq!(
            err.to_string(),
            "uploaded file is 10 bytes, limit is 5 bytes"
        );
    }

    #[test]
    fn pipeline_error_is_transparent_over_causes() {
        let err = PipelineError::from(SegmentationError::NoSubjectDetected);
        assert_eq!(
            err.to_string(),
            "no subject distinguishable from the background was detected"
        );
    }

    #[test]
    fn pipeline_error_serde_round_trip() {
        let err = PipelineError::Input(InputError::CorruptData("bad chunk".into()));
        let json = serde_json::to_string(&err).unwrap();
        let back: PipelineError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
