//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! ```rust
//! # use tagsmith_pipeline::{Pipeline, PipelineConfig, PipelineError};
//! # fn run(png: Vec<u8>) -> Result<(), PipelineError> {
//! let canonical = Pipeline::new(png, PipelineConfig::default())
//!     .decode()?
//!     .downsample()
//!     .isolate()?
//!     .center()?
//!     .into_canonical();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next stage (or a
//! `Result` for fallible stages). Pixel buffers move from stage to stage;
//! no stage keeps a reference into a buffer owned by another.

use crate::center::{Centering, CropGeometry};
use crate::isolate::{BackgroundModel, Isolation};
use crate::types::{AlphaMask, CanonicalImage, PipelineConfig, PipelineError, RgbaImage};

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
#[must_use = "pipeline stages are consumed by advancing; call .decode() to continue"]
pub struct Pipeline {
    config: PipelineConfig,
    source: Vec<u8>,
}

impl Pipeline {
    /// Store the upload and config without touching either.
    pub const fn new(source: Vec<u8>, config: PipelineConfig) -> Self {
        Self { config, source }
    }

    /// The raw upload bytes.
    #[must_use]
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// Validate and decode the upload.
    ///
    /// The source bytes are released once decoding succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Input`] for empty, oversized, unsupported,
    /// or corrupt uploads.
    pub fn decode(self) -> Result<Decoded, PipelineError> {
        let source_len = self.source.len();
        let image = crate::decode::decode(&self.source, self.config.max_upload_bytes)?;
        Ok(Decoded {
            config: self.config,
            image,
            source_len,
        })
    }
}

// ───────────────────────── Stage 1: Decoded ──────────────────────────

/// Pipeline state after decoding.
#[must_use = "pipeline stages are consumed by advancing; call .downsample() to continue"]
pub struct Decoded {
    config: PipelineConfig,
    image: RgbaImage,
    source_len: usize,
}

impl Decoded {
    /// The decoded image at its original resolution.
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Size of the upload in bytes.
    #[must_use]
    pub const fn source_len(&self) -> usize {
        self.source_len
    }

    /// Reduce to the working resolution.
    pub fn downsample(self) -> Downsampled {
        let (image, applied) = crate::downsample::downsample(
            self.image,
            self.config.working_resolution,
            self.config.downsample_filter,
        );
        Downsampled {
            config: self.config,
            image,
            applied,
        }
    }
}

// ───────────────────────── Stage 2: Downsampled ──────────────────────

/// Pipeline state after working-resolution reduction.
#[must_use = "pipeline stages are consumed by advancing; call .isolate() to continue"]
pub struct Downsampled {
    config: PipelineConfig,
    image: RgbaImage,
    applied: bool,
}

impl Downsampled {
    /// The working-resolution image.
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Whether the image was actually resampled.
    #[must_use]
    pub const fn applied(&self) -> bool {
        self.applied
    }

    /// Separate the subject from the background.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Segmentation`] with
    /// [`NoSubjectDetected`](crate::SegmentationError::NoSubjectDetected)
    /// when nothing distinguishable from the background is found.
    pub fn isolate(self) -> Result<Isolated, PipelineError> {
        let isolation = crate::isolate::isolate(&self.image, &self.config.isolation)?;
        Ok(Isolated {
            config: self.config,
            image: self.image,
            isolation,
        })
    }
}

// ───────────────────────── Stage 3: Isolated ─────────────────────────

/// Pipeline state after background isolation.
#[must_use = "pipeline stages are consumed by advancing; call .center() to continue"]
pub struct Isolated {
    config: PipelineConfig,
    image: RgbaImage,
    isolation: Isolation,
}

impl Isolated {
    /// The working-resolution image the mask is aligned with.
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// The subject mask.
    #[must_use]
    pub const fn mask(&self) -> &AlphaMask {
        &self.isolation.mask
    }

    /// The background model used for classification.
    #[must_use]
    pub const fn background(&self) -> BackgroundModel {
        self.isolation.background
    }

    /// Full isolator output.
    #[must_use]
    pub const fn isolation(&self) -> &Isolation {
        &self.isolation
    }

    /// Crop and center onto the canonical canvas.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Segmentation`] with
    /// [`EmptyMask`](crate::SegmentationError::EmptyMask) if the mask has
    /// nothing above the opacity threshold.
    pub fn center(self) -> Result<Centered, PipelineError> {
        let Centering {
            canonical,
            geometry,
        } = crate::center::center(self.image, &self.isolation.mask, &self.config.centering)?;
        Ok(Centered {
            canonical,
            geometry,
        })
    }
}

// ───────────────────────── Stage 4: Centered ─────────────────────────

/// Final pipeline state: the canonical image is ready.
#[must_use = "call .into_canonical() to take the canonical image"]
pub struct Centered {
    canonical: CanonicalImage,
    geometry: CropGeometry,
}

impl Centered {
    /// The canonical image.
    #[must_use]
    pub const fn canonical(&self) -> &CanonicalImage {
        &self.canonical
    }

    /// Crop geometry in working-resolution coordinates.
    #[must_use]
    pub const fn geometry(&self) -> CropGeometry {
        self.geometry
    }

    /// Take the canonical image.
    pub fn into_canonical(self) -> CanonicalImage {
        self.canonical
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{ImageEncoder, Rgba};

    use super::*;
    use crate::types::{InputError, SegmentationError};

    fn encode_png(img: &RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        image::codecs::png::PngEncoder::new(&mut buf)
            .write_image(
                img.as_raw(),
                img.width(),
                img.height(),
                image::ExtendedColorType::Rgba8,
            )
            .unwrap();
        buf
    }

    fn logo_png() -> Vec<u8> {
        encode_png(&RgbaImage::from_fn(80, 60, |x, y| {
            if (20..50).contains(&x) && (10..40).contains(&y) {
                Rgba([10, 120, 40, 255])
            } else {
                Rgba([250, 250, 250, 255])
            }
        }))
    }

    #[test]
    fn stages_expose_intermediates() {
        let decoded = Pipeline::new(logo_png(), PipelineConfig::default())
            .decode()
            .unwrap();
        assert_eq!(decoded.image().dimensions(), (80, 60));

        let downsampled = decoded.downsample();
        assert!(!downsampled.applied());

        let isolated = downsampled.isolate().unwrap();
        assert!(matches!(
            isolated.background(),
            BackgroundModel::Color { .. }
        ));
        assert_eq!(isolated.mask().dimensions(), isolated.isolation().mask.dimensions());

        let centered = isolated.center().unwrap();
        assert_eq!(centered.geometry().content.width(), 30);
        assert_eq!(centered.canonical().size(), 512);
    }

    #[test]
    fn working_resolution_applies_before_isolation() {
        let config = PipelineConfig {
            working_resolution: 40,
            ..PipelineConfig::default()
        };
        let downsampled = Pipeline::new(logo_png(), config).decode().unwrap().downsample();
        assert!(downsampled.applied());
        assert_eq!(downsampled.image().dimensions(), (40, 30));
    }

    #[test]
    fn decode_failure_stops_pipeline() {
        let result = Pipeline::new(vec![1, 2, 3], PipelineConfig::default()).decode();
        assert!(matches!(
            result,
            Err(PipelineError::Input(InputError::UnsupportedFormat))
        ));
    }

    #[test]
    fn uniform_upload_stops_at_isolation() {
        let png = encode_png(&RgbaImage::from_pixel(100, 100, Rgba([128, 128, 128, 255])));
        let result = Pipeline::new(png, PipelineConfig::default())
            .decode()
            .unwrap()
            .downsample()
            .isolate();
        assert!(matches!(
            result,
            Err(PipelineError::Segmentation(SegmentationError::NoSubjectDetected))
        ));
    }
}
