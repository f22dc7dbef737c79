//! tagsmith-pipeline: pure logo preparation pipeline (sans-IO).
//!
//! Turns an uploaded raster into a canonical image through:
//! decode -> downsample -> background isolation -> centering & crop.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte buffers and returns owned rasters. Async orchestration and the
//! external collaborators live in `tagsmith-session`.

pub mod center;
pub mod decode;
pub mod diagnostics;
pub mod downsample;
pub mod isolate;
pub mod pipeline;
pub mod types;

pub use center::{Centering, CropGeometry};
pub use downsample::ResampleFilter;
pub use isolate::{BackgroundModel, Isolation};
pub use pipeline::Pipeline;
pub use types::{
    AlphaMask, BoundingBox, CanonicalImage, CenteringConfig, DEFAULT_MAX_UPLOAD_BYTES,
    Dimensions, GrayImage, InputError, IsolationConfig, PipelineConfig, PipelineError, RgbaImage,
    SegmentationError,
};

/// Run the full preparation pipeline.
///
/// Takes raw upload bytes (PNG, JPEG, BMP, WebP) and produces a
/// [`CanonicalImage`]: cropped to its content plus margin, centered on a
/// transparent square canvas.
///
/// # Errors
///
/// Returns [`PipelineError::Input`] if the upload is rejected and
/// [`PipelineError::Segmentation`] if no subject can be isolated.
pub fn prepare(image_bytes: Vec<u8>, config: &PipelineConfig) -> Result<CanonicalImage, PipelineError> {
    Ok(Pipeline::new(image_bytes, config.clone())
        .decode()?
        .downsample()
        .isolate()?
        .center()?
        .into_canonical())
}

/// [`prepare`], checking `is_cancelled` before each stage.
///
/// Returns `Ok(None)` as soon as the check reports cancellation; the
/// stages already run are discarded.
///
/// # Errors
///
/// Same as [`prepare`].
pub fn prepare_cancellable(
    image_bytes: Vec<u8>,
    config: &PipelineConfig,
    is_cancelled: impl Fn() -> bool,
) -> Result<Option<CanonicalImage>, PipelineError> {
    macro_rules! checkpoint {
        () => {
            if is_cancelled() {
                log::debug!("pipeline: run cancelled");
                return Ok(None);
            }
        };
    }
    checkpoint!();
    let decoded = Pipeline::new(image_bytes, config.clone()).decode()?;
    checkpoint!();
    let downsampled = decoded.downsample();
    checkpoint!();
    let isolated = downsampled.isolate()?;
    checkpoint!();
    let centered = isolated.center()?;
    Ok(Some(centered.into_canonical()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{ImageEncoder, Rgba};

    use super::*;

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

    #[test]
    fn prepare_empty_input() {
        let result = prepare(Vec::new(), &PipelineConfig::default());
        assert!(matches!(
            result,
            Err(PipelineError::Input(InputError::Empty))
        ));
    }

    #[test]
    fn prepare_oversized_input() {
        let config = PipelineConfig {
            max_upload_bytes: 16,
            ..PipelineConfig::default()
        };
        let result = prepare(vec![0; 17], &config);
        assert!(matches!(
            result,
            Err(PipelineError::Input(InputError::TooLarge { .. }))
        ));
    }

    fn dot_png() -> Vec<u8> {
        encode_png(&RgbaImage::from_fn(60, 40, |x, y| {
            if (20..35).contains(&x) && (10..25).contains(&y) {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        }))
    }

    #[test]
    fn cancelled_before_start_skips_decoding() {
        // Garbage bytes would fail decoding if the first stage ran.
        let result = prepare_cancellable(vec![1, 2, 3], &PipelineConfig::default(), || true);
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn cancellation_stops_between_stages() {
        let checks = std::cell::Cell::new(0);
        let result = prepare_cancellable(dot_png(), &PipelineConfig::default(), || {
            checks.set(checks.get() + 1);
            checks.get() > 2
        });
        assert!(matches!(result, Ok(None)));
        assert_eq!(checks.get(), 3);
    }

    #[test]
    fn uncancelled_run_matches_prepare() {
        let config = PipelineConfig::default();
        let canonical = prepare_cancellable(dot_png(), &config, || false)
            .unwrap()
            .unwrap();
        let plain = prepare(dot_png(), &config).unwrap();
        assert_eq!(canonical.fingerprint(), plain.fingerprint());
    }

    #[test]
    fn prepare_produces_canonical_square() {
        let png = encode_png(&RgbaImage::from_fn(120, 90, |x, y| {
            let dx = f64::from(x) - 80.0;
            let dy = f64::from(y) - 30.0;
            if dx.hypot(dy) < 15.0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        }));
        let canonical = prepare(png, &PipelineConfig::default()).unwrap();
        assert_eq!(canonical.image().dimensions(), (512, 512));
        let (dx, dy) = canonical.center_offset();
        assert!(dx.abs() <= 1.0 && dy.abs() <= 1.0, "offset ({dx}, {dy})");
        assert_eq!(canonical.image().get_pixel(0, 0).0[3], 0);
    }
}
