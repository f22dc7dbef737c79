//! Canonical centering and crop.
//!
//! Given an image and its subject mask:
//!
//! 1. Make every background pixel fully transparent and cap subject alpha
//!    by the mask.
//! 2. Measure the content bounding box (alpha left after masking above the
//!    opacity threshold), so mask pixels over transparent source pixels
//!    never widen it.
//! 3. Expand the box by a margin proportional to its longer side and clamp
//!    it to the source bounds.
//! 4. Resample the crop so the margin-expanded square spans the whole
//!    canonical canvas (aspect ratio preserved, letterboxed), placing the
//!    content center on the canvas center.
//!
//! The placement is computed from the content box, not the clamped crop,
//! so subjects touching an image edge are still centered. The stage is
//! pure: identical input always yields an identical canonical image.

use serde::{Deserialize, Serialize};

use crate::types::{
    AlphaMask, BoundingBox, CanonicalImage, CenteringConfig, Dimensions, RgbaImage,
    SegmentationError,
};

/// Output of the centering stage.
#[derive(Debug, Clone)]
pub struct Centering {
    /// The canonical image.
    pub canonical: CanonicalImage,
    /// Geometry of the crop, for diagnostics.
    pub geometry: CropGeometry,
}

/// Where the canonical image came from in source coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropGeometry {
    /// Content box in the source image.
    pub content: BoundingBox,
    /// Margin added on each side, in source pixels.
    pub margin: u32,
    /// Margin-expanded box clamped to the source bounds.
    pub crop: BoundingBox,
    /// Canvas pixels per source pixel.
    pub scale: f64,
}

/// Bounding box of mask values above `threshold`.
#[must_use]
pub fn content_box(mask: &AlphaMask, threshold: u8) -> Option<BoundingBox> {
    let d = mask.dimensions();
    BoundingBox::enclosing(d.width, d.height, |x, y| mask.value(x, y) > threshold)
}

/// Crop `image` to its masked content and fit it onto the canonical
/// canvas.
///
/// # Errors
///
/// Returns [`SegmentationError::MaskMismatch`] if the mask is not aligned
/// with the image and [`SegmentationError::EmptyMask`] if no mask value is
/// above the opacity threshold.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn center(
    mut image: RgbaImage,
    mask: &AlphaMask,
    config: &CenteringConfig,
) -> Result<Centering, SegmentationError> {
    let dims = Dimensions::of(&image);
    if mask.dimensions() != dims {
        return Err(SegmentationError::MaskMismatch {
            mask: mask.dimensions(),
            image: dims,
        });
    }

    let threshold = config.opacity_threshold;
    apply_mask(&mut image, mask, threshold);
    let content = BoundingBox::enclosing(dims.width, dims.height, |x, y| {
        image.get_pixel(x, y).0[3] > threshold
    })
    .ok_or(SegmentationError::EmptyMask)?;

    let longest = content.longest_side();
    let margin = (f64::from(longest) * config.margin_fraction.max(0.0)).round() as u32;
    let crop = BoundingBox {
        min_x: content.min_x.saturating_sub(margin),
        min_y: content.min_y.saturating_sub(margin),
        max_x: content.max_x.saturating_add(margin).min(dims.width),
        max_y: content.max_y.saturating_add(margin).min(dims.height),
    };

    let canvas_size = config.canvas_size.max(1);
    let span = longest.saturating_add(margin.saturating_mul(2));
    let scale = f64::from(canvas_size) / f64::from(span);

    let target_w = ((f64::from(crop.width()) * scale).round() as u32).clamp(1, canvas_size);
    let target_h = ((f64::from(crop.height()) * scale).round() as u32).clamp(1, canvas_size);

    let mut cropped =
        image::imageops::crop_imm(&image, crop.min_x, crop.min_y, crop.width(), crop.height())
            .to_image();
    drop(image);
    // Resample premultiplied so transparent black does not bleed into edges.
    premultiply(&mut cropped);
    let mut resized =
        image::imageops::resize(&cropped, target_w, target_h, config.filter.to_image_filter());
    unpremultiply(&mut resized);

    // Actual per-axis scale after rounding the target size.
    let sx = f64::from(target_w) / f64::from(crop.width());
    let sy = f64::from(target_h) / f64::from(crop.height());
    let (cx, cy) = content.center();
    let half = f64::from(canvas_size) / 2.0;
    let left = (half - (cx - f64::from(crop.min_x)) * sx).round() as i64;
    let top = (half - (cy - f64::from(crop.min_y)) * sy).round() as i64;

    let mut canvas = RgbaImage::new(canvas_size, canvas_size);
    image::imageops::replace(&mut canvas, &resized, left, top);

    let canonical = CanonicalImage::from_canvas(canvas, threshold)?;
    log::debug!(
        "center: content {content:?}, margin {margin}px, crop {crop:?} -> {canvas_size}px canvas, \
         center offset {:?}",
        canonical.center_offset(),
    );

    Ok(Centering {
        canonical,
        geometry: CropGeometry {
            content,
            margin,
            crop,
            scale,
        },
    })
}

fn premultiply(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        let a = u16::from(pixel.0[3]);
        for c in &mut pixel.0[..3] {
            // (c * a + 127) / 255 never exceeds 255.
            *c = u8::try_from((u16::from(*c) * a + 127) / 255).unwrap_or(u8::MAX);
        }
    }
}

fn unpremultiply(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        let a = u16::from(pixel.0[3]);
        if a == 0 {
            pixel.0 = [0, 0, 0, 0];
            continue;
        }
        for c in &mut pixel.0[..3] {
            *c = u8::try_from((u16::from(*c) * 255 + a / 2) / a).unwrap_or(u8::MAX);
        }
    }
}

/// Background pixels become fully transparent; subject alpha is capped
/// by the mask value.
fn apply_mask(image: &mut RgbaImage, mask: &AlphaMask, threshold: u8) {
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let m = mask.value(x, y);
        if m > threshold {
            pixel.0[3] = pixel.0[3].min(m);
        } else {
            pixel.0 = [0, 0, 0, 0];
        }
    }
}
