//! Background isolation: separate the subject from its background.
//!
//! The background is assumed to touch at least one image edge. A band of
//! border pixels is sampled to build a [`BackgroundModel`]:
//!
//! - **Transparent**: at least half of the border samples are
//!   transparent, so the upload already carries an alpha channel and
//!   subject membership is alpha keying.
//! - **Color**: the per-channel median of the opaque border samples, plus
//!   a spread (median color distance of the border from that median) so
//!   noisy photographic backgrounds get a proportionally wider tolerance.
//!
//! Every pixel is then classified by distance from the model, the raw
//! mask is cleaned with a morphological closing (fills pinholes) followed
//! by an opening (removes isolated speckle), and connected components
//! much smaller than the largest one are discarded.
//!
//! Everything here is deterministic: identical input yields an identical
//! mask.

use image::{GrayImage, Luma, Rgba};
use imageproc::distance_transform::Norm;
use imageproc::region_labelling::{Connectivity, connected_components};
use serde::{Deserialize, Serialize};

use crate::types::{AlphaMask, IsolationConfig, RgbaImage, SegmentationError};

/// Estimated background, derived from the image border.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BackgroundModel {
    /// The border is mostly transparent; subject = opaque pixels.
    Transparent,
    /// The border is a (possibly noisy) color.
    Color {
        /// Median border color.
        rgb: [u8; 3],
        /// Median RGB distance of border samples from `rgb`.
        spread: f64,
    },
}

/// Output of the isolator.
#[derive(Debug, Clone)]
pub struct Isolation {
    /// Cleaned subject mask.
    pub mask: AlphaMask,
    /// Background model the classification used.
    pub background: BackgroundModel,
    /// Foreground pixels in the cleaned mask.
    pub foreground_pixels: u64,
    /// Connected components kept.
    pub components_kept: usize,
    /// Connected components discarded as noise.
    pub components_dropped: usize,
}

/// Isolate the subject of `image`.
///
/// # Errors
///
/// Returns [`SegmentationError::NoSubjectDetected`] when the cleaned mask
/// covers less than `min_subject_fraction` of the image, or (for a
/// colored background) at least `max_subject_fraction` of it.
pub fn isolate(image: &RgbaImage, config: &IsolationConfig) -> Result<Isolation, SegmentationError> {
    let (w, h) = image.dimensions();
    let band = border_band(w, h, config.border_fraction);
    let samples = border_samples(image, band);
    let background = estimate_background(&samples, config.alpha_threshold);
    log::debug!("isolate: {w}x{h}, border band {band}px, background {background:?}");

    let raw = classify(image, background, config);
    let cleaned = cleanup(&raw, config.cleanup_radius);
    let filtered = filter_components(&cleaned, config.min_component_fraction);

    let total = u64::from(w) * u64::from(h);
    #[allow(clippy::cast_precision_loss)]
    let coverage = filtered.foreground as f64 / total as f64;
    log::debug!(
        "isolate: {} foreground pixels ({:.2}%), kept {} component(s), dropped {}",
        filtered.foreground,
        coverage * 100.0,
        filtered.kept,
        filtered.dropped,
    );

    let too_sparse = filtered.foreground == 0 || coverage < config.min_subject_fraction;
    let indistinct = matches!(background, BackgroundModel::Color { .. })
        && coverage >= config.max_subject_fraction;
    if too_sparse || indistinct {
        return Err(SegmentationError::NoSubjectDetected);
    }

    Ok(Isolation {
        mask: AlphaMask::new(filtered.mask),
        background,
        foreground_pixels: filtered.foreground,
        components_kept: filtered.kept,
        components_dropped: filtered.dropped,
    })
}

/// Border band thickness: `fraction` of the shorter side, at least one
/// pixel and at most half the shorter side.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn border_band(w: u32, h: u32, fraction: f64) -> u32 {
    let shorter = w.min(h);
    let band = (f64::from(shorter) * fraction.max(0.0)).round() as u32;
    band.clamp(1, shorter.div_ceil(2).max(1))
}

fn border_samples(image: &RgbaImage, band: u32) -> Vec<Rgba<u8>> {
    let (w, h) = image.dimensions();
    image
        .enumerate_pixels()
        .filter(|&(x, y, _)| x < band || y < band || x >= w - band || y >= h - band)
        .map(|(_, _, p)| *p)
        .collect()
}

fn estimate_background(samples: &[Rgba<u8>], alpha_threshold: u8) -> BackgroundModel {
    let transparent = samples.iter().filter(|p| p.0[3] < alpha_threshold).count();
    if transparent * 2 >= samples.len() {
        return BackgroundModel::Transparent;
    }

    let opaque: Vec<[u8; 3]> = samples
        .iter()
        .filter(|p| p.0[3] >= alpha_threshold)
        .map(|p| [p.0[0], p.0[1], p.0[2]])
        .collect();

    let rgb: [u8; 3] = std::array::from_fn(|c| {
        let mut channel: Vec<u8> = opaque.iter().map(|p| p[c]).collect();
        channel.sort_unstable();
        channel[channel.len() / 2]
    });

    let mut distances: Vec<f64> = opaque
        .iter()
        .map(|p| color_distance_sq(*p, rgb).sqrt())
        .collect();
    distances.sort_unstable_by(f64::total_cmp);
    let spread = distances[distances.len() / 2];

    BackgroundModel::Color { rgb, spread }
}

fn color_distance_sq(a: [u8; 3], b: [u8; 3]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = f64::from(x) - f64::from(y);
            d * d
        })
        .sum()
}

fn classify(image: &RgbaImage, background: BackgroundModel, config: &IsolationConfig) -> GrayImage {
    let tolerance_sq = match background {
        BackgroundModel::Transparent => 0.0,
        BackgroundModel::Color { spread, .. } => {
            let tolerance = config.color_tolerance.max(spread * config.spread_factor);
            tolerance * tolerance
        }
    };

    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y).0;
        let subject = p[3] >= config.alpha_threshold
            && match background {
                BackgroundModel::Transparent => true,
                BackgroundModel::Color { rgb, .. } => {
                    color_distance_sq([p[0], p[1], p[2]], rgb) > tolerance_sq
                }
            };
        Luma([if subject {
            AlphaMask::SUBJECT
        } else {
            AlphaMask::BACKGROUND
        }])
    })
}

/// Closing then opening with a square (L∞) structuring element.
///
/// The mask is padded with background first: imageproc ignores
/// out-of-image neighbors, so without padding a closing grows a subject
/// near the border out to the border and the erosion never takes it back.
fn cleanup(mask: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return mask.clone();
    }
    let pad = u32::from(radius) * 2;
    let (w, h) = mask.dimensions();
    let mut padded = GrayImage::from_pixel(w + 2 * pad, h + 2 * pad, Luma([AlphaMask::BACKGROUND]));
    image::imageops::replace(&mut padded, mask, i64::from(pad), i64::from(pad));

    let closed = imageproc::morphology::close(&padded, Norm::LInf, radius);
    let opened = imageproc::morphology::open(&closed, Norm::LInf, radius);
    image::imageops::crop_imm(&opened, pad, pad, w, h).to_image()
}

struct Filtered {
    mask: GrayImage,
    foreground: u64,
    kept: usize,
    dropped: usize,
}

/// Keep the largest 8-connected component and every component at least
/// `min_fraction` of its area.
fn filter_components(mask: &GrayImage, min_fraction: f64) -> Filtered {
    let labels = connected_components(mask, Connectivity::Eight, Luma([AlphaMask::BACKGROUND]));

    let label_count = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize;
    let mut areas = vec![0_u64; label_count + 1];
    for p in labels.pixels() {
        areas[p.0[0] as usize] += 1;
    }

    let largest = areas.iter().skip(1).copied().max().unwrap_or(0);
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let min_area = ((largest as f64) * min_fraction.max(0.0)).ceil() as u64;

    let keep: Vec<bool> = areas
        .iter()
        .enumerate()
        .map(|(label, &area)| label != 0 && area > 0 && area >= min_area)
        .collect();
    let kept = keep.iter().filter(|&&k| k).count();
    let dropped = label_count - kept;

    let mut foreground = 0_u64;
    let filtered = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        if keep[labels.get_pixel(x, y).0[0] as usize] {
            foreground += 1;
            Luma([AlphaMask::SUBJECT])
        } else {
            Luma([AlphaMask::BACKGROUND])
        }
    });

    Filtered {
        mask: filtered,
        foreground,
        kept,
        dropped,
    }
}
