//! Placement transform and the footprint it projects onto the blank.

use geo::{BoundingRect, Point, Rect, Rotate, coord};
use serde::{Deserialize, Serialize};
use tagsmith_pipeline::{BoundingBox, CanonicalImage};

/// Position, size, and orientation of the canonical image on the blank.
///
/// Offsets are measured from the blank center to the canvas center.
/// `scale` is the printed side length of the canonical canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementTransform {
    /// Horizontal offset in millimetres.
    pub offset_x: f64,
    /// Vertical offset in millimetres.
    pub offset_y: f64,
    /// Printed canvas side length in millimetres.
    pub scale: f64,
    /// Rotation in radians, in `[0, 2π)`.
    pub rotation: f64,
}

impl PlacementTransform {
    /// Centered, unrotated placement at `scale`.
    #[must_use]
    pub const fn centered(scale: f64) -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            scale,
            rotation: 0.0,
        }
    }

    /// Rotation in degrees.
    #[must_use]
    pub fn rotation_degrees(&self) -> f64 {
        self.rotation.to_degrees()
    }
}

/// Axis-aligned extent of the rotated, scaled content, in millimetres
/// relative to the canvas center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    /// Left edge.
    pub min_x: f64,
    /// Top edge.
    pub min_y: f64,
    /// Right edge.
    pub max_x: f64,
    /// Bottom edge.
    pub max_y: f64,
}

impl Footprint {
    /// Footprint of `content` on a `canvas_size` px canvas printed at
    /// `scale_mm` and rotated by `rotation` radians about the canvas
    /// center.
    #[must_use]
    pub fn of(content: BoundingBox, canvas_size: u32, scale_mm: f64, rotation: f64) -> Self {
        let mm_per_px = scale_mm / f64::from(canvas_size.max(1));
        let half = f64::from(canvas_size) / 2.0;
        let to_mm = |px: u32| (f64::from(px) - half) * mm_per_px;

        let rect = Rect::new(
            coord! { x: to_mm(content.min_x), y: to_mm(content.min_y) },
            coord! { x: to_mm(content.max_x), y: to_mm(content.max_y) },
        );
        let rotated = rect
            .to_polygon()
            .rotate_around_point(rotation.to_degrees(), Point::new(0.0, 0.0))
            .bounding_rect()
            .unwrap_or(rect);

        Self {
            min_x: rotated.min().x,
            min_y: rotated.min().y,
            max_x: rotated.max().x,
            max_y: rotated.max().y,
        }
    }

    /// Footprint of a canonical image under `transform`, before offsets.
    #[must_use]
    pub fn for_canonical(canonical: &CanonicalImage, transform: &PlacementTransform) -> Self {
        Self::of(
            canonical.content(),
            canonical.size(),
            transform.scale,
            transform.rotation,
        )
    }

    /// Width in millimetres.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height in millimetres.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// The footprint moved by an offset.
    #[must_use]
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self {
            min_x: self.min_x + dx,
            min_y: self.min_y + dy,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
        }
    }

    /// Whether the footprint lies inside a square of half side
    /// `half_extent` centered on the origin, within `tolerance`.
    #[must_use]
    pub fn fits_within(&self, half_extent: f64, tolerance: f64) -> bool {
        let limit = half_extent + tolerance;
        self.min_x >= -limit && self.min_y >= -limit && self.max_x <= limit && self.max_y <= limit
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_4;

    use super::*;

    const fn bx(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> BoundingBox {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    #[test]
    fn full_canvas_maps_to_scale() {
        let fp = Footprint::of(bx(0, 0, 512, 512), 512, 36.0, 0.0);
        assert!((fp.width() - 36.0).abs() < 1e-9);
        assert!((fp.height() - 36.0).abs() < 1e-9);
        assert!((fp.min_x - -18.0).abs() < 1e-9);
    }

    #[test]
    fn partial_content_scales_proportionally() {
        let fp = Footprint::of(bx(128, 192, 384, 320), 512, 20.0, 0.0);
        assert!((fp.width() - 10.0).abs() < 1e-9);
        assert!((fp.height() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn rotation_grows_square_footprint() {
        let fp = Footprint::of(bx(0, 0, 512, 512), 512, 20.0, FRAC_PI_4);
        let diagonal = 20.0 * std::f64::consts::SQRT_2;
        assert!((fp.width() - diagonal).abs() < 1e-6);
        assert!((fp.height() - diagonal).abs() < 1e-6);
    }

    #[test]
    fn quarter_turn_swaps_axes() {
        let fp = Footprint::of(bx(128, 192, 384, 320), 512, 20.0, std::f64::consts::FRAC_PI_2);
        assert!((fp.width() - 5.0).abs() < 1e-6);
        assert!((fp.height() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn translated_and_fits() {
        let fp = Footprint::of(bx(0, 0, 512, 512), 512, 20.0, 0.0);
        assert!(fp.fits_within(35.0, 0.0));
        assert!(fp.translated(25.0, 0.0).fits_within(35.0, 0.0));
        assert!(!fp.translated(26.0, 0.0).fits_within(35.0, 0.0));
    }

    #[test]
    fn centered_transform_defaults() {
        let t = PlacementTransform::centered(28.0);
        assert!(t.offset_x.abs() < f64::EPSILON);
        assert!(t.offset_y.abs() < f64::EPSILON);
        assert!(t.rotation.abs() < f64::EPSILON);
        assert!((t.scale - 28.0).abs() < f64::EPSILON);
    }
}
