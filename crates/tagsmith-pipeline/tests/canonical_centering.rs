//! Integration test: uploads run end to end through the preparation
//! pipeline and come out as centered canonical images.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use image::{ImageEncoder, Rgba, RgbaImage};
use tagsmith_pipeline::{
    BoundingBox, CanonicalImage, InputError, PipelineConfig, PipelineError, SegmentationError,
    center, isolate,
};

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

fn assert_centered(canonical: &CanonicalImage) {
    let (dx, dy) = canonical.center_offset();
    assert!(
        dx.abs() <= 1.0 && dy.abs() <= 1.0,
        "content center off by ({dx}, {dy}), content {:?}",
        canonical.content(),
    );
}

#[test]
fn uniform_gray_upload_has_no_subject() {
    let png = encode_png(&RgbaImage::from_pixel(100, 100, Rgba([128, 128, 128, 255])));
    let result = tagsmith_pipeline::prepare(png, &PipelineConfig::default());
    assert_eq!(
        result,
        Err(PipelineError::Segmentation(
            SegmentationError::NoSubjectDetected
        ))
    );
}

#[test]
fn centered_square_on_transparent_canvas() {
    let source = RgbaImage::from_fn(100, 100, |x, y| {
        if (30..70).contains(&x) && (30..70).contains(&y) {
            Rgba([220, 40, 40, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    });

    let isolated = tagsmith_pipeline::Pipeline::new(encode_png(&source), PipelineConfig::default())
        .decode()
        .unwrap()
        .downsample()
        .isolate()
        .unwrap();
    let centered = isolated.center().unwrap();
    assert_eq!(
        centered.geometry().content,
        BoundingBox {
            min_x: 30,
            min_y: 30,
            max_x: 70,
            max_y: 70,
        }
    );
    assert_eq!(centered.geometry().margin, 3);

    let canonical = centered.into_canonical();
    assert_eq!(canonical.image().dimensions(), (512, 512));
    assert_centered(&canonical);
    // Margin ring stays transparent on every side.
    let content = canonical.content();
    assert!(content.min_x >= 30 && content.min_y >= 30);
    assert!(content.max_x <= 482 && content.max_y <= 482);
}

const INK: Rgba<u8> = Rgba([20, 20, 160, 255]);
const PAPER: Rgba<u8> = Rgba([245, 245, 240, 255]);
const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

fn in_rect(x: u32, y: u32, b: (u32, u32, u32, u32)) -> bool {
    (b.0..b.2).contains(&x) && (b.1..b.3).contains(&y)
}

fn assert_no_visible_background(canonical: &CanonicalImage) {
    let leaked = canonical
        .image()
        .pixels()
        .filter(|p| p.0[3] > 0 && p.0[0] > 200 && p.0[1] > 200)
        .count();
    assert_eq!(leaked, 0, "background-colored pixels leaked onto the canvas");
}

fn assert_recenters(source: &RgbaImage, config: &PipelineConfig) {
    let first = tagsmith_pipeline::prepare(encode_png(source), config).unwrap();
    assert_centered(&first);
    assert_no_visible_background(&first);

    let again = isolate::isolate(first.image(), &config.isolation).unwrap();
    let second = center::center(first.image().clone(), &again.mask, &config.centering)
        .unwrap()
        .canonical;
    assert_centered(&second);
}

#[test]
fn recentering_canonical_output_is_stable() {
    let config = PipelineConfig::default();

    let two_part = RgbaImage::from_fn(160, 120, |x, y| {
        if in_rect(x, y, (10, 80, 70, 100)) || in_rect(x, y, (100, 15, 130, 45)) {
            INK
        } else {
            PAPER
        }
    });
    assert_recenters(&two_part, &config);

    // One pixel of background between the subject and the right edge.
    let near_edge_clear = RgbaImage::from_fn(26, 39, |x, y| {
        if in_rect(x, y, (15, 10, 25, 29)) { INK } else { CLEAR }
    });
    assert_recenters(&near_edge_clear, &config);

    let near_edge_paper = RgbaImage::from_fn(80, 60, |x, y| {
        if in_rect(x, y, (40, 15, 79, 45)) { INK } else { PAPER }
    });
    assert_recenters(&near_edge_paper, &config);
}

#[test]
fn edge_adjacent_subjects_stay_centered() {
    let config = PipelineConfig {
        centering: tagsmith_pipeline::CenteringConfig {
            canvas_size: 256,
            ..tagsmith_pipeline::CenteringConfig::default()
        },
        ..PipelineConfig::default()
    };
    let (w, h) = (64, 48);
    for background in [CLEAR, PAPER] {
        for gap in 0..=3 {
            let rects = [
                (gap, 12, gap + 24, 36),
                (w - gap - 24, 12, w - gap, 36),
                (20, gap, 44, gap + 20),
                (20, h - gap - 20, 44, h - gap),
            ];
            for rect in rects {
                let source = RgbaImage::from_fn(w, h, |x, y| {
                    if in_rect(x, y, rect) { INK } else { background }
                });
                let canonical = tagsmith_pipeline::prepare(encode_png(&source), &config).unwrap();
                assert_centered(&canonical);
                assert_no_visible_background(&canonical);
            }
        }
    }
}

#[test]
fn preparation_is_deterministic() {
    let source = RgbaImage::from_fn(90, 70, |x, y| {
        if (x + y) % 23 < 9 && (15..60).contains(&x) && (10..55).contains(&y) {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    });
    let png = encode_png(&source);
    let config = PipelineConfig::default();
    let a = tagsmith_pipeline::prepare(png.clone(), &config).unwrap();
    let b = tagsmith_pipeline::prepare(png, &config).unwrap();
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(a, b);
}

#[test]
fn garbage_bytes_are_rejected_before_decoding() {
    let result = tagsmith_pipeline::prepare(b"not an image".to_vec(), &PipelineConfig::default());
    assert_eq!(
        result,
        Err(PipelineError::Input(InputError::UnsupportedFormat))
    );
}

#[test]
fn truncated_png_is_corrupt() {
    let png = encode_png(&RgbaImage::from_pixel(64, 64, Rgba([1, 2, 3, 255])));
    let truncated = png[..png.len() / 2].to_vec();
    let result = tagsmith_pipeline::prepare(truncated, &PipelineConfig::default());
    assert!(matches!(
        result,
        Err(PipelineError::Input(InputError::CorruptData(_)))
    ));
}
