//! Upload validation and image decoding.
//!
//! Raw bytes in, owned RGBA raster out. The format is sniffed from the
//! magic bytes (never from a file name or MIME type supplied by the
//! client) and must be one of PNG, JPEG, BMP, or WebP.
//!
//! Decoding is all-or-nothing: either a complete [`RgbaImage`] is
//! returned or an [`InputError`] explains why the upload was rejected.

use std::io::Cursor;

use image::{ImageError, ImageFormat, ImageReader, Limits};

use crate::types::{InputError, RgbaImage};

/// Formats accepted for upload.
pub const ACCEPTED_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Bmp,
    ImageFormat::WebP,
];

/// Largest accepted width or height, in pixels.
pub const MAX_DIMENSION: u32 = 8192;

/// Largest buffer the decoder may allocate, in bytes.
pub const MAX_DECODE_ALLOC: u64 = 512 * 1024 * 1024;

/// Decode an upload into an RGBA raster.
///
/// # Errors
///
/// Returns [`InputError::Empty`] for zero-length input,
/// [`InputError::TooLarge`] if `bytes` is longer than `max_bytes`,
/// [`InputError::UnsupportedFormat`] if the encoding is not recognized or
/// not accepted, [`InputError::DimensionsTooLarge`] if the declared
/// dimensions exceed [`MAX_DIMENSION`], and [`InputError::CorruptData`] if
/// the data cannot be decoded.
pub fn decode(bytes: &[u8], max_bytes: usize) -> Result<RgbaImage, InputError> {
    decode_with_limits(bytes, max_bytes, MAX_DIMENSION)
}

/// [`decode`] with an explicit per-axis pixel limit.
///
/// # Errors
///
/// See [`decode`].
pub fn decode_with_limits(
    bytes: &[u8],
    max_bytes: usize,
    max_dimension: u32,
) -> Result<RgbaImage, InputError> {
    if bytes.is_empty() {
        return Err(InputError::Empty);
    }
    if bytes.len() > max_bytes {
        return Err(InputError::TooLarge {
            len: bytes.len(),
            limit: max_bytes,
        });
    }

    let format = sniff_format(bytes)?;

    let mut limits = Limits::default();
    limits.max_image_width = Some(max_dimension);
    limits.max_image_height = Some(max_dimension);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);

    let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
    reader.limits(limits);
    let decoded = reader.decode().map_err(classify_decode_error)?;

    log::debug!(
        "decoded {format:?} upload: {} bytes -> {}x{}",
        bytes.len(),
        decoded.width(),
        decoded.height(),
    );
    Ok(decoded.to_rgba8())
}

/// Identify the encoding from magic bytes and check it is accepted.
///
/// # Errors
///
/// Returns [`InputError::UnsupportedFormat`] if the bytes match no known
/// format or a format outside [`ACCEPTED_FORMATS`].
pub fn sniff_format(bytes: &[u8]) -> Result<ImageFormat, InputError> {
    let format = image::guess_format(bytes).map_err(|_| InputError::UnsupportedFormat)?;
    if ACCEPTED_FORMATS.contains(&format) {
        Ok(format)
    } else {
        Err(InputError::UnsupportedFormat)
    }
}

fn classify_decode_error(err: ImageError) -> InputError {
    match err {
        ImageError::Limits(limit) => InputError::DimensionsTooLarge(limit.to_string()),
        ImageError::Unsupported(_) => InputError::UnsupportedFormat,
        other => InputError::CorruptData(other.to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::ImageEncoder;

    use super::*;

    fn encode_png(img: &RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        encoder
            .write_image(
                img.as_raw(),
                img.width(),
                img.height(),
                image::ExtendedColorType::Rgba8,
            )
            .unwrap();
        buf
    }

    fn checker(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgba([255, 255, 255, 255])
            } else {
                image::Rgba([0, 0, 0, 255])
            }
        })
    }

    #[test]
    fn empty_input_returns_error() {
        assert_eq!(decode(&[], 1024), Err(InputError::Empty));
    }

    #[test]
    fn oversized_input_rejected_before_decoding() {
        // Not a valid image at all: the size check must fire first.
        let bytes = vec![0_u8; 2048];
        assert_eq!(
            decode(&bytes, 1024),
            Err(InputError::TooLarge {
                len: 2048,
                limit: 1024
            })
        );
    }

    #[test]
    fn unknown_magic_is_unsupported() {
        assert_eq!(
            decode(&[0x01, 0x02, 0x03, 0x04, 0x05], 1024),
            Err(InputError::UnsupportedFormat)
        );
    }

    #[test]
    fn recognized_but_unaccepted_format_is_unsupported() {
        let gif_header = b"GIF89a\x01\x00\x01\x00\x00\x00\x00";
        assert_eq!(decode(gif_header, 1024), Err(InputError::UnsupportedFormat));
    }

    #[test]
    fn truncated_png_is_corrupt() {
        let mut png = encode_png(&checker(16, 16));
        png.truncate(png.len() / 2);
        assert!(matches!(
            decode(&png, 1024 * 1024),
            Err(InputError::CorruptData(_))
        ));
    }

    #[test]
    fn png_magic_with_garbage_is_corrupt() {
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.extend_from_slice(&[0xAB; 32]);
        assert!(matches!(
            decode(&bytes, 1024),
            Err(InputError::CorruptData(_))
        ));
    }

    #[test]
    fn valid_png_decodes() {
        let img = checker(17, 31);
        let decoded = decode(&encode_png(&img), 1024 * 1024).unwrap();
        assert_eq!(decoded, img);
    }

    #[test]
    fn valid_bmp_decodes() {
        let img = checker(8, 6);
        let mut buf = Vec::new();
        image::codecs::bmp::BmpEncoder::new(&mut buf)
            .write_image(img.as_raw(), 8, 6, image::ExtendedColorType::Rgba8)
            .unwrap();
        let decoded = decode(&buf, 1024 * 1024).unwrap();
        assert_eq!(decoded.dimensions(), (8, 6));
    }

    #[test]
    fn valid_jpeg_decodes_opaque() {
        let rgb = image::RgbImage::from_pixel(12, 9, image::Rgb([200, 40, 40]));
        let mut buf = Vec::new();
        image::codecs::jpeg::JpegEncoder::new(&mut buf)
            .write_image(rgb.as_raw(), 12, 9, image::ExtendedColorType::Rgb8)
            .unwrap();
        let decoded = decode(&buf, 1024 * 1024).unwrap();
        assert_eq!(decoded.dimensions(), (12, 9));
        assert!(decoded.pixels().all(|p| p.0[3] == 255));
    }

    #[test]
    fn dimension_limit_is_enforced() {
        let png = encode_png(&checker(64, 64));
        assert!(matches!(
            decode_with_limits(&png, 1024 * 1024, 32),
            Err(InputError::DimensionsTooLarge(_))
        ));
    }

    #[test]
    fn sniff_accepts_png() {
        let png = encode_png(&checker(2, 2));
        assert_eq!(sniff_format(&png), Ok(ImageFormat::Png));
    }
}
