use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ImageReader;

/// Longest edge after normalization. Images already smaller are left
/// at their original dimensions.
const MAX_DIMENSION: u32 = 1920;

/// JPEG quality for the re-encoded upload.
const JPEG_QUALITY: u8 = 85;

/// Normalize an uploaded image: bounded resize and JPEG re-encode.
///
/// Normalization failure must not abort the upload, so any decode or
/// encode error falls back to the original bytes.
pub fn normalize(original: &[u8]) -> Vec<u8> {
    match try_normalize(original) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "image normalization failed, keeping original bytes");
            original.to_vec()
        }
    }
}

fn try_normalize(original: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let decoded = ImageReader::new(Cursor::new(original)).with_guessed_format()?.decode()?;

    let resized = if decoded.width() > MAX_DIMENSION || decoded.height() > MAX_DIMENSION {
        decoded.resize(MAX_DIMENSION, MAX_DIMENSION, FilterType::Lanczos3)
    } else {
        decoded
    };

    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    resized.to_rgb8().write_with_encoder(encoder)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, RgbImage};

    fn sample_png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            image::Rgb([200, 180, 160]),
        ));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    #[test]
    fn reencodes_small_image_as_jpeg() {
        let png = sample_png(100, 60);
        let normalized = normalize(&png);
        let format = image::guess_format(&normalized).unwrap();
        assert_eq!(format, ImageFormat::Jpeg);

        let decoded = image::load_from_memory(&normalized).unwrap();
        // No enlargement.
        assert_eq!(decoded.width(), 100);
        assert_eq!(decoded.height(), 60);
    }

    #[test]
    fn bounds_oversized_image() {
        let png = sample_png(4000, 2000);
        let normalized = normalize(&png);
        let decoded = image::load_from_memory(&normalized).unwrap();
        assert!(decoded.width() <= MAX_DIMENSION);
        assert!(decoded.height() <= MAX_DIMENSION);
    }

    #[test]
    fn garbage_falls_back_to_original() {
        let garbage = b"definitely not an image".to_vec();
        let normalized = normalize(&garbage);
        assert_eq!(normalized, garbage);
    }
}
