//! Downscale an uploaded image and encode it as a data URL.

use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, ImageFormat};
use serde::Serialize;
use thiserror::Error;

/// Largest accepted upload (5 MiB).
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Both target sides at or below this are encoded as PNG.
const PNG_MAX_SIDE: u32 = 200;

/// JPEG quality floor, on the 0.0..=1.0 scale.
const MIN_JPEG_QUALITY: f32 = 0.92;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("'{0}' is not an image type")]
    NotAnImage(String),
    #[error("file is {0} bytes, the limit is 5MB")]
    TooLarge(usize),
    #[error("file is empty")]
    Empty,
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("failed to encode image: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeOptions {
    pub max_width: u32,
    pub max_height: u32,
    /// Requested JPEG quality, 0.0..=1.0. Values below 0.92 are raised.
    pub quality: f32,
}

impl Default for ResizeOptions {
    fn default() -> Self {
        Self {
            max_width: 300,
            max_height: 300,
            quality: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResizedImage {
    pub data_url: String,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub original_width: u32,
    pub original_height: u32,
}

/// Reject uploads that are not images or exceed the size limit.
pub fn validate_upload(mime_type: &str, len: usize) -> Result<(), ImageError> {
    if !mime_type.starts_with("image/") {
        return Err(ImageError::NotAnImage(mime_type.to_string()));
    }
    if len == 0 {
        return Err(ImageError::Empty);
    }
    if len > MAX_UPLOAD_BYTES {
        return Err(ImageError::TooLarge(len));
    }
    Ok(())
}

/// Fit `width`×`height` inside the bounding box, keeping the aspect ratio.
///
/// Images already inside the box keep their size. Neither side drops below 1.
pub fn target_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 || (width <= max_width && height <= max_height) {
        return (width, height);
    }

    let max_w = max_width.max(1) as f64;
    let max_h = max_height.max(1) as f64;
    let aspect = width as f64 / height as f64;

    let (mut w, mut h);
    if width > height {
        w = max_w;
        h = w / aspect;
        if h > max_h {
            h = max_h;
            w = h * aspect;
        }
    } else {
        h = max_h;
        w = h * aspect;
        if w > max_w {
            w = max_w;
            h = w / aspect;
        }
    }

    ((w.round() as u32).max(1), (h.round() as u32).max(1))
}

/// Resize `bytes` to fit `options` and return it as a data URL.
///
/// Reductions below half size go through an intermediate 50% pass first.
pub fn resize_to_data_url(
    bytes: &[u8],
    mime_type: &str,
    options: ResizeOptions,
) -> Result<ResizedImage, ImageError> {
    validate_upload(mime_type, bytes.len())?;

    let img = image::load_from_memory(bytes).map_err(|e| ImageError::Decode(e.to_string()))?;
    let (original_width, original_height) = (img.width(), img.height());
    let (width, height) = target_dimensions(
        original_width,
        original_height,
        options.max_width,
        options.max_height,
    );

    let resized = downscale(&img, width, height);

    let (mime_type, encoded) = if width <= PNG_MAX_SIDE && height <= PNG_MAX_SIDE {
        ("image/png", encode_png(&resized)?)
    } else {
        ("image/jpeg", encode_jpeg(&resized, options.quality)?)
    };

    let data_url = format!(
        "data:{};base64,{}",
        mime_type,
        general_purpose::STANDARD.encode(&encoded)
    );

    Ok(ResizedImage {
        data_url,
        mime_type,
        width,
        height,
        original_width,
        original_height,
    })
}

fn downscale(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    if (width, height) == (img.width(), img.height()) {
        return img.clone();
    }

    let ratio = (width as f64 / img.width() as f64).min(height as f64 / img.height() as f64);
    if ratio < 0.5 {
        let half_w = (img.width() / 2).max(1);
        let half_h = (img.height() / 2).max(1);
        img.resize_exact(half_w, half_h, FilterType::Triangle)
            .resize_exact(width, height, FilterType::Lanczos3)
    } else {
        img.resize_exact(width, height, FilterType::Lanczos3)
    }
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ImageError> {
    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| ImageError::Encode(e.to_string()))?;
    Ok(buffer)
}

fn encode_jpeg(img: &DynamicImage, quality: f32) -> Result<Vec<u8>, ImageError> {
    let quality = (quality.max(MIN_JPEG_QUALITY).min(1.0) * 100.0).round() as u8;
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());

    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| ImageError::Encode(e.to_string()))?;
    Ok(buffer)
}

/// Decode the payload of a `data:<mime>;base64,<payload>` URL.
pub fn decode_data_url(data_url: &str) -> Option<(String, Vec<u8>)> {
    let rest = data_url.strip_prefix("data:")?;
    let (mime, payload) = rest.split_once(";base64,")?;
    let bytes = general_purpose::STANDARD.decode(payload).ok()?;
    Some((mime.to_string(), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([((x / 500) * 30) as u8, ((y / 500) * 30) as u8, 128])
        });
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_target_dimensions_landscape() {
        assert_eq!(target_dimensions(4000, 3000, 300, 300), (300, 225));
    }

    #[test]
    fn test_target_dimensions_portrait_and_wide_box() {
        assert_eq!(target_dimensions(1000, 2000, 300, 300), (150, 300));
        assert_eq!(target_dimensions(1000, 500, 800, 100), (200, 100));
    }

    #[test]
    fn test_target_dimensions_never_upscales() {
        assert_eq!(target_dimensions(120, 80, 300, 300), (120, 80));
    }

    #[test]
    fn test_validate_upload_rules() {
        assert!(matches!(
            validate_upload("application/pdf", 10),
            Err(ImageError::NotAnImage(_))
        ));
        assert!(matches!(validate_upload("image/png", 0), Err(ImageError::Empty)));
        assert!(matches!(
            validate_upload("image/png", MAX_UPLOAD_BYTES + 1),
            Err(ImageError::TooLarge(_))
        ));
        assert!(validate_upload("image/png", MAX_UPLOAD_BYTES).is_ok());
    }

    #[test]
    fn test_large_image_is_downscaled_to_jpeg_preserving_aspect() {
        let bytes = png_bytes(4000, 3000);
        let resized = resize_to_data_url(&bytes, "image/png", ResizeOptions::default()).unwrap();

        assert_eq!(resized.mime_type, "image/jpeg");
        assert!(resized.data_url.starts_with("data:image/jpeg;base64,"));

        let (mime, decoded) = decode_data_url(&resized.data_url).unwrap();
        assert_eq!(mime, "image/jpeg");
        let out = image::load_from_memory(&decoded).unwrap();
        assert!(out.width() <= 300 && out.height() <= 300);
        assert_eq!((out.width(), out.height()), (300, 225));
        let ratio = out.width() as f64 / out.height() as f64;
        assert!((ratio - 4.0 / 3.0).abs() < 0.01);
    }

    #[test]
    fn test_small_target_uses_png() {
        let bytes = png_bytes(400, 400);
        let options = ResizeOptions {
            max_width: 150,
            max_height: 150,
            quality: 0.5,
        };
        let resized = resize_to_data_url(&bytes, "image/png", options).unwrap();
        assert_eq!(resized.mime_type, "image/png");
        assert_eq!((resized.width, resized.height), (150, 150));
        assert_eq!((resized.original_width, resized.original_height), (400, 400));
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let result = resize_to_data_url(b"definitely not an image", "image/png", ResizeOptions::default());
        assert!(matches!(result, Err(ImageError::Decode(_))));
    }

    #[test]
    fn test_decode_data_url_rejects_plain_urls() {
        assert!(decode_data_url("https://example.com/a.png").is_none());
    }
}
