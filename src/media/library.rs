//! Media library rules: accepted types, stored names, sizes and public URLs.

use std::io::Cursor;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::sniff_image_mime;

/// Largest file the library stores.
pub const MAX_MEDIA_BYTES: usize = 10 * 1024 * 1024;

pub const IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];
pub const VIDEO_TYPES: &[&str] = &["video/mp4", "video/webm", "video/ogg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Document,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Document => "document",
        }
    }
}

/// Where a library entry's bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Database,
    Url,
}

impl Storage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Storage::Database => "database",
            Storage::Url => "url",
        }
    }
}

/// Kind and MIME type an upload is stored under, or `None` when the type is
/// not accepted. Images are identified by their bytes, videos by the
/// declared type.
pub fn classify_upload(declared: Option<&str>, bytes: &[u8]) -> Option<(MediaKind, &'static str)> {
    if let Some(mime) = sniff_image_mime(bytes) {
        return Some((MediaKind::Image, mime));
    }
    let declared = declared?.trim().to_ascii_lowercase();
    VIDEO_TYPES
        .iter()
        .find(|t| **t == declared)
        .map(|t| (MediaKind::Video, *t))
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/ogg" => "ogv",
        _ => "bin",
    }
}

/// Collision-free name for a stored upload.
pub fn stored_filename(mime: &str) -> String {
    format!("{}.{}", Uuid::new_v4(), extension_for(mime))
}

/// Best guess at the MIME type of externally hosted media.
pub fn mime_from_filename(kind: MediaKind, filename: &str) -> String {
    let ext = file_extension(filename);
    IMAGE_TYPES
        .iter()
        .chain(VIDEO_TYPES)
        .find(|mime| extension_for(mime) == ext || (ext == "jpeg" && **mime == "image/jpeg"))
        .map(|mime| mime.to_string())
        .unwrap_or_else(|| format!("{}/unknown", kind.as_str()))
}

pub fn file_extension(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    }
}

/// Human-readable size: `512 B`, `1.5 KB`, `2.0 MB`.
pub fn format_size(bytes: i64) -> String {
    const KB: f64 = 1024.0;
    let size = bytes as f64;
    if size < KB {
        format!("{} B", bytes)
    } else if size < KB * KB {
        format!("{:.1} KB", size / KB)
    } else {
        format!("{:.1} MB", size / (KB * KB))
    }
}

/// URL the site uses to show a library entry.
pub fn public_url(id: i64, storage_type: &str, file_url: Option<&str>) -> Option<String> {
    match storage_type {
        "url" => file_url.map(str::to_string),
        "database" => Some(format!("/api/v1/media/{}/", id)),
        _ => None,
    }
}

pub fn is_http_url(url: &str) -> bool {
    let url = url.trim();
    (url.starts_with("https://") || url.starts_with("http://"))
        && !url.contains(char::is_whitespace)
        && url.len() <= 500
}

/// Width and height read from the image header, without decoding pixels.
pub fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// ASCII-only filename safe to put in a `Content-Disposition` header.
pub fn disposition_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        RgbImage::from_pixel(width, height, Rgb([10, 20, 30]))
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_images_are_classified_by_content() {
        let bytes = png(3, 2);
        assert_eq!(
            classify_upload(Some("application/octet-stream"), &bytes),
            Some((MediaKind::Image, "image/png"))
        );
        // A mislabelled image is still stored as what it is.
        assert_eq!(
            classify_upload(Some("image/jpeg"), &bytes),
            Some((MediaKind::Image, "image/png"))
        );
    }

    #[test]
    fn test_videos_need_an_accepted_declared_type() {
        let bytes = b"\x00\x00\x00\x18ftypmp42";
        assert_eq!(
            classify_upload(Some("Video/MP4"), bytes),
            Some((MediaKind::Video, "video/mp4"))
        );
        assert_eq!(classify_upload(Some("video/x-msvideo"), bytes), None);
        assert_eq!(classify_upload(Some("application/pdf"), b"%PDF-1.7"), None);
        assert_eq!(classify_upload(None, bytes), None);
    }

    #[test]
    fn test_stored_filename_keeps_type_extension() {
        let a = stored_filename("image/webp");
        let b = stored_filename("image/webp");
        assert!(a.ends_with(".webp"));
        assert_ne!(a, b);
        assert!(stored_filename("video/ogg").ends_with(".ogv"));
    }

    #[test]
    fn test_mime_guess_for_external_media() {
        assert_eq!(mime_from_filename(MediaKind::Image, "logo.PNG"), "image/png");
        assert_eq!(mime_from_filename(MediaKind::Image, "foto.jpeg"), "image/jpeg");
        assert_eq!(mime_from_filename(MediaKind::Video, "intro.webm"), "video/webm");
        assert_eq!(mime_from_filename(MediaKind::Video, "stream"), "video/unknown");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(2 * 1024 * 1024), "2.0 MB");
    }

    #[test]
    fn test_public_url_by_storage() {
        assert_eq!(public_url(7, "database", None).as_deref(), Some("/api/v1/media/7/"));
        assert_eq!(
            public_url(8, "url", Some("https://cdn.sevp.com/a.png")).as_deref(),
            Some("https://cdn.sevp.com/a.png")
        );
        assert_eq!(public_url(9, "local", None), None);
    }

    #[test]
    fn test_http_url_check() {
        assert!(is_http_url("https://youtu.be/abc"));
        assert!(!is_http_url("javascript:alert(1)"));
        assert!(!is_http_url("https://bad host/x"));
    }

    #[test]
    fn test_dimensions_and_disposition() {
        assert_eq!(image_dimensions(&png(40, 25)), Some((40, 25)));
        assert_eq!(image_dimensions(b"not an image"), None);
        assert_eq!(disposition_filename("a\"b;c.png"), "abc.png");
        assert_eq!(disposition_filename("ñ"), "file");
    }
}
