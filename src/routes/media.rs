/**
 * Media Routes
 * Admin image upload that returns a downscaled data URL
 */
use axum::{
    extract::Multipart,
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::media::{self, resize_to_data_url, ImageError, ResizeOptions, ResizedImage};
use crate::routes::{bad_request, error, require_admin, ApiError, ApiResult};

/// Largest box a caller may ask for.
const MAX_DIMENSION: u32 = 4096;

fn image_error(e: ImageError) -> ApiError {
    tracing::debug!("Rejected upload: {}", e);
    bad_request(e.to_string())
}

fn parse_dimension(name: &str, value: &str) -> Result<u32, ApiError> {
    match value.trim().parse::<u32>() {
        Ok(v) if (1..=MAX_DIMENSION).contains(&v) => Ok(v),
        _ => Err(bad_request(format!(
            "{} must be an integer between 1 and {}",
            name, MAX_DIMENSION
        ))),
    }
}

fn parse_quality(value: &str) -> Result<f32, ApiError> {
    match value.trim().parse::<f32>() {
        Ok(q) if (0.0..=1.0).contains(&q) => Ok(q),
        _ => Err(bad_request("quality must be a number between 0 and 1")),
    }
}

/// POST /api/v1/media/resize/
/// Multipart with a `file` field plus optional `max_width`, `max_height`, `quality`.
pub async fn resize_image(headers: HeaderMap, mut multipart: Multipart) -> ApiResult<ResizedImage> {
    let claims = require_admin(&headers)?;

    let mut options = ResizeOptions::default();
    let mut upload: Option<(Option<String>, Vec<u8>)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Multipart error: {}", e);
                return Err(bad_request("Invalid multipart data"));
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let declared = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| {
                    tracing::warn!("Failed to read upload bytes: {}", e);
                    bad_request("Failed to read file data")
                })?;
                upload = Some((declared, bytes.to_vec()));
            }
            "max_width" | "max_height" | "quality" => {
                let text = field
                    .text()
                    .await
                    .map_err(|_| bad_request(format!("Invalid {} field", name)))?;
                match name.as_str() {
                    "max_width" => options.max_width = parse_dimension("max_width", &text)?,
                    "max_height" => options.max_height = parse_dimension("max_height", &text)?,
                    _ => options.quality = parse_quality(&text)?,
                }
            }
            _ => {}
        }
    }

    let Some((declared, bytes)) = upload else {
        return Err(bad_request("No file provided"));
    };

    // Browsers sometimes send application/octet-stream; trust the bytes then.
    let mime_type = match declared {
        Some(mime) if mime != "application/octet-stream" => mime,
        _ => media::sniff_image_mime(&bytes)
            .unwrap_or("application/octet-stream")
            .to_string(),
    };

    let size = bytes.len();
    let resized = tokio::task::spawn_blocking(move || resize_to_data_url(&bytes, &mime_type, options))
        .await
        .map_err(|e| {
            tracing::error!("spawn_blocking panic during resize: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process image")
        })?
        .map_err(image_error)?;

    tracing::info!(
        bytes = size,
        from = %format!("{}x{}", resized.original_width, resized.original_height),
        to = %format!("{}x{}", resized.width, resized.height),
        user = %claims.username,
        "Image resized"
    );
    Ok((StatusCode::OK, Json(resized)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{admin_token, staff_token};
    use axum::{
        body::Body,
        http::Request,
        routing::post,
        Router,
    };
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use tower::ServiceExt;

    const BOUNDARY: &str = "sevp-test-boundary";

    fn router() -> Router {
        Router::new().route("/api/v1/media/resize/", post(resize_image))
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            if (x / 50 + y / 50) % 2 == 0 {
                Rgb([20, 60, 160])
            } else {
                Rgb([240, 240, 240])
            }
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn multipart_body(file: Option<(&str, &[u8])>, fields: &[(&str, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((mime, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"logo.png\"\r\nContent-Type: {mime}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn post_multipart(token: Option<&str>, body: Vec<u8>) -> (StatusCode, serde_json::Value) {
        let mut req = Request::builder()
            .method("POST")
            .uri("/api/v1/media/resize/")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            );
        if let Some(token) = token {
            req = req.header("authorization", format!("Bearer {}", token));
        }
        let res = router()
            .oneshot(req.body(Body::from(body)).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (
            status,
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null),
        )
    }

    #[test]
    fn test_parse_options() {
        assert_eq!(parse_dimension("max_width", " 640 ").unwrap(), 640);
        assert!(parse_dimension("max_width", "0").is_err());
        assert!(parse_dimension("max_width", "99999").is_err());
        assert_eq!(parse_quality("0.5").unwrap(), 0.5);
        assert!(parse_quality("1.5").is_err());
    }

    #[tokio::test]
    async fn test_resize_upload_to_png_data_url() {
        let token = admin_token();
        let bytes = png(400, 200);
        let body = multipart_body(
            Some(("image/png", &bytes)),
            &[("max_width", "100"), ("max_height", "100")],
        );
        let (status, json) = post_multipart(Some(&token), body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["width"], 100);
        assert_eq!(json["height"], 50);
        assert!(json["data_url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn test_octet_stream_upload_is_sniffed() {
        let token = admin_token();
        let bytes = png(60, 60);
        let body = multipart_body(Some(("application/octet-stream", &bytes)), &[]);
        let (status, json) = post_multipart(Some(&token), body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["width"], 60);
    }

    #[tokio::test]
    async fn test_non_image_is_rejected() {
        let token = admin_token();
        let body = multipart_body(Some(("text/plain", b"hello")), &[]);
        let (status, json) = post_multipart(Some(&token), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("not an image"));
    }

    #[tokio::test]
    async fn test_missing_file_is_rejected() {
        let token = admin_token();
        let body = multipart_body(None, &[("quality", "0.9")]);
        let (status, json) = post_multipart(Some(&token), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "No file provided");
    }

    #[tokio::test]
    async fn test_resize_requires_admin() {
        let body = multipart_body(None, &[]);
        let (status, _) = post_multipart(None, body.clone()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let staff = staff_token();
        let (status, _) = post_multipart(Some(&staff), body).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
