/**
 * Media Library Routes
 * Stored uploads, external media entries and their categories
 */
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::models::{MediaCategory, MediaFile, MediaFileResponse, MEDIA_FILE_COLUMNS};
use crate::media::library::{self, MediaKind, Storage, MAX_MEDIA_BYTES};
use crate::routes::{
    bad_request, db_error, error, not_found, page_window, pool, require_admin, require_auth,
    required, search_pattern, ApiError, ApiResult, MessageResponse,
};

const MAX_PER_PAGE: i64 = 100;
const MAX_FILENAME_LEN: usize = 255;
const MAX_CATEGORY_NAME_LEN: usize = 100;

fn too_large() -> ApiError {
    error(
        StatusCode::PAYLOAD_TOO_LARGE,
        format!("File too large. Maximum size is {} MB", MAX_MEDIA_BYTES / (1024 * 1024)),
    )
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return too_large();
    }
    tracing::warn!("Multipart error: {}", e);
    bad_request("Invalid multipart data")
}

fn validate_filename(value: &str) -> Result<String, ApiError> {
    let filename = required("filename", value)?;
    if filename.chars().count() > MAX_FILENAME_LEN {
        return Err(bad_request(format!(
            "filename must be at most {} characters",
            MAX_FILENAME_LEN
        )));
    }
    Ok(filename)
}

/// `#RRGGBB`
fn is_hex_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

#[derive(Debug, Deserialize)]
pub struct MediaListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
    pub file_type: Option<MediaKind>,
    pub category_id: Option<i64>,
    pub search: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    20
}

#[derive(Debug, Serialize)]
pub struct MediaPage {
    pub files: Vec<MediaFileResponse>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

#[derive(Debug, Deserialize)]
pub struct UrlMediaRequest {
    pub url: String,
    pub filename: String,
    pub file_type: MediaKind,
    #[serde(default)]
    pub alt_text: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateMediaRequest {
    pub filename: Option<String>,
    pub alt_text: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
    pub is_active: Option<bool>,
    /// Replaces the file's categories when present.
    pub category_ids: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_icon() -> String {
    "Folder".to_string()
}

fn default_color() -> String {
    "#3B82F6".to_string()
}

/// Validated upload waiting to be stored.
#[derive(Debug)]
struct Upload {
    original_filename: String,
    kind: MediaKind,
    mime_type: &'static str,
    bytes: Vec<u8>,
    dimensions: Option<(u32, u32)>,
    alt_text: String,
    description: String,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut file: Option<(Option<String>, Option<String>, Vec<u8>)> = None;
    let mut alt_text = String::new();
    let mut description = String::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let declared = field.content_type().map(str::to_string);
                let original = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some((declared, original, bytes.to_vec()));
            }
            "alt_text" => alt_text = field.text().await.map_err(multipart_error)?,
            "description" => description = field.text().await.map_err(multipart_error)?,
            _ => {}
        }
    }

    let Some((declared, original, bytes)) = file else {
        return Err(bad_request("No file provided"));
    };
    if bytes.len() > MAX_MEDIA_BYTES {
        return Err(too_large());
    }
    let (kind, mime_type) = library::classify_upload(declared.as_deref(), &bytes).ok_or_else(|| {
        bad_request(format!(
            "Unsupported file type. Allowed: {}, {}",
            library::IMAGE_TYPES.join(", "),
            library::VIDEO_TYPES.join(", ")
        ))
    })?;
    let dimensions = match kind {
        MediaKind::Image => library::image_dimensions(&bytes),
        _ => None,
    };

    Ok(Upload {
        original_filename: original
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "upload".to_string()),
        kind,
        mime_type,
        bytes,
        dimensions,
        alt_text: alt_text.trim().to_string(),
        description: description.trim().to_string(),
    })
}

/// POST /api/v1/media/upload/
/// Multipart with a `file` field plus optional `alt_text` and `description`.
pub async fn upload_media(
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult<MediaFileResponse> {
    let claims = require_auth(&headers)?;
    let upload = read_upload(multipart).await?;
    let pool = pool()?;

    let filename = library::stored_filename(upload.mime_type);
    let (width, height) = match upload.dimensions {
        Some((w, h)) => (i32::try_from(w).ok(), i32::try_from(h).ok()),
        None => (None, None),
    };
    let sql = format!(
        r#"
        INSERT INTO media_files
            (filename, original_filename, file_type, mime_type, file_size, storage_type,
             file_data, alt_text, description, width, height, uploaded_by_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING {}
        "#,
        MEDIA_FILE_COLUMNS
    );
    let file = sqlx::query_as::<_, MediaFile>(&sql)
        .bind(&filename)
        .bind(&upload.original_filename)
        .bind(upload.kind.as_str())
        .bind(upload.mime_type)
        .bind(upload.bytes.len() as i64)
        .bind(Storage::Database.as_str())
        .bind(&upload.bytes)
        .bind(&upload.alt_text)
        .bind(&upload.description)
        .bind(width)
        .bind(height)
        .bind(claims.user_id())
        .fetch_one(pool.as_ref())
        .await
        .map_err(db_error)?;

    tracing::info!(
        id = file.id,
        bytes = file.file_size,
        mime = %file.mime_type,
        user = %claims.username,
        "Media uploaded"
    );
    Ok((StatusCode::CREATED, Json(file.into())))
}

/// POST /api/v1/media/url/
pub async fn create_url_media(
    headers: HeaderMap,
    Json(payload): Json<UrlMediaRequest>,
) -> ApiResult<MediaFileResponse> {
    let claims = require_auth(&headers)?;
    let url = payload.url.trim();
    if !library::is_http_url(url) {
        return Err(bad_request("url must be an http(s) URL"));
    }
    if payload.file_type == MediaKind::Document {
        return Err(bad_request("file_type must be image or video"));
    }
    let filename = validate_filename(&payload.filename)?;
    let mime_type = library::mime_from_filename(payload.file_type, &filename);

    let pool = pool()?;
    let sql = format!(
        r#"
        INSERT INTO media_files
            (filename, original_filename, file_type, mime_type, file_size, storage_type,
             file_url, alt_text, description, uploaded_by_id)
        VALUES ($1, $1, $2, $3, 0, $4, $5, $6, $7, $8)
        RETURNING {}
        "#,
        MEDIA_FILE_COLUMNS
    );
    let file = sqlx::query_as::<_, MediaFile>(&sql)
        .bind(&filename)
        .bind(payload.file_type.as_str())
        .bind(&mime_type)
        .bind(Storage::Url.as_str())
        .bind(url)
        .bind(payload.alt_text.trim())
        .bind(payload.description.trim())
        .bind(claims.user_id())
        .fetch_one(pool.as_ref())
        .await
        .map_err(db_error)?;

    tracing::info!(id = file.id, user = %claims.username, "External media added");
    Ok((StatusCode::CREATED, Json(file.into())))
}

/// GET /api/v1/media/?page=&per_page=&file_type=&category_id=&search=
pub async fn list_media(
    headers: HeaderMap,
    Query(query): Query<MediaListQuery>,
) -> ApiResult<MediaPage> {
    require_auth(&headers)?;
    let pool = pool()?;
    let (limit, offset) = page_window(query.page, query.per_page, MAX_PER_PAGE);
    let pattern = search_pattern(query.search.as_deref());
    let file_type = query.file_type.map(|k| k.as_str());

    let filter = r#"
        WHERE is_active
          AND ($1::text IS NULL OR file_type = $1)
          AND ($2::bigint IS NULL OR EXISTS (
                SELECT 1 FROM media_file_categories fc
                WHERE fc.media_file_id = media_files.id AND fc.category_id = $2))
          AND ($3::text IS NULL OR original_filename ILIKE $3 OR filename ILIKE $3
               OR alt_text ILIKE $3 OR description ILIKE $3)
    "#;

    let count_sql = format!("SELECT COUNT(*) FROM media_files {}", filter);
    let (total,): (i64,) = sqlx::query_as(&count_sql)
        .bind(file_type)
        .bind(query.category_id)
        .bind(&pattern)
        .fetch_one(pool.as_ref())
        .await
        .map_err(db_error)?;

    let list_sql = format!(
        "SELECT {} FROM media_files {} ORDER BY created_at DESC, id DESC LIMIT $4 OFFSET $5",
        MEDIA_FILE_COLUMNS, filter
    );
    let files = sqlx::query_as::<_, MediaFile>(&list_sql)
        .bind(file_type)
        .bind(query.category_id)
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool.as_ref())
        .await
        .map_err(db_error)?;

    Ok((
        StatusCode::OK,
        Json(MediaPage {
            files: files.into_iter().map(MediaFileResponse::from).collect(),
            total,
            page: offset / limit + 1,
            per_page: limit,
            total_pages: (total + limit - 1) / limit,
        }),
    ))
}

/// GET /api/v1/media/{id}/
/// Public. Stored bytes are served inline; external entries redirect.
pub async fn serve_media(Path(id): Path<i64>) -> Result<Response, ApiError> {
    let pool = pool()?;
    let row: Option<(String, String, String, Option<String>, Option<Vec<u8>>)> = sqlx::query_as(
        r#"
        SELECT storage_type, mime_type, filename, file_url, file_data
        FROM media_files
        WHERE id = $1 AND is_active AND is_public
        "#,
    )
    .bind(id)
    .fetch_optional(pool.as_ref())
    .await
    .map_err(db_error)?;

    match row {
        Some((storage, mime_type, filename, _, Some(bytes)))
            if storage == Storage::Database.as_str() =>
        {
            let disposition = format!(
                "inline; filename=\"{}\"",
                library::disposition_filename(&filename)
            );
            Ok((
                [
                    (header::CONTENT_TYPE, mime_type),
                    (header::CONTENT_DISPOSITION, disposition),
                    (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
                ],
                bytes,
            )
                .into_response())
        }
        Some((storage, _, _, Some(url), _)) if storage == Storage::Url.as_str() => {
            Ok(Redirect::temporary(&url).into_response())
        }
        _ => Err(not_found("Media file")),
    }
}

/// PUT /api/v1/media/{id}/
pub async fn update_media(
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateMediaRequest>,
) -> ApiResult<MediaFileResponse> {
    let claims = require_auth(&headers)?;
    let filename = payload
        .filename
        .as_deref()
        .map(validate_filename)
        .transpose()?;

    let pool = pool()?;
    let mut tx = pool.begin().await.map_err(db_error)?;

    let sql = format!(
        r#"
        UPDATE media_files SET
            filename = COALESCE($2, filename),
            alt_text = COALESCE($3, alt_text),
            description = COALESCE($4, description),
            is_public = COALESCE($5, is_public),
            is_active = COALESCE($6, is_active),
            updated_at = now()
        WHERE id = $1
        RETURNING {}
        "#,
        MEDIA_FILE_COLUMNS
    );
    let file = sqlx::query_as::<_, MediaFile>(&sql)
        .bind(id)
        .bind(filename)
        .bind(payload.alt_text.as_deref().map(str::trim))
        .bind(payload.description.as_deref().map(str::trim))
        .bind(payload.is_public)
        .bind(payload.is_active)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found("Media file"))?;

    if let Some(category_ids) = &payload.category_ids {
        sqlx::query("DELETE FROM media_file_categories WHERE media_file_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        // Unknown category ids are ignored.
        sqlx::query(
            r#"
            INSERT INTO media_file_categories (media_file_id, category_id)
            SELECT $1, id FROM media_categories WHERE id = ANY($2)
            "#,
        )
        .bind(id)
        .bind(category_ids)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
    }

    tx.commit().await.map_err(db_error)?;

    tracing::info!(id, user = %claims.username, "Media updated");
    Ok((StatusCode::OK, Json(file.into())))
}

/// DELETE /api/v1/media/{id}/
/// Soft delete: the entry stops being listed and served.
pub async fn delete_media(
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<MessageResponse> {
    let claims = require_admin(&headers)?;
    let pool = pool()?;

    let result = sqlx::query(
        "UPDATE media_files SET is_active = false, updated_at = now() WHERE id = $1 AND is_active",
    )
    .bind(id)
    .execute(pool.as_ref())
    .await
    .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(not_found("Media file"));
    }

    tracing::info!(id, user = %claims.username, "Media deleted");
    Ok((StatusCode::OK, Json(MessageResponse::new("Media file deleted"))))
}

/// GET /api/v1/media/categories/
pub async fn list_categories(headers: HeaderMap) -> ApiResult<Vec<MediaCategory>> {
    require_auth(&headers)?;
    let pool = pool()?;

    let categories = sqlx::query_as::<_, MediaCategory>(
        r#"
        SELECT c.*, COUNT(f.id) AS file_count
        FROM media_categories c
        LEFT JOIN media_file_categories fc ON fc.category_id = c.id
        LEFT JOIN media_files f ON f.id = fc.media_file_id AND f.is_active
        WHERE c.is_active
        GROUP BY c.id
        ORDER BY c.name
        "#,
    )
    .fetch_all(pool.as_ref())
    .await
    .map_err(db_error)?;

    Ok((StatusCode::OK, Json(categories)))
}

/// POST /api/v1/media/categories/
pub async fn create_category(
    headers: HeaderMap,
    Json(payload): Json<CreateCategoryRequest>,
) -> ApiResult<MediaCategory> {
    let claims = require_admin(&headers)?;
    let name = required("name", &payload.name)?;
    if name.chars().count() > MAX_CATEGORY_NAME_LEN {
        return Err(bad_request(format!(
            "name must be at most {} characters",
            MAX_CATEGORY_NAME_LEN
        )));
    }
    let color = payload.color.trim();
    if !is_hex_color(color) {
        return Err(bad_request("color must be a hex value like #3B82F6"));
    }
    let icon = required("icon", &payload.icon)?;

    let pool = pool()?;
    let category = sqlx::query_as::<_, MediaCategory>(
        r#"
        INSERT INTO media_categories (name, description, icon, color)
        VALUES ($1, $2, $3, $4)
        RETURNING *, 0::bigint AS file_count
        "#,
    )
    .bind(&name)
    .bind(payload.description.trim())
    .bind(&icon)
    .bind(color)
    .fetch_one(pool.as_ref())
    .await
    .map_err(|e| {
        if crate::db::is_unique_violation(&e) {
            error(StatusCode::CONFLICT, "A category with this name already exists")
        } else {
            db_error(e)
        }
    })?;

    tracing::info!(id = category.id, name = %category.name, user = %claims.username, "Media category created");
    Ok((StatusCode::CREATED, Json(category)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{admin_token, send, staff_token};
    use axum::{
        body::Body,
        extract::DefaultBodyLimit,
        http::Request,
        routing::{get, post},
        Router,
    };
    use image::{ImageFormat, Rgb, RgbImage};
    use serde_json::json;
    use std::io::Cursor;
    use tower::ServiceExt;

    const BOUNDARY: &str = "sevp-media-boundary";

    fn router() -> Router {
        Router::new()
            .route("/api/v1/media/", get(list_media))
            .route("/api/v1/media/upload/", post(upload_media))
            .route("/api/v1/media/url/", post(create_url_media))
            .route(
                "/api/v1/media/categories/",
                get(list_categories).post(create_category),
            )
            .route(
                "/api/v1/media/{id}/",
                get(serve_media).put(update_media).delete(delete_media),
            )
            .layer(DefaultBodyLimit::max(crate::BODY_LIMIT_BYTES))
    }

    fn png() -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        RgbImage::from_pixel(32, 16, Rgb([200, 30, 30]))
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn file_body(mime: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"alt_text\"\r\n\r\nLogo\r\n\
             --{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"logo.png\"\r\n\
             Content-Type: {mime}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn upload(token: Option<&str>, body: Vec<u8>) -> (StatusCode, serde_json::Value) {
        let mut req = Request::builder()
            .method("POST")
            .uri("/api/v1/media/upload/")
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
    fn test_hex_color() {
        assert!(is_hex_color("#3B82F6"));
        assert!(is_hex_color("#a1b2c3"));
        assert!(!is_hex_color("3B82F6"));
        assert!(!is_hex_color("#3B82F"));
        assert!(!is_hex_color("#GGGGGG"));
    }

    #[test]
    fn test_list_query_parses_kind() {
        let query: MediaListQuery =
            serde_json::from_value(json!({ "file_type": "video", "page": 2 })).unwrap();
        assert_eq!(query.file_type, Some(MediaKind::Video));
        assert_eq!(query.per_page, 20);
        assert!(serde_json::from_value::<MediaListQuery>(json!({ "file_type": "audio" })).is_err());
    }

    #[tokio::test]
    async fn test_upload_requires_login() {
        let (status, _) = upload(None, file_body("image/png", &png())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_valid_image_upload_reaches_storage() {
        let token = staff_token();
        let (status, json) = upload(Some(&token), file_body("image/png", &png())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"], "Database not available");
    }

    #[tokio::test]
    async fn test_unsupported_upload_is_rejected() {
        let token = staff_token();
        let (status, json) = upload(Some(&token), file_body("application/pdf", b"%PDF-1.7")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().starts_with("Unsupported file type"));
    }

    #[tokio::test]
    async fn test_oversized_upload_is_rejected() {
        let token = staff_token();
        let mut bytes = png();
        bytes.resize(MAX_MEDIA_BYTES + 1, 0);
        let (status, json) = upload(Some(&token), file_body("image/png", &bytes)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json["error"], "File too large. Maximum size is 10 MB");
    }

    #[tokio::test]
    async fn test_upload_without_file_is_rejected() {
        let token = staff_token();
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"alt_text\"\r\n\r\nx\r\n--{BOUNDARY}--\r\n"
        );
        let (status, json) = upload(Some(&token), body.into_bytes()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "No file provided");
    }

    #[tokio::test]
    async fn test_url_media_validation() {
        let token = staff_token();
        let (status, json) = send(
            router(),
            "POST",
            "/api/v1/media/url/",
            Some(&token),
            Some(json!({ "url": "ftp://files/a.mp4", "filename": "a.mp4", "file_type": "video" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "url must be an http(s) URL");

        let (status, _) = send(
            router(),
            "POST",
            "/api/v1/media/url/",
            Some(&token),
            Some(json!({ "url": "https://cdn.sevp.com/a.pdf", "filename": "a.pdf", "file_type": "document" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            router(),
            "POST",
            "/api/v1/media/url/",
            Some(&token),
            Some(json!({ "url": "https://youtu.be/x", "filename": "demo.mp4", "file_type": "video" })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_delete_and_category_create_are_admin_only() {
        let staff = staff_token();
        let (status, _) = send(router(), "DELETE", "/api/v1/media/5/", Some(&staff), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            router(),
            "POST",
            "/api/v1/media/categories/",
            Some(&staff),
            Some(json!({ "name": "Logos" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(router(), "GET", "/api/v1/media/categories/", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_category_color_is_validated() {
        let admin = admin_token();
        let (status, json) = send(
            router(),
            "POST",
            "/api/v1/media/categories/",
            Some(&admin),
            Some(json!({ "name": "Logos", "color": "blue" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "color must be a hex value like #3B82F6");
    }

    #[tokio::test]
    async fn test_serving_is_public_and_list_is_not() {
        let (status, _) = send(router(), "GET", "/api/v1/media/7/", None, None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = send(router(), "GET", "/api/v1/media/", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
