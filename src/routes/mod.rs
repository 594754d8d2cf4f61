/**
 * Routes Module
 * API route handlers and the helpers they share
 */
pub mod auth;
pub mod company;
pub mod contact;
pub mod faqs;
pub mod health;
pub mod homepage;
pub mod media;
pub mod media_library;
pub mod news;
pub mod page_content;
pub mod plans;
pub mod rss;
pub mod testimonials;
pub mod users;

use std::sync::Arc;

use axum::{
    http::{HeaderMap, StatusCode},
    Json,
};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::PgPool;

use crate::db;
use auth::{verify_access_token, Claims};

/// Error body shared by every handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub type ApiResult<T> = Result<(StatusCode, Json<T>), ApiError>;

pub fn error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            message: None,
        }),
    )
}

pub fn bad_request(error: impl Into<String>) -> ApiError {
    self::error(StatusCode::BAD_REQUEST, error)
}

pub fn not_found(what: &str) -> ApiError {
    self::error(StatusCode::NOT_FOUND, format!("{} not found", what))
}

/// Log a database error and hide its details from the client.
pub fn db_error(e: sqlx::Error) -> ApiError {
    if db::is_unique_violation(&e) {
        tracing::warn!("Unique constraint violated: {}", e);
        return self::error(StatusCode::CONFLICT, "Resource already exists");
    }
    tracing::error!("Database error: {}", e);
    self::error(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
}

/// The shared pool, or 503 when the service runs without a database.
pub fn pool() -> Result<Arc<PgPool>, ApiError> {
    db::get_pool().ok_or_else(|| {
        self::error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Database not available",
        )
    })
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Claims of a valid access token. 401 otherwise.
pub fn require_auth(headers: &HeaderMap) -> Result<Claims, ApiError> {
    let token = extract_bearer_token(headers)
        .ok_or_else(|| self::error(StatusCode::UNAUTHORIZED, "Authorization required"))?;

    verify_access_token(token).map_err(|e| {
        tracing::debug!("Token verification failed: {}", e);
        self::error(StatusCode::UNAUTHORIZED, "Invalid or expired token")
    })
}

/// Claims of a valid admin access token. 401 without a token, 403 for non-admins.
pub fn require_admin(headers: &HeaderMap) -> Result<Claims, ApiError> {
    let claims = require_auth(headers)?;
    if !claims.is_admin {
        tracing::warn!(user = %claims.username, "Non-admin user attempted an admin action");
        return Err(self::error(
            StatusCode::FORBIDDEN,
            "Administrator privileges required",
        ));
    }
    Ok(claims)
}

/// `%term%` for an `ILIKE` search, with LIKE wildcards escaped.
pub fn search_pattern(search: Option<&str>) -> Option<String> {
    let term = search?.trim();
    if term.is_empty() {
        return None;
    }
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    Some(format!("%{}%", escaped))
}

/// Highest page number a list endpoint honours.
pub const MAX_PAGE: i64 = 10_000;

/// (limit, offset) for a 1-based page, with both inputs clamped so the
/// offset cannot overflow.
pub fn page_window(page: i64, per_page: i64, max_per_page: i64) -> (i64, i64) {
    let per_page = per_page.clamp(1, max_per_page);
    let page = page.clamp(1, MAX_PAGE);
    (per_page, (page - 1).saturating_mul(per_page))
}

/// For `Option<Option<T>>` fields: absent stays `None`, an explicit `null`
/// becomes `Some(None)`. Use with `#[serde(default)]`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Trim a required text field, rejecting blanks.
pub fn required(field: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(bad_request(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

pub fn is_valid_email(email: &str) -> bool {
    match email.trim().split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.ends_with('.'),
        None => false,
    }
}

lazy_static::lazy_static! {
    /// Lowercase letters, digits and single hyphens
    static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();
}

pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_REGEX.is_match(slug)
}

/// Slug derived from free text, or `None` when nothing sluggable remains.
pub fn slug_from(text: &str) -> Option<String> {
    let slug = slug::slugify(text);
    if slug.is_empty() {
        None
    } else {
        Some(slug)
    }
}

fn slug_candidate(base: &str, attempt: u32) -> String {
    if attempt == 0 {
        base.to_string()
    } else {
        format!("{}-{}", base, attempt + 1)
    }
}

/// First free slug of `base`, `base-2`, `base-3`, ... in `table`.
/// The row `exclude_id` may keep its own slug.
pub async fn unique_slug(
    pool: &PgPool,
    table: &'static str,
    base: &str,
    exclude_id: Option<i64>,
) -> Result<String, ApiError> {
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE slug = $1 AND id IS DISTINCT FROM $2)",
        table
    );
    for attempt in 0..100 {
        let candidate = slug_candidate(base, attempt);
        let (taken,): (bool,) = sqlx::query_as(&sql)
            .bind(&candidate)
            .bind(exclude_id)
            .fetch_one(pool)
            .await
            .map_err(db_error)?;
        if !taken {
            return Ok(candidate);
        }
    }
    Err(self::error(StatusCode::CONFLICT, "Slug already exists"))
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_search_pattern_escapes_wildcards() {
        assert_eq!(search_pattern(Some(" plan ")), Some("%plan%".to_string()));
        assert_eq!(search_pattern(Some("50%_off")), Some("%50\\%\\_off%".to_string()));
        assert_eq!(search_pattern(Some("   ")), None);
        assert_eq!(search_pattern(None), None);
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("ana@colegio.edu.pe"));
        assert!(!is_valid_email("ana@localhost"));
        assert!(!is_valid_email("@sevp.com"));
        assert!(!is_valid_email("no-at-sign"));
    }

    #[test]
    fn test_require_admin_distinguishes_401_and_403() {
        let headers = HeaderMap::new();
        assert_eq!(require_admin(&headers).unwrap_err().0, StatusCode::UNAUTHORIZED);

        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {}", test_support::staff_token())).unwrap(),
        );
        assert_eq!(require_admin(&headers).unwrap_err().0, StatusCode::FORBIDDEN);

        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {}", test_support::admin_token())).unwrap(),
        );
        let claims = require_admin(&headers).unwrap();
        assert_eq!(claims.username, "admin");
    }

    #[test]
    fn test_slug_helpers() {
        assert!(is_valid_slug("plan-basico-2024"));
        assert!(!is_valid_slug("Plan Básico"));
        assert!(!is_valid_slug("double--hyphen"));
        assert_eq!(slug_from("Plan Básico Anual").as_deref(), Some("plan-basico-anual"));
        assert_eq!(slug_from("¡¿?!"), None);
        assert_eq!(slug_candidate("noticia", 0), "noticia");
        assert_eq!(slug_candidate("noticia", 1), "noticia-2");
    }

    #[test]
    fn test_page_window_never_overflows() {
        assert_eq!(page_window(1, 20, 100), (20, 0));
        assert_eq!(page_window(3, 10, 100), (10, 20));
        assert_eq!(page_window(0, 500, 100), (100, 0));
        assert_eq!(page_window(i64::MAX, 100, 100), (100, (MAX_PAGE - 1) * 100));
        assert_eq!(page_window(i64::MIN, i64::MAX, 50), (50, 0));
    }

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "nullable")]
        price: Option<Option<i32>>,
    }

    #[test]
    fn test_nullable_tells_null_from_absent() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.price, None);
        let cleared: Patch = serde_json::from_str(r#"{"price": null}"#).unwrap();
        assert_eq!(cleared.price, Some(None));
        let set: Patch = serde_json::from_str(r#"{"price": 5}"#).unwrap();
        assert_eq!(set.price, Some(Some(5)));
    }

    #[test]
    fn test_required_trims_and_rejects_blank() {
        assert_eq!(required("name", "  Ana ").unwrap(), "Ana");
        assert_eq!(required("name", "  ").unwrap_err().0, StatusCode::BAD_REQUEST);
    }
}
