/**
 * News Routes
 * Public news feed and admin CRUD for news articles
 */
use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::db::models::{NewsArticle, NEWS_STATUSES};
use crate::routes::{
    bad_request, db_error, is_valid_slug, not_found, page_window, pool, require_admin, required,
    search_pattern, slug_from, unique_slug, ApiError, ApiResult, MessageResponse,
};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PublicNewsQuery {
    pub featured: Option<bool>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    10
}

const MAX_PUBLIC_LIMIT: i64 = 50;

impl PublicNewsQuery {
    fn window(&self) -> (i64, i64) {
        page_window(self.page, self.limit, MAX_PUBLIC_LIMIT)
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct AdminNewsQuery {
    pub status: Option<String>,
    pub search: Option<String>,
}

/// Article as shown on the public site.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicArticle {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub featured_image: Option<String>,
    pub featured: bool,
    pub views_count: i32,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<NewsArticle> for PublicArticle {
    fn from(a: NewsArticle) -> Self {
        Self {
            id: a.id,
            title: a.title,
            slug: a.slug,
            content: a.content,
            excerpt: a.excerpt,
            featured_image: a.featured_image,
            featured: a.featured,
            views_count: a.views_count,
            published_at: a.published_at,
            created_at: a.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateNewsRequest {
    pub title: String,
    pub content: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub meta_description: String,
    #[serde(default)]
    pub meta_keywords: String,
    pub status: Option<String>,
    #[serde(default)]
    pub featured: bool,
    pub featured_image: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateNewsRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub status: Option<String>,
    pub featured: Option<bool>,
    pub featured_image: Option<String>,
}

// ============================================================================
// Validation
// ============================================================================

const MIN_TITLE_LEN: usize = 5;

fn validate_title(title: &str) -> Result<String, ApiError> {
    let title = required("title", title)?;
    if title.chars().count() < MIN_TITLE_LEN {
        return Err(bad_request(format!(
            "title must be at least {} characters",
            MIN_TITLE_LEN
        )));
    }
    Ok(title)
}

fn validate_status(status: &str) -> Result<String, ApiError> {
    let status = status.trim().to_lowercase();
    if NEWS_STATUSES.contains(&status.as_str()) {
        Ok(status)
    } else {
        Err(bad_request(format!(
            "status must be one of: {}",
            NEWS_STATUSES.join(", ")
        )))
    }
}

fn validate_slug(slug: &str) -> Result<String, ApiError> {
    let slug = slug.trim().to_string();
    if is_valid_slug(&slug) {
        Ok(slug)
    } else {
        Err(crate::routes::error(
            StatusCode::BAD_REQUEST,
            "Slug must contain only lowercase letters, numbers, and hyphens",
        ))
    }
}

/// Default ammonia policy plus `data:` URLs, which is how resized images are embedded.
static SANITIZER: Lazy<ammonia::Builder<'static>> = Lazy::new(|| {
    let mut builder = ammonia::Builder::default();
    builder.add_url_schemes(&["data"]);
    builder
});

/// Strip scripts, handlers and unknown tags from article HTML.
pub fn sanitize_html(html: &str) -> String {
    SANITIZER.clean(html).to_string()
}

// ============================================================================
// Public Handlers
// ============================================================================

/// GET /api/v1/news/public/?featured=&page=&limit=
pub async fn list_public_news(
    Query(query): Query<PublicNewsQuery>,
) -> (StatusCode, Json<Vec<PublicArticle>>) {
    let pool = match crate::db::get_pool() {
        Some(p) => p,
        None => return (StatusCode::SERVICE_UNAVAILABLE, Json(vec![])),
    };

    let (limit, offset) = query.window();

    let articles = sqlx::query_as::<_, NewsArticle>(
        r#"
        SELECT * FROM news_articles
        WHERE status = 'published' AND ($1::boolean IS NULL OR featured = $1)
        ORDER BY published_at DESC NULLS LAST, created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(query.featured)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool.as_ref())
    .await;

    match articles {
        Ok(rows) => (
            StatusCode::OK,
            Json(rows.into_iter().map(PublicArticle::from).collect()),
        ),
        Err(e) => {
            tracing::error!("Failed to list public news: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(vec![]))
        }
    }
}

/// GET /api/v1/news/public/{slug}/
/// Counts a view on every hit.
pub async fn get_public_article(Path(slug): Path<String>) -> ApiResult<PublicArticle> {
    if !is_valid_slug(&slug) {
        return Err(not_found("Article"));
    }
    let pool = pool()?;

    let article = sqlx::query_as::<_, NewsArticle>(
        r#"
        UPDATE news_articles SET views_count = views_count + 1
        WHERE slug = $1 AND status = 'published'
        RETURNING *
        "#,
    )
    .bind(&slug)
    .fetch_optional(pool.as_ref())
    .await
    .map_err(db_error)?
    .ok_or_else(|| not_found("Article"))?;

    Ok((StatusCode::OK, Json(article.into())))
}

// ============================================================================
// Admin Handlers
// ============================================================================

/// GET /api/v1/news/admin/?status=&search=
pub async fn list_news(
    headers: HeaderMap,
    Query(query): Query<AdminNewsQuery>,
) -> ApiResult<Vec<NewsArticle>> {
    require_admin(&headers)?;
    let status = query.status.as_deref().map(validate_status).transpose()?;
    let pool = pool()?;

    let articles = sqlx::query_as::<_, NewsArticle>(
        r#"
        SELECT * FROM news_articles
        WHERE ($1::text IS NULL OR status = $1)
          AND ($2::text IS NULL OR title ILIKE $2 OR excerpt ILIKE $2 OR content ILIKE $2)
        ORDER BY created_at DESC
        "#,
    )
    .bind(status)
    .bind(search_pattern(query.search.as_deref()))
    .fetch_all(pool.as_ref())
    .await
    .map_err(db_error)?;

    Ok((StatusCode::OK, Json(articles)))
}

/// GET /api/v1/news/admin/{id}/
pub async fn get_news(headers: HeaderMap, Path(id): Path<i64>) -> ApiResult<NewsArticle> {
    require_admin(&headers)?;
    let pool = pool()?;

    let article = sqlx::query_as::<_, NewsArticle>("SELECT * FROM news_articles WHERE id = $1")
        .bind(id)
        .fetch_optional(pool.as_ref())
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found("Article"))?;

    Ok((StatusCode::OK, Json(article)))
}

/// POST /api/v1/news/admin/
pub async fn create_news(
    headers: HeaderMap,
    Json(payload): Json<CreateNewsRequest>,
) -> ApiResult<NewsArticle> {
    let claims = require_admin(&headers)?;

    let title = validate_title(&payload.title)?;
    let content = sanitize_html(&required("content", &payload.content)?);
    let status = validate_status(payload.status.as_deref().unwrap_or("draft"))?;
    let explicit_slug = payload.slug.as_deref().map(validate_slug).transpose()?;

    let pool = pool()?;
    let slug = match explicit_slug {
        Some(slug) => slug,
        None => {
            let base = slug_from(&title)
                .ok_or_else(|| bad_request("title must contain letters or digits"))?;
            unique_slug(pool.as_ref(), "news_articles", &base, None).await?
        }
    };

    let article = sqlx::query_as::<_, NewsArticle>(
        r#"
        INSERT INTO news_articles
            (title, slug, content, excerpt, meta_description, meta_keywords,
             status, featured, featured_image, author_id, published_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                CASE WHEN $7 = 'published' THEN now() END)
        RETURNING *
        "#,
    )
    .bind(&title)
    .bind(&slug)
    .bind(&content)
    .bind(payload.excerpt.trim())
    .bind(&payload.meta_description)
    .bind(&payload.meta_keywords)
    .bind(&status)
    .bind(payload.featured)
    .bind(&payload.featured_image)
    .bind(claims.user_id().filter(|id| *id > 0))
    .fetch_one(pool.as_ref())
    .await
    .map_err(|e| {
        if crate::db::is_unique_violation(&e) {
            crate::routes::error(StatusCode::CONFLICT, "Slug already exists")
        } else {
            db_error(e)
        }
    })?;

    tracing::info!(slug = %article.slug, user = %claims.username, "News article created");
    Ok((StatusCode::CREATED, Json(article)))
}

/// PUT /api/v1/news/admin/{id}/
/// Partial update. Publishing for the first time stamps `published_at`.
pub async fn update_news(
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateNewsRequest>,
) -> ApiResult<NewsArticle> {
    let claims = require_admin(&headers)?;

    let title = payload.title.as_deref().map(validate_title).transpose()?;
    let content = payload
        .content
        .as_deref()
        .map(|c| required("content", c).map(|c| sanitize_html(&c)))
        .transpose()?;
    let status = payload.status.as_deref().map(validate_status).transpose()?;
    let slug = payload.slug.as_deref().map(validate_slug).transpose()?;

    let pool = pool()?;
    let article = sqlx::query_as::<_, NewsArticle>(
        r#"
        UPDATE news_articles SET
            title = COALESCE($2, title),
            content = COALESCE($3, content),
            slug = COALESCE($4, slug),
            excerpt = COALESCE($5, excerpt),
            meta_description = COALESCE($6, meta_description),
            meta_keywords = COALESCE($7, meta_keywords),
            status = COALESCE($8, status),
            featured = COALESCE($9, featured),
            featured_image = COALESCE($10, featured_image),
            published_at = CASE
                WHEN COALESCE($8, status) = 'published' AND published_at IS NULL THEN now()
                ELSE published_at
            END,
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(title)
    .bind(content)
    .bind(slug)
    .bind(payload.excerpt)
    .bind(payload.meta_description)
    .bind(payload.meta_keywords)
    .bind(status)
    .bind(payload.featured)
    .bind(payload.featured_image)
    .fetch_optional(pool.as_ref())
    .await
    .map_err(|e| {
        if crate::db::is_unique_violation(&e) {
            crate::routes::error(StatusCode::CONFLICT, "Slug already exists")
        } else {
            db_error(e)
        }
    })?
    .ok_or_else(|| not_found("Article"))?;

    tracing::info!(id, status = %article.status, user = %claims.username, "News article updated");
    Ok((StatusCode::OK, Json(article)))
}

/// DELETE /api/v1/news/admin/{id}/
pub async fn delete_news(headers: HeaderMap, Path(id): Path<i64>) -> ApiResult<MessageResponse> {
    let claims = require_admin(&headers)?;
    let pool = pool()?;

    let result = sqlx::query("DELETE FROM news_articles WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await
        .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(not_found("Article"));
    }

    tracing::info!(id, user = %claims.username, "News article deleted");
    Ok((StatusCode::OK, Json(MessageResponse::new("Article deleted"))))
}
