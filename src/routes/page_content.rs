/**
 * Page Content Routes
 * Public page blobs with default fallback, admin CRUD and section saves
 */
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content::{
    defaults::{default_content, default_title, resolve_content},
    merge::{changed_sections, merge_section},
    slideshow::normalize_slides,
    PageKey,
};
use crate::db::{
    self,
    models::{PageContent, PageContentUpdate},
};
use crate::routes::{
    bad_request, db_error, is_valid_slug, not_found, pool, require_admin, ApiError, ApiResult,
    MessageResponse,
};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Page as served to the public site.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicPage {
    pub page_key: String,
    pub title: String,
    pub content_json: Value,
    pub meta_title: String,
    pub meta_description: String,
    pub meta_keywords: String,
    /// True when nothing stored was used.
    pub is_default: bool,
}

impl PublicPage {
    /// Built-in page, for keys the site ships defaults for.
    fn defaults(page: &PageRef) -> Option<Self> {
        let known = page.known?;
        Some(Self {
            page_key: page.key.clone(),
            title: default_title(known).to_string(),
            content_json: default_content(known),
            meta_title: String::new(),
            meta_description: String::new(),
            meta_keywords: String::new(),
            is_default: true,
        })
    }

    fn resolved(page: &PageRef, record: PageContent) -> Self {
        let content_json = match page.known {
            Some(known) => resolve_content(known, &record.content_json),
            None => record.content_json,
        };
        Self {
            page_key: page.key.clone(),
            content_json,
            title: record.title,
            meta_title: record.meta_title,
            meta_description: record.meta_description,
            meta_keywords: record.meta_keywords,
            is_default: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePageRequest {
    pub page_key: String,
    pub title: Option<String>,
    pub content_json: Option<Value>,
    #[serde(default)]
    pub meta_title: String,
    #[serde(default)]
    pub meta_description: String,
    #[serde(default)]
    pub meta_keywords: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Helpers
// ============================================================================

/// A page key as stored, plus the built-in page it names, if any.
#[derive(Debug, Clone, PartialEq)]
struct PageRef {
    key: String,
    known: Option<PageKey>,
}

impl PageRef {
    /// Lowercased slug key (`footer`, `navigation`, `pricing`, ...).
    fn parse(raw: &str) -> Option<Self> {
        let key = raw.trim().to_lowercase();
        if !is_valid_slug(&key) {
            return None;
        }
        Some(Self {
            known: key.parse().ok(),
            key,
        })
    }

    fn title(&self) -> String {
        match self.known {
            Some(known) => default_title(known).to_string(),
            None => {
                let words = self.key.replace('-', " ");
                let mut chars = words.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => words,
                }
            }
        }
    }

    fn initial_content(&self) -> Value {
        match self.known {
            Some(known) => default_content(known),
            None => Value::Object(Default::default()),
        }
    }

    fn renders_section(&self, section: &str) -> bool {
        self.known.map_or(true, |known| known.is_known_section(section))
    }

    /// Stamp slide types on the homepage hero, if present.
    fn normalize_hero(&self, content: &mut Value) {
        if self.known != Some(PageKey::Homepage) {
            return;
        }
        if let Some(hero) = content.get_mut("hero") {
            let slides = normalize_slides(hero);
            tracing::debug!(slides, "Normalized homepage hero slideshow");
        }
    }
}

impl std::fmt::Display for PageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}

fn page_from_path(raw: &str) -> Result<PageRef, ApiError> {
    PageRef::parse(raw).ok_or_else(|| not_found("Page"))
}

fn require_object(content: &Value) -> Result<(), ApiError> {
    if content.is_object() {
        Ok(())
    } else {
        Err(bad_request("content_json must be a JSON object"))
    }
}

async fn fetch_page(page: &PageRef) -> Result<PageContent, ApiError> {
    let pool = pool()?;
    sqlx::query_as::<_, PageContent>("SELECT * FROM page_content WHERE page_key = $1")
        .bind(&page.key)
        .fetch_optional(pool.as_ref())
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found("Page"))
}

// ============================================================================
// Public Handlers
// ============================================================================

/// GET /api/v1/page-content/public/{key}/
/// Missing, inactive or unreachable content resolves to the built-in
/// defaults. Only a key with neither stored content nor defaults is 404.
pub async fn get_public_page(Path(key): Path<String>) -> ApiResult<PublicPage> {
    let page = page_from_path(&key)?;

    let Some(pool) = db::get_pool() else {
        tracing::debug!(page_key = %page, "No database, serving default page content");
        return PublicPage::defaults(&page)
            .map(|body| (StatusCode::OK, Json(body)))
            .ok_or_else(|| not_found("Page"));
    };

    let row = sqlx::query_as::<_, PageContent>(
        "SELECT * FROM page_content WHERE page_key = $1 AND is_active = true",
    )
    .bind(&page.key)
    .fetch_optional(pool.as_ref())
    .await;

    let body = match row {
        Ok(Some(record)) => PublicPage::resolved(&page, record),
        Ok(None) => {
            tracing::debug!(page_key = %page, "No active content stored, serving defaults");
            PublicPage::defaults(&page).ok_or_else(|| not_found("Page"))?
        }
        Err(e) => match PublicPage::defaults(&page) {
            Some(fallback) => {
                tracing::error!(page_key = %page, "Failed to load page content: {}", e);
                fallback
            }
            None => return Err(db_error(e)),
        },
    };

    Ok((StatusCode::OK, Json(body)))
}

// ============================================================================
// Admin Handlers
// ============================================================================

/// GET /api/v1/page-content/admin/
pub async fn list_pages(headers: HeaderMap) -> ApiResult<Vec<PageContent>> {
    require_admin(&headers)?;
    let pool = pool()?;

    let pages = sqlx::query_as::<_, PageContent>("SELECT * FROM page_content ORDER BY page_key")
        .fetch_all(pool.as_ref())
        .await
        .map_err(db_error)?;

    Ok((StatusCode::OK, Json(pages)))
}

/// POST /api/v1/page-content/admin/
pub async fn create_page(
    headers: HeaderMap,
    Json(payload): Json<CreatePageRequest>,
) -> ApiResult<PageContent> {
    let claims = require_admin(&headers)?;
    let page = PageRef::parse(&payload.page_key).ok_or_else(|| {
        bad_request("page_key must be lowercase letters, digits and single hyphens")
    })?;

    let mut content = payload
        .content_json
        .unwrap_or_else(|| page.initial_content());
    require_object(&content)?;
    page.normalize_hero(&mut content);

    let title = payload
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| page.title());

    let pool = pool()?;
    let created = sqlx::query_as::<_, PageContent>(
        r#"
        INSERT INTO page_content
            (page_key, title, content_json, meta_title, meta_description, meta_keywords, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(&page.key)
    .bind(&title)
    .bind(&content)
    .bind(&payload.meta_title)
    .bind(&payload.meta_description)
    .bind(&payload.meta_keywords)
    .bind(payload.is_active)
    .fetch_one(pool.as_ref())
    .await
    .map_err(|e| {
        if db::is_unique_violation(&e) {
            crate::routes::error(
                StatusCode::CONFLICT,
                format!("Content for page '{}' already exists", page),
            )
        } else {
            db_error(e)
        }
    })?;

    tracing::info!(page_key = %page, user = %claims.username, "Page content created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/v1/page-content/admin/{key}/
pub async fn get_page(headers: HeaderMap, Path(key): Path<String>) -> ApiResult<PageContent> {
    require_admin(&headers)?;
    let page = page_from_path(&key)?;
    let record = fetch_page(&page).await?;
    Ok((StatusCode::OK, Json(record)))
}

/// PUT /api/v1/page-content/admin/{key}/
/// Whole-record save. The blob is replaced as sent, last writer wins.
pub async fn update_page(
    headers: HeaderMap,
    Path(key): Path<String>,
    Json(update): Json<PageContentUpdate>,
) -> ApiResult<PageContent> {
    let claims = require_admin(&headers)?;
    let page = page_from_path(&key)?;
    if let Some(content) = &update.content_json {
        require_object(content)?;
    }

    let mut record = fetch_page(&page).await?;
    let before = record.content_json.clone();
    record.apply_update(update);
    page.normalize_hero(&mut record.content_json);

    let pool = pool()?;
    let saved = sqlx::query_as::<_, PageContent>(
        r#"
        UPDATE page_content
        SET title = $2, content_json = $3, meta_title = $4, meta_description = $5,
            meta_keywords = $6, is_active = $7, updated_at = now()
        WHERE page_key = $1
        RETURNING *
        "#,
    )
    .bind(&page.key)
    .bind(&record.title)
    .bind(&record.content_json)
    .bind(&record.meta_title)
    .bind(&record.meta_description)
    .bind(&record.meta_keywords)
    .bind(record.is_active)
    .fetch_optional(pool.as_ref())
    .await
    .map_err(db_error)?
    .ok_or_else(|| not_found("Page"))?;

    tracing::info!(
        page_key = %page,
        user = %claims.username,
        sections = ?changed_sections(&before, &saved.content_json),
        "Page content updated"
    );
    Ok((StatusCode::OK, Json(saved)))
}

/// Creates the row a first section save merges into; a no-op when it exists.
const CREATE_EMPTY_PAGE: &str = r#"
    INSERT INTO page_content (page_key, title, content_json)
    VALUES ($1, $2, '{}'::jsonb)
    ON CONFLICT (page_key) DO NOTHING
"#;

/// PUT /api/v1/page-content/admin/{key}/sections/{section}/
/// Replace one top-level section inside a row lock, keeping every sibling.
/// A page with no row yet is created empty first.
pub async fn update_section(
    headers: HeaderMap,
    Path((key, section)): Path<(String, String)>,
    Json(value): Json<Value>,
) -> ApiResult<PageContent> {
    let claims = require_admin(&headers)?;
    let page = page_from_path(&key)?;
    let section = section.trim().to_string();

    if !page.renders_section(&section) {
        tracing::warn!(
            page_key = %page,
            section = %section,
            "Saving a section the public page does not render"
        );
    }

    let pool = pool()?;
    let mut tx = pool.begin().await.map_err(db_error)?;

    // Concurrent first saves both land here; the loser waits and then merges.
    sqlx::query(CREATE_EMPTY_PAGE)
        .bind(&page.key)
        .bind(page.title())
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

    let existing = sqlx::query_as::<_, PageContent>(
        "SELECT * FROM page_content WHERE page_key = $1 FOR UPDATE",
    )
    .bind(&page.key)
    .fetch_one(&mut *tx)
    .await
    .map_err(db_error)?;

    let mut merged = merge_section(&existing.content_json, &section, value)
        .map_err(|e| bad_request(e.to_string()))?;
    if section == "hero" {
        page.normalize_hero(&mut merged);
    }

    let saved = sqlx::query_as::<_, PageContent>(
        r#"
        UPDATE page_content SET content_json = $2, updated_at = now()
        WHERE page_key = $1
        RETURNING *
        "#,
    )
    .bind(&page.key)
    .bind(&merged)
    .fetch_one(&mut *tx)
    .await
    .map_err(db_error)?;

    tx.commit().await.map_err(db_error)?;

    tracing::info!(
        page_key = %page,
        section = %section,
        user = %claims.username,
        "Page section saved"
    );
    Ok((StatusCode::OK, Json(saved)))
}

/// DELETE /api/v1/page-content/admin/{key}/
pub async fn delete_page(
    headers: HeaderMap,
    Path(key): Path<String>,
) -> ApiResult<MessageResponse> {
    let claims = require_admin(&headers)?;
    let page = page_from_path(&key)?;
    let pool = pool()?;

    let result = sqlx::query("DELETE FROM page_content WHERE page_key = $1")
        .bind(&page.key)
        .execute(pool.as_ref())
        .await
        .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(not_found("Page"));
    }

    tracing::info!(page_key = %page, user = %claims.username, "Page content deleted");
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Page content deleted")),
    ))
}
