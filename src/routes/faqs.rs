/**
 * FAQ Routes
 * Public FAQ list with view/helpful counters and admin CRUD
 */
use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::models::{Faq, FAQ_CATEGORIES};
use crate::routes::{
    bad_request, db_error, not_found, pool, require_admin, required, search_pattern, ApiError,
    ApiResult, MessageResponse,
};

#[derive(Debug, Deserialize, Default)]
pub struct FaqQuery {
    pub category: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFaqRequest {
    pub question: String,
    pub answer: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub display_order: i32,
}

fn default_category() -> String {
    "general".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateFaqRequest {
    pub question: Option<String>,
    pub answer: Option<String>,
    pub category: Option<String>,
    pub is_active: Option<bool>,
    pub display_order: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CounterResponse {
    pub message: String,
    pub views_count: i32,
    pub helpful_votes: i32,
}

fn validate_category(category: &str) -> Result<String, ApiError> {
    let category = category.trim().to_lowercase();
    if FAQ_CATEGORIES.contains(&category.as_str()) {
        Ok(category)
    } else {
        Err(bad_request(format!(
            "category must be one of: {}",
            FAQ_CATEGORIES.join(", ")
        )))
    }
}

// ============================================================================
// Public Handlers
// ============================================================================

/// GET /api/v1/faqs/public/?category=
pub async fn list_public_faqs(Query(query): Query<FaqQuery>) -> (StatusCode, Json<Vec<Faq>>) {
    let pool = match crate::db::get_pool() {
        Some(p) => p,
        None => return (StatusCode::SERVICE_UNAVAILABLE, Json(vec![])),
    };

    let category = query
        .category
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty());

    match sqlx::query_as::<_, Faq>(
        r#"
        SELECT * FROM faqs
        WHERE is_active = true AND ($1::text IS NULL OR category = $1)
        ORDER BY display_order, created_at
        "#,
    )
    .bind(category)
    .fetch_all(pool.as_ref())
    .await
    {
        Ok(rows) => (StatusCode::OK, Json(rows)),
        Err(e) => {
            tracing::error!("Failed to list public FAQs: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(vec![]))
        }
    }
}

async fn bump_counter(id: i64, column: &'static str, message: &str) -> ApiResult<CounterResponse> {
    let pool = pool()?;
    let sql = format!(
        "UPDATE faqs SET {col} = {col} + 1 WHERE id = $1 AND is_active = true \
         RETURNING views_count, helpful_votes",
        col = column
    );

    let (views_count, helpful_votes): (i32, i32) = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(pool.as_ref())
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found("FAQ"))?;

    Ok((
        StatusCode::OK,
        Json(CounterResponse {
            message: message.to_string(),
            views_count,
            helpful_votes,
        }),
    ))
}

/// POST /api/v1/faqs/public/{id}/view/
pub async fn record_view(Path(id): Path<i64>) -> ApiResult<CounterResponse> {
    bump_counter(id, "views_count", "View recorded").await
}

/// POST /api/v1/faqs/public/{id}/helpful/
pub async fn vote_helpful(Path(id): Path<i64>) -> ApiResult<CounterResponse> {
    bump_counter(id, "helpful_votes", "Vote recorded").await
}

// ============================================================================
// Admin Handlers
// ============================================================================

/// GET /api/v1/faqs/admin/?category=&search=
pub async fn list_faqs(headers: HeaderMap, Query(query): Query<FaqQuery>) -> ApiResult<Vec<Faq>> {
    require_admin(&headers)?;
    let category = query
        .category
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .map(validate_category)
        .transpose()?;
    let pool = pool()?;

    let rows = sqlx::query_as::<_, Faq>(
        r#"
        SELECT * FROM faqs
        WHERE ($1::text IS NULL OR category = $1)
          AND ($2::text IS NULL OR question ILIKE $2 OR answer ILIKE $2)
        ORDER BY category, display_order
        "#,
    )
    .bind(category)
    .bind(search_pattern(query.search.as_deref()))
    .fetch_all(pool.as_ref())
    .await
    .map_err(db_error)?;

    Ok((StatusCode::OK, Json(rows)))
}

/// GET /api/v1/faqs/admin/{id}/
pub async fn get_faq(headers: HeaderMap, Path(id): Path<i64>) -> ApiResult<Faq> {
    require_admin(&headers)?;
    let pool = pool()?;

    let row = sqlx::query_as::<_, Faq>("SELECT * FROM faqs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool.as_ref())
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found("FAQ"))?;

    Ok((StatusCode::OK, Json(row)))
}

/// POST /api/v1/faqs/admin/
pub async fn create_faq(
    headers: HeaderMap,
    Json(payload): Json<CreateFaqRequest>,
) -> ApiResult<Faq> {
    let claims = require_admin(&headers)?;
    let question = required("question", &payload.question)?;
    let answer = required("answer", &payload.answer)?;
    let category = validate_category(&payload.category)?;

    let pool = pool()?;
    let row = sqlx::query_as::<_, Faq>(
        r#"
        INSERT INTO faqs (question, answer, category, is_active, display_order)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(&question)
    .bind(&answer)
    .bind(&category)
    .bind(payload.is_active)
    .bind(payload.display_order)
    .fetch_one(pool.as_ref())
    .await
    .map_err(db_error)?;

    tracing::info!(id = row.id, category = %row.category, user = %claims.username, "FAQ created");
    Ok((StatusCode::CREATED, Json(row)))
}

/// PUT /api/v1/faqs/admin/{id}/
pub async fn update_faq(
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateFaqRequest>,
) -> ApiResult<Faq> {
    let claims = require_admin(&headers)?;
    let question = payload
        .question
        .as_deref()
        .map(|v| required("question", v))
        .transpose()?;
    let answer = payload
        .answer
        .as_deref()
        .map(|v| required("answer", v))
        .transpose()?;
    let category = payload.category.as_deref().map(validate_category).transpose()?;

    let pool = pool()?;
    let row = sqlx::query_as::<_, Faq>(
        r#"
        UPDATE faqs SET
            question = COALESCE($2, question),
            answer = COALESCE($3, answer),
            category = COALESCE($4, category),
            is_active = COALESCE($5, is_active),
            display_order = COALESCE($6, display_order),
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(question)
    .bind(answer)
    .bind(category)
    .bind(payload.is_active)
    .bind(payload.display_order)
    .fetch_optional(pool.as_ref())
    .await
    .map_err(db_error)?
    .ok_or_else(|| not_found("FAQ"))?;

    tracing::info!(id, user = %claims.username, "FAQ updated");
    Ok((StatusCode::OK, Json(row)))
}

/// DELETE /api/v1/faqs/admin/{id}/
pub async fn delete_faq(headers: HeaderMap, Path(id): Path<i64>) -> ApiResult<MessageResponse> {
    let claims = require_admin(&headers)?;
    let pool = pool()?;

    let result = sqlx::query("DELETE FROM faqs WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await
        .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(not_found("FAQ"));
    }

    tracing::info!(id, user = %claims.username, "FAQ deleted");
    Ok((StatusCode::OK, Json(MessageResponse::new("FAQ deleted successfully"))))
}
