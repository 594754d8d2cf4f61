/**
 * Testimonial Routes
 */
use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;

use crate::db::models::Testimonial;
use crate::routes::{
    bad_request, db_error, not_found, pool, require_admin, required, search_pattern, ApiError,
    ApiResult, MessageResponse,
};

#[derive(Debug, Deserialize, Default)]
pub struct PublicTestimonialQuery {
    pub featured: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AdminTestimonialQuery {
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTestimonialRequest {
    pub client_name: String,
    #[serde(default)]
    pub client_position: String,
    #[serde(default)]
    pub client_company: String,
    pub client_photo: Option<String>,
    pub content: String,
    #[serde(default = "default_rating")]
    pub rating: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub display_order: i32,
}

fn default_rating() -> i32 {
    5
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateTestimonialRequest {
    pub client_name: Option<String>,
    pub client_position: Option<String>,
    pub client_company: Option<String>,
    pub client_photo: Option<String>,
    pub content: Option<String>,
    pub rating: Option<i32>,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
    pub display_order: Option<i32>,
}

fn validate_rating(rating: i32) -> Result<i32, ApiError> {
    if (1..=5).contains(&rating) {
        Ok(rating)
    } else {
        Err(bad_request("rating must be between 1 and 5"))
    }
}

/// GET /api/v1/testimonials/public/?featured=
pub async fn list_public_testimonials(
    Query(query): Query<PublicTestimonialQuery>,
) -> (StatusCode, Json<Vec<Testimonial>>) {
    let pool = match crate::db::get_pool() {
        Some(p) => p,
        None => return (StatusCode::SERVICE_UNAVAILABLE, Json(vec![])),
    };

    match sqlx::query_as::<_, Testimonial>(
        r#"
        SELECT * FROM testimonials
        WHERE is_active = true AND ($1::boolean IS NULL OR is_featured = $1)
        ORDER BY display_order, created_at DESC
        "#,
    )
    .bind(query.featured)
    .fetch_all(pool.as_ref())
    .await
    {
        Ok(rows) => (StatusCode::OK, Json(rows)),
        Err(e) => {
            tracing::error!("Failed to list public testimonials: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(vec![]))
        }
    }
}

/// GET /api/v1/testimonials/admin/?search=
pub async fn list_testimonials(
    headers: HeaderMap,
    Query(query): Query<AdminTestimonialQuery>,
) -> ApiResult<Vec<Testimonial>> {
    require_admin(&headers)?;
    let pool = pool()?;

    let rows = sqlx::query_as::<_, Testimonial>(
        r#"
        SELECT * FROM testimonials
        WHERE ($1::text IS NULL OR client_name ILIKE $1 OR client_company ILIKE $1
               OR client_position ILIKE $1 OR content ILIKE $1)
        ORDER BY display_order, created_at DESC
        "#,
    )
    .bind(search_pattern(query.search.as_deref()))
    .fetch_all(pool.as_ref())
    .await
    .map_err(db_error)?;

    Ok((StatusCode::OK, Json(rows)))
}

/// GET /api/v1/testimonials/admin/{id}/
pub async fn get_testimonial(headers: HeaderMap, Path(id): Path<i64>) -> ApiResult<Testimonial> {
    require_admin(&headers)?;
    let pool = pool()?;

    let row = sqlx::query_as::<_, Testimonial>("SELECT * FROM testimonials WHERE id = $1")
        .bind(id)
        .fetch_optional(pool.as_ref())
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found("Testimonial"))?;

    Ok((StatusCode::OK, Json(row)))
}

/// POST /api/v1/testimonials/admin/
pub async fn create_testimonial(
    headers: HeaderMap,
    Json(payload): Json<CreateTestimonialRequest>,
) -> ApiResult<Testimonial> {
    let claims = require_admin(&headers)?;
    let client_name = required("client_name", &payload.client_name)?;
    let content = required("content", &payload.content)?;
    let rating = validate_rating(payload.rating)?;

    let pool = pool()?;
    let row = sqlx::query_as::<_, Testimonial>(
        r#"
        INSERT INTO testimonials
            (client_name, client_position, client_company, client_photo, content,
             rating, is_active, is_featured, display_order)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(&client_name)
    .bind(payload.client_position.trim())
    .bind(payload.client_company.trim())
    .bind(&payload.client_photo)
    .bind(&content)
    .bind(rating)
    .bind(payload.is_active)
    .bind(payload.is_featured)
    .bind(payload.display_order)
    .fetch_one(pool.as_ref())
    .await
    .map_err(db_error)?;

    tracing::info!(id = row.id, user = %claims.username, "Testimonial created");
    Ok((StatusCode::CREATED, Json(row)))
}

/// PUT /api/v1/testimonials/admin/{id}/
pub async fn update_testimonial(
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTestimonialRequest>,
) -> ApiResult<Testimonial> {
    let claims = require_admin(&headers)?;
    let client_name = payload
        .client_name
        .as_deref()
        .map(|v| required("client_name", v))
        .transpose()?;
    let content = payload
        .content
        .as_deref()
        .map(|v| required("content", v))
        .transpose()?;
    let rating = payload.rating.map(validate_rating).transpose()?;

    let pool = pool()?;
    let row = sqlx::query_as::<_, Testimonial>(
        r#"
        UPDATE testimonials SET
            client_name = COALESCE($2, client_name),
            client_position = COALESCE($3, client_position),
            client_company = COALESCE($4, client_company),
            client_photo = COALESCE($5, client_photo),
            content = COALESCE($6, content),
            rating = COALESCE($7, rating),
            is_active = COALESCE($8, is_active),
            is_featured = COALESCE($9, is_featured),
            display_order = COALESCE($10, display_order),
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(client_name)
    .bind(payload.client_position)
    .bind(payload.client_company)
    .bind(payload.client_photo)
    .bind(content)
    .bind(rating)
    .bind(payload.is_active)
    .bind(payload.is_featured)
    .bind(payload.display_order)
    .fetch_optional(pool.as_ref())
    .await
    .map_err(db_error)?
    .ok_or_else(|| not_found("Testimonial"))?;

    tracing::info!(id, user = %claims.username, "Testimonial updated");
    Ok((StatusCode::OK, Json(row)))
}

/// DELETE /api/v1/testimonials/admin/{id}/
pub async fn delete_testimonial(
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<MessageResponse> {
    let claims = require_admin(&headers)?;
    let pool = pool()?;

    let result = sqlx::query("DELETE FROM testimonials WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await
        .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(not_found("Testimonial"));
    }

    tracing::info!(id, user = %claims.username, "Testimonial deleted");
    Ok((StatusCode::OK, Json(MessageResponse::new("Testimonial deleted"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{admin_token, send};
    use axum::{routing::get, Router};
    use serde_json::json;

    fn router() -> Router {
        Router::new()
            .route("/api/v1/testimonials/public/", get(list_public_testimonials))
            .route(
                "/api/v1/testimonials/admin/",
                get(list_testimonials).post(create_testimonial),
            )
            .route(
                "/api/v1/testimonials/admin/{id}/",
                get(get_testimonial)
                    .put(update_testimonial)
                    .delete(delete_testimonial),
            )
    }

    #[test]
    fn test_rating_bounds() {
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(6).is_err());
        assert_eq!(validate_rating(1).unwrap(), 1);
        assert_eq!(validate_rating(5).unwrap(), 5);
    }

    #[tokio::test]
    async fn test_create_rejects_out_of_range_rating() {
        let token = admin_token();
        let (status, body) = send(
            router(),
            "POST",
            "/api/v1/testimonials/admin/",
            Some(&token),
            Some(json!({ "client_name": "Colegio San Marcos", "content": "Excelente", "rating": 9 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("rating"));
    }

    #[tokio::test]
    async fn test_update_rejects_blank_content() {
        let token = admin_token();
        let (status, _) = send(
            router(),
            "PUT",
            "/api/v1/testimonials/admin/4/",
            Some(&token),
            Some(json!({ "content": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_public_list_without_database() {
        let (status, body) = send(router(), "GET", "/api/v1/testimonials/public/", None, None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_delete_requires_admin() {
        let (status, _) = send(router(), "DELETE", "/api/v1/testimonials/admin/1/", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
