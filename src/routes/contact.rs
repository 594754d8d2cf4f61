/**
 * Contact Routes
 * Public contact form and the admin inbox
 */
use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::models::{ContactFilter, ContactMessage, ContactMessageRow, ContactStatus};
use crate::routes::{
    bad_request, db_error, is_valid_email, not_found, pool, require_admin, required,
    search_pattern, ApiResult, MessageResponse,
};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateContactRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub company: String,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct ContactListQuery {
    #[serde(default)]
    pub filter: ContactFilter,
    pub status_filter: Option<ContactStatus>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateContactRequest {
    pub status: Option<ContactStatus>,
    pub admin_response: Option<String>,
    pub assigned_to_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct ContactStats {
    pub total: i64,
    pub new: i64,
    pub in_progress: i64,
    pub responded: i64,
    pub closed: i64,
}

const MAX_MESSAGE_LEN: usize = 5000;

impl ContactListQuery {
    /// Statuses bound into the inbox query: `filter` first, then `status_filter`.
    fn status_binds(&self) -> (Option<&'static str>, Option<&'static str>) {
        (
            self.filter.status().map(|s| s.as_str()),
            self.status_filter.map(|s| s.as_str()),
        )
    }
}

// ============================================================================
// Public Handlers
// ============================================================================

/// POST /api/v1/contact/public/
/// Every submission starts as `new`.
pub async fn submit_message(
    Json(payload): Json<CreateContactRequest>,
) -> ApiResult<ContactMessage> {
    let name = required("name", &payload.name)?;
    let subject = required("subject", &payload.subject)?;
    let message = required("message", &payload.message)?;
    let email = payload.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(bad_request("A valid email is required"));
    }
    if message.chars().count() > MAX_MESSAGE_LEN {
        return Err(bad_request(format!(
            "message must be at most {} characters",
            MAX_MESSAGE_LEN
        )));
    }

    let pool = pool()?;
    let row = sqlx::query_as::<_, ContactMessageRow>(
        r#"
        INSERT INTO contact_messages (name, email, phone, company, subject, message, status)
        VALUES ($1, $2, $3, $4, $5, $6, 'new')
        RETURNING *
        "#,
    )
    .bind(&name)
    .bind(&email)
    .bind(payload.phone.trim())
    .bind(payload.company.trim())
    .bind(&subject)
    .bind(&message)
    .fetch_one(pool.as_ref())
    .await
    .map_err(db_error)?;

    tracing::info!(id = row.id, "Contact message received");
    Ok((StatusCode::CREATED, Json(row.into())))
}

// ============================================================================
// Admin Handlers
// ============================================================================

/// GET /api/v1/contact/admin/?filter=&status_filter=&search=
/// `filter=pending` is exactly the `new` messages; `status_filter` pins one status.
pub async fn list_messages(
    headers: HeaderMap,
    Query(query): Query<ContactListQuery>,
) -> ApiResult<Vec<ContactMessage>> {
    require_admin(&headers)?;
    let pool = pool()?;
    let (filter_status, exact_status) = query.status_binds();

    let rows = sqlx::query_as::<_, ContactMessageRow>(
        r#"
        SELECT * FROM contact_messages
        WHERE ($1::text IS NULL OR status = $1)
          AND ($2::text IS NULL OR status = $2)
          AND ($3::text IS NULL OR name ILIKE $3 OR email ILIKE $3
               OR subject ILIKE $3 OR company ILIKE $3 OR message ILIKE $3)
        ORDER BY created_at DESC
        "#,
    )
    .bind(filter_status)
    .bind(exact_status)
    .bind(search_pattern(query.search.as_deref()))
    .fetch_all(pool.as_ref())
    .await
    .map_err(db_error)?;

    Ok((
        StatusCode::OK,
        Json(rows.into_iter().map(ContactMessage::from).collect()),
    ))
}

/// GET /api/v1/contact/admin/stats/
pub async fn message_stats(headers: HeaderMap) -> ApiResult<ContactStats> {
    require_admin(&headers)?;
    let pool = pool()?;

    let counts: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM contact_messages GROUP BY status")
            .fetch_all(pool.as_ref())
            .await
            .map_err(db_error)?;

    Ok((StatusCode::OK, Json(tally(&counts))))
}

fn tally(counts: &[(String, i64)]) -> ContactStats {
    let mut stats = ContactStats::default();
    for (status, count) in counts {
        stats.total += count;
        match ContactStatus::parse(status).unwrap_or(ContactStatus::New) {
            ContactStatus::New => stats.new += count,
            ContactStatus::InProgress => stats.in_progress += count,
            ContactStatus::Responded => stats.responded += count,
            ContactStatus::Closed => stats.closed += count,
        }
    }
    stats
}

/// GET /api/v1/contact/admin/{id}/
pub async fn get_message(headers: HeaderMap, Path(id): Path<i64>) -> ApiResult<ContactMessage> {
    require_admin(&headers)?;
    let pool = pool()?;

    let row = sqlx::query_as::<_, ContactMessageRow>("SELECT * FROM contact_messages WHERE id = $1")
        .bind(id)
        .fetch_optional(pool.as_ref())
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found("Message"))?;

    Ok((StatusCode::OK, Json(row.into())))
}

/// PUT /api/v1/contact/admin/{id}/
/// Moving to `responded` stamps `responded_at` once.
pub async fn update_message(
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateContactRequest>,
) -> ApiResult<ContactMessage> {
    let claims = require_admin(&headers)?;
    let pool = pool()?;

    let row = sqlx::query_as::<_, ContactMessageRow>(
        r#"
        UPDATE contact_messages SET
            status = COALESCE($2, status),
            admin_response = COALESCE($3, admin_response),
            assigned_to_id = COALESCE($4, assigned_to_id),
            responded_at = CASE
                WHEN COALESCE($2, status) = 'responded' AND responded_at IS NULL THEN now()
                ELSE responded_at
            END,
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.status.map(|s| s.as_str()))
    .bind(payload.admin_response.as_deref().map(str::trim))
    .bind(payload.assigned_to_id)
    .fetch_optional(pool.as_ref())
    .await
    .map_err(db_error)?
    .ok_or_else(|| not_found("Message"))?;

    tracing::info!(id, status = %row.status, user = %claims.username, "Contact message updated");
    Ok((StatusCode::OK, Json(row.into())))
}

/// DELETE /api/v1/contact/admin/{id}/
pub async fn delete_message(
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<MessageResponse> {
    let claims = require_admin(&headers)?;
    let pool = pool()?;

    let result = sqlx::query("DELETE FROM contact_messages WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await
        .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(not_found("Message"));
    }

    tracing::info!(id, user = %claims.username, "Contact message deleted");
    Ok((StatusCode::OK, Json(MessageResponse::new("Message deleted"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{admin_token, send, staff_token};
    use axum::{
        routing::{get, post},
        Router,
    };
    use serde_json::json;

    fn router() -> Router {
        Router::new()
            .route("/api/v1/contact/public/", post(submit_message))
            .route("/api/v1/contact/admin/", get(list_messages))
            .route("/api/v1/contact/admin/stats/", get(message_stats))
            .route(
                "/api/v1/contact/admin/{id}/",
                get(get_message).put(update_message).delete(delete_message),
            )
    }

    #[test]
    fn test_tally_counts_each_status() {
        let counts = vec![
            ("new".to_string(), 4),
            ("in_progress".to_string(), 2),
            ("responded".to_string(), 3),
            ("closed".to_string(), 1),
        ];
        assert_eq!(
            tally(&counts),
            ContactStats {
                total: 10,
                new: 4,
                in_progress: 2,
                responded: 3,
                closed: 1
            }
        );
    }

    #[test]
    fn test_list_query_parses_filters() {
        let query: ContactListQuery =
            serde_json::from_value(json!({ "filter": "pending", "status_filter": "in_progress" }))
                .unwrap();
        assert_eq!(query.filter, ContactFilter::Pending);
        assert_eq!(query.filter.status(), Some(ContactStatus::New));
        assert_eq!(query.status_filter, Some(ContactStatus::InProgress));
    }

    fn row(status: &str) -> ContactMessageRow {
        ContactMessageRow {
            id: 1,
            name: "Ana".to_string(),
            email: "ana@colegio.pe".to_string(),
            phone: String::new(),
            company: String::new(),
            subject: "Demo".to_string(),
            message: "Hola".to_string(),
            status: status.to_string(),
            admin_response: String::new(),
            responded_at: None,
            assigned_to_id: None,
            created_at: chrono::Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_pending_filter_and_is_pending_agree() {
        let pending = ContactListQuery {
            filter: ContactFilter::Pending,
            ..Default::default()
        };
        let (bound, exact) = pending.status_binds();
        assert_eq!(bound, Some("new"));
        assert_eq!(exact, None);

        for status in ContactStatus::ALL {
            let message = ContactMessage::from(row(status.as_str()));
            assert_eq!(
                message.is_pending,
                bound == Some(status.as_str()),
                "{}",
                status.as_str()
            );
        }
    }

    #[test]
    fn test_all_filter_binds_nothing() {
        let query = ContactListQuery::default();
        assert_eq!(query.status_binds(), (None, None));

        let query = ContactListQuery {
            filter: ContactFilter::Responded,
            status_filter: Some(ContactStatus::Closed),
            search: None,
        };
        assert_eq!(query.status_binds(), (Some("responded"), Some("closed")));
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_email() {
        let (status, body) = send(
            router(),
            "POST",
            "/api/v1/contact/public/",
            None,
            Some(json!({
                "name": "Ana",
                "email": "ana-at-colegio",
                "subject": "Demo",
                "message": "Quisiera una demo"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("email"));
    }

    #[tokio::test]
    async fn test_submit_rejects_blank_message() {
        let (status, _) = send(
            router(),
            "POST",
            "/api/v1/contact/public/",
            None,
            Some(json!({
                "name": "Ana",
                "email": "ana@colegio.pe",
                "subject": "Demo",
                "message": "   "
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_valid_submit_without_database_is_unavailable() {
        let (status, _) = send(
            router(),
            "POST",
            "/api/v1/contact/public/",
            None,
            Some(json!({
                "name": "Ana",
                "email": "ana@colegio.pe",
                "subject": "Demo",
                "message": "Quisiera una demo"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_inbox_requires_admin() {
        let (status, _) = send(router(), "GET", "/api/v1/contact/admin/?filter=pending", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let staff = staff_token();
        let (status, _) = send(router(), "GET", "/api/v1/contact/admin/stats/", Some(&staff), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let admin = admin_token();
        let (status, _) = send(router(), "GET", "/api/v1/contact/admin/stats/", Some(&admin), None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unknown_filter_is_rejected() {
        let admin = admin_token();
        let (status, _) = send(
            router(),
            "GET",
            "/api/v1/contact/admin/?filter=archived",
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
