/**
 * Admin User Management Routes
 */
use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::models::User;
use crate::routes::auth::{hash_password, revoke_user_tokens, Claims};
use crate::routes::{
    bad_request, db_error, error, is_valid_email, not_found, page_window, pool, require_admin,
    required, search_pattern, ApiError, ApiResult, MessageResponse,
};

const MIN_PASSWORD_LEN: usize = 8;
const MAX_PER_PAGE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
    pub search: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    20
}

impl UserListQuery {
    /// (limit, offset) with 1 <= per_page <= 100
    fn window(&self) -> (i64, i64) {
        page_window(self.page, self.per_page, MAX_PER_PAGE)
    }
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub items: Vec<User>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub pages: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_true")]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
    pub is_superuser: Option<bool>,
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(bad_request(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim().to_lowercase();
    if is_valid_email(&email) {
        Ok(email)
    } else {
        Err(bad_request("A valid email is required"))
    }
}

fn refuse_self(claims: &Claims, id: i64, action: &str) -> Result<(), ApiError> {
    if claims.user_id() == Some(id) {
        return Err(bad_request(format!("You cannot {} your own account", action)));
    }
    Ok(())
}

fn conflict(e: sqlx::Error) -> ApiError {
    if crate::db::is_unique_violation(&e) {
        error(StatusCode::CONFLICT, "Username or email already exists")
    } else {
        db_error(e)
    }
}

/// GET /api/v1/users/?page=&per_page=&search=
pub async fn list_users(
    headers: HeaderMap,
    Query(query): Query<UserListQuery>,
) -> ApiResult<UserPage> {
    require_admin(&headers)?;
    let pool = pool()?;
    let (limit, offset) = query.window();
    let pattern = search_pattern(query.search.as_deref());

    let (total,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM users
        WHERE ($1::text IS NULL OR username ILIKE $1 OR email ILIKE $1
               OR first_name ILIKE $1 OR last_name ILIKE $1)
        "#,
    )
    .bind(&pattern)
    .fetch_one(pool.as_ref())
    .await
    .map_err(db_error)?;

    let items = sqlx::query_as::<_, User>(
        r#"
        SELECT * FROM users
        WHERE ($1::text IS NULL OR username ILIKE $1 OR email ILIKE $1
               OR first_name ILIKE $1 OR last_name ILIKE $1)
        ORDER BY date_joined DESC, id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(&pattern)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool.as_ref())
    .await
    .map_err(db_error)?;

    Ok((
        StatusCode::OK,
        Json(UserPage {
            items,
            total,
            page: offset / limit + 1,
            per_page: limit,
            pages: (total + limit - 1) / limit,
        }),
    ))
}

/// POST /api/v1/users/
pub async fn create_user(
    headers: HeaderMap,
    Json(payload): Json<CreateUserRequest>,
) -> ApiResult<User> {
    let claims = require_admin(&headers)?;
    let username = required("username", &payload.username)?;
    let email = validate_email(&payload.email)?;
    validate_password(&payload.password)?;

    let pool = pool()?;
    let password_hash = hash_password(payload.password).await?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users
            (username, email, first_name, last_name, password_hash,
             is_active, is_staff, is_superuser)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(&username)
    .bind(&email)
    .bind(payload.first_name.trim())
    .bind(payload.last_name.trim())
    .bind(&password_hash)
    .bind(payload.is_active)
    .bind(payload.is_staff)
    .bind(payload.is_superuser)
    .fetch_one(pool.as_ref())
    .await
    .map_err(conflict)?;

    tracing::info!(id = user.id, username = %user.username, by = %claims.username, "User created");
    Ok((StatusCode::CREATED, Json(user)))
}

/// PUT /api/v1/users/{id}/
pub async fn update_user(
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<User> {
    let claims = require_admin(&headers)?;
    let username = payload
        .username
        .as_deref()
        .map(|v| required("username", v))
        .transpose()?;
    let email = payload.email.as_deref().map(validate_email).transpose()?;
    if let Some(password) = payload.password.as_deref() {
        validate_password(password)?;
    }
    // An admin cannot lock themself out of the back office.
    if payload.is_active == Some(false) {
        refuse_self(&claims, id, "deactivate")?;
    }

    let pool = pool()?;
    let password_hash = match payload.password {
        Some(password) => Some(hash_password(password).await?),
        None => None,
    };

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET
            username = COALESCE($2, username),
            email = COALESCE($3, email),
            first_name = COALESCE($4, first_name),
            last_name = COALESCE($5, last_name),
            password_hash = COALESCE($6, password_hash),
            is_active = COALESCE($7, is_active),
            is_staff = COALESCE($8, is_staff),
            is_superuser = COALESCE($9, is_superuser)
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(username)
    .bind(email)
    .bind(payload.first_name.as_deref().map(str::trim))
    .bind(payload.last_name.as_deref().map(str::trim))
    .bind(password_hash)
    .bind(payload.is_active)
    .bind(payload.is_staff)
    .bind(payload.is_superuser)
    .fetch_optional(pool.as_ref())
    .await
    .map_err(conflict)?
    .ok_or_else(|| not_found("User"))?;

    if !user.is_active {
        revoke_user_tokens(id).await.map_err(db_error)?;
    }

    tracing::info!(id, by = %claims.username, "User updated");
    Ok((StatusCode::OK, Json(user)))
}

/// DELETE /api/v1/users/{id}/
pub async fn delete_user(headers: HeaderMap, Path(id): Path<i64>) -> ApiResult<MessageResponse> {
    let claims = require_admin(&headers)?;
    refuse_self(&claims, id, "delete")?;
    let pool = pool()?;

    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await
        .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(not_found("User"));
    }
    // Stored tokens cascade with the row; cached ones must go too.
    revoke_user_tokens(id).await.map_err(db_error)?;

    tracing::info!(id, by = %claims.username, "User deleted");
    Ok((StatusCode::OK, Json(MessageResponse::new("User deleted successfully"))))
}

/// PUT /api/v1/users/{id}/toggle-status/
pub async fn toggle_user_status(headers: HeaderMap, Path(id): Path<i64>) -> ApiResult<User> {
    let claims = require_admin(&headers)?;
    refuse_self(&claims, id, "deactivate")?;
    let pool = pool()?;

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET is_active = NOT is_active WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(pool.as_ref())
    .await
    .map_err(db_error)?
    .ok_or_else(|| not_found("User"))?;

    if !user.is_active {
        revoke_user_tokens(id).await.map_err(db_error)?;
    }

    tracing::info!(id, is_active = user.is_active, by = %claims.username, "User status toggled");
    Ok((StatusCode::OK, Json(user)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{admin_token, send, staff_token};
    use axum::{
        routing::{get, put},
        Router,
    };
    use serde_json::json;

    fn router() -> Router {
        Router::new()
            .route("/api/v1/users/", get(list_users).post(create_user))
            .route("/api/v1/users/{id}/", put(update_user).delete(delete_user))
            .route("/api/v1/users/{id}/toggle-status/", put(toggle_user_status))
    }

    fn query(page: i64, per_page: i64) -> UserListQuery {
        UserListQuery {
            page,
            per_page,
            search: None,
        }
    }

    #[test]
    fn test_window_clamps_page_and_size() {
        assert_eq!(query(1, 20).window(), (20, 0));
        assert_eq!(query(3, 10).window(), (10, 20));
        assert_eq!(query(0, 500).window(), (100, 0));
        assert_eq!(query(-2, 0).window(), (1, 0));
    }

    #[test]
    fn test_window_survives_huge_page() {
        let (limit, offset) = query(i64::MAX, 100).window();
        assert_eq!(limit, 100);
        assert!(offset >= 0);
    }

    #[tokio::test]
    async fn test_huge_page_is_not_a_server_error() {
        let token = admin_token();
        let uri = format!("/api/v1/users/?page={}&per_page=100", i64::MAX);
        let (status, _) = send(router(), "GET", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_user_page_serializes_without_password() {
        let page = UserPage {
            items: vec![],
            total: 0,
            page: 1,
            per_page: 20,
            pages: 0,
        };
        let value = serde_json::to_value(&page).unwrap();
        assert_eq!(value["items"], json!([]));
        assert_eq!(value["pages"], 0);
    }

    #[tokio::test]
    async fn test_create_rejects_short_password() {
        let token = admin_token();
        let (status, body) = send(
            router(),
            "POST",
            "/api/v1/users/",
            Some(&token),
            Some(json!({ "username": "editor2", "email": "e2@sevp.com", "password": "short" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("password"));
    }

    #[tokio::test]
    async fn test_cannot_delete_self() {
        // admin_token() carries user id 1
        let token = admin_token();
        let (status, body) = send(router(), "DELETE", "/api/v1/users/1/", Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("own account"));
    }

    #[tokio::test]
    async fn test_cannot_toggle_self() {
        let token = admin_token();
        let (status, _) = send(
            router(),
            "PUT",
            "/api/v1/users/1/toggle-status/",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_toggle_other_without_database() {
        let token = admin_token();
        let (status, _) = send(
            router(),
            "PUT",
            "/api/v1/users/7/toggle-status/",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_staff_cannot_list_users() {
        let token = staff_token();
        let (status, _) = send(router(), "GET", "/api/v1/users/?page=2", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
