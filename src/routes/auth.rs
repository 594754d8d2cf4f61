/**
 * Authentication Routes
 * JWT-based authentication with login, verify, refresh, logout and me
 */
use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::db::{self, models::User};
use crate::routes::{extract_bearer_token, require_auth, ApiError};

// ============================================================================
// Configuration
// ============================================================================

pub const DEFAULT_JWT_SECRET: &str = "default-jwt-secret-change-in-production";

lazy_static::lazy_static! {
    /// JWT secret key from environment
    pub static ref JWT_SECRET: String = std::env::var("JWT_SECRET")
        .unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string());

    /// Access token lifetime, ACCESS_TOKEN_EXPIRE_MINUTES (default 30)
    pub static ref ACCESS_TOKEN_EXPIRY_MINUTES: i64 = std::env::var("ACCESS_TOKEN_EXPIRE_MINUTES")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|m| *m > 0)
        .unwrap_or(30);

    /// Username accepted when running without a database
    pub static ref ADMIN_USERNAME: String = std::env::var("ADMIN_USERNAME")
        .unwrap_or_else(|_| "admin".to_string());

    pub static ref ADMIN_EMAIL: String = std::env::var("ADMIN_EMAIL")
        .unwrap_or_else(|_| "admin@sevp.com".to_string());

    /// Admin password hash from environment (or plain password to hash)
    pub static ref ADMIN_PASSWORD_HASH: String = {
        if let Ok(hash) = std::env::var("ADMIN_HASH_PASSWORD") {
            hash
        } else if let Ok(plain) = std::env::var("ADMIN_PASSWORD") {
            hash(&plain, DEFAULT_COST).unwrap_or_default()
        } else {
            hash("admin123", DEFAULT_COST).unwrap_or_default()
        }
    };

    /// Refresh token cache keyed by token hash
    pub static ref REFRESH_TOKENS: Arc<RwLock<HashMap<String, RefreshTokenData>>> =
        Arc::new(RwLock::new(HashMap::new()));

    /// Login attempts per IP: (window start, attempts in window)
    pub static ref RATE_LIMIT: Arc<RwLock<HashMap<String, (i64, u32)>>> =
        Arc::new(RwLock::new(HashMap::new()));
}

/// Refresh token expiry in days
const REFRESH_TOKEN_EXPIRY_DAYS: i64 = 7;

/// Login attempts allowed per IP inside one window
#[allow(dead_code)]
const RATE_LIMIT_MAX_ATTEMPTS: u32 = 5;

#[allow(dead_code)]
const RATE_LIMIT_WINDOW_SECS: i64 = 60;

/// Failed passwords before an account is locked
const MAX_LOGIN_ATTEMPTS: i32 = 5;

const LOCKOUT_MINUTES: i32 = 15;

// ============================================================================
// Types
// ============================================================================

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // User ID
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to sign access token: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("failed to store refresh token: {0}")]
    Store(#[from] sqlx::Error),
}

/// Cached refresh token data
#[derive(Debug, Clone)]
pub struct RefreshTokenData {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub expires_at: i64,
    pub revoked: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
}

impl From<&Claims> for UserInfo {
    fn from(claims: &Claims) -> Self {
        Self {
            id: claims.user_id().unwrap_or_default(),
            username: claims.username.clone(),
            email: claims.email.clone(),
            is_admin: claims.is_admin,
        }
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// `username` may also be the account email.
#[derive(Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoginResponse {
    fn failure(error: &str) -> Json<Self> {
        Json(Self {
            success: false,
            error: Some(error.to_string()),
            ..Default::default()
        })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub is_valid: bool,
    pub user: Option<UserInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct RefreshResponse {
    pub success: bool,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct LogoutRequest {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
    pub message: String,
}

// ============================================================================
// Helper Functions
// ============================================================================

fn generate_refresh_token() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 64)
}

/// SHA-256 of a refresh token; only the hash is stored.
fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn create_access_token(
    user_id: i64,
    username: &str,
    email: &str,
    is_admin: bool,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::minutes(*ACCESS_TOKEN_EXPIRY_MINUTES);

    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_string(),
        email: email.to_string(),
        is_admin,
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
}

pub fn verify_access_token(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(JWT_SECRET.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// bcrypt-hash a password off the async executor.
pub async fn hash_password(password: String) -> Result<String, ApiError> {
    match tokio::task::spawn_blocking(move || hash(&password, DEFAULT_COST)).await {
        Ok(Ok(h)) => Ok(h),
        Ok(Err(e)) => {
            tracing::error!("Failed to hash password: {}", e);
            Err(crate::routes::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process password",
            ))
        }
        Err(e) => {
            tracing::error!("spawn_blocking panic during hash: {}", e);
            Err(crate::routes::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process password",
            ))
        }
    }
}

async fn verify_password(password: String, password_hash: String) -> bool {
    tokio::task::spawn_blocking(move || verify(&password, &password_hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}

/// Sliding fixed-window limiter for login attempts per IP.
async fn check_rate_limit(ip: &str) -> bool {
    #[cfg(test)]
    {
        let _ = ip;
        return true;
    }

    #[cfg(not(test))]
    {
        let now = Utc::now().timestamp();
        let mut limits = RATE_LIMIT.write().await;

        limits.retain(|_, (start, _)| now - *start < RATE_LIMIT_WINDOW_SECS);

        let entry = limits.entry(ip.to_string()).or_insert((now, 0));
        if entry.1 >= RATE_LIMIT_MAX_ATTEMPTS {
            return false;
        }
        entry.1 += 1;
        true
    }
}

async fn cached_refresh_token(token_hash: &str) -> Option<RefreshTokenData> {
    REFRESH_TOKENS.read().await.get(token_hash).cloned()
}

/// Refresh token behind `token_hash`. With a database the stored row is the
/// only authority; the cache answers only when running without one.
async fn lookup_refresh_token(token_hash: &str) -> Result<Option<RefreshTokenData>, sqlx::Error> {
    let Some(pool) = db::get_pool() else {
        return Ok(cached_refresh_token(token_hash).await);
    };

    let row = sqlx::query_as::<_, (i64, String, String, bool, bool, chrono::DateTime<Utc>, bool)>(
        r#"SELECT u.id, u.username, u.email, (u.is_staff OR u.is_superuser), u.is_active,
                  rt.expires_at, rt.revoked
           FROM refresh_tokens rt
           JOIN users u ON u.id = rt.user_id
           WHERE rt.token_hash = $1"#,
    )
    .bind(token_hash)
    .fetch_optional(pool.as_ref())
    .await?;

    Ok(row.map(
        |(user_id, username, email, is_admin, is_active, expires_at, revoked)| RefreshTokenData {
            user_id,
            username,
            email,
            is_admin,
            expires_at: expires_at.timestamp(),
            revoked: revoked || !is_active,
        },
    ))
}

/// Mark every cached refresh token of `user_id` revoked.
async fn revoke_cached_tokens(user_id: i64) {
    let mut tokens = REFRESH_TOKENS.write().await;
    for data in tokens.values_mut() {
        if data.user_id == user_id {
            data.revoked = true;
        }
    }
}

/// Revoke every refresh token of `user_id`, stored and cached.
pub async fn revoke_user_tokens(user_id: i64) -> Result<(), sqlx::Error> {
    revoke_cached_tokens(user_id).await;
    if let Some(pool) = db::get_pool() {
        sqlx::query("UPDATE refresh_tokens SET revoked = true WHERE user_id = $1")
            .bind(user_id)
            .execute(pool.as_ref())
            .await?;
    }
    Ok(())
}

/// Issue an access/refresh pair. The refresh token is stored before it is
/// handed out; a token that cannot be stored is never issued.
async fn issue_tokens(user: &UserInfo) -> Result<(String, String), TokenError> {
    let access_token = create_access_token(user.id, &user.username, &user.email, user.is_admin)?;

    let refresh_token = generate_refresh_token();
    let refresh_token_hash = hash_refresh_token(&refresh_token);
    let expires_at = Utc::now() + Duration::days(REFRESH_TOKEN_EXPIRY_DAYS);

    if let Some(pool) = db::get_pool() {
        sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token_hash, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(user.id)
        .bind(&refresh_token_hash)
        .bind(expires_at)
        .execute(pool.as_ref())
        .await?;
    }

    let now = Utc::now().timestamp();
    let mut tokens = REFRESH_TOKENS.write().await;
    tokens.retain(|_, data| !data.revoked && data.expires_at > now);
    tokens.insert(
        refresh_token_hash,
        RefreshTokenData {
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            is_admin: user.is_admin,
            expires_at: expires_at.timestamp(),
            revoked: false,
        },
    );

    Ok((access_token, refresh_token))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/auth/login/
pub async fn login(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<LoginRequest>,
) -> impl IntoResponse {
    let ip = addr.ip().to_string();

    if !check_rate_limit(&ip).await {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            LoginResponse::failure("Too many requests. Please try again later."),
        );
    }

    let identifier = payload.username.trim().to_string();
    if identifier.is_empty() || payload.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            LoginResponse::failure("Username and password are required"),
        );
    }

    // Database users first; env-var credentials only when running without one.
    let user: UserInfo = match db::get_pool() {
        Some(pool) => {
            let row = sqlx::query_as::<_, User>(
                r#"SELECT * FROM users
                   WHERE LOWER(username) = LOWER($1) OR LOWER(email) = LOWER($1)
                   ORDER BY (LOWER(username) = LOWER($1)) DESC
                   LIMIT 1"#,
            )
            .bind(&identifier)
            .fetch_optional(pool.as_ref())
            .await;

            match row {
                Ok(Some(user)) => {
                    if user.is_locked(Utc::now()) {
                        tracing::warn!(username = %user.username, "Login attempt on locked account");
                        return (
                            StatusCode::UNAUTHORIZED,
                            LoginResponse::failure(
                                "Account is temporarily locked. Try again later.",
                            ),
                        );
                    }

                    if !user.is_active {
                        return (
                            StatusCode::FORBIDDEN,
                            LoginResponse::failure("Account is disabled."),
                        );
                    }

                    if !verify_password(payload.password.clone(), user.password_hash.clone()).await
                    {
                        let _ = sqlx::query(
                            r#"UPDATE users
                               SET login_attempts = login_attempts + 1,
                                   locked_until = CASE WHEN login_attempts + 1 >= $2
                                       THEN now() + make_interval(mins => $3)
                                       ELSE locked_until END
                               WHERE id = $1"#,
                        )
                        .bind(user.id)
                        .bind(MAX_LOGIN_ATTEMPTS)
                        .bind(LOCKOUT_MINUTES)
                        .execute(pool.as_ref())
                        .await;
                        tracing::warn!(username = %user.username, "Failed login attempt");
                        return (
                            StatusCode::UNAUTHORIZED,
                            LoginResponse::failure("Incorrect username or password"),
                        );
                    }

                    let _ = sqlx::query(
                        r#"UPDATE users
                           SET last_login = now(), last_login_ip = $1,
                               login_attempts = 0, locked_until = NULL
                           WHERE id = $2"#,
                    )
                    .bind(&ip)
                    .bind(user.id)
                    .execute(pool.as_ref())
                    .await;

                    UserInfo {
                        id: user.id,
                        is_admin: user.is_admin(),
                        username: user.username,
                        email: user.email,
                    }
                }
                Ok(None) => {
                    tracing::warn!("Login attempt for unknown user: {}", identifier);
                    return (
                        StatusCode::UNAUTHORIZED,
                        LoginResponse::failure("Incorrect username or password"),
                    );
                }
                Err(e) => {
                    tracing::error!("Database error during login: {}", e);
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        LoginResponse::failure("Authentication service temporarily unavailable."),
                    );
                }
            }
        }
        None => {
            let name_matches = identifier.eq_ignore_ascii_case(&ADMIN_USERNAME)
                || identifier.eq_ignore_ascii_case(&ADMIN_EMAIL);
            let password_ok =
                verify_password(payload.password.clone(), ADMIN_PASSWORD_HASH.clone()).await;
            if !name_matches || !password_ok {
                return (
                    StatusCode::UNAUTHORIZED,
                    LoginResponse::failure("Incorrect username or password"),
                );
            }
            UserInfo {
                id: 0,
                username: ADMIN_USERNAME.clone(),
                email: ADMIN_EMAIL.clone(),
                is_admin: true,
            }
        }
    };

    let (access_token, refresh_token) = match issue_tokens(&user).await {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!("Failed to issue tokens: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                LoginResponse::failure("Failed to create token"),
            );
        }
    };

    tracing::info!(username = %user.username, "Successful login");

    (
        StatusCode::OK,
        Json(LoginResponse {
            success: true,
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            token_type: Some("bearer".to_string()),
            expires_in: Some(*ACCESS_TOKEN_EXPIRY_MINUTES * 60),
            user: Some(user),
            error: None,
        }),
    )
}

/// POST /api/v1/auth/verify/
pub async fn verify_token(headers: HeaderMap) -> impl IntoResponse {
    let Some(token) = extract_bearer_token(&headers) else {
        return (
            StatusCode::OK,
            Json(VerifyResponse {
                success: false,
                is_valid: false,
                user: None,
                error: Some("No authorization token provided".to_string()),
            }),
        );
    };

    match verify_access_token(token) {
        Ok(claims) => (
            StatusCode::OK,
            Json(VerifyResponse {
                success: true,
                is_valid: true,
                user: Some(UserInfo::from(&claims)),
                error: None,
            }),
        ),
        Err(e) => {
            tracing::debug!("Token verification failed: {}", e);
            (
                StatusCode::OK,
                Json(VerifyResponse {
                    success: false,
                    is_valid: false,
                    user: None,
                    error: Some("Invalid or expired token".to_string()),
                }),
            )
        }
    }
}

/// POST /api/v1/auth/refresh/
/// Rotates the refresh token: the presented one is revoked.
pub async fn refresh(Json(payload): Json<RefreshRequest>) -> impl IntoResponse {
    if payload.refresh_token.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(RefreshResponse {
                error: Some("Refresh token is required".to_string()),
                ..Default::default()
            }),
        );
    }

    let token_hash = hash_refresh_token(&payload.refresh_token);
    let now = Utc::now();

    let token_data = match lookup_refresh_token(&token_hash).await {
        Ok(data) => data,
        Err(e) => {
            tracing::error!("DB error during token refresh lookup: {}", e);
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(RefreshResponse {
                    error: Some("Authentication service temporarily unavailable.".to_string()),
                    ..Default::default()
                }),
            );
        }
    };

    let data = match token_data {
        Some(data) if !data.revoked && data.expires_at > now.timestamp() => data,
        _ => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(RefreshResponse {
                    error: Some("Invalid or expired refresh token".to_string()),
                    ..Default::default()
                }),
            )
        }
    };

    // Claim the presented token; a concurrent refresh with it loses.
    if let Some(pool) = db::get_pool() {
        let claimed = sqlx::query(
            "UPDATE refresh_tokens SET revoked = true WHERE token_hash = $1 AND revoked = false",
        )
        .bind(&token_hash)
        .execute(pool.as_ref())
        .await
        .map(|result| result.rows_affected() == 1);
        if !matches!(claimed, Ok(true)) {
            if let Err(e) = claimed {
                tracing::error!("Failed to revoke refresh token: {}", e);
            }
            return (
                StatusCode::UNAUTHORIZED,
                Json(RefreshResponse {
                    error: Some("Invalid or expired refresh token".to_string()),
                    ..Default::default()
                }),
            );
        }
    }
    if let Some(old) = REFRESH_TOKENS.write().await.get_mut(&token_hash) {
        old.revoked = true;
    }

    let user = UserInfo {
        id: data.user_id,
        username: data.username,
        email: data.email,
        is_admin: data.is_admin,
    };
    match issue_tokens(&user).await {
        Ok((access_token, refresh_token)) => (
            StatusCode::OK,
            Json(RefreshResponse {
                success: true,
                access_token: Some(access_token),
                refresh_token: Some(refresh_token),
                error: None,
            }),
        ),
        Err(e) => {
            tracing::error!("Failed to issue tokens: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(RefreshResponse {
                    error: Some("Failed to create token".to_string()),
                    ..Default::default()
                }),
            )
        }
    }
}

/// POST /api/v1/auth/logout/
/// Revokes the given refresh token, and every token of the bearer's user.
/// An empty body is accepted.
pub async fn logout(headers: HeaderMap, body: Option<Json<LogoutRequest>>) -> impl IntoResponse {
    let payload = body.map(|Json(p)| p).unwrap_or_default();
    let pool = db::get_pool();

    if let Some(refresh_token) = payload.refresh_token {
        let token_hash = hash_refresh_token(&refresh_token);

        if let Some(ref p) = pool {
            let _ = sqlx::query("UPDATE refresh_tokens SET revoked = true WHERE token_hash = $1")
                .bind(&token_hash)
                .execute(p.as_ref())
                .await;
        }

        if let Some(data) = REFRESH_TOKENS.write().await.get_mut(&token_hash) {
            data.revoked = true;
        }
    }

    let access_token = payload
        .access_token
        .or_else(|| extract_bearer_token(&headers).map(str::to_string));
    if let Some(claims) = access_token.and_then(|t| verify_access_token(&t).ok()) {
        if let Some(user_id) = claims.user_id() {
            if let Err(e) = revoke_user_tokens(user_id).await {
                tracing::error!("Failed to revoke tokens on logout: {}", e);
            }
        }
        tracing::info!(username = %claims.username, "User logged out");
    }

    (
        StatusCode::OK,
        Json(LogoutResponse {
            success: true,
            message: "Successfully logged out".to_string(),
        }),
    )
}

/// GET /api/v1/auth/me/
/// Full profile when the user row is reachable, token identity otherwise.
pub async fn me(headers: HeaderMap) -> Result<Response, ApiError> {
    let claims = require_auth(&headers)?;

    if let (Some(pool), Some(user_id)) = (db::get_pool(), claims.user_id()) {
        match sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(pool.as_ref())
            .await
        {
            Ok(Some(user)) => return Ok((StatusCode::OK, Json(user)).into_response()),
            Ok(None) => {
                return Err(crate::routes::error(
                    StatusCode::UNAUTHORIZED,
                    "User no longer exists",
                ))
            }
            Err(e) => return Err(crate::routes::db_error(e)),
        }
    }

    Ok((StatusCode::OK, Json(UserInfo::from(&claims))).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, post};
    use axum::Router;
    use tower::ServiceExt;

    fn auth_router() -> Router {
        use axum::extract::connect_info::MockConnectInfo;
        Router::new()
            .route("/api/v1/auth/login/", post(login))
            .route("/api/v1/auth/verify/", post(verify_token))
            .route("/api/v1/auth/refresh/", post(refresh))
            .route("/api/v1/auth/logout/", post(logout))
            .route("/api/v1/auth/me/", get(me))
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 12345))))
    }

    async fn post_json(
        app: Router,
        uri: &str,
        json: &impl serde::Serialize,
    ) -> (StatusCode, axum::body::Bytes) {
        let body = Body::from(serde_json::to_vec(json).unwrap());
        let req = Request::post(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes)
    }

    async fn request(
        app: Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
    ) -> (StatusCode, axum::body::Bytes) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header("authorization", format!("Bearer {}", token));
        }
        let res = app.oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes)
    }

    #[test]
    fn test_verify_access_token_invalid_returns_err() {
        assert!(verify_access_token("invalid.jwt.token").is_err());
    }

    #[test]
    fn test_access_token_round_trip_carries_admin_flag() {
        let token = create_access_token(42, "editor", "editor@sevp.com", false).unwrap();
        let claims = verify_access_token(&token).unwrap();
        assert_eq!(claims.user_id(), Some(42));
        assert_eq!(claims.username, "editor");
        assert!(!claims.is_admin);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_refresh_token_hash_is_stable_hex() {
        let hashed = hash_refresh_token("abc");
        assert_eq!(hashed.len(), 64);
        assert_eq!(hashed, hash_refresh_token("abc"));
        assert_ne!(hashed, hash_refresh_token("abd"));
        assert_eq!(generate_refresh_token().len(), 64);
    }

    #[tokio::test]
    async fn test_login_empty_username_returns_bad_request() {
        let (status, _) = post_json(
            auth_router(),
            "/api/v1/auth/login/",
            &LoginRequest {
                username: "  ".to_string(),
                password: "admin123".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_wrong_credentials_returns_unauthorized() {
        let (status, bytes) = post_json(
            auth_router(),
            "/api/v1/auth/login/",
            &LoginRequest {
                username: "admin".to_string(),
                password: "wrongpassword".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let body: LoginResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(!body.success);
        assert!(body.access_token.is_none());
    }

    #[tokio::test]
    async fn test_verify_no_token_returns_error_in_body() {
        let (status, bytes) = request(auth_router(), "POST", "/api/v1/auth/verify/", None).await;
        assert_eq!(status, StatusCode::OK);
        let body: VerifyResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(!body.success);
        assert!(!body.is_valid);
    }

    #[tokio::test]
    async fn test_verify_valid_token_returns_user() {
        let token = create_access_token(7, "admin", "admin@sevp.com", true).unwrap();
        let (status, bytes) =
            request(auth_router(), "POST", "/api/v1/auth/verify/", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        let body: VerifyResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(body.is_valid);
        assert_eq!(body.user.unwrap().id, 7);
    }

    #[tokio::test]
    async fn test_refresh_empty_token_returns_bad_request() {
        let (status, _) = post_json(
            auth_router(),
            "/api/v1/auth/refresh/",
            &RefreshRequest {
                refresh_token: "".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_revokes_old_token() {
        let user = UserInfo {
            id: 9,
            username: "rotator".to_string(),
            email: "rotator@sevp.com".to_string(),
            is_admin: true,
        };
        let (_, first) = issue_tokens(&user).await.unwrap();

        let (status, bytes) = post_json(
            auth_router(),
            "/api/v1/auth/refresh/",
            &RefreshRequest {
                refresh_token: first.clone(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body: RefreshResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(body.success);
        assert_ne!(body.refresh_token.as_deref(), Some(first.as_str()));

        let (status, _) = post_json(
            auth_router(),
            "/api/v1/auth/refresh/",
            &RefreshRequest {
                refresh_token: first,
            },
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_revoked_user_cannot_refresh() {
        let user = UserInfo {
            id: 41,
            username: "removed".to_string(),
            email: "removed@sevp.com".to_string(),
            is_admin: true,
        };
        let (_, token) = issue_tokens(&user).await.unwrap();

        revoke_user_tokens(41).await.unwrap();

        let (status, bytes) = post_json(
            auth_router(),
            "/api/v1/auth/refresh/",
            &RefreshRequest {
                refresh_token: token,
            },
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let body: RefreshResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(body.access_token.is_none());
    }

    #[tokio::test]
    async fn test_issue_tokens_prunes_dead_cache_entries() {
        let now = Utc::now().timestamp();
        {
            let mut tokens = REFRESH_TOKENS.write().await;
            for (key, expires_at, revoked) in [
                ("stale-expired", now - 10, false),
                ("stale-revoked", now + 3600, true),
            ] {
                tokens.insert(
                    key.to_string(),
                    RefreshTokenData {
                        user_id: 77,
                        username: "stale".to_string(),
                        email: "stale@sevp.com".to_string(),
                        is_admin: false,
                        expires_at,
                        revoked,
                    },
                );
            }
        }

        let user = UserInfo {
            id: 78,
            username: "fresh".to_string(),
            email: "fresh@sevp.com".to_string(),
            is_admin: false,
        };
        let (_, token) = issue_tokens(&user).await.unwrap();

        let tokens = REFRESH_TOKENS.read().await;
        assert!(!tokens.contains_key("stale-expired"));
        assert!(!tokens.contains_key("stale-revoked"));
        assert!(tokens.contains_key(&hash_refresh_token(&token)));
    }

    #[tokio::test]
    async fn test_logout_returns_success() {
        let (status, bytes) = post_json(
            auth_router(),
            "/api/v1/auth/logout/",
            &LogoutRequest::default(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body: LogoutResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(body.success);
    }

    #[tokio::test]
    async fn test_me_requires_token_and_echoes_claims() {
        let (status, _) = request(auth_router(), "GET", "/api/v1/auth/me/", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let token = create_access_token(3, "editor", "editor@sevp.com", false).unwrap();
        let (status, bytes) =
            request(auth_router(), "GET", "/api/v1/auth/me/", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        let user: UserInfo = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(user.username, "editor");
        assert!(!user.is_admin);
    }
}
