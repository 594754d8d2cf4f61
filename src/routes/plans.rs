/**
 * Service Plan Routes
 * Pricing plans shown on the public pricing page
 */
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json as SqlJson;

use crate::db::models::ServicePlan;
use crate::routes::{
    bad_request, db_error, not_found, nullable, pool, require_admin, required, slug_from,
    unique_slug, ApiError, ApiResult, MessageResponse,
};

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price_monthly: Decimal,
    pub price_yearly: Option<Decimal>,
    #[serde(default = "default_max_users")]
    pub max_users: i32,
    #[serde(default = "default_max_courses")]
    pub max_courses: i32,
    #[serde(default = "default_storage_gb")]
    pub storage_gb: i32,
    #[serde(default = "default_api_requests")]
    pub api_requests_limit: i32,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default = "default_color_primary")]
    pub color_primary: String,
    #[serde(default = "default_color_secondary")]
    pub color_secondary: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_popular: bool,
    #[serde(default)]
    pub display_order: i32,
}

fn default_max_users() -> i32 {
    1
}
fn default_max_courses() -> i32 {
    10
}
fn default_storage_gb() -> i32 {
    1
}
fn default_api_requests() -> i32 {
    1000
}
fn default_color_primary() -> String {
    "#3B82F6".to_string()
}
fn default_color_secondary() -> String {
    "#1E40AF".to_string()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdatePlanRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_monthly: Option<Decimal>,
    /// `null` clears the yearly price.
    #[serde(default, deserialize_with = "nullable")]
    pub price_yearly: Option<Option<Decimal>>,
    pub max_users: Option<i32>,
    pub max_courses: Option<i32>,
    pub storage_gb: Option<i32>,
    pub api_requests_limit: Option<i32>,
    pub features: Option<Vec<String>>,
    pub color_primary: Option<String>,
    pub color_secondary: Option<String>,
    pub is_active: Option<bool>,
    pub is_popular: Option<bool>,
    pub display_order: Option<i32>,
}

/// What a customer saves per month by paying yearly. Zero without a yearly price.
pub fn monthly_savings(price_monthly: Decimal, price_yearly: Option<Decimal>) -> Decimal {
    match price_yearly {
        Some(yearly) => (price_monthly - yearly / Decimal::from(12)).round_dp(2),
        None => Decimal::ZERO,
    }
}

/// What a customer saves over a year by paying yearly. Zero without a yearly price.
pub fn yearly_savings(price_monthly: Decimal, price_yearly: Option<Decimal>) -> Decimal {
    match price_yearly {
        Some(yearly) => (price_monthly * Decimal::from(12) - yearly).round_dp(2),
        None => Decimal::ZERO,
    }
}

/// Plan as served by both the public and admin endpoints.
#[derive(Debug, Serialize)]
pub struct PlanResponse {
    #[serde(flatten)]
    pub plan: ServicePlan,
    pub yearly_savings_amount: Decimal,
}

impl From<ServicePlan> for PlanResponse {
    fn from(plan: ServicePlan) -> Self {
        Self {
            yearly_savings_amount: yearly_savings(plan.price_monthly, plan.price_yearly),
            plan,
        }
    }
}

fn responses(plans: Vec<ServicePlan>) -> Vec<PlanResponse> {
    plans.into_iter().map(PlanResponse::from).collect()
}

fn validate_prices(monthly: Decimal, yearly: Option<Decimal>) -> Result<(), ApiError> {
    if monthly.is_sign_negative() || yearly.is_some_and(|y| y.is_sign_negative()) {
        return Err(bad_request("prices must not be negative"));
    }
    Ok(())
}

fn clean_features(features: Vec<String>) -> Vec<String> {
    features
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect()
}

fn plan_slug_base(name: &str) -> Result<String, ApiError> {
    slug_from(name).ok_or_else(|| bad_request("name must contain letters or digits"))
}

/// GET /api/v1/plans/public/
pub async fn list_public_plans() -> (StatusCode, Json<Vec<PlanResponse>>) {
    let pool = match crate::db::get_pool() {
        Some(p) => p,
        None => return (StatusCode::SERVICE_UNAVAILABLE, Json(vec![])),
    };

    match sqlx::query_as::<_, ServicePlan>(
        "SELECT * FROM service_plans WHERE is_active = true ORDER BY display_order, price_monthly",
    )
    .fetch_all(pool.as_ref())
    .await
    {
        Ok(plans) => (StatusCode::OK, Json(responses(plans))),
        Err(e) => {
            tracing::error!("Failed to list public plans: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(vec![]))
        }
    }
}

/// GET /api/v1/plans/admin/
pub async fn list_plans(headers: HeaderMap) -> ApiResult<Vec<PlanResponse>> {
    require_admin(&headers)?;
    let pool = pool()?;

    let plans = sqlx::query_as::<_, ServicePlan>(
        "SELECT * FROM service_plans ORDER BY display_order, price_monthly",
    )
    .fetch_all(pool.as_ref())
    .await
    .map_err(db_error)?;

    Ok((StatusCode::OK, Json(responses(plans))))
}

/// POST /api/v1/plans/admin/
pub async fn create_plan(
    headers: HeaderMap,
    Json(payload): Json<CreatePlanRequest>,
) -> ApiResult<PlanResponse> {
    let claims = require_admin(&headers)?;
    let name = required("name", &payload.name)?;
    let base = plan_slug_base(&name)?;
    validate_prices(payload.price_monthly, payload.price_yearly)?;
    let savings = monthly_savings(payload.price_monthly, payload.price_yearly);
    let features = clean_features(payload.features);

    let pool = pool()?;
    let slug = unique_slug(pool.as_ref(), "service_plans", &base, None).await?;

    let plan = sqlx::query_as::<_, ServicePlan>(
        r#"
        INSERT INTO service_plans
            (name, slug, description, price_monthly, price_yearly, monthly_savings,
             max_users, max_courses, storage_gb, api_requests_limit, features,
             color_primary, color_secondary, is_active, is_popular, display_order)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        RETURNING *
        "#,
    )
    .bind(&name)
    .bind(&slug)
    .bind(payload.description.trim())
    .bind(payload.price_monthly)
    .bind(payload.price_yearly)
    .bind(savings)
    .bind(payload.max_users)
    .bind(payload.max_courses)
    .bind(payload.storage_gb)
    .bind(payload.api_requests_limit)
    .bind(SqlJson(&features))
    .bind(&payload.color_primary)
    .bind(&payload.color_secondary)
    .bind(payload.is_active)
    .bind(payload.is_popular)
    .bind(payload.display_order)
    .fetch_one(pool.as_ref())
    .await
    .map_err(db_error)?;

    tracing::info!(id = plan.id, slug = %plan.slug, user = %claims.username, "Plan created");
    Ok((StatusCode::CREATED, Json(plan.into())))
}

/// PUT /api/v1/plans/admin/{id}/
/// Renaming re-derives the slug; price changes recompute the savings.
pub async fn update_plan(
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<UpdatePlanRequest>,
) -> ApiResult<PlanResponse> {
    let claims = require_admin(&headers)?;
    let name = payload
        .name
        .as_deref()
        .map(|v| required("name", v))
        .transpose()?;
    let slug_base = name.as_deref().map(plan_slug_base).transpose()?;

    let pool = pool()?;
    let mut tx = pool.begin().await.map_err(db_error)?;

    let current = sqlx::query_as::<_, ServicePlan>(
        "SELECT * FROM service_plans WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(db_error)?
    .ok_or_else(|| not_found("Plan"))?;

    let price_monthly = payload.price_monthly.unwrap_or(current.price_monthly);
    let price_yearly = payload.price_yearly.unwrap_or(current.price_yearly);
    validate_prices(price_monthly, price_yearly)?;
    let savings = monthly_savings(price_monthly, price_yearly);

    let slug = match slug_base {
        Some(base) => Some(unique_slug(pool.as_ref(), "service_plans", &base, Some(id)).await?),
        None => None,
    };
    let features = payload.features.map(clean_features);

    let plan = sqlx::query_as::<_, ServicePlan>(
        r#"
        UPDATE service_plans SET
            name = COALESCE($2, name),
            slug = COALESCE($3, slug),
            description = COALESCE($4, description),
            price_monthly = $5,
            price_yearly = $6,
            monthly_savings = $7,
            max_users = COALESCE($8, max_users),
            max_courses = COALESCE($9, max_courses),
            storage_gb = COALESCE($10, storage_gb),
            api_requests_limit = COALESCE($11, api_requests_limit),
            features = COALESCE($12, features),
            color_primary = COALESCE($13, color_primary),
            color_secondary = COALESCE($14, color_secondary),
            is_active = COALESCE($15, is_active),
            is_popular = COALESCE($16, is_popular),
            display_order = COALESCE($17, display_order),
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(slug)
    .bind(payload.description)
    .bind(price_monthly)
    .bind(price_yearly)
    .bind(savings)
    .bind(payload.max_users)
    .bind(payload.max_courses)
    .bind(payload.storage_gb)
    .bind(payload.api_requests_limit)
    .bind(features.map(SqlJson))
    .bind(payload.color_primary)
    .bind(payload.color_secondary)
    .bind(payload.is_active)
    .bind(payload.is_popular)
    .bind(payload.display_order)
    .fetch_one(&mut *tx)
    .await
    .map_err(db_error)?;

    tx.commit().await.map_err(db_error)?;

    tracing::info!(id, slug = %plan.slug, user = %claims.username, "Plan updated");
    Ok((StatusCode::OK, Json(plan.into())))
}

/// DELETE /api/v1/plans/admin/{id}/
pub async fn delete_plan(headers: HeaderMap, Path(id): Path<i64>) -> ApiResult<MessageResponse> {
    let claims = require_admin(&headers)?;
    let pool = pool()?;

    let result = sqlx::query("DELETE FROM service_plans WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await
        .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(not_found("Plan"));
    }

    tracing::info!(id, user = %claims.username, "Plan deleted");
    Ok((StatusCode::OK, Json(MessageResponse::new("Plan deleted successfully"))))
}
