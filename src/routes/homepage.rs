/**
 * Homepage Summary Route
 * Featured news, featured testimonials and headline stats in one call
 */
use axum::{http::StatusCode, Json};
use sqlx::PgPool;

use crate::content::defaults::{HomepageStats, HomepageSummary};
use crate::db::{
    self,
    models::{NewsArticle, Testimonial},
};
use crate::routes::news::PublicArticle;

const FEATURED_ARTICLES: i64 = 3;
const FEATURED_TESTIMONIALS: i64 = 6;

async fn load_summary(pool: &PgPool) -> Result<HomepageSummary, sqlx::Error> {
    let articles = sqlx::query_as::<_, NewsArticle>(
        r#"
        SELECT * FROM news_articles
        WHERE status = 'published' AND featured = true
        ORDER BY published_at DESC NULLS LAST
        LIMIT $1
        "#,
    )
    .bind(FEATURED_ARTICLES)
    .fetch_all(pool)
    .await?;

    let testimonials = sqlx::query_as::<_, Testimonial>(
        r#"
        SELECT * FROM testimonials
        WHERE is_active = true AND is_featured = true
        ORDER BY display_order, created_at DESC
        LIMIT $1
        "#,
    )
    .bind(FEATURED_TESTIMONIALS)
    .fetch_all(pool)
    .await?;

    let (total_clients, total_projects, total_testimonials): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(DISTINCT LOWER(client_company)) FROM testimonials
                WHERE is_active = true AND client_company <> ''),
            (SELECT COUNT(*) FROM news_articles WHERE status = 'published'),
            (SELECT COUNT(*) FROM testimonials WHERE is_active = true)
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(HomepageSummary {
        featured_articles: articles
            .into_iter()
            .map(PublicArticle::from)
            .filter_map(|a| serde_json::to_value(a).ok())
            .collect(),
        featured_testimonials: testimonials
            .into_iter()
            .filter_map(|t| serde_json::to_value(t).ok())
            .collect(),
        stats: HomepageStats {
            total_clients,
            total_projects,
            total_testimonials,
        },
    })
}

/// GET /api/public/homepage/
/// Always 200; any failure yields the empty summary.
pub async fn get_homepage_summary() -> (StatusCode, Json<HomepageSummary>) {
    let Some(pool) = db::get_pool() else {
        tracing::debug!("No database, serving fallback homepage summary");
        return (StatusCode::OK, Json(HomepageSummary::fallback()));
    };

    match load_summary(pool.as_ref()).await {
        Ok(summary) => (StatusCode::OK, Json(summary)),
        Err(e) => {
            tracing::error!("Failed to build homepage summary: {}", e);
            (StatusCode::OK, Json(HomepageSummary::fallback()))
        }
    }
}
