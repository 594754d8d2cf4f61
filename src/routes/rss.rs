/**
 * RSS Feed
 * RSS 2.0 feed of published news articles
 */
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};

use crate::db;

const FEED_LIMIT: i64 = 50;

pub struct SiteInfo {
    pub url: String,
    pub title: String,
    pub description: String,
}

impl SiteInfo {
    pub fn from_env() -> Self {
        let url = std::env::var("SITE_URL").unwrap_or_else(|_| "https://sevp.com".to_string());
        Self {
            url: url.trim_end_matches('/').to_string(),
            title: std::env::var("SITE_TITLE").unwrap_or_else(|_| "SEVP".to_string()),
            description: std::env::var("SITE_DESCRIPTION")
                .unwrap_or_else(|_| "Noticias de SEVP".to_string()),
        }
    }
}

pub struct FeedItem {
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub published_at: DateTime<Utc>,
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn rfc822(dt: &DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S +0000").to_string()
}

/// Render the channel; `items` are expected newest first.
pub fn render_feed(site: &SiteInfo, items: &[FeedItem]) -> String {
    let mut rendered = String::new();
    for item in items {
        let link = format!("{}/noticias/{}", site.url, item.slug);
        rendered.push_str(&format!(
            "    <item>\n\
                   <title>{}</title>\n\
                   <link>{}</link>\n\
                   <description>{}</description>\n\
                   <pubDate>{}</pubDate>\n\
                   <guid isPermaLink=\"true\">{}</guid>\n\
                 </item>\n",
            escape_xml(&item.title),
            escape_xml(&link),
            escape_xml(&item.excerpt),
            rfc822(&item.published_at),
            escape_xml(&link),
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>{}</title>
    <link>{}</link>
    <description>{}</description>
    <language>es-pe</language>
    <atom:link href="{}" rel="self" type="application/rss+xml"/>
    <lastBuildDate>{}</lastBuildDate>
{}  </channel>
</rss>"#,
        escape_xml(&site.title),
        escape_xml(&format!("{}/noticias", site.url)),
        escape_xml(&site.description),
        escape_xml(&format!("{}/rss.xml", site.url)),
        items
            .first()
            .map(|item| rfc822(&item.published_at))
            .unwrap_or_default(),
        rendered,
    )
}

/// GET /rss.xml
pub async fn rss_feed() -> Response {
    let Some(pool) = db::get_pool() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "Service unavailable",
        )
            .into_response();
    };

    let rows: Vec<(String, String, String, Option<DateTime<Utc>>, DateTime<Utc>)> =
        match sqlx::query_as(
            r#"
            SELECT title, slug, excerpt, published_at, created_at
            FROM news_articles
            WHERE status = 'published'
            ORDER BY COALESCE(published_at, created_at) DESC
            LIMIT $1
            "#,
        )
        .bind(FEED_LIMIT)
        .fetch_all(pool.as_ref())
        .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!("Failed to load RSS items: {}", e);
                Vec::new()
            }
        };

    let items: Vec<FeedItem> = rows
        .into_iter()
        .map(|(title, slug, excerpt, published_at, created_at)| FeedItem {
            title,
            slug,
            excerpt,
            published_at: published_at.unwrap_or(created_at),
        })
        .collect();

    let xml = render_feed(&SiteInfo::from_env(), &items);
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/rss+xml; charset=utf-8"),
            (
                header::CACHE_CONTROL,
                "public, max-age=3600, stale-while-revalidate=600",
            ),
        ],
        xml,
    )
        .into_response()
}
