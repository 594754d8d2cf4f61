//! SEVP Backend - content API and admin back office for the SEVP website

pub mod content;
pub mod db;
pub mod logging;
pub mod media;
pub mod routes;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
};

/// Global request body cap; fits a 10 MiB library upload plus multipart framing.
pub const BODY_LIMIT_BYTES: usize = 12 * 1024 * 1024;

fn default_origins() -> Vec<HeaderValue> {
    vec![
        HeaderValue::from_static("http://localhost:3001"),
        HeaderValue::from_static("http://127.0.0.1:3001"),
    ]
}

/// Allowed origins from ALLOWED_ORIGINS (comma-separated) or FRONTEND_ORIGIN.
pub fn allowed_origins(
    allowed: Option<&str>,
    frontend: Option<&str>,
) -> Vec<HeaderValue> {
    allowed
        .and_then(|s| {
            let origins: Vec<HeaderValue> = s
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .filter_map(|origin| origin.parse().ok())
                .collect();
            if origins.is_empty() {
                None
            } else {
                Some(origins)
            }
        })
        .or_else(|| {
            frontend
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .and_then(|origin| origin.parse().ok())
                .map(|origin| vec![origin])
        })
        .unwrap_or_else(default_origins)
}

/// Configure CORS from environment variables.
pub fn configure_cors() -> CorsLayer {
    let origins = allowed_origins(
        std::env::var("ALLOWED_ORIGINS").ok().as_deref(),
        std::env::var("FRONTEND_ORIGIN").ok().as_deref(),
    );

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
}

fn api_routes() -> Router {
    use routes::{
        auth, company, contact, faqs, health, homepage, media, media_library, news, page_content,
        plans, rss, testimonials, users,
    };

    Router::new()
        // Auth
        .route("/api/v1/auth/login/", post(auth::login))
        .route("/api/v1/auth/refresh/", post(auth::refresh))
        .route("/api/v1/auth/verify/", post(auth::verify_token))
        .route("/api/v1/auth/logout/", post(auth::logout))
        .route("/api/v1/auth/me/", get(auth::me))
        // Homepage + page content
        .route("/api/public/homepage/", get(homepage::get_homepage_summary))
        .route(
            "/api/v1/page-content/public/{key}/",
            get(page_content::get_public_page),
        )
        .route(
            "/api/v1/page-content/admin/",
            get(page_content::list_pages).post(page_content::create_page),
        )
        .route(
            "/api/v1/page-content/admin/{key}/",
            get(page_content::get_page)
                .put(page_content::update_page)
                .delete(page_content::delete_page),
        )
        .route(
            "/api/v1/page-content/admin/{key}/sections/{section}/",
            put(page_content::update_section),
        )
        // Contact
        .route("/api/v1/contact/public/", post(contact::submit_message))
        .route("/api/v1/contact/admin/", get(contact::list_messages))
        .route("/api/v1/contact/admin/stats/", get(contact::message_stats))
        .route(
            "/api/v1/contact/admin/{id}/",
            get(contact::get_message)
                .put(contact::update_message)
                .delete(contact::delete_message),
        )
        // Testimonials
        .route(
            "/api/v1/testimonials/public/",
            get(testimonials::list_public_testimonials),
        )
        .route(
            "/api/v1/testimonials/admin/",
            get(testimonials::list_testimonials).post(testimonials::create_testimonial),
        )
        .route(
            "/api/v1/testimonials/admin/{id}/",
            get(testimonials::get_testimonial)
                .put(testimonials::update_testimonial)
                .delete(testimonials::delete_testimonial),
        )
        // FAQs
        .route("/api/v1/faqs/public/", get(faqs::list_public_faqs))
        .route("/api/v1/faqs/public/{id}/view/", post(faqs::record_view))
        .route("/api/v1/faqs/public/{id}/helpful/", post(faqs::vote_helpful))
        .route(
            "/api/v1/faqs/admin/",
            get(faqs::list_faqs).post(faqs::create_faq),
        )
        .route(
            "/api/v1/faqs/admin/{id}/",
            get(faqs::get_faq)
                .put(faqs::update_faq)
                .delete(faqs::delete_faq),
        )
        // News
        .route("/api/v1/news/public/", get(news::list_public_news))
        .route("/api/v1/news/public/{slug}/", get(news::get_public_article))
        .route(
            "/api/v1/news/admin/",
            get(news::list_news).post(news::create_news),
        )
        .route(
            "/api/v1/news/admin/{id}/",
            get(news::get_news)
                .put(news::update_news)
                .delete(news::delete_news),
        )
        // Plans
        .route("/api/v1/plans/public/", get(plans::list_public_plans))
        .route(
            "/api/v1/plans/admin/",
            get(plans::list_plans).post(plans::create_plan),
        )
        .route(
            "/api/v1/plans/admin/{id}/",
            put(plans::update_plan).delete(plans::delete_plan),
        )
        // Users
        .route(
            "/api/v1/users/",
            get(users::list_users).post(users::create_user),
        )
        .route(
            "/api/v1/users/{id}/",
            put(users::update_user).delete(users::delete_user),
        )
        .route(
            "/api/v1/users/{id}/toggle-status/",
            put(users::toggle_user_status),
        )
        // Company
        .route("/api/v1/company/public/", get(company::get_company_info))
        .route("/api/v1/company/admin/", put(company::update_company_info))
        // Media
        .route("/api/v1/media/resize/", post(media::resize_image))
        .route("/api/v1/media/", get(media_library::list_media))
        .route("/api/v1/media/upload/", post(media_library::upload_media))
        .route("/api/v1/media/url/", post(media_library::create_url_media))
        .route(
            "/api/v1/media/categories/",
            get(media_library::list_categories).post(media_library::create_category),
        )
        .route(
            "/api/v1/media/{id}/",
            get(media_library::serve_media)
                .put(media_library::update_media)
                .delete(media_library::delete_media),
        )
        // Feeds + health
        .route("/rss.xml", get(rss::rss_feed))
        .route("/health", get(health::health_ping))
        .route("/health/detailed", get(health::health_detailed))
        .route("/health/database", get(health::health_database))
        .route("/health/ready", get(health::health_ready))
}

/// Create and configure the application router.
pub fn create_app() -> Router {
    let cors = configure_cors();
    tracing::info!("CORS configured");

    api_routes()
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        // Multipart extraction has its own 2 MB default; lift it to the global cap.
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(cors)
}

fn check_production_settings() {
    // Refuse to start in production with the insecure default JWT secret.
    let secret = std::env::var("JWT_SECRET").unwrap_or_default();
    if secret.is_empty() || secret == routes::auth::DEFAULT_JWT_SECRET {
        panic!(
            "FATAL: JWT_SECRET must be set to a secure, unique value in production. \
             Refusing to start with the default secret."
        );
    }

    let admin_password_set =
        std::env::var("ADMIN_HASH_PASSWORD").is_ok() || std::env::var("ADMIN_PASSWORD").is_ok();
    if !admin_password_set {
        tracing::warn!(
            "SECURITY: Neither ADMIN_HASH_PASSWORD nor ADMIN_PASSWORD is set. \
             The no-database fallback login uses the default password 'admin123'. \
             Create real accounts with the create-admin binary."
        );
    }
}

/// Run the server (used by main).
pub async fn run() {
    dotenvy::dotenv().ok();

    let log_config = logging::LogConfig::from_env();
    // Dropping the guards stops the background log writers.
    let _log_guards = logging::init(&log_config);

    routes::health::init_start_time();

    if log_config.environment.is_production() {
        check_production_settings();
    }

    if std::env::var("DATABASE_URL").is_ok() {
        match db::init_pool(None).await {
            Ok(pool) => {
                if let Err(e) = db::run_migrations(&pool).await {
                    tracing::error!("Failed to run database migrations: {}", e);
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to initialize database pool: {}. Continuing without database.",
                    e
                );
            }
        }
    } else {
        tracing::info!("DATABASE_URL not set. Serving default content without a database.");
    }

    let app = create_app();

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8002);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("Invalid HOST/PORT configuration");
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
