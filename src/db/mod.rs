pub mod models;

use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use tokio::sync::OnceCell;

static DB_POOL: OnceCell<Arc<PgPool>> = OnceCell::const_new();

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/sevp_web".to_string()),
            max_connections: env_or("DB_POOL_MAX", 10),
            min_connections: env_or("DB_POOL_MIN", 2),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT", 10),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT", 300),
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(fallback)
}

/// Connection URL with its userinfo (user and password) replaced by `***`.
fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return "***".to_string();
    };
    let authority_end = rest.find(|c: char| matches!(c, '/' | '?' | '#')).unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}://***@{}", scheme, &rest[at + 1..]),
        None => url.to_string(),
    }
}

pub async fn init_pool(config: Option<DbConfig>) -> Result<Arc<PgPool>, sqlx::Error> {
    let config = config.unwrap_or_default();

    tracing::info!("Initializing database connection pool...");
    tracing::debug!("Database URL: {}", redact_url(&config.url));

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(std::time::Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(std::time::Duration::from_secs(1800))
        .test_before_acquire(true)
        .connect(&config.url)
        .await?;

    sqlx::query("SELECT 1").fetch_one(&pool).await?;

    tracing::info!("Database connection pool initialized successfully");

    let pool = Arc::new(pool);
    let _ = DB_POOL.set(pool.clone());

    Ok(pool)
}

pub fn get_pool() -> Option<Arc<PgPool>> {
    DB_POOL.get().cloned()
}

pub async fn health_check() -> Result<std::time::Duration, sqlx::Error> {
    let pool = get_pool()
        .ok_or_else(|| sqlx::Error::Configuration("Database pool not initialized".into()))?;

    let start = std::time::Instant::now();
    sqlx::query("SELECT 1").fetch_one(pool.as_ref()).await?;

    Ok(start.elapsed())
}

/// Returns true when `err` is a unique-constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

/// Each statement is idempotent, so this runs on every startup.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "users",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id BIGSERIAL PRIMARY KEY,
            username TEXT UNIQUE NOT NULL,
            email TEXT NOT NULL,
            first_name TEXT NOT NULL DEFAULT '',
            last_name TEXT NOT NULL DEFAULT '',
            password_hash TEXT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT true,
            is_staff BOOLEAN NOT NULL DEFAULT false,
            is_superuser BOOLEAN NOT NULL DEFAULT false,
            login_attempts INTEGER NOT NULL DEFAULT 0,
            locked_until TIMESTAMPTZ,
            last_login TIMESTAMPTZ,
            last_login_ip TEXT,
            date_joined TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    ),
    (
        "users indexes",
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email_lower ON users(LOWER(email));
        CREATE INDEX IF NOT EXISTS idx_users_is_active ON users(is_active)
        "#,
    ),
    (
        "refresh_tokens",
        r#"
        CREATE TABLE IF NOT EXISTS refresh_tokens (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            token_hash TEXT NOT NULL UNIQUE,
            expires_at TIMESTAMPTZ NOT NULL,
            revoked BOOLEAN NOT NULL DEFAULT false,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user_id ON refresh_tokens(user_id);
        CREATE INDEX IF NOT EXISTS idx_refresh_tokens_expires_at ON refresh_tokens(expires_at)
        "#,
    ),
    (
        "page_content",
        r#"
        CREATE TABLE IF NOT EXISTS page_content (
            id BIGSERIAL PRIMARY KEY,
            page_key TEXT UNIQUE NOT NULL,
            title TEXT NOT NULL,
            content_json JSONB NOT NULL DEFAULT '{}'::jsonb,
            meta_title TEXT NOT NULL DEFAULT '',
            meta_description TEXT NOT NULL DEFAULT '',
            meta_keywords TEXT NOT NULL DEFAULT '',
            is_active BOOLEAN NOT NULL DEFAULT true,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ
        )
        "#,
    ),
    (
        "contact_messages",
        r#"
        CREATE TABLE IF NOT EXISTS contact_messages (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT NOT NULL DEFAULT '',
            company TEXT NOT NULL DEFAULT '',
            subject TEXT NOT NULL,
            message TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'new'
                CHECK (status IN ('new', 'in_progress', 'responded', 'closed')),
            admin_response TEXT NOT NULL DEFAULT '',
            responded_at TIMESTAMPTZ,
            assigned_to_id BIGINT REFERENCES users(id) ON DELETE SET NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ
        );
        CREATE INDEX IF NOT EXISTS idx_contact_messages_status ON contact_messages(status);
        CREATE INDEX IF NOT EXISTS idx_contact_messages_created_at ON contact_messages(created_at DESC)
        "#,
    ),
    (
        "contact_messages status check",
        r#"
        UPDATE contact_messages SET status = 'new'
        WHERE status NOT IN ('new', 'in_progress', 'responded', 'closed');
        DO $$
        BEGIN
            IF NOT EXISTS (
                SELECT 1 FROM pg_constraint WHERE conname = 'contact_messages_status_check'
            ) THEN
                ALTER TABLE contact_messages ADD CONSTRAINT contact_messages_status_check
                    CHECK (status IN ('new', 'in_progress', 'responded', 'closed'));
            END IF;
        END $$
        "#,
    ),
    (
        "testimonials",
        r#"
        CREATE TABLE IF NOT EXISTS testimonials (
            id BIGSERIAL PRIMARY KEY,
            client_name TEXT NOT NULL,
            client_position TEXT NOT NULL DEFAULT '',
            client_company TEXT NOT NULL DEFAULT '',
            client_photo TEXT,
            content TEXT NOT NULL,
            rating INTEGER NOT NULL DEFAULT 5 CHECK (rating BETWEEN 1 AND 5),
            is_active BOOLEAN NOT NULL DEFAULT true,
            is_featured BOOLEAN NOT NULL DEFAULT false,
            display_order INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ
        );
        CREATE INDEX IF NOT EXISTS idx_testimonials_active_order ON testimonials(is_active, display_order)
        "#,
    ),
    (
        "faqs",
        r#"
        CREATE TABLE IF NOT EXISTS faqs (
            id BIGSERIAL PRIMARY KEY,
            question TEXT NOT NULL,
            answer TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT 'general',
            is_active BOOLEAN NOT NULL DEFAULT true,
            display_order INTEGER NOT NULL DEFAULT 0,
            views_count INTEGER NOT NULL DEFAULT 0,
            helpful_votes INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ
        );
        CREATE INDEX IF NOT EXISTS idx_faqs_category ON faqs(category);
        CREATE INDEX IF NOT EXISTS idx_faqs_active_order ON faqs(is_active, display_order)
        "#,
    ),
    (
        "news_articles",
        r#"
        CREATE TABLE IF NOT EXISTS news_articles (
            id BIGSERIAL PRIMARY KEY,
            title TEXT NOT NULL,
            slug TEXT UNIQUE NOT NULL,
            content TEXT NOT NULL,
            excerpt TEXT NOT NULL DEFAULT '',
            meta_description TEXT NOT NULL DEFAULT '',
            meta_keywords TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'draft',
            featured BOOLEAN NOT NULL DEFAULT false,
            views_count INTEGER NOT NULL DEFAULT 0,
            featured_image TEXT,
            author_id BIGINT REFERENCES users(id) ON DELETE SET NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ,
            published_at TIMESTAMPTZ
        );
        CREATE INDEX IF NOT EXISTS idx_news_articles_status ON news_articles(status);
        CREATE INDEX IF NOT EXISTS idx_news_articles_published_at ON news_articles(published_at DESC)
        "#,
    ),
    (
        "service_plans",
        r#"
        CREATE TABLE IF NOT EXISTS service_plans (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT UNIQUE NOT NULL,
            description TEXT NOT NULL,
            price_monthly NUMERIC(10, 2) NOT NULL,
            price_yearly NUMERIC(10, 2),
            monthly_savings NUMERIC(10, 2) NOT NULL DEFAULT 0,
            max_users INTEGER NOT NULL DEFAULT 1,
            max_courses INTEGER NOT NULL DEFAULT 10,
            storage_gb INTEGER NOT NULL DEFAULT 1,
            api_requests_limit INTEGER NOT NULL DEFAULT 1000,
            features JSONB NOT NULL DEFAULT '[]'::jsonb,
            color_primary TEXT NOT NULL DEFAULT '#3B82F6',
            color_secondary TEXT NOT NULL DEFAULT '#1E40AF',
            is_active BOOLEAN NOT NULL DEFAULT true,
            is_popular BOOLEAN NOT NULL DEFAULT false,
            display_order INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ
        )
        "#,
    ),
    (
        "company_info",
        r#"
        CREATE TABLE IF NOT EXISTS company_info (
            id BIGINT PRIMARY KEY DEFAULT 1 CHECK (id = 1),
            company_name TEXT NOT NULL,
            tagline TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL,
            phone TEXT NOT NULL DEFAULT '',
            address TEXT NOT NULL DEFAULT '',
            website TEXT NOT NULL DEFAULT '',
            linkedin TEXT NOT NULL DEFAULT '',
            twitter TEXT NOT NULL DEFAULT '',
            facebook TEXT NOT NULL DEFAULT '',
            instagram TEXT NOT NULL DEFAULT '',
            logo TEXT,
            hero_image TEXT,
            meta_title TEXT NOT NULL DEFAULT '',
            meta_description TEXT NOT NULL DEFAULT '',
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    ),
    (
        "media_files",
        r#"
        CREATE TABLE IF NOT EXISTS media_files (
            id BIGSERIAL PRIMARY KEY,
            filename TEXT NOT NULL,
            original_filename TEXT NOT NULL,
            file_type TEXT NOT NULL CHECK (file_type IN ('image', 'video', 'document')),
            mime_type TEXT NOT NULL,
            file_size BIGINT NOT NULL DEFAULT 0,
            storage_type TEXT NOT NULL CHECK (storage_type IN ('database', 'url')),
            file_data BYTEA,
            file_url TEXT,
            alt_text TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            width INTEGER,
            height INTEGER,
            is_active BOOLEAN NOT NULL DEFAULT true,
            is_public BOOLEAN NOT NULL DEFAULT true,
            uploaded_by_id BIGINT REFERENCES users(id) ON DELETE SET NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ,
            CHECK (storage_type <> 'database' OR file_data IS NOT NULL),
            CHECK (storage_type <> 'url' OR file_url IS NOT NULL)
        );
        CREATE INDEX IF NOT EXISTS idx_media_files_type_created ON media_files(file_type, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_media_files_is_active ON media_files(is_active)
        "#,
    ),
    (
        "media_categories",
        r#"
        CREATE TABLE IF NOT EXISTS media_categories (
            id BIGSERIAL PRIMARY KEY,
            name TEXT UNIQUE NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            icon TEXT NOT NULL DEFAULT 'Folder',
            color TEXT NOT NULL DEFAULT '#3B82F6',
            is_active BOOLEAN NOT NULL DEFAULT true,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ
        );
        CREATE TABLE IF NOT EXISTS media_file_categories (
            media_file_id BIGINT NOT NULL REFERENCES media_files(id) ON DELETE CASCADE,
            category_id BIGINT NOT NULL REFERENCES media_categories(id) ON DELETE CASCADE,
            PRIMARY KEY (media_file_id, category_id)
        );
        CREATE INDEX IF NOT EXISTS idx_media_file_categories_category ON media_file_categories(category_id)
        "#,
    ),
];

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Running database migrations...");

    for (name, sql) in MIGRATIONS {
        tracing::debug!(migration = %name, "applying migration");
        sqlx::raw_sql(sql).execute(pool).await?;
    }

    tracing::info!("Database migrations completed successfully");

    Ok(())
}
