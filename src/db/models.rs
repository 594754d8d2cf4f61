//! Database Models - structs representing database tables (used by sqlx/serde).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::media::library::{self, MediaKind};

/// Admin user account. `password_hash` never leaves the server.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub date_joined: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.is_staff || self.is_superuser
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PageContent {
    pub id: i64,
    pub page_key: String,
    pub title: String,
    pub content_json: serde_json::Value,
    pub meta_title: String,
    pub meta_description: String,
    pub meta_keywords: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Whole-record update. `None` keeps the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageContentUpdate {
    pub title: Option<String>,
    pub content_json: Option<serde_json::Value>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub is_active: Option<bool>,
}

impl PageContent {
    pub fn apply_update(&mut self, update: PageContentUpdate) {
        if let Some(title) = update.title {
            self.title = title;
        }
        if let Some(content_json) = update.content_json {
            self.content_json = content_json;
        }
        if let Some(meta_title) = update.meta_title {
            self.meta_title = meta_title;
        }
        if let Some(meta_description) = update.meta_description {
            self.meta_description = meta_description;
        }
        if let Some(meta_keywords) = update.meta_keywords {
            self.meta_keywords = meta_keywords;
        }
        if let Some(is_active) = update.is_active {
            self.is_active = is_active;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    New,
    InProgress,
    Responded,
    Closed,
}

impl ContactStatus {
    pub const ALL: [ContactStatus; 4] = [
        ContactStatus::New,
        ContactStatus::InProgress,
        ContactStatus::Responded,
        ContactStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::New => "new",
            ContactStatus::InProgress => "in_progress",
            ContactStatus::Responded => "responded",
            ContactStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }
}

/// List filter offered by the contact inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactFilter {
    #[default]
    All,
    Pending,
    Responded,
}

impl ContactFilter {
    /// Status a SQL query should pin, if any.
    pub fn status(&self) -> Option<ContactStatus> {
        match self {
            ContactFilter::All => None,
            ContactFilter::Pending => Some(ContactStatus::New),
            ContactFilter::Responded => Some(ContactStatus::Responded),
        }
    }
}

/// Raw `contact_messages` row; `status` is stored as text.
#[derive(Debug, Clone, FromRow)]
pub struct ContactMessageRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub subject: String,
    pub message: String,
    pub status: String,
    pub admin_response: String,
    pub responded_at: Option<DateTime<Utc>>,
    pub assigned_to_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactMessage {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub subject: String,
    pub message: String,
    pub status: ContactStatus,
    pub is_responded: bool,
    pub is_pending: bool,
    pub admin_response: String,
    pub responded_at: Option<DateTime<Utc>>,
    pub assigned_to_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<ContactMessageRow> for ContactMessage {
    fn from(row: ContactMessageRow) -> Self {
        // The status column is constrained to `ContactStatus` values.
        let status = ContactStatus::parse(&row.status).unwrap_or(ContactStatus::New);
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            company: row.company,
            subject: row.subject,
            message: row.message,
            status,
            is_responded: status == ContactStatus::Responded,
            is_pending: ContactFilter::Pending.status() == Some(status),
            admin_response: row.admin_response,
            responded_at: row.responded_at,
            assigned_to_id: row.assigned_to_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Testimonial {
    pub id: i64,
    pub client_name: String,
    pub client_position: String,
    pub client_company: String,
    pub client_photo: Option<String>,
    pub content: String,
    pub rating: i32,
    pub is_active: bool,
    pub is_featured: bool,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Faq {
    pub id: i64,
    pub question: String,
    pub answer: String,
    pub category: String,
    pub is_active: bool,
    pub display_order: i32,
    pub views_count: i32,
    pub helpful_votes: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

pub const FAQ_CATEGORIES: &[&str] = &["general", "pricing", "technical", "support", "billing"];

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NewsArticle {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub meta_description: String,
    pub meta_keywords: String,
    pub status: String,
    pub featured: bool,
    pub views_count: i32,
    pub featured_image: Option<String>,
    pub author_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
}

pub const NEWS_STATUSES: &[&str] = &["draft", "published", "archived"];

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ServicePlan {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price_monthly: Decimal,
    pub price_yearly: Option<Decimal>,
    pub monthly_savings: Decimal,
    pub max_users: i32,
    pub max_courses: i32,
    pub storage_gb: i32,
    pub api_requests_limit: i32,
    pub features: serde_json::Value,
    pub color_primary: String,
    pub color_secondary: String,
    pub is_active: bool,
    pub is_popular: bool,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub company_name: String,
    pub tagline: String,
    pub description: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub website: String,
    pub linkedin: String,
    pub twitter: String,
    pub facebook: String,
    pub instagram: String,
    pub logo: Option<String>,
    pub hero_image: Option<String>,
    pub meta_title: String,
    pub meta_description: String,
    pub updated_at: DateTime<Utc>,
}

impl Default for CompanyInfo {
    fn default() -> Self {
        Self {
            company_name: "SEVP".to_string(),
            tagline: "Sistema Educativo Virtual Profesional".to_string(),
            description: String::new(),
            email: "contacto@sevp.com".to_string(),
            phone: "+51 1 234-5678".to_string(),
            address: "Lima, Perú".to_string(),
            website: String::new(),
            linkedin: String::new(),
            twitter: String::new(),
            facebook: String::new(),
            instagram: String::new(),
            logo: None,
            hero_image: None,
            meta_title: String::new(),
            meta_description: String::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Columns of `media_files` other than the stored bytes.
pub const MEDIA_FILE_COLUMNS: &str = "id, filename, original_filename, file_type, mime_type, \
     file_size, storage_type, file_url, alt_text, description, width, height, is_active, \
     is_public, uploaded_by_id, created_at, updated_at";

/// A `media_files` row without its bytes.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MediaFile {
    pub id: i64,
    pub filename: String,
    pub original_filename: String,
    pub file_type: String,
    pub mime_type: String,
    pub file_size: i64,
    pub storage_type: String,
    pub file_url: Option<String>,
    pub alt_text: String,
    pub description: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub is_active: bool,
    pub is_public: bool,
    pub uploaded_by_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaFileResponse {
    #[serde(flatten)]
    pub file: MediaFile,
    pub public_url: Option<String>,
    pub size_formatted: String,
    pub file_extension: String,
    pub is_image: bool,
    pub is_video: bool,
}

impl From<MediaFile> for MediaFileResponse {
    fn from(file: MediaFile) -> Self {
        Self {
            public_url: library::public_url(file.id, &file.storage_type, file.file_url.as_deref()),
            size_formatted: library::format_size(file.file_size),
            file_extension: library::file_extension(&file.filename),
            is_image: file.file_type == MediaKind::Image.as_str(),
            is_video: file.file_type == MediaKind::Video.as_str(),
            file,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MediaCategory {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub color: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub file_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page() -> PageContent {
        PageContent {
            id: 1,
            page_key: "homepage".to_string(),
            title: "Inicio".to_string(),
            content_json: json!({ "hero": { "title": "Old" } }),
            meta_title: "SEVP".to_string(),
            meta_description: "desc".to_string(),
            meta_keywords: "edu".to_string(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_apply_update_keeps_untouched_meta_fields() {
        let mut record = page();
        record.apply_update(PageContentUpdate {
            content_json: Some(json!({ "hero": { "title": "New" } })),
            ..Default::default()
        });
        assert_eq!(record.content_json["hero"]["title"], "New");
        assert_eq!(record.meta_title, "SEVP");
        assert_eq!(record.meta_keywords, "edu");
        assert!(record.is_active);
    }

    #[test]
    fn test_filter_pins_status() {
        assert_eq!(ContactFilter::All.status(), None);
        assert_eq!(ContactFilter::Pending.status(), Some(ContactStatus::New));
        assert_eq!(ContactFilter::Responded.status(), Some(ContactStatus::Responded));
    }

    #[test]
    fn test_contact_status_round_trips_text() {
        for status in ContactStatus::ALL {
            assert_eq!(ContactStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ContactStatus::parse("archived"), None);
        assert_eq!(
            serde_json::to_value(ContactStatus::InProgress).unwrap(),
            json!("in_progress")
        );
    }

    #[test]
    fn test_contact_row_derives_flags() {
        let row = ContactMessageRow {
            id: 3,
            name: "Ana".to_string(),
            email: "ana@colegio.pe".to_string(),
            phone: String::new(),
            company: String::new(),
            subject: "Demo".to_string(),
            message: "Hola".to_string(),
            status: "responded".to_string(),
            admin_response: "Gracias".to_string(),
            responded_at: Some(Utc::now()),
            assigned_to_id: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        let message = ContactMessage::from(row);
        assert!(message.is_responded);
        assert!(!message.is_pending);
    }

    #[test]
    fn test_user_is_admin_and_password_hidden() {
        let user = User {
            id: 1,
            username: "admin".to_string(),
            email: "admin@sevp.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: String::new(),
            password_hash: "$2b$12$secret".to_string(),
            is_active: true,
            is_staff: false,
            is_superuser: true,
            login_attempts: 0,
            locked_until: None,
            last_login: None,
            last_login_ip: None,
            date_joined: Utc::now(),
        };
        assert!(user.is_admin());
        assert_eq!(user.full_name(), "Ada");
        let value = serde_json::to_value(&user).unwrap();
        assert!(value.get("password_hash").is_none());
    }

    #[test]
    fn test_media_response_derives_display_fields() {
        let file = MediaFile {
            id: 12,
            filename: "3f2a.PNG".to_string(),
            original_filename: "logo.png".to_string(),
            file_type: "image".to_string(),
            mime_type: "image/png".to_string(),
            file_size: 2048,
            storage_type: "database".to_string(),
            file_url: None,
            alt_text: "Logo".to_string(),
            description: String::new(),
            width: Some(64),
            height: Some(64),
            is_active: true,
            is_public: true,
            uploaded_by_id: Some(1),
            created_at: Utc::now(),
            updated_at: None,
        };
        let value = serde_json::to_value(MediaFileResponse::from(file)).unwrap();
        assert_eq!(value["public_url"], "/api/v1/media/12/");
        assert_eq!(value["size_formatted"], "2.0 KB");
        assert_eq!(value["file_extension"], "png");
        assert_eq!(value["is_image"], true);
        assert_eq!(value["is_video"], false);
        assert_eq!(value["original_filename"], "logo.png");
        assert!(value.get("file_data").is_none());
    }
}
