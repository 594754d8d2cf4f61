/**
 * Company Info Routes
 * Singleton row with contact details, social links and SEO metadata
 */
use axum::{
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;

use crate::db::{self, models::CompanyInfo};
use crate::routes::{bad_request, db_error, is_valid_email, pool, require_admin, ApiError, ApiResult};

#[derive(Debug, Deserialize, Default)]
pub struct CompanyInfoUpdate {
    pub company_name: Option<String>,
    pub tagline: Option<String>,
    pub description: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub linkedin: Option<String>,
    pub twitter: Option<String>,
    pub facebook: Option<String>,
    pub instagram: Option<String>,
    pub logo: Option<String>,
    pub hero_image: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

impl CompanyInfoUpdate {
    fn validate(&mut self) -> Result<(), ApiError> {
        if let Some(name) = self.company_name.as_deref() {
            if name.trim().is_empty() {
                return Err(bad_request("company_name cannot be empty"));
            }
        }
        if let Some(email) = self.email.as_mut() {
            *email = email.trim().to_lowercase();
            if !is_valid_email(email) {
                return Err(bad_request("A valid email is required"));
            }
        }
        Ok(())
    }

    fn apply(self, info: &mut CompanyInfo) {
        let text_fields = [
            (self.company_name, &mut info.company_name),
            (self.tagline, &mut info.tagline),
            (self.description, &mut info.description),
            (self.email, &mut info.email),
            (self.phone, &mut info.phone),
            (self.address, &mut info.address),
            (self.website, &mut info.website),
            (self.linkedin, &mut info.linkedin),
            (self.twitter, &mut info.twitter),
            (self.facebook, &mut info.facebook),
            (self.instagram, &mut info.instagram),
            (self.meta_title, &mut info.meta_title),
            (self.meta_description, &mut info.meta_description),
        ];
        for (value, slot) in text_fields {
            if let Some(value) = value {
                *slot = value.trim().to_string();
            }
        }
        // Empty string clears an image.
        if let Some(logo) = self.logo {
            info.logo = Some(logo).filter(|v| !v.is_empty());
        }
        if let Some(hero_image) = self.hero_image {
            info.hero_image = Some(hero_image).filter(|v| !v.is_empty());
        }
    }
}

/// GET /api/v1/company/public/
/// Falls back to the built-in company details when nothing is stored.
pub async fn get_company_info() -> (StatusCode, Json<CompanyInfo>) {
    let Some(pool) = db::get_pool() else {
        return (StatusCode::OK, Json(CompanyInfo::default()));
    };

    match sqlx::query_as::<_, CompanyInfo>("SELECT * FROM company_info WHERE id = 1")
        .fetch_optional(pool.as_ref())
        .await
    {
        Ok(Some(info)) => (StatusCode::OK, Json(info)),
        Ok(None) => (StatusCode::OK, Json(CompanyInfo::default())),
        Err(e) => {
            tracing::error!("Failed to load company info: {}", e);
            (StatusCode::OK, Json(CompanyInfo::default()))
        }
    }
}

/// PUT /api/v1/company/admin/
pub async fn update_company_info(
    headers: HeaderMap,
    Json(mut payload): Json<CompanyInfoUpdate>,
) -> ApiResult<CompanyInfo> {
    let claims = require_admin(&headers)?;
    payload.validate()?;

    let pool = pool()?;
    let mut tx = pool.begin().await.map_err(db_error)?;

    let mut info = sqlx::query_as::<_, CompanyInfo>(
        "SELECT * FROM company_info WHERE id = 1 FOR UPDATE",
    )
    .fetch_optional(&mut *tx)
    .await
    .map_err(db_error)?
    .unwrap_or_default();
    payload.apply(&mut info);

    let saved = sqlx::query_as::<_, CompanyInfo>(
        r#"
        INSERT INTO company_info
            (id, company_name, tagline, description, email, phone, address, website,
             linkedin, twitter, facebook, instagram, logo, hero_image,
             meta_title, meta_description, updated_at)
        VALUES (1, $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, now())
        ON CONFLICT (id) DO UPDATE SET
            company_name = EXCLUDED.company_name,
            tagline = EXCLUDED.tagline,
            description = EXCLUDED.description,
            email = EXCLUDED.email,
            phone = EXCLUDED.phone,
            address = EXCLUDED.address,
            website = EXCLUDED.website,
            linkedin = EXCLUDED.linkedin,
            twitter = EXCLUDED.twitter,
            facebook = EXCLUDED.facebook,
            instagram = EXCLUDED.instagram,
            logo = EXCLUDED.logo,
            hero_image = EXCLUDED.hero_image,
            meta_title = EXCLUDED.meta_title,
            meta_description = EXCLUDED.meta_description,
            updated_at = now()
        RETURNING *
        "#,
    )
    .bind(&info.company_name)
    .bind(&info.tagline)
    .bind(&info.description)
    .bind(&info.email)
    .bind(&info.phone)
    .bind(&info.address)
    .bind(&info.website)
    .bind(&info.linkedin)
    .bind(&info.twitter)
    .bind(&info.facebook)
    .bind(&info.instagram)
    .bind(&info.logo)
    .bind(&info.hero_image)
    .bind(&info.meta_title)
    .bind(&info.meta_description)
    .fetch_one(&mut *tx)
    .await
    .map_err(db_error)?;

    tx.commit().await.map_err(db_error)?;

    tracing::info!(user = %claims.username, "Company info updated");
    Ok((StatusCode::OK, Json(saved)))
}
