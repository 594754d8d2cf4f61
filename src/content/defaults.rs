//! Fallback content served when a page blob is missing or unreachable.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::PageKey;

/// Built-in content for a page, used when nothing is stored for it.
pub fn default_content(page: PageKey) -> Value {
    match page {
        PageKey::Homepage => json!({
            "hero": {
                "title": "Sistema Educativo Virtual Profesional",
                "subtitle": "Transformamos la educación con tecnología",
                "description": "La plataforma educativa más completa para transformar tu institución educativa",
                "button_text": "Ver Planes",
                "button_link": "/precios",
                "slideshow": [],
                "slideshow_interval": 5
            },
            "features": [],
            "stats": {},
            "cta": {
                "title": "¿Listo para comenzar?",
                "button_text": "Contáctanos",
                "button_link": "/contacto"
            }
        }),
        PageKey::About => json!({
            "hero": {
                "title": "Sobre Nosotros",
                "description": "Conoce al equipo detrás de SEVP"
            },
            "mission": { "title": "Misión", "content": "" },
            "vision": { "title": "Visión", "content": "" },
            "values": [],
            "team": []
        }),
        PageKey::Pricing => json!({
            "hero": {
                "title": "Planes y Precios",
                "description": "Elige el plan perfecto para tu institución educativa"
            },
            "faqs": []
        }),
        PageKey::History => json!({
            "hero": {
                "title": "Nuestra Historia",
                "description": "Un viaje de innovación, crecimiento y transformación educativa que comenzó con un sueño"
            },
            "milestones": []
        }),
        PageKey::Clients => json!({
            "hero": {
                "title": "Nuestros Clientes",
                "description": "Más de 1,500 instituciones educativas confían en SEVP para transformar su educación digital"
            },
            "client_types": []
        }),
        PageKey::Contact => json!({
            "hero": {
                "title": "Contáctanos",
                "description": "¿Listo para transformar tu institución educativa? Estamos aquí para ayudarte a dar el siguiente paso"
            },
            "contact_info": {
                "email": "contacto@sevp.com",
                "phone": "+51 1 234-5678",
                "address": "Lima, Perú",
                "hours": "9:00 AM - 6:00 PM"
            },
            "faqs": []
        }),
    }
}

/// Default page title, used for both the fallback record and new records.
pub fn default_title(page: PageKey) -> &'static str {
    match page {
        PageKey::Homepage => "Inicio",
        PageKey::About => "Nosotros",
        PageKey::Pricing => "Precios",
        PageKey::History => "Historia",
        PageKey::Clients => "Clientes",
        PageKey::Contact => "Contacto",
    }
}

/// Fill every known section missing from `stored` with its default.
///
/// Stored sections always win, including ones the renderer does not know
/// about. A non-object `stored` value resolves to the defaults alone.
pub fn resolve_content(page: PageKey, stored: &Value) -> Value {
    let defaults = default_content(page);
    let mut resolved = match stored {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };

    if let Value::Object(default_map) = defaults {
        for (section, value) in default_map {
            if page.is_known_section(&section) && !resolved.contains_key(&section) {
                resolved.insert(section, value);
            }
        }
    }

    Value::Object(resolved)
}

/// Aggregate counts shown on the homepage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HomepageStats {
    pub total_clients: i64,
    pub total_projects: i64,
    pub total_testimonials: i64,
}

/// Homepage summary: featured news, featured testimonials and stats.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HomepageSummary {
    pub featured_articles: Vec<Value>,
    pub featured_testimonials: Vec<Value>,
    pub stats: HomepageStats,
}

impl HomepageSummary {
    /// Shape returned when the summary cannot be built.
    pub fn fallback() -> Self {
        Self::default()
    }
}
