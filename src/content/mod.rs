/*!
 * Page Content
 * Page keys, section merging, fallback defaults and hero slideshow rules
 */
pub mod defaults;
pub mod merge;
pub mod slideshow;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContentError {
    #[error("unknown page key '{0}'")]
    UnknownPage(String),
    #[error("section name must not be empty")]
    EmptySection,
    #[error("field path '{0}' is invalid")]
    InvalidPath(String),
}

/// Marketing pages whose content lives in a `content_json` blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKey {
    Homepage,
    About,
    Pricing,
    History,
    Clients,
    Contact,
}

impl PageKey {
    pub const ALL: [PageKey; 6] = [
        PageKey::Homepage,
        PageKey::About,
        PageKey::Pricing,
        PageKey::History,
        PageKey::Clients,
        PageKey::Contact,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PageKey::Homepage => "homepage",
            PageKey::About => "about",
            PageKey::Pricing => "pricing",
            PageKey::History => "history",
            PageKey::Clients => "clients",
            PageKey::Contact => "contact",
        }
    }

    /// Section names the public renderer for this page reads.
    pub fn known_sections(&self) -> &'static [&'static str] {
        match self {
            PageKey::Homepage => &[
                "hero",
                "features",
                "stats",
                "client_types",
                "testimonials",
                "cta",
                "navigation_items",
                "footer",
            ],
            PageKey::About => &["hero", "mission", "vision", "values", "team"],
            PageKey::Pricing => &["hero", "faqs", "cta"],
            PageKey::History => &["hero", "milestones", "timeline"],
            PageKey::Clients => &["hero", "client_types", "testimonials"],
            PageKey::Contact => &["hero", "contact_info", "faqs"],
        }
    }

    pub fn is_known_section(&self, section: &str) -> bool {
        self.known_sections().contains(&section)
    }
}

impl std::fmt::Display for PageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PageKey {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        PageKey::ALL
            .into_iter()
            .find(|k| k.as_str() == key)
            .ok_or(ContentError::UnknownPage(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_key_parses_case_insensitively() {
        assert_eq!("Homepage".parse::<PageKey>(), Ok(PageKey::Homepage));
        assert_eq!(" pricing ".parse::<PageKey>(), Ok(PageKey::Pricing));
    }

    #[test]
    fn test_unknown_page_key_is_rejected() {
        assert_eq!(
            "blog".parse::<PageKey>(),
            Err(ContentError::UnknownPage("blog".to_string()))
        );
    }

    #[test]
    fn test_every_page_knows_its_hero() {
        for key in PageKey::ALL {
            assert!(key.is_known_section("hero"), "{} has no hero", key);
        }
        assert!(!PageKey::Pricing.is_known_section("heor"));
    }
}
