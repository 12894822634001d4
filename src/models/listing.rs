//! Listing record and identity key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::utils::normalize_whitespace;

/// One adoptable animal as extracted from a shelter page.
///
/// Scrapes are inconsistent, so every field is optional.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ListingRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breed: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,

    /// Link to the listing on the shelter site
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// How the identity of a listing is derived across snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStrategy {
    /// Description when present, composite otherwise.
    #[default]
    DescriptionOrComposite,
    /// Description only. Listings without one share a single key.
    Description,
    /// name + breed + weight + gender + link.
    Composite,
}

/// Content-derived key recognizing the same animal across snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingKey(String);

impl ListingKey {
    fn digest(prefix: &str, parts: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                hasher.update([0x1f]);
            }
            hasher.update(part.as_bytes());
        }
        Self(format!("{}:{}", prefix, hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ListingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl ListingRecord {
    /// Display name, falling back to "Unknown".
    pub fn display_name(&self) -> &str {
        non_blank(&self.name).unwrap_or("Unknown")
    }

    /// Source link, if the scrape produced a usable one.
    pub fn link(&self) -> Option<&str> {
        non_blank(&self.link)
    }

    /// Derive the identity key under the given strategy.
    pub fn identity_key(&self, strategy: IdentityStrategy) -> ListingKey {
        match strategy {
            IdentityStrategy::Description => self.description_key(),
            IdentityStrategy::Composite => self.composite_key(),
            IdentityStrategy::DescriptionOrComposite => {
                if non_blank(&self.description).is_some() {
                    self.description_key()
                } else {
                    self.composite_key()
                }
            }
        }
    }

    fn description_key(&self) -> ListingKey {
        let description = normalize_whitespace(self.description.as_deref().unwrap_or(""));
        ListingKey::digest("d", &[&description])
    }

    fn composite_key(&self) -> ListingKey {
        let fields: Vec<String> = [
            &self.name,
            &self.breed,
            &self.weight,
            &self.gender,
            &self.link,
        ]
        .iter()
        .map(|f| normalize_whitespace(f.as_deref().unwrap_or("")).to_lowercase())
        .collect();
        let parts: Vec<&str> = fields.iter().map(String::as_str).collect();
        ListingKey::digest("c", &parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kitty(name: &str, description: Option<&str>) -> ListingRecord {
        ListingRecord {
            name: Some(name.to_string()),
            breed: Some("Domestic Shorthair".to_string()),
            gender: Some("Female".to_string()),
            description: description.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_description_key_ignores_other_fields() {
        let a = kitty("Mittens", Some("Shy but sweet."));
        let mut b = a.clone();
        b.name = Some("Mittens II".to_string());
        b.age = Some("3 years".to_string());

        let strategy = IdentityStrategy::DescriptionOrComposite;
        assert_eq!(a.identity_key(strategy), b.identity_key(strategy));
    }

    #[test]
    fn test_description_whitespace_is_normalized() {
        let a = kitty("Mittens", Some("Shy  but\n sweet. "));
        let b = kitty("Mittens", Some("Shy but sweet."));
        assert_eq!(
            a.identity_key(IdentityStrategy::Description),
            b.identity_key(IdentityStrategy::Description)
        );
    }

    #[test]
    fn test_blank_description_falls_back_to_composite() {
        let a = kitty("Mittens", Some("   "));
        let b = kitty("Mittens", None);
        let c = kitty("Socks", None);

        let strategy = IdentityStrategy::DescriptionOrComposite;
        assert_eq!(a.identity_key(strategy), b.identity_key(strategy));
        assert_ne!(b.identity_key(strategy), c.identity_key(strategy));
        assert!(b.identity_key(strategy).as_str().starts_with("c:"));
    }

    #[test]
    fn test_composite_is_case_insensitive() {
        let a = kitty("Mittens", None);
        let mut b = a.clone();
        b.name = Some("MITTENS".to_string());
        assert_eq!(
            a.identity_key(IdentityStrategy::Composite),
            b.identity_key(IdentityStrategy::Composite)
        );
    }

    #[test]
    fn test_display_name_fallback() {
        let record = ListingRecord::default();
        assert_eq!(record.display_name(), "Unknown");
        assert_eq!(record.link(), None);
    }

    #[test]
    fn test_deserialize_partial_record() {
        let json = r#"{"name": "Biscuit", "image_urls": ["a.jpg"], "link": "https://x/1"}"#;
        let record: ListingRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.display_name(), "Biscuit");
        assert_eq!(record.image_urls, vec!["a.jpg"]);
        assert!(record.description.is_none());
    }
}
