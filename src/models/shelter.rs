// src/models/shelter.rs

//! Shelter data structure.

use serde::{Deserialize, Serialize};

use crate::utils::slugify;

/// A shelter that publishes adoptable animals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Shelter {
    /// Stable identifier, generated from the name
    pub slug: String,

    /// Display name (e.g., "Happy Tails")
    pub name: String,

    /// Public listing page, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Shelter {
    /// Create a shelter with a slug derived from its name.
    pub fn new(name: impl Into<String>, url: Option<String>) -> Self {
        let name = name.into();
        Self {
            slug: slugify(&name),
            name,
            url,
        }
    }

    /// Public URL, if non-empty.
    pub fn public_url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_generates_slug() {
        let shelter = Shelter::new("Happy Tails Rescue!", None);
        assert_eq!(shelter.slug, "happy-tails-rescue");
        assert_eq!(shelter.public_url(), None);
    }

    #[test]
    fn test_public_url_ignores_blank() {
        let shelter = Shelter::new("Paws", Some("  ".to_string()));
        assert_eq!(shelter.public_url(), None);
    }
}
