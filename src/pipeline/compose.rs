//! Notification message composition.
//!
//! Rich channels (email) get a subject and every new listing with its link.
//! Terse channels (SMS) get a short body naming at most `terse_limit`
//! listings. An empty listing set composes to empty content, which callers
//! must treat as "do not send".

use crate::models::{ChannelKind, ComposeConfig, ListingRecord, Shelter};
use crate::utils::truncate_graphemes;

/// A composed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Rich { subject: String, body: String },
    Terse { body: String },
}

impl Content {
    pub fn body(&self) -> &str {
        match self {
            Content::Rich { body, .. } | Content::Terse { body } => body,
        }
    }

    pub fn subject(&self) -> Option<&str> {
        match self {
            Content::Rich { subject, .. } => Some(subject),
            Content::Terse { .. } => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.body().is_empty()
    }
}

/// Renders messages for new listings.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    config: ComposeConfig,
}

impl Composer {
    pub fn new(config: ComposeConfig) -> Self {
        Self { config }
    }

    /// Compose the message for `channel`. Never mutates the records.
    pub fn compose(&self, channel: ChannelKind, new: &[ListingRecord], shelter: &Shelter) -> Content {
        if channel.is_rich() {
            self.compose_rich(new, shelter)
        } else {
            self.compose_terse(new, shelter)
        }
    }

    fn compose_rich(&self, new: &[ListingRecord], shelter: &Shelter) -> Content {
        if new.is_empty() {
            return Content::Rich {
                subject: String::new(),
                body: String::new(),
            };
        }

        let subject = format!(
            "{} New kitties available for adoption at {}!",
            self.config.marker, shelter.name
        );

        let mut body = format!("There are new kitties at {} since the last check!\n\n", shelter.name);
        if let Some(url) = shelter.public_url() {
            body.push_str(&format!("Visit {} to see all new kitties!\n\n", url));
        }
        for record in new {
            let line = match record.link() {
                Some(link) => format!("• {}: {}\n", record.display_name(), link),
                None => format!("• {}\n", record.display_name()),
            };
            body.push_str(&line);
        }

        Content::Rich { subject, body }
    }

    fn compose_terse(&self, new: &[ListingRecord], shelter: &Shelter) -> Content {
        if new.is_empty() {
            return Content::Terse {
                body: String::new(),
            };
        }

        let mut body = format!("{} New kitties at {}!\n\n", self.config.marker, shelter.name);
        for record in new.iter().take(self.config.terse_limit) {
            let name = truncate_graphemes(record.display_name(), self.config.max_name_graphemes);
            body.push_str(&format!("• {}\n", name));
        }
        if new.len() > self.config.terse_limit {
            body.push_str(&format!(
                "\n...and {} more!",
                new.len() - self.config.terse_limit
            ));
        }
        body.push('\n');
        body.push_str(&self.config.dashboard_hint);

        Content::Terse { body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kitty(name: &str, link: Option<&str>) -> ListingRecord {
        ListingRecord {
            name: Some(name.to_string()),
            link: link.map(str::to_string),
            description: Some(format!("{} description", name)),
            ..Default::default()
        }
    }

    fn shelter(url: Option<&str>) -> Shelter {
        Shelter::new("Happy Tails", url.map(str::to_string))
    }

    #[test]
    fn test_rich_lists_every_record() {
        let composer = Composer::default();
        let records = vec![
            kitty("Mittens", Some("https://happytails.org/mittens")),
            kitty("Socks", None),
        ];
        let content = composer.compose(
            ChannelKind::Email,
            &records,
            &shelter(Some("https://happytails.org")),
        );

        assert_eq!(
            content.subject(),
            Some("🐱 New kitties available for adoption at Happy Tails!")
        );
        assert_eq!(
            content.body(),
            "There are new kitties at Happy Tails since the last check!\n\n\
             Visit https://happytails.org to see all new kitties!\n\n\
             • Mittens: https://happytails.org/mittens\n\
             • Socks\n"
        );
    }

    #[test]
    fn test_rich_without_url_skips_visit_line() {
        let composer = Composer::default();
        let content = composer.compose(ChannelKind::Email, &[kitty("C", None)], &shelter(None));
        assert!(!content.body().contains("Visit"));
        assert!(content.body().ends_with("• C\n"));
    }

    #[test]
    fn test_terse_caps_at_five() {
        let composer = Composer::default();
        let records: Vec<_> = (1..=8).map(|i| kitty(&format!("Cat{}", i), None)).collect();
        let content = composer.compose(ChannelKind::Sms, &records, &shelter(None));

        assert_eq!(content.subject(), None);
        let body = content.body();
        assert!(body.starts_with("🐱 New kitties at Happy Tails!\n\n"));
        assert!(body.contains("• Cat5\n"));
        assert!(!body.contains("Cat6"));
        assert!(body.contains("\n...and 3 more!"));
        assert!(body.ends_with("\nVisit your dashboard to see all new kitties!"));
    }

    #[test]
    fn test_terse_body_layout() {
        let composer = Composer::default();
        let records: Vec<_> = (1..=6).map(|i| kitty(&format!("Cat{}", i), None)).collect();
        let content = composer.compose(ChannelKind::Sms, &records, &shelter(None));
        assert_eq!(
            content.body(),
            "🐱 New kitties at Happy Tails!\n\n\
             • Cat1\n• Cat2\n• Cat3\n• Cat4\n• Cat5\n\
             \n...and 1 more!\
             \nVisit your dashboard to see all new kitties!"
        );
    }

    #[test]
    fn test_terse_exactly_five_has_no_more_line() {
        let composer = Composer::default();
        let records: Vec<_> = (1..=5).map(|i| kitty(&format!("Cat{}", i), None)).collect();
        let content = composer.compose(ChannelKind::Sms, &records, &shelter(None));
        assert!(!content.body().contains("more!"));
    }

    #[test]
    fn test_terse_truncates_long_names() {
        let composer = Composer::new(ComposeConfig {
            max_name_graphemes: 5,
            ..ComposeConfig::default()
        });
        let content = composer.compose(ChannelKind::Sms, &[kitty("Sir Fluffington", None)], &shelter(None));
        assert!(content.body().contains("• Sir F…\n"));
    }

    #[test]
    fn test_empty_input_is_empty_content() {
        let composer = Composer::default();
        assert!(composer.compose(ChannelKind::Sms, &[], &shelter(None)).is_empty());
        assert!(composer.compose(ChannelKind::Email, &[], &shelter(None)).is_empty());
    }

    #[test]
    fn test_missing_name_uses_unknown() {
        let composer = Composer::default();
        let content = composer.compose(ChannelKind::Sms, &[ListingRecord::default()], &shelter(None));
        assert!(content.body().contains("• Unknown\n"));
    }
}
