// Domain types - pure, no side effects
use crate::identity::AnonIdentity;

/// Default reason shown to a banned sender when the ban row has none.
pub const DEFAULT_BAN_REASON: &str = "You have been banned from the platform";

/// Message text that has passed validation: non-blank and within the
/// character limit. Holds the trimmed text that gets stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentError {
    #[error("Please write a message")]
    Empty,
    #[error("Message must be {max} characters or less")]
    TooLong { max: usize },
}

impl MessageContent {
    /// The limit applies to the text as typed, before trimming.
    pub fn parse(raw: &str, max_chars: usize) -> Result<Self, ContentError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ContentError::Empty);
        }
        if raw.chars().count() > max_chars {
            return Err(ContentError::TooLong { max: max_chars });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Inbox names in URLs are matched case-insensitively with hyphens and
/// spaces treated alike: `My-Questions` and `my questions` share a slug.
pub fn inbox_slug(name: &str) -> String {
    name.trim().to_lowercase().replace('-', " ")
}

/// One anonymous submission as received from the public inbox page.
#[derive(Debug, Clone)]
pub struct Submission {
    pub username: String,
    pub inbox_name: String,
    pub content: String,
    pub access_token: Option<String>,
    /// Resolved and tagged origin address
    pub address: String,
}

/// Row about to be persisted.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub inbox_id: String,
    pub identity: AnonIdentity,
    pub content: MessageContent,
}

/// Outcome of a submission that passed validation, rate limiting and
/// access checks. Exactly one of these happens per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Delivered {
        message_id: String,
        inbox_id: String,
        owner_id: String,
    },
    /// The sender is blocked from this inbox; they are told it was delivered.
    SilentlyDropped,
    Banned { reason: String },
}

impl Disposition {
    /// What the sender sees. A silent drop is indistinguishable from delivery.
    pub fn appears_delivered(&self) -> bool {
        matches!(
            self,
            Disposition::Delivered { .. } | Disposition::SilentlyDropped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_is_trimmed() {
        let content = MessageContent::parse("  hello there \n", 300).unwrap();
        assert_eq!(content.as_str(), "hello there");
    }

    #[test]
    fn blank_content_is_rejected() {
        assert_eq!(MessageContent::parse("", 300), Err(ContentError::Empty));
        assert_eq!(MessageContent::parse("   \t\n", 300), Err(ContentError::Empty));
    }

    #[test]
    fn limit_counts_characters_not_bytes() {
        let exactly = "é".repeat(300);
        assert!(MessageContent::parse(&exactly, 300).is_ok());
        let over = "é".repeat(301);
        assert_eq!(
            MessageContent::parse(&over, 300),
            Err(ContentError::TooLong { max: 300 })
        );
    }

    #[test]
    fn limit_applies_before_trimming() {
        let padded = format!("{}{}", "a".repeat(299), "  ");
        assert!(MessageContent::parse(&padded, 300).is_err());
    }

    #[test]
    fn error_messages_are_user_facing() {
        assert_eq!(
            ContentError::TooLong { max: 300 }.to_string(),
            "Message must be 300 characters or less"
        );
    }

    #[test]
    fn slug_folds_case_and_hyphens() {
        assert_eq!(inbox_slug("Feedback"), "feedback");
        assert_eq!(inbox_slug("My-Questions"), "my questions");
        assert_eq!(inbox_slug(" my questions "), "my questions");
        assert_eq!(inbox_slug("my-questions"), inbox_slug("MY QUESTIONS"));
    }

    #[test]
    fn silent_drop_looks_like_delivery() {
        assert!(Disposition::SilentlyDropped.appears_delivered());
        assert!(!Disposition::Banned {
            reason: DEFAULT_BAN_REASON.into()
        }
        .appears_delivered());
    }
}
