//! What each audience is allowed to see.
//!
//! Owners never see messages containing one of their hidden words in their
//! own lists. The public feed only ever shows answered messages from public
//! inboxes whose reply is public.

use rusqlite::{params, Connection};

use crate::db::models::{Inbox, Message, Reply, Visibility};

/// Case-insensitive substring filter over an owner's hidden words.
#[derive(Debug, Clone, Default)]
pub struct HiddenWordFilter {
    words: Vec<String>,
}

impl HiddenWordFilter {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        Self { words }
    }

    /// Load the hidden words of one user.
    pub fn load(conn: &Connection, user_id: &str) -> rusqlite::Result<Self> {
        let mut stmt = conn.prepare("SELECT word FROM hidden_words WHERE user_id = ?1")?;
        let words = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(words))
    }

    pub fn hides(&self, content: &str) -> bool {
        if self.words.is_empty() {
            return false;
        }
        let content = content.to_lowercase();
        self.words.iter().any(|word| content.contains(word.as_str()))
    }

    /// Keep only the items whose content passes the filter.
    pub fn retain_visible<T, F>(&self, items: Vec<T>, content: F) -> Vec<T>
    where
        F: Fn(&T) -> &str,
    {
        items
            .into_iter()
            .filter(|item| !self.hides(content(item)))
            .collect()
    }
}

/// Public feed eligibility: public inbox, answered, with a non-empty public
/// reply.
pub fn is_publicly_visible(inbox: &Inbox, message: &Message, reply: Option<&Reply>) -> bool {
    inbox.visibility == Visibility::Public
        && message.is_replied
        && reply.is_some_and(|r| r.is_public && !r.content.trim().is_empty())
}
