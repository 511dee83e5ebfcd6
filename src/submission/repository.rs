// Repository pattern - isolates the database side effects of submission
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use thiserror::Error;

use crate::db::models::{new_id, Inbox};
use crate::state::DbPool;
use crate::submission::domain::NewMessage;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),
}

/// Everything the submission gate reads or writes
#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// Resolve an inbox by owner username (case-insensitive) and slug
    async fn find_inbox(&self, username: &str, slug: &str)
        -> Result<Option<Inbox>, RepositoryError>;

    /// `Some(reason)` when the anon id is banned platform-wide
    async fn ban_reason(&self, anon_id: &str) -> Result<Option<Option<String>>, RepositoryError>;

    /// Whether the hashed address is blocked from this inbox
    async fn is_blocked(&self, inbox_id: &str, anon_ip: &str) -> Result<bool, RepositoryError>;

    /// Persist the message and return its id
    async fn insert_message(&self, message: &NewMessage) -> Result<String, RepositoryError>;
}

/// SQLite implementation
pub struct SqliteSubmissionRepository {
    pool: DbPool,
}

impl SqliteSubmissionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubmissionRepository for SqliteSubmissionRepository {
    async fn find_inbox(
        &self,
        username: &str,
        slug: &str,
    ) -> Result<Option<Inbox>, RepositoryError> {
        let conn = self.pool.get()?;
        let sql = format!(
            "SELECT {} FROM inboxes
             WHERE slug = ?2 AND user_id = (
                 SELECT id FROM users WHERE username = ?1 AND role != 'banned')",
            Inbox::COLUMNS
        );
        let inbox = conn
            .query_row(&sql, params![username, slug], Inbox::from_row)
            .optional()?;
        Ok(inbox)
    }

    async fn ban_reason(&self, anon_id: &str) -> Result<Option<Option<String>>, RepositoryError> {
        let conn = self.pool.get()?;
        let reason = conn
            .query_row(
                "SELECT reason FROM banned_users WHERE anon_id = ?1
                 ORDER BY created_at DESC LIMIT 1",
                params![anon_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(reason)
    }

    async fn is_blocked(&self, inbox_id: &str, anon_ip: &str) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let blocked: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM blocked_users WHERE inbox_id = ?1 AND anon_ip = ?2)",
            params![inbox_id, anon_ip],
            |row| row.get(0),
        )?;
        Ok(blocked)
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<String, RepositoryError> {
        let conn = self.pool.get()?;
        let id = new_id();
        conn.execute(
            "INSERT INTO messages (id, inbox_id, anon_id, anon_ip, content, is_replied)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            params![
                id,
                message.inbox_id,
                message.identity.anon_id,
                message.identity.anon_ip,
                message.content.as_str(),
            ],
        )?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::identity::AnonIdentity;
    use crate::submission::domain::MessageContent;

    fn setup() -> (tempfile::TempDir, DbPool) {
        let tmp = tempfile::tempdir().unwrap();
        let pool = db::create_pool(&tmp.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        pool.get()
            .unwrap()
            .execute_batch(
                "INSERT INTO users (id, username, email, password_hash) VALUES ('u1', 'Alice', 'a@x.io', 'h');
                 INSERT INTO inboxes (id, user_id, name, slug, prompt_text)
                 VALUES ('i1', 'u1', 'My-Questions', 'my questions', 'Ask me');",
            )
            .unwrap();
        (tmp, pool)
    }

    #[tokio::test]
    async fn find_inbox_ignores_username_case() {
        let (_tmp, pool) = setup();
        let repo = SqliteSubmissionRepository::new(pool);

        let inbox = repo.find_inbox("alice", "my questions").await.unwrap();
        assert_eq!(inbox.map(|i| i.id), Some("i1".to_string()));
        assert!(repo.find_inbox("bob", "my questions").await.unwrap().is_none());
        assert!(repo.find_inbox("alice", "other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ban_reason_distinguishes_missing_and_null_reason() {
        let (_tmp, pool) = setup();
        pool.get()
            .unwrap()
            .execute_batch(
                "INSERT INTO banned_users (id, anon_id, reason) VALUES ('b1', 'anon_1', NULL);
                 INSERT INTO banned_users (id, anon_id, reason) VALUES ('b2', 'anon_2', 'spam');",
            )
            .unwrap();
        let repo = SqliteSubmissionRepository::new(pool);

        assert_eq!(repo.ban_reason("anon_0").await.unwrap(), None);
        assert_eq!(repo.ban_reason("anon_1").await.unwrap(), Some(None));
        assert_eq!(
            repo.ban_reason("anon_2").await.unwrap(),
            Some(Some("spam".to_string()))
        );
    }

    #[tokio::test]
    async fn insert_and_block_lookup() {
        let (_tmp, pool) = setup();
        let repo = SqliteSubmissionRepository::new(pool.clone());
        let identity = AnonIdentity::derive("203.0.113.7");

        let id = repo
            .insert_message(&NewMessage {
                inbox_id: "i1".into(),
                identity: identity.clone(),
                content: MessageContent::parse("hello", 300).unwrap(),
            })
            .await
            .unwrap();

        let (anon_ip, replied): (String, bool) = pool
            .get()
            .unwrap()
            .query_row(
                "SELECT anon_ip, is_replied FROM messages WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(anon_ip, identity.anon_ip);
        assert!(!replied);

        assert!(!repo.is_blocked("i1", &identity.anon_ip).await.unwrap());
        pool.get()
            .unwrap()
            .execute(
                "INSERT INTO blocked_users (id, inbox_id, anon_ip) VALUES ('k1', 'i1', ?1)",
                params![identity.anon_ip],
            )
            .unwrap();
        assert!(repo.is_blocked("i1", &identity.anon_ip).await.unwrap());
    }
}
