//! The ordered checks that decide what happens to one anonymous message.
//!
//! 1. content validation (before anything touches the store)
//! 2. rate limit on the sender address
//! 3. inbox resolution
//! 4. private-inbox access grant
//! 5. platform ban by anon id
//! 6. per-inbox block by hashed address (silent drop)
//! 7. persistence

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::auth::inbox_access::InboxAccessStore;
use crate::auth::password;
use crate::db::models::Inbox;
use crate::error::AppError;
use crate::identity::AnonIdentity;
use crate::rate_limit::RateLimiter;
use crate::submission::domain::{
    inbox_slug, ContentError, Disposition, MessageContent, NewMessage, Submission,
    DEFAULT_BAN_REASON,
};
use crate::submission::repository::{RepositoryError, SubmissionRepository};

#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    InvalidContent(#[from] ContentError),

    #[error("Too many requests")]
    RateLimited,

    #[error("Inbox not found")]
    InboxNotFound,

    #[error("This inbox is password protected")]
    AccessRequired,

    #[error("Incorrect password")]
    WrongPassword,

    #[error("This inbox is not password protected")]
    NotProtected,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Database(e) => AppError::Pool(e),
            RepositoryError::Sql(e) => AppError::Database(e),
        }
    }
}

impl From<GateError> for AppError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::InvalidContent(e) => AppError::BadRequest(e.to_string()),
            GateError::RateLimited => AppError::RateLimited,
            GateError::InboxNotFound => AppError::NotFound,
            GateError::AccessRequired | GateError::WrongPassword => {
                AppError::Forbidden(err.to_string())
            }
            GateError::NotProtected => AppError::BadRequest(err.to_string()),
            GateError::Repository(e) => e.into(),
        }
    }
}

pub struct SubmissionGate<R: SubmissionRepository> {
    repo: R,
    limiter: Arc<Mutex<RateLimiter>>,
    access: Arc<Mutex<InboxAccessStore>>,
    max_chars: usize,
}

impl<R: SubmissionRepository> SubmissionGate<R> {
    pub fn new(
        repo: R,
        limiter: Arc<Mutex<RateLimiter>>,
        access: Arc<Mutex<InboxAccessStore>>,
        max_chars: usize,
    ) -> Self {
        Self {
            repo,
            limiter,
            access,
            max_chars,
        }
    }

    pub async fn submit(&self, submission: Submission) -> Result<Disposition, GateError> {
        let content = MessageContent::parse(&submission.content, self.max_chars)?;

        self.check_rate(&submission.address).await?;

        let inbox = self
            .resolve_inbox(&submission.username, &submission.inbox_name)
            .await?;

        if inbox.is_private() {
            let granted = match submission.access_token.as_deref() {
                Some(token) => self.access.lock().await.is_valid(token, &inbox.id),
                None => false,
            };
            if !granted {
                return Err(GateError::AccessRequired);
            }
        }

        let identity = AnonIdentity::derive(&submission.address);

        if let Some(reason) = self.repo.ban_reason(&identity.anon_id).await? {
            tracing::info!(anon_id = %identity.anon_id, "Rejected message from banned sender");
            return Ok(Disposition::Banned {
                reason: reason.unwrap_or_else(|| DEFAULT_BAN_REASON.to_string()),
            });
        }

        if self.repo.is_blocked(&inbox.id, &identity.anon_ip).await? {
            tracing::info!(
                anon_id = %identity.anon_id,
                inbox_id = %inbox.id,
                "Silently dropped message from blocked sender"
            );
            return Ok(Disposition::SilentlyDropped);
        }

        let message_id = self
            .repo
            .insert_message(&NewMessage {
                inbox_id: inbox.id.clone(),
                identity,
                content,
            })
            .await?;

        Ok(Disposition::Delivered {
            message_id,
            inbox_id: inbox.id,
            owner_id: inbox.user_id,
        })
    }

    /// Verify a private inbox's password and issue an access grant.
    pub async fn unlock(
        &self,
        username: &str,
        inbox_name: &str,
        password: &str,
        address: &str,
    ) -> Result<String, GateError> {
        self.check_rate(address).await?;

        let inbox = self.resolve_inbox(username, inbox_name).await?;
        let hash = match (&inbox.password_hash, inbox.is_private()) {
            (Some(hash), true) => hash,
            _ => return Err(GateError::NotProtected),
        };

        if !password::verify(password.trim(), hash) {
            return Err(GateError::WrongPassword);
        }

        Ok(self.access.lock().await.issue(&inbox.id))
    }

    async fn check_rate(&self, address: &str) -> Result<(), GateError> {
        if self.limiter.lock().await.check(address) {
            Ok(())
        } else {
            Err(GateError::RateLimited)
        }
    }

    async fn resolve_inbox(&self, username: &str, inbox_name: &str) -> Result<Inbox, GateError> {
        self.repo
            .find_inbox(username, &inbox_slug(inbox_name))
            .await?
            .ok_or(GateError::InboxNotFound)
    }
}
