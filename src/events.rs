//! In-process change notifications. Mutations publish a [`ChangeEvent`]
//! after they commit; dashboards subscribe over server-sent events and
//! refetch whatever the event names.

use serde::Serialize;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Inboxes,
    Messages,
    Replies,
    Reports,
    BlockedUsers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

/// One committed row change, scoped so subscribers can filter precisely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub op: Operation,
    pub id: String,
    pub inbox_id: Option<String>,
    pub user_id: Option<String>,
}

impl ChangeEvent {
    pub fn new(table: Table, op: Operation, id: impl Into<String>) -> Self {
        Self {
            table,
            op,
            id: id.into(),
            inbox_id: None,
            user_id: None,
        }
    }

    pub fn in_inbox(mut self, inbox_id: impl Into<String>) -> Self {
        self.inbox_id = Some(inbox_id.into());
        self
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn concerns_inbox(&self, inbox_id: &str) -> bool {
        self.inbox_id.as_deref() == Some(inbox_id)
    }

    /// True for changes to rows the user owns
    pub fn concerns_user(&self, user_id: &str) -> bool {
        self.user_id.as_deref() == Some(user_id)
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChangeEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event; having no subscribers is not an error
    pub fn publish(&self, event: ChangeEvent) {
        tracing::debug!(?event, "change event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
