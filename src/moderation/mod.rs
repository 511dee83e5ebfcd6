//! Owner-side moderation of received messages: flagging, blocking,
//! replying and deleting. Admin review lives in [`admin`].
//!
//! Every multi-statement change runs inside one SQLite transaction so a
//! message can never end up flagged without its report, or replied without
//! its reply.

pub mod admin;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::db::models::{new_id, BlockedUser, Message, Reply, ReportReason, Role};
use crate::error::{is_unique_violation, AppError, AppResult};

/// Shown to a signed-in user whose account was banned without a reason.
pub const DEFAULT_ACCOUNT_BAN_REASON: &str = "Your account has been banned";

/// Message together with the owner of the inbox it was sent to.
fn message_with_owner(
    conn: &Connection,
    message_id: &str,
) -> rusqlite::Result<Option<(Message, String)>> {
    let sql = format!(
        "SELECT {}, (SELECT user_id FROM inboxes WHERE inboxes.id = messages.inbox_id)
         FROM messages WHERE id = ?1",
        Message::COLUMNS
    );
    conn.query_row(&sql, params![message_id], |row| {
        Ok((Message::from_row(row)?, row.get(9)?))
    })
    .optional()
}

/// Load a message the caller owns: 404 when it does not exist, 403 when it
/// belongs to someone else's inbox.
pub fn owned_message(conn: &Connection, message_id: &str, owner_id: &str) -> AppResult<Message> {
    match message_with_owner(conn, message_id)? {
        Some((message, owner)) if owner == owner_id => Ok(message),
        Some(_) => Err(AppError::Forbidden("You do not own this message".into())),
        None => Err(AppError::NotFound),
    }
}

/// A reply plus the inbox it lives in.
#[derive(Debug, Clone)]
pub struct OwnedReply {
    pub reply: Reply,
    pub inbox_id: String,
}

pub fn owned_reply(conn: &Connection, reply_id: &str, owner_id: &str) -> AppResult<OwnedReply> {
    let row = conn
        .query_row(
            "SELECT r.id, r.message_id, r.content, r.is_public, r.created_at, m.inbox_id, i.user_id
             FROM replies r
             JOIN messages m ON m.id = r.message_id
             JOIN inboxes i ON i.id = m.inbox_id
             WHERE r.id = ?1",
            params![reply_id],
            |row| {
                Ok((
                    Reply::from_row(row)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some((reply, inbox_id, owner)) if owner == owner_id => Ok(OwnedReply { reply, inbox_id }),
        Some(_) => Err(AppError::Forbidden("You do not own this reply".into())),
        None => Err(AppError::NotFound),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagOutcome {
    pub is_flagged: bool,
    pub flag_reason: Option<ReportReason>,
}

/// Flip a message's flag. Flagging records the reason and files a report;
/// unflagging clears both and withdraws the message's reports.
pub fn toggle_flag(
    conn: &mut Connection,
    message_id: &str,
    reason: Option<ReportReason>,
) -> AppResult<FlagOutcome> {
    let tx = conn.transaction()?;

    let is_flagged: bool = tx.query_row(
        "SELECT is_flagged FROM messages WHERE id = ?1",
        params![message_id],
        |row| row.get(0),
    )?;

    let outcome = if is_flagged {
        tx.execute(
            "UPDATE messages SET is_flagged = 0, flag_reason = NULL WHERE id = ?1",
            params![message_id],
        )?;
        tx.execute(
            "DELETE FROM reports WHERE message_id = ?1",
            params![message_id],
        )?;
        FlagOutcome {
            is_flagged: false,
            flag_reason: None,
        }
    } else {
        let reason = reason.unwrap_or(ReportReason::Spam);
        tx.execute(
            "UPDATE messages SET is_flagged = 1, flag_reason = ?2 WHERE id = ?1",
            params![message_id, reason],
        )?;
        tx.execute(
            "INSERT INTO reports (id, message_id, reason) VALUES (?1, ?2, ?3)",
            params![new_id(), message_id, reason],
        )?;
        FlagOutcome {
            is_flagged: true,
            flag_reason: Some(reason),
        }
    };

    tx.commit()?;
    tracing::info!(message_id, flagged = outcome.is_flagged, "Message flag toggled");
    Ok(outcome)
}

/// Answer a message. At most one reply per message.
pub fn create_reply(
    conn: &mut Connection,
    message_id: &str,
    content: &str,
    is_public: bool,
) -> AppResult<Reply> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::BadRequest("Please enter a reply".into()));
    }

    let tx = conn.transaction()?;
    let id = new_id();
    match tx.execute(
        "INSERT INTO replies (id, message_id, content, is_public) VALUES (?1, ?2, ?3, ?4)",
        params![id, message_id, content, is_public],
    ) {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::Conflict("This message already has a reply".into()));
        }
        Err(e) => return Err(e.into()),
    }
    tx.execute(
        "UPDATE messages SET is_replied = 1 WHERE id = ?1",
        params![message_id],
    )?;

    let sql = format!("SELECT {} FROM replies WHERE id = ?1", Reply::COLUMNS);
    let reply = tx.query_row(&sql, params![id], Reply::from_row)?;
    tx.commit()?;

    Ok(reply)
}

/// Remove a reply; its message goes back to unreplied.
pub fn delete_reply(conn: &mut Connection, reply: &Reply) -> AppResult<()> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM replies WHERE id = ?1", params![reply.id])?;
    tx.execute(
        "UPDATE messages SET is_replied = 0 WHERE id = ?1",
        params![reply.message_id],
    )?;
    tx.commit()?;
    Ok(())
}

/// Set whether a reply shows on the public feed. Touches nothing else.
pub fn set_reply_visibility(conn: &Connection, reply_id: &str, is_public: bool) -> AppResult<()> {
    conn.execute(
        "UPDATE replies SET is_public = ?2 WHERE id = ?1",
        params![reply_id, is_public],
    )?;
    Ok(())
}

/// Block a message's sender from the inbox it was sent to. Blocking an
/// already-blocked sender returns the existing block.
pub fn block_sender(conn: &Connection, message: &Message, blocked_by: &str) -> AppResult<BlockedUser> {
    conn.execute(
        "INSERT OR IGNORE INTO blocked_users (id, inbox_id, anon_ip, blocked_by)
         VALUES (?1, ?2, ?3, ?4)",
        params![new_id(), message.inbox_id, message.anon_ip, blocked_by],
    )?;
    let sql = format!(
        "SELECT {} FROM blocked_users WHERE inbox_id = ?1 AND anon_ip = ?2",
        BlockedUser::COLUMNS
    );
    let block = conn.query_row(
        &sql,
        params![message.inbox_id, message.anon_ip],
        BlockedUser::from_row,
    )?;
    tracing::info!(inbox_id = %message.inbox_id, anon_id = %message.anon_id, "Sender blocked");
    Ok(block)
}

/// A block as listed in the owner's settings.
#[derive(Debug, Clone, Serialize)]
pub struct BlockedEntry {
    #[serde(flatten)]
    pub block: BlockedUser,
    pub inbox_name: String,
    /// Sender id of the most recent message from this address, if any remain
    pub anon_id: Option<String>,
}

pub fn list_blocked(conn: &Connection, owner_id: &str) -> AppResult<Vec<BlockedEntry>> {
    let mut stmt = conn.prepare(
        "SELECT b.id, b.inbox_id, b.anon_ip, b.blocked_by, b.created_at, i.name,
                (SELECT m.anon_id FROM messages m
                 WHERE m.inbox_id = b.inbox_id AND m.anon_ip = b.anon_ip
                 ORDER BY m.created_at DESC LIMIT 1)
         FROM blocked_users b
         JOIN inboxes i ON i.id = b.inbox_id
         WHERE i.user_id = ?1
         ORDER BY b.created_at DESC",
    )?;
    let entries = stmt
        .query_map(params![owner_id], |row| {
            Ok(BlockedEntry {
                block: BlockedUser::from_row(row)?,
                inbox_name: row.get(5)?,
                anon_id: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Lift a block on one of the owner's inboxes.
/// Lift a per-inbox block. Returns the inbox the block belonged to.
pub fn unblock(conn: &Connection, block_id: &str, owner_id: &str) -> AppResult<String> {
    let found: Option<(String, String)> = conn
        .query_row(
            "SELECT i.user_id, i.id FROM blocked_users b JOIN inboxes i ON i.id = b.inbox_id
             WHERE b.id = ?1",
            params![block_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match found {
        Some((owner, inbox_id)) if owner == owner_id => {
            conn.execute("DELETE FROM blocked_users WHERE id = ?1", params![block_id])?;
            tracing::info!(block_id, %inbox_id, "Sender unblocked");
            Ok(inbox_id)
        }
        Some(_) => Err(AppError::Forbidden("You do not own this block".into())),
        None => Err(AppError::NotFound),
    }
}

/// Delete a message; its reply and reports go with it.
pub fn delete_message(conn: &Connection, message_id: &str) -> AppResult<()> {
    conn.execute("DELETE FROM messages WHERE id = ?1", params![message_id])?;
    Ok(())
}

/// Why a signed-in account may not act, if it is banned: either its role is
/// `banned` or a ban row names its user id.
pub fn account_ban_reason(
    conn: &Connection,
    user_id: &str,
    role: Role,
) -> rusqlite::Result<Option<String>> {
    let row: Option<Option<String>> = conn
        .query_row(
            "SELECT reason FROM banned_users WHERE user_id = ?1
             ORDER BY created_at DESC LIMIT 1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?;

    Ok(match (row, role) {
        (Some(reason), _) => Some(reason.unwrap_or_else(|| DEFAULT_ACCOUNT_BAN_REASON.to_string())),
        (None, Role::Banned) => Some(DEFAULT_ACCOUNT_BAN_REASON.to_string()),
        (None, _) => None,
    })
}
