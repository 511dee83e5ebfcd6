//! Platform administration: report review, account bans and verification,
//! anonymous-sender bans.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::models::{new_id, BannedUser, ReportReason, Role, User};
use crate::error::{AppError, AppResult};

/// Reason stored when an admin bans the sender of a reported message.
pub const ANON_BAN_REASON: &str = "Banned by admin";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdminStats {
    pub pending_reports: i64,
    pub active_users: i64,
    pub total_messages: i64,
    pub total_inboxes: i64,
    pub banned_senders: i64,
}

/// Platform-wide counts. Hidden-word filters never apply here.
pub fn stats(conn: &Connection) -> AppResult<AdminStats> {
    let count = |sql: &str| -> rusqlite::Result<i64> { conn.query_row(sql, [], |row| row.get(0)) };
    Ok(AdminStats {
        pending_reports: count("SELECT COUNT(*) FROM reports")?,
        active_users: count("SELECT COUNT(*) FROM users WHERE role != 'banned'")?,
        total_messages: count("SELECT COUNT(*) FROM messages")?,
        total_inboxes: count("SELECT COUNT(*) FROM inboxes")?,
        banned_senders: count("SELECT COUNT(*) FROM banned_users WHERE anon_id IS NOT NULL")?,
    })
}

/// A pending report with the context an admin needs to act on it.
#[derive(Debug, Clone, Serialize)]
pub struct ReportView {
    pub id: String,
    pub reason: ReportReason,
    pub created_at: String,
    pub message_id: String,
    pub message_content: String,
    pub anon_id: String,
    pub inbox_id: String,
    pub inbox_name: String,
    pub owner_username: String,
}

/// Pending reports, newest first. `query` matches the report id or the
/// sender's anon id, case-insensitively.
pub fn list_reports(conn: &Connection, query: Option<&str>) -> AppResult<Vec<ReportView>> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.reason, r.created_at, m.id, m.content, m.anon_id, i.id, i.name, u.username
         FROM reports r
         JOIN messages m ON m.id = r.message_id
         JOIN inboxes i ON i.id = m.inbox_id
         JOIN users u ON u.id = i.user_id
         ORDER BY r.created_at DESC, r.id DESC",
    )?;
    let reports = stmt
        .query_map([], |row| {
            Ok(ReportView {
                id: row.get(0)?,
                reason: row.get(1)?,
                created_at: row.get(2)?,
                message_id: row.get(3)?,
                message_content: row.get(4)?,
                anon_id: row.get(5)?,
                inbox_id: row.get(6)?,
                inbox_name: row.get(7)?,
                owner_username: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(match normalized(query) {
        Some(q) => reports
            .into_iter()
            .filter(|r| r.id.to_lowercase().contains(&q) || r.anon_id.to_lowercase().contains(&q))
            .collect(),
        None => reports,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    /// Remove the reported message (and with it the report)
    Delete,
    /// Ban the message's sender platform-wide and close the report
    Ban,
    /// Close the report, leave the message
    Ignore,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub report_id: String,
    pub message_id: String,
    pub inbox_id: String,
    pub action: &'static str,
}

pub fn review_report(
    conn: &mut Connection,
    report_id: &str,
    action: ReviewAction,
    admin_id: &str,
) -> AppResult<ReviewOutcome> {
    let tx = conn.transaction()?;

    let (message_id, anon_id, inbox_id): (String, String, String) = tx
        .query_row(
            "SELECT m.id, m.anon_id, m.inbox_id FROM reports r
             JOIN messages m ON m.id = r.message_id
             WHERE r.id = ?1",
            params![report_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?
        .ok_or(AppError::NotFound)?;

    let label = match action {
        ReviewAction::Delete => {
            tx.execute("DELETE FROM reports WHERE id = ?1", params![report_id])?;
            tx.execute("DELETE FROM messages WHERE id = ?1", params![message_id])?;
            "deleted"
        }
        ReviewAction::Ban => {
            tx.execute(
                "INSERT INTO banned_users (id, anon_id, reason, banned_by)
                 SELECT ?1, ?2, ?3, ?4
                 WHERE NOT EXISTS (SELECT 1 FROM banned_users WHERE anon_id = ?2)",
                params![new_id(), anon_id, ANON_BAN_REASON, admin_id],
            )?;
            tx.execute("DELETE FROM reports WHERE id = ?1", params![report_id])?;
            "banned"
        }
        ReviewAction::Ignore => {
            tx.execute("DELETE FROM reports WHERE id = ?1", params![report_id])?;
            "ignored"
        }
    };

    tx.commit()?;
    tracing::info!(report_id, %anon_id, action = label, admin_id, "Report reviewed");

    Ok(ReviewOutcome {
        report_id: report_id.to_string(),
        message_id,
        inbox_id,
        action: label,
    })
}

/// All accounts, newest first, optionally filtered by username or email.
pub fn list_users(conn: &Connection, query: Option<&str>) -> AppResult<Vec<User>> {
    let sql = format!(
        "SELECT {} FROM users ORDER BY created_at DESC, username",
        User::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map([], User::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(match normalized(query) {
        Some(q) => users
            .into_iter()
            .filter(|u| u.username.to_lowercase().contains(&q) || u.email.to_lowercase().contains(&q))
            .collect(),
        None => users,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAction {
    Ban,
    Unban,
    Verify,
    Unverify,
}

/// Apply one account action. Each action touches only its own columns.
pub fn apply_user_action(
    conn: &mut Connection,
    user_id: &str,
    action: UserAction,
    admin_id: &str,
    reason: Option<&str>,
) -> AppResult<User> {
    if action == UserAction::Ban && user_id == admin_id {
        return Err(AppError::BadRequest("You cannot ban yourself".into()));
    }

    let tx = conn.transaction()?;
    let updated = match action {
        UserAction::Ban => {
            let updated = tx.execute(
                "UPDATE users SET role = ?2 WHERE id = ?1",
                params![user_id, Role::Banned],
            )?;
            if updated > 0 {
                if let Some(reason) = reason.map(str::trim).filter(|r| !r.is_empty()) {
                    tx.execute(
                        "INSERT INTO banned_users (id, user_id, reason, banned_by) VALUES (?1, ?2, ?3, ?4)",
                        params![new_id(), user_id, reason, admin_id],
                    )?;
                }
                tx.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])?;
            }
            updated
        }
        UserAction::Unban => {
            tx.execute("DELETE FROM banned_users WHERE user_id = ?1", params![user_id])?;
            tx.execute(
                "UPDATE users SET role = ?2 WHERE id = ?1 AND role = ?3",
                params![user_id, Role::User, Role::Banned],
            )?;
            user_exists(&tx, user_id)?
        }
        UserAction::Verify => tx.execute(
            "UPDATE users SET is_verified = 1, verified_at = datetime('now'), verified_by = ?2
             WHERE id = ?1",
            params![user_id, admin_id],
        )?,
        UserAction::Unverify => tx.execute(
            "UPDATE users SET is_verified = 0, verified_at = NULL, verified_by = NULL WHERE id = ?1",
            params![user_id],
        )?,
    };

    if updated == 0 {
        return Err(AppError::NotFound);
    }

    let sql = format!("SELECT {} FROM users WHERE id = ?1", User::COLUMNS);
    let user = tx.query_row(&sql, params![user_id], User::from_row)?;
    tx.commit()?;

    tracing::info!(user_id, ?action, admin_id, "User action applied");
    Ok(user)
}

fn user_exists(conn: &Connection, user_id: &str) -> rusqlite::Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

pub fn list_bans(conn: &Connection) -> AppResult<Vec<BannedUser>> {
    let sql = format!(
        "SELECT {} FROM banned_users ORDER BY created_at DESC, id DESC",
        BannedUser::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let bans = stmt
        .query_map([], BannedUser::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(bans)
}

/// Lift a ban. Lifting an account ban also restores the account's role.
pub fn lift_ban(conn: &mut Connection, ban_id: &str) -> AppResult<()> {
    let tx = conn.transaction()?;
    let user_id: Option<String> = tx
        .query_row(
            "SELECT user_id FROM banned_users WHERE id = ?1",
            params![ban_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(AppError::NotFound)?;

    tx.execute("DELETE FROM banned_users WHERE id = ?1", params![ban_id])?;
    if let Some(user_id) = user_id {
        let remaining: i64 = tx.query_row(
            "SELECT COUNT(*) FROM banned_users WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        if remaining == 0 {
            tx.execute(
                "UPDATE users SET role = ?2 WHERE id = ?1 AND role = ?3",
                params![user_id, Role::User, Role::Banned],
            )?;
        }
    }
    tx.commit()?;

    tracing::info!(ban_id, "Ban lifted");
    Ok(())
}

fn normalized(query: Option<&str>) -> Option<String> {
    query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_lowercase)
}
