//! Inbox management for owners plus the read models behind the owner
//! dashboard and the public profile.

use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::auth::password;
use crate::db::models::{new_id, Inbox, Message, Reply, User, Visibility};
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::submission::inbox_slug;
use crate::visibility::{is_publicly_visible, HiddenWordFilter};

pub const MAX_NAME_LEN: usize = 32;
pub const MAX_PROMPT_LEN: usize = 200;
/// Messages shown in the owner's "recent" list.
pub const RECENT_LIMIT: usize = 20;
const FEED_LIMIT: usize = 50;

/// Inbox names become URL segments.
pub fn validate_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Inbox link is required".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::BadRequest(format!(
            "Inbox link must be {} characters or less",
            MAX_NAME_LEN
        )));
    }
    let allowed = |c: char| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_');
    if !name.chars().all(allowed) {
        return Err(AppError::BadRequest(
            "Inbox link may only contain letters, numbers, spaces, '-' and '_'".into(),
        ));
    }
    Ok(name.to_string())
}

pub fn validate_prompt(prompt: &str) -> AppResult<String> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(AppError::BadRequest("Prompt is required".into()));
    }
    if prompt.chars().count() > MAX_PROMPT_LEN {
        return Err(AppError::BadRequest(format!(
            "Prompt must be {} characters or less",
            MAX_PROMPT_LEN
        )));
    }
    Ok(prompt.to_string())
}

/// Trimmed private-inbox password, required and hashed when private.
fn private_password_hash(password: Option<&str>, cost: u32) -> AppResult<String> {
    match password.map(str::trim).filter(|p| !p.is_empty()) {
        Some(plain) => password::hash(plain, cost),
        None => Err(AppError::BadRequest(
            "Private inboxes require a password".into(),
        )),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInbox {
    pub name: String,
    pub prompt_text: String,
    #[serde(default = "default_visibility")]
    pub visibility: Visibility,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_visibility() -> Visibility {
    Visibility::Public
}

/// Whether `name` is free among the owner's inboxes.
pub fn is_available(conn: &Connection, owner_id: &str, name: &str) -> AppResult<bool> {
    let taken: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM inboxes WHERE user_id = ?1 AND slug = ?2",
        params![owner_id, inbox_slug(name)],
        |row| row.get(0),
    )?;
    Ok(!taken)
}

pub fn create(
    conn: &mut Connection,
    owner_id: &str,
    new: &NewInbox,
    max_inboxes: usize,
    bcrypt_cost: u32,
) -> AppResult<Inbox> {
    let name = validate_name(&new.name)?;
    let prompt = validate_prompt(&new.prompt_text)?;
    let password_hash = match new.visibility {
        Visibility::Private => Some(private_password_hash(new.password.as_deref(), bcrypt_cost)?),
        Visibility::Public => None,
    };

    let tx = conn.transaction()?;
    let owned: i64 = tx.query_row(
        "SELECT COUNT(*) FROM inboxes WHERE user_id = ?1",
        params![owner_id],
        |row| row.get(0),
    )?;
    if owned as usize >= max_inboxes {
        return Err(AppError::BadRequest(format!(
            "You can only create up to {} inboxes",
            max_inboxes
        )));
    }

    let id = new_id();
    let inserted = tx.execute(
        "INSERT INTO inboxes (id, user_id, name, slug, prompt_text, visibility, password_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![id, owner_id, name, inbox_slug(&name), prompt, new.visibility, password_hash],
    );
    match inserted {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::Conflict(
                "This inbox link is already taken".into(),
            ))
        }
        Err(e) => return Err(e.into()),
    }

    let inbox = load(&tx, &id)?.ok_or(AppError::NotFound)?;
    tx.commit()?;

    tracing::info!(inbox_id = %inbox.id, owner_id, visibility = %inbox.visibility, "Inbox created");
    Ok(inbox)
}

fn load(conn: &Connection, inbox_id: &str) -> rusqlite::Result<Option<Inbox>> {
    let sql = format!("SELECT {} FROM inboxes WHERE id = ?1", Inbox::COLUMNS);
    conn.query_row(&sql, params![inbox_id], Inbox::from_row)
        .optional()
}

/// 404 when missing, 403 when someone else's.
pub fn owned_inbox(conn: &Connection, inbox_id: &str, owner_id: &str) -> AppResult<Inbox> {
    match load(conn, inbox_id)? {
        Some(inbox) if inbox.user_id == owner_id => Ok(inbox),
        Some(_) => Err(AppError::Forbidden("You do not own this inbox".into())),
        None => Err(AppError::NotFound),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboxChanges {
    pub prompt_text: Option<String>,
    pub visibility: Option<Visibility>,
    /// New private-inbox password. Ignored for public inboxes.
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdatedInbox {
    pub inbox: Inbox,
    /// Outstanding access grants must be dropped.
    pub access_changed: bool,
}

pub fn update(
    conn: &Connection,
    inbox: &Inbox,
    changes: &InboxChanges,
    bcrypt_cost: u32,
) -> AppResult<UpdatedInbox> {
    let prompt = match &changes.prompt_text {
        Some(prompt) => validate_prompt(prompt)?,
        None => inbox.prompt_text.clone(),
    };
    let visibility = changes.visibility.unwrap_or(inbox.visibility);
    let new_password = changes
        .password
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());

    let password_hash = match (visibility, new_password, &inbox.password_hash) {
        (Visibility::Public, _, _) => None,
        (Visibility::Private, Some(plain), _) => Some(password::hash(plain, bcrypt_cost)?),
        (Visibility::Private, None, Some(existing)) => Some(existing.clone()),
        (Visibility::Private, None, None) => {
            return Err(AppError::BadRequest(
                "Private inboxes require a password".into(),
            ))
        }
    };
    let access_changed =
        visibility != inbox.visibility || (visibility == Visibility::Private && new_password.is_some());

    conn.execute(
        "UPDATE inboxes SET prompt_text = ?2, visibility = ?3, password_hash = ?4 WHERE id = ?1",
        params![inbox.id, prompt, visibility, password_hash],
    )?;

    let inbox = load(conn, &inbox.id)?.ok_or(AppError::NotFound)?;
    tracing::info!(inbox_id = %inbox.id, access_changed, "Inbox updated");
    Ok(UpdatedInbox {
        inbox,
        access_changed,
    })
}

pub fn delete(conn: &Connection, inbox_id: &str) -> AppResult<()> {
    let deleted = conn.execute("DELETE FROM inboxes WHERE id = ?1", params![inbox_id])?;
    if deleted == 0 {
        return Err(AppError::NotFound);
    }
    tracing::info!(inbox_id, "Inbox deleted");
    Ok(())
}

/// Owner's view of one inbox.
#[derive(Debug, Clone, Serialize)]
pub struct InboxSummary {
    #[serde(flatten)]
    pub inbox: Inbox,
    /// Unreplied messages the owner can see (hidden words excluded)
    pub unreplied_count: usize,
}

pub fn list_owned(conn: &Connection, owner_id: &str) -> AppResult<Vec<InboxSummary>> {
    let sql = format!(
        "SELECT {} FROM inboxes WHERE user_id = ?1 ORDER BY created_at, id",
        Inbox::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let inboxes = stmt
        .query_map(params![owner_id], Inbox::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let filter = HiddenWordFilter::load(conn, owner_id)?;
    let mut stmt = conn.prepare(
        "SELECT m.inbox_id, m.content FROM messages m
         JOIN inboxes i ON i.id = m.inbox_id
         WHERE i.user_id = ?1 AND m.is_replied = 0",
    )?;
    let mut counts: HashMap<String, usize> = HashMap::new();
    let rows = stmt.query_map(params![owner_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (inbox_id, content) = row?;
        if !filter.hides(&content) {
            *counts.entry(inbox_id).or_default() += 1;
        }
    }

    Ok(inboxes
        .into_iter()
        .map(|inbox| {
            let unreplied_count = counts.get(&inbox.id).copied().unwrap_or(0);
            InboxSummary {
                inbox,
                unreplied_count,
            }
        })
        .collect())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageTab {
    #[default]
    Unreplied,
    Replied,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageWithReply {
    #[serde(flatten)]
    pub message: Message,
    pub reply: Option<Reply>,
}

/// Messages of one inbox for its owner, newest first, hidden words removed.
pub fn inbox_messages(
    conn: &Connection,
    inbox: &Inbox,
    tab: MessageTab,
) -> AppResult<Vec<MessageWithReply>> {
    let sql = format!(
        "SELECT {}, r.id, r.message_id, r.content, r.is_public, r.created_at
         FROM messages m
         LEFT JOIN replies r ON r.message_id = m.id
         WHERE m.inbox_id = ?1 AND m.is_replied = ?2
         ORDER BY m.created_at DESC, m.id DESC",
        prefixed(Message::COLUMNS, "m")
    );
    let mut stmt = conn.prepare(&sql)?;
    let messages = stmt
        .query_map(params![inbox.id, tab == MessageTab::Replied], |row| {
            Ok(MessageWithReply {
                message: Message::from_row(row)?,
                reply: Reply::from_joined_row(row, 9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let filter = HiddenWordFilter::load(conn, &inbox.user_id)?;
    Ok(filter.retain_visible(messages, |m| m.message.content.as_str()))
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentMessage {
    #[serde(flatten)]
    pub message: Message,
    pub inbox_name: String,
}

/// Most recent unreplied messages across all of the owner's inboxes.
pub fn recent_unreplied(
    conn: &Connection,
    owner_id: &str,
    limit: usize,
) -> AppResult<Vec<RecentMessage>> {
    let sql = format!(
        "SELECT {}, i.name FROM messages m
         JOIN inboxes i ON i.id = m.inbox_id
         WHERE i.user_id = ?1 AND m.is_replied = 0
         ORDER BY m.created_at DESC, m.id DESC",
        prefixed(Message::COLUMNS, "m")
    );
    let mut stmt = conn.prepare(&sql)?;
    let messages = stmt
        .query_map(params![owner_id], |row| {
            Ok(RecentMessage {
                message: Message::from_row(row)?,
                inbox_name: row.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let filter = HiddenWordFilter::load(conn, owner_id)?;
    let mut visible = filter.retain_visible(messages, |m| m.message.content.as_str());
    visible.truncate(limit);
    Ok(visible)
}

/// Qualify every column in a `COLUMNS` list with a table alias.
fn prefixed(columns: &str, alias: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// What the public inbox page shows. Never carries the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct PublicInbox {
    pub name: String,
    pub prompt_text: String,
    pub owner_username: String,
    pub owner_picture: Option<String>,
    pub owner_verified: bool,
    pub requires_password: bool,
}

fn find_user(conn: &Connection, username: &str) -> AppResult<User> {
    let sql = format!(
        "SELECT {} FROM users WHERE username = ?1 AND role != 'banned'",
        User::COLUMNS
    );
    conn.query_row(&sql, params![username], User::from_row)
        .optional()?
        .ok_or(AppError::NotFound)
}

pub fn public_inbox(conn: &Connection, username: &str, inbox_name: &str) -> AppResult<PublicInbox> {
    let owner = find_user(conn, username)?;
    let sql = format!(
        "SELECT {} FROM inboxes WHERE user_id = ?1 AND slug = ?2",
        Inbox::COLUMNS
    );
    let inbox = conn
        .query_row(&sql, params![owner.id, inbox_slug(inbox_name)], Inbox::from_row)
        .optional()?
        .ok_or(AppError::NotFound)?;

    Ok(PublicInbox {
        requires_password: inbox.is_private(),
        name: inbox.name,
        prompt_text: inbox.prompt_text,
        owner_username: owner.username,
        owner_picture: owner.profile_picture,
        owner_verified: owner.is_verified,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedItem {
    pub message_id: String,
    pub question: String,
    pub answer: String,
    pub inbox_name: String,
    pub answered_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileInbox {
    pub name: String,
    pub prompt_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub username: String,
    pub profile_picture: Option<String>,
    pub is_verified: bool,
    pub inboxes: Vec<ProfileInbox>,
    pub total_messages: i64,
    pub feed: Vec<FeedItem>,
}

pub fn profile(conn: &Connection, username: &str) -> AppResult<Profile> {
    let owner = find_user(conn, username)?;

    let sql = format!(
        "SELECT {} FROM inboxes WHERE user_id = ?1 ORDER BY created_at, id",
        Inbox::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let inboxes: HashMap<String, Inbox> = stmt
        .query_map(params![owner.id], Inbox::from_row)?
        .map(|r| r.map(|inbox| (inbox.id.clone(), inbox)))
        .collect::<Result<_, _>>()?;

    let total_messages: i64 = conn.query_row(
        "SELECT COUNT(*) FROM messages m JOIN inboxes i ON i.id = m.inbox_id WHERE i.user_id = ?1",
        params![owner.id],
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {}, r.id, r.message_id, r.content, r.is_public, r.created_at
         FROM messages m
         JOIN inboxes i ON i.id = m.inbox_id
         JOIN replies r ON r.message_id = m.id
         WHERE i.user_id = ?1
         ORDER BY r.created_at DESC, r.id DESC",
        prefixed(Message::COLUMNS, "m")
    );
    let mut stmt = conn.prepare(&sql)?;
    let answered = stmt
        .query_map(params![owner.id], |row| {
            Ok((Message::from_row(row)?, Reply::from_joined_row(row, 9)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let feed = answered
        .into_iter()
        .filter_map(|(message, reply)| {
            let inbox = inboxes.get(&message.inbox_id)?;
            if !is_publicly_visible(inbox, &message, reply.as_ref()) {
                return None;
            }
            let reply = reply?;
            Some(FeedItem {
                message_id: message.id,
                question: message.content,
                answer: reply.content,
                inbox_name: inbox.name.clone(),
                answered_at: reply.created_at,
            })
        })
        .take(FEED_LIMIT)
        .collect();

    let mut public: Vec<&Inbox> = inboxes
        .values()
        .filter(|inbox| inbox.visibility == Visibility::Public)
        .collect();
    public.sort_by(|a, b| (&a.created_at, &a.id).cmp(&(&b.created_at, &b.id)));

    Ok(Profile {
        inboxes: public
            .into_iter()
            .map(|inbox| ProfileInbox {
                name: inbox.name.clone(),
                prompt_text: inbox.prompt_text.clone(),
            })
            .collect(),
        username: owner.username,
        profile_picture: owner.profile_picture,
        is_verified: owner.is_verified,
        total_messages,
        feed,
    })
}
