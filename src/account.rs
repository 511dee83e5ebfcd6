//! Account settings: profile changes, hidden words, account deletion.

use rusqlite::{params, Connection};
use serde::Deserialize;

use crate::auth::password;
use crate::db::models::{new_id, HiddenWord, User};
use crate::error::{is_unique_violation, AppError, AppResult};

pub const MAX_HIDDEN_WORD_LEN: usize = 50;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileChanges {
    pub username: Option<String>,
    /// Image URL; an empty string removes the picture.
    pub profile_picture: Option<String>,
}

fn validate_picture(url: &str) -> AppResult<Option<String>> {
    let url = url.trim();
    if url.is_empty() {
        return Ok(None);
    }
    if !(url.starts_with("https://") || url.starts_with("http://")) || url.contains(char::is_whitespace)
    {
        return Err(AppError::BadRequest(
            "Profile picture must be an http(s) URL".into(),
        ));
    }
    Ok(Some(url.to_string()))
}

pub fn update_profile(conn: &Connection, user_id: &str, changes: &ProfileChanges) -> AppResult<User> {
    if let Some(username) = &changes.username {
        let username = username.trim();
        password::validate_username(username)?;
        match conn.execute(
            "UPDATE users SET username = ?2 WHERE id = ?1",
            params![user_id, username],
        ) {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(AppError::Conflict("Username is already taken".into()))
            }
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(picture) = &changes.profile_picture {
        conn.execute(
            "UPDATE users SET profile_picture = ?2 WHERE id = ?1",
            params![user_id, validate_picture(picture)?],
        )?;
    }

    let sql = format!("SELECT {} FROM users WHERE id = ?1", User::COLUMNS);
    Ok(conn.query_row(&sql, params![user_id], User::from_row)?)
}

/// Remove the account and everything it owns.
pub fn delete_account(conn: &Connection, user_id: &str) -> AppResult<()> {
    let deleted = conn.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
    if deleted == 0 {
        return Err(AppError::NotFound);
    }
    tracing::info!(user_id, "Account deleted");
    Ok(())
}

pub fn list_hidden_words(conn: &Connection, user_id: &str) -> AppResult<Vec<HiddenWord>> {
    let sql = format!(
        "SELECT {} FROM hidden_words WHERE user_id = ?1 ORDER BY created_at, word",
        HiddenWord::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let words = stmt
        .query_map(params![user_id], HiddenWord::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(words)
}

pub fn add_hidden_word(conn: &Connection, user_id: &str, word: &str) -> AppResult<HiddenWord> {
    let word = word.trim();
    if word.is_empty() {
        return Err(AppError::BadRequest("Word is required".into()));
    }
    if word.chars().count() > MAX_HIDDEN_WORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Hidden words must be {} characters or less",
            MAX_HIDDEN_WORD_LEN
        )));
    }

    let id = new_id();
    match conn.execute(
        "INSERT INTO hidden_words (id, user_id, word) VALUES (?1, ?2, ?3)",
        params![id, user_id, word],
    ) {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::Conflict("You are already hiding this word".into()))
        }
        Err(e) => return Err(e.into()),
    }

    let sql = format!("SELECT {} FROM hidden_words WHERE id = ?1", HiddenWord::COLUMNS);
    Ok(conn.query_row(&sql, params![id], HiddenWord::from_row)?)
}

pub fn remove_hidden_word(conn: &Connection, user_id: &str, word_id: &str) -> AppResult<()> {
    let removed = conn.execute(
        "DELETE FROM hidden_words WHERE id = ?1 AND user_id = ?2",
        params![word_id, user_id],
    )?;
    if removed == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}
