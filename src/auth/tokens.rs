use rusqlite::{params, Connection, OptionalExtension};

use crate::auth::session::generate_token;
use crate::db::models::TokenKind;

/// Issue a one-shot token (email confirmation or password reset).
pub fn issue(
    conn: &Connection,
    user_id: &str,
    kind: TokenKind,
    ttl_minutes: u64,
) -> rusqlite::Result<String> {
    let token = generate_token();
    conn.execute(
        "INSERT INTO auth_tokens (token, user_id, kind, expires_at)
         VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![token, user_id, kind, format!("+{} minutes", ttl_minutes)],
    )?;
    Ok(token)
}

/// Mark a token used and return its user. `None` when the token is unknown,
/// of another kind, expired, or already used.
pub fn consume(conn: &Connection, token: &str, kind: TokenKind) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "UPDATE auth_tokens SET used_at = datetime('now')
         WHERE token = ?1 AND kind = ?2 AND used_at IS NULL AND expires_at > datetime('now')
         RETURNING user_id",
        params![token, kind],
        |row| row.get(0),
    )
    .optional()
}
