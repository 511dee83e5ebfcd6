//! Credential rules and bcrypt helpers shared by account and private-inbox
//! passwords.

use crate::error::{AppError, AppResult};

pub const MIN_PASSWORD_LEN: usize = 6;
const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=32;

pub fn hash(plaintext: &str, cost: u32) -> AppResult<String> {
    Ok(bcrypt::hash(plaintext, cost)?)
}

/// Constant-time check via bcrypt; a malformed hash counts as a mismatch.
pub fn verify(plaintext: &str, hash: &str) -> bool {
    bcrypt::verify(plaintext, hash).unwrap_or(false)
}

pub fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Usernames appear in URLs: ASCII letters, digits, `_`, `-` and `.` only.
pub fn validate_username(username: &str) -> AppResult<()> {
    if !USERNAME_LEN.contains(&username.len()) {
        return Err(AppError::BadRequest(format!(
            "Username must be between {} and {} characters",
            USERNAME_LEN.start(),
            USERNAME_LEN.end()
        )));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.');
    if !username.chars().all(allowed) {
        return Err(AppError::BadRequest(
            "Username may only contain letters, numbers, '_', '-' and '.'".into(),
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> AppResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(AppError::BadRequest("Invalid email address".into()));
    }
    Ok(())
}
