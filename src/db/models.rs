//! Typed rows. Every table is decoded here once; handlers never see raw
//! column values.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of values stored as lower-case TEXT.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("invalid {}: {}", stringify!($name), other)),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                text.parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

text_enum!(Role {
    User => "user",
    Admin => "admin",
    Banned => "banned",
});

text_enum!(Visibility {
    Public => "public",
    Private => "private",
});

text_enum!(ReportReason {
    Spam => "spam",
    Harassment => "harassment",
    Inappropriate => "inappropriate",
    HateSpeech => "hate_speech",
    Other => "other",
});

text_enum!(TokenKind {
    ConfirmEmail => "confirm_email",
    ResetPassword => "reset_password",
});

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub is_verified: bool,
    pub verified_at: Option<String>,
    pub verified_by: Option<String>,
    pub profile_picture: Option<String>,
    pub email_confirmed_at: Option<String>,
    pub created_at: String,
}

impl User {
    pub const COLUMNS: &'static str = "id, username, email, password_hash, role, is_verified, \
         verified_at, verified_by, profile_picture, email_confirmed_at, created_at";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            role: row.get(4)?,
            is_verified: row.get(5)?,
            verified_at: row.get(6)?,
            verified_by: row.get(7)?,
            profile_picture: row.get(8)?,
            email_confirmed_at: row.get(9)?,
            created_at: row.get(10)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Inbox {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub prompt_text: String,
    pub visibility: Visibility,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub created_at: String,
}

impl Inbox {
    pub const COLUMNS: &'static str =
        "id, user_id, name, prompt_text, visibility, password_hash, created_at";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            prompt_text: row.get(3)?,
            visibility: row.get(4)?,
            password_hash: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    pub fn is_private(&self) -> bool {
        self.visibility == Visibility::Private
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: String,
    pub inbox_id: String,
    pub anon_id: String,
    #[serde(skip_serializing)]
    pub anon_ip: String,
    pub content: String,
    pub is_replied: bool,
    pub is_flagged: bool,
    pub flag_reason: Option<ReportReason>,
    pub created_at: String,
}

impl Message {
    pub const COLUMNS: &'static str =
        "id, inbox_id, anon_id, anon_ip, content, is_replied, is_flagged, flag_reason, created_at";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            inbox_id: row.get(1)?,
            anon_id: row.get(2)?,
            anon_ip: row.get(3)?,
            content: row.get(4)?,
            is_replied: row.get(5)?,
            is_flagged: row.get(6)?,
            flag_reason: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub id: String,
    pub message_id: String,
    pub content: String,
    pub is_public: bool,
    pub created_at: String,
}

impl Reply {
    pub const COLUMNS: &'static str = "id, message_id, content, is_public, created_at";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Self::from_row_at(row, 0)
    }

    /// Decode a reply whose columns start at `offset` (LEFT JOIN results).
    /// Returns `None` when the joined reply is absent.
    pub fn from_joined_row(row: &Row, offset: usize) -> rusqlite::Result<Option<Self>> {
        let id: Option<String> = row.get(offset)?;
        match id {
            Some(_) => Self::from_row_at(row, offset).map(Some),
            None => Ok(None),
        }
    }

    fn from_row_at(row: &Row, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(offset)?,
            message_id: row.get(offset + 1)?,
            content: row.get(offset + 2)?,
            is_public: row.get(offset + 3)?,
            created_at: row.get(offset + 4)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub id: String,
    pub message_id: String,
    pub reason: ReportReason,
    pub created_at: String,
}

impl Report {
    pub const COLUMNS: &'static str = "id, message_id, reason, created_at";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            message_id: row.get(1)?,
            reason: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BannedUser {
    pub id: String,
    pub anon_id: Option<String>,
    pub user_id: Option<String>,
    pub reason: Option<String>,
    pub banned_by: Option<String>,
    pub created_at: String,
}

impl BannedUser {
    pub const COLUMNS: &'static str = "id, anon_id, user_id, reason, banned_by, created_at";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            anon_id: row.get(1)?,
            user_id: row.get(2)?,
            reason: row.get(3)?,
            banned_by: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockedUser {
    pub id: String,
    pub inbox_id: String,
    pub anon_ip: String,
    pub blocked_by: Option<String>,
    pub created_at: String,
}

impl BlockedUser {
    pub const COLUMNS: &'static str = "id, inbox_id, anon_ip, blocked_by, created_at";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            inbox_id: row.get(1)?,
            anon_ip: row.get(2)?,
            blocked_by: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HiddenWord {
    pub id: String,
    pub user_id: String,
    pub word: String,
    pub created_at: String,
}

impl HiddenWord {
    pub const COLUMNS: &'static str = "id, user_id, word, created_at";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            word: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

/// Generate a new row id.
pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn report_reason_round_trips_through_text() {
        assert_eq!("hate_speech".parse::<ReportReason>(), Ok(ReportReason::HateSpeech));
        assert_eq!(ReportReason::HateSpeech.as_str(), "hate_speech");
        assert!("hatespeech".parse::<ReportReason>().is_err());
    }

    #[test]
    fn enums_serialize_as_lower_case_strings() {
        assert_eq!(serde_json::to_string(&Role::Banned).unwrap(), "\"banned\"");
        assert_eq!(
            serde_json::from_str::<Visibility>("\"private\"").unwrap(),
            Visibility::Private
        );
    }

    #[test]
    fn unknown_enum_text_fails_decoding() {
        let conn = Connection::open_in_memory().unwrap();
        let result: rusqlite::Result<Role> =
            conn.query_row("SELECT 'superuser'", [], |row| row.get(0));
        assert!(result.is_err());
    }

    #[test]
    fn joined_reply_is_none_when_columns_are_null() {
        let conn = Connection::open_in_memory().unwrap();
        let reply = conn
            .query_row("SELECT NULL, NULL, NULL, NULL, NULL", [], |row| {
                Reply::from_joined_row(row, 0)
            })
            .unwrap();
        assert!(reply.is_none());
    }

    #[test]
    fn password_hashes_never_serialize() {
        let inbox = Inbox {
            id: "i".into(),
            user_id: "u".into(),
            name: "secrets".into(),
            prompt_text: "psst".into(),
            visibility: Visibility::Private,
            password_hash: Some("$2b$hash".into()),
            created_at: "now".into(),
        };
        let json = serde_json::to_string(&inbox).unwrap();
        assert!(!json.contains("hash"));
    }
}
