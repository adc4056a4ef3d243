use serde::{Deserialize, Serialize};
use surrealdb::{RecordId, sql::Datetime};

use crate::types::{ResetToken, SessionId, UserId};

/// Persisted user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Storage record identifier (table: `user`).
    pub id: RecordId,
    /// Stable user identifier exposed to sessions and clients.
    pub user_id: UserId,
    /// Login email, unique and compared as stored.
    pub email: String,
    /// Argon2 PHC string of the current password.
    pub hashed_password: String,
    /// Session issued by the last login, cleared on logout.
    pub session_id: Option<SessionId>,
    /// Outstanding password reset token, cleared once used.
    pub reset_token: Option<ResetToken>,
    pub created_at: Option<Datetime>,
    pub updated_at: Option<Datetime>,
}

/// Payload for creating a new user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreate {
    pub user_id: UserId,
    pub email: String,
    pub hashed_password: String,
}

/// Column changes applied by `UserStore::update_user`.
///
/// `None` leaves a column untouched. For the optional columns,
/// `Some(None)` clears the stored value.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub hashed_password: Option<String>,
    pub session_id: Option<Option<SessionId>>,
    pub reset_token: Option<Option<ResetToken>>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.hashed_password.is_none() && self.session_id.is_none() && self.reset_token.is_none()
    }
}

/// Persisted server-side session (table: `session`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: RecordId,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub created_at: Option<Datetime>,
}

/// Public view of a user, safe to return over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: UserId,
    pub email: String,
}

impl From<&UserRecord> for UserView {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.user_id.clone(),
            email: user.email.clone(),
        }
    }
}

/// Format a user row as `key=value; ` pairs for the redacting logger.
pub fn user_log_line(user: &UserRecord) -> String {
    let optional = |value: Option<&str>| value.unwrap_or("").to_string();
    let fields = [
        ("user_id", user.user_id.to_string()),
        ("email", user.email.clone()),
        ("hashed_password", user.hashed_password.clone()),
        ("session_id", optional(user.session_id.as_ref().map(|s| s.as_str()))),
        ("reset_token", optional(user.reset_token.as_ref().map(|t| t.as_str()))),
        (
            "created_at",
            user.created_at
                .as_ref()
                .map(|dt| dt.to_string())
                .unwrap_or_default(),
        ),
    ];

    fields
        .iter()
        .map(|(key, value)| format!("{}={}; ", key, value))
        .collect::<String>()
        .trim()
        .to_string()
}
