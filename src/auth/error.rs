use std::fmt;

/// Errors surfaced by the account operations of the auth service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Email is already registered
    AlreadyExists(String),
    /// No user matches the given email or reset token
    UserNotFound,
    /// Storage or hashing failure
    Database(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyExists(email) => write!(f, "User {} already exists", email),
            Self::UserNotFound => write!(f, "User not found"),
            Self::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err.to_string())
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
