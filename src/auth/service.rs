//! Account lifecycle: registration, login, sessions and password reset.
//!
//! A user moves through `Registered -> LoggedIn -> LoggedOut`, with a side
//! state `ResetPending` while a reset token is outstanding. The session id
//! issued here is stored on the user row itself.

use tracing::{debug, error, info, warn};

use super::error::{AuthError, AuthResult};
use super::password::{hash_password, verify_password};
use super::session_store::MAX_SESSION_ID_ATTEMPTS;
use super::user_store::{UserLookup, UserStore};
use crate::db::schema::{UserRecord, UserUpdate};
use crate::types::{ResetToken, SessionId, UserId};

#[derive(Clone)]
pub struct AuthService {
    users: UserStore,
}

impl AuthService {
    pub fn new(users: UserStore) -> Self {
        Self { users }
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    /// Register a new account.
    pub async fn register(&self, email: &str, password: &str) -> AuthResult<UserRecord> {
        if self.users.find_user_by(UserLookup::Email(email)).await?.is_some() {
            return Err(AuthError::AlreadyExists(email.to_string()));
        }

        let hashed_password = hash_password(password)?;
        match self.users.add_user(email, &hashed_password).await {
            Ok(user) => {
                info!(user_id = %user.user_id, "User registered");
                Ok(user)
            }
            // lost a race against a concurrent registration
            Err(e) => match self.users.find_user_by(UserLookup::Email(email)).await {
                Ok(Some(_)) => Err(AuthError::AlreadyExists(email.to_string())),
                _ => Err(e.into()),
            },
        }
    }

    /// Whether `password` is the current password of `email`.
    pub async fn valid_login(&self, email: &str, password: &str) -> bool {
        match self.users.find_user_by(UserLookup::Email(email)).await {
            Ok(Some(user)) => verify_password(&user.hashed_password, password),
            Ok(None) => false,
            Err(e) => {
                error!(error = %e, "User lookup failed during login");
                false
            }
        }
    }

    /// Issue a session id for `email` and store it on the user.
    ///
    /// The id is checked against every user's current session before use.
    pub async fn create_session(&self, email: &str) -> Option<SessionId> {
        let user = match self.users.find_user_by(UserLookup::Email(email)).await {
            Ok(Some(user)) => user,
            Ok(None) => return None,
            Err(e) => {
                error!(error = %e, "User lookup failed while creating session");
                return None;
            }
        };

        for _ in 0..MAX_SESSION_ID_ATTEMPTS {
            let session_id = SessionId::generate();
            match self
                .users
                .find_user_by(UserLookup::SessionId(session_id.as_str()))
                .await
            {
                Ok(Some(_)) => {
                    debug!("Session id already assigned, regenerating");
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "Session uniqueness check failed");
                    return None;
                }
            }

            let update = UserUpdate {
                session_id: Some(Some(session_id.clone())),
                ..Default::default()
            };
            return match self.users.update_user(&user.user_id, update).await {
                Ok(true) => {
                    info!(user_id = %user.user_id, "Session created");
                    Some(session_id)
                }
                Ok(false) => None,
                Err(e) => {
                    error!(error = %e, "Failed to store session");
                    None
                }
            };
        }

        warn!(user_id = %user.user_id, "Could not generate a unique session id");
        None
    }

    /// User currently holding `session_id`.
    pub async fn get_user_from_session_id(&self, session_id: &str) -> Option<UserRecord> {
        if session_id.is_empty() {
            return None;
        }

        match self
            .users
            .find_user_by(UserLookup::SessionId(session_id))
            .await
        {
            Ok(user) => user,
            Err(e) => {
                error!(error = %e, "Session lookup failed");
                None
            }
        }
    }

    /// Clear the stored session of `user_id`. Unknown ids are ignored.
    pub async fn destroy_session(&self, user_id: &str) {
        if user_id.is_empty() {
            return;
        }

        let update = UserUpdate {
            session_id: Some(None),
            ..Default::default()
        };
        match self.users.update_user(&UserId::new(user_id), update).await {
            Ok(true) => info!(user_id, "Session destroyed"),
            Ok(false) => debug!(user_id, "No user to log out"),
            Err(e) => error!(error = %e, "Failed to clear session"),
        }
    }

    /// Generate and store a reset token for `email`.
    pub async fn get_reset_password_token(&self, email: &str) -> AuthResult<ResetToken> {
        let user = self
            .users
            .find_user_by(UserLookup::Email(email))
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let reset_token = ResetToken::generate();
        let update = UserUpdate {
            reset_token: Some(Some(reset_token.clone())),
            ..Default::default()
        };
        if !self.users.update_user(&user.user_id, update).await? {
            return Err(AuthError::UserNotFound);
        }

        info!(user_id = %user.user_id, "Reset token issued");
        Ok(reset_token)
    }

    /// Set a new password using a reset token. The token is consumed.
    pub async fn update_password(&self, reset_token: &str, password: &str) -> AuthResult<()> {
        if reset_token.is_empty() {
            return Err(AuthError::UserNotFound);
        }

        let user = self
            .users
            .find_user_by(UserLookup::ResetToken(reset_token))
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let update = UserUpdate {
            hashed_password: Some(hash_password(password)?),
            reset_token: Some(None),
            ..Default::default()
        };
        if !self.users.update_user(&user.user_id, update).await? {
            return Err(AuthError::UserNotFound);
        }

        info!(user_id = %user.user_id, "Password updated");
        Ok(())
    }
}
