//! User storage and management.

use anyhow::Result;

use crate::db::Db;
use crate::db::schema::{UserCreate, UserRecord, UserUpdate};
use crate::types::UserId;

/// Column a user can be looked up by.
#[derive(Debug, Clone, Copy)]
pub enum UserLookup<'a> {
    Email(&'a str),
    Id(&'a UserId),
    SessionId(&'a str),
    ResetToken(&'a str),
}

impl UserLookup<'_> {
    fn column(&self) -> &'static str {
        match self {
            Self::Email(_) => "email",
            Self::Id(_) => "user_id",
            Self::SessionId(_) => "session_id",
            Self::ResetToken(_) => "reset_token",
        }
    }

    fn value(&self) -> String {
        match self {
            Self::Email(v) | Self::SessionId(v) | Self::ResetToken(v) => v.to_string(),
            Self::Id(id) => id.to_string(),
        }
    }
}

/// User store for database operations.
#[derive(Clone)]
pub struct UserStore {
    db: Db,
}

impl UserStore {
    /// Create a new user store.
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Find the first user whose column equals the lookup value.
    pub async fn find_user_by(&self, lookup: UserLookup<'_>) -> Result<Option<UserRecord>> {
        let query = format!(
            "SELECT * FROM user WHERE {} = $value LIMIT 1",
            lookup.column()
        );

        let mut res = self.db.query(query).bind(("value", lookup.value())).await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users.into_iter().next())
    }

    /// Persist a new user with a freshly generated id.
    ///
    /// Fails if the email is already registered (unique index).
    pub async fn add_user(&self, email: &str, hashed_password: &str) -> Result<UserRecord> {
        let create = UserCreate {
            user_id: UserId::generate(),
            email: email.to_string(),
            hashed_password: hashed_password.to_string(),
        };

        let query = r#"
            CREATE user CONTENT {
                user_id: $user_id,
                email: $email,
                hashed_password: $hashed_password
            }
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("user_id", create.user_id.into_inner()))
            .bind(("email", create.email))
            .bind(("hashed_password", create.hashed_password))
            .await?
            .check()?;

        let users: Vec<UserRecord> = res.take(0)?;
        users
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Failed to create user"))
    }

    /// Apply column changes to a user.
    ///
    /// Returns `false` when no user has `user_id`.
    pub async fn update_user(&self, user_id: &UserId, update: UserUpdate) -> Result<bool> {
        if update.is_empty() {
            return Ok(self.find_user_by(UserLookup::Id(user_id)).await?.is_some());
        }

        let mut sets = vec!["updated_at = time::now()"];
        if update.hashed_password.is_some() {
            sets.push("hashed_password = $hashed_password");
        }
        match &update.session_id {
            Some(Some(_)) => sets.push("session_id = $session_id"),
            Some(None) => sets.push("session_id = NONE"),
            None => {}
        }
        match &update.reset_token {
            Some(Some(_)) => sets.push("reset_token = $reset_token"),
            Some(None) => sets.push("reset_token = NONE"),
            None => {}
        }

        let query = format!(
            "UPDATE user SET {} WHERE user_id = $user_id RETURN AFTER",
            sets.join(", ")
        );

        let mut request = self.db.query(query).bind(("user_id", user_id.to_string()));
        if let Some(hashed_password) = update.hashed_password {
            request = request.bind(("hashed_password", hashed_password));
        }
        if let Some(Some(session_id)) = update.session_id {
            request = request.bind(("session_id", session_id.into_inner()));
        }
        if let Some(Some(reset_token)) = update.reset_token {
            request = request.bind(("reset_token", reset_token.into_inner()));
        }

        let mut res = request.await?.check()?;
        let updated: Vec<UserRecord> = res.take(0)?;
        Ok(!updated.is_empty())
    }

    /// All users, oldest first.
    pub async fn list_users(&self) -> Result<Vec<UserRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM user ORDER BY created_at ASC")
            .await?;
        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseConfig, create_connection, ensure_schema};
    use crate::types::{ResetToken, SessionId};

    async fn setup_store() -> UserStore {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();
        UserStore::new(db)
    }

    #[tokio::test]
    async fn test_add_and_find_user() {
        let store = setup_store().await;
        let user = store.add_user("test@test.com", "digest").await.unwrap();

        assert_eq!(user.email, "test@test.com");
        assert_eq!(user.hashed_password, "digest");
        assert!(user.session_id.is_none());
        assert!(user.reset_token.is_none());

        let by_email = store
            .find_user_by(UserLookup::Email("test@test.com"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.user_id, user.user_id);

        let by_id = store
            .find_user_by(UserLookup::Id(&user.user_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_id.email, "test@test.com");
    }

    #[tokio::test]
    async fn test_find_missing_user() {
        let store = setup_store().await;
        let found = store
            .find_user_by(UserLookup::Email("nobody@test.com"))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = setup_store().await;
        store.add_user("dup@test.com", "a").await.unwrap();
        assert!(store.add_user("dup@test.com", "b").await.is_err());
    }

    #[tokio::test]
    async fn test_update_sets_and_clears_optional_columns() {
        let store = setup_store().await;
        let user = store.add_user("u@test.com", "old").await.unwrap();

        let updated = store
            .update_user(
                &user.user_id,
                UserUpdate {
                    session_id: Some(Some(SessionId::new("s-1"))),
                    reset_token: Some(Some(ResetToken::new("r-1"))),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated);

        let by_session = store
            .find_user_by(UserLookup::SessionId("s-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_session.user_id, user.user_id);
        assert_eq!(by_session.reset_token, Some(ResetToken::new("r-1")));

        store
            .update_user(
                &user.user_id,
                UserUpdate {
                    hashed_password: Some("new".to_string()),
                    session_id: Some(None),
                    reset_token: Some(None),
                },
            )
            .await
            .unwrap();

        let user = store
            .find_user_by(UserLookup::Id(&user.user_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.hashed_password, "new");
        assert!(user.session_id.is_none());
        assert!(user.reset_token.is_none());
        assert!(
            store
                .find_user_by(UserLookup::ResetToken("r-1"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_update_unknown_user() {
        let store = setup_store().await;
        let missing = UserId::new("missing");

        let changed = store
            .update_user(
                &missing,
                UserUpdate {
                    hashed_password: Some("x".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!changed);
        assert!(!store.update_user(&missing, UserUpdate::default()).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_users() {
        let store = setup_store().await;
        assert!(store.list_users().await.unwrap().is_empty());

        store.add_user("a@test.com", "x").await.unwrap();
        store.add_user("b@test.com", "y").await.unwrap();

        let users = store.list_users().await.unwrap();
        assert_eq!(users.len(), 2);
    }
}
