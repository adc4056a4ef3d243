//! Server-side mapping from session id to user id.
//!
//! One store instance is built at startup and shared by handle
//! (`Arc<dyn SessionStore>`) with the session authenticator. Two backends
//! exist: a process-local map and a `session` table in the database.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::db::Db;
use crate::db::schema::SessionRecord;
use crate::types::{SessionId, UserId};

/// Upper bound on id generation attempts before giving up.
pub const MAX_SESSION_ID_ATTEMPTS: usize = 8;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Start a session for `user_id`. `None` for an empty user id.
    async fn create(&self, user_id: &str) -> Option<SessionId>;

    /// User owning `session_id`, if the session exists.
    async fn lookup(&self, session_id: &str) -> Option<UserId>;

    /// Remove a session. `true` only if it existed.
    async fn destroy(&self, session_id: &str) -> bool;

    /// Called once when the process stops.
    async fn shutdown(&self) {}
}

/// Process-local session map.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, UserId>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.sessions.write().await.clear();
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, user_id: &str) -> Option<SessionId> {
        if user_id.is_empty() {
            return None;
        }

        let mut sessions = self.sessions.write().await;
        for _ in 0..MAX_SESSION_ID_ATTEMPTS {
            let session_id = SessionId::generate();
            if sessions.contains_key(&session_id) {
                debug!("Session id collision, regenerating");
                continue;
            }
            sessions.insert(session_id.clone(), UserId::new(user_id));
            return Some(session_id);
        }

        warn!("Could not generate a unique session id");
        None
    }

    async fn lookup(&self, session_id: &str) -> Option<UserId> {
        if session_id.is_empty() {
            return None;
        }
        self.sessions.read().await.get(session_id).cloned()
    }

    async fn destroy(&self, session_id: &str) -> bool {
        if session_id.is_empty() {
            return false;
        }
        self.sessions.write().await.remove(session_id).is_some()
    }

    async fn shutdown(&self) {
        info!("Dropping {} in-memory sessions", self.len().await);
        self.clear().await;
    }
}

/// Sessions persisted in the `session` table.
///
/// The unique index on `session_id` rejects a colliding id; creation then
/// retries with a new one.
#[derive(Clone)]
pub struct DbSessionStore {
    db: Db,
}

impl DbSessionStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn insert(&self, session_id: &SessionId, user_id: &str) -> Result<()> {
        let query = r#"
            CREATE session CONTENT {
                session_id: $session_id,
                user_id: $user_id
            }
        "#;

        self.db
            .query(query)
            .bind(("session_id", session_id.to_string()))
            .bind(("user_id", user_id.to_string()))
            .await?
            .check()?;

        Ok(())
    }

    async fn find(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM session WHERE session_id = $session_id LIMIT 1")
            .bind(("session_id", session_id.to_string()))
            .await?;

        let sessions: Vec<SessionRecord> = res.take(0)?;
        Ok(sessions.into_iter().next())
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        let mut res = self
            .db
            .query("DELETE session WHERE session_id = $session_id RETURN BEFORE")
            .bind(("session_id", session_id.to_string()))
            .await?;

        let removed: Vec<SessionRecord> = res.take(0)?;
        Ok(!removed.is_empty())
    }
}

#[async_trait]
impl SessionStore for DbSessionStore {
    async fn create(&self, user_id: &str) -> Option<SessionId> {
        if user_id.is_empty() {
            return None;
        }

        for attempt in 1..=MAX_SESSION_ID_ATTEMPTS {
            let session_id = SessionId::generate();
            match self.insert(&session_id, user_id).await {
                Ok(()) => return Some(session_id),
                Err(e) => debug!(attempt, error = %e, "Session insert rejected, retrying"),
            }
        }

        error!("Could not persist a session after {} attempts", MAX_SESSION_ID_ATTEMPTS);
        None
    }

    async fn lookup(&self, session_id: &str) -> Option<UserId> {
        if session_id.is_empty() {
            return None;
        }

        match self.find(session_id).await {
            Ok(record) => record.map(|s| s.user_id),
            Err(e) => {
                error!(error = %e, "Session lookup failed");
                None
            }
        }
    }

    async fn destroy(&self, session_id: &str) -> bool {
        if session_id.is_empty() {
            return false;
        }

        match self.delete(session_id).await {
            Ok(removed) => removed,
            Err(e) => {
                error!(error = %e, "Session delete failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseConfig, create_connection, ensure_schema};

    async fn setup_db_store() -> DbSessionStore {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();
        DbSessionStore::new(db)
    }

    async fn assert_lifecycle(store: &dyn SessionStore) {
        let sid = store.create("user-1").await.unwrap();
        assert_eq!(store.lookup(sid.as_str()).await, Some(UserId::new("user-1")));

        assert!(store.destroy(sid.as_str()).await);
        assert!(store.lookup(sid.as_str()).await.is_none());
        assert!(!store.destroy(sid.as_str()).await);
    }

    async fn assert_empty_inputs(store: &dyn SessionStore) {
        assert!(store.create("").await.is_none());
        assert!(store.lookup("").await.is_none());
        assert!(store.lookup("unknown").await.is_none());
        assert!(!store.destroy("").await);
        assert!(!store.destroy("unknown").await);
    }

    async fn assert_ids_are_distinct(store: &dyn SessionStore) {
        let a = store.create("user-1").await.unwrap();
        let b = store.create("user-1").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.lookup(a.as_str()).await, Some(UserId::new("user-1")));
        assert_eq!(store.lookup(b.as_str()).await, Some(UserId::new("user-1")));
    }

    #[tokio::test]
    async fn test_memory_store_lifecycle() {
        let store = MemorySessionStore::new();
        assert_lifecycle(&store).await;
        assert_empty_inputs(&store).await;
        assert_ids_are_distinct(&store).await;
    }

    #[tokio::test]
    async fn test_memory_store_is_shared_between_clones() {
        let store = MemorySessionStore::new();
        let handle = store.clone();

        let sid = store.create("user-9").await.unwrap();
        assert_eq!(handle.lookup(sid.as_str()).await, Some(UserId::new("user-9")));
        assert_eq!(handle.len().await, 1);
    }

    #[tokio::test]
    async fn test_memory_store_shutdown_clears() {
        let store = MemorySessionStore::new();
        store.create("user-1").await.unwrap();
        store.create("user-2").await.unwrap();
        assert_eq!(store.len().await, 2);

        store.shutdown().await;
        assert!(store.is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_memory_store_concurrent_create_destroy() {
        let store = Arc::new(MemorySessionStore::new());

        let creates: Vec<_> = (0..50)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let session_id = store.create(&format!("user-{}", i)).await.unwrap();
                    (format!("user-{}", i), session_id)
                })
            })
            .collect();
        let mut sessions = Vec::new();
        for handle in creates {
            sessions.push(handle.await.unwrap());
        }
        assert_eq!(store.len().await, 50);

        let (destroyed, kept) = sessions.split_at(25);
        let destroys: Vec<_> = destroyed
            .iter()
            .map(|(_, session_id)| {
                let store = store.clone();
                let session_id = session_id.clone();
                tokio::spawn(async move { store.destroy(session_id.as_str()).await })
            })
            .collect();
        for handle in destroys {
            assert!(handle.await.unwrap());
        }

        assert_eq!(store.len().await, 25);
        for (_, session_id) in destroyed {
            assert_eq!(store.lookup(session_id.as_str()).await, None);
        }
        for (user_id, session_id) in kept {
            assert_eq!(
                store.lookup(session_id.as_str()).await,
                Some(UserId::new(user_id.as_str()))
            );
        }
    }

    #[tokio::test]
    async fn test_db_store_lifecycle() {
        let store = setup_db_store().await;
        assert_lifecycle(&store).await;
        assert_empty_inputs(&store).await;
        assert_ids_are_distinct(&store).await;
    }

    #[tokio::test]
    async fn test_db_store_rejects_duplicate_id() {
        let store = setup_db_store().await;
        let sid = SessionId::new("fixed");

        store.insert(&sid, "user-1").await.unwrap();
        assert!(store.insert(&sid, "user-2").await.is_err());
        assert_eq!(store.lookup("fixed").await, Some(UserId::new("user-1")));
    }

    #[tokio::test]
    async fn test_db_store_survives_shutdown() {
        let store = setup_db_store().await;
        let sid = store.create("user-1").await.unwrap();

        store.shutdown().await;
        assert_eq!(store.lookup(sid.as_str()).await, Some(UserId::new("user-1")));
    }
}
