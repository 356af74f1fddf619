//! Session persistence contract
//!
//! The orchestrator hands state to a [`SessionStore`] only at turn
//! boundaries: one `load` before the turn, one `save` after it.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// The two blobs stored per session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    /// Completed turns at save time
    pub turn: u32,
    pub session_json: String,
    pub tracker_json: String,
}

/// Persistence collaborator
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a session; `None` if it was never saved
    async fn load(&self, session_id: &str) -> Result<Option<PersistedSession>>;

    /// Insert or replace a session
    async fn save(&self, session_id: &str, session: &PersistedSession) -> Result<()>;
}

/// In-process store used by tests and the `simulate` command
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, PersistedSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the stored blobs directly
    pub async fn put(&self, session_id: &str, session: PersistedSession) {
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), session);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<PersistedSession>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn save(&self, session_id: &str, session: &PersistedSession) -> Result<()> {
        self.put(session_id, session.clone()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemorySessionStore::new();
        assert!(store.load("s1").await.unwrap().is_none());

        let blobs = PersistedSession {
            turn: 1,
            session_json: "{}".to_string(),
            tracker_json: "{}".to_string(),
        };
        store.save("s1", &blobs).await.unwrap();
        assert_eq!(store.load("s1").await.unwrap(), Some(blobs));
    }
}
