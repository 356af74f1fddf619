/// Session persistence operations
///
/// Sqlite-backed [`SessionStore`]. All queries are parameterized.
use crate::session::{PersistedSession, SessionStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// Listing row for a stored session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub turn: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Session repository for database operations
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    /// Create a new session repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// List stored sessions, most recently updated first
    pub async fn list(&self, limit: i64) -> Result<Vec<SessionSummary>> {
        let rows = sqlx::query(
            "SELECT id, turn, created_at, updated_at FROM sessions ORDER BY updated_at DESC, id LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list sessions")?;

        rows.into_iter()
            .map(|row| -> Result<SessionSummary> {
                Ok(SessionSummary {
                    id: row.try_get("id")?,
                    turn: row.try_get::<i64, _>("turn")?.max(0) as u32,
                    created_at: row.try_get("created_at")?,
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect()
    }

    /// Remove a session. Returns whether a row was deleted.
    pub async fn delete(&self, session_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete session")?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SessionStore for SessionRepository {
    async fn load(&self, session_id: &str) -> Result<Option<PersistedSession>> {
        let row = sqlx::query("SELECT turn, session_json, tracker_json FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load session")?;

        row.map(|row| -> Result<PersistedSession> {
            Ok(PersistedSession {
                turn: row.try_get::<i64, _>("turn")?.max(0) as u32,
                session_json: row.try_get("session_json")?,
                tracker_json: row.try_get("tracker_json")?,
            })
        })
        .transpose()
    }

    async fn save(&self, session_id: &str, session: &PersistedSession) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            "INSERT INTO sessions (id, session_json, tracker_json, turn, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                session_json = excluded.session_json,
                tracker_json = excluded.tracker_json,
                turn = excluded.turn,
                updated_at = excluded.updated_at",
        )
        .bind(session_id)
        .bind(&session.session_json)
        .bind(&session.tracker_json)
        .bind(session.turn as i64)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to save session")?;

        debug!("Saved session {} at turn {}", session_id, session.turn);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use tempfile::TempDir;

    fn blobs(turn: u32) -> PersistedSession {
        PersistedSession {
            turn,
            session_json: format!("{{\"turn\":{}}}", turn),
            tracker_json: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn test_save_load_and_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        let repo = db.sessions();

        assert!(repo.load("s1").await.unwrap().is_none());

        repo.save("s1", &blobs(1)).await.unwrap();
        repo.save("s1", &blobs(2)).await.unwrap();
        assert_eq!(repo.load("s1").await.unwrap(), Some(blobs(2)));

        let listed = repo.list(10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].turn, 2);

        assert!(repo.delete("s1").await.unwrap());
        assert!(!repo.delete("s1").await.unwrap());

        db.close().await.unwrap();
    }
}
