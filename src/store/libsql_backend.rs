//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::intake::model::IntakeSession;
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

const SESSION_COLUMNS: &str =
    "id, workspace_id, current_step, steps, completed_steps, completed, created_at, updated_at";

fn row_to_session(row: &libsql::Row) -> Result<IntakeSession, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Query(format!("row_to_session: {e}"));

    let id_str: String = row.get(0).map_err(read)?;
    let steps_json: String = row.get(3).map_err(read)?;
    let completed_json: String = row.get(4).map_err(read)?;
    let created_at: String = row.get(6).map_err(read)?;
    let updated_at: String = row.get(7).map_err(read)?;

    Ok(IntakeSession {
        id: id_str
            .parse()
            .map_err(|e| DatabaseError::Serialization(format!("session id {id_str}: {e}")))?,
        workspace_id: row.get(1).map_err(read)?,
        current_step: row.get::<i64>(2).map_err(read)?.max(0) as usize,
        steps: serde_json::from_str(&steps_json)
            .map_err(|e| DatabaseError::Serialization(format!("session steps: {e}")))?,
        completed_steps: serde_json::from_str(&completed_json)
            .map_err(|e| DatabaseError::Serialization(format!("session completed_steps: {e}")))?,
        completed: row.get::<i64>(5).map_err(read)? != 0,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

fn session_json(session: &IntakeSession) -> Result<(String, String), DatabaseError> {
    let steps = serde_json::to_string(&session.steps)
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    let completed = serde_json::to_string(&session.completed_steps)
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    Ok((steps, completed))
}

// ── Database trait implementation ───────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Settings ────────────────────────────────────────────────────

    async fn get_setting(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                "SELECT value FROM settings WHERE user_id = ?1 AND key = ?2",
                params![user_id, key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_setting: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value_str: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("get_setting {key}: {e}")))?;
                let value = serde_json::from_str(&value_str)
                    .map_err(|e| DatabaseError::Serialization(format!("{key}: {e}")))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_setting: {e}"))),
        }
    }

    async fn set_setting(
        &self,
        user_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let value_str = serde_json::to_string(value)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO settings (user_id, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (user_id, key) DO UPDATE SET value = ?3, updated_at = ?4",
            params![user_id, key, value_str, now],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("set_setting: {e}")))?;

        debug!(user_id, key, "Setting stored");
        Ok(())
    }

    async fn delete_setting(&self, user_id: &str, key: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let count = conn
            .execute(
                "DELETE FROM settings WHERE user_id = ?1 AND key = ?2",
                params![user_id, key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_setting: {e}")))?;
        Ok(count > 0)
    }

    // ── Intake sessions ─────────────────────────────────────────────

    async fn insert_session(&self, session: &IntakeSession) -> Result<(), DatabaseError> {
        let (steps, completed_steps) = session_json(session)?;
        self.conn()
            .execute(
                "INSERT INTO intake_sessions
                    (id, workspace_id, current_step, steps, completed_steps, completed, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    session.id.to_string(),
                    session.workspace_id.as_str(),
                    session.current_step as i64,
                    steps,
                    completed_steps,
                    session.completed as i64,
                    session.created_at.to_rfc3339(),
                    session.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_session: {e}")))?;
        debug!(session_id = %session.id, workspace = %session.workspace_id, "Session inserted");
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<IntakeSession>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM intake_sessions WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_session: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_session(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_session: {e}"))),
        }
    }

    async fn update_session(&self, session: &IntakeSession) -> Result<(), DatabaseError> {
        let (steps, completed_steps) = session_json(session)?;
        let count = self
            .conn()
            .execute(
                "UPDATE intake_sessions
                 SET current_step = ?2, steps = ?3, completed_steps = ?4, completed = ?5, updated_at = ?6
                 WHERE id = ?1",
                params![
                    session.id.to_string(),
                    session.current_step as i64,
                    steps,
                    completed_steps,
                    session.completed as i64,
                    session.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_session: {e}")))?;

        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "intake_session".to_string(),
                id: session.id.to_string(),
            });
        }
        Ok(())
    }

    async fn latest_open_session(
        &self,
        workspace_id: &str,
    ) -> Result<Option<IntakeSession>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM intake_sessions
                     WHERE workspace_id = ?1 AND completed = 0
                     ORDER BY updated_at DESC LIMIT 1"
                ),
                params![workspace_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("latest_open_session: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_session(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("latest_open_session: {e}"))),
        }
    }
}
