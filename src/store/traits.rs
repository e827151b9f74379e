//! `Database` trait — single async interface for all persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::intake::model::IntakeSession;

/// Backend-agnostic database trait covering settings and intake sessions.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Settings ────────────────────────────────────────────────────

    /// Get a setting value as JSON.
    async fn get_setting(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError>;

    /// Insert or replace a setting.
    async fn set_setting(
        &self,
        user_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError>;

    /// Delete a setting. Returns whether a row was removed.
    async fn delete_setting(&self, user_id: &str, key: &str) -> Result<bool, DatabaseError>;

    // ── Intake sessions ─────────────────────────────────────────────

    /// Insert a new session row.
    async fn insert_session(&self, session: &IntakeSession) -> Result<(), DatabaseError>;

    /// Get a session by ID.
    async fn get_session(&self, id: Uuid) -> Result<Option<IntakeSession>, DatabaseError>;

    /// Overwrite an existing session row. `NotFound` if it does not exist.
    async fn update_session(&self, session: &IntakeSession) -> Result<(), DatabaseError>;

    /// Most recently updated incomplete session for a workspace.
    async fn latest_open_session(
        &self,
        workspace_id: &str,
    ) -> Result<Option<IntakeSession>, DatabaseError>;
}
