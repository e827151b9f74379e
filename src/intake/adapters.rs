//! Traits for the collaborators the intake core talks to.
//!
//! The core only talks to these traits. Durable implementations live in
//! `crate::store`; the in-memory ones here back tests and embedding.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{DatabaseError, SubmissionError};

use super::catalog::QuestionCatalog;
use super::model::{DraftRecord, FormData, IntakeSession, Snapshot};

/// Server-side session store. Holds no retry logic; retries are user driven.
#[async_trait]
pub trait SessionAdapter: Send + Sync {
    /// Start a new session for `workspace_id`.
    async fn create_session(&self, workspace_id: &str) -> Result<IntakeSession, SubmissionError>;

    /// Load a session by id.
    async fn load_session(&self, session_id: Uuid) -> Result<Option<IntakeSession>, SubmissionError>;

    /// Confirm the complete answers of one step. Must be idempotent.
    async fn submit_step_answers(
        &self,
        session_id: Uuid,
        step_key: &str,
        payload: &FormData,
    ) -> Result<IntakeSession, SubmissionError>;
}

/// Durable draft cache scoped per (workspace, step).
#[async_trait]
pub trait DraftCache: Send + Sync {
    async fn get(&self, workspace_id: &str, step_key: &str)
    -> Result<Option<DraftRecord>, DatabaseError>;

    async fn set(
        &self,
        workspace_id: &str,
        step_key: &str,
        record: &DraftRecord,
    ) -> Result<(), DatabaseError>;

    /// Remove the draft. Returns whether one existed.
    async fn clear(&self, workspace_id: &str, step_key: &str) -> Result<bool, DatabaseError>;
}

/// Read/write slot for a step's snapshot. `None` means no in-progress UI state.
#[async_trait]
pub trait SnapshotSlot: Send + Sync {
    async fn load(&self, workspace_id: &str, step_key: &str)
    -> Result<Option<Snapshot>, DatabaseError>;

    async fn store(
        &self,
        workspace_id: &str,
        step_key: &str,
        snapshot: Option<&Snapshot>,
    ) -> Result<(), DatabaseError>;
}

// ── Notifications ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// A user-visible message. How it is displayed is up to the notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the log.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => tracing::warn!(message = %notice.message, "Intake notice"),
            _ => tracing::info!(message = %notice.message, "Intake notice"),
        }
    }
}

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 64;

/// Fans notices out to any number of subscribers.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notice>,
}

impl BroadcastNotifier {
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self { tx })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, notice: Notice) {
        // Ok if nobody is listening
        let _ = self.tx.send(notice);
    }
}

// ── In-memory implementations ───────────────────────────────────────

fn composite_key(workspace_id: &str, step_key: &str) -> (String, String) {
    (workspace_id.to_string(), step_key.to_string())
}

/// Draft cache held in memory, keyed by (workspace, step).
#[derive(Default)]
pub struct MemoryDraftCache {
    records: Mutex<HashMap<(String, String), DraftRecord>>,
}

impl MemoryDraftCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), DraftRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DraftCache for MemoryDraftCache {
    async fn get(
        &self,
        workspace_id: &str,
        step_key: &str,
    ) -> Result<Option<DraftRecord>, DatabaseError> {
        Ok(self.lock().get(&composite_key(workspace_id, step_key)).cloned())
    }

    async fn set(
        &self,
        workspace_id: &str,
        step_key: &str,
        record: &DraftRecord,
    ) -> Result<(), DatabaseError> {
        self.lock()
            .insert(composite_key(workspace_id, step_key), record.clone());
        Ok(())
    }

    async fn clear(&self, workspace_id: &str, step_key: &str) -> Result<bool, DatabaseError> {
        Ok(self
            .lock()
            .remove(&composite_key(workspace_id, step_key))
            .is_some())
    }
}

/// Snapshot slot held in memory, keyed by (workspace, step).
#[derive(Default)]
pub struct MemorySnapshotSlot {
    slots: Mutex<HashMap<(String, String), Snapshot>>,
    writes: Mutex<usize>,
}

impl MemorySnapshotSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of `store` calls received, including clears.
    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SnapshotSlot for MemorySnapshotSlot {
    async fn load(
        &self,
        workspace_id: &str,
        step_key: &str,
    ) -> Result<Option<Snapshot>, DatabaseError> {
        let slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(slots.get(&composite_key(workspace_id, step_key)).cloned())
    }

    async fn store(
        &self,
        workspace_id: &str,
        step_key: &str,
        snapshot: Option<&Snapshot>,
    ) -> Result<(), DatabaseError> {
        {
            let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let key = composite_key(workspace_id, step_key);
            match snapshot {
                Some(s) => {
                    slots.insert(key, s.clone());
                }
                None => {
                    slots.remove(&key);
                }
            }
        }
        *self.writes.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
        Ok(())
    }
}

/// Session store held in memory. Confirms steps against a catalog.
pub struct MemorySessionAdapter {
    catalog: Arc<QuestionCatalog>,
    sessions: Mutex<HashMap<Uuid, IntakeSession>>,
    failures: Mutex<Vec<SubmissionError>>,
    submissions: Mutex<usize>,
}

impl MemorySessionAdapter {
    pub fn new(catalog: Arc<QuestionCatalog>) -> Arc<Self> {
        Arc::new(Self {
            catalog,
            sessions: Mutex::new(HashMap::new()),
            failures: Mutex::new(Vec::new()),
            submissions: Mutex::new(0),
        })
    }

    /// Make the next submission fail with `err`. Queued failures are used in order.
    pub fn fail_next(&self, err: SubmissionError) {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(err);
    }

    /// Insert or replace a session directly.
    pub fn put(&self, session: IntakeSession) {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(session.id, session);
    }

    /// Number of `submit_step_answers` calls received.
    pub fn submission_count(&self) -> usize {
        *self.submissions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SessionAdapter for MemorySessionAdapter {
    async fn create_session(&self, workspace_id: &str) -> Result<IntakeSession, SubmissionError> {
        let session = IntakeSession::new(workspace_id);
        self.put(session.clone());
        Ok(session)
    }

    async fn load_session(&self, session_id: Uuid) -> Result<Option<IntakeSession>, SubmissionError> {
        let sessions = self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(sessions.get(&session_id).cloned())
    }

    async fn submit_step_answers(
        &self,
        session_id: Uuid,
        step_key: &str,
        payload: &FormData,
    ) -> Result<IntakeSession, SubmissionError> {
        *self.submissions.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;

        {
            let mut failures = self.failures.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if !failures.is_empty() {
                return Err(failures.remove(0));
            }
        }

        let mut sessions = self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let session = sessions
            .get_mut(&session_id)
            .ok_or(SubmissionError::SessionNotFound(session_id))?;
        if self.catalog.confirm_step(session, step_key, payload)? {
            session.updated_at = Utc::now();
        }
        Ok(session.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::model::AnswerMap;

    #[tokio::test]
    async fn memory_drafts_are_scoped_per_workspace_and_step() {
        let cache = MemoryDraftCache::new();
        let data = FormData::Answers(AnswerMap::from([("q1".to_string(), "a".to_string())]));
        let record = DraftRecord::new("ws1", "basics", data, 1);

        cache.set("ws1", "basics", &record).await.unwrap();
        assert!(cache.get("ws1", "basics").await.unwrap().is_some());
        assert!(cache.get("ws2", "basics").await.unwrap().is_none());
        assert!(cache.get("ws1", "other").await.unwrap().is_none());

        assert!(cache.clear("ws1", "basics").await.unwrap());
        assert!(!cache.clear("ws1", "basics").await.unwrap());
    }

    #[tokio::test]
    async fn memory_snapshot_none_clears_slot() {
        let slot = MemorySnapshotSlot::new();
        slot.store("ws", "basics", Some(&Snapshot::default())).await.unwrap();
        assert!(slot.load("ws", "basics").await.unwrap().is_some());
        slot.store("ws", "basics", None).await.unwrap();
        assert!(slot.load("ws", "basics").await.unwrap().is_none());
        assert_eq!(slot.write_count(), 2);
    }

    #[tokio::test]
    async fn broadcast_notifier_fans_out() {
        let notifier = BroadcastNotifier::new();
        let mut rx = notifier.subscribe();
        notifier.notify(Notice::error("Name is required"));
        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.message, "Name is required");
    }
}
