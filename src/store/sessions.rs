//! Session adapter backed by the `intake_sessions` table.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::SubmissionError;
use crate::intake::adapters::SessionAdapter;
use crate::intake::catalog::QuestionCatalog;
use crate::intake::model::{FormData, IntakeSession};
use crate::store::traits::Database;

pub struct StoreSessionAdapter {
    db: Arc<dyn Database>,
    catalog: Arc<QuestionCatalog>,
    /// Serializes read-modify-write of session rows.
    write_lock: Mutex<()>,
}

impl StoreSessionAdapter {
    pub fn new(db: Arc<dyn Database>, catalog: Arc<QuestionCatalog>) -> Arc<Self> {
        Arc::new(Self {
            db,
            catalog,
            write_lock: Mutex::new(()),
        })
    }

    /// Most recent incomplete session for `workspace_id`, if any.
    pub async fn latest_open(
        &self,
        workspace_id: &str,
    ) -> Result<Option<IntakeSession>, SubmissionError> {
        Ok(self.db.latest_open_session(workspace_id).await?)
    }
}

#[async_trait]
impl SessionAdapter for StoreSessionAdapter {
    async fn create_session(&self, workspace_id: &str) -> Result<IntakeSession, SubmissionError> {
        let session = IntakeSession::new(workspace_id);
        self.db.insert_session(&session).await?;
        info!(session_id = %session.id, workspace = workspace_id, "Session created");
        Ok(session)
    }

    async fn load_session(&self, session_id: Uuid) -> Result<Option<IntakeSession>, SubmissionError> {
        Ok(self.db.get_session(session_id).await?)
    }

    async fn submit_step_answers(
        &self,
        session_id: Uuid,
        step_key: &str,
        payload: &FormData,
    ) -> Result<IntakeSession, SubmissionError> {
        let _guard = self.write_lock.lock().await;

        let mut session = self
            .db
            .get_session(session_id)
            .await?
            .ok_or(SubmissionError::SessionNotFound(session_id))?;

        if !self.catalog.confirm_step(&mut session, step_key, payload)? {
            debug!(session_id = %session_id, step = step_key, "Identical resubmission ignored");
            return Ok(session);
        }

        session.updated_at = Utc::now();
        self.db.update_session(&session).await?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::model::AnswerMap;
    use crate::store::LibSqlBackend;

    const CATALOG: &str = r#"{"steps":[
        {"key":"basics","questions":[{"key":"name","label":"Name","min_length":2}]},
        {"key":"extra","questions":[{"key":"notes","label":"Notes","optional":true}]}
    ]}"#;

    async fn adapter() -> Arc<StoreSessionAdapter> {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let catalog = Arc::new(QuestionCatalog::from_json(CATALOG).unwrap());
        StoreSessionAdapter::new(db, catalog)
    }

    fn answers(key: &str, value: &str) -> FormData {
        FormData::Answers(AnswerMap::from([(key.to_string(), value.to_string())]))
    }

    #[tokio::test]
    async fn identical_resubmission_leaves_session_untouched() {
        let sessions = adapter().await;
        let session = sessions.create_session("ws").await.unwrap();
        let payload = answers("name", "Acme");

        let first = sessions
            .submit_step_answers(session.id, "basics", &payload)
            .await
            .unwrap();
        let second = sessions
            .submit_step_answers(session.id, "basics", &payload)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(second.completed_steps, vec!["basics".to_string()]);
        assert_eq!(second.current_step, 1);
        let stored = sessions.load_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.updated_at, first.updated_at);
    }

    #[tokio::test]
    async fn last_step_completes_session() {
        let sessions = adapter().await;
        let session = sessions.create_session("ws").await.unwrap();
        sessions
            .submit_step_answers(session.id, "basics", &answers("name", "Acme"))
            .await
            .unwrap();
        assert!(sessions.latest_open("ws").await.unwrap().is_some());

        let done = sessions
            .submit_step_answers(session.id, "extra", &answers("notes", ""))
            .await
            .unwrap();
        assert!(done.completed);
        assert!(sessions.latest_open("ws").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_unknown_session_and_incomplete_payload() {
        let sessions = adapter().await;
        let err = sessions
            .submit_step_answers(Uuid::new_v4(), "basics", &answers("name", "Acme"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::SessionNotFound(_)));

        let session = sessions.create_session("ws").await.unwrap();
        let err = sessions
            .submit_step_answers(session.id, "basics", &answers("name", "A"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Rejected(_)));
    }
}
