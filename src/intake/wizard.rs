//! Owns the session and activates one step at a time.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::{Result, StaleStateError, SubmissionError};

use super::catalog::QuestionCatalog;
use super::controller::{StepController, StepDeps};
use super::model::{FieldAddress, IntakeSession};
use super::state::StepView;

/// Overall progress plus the active step's view.
#[derive(Debug, Clone, Serialize)]
pub struct WizardStatus {
    pub session_id: Option<Uuid>,
    pub workspace_id: String,
    pub current_step: usize,
    pub total_steps: usize,
    pub completed_steps: Vec<String>,
    pub completed: bool,
    pub step: Option<StepView>,
}

pub struct IntakeWizard {
    catalog: Arc<QuestionCatalog>,
    workspace_id: String,
    deps: StepDeps,
    session: RwLock<Option<IntakeSession>>,
    active: RwLock<Option<Arc<StepController>>>,
}

impl IntakeWizard {
    pub fn new(catalog: Arc<QuestionCatalog>, workspace_id: &str, deps: StepDeps) -> Arc<Self> {
        Arc::new(Self {
            catalog,
            workspace_id: workspace_id.to_string(),
            deps,
            session: RwLock::new(None),
            active: RwLock::new(None),
        })
    }

    pub fn catalog(&self) -> &QuestionCatalog {
        &self.catalog
    }

    /// Resume `session_id`, or start a new session when none is given.
    pub async fn start(&self, session_id: Option<Uuid>) -> Result<WizardStatus> {
        let session = match session_id {
            Some(id) => self
                .deps
                .sessions
                .load_session(id)
                .await?
                .ok_or(SubmissionError::SessionNotFound(id))?,
            None => self.deps.sessions.create_session(&self.workspace_id).await?,
        };
        info!(
            session_id = %session.id,
            workspace = %self.workspace_id,
            current_step = session.current_step,
            "Intake session started"
        );
        self.session_changed(session).await
    }

    /// Reload the session from the adapter and apply any upstream changes.
    pub async fn refresh(&self) -> Result<WizardStatus> {
        let id = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.id)
            .ok_or(StaleStateError::MissingSession)?;
        let session = self
            .deps
            .sessions
            .load_session(id)
            .await?
            .ok_or(SubmissionError::SessionNotFound(id))?;
        self.session_changed(session).await
    }

    pub async fn session(&self) -> Option<IntakeSession> {
        self.session.read().await.clone()
    }

    pub async fn is_complete(&self) -> bool {
        self.session.read().await.as_ref().is_some_and(|s| s.completed)
    }

    pub async fn status(&self) -> WizardStatus {
        let session = self.session.read().await.clone();
        let active = self.active.read().await.clone();
        let step = match active {
            Some(ctl) => Some(ctl.view().await),
            None => None,
        };
        WizardStatus {
            session_id: session.as_ref().map(|s| s.id),
            workspace_id: self.workspace_id.clone(),
            current_step: session.as_ref().map_or(0, |s| s.current_step),
            total_steps: self.catalog.len(),
            completed_steps: session
                .as_ref()
                .map(|s| s.completed_steps.clone())
                .unwrap_or_default(),
            completed: session.as_ref().is_some_and(|s| s.completed),
            step,
        }
    }

    /// The controller of the active step.
    pub async fn active(&self) -> Result<Arc<StepController>> {
        self.active
            .read()
            .await
            .clone()
            .ok_or_else(|| StaleStateError::NoActiveStep.into())
    }

    pub async fn submit(&self, address: FieldAddress, raw: &str) -> Result<WizardStatus> {
        let ctl = self.active().await?;
        ctl.submit(address, raw).await?;
        self.after_command(&ctl).await
    }

    pub async fn edit_input(&self, text: &str) -> Result<WizardStatus> {
        let ctl = self.active().await?;
        ctl.edit_input(text).await?;
        Ok(self.status().await)
    }

    pub async fn retry(&self) -> Result<WizardStatus> {
        let ctl = self.active().await?;
        ctl.retry().await?;
        self.after_command(&ctl).await
    }

    pub async fn add_entry(&self) -> Result<WizardStatus> {
        let ctl = self.active().await?;
        ctl.add_entry().await?;
        Ok(self.status().await)
    }

    pub async fn revisit(&self, address: FieldAddress) -> Result<WizardStatus> {
        let ctl = self.active().await?;
        ctl.revisit(address).await?;
        Ok(self.status().await)
    }

    /// Tear down the active step. Used on shutdown.
    pub async fn close(&self) {
        if let Some(ctl) = self.active.write().await.take() {
            ctl.flush_drafts().await;
            ctl.teardown();
        }
    }

    /// Adopt `session` and forward it to the active step before moving on.
    async fn session_changed(&self, session: IntakeSession) -> Result<WizardStatus> {
        let active = self.active.read().await.clone();
        if let Some(ctl) = active.filter(|ctl| ctl.is_live() && ctl.session_id() == Some(session.id)) {
            ctl.session_updated(&session).await?;
        }
        *self.session.write().await = Some(session);
        self.activate_current().await?;
        Ok(self.status().await)
    }

    async fn after_command(&self, ctl: &Arc<StepController>) -> Result<WizardStatus> {
        if ctl.is_completed().await {
            if let Some(confirmed) = ctl.confirmed_session().await {
                let mut session = self.session.write().await;
                let newer = session
                    .as_ref()
                    .is_none_or(|s| confirmed.updated_at >= s.updated_at);
                if newer {
                    *session = Some(confirmed);
                }
            }
            self.activate_current().await?;
        }
        Ok(self.status().await)
    }

    /// Mount the controller for `session.current_step`, replacing the
    /// previous one. No-op when that step of the same session is active.
    async fn activate_current(&self) -> Result<()> {
        let session = self
            .session
            .read()
            .await
            .clone()
            .ok_or(StaleStateError::MissingSession)?;

        let mut active = self.active.write().await;

        if session.completed {
            if let Some(previous) = active.take() {
                previous.teardown();
            }
            info!(session_id = %session.id, "Intake completed");
            return Ok(());
        }

        let step = self
            .catalog
            .step_at(session.current_step)
            .ok_or_else(|| StaleStateError::UnknownStep(session.current_step.to_string()))?;

        if active
            .as_ref()
            .is_some_and(|ctl| ctl.step().key == step.key && ctl.session_id() == Some(session.id))
        {
            return Ok(());
        }
        if let Some(previous) = active.take() {
            previous.teardown();
        }

        info!(session_id = %session.id, step = %step.key, "Activating step");
        let ctl = StepController::new(
            Some(session.id),
            &self.workspace_id,
            step.clone(),
            self.deps.clone(),
        );
        ctl.mount(Some(&session)).await?;
        *active = Some(ctl);
        Ok(())
    }
}
