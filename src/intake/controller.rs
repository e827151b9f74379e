//! StepController — the imperative shell around the step state machine.
//!
//! Dispatches commands into `reduce`, then executes the returned effects:
//! draft writes (ordered, fire-and-forget), snapshot emission, session
//! submission and notifications.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result, StaleStateError};

use super::adapters::{DraftCache, Notice, Notifier, SessionAdapter, SnapshotSlot};
use super::bridge::SnapshotBridge;
use super::model::{DraftRecord, FieldAddress, FormData, IntakeSession, StepDefinition};
use super::reconcile::Source;
use super::state::{Command, Effect, StepState, StepView, reduce};

/// Collaborators a step controller talks to.
#[derive(Clone)]
pub struct StepDeps {
    pub sessions: Arc<dyn SessionAdapter>,
    pub drafts: Arc<dyn DraftCache>,
    pub snapshots: Arc<dyn SnapshotSlot>,
    pub notifier: Arc<dyn Notifier>,
}

enum DraftOp {
    Write(DraftRecord),
    Clear,
    Flush(oneshot::Sender<()>),
}

/// Drives one step of an intake.
pub struct StepController {
    session_id: Option<Uuid>,
    workspace_id: String,
    step: StepDefinition,
    deps: StepDeps,
    state: Mutex<StepState>,
    bridge: Mutex<SnapshotBridge>,
    draft_tx: mpsc::UnboundedSender<DraftOp>,
    draft_revision: AtomicU64,
    submitting: AtomicBool,
    live: AtomicBool,
    confirmed: RwLock<Option<IntakeSession>>,
}

impl StepController {
    /// Create a controller. Must be called inside a Tokio runtime.
    pub fn new(
        session_id: Option<Uuid>,
        workspace_id: &str,
        step: StepDefinition,
        deps: StepDeps,
    ) -> Arc<Self> {
        let draft_tx = spawn_draft_writer(Arc::clone(&deps.drafts), workspace_id, &step.key);
        Arc::new(Self {
            session_id,
            workspace_id: workspace_id.to_string(),
            state: Mutex::new(StepState::new(&step)),
            bridge: Mutex::new(SnapshotBridge::new()),
            step,
            deps,
            draft_tx,
            draft_revision: AtomicU64::new(0),
            submitting: AtomicBool::new(false),
            live: AtomicBool::new(true),
            confirmed: RwLock::new(None),
        })
    }

    pub fn step(&self) -> &StepDefinition {
        &self.step
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    /// Reconcile session, draft and snapshot, then restore the UI position once.
    pub async fn mount(&self, session: Option<&IntakeSession>) -> Result<StepView> {
        let draft = match self.deps.drafts.get(&self.workspace_id, &self.step.key).await {
            Ok(draft) => draft,
            Err(e) => {
                warn!(step = %self.step.key, error = %e, "Failed to load draft");
                None
            }
        };
        if let Some(ref d) = draft {
            self.draft_revision.fetch_max(d.revision, Ordering::SeqCst);
        }
        let snapshot = self
            .deps
            .snapshots
            .load(&self.workspace_id, &self.step.key)
            .await?;

        let effects = self
            .dispatch(Command::SessionUpdated {
                answers: session.and_then(|s| s.step_answers(&self.step.key).cloned()),
                confirmed: session.is_some_and(|s| s.is_step_confirmed(&self.step.key)),
                draft,
                snapshot: snapshot.clone(),
            })
            .await;
        self.run_effects(effects).await?;

        if self.state.lock().await.source == Source::Draft {
            let name = if self.step.title.is_empty() { &self.step.key } else { &self.step.title };
            self.deps
                .notifier
                .notify(Notice::info(format!("Restored unsaved answers for {name}")));
        }

        let restore = self.bridge.lock().await.take_restore(snapshot);
        if let Some(snapshot) = restore {
            let effects = self.dispatch(Command::RestoreSnapshot(snapshot)).await;
            self.run_effects(effects).await?;
        }
        self.sync_snapshot().await?;
        Ok(self.view().await)
    }

    /// The upstream session changed.
    pub async fn session_updated(&self, session: &IntakeSession) -> Result<StepView> {
        let draft = self
            .deps
            .drafts
            .get(&self.workspace_id, &self.step.key)
            .await
            .unwrap_or_else(|e| {
                warn!(step = %self.step.key, error = %e, "Failed to load draft");
                None
            });
        let snapshot = self
            .deps
            .snapshots
            .load(&self.workspace_id, &self.step.key)
            .await?;
        let effects = self
            .dispatch(Command::SessionUpdated {
                answers: session.step_answers(&self.step.key).cloned(),
                confirmed: session.is_step_confirmed(&self.step.key),
                draft,
                snapshot,
            })
            .await;
        self.run_effects(effects).await?;
        self.sync_snapshot().await?;
        Ok(self.view().await)
    }

    /// Answer the active question.
    ///
    /// Validation failures are reported through the view and the notifier,
    /// not as an error. A submit while the step is submitting is ignored.
    pub async fn submit(&self, address: FieldAddress, raw: &str) -> Result<StepView> {
        self.ensure_live()?;
        {
            let state = self.state.lock().await;
            if state.is_submitting() {
                debug!(step = %self.step.key, "Submit ignored while submitting");
                return Ok(StepView::new(&state, &self.step));
            }
            if state.active_question() != Some(&address) {
                return Err(StaleStateError::InactiveQuestion(address.to_string()).into());
            }
        }
        let effects = self
            .dispatch(Command::Submit {
                address,
                raw: raw.to_string(),
            })
            .await;
        self.run_effects(effects).await?;
        self.sync_snapshot().await?;
        Ok(self.view().await)
    }

    /// Record typed-but-unsubmitted input.
    pub async fn edit_input(&self, text: &str) -> Result<StepView> {
        self.ensure_live()?;
        self.command(Command::EditInput(text.to_string())).await
    }

    pub async fn revisit(&self, address: FieldAddress) -> Result<StepView> {
        self.ensure_live()?;
        self.command(Command::Revisit(address)).await
    }

    pub async fn add_entry(&self) -> Result<StepView> {
        self.ensure_live()?;
        self.command(Command::AddEntry).await
    }

    /// Re-attempt a failed or pending submission.
    pub async fn retry(&self) -> Result<StepView> {
        self.ensure_live()?;
        self.command(Command::Retry).await
    }

    pub async fn view(&self) -> StepView {
        let state = self.state.lock().await;
        StepView::new(&state, &self.step)
    }

    pub async fn is_completed(&self) -> bool {
        self.state.lock().await.is_completed()
    }

    /// The session returned by the last successful submission.
    pub async fn confirmed_session(&self) -> Option<IntakeSession> {
        self.confirmed.read().await.clone()
    }

    /// The step is no longer visible. In-flight results still update the
    /// session and draft, but no longer drive this controller's state.
    pub fn teardown(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Wait until every queued draft operation has been applied.
    pub async fn flush_drafts(&self) {
        let (tx, rx) = oneshot::channel();
        if self.draft_tx.send(DraftOp::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_live() {
            Ok(())
        } else {
            Err(StaleStateError::InactiveStep(self.step.key.clone()).into())
        }
    }

    async fn command(&self, command: Command) -> Result<StepView> {
        let effects = self.dispatch(command).await;
        self.run_effects(effects).await?;
        self.sync_snapshot().await?;
        Ok(self.view().await)
    }

    async fn dispatch(&self, command: Command) -> Vec<Effect> {
        let mut state = self.state.lock().await;
        reduce(&mut state, &self.step, command)
    }

    async fn run_effects(&self, effects: Vec<Effect>) -> Result<()> {
        let mut queue: VecDeque<Effect> = effects.into();
        let mut stale = None;

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::WriteDraft(data) => self.write_draft(data),
                Effect::ClearDraft => self.clear_draft(),
                Effect::ClearSnapshot => self.clear_snapshot().await,
                Effect::Notify(notice) => self.deps.notifier.notify(notice),
                Effect::StepCompleted => {
                    info!(step = %self.step.key, workspace = %self.workspace_id, "Step completed");
                }
                Effect::SubmitStep(payload) => match self.session_id {
                    Some(session_id) => queue.extend(self.submit_to_session(session_id, payload).await),
                    None => {
                        let err = StaleStateError::MissingSession;
                        warn!(step = %self.step.key, "Submission attempted without a session");
                        self.deps
                            .notifier
                            .notify(Notice::error(format!("{err}. Please refresh and try again.")));
                        // The notice above already covers the failure.
                        self.dispatch(Command::SubmissionFailed(err.to_string())).await;
                        stale = Some(err);
                    }
                },
            }
        }

        match stale {
            Some(err) => Err(Error::StaleState(err)),
            None => Ok(()),
        }
    }

    /// Apply to the in-memory form first (already done by the reducer), then
    /// queue the durable write. Queued writes apply in order.
    fn write_draft(&self, data: FormData) {
        let revision = self.draft_revision.fetch_add(1, Ordering::SeqCst) + 1;
        let record = DraftRecord::new(&self.workspace_id, &self.step.key, data, revision);
        if self.draft_tx.send(DraftOp::Write(record)).is_err() {
            warn!(step = %self.step.key, "Draft writer stopped; draft not persisted");
        }
    }

    fn clear_draft(&self) {
        if self.draft_tx.send(DraftOp::Clear).is_err() {
            warn!(step = %self.step.key, "Draft writer stopped; draft not cleared");
        }
    }

    async fn clear_snapshot(&self) {
        let mut bridge = self.bridge.lock().await;
        if let Err(e) = self
            .deps
            .snapshots
            .store(&self.workspace_id, &self.step.key, None)
            .await
        {
            warn!(step = %self.step.key, error = %e, "Failed to clear snapshot");
        }
        bridge.mark_cleared();
    }

    async fn sync_snapshot(&self) -> Result<()> {
        if !self.is_live() {
            return Ok(());
        }
        let mut bridge = self.bridge.lock().await;
        let next = {
            let state = self.state.lock().await;
            bridge.observe(&state)
        };
        if let Some(snapshot) = next {
            self.deps
                .snapshots
                .store(&self.workspace_id, &self.step.key, Some(&snapshot))
                .await?;
        }
        Ok(())
    }

    async fn submit_to_session(&self, session_id: Uuid, payload: FormData) -> Vec<Effect> {
        if self.submitting.swap(true, Ordering::SeqCst) {
            debug!(step = %self.step.key, "Submission already in flight");
            return Vec::new();
        }

        info!(step = %self.step.key, session_id = %session_id, "Submitting step answers");
        let result = self
            .deps
            .sessions
            .submit_step_answers(session_id, &self.step.key, &payload)
            .await;
        self.submitting.store(false, Ordering::SeqCst);

        if let Ok(ref session) = result {
            *self.confirmed.write().await = Some(session.clone());
        }

        if !self.is_live() {
            info!(step = %self.step.key, ok = result.is_ok(), "Submission finished after teardown");
            if result.is_ok() {
                self.clear_draft();
                self.clear_snapshot().await;
            }
            return Vec::new();
        }

        match result {
            Ok(_) => {
                info!(step = %self.step.key, session_id = %session_id, "Step confirmed");
                self.dispatch(Command::SubmissionSucceeded).await
            }
            Err(e) => {
                warn!(step = %self.step.key, error = %e, "Step submission failed");
                self.dispatch(Command::SubmissionFailed(e.to_string())).await
            }
        }
    }
}

fn spawn_draft_writer(
    drafts: Arc<dyn DraftCache>,
    workspace_id: &str,
    step_key: &str,
) -> mpsc::UnboundedSender<DraftOp> {
    let (tx, mut rx) = mpsc::unbounded_channel::<DraftOp>();
    let workspace_id = workspace_id.to_string();
    let step_key = step_key.to_string();

    tokio::spawn(async move {
        while let Some(op) = rx.recv().await {
            match op {
                DraftOp::Write(record) => {
                    if let Err(e) = drafts.set(&workspace_id, &step_key, &record).await {
                        warn!(step = %step_key, revision = record.revision, error = %e, "Failed to write draft");
                    }
                }
                DraftOp::Clear => {
                    if let Err(e) = drafts.clear(&workspace_id, &step_key).await {
                        warn!(step = %step_key, error = %e, "Failed to clear draft");
                    }
                }
                DraftOp::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
    });

    tx
}
