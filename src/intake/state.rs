//! Step navigation state machine.
//!
//! `reduce` is a pure transition function: it mutates the in-memory step
//! state and returns the effects the imperative shell must carry out. No
//! I/O happens here.
//!
//! Phases: AwaitingQuestion(addr) → (AllAnswered →) Submitting → Completed,
//! with Error as the recoverable landing spot for failed submissions.

use serde::Serialize;

use super::adapters::Notice;
use super::model::{AnsweredSet, DraftRecord, FieldAddress, FormData, Snapshot, StepDefinition};
use super::reconcile::{Source, reconcile};
use super::sequencer::{Advance, advance_after, first_open, is_answered, submission_payload};
use super::validator::validate;

/// Where a step is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum Phase {
    AwaitingQuestion(FieldAddress),
    AllAnswered,
    Submitting,
    Error(String),
    Completed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone)]
pub enum Command {
    /// Mount, or the upstream session changed.
    SessionUpdated {
        answers: Option<FormData>,
        confirmed: bool,
        draft: Option<DraftRecord>,
        snapshot: Option<Snapshot>,
    },
    /// Restore the UI position from a snapshot. Honored once per mount.
    RestoreSnapshot(Snapshot),
    /// The user typed into the active input.
    EditInput(String),
    Submit { address: FieldAddress, raw: String },
    /// Re-open an already answered field for editing.
    Revisit(FieldAddress),
    /// Explicitly start another entry on a repeated step.
    AddEntry,
    Retry,
    SubmissionSucceeded,
    SubmissionFailed(String),
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    WriteDraft(FormData),
    ClearDraft,
    ClearSnapshot,
    SubmitStep(FormData),
    Notify(Notice),
    StepCompleted,
}

/// In-memory state of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepState {
    pub step_key: String,
    /// Canonical answers.
    pub data: FormData,
    pub answered: AnsweredSet,
    pub phase: Phase,
    /// Typed but unsubmitted input for the active question.
    pub input: String,
    pub field_error: Option<String>,
    pub source: Source,
    mounted: bool,
    snapshot_restored: bool,
}

impl StepState {
    pub fn new(step: &StepDefinition) -> Self {
        Self {
            step_key: step.key.clone(),
            data: FormData::empty_for(step),
            answered: AnsweredSet::new(),
            phase: step
                .first_address()
                .map(Phase::AwaitingQuestion)
                .unwrap_or(Phase::AllAnswered),
            input: String::new(),
            field_error: None,
            source: Source::Fresh,
            mounted: false,
            snapshot_restored: false,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn active_question(&self) -> Option<&FieldAddress> {
        match &self.phase {
            Phase::AwaitingQuestion(addr) => Some(addr),
            _ => None,
        }
    }

    pub fn is_submitting(&self) -> bool {
        self.phase == Phase::Submitting
    }

    pub fn is_completed(&self) -> bool {
        self.phase.is_terminal()
    }

    /// The snapshot describing the current UI position.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            current_question: self.active_question().cloned(),
            current_input: self.input.clone(),
            answered_questions: self.answered.clone(),
        }
    }

    fn activate(&mut self, addr: FieldAddress) {
        self.input = self.data.get(&addr).unwrap_or_default().to_string();
        self.phase = Phase::AwaitingQuestion(addr);
    }

    fn apply_advance(&mut self, step: &StepDefinition, advance: Advance) -> Option<FormData> {
        match advance {
            Advance::Ask(addr) => {
                self.activate(addr);
                None
            }
            Advance::AppendEntry(_) => {
                self.open_new_entry(step);
                None
            }
            Advance::Submit => Some(submission_payload(step, &self.data)),
        }
    }

    fn open_new_entry(&mut self, step: &StepDefinition) {
        let first = step.questions.first().map(|q| q.key.clone());
        if let (Some(idx), Some(key)) = (self.data.push_blank_entry(step), first) {
            self.activate(FieldAddress::entry_field(idx, key));
        }
    }
}

/// Apply `command` to `state`, returning the effects to execute.
pub fn reduce(state: &mut StepState, step: &StepDefinition, command: Command) -> Vec<Effect> {
    match command {
        Command::SessionUpdated {
            answers,
            confirmed,
            draft,
            snapshot,
        } => session_updated(state, step, answers, confirmed, draft, snapshot),
        Command::RestoreSnapshot(snapshot) => {
            restore_snapshot(state, step, snapshot);
            Vec::new()
        }
        Command::EditInput(text) => {
            if state.active_question().is_some() {
                state.input = text;
            }
            Vec::new()
        }
        Command::Submit { address, raw } => submit(state, step, address, raw),
        Command::Revisit(address) => {
            let open = matches!(
                state.phase,
                Phase::AwaitingQuestion(_) | Phase::AllAnswered | Phase::Error(_)
            );
            if open && step.contains(&address) && state.data.get(&address).is_some() {
                state.field_error = None;
                state.activate(address);
            }
            Vec::new()
        }
        Command::AddEntry => {
            let open = matches!(
                state.phase,
                Phase::AwaitingQuestion(_) | Phase::AllAnswered | Phase::Error(_)
            );
            if !open || !step.is_repeated() {
                return Vec::new();
            }
            state.field_error = None;
            state.open_new_entry(step);
            vec![Effect::WriteDraft(state.data.clone())]
        }
        Command::Retry => match state.phase {
            Phase::AllAnswered | Phase::Error(_) => {
                state.phase = Phase::Submitting;
                vec![Effect::SubmitStep(submission_payload(step, &state.data))]
            }
            _ => Vec::new(),
        },
        Command::SubmissionSucceeded => {
            state.phase = Phase::Completed;
            state.input.clear();
            state.field_error = None;
            state.source = Source::Session;
            vec![
                Effect::ClearDraft,
                Effect::ClearSnapshot,
                Effect::StepCompleted,
                Effect::Notify(Notice::success(format!("{} saved", display_name(step)))),
            ]
        }
        Command::SubmissionFailed(message) => {
            if !state.is_submitting() {
                return Vec::new();
            }
            state.phase = Phase::Error(message.clone());
            vec![Effect::Notify(Notice::error(message))]
        }
    }
}

fn session_updated(
    state: &mut StepState,
    step: &StepDefinition,
    answers: Option<FormData>,
    confirmed: bool,
    draft: Option<DraftRecord>,
    snapshot: Option<Snapshot>,
) -> Vec<Effect> {
    let session_has_values = answers
        .as_ref()
        .is_some_and(|a| a.has_values() && a.matches_layout(step));

    if confirmed || session_has_values {
        let reconciled = reconcile(step, answers.as_ref(), draft.as_ref(), snapshot.as_ref());
        state.data = answers
            .filter(|a| a.matches_layout(step))
            .unwrap_or(reconciled.data);
        state.answered = reconciled.answered;
        state.source = Source::Session;
        state.phase = Phase::Completed;
        state.input.clear();
        state.field_error = None;
        state.mounted = true;

        // Queued draft writes may not have landed yet, so the clear is
        // always sent through the ordered writer.
        let mut effects = vec![Effect::ClearDraft];
        if snapshot.is_some() {
            effects.push(Effect::ClearSnapshot);
        }
        return effects;
    }

    // An in-flight submission owns the step until its result arrives.
    if state.is_submitting() {
        return Vec::new();
    }

    // Mid-step with a live snapshot: the in-memory form is already the
    // freshest draft.
    if state.mounted && snapshot.is_some() && !state.is_completed() {
        return Vec::new();
    }

    let reconciled = reconcile(step, answers.as_ref(), draft.as_ref(), snapshot.as_ref());
    tracing::debug!(step = %step.key, source = ?reconciled.source, "Step reconciled");

    state.data = reconciled.data;
    state.answered = reconciled.answered;
    state.source = reconciled.source;
    state.field_error = None;
    state.input.clear();
    state.mounted = true;

    match first_open(step, &state.data, &state.answered) {
        // Everything answered but never confirmed: wait for an explicit retry.
        Advance::Submit => state.phase = Phase::AllAnswered,
        open => {
            state.apply_advance(step, open);
        }
    }

    if reconciled.clear_draft {
        vec![Effect::ClearDraft]
    } else {
        Vec::new()
    }
}

fn restore_snapshot(state: &mut StepState, step: &StepDefinition, snapshot: Snapshot) {
    if state.snapshot_restored || !state.mounted {
        return;
    }
    state.snapshot_restored = true;

    if !matches!(state.phase, Phase::AwaitingQuestion(_)) {
        return;
    }
    let Some(addr) = snapshot.current_question else {
        return;
    };
    let Some(question) = step.question(&addr.key) else {
        return;
    };
    if !step.contains(&addr) || state.data.get(&addr).is_none() {
        return;
    }
    // An answered key is never re-shown as active.
    if is_answered(question, &addr, &state.data, &state.answered) {
        tracing::debug!(step = %step.key, question = %addr, "Snapshot points at an answered question");
        return;
    }
    // The snapshot may be ahead of the draft it was taken against. Only the
    // first open question can be restored.
    if state.active_question() != Some(&addr) {
        tracing::debug!(step = %step.key, question = %addr, "Snapshot ahead of reconciled answers");
        return;
    }
    state.input = snapshot.current_input;
}

fn submit(
    state: &mut StepState,
    step: &StepDefinition,
    address: FieldAddress,
    raw: String,
) -> Vec<Effect> {
    if state.is_submitting() {
        tracing::debug!(step = %step.key, "Duplicate submit suppressed");
        return Vec::new();
    }
    if state.active_question() != Some(&address) {
        return Vec::new();
    }
    let Some(question) = step.question(&address.key) else {
        return Vec::new();
    };

    let value = match validate(question, &raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(step = %step.key, question = %address, error = %e, "Answer rejected");
            let message = e.to_string();
            state.field_error = Some(message.clone());
            state.input = raw;
            return vec![Effect::Notify(Notice::error(message))];
        }
    };

    tracing::debug!(step = %step.key, question = %address, "Answer accepted");
    state.data.set(&address, value);
    state.answered.insert(address.clone());
    state.field_error = None;
    state.input.clear();

    let mut effects = vec![Effect::WriteDraft(state.data.clone())];
    let advance = advance_after(step, &state.data, &state.answered, &address);
    if let Some(payload) = state.apply_advance(step, advance) {
        // AllAnswered is transient here: submission starts immediately.
        state.phase = Phase::Submitting;
        effects.push(Effect::SubmitStep(payload));
    }
    effects
}

fn display_name(step: &StepDefinition) -> &str {
    if step.title.is_empty() {
        &step.key
    } else {
        &step.title
    }
}

/// Active question details for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveQuestion {
    pub address: FieldAddress,
    pub label: String,
    pub optional: bool,
    pub min_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

/// Serializable read model of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepView {
    pub step_key: String,
    pub title: String,
    pub phase: Phase,
    pub active: Option<ActiveQuestion>,
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_error: Option<String>,
    pub answered: AnsweredSet,
    pub answered_count: usize,
    pub total_questions: usize,
    pub data: FormData,
    pub source: Source,
}

impl StepView {
    pub fn new(state: &StepState, step: &StepDefinition) -> Self {
        let active = state.active_question().and_then(|addr| {
            step.question(&addr.key).map(|q| ActiveQuestion {
                address: addr.clone(),
                label: q.label.clone(),
                optional: q.optional,
                min_length: q.min_length,
                example: q.example.clone(),
            })
        });
        let rows = if step.is_repeated() {
            state.data.entries().len().max(1)
        } else {
            1
        };
        Self {
            step_key: step.key.clone(),
            title: step.title.clone(),
            phase: state.phase.clone(),
            active,
            input: state.input.clone(),
            field_error: state.field_error.clone(),
            answered: state.answered.clone(),
            answered_count: state.answered.len(),
            total_questions: step.questions.len() * rows,
            data: state.data.clone(),
            source: state.source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::adapters::NoticeLevel;
    use crate::intake::model::{QuestionDefinition, StepLayout};

    fn q(key: &str, min_length: usize, optional: bool) -> QuestionDefinition {
        QuestionDefinition {
            key: key.into(),
            label: key.to_uppercase(),
            min_length,
            optional,
            example: None,
        }
    }

    fn plain() -> StepDefinition {
        StepDefinition {
            key: "basics".into(),
            title: "Basics".into(),
            layout: StepLayout::Questions,
            questions: vec![q("q1", 0, false), q("q2", 10, false), q("q3", 0, true)],
        }
    }

    fn entries() -> StepDefinition {
        StepDefinition {
            key: "features".into(),
            title: "Features".into(),
            layout: StepLayout::Entries,
            questions: vec![q("feature", 0, false), q("benefit", 0, true)],
        }
    }

    fn mounted(step: &StepDefinition) -> StepState {
        let mut state = StepState::new(step);
        reduce(
            &mut state,
            step,
            Command::SessionUpdated {
                answers: None,
                confirmed: false,
                draft: None,
                snapshot: None,
            },
        );
        state
    }

    fn submit_cmd(addr: FieldAddress, raw: &str) -> Command {
        Command::Submit {
            address: addr,
            raw: raw.to_string(),
        }
    }

    #[test]
    fn fresh_mount_awaits_first_question() {
        let step = plain();
        let state = mounted(&step);
        assert!(state.is_mounted());
        assert_eq!(state.active_question(), Some(&FieldAddress::question("q1")));
        assert_eq!(state.source, Source::Fresh);
    }

    #[test]
    fn rejected_answer_keeps_state_and_reports() {
        let step = plain();
        let mut state = mounted(&step);
        reduce(&mut state, &step, submit_cmd(FieldAddress::question("q1"), "ok"));

        let effects = reduce(&mut state, &step, submit_cmd(FieldAddress::question("q2"), "ab"));
        assert_eq!(state.active_question(), Some(&FieldAddress::question("q2")));
        assert!(state.field_error.as_deref().unwrap().contains("10"));
        assert_eq!(state.input, "ab");
        assert!(matches!(
            effects.as_slice(),
            [Effect::Notify(Notice { level: NoticeLevel::Error, .. })]
        ));
    }

    #[test]
    fn accepted_answers_write_draft_then_submit() {
        let step = plain();
        let mut state = mounted(&step);

        let effects = reduce(&mut state, &step, submit_cmd(FieldAddress::question("q1"), "Acme"));
        assert!(matches!(effects.as_slice(), [Effect::WriteDraft(_)]));
        reduce(&mut state, &step, submit_cmd(FieldAddress::question("q2"), "a long enough answer"));

        let effects = reduce(&mut state, &step, submit_cmd(FieldAddress::question("q3"), " SKIP "));
        assert_eq!(state.phase, Phase::Submitting);
        assert_eq!(state.data.get(&FieldAddress::question("q3")), Some(""));
        assert!(state.answered.contains(&FieldAddress::question("q3")));
        assert!(matches!(
            effects.as_slice(),
            [Effect::WriteDraft(_), Effect::SubmitStep(_)]
        ));
    }

    #[test]
    fn submit_while_submitting_is_ignored() {
        let step = plain();
        let mut state = mounted(&step);
        state.phase = Phase::Submitting;
        let before = state.clone();
        let effects = reduce(&mut state, &step, submit_cmd(FieldAddress::question("q1"), "x"));
        assert!(effects.is_empty());
        assert_eq!(state, before);
    }

    #[test]
    fn failure_then_retry_resubmits_same_payload() {
        let step = plain();
        let mut state = mounted(&step);
        reduce(&mut state, &step, submit_cmd(FieldAddress::question("q1"), "Acme"));
        reduce(&mut state, &step, submit_cmd(FieldAddress::question("q2"), "0123456789"));
        let first = reduce(&mut state, &step, submit_cmd(FieldAddress::question("q3"), ""));
        let Some(Effect::SubmitStep(payload)) = first.last().cloned() else {
            panic!("expected submission");
        };

        let effects = reduce(&mut state, &step, Command::SubmissionFailed("offline".into()));
        assert_eq!(state.phase, Phase::Error("offline".into()));
        assert!(!effects.contains(&Effect::ClearDraft));

        let retry = reduce(&mut state, &step, Command::Retry);
        assert_eq!(retry, vec![Effect::SubmitStep(payload)]);
        assert_eq!(state.phase, Phase::Submitting);
    }

    #[test]
    fn success_completes_and_clears() {
        let step = plain();
        let mut state = mounted(&step);
        state.phase = Phase::Submitting;
        let effects = reduce(&mut state, &step, Command::SubmissionSucceeded);
        assert!(state.is_completed());
        assert!(effects.contains(&Effect::ClearDraft));
        assert!(effects.contains(&Effect::ClearSnapshot));
        assert!(effects.contains(&Effect::StepCompleted));
    }

    #[test]
    fn confirmed_session_renders_completed() {
        let step = plain();
        let mut state = StepState::new(&step);
        let mut answers = FormData::empty_for(&step);
        for (k, v) in [("q1", "a"), ("q2", "0123456789"), ("q3", "c")] {
            answers.set(&FieldAddress::question(k), v.into());
        }
        reduce(
            &mut state,
            &step,
            Command::SessionUpdated {
                answers: Some(answers),
                confirmed: true,
                draft: None,
                snapshot: None,
            },
        );
        assert!(state.is_completed());
        assert!(state.active_question().is_none());
        assert_eq!(state.answered.len(), 3);
    }

    #[test]
    fn snapshot_restores_active_question_and_input_once() {
        let step = plain();
        let mut state = mounted(&step);
        let snapshot = Snapshot {
            current_question: Some(FieldAddress::question("q1")),
            current_input: "half typed".into(),
            answered_questions: AnsweredSet::new(),
        };
        reduce(&mut state, &step, Command::RestoreSnapshot(snapshot.clone()));
        assert_eq!(state.input, "half typed");

        reduce(&mut state, &step, Command::EditInput("changed".into()));
        reduce(&mut state, &step, Command::RestoreSnapshot(snapshot));
        assert_eq!(state.input, "changed");
    }

    fn session_cmd(
        answers: Option<FormData>,
        confirmed: bool,
        draft: Option<DraftRecord>,
        snapshot: Option<Snapshot>,
    ) -> Command {
        Command::SessionUpdated {
            answers,
            confirmed,
            draft,
            snapshot,
        }
    }

    #[test]
    fn snapshot_ahead_of_answers_only_keeps_first_open_question() {
        let step = plain();
        let mut state = mounted(&step);
        let snapshot = Snapshot {
            current_question: Some(FieldAddress::question("q2")),
            current_input: "half typed".into(),
            answered_questions: AnsweredSet::new(),
        };
        reduce(&mut state, &step, Command::RestoreSnapshot(snapshot));
        assert_eq!(state.active_question(), Some(&FieldAddress::question("q1")));
        assert!(state.input.is_empty());
    }

    #[test]
    fn confirmation_always_clears_draft() {
        let step = plain();
        let mut state = mounted(&step);
        reduce(&mut state, &step, submit_cmd(FieldAddress::question("q1"), "Acme"));

        let mut answers = FormData::empty_for(&step);
        answers.set(&FieldAddress::question("q1"), "Other".into());
        let effects = reduce(&mut state, &step, session_cmd(Some(answers), true, None, None));
        assert!(state.is_completed());
        assert_eq!(state.data.get(&FieldAddress::question("q1")), Some("Other"));
        assert_eq!(effects, vec![Effect::ClearDraft]);
    }

    #[test]
    fn session_update_during_submission_is_ignored() {
        let step = plain();
        let mut state = mounted(&step);
        reduce(&mut state, &step, submit_cmd(FieldAddress::question("q1"), "Acme"));
        state.phase = Phase::Submitting;
        let before = state.clone();

        let effects = reduce(&mut state, &step, session_cmd(None, false, None, None));
        assert!(effects.is_empty());
        assert_eq!(state, before);
    }

    #[test]
    fn session_update_mid_step_keeps_in_memory_form() {
        let step = plain();
        let mut state = mounted(&step);
        reduce(&mut state, &step, submit_cmd(FieldAddress::question("q1"), "Acme"));
        reduce(&mut state, &step, Command::EditInput("typing".into()));
        let snapshot = state.snapshot();

        let effects = reduce(&mut state, &step, session_cmd(None, false, None, Some(snapshot)));
        assert!(effects.is_empty());
        assert_eq!(state.data.get(&FieldAddress::question("q1")), Some("Acme"));
        assert_eq!(state.active_question(), Some(&FieldAddress::question("q2")));
        assert_eq!(state.input, "typing");
    }

    #[test]
    fn session_update_after_snapshot_cleared_starts_fresh() {
        let step = plain();
        let mut state = mounted(&step);
        reduce(&mut state, &step, submit_cmd(FieldAddress::question("q1"), "Acme"));
        let draft = DraftRecord::new("ws", "basics", state.data.clone(), 1);

        reduce(&mut state, &step, session_cmd(None, false, Some(draft), None));
        assert_eq!(state.source, Source::Fresh);
        assert_eq!(state.data.get(&FieldAddress::question("q1")), Some(""));
        assert!(state.answered.is_empty());
        assert_eq!(state.active_question(), Some(&FieldAddress::question("q1")));
    }

    #[test]
    fn revisit_seeds_existing_value() {
        let step = plain();
        let mut state = mounted(&step);
        reduce(&mut state, &step, submit_cmd(FieldAddress::question("q1"), "Acme"));
        reduce(&mut state, &step, Command::Revisit(FieldAddress::question("q1")));
        assert_eq!(state.active_question(), Some(&FieldAddress::question("q1")));
        assert_eq!(state.input, "Acme");

        reduce(&mut state, &step, submit_cmd(FieldAddress::question("q1"), "Acme Corp"));
        assert_eq!(state.active_question(), Some(&FieldAddress::question("q2")));
    }

    #[test]
    fn valid_entry_with_skipped_benefit_submits() {
        let step = entries();
        let mut state = mounted(&step);
        reduce(&mut state, &step, submit_cmd(FieldAddress::entry_field(0, "feature"), "Sync"));
        let effects = reduce(&mut state, &step, submit_cmd(FieldAddress::entry_field(0, "benefit"), "skip"));
        assert_eq!(state.phase, Phase::Submitting);
        assert_eq!(state.data.entries().len(), 1);
        assert!(matches!(effects.last(), Some(Effect::SubmitStep(_))));
    }

    #[test]
    fn add_entry_opens_next_row() {
        let step = entries();
        let mut state = mounted(&step);
        reduce(&mut state, &step, submit_cmd(FieldAddress::entry_field(0, "feature"), "Sync"));
        let effects = reduce(&mut state, &step, Command::AddEntry);
        assert_eq!(
            state.active_question(),
            Some(&FieldAddress::entry_field(1, "feature"))
        );
        assert!(matches!(effects.as_slice(), [Effect::WriteDraft(_)]));
    }

    #[test]
    fn add_entry_ignored_on_plain_steps() {
        let step = plain();
        let mut state = mounted(&step);
        assert!(reduce(&mut state, &step, Command::AddEntry).is_empty());
    }

    #[test]
    fn view_reports_progress() {
        let step = plain();
        let mut state = mounted(&step);
        reduce(&mut state, &step, submit_cmd(FieldAddress::question("q1"), "Acme"));
        let view = StepView::new(&state, &step);
        assert_eq!(view.answered_count, 1);
        assert_eq!(view.total_questions, 3);
        assert_eq!(view.active.unwrap().label, "Q2");
        let json = serde_json::to_value(&view.phase).unwrap();
        assert_eq!(json["state"], "awaiting_question");
        assert_eq!(json["detail"]["key"], "q2");
    }
}
