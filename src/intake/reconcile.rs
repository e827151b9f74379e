//! Reconciliation of session, draft and snapshot into one canonical form.
//!
//! Precedence is strict:
//! 1. Session holds values for the step → use them verbatim, drop the draft.
//! 2. A snapshot exists and the draft holds values → resume from the draft.
//! 3. Otherwise start from an empty form, ignoring any orphaned draft.
//!
//! Only the snapshot distinguishes "resumed" from "reset"; draft content on
//! its own never does.

use serde::Serialize;

use super::model::{AnsweredSet, DraftRecord, FieldAddress, FormData, Snapshot, StepDefinition};

/// Which source produced the canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Session,
    Draft,
    Fresh,
}

/// Result of reconciling the three sources for one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub data: FormData,
    pub answered: AnsweredSet,
    pub source: Source,
    /// The cached draft is superseded and should be removed.
    pub clear_draft: bool,
}

pub fn reconcile(
    step: &StepDefinition,
    session: Option<&FormData>,
    draft: Option<&DraftRecord>,
    snapshot: Option<&Snapshot>,
) -> Reconciled {
    if let Some(confirmed) = session.filter(|d| d.has_values() && d.matches_layout(step)) {
        tracing::debug!(step = %step.key, "Reconciled from session");
        return Reconciled {
            answered: confirmed.filled_addresses(step).into_iter().collect(),
            data: confirmed.clone(),
            source: Source::Session,
            clear_draft: draft.is_some(),
        };
    }

    let resumable = draft.filter(|d| d.data.has_values() && d.data.matches_layout(step));
    if let (Some(snapshot), Some(draft)) = (snapshot, resumable) {
        tracing::debug!(step = %step.key, revision = draft.revision, "Resumed from draft");
        let mut answered: AnsweredSet = draft.data.filled_addresses(step).into_iter().collect();
        answered.extend(
            snapshot
                .answered_questions
                .iter()
                .filter(|addr| counts_as_answered(step, &draft.data, addr))
                .cloned(),
        );
        return Reconciled {
            data: draft.data.clone(),
            answered,
            source: Source::Draft,
            clear_draft: false,
        };
    }

    if draft.is_some_and(|d| d.data.has_values()) {
        tracing::debug!(step = %step.key, "Ignoring orphaned draft without snapshot");
    }
    Reconciled {
        data: FormData::empty_for(step),
        answered: AnsweredSet::new(),
        source: Source::Fresh,
        clear_draft: false,
    }
}

/// A snapshot claim is honored when the field has a value, or is optional
/// (a recorded skip).
fn counts_as_answered(step: &StepDefinition, data: &FormData, addr: &FieldAddress) -> bool {
    if !step.contains(addr) {
        return false;
    }
    if !data.trimmed(addr).is_empty() {
        return true;
    }
    let in_range = addr.entry.is_none_or(|idx| idx < data.entries().len());
    in_range && step.question(&addr.key).is_some_and(|q| q.optional)
}
