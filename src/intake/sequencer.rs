//! Picks the next unanswered question in catalog order.
//!
//! Every function here is pure: the same form and answered set always yield
//! the same result.

use super::model::{AnsweredSet, Entry, FieldAddress, FormData, QuestionDefinition, StepDefinition};
use super::validator::is_satisfied;

/// What the flow should do after an answer is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Prompt for this field next.
    Ask(FieldAddress),
    /// Append a blank entry at this index and prompt for its first field.
    AppendEntry(usize),
    /// Every question is answered; submit the step.
    Submit,
}

/// Whether the field at `addr` counts as answered: a non-blank value, or an
/// optional field recorded as skipped.
pub fn is_answered(
    question: &QuestionDefinition,
    addr: &FieldAddress,
    data: &FormData,
    answered: &AnsweredSet,
) -> bool {
    if !data.trimmed(addr).is_empty() {
        return true;
    }
    question.optional && answered.contains(addr)
}

/// First unanswered question of a plain step, or `None` when all are answered.
pub fn next_question<'a>(
    step: &'a StepDefinition,
    data: &FormData,
    answered: &AnsweredSet,
) -> Option<&'a QuestionDefinition> {
    step.questions
        .iter()
        .find(|q| !is_answered(q, &FieldAddress::question(&q.key), data, answered))
}

/// First unanswered field of entry `entry`.
pub fn next_entry_field(
    step: &StepDefinition,
    data: &FormData,
    answered: &AnsweredSet,
    entry: usize,
) -> Option<FieldAddress> {
    step.questions
        .iter()
        .map(|q| (q, FieldAddress::entry_field(entry, &q.key)))
        .find(|(q, addr)| !is_answered(q, addr, data, answered))
        .map(|(_, addr)| addr)
}

/// An entry is valid when it holds some value and every required field is satisfied.
pub fn entry_is_valid(step: &StepDefinition, entry: &Entry) -> bool {
    let has_value = entry.values().any(|v| !v.trim().is_empty());
    has_value
        && step.questions.iter().all(|q| {
            let stored = entry.get(&q.key).map(String::as_str).unwrap_or("");
            is_satisfied(q, stored)
        })
}

pub fn any_entry_valid(step: &StepDefinition, data: &FormData) -> bool {
    data.entries().iter().any(|e| entry_is_valid(step, e))
}

/// Decide the next move after `just_answered` was accepted.
///
/// For repeated steps, completing the last field of an entry submits once at
/// least one entry is valid; otherwise a new blank entry is offered.
pub fn advance_after(
    step: &StepDefinition,
    data: &FormData,
    answered: &AnsweredSet,
    just_answered: &FieldAddress,
) -> Advance {
    match just_answered.entry {
        None => match next_question(step, data, answered) {
            Some(q) => Advance::Ask(FieldAddress::question(&q.key)),
            None => Advance::Submit,
        },
        Some(idx) => match next_entry_field(step, data, answered, idx) {
            Some(addr) => Advance::Ask(addr),
            None if any_entry_valid(step, data) => Advance::Submit,
            None => Advance::AppendEntry(data.entries().len()),
        },
    }
}

/// Where a (re)mounted step should pick up.
pub fn first_open(step: &StepDefinition, data: &FormData, answered: &AnsweredSet) -> Advance {
    if !step.is_repeated() {
        return match next_question(step, data, answered) {
            Some(q) => Advance::Ask(FieldAddress::question(&q.key)),
            None => Advance::Submit,
        };
    }

    let count = data.entries().len();
    if count == 0 {
        return Advance::AppendEntry(0);
    }
    for idx in 0..count {
        if let Some(addr) = next_entry_field(step, data, answered, idx) {
            return Advance::Ask(addr);
        }
    }
    if any_entry_valid(step, data) {
        Advance::Submit
    } else {
        Advance::AppendEntry(count)
    }
}

/// The payload sent to the session: repeated steps drop entries with no values.
pub fn submission_payload(step: &StepDefinition, data: &FormData) -> FormData {
    match data {
        FormData::Entries(entries) if step.is_repeated() => FormData::Entries(
            entries
                .iter()
                .filter(|e| e.values().any(|v| !v.trim().is_empty()))
                .cloned()
                .collect(),
        ),
        other => other.clone(),
    }
}
