//! Intake data models: questions, answers, sessions, drafts and snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Field key → raw answer value.
pub type AnswerMap = BTreeMap<String, String>;

/// One row of a multi-entry step (e.g. a feature/benefit pair).
pub type Entry = AnswerMap;

/// A single question. Immutable, supplied by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDefinition {
    /// Unique within its step.
    pub key: String,
    pub label: String,
    /// Minimum answer length in characters, after trimming.
    #[serde(default)]
    pub min_length: usize,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

/// How a step's questions are arranged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepLayout {
    /// One answer per question.
    #[default]
    Questions,
    /// The questions describe the fields of a repeatable entry.
    Entries,
}

/// An ordered group of questions answered and submitted together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub layout: StepLayout,
    pub questions: Vec<QuestionDefinition>,
}

impl StepDefinition {
    pub fn question(&self, key: &str) -> Option<&QuestionDefinition> {
        self.questions.iter().find(|q| q.key == key)
    }

    pub fn is_repeated(&self) -> bool {
        self.layout == StepLayout::Entries
    }

    /// Whether `addr` names a field of this step with the right shape.
    pub fn contains(&self, addr: &FieldAddress) -> bool {
        self.question(&addr.key).is_some() && addr.entry.is_some() == self.is_repeated()
    }

    /// Address of the first question (first field of the first entry for
    /// repeated steps).
    pub fn first_address(&self) -> Option<FieldAddress> {
        let first = self.questions.first()?;
        Some(if self.is_repeated() {
            FieldAddress::entry_field(0, &first.key)
        } else {
            FieldAddress::question(&first.key)
        })
    }
}

/// Location of a single answer within a step.
///
/// Plain steps address by question key; repeated steps by (entry index, field key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<usize>,
    pub key: String,
}

impl FieldAddress {
    pub fn question(key: impl Into<String>) -> Self {
        Self {
            entry: None,
            key: key.into(),
        }
    }

    pub fn entry_field(entry: usize, key: impl Into<String>) -> Self {
        Self {
            entry: Some(entry),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for FieldAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.entry {
            Some(idx) => write!(f, "{idx}:{}", self.key),
            None => write!(f, "{}", self.key),
        }
    }
}

/// The answers of one step, in the shape its layout requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormData {
    Answers(AnswerMap),
    Entries(Vec<Entry>),
}

impl FormData {
    /// An all-empty form for `step`: every key present with an empty value,
    /// and a single blank entry for repeated steps.
    pub fn empty_for(step: &StepDefinition) -> Self {
        let blank: AnswerMap = step
            .questions
            .iter()
            .map(|q| (q.key.clone(), String::new()))
            .collect();
        match step.layout {
            StepLayout::Questions => Self::Answers(blank),
            StepLayout::Entries => Self::Entries(vec![blank]),
        }
    }

    pub fn get(&self, addr: &FieldAddress) -> Option<&str> {
        match (self, addr.entry) {
            (Self::Answers(map), None) => map.get(&addr.key).map(String::as_str),
            (Self::Entries(entries), Some(idx)) => entries
                .get(idx)
                .and_then(|e| e.get(&addr.key))
                .map(String::as_str),
            _ => None,
        }
    }

    /// Trimmed value at `addr`, empty when missing.
    pub fn trimmed(&self, addr: &FieldAddress) -> &str {
        self.get(addr).map(str::trim).unwrap_or("")
    }

    /// Write `value` at `addr`. Writing one past the last entry appends it.
    /// Returns false when the address does not fit this form's shape.
    pub fn set(&mut self, addr: &FieldAddress, value: String) -> bool {
        match (self, addr.entry) {
            (Self::Answers(map), None) => {
                map.insert(addr.key.clone(), value);
                true
            }
            (Self::Entries(entries), Some(idx)) if idx <= entries.len() => {
                if idx == entries.len() {
                    entries.push(AnswerMap::new());
                }
                entries[idx].insert(addr.key.clone(), value);
                true
            }
            _ => false,
        }
    }

    /// Whether any field holds a non-blank value.
    pub fn has_values(&self) -> bool {
        match self {
            Self::Answers(map) => map.values().any(|v| !v.trim().is_empty()),
            Self::Entries(entries) => entries
                .iter()
                .any(|e| e.values().any(|v| !v.trim().is_empty())),
        }
    }

    /// Addresses holding non-blank values, in catalog order.
    pub fn filled_addresses(&self, step: &StepDefinition) -> Vec<FieldAddress> {
        match self {
            Self::Answers(map) => step
                .questions
                .iter()
                .filter(|q| map.get(&q.key).is_some_and(|v| !v.trim().is_empty()))
                .map(|q| FieldAddress::question(&q.key))
                .collect(),
            Self::Entries(entries) => entries
                .iter()
                .enumerate()
                .flat_map(move |(idx, entry)| {
                    step.questions
                        .iter()
                        .filter(move |q| entry.get(&q.key).is_some_and(|v| !v.trim().is_empty()))
                        .map(move |q| FieldAddress::entry_field(idx, &q.key))
                })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[Entry] {
        match self {
            Self::Entries(entries) => entries,
            Self::Answers(_) => &[],
        }
    }

    /// Append a blank entry. Returns its index, or `None` for plain forms.
    pub fn push_blank_entry(&mut self, step: &StepDefinition) -> Option<usize> {
        match self {
            Self::Entries(entries) => {
                entries.push(
                    step.questions
                        .iter()
                        .map(|q| (q.key.clone(), String::new()))
                        .collect(),
                );
                Some(entries.len() - 1)
            }
            Self::Answers(_) => None,
        }
    }

    pub fn matches_layout(&self, step: &StepDefinition) -> bool {
        matches!(
            (self, step.layout),
            (Self::Answers(_), StepLayout::Questions) | (Self::Entries(_), StepLayout::Entries)
        )
    }
}

/// Ordered set of answered field addresses (insertion order preserved).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnsweredSet(Vec<FieldAddress>);

impl AnsweredSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `addr`. Returns false if it was already present.
    pub fn insert(&mut self, addr: FieldAddress) -> bool {
        if self.0.contains(&addr) {
            return false;
        }
        self.0.push(addr);
        true
    }

    pub fn contains(&self, addr: &FieldAddress) -> bool {
        self.0.contains(addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldAddress> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[FieldAddress] {
        &self.0
    }
}

impl FromIterator<FieldAddress> for AnsweredSet {
    fn from_iter<I: IntoIterator<Item = FieldAddress>>(iter: I) -> Self {
        let mut set = Self::new();
        for addr in iter {
            set.insert(addr);
        }
        set
    }
}

impl Extend<FieldAddress> for AnsweredSet {
    fn extend<I: IntoIterator<Item = FieldAddress>>(&mut self, iter: I) {
        for addr in iter {
            self.insert(addr);
        }
    }
}

/// Server-confirmed answer record for a whole wizard. Canonical truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeSession {
    pub id: Uuid,
    pub workspace_id: String,
    /// Index of the step the wizard is on.
    pub current_step: usize,
    /// Step key → confirmed answers.
    #[serde(default)]
    pub steps: BTreeMap<String, FormData>,
    /// Step keys confirmed so far, in confirmation order.
    #[serde(default)]
    pub completed_steps: Vec<String>,
    /// Every catalog step is confirmed.
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IntakeSession {
    pub fn new(workspace_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workspace_id: workspace_id.to_string(),
            current_step: 0,
            steps: BTreeMap::new(),
            completed_steps: Vec::new(),
            completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn step_answers(&self, step_key: &str) -> Option<&FormData> {
        self.steps.get(step_key)
    }

    pub fn is_step_confirmed(&self, step_key: &str) -> bool {
        self.completed_steps.iter().any(|k| k == step_key)
    }
}

/// Locally cached answers for one (workspace, step) not yet confirmed by the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftRecord {
    pub workspace_id: String,
    pub step_key: String,
    pub data: FormData,
    /// Increases with every write from the same step controller.
    #[serde(default)]
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

impl DraftRecord {
    pub fn new(workspace_id: &str, step_key: &str, data: FormData, revision: u64) -> Self {
        Self {
            workspace_id: workspace_id.to_string(),
            step_key: step_key.to_string(),
            data,
            revision,
            updated_at: Utc::now(),
        }
    }
}

/// Persisted UI position for reload recovery.
///
/// Its presence marks a step as resumed rather than started fresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_question: Option<FieldAddress>,
    #[serde(default)]
    pub current_input: String,
    #[serde(default)]
    pub answered_questions: AnsweredSet,
}

/// Settings keys used for draft and snapshot persistence.
pub mod settings_keys {
    pub const DRAFT_PREFIX: &str = "intake_draft:";
    pub const SNAPSHOT_PREFIX: &str = "intake_snapshot:";

    pub fn draft(step_key: &str) -> String {
        format!("{DRAFT_PREFIX}{step_key}")
    }

    pub fn snapshot(step_key: &str) -> String {
        format!("{SNAPSHOT_PREFIX}{step_key}")
    }
}
