//! The ordered steps and questions of an intake.
//!
//! Loaded from JSON:
//!
//! ```json
//! { "steps": [
//!     { "key": "basics", "title": "Basics", "questions": [
//!         { "key": "name", "label": "Product name", "min_length": 2 },
//!         { "key": "notes", "label": "Anything else?", "optional": true }
//!     ] },
//!     { "key": "features", "layout": "entries", "questions": [
//!         { "key": "feature", "label": "Feature" },
//!         { "key": "benefit", "label": "Benefit", "optional": true }
//!     ] }
//! ] }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SubmissionError};

use super::model::{FieldAddress, FormData, IntakeSession, StepDefinition};
use super::sequencer::any_entry_valid;
use super::validator::is_satisfied;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionCatalog {
    steps: Vec<StepDefinition>,
}

impl QuestionCatalog {
    /// Build a catalog, rejecting duplicate keys and empty steps.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let catalog: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        catalog.check()?;
        Ok(catalog)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.steps.is_empty() {
            return Err(invalid("steps", "catalog has no steps"));
        }
        let mut step_keys = HashSet::new();
        for step in &self.steps {
            if step.key.trim().is_empty() {
                return Err(invalid("steps", "step key must not be empty"));
            }
            if !step_keys.insert(step.key.as_str()) {
                return Err(invalid(&step.key, "duplicate step key"));
            }
            if step.questions.is_empty() {
                return Err(invalid(&step.key, "step has no questions"));
            }
            let mut question_keys = HashSet::new();
            for q in &step.questions {
                if !question_keys.insert(q.key.as_str()) {
                    return Err(invalid(
                        &format!("{}.{}", step.key, q.key),
                        "duplicate question key",
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, key: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.key == key)
    }

    pub fn step_at(&self, index: usize) -> Option<&StepDefinition> {
        self.steps.get(index)
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.key == key)
    }

    /// Record `payload` as the confirmed answers of `step_key` on `session`.
    ///
    /// Advances `current_step` to the first unconfirmed step and sets
    /// `completed` once every step is confirmed. Returns false when the step
    /// was already confirmed with an identical payload (nothing changed).
    pub fn confirm_step(
        &self,
        session: &mut IntakeSession,
        step_key: &str,
        payload: &FormData,
    ) -> Result<bool, SubmissionError> {
        let step = self
            .step(step_key)
            .ok_or_else(|| SubmissionError::Rejected(format!("unknown step {step_key}")))?;
        check_payload(step, payload)?;

        if session.is_step_confirmed(step_key) && session.step_answers(step_key) == Some(payload) {
            return Ok(false);
        }

        session
            .steps
            .insert(step_key.to_string(), payload.clone());
        if !session.is_step_confirmed(step_key) {
            session.completed_steps.push(step_key.to_string());
        }
        session.current_step = self
            .steps
            .iter()
            .position(|s| !session.is_step_confirmed(&s.key))
            .unwrap_or(self.steps.len());
        session.completed = session.current_step >= self.steps.len();
        Ok(true)
    }
}

/// Server-side completeness check of a step payload.
fn check_payload(step: &StepDefinition, payload: &FormData) -> Result<(), SubmissionError> {
    if !payload.matches_layout(step) {
        return Err(SubmissionError::Rejected(format!(
            "payload shape does not match step {}",
            step.key
        )));
    }
    if step.is_repeated() {
        if !any_entry_valid(step, payload) {
            return Err(SubmissionError::Rejected(format!(
                "step {} needs at least one complete entry",
                step.key
            )));
        }
        return Ok(());
    }
    for q in &step.questions {
        let stored = payload.get(&FieldAddress::question(&q.key)).unwrap_or("");
        if !is_satisfied(q, stored) {
            return Err(SubmissionError::Rejected(format!("{} is incomplete", q.label)));
        }
    }
    Ok(())
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
