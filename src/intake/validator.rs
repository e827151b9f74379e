//! Answer validation for required and optional questions.
//!
//! Purely local and synchronous.

use crate::error::ValidationError;

use super::model::QuestionDefinition;

/// Inputs that mark an optional question as deliberately left blank.
/// Matched case-insensitively after trimming.
pub const SKIP_SYNONYMS: &[&str] = &[
    "skip",
    "no",
    "n",
    "leave it",
    "leave",
    "none",
    "not needed",
    "pass",
];

/// Whether `raw` is one of the skip synonyms.
pub fn is_skip(raw: &str) -> bool {
    let lower = raw.trim().to_lowercase();
    SKIP_SYNONYMS.contains(&lower.as_str())
}

/// Validate `raw` against `question`, returning the value to store.
///
/// Optional questions accept blanks and skip synonyms, both stored as `""`.
/// A non-blank optional answer that is not a skip still honors `min_length`.
pub fn validate(question: &QuestionDefinition, raw: &str) -> Result<String, ValidationError> {
    let value = raw.trim();

    if question.optional && (value.is_empty() || is_skip(value)) {
        return Ok(String::new());
    }

    if value.is_empty() {
        return Err(ValidationError::Required {
            label: question.label.clone(),
        });
    }

    if value.chars().count() < question.min_length {
        return Err(ValidationError::TooShort {
            label: question.label.clone(),
            min: question.min_length,
        });
    }

    Ok(value.to_string())
}

/// Whether an already stored value satisfies `question` without prompting.
pub fn is_satisfied(question: &QuestionDefinition, stored: &str) -> bool {
    let value = stored.trim();
    if value.is_empty() {
        return question.optional;
    }
    value.chars().count() >= question.min_length
}
