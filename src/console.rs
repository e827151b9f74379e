//! Console front end: reads stdin lines, parses commands, renders prompts.

use futures::stream::{self, Stream};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::intake::model::FieldAddress;
use crate::intake::state::Phase;
use crate::intake::wizard::WizardStatus;

/// What a line typed at the console asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Answer the active question with the raw line.
    Answer(String),
    Retry,
    AddEntry,
    Revisit(FieldAddress),
    Refresh,
    Status,
    Quit,
    Unknown(String),
}

/// Parse one input line. Anything not starting with `/` is an answer,
/// including an empty line.
pub fn parse_line(line: &str) -> ConsoleCommand {
    let trimmed = line.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return ConsoleCommand::Answer(line.to_string());
    };
    let (cmd, arg) = rest
        .split_once(char::is_whitespace)
        .map(|(c, a)| (c, a.trim()))
        .unwrap_or((rest, ""));

    match cmd {
        "retry" => ConsoleCommand::Retry,
        "add" => ConsoleCommand::AddEntry,
        "refresh" => ConsoleCommand::Refresh,
        "status" => ConsoleCommand::Status,
        "quit" | "exit" => ConsoleCommand::Quit,
        "back" | "edit" => match parse_address(arg) {
            Some(addr) => ConsoleCommand::Revisit(addr),
            None => ConsoleCommand::Unknown(trimmed.to_string()),
        },
        _ => ConsoleCommand::Unknown(trimmed.to_string()),
    }
}

/// Parse `key` or `entry:key`.
pub fn parse_address(s: &str) -> Option<FieldAddress> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    match s.split_once(':') {
        Some((idx, key)) if !key.is_empty() => {
            idx.parse().ok().map(|i| FieldAddress::entry_field(i, key))
        }
        Some(_) => None,
        None => Some(FieldAddress::question(s)),
    }
}

/// Prompt text for the current wizard position.
pub fn render(status: &WizardStatus) -> String {
    if status.completed {
        return "All steps complete. Thank you!".to_string();
    }
    let Some(step) = &status.step else {
        return "No step is active.".to_string();
    };

    let title = if step.title.is_empty() { &step.step_key } else { &step.title };
    let mut out = format!(
        "[{}/{}] {} ({}/{} answered)",
        status.current_step + 1,
        status.total_steps,
        title,
        step.answered_count,
        step.total_questions
    );

    match (&step.phase, &step.active) {
        (Phase::AwaitingQuestion(_), Some(active)) => {
            out.push('\n');
            out.push_str(&active.label);
            if let Some(entry) = active.address.entry {
                out.push_str(&format!(" (entry {})", entry + 1));
            }
            if active.optional {
                out.push_str(" [optional, type skip to leave blank]");
            }
            if let Some(example) = &active.example {
                out.push_str(&format!("\n  e.g. {example}"));
            }
            if let Some(err) = &step.field_error {
                out.push_str(&format!("\n  ! {err}"));
            }
            if !step.input.is_empty() {
                out.push_str(&format!("\n  (in progress: {})", step.input));
            }
        }
        (Phase::Submitting, _) => out.push_str("\nSaving..."),
        (Phase::AllAnswered, _) => out.push_str("\nAll answered. Type /retry to save."),
        (Phase::Error(message), _) => {
            out.push_str(&format!("\nSave failed: {message}. Type /retry to try again."));
        }
        _ => {}
    }
    out
}

/// Lines read from stdin until EOF.
pub fn stdin_lines() -> impl Stream<Item = String> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(async move {
        let reader = BufReader::new(tokio::io::stdin());
        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break, // EOF
                Err(e) => {
                    tracing::error!("Error reading stdin: {}", e);
                    break;
                }
            }
        }
    });

    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|line| (line, rx)) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::model::{AnsweredSet, FormData};
    use crate::intake::reconcile::Source;
    use crate::intake::state::{ActiveQuestion, StepView};

    #[test]
    fn plain_lines_are_answers() {
        assert_eq!(parse_line("Acme"), ConsoleCommand::Answer("Acme".into()));
        assert_eq!(parse_line(""), ConsoleCommand::Answer(String::new()));
        assert_eq!(parse_line(" skip "), ConsoleCommand::Answer(" skip ".into()));
    }

    #[test]
    fn slash_commands() {
        assert_eq!(parse_line("/retry"), ConsoleCommand::Retry);
        assert_eq!(parse_line("/add"), ConsoleCommand::AddEntry);
        assert_eq!(parse_line("/quit"), ConsoleCommand::Quit);
        assert_eq!(parse_line("/refresh"), ConsoleCommand::Refresh);
        assert_eq!(
            parse_line("/back 1:feature"),
            ConsoleCommand::Revisit(FieldAddress::entry_field(1, "feature"))
        );
        assert_eq!(
            parse_line("/edit name"),
            ConsoleCommand::Revisit(FieldAddress::question("name"))
        );
        assert!(matches!(parse_line("/back"), ConsoleCommand::Unknown(_)));
        assert!(matches!(parse_line("/nope"), ConsoleCommand::Unknown(_)));
    }

    #[test]
    fn address_parsing() {
        assert_eq!(parse_address("x:feature"), None);
        assert_eq!(parse_address("2:"), None);
        assert_eq!(parse_address("0:a"), Some(FieldAddress::entry_field(0, "a")));
    }

    #[test]
    fn renders_active_question_with_error() {
        let address = FieldAddress::question("pitch");
        let status = WizardStatus {
            session_id: None,
            workspace_id: "ws".into(),
            current_step: 0,
            total_steps: 2,
            completed_steps: Vec::new(),
            completed: false,
            step: Some(StepView {
                step_key: "basics".into(),
                title: "Basics".into(),
                phase: Phase::AwaitingQuestion(address.clone()),
                active: Some(ActiveQuestion {
                    address,
                    label: "Pitch".into(),
                    optional: false,
                    min_length: 10,
                    example: Some("A CRM for plumbers".into()),
                }),
                input: "ab".into(),
                field_error: Some("Pitch must be at least 10 characters".into()),
                answered: AnsweredSet::new(),
                answered_count: 0,
                total_questions: 1,
                data: FormData::Answers(Default::default()),
                source: Source::Fresh,
            }),
        };
        let text = render(&status);
        assert!(text.starts_with("[1/2] Basics"));
        assert!(text.contains("e.g. A CRM for plumbers"));
        assert!(text.contains("at least 10 characters"));
    }
}
