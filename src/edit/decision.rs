// SPDX-License-Identifier: MIT

//! Two-phase edit decisions
//!
//! Phase 1 classifies the next move, phase 2 fills in its details. In
//! production both phases are LLM calls; `CommandDecider` is a
//! deterministic stand-in driven by plain commands.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::NodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditAction {
    Patch,
    Message,
    Complete,
}

impl fmt::Display for EditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditAction::Patch => f.write_str("patch"),
            EditAction::Message => f.write_str("message"),
            EditAction::Complete => f.write_str("complete"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Decision {
    Patch {
        old_excerpt: String,
        new_excerpt: String,
        #[serde(default)]
        continue_autonomously: bool,
    },
    Message {
        content: String,
    },
    Complete,
}

impl Decision {
    pub fn action(&self) -> EditAction {
        match self {
            Decision::Patch { .. } => EditAction::Patch,
            Decision::Message { .. } => EditAction::Message,
            Decision::Complete => EditAction::Complete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Assistant,
    /// Engine notices, e.g. a failed patch
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueTurn {
    pub role: Role,
    pub content: String,
}

impl DialogueTurn {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Everything a decider may look at
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionContext {
    pub document: String,
    pub dialogue: Vec<DialogueTurn>,
}

impl DecisionContext {
    pub fn last_turn(&self) -> Option<&DialogueTurn> {
        self.dialogue.last()
    }
}

#[async_trait]
pub trait EditDecider: Send + Sync {
    /// Phase 1: pick the next move
    async fn classify(&self, context: &DecisionContext) -> Result<EditAction, NodeError>;

    /// Phase 2: details for the classified move
    async fn detail(
        &self,
        context: &DecisionContext,
        action: EditAction,
    ) -> Result<Decision, NodeError>;
}

const HELP: &str = "Send `replace \"<old text>\" with \"<new text>\"` to edit, or `done` to finish.";

/// Decider driven by literal commands in the latest human turn:
/// `replace "<old>" with "<new>"` and `done`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandDecider;

impl CommandDecider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EditDecider for CommandDecider {
    async fn classify(&self, context: &DecisionContext) -> Result<EditAction, NodeError> {
        let Some(turn) = context.last_turn() else {
            return Ok(EditAction::Message);
        };
        if turn.role != Role::Human {
            // A notice follows our own move; hand back to the human
            return Ok(EditAction::Message);
        }
        let text = turn.content.trim();
        if is_done(text) {
            Ok(EditAction::Complete)
        } else if parse_replace(text).is_some() {
            Ok(EditAction::Patch)
        } else {
            Ok(EditAction::Message)
        }
    }

    async fn detail(
        &self,
        context: &DecisionContext,
        action: EditAction,
    ) -> Result<Decision, NodeError> {
        match action {
            EditAction::Complete => Ok(Decision::Complete),
            EditAction::Patch => {
                let text = context
                    .last_turn()
                    .map(|t| t.content.as_str())
                    .unwrap_or_default();
                let (old_excerpt, new_excerpt) = parse_replace(text).ok_or_else(|| {
                    NodeError::InvalidDecision(format!("not a replace command: {}", text))
                })?;
                Ok(Decision::Patch {
                    old_excerpt,
                    new_excerpt,
                    continue_autonomously: false,
                })
            }
            EditAction::Message => {
                let content = match context.last_turn() {
                    Some(turn) if turn.role == Role::System => {
                        format!("{} {}", turn.content, HELP)
                    }
                    _ => HELP.to_string(),
                };
                Ok(Decision::Message { content })
            }
        }
    }
}

fn is_done(text: &str) -> bool {
    matches!(
        text.to_lowercase().trim_end_matches(&['.', '!'][..]),
        "done" | "complete" | "ok" | "looks good"
    )
}

/// `replace "<old>" with "<new>"`, case-insensitive keywords
fn parse_replace(text: &str) -> Option<(String, String)> {
    let text = text.trim();
    let keyword = text.get(..7)?;
    if !keyword.eq_ignore_ascii_case("replace") {
        return None;
    }
    let (old, rest) = quoted(text[7..].trim_start())?;
    let rest = rest.trim_start();
    let with = rest.get(..4)?;
    if !with.eq_ignore_ascii_case("with") {
        return None;
    }
    let (new, rest) = quoted(rest[4..].trim_start())?;
    if !rest.trim().is_empty() || old.is_empty() {
        return None;
    }
    Some((old.to_string(), new.to_string()))
}

/// Split a leading `"..."` off `text`
fn quoted(text: &str) -> Option<(&str, &str)> {
    let inner = text.strip_prefix('"')?;
    let end = inner.find('"')?;
    Some((&inner[..end], &inner[end + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(turns: Vec<DialogueTurn>) -> DecisionContext {
        DecisionContext {
            document: "The cell wall is rigid.".to_string(),
            dialogue: turns,
        }
    }

    #[test]
    fn test_parse_replace() {
        assert_eq!(
            parse_replace(r#"replace "cell wall" with "membrane""#),
            Some(("cell wall".to_string(), "membrane".to_string()))
        );
        assert_eq!(
            parse_replace(r#"  Replace "a b" WITH """#),
            Some(("a b".to_string(), String::new()))
        );
        assert_eq!(parse_replace(r#"replace "" with "x""#), None);
        assert_eq!(parse_replace(r#"replace "a" by "b""#), None);
        assert_eq!(parse_replace(r#"replace "a" with "b" please"#), None);
        assert_eq!(parse_replace("rep"), None);
    }

    #[tokio::test]
    async fn test_command_decider_classifies_latest_human_turn() {
        let decider = CommandDecider::new();

        let ctx = context(vec![DialogueTurn::human(
            r#"replace "rigid" with "stiff""#,
        )]);
        assert_eq!(decider.classify(&ctx).await.unwrap(), EditAction::Patch);
        assert_eq!(
            decider.detail(&ctx, EditAction::Patch).await.unwrap(),
            Decision::Patch {
                old_excerpt: "rigid".to_string(),
                new_excerpt: "stiff".to_string(),
                continue_autonomously: false,
            }
        );

        let ctx = context(vec![DialogueTurn::human("Done.")]);
        assert_eq!(decider.classify(&ctx).await.unwrap(), EditAction::Complete);

        let ctx = context(vec![DialogueTurn::human("make it shorter")]);
        assert_eq!(decider.classify(&ctx).await.unwrap(), EditAction::Message);
    }

    #[tokio::test]
    async fn test_command_decider_hands_failures_back() {
        let decider = CommandDecider::new();
        let ctx = context(vec![
            DialogueTurn::human(r#"replace "cytoplasm" with "x""#),
            DialogueTurn::system("Could not find \"cytoplasm\" in the document."),
        ]);

        assert_eq!(decider.classify(&ctx).await.unwrap(), EditAction::Message);
        let Decision::Message { content } = decider.detail(&ctx, EditAction::Message).await.unwrap()
        else {
            panic!("Expected Message");
        };
        assert!(content.starts_with("Could not find"));
    }

    #[test]
    fn test_decision_serde_shape() {
        let decision: Decision = serde_json::from_str(
            r#"{"action": "patch", "old_excerpt": "a", "new_excerpt": "b"}"#,
        )
        .unwrap();
        assert_eq!(decision.action(), EditAction::Patch);
        assert!(matches!(
            decision,
            Decision::Patch {
                continue_autonomously: false,
                ..
            }
        ));
    }
}
