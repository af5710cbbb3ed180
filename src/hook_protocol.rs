#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Wire format of agent-invocation hook callbacks.
//!
//! Input arrives as one JSON document on stdin; output is always a
//! `"result": "continue"` document, optionally carrying additional context.

use crate::patterns::TagMatch;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    PreToolUse,
    PostToolUse,
    Stop,
    SubagentStop,
    Other,
}

impl HookEvent {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PreToolUse => "PreToolUse",
            Self::PostToolUse => "PostToolUse",
            Self::Stop => "Stop",
            Self::SubagentStop => "SubagentStop",
            Self::Other => "Other",
        }
    }
}

impl From<&str> for HookEvent {
    fn from(name: &str) -> Self {
        match name {
            "PreToolUse" => Self::PreToolUse,
            "PostToolUse" => Self::PostToolUse,
            "Stop" => Self::Stop,
            "SubagentStop" => Self::SubagentStop,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HookInput {
    pub hook_event_name: String,
    pub session_id: String,
    pub tool_name: String,
    pub tool_input: Value,
    pub tool_response: Value,
    pub agent_id: Option<String>,
    pub tool_use_id: Option<String>,
}

impl HookInput {
    #[must_use]
    pub fn event(&self) -> HookEvent {
        HookEvent::from(self.hook_event_name.as_str())
    }

    fn input_text(&self, field: &str) -> Option<&str> {
        self.tool_input.get(field).and_then(Value::as_str)
    }

    /// First pattern tag found in `tool_input.prompt`, then `tool_input.description`.
    #[must_use]
    pub fn find_tag(&self) -> Option<TagMatch> {
        ["prompt", "description"]
            .iter()
            .filter_map(|field| self.input_text(field))
            .find_map(TagMatch::find)
    }

    /// The invocation id used as the key in a state's agent map.
    #[must_use]
    pub fn invocation_id(&self) -> Option<&str> {
        [self.agent_id.as_deref(), self.tool_use_id.as_deref()]
            .into_iter()
            .flatten()
            .find(|id| !id.is_empty())
    }

    /// Agent result as text: a plain string, the concatenated `text` blocks of a
    /// `content` array, or the compact JSON encoding of anything else.
    #[must_use]
    pub fn response_text(&self) -> String {
        match &self.tool_response {
            Value::Null => String::new(),
            Value::String(text) => text.clone(),
            other => text_blocks(other).unwrap_or_else(|| other.to_string()),
        }
    }
}

fn text_blocks(value: &Value) -> Option<String> {
    let blocks = match value {
        Value::Array(blocks) => blocks,
        Value::Object(map) => map.get("content")?.as_array()?,
        _ => return None,
    };
    let texts: Vec<&str> = blocks
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect();
    (!texts.is_empty()).then(|| texts.join("\n"))
}

/// Malformed or empty input reads as `None`.
#[must_use]
pub fn parse_hook_input(raw: &str) -> Option<HookInput> {
    if raw.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(raw) {
        Ok(input) => Some(input),
        Err(e) => {
            debug!(error = %e, "unparseable hook input");
            None
        }
    }
}

/// Why a hook invocation produced no context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    MalformedInput,
    Untagged,
    InvalidIdentifier,
    MissingState,
    Inactive,
    SessionMismatch,
    Expired,
    UnhandledEvent,
    StoreFailure,
    LedgerFailure,
}

impl IgnoreReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedInput => "malformed_input",
            Self::Untagged => "untagged",
            Self::InvalidIdentifier => "invalid_identifier",
            Self::MissingState => "missing_state",
            Self::Inactive => "inactive",
            Self::SessionMismatch => "session_mismatch",
            Self::Expired => "expired",
            Self::UnhandledEvent => "unhandled_event",
            Self::StoreFailure => "store_failure",
            Self::LedgerFailure => "ledger_failure",
        }
    }
}

/// Result of dispatching one hook event. Only the binary turns it into output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Proceed { context: Option<String> },
    Ignore(IgnoreReason),
}

impl DispatchOutcome {
    #[must_use]
    pub const fn proceed(context: Option<String>) -> Self {
        Self::Proceed { context }
    }

    #[must_use]
    pub fn context(&self) -> Option<&str> {
        match self {
            Self::Proceed { context } => context.as_deref(),
            Self::Ignore(_) => None,
        }
    }

    #[must_use]
    pub fn into_response(self, event: HookEvent) -> HookResponse {
        match self {
            Self::Proceed {
                context: Some(context),
            } => HookResponse::with_context(event, context),
            Self::Proceed { context: None } | Self::Ignore(_) => HookResponse::continue_only(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookSpecificOutput {
    pub hook_event_name: String,
    pub additional_context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookResponse {
    pub result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_specific_output: Option<HookSpecificOutput>,
}

impl HookResponse {
    #[must_use]
    pub const fn continue_only() -> Self {
        Self {
            result: "continue",
            hook_specific_output: None,
        }
    }

    #[must_use]
    pub fn with_context(event: HookEvent, context: String) -> Self {
        Self {
            result: "continue",
            hook_specific_output: Some(HookSpecificOutput {
                hook_event_name: event.as_str().to_string(),
                additional_context: context,
            }),
        }
    }

    /// Serialized form written to stdout. Falls back to the bare continue
    /// document if serialization ever fails.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"result":"continue"}"#.to_string())
    }
}
