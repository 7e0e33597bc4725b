//! Hook types: events, inputs, outputs, matchers

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::callbacks::SharedHookCallback;

// ============================================================================
// Events
// ============================================================================

/// Lifecycle points the Agent reports hook callbacks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookEvent {
    /// Before a tool executes
    PreToolUse,
    /// After a tool execution completes
    PostToolUse,
    /// When a user prompt is submitted
    UserPromptSubmit,
    /// When the conversation is stopping
    Stop,
    /// When a subagent stops
    SubagentStop,
    /// Before conversation compaction
    PreCompact,
}

impl HookEvent {
    /// Wire name of the event (also the prefix of its callback ID).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::PreToolUse => "PreToolUse",
            HookEvent::PostToolUse => "PostToolUse",
            HookEvent::UserPromptSubmit => "UserPromptSubmit",
            HookEvent::Stop => "Stop",
            HookEvent::SubagentStop => "SubagentStop",
            HookEvent::PreCompact => "PreCompact",
        }
    }

    /// Parse an event from its wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "PreToolUse" => Some(HookEvent::PreToolUse),
            "PostToolUse" => Some(HookEvent::PostToolUse),
            "UserPromptSubmit" => Some(HookEvent::UserPromptSubmit),
            "Stop" => Some(HookEvent::Stop),
            "SubagentStop" => Some(HookEvent::SubagentStop),
            "PreCompact" => Some(HookEvent::PreCompact),
            _ => None,
        }
    }

    /// Callback ID registered for this event at initialization.
    #[must_use]
    pub fn callback_id(&self) -> String {
        format!("{}_callback", self.as_str())
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Input
// ============================================================================

/// Data passed to a hook callback.
///
/// Which fields are populated depends on the event: `tool_name`/`tool_input`
/// for pre-tool, `tool_response` additionally for post-tool, `prompt` for
/// user-prompt-submit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookInput {
    /// The hook event
    #[serde(rename = "hook_event_name")]
    pub event: HookEvent,
    /// Current session ID
    #[serde(default)]
    pub session_id: String,
    /// Path to the transcript file
    #[serde(default)]
    pub transcript_path: String,
    /// Current working directory
    #[serde(default, rename = "cwd")]
    pub working_dir: String,
    /// Current permission mode, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_mode: Option<String>,
    /// Tool name (pre/post tool events)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Tool input (pre/post tool events)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<serde_json::Value>,
    /// Tool output (post-tool events)
    #[serde(default, rename = "tool_response", skip_serializing_if = "Option::is_none")]
    pub tool_output: Option<serde_json::Value>,
    /// Unique ID of this tool use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
    /// The submitted prompt (user-prompt-submit)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Whether a stop hook is active
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stop_hook_active: bool,
    /// Compaction trigger: "manual" or "auto" (pre-compact)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    /// Custom compaction instructions (pre-compact)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
}

impl HookInput {
    /// Minimal input for the given event, useful in tests and defaults.
    #[must_use]
    pub fn for_event(event: HookEvent) -> Self {
        Self {
            event,
            session_id: String::new(),
            transcript_path: String::new(),
            working_dir: String::new(),
            permission_mode: None,
            tool_name: None,
            tool_input: None,
            tool_output: None,
            tool_use_id: None,
            prompt: None,
            stop_hook_active: false,
            trigger: None,
            custom_instructions: None,
        }
    }

    /// Deserialize the tool input into a concrete type.
    ///
    /// # Errors
    /// Returns an error if no tool input is present or it does not match `T`.
    pub fn tool_input_as<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.tool_input.clone().unwrap_or(serde_json::Value::Null))
    }

    /// Deserialize the tool output into a concrete type.
    ///
    /// # Errors
    /// Returns an error if no tool output is present or it does not match `T`.
    pub fn tool_output_as<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.tool_output.clone().unwrap_or(serde_json::Value::Null))
    }
}

// ============================================================================
// Output
// ============================================================================

/// Decision a hook callback returns to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookDecision {
    /// Proceed to the next matcher
    Continue,
    /// Block the action with a reason
    Block {
        /// Why the action was blocked
        reason: String,
    },
    /// Continue, substituting a modified tool input
    ModifyInput {
        /// The replacement tool input
        input: serde_json::Value,
    },
    /// Stop the turn with a reason
    Stop {
        /// Why the turn was stopped
        reason: String,
    },
}

/// Result of a hook callback.
///
/// Build one with [`HookOutput::proceed`], [`HookOutput::block`],
/// [`HookOutput::modify`] or [`HookOutput::stop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookOutput {
    /// The decision
    pub decision: HookDecision,
    /// Optional system message surfaced into the conversation
    pub system_message: Option<String>,
}

impl HookOutput {
    /// Continue: the dispatcher proceeds to the next matcher.
    #[must_use]
    pub fn proceed() -> Self {
        Self {
            decision: HookDecision::Continue,
            system_message: None,
        }
    }

    /// Block the action with the given reason.
    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            decision: HookDecision::Block {
                reason: reason.into(),
            },
            system_message: None,
        }
    }

    /// Continue with a modified tool input.
    #[must_use]
    pub fn modify(input: serde_json::Value) -> Self {
        Self {
            decision: HookDecision::ModifyInput { input },
            system_message: None,
        }
    }

    /// Stop the turn with the given reason.
    pub fn stop(reason: impl Into<String>) -> Self {
        Self {
            decision: HookDecision::Stop {
                reason: reason.into(),
            },
            system_message: None,
        }
    }

    /// Attach a system message to this output.
    #[must_use]
    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }

    /// Whether the dispatch loop should continue past this output.
    #[must_use]
    pub fn is_continue(&self) -> bool {
        matches!(
            self.decision,
            HookDecision::Continue | HookDecision::ModifyInput { .. }
        )
    }

    /// Wire payload for the `hook_callback` control response.
    #[must_use]
    pub fn to_response(&self) -> serde_json::Value {
        let mut response = match &self.decision {
            HookDecision::Continue => serde_json::json!({"continue": true}),
            HookDecision::Block { reason } => serde_json::json!({
                "continue": false,
                "decision": "block",
                "reason": reason,
            }),
            HookDecision::ModifyInput { input } => serde_json::json!({
                "continue": true,
                "modified_input": input,
            }),
            HookDecision::Stop { reason } => serde_json::json!({
                "continue": false,
                "stop_reason": reason,
            }),
        };
        if let Some(msg) = &self.system_message {
            response["systemMessage"] = serde_json::Value::String(msg.clone());
        }
        response
    }
}

impl Default for HookOutput {
    fn default() -> Self {
        Self::proceed()
    }
}

// ============================================================================
// Context and matchers
// ============================================================================

/// Execution context handed to hook callbacks
#[derive(Clone, Default)]
pub struct HookContext {
    /// Current session ID, when known
    pub session_id: Option<String>,
    /// Cancellation token scoped to this callback invocation
    pub cancellation_token: Option<CancellationToken>,
}

impl HookContext {
    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

impl std::fmt::Debug for HookContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookContext")
            .field("session_id", &self.session_id)
            .field(
                "cancellation_token",
                &self.cancellation_token.as_ref().map(|_| "<token>"),
            )
            .finish()
    }
}

/// Binding of a tool-name pattern to a hook callback.
///
/// Matchers for one event run in registration order; the first non-continue
/// output wins.
#[derive(Clone)]
pub struct HookMatcher {
    /// Tool name to match, or `"*"` for all tools
    pub tool_name: String,
    /// The callback
    pub callback: SharedHookCallback,
    /// Per-call timeout; unlimited when absent
    pub timeout: Option<Duration>,
}

impl HookMatcher {
    /// Match a single tool by name.
    pub fn match_tool(tool_name: impl Into<String>, callback: SharedHookCallback) -> Self {
        Self {
            tool_name: tool_name.into(),
            callback,
            timeout: None,
        }
    }

    /// Match every tool.
    #[must_use]
    pub fn match_all(callback: SharedHookCallback) -> Self {
        Self {
            tool_name: "*".to_string(),
            callback,
            timeout: None,
        }
    }

    /// Match a single tool with a per-call timeout.
    pub fn match_tool_with_timeout(
        tool_name: impl Into<String>,
        timeout: Duration,
        callback: SharedHookCallback,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            callback,
            timeout: Some(timeout),
        }
    }

    /// Whether this matcher applies to the given hook input.
    #[must_use]
    pub fn matches(&self, input: &HookInput) -> bool {
        if self.tool_name == "*" || self.tool_name.is_empty() {
            return true;
        }
        input.tool_name.as_deref() == Some(self.tool_name.as_str())
    }
}

impl std::fmt::Debug for HookMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookMatcher")
            .field("tool_name", &self.tool_name)
            .field("callback", &"<callback>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::hook_fn;

    #[test]
    fn event_names_round_trip() {
        for event in [
            HookEvent::PreToolUse,
            HookEvent::PostToolUse,
            HookEvent::UserPromptSubmit,
            HookEvent::Stop,
            HookEvent::SubagentStop,
            HookEvent::PreCompact,
        ] {
            assert_eq!(HookEvent::from_name(event.as_str()), Some(event));
        }
        assert_eq!(HookEvent::from_name("NoSuchEvent"), None);
    }

    #[test]
    fn callback_id_format() {
        assert_eq!(HookEvent::PreToolUse.callback_id(), "PreToolUse_callback");
    }

    #[test]
    fn hook_input_parses_pre_tool_shape() {
        let input: HookInput = serde_json::from_value(serde_json::json!({
            "hook_event_name": "PreToolUse",
            "session_id": "s1",
            "transcript_path": "/tmp/t.json",
            "cwd": "/work",
            "tool_name": "Bash",
            "tool_input": {"command": "ls"},
        }))
        .unwrap();
        assert_eq!(input.event, HookEvent::PreToolUse);
        assert_eq!(input.tool_name.as_deref(), Some("Bash"));

        #[derive(serde::Deserialize)]
        struct Cmd {
            command: String,
        }
        let cmd: Cmd = input.tool_input_as().unwrap();
        assert_eq!(cmd.command, "ls");
    }

    #[test]
    fn output_responses() {
        assert_eq!(
            HookOutput::proceed().to_response(),
            serde_json::json!({"continue": true})
        );
        assert_eq!(
            HookOutput::block("blocked").to_response(),
            serde_json::json!({"continue": false, "decision": "block", "reason": "blocked"})
        );
        assert_eq!(
            HookOutput::stop("done").to_response(),
            serde_json::json!({"continue": false, "stop_reason": "done"})
        );
        let modified = HookOutput::modify(serde_json::json!({"command": "ls -la"}));
        assert_eq!(
            modified.to_response(),
            serde_json::json!({"continue": true, "modified_input": {"command": "ls -la"}})
        );
    }

    #[test]
    fn matcher_wildcard_and_exact() {
        let cb = hook_fn(|_input, _ctx| async move { Ok(HookOutput::proceed()) });

        let mut input = HookInput::for_event(HookEvent::PreToolUse);
        input.tool_name = Some("Bash".into());

        assert!(HookMatcher::match_all(cb.clone()).matches(&input));
        assert!(HookMatcher::match_tool("Bash", cb.clone()).matches(&input));
        assert!(!HookMatcher::match_tool("Write", cb).matches(&input));
    }
}
