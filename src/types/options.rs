//! Client configuration options

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use typed_builder::TypedBuilder;

use crate::callbacks::SharedPermissionCallback;
use crate::mcp::McpServerConfig;

use super::hooks::{HookEvent, HookMatcher};
use super::identifiers::{SessionId, ToolName};
use super::permissions::PermissionMode;

// ============================================================================
// System prompt
// ============================================================================

/// Preset-based system prompt with an optional appended suffix
#[derive(Debug, Clone)]
pub struct SystemPromptPreset {
    /// Preset name
    pub preset: String,
    /// Text appended after the preset
    pub append: Option<String>,
}

/// System prompt configuration: a plain string or a preset
#[derive(Debug, Clone)]
pub enum SystemPrompt {
    /// Plain string system prompt
    String(String),
    /// Preset-based system prompt
    Preset(SystemPromptPreset),
}

impl From<String> for SystemPrompt {
    fn from(s: String) -> Self {
        SystemPrompt::String(s)
    }
}

impl From<&str> for SystemPrompt {
    fn from(s: &str) -> Self {
        SystemPrompt::String(s.to_string())
    }
}

impl SystemPrompt {
    /// A preset prompt with an appended suffix.
    pub fn preset_with_append(preset: impl Into<String>, append: impl Into<String>) -> Self {
        SystemPrompt::Preset(SystemPromptPreset {
            preset: preset.into(),
            append: Some(append.into()),
        })
    }
}

// ============================================================================
// Agent definitions
// ============================================================================

/// Definition of a custom subagent
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AgentDefinition {
    /// What the agent does
    pub description: String,
    /// System prompt for the agent
    pub prompt: String,
    /// Tools available to the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    /// Model for the agent ("sonnet", "opus", "haiku", "inherit")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Callback invoked for each line the Agent writes to stderr
pub type StderrCallback = Arc<dyn Fn(&str) + Send + Sync>;

// ============================================================================
// Options
// ============================================================================

/// Default cap on how long an outbound control request waits for its response
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(60);

/// Immutable client configuration.
///
/// Built once via [`AgentOptions::builder`] and consumed at connect time.
///
/// ```no_run
/// use agent_sdk::AgentOptions;
///
/// let options = AgentOptions::builder()
///     .system_prompt("You are a careful reviewer")
///     .model("sonnet")
///     .max_turns(5)
///     .build();
/// ```
#[derive(Clone, Default, TypedBuilder)]
#[builder(
    builder_method(doc = "Create a new builder for AgentOptions"),
    builder_type(doc = "Builder for AgentOptions", vis = "pub"),
    build_method(doc = "Build the AgentOptions")
)]
pub struct AgentOptions {
    /// System prompt (string or preset+append)
    #[builder(default, setter(strip_option, into))]
    pub system_prompt: Option<SystemPrompt>,

    /// Model to use
    #[builder(default, setter(strip_option, into))]
    pub model: Option<String>,

    /// Model to fall back to if the primary is unavailable
    #[builder(default, setter(strip_option, into))]
    pub fallback_model: Option<String>,

    /// Maximum number of conversation turns
    #[builder(default, setter(strip_option))]
    pub max_turns: Option<u32>,

    /// Maximum cost in USD
    #[builder(default, setter(strip_option))]
    pub max_budget_usd: Option<f64>,

    /// Maximum tokens for extended thinking
    #[builder(default, setter(strip_option))]
    pub max_thinking_tokens: Option<u32>,

    /// Tools the Agent is allowed to use
    #[builder(default, setter(into))]
    pub allowed_tools: Vec<ToolName>,

    /// Tools the Agent is not allowed to use
    #[builder(default, setter(into))]
    pub disallowed_tools: Vec<ToolName>,

    /// Permission mode for tool execution
    #[builder(default, setter(strip_option))]
    pub permission_mode: Option<PermissionMode>,

    /// Permission decider for `can_use_tool` requests.
    ///
    /// When unset, every request is answered with "allowed".
    #[builder(default, setter(strip_option))]
    pub can_use_tool: Option<SharedPermissionCallback>,

    /// MCP servers keyed by name (external configs and in-process servers)
    #[builder(default)]
    pub mcp_servers: HashMap<String, McpServerConfig>,

    /// Hook bindings: event → matchers, run in registration order
    #[builder(default)]
    pub hooks: HashMap<HookEvent, Vec<HookMatcher>>,

    /// Explicit path to the Agent CLI executable
    #[builder(default, setter(strip_option, into))]
    pub cli_path: Option<PathBuf>,

    /// Working directory for the Agent process
    #[builder(default, setter(strip_option, into))]
    pub cwd: Option<PathBuf>,

    /// Environment overlay for the Agent process
    #[builder(default)]
    pub env: HashMap<String, String>,

    /// Continue the most recent conversation
    #[builder(default)]
    pub continue_conversation: bool,

    /// Session ID to resume
    #[builder(default, setter(strip_option, into))]
    pub resume: Option<SessionId>,

    /// Fork the session when resuming
    #[builder(default)]
    pub fork_session: bool,

    /// Ask the Agent to stream fine-grained partial messages
    #[builder(default)]
    pub include_partial_messages: bool,

    /// JSON schema for structured output
    #[builder(default, setter(strip_option))]
    pub output_format: Option<serde_json::Value>,

    /// Timeout for outbound control requests (default 60 s)
    #[builder(default, setter(strip_option))]
    pub timeout: Option<Duration>,

    /// Extra CLI flags: name → optional value, appended verbatim
    #[builder(default)]
    pub extra_args: HashMap<String, Option<String>>,

    /// Callback for the Agent's stderr lines
    #[builder(default, setter(strip_option))]
    pub stderr: Option<StderrCallback>,

    /// Per-frame size cap in bytes (default 10 MiB)
    #[builder(default, setter(strip_option))]
    pub max_frame_bytes: Option<usize>,

    /// Custom agent definitions
    #[builder(default)]
    pub agents: HashMap<String, AgentDefinition>,
}

impl AgentOptions {
    /// Effective control request timeout.
    #[must_use]
    pub fn control_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_CONTROL_TIMEOUT)
    }

    /// In-process SDK tool servers extracted from `mcp_servers`.
    #[must_use]
    pub fn sdk_servers(&self) -> HashMap<String, crate::mcp::McpToolServer> {
        self.mcp_servers
            .iter()
            .filter_map(|(name, config)| match config {
                McpServerConfig::Sdk(server) => Some((name.clone(), server.clone())),
                _ => None,
            })
            .collect()
    }
}

impl std::fmt::Debug for AgentOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOptions")
            .field("system_prompt", &self.system_prompt)
            .field("model", &self.model)
            .field("fallback_model", &self.fallback_model)
            .field("max_turns", &self.max_turns)
            .field("max_budget_usd", &self.max_budget_usd)
            .field("max_thinking_tokens", &self.max_thinking_tokens)
            .field("allowed_tools", &self.allowed_tools)
            .field("disallowed_tools", &self.disallowed_tools)
            .field("permission_mode", &self.permission_mode)
            .field("can_use_tool", &self.can_use_tool.as_ref().map(|_| "<decider>"))
            .field("mcp_servers", &self.mcp_servers)
            .field(
                "hooks",
                &format!("[{} events]", self.hooks.len()),
            )
            .field("cli_path", &self.cli_path)
            .field("cwd", &self.cwd)
            .field("env", &self.env)
            .field("continue_conversation", &self.continue_conversation)
            .field("resume", &self.resume)
            .field("fork_session", &self.fork_session)
            .field("include_partial_messages", &self.include_partial_messages)
            .field("output_format", &self.output_format)
            .field("timeout", &self.timeout)
            .field("extra_args", &self.extra_args)
            .field("stderr", &self.stderr.as_ref().map(|_| "<callback>"))
            .field("max_frame_bytes", &self.max_frame_bytes)
            .field("agents", &self.agents)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let options = AgentOptions::builder().build();
        assert!(options.system_prompt.is_none());
        assert!(options.mcp_servers.is_empty());
        assert_eq!(options.control_timeout(), DEFAULT_CONTROL_TIMEOUT);
    }

    #[test]
    fn builder_sets_fields() {
        let options = AgentOptions::builder()
            .system_prompt("be terse")
            .model("sonnet")
            .max_turns(3)
            .allowed_tools(vec![ToolName::from("Read")])
            .timeout(Duration::from_secs(5))
            .build();
        assert!(matches!(
            options.system_prompt,
            Some(SystemPrompt::String(ref s)) if s == "be terse"
        ));
        assert_eq!(options.model.as_deref(), Some("sonnet"));
        assert_eq!(options.control_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn sdk_servers_filters_external_configs() {
        let mut servers = HashMap::new();
        servers.insert(
            "calc".to_string(),
            McpServerConfig::Sdk(crate::mcp::McpToolServer::new("calc")),
        );
        servers.insert(
            "remote".to_string(),
            McpServerConfig::Http {
                url: "https://example.com/mcp".into(),
                headers: HashMap::new(),
            },
        );
        let options = AgentOptions::builder().mcp_servers(servers).build();
        let sdk = options.sdk_servers();
        assert_eq!(sdk.len(), 1);
        assert!(sdk.contains_key("calc"));
    }
}
