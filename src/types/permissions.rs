//! Permission types for tool execution control

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Modes and update descriptions
// ============================================================================

/// Permission modes for tool execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// The Agent's default permission handling
    Default,
    /// Automatically accept file edits
    AcceptEdits,
    /// Plan mode: review changes without executing
    Plan,
    /// Bypass all permission checks (use with caution)
    BypassPermissions,
}

impl PermissionMode {
    /// Wire name of the mode.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::Plan => "plan",
            PermissionMode::BypassPermissions => "bypassPermissions",
        }
    }
}

/// Behavior attached to a permission rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionBehavior {
    /// Allow the action
    Allow,
    /// Deny the action
    Deny,
    /// Ask the user
    Ask,
}

/// Where a permission update is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionDestination {
    /// User-level settings
    UserSettings,
    /// Project-level settings
    ProjectSettings,
    /// Local settings
    LocalSettings,
    /// This session only
    Session,
}

/// A single permission rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRule {
    /// Tool the rule applies to
    pub tool_name: String,
    /// Optional rule content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_content: Option<String>,
}

/// Permission update suggested by the Agent or returned by a decider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PermissionUpdate {
    /// Add permission rules
    AddRules {
        /// Rules to add
        #[serde(default)]
        rules: Vec<PermissionRule>,
        /// Behavior for the rules
        #[serde(default, skip_serializing_if = "Option::is_none")]
        behavior: Option<PermissionBehavior>,
        /// Where to persist
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<PermissionDestination>,
    },
    /// Replace existing permission rules
    ReplaceRules {
        /// Replacement rules
        #[serde(default)]
        rules: Vec<PermissionRule>,
        /// Behavior for the rules
        #[serde(default, skip_serializing_if = "Option::is_none")]
        behavior: Option<PermissionBehavior>,
        /// Where to persist
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<PermissionDestination>,
    },
    /// Remove permission rules
    RemoveRules {
        /// Rules to remove
        #[serde(default)]
        rules: Vec<PermissionRule>,
        /// Where to remove from
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<PermissionDestination>,
    },
    /// Switch the permission mode
    SetMode {
        /// The new mode
        mode: PermissionMode,
        /// Where to persist
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<PermissionDestination>,
    },
    /// Add directories to the allowed list
    AddDirectories {
        /// Directories to add
        #[serde(default)]
        directories: Vec<String>,
        /// Where to persist
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<PermissionDestination>,
    },
    /// Remove directories from the allowed list
    RemoveDirectories {
        /// Directories to remove
        #[serde(default)]
        directories: Vec<String>,
        /// Where to remove from
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<PermissionDestination>,
    },
}

// ============================================================================
// Requests and results
// ============================================================================

/// A `can_use_tool` request from the Agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRequest {
    /// Tool requesting permission
    pub tool_name: String,
    /// Tool input, opaque JSON
    #[serde(default)]
    pub input: serde_json::Value,
    /// Suggested permission updates from the Agent
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<PermissionUpdate>,
    /// Path that was blocked, if applicable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_path: Option<String>,
}

impl PermissionRequest {
    /// Deserialize the tool input into a concrete type.
    ///
    /// # Errors
    /// Returns an error if the input does not match `T`.
    pub fn input_as<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.input.clone())
    }
}

/// Context handed to permission deciders
#[derive(Clone, Default)]
pub struct PermissionContext {
    /// Current session ID, when known
    pub session_id: Option<String>,
    /// Cancellation token scoped to this decision
    pub cancellation_token: Option<CancellationToken>,
}

impl PermissionContext {
    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

impl std::fmt::Debug for PermissionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionContext")
            .field("session_id", &self.session_id)
            .field(
                "cancellation_token",
                &self.cancellation_token.as_ref().map(|_| "<token>"),
            )
            .finish()
    }
}

/// Decision returned by a permission decider.
///
/// Build one with [`PermissionResult::allow`],
/// [`PermissionResult::allow_with_input`], [`PermissionResult::deny`] or
/// [`PermissionResult::deny_and_interrupt`].
#[derive(Debug, Clone)]
pub enum PermissionResult {
    /// Allow the tool use
    Allow {
        /// Replacement tool input the Agent substitutes for the original
        updated_input: Option<serde_json::Value>,
        /// Permission updates to apply
        updated_permissions: Vec<PermissionUpdate>,
    },
    /// Deny the tool use
    Deny {
        /// Why permission was denied
        message: String,
        /// Abort the whole turn, not just this tool use
        interrupt: bool,
    },
}

impl PermissionResult {
    /// Allow the tool use unchanged.
    #[must_use]
    pub fn allow() -> Self {
        PermissionResult::Allow {
            updated_input: None,
            updated_permissions: Vec::new(),
        }
    }

    /// Allow the tool use with a modified input.
    #[must_use]
    pub fn allow_with_input(input: serde_json::Value) -> Self {
        PermissionResult::Allow {
            updated_input: Some(input),
            updated_permissions: Vec::new(),
        }
    }

    /// Deny the tool use with a message.
    pub fn deny(message: impl Into<String>) -> Self {
        PermissionResult::Deny {
            message: message.into(),
            interrupt: false,
        }
    }

    /// Deny the tool use and abort the turn.
    pub fn deny_and_interrupt(message: impl Into<String>) -> Self {
        PermissionResult::Deny {
            message: message.into(),
            interrupt: true,
        }
    }

    /// Wire payload for the `can_use_tool` control response.
    #[must_use]
    pub fn to_response(&self) -> serde_json::Value {
        match self {
            PermissionResult::Allow {
                updated_input,
                updated_permissions,
            } => {
                let mut response = serde_json::json!({"allowed": true});
                if let Some(input) = updated_input {
                    response["updated_input"] = input.clone();
                }
                if !updated_permissions.is_empty() {
                    response["updated_permissions"] =
                        serde_json::to_value(updated_permissions).unwrap_or_default();
                }
                response
            }
            PermissionResult::Deny { message, interrupt } => {
                let mut response = serde_json::json!({
                    "allowed": false,
                    "reason": message,
                });
                if *interrupt {
                    response["interrupt"] = serde_json::Value::Bool(true);
                }
                response
            }
        }
    }
}
