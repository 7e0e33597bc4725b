//! Error types for the agent SDK

use thiserror::Error;

use crate::types::RequestId;
use crate::utils::truncate_for_display;

/// Main error type for the agent SDK
#[derive(Error, Debug)]
pub enum AgentError {
    /// Agent CLI not found or not installed
    #[error("agent CLI not found: {0}")]
    CliNotFound(String),

    /// Operation attempted before connecting
    #[error("not connected: call connect() before sending prompts")]
    NotConnected,

    /// Connect called on an already-connected client
    #[error("already connected: close the existing connection first")]
    AlreadyConnected,

    /// Read from a closed stream or write to a closed transport
    #[error("stream closed")]
    StreamClosed,

    /// The query exceeded its configured budget
    #[error("budget exceeded")]
    BudgetExceeded,

    /// An operation timed out
    #[error("timeout: {0}")]
    Timeout(String),

    /// An operation was interrupted by cancellation or close
    #[error("interrupted")]
    Interrupted,

    /// A permission decider denied a tool use and aborted the turn
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The Agent subprocess exited abnormally
    #[error("process exited with code {exit_code}: {stderr}")]
    Process {
        /// Process exit code
        exit_code: i32,
        /// Accumulated stderr output
        stderr: String,
    },

    /// Malformed or unexpected control protocol traffic
    #[error("protocol error: {message}")]
    Protocol {
        /// What went wrong
        message: String,
        /// Request the error relates to, when known
        request_id: Option<RequestId>,
    },

    /// A frame failed to parse; the session continues
    #[error("parse error: {source} (line: {})", truncate_for_display(.line, 100))]
    Parse {
        /// The offending line
        line: String,
        /// The underlying JSON error
        source: serde_json::Error,
    },

    /// Transport-level failure (pipes, writes, spawning)
    #[error("transport error: {0}")]
    Transport(String),

    /// A hook callback failed
    #[error("hook error ({event}): {message}")]
    Hook {
        /// The hook event being dispatched
        event: String,
        /// The failure message
        message: String,
    },

    /// A tool server dispatch failed
    #[error("mcp error: {0}")]
    Mcp(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error outside of frame parsing
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for agent SDK operations
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// CLI-not-found error with installation guidance.
    #[must_use]
    pub fn cli_not_found() -> Self {
        Self::CliNotFound(
            "agent CLI not found on PATH or in common install locations.\n\
             Set AGENT_CLI_PATH or AgentOptions::cli_path to point at the executable."
                .to_string(),
        )
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a protocol error without a request ID
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol {
            message: msg.into(),
            request_id: None,
        }
    }

    /// Create a protocol error tied to a request
    pub fn protocol_for(msg: impl Into<String>, request_id: RequestId) -> Self {
        Self::Protocol {
            message: msg.into(),
            request_id: Some(request_id),
        }
    }

    /// Create a parse error for a raw line
    pub fn parse(line: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Parse {
            line: line.into(),
            source,
        }
    }

    /// Create a process error
    pub fn process(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self::Process {
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// Create a hook error
    pub fn hook(event: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hook {
            event: event.into(),
            message: message.into(),
        }
    }

    /// Create an MCP error
    pub fn mcp(msg: impl Into<String>) -> Self {
        Self::Mcp(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    // ========================================================================
    // Predicates mapping error kinds to user concerns
    // ========================================================================

    /// Whether this error is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Whether this error reports an exhausted budget.
    #[must_use]
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, Self::BudgetExceeded)
    }

    /// Whether this error reports a denied tool permission.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }

    /// Whether this error is fatal to the transport (the connection is gone).
    #[must_use]
    pub fn is_transport_fatal(&self) -> bool {
        matches!(
            self,
            Self::Process { .. } | Self::Transport(_) | Self::CliNotFound(_) | Self::StreamClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_truncates_line_in_display() {
        let bad = "x".repeat(500);
        let err = AgentError::parse(
            bad,
            serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
        );
        let display = err.to_string();
        assert!(display.len() < 250);
        assert!(display.contains("..."));
    }

    #[test]
    fn predicates() {
        assert!(AgentError::timeout("t").is_timeout());
        assert!(AgentError::BudgetExceeded.is_budget_exceeded());
        assert!(AgentError::PermissionDenied("no".into()).is_permission_denied());
        assert!(AgentError::process(1, "boom").is_transport_fatal());
        assert!(!AgentError::protocol("odd frame").is_transport_fatal());
    }

    #[test]
    fn protocol_error_carries_request_id() {
        let err = AgentError::protocol_for("unmatched response", RequestId::from("req_1"));
        match err {
            AgentError::Protocol { request_id, .. } => {
                assert_eq!(request_id.unwrap().as_str(), "req_1");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
