//! Permission decision dispatch.
//!
//! Invoked by the control plane for `can_use_tool` requests. With no
//! configured decider every request is allowed; otherwise the decider runs
//! on its own task under the ambient session context.

use tokio_util::sync::CancellationToken;

use crate::callbacks::SharedPermissionCallback;
use crate::control::protocol::CanUseToolRequest;
use crate::error::Result;
use crate::types::{PermissionContext, PermissionRequest, PermissionResult};

/// Outcome of a permission decision dispatch
pub(crate) struct Decision {
    /// Wire payload for the control response
    pub response: serde_json::Value,
    /// Set when the decider denied with interrupt; surfaced on the error
    /// channel so callers can observe it
    pub interrupt_message: Option<String>,
}

/// Decide a `can_use_tool` request.
///
/// # Errors
/// Propagates decider failures; the control plane turns those into error
/// envelopes.
pub(crate) async fn decide_can_use_tool(
    decider: Option<&SharedPermissionCallback>,
    request: CanUseToolRequest,
    session_id: Option<String>,
    cancel: &CancellationToken,
) -> Result<Decision> {
    let Some(decider) = decider else {
        return Ok(Decision {
            response: serde_json::json!({"allowed": true}),
            interrupt_message: None,
        });
    };

    let permission_request = PermissionRequest {
        tool_name: request.tool_name,
        input: request.input,
        suggestions: request.suggestions,
        blocked_path: request.blocked_path,
    };
    let context = PermissionContext {
        session_id,
        cancellation_token: Some(cancel.child_token()),
    };

    let result = tokio::select! {
        () = cancel.cancelled() => {
            tracing::debug!("Permission decision cancelled");
            PermissionResult::deny("cancelled")
        }
        result = decider.call(permission_request, context) => result?,
    };

    let interrupt_message = match &result {
        PermissionResult::Deny { message, interrupt } if *interrupt => Some(message.clone()),
        _ => None,
    };

    Ok(Decision {
        response: result.to_response(),
        interrupt_message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::permission_fn;

    fn request(tool: &str) -> CanUseToolRequest {
        CanUseToolRequest {
            tool_name: tool.to_string(),
            input: serde_json::json!({"path": "/tmp/x"}),
            suggestions: Vec::new(),
            blocked_path: None,
        }
    }

    #[tokio::test]
    async fn no_decider_allows() {
        let decision =
            decide_can_use_tool(None, request("Write"), None, &CancellationToken::new())
                .await
                .unwrap();
        assert_eq!(decision.response, serde_json::json!({"allowed": true}));
        assert!(decision.interrupt_message.is_none());
    }

    #[tokio::test]
    async fn decider_allow_with_updated_input() {
        let decider = permission_fn(|req, _ctx| async move {
            assert_eq!(req.tool_name, "Bash");
            Ok(PermissionResult::allow_with_input(
                serde_json::json!({"command": "ls"}),
            ))
        });
        let decision = decide_can_use_tool(
            Some(&decider),
            request("Bash"),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(
            decision.response,
            serde_json::json!({"allowed": true, "updated_input": {"command": "ls"}})
        );
    }

    #[tokio::test]
    async fn deny_with_interrupt_is_flagged() {
        let decider = permission_fn(|_req, _ctx| async move {
            Ok(PermissionResult::deny_and_interrupt("unsafe"))
        });
        let decision = decide_can_use_tool(
            Some(&decider),
            request("Bash"),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(decision.response["allowed"], false);
        assert_eq!(decision.response["interrupt"], true);
        assert_eq!(decision.interrupt_message.as_deref(), Some("unsafe"));
    }

    #[tokio::test]
    async fn cancelled_decision_denies() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let decider = permission_fn(|_req, _ctx| async move {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(PermissionResult::allow())
        });
        let decision = decide_can_use_tool(Some(&decider), request("Bash"), None, &cancel)
            .await
            .unwrap();
        assert_eq!(decision.response["allowed"], false);
        assert_eq!(decision.response["reason"], "cancelled");
    }
}
