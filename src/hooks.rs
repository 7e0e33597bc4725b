//! Hook callback dispatch.
//!
//! Invoked by the control plane when the Agent sends a `hook_callback`
//! request. Resolves the event, runs matching callbacks in registration
//! order under their per-call timeouts, and always produces a well-formed
//! response payload — callback failures become block decisions, never
//! router errors.

use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::control::protocol::HookCallbackRequest;
use crate::types::{HookContext, HookDecision, HookEvent, HookInput, HookMatcher, HookOutput};

/// Resolve the event for a hook callback request.
///
/// The `event` field wins when present; otherwise the event name embedded
/// in the input; otherwise the `_callback` suffix is stripped from the
/// callback ID.
fn resolve_event(request: &HookCallbackRequest) -> Option<HookEvent> {
    if let Some(event) = request.event.as_deref().and_then(HookEvent::from_name) {
        return Some(event);
    }
    if let Some(event) = request
        .input
        .get("hook_event_name")
        .and_then(serde_json::Value::as_str)
        .and_then(HookEvent::from_name)
    {
        return Some(event);
    }
    request
        .callback_id
        .strip_suffix("_callback")
        .and_then(HookEvent::from_name)
}

/// Dispatch a hook callback request and build the response payload.
pub(crate) async fn dispatch_hook_callback(
    hooks: &HashMap<HookEvent, Vec<HookMatcher>>,
    request: HookCallbackRequest,
    session_id: Option<String>,
    cancel: &CancellationToken,
) -> serde_json::Value {
    let Some(event) = resolve_event(&request) else {
        tracing::warn!(callback_id = %request.callback_id, "Hook callback for unresolvable event");
        return HookOutput::proceed().to_response();
    };

    // Re-inject the event name so inputs lacking it still deserialize.
    let mut input_value = request.input;
    if !input_value.is_object() {
        input_value = serde_json::json!({});
    }
    input_value["hook_event_name"] = serde_json::Value::String(event.as_str().to_string());

    let input: HookInput = match serde_json::from_value(input_value) {
        Ok(input) => input,
        Err(e) => {
            // Malformed input is a callback-local failure: block with the message.
            tracing::warn!(event = %event, error = %e, "Malformed hook input");
            return HookOutput::block(format!("malformed hook input: {e}")).to_response();
        }
    };

    let Some(matchers) = hooks.get(&event) else {
        return HookOutput::proceed().to_response();
    };

    for matcher in matchers {
        if !matcher.matches(&input) {
            continue;
        }

        let context = HookContext {
            session_id: session_id.clone(),
            cancellation_token: Some(cancel.child_token()),
        };
        let call = matcher.callback.call(input.clone(), context);

        let outcome = tokio::select! {
            () = cancel.cancelled() => {
                // Never a silent drop: a cancelled dispatch reports a block.
                tracing::debug!(event = %event, "Hook dispatch cancelled");
                return HookOutput::block("cancelled").to_response();
            }
            result = async {
                match matcher.timeout {
                    Some(timeout) => tokio::time::timeout(timeout, call).await,
                    None => Ok(call.await),
                }
            } => result,
        };

        let output = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::warn!(event = %event, error = %e, "Hook callback failed");
                HookOutput::block(e.to_string())
            }
            Err(_elapsed) => {
                let timeout = matcher.timeout.unwrap_or_default();
                tracing::warn!(
                    event = %event,
                    timeout_ms = timeout.as_millis() as u64,
                    "Hook callback timed out"
                );
                HookOutput::block(format!("hook timed out after {}ms", timeout.as_millis()))
            }
        };

        match output.decision {
            HookDecision::Continue => continue,
            HookDecision::Block { .. } | HookDecision::ModifyInput { .. } | HookDecision::Stop { .. } => {
                return output.to_response();
            }
        }
    }

    HookOutput::proceed().to_response()
}
