//! Conversation message parsing.
//!
//! Turns raw inbound frames into typed [`Message`] values. Control frames
//! never reach this parser; the router (see [`crate::control`]) consumes
//! them first.

use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::types::{
    AssistantMessage, ContentBlock, Message, ResultMessage, SessionId, StreamEvent, SystemMessage,
    TextBlock, UserMessage,
};

/// Frame types that carry the fine-grained partial-message protocol at the
/// top level rather than wrapped in a `stream_event` envelope.
const PARTIAL_EVENT_TYPES: &[&str] = &[
    "message_start",
    "message_delta",
    "message_stop",
    "content_block_start",
    "content_block_delta",
    "content_block_stop",
];

/// Parse a raw frame into a typed [`Message`].
///
/// Unknown top-level types never fail: they come back as
/// [`Message::Unknown`] with the type preserved. Unknown content block
/// types degrade to text blocks marked `unknown:<type>`.
///
/// # Errors
/// Returns a parse error when a recognized frame shape is malformed. Such
/// errors are frame-local: the caller logs them and keeps reading.
pub fn parse_message(value: Value) -> Result<Message> {
    let message_type = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match message_type.as_str() {
        "user" => parse_user_message(&value),
        "assistant" => parse_assistant_message(&value),
        "system" => Ok(Message::System(SystemMessage {
            subtype: value
                .get("subtype")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            data: value,
        })),
        "result" => {
            let result: ResultMessage = serde_json::from_value(value.clone())
                .map_err(|e| AgentError::parse(value.to_string(), e))?;
            Ok(Message::Result(result))
        }
        "stream_event" => Ok(Message::StreamEvent(StreamEvent {
            uuid: string_field(&value, "uuid"),
            session_id: string_field(&value, "session_id").map(SessionId::from),
            parent_tool_use_id: string_field(&value, "parent_tool_use_id"),
            event: value.get("event").cloned().unwrap_or(Value::Null),
        })),
        t if PARTIAL_EVENT_TYPES.contains(&t) => Ok(Message::StreamEvent(StreamEvent {
            uuid: string_field(&value, "uuid"),
            session_id: string_field(&value, "session_id").map(SessionId::from),
            parent_tool_use_id: string_field(&value, "parent_tool_use_id"),
            event: value,
        })),
        _ => {
            tracing::debug!(message_type = %message_type, "Unrecognized frame type");
            Ok(Message::Unknown {
                message_type,
                data: value,
            })
        }
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn parse_user_message(value: &Value) -> Result<Message> {
    let content = value
        .get("message")
        .and_then(|m| m.get("content"))
        .cloned()
        .unwrap_or(Value::Null);

    Ok(Message::User {
        message: UserMessage {
            content: parse_content(&content, value)?,
        },
        uuid: string_field(value, "uuid"),
        parent_tool_use_id: string_field(value, "parent_tool_use_id"),
        session_id: string_field(value, "session_id").map(SessionId::from),
    })
}

fn parse_assistant_message(value: &Value) -> Result<Message> {
    let message = value.get("message").cloned().unwrap_or(Value::Null);
    let content = message.get("content").cloned().unwrap_or(Value::Null);

    Ok(Message::Assistant {
        message: AssistantMessage {
            model: message
                .get("model")
                .and_then(Value::as_str)
                .map(str::to_string),
            content: parse_content(&content, value)?,
        },
        parent_tool_use_id: string_field(value, "parent_tool_use_id"),
        session_id: string_field(value, "session_id").map(SessionId::from),
    })
}

/// Content may be a plain string (wrapped as one text block) or an array of
/// typed blocks.
fn parse_content(content: &Value, frame: &Value) -> Result<Vec<ContentBlock>> {
    match content {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(vec![ContentBlock::Text(TextBlock { text: s.clone() })]),
        Value::Array(blocks) => blocks
            .iter()
            .map(|block| parse_content_block(block, frame))
            .collect(),
        _ => Err(AgentError::parse(
            frame.to_string(),
            invalid_shape("content must be a string or array"),
        )),
    }
}

/// Parse one content block, degrading unknown types to a marker text block.
pub fn parse_content_block(block: &Value, frame: &Value) -> Result<ContentBlock> {
    let block_type = block.get("type").and_then(Value::as_str).unwrap_or_default();

    match block_type {
        "text" | "thinking" | "tool_use" | "tool_result" | "image" => {
            serde_json::from_value(block.clone())
                .map_err(|e| AgentError::parse(frame.to_string(), e))
        }
        other => Ok(ContentBlock::Text(TextBlock {
            text: format!("unknown:{other}"),
        })),
    }
}

fn invalid_shape(message: &str) -> serde_json::Error {
    serde::de::Error::custom(message)
}
