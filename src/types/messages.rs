//! Conversation message and content block types
//!
//! Messages and content blocks are tagged sum types mirroring the Agent's
//! stream-json wire shapes. The iterator surface exposes the common
//! supertype ([`Message`]) and callers dispatch on the variant.

use serde::{Deserialize, Serialize};

use super::identifiers::SessionId;

// ============================================================================
// Content Blocks
// ============================================================================

/// Text content block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextBlock {
    /// Text content
    pub text: String,
}

/// Thinking content block (extended thinking)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThinkingBlock {
    /// Thinking content
    pub thinking: String,
    /// Signature for verification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Tool invocation request emitted by the Agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolUseBlock {
    /// Tool use ID
    pub id: String,
    /// Tool name
    pub name: String,
    /// Tool input, opaque JSON
    #[serde(default)]
    pub input: serde_json::Value,
}

impl ToolUseBlock {
    /// Deserialize the tool input into a concrete type.
    ///
    /// # Errors
    /// Returns an error if the input does not match `T`.
    pub fn input_as<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.input.clone())
    }
}

/// Content of a tool result: either a plain string or typed sub-blocks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentValue {
    /// Plain string content
    String(String),
    /// Structured sub-blocks (kept raw)
    Blocks(Vec<serde_json::Value>),
}

impl ContentValue {
    /// Concatenate the text carried by this value.
    ///
    /// For block form, joins the `text` field of every `text` sub-block.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            ContentValue::String(s) => s.clone(),
            ContentValue::Blocks(blocks) => blocks
                .iter()
                .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Result of a tool execution, echoed back to the Agent's context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultBlock {
    /// ID of the tool use this result answers
    pub tool_use_id: String,
    /// Raw result content (string or sub-blocks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentValue>,
    /// Whether this result is an error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolResultBlock {
    /// Convenience concatenation of the contained text.
    #[must_use]
    pub fn text(&self) -> String {
        self.content.as_ref().map(ContentValue::text).unwrap_or_default()
    }
}

/// Image source payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSource {
    /// Source encoding (e.g. "base64")
    #[serde(rename = "type")]
    pub source_type: String,
    /// MIME type of the image
    pub media_type: String,
    /// Encoded image data
    pub data: String,
}

/// Image content block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageBlock {
    /// Image source
    pub source: ImageSource,
}

/// Typed fragment of an assistant or user message.
///
/// Unknown block types never fail parsing; the parser degrades them to a
/// [`TextBlock`] whose text records the unknown type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text content
    Text(TextBlock),
    /// Extended thinking content
    Thinking(ThinkingBlock),
    /// Tool invocation request
    ToolUse(ToolUseBlock),
    /// Tool execution result
    ToolResult(ToolResultBlock),
    /// Image content
    Image(ImageBlock),
}

// ============================================================================
// Messages
// ============================================================================

/// A message authored by the user (or echoed tool results)
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserMessage {
    /// Ordered content blocks
    pub content: Vec<ContentBlock>,
}

impl UserMessage {
    /// All text content concatenated.
    #[must_use]
    pub fn text(&self) -> String {
        collect_text(&self.content)
    }
}

/// A response from the Agent's model
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssistantMessage {
    /// Model that produced the message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Ordered content blocks; indices are stable across streaming deltas
    pub content: Vec<ContentBlock>,
}

impl AssistantMessage {
    /// All text content concatenated.
    #[must_use]
    pub fn text(&self) -> String {
        collect_text(&self.content)
    }

    /// All thinking content concatenated.
    #[must_use]
    pub fn thinking(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Thinking(t) => Some(t.thinking.as_str()),
                _ => None,
            })
            .collect()
    }

    /// All tool use blocks, in order.
    #[must_use]
    pub fn tool_uses(&self) -> Vec<&ToolUseBlock> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse(t) => Some(t),
                _ => None,
            })
            .collect()
    }
}

fn collect_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect()
}

/// System message carrying Agent-side metadata (e.g. the `init` frame)
#[derive(Debug, Clone, Serialize)]
pub struct SystemMessage {
    /// System message subtype
    pub subtype: String,
    /// Remaining data fields, kept raw
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Terminal result of one query, with timing and cost statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMessage {
    /// Result subtype: `success` or an error kind
    pub subtype: String,
    /// Total duration in milliseconds
    #[serde(default)]
    pub duration_ms: u64,
    /// Time spent in API calls, milliseconds
    #[serde(default)]
    pub duration_api_ms: u64,
    /// Whether the turn ended in error
    #[serde(default)]
    pub is_error: bool,
    /// Number of conversation turns
    #[serde(default)]
    pub num_turns: u32,
    /// Session ID, usable for resuming
    #[serde(default)]
    pub session_id: SessionId,
    /// Total cost in USD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    /// Token usage statistics, kept raw
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<serde_json::Value>,
    /// Result text for the `success` subtype
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Structured output payload when an output schema was configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_output: Option<serde_json::Value>,
}

/// Fine-grained streaming event describing a partial assistant message
#[derive(Debug, Clone, Serialize)]
pub struct StreamEvent {
    /// Event UUID, when present
    pub uuid: Option<String>,
    /// Session ID, when present
    pub session_id: Option<SessionId>,
    /// Raw event payload (`message_start`, `content_block_delta`, ...)
    pub event: serde_json::Value,
    /// Parent tool use ID for nested conversations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
}

/// Any message the Agent emits on its stdout stream.
///
/// Control frames are consumed internally and never appear here.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// User message (including echoed tool results)
    User {
        /// Message payload
        message: UserMessage,
        /// Frame UUID, when present
        #[serde(skip_serializing_if = "Option::is_none")]
        uuid: Option<String>,
        /// Parent tool use ID for nested conversations
        #[serde(skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
        /// Session ID, when present
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },
    /// Assistant response
    Assistant {
        /// Message payload
        message: AssistantMessage,
        /// Parent tool use ID for nested conversations
        #[serde(skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
        /// Session ID, when present
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },
    /// System metadata
    System(SystemMessage),
    /// Terminal result
    Result(ResultMessage),
    /// Partial-message stream event
    StreamEvent(StreamEvent),
    /// Frame with an unrecognized top-level type, kept raw
    Unknown {
        /// The original `type` field
        message_type: String,
        /// The whole frame
        data: serde_json::Value,
    },
}

impl Message {
    /// Wire-level type tag of this message.
    #[must_use]
    pub fn message_type(&self) -> &str {
        match self {
            Message::User { .. } => "user",
            Message::Assistant { .. } => "assistant",
            Message::System(_) => "system",
            Message::Result(_) => "result",
            Message::StreamEvent(_) => "stream_event",
            Message::Unknown { message_type, .. } => message_type,
        }
    }
}
