//! Type definitions for the agent SDK
//!
//! Identifiers, conversation messages, configuration options, hook and
//! permission types used throughout the crate.

pub mod hooks;
pub mod identifiers;
pub mod messages;
pub mod options;
pub mod permissions;

pub use hooks::{
    HookContext, HookDecision, HookEvent, HookInput, HookMatcher, HookOutput,
};
pub use identifiers::{RequestId, SessionId, ToolName};
pub use messages::{
    AssistantMessage, ContentBlock, ContentValue, ImageBlock, ImageSource, Message, ResultMessage,
    StreamEvent, SystemMessage, TextBlock, ThinkingBlock, ToolResultBlock, ToolUseBlock,
    UserMessage,
};
pub use options::{
    AgentDefinition, AgentOptions, StderrCallback, SystemPrompt, SystemPromptPreset,
    DEFAULT_CONTROL_TIMEOUT,
};
pub use permissions::{
    PermissionBehavior, PermissionContext, PermissionDestination, PermissionMode,
    PermissionRequest, PermissionResult, PermissionRule, PermissionUpdate,
};
