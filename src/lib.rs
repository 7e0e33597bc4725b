//! # agent-sdk
//!
//! Rust SDK for driving an interactive agent CLI over a bidirectional,
//! newline-delimited JSON protocol on its stdin/stdout. Async/await,
//! strong typing, tokio-based.
//!
//! The SDK gives an application a structured, streaming API for
//! multi-turn conversations while simultaneously servicing the callbacks
//! the Agent initiates: tool-use permission checks, lifecycle hooks, and
//! in-process tool invocations.
//!
//! ## Quick Start
//!
//! One-shot queries:
//!
//! ```no_run
//! #[tokio::main]
//! async fn main() -> agent_sdk::Result<()> {
//!     let answer = agent_sdk::query_text("What is 2 + 2?", None).await?;
//!     println!("{answer}");
//!     Ok(())
//! }
//! ```
//!
//! Multi-turn conversations with [`AgentClient`]:
//!
//! ```no_run
//! use agent_sdk::{AgentClient, AgentOptions};
//!
//! # async fn example() -> agent_sdk::Result<()> {
//! let options = AgentOptions::builder()
//!     .system_prompt("You are a helpful coding assistant")
//!     .max_turns(10)
//!     .build();
//!
//! let mut client = AgentClient::new(options);
//! client.connect().await?;
//!
//! let mut session = client.query("Summarize src/lib.rs").await?;
//! while session.next().await {
//!     // inspect session.current() as messages stream in
//! }
//! println!("{}", session.message().text());
//!
//! client.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Hooks
//!
//! Intercept lifecycle events such as tool use:
//!
//! ```no_run
//! use agent_sdk::{hook_fn, AgentOptions, HookEvent, HookMatcher, HookOutput};
//! use std::collections::HashMap;
//!
//! let guard = hook_fn(|input, _ctx| async move {
//!     if input.tool_input_as::<serde_json::Value>()?.to_string().contains("rm -rf") {
//!         return Ok(HookOutput::block("destructive command"));
//!     }
//!     Ok(HookOutput::proceed())
//! });
//!
//! let mut hooks = HashMap::new();
//! hooks.insert(HookEvent::PreToolUse, vec![HookMatcher::match_tool("Bash", guard)]);
//! let options = AgentOptions::builder().hooks(hooks).build();
//! ```
//!
//! ## Permission control
//!
//! ```no_run
//! use agent_sdk::{permission_fn, AgentOptions, PermissionResult};
//!
//! let decider = permission_fn(|request, _ctx| async move {
//!     match request.tool_name.as_str() {
//!         "Read" | "Glob" => Ok(PermissionResult::allow()),
//!         other => Ok(PermissionResult::deny(format!("{other} not allowed"))),
//!     }
//! });
//! let options = AgentOptions::builder().can_use_tool(decider).build();
//! ```
//!
//! ## In-process tools
//!
//! ```no_run
//! use agent_sdk::mcp::{tool, McpServerConfig, McpToolServer};
//! use agent_sdk::AgentOptions;
//! use schemars::JsonSchema;
//! use serde::Deserialize;
//! use std::collections::HashMap;
//!
//! #[derive(Deserialize, JsonSchema)]
//! struct AddInput { a: f64, b: f64 }
//!
//! let mut calc = McpToolServer::new("calc");
//! calc.add_tool(tool("add", "Add two numbers", |input: AddInput| async move {
//!     Ok(format!("{}", input.a + input.b))
//! }));
//!
//! let mut servers = HashMap::new();
//! servers.insert("calc".to_string(), McpServerConfig::Sdk(calc));
//! let options = AgentOptions::builder().mcp_servers(servers).build();
//! ```
//!
//! ## Architecture
//!
//! - [`transport`]: subprocess spawn and newline-delimited framing
//! - [`message`]: frame parsing into typed messages and content blocks
//! - [`session`]: cursor over one query's response stream
//! - [`client`]: connection facade (connect, query, interrupt, close)
//! - [`mcp`]: in-process tool servers
//! - [`callbacks`]: hook and permission callback traits
//! - [`types`]: options, messages, identifiers, hook/permission types
//! - [`error`]: error taxonomy
//!
//! ## Logging
//!
//! The crate instruments itself with [`tracing`]. Events are zero-cost
//! without a subscriber; attach one in your application to see them:
//!
//! ```ignore
//! tracing_subscriber::fmt::init();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod callbacks;
pub mod client;
mod control;
pub mod error;
mod hooks;
pub mod mcp;
pub mod message;
mod permissions;
pub mod query;
pub mod session;
pub mod transport;
pub mod types;
pub mod utils;

pub use callbacks::{
    hook_fn, permission_fn, HookCallback, PermissionCallback, SharedHookCallback,
    SharedPermissionCallback,
};
pub use client::AgentClient;
pub use error::{AgentError, Result};
pub use message::parse_message;
pub use query::{query, query_result, query_text};
pub use session::Session;
pub use transport::{SubprocessTransport, Transport};
pub use types::{
    AgentOptions, AssistantMessage, ContentBlock, HookContext, HookEvent, HookInput, HookMatcher,
    HookOutput, Message, PermissionContext, PermissionMode, PermissionRequest, PermissionResult,
    ResultMessage, SessionId, StreamEvent, SystemMessage, ToolName, UserMessage,
};

/// Version of the SDK
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
