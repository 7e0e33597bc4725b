//! In-process tool servers and MCP server configuration.
//!
//! A tool server is an addressable bundle of named tool handlers served to
//! the Agent without spawning another process: the Agent routes
//! `mcp_message` control requests to it and the SDK answers with JSON-RPC
//! style responses. Tool input schemas are generated from the handler's
//! declared input type via [`schemars`].
//!
//! # Example
//!
//! ```no_run
//! use agent_sdk::mcp::{tool, McpToolServer};
//! use schemars::JsonSchema;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize, JsonSchema)]
//! struct AddInput {
//!     a: f64,
//!     b: f64,
//! }
//!
//! let mut server = McpToolServer::new("calc");
//! server.add_tool(tool("add", "Add two numbers", |input: AddInput| async move {
//!     Ok(format!("{}", input.a + input.b))
//! }));
//! ```

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Result;

// ============================================================================
// Server configuration
// ============================================================================

/// MCP server connection configuration.
///
/// External variants (stdio, SSE, HTTP) are forwarded to the Agent as CLI
/// configuration; the [`Sdk`](McpServerConfig::Sdk) variant runs in-process
/// and is served over the control protocol.
#[derive(Clone)]
pub enum McpServerConfig {
    /// Spawn an MCP server as a subprocess
    Stdio {
        /// Command to execute
        command: String,
        /// Command arguments
        args: Vec<String>,
        /// Environment variables
        env: HashMap<String, String>,
    },
    /// Connect via Server-Sent Events
    Sse {
        /// Server URL
        url: String,
        /// HTTP headers
        headers: HashMap<String, String>,
    },
    /// Connect via HTTP
    Http {
        /// Server URL
        url: String,
        /// HTTP headers
        headers: HashMap<String, String>,
    },
    /// In-process SDK tool server
    Sdk(McpToolServer),
}

impl McpServerConfig {
    /// Whether this is an in-process SDK server.
    #[must_use]
    pub fn is_sdk(&self) -> bool {
        matches!(self, McpServerConfig::Sdk(_))
    }

    /// CLI-facing JSON for external server variants.
    ///
    /// SDK servers are announced through the initialize handshake instead
    /// and render here as a bare type marker.
    #[must_use]
    pub fn to_cli_json(&self) -> serde_json::Value {
        match self {
            McpServerConfig::Stdio { command, args, env } => {
                let mut obj = serde_json::json!({
                    "type": "stdio",
                    "command": command,
                });
                if !args.is_empty() {
                    obj["args"] = serde_json::json!(args);
                }
                if !env.is_empty() {
                    obj["env"] = serde_json::json!(env);
                }
                obj
            }
            McpServerConfig::Sse { url, headers } => {
                let mut obj = serde_json::json!({"type": "sse", "url": url});
                if !headers.is_empty() {
                    obj["headers"] = serde_json::json!(headers);
                }
                obj
            }
            McpServerConfig::Http { url, headers } => {
                let mut obj = serde_json::json!({"type": "http", "url": url});
                if !headers.is_empty() {
                    obj["headers"] = serde_json::json!(headers);
                }
                obj
            }
            McpServerConfig::Sdk(server) => serde_json::json!({
                "type": "sdk",
                "name": server.name,
            }),
        }
    }
}

impl std::fmt::Debug for McpServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            McpServerConfig::Stdio { command, .. } => {
                f.debug_struct("Stdio").field("command", command).finish()
            }
            McpServerConfig::Sse { url, .. } => f.debug_struct("Sse").field("url", url).finish(),
            McpServerConfig::Http { url, .. } => f.debug_struct("Http").field("url", url).finish(),
            McpServerConfig::Sdk(server) => f
                .debug_struct("Sdk")
                .field("name", &server.name)
                .field("tools", &server.tools.len())
                .finish(),
        }
    }
}

// ============================================================================
// JSON-RPC error
// ============================================================================

/// JSON-RPC method not found
pub const RPC_METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC invalid params
pub const RPC_INVALID_PARAMS: i64 = -32602;
/// JSON-RPC internal error
pub const RPC_INTERNAL_ERROR: i64 = -32603;

/// JSON-RPC style error returned from a tool server dispatch
#[derive(Debug, Clone)]
pub struct McpError {
    /// Well-known JSON-RPC error code
    pub code: i64,
    /// Error message
    pub message: String,
}

impl McpError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

// ============================================================================
// Tool results
// ============================================================================

/// Content fragment within a tool result
#[derive(Debug, Clone)]
pub enum ToolContent {
    /// Text content
    Text {
        /// The text
        text: String,
    },
    /// Image content
    Image {
        /// Base64-encoded image data
        data: String,
        /// MIME type
        mime_type: String,
    },
}

impl ToolContent {
    fn to_json(&self) -> serde_json::Value {
        match self {
            ToolContent::Text { text } => serde_json::json!({"type": "text", "text": text}),
            ToolContent::Image { data, mime_type } => serde_json::json!({
                "type": "image",
                "data": data,
                "mimeType": mime_type,
            }),
        }
    }
}

/// Result of a tool handler invocation
#[derive(Debug, Clone, Default)]
pub struct ToolResult {
    /// Ordered content fragments
    pub content: Vec<ToolContent>,
    /// Whether this result reports a failure
    pub is_error: bool,
}

impl ToolResult {
    /// A plain text result.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// An error result carrying a message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// An image result.
    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Image {
                data: data.into(),
                mime_type: mime_type.into(),
            }],
            is_error: false,
        }
    }

    /// Wire payload for a `tools/call` response.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let content: Vec<serde_json::Value> =
            self.content.iter().map(ToolContent::to_json).collect();
        let mut result = serde_json::json!({"content": content});
        if self.is_error {
            result["isError"] = serde_json::Value::Bool(true);
        }
        result
    }
}

// ============================================================================
// Tools and servers
// ============================================================================

type ToolHandlerFn = Arc<
    dyn Fn(serde_json::Value) -> Pin<Box<dyn std::future::Future<Output = Result<ToolResult>> + Send>>
        + Send
        + Sync,
>;

/// A named tool with a JSON-Schema input contract and an async handler
#[derive(Clone)]
pub struct McpTool {
    /// Tool name, unique within its server
    pub name: String,
    /// What the tool does; shown to the model
    pub description: String,
    /// JSON Schema of the tool input
    pub input_schema: serde_json::Value,
    handler: ToolHandlerFn,
}

impl std::fmt::Debug for McpTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

impl McpTool {
    /// Create a tool from a raw schema and a JSON-in / result-out handler.
    ///
    /// Prefer [`tool`] for type-safe inputs.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
        handler: F,
    ) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<ToolResult>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler: Arc::new(move |input| Box::pin(handler(input))),
        }
    }

    /// Descriptor announced to the Agent (`tools/list` and initialization).
    #[must_use]
    pub fn descriptor(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
        })
    }
}

/// Create a type-safe tool.
///
/// The handler's declared input type `T` drives JSON-Schema generation at
/// registration time; the Agent consults that schema to validate tool
/// calls. The handler returns text; errors become `isError` tool results,
/// never transport-level failures.
pub fn tool<T, F, Fut>(
    name: impl Into<String>,
    description: impl Into<String>,
    handler: F,
) -> McpTool
where
    T: serde::de::DeserializeOwned + schemars::JsonSchema,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<String>> + Send + 'static,
{
    let schema =
        serde_json::to_value(schemars::schema_for!(T)).unwrap_or_else(|_| serde_json::json!({
            "type": "object"
        }));
    let handler = Arc::new(handler);
    McpTool::new(name, description, schema, move |input: serde_json::Value| {
        let handler = handler.clone();
        async move {
            let typed: T = match serde_json::from_value(input) {
                Ok(v) => v,
                Err(e) => return Ok(ToolResult::error(format!("invalid input: {e}"))),
            };
            match (*handler)(typed).await {
                Ok(text) => Ok(ToolResult::text(text)),
                Err(e) => Ok(ToolResult::error(e.to_string())),
            }
        }
    })
}

/// Like [`tool`], but the handler returns a full [`ToolResult`].
pub fn tool_with_result<T, F, Fut>(
    name: impl Into<String>,
    description: impl Into<String>,
    handler: F,
) -> McpTool
where
    T: serde::de::DeserializeOwned + schemars::JsonSchema,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<ToolResult>> + Send + 'static,
{
    let schema =
        serde_json::to_value(schemars::schema_for!(T)).unwrap_or_else(|_| serde_json::json!({
            "type": "object"
        }));
    let handler = Arc::new(handler);
    McpTool::new(name, description, schema, move |input: serde_json::Value| {
        let handler = handler.clone();
        async move {
            let typed: T = match serde_json::from_value(input) {
                Ok(v) => v,
                Err(e) => return Ok(ToolResult::error(format!("invalid input: {e}"))),
            };
            (*handler)(typed).await
        }
    })
}

/// Namespace of in-process tools served to the Agent.
#[derive(Clone, Debug)]
pub struct McpToolServer {
    /// Server name, used as the routing key in `mcp_message` requests
    pub name: String,
    /// Server version reported during MCP initialization
    pub version: String,
    tools: Vec<McpTool>,
}

impl McpToolServer {
    /// Create a new tool server.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: "1.0.0".to_string(),
            tools: Vec::new(),
        }
    }

    /// Set the reported server version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Register a tool. Tools keep registration order.
    pub fn add_tool(&mut self, tool: McpTool) -> &mut Self {
        self.tools.push(tool);
        self
    }

    /// Registered tools, in order.
    #[must_use]
    pub fn tools(&self) -> &[McpTool] {
        &self.tools
    }

    /// Tool descriptors for the initialize handshake.
    #[must_use]
    pub fn tool_descriptors(&self) -> Vec<serde_json::Value> {
        self.tools.iter().map(McpTool::descriptor).collect()
    }

    /// Handle a JSON-RPC request routed to this server.
    ///
    /// # Errors
    /// Returns an [`McpError`] for unknown methods, unknown tools, or
    /// malformed params. Tool handler failures are not errors: they come
    /// back as `isError` tool results.
    pub async fn handle_request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, McpError> {
        match method {
            "initialize" => Ok(serde_json::json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": self.name, "version": self.version},
            })),
            "tools/list" => Ok(serde_json::json!({"tools": self.tool_descriptors()})),
            "tools/call" => self.handle_tool_call(params).await,
            other => Err(McpError::new(
                RPC_METHOD_NOT_FOUND,
                format!("unknown method: {other}"),
            )),
        }
    }

    async fn handle_tool_call(
        &self,
        params: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, McpError> {
        let name = params
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| McpError::new(RPC_INVALID_PARAMS, "missing tool name"))?;

        let tool = self
            .tools
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| McpError::new(RPC_INVALID_PARAMS, format!("unknown tool: {name}")))?;

        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        tracing::debug!(server = %self.name, tool = %tool.name, "Invoking in-process tool");

        match (tool.handler.as_ref())(arguments).await {
            Ok(result) => Ok(result.to_json()),
            Err(e) => Ok(ToolResult::error(e.to_string()).to_json()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct AddInput {
        a: f64,
        b: f64,
    }

    fn calc_server() -> McpToolServer {
        let mut server = McpToolServer::new("calc");
        server.add_tool(tool("add", "Add two numbers", |input: AddInput| async move {
            Ok(format!("{}", input.a + input.b))
        }));
        server
    }

    #[test]
    fn schema_reflects_input_type() {
        let server = calc_server();
        let schema = &server.tools()[0].input_schema;
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["a"]["type"], "number");
        assert_eq!(schema["properties"]["b"]["type"], "number");
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert!(required.contains(&"a") && required.contains(&"b"));
    }

    #[tokio::test]
    async fn tools_list_returns_descriptors() {
        let server = calc_server();
        let result = server
            .handle_request("tools/list", serde_json::Value::Null)
            .await
            .unwrap();
        assert_eq!(result["tools"][0]["name"], "add");
        assert_eq!(result["tools"][0]["description"], "Add two numbers");
        assert!(result["tools"][0]["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn tools_call_wraps_text_result() {
        let server = calc_server();
        let result = server
            .handle_request(
                "tools/call",
                serde_json::json!({"name": "add", "arguments": {"a": 2, "b": 3}}),
            )
            .await
            .unwrap();
        assert_eq!(
            result,
            serde_json::json!({"content": [{"type": "text", "text": "5"}]})
        );
    }

    #[tokio::test]
    async fn handler_error_becomes_error_result() {
        let mut server = McpToolServer::new("fail");
        server.add_tool(tool("boom", "Always fails", |_: AddInput| async move {
            Err(crate::error::AgentError::mcp("it broke"))
        }));
        let result = server
            .handle_request(
                "tools/call",
                serde_json::json!({"name": "boom", "arguments": {"a": 1, "b": 2}}),
            )
            .await
            .unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("it broke"));
    }

    #[tokio::test]
    async fn invalid_input_becomes_error_result() {
        let server = calc_server();
        let result = server
            .handle_request(
                "tools/call",
                serde_json::json!({"name": "add", "arguments": {"a": "x"}}),
            )
            .await
            .unwrap();
        assert_eq!(result["isError"], true);
    }

    #[tokio::test]
    async fn unknown_method_and_tool() {
        let server = calc_server();
        let err = server
            .handle_request("resources/list", serde_json::Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.code, RPC_METHOD_NOT_FOUND);

        let err = server
            .handle_request("tools/call", serde_json::json!({"name": "sub"}))
            .await
            .unwrap_err();
        assert_eq!(err.code, RPC_INVALID_PARAMS);
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let server = calc_server().with_version("2.1.0");
        let result = server
            .handle_request("initialize", serde_json::Value::Null)
            .await
            .unwrap();
        assert_eq!(result["serverInfo"]["name"], "calc");
        assert_eq!(result["serverInfo"]["version"], "2.1.0");
    }
}
