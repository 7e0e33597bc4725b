//! End-to-end protocol tests: a scripted in-memory transport plays the
//! Agent while the client runs the full control plane.

use agent_sdk::mcp::{tool, McpServerConfig, McpToolServer};
use agent_sdk::{
    hook_fn, AgentClient, AgentError, AgentOptions, HookEvent, HookMatcher, HookOutput, Message,
    Transport,
};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// In-memory Agent: records everything the SDK writes and lets the test
/// inject inbound frames. Outbound control requests are automatically
/// acknowledged so the initialization handshake (and interrupt and friends)
/// complete.
struct FakeAgent {
    frame_tx: mpsc::Sender<String>,
    frame_rx: Option<mpsc::Receiver<String>>,
    error_rx: Option<mpsc::Receiver<AgentError>>,
    writes: Arc<StdMutex<Vec<serde_json::Value>>>,
}

#[derive(Clone)]
struct FakeAgentHandle {
    inject: mpsc::Sender<String>,
    writes: Arc<StdMutex<Vec<serde_json::Value>>>,
}

impl FakeAgent {
    fn new() -> (Self, FakeAgentHandle) {
        let (frame_tx, frame_rx) = mpsc::channel(100);
        let (_error_tx, error_rx) = mpsc::channel(10);
        let writes = Arc::new(StdMutex::new(Vec::new()));
        let agent = Self {
            frame_tx: frame_tx.clone(),
            frame_rx: Some(frame_rx),
            error_rx: Some(error_rx),
            writes: writes.clone(),
        };
        let handle = FakeAgentHandle {
            inject: frame_tx,
            writes,
        };
        (agent, handle)
    }
}

#[async_trait]
impl Transport for FakeAgent {
    async fn start(&mut self) -> agent_sdk::Result<()> {
        Ok(())
    }

    async fn write(&mut self, data: &str) -> agent_sdk::Result<()> {
        let frame: serde_json::Value = serde_json::from_str(data.trim_end()).unwrap();
        self.writes.lock().unwrap().push(frame.clone());
        if frame["type"] == "control_request" {
            let ack = serde_json::json!({
                "type": "control_response",
                "response": {
                    "subtype": "success",
                    "request_id": frame["request_id"],
                    "response": {},
                }
            });
            let _ = self.frame_tx.try_send(ack.to_string());
        }
        Ok(())
    }

    fn take_frames(&mut self) -> Option<mpsc::Receiver<String>> {
        self.frame_rx.take()
    }

    fn take_errors(&mut self) -> Option<mpsc::Receiver<AgentError>> {
        self.error_rx.take()
    }

    fn is_ready(&self) -> bool {
        true
    }

    async fn close(&mut self) -> agent_sdk::Result<()> {
        Ok(())
    }
}

impl FakeAgentHandle {
    async fn send(&self, frame: serde_json::Value) {
        self.inject.send(frame.to_string()).await.unwrap();
    }

    /// Wait for a control response for the given request ID to be written.
    async fn written_response_for(&self, request_id: &str) -> serde_json::Value {
        for _ in 0..200 {
            let found = self
                .writes
                .lock()
                .unwrap()
                .iter()
                .find(|w| {
                    w["type"] == "control_response"
                        && w["response"]["request_id"] == request_id
                })
                .cloned();
            if let Some(found) = found {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no control response written for {request_id}");
    }

    fn written(&self) -> Vec<serde_json::Value> {
        self.writes.lock().unwrap().clone()
    }
}

async fn connected_client(options: AgentOptions) -> (AgentClient, FakeAgentHandle) {
    let (agent, handle) = FakeAgent::new();
    let mut client = AgentClient::new(options);
    client
        .connect_with_transport(Box::new(agent))
        .await
        .expect("connect");
    (client, handle)
}

#[tokio::test]
async fn simple_prompt_round_trip() {
    let (mut client, agent) = connected_client(AgentOptions::default()).await;

    agent
        .send(serde_json::json!({
            "type": "assistant",
            "message": {"role": "assistant", "content": [{"type": "text", "text": "4"}]}
        }))
        .await;
    agent
        .send(serde_json::json!({
            "type": "result", "subtype": "success", "duration_ms": 10,
            "num_turns": 1, "total_cost_usd": 0.0001, "session_id": "s1"
        }))
        .await;

    let mut session = client.query("What is 2+2?").await.unwrap();
    let text = session.collect_text().await.unwrap();
    assert_eq!(text, "4");
    assert_eq!(session.result().unwrap().session_id.as_str(), "s1");
    drop(session);
    assert_eq!(client.session_id().unwrap().as_str(), "s1");

    // The prompt frame is exact.
    let prompt = agent
        .written()
        .into_iter()
        .find(|w| w["type"] == "user")
        .unwrap();
    assert_eq!(
        prompt,
        serde_json::json!({
            "type": "user",
            "message": {"role": "user", "content": "What is 2+2?"},
            "parent_tool_use_id": null,
            "session_id": null,
        })
    );

    client.close().await.unwrap();
}

#[tokio::test]
async fn hook_block_produces_exact_response_envelope() {
    let mut hooks = HashMap::new();
    hooks.insert(
        HookEvent::PreToolUse,
        vec![HookMatcher::match_tool(
            "Bash",
            hook_fn(|_input, _ctx| async move { Ok(HookOutput::block("blocked")) }),
        )],
    );
    let (client, agent) = connected_client(AgentOptions::builder().hooks(hooks).build()).await;

    agent
        .send(serde_json::json!({
            "type": "control_request",
            "request_id": "r1",
            "request": {
                "subtype": "hook_callback",
                "callback_id": "PreToolUse_callback",
                "input": {"tool_name": "Bash", "tool_input": {"command": "rm -rf /"}}
            }
        }))
        .await;

    let response = agent.written_response_for("r1").await;
    assert_eq!(
        response,
        serde_json::json!({
            "type": "control_response",
            "response": {
                "subtype": "success",
                "request_id": "r1",
                "response": {"continue": false, "decision": "block", "reason": "blocked"},
            }
        })
    );
    drop(client);
}

#[derive(Deserialize, JsonSchema)]
struct AddInput {
    a: f64,
    b: f64,
}

#[tokio::test]
async fn tool_server_answers_tools_call() {
    let mut calc = McpToolServer::new("calc");
    calc.add_tool(tool("add", "Add two numbers", |input: AddInput| async move {
        Ok(format!("{}", input.a + input.b))
    }));
    let mut servers = HashMap::new();
    servers.insert("calc".to_string(), McpServerConfig::Sdk(calc));
    let (client, agent) =
        connected_client(AgentOptions::builder().mcp_servers(servers).build()).await;

    // The handshake announced the server and its schema.
    let init = agent
        .written()
        .into_iter()
        .find(|w| w["request"]["subtype"] == "initialize")
        .unwrap();
    assert_eq!(init["request"]["mcp_servers"]["calc"]["type"], "sdk");
    assert_eq!(
        init["request"]["mcp_servers"]["calc"]["tools"][0]["name"],
        "add"
    );

    agent
        .send(serde_json::json!({
            "type": "control_request",
            "request_id": "r2",
            "request": {
                "subtype": "mcp_message",
                "server_name": "calc",
                "message": {
                    "method": "tools/call",
                    "params": {"name": "add", "arguments": {"a": 2, "b": 3}}
                }
            }
        }))
        .await;

    let response = agent.written_response_for("r2").await;
    assert_eq!(response["response"]["subtype"], "success");
    assert_eq!(
        response["response"]["response"]["result"],
        serde_json::json!({"content": [{"type": "text", "text": "5"}]})
    );
    drop(client);
}

#[tokio::test]
async fn interrupt_round_trips() {
    let (mut client, agent) = connected_client(AgentOptions::default()).await;
    client.interrupt().await.unwrap();

    let interrupt = agent
        .written()
        .into_iter()
        .find(|w| w["request"]["subtype"] == "interrupt")
        .unwrap();
    assert_eq!(interrupt["type"], "control_request");
    assert!(interrupt["request_id"].is_string());
    client.close().await.unwrap();
}

#[tokio::test]
async fn partial_deltas_accumulate_to_hello() {
    let (mut client, agent) = connected_client(AgentOptions::default()).await;

    agent
        .send(serde_json::json!({
            "type": "content_block_start", "index": 0,
            "content_block": {"type": "text", "text": ""}
        }))
        .await;
    agent
        .send(serde_json::json!({
            "type": "content_block_delta", "index": 0,
            "delta": {"type": "text_delta", "text": "He"}
        }))
        .await;
    agent
        .send(serde_json::json!({
            "type": "content_block_delta", "index": 0,
            "delta": {"type": "text_delta", "text": "llo"}
        }))
        .await;
    agent
        .send(serde_json::json!({"type": "content_block_stop", "index": 0}))
        .await;
    agent
        .send(serde_json::json!({
            "type": "result", "subtype": "success", "duration_ms": 3,
            "num_turns": 1, "session_id": "s5"
        }))
        .await;

    let mut session = client.query("say hello").await.unwrap();
    session.wait().await.unwrap();
    assert_eq!(session.message().text(), "Hello");
    assert!(session.is_done());
    drop(session);
    client.close().await.unwrap();
}

#[tokio::test]
async fn missing_decider_allows_tool_use() {
    let (client, agent) = connected_client(AgentOptions::default()).await;

    agent
        .send(serde_json::json!({
            "type": "control_request",
            "request_id": "r6",
            "request": {"subtype": "can_use_tool", "tool_name": "Write", "input": {"path": "x"}}
        }))
        .await;

    let response = agent.written_response_for("r6").await;
    assert_eq!(
        response["response"]["response"],
        serde_json::json!({"allowed": true})
    );
    drop(client);
}

#[tokio::test]
async fn second_connect_fails_and_close_is_idempotent() {
    let (mut client, _agent) = connected_client(AgentOptions::default()).await;
    let (second, _handle) = FakeAgent::new();
    let err = client
        .connect_with_transport(Box::new(second))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::AlreadyConnected));

    client.close().await.unwrap();
    client.close().await.unwrap();
    assert!(!client.is_connected());
}

#[tokio::test]
async fn handshake_is_written_before_prompts() {
    let mut hooks = HashMap::new();
    hooks.insert(
        HookEvent::PreToolUse,
        vec![HookMatcher::match_all(hook_fn(|_input, _ctx| async move {
            Ok(HookOutput::proceed())
        }))],
    );
    let (mut client, agent) = connected_client(AgentOptions::builder().hooks(hooks).build()).await;
    client.send("first prompt").await.unwrap();

    let written = agent.written();
    assert_eq!(written[0]["type"], "control_request");
    assert_eq!(written[0]["request"]["subtype"], "initialize");
    let entry = &written[0]["request"]["hooks"]["PreToolUse"][0];
    assert_eq!(entry["matcher"], "*");
    assert_eq!(entry["hookCallbackIds"][0], "PreToolUse_callback");
    assert_eq!(written.last().unwrap()["type"], "user");
    client.close().await.unwrap();
}

#[tokio::test]
async fn receive_streams_until_result() {
    use futures::StreamExt;

    let (mut client, agent) = connected_client(AgentOptions::default()).await;
    client.send("hello").await.unwrap();
    agent
        .send(serde_json::json!({
            "type": "assistant",
            "message": {"role": "assistant", "content": [{"type": "text", "text": "hi"}]}
        }))
        .await;
    agent
        .send(serde_json::json!({
            "type": "result", "subtype": "success", "duration_ms": 1,
            "num_turns": 1, "session_id": "s8"
        }))
        .await;

    let mut stream = Box::pin(client.receive());
    let mut seen = Vec::new();
    while let Some(item) = stream.next().await {
        seen.push(item.unwrap());
    }
    assert_eq!(seen.len(), 2);
    assert!(matches!(seen.last(), Some(Message::Result(_))));
    drop(stream);
    client.close().await.unwrap();
}

#[tokio::test]
async fn unknown_frames_flow_through_as_unknown_messages() {
    let (mut client, agent) = connected_client(AgentOptions::default()).await;
    agent
        .send(serde_json::json!({"type": "telemetry", "n": 1}))
        .await;
    agent
        .send(serde_json::json!({
            "type": "result", "subtype": "success", "duration_ms": 1,
            "num_turns": 1, "session_id": "s9"
        }))
        .await;

    let mut session = client.query("x").await.unwrap();
    let messages = session.collect().await.unwrap();
    assert!(matches!(
        &messages[0],
        Message::Unknown { message_type, .. } if message_type == "telemetry"
    ));
    drop(session);
    client.close().await.unwrap();
}
