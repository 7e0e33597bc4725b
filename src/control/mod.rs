//! Bidirectional control plane.
//!
//! One router task is the sole consumer of the transport's inbound frame
//! queue. It classifies every frame and either forwards a conversation
//! message to the session channel, dispatches an inbound control request
//! onto a short-lived callback task, or correlates an inbound control
//! response with a pending outbound request.
//!
//! Callback tasks never run on the router: a long hook or permission
//! decision must not stall parsing of unrelated frames, so independent
//! control requests may be answered out of their arrival order. Each task
//! posts exactly one response frame, serialized through the transport lock
//! so concurrent writers never interleave lines.

pub(crate) mod protocol;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::callbacks::SharedPermissionCallback;
use crate::error::{AgentError, Result};
use crate::mcp::McpToolServer;
use crate::message::parse_message;
use crate::transport::Transport;
use crate::types::{AgentOptions, HookEvent, HookMatcher, Message, RequestId, SessionId};

use protocol::{
    classify, control_request, error_response, parse_control_response, success_response,
    CanUseToolRequest, FrameKind, HookCallbackRequest, InboundControlRequest,
    InboundControlResponse, McpMessageRequest, RequestIdGenerator,
};

/// Cap on how long the initialization handshake waits for its response.
const INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Session message channel capacity; the router blocks when the consumer
/// stalls rather than dropping messages.
const MESSAGE_CHANNEL_CAPACITY: usize = 100;

/// Error channel capacity.
const ERROR_CHANNEL_CAPACITY: usize = 10;

type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;
type PendingRegistry = Arc<StdMutex<HashMap<RequestId, oneshot::Sender<InboundControlResponse>>>>;

/// The control plane for one connection.
///
/// Owns the pending-request registry, the registered callback runtimes and
/// the outbound request ID generator. Shared between the router task, the
/// callback tasks it spawns, and the client facade.
pub(crate) struct ControlProtocol {
    transport: SharedTransport,
    pending: PendingRegistry,
    hooks: Arc<HashMap<HookEvent, Vec<HookMatcher>>>,
    servers: Arc<HashMap<String, McpToolServer>>,
    can_use_tool: Option<SharedPermissionCallback>,
    control_timeout: Duration,
    ids: RequestIdGenerator,
    initialized: AtomicBool,
    session_id: Arc<StdMutex<Option<SessionId>>>,
    cancel: CancellationToken,
}

impl ControlProtocol {
    pub(crate) fn new(
        transport: SharedTransport,
        options: &AgentOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            pending: Arc::new(StdMutex::new(HashMap::new())),
            hooks: Arc::new(options.hooks.clone()),
            servers: Arc::new(options.sdk_servers()),
            can_use_tool: options.can_use_tool.clone(),
            control_timeout: options.control_timeout(),
            ids: RequestIdGenerator::default(),
            initialized: AtomicBool::new(false),
            session_id: Arc::new(StdMutex::new(None)),
            cancel,
        }
    }

    /// Spawn the router task over the transport's inbound channels.
    ///
    /// Returns the session message channel, the error channel and the
    /// router handle. The router exits on cancellation or when the frame
    /// channel closes (transport done).
    pub(crate) fn spawn_router(
        self: &Arc<Self>,
        frames: mpsc::Receiver<String>,
        transport_errors: mpsc::Receiver<AgentError>,
    ) -> (
        mpsc::Receiver<Message>,
        mpsc::Receiver<AgentError>,
        JoinHandle<()>,
    ) {
        let (msg_tx, msg_rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        let (err_tx, err_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            this.run_router(frames, transport_errors, msg_tx, err_tx).await;
        });
        (msg_rx, err_rx, handle)
    }

    async fn run_router(
        self: Arc<Self>,
        mut frames: mpsc::Receiver<String>,
        mut transport_errors: mpsc::Receiver<AgentError>,
        msg_tx: mpsc::Sender<Message>,
        err_tx: mpsc::Sender<AgentError>,
    ) {
        let mut transport_errors_open = true;
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                frame = frames.recv() => match frame {
                    Some(line) => {
                        if !self.handle_frame(&line, &msg_tx, &err_tx).await {
                            break;
                        }
                    }
                    None => {
                        tracing::debug!("Inbound frame channel closed, router exiting");
                        break;
                    }
                },
                err = transport_errors.recv(), if transport_errors_open => match err {
                    Some(err) => forward_error(&err_tx, err),
                    None => transport_errors_open = false,
                },
            }
        }

        // Drain pending waiters so outstanding outbound requests observe
        // cancellation instead of hanging.
        if let Ok(mut pending) = self.pending.lock() {
            pending.clear();
        }
    }

    /// Handle one inbound frame. Returns `false` when routing should stop
    /// (session channel gone).
    async fn handle_frame(
        self: &Arc<Self>,
        line: &str,
        msg_tx: &mpsc::Sender<Message>,
        err_tx: &mpsc::Sender<AgentError>,
    ) -> bool {
        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                // Frame-local: report and keep reading.
                forward_error(err_tx, AgentError::parse(line, e));
                return true;
            }
        };

        match classify(&value) {
            FrameKind::ControlRequest => {
                let request: InboundControlRequest = match serde_json::from_value(value) {
                    Ok(request) => request,
                    Err(e) => {
                        forward_error(err_tx, AgentError::parse(line, e));
                        return true;
                    }
                };
                let Some(request_id) = request.request_id.clone() else {
                    tracing::warn!("Control request without request_id, cannot respond");
                    return true;
                };
                tracing::trace!(
                    request_id = %request_id,
                    subtype = request.subtype().unwrap_or("?"),
                    "Dispatching control request"
                );
                let this = Arc::clone(self);
                let err_tx = err_tx.clone();
                tokio::spawn(async move {
                    this.answer_control_request(request_id, request.request, &err_tx)
                        .await;
                });
                true
            }
            FrameKind::ControlResponse => {
                self.correlate_response(&value);
                true
            }
            FrameKind::ControlCancel => {
                // Cancelling pending callbacks is not supported in v1.
                tracing::debug!(
                    request_id = value
                        .get("request_id")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or("?"),
                    "Ignoring control_cancel_request"
                );
                true
            }
            FrameKind::Conversation => match parse_message(value) {
                Ok(message) => {
                    self.observe_session_id(&message);
                    // Backpressure: block on the session channel, never drop.
                    msg_tx.send(message).await.is_ok()
                }
                Err(e) => {
                    forward_error(err_tx, e);
                    true
                }
            },
        }
    }

    fn observe_session_id(&self, message: &Message) {
        let observed = match message {
            Message::Result(result) => Some(result.session_id.clone()),
            Message::System(system) if system.subtype == "init" => system
                .data
                .get("session_id")
                .and_then(serde_json::Value::as_str)
                .map(SessionId::from),
            _ => None,
        };
        if let Some(session_id) = observed {
            if let Ok(mut guard) = self.session_id.lock() {
                *guard = Some(session_id);
            }
        }
    }

    // ========================================================================
    // Inbound dispatcher
    // ========================================================================

    /// Run the handler for one inbound control request and write exactly
    /// one response frame.
    async fn answer_control_request(
        self: Arc<Self>,
        request_id: RequestId,
        request: serde_json::Value,
        err_tx: &mpsc::Sender<AgentError>,
    ) {
        let subtype = request
            .get("subtype")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();

        let payload: std::result::Result<serde_json::Value, String> = match subtype.as_str() {
            "initialize" => Ok(serde_json::json!({
                "success": true,
                "capabilities": {
                    "hooks": !self.hooks.is_empty(),
                    "permissions": self.can_use_tool.is_some(),
                    "mcp": !self.servers.is_empty(),
                },
            })),
            "can_use_tool" => self.answer_can_use_tool(request, err_tx).await,
            "hook_callback" => self.answer_hook_callback(request).await,
            "mcp_message" => self.answer_mcp_message(request).await,
            "" => Err("missing control request subtype".to_string()),
            other => Err(format!("unknown control request subtype: {other}")),
        };

        let envelope = match payload {
            Ok(payload) => success_response(&request_id, payload),
            Err(message) => {
                tracing::debug!(request_id = %request_id, error = %message, "Control request failed");
                error_response(&request_id, &message)
            }
        };

        if let Err(e) = self.write_frame(&envelope).await {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to write control response");
        }
    }

    async fn answer_can_use_tool(
        &self,
        request: serde_json::Value,
        err_tx: &mpsc::Sender<AgentError>,
    ) -> std::result::Result<serde_json::Value, String> {
        let request: CanUseToolRequest = serde_json::from_value(request)
            .map_err(|e| format!("malformed can_use_tool request: {e}"))?;

        let decision = crate::permissions::decide_can_use_tool(
            self.can_use_tool.as_ref(),
            request,
            self.current_session_id().map(|s| s.as_str().to_string()),
            &self.cancel,
        )
        .await
        .map_err(|e| e.to_string())?;

        if let Some(message) = decision.interrupt_message {
            forward_error(err_tx, AgentError::PermissionDenied(message));
        }
        Ok(decision.response)
    }

    async fn answer_hook_callback(
        &self,
        request: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, String> {
        let request: HookCallbackRequest = serde_json::from_value(request)
            .map_err(|e| format!("malformed hook_callback request: {e}"))?;

        Ok(crate::hooks::dispatch_hook_callback(
            &self.hooks,
            request,
            self.current_session_id().map(|s| s.as_str().to_string()),
            &self.cancel,
        )
        .await)
    }

    async fn answer_mcp_message(
        &self,
        request: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, String> {
        let request: McpMessageRequest = serde_json::from_value(request)
            .map_err(|e| format!("malformed mcp_message request: {e}"))?;

        let Some(server) = self.servers.get(&request.server_name) else {
            return Err(format!("unknown MCP server: {}", request.server_name));
        };

        let (method, params) = request.rpc();
        match server.handle_request(&method, params).await {
            Ok(result) => Ok(serde_json::json!({"result": result})),
            Err(e) => Ok(serde_json::json!({
                "error": {"code": e.code, "message": e.message},
            })),
        }
    }

    // ========================================================================
    // Outbound correlator
    // ========================================================================

    fn correlate_response(&self, frame: &serde_json::Value) {
        let Some(response) = parse_control_response(frame) else {
            tracing::debug!("Malformed control response discarded");
            return;
        };
        let waiter = self
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(&response.request_id));
        match waiter {
            Some(sender) => {
                let request_id = response.request_id.clone();
                if sender.send(response).is_err() {
                    tracing::debug!(request_id = %request_id, "Response waiter already gone");
                }
            }
            None => {
                tracing::debug!(
                    request_id = %response.request_id,
                    "Control response with no pending request discarded"
                );
            }
        }
    }

    /// Issue an outbound control request and wait for the matching response.
    pub(crate) async fn send_control_request(
        &self,
        request: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value> {
        let request_id = self.ids.next();
        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(request_id.clone(), tx);
        }

        let remove_pending = || {
            if let Ok(mut pending) = self.pending.lock() {
                pending.remove(&request_id);
            }
        };

        let frame = control_request(&request_id, request);
        if let Err(e) = self.write_frame(&frame).await {
            remove_pending();
            return Err(e);
        }

        let timeout = timeout.unwrap_or(self.control_timeout);
        let outcome = tokio::select! {
            outcome = rx => outcome,
            () = tokio::time::sleep(timeout) => {
                remove_pending();
                return Err(AgentError::timeout(format!(
                    "control request {} timed out after {}s",
                    request_id,
                    timeout.as_secs()
                )));
            }
            () = self.cancel.cancelled() => {
                remove_pending();
                return Err(AgentError::Interrupted);
            }
        };

        match outcome {
            Ok(response) if response.subtype == "error" => Err(AgentError::protocol_for(
                response
                    .error
                    .unwrap_or_else(|| "unspecified control error".to_string()),
                response.request_id,
            )),
            Ok(response) => Ok(response.response),
            // Sender dropped: the connection closed underneath us.
            Err(_) => Err(AgentError::Interrupted),
        }
    }

    // ========================================================================
    // Handshake and facade operations
    // ========================================================================

    /// Perform the initialization handshake: announce hook bindings and
    /// in-process tool servers, then wait (30 s cap) for the Agent's
    /// acknowledgement. Prompts are rejected until this completes.
    pub(crate) async fn initialize(&self) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut hooks_config = serde_json::Map::new();
        for (event, matchers) in self.hooks.iter() {
            let entries: Vec<serde_json::Value> = matchers
                .iter()
                .map(|matcher| {
                    let mut entry = serde_json::json!({
                        "matcher": matcher.tool_name,
                        "hookCallbackIds": [event.callback_id()],
                    });
                    if let Some(timeout) = matcher.timeout {
                        entry["timeout"] =
                            serde_json::Value::from(timeout.as_millis() as u64);
                    }
                    entry
                })
                .collect();
            if !entries.is_empty() {
                hooks_config.insert(event.as_str().to_string(), serde_json::Value::from(entries));
            }
        }

        let mut servers_config = serde_json::Map::new();
        for (name, server) in self.servers.iter() {
            servers_config.insert(
                name.clone(),
                serde_json::json!({
                    "type": "sdk",
                    "tools": server.tool_descriptors(),
                }),
            );
        }

        let request = serde_json::json!({
            "subtype": "initialize",
            "hooks": hooks_config,
            "mcp_servers": servers_config,
        });

        self.send_control_request(request, Some(INIT_TIMEOUT))
            .await?;
        self.initialized.store(true, Ordering::SeqCst);
        tracing::debug!("Initialization handshake complete");
        Ok(())
    }

    /// Whether the initialization handshake has completed.
    pub(crate) fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Send a user prompt frame.
    pub(crate) async fn send_prompt(&self, prompt: &str) -> Result<()> {
        if !self.is_initialized() {
            return Err(AgentError::NotConnected);
        }
        let frame = serde_json::json!({
            "type": "user",
            "message": {"role": "user", "content": prompt},
            "parent_tool_use_id": null,
            "session_id": null,
        });
        self.write_frame(&frame).await
    }

    /// Interrupt the current turn.
    pub(crate) async fn interrupt(&self) -> Result<()> {
        self.send_control_request(serde_json::json!({"subtype": "interrupt"}), None)
            .await
            .map(|_| ())
    }

    /// Change the permission mode mid-conversation.
    pub(crate) async fn set_permission_mode(
        &self,
        mode: crate::types::PermissionMode,
    ) -> Result<()> {
        self.send_control_request(
            serde_json::json!({"subtype": "set_permission_mode", "mode": mode.as_str()}),
            None,
        )
        .await
        .map(|_| ())
    }

    /// Change the model mid-conversation.
    pub(crate) async fn set_model(&self, model: &str) -> Result<()> {
        self.send_control_request(
            serde_json::json!({"subtype": "set_model", "model": model}),
            None,
        )
        .await
        .map(|_| ())
    }

    /// Last observed session ID.
    pub(crate) fn current_session_id(&self) -> Option<SessionId> {
        self.session_id.lock().ok().and_then(|guard| guard.clone())
    }

    async fn write_frame(&self, frame: &serde_json::Value) -> Result<()> {
        let line = frame.to_string();
        let mut transport = self.transport.lock().await;
        transport.write(&line).await
    }
}

/// Forward an error without blocking the router; a full channel is logged,
/// never silently dropped.
fn forward_error(err_tx: &mpsc::Sender<AgentError>, err: AgentError) {
    if let Err(e) = err_tx.try_send(err) {
        tracing::warn!(error = %e, "Error channel full or closed, report dropped");
    }
}
