//! Client facade for multi-turn conversations with the Agent.
//!
//! The client composes the transport, the control plane and the session
//! surface: connect, initialize, send prompts, stream responses,
//! interrupt, switch modes, close.

use futures::Stream;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::control::ControlProtocol;
use crate::error::{AgentError, Result};
use crate::session::Session;
use crate::transport::{SubprocessTransport, Transport};
use crate::types::{AgentOptions, Message, PermissionMode, SessionId};

/// Client driving one Agent subprocess over the control protocol.
///
/// ```no_run
/// use agent_sdk::{AgentClient, AgentOptions};
///
/// # async fn example() -> agent_sdk::Result<()> {
/// let mut client = AgentClient::new(AgentOptions::default());
/// client.connect().await?;
///
/// let mut session = client.query("What is 2 + 2?").await?;
/// println!("{}", session.collect_text().await?);
///
/// client.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct AgentClient {
    options: AgentOptions,
    transport: Option<Arc<Mutex<Box<dyn Transport>>>>,
    protocol: Option<Arc<ControlProtocol>>,
    messages: Option<mpsc::Receiver<Message>>,
    errors: Option<mpsc::Receiver<AgentError>>,
    router: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    connected: bool,
}

impl AgentClient {
    /// Build an inert client; no I/O happens until [`connect`](Self::connect).
    #[must_use]
    pub fn new(options: AgentOptions) -> Self {
        Self {
            options,
            transport: None,
            protocol: None,
            messages: None,
            errors: None,
            router: None,
            cancel: CancellationToken::new(),
            connected: false,
        }
    }

    /// Spawn the Agent CLI, start the control plane and perform the
    /// initialization handshake.
    ///
    /// # Errors
    /// Fails when already connected, when the CLI cannot be found or
    /// spawned, or when the handshake times out.
    pub async fn connect(&mut self) -> Result<()> {
        let transport = SubprocessTransport::new(self.options.clone());
        self.connect_with_transport(Box::new(transport)).await
    }

    /// Like [`connect`](Self::connect), over a caller-supplied transport.
    ///
    /// # Errors
    /// Same as [`connect`](Self::connect).
    pub async fn connect_with_transport(&mut self, mut transport: Box<dyn Transport>) -> Result<()> {
        if self.connected {
            return Err(AgentError::AlreadyConnected);
        }

        transport.start().await?;
        let frames = transport
            .take_frames()
            .ok_or_else(|| AgentError::transport("frame channel already taken"))?;
        let transport_errors = transport
            .take_errors()
            .ok_or_else(|| AgentError::transport("error channel already taken"))?;

        // Fresh cancellation root per connection; close() cancels it and
        // every session/callback child under it.
        self.cancel = CancellationToken::new();

        let shared: Arc<Mutex<Box<dyn Transport>>> = Arc::new(Mutex::new(transport));
        let protocol = Arc::new(ControlProtocol::new(
            shared.clone(),
            &self.options,
            self.cancel.clone(),
        ));
        let (messages, errors, router) = protocol.spawn_router(frames, transport_errors);

        if let Err(e) = protocol.initialize().await {
            tracing::warn!(error = %e, "Initialization handshake failed");
            self.cancel.cancel();
            let mut transport = shared.lock().await;
            let _ = transport.close().await;
            return Err(e);
        }

        self.transport = Some(shared);
        self.protocol = Some(protocol);
        self.messages = Some(messages);
        self.errors = Some(errors);
        self.router = Some(router);
        self.connected = true;
        Ok(())
    }

    fn protocol(&self) -> Result<&Arc<ControlProtocol>> {
        if !self.connected {
            return Err(AgentError::NotConnected);
        }
        self.protocol.as_ref().ok_or(AgentError::NotConnected)
    }

    /// Send a prompt and return a session that drains messages until the
    /// next result.
    ///
    /// # Errors
    /// Fails when not connected or when the prompt cannot be written.
    pub async fn query(&mut self, prompt: impl AsRef<str>) -> Result<Session<'_>> {
        self.protocol()?.send_prompt(prompt.as_ref()).await?;
        let cancel = self.cancel.child_token();
        let messages = self.messages.as_mut().ok_or(AgentError::NotConnected)?;
        let errors = self.errors.as_mut().ok_or(AgentError::NotConnected)?;
        Ok(Session::new(messages, errors, cancel))
    }

    /// Send a prompt without creating a session. Pair with
    /// [`receive`](Self::receive) to manage iteration manually.
    ///
    /// # Errors
    /// Fails when not connected or when the prompt cannot be written.
    pub async fn send(&mut self, prompt: impl AsRef<str>) -> Result<()> {
        self.protocol()?.send_prompt(prompt.as_ref()).await
    }

    /// Stream messages until (and including) the next result message.
    pub fn receive(&mut self) -> impl Stream<Item = Result<Message>> + '_ {
        async_stream::stream! {
            let Some(messages) = self.messages.as_mut() else {
                yield Err(AgentError::NotConnected);
                return;
            };
            let Some(errors) = self.errors.as_mut() else {
                yield Err(AgentError::NotConnected);
                return;
            };
            let mut errors_open = true;
            loop {
                tokio::select! {
                    biased;
                    message = messages.recv() => match message {
                        Some(message) => {
                            let is_result = matches!(message, Message::Result(_));
                            yield Ok(message);
                            if is_result {
                                break;
                            }
                        }
                        None => break,
                    },
                    err = errors.recv(), if errors_open => match err {
                        Some(err) => {
                            yield Err(err);
                            break;
                        }
                        None => errors_open = false,
                    },
                }
            }
        }
    }

    /// Receive a single message, bypassing session bookkeeping.
    pub async fn next_message(&mut self) -> Option<Message> {
        self.messages.as_mut()?.recv().await
    }

    /// Interrupt the current turn.
    ///
    /// # Errors
    /// Fails when not connected, on timeout, or when the Agent reports an
    /// error.
    pub async fn interrupt(&mut self) -> Result<()> {
        self.protocol()?.interrupt().await
    }

    /// Change the permission mode mid-conversation.
    ///
    /// # Errors
    /// Fails when not connected, on timeout, or when the Agent reports an
    /// error.
    pub async fn set_permission_mode(&mut self, mode: PermissionMode) -> Result<()> {
        self.protocol()?.set_permission_mode(mode).await
    }

    /// Change the model mid-conversation.
    ///
    /// # Errors
    /// Fails when not connected, on timeout, or when the Agent reports an
    /// error.
    pub async fn set_model(&mut self, model: impl AsRef<str>) -> Result<()> {
        self.protocol()?.set_model(model.as_ref()).await
    }

    /// Last session ID observed in result or init messages.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.protocol
            .as_ref()
            .and_then(|p| p.current_session_id())
    }

    /// Whether the client is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Shut down the control plane, then the transport. Idempotent.
    ///
    /// # Errors
    /// Returns an error when transport cleanup fails; repeated calls
    /// succeed trivially.
    pub async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.cancel.cancel();
        self.protocol = None;
        self.messages = None;
        self.errors = None;

        if let Some(router) = self.router.take() {
            let _ = router.await;
        }
        if let Some(transport) = self.transport.take() {
            let mut transport = transport.lock().await;
            transport.close().await?;
        }
        Ok(())
    }
}

impl Drop for AgentClient {
    fn drop(&mut self) {
        // Cancelling the root token stops the router and any callback
        // tasks; the transport kills the child on drop.
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for AgentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentClient")
            .field("connected", &self.connected)
            .field("session_id", &self.session_id())
            .finish()
    }
}
