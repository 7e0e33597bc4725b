//! Session: a cursor over the message stream of one query.
//!
//! A session delivers messages in receipt order up to and including the
//! terminal result, accumulating the assistant message along the way —
//! including fine-grained partial deltas when the Agent streams them.

use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::message::parse_content_block;
use crate::types::{AssistantMessage, ContentBlock, Message, ResultMessage, TextBlock};

/// Iterator-style consumer of one query's response stream.
///
/// ```no_run
/// # async fn example(mut session: agent_sdk::Session<'_>) -> agent_sdk::Result<()> {
/// while session.next().await {
///     if let Some(message) = session.current() {
///         println!("{}", message.message_type());
///     }
/// }
/// println!("answer: {}", session.message().text());
/// # Ok(())
/// # }
/// ```
pub struct Session<'c> {
    messages: &'c mut mpsc::Receiver<Message>,
    errors: &'c mut mpsc::Receiver<AgentError>,
    cancel: CancellationToken,
    current: Option<Message>,
    message: AssistantMessage,
    /// Start of the block range owned by the in-flight partial message.
    partial_base: Option<usize>,
    /// Best-effort accumulation of `input_json_delta` fragments by index.
    partial_inputs: HashMap<usize, String>,
    result: Option<ResultMessage>,
    err: Option<AgentError>,
    done: bool,
    errors_open: bool,
}

impl<'c> Session<'c> {
    pub(crate) fn new(
        messages: &'c mut mpsc::Receiver<Message>,
        errors: &'c mut mpsc::Receiver<AgentError>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            messages,
            errors,
            cancel,
            current: None,
            message: AssistantMessage::default(),
            partial_base: None,
            partial_inputs: HashMap::new(),
            result: None,
            err: None,
            done: false,
            errors_open: true,
        }
    }

    /// Advance to the next message. Returns `false` on completion or error.
    ///
    /// The terminal result message is itself delivered (with `true`);
    /// every call after that reports done.
    pub async fn next(&mut self) -> bool {
        if self.done {
            return false;
        }

        loop {
            tokio::select! {
                // Deliver buffered messages before reacting to errors or
                // channel teardown, preserving receipt order.
                biased;
                message = self.messages.recv() => match message {
                    Some(message) => {
                        self.accumulate(&message);
                        let is_result = matches!(message, Message::Result(_));
                        if let Message::Result(ref result) = message {
                            self.result = Some(result.clone());
                        }
                        self.current = Some(message);
                        if is_result {
                            self.done = true;
                        }
                        return true;
                    }
                    None => {
                        self.done = true;
                        return false;
                    }
                },
                err = self.errors.recv(), if self.errors_open => match err {
                    Some(err) => {
                        self.err = Some(err);
                        self.done = true;
                        return false;
                    }
                    None => {
                        self.errors_open = false;
                        continue;
                    }
                },
                () = self.cancel.cancelled() => {
                    self.err = Some(AgentError::Interrupted);
                    self.done = true;
                    return false;
                }
            }
        }
    }

    /// The message delivered by the last successful [`next`](Self::next).
    #[must_use]
    pub fn current(&self) -> Option<&Message> {
        self.current.as_ref()
    }

    /// The cumulative assistant message, updated as full messages or
    /// streaming deltas arrive.
    #[must_use]
    pub fn message(&self) -> &AssistantMessage {
        &self.message
    }

    /// The terminal result, once delivered.
    #[must_use]
    pub fn result(&self) -> Option<&ResultMessage> {
        self.result.as_ref()
    }

    /// The error that terminated the session, if any.
    #[must_use]
    pub fn err(&self) -> Option<&AgentError> {
        self.err.as_ref()
    }

    /// Whether the session is terminal.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Cancel the session. Idempotent; subsequent
    /// [`next`](Self::next) calls report done.
    pub fn close(&mut self) {
        self.cancel.cancel();
        self.done = true;
    }

    /// Drain the stream and return every delivered message.
    ///
    /// # Errors
    /// Returns the terminating error, if the session ended with one.
    pub async fn collect(&mut self) -> Result<Vec<Message>> {
        let mut collected = Vec::new();
        while self.next().await {
            if let Some(message) = self.current.clone() {
                collected.push(message);
            }
        }
        match self.err.take() {
            Some(err) => Err(err),
            None => Ok(collected),
        }
    }

    /// Drain the stream and return the accumulated assistant text.
    ///
    /// # Errors
    /// Returns the terminating error, if the session ended with one.
    pub async fn collect_text(&mut self) -> Result<String> {
        while self.next().await {}
        match self.err.take() {
            Some(err) => Err(err),
            None => Ok(self.message.text()),
        }
    }

    /// Drain the stream and return the terminal result.
    ///
    /// # Errors
    /// Returns the terminating error, or `StreamClosed` when the stream
    /// ended without a result message.
    pub async fn wait(&mut self) -> Result<ResultMessage> {
        while self.next().await {}
        if let Some(err) = self.err.take() {
            return Err(err);
        }
        self.result.clone().ok_or(AgentError::StreamClosed)
    }

    // ========================================================================
    // Accumulation
    // ========================================================================

    fn accumulate(&mut self, message: &Message) {
        match message {
            Message::Assistant { message, .. } => {
                // A complete assistant message supersedes any partial blocks
                // accumulated for it since message_start.
                if let Some(base) = self.partial_base.take() {
                    self.message.content.truncate(base);
                    self.partial_inputs.clear();
                }
                if self.message.model.is_none() {
                    self.message.model.clone_from(&message.model);
                }
                self.message.content.extend(message.content.iter().cloned());
            }
            Message::StreamEvent(event) => self.apply_partial(&event.event),
            _ => {}
        }
    }

    fn apply_partial(&mut self, event: &serde_json::Value) {
        let event_type = event.get("type").and_then(serde_json::Value::as_str);
        match event_type {
            Some("message_start") => {
                self.partial_base = Some(self.message.content.len());
                if self.message.model.is_none() {
                    self.message.model = event
                        .get("message")
                        .and_then(|m| m.get("model"))
                        .and_then(serde_json::Value::as_str)
                        .map(str::to_string);
                }
            }
            Some("content_block_start") => {
                let Some(index) = self.event_index(event) else {
                    return;
                };
                let block = event
                    .get("content_block")
                    .map(|b| {
                        parse_content_block(b, event)
                            .unwrap_or_else(|_| ContentBlock::Text(TextBlock::default()))
                    })
                    .unwrap_or_else(|| ContentBlock::Text(TextBlock::default()));
                while self.message.content.len() < index {
                    self.message
                        .content
                        .push(ContentBlock::Text(TextBlock::default()));
                }
                if index < self.message.content.len() {
                    self.message.content[index] = block;
                } else {
                    self.message.content.push(block);
                }
            }
            Some("content_block_delta") => {
                let Some(index) = self.event_index(event) else {
                    return;
                };
                let Some(delta) = event.get("delta") else {
                    return;
                };
                self.apply_delta(index, delta);
            }
            Some("content_block_stop") => {
                let Some(index) = self.event_index(event) else {
                    return;
                };
                // Best effort: a complete input_json accumulation becomes
                // the tool input; the final full tool_use block arrives
                // separately anyway.
                if let Some(partial) = self.partial_inputs.remove(&index) {
                    if let Ok(input) = serde_json::from_str::<serde_json::Value>(&partial) {
                        if let Some(ContentBlock::ToolUse(tool_use)) =
                            self.block_at(index)
                        {
                            tool_use.input = input;
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn apply_delta(&mut self, index: usize, delta: &serde_json::Value) {
        let delta_type = delta.get("type").and_then(serde_json::Value::as_str);
        match delta_type {
            Some("text_delta") => {
                let text = delta
                    .get("text")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                match self.block_at(index) {
                    Some(ContentBlock::Text(block)) => block.text.push_str(&text),
                    Some(_) | None => {
                        tracing::debug!(index, "text_delta for a non-text block ignored");
                    }
                }
            }
            Some("thinking_delta") => {
                let thinking = delta
                    .get("thinking")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                match self.block_at(index) {
                    Some(ContentBlock::Thinking(block)) => block.thinking.push_str(&thinking),
                    Some(_) | None => {
                        tracing::debug!(index, "thinking_delta for a non-thinking block ignored");
                    }
                }
            }
            Some("input_json_delta") => {
                if let Some(partial) = delta.get("partial_json").and_then(serde_json::Value::as_str)
                {
                    self.partial_inputs
                        .entry(index)
                        .or_default()
                        .push_str(partial);
                }
            }
            _ => {}
        }
    }

    /// Resolve the event's index relative to the in-flight partial message.
    fn event_index(&self, event: &serde_json::Value) -> Option<usize> {
        let index = event.get("index").and_then(serde_json::Value::as_u64)? as usize;
        Some(self.partial_base.unwrap_or(0) + index)
    }

    fn block_at(&mut self, index: usize) -> Option<&mut ContentBlock> {
        self.message.content.get_mut(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionId;

    fn channels() -> (
        mpsc::Sender<Message>,
        mpsc::Receiver<Message>,
        mpsc::Sender<AgentError>,
        mpsc::Receiver<AgentError>,
    ) {
        let (msg_tx, msg_rx) = mpsc::channel(100);
        let (err_tx, err_rx) = mpsc::channel(10);
        (msg_tx, msg_rx, err_tx, err_rx)
    }

    fn assistant(text: &str) -> Message {
        Message::Assistant {
            message: AssistantMessage {
                model: Some("m1".into()),
                content: vec![ContentBlock::Text(TextBlock { text: text.into() })],
            },
            parent_tool_use_id: None,
            session_id: None,
        }
    }

    fn result(session: &str) -> Message {
        Message::Result(ResultMessage {
            subtype: "success".into(),
            duration_ms: 10,
            duration_api_ms: 5,
            is_error: false,
            num_turns: 1,
            session_id: SessionId::from(session),
            total_cost_usd: Some(0.0001),
            usage: None,
            result: None,
            structured_output: None,
        })
    }

    fn stream_event(event: serde_json::Value) -> Message {
        Message::StreamEvent(crate::types::StreamEvent {
            uuid: None,
            session_id: None,
            parent_tool_use_id: None,
            event,
        })
    }

    #[tokio::test]
    async fn collect_text_and_result() {
        let (msg_tx, mut msg_rx, _err_tx, mut err_rx) = channels();
        msg_tx.send(assistant("4")).await.unwrap();
        msg_tx.send(result("s1")).await.unwrap();

        let mut session = Session::new(&mut msg_rx, &mut err_rx, CancellationToken::new());
        let text = session.collect_text().await.unwrap();
        assert_eq!(text, "4");
        assert_eq!(session.result().unwrap().session_id.as_str(), "s1");
    }

    #[tokio::test]
    async fn terminal_after_result() {
        let (msg_tx, mut msg_rx, _err_tx, mut err_rx) = channels();
        msg_tx.send(result("s1")).await.unwrap();
        msg_tx.send(assistant("late")).await.unwrap();

        let mut session = Session::new(&mut msg_rx, &mut err_rx, CancellationToken::new());
        assert!(session.next().await);
        assert!(matches!(session.current(), Some(Message::Result(_))));
        // done: the late message is not delivered by this session
        assert!(!session.next().await);
        assert!(session.is_done());
    }

    #[tokio::test]
    async fn delivery_preserves_receipt_order() {
        let (msg_tx, mut msg_rx, _err_tx, mut err_rx) = channels();
        msg_tx.send(assistant("a")).await.unwrap();
        msg_tx.send(assistant("b")).await.unwrap();
        msg_tx.send(result("s1")).await.unwrap();

        let mut session = Session::new(&mut msg_rx, &mut err_rx, CancellationToken::new());
        let messages = session.collect().await.unwrap();
        assert_eq!(messages.len(), 3);
        assert!(matches!(messages[2], Message::Result(_)));
        assert_eq!(session.message().text(), "ab");
    }

    #[tokio::test]
    async fn error_terminates_iteration() {
        let (_msg_tx, mut msg_rx, err_tx, mut err_rx) = channels();
        err_tx
            .send(AgentError::process(1, "boom"))
            .await
            .unwrap();

        let mut session = Session::new(&mut msg_rx, &mut err_rx, CancellationToken::new());
        assert!(!session.next().await);
        assert!(matches!(session.err(), Some(AgentError::Process { .. })));
    }

    #[tokio::test]
    async fn buffered_messages_win_over_pending_errors() {
        let (msg_tx, mut msg_rx, err_tx, mut err_rx) = channels();
        msg_tx.send(assistant("kept")).await.unwrap();
        err_tx.send(AgentError::StreamClosed).await.unwrap();

        let mut session = Session::new(&mut msg_rx, &mut err_rx, CancellationToken::new());
        assert!(session.next().await);
        assert_eq!(session.message().text(), "kept");
    }

    #[tokio::test]
    async fn text_deltas_accumulate_in_place() {
        let (msg_tx, mut msg_rx, _err_tx, mut err_rx) = channels();
        msg_tx
            .send(stream_event(serde_json::json!({
                "type": "message_start", "message": {"model": "m9"}
            })))
            .await
            .unwrap();
        msg_tx
            .send(stream_event(serde_json::json!({
                "type": "content_block_start", "index": 0,
                "content_block": {"type": "text", "text": ""}
            })))
            .await
            .unwrap();
        for piece in ["He", "llo"] {
            msg_tx
                .send(stream_event(serde_json::json!({
                    "type": "content_block_delta", "index": 0,
                    "delta": {"type": "text_delta", "text": piece}
                })))
                .await
                .unwrap();
        }
        msg_tx
            .send(stream_event(
                serde_json::json!({"type": "content_block_stop", "index": 0}),
            ))
            .await
            .unwrap();
        msg_tx.send(result("s5")).await.unwrap();

        let mut session = Session::new(&mut msg_rx, &mut err_rx, CancellationToken::new());
        session.wait().await.unwrap();
        assert_eq!(session.message().text(), "Hello");
        assert_eq!(session.message().model.as_deref(), Some("m9"));
        assert!(session.is_done());
    }

    #[tokio::test]
    async fn thinking_and_input_json_deltas() {
        let (msg_tx, mut msg_rx, _err_tx, mut err_rx) = channels();
        let events = [
            serde_json::json!({"type": "message_start", "message": {}}),
            serde_json::json!({"type": "content_block_start", "index": 0,
                "content_block": {"type": "thinking", "thinking": ""}}),
            serde_json::json!({"type": "content_block_delta", "index": 0,
                "delta": {"type": "thinking_delta", "thinking": "hmm"}}),
            serde_json::json!({"type": "content_block_start", "index": 1,
                "content_block": {"type": "tool_use", "id": "t1", "name": "Bash", "input": {}}}),
            serde_json::json!({"type": "content_block_delta", "index": 1,
                "delta": {"type": "input_json_delta", "partial_json": "{\"command\":"}}),
            serde_json::json!({"type": "content_block_delta", "index": 1,
                "delta": {"type": "input_json_delta", "partial_json": "\"ls\"}"}}),
            serde_json::json!({"type": "content_block_stop", "index": 1}),
        ];
        for event in events {
            msg_tx.send(stream_event(event)).await.unwrap();
        }
        msg_tx.send(result("s6")).await.unwrap();

        let mut session = Session::new(&mut msg_rx, &mut err_rx, CancellationToken::new());
        session.wait().await.unwrap();
        assert_eq!(session.message().thinking(), "hmm");
        let uses = session.message().tool_uses();
        assert_eq!(uses[0].input, serde_json::json!({"command": "ls"}));
    }

    #[tokio::test]
    async fn full_assistant_message_supersedes_partials() {
        let (msg_tx, mut msg_rx, _err_tx, mut err_rx) = channels();
        msg_tx
            .send(stream_event(serde_json::json!({
                "type": "message_start", "message": {"model": "m1"}
            })))
            .await
            .unwrap();
        msg_tx
            .send(stream_event(serde_json::json!({
                "type": "content_block_start", "index": 0,
                "content_block": {"type": "text", "text": ""}
            })))
            .await
            .unwrap();
        msg_tx
            .send(stream_event(serde_json::json!({
                "type": "content_block_delta", "index": 0,
                "delta": {"type": "text_delta", "text": "Hel"}
            })))
            .await
            .unwrap();
        // The Agent then sends the complete message for the same turn.
        msg_tx.send(assistant("Hello")).await.unwrap();
        msg_tx.send(result("s7")).await.unwrap();

        let mut session = Session::new(&mut msg_rx, &mut err_rx, CancellationToken::new());
        session.wait().await.unwrap();
        assert_eq!(session.message().text(), "Hello");
    }

    #[tokio::test]
    async fn close_is_idempotent_and_terminal() {
        let (msg_tx, mut msg_rx, _err_tx, mut err_rx) = channels();
        msg_tx.send(assistant("x")).await.unwrap();

        let mut session = Session::new(&mut msg_rx, &mut err_rx, CancellationToken::new());
        session.close();
        session.close();
        assert!(!session.next().await);
    }

    #[tokio::test]
    async fn wait_without_result_reports_stream_closed() {
        let (msg_tx, mut msg_rx, _err_tx, mut err_rx) = channels();
        msg_tx.send(assistant("partial")).await.unwrap();
        drop(msg_tx);

        let mut session = Session::new(&mut msg_rx, &mut err_rx, CancellationToken::new());
        let err = session.wait().await.unwrap_err();
        assert!(matches!(err, AgentError::StreamClosed));
    }
}
