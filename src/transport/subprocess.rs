//! Subprocess transport: spawns the Agent CLI and frames its stdio

use async_trait::async_trait;
use std::env;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::transport::Transport;
use crate::types::{AgentOptions, SystemPrompt};

/// Default per-frame size cap. Large assistant responses can approach this.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 10 * 1024 * 1024;

/// Inbound frame channel capacity; the reader blocks when it fills.
const FRAME_CHANNEL_CAPACITY: usize = 100;

/// Error channel capacity.
const ERROR_CHANNEL_CAPACITY: usize = 10;

/// Grace period between closing stdin and force-terminating the child.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Environment variable overriding CLI discovery.
const CLI_PATH_ENV: &str = "AGENT_CLI_PATH";

/// Transport backed by the Agent CLI subprocess.
///
/// Lifecycle is `Created → Started → Closed`, one direction only. Abnormal
/// child exit closes the transport and surfaces a process error with the
/// exit code and accumulated stderr.
pub struct SubprocessTransport {
    options: AgentOptions,
    stdin: Option<ChildStdin>,
    frame_rx: Option<mpsc::Receiver<String>>,
    error_rx: Option<mpsc::Receiver<AgentError>>,
    ready: Arc<AtomicBool>,
    cancel: CancellationToken,
    reader_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<()>>,
    waiter_task: Option<JoinHandle<()>>,
}

impl SubprocessTransport {
    /// Create an inert transport; no I/O happens until [`Transport::start`].
    #[must_use]
    pub fn new(options: AgentOptions) -> Self {
        Self {
            options,
            stdin: None,
            frame_rx: None,
            error_rx: None,
            ready: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            reader_task: None,
            stderr_task: None,
            waiter_task: None,
        }
    }

    /// Locate the Agent CLI executable.
    fn find_cli(&self) -> Result<PathBuf> {
        if let Ok(path) = env::var(CLI_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.is_file() {
                return Ok(path);
            }
            return Err(AgentError::CliNotFound(format!(
                "{CLI_PATH_ENV} points at {}, which does not exist",
                path.display()
            )));
        }

        if let Some(ref path) = self.options.cli_path {
            if path.is_file() {
                return Ok(path.clone());
            }
            return Err(AgentError::CliNotFound(format!(
                "configured cli_path {} does not exist",
                path.display()
            )));
        }

        if let Ok(path) = which::which("agent") {
            return Ok(path);
        }

        let home = env::var("HOME").unwrap_or_default();
        let fallbacks = [
            PathBuf::from("/usr/local/bin/agent"),
            PathBuf::from("/usr/bin/agent"),
            PathBuf::from(&home).join(".local/bin/agent"),
            PathBuf::from(&home).join(".agent/bin/agent"),
        ];
        for path in fallbacks {
            if path.is_file() {
                return Ok(path);
            }
        }

        Err(AgentError::cli_not_found())
    }

    /// Build the CLI argument list from the options.
    #[allow(clippy::too_many_lines)]
    fn build_args(&self) -> Vec<String> {
        let opts = &self.options;
        let mut args: Vec<String> = vec![
            "--output-format".into(),
            "stream-json".into(),
            "--input-format".into(),
            "stream-json".into(),
            "--verbose".into(),
        ];

        match &opts.system_prompt {
            Some(SystemPrompt::String(s)) => {
                args.push("--system-prompt".into());
                args.push(s.clone());
            }
            Some(SystemPrompt::Preset(preset)) => {
                if let Some(ref append) = preset.append {
                    args.push("--append-system-prompt".into());
                    args.push(append.clone());
                }
            }
            None => {}
        }

        if let Some(ref model) = opts.model {
            args.push("--model".into());
            args.push(model.clone());
        }
        if let Some(ref fallback) = opts.fallback_model {
            args.push("--fallback-model".into());
            args.push(fallback.clone());
        }
        if let Some(max_turns) = opts.max_turns {
            args.push("--max-turns".into());
            args.push(max_turns.to_string());
        }
        if let Some(budget) = opts.max_budget_usd {
            args.push("--max-budget-usd".into());
            args.push(format!("{budget:.2}"));
        }
        if let Some(thinking) = opts.max_thinking_tokens {
            args.push("--max-thinking-tokens".into());
            args.push(thinking.to_string());
        }

        if !opts.allowed_tools.is_empty() {
            args.push("--allowed-tools".into());
            args.push(
                opts.allowed_tools
                    .iter()
                    .map(AsRef::as_ref)
                    .collect::<Vec<&str>>()
                    .join(","),
            );
        }
        if !opts.disallowed_tools.is_empty() {
            args.push("--disallowed-tools".into());
            args.push(
                opts.disallowed_tools
                    .iter()
                    .map(AsRef::as_ref)
                    .collect::<Vec<&str>>()
                    .join(","),
            );
        }

        if let Some(mode) = opts.permission_mode {
            args.push("--permission-mode".into());
            args.push(mode.as_str().into());
        }

        if opts.continue_conversation {
            args.push("--continue".into());
        }
        if let Some(ref session_id) = opts.resume {
            args.push("--resume".into());
            args.push(session_id.as_str().into());
        }
        if opts.fork_session {
            args.push("--fork-session".into());
        }

        if !opts.mcp_servers.is_empty() {
            let config: serde_json::Map<String, serde_json::Value> = opts
                .mcp_servers
                .iter()
                .map(|(name, cfg)| (name.clone(), cfg.to_cli_json()))
                .collect();
            args.push("--mcp-config".into());
            args.push(serde_json::json!({ "mcpServers": config }).to_string());
        }

        if !opts.agents.is_empty() {
            args.push("--agents".into());
            args.push(serde_json::to_string(&opts.agents).unwrap_or_default());
        }

        if opts.include_partial_messages {
            args.push("--include-partial-messages".into());
        }

        if let Some(ref schema) = opts.output_format {
            args.push("--output-format-json".into());
            args.push(schema.to_string());
        }

        for (flag, value) in &opts.extra_args {
            args.push(format!("--{flag}"));
            if let Some(v) = value {
                args.push(v.clone());
            }
        }

        args
    }
}

#[async_trait]
impl Transport for SubprocessTransport {
    async fn start(&mut self) -> Result<()> {
        if self.ready.load(Ordering::SeqCst) {
            return Ok(());
        }

        let cli_path = self.find_cli()?;
        let args = self.build_args();
        tracing::debug!(cli = %cli_path.display(), argc = args.len(), "Starting Agent CLI");

        let mut cmd = Command::new(&cli_path);
        cmd.args(&args)
            .envs(&self.options.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref cwd) = self.options.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| {
            AgentError::transport(format!("failed to start {}: {e}", cli_path.display()))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::transport("failed to open stdin pipe"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::transport("failed to open stdout pipe"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AgentError::transport("failed to open stderr pipe"))?;

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
        let stderr_buf: Arc<StdMutex<String>> = Arc::new(StdMutex::new(String::new()));
        let max_frame_bytes = self
            .options
            .max_frame_bytes
            .unwrap_or(DEFAULT_MAX_FRAME_BYTES);

        // Stdout reader: sole producer of inbound frames. Blocks on a full
        // channel so the child sees backpressure instead of dropped frames.
        let reader_cancel = self.cancel.clone();
        let reader_error_tx = error_tx.clone();
        self.reader_task = Some(tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();
            loop {
                line.clear();
                tokio::select! {
                    () = reader_cancel.cancelled() => break,
                    read = reader.read_line(&mut line) => match read {
                        Ok(0) => break,
                        Ok(_) => {
                            let frame = line.trim_end_matches(['\n', '\r']);
                            if frame.is_empty() {
                                continue;
                            }
                            if frame.len() > max_frame_bytes {
                                tracing::warn!(len = frame.len(), "Dropping oversized frame");
                                let oversized = AgentError::transport(format!(
                                    "frame of {} bytes exceeds cap of {max_frame_bytes}",
                                    frame.len()
                                ));
                                if reader_error_tx.try_send(oversized).is_err() {
                                    tracing::warn!("Error channel full, oversized-frame report dropped");
                                }
                                continue;
                            }
                            // The send blocks under backpressure; stay
                            // responsive to cancellation while it does.
                            tokio::select! {
                                () = reader_cancel.cancelled() => break,
                                sent = frame_tx.send(frame.to_string()) => {
                                    if sent.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            if reader_error_tx.try_send(AgentError::Io(e)).is_err() {
                                tracing::warn!("Error channel full, read error dropped");
                            }
                            break;
                        }
                    }
                }
            }
        }));

        // Stderr reader: forwards lines to the configured callback and
        // accumulates them for inclusion in process errors.
        let stderr_callback = self.options.stderr.clone();
        let stderr_accumulator = stderr_buf.clone();
        self.stderr_task = Some(tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                if let Some(ref callback) = stderr_callback {
                    (callback.as_ref())(&line);
                }
                if let Ok(mut buf) = stderr_accumulator.lock() {
                    buf.push_str(&line);
                    buf.push('\n');
                }
            }
        }));

        // Process waiter: reports abnormal exits, performs the graceful
        // close-then-kill sequence on cancellation.
        let waiter_cancel = self.cancel.clone();
        let waiter_ready = self.ready.clone();
        self.waiter_task = Some(tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    waiter_ready.store(false, Ordering::SeqCst);
                    let exit_error = match status {
                        Ok(status) if !status.success() => {
                            let stderr = stderr_buf.lock().map(|b| b.clone()).unwrap_or_default();
                            Some(AgentError::process(status.code().unwrap_or(-1), stderr))
                        }
                        Ok(_) => None,
                        Err(e) => Some(AgentError::Io(e)),
                    };
                    if let Some(err) = exit_error {
                        tracing::debug!(error = %err, "Agent process exited abnormally");
                        if error_tx.try_send(err).is_err() {
                            tracing::warn!("Error channel full, process exit report dropped");
                        }
                    }
                }
                () = waiter_cancel.cancelled() => {
                    match tokio::time::timeout(CLOSE_GRACE, child.wait()).await {
                        Ok(_) => {}
                        Err(_) => {
                            tracing::debug!("Grace period elapsed, killing Agent process");
                            let _ = child.kill().await;
                        }
                    }
                }
            }
        }));

        self.stdin = Some(stdin);
        self.frame_rx = Some(frame_rx);
        self.error_rx = Some(error_rx);
        self.ready.store(true, Ordering::SeqCst);

        Ok(())
    }

    async fn write(&mut self, data: &str) -> Result<()> {
        if !self.is_ready() {
            return Err(AgentError::StreamClosed);
        }
        let stdin = self.stdin.as_mut().ok_or(AgentError::StreamClosed)?;

        stdin
            .write_all(data.as_bytes())
            .await
            .map_err(|e| AgentError::transport(format!("stdin write failed: {e}")))?;
        if !data.ends_with('\n') {
            stdin
                .write_all(b"\n")
                .await
                .map_err(|e| AgentError::transport(format!("stdin write failed: {e}")))?;
        }
        stdin
            .flush()
            .await
            .map_err(|e| AgentError::transport(format!("stdin flush failed: {e}")))
    }

    fn take_frames(&mut self) -> Option<mpsc::Receiver<String>> {
        self.frame_rx.take()
    }

    fn take_errors(&mut self) -> Option<mpsc::Receiver<AgentError>> {
        self.error_rx.take()
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> Result<()> {
        self.ready.store(false, Ordering::SeqCst);

        // Close stdin first so the child sees EOF and can exit cleanly.
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.shutdown().await;
        }

        self.cancel.cancel();

        if let Some(task) = self.waiter_task.take() {
            let _ = task.await;
        }
        if let Some(task) = self.reader_task.take() {
            let _ = task.await;
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }

        Ok(())
    }
}

impl Drop for SubprocessTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
        for task in [
            self.reader_task.take(),
            self.stderr_task.take(),
            self.waiter_task.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolName;

    fn args_for(options: AgentOptions) -> Vec<String> {
        SubprocessTransport::new(options).build_args()
    }

    #[test]
    fn base_args_always_present() {
        let args = args_for(AgentOptions::default());
        assert_eq!(
            &args[..5],
            &[
                "--output-format",
                "stream-json",
                "--input-format",
                "stream-json",
                "--verbose"
            ]
        );
    }

    #[test]
    fn option_flags_are_rendered() {
        let options = AgentOptions::builder()
            .system_prompt("be brief")
            .model("sonnet")
            .max_turns(3)
            .max_budget_usd(1.5)
            .allowed_tools(vec![ToolName::from("Read"), ToolName::from("Grep")])
            .include_partial_messages(true)
            .resume(crate::types::SessionId::from("s42"))
            .build();
        let args = args_for(options);

        let find = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .map(|i| args.get(i + 1).cloned())
        };
        assert_eq!(find("--system-prompt").flatten().as_deref(), Some("be brief"));
        assert_eq!(find("--model").flatten().as_deref(), Some("sonnet"));
        assert_eq!(find("--max-turns").flatten().as_deref(), Some("3"));
        assert_eq!(find("--max-budget-usd").flatten().as_deref(), Some("1.50"));
        assert_eq!(find("--allowed-tools").flatten().as_deref(), Some("Read,Grep"));
        assert_eq!(find("--resume").flatten().as_deref(), Some("s42"));
        assert!(args.iter().any(|a| a == "--include-partial-messages"));
    }

    #[test]
    fn extra_args_appended() {
        let mut extra = std::collections::HashMap::new();
        extra.insert("log-level".to_string(), Some("debug".to_string()));
        extra.insert("no-cache".to_string(), None);
        let args = args_for(AgentOptions::builder().extra_args(extra).build());
        assert!(args.iter().any(|a| a == "--no-cache"));
        let i = args.iter().position(|a| a == "--log-level").unwrap();
        assert_eq!(args[i + 1], "debug");
    }

    #[test]
    fn missing_cli_is_reported() {
        let options = AgentOptions::builder()
            .cli_path("/nonexistent/path/to/agent")
            .build();
        let transport = SubprocessTransport::new(options);
        let err = transport.find_cli().unwrap_err();
        assert!(matches!(err, AgentError::CliNotFound(_)));
    }

    #[tokio::test]
    async fn write_before_start_fails() {
        let mut transport = SubprocessTransport::new(AgentOptions::default());
        let err = transport.write("{}").await.unwrap_err();
        assert!(matches!(err, AgentError::StreamClosed));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mut transport = SubprocessTransport::new(AgentOptions::default());
        assert!(transport.close().await.is_ok());
        assert!(transport.close().await.is_ok());
    }
}
