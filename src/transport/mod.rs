//! Transport layer for communicating with the Agent CLI.
//!
//! The transport owns the child process and its pipes. It moves raw
//! newline-delimited frames in both directions and knows nothing about
//! message semantics; classification and parsing happen in
//! [`crate::control`].

pub mod subprocess;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{AgentError, Result};

/// Abstraction over the communication channel to the Agent.
///
/// Implemented by [`SubprocessTransport`] for production use; tests drive
/// the protocol through scripted in-memory implementations.
#[async_trait]
pub trait Transport: Send {
    /// Start the transport (spawn the child process, begin reading).
    ///
    /// # Errors
    /// Returns `CliNotFound` when the executable cannot be located and a
    /// transport error when spawning fails.
    async fn start(&mut self) -> Result<()>;

    /// Write one outbound frame.
    ///
    /// A trailing newline is appended if absent. Callers serialize their
    /// writes through a single lock so concurrent frames never interleave.
    ///
    /// # Errors
    /// Fails with `StreamClosed` after close.
    async fn write(&mut self, data: &str) -> Result<()>;

    /// Take the inbound frame channel: one newline-terminated line per item,
    /// CR stripped, empty lines skipped.
    ///
    /// There is exactly one reader; returns `None` on a second take.
    fn take_frames(&mut self) -> Option<mpsc::Receiver<String>>;

    /// Take the transport error channel (process exit, read failures).
    ///
    /// There is exactly one reader; returns `None` on a second take.
    fn take_errors(&mut self) -> Option<mpsc::Receiver<AgentError>>;

    /// Whether the transport is started and not yet closed.
    fn is_ready(&self) -> bool;

    /// Close the transport: close stdin to signal EOF, give the child a
    /// short grace period, then force-terminate it. Idempotent.
    ///
    /// # Errors
    /// Returns an error if cleanup fails; repeated calls succeed trivially.
    async fn close(&mut self) -> Result<()>;
}

pub use subprocess::SubprocessTransport;
