//! One-shot query helpers.
//!
//! Convenience functions for callers that do not need a long-lived
//! [`AgentClient`]: each spawns the Agent, runs a single prompt to its
//! result, and closes the connection.

use crate::client::AgentClient;
use crate::error::Result;
use crate::types::{AgentOptions, Message, ResultMessage};

/// Run one prompt and collect every message up to the terminal result.
///
/// ```no_run
/// # async fn example() -> agent_sdk::Result<()> {
/// let messages = agent_sdk::query("What is 2 + 2?", None).await?;
/// for message in &messages {
///     println!("{}", message.message_type());
/// }
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// Fails on connection problems or when the stream terminates with an
/// error.
pub async fn query(prompt: impl AsRef<str>, options: Option<AgentOptions>) -> Result<Vec<Message>> {
    let mut client = AgentClient::new(options.unwrap_or_default());
    client.connect().await?;
    let outcome = async {
        let mut session = client.query(prompt.as_ref()).await?;
        session.collect().await
    }
    .await;
    let _ = client.close().await;
    outcome
}

/// Run one prompt and return only the assistant's text.
///
/// # Errors
/// Fails on connection problems or when the stream terminates with an
/// error.
pub async fn query_text(prompt: impl AsRef<str>, options: Option<AgentOptions>) -> Result<String> {
    let mut client = AgentClient::new(options.unwrap_or_default());
    client.connect().await?;
    let outcome = async {
        let mut session = client.query(prompt.as_ref()).await?;
        session.collect_text().await
    }
    .await;
    let _ = client.close().await;
    outcome
}

/// Run one prompt and return the terminal result with cost and usage
/// statistics.
///
/// # Errors
/// Fails on connection problems or when the stream terminates with an
/// error or without a result.
pub async fn query_result(
    prompt: impl AsRef<str>,
    options: Option<AgentOptions>,
) -> Result<ResultMessage> {
    let mut client = AgentClient::new(options.unwrap_or_default());
    client.connect().await?;
    let outcome = async {
        let mut session = client.query(prompt.as_ref()).await?;
        session.wait().await
    }
    .await;
    let _ = client.close().await;
    outcome
}
