//! Core LiveSession trait definition.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::audio::AudioChunk;
use crate::error::Result;
use crate::events::{ServerEvent, ToolResult};

/// One realtime bidirectional audio session.
///
/// Implementations wrap the vendor transport; the bridge only sees this
/// trait, so tests can substitute an in-memory fake.
///
/// # Example
///
/// ```rust,ignore
/// async fn pump(session: &dyn LiveSession) -> Result<()> {
///     session.send_audio(&chunk).await?;
///     while let Some(event) = session.next_event().await {
///         match event? {
///             ServerEvent::Audio { data } => { /* schedule playback */ }
///             ServerEvent::ToolCalls { calls } => { /* dispatch + ack */ }
///             _ => {}
///         }
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait LiveSession: Send + Sync {
    /// Get the session ID.
    fn session_id(&self) -> &str;

    /// Check if the session is currently connected.
    fn is_connected(&self) -> bool;

    /// Send a captured audio chunk to the remote endpoint.
    async fn send_audio(&self, audio: &AudioChunk) -> Result<()>;

    /// Inject a free-text user turn (used to kick off the auto-greeting).
    async fn send_text(&self, text: &str) -> Result<()>;

    /// Acknowledge a batch of tool invocations.
    async fn send_tool_results(&self, results: Vec<ToolResult>) -> Result<()>;

    /// Get the next event from the remote.
    ///
    /// Returns `None` when the session is closed.
    async fn next_event(&self) -> Option<Result<ServerEvent>>;

    /// Get a stream of server events.
    fn events(&self) -> Pin<Box<dyn Stream<Item = Result<ServerEvent>> + Send + '_>>;

    /// Close the session. Idempotent and best-effort.
    async fn close(&self) -> Result<()>;
}

/// A boxed session type for dynamic dispatch.
pub type BoxedSession = Box<dyn LiveSession>;
