//! # voicenav-realtime
//!
//! Session layer for realtime duplex voice: unified events, audio formats
//! and PCM conversion, session configuration, and the transport seams the
//! bridge is tested against.
//!
//! ## Architecture
//!
//! ```text
//!   ┌───────────────────┐      ServerEvent       ┌──────────────────┐
//!   │  voicenav-bridge  │ ◄───────────────────── │   LiveSession    │
//!   │  (state machine)  │ ─────────────────────► │ (wire transport) │
//!   └───────────────────┘  audio / tool results  └──────────────────┘
//! ```
//!
//! [`LiveSession`] and [`LiveModel`] are the seams: the `live` feature
//! provides the hosted-endpoint WebSocket implementation, while tests
//! substitute in-memory fakes. Wire translation lives in [`wire`] and is
//! always compiled, so protocol handling is testable without a socket.
//!
//! ## Example
//!
//! ```rust,ignore
//! use voicenav_realtime::{SessionConfig, ServerEvent, live::LiveApiModel};
//! use voicenav_realtime::model::LiveModel;
//!
//! let model = LiveApiModel::new(api_key, "models/gemini-2.5-flash-native-audio-preview-09-2025");
//! let session = model.connect(SessionConfig::new().with_audio_only()).await?;
//!
//! while let Some(event) = session.next_event().await {
//!     match event? {
//!         ServerEvent::Audio { data } => { /* schedule playback */ }
//!         ServerEvent::ToolCalls { calls } => { /* dispatch + ack */ }
//!         _ => {}
//!     }
//! }
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod session;
pub mod wire;

// Hosted-endpoint transport
#[cfg(feature = "live")]
pub mod live;

// Re-exports
pub use audio::{AudioChunk, AudioFormat, rms};
pub use config::{SessionConfig, ToolDefinition};
pub use error::{RealtimeError, Result};
pub use events::{ServerEvent, ToolInvocation, ToolResult};
pub use model::{BoxedModel, LiveModel};
pub use session::{BoxedSession, LiveSession};
