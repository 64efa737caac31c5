//! Realtime voice navigation bridge.
//!
//! Wires microphone capture and speaker playback to a bidirectional
//! realtime session from [`voicenav_realtime`], turning spoken commands
//! into local tool invocations (navigate, open panel, toggle theme).
//!
//! ```text
//!  microphone ──frames──▶ pump ──PCM16──▶ ┌─────────┐
//!                                         │ session │
//!  speaker ◀──gapless schedule── decode ◀─┘────┬────┘
//!                                              │ tool calls
//!                                        ToolRegistry ──▶ callbacks
//! ```
//!
//! The [`bridge::VoiceBridge`] controller owns at most one session at a
//! time. Sessions start in one of two modes: an auto-initiated greeting
//! that stops itself when it finishes speaking, or an interactive session
//! that runs until stopped. See the module docs for the lifecycle rules.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use voicenav_bridge::{SessionMode, ToolRegistry, VoiceBridge};
//!
//! # async fn run(model: voicenav_realtime::BoxedModel,
//! #              audio: Arc<dyn voicenav_bridge::AudioIo>) -> anyhow::Result<()> {
//! let bridge = VoiceBridge::builder()
//!     .model(model)
//!     .audio_io(audio)
//!     .tools(ToolRegistry::new().on_navigate(|section| println!("go to {section}")))
//!     .build()?;
//!
//! bridge.start(SessionMode::Interactive).await?;
//! // ... later
//! bridge.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod device;
pub mod schedule;
pub mod tools;

#[cfg(feature = "desktop-audio")]
pub mod cpal_io;

pub use bridge::{
    BridgeConfig, BridgeHandler, BridgeState, NoOpHandler, SessionMode, VoiceBridge,
    VoiceBridgeBuilder,
};
pub use device::{AudioIo, CaptureFrame, CaptureHandle, FrameReceiver, FrameSender, PlaybackHandle};
pub use schedule::PlaybackScheduler;
pub use tools::{Section, ToolRegistry, UnknownSection};

#[cfg(feature = "desktop-audio")]
pub use cpal_io::CpalAudioIo;
