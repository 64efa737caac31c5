//! Audio device seams.
//!
//! The bridge acquires capture and playback as capabilities and releases
//! them on teardown; it never talks to hardware directly. Capture frames
//! are pushed through an unbounded channel so the platform's realtime
//! callback never blocks on the consumer.
//!
//! Release methods take `&self` and must be idempotent: teardown can race
//! between a UI stop, a remote close, and the greeting auto-stop timer, so
//! every implementation guards its resources with a released flag rather
//! than assuming a single caller.

use async_trait::async_trait;
use tokio::sync::mpsc;

use voicenav_realtime::{AudioFormat, Result};

/// A frame of captured float samples, mono at the capture rate.
pub type CaptureFrame = Vec<f32>;

/// Sender side of the capture frame channel.
pub type FrameSender = mpsc::UnboundedSender<CaptureFrame>;

/// Receiver side of the capture frame channel.
pub type FrameReceiver = mpsc::UnboundedReceiver<CaptureFrame>;

/// Factory for per-session audio resources.
#[async_trait]
pub trait AudioIo: Send + Sync {
    /// Request the input device and begin delivering frames to `frames`.
    ///
    /// Fails with [`voicenav_realtime::RealtimeError::PermissionDenied`]
    /// when access is declined or no device exists.
    async fn open_capture(
        &self,
        format: AudioFormat,
        frames: FrameSender,
    ) -> Result<Box<dyn CaptureHandle>>;

    /// Open the output device at the playback rate.
    async fn open_playback(&self, format: AudioFormat) -> Result<Box<dyn PlaybackHandle>>;
}

/// An open capture stream.
#[async_trait]
pub trait CaptureHandle: Send + Sync {
    /// Stop delivering frames and release the device. Idempotent.
    async fn stop(&self);
}

/// An open playback stream with a monotone clock.
#[async_trait]
pub trait PlaybackHandle: Send + Sync {
    /// Current output clock reading, seconds since the device opened.
    fn clock(&self) -> f64;

    /// Queue samples (mono f32 at the playback rate) to begin at `start`
    /// seconds on the device clock. Callers guarantee `start` is at or
    /// after the end of everything previously queued.
    fn enqueue_at(&self, samples: &[f32], start: f64);

    /// Stop playback and release the device. Idempotent.
    async fn close(&self);
}
