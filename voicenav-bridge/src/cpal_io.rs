//! cpal-backed desktop audio I/O.
//!
//! cpal streams are not `Send`, so each stream lives on a dedicated thread
//! that parks until told to release it. The playback clock is derived from
//! the number of samples the device callback has consumed, which keeps it
//! monotone with the actual output position rather than wall time.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;

use voicenav_realtime::{AudioFormat, RealtimeError, Result};

use crate::device::{AudioIo, CaptureHandle, FrameSender, PlaybackHandle};

/// Desktop audio I/O using the default host devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalAudioIo;

impl CpalAudioIo {
    /// Create a new desktop audio factory.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AudioIo for CpalAudioIo {
    async fn open_capture(
        &self,
        format: AudioFormat,
        frames: FrameSender,
    ) -> Result<Box<dyn CaptureHandle>> {
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        std::thread::Builder::new()
            .name("voicenav-capture".to_string())
            .spawn(move || {
                let result = build_capture_stream(format, frames);
                match result {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        // Park until released; dropping the stream stops capture.
                        let _ = release_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| RealtimeError::permission(format!("capture thread spawn: {e}")))?;

        ready_rx
            .await
            .map_err(|_| RealtimeError::permission("capture thread exited before opening"))??;

        Ok(Box::new(ThreadedHandle::new(release_tx)))
    }

    async fn open_playback(&self, format: AudioFormat) -> Result<Box<dyn PlaybackHandle>> {
        let shared = Arc::new(PlaybackShared::new(format.sample_rate));

        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let thread_shared = shared.clone();

        std::thread::Builder::new()
            .name("voicenav-playback".to_string())
            .spawn(move || {
                let result = build_playback_stream(format, thread_shared);
                match result {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        let _ = release_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| RealtimeError::connection(format!("playback thread spawn: {e}")))?;

        ready_rx
            .await
            .map_err(|_| RealtimeError::connection("playback thread exited before opening"))??;

        Ok(Box::new(CpalPlayback {
            shared,
            handle: ThreadedHandle::new(release_tx),
        }))
    }
}

fn build_capture_stream(format: AudioFormat, frames: FrameSender) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| RealtimeError::permission("no input device available"))?;

    let config = cpal::StreamConfig {
        channels: format.channels as cpal::ChannelCount,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Unbounded send never blocks the realtime callback; a
                // closed receiver just drops frames until release.
                let _ = frames.send(data.to_vec());
            },
            |e| tracing::warn!(error = %e, "capture stream error"),
            None,
        )
        .map_err(|e| RealtimeError::permission(format!("failed to open input stream: {e}")))?;

    stream
        .play()
        .map_err(|e| RealtimeError::permission(format!("failed to start input stream: {e}")))?;

    Ok(stream)
}

fn build_playback_stream(format: AudioFormat, shared: Arc<PlaybackShared>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| RealtimeError::connection("no output device available"))?;

    let config = cpal::StreamConfig {
        channels: format.channels as cpal::ChannelCount,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                shared.fill(data);
            },
            |e| tracing::warn!(error = %e, "playback stream error"),
            None,
        )
        .map_err(|e| RealtimeError::connection(format!("failed to open output stream: {e}")))?;

    stream
        .play()
        .map_err(|e| RealtimeError::connection(format!("failed to start output stream: {e}")))?;

    Ok(stream)
}

/// Sample queue and clock shared between the device callback and the bridge.
struct PlaybackShared {
    sample_rate: u32,
    /// Samples consumed by the device callback since open.
    consumed: AtomicU64,
    queue: Mutex<VecDeque<f32>>,
}

impl PlaybackShared {
    fn new(sample_rate: u32) -> Self {
        Self { sample_rate, consumed: AtomicU64::new(0), queue: Mutex::new(VecDeque::new()) }
    }

    fn clock(&self) -> f64 {
        self.consumed.load(Ordering::SeqCst) as f64 / self.sample_rate as f64
    }

    /// Queue samples to begin at `start` seconds on the device clock,
    /// padding with silence when the start lies beyond the queued tail.
    fn enqueue_at(&self, samples: &[f32], start: f64) {
        let start_pos = (start * self.sample_rate as f64).round() as u64;
        let mut queue = self.queue.lock();
        let queue_end = self.consumed.load(Ordering::SeqCst) + queue.len() as u64;
        if start_pos > queue_end {
            queue.extend(std::iter::repeat_n(0.0, (start_pos - queue_end) as usize));
        }
        queue.extend(samples.iter().copied());
    }

    /// Device callback: drain the queue, zero-filling any shortfall.
    fn fill(&self, data: &mut [f32]) {
        let mut queue = self.queue.lock();
        for slot in data.iter_mut() {
            *slot = queue.pop_front().unwrap_or(0.0);
        }
        self.consumed.fetch_add(data.len() as u64, Ordering::SeqCst);
    }
}

/// Releases a stream thread exactly once.
struct ThreadedHandle {
    release: Mutex<Option<std::sync::mpsc::Sender<()>>>,
    released: AtomicBool,
}

impl ThreadedHandle {
    fn new(release: std::sync::mpsc::Sender<()>) -> Self {
        Self { release: Mutex::new(Some(release)), released: AtomicBool::new(false) }
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        // Dropping the sender unblocks the stream thread's recv.
        self.release.lock().take();
    }
}

#[async_trait]
impl CaptureHandle for ThreadedHandle {
    async fn stop(&self) {
        self.release();
    }
}

struct CpalPlayback {
    shared: Arc<PlaybackShared>,
    handle: ThreadedHandle,
}

#[async_trait]
impl PlaybackHandle for CpalPlayback {
    fn clock(&self) -> f64 {
        self.shared.clock()
    }

    fn enqueue_at(&self, samples: &[f32], start: f64) {
        self.shared.enqueue_at(samples, start);
    }

    async fn close(&self) {
        self.handle.release();
    }
}
