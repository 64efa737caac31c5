//! The realtime audio bridge.
//!
//! [`VoiceBridge`] owns the single active session: microphone capture →
//! PCM16 encode → transmit, receive → decode → gapless playback, plus
//! tool-call relay and acknowledgment. `start` and `stop` are single-flight
//! over an async mutex, and every teardown path is idempotent, so a UI
//! click, a remote close, and the greeting auto-stop timer can race without
//! double-releasing anything.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use voicenav_realtime::{
    AudioChunk, AudioFormat, BoxedModel, BoxedSession, RealtimeError, Result, ServerEvent,
    SessionConfig, rms,
};

use crate::device::{AudioIo, CaptureHandle, FrameReceiver, PlaybackHandle};
use crate::schedule::PlaybackScheduler;
use crate::tools::ToolRegistry;

/// How a session was initiated. Affects only the system prompt and error
/// surfacing, never the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Auto-initiated greeting; errors are suppressed to debug logs and
    /// the session stops itself once the greeting finishes playing.
    Greeting,
    /// User-initiated session; errors surface with retry semantics.
    Interactive,
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// No session.
    Idle,
    /// Acquiring devices and opening the remote connection.
    Connecting,
    /// Capture flowing, waiting on the remote.
    Listening,
    /// Synthesized speech is being scheduled for playback.
    Speaking,
    /// A tool-call batch is being dispatched.
    Processing,
    /// Teardown in progress (transient; always routes back to `Idle`).
    Closed,
}

/// Observer for user-visible bridge activity.
///
/// All methods are optional and must not block; they are called from the
/// bridge's async tasks.
pub trait BridgeHandler: Send + Sync {
    /// Lifecycle state changed.
    fn on_state(&self, _state: BridgeState) {}

    /// RMS amplitude of the latest capture frame (visualization).
    fn on_volume(&self, _rms: f32) {}

    /// A retry-capable error: `PermissionDenied` or `ConnectionFailed`.
    /// Never called for suppressed greeting-mode failures.
    fn on_error(&self, _error: &RealtimeError) {}
}

/// Default no-op handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpHandler;

impl BridgeHandler for NoOpHandler {}

/// Static configuration for bridge sessions.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// System prompt for user-initiated sessions.
    pub interactive_instruction: String,
    /// System prompt for the auto-greeting.
    pub greeting_instruction: String,
    /// Injected user turn that kicks off the greeting.
    pub greeting_kickoff: String,
    /// Voice for synthesized output.
    pub voice: Option<String>,
    /// Microphone capture format.
    pub capture_format: AudioFormat,
    /// Synthesized playback format.
    pub playback_format: AudioFormat,
    /// Trailing buffer after the last scheduled sample before a greeting
    /// session stops itself, so the tail of speech is not clipped.
    pub tail: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            interactive_instruction: "You are the voice controller for a personal portfolio \
                site. Listen for navigation commands like 'show me the work' or 'go to about'. \
                When one is identified, call the navigate tool. Keep spoken responses extremely \
                brief (e.g. 'Navigating.', 'Here it is.')."
                .to_string(),
            greeting_instruction: "You are the voice of a personal portfolio site. Greet the \
                visitor in one short sentence and mention that voice navigation is available. \
                Do not ask questions."
                .to_string(),
            greeting_kickoff: "Greet the visitor.".to_string(),
            voice: None,
            capture_format: AudioFormat::pcm16_16khz(),
            playback_format: AudioFormat::pcm16_24khz(),
            tail: Duration::from_millis(1200),
        }
    }
}

impl BridgeConfig {
    /// Set the interactive system prompt.
    pub fn with_interactive_instruction(mut self, text: impl Into<String>) -> Self {
        self.interactive_instruction = text.into();
        self
    }

    /// Set the greeting system prompt.
    pub fn with_greeting_instruction(mut self, text: impl Into<String>) -> Self {
        self.greeting_instruction = text.into();
        self
    }

    /// Set the greeting kickoff text.
    pub fn with_greeting_kickoff(mut self, text: impl Into<String>) -> Self {
        self.greeting_kickoff = text.into();
        self
    }

    /// Set the output voice.
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    /// Set the trailing buffer before greeting auto-stop.
    pub fn with_tail(mut self, tail: Duration) -> Self {
        self.tail = tail;
        self
    }
}

/// Builder for [`VoiceBridge`].
#[derive(Default)]
pub struct VoiceBridgeBuilder {
    model: Option<BoxedModel>,
    audio_io: Option<Arc<dyn AudioIo>>,
    tools: ToolRegistry,
    handler: Option<Arc<dyn BridgeHandler>>,
    config: BridgeConfig,
}

impl VoiceBridgeBuilder {
    /// Set the session factory.
    pub fn model(mut self, model: BoxedModel) -> Self {
        self.model = Some(model);
        self
    }

    /// Set the audio device factory.
    pub fn audio_io(mut self, audio_io: Arc<dyn AudioIo>) -> Self {
        self.audio_io = Some(audio_io);
        self
    }

    /// Set the tool registry.
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Set the activity handler.
    pub fn handler(mut self, handler: impl BridgeHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Set the bridge configuration.
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the bridge.
    pub fn build(self) -> Result<VoiceBridge> {
        let model = self.model.ok_or_else(|| RealtimeError::config("model is required"))?;
        let audio_io =
            self.audio_io.ok_or_else(|| RealtimeError::config("audio_io is required"))?;
        Ok(VoiceBridge {
            inner: Arc::new(Inner {
                model,
                audio_io,
                tools: Arc::new(self.tools),
                handler: self.handler.unwrap_or_else(|| Arc::new(NoOpHandler)),
                config: self.config,
                active: Mutex::new(None),
                state: parking_lot::Mutex::new(BridgeState::Idle),
                generation: AtomicU64::new(0),
            }),
        })
    }
}

/// Controller for the single active realtime session.
///
/// Cheap to clone; all clones share the same session slot. Independent
/// bridges (for tests) own independent slots.
#[derive(Clone)]
pub struct VoiceBridge {
    inner: Arc<Inner>,
}

struct Inner {
    model: BoxedModel,
    audio_io: Arc<dyn AudioIo>,
    tools: Arc<ToolRegistry>,
    handler: Arc<dyn BridgeHandler>,
    config: BridgeConfig,
    /// The single active session. The async mutex makes start/stop
    /// single-flight: a new start fully awaits the previous teardown.
    active: Mutex<Option<Active>>,
    state: parking_lot::Mutex<BridgeState>,
    generation: AtomicU64,
}

struct Active {
    generation: u64,
    mode: SessionMode,
    escalated: Arc<AtomicBool>,
    session: Arc<BoxedSession>,
    capture: Arc<dyn CaptureHandle>,
    playback: Arc<dyn PlaybackHandle>,
    scheduler: Arc<parking_lot::Mutex<PlaybackScheduler>>,
    pump_task: JoinHandle<()>,
    event_task: JoinHandle<()>,
}

impl VoiceBridge {
    /// Create a new builder.
    pub fn builder() -> VoiceBridgeBuilder {
        VoiceBridgeBuilder::default()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BridgeState {
        *self.inner.state.lock()
    }

    /// Whether a session is currently active.
    pub async fn is_active(&self) -> bool {
        self.inner.active.lock().await.is_some()
    }

    /// Start a session, tearing down any existing one first.
    ///
    /// Interactive failures return the error after notifying the handler;
    /// greeting failures are demoted to debug logs and return `Ok(())`,
    /// since the user never asked for the session.
    pub async fn start(&self, mode: SessionMode) -> Result<()> {
        let mut slot = self.inner.active.lock().await;
        if let Some(previous) = slot.take() {
            self.teardown(previous).await;
        }
        self.set_state(BridgeState::Connecting);

        match self.open_session(mode).await {
            Ok(active) => {
                *slot = Some(active);
                Ok(())
            }
            Err(e) => {
                self.set_state(BridgeState::Idle);
                match mode {
                    SessionMode::Interactive => {
                        self.inner.handler.on_error(&e);
                        Err(e)
                    }
                    SessionMode::Greeting => {
                        tracing::debug!(error = %e, "auto-greeting failed; suppressed");
                        Ok(())
                    }
                }
            }
        }
    }

    /// Stop the active session. Idempotent and infallible; safe to call
    /// from any number of racing call sites.
    ///
    /// The session slot stays locked until teardown finishes, so a racing
    /// `start` cannot open a new capture stream while the previous
    /// microphone release is still in flight.
    pub async fn stop(&self) {
        let mut slot = self.inner.active.lock().await;
        if let Some(active) = slot.take() {
            self.teardown(active).await;
        }
        self.set_state(BridgeState::Idle);
    }

    /// Escalate a greeting session to interactive use, disarming the
    /// auto-stop timer and error suppression. No-op without a session.
    pub async fn escalate(&self) {
        let slot = self.inner.active.lock().await;
        if let Some(active) = &*slot {
            if active.mode == SessionMode::Greeting {
                active.escalated.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Stop only if `generation` is still the active session. Used by the
    /// auto-stop timer and the event loop so a stale callback can never
    /// tear down a successor session.
    async fn stop_generation(&self, generation: u64) {
        let mut slot = self.inner.active.lock().await;
        let taken = match &*slot {
            Some(active) if active.generation == generation => slot.take(),
            _ => None,
        };
        if let Some(active) = taken {
            self.teardown(active).await;
            self.set_state(BridgeState::Idle);
        }
    }

    async fn open_session(&self, mode: SessionMode) -> Result<Active> {
        let config = &self.inner.config;

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let capture: Arc<dyn CaptureHandle> =
            Arc::from(self.inner.audio_io.open_capture(config.capture_format, frame_tx).await?);

        let playback: Arc<dyn PlaybackHandle> =
            match self.inner.audio_io.open_playback(config.playback_format).await {
                Ok(playback) => Arc::from(playback),
                Err(e) => {
                    capture.stop().await;
                    return Err(e);
                }
            };

        let instruction = match mode {
            SessionMode::Greeting => config.greeting_instruction.clone(),
            SessionMode::Interactive => config.interactive_instruction.clone(),
        };
        let mut session_config = SessionConfig::new()
            .with_instruction(instruction)
            .with_audio_only()
            .with_tools(self.inner.tools.definitions());
        if let Some(voice) = &config.voice {
            session_config = session_config.with_voice(voice.clone());
        }

        let session: Arc<BoxedSession> = match self.inner.model.connect(session_config).await {
            Ok(session) => Arc::new(session),
            Err(e) => {
                capture.stop().await;
                playback.close().await;
                return Err(e);
            }
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let escalated = Arc::new(AtomicBool::new(false));
        let scheduler = Arc::new(parking_lot::Mutex::new(PlaybackScheduler::new()));

        if mode == SessionMode::Greeting {
            if let Err(e) = session.send_text(&config.greeting_kickoff).await {
                tracing::debug!(error = %e, "greeting kickoff failed");
            }
        }

        let pump_task = tokio::spawn(Self::run_input_pump(
            frame_rx,
            session.clone(),
            self.inner.handler.clone(),
            config.capture_format,
        ));

        let event_task = tokio::spawn(self.clone().run_event_loop(EventLoopContext {
            generation,
            mode,
            escalated: escalated.clone(),
            session: session.clone(),
            playback: playback.clone(),
            scheduler: scheduler.clone(),
        }));

        Ok(Active {
            generation,
            mode,
            escalated,
            session,
            capture,
            playback,
            scheduler,
            pump_task,
            event_task,
        })
    }

    /// Per captured frame: volume metric, f32 → PCM16, transmit.
    ///
    /// The frame channel already decouples this from the platform's
    /// realtime capture callback; transmission failures are logged and
    /// never stop the pump.
    async fn run_input_pump(
        mut frames: FrameReceiver,
        session: Arc<BoxedSession>,
        handler: Arc<dyn BridgeHandler>,
        capture_format: AudioFormat,
    ) {
        while let Some(frame) = frames.recv().await {
            handler.on_volume(rms(&frame));
            let chunk = AudioChunk::from_f32_samples(&frame, capture_format);
            if let Err(e) = session.send_audio(&chunk).await {
                tracing::warn!(error = %e, "failed to transmit capture frame");
            }
        }
    }

    async fn run_event_loop(self, ctx: EventLoopContext) {
        loop {
            match ctx.session.next_event().await {
                Some(Ok(event)) => self.handle_server_event(&ctx, event).await,
                Some(Err(e)) => {
                    if ctx.mode == SessionMode::Interactive
                        || ctx.escalated.load(Ordering::SeqCst)
                    {
                        self.inner.handler.on_error(&e);
                    } else {
                        tracing::debug!(error = %e, "greeting session error; suppressed");
                    }
                    break;
                }
                None => {
                    tracing::debug!("remote closed the session");
                    break;
                }
            }
        }

        // Detached so teardown's abort of this task cannot interrupt the
        // teardown itself.
        let bridge = self.clone();
        let generation = ctx.generation;
        tokio::spawn(async move { bridge.stop_generation(generation).await });
    }

    async fn handle_server_event(&self, ctx: &EventLoopContext, event: ServerEvent) {
        match event {
            ServerEvent::SessionReady => {
                self.set_state(BridgeState::Listening);
            }
            ServerEvent::Audio { data } => {
                self.set_state(BridgeState::Speaking);
                self.schedule_playback(ctx, data);
            }
            ServerEvent::ToolCalls { calls } => {
                self.set_state(BridgeState::Processing);
                let results = calls.iter().map(|call| self.inner.tools.dispatch(call)).collect();
                // Acknowledge before the next inbound message is processed.
                if let Err(e) = ctx.session.send_tool_results(results).await {
                    tracing::warn!(error = %e, "failed to send tool acknowledgments");
                }
                self.set_state(BridgeState::Listening);
            }
            ServerEvent::TurnComplete => {
                self.set_state(BridgeState::Listening);
                if ctx.mode == SessionMode::Greeting && !ctx.escalated.load(Ordering::SeqCst) {
                    self.arm_auto_stop(ctx);
                }
            }
            ServerEvent::Unknown => {
                tracing::trace!("ignoring unknown server event");
            }
        }
    }

    fn schedule_playback(&self, ctx: &EventLoopContext, data: Vec<u8>) {
        let chunk = AudioChunk::new(data, self.inner.config.playback_format);
        let samples = match chunk.to_f32_samples() {
            Ok(samples) => samples,
            Err(e) => {
                // Malformed chunk: skip it, the session continues.
                tracing::warn!(error = %e, "dropping undecodable playback chunk");
                return;
            }
        };
        let duration = chunk.duration_secs();
        let start = ctx.scheduler.lock().schedule(ctx.playback.clock(), duration);
        ctx.playback.enqueue_at(&samples, start);
    }

    /// Greeting mode: once the remote's turn is complete, stop after the
    /// remaining scheduled playback plus the trailing buffer, unless the
    /// session is escalated or superseded in the meantime.
    fn arm_auto_stop(&self, ctx: &EventLoopContext) {
        let remaining = ctx.scheduler.lock().remaining(ctx.playback.clock());
        let delay = Duration::from_secs_f64(remaining) + self.inner.config.tail;

        let bridge = self.clone();
        let escalated = ctx.escalated.clone();
        let generation = ctx.generation;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !escalated.load(Ordering::SeqCst) {
                bridge.stop_generation(generation).await;
            }
        });
    }

    /// Release every session resource, best-effort. Each handle guards its
    /// own released flag, so repeated or racing teardowns are safe.
    async fn teardown(&self, active: Active) {
        self.set_state(BridgeState::Closed);

        // Stop pumping before releasing devices; pending tool-call state
        // dies with the event task.
        active.pump_task.abort();
        active.event_task.abort();

        active.capture.stop().await;
        active.playback.close().await;
        active.scheduler.lock().reset();

        if let Err(e) = active.session.close().await {
            tracing::debug!(error = %e, "session close failed during teardown");
        }
    }

    fn set_state(&self, state: BridgeState) {
        let changed = {
            let mut current = self.inner.state.lock();
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        };
        if changed {
            self.inner.handler.on_state(state);
        }
    }
}

impl std::fmt::Debug for VoiceBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceBridge").field("state", &self.state()).finish_non_exhaustive()
    }
}

/// Everything the event loop needs, cloned out of the active session so
/// teardown can drop the session slot independently.
struct EventLoopContext {
    generation: u64,
    mode: SessionMode,
    escalated: Arc<AtomicBool>,
    session: Arc<BoxedSession>,
    playback: Arc<dyn PlaybackHandle>,
    scheduler: Arc<parking_lot::Mutex<PlaybackScheduler>>,
}
