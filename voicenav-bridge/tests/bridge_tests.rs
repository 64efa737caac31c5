//! End-to-end bridge lifecycle tests against in-memory fakes.
//!
//! Time-dependent tests run on a paused clock so the greeting auto-stop
//! timer can be checked exactly, without real sleeps.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use voicenav_bridge::{
    AudioIo, BridgeConfig, BridgeHandler, BridgeState, CaptureHandle, FrameSender, PlaybackHandle,
    Section, SessionMode, ToolRegistry, VoiceBridge,
};
use voicenav_realtime::{
    AudioChunk, AudioFormat, BoxedSession, LiveModel, LiveSession, RealtimeError, Result,
    ServerEvent, SessionConfig, ToolInvocation, ToolResult,
};

/// Shared ordering log so tests can assert what happened before what.
type Log = Arc<Mutex<Vec<String>>>;

// ---------------------------------------------------------------------------
// Fake session / model

struct SessionState {
    config: SessionConfig,
    events_tx: Mutex<Option<mpsc::UnboundedSender<Result<ServerEvent>>>>,
    sent_audio: Mutex<Vec<AudioChunk>>,
    sent_texts: Mutex<Vec<String>>,
    sent_tool_results: Mutex<Vec<Vec<ToolResult>>>,
    close_count: AtomicUsize,
    log: Log,
}

impl SessionState {
    fn emit(&self, event: ServerEvent) {
        if let Some(tx) = &*self.events_tx.lock() {
            let _ = tx.send(Ok(event));
        }
    }

    fn emit_error(&self, error: RealtimeError) {
        if let Some(tx) = &*self.events_tx.lock() {
            let _ = tx.send(Err(error));
        }
    }

    /// Drop the event sender, which the bridge observes as a remote close.
    fn remote_close(&self) {
        self.events_tx.lock().take();
    }
}

struct FakeSession {
    state: Arc<SessionState>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<ServerEvent>>>,
    connected: AtomicBool,
}

#[async_trait]
impl LiveSession for FakeSession {
    fn session_id(&self) -> &str {
        "fake-session"
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_audio(&self, audio: &AudioChunk) -> Result<()> {
        self.state.sent_audio.lock().push(audio.clone());
        Ok(())
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.state.sent_texts.lock().push(text.to_string());
        Ok(())
    }

    async fn send_tool_results(&self, results: Vec<ToolResult>) -> Result<()> {
        for result in &results {
            self.state.log.lock().push(format!("ack:{}", result.id));
        }
        self.state.sent_tool_results.lock().push(results);
        Ok(())
    }

    async fn next_event(&self) -> Option<Result<ServerEvent>> {
        self.events_rx.lock().await.recv().await
    }

    fn events(&self) -> Pin<Box<dyn Stream<Item = Result<ServerEvent>> + Send + '_>> {
        Box::pin(futures::stream::unfold(self, |session| async move {
            session.next_event().await.map(|event| (event, session))
        }))
    }

    async fn close(&self) -> Result<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.state.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct FakeModel {
    sessions: Mutex<Vec<Arc<SessionState>>>,
    fail_connect: AtomicBool,
    log: Mutex<Option<Log>>,
}

impl FakeModel {
    fn with_log(log: Log) -> Self {
        Self { log: Mutex::new(Some(log)), ..Self::default() }
    }

    fn session(&self, index: usize) -> Arc<SessionState> {
        self.sessions.lock()[index].clone()
    }
}

#[async_trait]
impl LiveModel for FakeModel {
    fn provider(&self) -> &str {
        "fake"
    }

    fn model_id(&self) -> &str {
        "fake-model"
    }

    async fn connect(&self, config: SessionConfig) -> Result<BoxedSession> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(RealtimeError::connection("endpoint unreachable"));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let log = self.log.lock().clone().unwrap_or_default();
        let state = Arc::new(SessionState {
            config,
            events_tx: Mutex::new(Some(tx)),
            sent_audio: Mutex::new(Vec::new()),
            sent_texts: Mutex::new(Vec::new()),
            sent_tool_results: Mutex::new(Vec::new()),
            close_count: AtomicUsize::new(0),
            log,
        });
        self.sessions.lock().push(state.clone());
        Ok(Box::new(FakeSession {
            state,
            events_rx: tokio::sync::Mutex::new(rx),
            connected: AtomicBool::new(true),
        }))
    }
}

// ---------------------------------------------------------------------------
// Fake audio devices

/// Concurrently-open capture streams, and the high-water mark. The
/// microphone is exclusive, so the mark must never pass one.
#[derive(Default)]
struct IoCounters {
    open: AtomicUsize,
    max_open: AtomicUsize,
}

struct CaptureState {
    frames: Mutex<Option<FrameSender>>,
    stop_count: AtomicUsize,
    slow_release: bool,
    counters: Arc<IoCounters>,
}

struct FakeCapture {
    state: Arc<CaptureState>,
}

#[async_trait]
impl CaptureHandle for FakeCapture {
    async fn stop(&self) {
        if self.state.frames.lock().take().is_some() {
            if self.state.slow_release {
                // Real device release is not instantaneous.
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.state.counters.open.fetch_sub(1, Ordering::SeqCst);
            self.state.stop_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct PlaybackState {
    clock: Mutex<f64>,
    enqueued: Mutex<Vec<(f64, usize)>>,
    close_count: AtomicUsize,
    log: Log,
}

struct FakePlayback {
    state: Arc<PlaybackState>,
    closed: AtomicBool,
}

#[async_trait]
impl PlaybackHandle for FakePlayback {
    fn clock(&self) -> f64 {
        *self.state.clock.lock()
    }

    fn enqueue_at(&self, samples: &[f32], start: f64) {
        self.state.log.lock().push("play".to_string());
        self.state.enqueued.lock().push((start, samples.len()));
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.close_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[derive(Default)]
struct FakeAudioIo {
    deny_capture: bool,
    slow_release: bool,
    counters: Arc<IoCounters>,
    captures: Mutex<Vec<Arc<CaptureState>>>,
    playbacks: Mutex<Vec<Arc<PlaybackState>>>,
    log: Mutex<Option<Log>>,
}

impl FakeAudioIo {
    fn denying() -> Self {
        Self { deny_capture: true, ..Self::default() }
    }

    fn slow_release() -> Self {
        Self { slow_release: true, ..Self::default() }
    }

    fn with_log(log: Log) -> Self {
        Self { log: Mutex::new(Some(log)), ..Self::default() }
    }

    fn capture(&self, index: usize) -> Arc<CaptureState> {
        self.captures.lock()[index].clone()
    }

    fn playback(&self, index: usize) -> Arc<PlaybackState> {
        self.playbacks.lock()[index].clone()
    }
}

#[async_trait]
impl AudioIo for FakeAudioIo {
    async fn open_capture(
        &self,
        _format: AudioFormat,
        frames: FrameSender,
    ) -> Result<Box<dyn CaptureHandle>> {
        if self.deny_capture {
            return Err(RealtimeError::permission("microphone access declined"));
        }
        let open = self.counters.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_open.fetch_max(open, Ordering::SeqCst);
        let state = Arc::new(CaptureState {
            frames: Mutex::new(Some(frames)),
            stop_count: AtomicUsize::new(0),
            slow_release: self.slow_release,
            counters: self.counters.clone(),
        });
        self.captures.lock().push(state.clone());
        Ok(Box::new(FakeCapture { state }))
    }

    async fn open_playback(&self, _format: AudioFormat) -> Result<Box<dyn PlaybackHandle>> {
        let log = self.log.lock().clone().unwrap_or_default();
        let state = Arc::new(PlaybackState {
            clock: Mutex::new(0.0),
            enqueued: Mutex::new(Vec::new()),
            close_count: AtomicUsize::new(0),
            log,
        });
        self.playbacks.lock().push(state.clone());
        Ok(Box::new(FakePlayback { state, closed: AtomicBool::new(false) }))
    }
}

// ---------------------------------------------------------------------------
// Recording handler

#[derive(Default)]
struct RecordingHandler {
    states: Mutex<Vec<BridgeState>>,
    errors: Mutex<Vec<String>>,
    volumes: Mutex<Vec<f32>>,
}

/// Newtype so the recorder can be shared with the bridge and still
/// inspected by the test afterwards.
struct SharedHandler(Arc<RecordingHandler>);

impl BridgeHandler for SharedHandler {
    fn on_state(&self, state: BridgeState) {
        self.0.states.lock().push(state);
    }

    fn on_volume(&self, rms: f32) {
        self.0.volumes.lock().push(rms);
    }

    fn on_error(&self, error: &RealtimeError) {
        self.0.errors.lock().push(error.to_string());
    }
}

// ---------------------------------------------------------------------------
// Harness

struct Harness {
    bridge: VoiceBridge,
    model: Arc<FakeModel>,
    audio: Arc<FakeAudioIo>,
    handler: Arc<RecordingHandler>,
    log: Log,
}

fn harness_with(tools: ToolRegistry, audio: FakeAudioIo, log: Log) -> Harness {
    let model = Arc::new(FakeModel::with_log(log.clone()));
    let audio = Arc::new(audio);
    let handler = Arc::new(RecordingHandler::default());
    let bridge = VoiceBridge::builder()
        .model(model.clone())
        .audio_io(audio.clone())
        .tools(tools)
        .handler(SharedHandler(handler.clone()))
        .build()
        .unwrap();
    Harness { bridge, model, audio, handler, log }
}

fn harness() -> Harness {
    let log = Log::default();
    harness_with(ToolRegistry::new(), FakeAudioIo::with_log(log.clone()), log)
}

/// Let spawned bridge tasks drain their ready work (paused-clock runtimes
/// advance instantly).
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn pcm16_silence(seconds: f64, format: AudioFormat) -> Vec<u8> {
    vec![0u8; (seconds * format.bytes_per_second() as f64) as usize]
}

// ---------------------------------------------------------------------------
// Lifecycle

#[tokio::test(start_paused = true)]
async fn stop_without_session_is_a_noop() {
    let h = harness();
    h.bridge.stop().await;
    h.bridge.stop().await;

    assert_eq!(h.bridge.state(), BridgeState::Idle);
    assert!(h.model.sessions.lock().is_empty());
    assert!(h.handler.errors.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn double_stop_releases_resources_once() {
    let h = harness();
    h.bridge.start(SessionMode::Interactive).await.unwrap();
    h.model.session(0).emit(ServerEvent::SessionReady);
    settle().await;

    h.bridge.stop().await;
    h.bridge.stop().await;

    assert_eq!(h.audio.capture(0).stop_count.load(Ordering::SeqCst), 1);
    assert_eq!(h.audio.playback(0).close_count.load(Ordering::SeqCst), 1);
    assert_eq!(h.model.session(0).close_count.load(Ordering::SeqCst), 1);
    assert_eq!(h.bridge.state(), BridgeState::Idle);
}

#[tokio::test(start_paused = true)]
async fn racing_stops_release_resources_once() {
    let h = harness();
    h.bridge.start(SessionMode::Interactive).await.unwrap();
    h.model.session(0).emit(ServerEvent::SessionReady);
    settle().await;

    // A UI click racing an error callback: both stop concurrently.
    futures::join!(h.bridge.stop(), h.bridge.stop());

    assert_eq!(h.audio.capture(0).stop_count.load(Ordering::SeqCst), 1);
    assert_eq!(h.audio.playback(0).close_count.load(Ordering::SeqCst), 1);
    assert_eq!(h.model.session(0).close_count.load(Ordering::SeqCst), 1);
    assert_eq!(h.bridge.state(), BridgeState::Idle);
}

#[tokio::test(start_paused = true)]
async fn restart_waits_for_the_previous_microphone_release() {
    let log = Log::default();
    let h = harness_with(ToolRegistry::new(), FakeAudioIo::slow_release(), log);
    h.bridge.start(SessionMode::Interactive).await.unwrap();

    // Stop racing a restart while the old capture release is in flight:
    // the new session must not open the microphone until it is free.
    let (_, restarted) =
        futures::join!(h.bridge.stop(), h.bridge.start(SessionMode::Interactive));
    restarted.unwrap();

    assert_eq!(h.audio.counters.max_open.load(Ordering::SeqCst), 1);
    assert_eq!(h.model.session(0).close_count.load(Ordering::SeqCst), 1);
    assert!(h.bridge.is_active().await);
}

#[tokio::test(start_paused = true)]
async fn starting_over_an_active_session_replaces_it() {
    let h = harness();
    h.bridge.start(SessionMode::Interactive).await.unwrap();
    h.bridge.start(SessionMode::Interactive).await.unwrap();
    settle().await;

    assert_eq!(h.model.sessions.lock().len(), 2);
    assert_eq!(h.model.session(0).close_count.load(Ordering::SeqCst), 1);
    assert_eq!(h.model.session(1).close_count.load(Ordering::SeqCst), 0);
    assert!(h.bridge.is_active().await);

    // First session's devices are released; second's are live.
    assert_eq!(h.audio.capture(0).stop_count.load(Ordering::SeqCst), 1);
    assert_eq!(h.audio.capture(1).stop_count.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn remote_close_returns_the_bridge_to_idle() {
    let h = harness();
    h.bridge.start(SessionMode::Interactive).await.unwrap();
    h.model.session(0).emit(ServerEvent::SessionReady);
    settle().await;

    h.model.session(0).remote_close();
    settle().await;

    assert!(!h.bridge.is_active().await);
    assert_eq!(h.bridge.state(), BridgeState::Idle);
    assert_eq!(h.audio.capture(0).stop_count.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Start failures

#[tokio::test(start_paused = true)]
async fn interactive_permission_denial_surfaces_the_error() {
    let log = Log::default();
    let h = harness_with(ToolRegistry::new(), FakeAudioIo::denying(), log);

    let err = h.bridge.start(SessionMode::Interactive).await.unwrap_err();
    assert!(matches!(err, RealtimeError::PermissionDenied(_)));
    assert_eq!(h.bridge.state(), BridgeState::Idle);
    assert_eq!(h.handler.errors.lock().len(), 1);
    assert!(h.model.sessions.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn greeting_permission_denial_is_suppressed() {
    let log = Log::default();
    let h = harness_with(ToolRegistry::new(), FakeAudioIo::denying(), log);

    h.bridge.start(SessionMode::Greeting).await.unwrap();
    assert_eq!(h.bridge.state(), BridgeState::Idle);
    assert!(h.handler.errors.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn connect_failure_rolls_back_both_devices() {
    let h = harness();
    h.model.fail_connect.store(true, Ordering::SeqCst);

    let err = h.bridge.start(SessionMode::Interactive).await.unwrap_err();
    assert!(matches!(err, RealtimeError::ConnectionFailed(_)));
    assert_eq!(h.audio.capture(0).stop_count.load(Ordering::SeqCst), 1);
    assert_eq!(h.audio.playback(0).close_count.load(Ordering::SeqCst), 1);
    assert_eq!(h.bridge.state(), BridgeState::Idle);
}

// ---------------------------------------------------------------------------
// Capture path

#[tokio::test(start_paused = true)]
async fn capture_frames_are_encoded_and_transmitted() {
    let h = harness();
    h.bridge.start(SessionMode::Interactive).await.unwrap();

    let sender = h.audio.capture(0).frames.lock().clone().unwrap();
    sender.send(vec![0.5f32; 160]).unwrap();
    settle().await;

    let sent = h.model.session(0).sent_audio.lock().clone();
    assert_eq!(sent.len(), 1);
    // 160 samples → 320 bytes of PCM16 at the capture rate.
    assert_eq!(sent[0].data.len(), 320);
    assert_eq!(sent[0].format, AudioFormat::pcm16_16khz());

    let volumes = h.handler.volumes.lock().clone();
    assert_eq!(volumes.len(), 1);
    assert!((volumes[0] - 0.5).abs() < 1e-6);
}

// ---------------------------------------------------------------------------
// Playback path

#[tokio::test(start_paused = true)]
async fn playback_chunks_are_scheduled_back_to_back() {
    let h = harness();
    h.bridge.start(SessionMode::Interactive).await.unwrap();

    let format = AudioFormat::pcm16_24khz();
    let session = h.model.session(0);
    session.emit(ServerEvent::Audio { data: pcm16_silence(2.0, format) });
    session.emit(ServerEvent::Audio { data: pcm16_silence(1.5, format) });
    settle().await;

    let enqueued = h.audio.playback(0).enqueued.lock().clone();
    assert_eq!(enqueued.len(), 2);
    assert_eq!(enqueued[0], (0.0, 48_000));
    assert_eq!(enqueued[1], (2.0, 36_000));
    assert_eq!(h.bridge.state(), BridgeState::Speaking);
}

#[tokio::test(start_paused = true)]
async fn late_playback_chunk_starts_at_the_output_clock() {
    let h = harness();
    h.bridge.start(SessionMode::Interactive).await.unwrap();

    let format = AudioFormat::pcm16_24khz();
    let session = h.model.session(0);
    session.emit(ServerEvent::Audio { data: pcm16_silence(1.0, format) });
    settle().await;

    // Playback has advanced past the first chunk before the next arrives.
    *h.audio.playback(0).clock.lock() = 3.0;
    session.emit(ServerEvent::Audio { data: pcm16_silence(1.0, format) });
    settle().await;

    let enqueued = h.audio.playback(0).enqueued.lock().clone();
    assert_eq!(enqueued[0].0, 0.0);
    assert_eq!(enqueued[1].0, 3.0);
}

#[tokio::test(start_paused = true)]
async fn undecodable_playback_chunk_is_skipped() {
    let h = harness();
    h.bridge.start(SessionMode::Interactive).await.unwrap();

    let session = h.model.session(0);
    // Odd byte count cannot be PCM16.
    session.emit(ServerEvent::Audio { data: vec![0u8; 3] });
    session.emit(ServerEvent::Audio { data: pcm16_silence(1.0, AudioFormat::pcm16_24khz()) });
    settle().await;

    let enqueued = h.audio.playback(0).enqueued.lock().clone();
    assert_eq!(enqueued.len(), 1);
    assert_eq!(enqueued[0].0, 0.0);
    assert!(h.bridge.is_active().await);
}

// ---------------------------------------------------------------------------
// Tool relay

#[tokio::test(start_paused = true)]
async fn tool_batch_yields_one_ack_per_invocation() {
    let log = Log::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let tools = ToolRegistry::new().on_navigate(move |section| sink.lock().push(section));
    let h = harness_with(tools, FakeAudioIo::with_log(log.clone()), log);

    h.bridge.start(SessionMode::Interactive).await.unwrap();
    h.model.session(0).emit(ServerEvent::ToolCalls {
        calls: vec![
            ToolInvocation {
                id: "a1".to_string(),
                name: "navigate".to_string(),
                args: serde_json::json!({ "section": "work" }),
            },
            ToolInvocation {
                id: "a2".to_string(),
                name: "dance".to_string(),
                args: serde_json::json!({}),
            },
        ],
    });
    settle().await;

    let batches = h.model.session(0).sent_tool_results.lock().clone();
    assert_eq!(batches.len(), 1);
    let ids: Vec<&str> = batches[0].iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a2"]);
    assert_eq!(batches[0][0].result, serde_json::json!({ "result": "ok" }));
    assert_eq!(batches[0][1].result, serde_json::json!({ "result": "unhandled" }));
    assert_eq!(*seen.lock(), vec![Section::Work]);
}

#[tokio::test(start_paused = true)]
async fn tool_acks_are_sent_before_the_next_inbound_event() {
    let log = Log::default();
    let order = log.clone();
    let tools =
        ToolRegistry::new().on_navigate(move |section| order.lock().push(format!("navigate:{section}")));
    let h = harness_with(tools, FakeAudioIo::with_log(log.clone()), log);

    h.bridge.start(SessionMode::Interactive).await.unwrap();
    let session = h.model.session(0);
    session.emit(ServerEvent::ToolCalls {
        calls: vec![ToolInvocation {
            id: "a1".to_string(),
            name: "navigate".to_string(),
            args: serde_json::json!({ "section": "about" }),
        }],
    });
    session.emit(ServerEvent::Audio {
        data: pcm16_silence(0.5, AudioFormat::pcm16_24khz()),
    });
    settle().await;

    assert_eq!(*h.log.lock(), vec!["navigate:about", "ack:a1", "play"]);
}

// ---------------------------------------------------------------------------
// Greeting auto-stop

fn greeting_harness() -> Harness {
    let log = Log::default();
    let mut h = harness_with(ToolRegistry::new(), FakeAudioIo::with_log(log.clone()), log);
    let model = h.model.clone();
    let audio = h.audio.clone();
    let handler = h.handler.clone();
    h.bridge = VoiceBridge::builder()
        .model(model)
        .audio_io(audio)
        .handler(SharedHandler(handler))
        .config(BridgeConfig::default().with_tail(Duration::from_millis(1200)))
        .build()
        .unwrap();
    h
}

#[tokio::test(start_paused = true)]
async fn greeting_sends_the_kickoff_turn() {
    let h = greeting_harness();
    h.bridge.start(SessionMode::Greeting).await.unwrap();
    settle().await;

    let texts = h.model.session(0).sent_texts.lock().clone();
    assert_eq!(texts, vec!["Greet the visitor.".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn greeting_stops_after_playback_drains_plus_tail() {
    let h = greeting_harness();
    h.bridge.start(SessionMode::Greeting).await.unwrap();

    let format = AudioFormat::pcm16_24khz();
    let session = h.model.session(0);
    session.emit(ServerEvent::SessionReady);
    session.emit(ServerEvent::Audio { data: pcm16_silence(2.0, format) });
    session.emit(ServerEvent::Audio { data: pcm16_silence(1.5, format) });
    session.emit(ServerEvent::TurnComplete);
    settle().await;

    // 3.5s of scheduled audio plus the 1.2s tail: still running at 4s.
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(h.bridge.is_active().await);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!h.bridge.is_active().await);
    assert_eq!(session.close_count.load(Ordering::SeqCst), 1);
    assert_eq!(h.bridge.state(), BridgeState::Idle);
}

#[tokio::test(start_paused = true)]
async fn escalated_greeting_keeps_running() {
    let h = greeting_harness();
    h.bridge.start(SessionMode::Greeting).await.unwrap();

    let session = h.model.session(0);
    session.emit(ServerEvent::SessionReady);
    session.emit(ServerEvent::Audio {
        data: pcm16_silence(1.0, AudioFormat::pcm16_24khz()),
    });
    session.emit(ServerEvent::TurnComplete);
    settle().await;

    h.bridge.escalate().await;
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert!(h.bridge.is_active().await);
    assert_eq!(session.close_count.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn stale_auto_stop_timer_cannot_kill_a_successor_session() {
    let h = greeting_harness();
    h.bridge.start(SessionMode::Greeting).await.unwrap();

    let first = h.model.session(0);
    first.emit(ServerEvent::TurnComplete);
    settle().await;

    // The user starts an interactive session before the timer fires.
    h.bridge.start(SessionMode::Interactive).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(h.bridge.is_active().await);
    assert_eq!(first.close_count.load(Ordering::SeqCst), 1);
    assert_eq!(h.model.session(1).close_count.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn greeting_transport_errors_are_suppressed() {
    let h = greeting_harness();
    h.bridge.start(SessionMode::Greeting).await.unwrap();

    h.model.session(0).emit_error(RealtimeError::connection("socket reset"));
    settle().await;

    assert!(h.handler.errors.lock().is_empty());
    assert!(!h.bridge.is_active().await);
}

#[tokio::test(start_paused = true)]
async fn interactive_transport_errors_reach_the_handler() {
    let h = harness();
    h.bridge.start(SessionMode::Interactive).await.unwrap();

    h.model.session(0).emit_error(RealtimeError::connection("socket reset"));
    settle().await;

    assert_eq!(h.handler.errors.lock().len(), 1);
    assert!(!h.bridge.is_active().await);
}

// ---------------------------------------------------------------------------
// Session configuration

#[tokio::test(start_paused = true)]
async fn sessions_declare_audio_only_output_and_tools() {
    let log = Log::default();
    let tools = ToolRegistry::new().on_navigate(|_| {});
    let h = harness_with(tools, FakeAudioIo::with_log(log.clone()), log);

    h.bridge.start(SessionMode::Interactive).await.unwrap();

    let config = h.model.session(0).config.clone();
    assert_eq!(config.modalities, Some(vec!["AUDIO".to_string()]));
    let tools = config.tools.unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["navigate", "open_panel", "toggle_theme"]);
}

#[tokio::test(start_paused = true)]
async fn state_transitions_follow_the_session_lifecycle() {
    let h = harness();
    h.bridge.start(SessionMode::Interactive).await.unwrap();

    let session = h.model.session(0);
    session.emit(ServerEvent::SessionReady);
    session.emit(ServerEvent::Audio {
        data: pcm16_silence(0.5, AudioFormat::pcm16_24khz()),
    });
    session.emit(ServerEvent::TurnComplete);
    settle().await;
    h.bridge.stop().await;

    let states = h.handler.states.lock().clone();
    assert_eq!(
        states,
        vec![
            BridgeState::Connecting,
            BridgeState::Listening,
            BridgeState::Speaking,
            BridgeState::Listening,
            BridgeState::Closed,
            BridgeState::Idle,
        ]
    );
}
