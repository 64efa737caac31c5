//! WebSocket client for the hosted live endpoint.
//!
//! Opens the duplex channel, sends the capability declaration, and
//! translates inbound wire messages through [`crate::wire`].

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::stream::Stream;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::connect_async;
use url::Url;

use crate::audio::AudioChunk;
use crate::config::SessionConfig;
use crate::error::{RealtimeError, Result};
use crate::events::{ServerEvent, ToolResult};
use crate::model::LiveModel;
use crate::session::{BoxedSession, LiveSession};
use crate::wire::{ClientMessage, translate_server_message};

const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent";

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = futures::stream::SplitSink<WsStream, Message>;
type WsSource = futures::stream::SplitStream<WsStream>;

/// Factory for live-endpoint sessions.
pub struct LiveApiModel {
    api_key: SecretString,
    model: String,
    endpoint: String,
}

impl LiveApiModel {
    /// Create a model backed by the default hosted endpoint.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            model: model.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    /// Override the endpoint (testing against a local relay).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn connect_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| RealtimeError::config(format!("invalid endpoint: {e}")))?;
        url.query_pairs_mut().append_pair("key", self.api_key.expose_secret());
        Ok(url)
    }
}

#[async_trait]
impl LiveModel for LiveApiModel {
    fn provider(&self) -> &str {
        "live-api"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn connect(&self, config: SessionConfig) -> Result<BoxedSession> {
        let config = config.with_model(self.model.clone());
        let session = LiveApiSession::connect(self.connect_url()?, config).await?;
        Ok(Box::new(session))
    }
}

impl std::fmt::Debug for LiveApiModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveApiModel").field("model", &self.model).finish_non_exhaustive()
    }
}

/// A connected live-endpoint session.
pub struct LiveApiSession {
    session_id: String,
    connected: Arc<AtomicBool>,
    sender: Arc<Mutex<WsSink>>,
    receiver: Arc<Mutex<WsSource>>,
}

impl LiveApiSession {
    async fn connect(url: Url, config: SessionConfig) -> Result<Self> {
        let request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::connection(format!("invalid client request: {e}")))?;

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| RealtimeError::connection(format!("websocket connect error: {e}")))?;
        let (sink, source) = stream.split();

        let session = Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            connected: Arc::new(AtomicBool::new(true)),
            sender: Arc::new(Mutex::new(sink)),
            receiver: Arc::new(Mutex::new(source)),
        };

        tracing::info!(model = config.model.as_deref().unwrap_or(""), "sending setup message");
        session.send_message(&ClientMessage::setup(&config)).await?;

        Ok(session)
    }

    async fn send_message(&self, message: &ClientMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(RealtimeError::SessionClosed);
        }
        let msg = message.to_json()?;
        let mut sender = self.sender.lock().await;
        sender
            .send(Message::Text(msg))
            .await
            .map_err(|e| RealtimeError::connection(format!("send error: {e}")))
    }

    async fn receive_event(&self) -> Option<Result<ServerEvent>> {
        let mut receiver = self.receiver.lock().await;

        match receiver.next().await {
            Some(Ok(Message::Text(text))) => Some(translate_server_message(&text)),
            // The endpoint delivers JSON frames as binary as well.
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => Some(translate_server_message(&text)),
                Err(e) => Some(Err(RealtimeError::connection(format!(
                    "invalid utf-8 in binary message: {e}"
                )))),
            },
            Some(Ok(Message::Close(_))) => {
                self.connected.store(false, Ordering::SeqCst);
                None
            }
            Some(Ok(_)) => Some(Ok(ServerEvent::Unknown)),
            Some(Err(e)) => {
                self.connected.store(false, Ordering::SeqCst);
                Some(Err(RealtimeError::connection(format!("receive error: {e}"))))
            }
            None => {
                self.connected.store(false, Ordering::SeqCst);
                None
            }
        }
    }
}

#[async_trait]
impl LiveSession for LiveApiSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_audio(&self, audio: &AudioChunk) -> Result<()> {
        self.send_message(&ClientMessage::audio(audio)).await
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.send_message(&ClientMessage::user_text(text)).await
    }

    async fn send_tool_results(&self, results: Vec<ToolResult>) -> Result<()> {
        self.send_message(&ClientMessage::tool_results(results)).await
    }

    async fn next_event(&self) -> Option<Result<ServerEvent>> {
        self.receive_event().await
    }

    fn events(&self) -> Pin<Box<dyn Stream<Item = Result<ServerEvent>> + Send + '_>> {
        Box::pin(futures::stream::unfold(self, |session| async move {
            let event = session.receive_event().await?;
            Some((event, session))
        }))
    }

    async fn close(&self) -> Result<()> {
        if self.connected.swap(false, Ordering::SeqCst) {
            let mut sender = self.sender.lock().await;
            sender
                .send(Message::Close(None))
                .await
                .map_err(|e| RealtimeError::connection(format!("close error: {e}")))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for LiveApiSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveApiSession")
            .field("session_id", &self.session_id)
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .finish()
    }
}
