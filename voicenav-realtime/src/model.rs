//! Core LiveModel trait definition.

use async_trait::async_trait;

use crate::config::SessionConfig;
use crate::error::Result;
use crate::session::BoxedSession;

/// A factory for realtime sessions.
///
/// The bridge holds a `BoxedModel` and calls [`LiveModel::connect`] each
/// time a session starts; tests provide a model that hands out in-memory
/// sessions.
#[async_trait]
pub trait LiveModel: Send + Sync {
    /// Provider name, e.g. `"live-api"`.
    fn provider(&self) -> &str;

    /// Model identifier.
    fn model_id(&self) -> &str;

    /// Open the duplex channel, declare capabilities, and return the
    /// connected session.
    async fn connect(&self, config: SessionConfig) -> Result<BoxedSession>;
}

/// A shared model type for thread-safe access.
pub type BoxedModel = std::sync::Arc<dyn LiveModel>;
