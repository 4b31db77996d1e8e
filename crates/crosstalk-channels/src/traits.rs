//! Plugin traits and lifecycle contract.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crosstalk_core::config::ConfigError;
use crosstalk_core::types::{ChannelId, IncomingMessage, OutgoingMessage};

use crate::confirm::ConfirmationRouter;

/// Boxed error for injected handler seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Channel errors.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Plugin is not connected.
    #[error("not connected")]
    NotConnected,

    /// Lifecycle method called from the wrong state.
    #[error("invalid lifecycle state: expected {expected:?}, was {actual:?}")]
    InvalidState {
        /// State the operation requires.
        expected: PluginState,
        /// State the plugin was in.
        actual: PluginState,
    },

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Message delivery failed.
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    /// Rate limited by the platform.
    #[error("rate limited")]
    RateLimited,

    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Lifecycle state of a channel plugin.
///
/// `Uninitialized -> Initialized -> Started -> Stopped`; a stopped plugin is
/// recreated on reconfiguration rather than resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    /// Constructed, credentials not yet validated.
    Uninitialized,
    /// Credentials validated, no connection.
    Initialized,
    /// Connected and processing events.
    Started,
    /// Torn down.
    Stopped,
}

/// What a platform natively supports.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ChannelCapabilities {
    /// Text messages.
    pub text: bool,
    /// Images by URL.
    pub images: bool,
    /// Files/documents.
    pub files: bool,
    /// Voice notes.
    pub voice: bool,
    /// Native interactive buttons.
    pub buttons: bool,
    /// Editing sent messages.
    pub editing: bool,
    /// Group conversations.
    pub groups: bool,
}

/// Injected emit function for normalized inbound messages.
///
/// The plugin dispatches to it asynchronously; its return value is never
/// awaited inside the listener loop.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Deliver one normalized message to the host.
    async fn deliver(&self, message: IncomingMessage) -> Result<(), BoxError>;
}

/// Injected handler for confirmation decisions.
#[async_trait]
pub trait ConfirmHandler: Send + Sync {
    /// Apply one approval decision.
    async fn confirm(
        &self,
        user_id: &str,
        channel: &ChannelId,
        call_id: &str,
        value: &str,
    ) -> Result<(), BoxError>;
}

/// Dependencies handed to a plugin at `start`.
#[derive(Clone)]
pub struct PluginContext {
    /// Destination for normalized inbound messages.
    pub sink: Arc<dyn MessageSink>,
    /// Router for interactive-element callbacks, when the host supports
    /// confirmations.
    pub confirmations: Option<Arc<ConfirmationRouter>>,
}

impl PluginContext {
    /// Context with a sink and no confirmation support.
    #[must_use]
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self {
            sink,
            confirmations: None,
        }
    }

    /// Attach a confirmation router.
    #[must_use]
    pub fn with_confirmations(mut self, router: Arc<ConfirmationRouter>) -> Self {
        self.confirmations = Some(router);
        self
    }
}

/// Hand a normalized message to the sink without blocking the listener.
///
/// Handler failures are logged and isolated per message.
pub(crate) fn dispatch_incoming(sink: Arc<dyn MessageSink>, message: IncomingMessage) {
    tokio::spawn(async move {
        let channel = message.channel.clone();
        if let Err(err) = sink.deliver(message).await {
            tracing::warn!(channel = %channel, error = %err, "message handler failed");
        }
    });
}

/// Stateful controller owning one platform connection.
#[async_trait]
pub trait ChannelPlugin: Send + Sync {
    /// Channel identifier (e.g. "telegram").
    fn id(&self) -> &str;

    /// Human-readable label.
    fn label(&self) -> &str;

    /// Platform capabilities.
    fn capabilities(&self) -> ChannelCapabilities;

    /// Current lifecycle state.
    fn state(&self) -> PluginState;

    /// Validate credentials from the held config. No network I/O; fails
    /// fast with an error naming the missing field.
    fn initialize(&self) -> Result<(), ChannelError>;

    /// Connect, resolve own identity for self-echo suppression, and wire
    /// listeners. On failure the plugin remains `Initialized`.
    async fn start(&self, ctx: PluginContext) -> Result<(), ChannelError>;

    /// Tear down the connection and clear in-memory state. Idempotent.
    async fn stop(&self) -> Result<(), ChannelError>;

    /// Send a message, chunking oversize text; returns the platform id of
    /// the last sent chunk.
    async fn send_message(
        &self,
        chat_id: &str,
        message: &OutgoingMessage,
    ) -> Result<String, ChannelError>;

    /// Best-effort edit; platform failures are logged and swallowed.
    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: &str,
        message: &OutgoingMessage,
    ) -> Result<(), ChannelError>;

    /// Number of distinct users seen since `start`. A liveness heuristic,
    /// not a durable metric.
    fn active_user_count(&self) -> usize;
}
