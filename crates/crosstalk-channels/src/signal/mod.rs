//! Signal channel adapter using the signal-cli REST API
//! (<https://github.com/bbernhard/signal-cli-rest-api>).
//!
//! Signal has no native interactive elements, so button grids are rendered
//! as a flattened 1-indexed numbered list appended to the message body, and
//! media is sent as an explicit caption-plus-link fallback.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

use async_trait::async_trait;

use crosstalk_core::config::{Credentials, PluginConfig};
use crosstalk_core::types::{
    Attachment, AttachmentKind, ChannelId, ConnectionProbe, IncomingMessage, MediaRef,
    MessageContent, OutgoingKind, OutgoingMessage, UnifiedUser, normalize_timestamp,
};

use crate::chunk::split_message;
use crate::traits::{
    ChannelCapabilities, ChannelError, ChannelPlugin, PluginContext, PluginState,
    dispatch_incoming,
};

/// Signal practical message length limit.
pub const SIGNAL_TEXT_LIMIT: usize = 65_536;

const RECEIVE_POLL_DELAY: Duration = Duration::from_secs(2);
const RECEIVE_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Signal channel plugin.
pub struct SignalPlugin {
    client: Client,
    config: PluginConfig,
    state: Arc<RwLock<SignalState>>,
    running: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct SignalState {
    lifecycle: Option<PluginState>,
    api_url: Option<String>,
    number: Option<String>,
    active_users: HashSet<String>,
    ctx: Option<PluginContext>,
}

impl SignalState {
    fn lifecycle(&self) -> PluginState {
        self.lifecycle.unwrap_or(PluginState::Uninitialized)
    }
}

impl SignalPlugin {
    /// Create a new Signal plugin from its config.
    #[must_use]
    pub fn new(config: PluginConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            state: Arc::new(RwLock::new(SignalState::default())),
            running: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SignalState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SignalState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn started_endpoint(&self) -> Result<(String, String), ChannelError> {
        let state = self.read();
        if state.lifecycle() != PluginState::Started {
            return Err(ChannelError::NotConnected);
        }
        match (state.api_url.clone(), state.number.clone()) {
            (Some(url), Some(number)) => Ok((url, number)),
            _ => Err(ChannelError::NotConnected),
        }
    }

    /// Probe credentials without touching plugin state.
    pub async fn test_connection(credentials: &Credentials) -> ConnectionProbe {
        let api_url = match Credentials::require(credentials.api_url.as_ref(), "signal api url") {
            Ok(url) => url.trim_end_matches('/').to_string(),
            Err(err) => return ConnectionProbe::failed(err.to_string()),
        };
        let number = match Credentials::require(credentials.phone_number.as_ref(), "phone number")
        {
            Ok(number) => number.to_string(),
            Err(err) => return ConnectionProbe::failed(err.to_string()),
        };

        let client = Client::new();
        match get_json::<SignalAbout>(&client, &format!("{api_url}/v1/about/{number}")).await {
            Ok(_) => ConnectionProbe::ok(number),
            Err(err) => ConnectionProbe::failed(err.to_string()),
        }
    }
}

async fn get_json<T: for<'de> Deserialize<'de>>(
    client: &Client,
    url: &str,
) -> Result<T, ChannelError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ChannelError::Network(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(ChannelError::Network(format!("{status}: {text}")));
    }

    response
        .json()
        .await
        .map_err(|e| ChannelError::Network(e.to_string()))
}

async fn post_json<T: for<'de> Deserialize<'de>>(
    client: &Client,
    url: &str,
    body: &impl Serialize,
) -> Result<T, ChannelError> {
    let response = client
        .post(url)
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| ChannelError::Network(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ChannelError::RateLimited);
        }
        let text = response.text().await.unwrap_or_default();
        return Err(ChannelError::Network(format!("{status}: {text}")));
    }

    response
        .json()
        .await
        .map_err(|e| ChannelError::Network(e.to_string()))
}

/// Convert a raw signal-cli message into a unified message.
///
/// Returns `None` when the envelope, source, or data message is missing,
/// when the source is our own number, or when the message carries neither
/// text nor attachments.
#[must_use]
pub fn normalize_message(raw: &SignalMessage, own_number: &str) -> Option<IncomingMessage> {
    let envelope = raw.envelope.as_ref()?;
    let source = envelope.source.as_ref()?;
    if source == own_number {
        return None;
    }
    let data = envelope.data_message.as_ref()?;

    // Group messages address the group, never the individual sender.
    let chat_id = data
        .group_info
        .as_ref()
        .map_or_else(|| source.clone(), |g| g.group_id.clone());

    let text = data.message.clone().unwrap_or_default();
    let raw_attachments = data.attachments.as_deref().unwrap_or_default();
    if data.message.is_none() && raw_attachments.is_empty() {
        return None;
    }

    let attachments: Vec<Attachment> = raw_attachments
        .iter()
        .map(|a| {
            let kind = if a.voice_note == Some(true) {
                AttachmentKind::Voice
            } else if a.content_type.starts_with("image/") {
                AttachmentKind::Photo
            } else if a.content_type.starts_with("audio/") {
                AttachmentKind::Audio
            } else {
                AttachmentKind::Document
            };
            Attachment {
                kind,
                media: MediaRef::FileId(a.id.clone()),
                mime_type: a.content_type.clone(),
                file_name: a.filename.clone(),
            }
        })
        .collect();

    let content = if attachments.is_empty() {
        MessageContent::text(text)
    } else {
        MessageContent::media(text, attachments)
    };

    let timestamp = envelope
        .timestamp
        .map_or_else(chrono::Utc::now, normalize_timestamp);

    let display_name = UnifiedUser::resolve_display_name(
        "Signal",
        source,
        envelope.source_name.as_deref(),
        Some(source),
    );

    Some(IncomingMessage {
        id: envelope.timestamp.unwrap_or_default().to_string(),
        channel: ChannelId::signal(),
        chat_id,
        user: UnifiedUser {
            id: source.clone(),
            username: source.clone(),
            display_name,
            avatar_url: None,
        },
        content,
        timestamp,
        reply_to: data.quote.as_ref().map(|q| q.id.to_string()),
        raw: serde_json::to_value(raw).unwrap_or_default(),
    })
}

/// Render an outgoing message as Signal text.
///
/// Buttons become a flattened 1-indexed numbered list; image and file
/// messages become caption-plus-link text, since signal-cli has no
/// URL-attachment field.
#[must_use]
pub fn render_outgoing(message: &OutgoingMessage) -> String {
    let mut text = message.text.clone();
    match message.kind {
        OutgoingKind::Buttons => {
            for (i, button) in message.flat_buttons().iter().enumerate() {
                let _ = write!(text, "\n{}. {}", i + 1, button.text);
            }
        }
        OutgoingKind::Image => {
            if let Some(url) = &message.image_url {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(url);
            }
        }
        OutgoingKind::File => {
            if let Some(url) = &message.file_url {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(url);
            }
        }
        OutgoingKind::Text => {}
    }
    text
}

async fn run_receive_loop(
    client: Client,
    api_url: String,
    number: String,
    state: Arc<RwLock<SignalState>>,
    ctx: PluginContext,
    running: Arc<AtomicBool>,
) {
    let url = format!("{api_url}/v1/receive/{number}");

    while running.load(Ordering::SeqCst) {
        match get_json::<Vec<SignalMessage>>(&client, &url).await {
            Ok(messages) => {
                for raw in &messages {
                    if let Some(message) = normalize_message(raw, &number) {
                        state
                            .write()
                            .unwrap_or_else(PoisonError::into_inner)
                            .active_users
                            .insert(message.user.id.clone());
                        dispatch_incoming(Arc::clone(&ctx.sink), message);
                    }
                }
                tokio::time::sleep(RECEIVE_POLL_DELAY).await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "signal receive failed");
                tokio::time::sleep(RECEIVE_RETRY_DELAY).await;
            }
        }
    }
}

#[async_trait]
impl ChannelPlugin for SignalPlugin {
    fn id(&self) -> &str {
        "signal"
    }

    fn label(&self) -> &str {
        "Signal"
    }

    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            text: true,
            images: true,
            files: true,
            voice: true,
            buttons: false,
            editing: false,
            groups: true,
        }
    }

    fn state(&self) -> PluginState {
        self.read().lifecycle()
    }

    fn initialize(&self) -> Result<(), ChannelError> {
        let api_url =
            Credentials::require(self.config.credentials.api_url.as_ref(), "signal api url")?
                .trim_end_matches('/')
                .to_string();
        let number =
            Credentials::require(self.config.credentials.phone_number.as_ref(), "phone number")?
                .to_string();

        let mut state = self.write();
        state.api_url = Some(api_url);
        state.number = Some(number);
        state.lifecycle = Some(PluginState::Initialized);
        Ok(())
    }

    async fn start(&self, ctx: PluginContext) -> Result<(), ChannelError> {
        let (lifecycle, api_url, number) = {
            let state = self.read();
            (
                state.lifecycle(),
                state.api_url.clone(),
                state.number.clone(),
            )
        };
        if lifecycle != PluginState::Initialized {
            return Err(ChannelError::InvalidState {
                expected: PluginState::Initialized,
                actual: lifecycle,
            });
        }
        let (api_url, number) = match (api_url, number) {
            (Some(url), Some(number)) => (url, number),
            _ => return Err(ChannelError::NotConnected),
        };

        // Verify the number is registered with the bridge.
        get_json::<SignalAbout>(&self.client, &format!("{api_url}/v1/about/{number}"))
            .await
            .map_err(|e| ChannelError::AuthFailed(e.to_string()))?;

        {
            let mut state = self.write();
            state.ctx = Some(ctx.clone());
            state.lifecycle = Some(PluginState::Started);
        }

        self.running.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(run_receive_loop(
            self.client.clone(),
            api_url,
            number.clone(),
            Arc::clone(&self.state),
            ctx,
            Arc::clone(&self.running),
        ));
        *self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);

        tracing::info!(number = %number, "signal connected");
        Ok(())
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }

        let mut state = self.write();
        state.active_users.clear();
        state.ctx = None;
        state.lifecycle = Some(PluginState::Stopped);
        Ok(())
    }

    async fn send_message(
        &self,
        chat_id: &str,
        message: &OutgoingMessage,
    ) -> Result<String, ChannelError> {
        let (api_url, number) = self.started_endpoint()?;

        let rendered = render_outgoing(message);
        let chunks = split_message(&rendered, SIGNAL_TEXT_LIMIT);
        let url = format!("{api_url}/v2/send");
        let mut delivery_id = String::new();

        for chunk in &chunks {
            let params = SendMessageParams {
                number: number.clone(),
                recipients: vec![chat_id.to_string()],
                message: chunk.clone(),
            };
            let result: SendResponse = post_json(&self.client, &url, &params)
                .await
                .map_err(|e| ChannelError::DeliveryFailed(e.to_string()))?;
            delivery_id = result.timestamp.to_string();
        }

        Ok(delivery_id)
    }

    async fn edit_message(
        &self,
        _chat_id: &str,
        message_id: &str,
        _message: &OutgoingMessage,
    ) -> Result<(), ChannelError> {
        self.started_endpoint()?;
        // signal-cli has no edit endpoint; editing is not load-bearing.
        tracing::debug!(message_id = %message_id, "signal does not support editing");
        Ok(())
    }

    fn active_user_count(&self) -> usize {
        self.read().active_users.len()
    }
}

// signal-cli REST API types

/// About response.
#[derive(Debug, Deserialize)]
struct SignalAbout {
    #[allow(dead_code)]
    versions: Option<serde_json::Value>,
}

/// Send message parameters.
#[derive(Debug, Serialize)]
struct SendMessageParams {
    number: String,
    recipients: Vec<String>,
    message: String,
}

/// Send response.
#[derive(Debug, Deserialize)]
struct SendResponse {
    timestamp: i64,
}

/// Incoming Signal message from the receive endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalMessage {
    /// Account that received the message.
    pub account: Option<String>,
    /// Message envelope.
    pub envelope: Option<SignalEnvelope>,
}

/// Signal envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEnvelope {
    /// Source phone number.
    pub source: Option<String>,
    /// Source contact name.
    #[serde(rename = "sourceName")]
    pub source_name: Option<String>,
    /// Timestamp in epoch milliseconds.
    pub timestamp: Option<i64>,
    /// Data message content.
    #[serde(rename = "dataMessage")]
    pub data_message: Option<SignalDataMessage>,
}

/// Signal data message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalDataMessage {
    /// Message text.
    pub message: Option<String>,
    /// Attachments.
    pub attachments: Option<Vec<SignalAttachment>>,
    /// Group info (present for group messages).
    #[serde(rename = "groupInfo")]
    pub group_info: Option<SignalGroupInfo>,
    /// Quote (reply).
    pub quote: Option<SignalQuote>,
}

/// Signal attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalAttachment {
    /// Attachment ID (opaque media key).
    pub id: String,
    /// Content type.
    #[serde(rename = "contentType")]
    pub content_type: String,
    /// Filename.
    pub filename: Option<String>,
    /// Voice note flag.
    #[serde(rename = "voiceNote")]
    pub voice_note: Option<bool>,
}

/// Signal group info.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalGroupInfo {
    /// Group ID.
    #[serde(rename = "groupId")]
    pub group_id: String,
}

/// Signal quote (reply).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalQuote {
    /// Quoted message ID.
    pub id: i64,
    /// Author of the quoted message.
    pub author: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosstalk_core::config::PluginKind;
    use crosstalk_core::types::{Button, ContentKind};

    fn raw(source: &str, text: Option<&str>, group: Option<&str>) -> SignalMessage {
        SignalMessage {
            account: Some("+15550000".to_string()),
            envelope: Some(SignalEnvelope {
                source: Some(source.to_string()),
                source_name: None,
                timestamp: Some(1_700_000_000_000),
                data_message: Some(SignalDataMessage {
                    message: text.map(str::to_string),
                    attachments: None,
                    group_info: group.map(|g| SignalGroupInfo {
                        group_id: g.to_string(),
                    }),
                    quote: None,
                }),
            }),
        }
    }

    #[test]
    fn test_initialize_requires_url_and_number() {
        let plugin =
            SignalPlugin::new(PluginConfig::new(PluginKind::Signal, Credentials::default()));
        let err = plugin.initialize().unwrap_err();
        assert_eq!(err.to_string(), "signal api url is required");

        let plugin = SignalPlugin::new(PluginConfig::new(
            PluginKind::Signal,
            Credentials {
                api_url: Some("http://localhost:8080".to_string()),
                ..Credentials::default()
            },
        ));
        let err = plugin.initialize().unwrap_err();
        assert_eq!(err.to_string(), "phone number is required");
    }

    #[test]
    fn test_normalize_direct_message() {
        let msg = normalize_message(&raw("+15551111", Some("hey"), None), "+15550000").unwrap();
        assert_eq!(msg.chat_id, "+15551111");
        assert_eq!(msg.user.id, "+15551111");
        assert_eq!(msg.content.kind, ContentKind::Text);
        assert_eq!(msg.timestamp.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_normalize_group_prefers_group_id() {
        let msg = normalize_message(
            &raw("+15551111", Some("hey"), Some("group-abc")),
            "+15550000",
        )
        .unwrap();
        assert_eq!(msg.chat_id, "group-abc");
        assert_eq!(msg.user.id, "+15551111");
    }

    #[test]
    fn test_normalize_suppresses_self_echo() {
        assert!(normalize_message(&raw("+15550000", Some("hey"), None), "+15550000").is_none());
    }

    #[test]
    fn test_normalize_requires_body_or_attachments() {
        assert!(normalize_message(&raw("+15551111", None, None), "+15550000").is_none());
    }

    #[test]
    fn test_normalize_voice_note_flag() {
        let mut message = raw("+15551111", None, None);
        message
            .envelope
            .as_mut()
            .unwrap()
            .data_message
            .as_mut()
            .unwrap()
            .attachments = Some(vec![SignalAttachment {
            id: "att-1".to_string(),
            content_type: "audio/aac".to_string(),
            filename: None,
            voice_note: Some(true),
        }]);
        let msg = normalize_message(&message, "+15550000").unwrap();
        assert_eq!(msg.content.kind, ContentKind::Voice);
    }

    #[test]
    fn test_buttons_render_as_numbered_list() {
        let message = OutgoingMessage::buttons(
            "Proceed?",
            vec![vec![Button::new("Yes"), Button::new("No")]],
        );
        let rendered = render_outgoing(&message);
        assert!(rendered.ends_with("1. Yes\n2. No"));
        assert!(rendered.starts_with("Proceed?"));
    }

    #[test]
    fn test_button_grid_flattens_across_rows() {
        let message = OutgoingMessage::buttons(
            "Pick one",
            vec![
                vec![Button::new("A"), Button::new("B")],
                vec![Button::new("C")],
            ],
        );
        assert!(render_outgoing(&message).ends_with("1. A\n2. B\n3. C"));
    }

    #[test]
    fn test_image_renders_caption_plus_link() {
        let message = OutgoingMessage::image("look", "https://example.com/cat.png");
        assert_eq!(render_outgoing(&message), "look\nhttps://example.com/cat.png");
    }

    #[tokio::test]
    async fn test_send_requires_started() {
        let plugin = SignalPlugin::new(PluginConfig::new(
            PluginKind::Signal,
            Credentials {
                api_url: Some("http://localhost:8080".to_string()),
                phone_number: Some("+15550000".to_string()),
                ..Credentials::default()
            },
        ));
        plugin.initialize().unwrap();
        let err = plugin
            .send_message("+15551111", &OutgoingMessage::text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::NotConnected));
    }
}
