//! Slack channel adapter using the Web API.
//!
//! Inbound events and interactions are pushed by the host's transport
//! (Events API or socket mode) into [`SlackPlugin::handle_event`] and
//! [`SlackPlugin::handle_interaction`]; acknowledgment happens at the
//! transport level before dispatch.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crosstalk_core::config::{Credentials, PluginConfig};
use crosstalk_core::secrets::ApiKey;
use crosstalk_core::types::{
    Attachment, AttachmentKind, ChannelId, ConnectionProbe, IncomingMessage, MediaRef,
    MessageContent, OutgoingKind, OutgoingMessage, UnifiedUser, normalize_timestamp,
};

use crate::chunk::split_message;
use crate::traits::{
    ChannelCapabilities, ChannelError, ChannelPlugin, PluginContext, PluginState,
    dispatch_incoming,
};

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Slack message length limit for `chat.postMessage`.
pub const SLACK_TEXT_LIMIT: usize = 40_000;

/// Slack channel plugin.
pub struct SlackPlugin {
    client: Client,
    config: PluginConfig,
    state: RwLock<SlackState>,
}

#[derive(Default)]
struct SlackState {
    lifecycle: Option<PluginState>,
    token: Option<ApiKey>,
    bot_user_id: Option<String>,
    active_users: HashSet<String>,
    ctx: Option<PluginContext>,
}

impl SlackState {
    fn lifecycle(&self) -> PluginState {
        self.lifecycle.unwrap_or(PluginState::Uninitialized)
    }
}

impl SlackPlugin {
    /// Create a new Slack plugin from its config.
    #[must_use]
    pub fn new(config: PluginConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            state: RwLock::new(SlackState::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SlackState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SlackState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn started_token(&self) -> Result<ApiKey, ChannelError> {
        let state = self.read();
        if state.lifecycle() != PluginState::Started {
            return Err(ChannelError::NotConnected);
        }
        state.token.clone().ok_or(ChannelError::NotConnected)
    }

    /// Probe credentials without touching plugin state.
    pub async fn test_connection(credentials: &Credentials) -> ConnectionProbe {
        let token = match Credentials::require(credentials.token.as_ref(), "bot token") {
            Ok(token) => ApiKey::new(token),
            Err(err) => return ConnectionProbe::failed(err.to_string()),
        };
        let client = Client::new();
        match call_api::<AuthTestResponse>(&client, &token, "auth.test", None::<&()>).await {
            Ok(auth) => ConnectionProbe::ok(auth.user.unwrap_or(auth.user_id)),
            Err(err) => ConnectionProbe::failed(err.to_string()),
        }
    }

    /// Feed one inbound event from the host transport.
    ///
    /// Events that fail normalization (self-echo, malformed, unsupported)
    /// are dropped silently.
    pub fn handle_event(&self, raw: &SlackEvent) {
        let (sink, bot_user_id) = {
            let state = self.read();
            if state.lifecycle() != PluginState::Started {
                tracing::debug!("slack event before start, dropping");
                return;
            }
            let Some(ctx) = state.ctx.as_ref() else {
                return;
            };
            (
                Arc::clone(&ctx.sink),
                state.bot_user_id.clone().unwrap_or_default(),
            )
        };

        let Some(message) = normalize_event(raw, &bot_user_id) else {
            return;
        };

        self.write().active_users.insert(message.user.id.clone());
        dispatch_incoming(sink, message);
    }

    /// Feed one interactive callback (block actions) from the host
    /// transport. The transport has already acknowledged the callback.
    pub fn handle_interaction(&self, raw: &SlackInteraction) {
        let router = {
            let state = self.read();
            if state.lifecycle() != PluginState::Started {
                return;
            }
            state
                .ctx
                .as_ref()
                .and_then(|ctx| ctx.confirmations.clone())
        };
        let Some(router) = router else {
            return;
        };

        let user_id = raw.user.id.as_str();
        for action in &raw.actions {
            if !router.dispatch(user_id, &ChannelId::slack(), &action.action_id) {
                tracing::debug!(action_id = %action.action_id, "unrelated slack interaction");
            }
        }
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        token: &ApiKey,
        method: &str,
        params: Option<&impl Serialize>,
    ) -> Result<T, ChannelError> {
        call_api(&self.client, token, method, params).await
    }
}

/// Call a Slack Web API method.
async fn call_api<T: for<'de> Deserialize<'de>>(
    client: &Client,
    token: &ApiKey,
    method: &str,
    params: Option<&impl Serialize>,
) -> Result<T, ChannelError> {
    let url = format!("{SLACK_API_BASE}/{method}");

    let mut request = client
        .post(&url)
        .header("Authorization", format!("Bearer {}", token.expose()))
        .header("Content-Type", "application/json; charset=utf-8");

    if let Some(p) = params {
        request = request.json(p);
    }

    let response = request
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

    let result: SlackResponse<T> = response
        .json()
        .await
        .map_err(|e| ChannelError::Network(e.to_string()))?;

    if result.ok {
        Ok(result.data)
    } else {
        Err(ChannelError::Network(
            result.error.unwrap_or_else(|| "unknown error".to_string()),
        ))
    }
}

/// Convert a raw Slack event into a unified message.
///
/// Returns `None` for non-message events, bot messages, self-echo, and
/// events missing a sender, channel, or body.
#[must_use]
pub fn normalize_event(raw: &SlackEvent, bot_user_id: &str) -> Option<IncomingMessage> {
    let event = raw.event.as_ref()?;
    if event.event_type != "message" {
        return None;
    }
    // Bot messages include our own sends echoed back.
    if event.subtype.as_deref() == Some("bot_message") {
        return None;
    }

    let user_id = event.user.as_ref()?;
    if !bot_user_id.is_empty() && user_id == bot_user_id {
        return None;
    }
    let channel = event.channel.as_ref()?;

    let content = classify_content(event)?;

    // Slack ts is "seconds.fraction"; the whole string doubles as the
    // message id.
    let ts = event.ts.clone()?;
    let timestamp = ts
        .split('.')
        .next()
        .and_then(|s| s.parse::<i64>().ok())
        .map_or_else(chrono::Utc::now, normalize_timestamp);

    let display_name =
        UnifiedUser::resolve_display_name("Slack", user_id, None, event.username.as_deref());

    Some(IncomingMessage {
        id: ts,
        channel: ChannelId::slack(),
        chat_id: channel.clone(),
        user: UnifiedUser {
            id: user_id.clone(),
            username: event.username.clone().unwrap_or_else(|| user_id.clone()),
            display_name,
            avatar_url: None,
        },
        content,
        timestamp,
        reply_to: event.thread_ts.clone(),
        raw: serde_json::to_value(raw).unwrap_or_default(),
    })
}

fn classify_content(event: &SlackMessageEvent) -> Option<MessageContent> {
    let text = event.text.clone().unwrap_or_default();

    let files = event.files.as_deref().unwrap_or_default();
    if files.is_empty() {
        if event.text.is_none() {
            return None;
        }
        return Some(MessageContent::text(text));
    }

    let attachments = files
        .iter()
        .map(|f| {
            let kind = if f.mimetype.starts_with("image/") {
                AttachmentKind::Photo
            } else if f.mimetype.starts_with("audio/") {
                AttachmentKind::Audio
            } else {
                AttachmentKind::Document
            };
            Attachment {
                kind,
                media: f
                    .url_private
                    .clone()
                    .map_or_else(|| MediaRef::FileId(f.id.clone()), MediaRef::Url),
                mime_type: f.mimetype.clone(),
                file_name: Some(f.name.clone()),
            }
        })
        .collect();

    Some(MessageContent::media(text, attachments))
}

/// Build the `chat.postMessage` parameters for one chunk of an outgoing
/// message. Interactive and media elements are attached only when
/// `with_extras` is set (the final chunk).
#[must_use]
pub fn build_post_message(
    chat_id: &str,
    chunk: &str,
    message: &OutgoingMessage,
    with_extras: bool,
) -> ChatPostMessageParams {
    let mut params = ChatPostMessageParams {
        channel: chat_id.to_string(),
        text: Some(chunk.to_string()),
        thread_ts: message.reply_to.clone(),
        blocks: None,
        attachments: None,
    };

    if !with_extras {
        return params;
    }

    match message.kind {
        OutgoingKind::Buttons => {
            params.blocks = Some(button_blocks(chunk, message));
        }
        OutgoingKind::Image => {
            params.attachments = Some(vec![SlackAttachment {
                fallback: Some(chunk.to_string()),
                image_url: message.image_url.clone(),
                title: None,
                title_link: message.image_url.clone(),
            }]);
        }
        OutgoingKind::File => {
            params.attachments = Some(vec![SlackAttachment {
                fallback: message.file_name.clone(),
                image_url: None,
                title: message.file_name.clone(),
                title_link: message.file_url.clone(),
            }]);
        }
        OutgoingKind::Text => {}
    }

    params
}

/// Render a button grid as one section block plus one `actions` block with
/// native button elements keyed by callback id.
fn button_blocks(text: &str, message: &OutgoingMessage) -> Vec<serde_json::Value> {
    let elements: Vec<serde_json::Value> = message
        .flat_buttons()
        .iter()
        .enumerate()
        .map(|(i, button)| {
            let action_id = button
                .callback_id
                .clone()
                .unwrap_or_else(|| format!("button:{i}"));
            serde_json::json!({
                "type": "button",
                "text": { "type": "plain_text", "text": button.text },
                "action_id": action_id,
                "value": action_id,
            })
        })
        .collect();

    vec![
        serde_json::json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": text },
        }),
        serde_json::json!({
            "type": "actions",
            "elements": elements,
        }),
    ]
}

#[async_trait]
impl ChannelPlugin for SlackPlugin {
    fn id(&self) -> &str {
        "slack"
    }

    fn label(&self) -> &str {
        "Slack"
    }

    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            text: true,
            images: true,
            files: true,
            voice: false,
            buttons: true,
            editing: true,
            groups: true,
        }
    }

    fn state(&self) -> PluginState {
        self.read().lifecycle()
    }

    fn initialize(&self) -> Result<(), ChannelError> {
        let token = Credentials::require(self.config.credentials.token.as_ref(), "bot token")?;
        let mut state = self.write();
        state.token = Some(ApiKey::new(token));
        state.lifecycle = Some(PluginState::Initialized);
        Ok(())
    }

    async fn start(&self, ctx: PluginContext) -> Result<(), ChannelError> {
        let (lifecycle, token) = {
            let state = self.read();
            (state.lifecycle(), state.token.clone())
        };
        if lifecycle != PluginState::Initialized {
            return Err(ChannelError::InvalidState {
                expected: PluginState::Initialized,
                actual: lifecycle,
            });
        }
        let token = token.ok_or(ChannelError::NotConnected)?;

        // Failure here leaves the plugin Initialized.
        let auth: AuthTestResponse = self
            .call(&token, "auth.test", None::<&()>)
            .await
            .map_err(|e| ChannelError::AuthFailed(e.to_string()))?;

        let mut state = self.write();
        state.bot_user_id = Some(auth.user_id.clone());
        state.ctx = Some(ctx);
        state.lifecycle = Some(PluginState::Started);

        tracing::info!(
            bot = %auth.user.as_deref().unwrap_or(&auth.user_id),
            team = %auth.team.as_deref().unwrap_or("unknown"),
            "slack connected"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        let mut state = self.write();
        state.bot_user_id = None;
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
        let token = self.started_token()?;

        let chunks = split_message(&message.text, SLACK_TEXT_LIMIT);
        let last = chunks.len() - 1;
        let mut delivery_id = String::new();

        for (i, chunk) in chunks.iter().enumerate() {
            let params = build_post_message(chat_id, chunk, message, i == last);
            let result: ChatPostMessageResponse = self
                .call(&token, "chat.postMessage", Some(&params))
                .await
                .map_err(|e| ChannelError::DeliveryFailed(e.to_string()))?;
            delivery_id = result.ts;
        }

        Ok(delivery_id)
    }

    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: &str,
        message: &OutgoingMessage,
    ) -> Result<(), ChannelError> {
        let token = self.started_token()?;

        let params = ChatUpdateParams {
            channel: chat_id.to_string(),
            ts: message_id.to_string(),
            text: message.text.clone(),
        };
        if let Err(err) = self
            .call::<ChatPostMessageResponse>(&token, "chat.update", Some(&params))
            .await
        {
            tracing::warn!(channel = "slack", error = %err, "edit failed");
        }
        Ok(())
    }

    fn active_user_count(&self) -> usize {
        self.read().active_users.len()
    }
}

// Slack API types

/// Generic Slack API response wrapper.
#[derive(Debug, Deserialize)]
struct SlackResponse<T> {
    ok: bool,
    #[serde(flatten)]
    data: T,
    error: Option<String>,
}

/// auth.test response.
#[derive(Debug, Deserialize)]
struct AuthTestResponse {
    user_id: String,
    user: Option<String>,
    team: Option<String>,
}

/// chat.postMessage response.
#[derive(Debug, Deserialize)]
struct ChatPostMessageResponse {
    ts: String,
}

/// chat.postMessage parameters.
#[derive(Debug, Serialize)]
pub struct ChatPostMessageParams {
    /// Target channel.
    pub channel: String,
    /// Fallback/body text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Thread to reply in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    /// Block kit blocks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<serde_json::Value>>,
    /// Legacy attachments (still the simplest URL-image path).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<SlackAttachment>>,
}

/// chat.update parameters.
#[derive(Debug, Serialize)]
struct ChatUpdateParams {
    channel: String,
    ts: String,
    text: String,
}

/// Slack attachment (legacy format, still works).
#[derive(Debug, Serialize)]
pub struct SlackAttachment {
    /// Plain-text fallback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    /// Inline image URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Title link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_link: Option<String>,
}

/// Slack Events API event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackEvent {
    /// Envelope type (always "`event_callback`" for events).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Team ID.
    pub team_id: Option<String>,
    /// Event data.
    pub event: Option<SlackMessageEvent>,
}

/// Slack message event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackMessageEvent {
    /// Event type (e.g. "message").
    #[serde(rename = "type")]
    pub event_type: String,
    /// Channel ID.
    pub channel: Option<String>,
    /// Channel type (e.g. "im", "channel", "group").
    pub channel_type: Option<String>,
    /// User ID who sent the message.
    pub user: Option<String>,
    /// Display handle, when present.
    pub username: Option<String>,
    /// Message text.
    pub text: Option<String>,
    /// Message timestamp (doubles as the message ID).
    pub ts: Option<String>,
    /// Thread timestamp (if in a thread).
    pub thread_ts: Option<String>,
    /// Attached files.
    pub files: Option<Vec<SlackFile>>,
    /// Message subtype (e.g. "`bot_message`").
    pub subtype: Option<String>,
}

/// Slack file object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackFile {
    /// File ID.
    pub id: String,
    /// Filename.
    pub name: String,
    /// MIME type.
    pub mimetype: String,
    /// Private download URL.
    pub url_private: Option<String>,
}

/// Block-actions interaction payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackInteraction {
    /// Interaction type (e.g. "`block_actions`").
    #[serde(rename = "type")]
    pub interaction_type: String,
    /// User who pressed the button.
    pub user: SlackInteractionUser,
    /// Pressed actions.
    #[serde(default)]
    pub actions: Vec<SlackAction>,
}

/// User on an interaction payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackInteractionUser {
    /// User ID.
    pub id: String,
}

/// One pressed action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackAction {
    /// Action identifier carrying the confirmation payload.
    pub action_id: String,
    /// Button value.
    pub value: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosstalk_core::config::PluginKind;
    use crosstalk_core::types::{Button, ContentKind};

    fn plugin_with_token() -> SlackPlugin {
        SlackPlugin::new(PluginConfig::new(
            PluginKind::Slack,
            Credentials {
                token: Some("xoxb-test".to_string()),
                ..Credentials::default()
            },
        ))
    }

    fn message_event(user: &str, channel: &str, text: &str) -> SlackEvent {
        SlackEvent {
            event_type: "event_callback".to_string(),
            team_id: Some("T1".to_string()),
            event: Some(SlackMessageEvent {
                event_type: "message".to_string(),
                channel: Some(channel.to_string()),
                channel_type: Some("channel".to_string()),
                user: Some(user.to_string()),
                username: None,
                text: Some(text.to_string()),
                ts: Some("1700000000.000100".to_string()),
                thread_ts: None,
                files: None,
                subtype: None,
            }),
        }
    }

    #[test]
    fn test_initialize_requires_token() {
        let plugin = SlackPlugin::new(PluginConfig::new(PluginKind::Slack, Credentials::default()));
        let err = plugin.initialize().unwrap_err();
        assert_eq!(err.to_string(), "bot token is required");
        assert_eq!(plugin.state(), PluginState::Uninitialized);
    }

    #[test]
    fn test_initialize_transitions() {
        let plugin = plugin_with_token();
        plugin.initialize().unwrap();
        assert_eq!(plugin.state(), PluginState::Initialized);
    }

    #[test]
    fn test_normalize_basic_message() {
        let msg = normalize_event(&message_event("U1", "C1", "hi"), "B1").unwrap();
        assert_eq!(msg.channel, ChannelId::slack());
        assert_eq!(msg.chat_id, "C1");
        assert_eq!(msg.user.id, "U1");
        assert_eq!(msg.content.kind, ContentKind::Text);
        assert_eq!(msg.content.text, "hi");
        assert_eq!(msg.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_normalize_suppresses_self_echo() {
        assert!(normalize_event(&message_event("B1", "C1", "hi"), "B1").is_none());
    }

    #[test]
    fn test_normalize_suppresses_bot_messages() {
        let mut event = message_event("U1", "C1", "hi");
        event.event.as_mut().unwrap().subtype = Some("bot_message".to_string());
        assert!(normalize_event(&event, "B1").is_none());
    }

    #[test]
    fn test_normalize_requires_sender_and_channel() {
        let mut event = message_event("U1", "C1", "hi");
        event.event.as_mut().unwrap().user = None;
        assert!(normalize_event(&event, "B1").is_none());

        let mut event = message_event("U1", "C1", "hi");
        event.event.as_mut().unwrap().channel = None;
        assert!(normalize_event(&event, "B1").is_none());
    }

    #[test]
    fn test_normalize_classifies_files() {
        let mut event = message_event("U1", "C1", "see attached");
        event.event.as_mut().unwrap().files = Some(vec![SlackFile {
            id: "F1".to_string(),
            name: "pic.png".to_string(),
            mimetype: "image/png".to_string(),
            url_private: Some("https://files.slack.com/pic.png".to_string()),
        }]);
        let msg = normalize_event(&event, "B1").unwrap();
        assert_eq!(msg.content.kind, ContentKind::Photo);
        assert_eq!(msg.content.text, "see attached");
        assert_eq!(
            msg.content.attachments[0].media,
            MediaRef::Url("https://files.slack.com/pic.png".to_string())
        );
    }

    #[test]
    fn test_buttons_render_one_actions_block() {
        let message = OutgoingMessage::buttons(
            "Proceed?",
            vec![vec![
                Button::with_callback("Yes", "confirm:c1:allow"),
                Button::with_callback("No", "confirm:c1:deny"),
            ]],
        );
        let params = build_post_message("C1", "Proceed?", &message, true);
        let blocks = params.blocks.unwrap();

        let actions: Vec<&serde_json::Value> = blocks
            .iter()
            .filter(|b| b["type"] == "actions")
            .collect();
        assert_eq!(actions.len(), 1);
        let elements = actions[0]["elements"].as_array().unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0]["type"], "button");
        assert_eq!(elements[0]["action_id"], "confirm:c1:allow");
        assert_eq!(elements[1]["text"]["text"], "No");
    }

    #[test]
    fn test_oversize_message_splits_in_two() {
        let text = "x".repeat(41_000);
        let chunks = split_message(&text, SLACK_TEXT_LIMIT);
        assert_eq!(chunks.len(), 2);
        // Extras (blocks, attachments) only ride on the final chunk.
        let first = build_post_message("C1", &chunks[0], &OutgoingMessage::text(&text), false);
        let last = build_post_message("C1", &chunks[1], &OutgoingMessage::text(&text), true);
        assert!(first.blocks.is_none());
        assert!(last.blocks.is_none());
        assert_eq!(first.channel, "C1");
    }

    #[tokio::test]
    async fn test_send_requires_started() {
        let plugin = plugin_with_token();
        plugin.initialize().unwrap();
        let err = plugin
            .send_message("C1", &OutgoingMessage::text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::NotConnected));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_clears_users() {
        let plugin = plugin_with_token();
        plugin.initialize().unwrap();
        plugin.stop().await.unwrap();
        plugin.stop().await.unwrap();
        assert_eq!(plugin.state(), PluginState::Stopped);
        assert_eq!(plugin.active_user_count(), 0);
    }
}
