//! WhatsApp channel adapter using the Cloud API (Business Platform).
//!
//! Inbound traffic arrives over webhooks the host terminates; the host hands
//! parsed payloads to [`WhatsAppPlugin::handle_webhook`]. The Cloud API caps
//! interactive reply buttons at three per message, so larger button grids
//! fall back to a numbered text list.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::fmt::Write as _;
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

/// WhatsApp text body length limit.
pub const WHATSAPP_TEXT_LIMIT: usize = 4096;

/// Cloud API caps interactive reply buttons per message.
const MAX_REPLY_BUTTONS: usize = 3;
/// Cloud API caps reply-button titles at 20 characters.
const BUTTON_TITLE_LIMIT: usize = 20;

const GRAPH_API_BASE: &str = "https://graph.facebook.com/v18.0";

/// WhatsApp channel plugin.
pub struct WhatsAppPlugin {
    client: Client,
    config: PluginConfig,
    api_base: String,
    state: RwLock<WhatsAppState>,
}

#[derive(Default)]
struct WhatsAppState {
    lifecycle: Option<PluginState>,
    token: Option<ApiKey>,
    phone_number_id: Option<String>,
    display_phone_number: Option<String>,
    active_users: HashSet<String>,
    ctx: Option<PluginContext>,
}

impl WhatsAppState {
    fn lifecycle(&self) -> PluginState {
        self.lifecycle.unwrap_or(PluginState::Uninitialized)
    }
}

impl WhatsAppPlugin {
    /// Create a new WhatsApp plugin from its config.
    #[must_use]
    pub fn new(config: PluginConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            api_base: GRAPH_API_BASE.to_string(),
            state: RwLock::new(WhatsAppState::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, WhatsAppState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, WhatsAppState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn started_creds(&self) -> Result<(ApiKey, String), ChannelError> {
        let state = self.read();
        if state.lifecycle() != PluginState::Started {
            return Err(ChannelError::NotConnected);
        }
        match (&state.token, &state.phone_number_id) {
            (Some(token), Some(id)) => Ok((token.clone(), id.clone())),
            _ => Err(ChannelError::NotConnected),
        }
    }

    /// Probe credentials without touching plugin state.
    pub async fn test_connection(credentials: &Credentials) -> ConnectionProbe {
        let token = match Credentials::require(credentials.token.as_ref(), "access token") {
            Ok(token) => ApiKey::new(token),
            Err(err) => return ConnectionProbe::failed(err.to_string()),
        };
        let phone_number_id = match Credentials::require(
            credentials.phone_number_id.as_ref(),
            "phone number id",
        ) {
            Ok(id) => id.to_string(),
            Err(err) => return ConnectionProbe::failed(err.to_string()),
        };

        let client = Client::new();
        let url = format!("{GRAPH_API_BASE}/{phone_number_id}");
        match get_phone_number(&client, &token, &url).await {
            Ok(info) => ConnectionProbe::ok(
                info.display_phone_number.unwrap_or(phone_number_id),
            ),
            Err(err) => ConnectionProbe::failed(err.to_string()),
        }
    }

    /// Process one webhook payload from the host's HTTP endpoint.
    ///
    /// Delivery status updates are ignored. Button replies go to the
    /// confirmation router; everything else is normalized and dispatched.
    /// Dropped silently unless the plugin is `Started`.
    pub fn handle_webhook(&self, webhook: &WhatsAppWebhook) {
        let (ctx, own_number) = {
            let state = self.read();
            if state.lifecycle() != PluginState::Started {
                return;
            }
            match &state.ctx {
                Some(ctx) => (ctx.clone(), state.display_phone_number.clone()),
                None => return,
            }
        };

        for entry in &webhook.entry {
            for change in &entry.changes {
                for raw in &change.value.messages {
                    if let Some(reply) = raw
                        .interactive
                        .as_ref()
                        .and_then(|i| i.button_reply.as_ref())
                    {
                        if let Some(router) = &ctx.confirmations {
                            router.dispatch(&raw.from, &ChannelId::whatsapp(), &reply.id);
                        }
                        continue;
                    }

                    if let Some(message) =
                        normalize_message(raw, &change.value.contacts, own_number.as_deref())
                    {
                        self.write().active_users.insert(message.user.id.clone());
                        dispatch_incoming(Arc::clone(&ctx.sink), message);
                    }
                }
            }
        }
    }
}

async fn get_phone_number(
    client: &Client,
    token: &ApiKey,
    url: &str,
) -> Result<WhatsAppPhoneNumber, ChannelError> {
    let response = client
        .get(url)
        .bearer_auth(token.expose())
        .send()
        .await
        .map_err(|e| ChannelError::Network(e.to_string()))?;

    let status = response.status();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        let text = response.text().await.unwrap_or_default();
        return Err(ChannelError::AuthFailed(format!("{status}: {text}")));
    }
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(ChannelError::Network(format!("{status}: {text}")));
    }

    response
        .json()
        .await
        .map_err(|e| ChannelError::Network(e.to_string()))
}

async fn post_message(
    client: &Client,
    token: &ApiKey,
    url: &str,
    payload: &serde_json::Value,
) -> Result<WhatsAppSendResponse, ChannelError> {
    let response = client
        .post(url)
        .bearer_auth(token.expose())
        .json(payload)
        .send()
        .await
        .map_err(|e| ChannelError::Network(e.to_string()))?;

    let status = response.status();
    if status.as_u16() == 429 {
        return Err(ChannelError::RateLimited);
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        let text = response.text().await.unwrap_or_default();
        return Err(ChannelError::AuthFailed(format!("{status}: {text}")));
    }
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(ChannelError::DeliveryFailed(format!("{status}: {text}")));
    }

    response
        .json()
        .await
        .map_err(|e| ChannelError::Network(e.to_string()))
}

/// Convert a raw Cloud API message into a unified message.
///
/// Returns `None` for unsupported message types, or when the sender is the
/// business's own number. The Cloud API only delivers direct messages, so
/// the chat id is always the sender's number.
#[must_use]
pub fn normalize_message(
    raw: &WhatsAppMessage,
    contacts: &[WhatsAppContact],
    own_number: Option<&str>,
) -> Option<IncomingMessage> {
    // The webhook `from` is a bare wa_id while the Graph API returns the
    // business number formatted; compare digits only.
    if let Some(own) = own_number.map(phone_digits) {
        if !own.is_empty() && own == phone_digits(&raw.from) {
            return None;
        }
    }

    let content = classify_content(raw)?;

    let profile_name = contacts
        .iter()
        .find(|c| c.wa_id == raw.from)
        .and_then(|c| c.profile.as_ref())
        .map(|p| p.name.as_str());
    let display_name =
        UnifiedUser::resolve_display_name("WhatsApp", &raw.from, profile_name, None);

    // Webhook timestamps are epoch seconds as a string.
    let timestamp = raw
        .timestamp
        .as_deref()
        .and_then(|t| t.parse::<i64>().ok())
        .map_or_else(chrono::Utc::now, normalize_timestamp);

    Some(IncomingMessage {
        id: raw.id.clone(),
        channel: ChannelId::whatsapp(),
        chat_id: raw.from.clone(),
        user: UnifiedUser {
            id: raw.from.clone(),
            username: raw.from.clone(),
            display_name,
            avatar_url: None,
        },
        content,
        timestamp,
        reply_to: raw.context.as_ref().map(|c| c.id.clone()),
        raw: serde_json::to_value(raw).unwrap_or_default(),
    })
}

fn phone_digits(number: &str) -> String {
    number.chars().filter(char::is_ascii_digit).collect()
}

fn classify_content(raw: &WhatsAppMessage) -> Option<MessageContent> {
    if let Some(text) = &raw.text {
        return Some(MessageContent::text(text.body.clone()));
    }
    if let Some(image) = &raw.image {
        return Some(media_content(
            image.caption.clone(),
            AttachmentKind::Photo,
            &image.id,
            image.mime_type.as_deref().unwrap_or("image/jpeg"),
        ));
    }
    if let Some(document) = &raw.document {
        let mut content = media_content(
            document.caption.clone(),
            AttachmentKind::Document,
            &document.id,
            document.mime_type.as_deref().unwrap_or("application/octet-stream"),
        );
        content.attachments[0].file_name = document.filename.clone();
        return Some(content);
    }
    if let Some(audio) = &raw.audio {
        let kind = if audio.voice == Some(true) {
            AttachmentKind::Voice
        } else {
            AttachmentKind::Audio
        };
        return Some(media_content(
            None,
            kind,
            &audio.id,
            audio.mime_type.as_deref().unwrap_or("audio/ogg"),
        ));
    }
    None
}

fn media_content(
    caption: Option<String>,
    kind: AttachmentKind,
    media_id: &str,
    mime_type: &str,
) -> MessageContent {
    MessageContent::media(
        caption.unwrap_or_default(),
        vec![Attachment {
            kind,
            media: MediaRef::FileId(media_id.to_string()),
            mime_type: mime_type.to_string(),
            file_name: None,
        }],
    )
}

/// Build the Cloud API payload for one chunk of an outgoing message.
///
/// Extras (interactive buttons, media) attach only when `with_extras` is
/// set, i.e. on the final chunk of a split message.
#[must_use]
pub fn build_send_payload(
    to: &str,
    chunk: &str,
    message: &OutgoingMessage,
    with_extras: bool,
) -> serde_json::Value {
    if with_extras {
        match message.kind {
            OutgoingKind::Buttons => {
                let flat = message.flat_buttons();
                if (1..=MAX_REPLY_BUTTONS).contains(&flat.len()) {
                    let buttons: Vec<serde_json::Value> = flat
                        .iter()
                        .enumerate()
                        .map(|(i, b)| {
                            let id = b
                                .callback_id
                                .clone()
                                .unwrap_or_else(|| format!("button:{i}"));
                            let title: String =
                                b.text.chars().take(BUTTON_TITLE_LIMIT).collect();
                            json!({"type": "reply", "reply": {"id": id, "title": title}})
                        })
                        .collect();
                    return json!({
                        "messaging_product": "whatsapp",
                        "to": to,
                        "type": "interactive",
                        "interactive": {
                            "type": "button",
                            "body": {"text": chunk},
                            "action": {"buttons": buttons}
                        }
                    });
                }
                // Over the native cap: numbered text fallback.
                let mut text = chunk.to_string();
                for (i, button) in flat.iter().enumerate() {
                    let _ = write!(text, "\n{}. {}", i + 1, button.text);
                }
                return json!({
                    "messaging_product": "whatsapp",
                    "to": to,
                    "type": "text",
                    "text": {"body": text}
                });
            }
            OutgoingKind::Image => {
                if let Some(url) = &message.image_url {
                    let mut image = json!({"link": url});
                    if !chunk.is_empty() {
                        image["caption"] = json!(chunk);
                    }
                    return json!({
                        "messaging_product": "whatsapp",
                        "to": to,
                        "type": "image",
                        "image": image
                    });
                }
            }
            OutgoingKind::File => {
                if let Some(url) = &message.file_url {
                    let mut document = json!({"link": url});
                    if !chunk.is_empty() {
                        document["caption"] = json!(chunk);
                    }
                    if let Some(name) = &message.file_name {
                        document["filename"] = json!(name);
                    }
                    return json!({
                        "messaging_product": "whatsapp",
                        "to": to,
                        "type": "document",
                        "document": document
                    });
                }
            }
            OutgoingKind::Text => {}
        }
    }

    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "text",
        "text": {"body": chunk}
    })
}

#[async_trait]
impl ChannelPlugin for WhatsAppPlugin {
    fn id(&self) -> &str {
        "whatsapp"
    }

    fn label(&self) -> &str {
        "WhatsApp"
    }

    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            text: true,
            images: true,
            files: true,
            voice: true,
            buttons: true,
            editing: false,
            groups: false,
        }
    }

    fn state(&self) -> PluginState {
        self.read().lifecycle()
    }

    fn initialize(&self) -> Result<(), ChannelError> {
        let token =
            Credentials::require(self.config.credentials.token.as_ref(), "access token")?
                .to_string();
        let phone_number_id = Credentials::require(
            self.config.credentials.phone_number_id.as_ref(),
            "phone number id",
        )?
        .to_string();

        let mut state = self.write();
        state.token = Some(ApiKey::new(token));
        state.phone_number_id = Some(phone_number_id);
        state.lifecycle = Some(PluginState::Initialized);
        Ok(())
    }

    async fn start(&self, ctx: PluginContext) -> Result<(), ChannelError> {
        let (lifecycle, token, phone_number_id) = {
            let state = self.read();
            (
                state.lifecycle(),
                state.token.clone(),
                state.phone_number_id.clone(),
            )
        };
        if lifecycle != PluginState::Initialized {
            return Err(ChannelError::InvalidState {
                expected: PluginState::Initialized,
                actual: lifecycle,
            });
        }
        let (token, phone_number_id) = match (token, phone_number_id) {
            (Some(token), Some(id)) => (token, id),
            _ => return Err(ChannelError::NotConnected),
        };

        // Resolve the business number; also serves as the auth probe.
        let url = format!("{}/{phone_number_id}", self.api_base);
        let info = get_phone_number(&self.client, &token, &url).await?;

        {
            let mut state = self.write();
            state.display_phone_number = info.display_phone_number.clone();
            state.ctx = Some(ctx);
            state.lifecycle = Some(PluginState::Started);
        }

        tracing::info!(
            number = %info.display_phone_number.as_deref().unwrap_or(&phone_number_id),
            "whatsapp connected"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        let mut state = self.write();
        state.active_users.clear();
        state.ctx = None;
        state.display_phone_number = None;
        state.lifecycle = Some(PluginState::Stopped);
        Ok(())
    }

    async fn send_message(
        &self,
        chat_id: &str,
        message: &OutgoingMessage,
    ) -> Result<String, ChannelError> {
        let (token, phone_number_id) = self.started_creds()?;
        let url = format!("{}/{phone_number_id}/messages", self.api_base);

        let chunks = split_message(&message.text, WHATSAPP_TEXT_LIMIT);
        let last = chunks.len().saturating_sub(1);
        let mut delivery_id = String::new();

        for (i, chunk) in chunks.iter().enumerate() {
            let payload = build_send_payload(chat_id, chunk, message, i == last);
            let response = post_message(&self.client, &token, &url, &payload).await?;
            if let Some(sent) = response.messages.last() {
                delivery_id.clone_from(&sent.id);
            }
        }

        Ok(delivery_id)
    }

    async fn edit_message(
        &self,
        _chat_id: &str,
        message_id: &str,
        _message: &OutgoingMessage,
    ) -> Result<(), ChannelError> {
        self.started_creds()?;
        // The Cloud API has no message-edit endpoint.
        tracing::debug!(message_id = %message_id, "whatsapp does not support editing");
        Ok(())
    }

    fn active_user_count(&self) -> usize {
        self.read().active_users.len()
    }
}

// WhatsApp Cloud API webhook and request types

/// Top-level webhook payload.
#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppWebhook {
    /// Webhook entries.
    #[serde(default)]
    pub entry: Vec<WhatsAppEntry>,
}

/// One webhook entry.
#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppEntry {
    /// Changes in this entry.
    #[serde(default)]
    pub changes: Vec<WhatsAppChange>,
}

/// One change notification.
#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppChange {
    /// Change payload.
    pub value: WhatsAppChangeValue,
}

/// The payload of a change notification.
#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppChangeValue {
    /// Inbound messages.
    #[serde(default)]
    pub messages: Vec<WhatsAppMessage>,
    /// Sender contact cards.
    #[serde(default)]
    pub contacts: Vec<WhatsAppContact>,
    /// Delivery status updates; carried so hosts can log them, ignored here.
    #[serde(default)]
    pub statuses: Vec<serde_json::Value>,
}

/// A sender contact card.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppContact {
    /// WhatsApp account id (phone number).
    pub wa_id: String,
    /// Profile details.
    pub profile: Option<WhatsAppProfile>,
}

/// Contact profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppProfile {
    /// Profile display name.
    pub name: String,
}

/// One inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppMessage {
    /// Message ID.
    pub id: String,
    /// Sender phone number.
    pub from: String,
    /// Epoch-seconds timestamp as a string.
    pub timestamp: Option<String>,
    /// Message type tag.
    #[serde(rename = "type")]
    pub message_type: Option<String>,
    /// Text payload.
    pub text: Option<WhatsAppText>,
    /// Image payload.
    pub image: Option<WhatsAppMedia>,
    /// Document payload.
    pub document: Option<WhatsAppDocument>,
    /// Audio payload.
    pub audio: Option<WhatsAppAudio>,
    /// Interactive reply payload.
    pub interactive: Option<WhatsAppInteractive>,
    /// Reply context.
    pub context: Option<WhatsAppContext>,
}

/// Text payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppText {
    /// Message body.
    pub body: String,
}

/// Image payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppMedia {
    /// Media ID.
    pub id: String,
    /// MIME type.
    pub mime_type: Option<String>,
    /// Caption.
    pub caption: Option<String>,
}

/// Document payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppDocument {
    /// Media ID.
    pub id: String,
    /// MIME type.
    pub mime_type: Option<String>,
    /// Caption.
    pub caption: Option<String>,
    /// Original file name.
    pub filename: Option<String>,
}

/// Audio payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppAudio {
    /// Media ID.
    pub id: String,
    /// MIME type.
    pub mime_type: Option<String>,
    /// Whether this is a voice note.
    pub voice: Option<bool>,
}

/// Interactive reply payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppInteractive {
    /// Button reply, when the user tapped a reply button.
    pub button_reply: Option<WhatsAppButtonReply>,
}

/// A tapped reply button.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppButtonReply {
    /// The button's callback id.
    pub id: String,
    /// The button's title.
    pub title: String,
}

/// Reply context on an inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppContext {
    /// ID of the message being replied to.
    pub id: String,
}

/// Phone number lookup response.
#[derive(Debug, Deserialize)]
struct WhatsAppPhoneNumber {
    display_phone_number: Option<String>,
    #[allow(dead_code)]
    verified_name: Option<String>,
}

/// Send response.
#[derive(Debug, Deserialize)]
struct WhatsAppSendResponse {
    #[serde(default)]
    messages: Vec<WhatsAppSentMessage>,
}

#[derive(Debug, Deserialize)]
struct WhatsAppSentMessage {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosstalk_core::config::PluginKind;
    use crosstalk_core::types::{Button, ContentKind};

    fn text_message(from: &str, body: &str) -> WhatsAppMessage {
        WhatsAppMessage {
            id: "wamid.1".to_string(),
            from: from.to_string(),
            timestamp: Some("1700000000".to_string()),
            message_type: Some("text".to_string()),
            text: Some(WhatsAppText {
                body: body.to_string(),
            }),
            image: None,
            document: None,
            audio: None,
            interactive: None,
            context: None,
        }
    }

    fn contact(wa_id: &str, name: &str) -> WhatsAppContact {
        WhatsAppContact {
            wa_id: wa_id.to_string(),
            profile: Some(WhatsAppProfile {
                name: name.to_string(),
            }),
        }
    }

    #[test]
    fn test_initialize_requires_token_and_phone_number_id() {
        let plugin = WhatsAppPlugin::new(PluginConfig::new(
            PluginKind::WhatsApp,
            Credentials::default(),
        ));
        let err = plugin.initialize().unwrap_err();
        assert_eq!(err.to_string(), "access token is required");

        let plugin = WhatsAppPlugin::new(PluginConfig::new(
            PluginKind::WhatsApp,
            Credentials {
                token: Some("EAAG...".to_string()),
                ..Credentials::default()
            },
        ));
        let err = plugin.initialize().unwrap_err();
        assert_eq!(err.to_string(), "phone number id is required");
    }

    #[test]
    fn test_normalize_text_with_contact_name() {
        let msg = normalize_message(
            &text_message("15551234", "hola"),
            &[contact("15551234", "Ana")],
            Some("15550000"),
        )
        .unwrap();
        assert_eq!(msg.chat_id, "15551234");
        assert_eq!(msg.user.display_name, "Ana");
        assert_eq!(msg.content.kind, ContentKind::Text);
        assert_eq!(msg.content.text, "hola");
        assert_eq!(msg.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_normalize_synthesizes_name_without_contact() {
        let msg = normalize_message(&text_message("15551234", "hola"), &[], None).unwrap();
        assert_eq!(msg.user.display_name, "WhatsApp User 15551234");
    }

    #[test]
    fn test_normalize_suppresses_own_number() {
        assert!(
            normalize_message(&text_message("15550000", "echo"), &[], Some("15550000")).is_none()
        );
    }

    #[test]
    fn test_normalize_suppresses_formatted_own_number() {
        // The Graph API formats the business number; the wa_id is digits only.
        assert!(normalize_message(
            &text_message("15550000000", "echo"),
            &[],
            Some("+1 555-000-0000"),
        )
        .is_none());
        assert!(
            normalize_message(&text_message("15551234", "hi"), &[], Some("+1 555-000-0000"))
                .is_some()
        );
    }

    #[test]
    fn test_normalize_voice_note() {
        let mut raw = text_message("15551234", "");
        raw.text = None;
        raw.audio = Some(WhatsAppAudio {
            id: "media-1".to_string(),
            mime_type: Some("audio/ogg".to_string()),
            voice: Some(true),
        });
        let msg = normalize_message(&raw, &[], None).unwrap();
        assert_eq!(msg.content.kind, ContentKind::Voice);
        assert_eq!(
            msg.content.attachments[0].media,
            MediaRef::FileId("media-1".to_string())
        );
    }

    #[test]
    fn test_normalize_drops_unsupported_types() {
        let mut raw = text_message("15551234", "");
        raw.text = None;
        raw.message_type = Some("sticker".to_string());
        assert!(normalize_message(&raw, &[], None).is_none());
    }

    #[test]
    fn test_payload_small_grid_uses_reply_buttons() {
        let message = OutgoingMessage::buttons(
            "Proceed?",
            vec![vec![
                Button::with_callback("Yes", "confirm:c1:allow"),
                Button::new("No"),
            ]],
        );
        let payload = build_send_payload("15551234", "Proceed?", &message, true);
        assert_eq!(payload["type"], "interactive");
        let buttons = payload["interactive"]["action"]["buttons"]
            .as_array()
            .unwrap();
        assert_eq!(buttons.len(), 2);
        assert_eq!(buttons[0]["reply"]["id"], "confirm:c1:allow");
        assert_eq!(buttons[1]["reply"]["id"], "button:1");
    }

    #[test]
    fn test_payload_large_grid_falls_back_to_numbered_text() {
        let message = OutgoingMessage::buttons(
            "Pick",
            vec![vec![
                Button::new("A"),
                Button::new("B"),
                Button::new("C"),
                Button::new("D"),
            ]],
        );
        let payload = build_send_payload("15551234", "Pick", &message, true);
        assert_eq!(payload["type"], "text");
        let body = payload["text"]["body"].as_str().unwrap();
        assert!(body.ends_with("1. A\n2. B\n3. C\n4. D"));
    }

    #[test]
    fn test_payload_truncates_long_button_titles() {
        let message = OutgoingMessage::buttons(
            "Go?",
            vec![vec![Button::new("an extremely verbose button label")]],
        );
        let payload = build_send_payload("15551234", "Go?", &message, true);
        let title = payload["interactive"]["action"]["buttons"][0]["reply"]["title"]
            .as_str()
            .unwrap();
        assert_eq!(title.chars().count(), BUTTON_TITLE_LIMIT);
    }

    #[test]
    fn test_payload_image_carries_link_and_caption() {
        let message = OutgoingMessage::image("look", "https://example.com/cat.png");
        let payload = build_send_payload("15551234", "look", &message, true);
        assert_eq!(payload["type"], "image");
        assert_eq!(payload["image"]["link"], "https://example.com/cat.png");
        assert_eq!(payload["image"]["caption"], "look");
    }

    #[test]
    fn test_oversize_body_prefers_newline_cuts() {
        let text = format!("{}\n{}", "a".repeat(3000), "b".repeat(3000));
        let chunks = split_message(&text, WHATSAPP_TEXT_LIMIT);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 3000);
        assert_eq!(chunks.join("\n"), text);
    }

    #[test]
    fn test_payload_non_final_chunk_is_plain_text() {
        let message =
            OutgoingMessage::buttons("long", vec![vec![Button::new("Yes")]]);
        let payload = build_send_payload("15551234", "first part", &message, false);
        assert_eq!(payload["type"], "text");
        assert_eq!(payload["text"]["body"], "first part");
    }

    #[tokio::test]
    async fn test_send_requires_started() {
        let plugin = WhatsAppPlugin::new(PluginConfig::new(
            PluginKind::WhatsApp,
            Credentials {
                token: Some("EAAG...".to_string()),
                phone_number_id: Some("1234567890".to_string()),
                ..Credentials::default()
            },
        ));
        plugin.initialize().unwrap();
        let err = plugin
            .send_message("15551234", &OutgoingMessage::text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::NotConnected));
    }
}
