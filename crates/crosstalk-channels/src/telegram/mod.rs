//! Telegram channel adapter using the Bot API.
//!
//! Inbound messages arrive over a `getUpdates` long-poll loop spawned at
//! `start`. Button presses arrive as callback queries, which are
//! acknowledged via `answerCallbackQuery` before the decision is routed.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

use async_trait::async_trait;

use crosstalk_core::config::{Credentials, PluginConfig};
use crosstalk_core::secrets::ApiKey;
use crosstalk_core::types::{
    Attachment, AttachmentKind, Button, ChannelId, ConnectionProbe, IncomingMessage, MediaRef,
    MessageContent, OutgoingKind, OutgoingMessage, UnifiedUser, normalize_timestamp,
};

use crate::chunk::split_message;
use crate::traits::{
    ChannelCapabilities, ChannelError, ChannelPlugin, PluginContext, PluginState,
    dispatch_incoming,
};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram message length limit.
pub const TELEGRAM_TEXT_LIMIT: usize = 4096;

const POLL_TIMEOUT_SECS: u32 = 30;
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram channel plugin.
pub struct TelegramPlugin {
    client: Client,
    config: PluginConfig,
    state: Arc<RwLock<TelegramState>>,
    running: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct TelegramState {
    lifecycle: Option<PluginState>,
    token: Option<ApiKey>,
    bot_id: Option<i64>,
    active_users: HashSet<String>,
    ctx: Option<PluginContext>,
}

impl TelegramState {
    fn lifecycle(&self) -> PluginState {
        self.lifecycle.unwrap_or(PluginState::Uninitialized)
    }
}

impl TelegramPlugin {
    /// Create a new Telegram plugin from its config.
    #[must_use]
    pub fn new(config: PluginConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            state: Arc::new(RwLock::new(TelegramState::default())),
            running: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, TelegramState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TelegramState> {
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
        match call_api::<TelegramUser>(&client, &token, "getMe", None::<&()>).await {
            Ok(me) => ConnectionProbe::ok(me.username.unwrap_or(me.first_name)),
            Err(err) => ConnectionProbe::failed(err.to_string()),
        }
    }
}

/// Call a Telegram Bot API method.
async fn call_api<T: for<'de> Deserialize<'de>>(
    client: &Client,
    token: &ApiKey,
    method: &str,
    params: Option<&impl Serialize>,
) -> Result<T, ChannelError> {
    let url = format!("{TELEGRAM_API_BASE}/bot{}/{method}", token.expose());

    let response = match params {
        Some(p) => client.post(&url).json(p).send().await,
        None => client.get(&url).send().await,
    }
    .map_err(|e| ChannelError::Network(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ChannelError::RateLimited);
        }
        let text = response.text().await.unwrap_or_default();
        return Err(ChannelError::Network(format!("{status}: {text}")));
    }

    let result: TelegramResponse<T> = response
        .json()
        .await
        .map_err(|e| ChannelError::Network(e.to_string()))?;

    if result.ok {
        result
            .result
            .ok_or_else(|| ChannelError::Network("empty response".to_string()))
    } else {
        Err(ChannelError::Network(
            result
                .description
                .unwrap_or_else(|| "unknown error".to_string()),
        ))
    }
}

/// Convert a raw Telegram update into a unified message.
///
/// Returns `None` for updates without a message, without a sender, or sent
/// by the bot itself.
#[must_use]
pub fn normalize_update(raw: &TelegramUpdate, bot_id: i64) -> Option<IncomingMessage> {
    let message = raw
        .message
        .as_ref()
        .or(raw.edited_message.as_ref())
        .or(raw.channel_post.as_ref())?;

    let from = message.from.as_ref()?;
    if bot_id != 0 && from.id == bot_id {
        return None;
    }

    // chat.id is the group identifier in groups and equals the sender in
    // private chats, so it is always the right conversation surface.
    let chat_id = message.chat.id.to_string();

    let content = classify_content(message);
    let display_name = {
        let full_name = match &from.last_name {
            Some(last) => format!("{} {last}", from.first_name),
            None => from.first_name.clone(),
        };
        UnifiedUser::resolve_display_name(
            "Telegram",
            &from.id.to_string(),
            Some(&full_name),
            from.username.as_deref(),
        )
    };

    Some(IncomingMessage {
        id: message.message_id.to_string(),
        channel: ChannelId::telegram(),
        chat_id,
        user: UnifiedUser {
            id: from.id.to_string(),
            username: from
                .username
                .clone()
                .unwrap_or_else(|| from.id.to_string()),
            display_name,
            avatar_url: None,
        },
        content,
        timestamp: normalize_timestamp(message.date),
        reply_to: message
            .reply_to_message
            .as_ref()
            .map(|m| m.message_id.to_string()),
        raw: serde_json::to_value(raw).unwrap_or_default(),
    })
}

fn classify_content(message: &TelegramMessage) -> MessageContent {
    if let Some(text) = &message.text {
        return MessageContent::text(text.clone());
    }

    let caption = message.caption.clone().unwrap_or_default();

    if let Some(photos) = &message.photo {
        // Telegram sends every thumbnail size; the last entry is largest.
        if let Some(largest) = photos.last() {
            return MessageContent::media(
                caption,
                vec![Attachment {
                    kind: AttachmentKind::Photo,
                    media: MediaRef::FileId(largest.file_id.clone()),
                    mime_type: "image/jpeg".to_string(),
                    file_name: None,
                }],
            );
        }
    }

    if let Some(doc) = &message.document {
        return MessageContent::media(
            caption,
            vec![Attachment {
                kind: AttachmentKind::Document,
                media: MediaRef::FileId(doc.file_id.clone()),
                mime_type: doc
                    .mime_type
                    .clone()
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                file_name: doc.file_name.clone(),
            }],
        );
    }

    if let Some(voice) = &message.voice {
        return MessageContent::media(
            caption,
            vec![Attachment {
                kind: AttachmentKind::Voice,
                media: MediaRef::FileId(voice.file_id.clone()),
                mime_type: voice
                    .mime_type
                    .clone()
                    .unwrap_or_else(|| "audio/ogg".to_string()),
                file_name: None,
            }],
        );
    }

    if let Some(audio) = &message.audio {
        return MessageContent::media(
            caption,
            vec![Attachment {
                kind: AttachmentKind::Audio,
                media: MediaRef::FileId(audio.file_id.clone()),
                mime_type: audio
                    .mime_type
                    .clone()
                    .unwrap_or_else(|| "audio/mpeg".to_string()),
                file_name: None,
            }],
        );
    }

    MessageContent::text("Unsupported message type")
}

/// Build an inline keyboard preserving the row-major button grid.
#[must_use]
pub fn inline_keyboard(buttons: &[Vec<Button>]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: buttons
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(i, button)| InlineKeyboardButton {
                        text: button.text.clone(),
                        callback_data: button
                            .callback_id
                            .clone()
                            .unwrap_or_else(|| format!("button:{i}")),
                    })
                    .collect()
            })
            .collect(),
    }
}

async fn run_poll_loop(
    client: Client,
    token: ApiKey,
    state: Arc<RwLock<TelegramState>>,
    ctx: PluginContext,
    running: Arc<AtomicBool>,
) {
    let mut offset: Option<i64> = None;

    while running.load(Ordering::SeqCst) {
        let params = GetUpdatesParams {
            offset,
            timeout: POLL_TIMEOUT_SECS,
        };
        match call_api::<Vec<TelegramUpdate>>(&client, &token, "getUpdates", Some(&params)).await {
            Ok(updates) => {
                for update in updates {
                    offset = Some(update.update_id + 1);
                    handle_update(&client, &token, &state, &ctx, &update).await;
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "telegram poll failed");
                tokio::time::sleep(POLL_RETRY_DELAY).await;
            }
        }
    }
}

async fn handle_update(
    client: &Client,
    token: &ApiKey,
    state: &Arc<RwLock<TelegramState>>,
    ctx: &PluginContext,
    update: &TelegramUpdate,
) {
    if let Some(query) = &update.callback_query {
        // Ack first: Telegram times the callback out otherwise. The handler
        // runs on its own task after.
        let ack = AnswerCallbackQueryParams {
            callback_query_id: query.id.clone(),
        };
        if let Err(err) = call_api::<bool>(client, token, "answerCallbackQuery", Some(&ack)).await {
            tracing::warn!(error = %err, "callback ack failed");
        }
        if let (Some(router), Some(data)) = (ctx.confirmations.as_ref(), query.data.as_deref()) {
            router.dispatch(&query.from.id.to_string(), &ChannelId::telegram(), data);
        }
        return;
    }

    let bot_id = state
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .bot_id
        .unwrap_or_default();

    if let Some(message) = normalize_update(update, bot_id) {
        state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .active_users
            .insert(message.user.id.clone());
        dispatch_incoming(Arc::clone(&ctx.sink), message);
    }
}

#[async_trait]
impl ChannelPlugin for TelegramPlugin {
    fn id(&self) -> &str {
        "telegram"
    }

    fn label(&self) -> &str {
        "Telegram"
    }

    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            text: true,
            images: true,
            files: true,
            voice: true,
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

        let me: TelegramUser = self
            .call_me(&token)
            .await
            .map_err(|e| ChannelError::AuthFailed(e.to_string()))?;

        {
            let mut state = self.write();
            state.bot_id = Some(me.id);
            state.ctx = Some(ctx.clone());
            state.lifecycle = Some(PluginState::Started);
        }

        self.running.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(run_poll_loop(
            self.client.clone(),
            token,
            Arc::clone(&self.state),
            ctx,
            Arc::clone(&self.running),
        ));
        *self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);

        tracing::info!(bot = %me.first_name, "telegram connected");
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
        state.bot_id = None;
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

        match message.kind {
            OutgoingKind::Image | OutgoingKind::File => {
                let (method, url) = if message.kind == OutgoingKind::Image {
                    ("sendPhoto", message.image_url.as_deref())
                } else {
                    ("sendDocument", message.file_url.as_deref())
                };
                let url = url.ok_or_else(|| {
                    ChannelError::DeliveryFailed("media message without URL".to_string())
                })?;
                let field = if message.kind == OutgoingKind::Image {
                    "photo"
                } else {
                    "document"
                };
                let params = serde_json::json!({
                    "chat_id": chat_id,
                    field: url,
                    "caption": message.text,
                    "reply_to_message_id": message.reply_to.as_deref().and_then(|id| id.parse::<i64>().ok()),
                });
                let result: TelegramMessage = call_api(&self.client, &token, method, Some(&params))
                    .await
                    .map_err(|e| ChannelError::DeliveryFailed(e.to_string()))?;
                Ok(result.message_id.to_string())
            }
            OutgoingKind::Text | OutgoingKind::Buttons => {
                let chunks = split_message(&message.text, TELEGRAM_TEXT_LIMIT);
                let last = chunks.len() - 1;
                let mut delivery_id = String::new();

                for (i, chunk) in chunks.iter().enumerate() {
                    let params = SendMessageParams {
                        chat_id: chat_id.to_string(),
                        text: chunk.clone(),
                        reply_to_message_id: message
                            .reply_to
                            .as_deref()
                            .and_then(|id| id.parse().ok()),
                        reply_markup: (i == last && message.kind == OutgoingKind::Buttons)
                            .then(|| inline_keyboard(&message.buttons)),
                    };
                    let result: TelegramMessage =
                        call_api(&self.client, &token, "sendMessage", Some(&params))
                            .await
                            .map_err(|e| ChannelError::DeliveryFailed(e.to_string()))?;
                    delivery_id = result.message_id.to_string();
                }

                Ok(delivery_id)
            }
        }
    }

    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: &str,
        message: &OutgoingMessage,
    ) -> Result<(), ChannelError> {
        let token = self.started_token()?;

        let params = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id.parse::<i64>().unwrap_or_default(),
            "text": message.text,
        });
        if let Err(err) =
            call_api::<TelegramMessage>(&self.client, &token, "editMessageText", Some(&params))
                .await
        {
            tracing::warn!(channel = "telegram", error = %err, "edit failed");
        }
        Ok(())
    }

    fn active_user_count(&self) -> usize {
        self.read().active_users.len()
    }
}

impl TelegramPlugin {
    async fn call_me(&self, token: &ApiKey) -> Result<TelegramUser, ChannelError> {
        call_api(&self.client, token, "getMe", None::<&()>).await
    }
}

// Telegram API types

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Telegram user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    /// User ID.
    pub id: i64,
    /// Whether the user is a bot.
    pub is_bot: bool,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: Option<String>,
    /// Username.
    pub username: Option<String>,
}

/// One update from `getUpdates`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    /// Update sequence number.
    pub update_id: i64,
    /// New message.
    pub message: Option<TelegramMessage>,
    /// Edited message.
    pub edited_message: Option<TelegramMessage>,
    /// Channel post.
    pub channel_post: Option<TelegramMessage>,
    /// Button callback.
    pub callback_query: Option<TelegramCallbackQuery>,
}

/// Telegram message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    /// Message ID within the chat.
    pub message_id: i64,
    /// Unix timestamp (seconds).
    pub date: i64,
    /// Chat the message belongs to.
    pub chat: TelegramChat,
    /// Sender.
    pub from: Option<TelegramUser>,
    /// Text body.
    pub text: Option<String>,
    /// Media caption.
    pub caption: Option<String>,
    /// Replied-to message.
    pub reply_to_message: Option<Box<TelegramMessage>>,
    /// Photo sizes (smallest to largest).
    pub photo: Option<Vec<TelegramPhotoSize>>,
    /// Document attachment.
    pub document: Option<TelegramDocument>,
    /// Voice note.
    pub voice: Option<TelegramVoice>,
    /// Audio file.
    pub audio: Option<TelegramAudio>,
}

/// Telegram chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    /// Chat ID (group id for groups, user id for private chats).
    pub id: i64,
    /// Chat type ("private", "group", "supergroup", "channel").
    #[serde(rename = "type")]
    pub chat_type: String,
    /// Group/channel title.
    pub title: Option<String>,
}

/// One photo size variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramPhotoSize {
    /// File ID.
    pub file_id: String,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

/// Document attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramDocument {
    /// File ID.
    pub file_id: String,
    /// Original filename.
    pub file_name: Option<String>,
    /// MIME type.
    pub mime_type: Option<String>,
}

/// Voice note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramVoice {
    /// File ID.
    pub file_id: String,
    /// Duration in seconds.
    pub duration: i32,
    /// MIME type.
    pub mime_type: Option<String>,
}

/// Audio file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramAudio {
    /// File ID.
    pub file_id: String,
    /// Duration in seconds.
    pub duration: i32,
    /// MIME type.
    pub mime_type: Option<String>,
}

/// Button callback query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramCallbackQuery {
    /// Query ID, used for the ack.
    pub id: String,
    /// User who pressed the button.
    pub from: TelegramUser,
    /// Callback payload (the confirmation action id).
    pub data: Option<String>,
    /// Message carrying the keyboard.
    pub message: Option<TelegramMessage>,
}

/// Inline keyboard markup.
#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardMarkup {
    /// Button rows.
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

/// One inline keyboard button.
#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardButton {
    /// Label.
    pub text: String,
    /// Payload delivered in the callback query.
    pub callback_data: String,
}

#[derive(Debug, Serialize)]
struct GetUpdatesParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u32,
}

#[derive(Debug, Serialize)]
struct SendMessageParams {
    chat_id: String,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to_message_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup>,
}

#[derive(Debug, Serialize)]
struct AnswerCallbackQueryParams {
    callback_query_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosstalk_core::config::PluginKind;
    use crosstalk_core::types::ContentKind;

    fn user(id: i64) -> TelegramUser {
        TelegramUser {
            id,
            is_bot: false,
            first_name: format!("User{id}"),
            last_name: None,
            username: None,
        }
    }

    fn update(from: i64, chat: i64, text: &str) -> TelegramUpdate {
        TelegramUpdate {
            update_id: 1,
            message: Some(TelegramMessage {
                message_id: 42,
                date: 1_700_000_000,
                chat: TelegramChat {
                    id: chat,
                    chat_type: if chat == from { "private" } else { "group" }.to_string(),
                    title: None,
                },
                from: Some(user(from)),
                text: Some(text.to_string()),
                caption: None,
                reply_to_message: None,
                photo: None,
                document: None,
                voice: None,
                audio: None,
            }),
            edited_message: None,
            channel_post: None,
            callback_query: None,
        }
    }

    #[test]
    fn test_initialize_requires_token() {
        let plugin =
            TelegramPlugin::new(PluginConfig::new(PluginKind::Telegram, Credentials::default()));
        let err = plugin.initialize().unwrap_err();
        assert_eq!(err.to_string(), "bot token is required");
    }

    #[test]
    fn test_normalize_group_prefers_group_id() {
        // Group chat: the chat id is the group, not the sender.
        let msg = normalize_update(&update(7, -100_123, "hello"), 99).unwrap();
        assert_eq!(msg.chat_id, "-100123");
        assert_eq!(msg.user.id, "7");
    }

    #[test]
    fn test_normalize_suppresses_self_echo() {
        assert!(normalize_update(&update(99, 99, "hi"), 99).is_none());
    }

    #[test]
    fn test_normalize_voice_note() {
        let mut raw = update(7, 7, "");
        let message = raw.message.as_mut().unwrap();
        message.text = None;
        message.voice = Some(TelegramVoice {
            file_id: "V1".to_string(),
            duration: 3,
            mime_type: None,
        });
        let msg = normalize_update(&raw, 99).unwrap();
        assert_eq!(msg.content.kind, ContentKind::Voice);
        assert_eq!(
            msg.content.attachments[0].media,
            MediaRef::FileId("V1".to_string())
        );
        assert_eq!(msg.content.attachments[0].mime_type, "audio/ogg");
    }

    #[test]
    fn test_normalize_unrecognized_shape_falls_back() {
        let mut raw = update(7, 7, "");
        raw.message.as_mut().unwrap().text = None;
        let msg = normalize_update(&raw, 99).unwrap();
        assert_eq!(msg.content.kind, ContentKind::Text);
        assert_eq!(msg.content.text, "Unsupported message type");
    }

    #[test]
    fn test_display_name_falls_back_to_synthesized() {
        let mut raw = update(7, 7, "hi");
        {
            let from = raw.message.as_mut().unwrap().from.as_mut().unwrap();
            from.first_name = String::new();
            from.username = None;
        }
        let msg = normalize_update(&raw, 99).unwrap();
        assert_eq!(msg.user.display_name, "Telegram User 7");
    }

    #[test]
    fn test_inline_keyboard_preserves_rows() {
        let markup = inline_keyboard(&[
            vec![
                Button::with_callback("Yes", "confirm:c1:allow"),
                Button::with_callback("No", "confirm:c1:deny"),
            ],
            vec![Button::new("Later")],
        ]);
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[0].len(), 2);
        assert_eq!(markup.inline_keyboard[0][0].callback_data, "confirm:c1:allow");
        assert_eq!(markup.inline_keyboard[1][0].callback_data, "button:0");
    }

    #[tokio::test]
    async fn test_send_requires_started() {
        let plugin = TelegramPlugin::new(PluginConfig::new(
            PluginKind::Telegram,
            Credentials {
                token: Some("123:abc".to_string()),
                ..Credentials::default()
            },
        ));
        plugin.initialize().unwrap();
        let err = plugin
            .send_message("1", &OutgoingMessage::text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::NotConnected));
    }
}
