//! Unified message model shared by every channel adapter.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a messaging channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl ChannelId {
    /// Create a new channel ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Slack channel.
    #[must_use]
    pub fn slack() -> Self {
        Self("slack".to_string())
    }

    /// Telegram channel.
    #[must_use]
    pub fn telegram() -> Self {
        Self("telegram".to_string())
    }

    /// Signal channel.
    #[must_use]
    pub fn signal() -> Self {
        Self("signal".to_string())
    }

    /// WhatsApp channel.
    #[must_use]
    pub fn whatsapp() -> Self {
        Self("whatsapp".to_string())
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ChannelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A user as seen by a channel.
///
/// `id` is the platform-native stable identifier (phone number, user id).
/// It is unique only within one platform; callers must key by
/// `(channel, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedUser {
    /// Platform-native stable identifier.
    pub id: String,
    /// Handle or phone number.
    pub username: String,
    /// Human-readable display name.
    pub display_name: String,
    /// Avatar URL, if the platform provides one.
    pub avatar_url: Option<String>,
}

impl UnifiedUser {
    /// Resolve the display-name fallback chain: display name, then handle,
    /// then a synthesized `"{Platform} User {id}"`.
    #[must_use]
    pub fn resolve_display_name(
        platform_label: &str,
        id: &str,
        display_name: Option<&str>,
        handle: Option<&str>,
    ) -> String {
        display_name
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string)
            .or_else(|| {
                handle
                    .filter(|h| !h.trim().is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("{platform_label} User {id}"))
    }
}

/// Where an attachment's bytes live.
///
/// Platforms either hand out direct-download URLs or opaque media keys that
/// must be fetched through their own API; exactly one applies per attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaRef {
    /// Opaque platform media key.
    FileId(String),
    /// Direct-download URL.
    Url(String),
}

/// Type of attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    /// Photo/image.
    Photo,
    /// Document/file.
    Document,
    /// Audio file.
    Audio,
    /// Voice note.
    Voice,
}

impl AttachmentKind {
    /// Matching content kind for a message led by this attachment.
    #[must_use]
    pub const fn content_kind(self) -> ContentKind {
        match self {
            Self::Photo => ContentKind::Photo,
            Self::Document => ContentKind::Document,
            Self::Audio => ContentKind::Audio,
            Self::Voice => ContentKind::Voice,
        }
    }
}

/// An attachment on an incoming message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Attachment type.
    pub kind: AttachmentKind,
    /// Media key or download URL.
    pub media: MediaRef,
    /// MIME type.
    pub mime_type: String,
    /// File name, when the platform supplies one.
    pub file_name: Option<String>,
}

/// Classified content of an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Plain text.
    Text,
    /// Photo with optional caption.
    Photo,
    /// Document with optional caption.
    Document,
    /// Audio file.
    Audio,
    /// Voice note.
    Voice,
    /// Interactive buttons.
    Buttons,
    /// Image by URL.
    Image,
}

/// Content of an incoming message.
///
/// Invariant: when `attachments` is non-empty, `kind` equals the content
/// kind of the first attachment. `text` may be empty but is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    /// Content classification.
    pub kind: ContentKind,
    /// Text body or caption (possibly empty).
    pub text: String,
    /// Attachments, if any.
    pub attachments: Vec<Attachment>,
}

impl MessageContent {
    /// Plain-text content.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::Text,
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    /// Media content; the kind is derived from the first attachment.
    ///
    /// Falls back to [`ContentKind::Text`] when `attachments` is empty.
    #[must_use]
    pub fn media(caption: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        let kind = attachments
            .first()
            .map_or(ContentKind::Text, |a| a.kind.content_kind());
        Self {
            kind,
            text: caption.into(),
            attachments,
        }
    }
}

/// A normalized inbound message from any channel.
///
/// Built once per platform event and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Platform-assigned message ID.
    pub id: String,
    /// Channel this message came from.
    pub channel: ChannelId,
    /// Conversation surface: the group identifier for group-origin messages,
    /// otherwise the sender/channel identifier. Never the individual sender
    /// id when a group id is present.
    pub chat_id: String,
    /// Sender.
    pub user: UnifiedUser,
    /// Classified content.
    pub content: MessageContent,
    /// Normalized send time.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Message this one replies to, if any.
    pub reply_to: Option<String>,
    /// Original platform event, for platform-specific downstream needs.
    /// Generic logic must never require it.
    pub raw: serde_json::Value,
}

/// An interactive button on an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    /// Button label.
    pub text: String,
    /// Callback identifier dispatched when the button is pressed.
    pub callback_id: Option<String>,
}

impl Button {
    /// Create a labeled button.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_id: None,
        }
    }

    /// Create a button carrying a callback identifier.
    #[must_use]
    pub fn with_callback(text: impl Into<String>, callback_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_id: Some(callback_id.into()),
        }
    }
}

/// Kind of outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutgoingKind {
    /// Plain text.
    Text,
    /// Text with interactive buttons.
    Buttons,
    /// Image by URL.
    Image,
    /// File by URL.
    File,
}

/// A platform-independent outbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Text body (possibly empty for pure media messages).
    pub text: String,
    /// Message kind.
    pub kind: OutgoingKind,
    /// Row-major button grid; platforms without native buttons flatten it.
    pub buttons: Vec<Vec<Button>>,
    /// Image URL for [`OutgoingKind::Image`].
    pub image_url: Option<String>,
    /// File URL for [`OutgoingKind::File`].
    pub file_url: Option<String>,
    /// File name accompanying `file_url`.
    pub file_name: Option<String>,
    /// Message to reply to, if any.
    pub reply_to: Option<String>,
}

impl OutgoingMessage {
    /// Plain-text message.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: OutgoingKind::Text,
            buttons: Vec::new(),
            image_url: None,
            file_url: None,
            file_name: None,
            reply_to: None,
        }
    }

    /// Text with an interactive button grid.
    #[must_use]
    pub fn buttons(text: impl Into<String>, buttons: Vec<Vec<Button>>) -> Self {
        Self {
            kind: OutgoingKind::Buttons,
            buttons,
            ..Self::text(text)
        }
    }

    /// Image by URL with a caption.
    #[must_use]
    pub fn image(caption: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: OutgoingKind::Image,
            image_url: Some(url.into()),
            ..Self::text(caption)
        }
    }

    /// Flatten the button grid in row-major order.
    #[must_use]
    pub fn flat_buttons(&self) -> Vec<&Button> {
        self.buttons.iter().flatten().collect()
    }
}

/// Result of a connection-independent credential probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProbe {
    /// Whether the credentials were accepted.
    pub success: bool,
    /// Bot/account identity, when known.
    pub identity: Option<String>,
    /// Error message on failure.
    pub error: Option<String>,
}

impl ConnectionProbe {
    /// Successful probe with a resolved identity.
    #[must_use]
    pub fn ok(identity: impl Into<String>) -> Self {
        Self {
            success: true,
            identity: Some(identity.into()),
            error: None,
        }
    }

    /// Failed probe.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            identity: None,
            error: Some(error.into()),
        }
    }
}

/// Threshold below which a raw epoch value is interpreted as seconds.
const EPOCH_MS_THRESHOLD: i64 = 1_000_000_000_000;

/// Normalize a platform epoch timestamp that may be in seconds or
/// milliseconds into a UTC datetime.
#[must_use]
pub fn normalize_timestamp(raw: i64) -> chrono::DateTime<chrono::Utc> {
    let converted = if raw.abs() < EPOCH_MS_THRESHOLD {
        chrono::DateTime::from_timestamp(raw, 0)
    } else {
        chrono::DateTime::from_timestamp_millis(raw)
    };
    converted.unwrap_or_else(chrono::Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_channel_ids() {
        assert_eq!(ChannelId::slack().0, "slack");
        assert_eq!(ChannelId::telegram().0, "telegram");
        assert_eq!(ChannelId::signal().0, "signal");
        assert_eq!(ChannelId::whatsapp().0, "whatsapp");
    }

    #[test]
    fn test_display_name_chain() {
        let name = UnifiedUser::resolve_display_name("Signal", "+15550001", Some("Ana"), None);
        assert_eq!(name, "Ana");

        let name =
            UnifiedUser::resolve_display_name("Signal", "+15550001", None, Some("+15550001"));
        assert_eq!(name, "+15550001");

        let name = UnifiedUser::resolve_display_name("Signal", "+15550001", Some("  "), None);
        assert_eq!(name, "Signal User +15550001");
    }

    #[test]
    fn test_media_content_kind_tracks_first_attachment() {
        let content = MessageContent::media(
            "caption",
            vec![Attachment {
                kind: AttachmentKind::Voice,
                media: MediaRef::FileId("f1".into()),
                mime_type: "audio/ogg".into(),
                file_name: None,
            }],
        );
        assert_eq!(content.kind, ContentKind::Voice);
        assert_eq!(content.text, "caption");
    }

    #[test]
    fn test_media_content_empty_falls_back_to_text() {
        let content = MessageContent::media("hello", Vec::new());
        assert_eq!(content.kind, ContentKind::Text);
    }

    #[test]
    fn test_timestamp_normalization() {
        let from_secs = normalize_timestamp(1_700_000_000);
        let from_millis = normalize_timestamp(1_700_000_000_000);
        assert_eq!(from_secs, from_millis);
        assert_eq!(from_secs.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_flat_buttons_row_major() {
        let msg = OutgoingMessage::buttons(
            "Proceed?",
            vec![
                vec![Button::new("Yes"), Button::new("No")],
                vec![Button::new("Always")],
            ],
        );
        let flat: Vec<&str> = msg.flat_buttons().iter().map(|b| b.text.as_str()).collect();
        assert_eq!(flat, vec!["Yes", "No", "Always"]);
    }
}
