//! Plugin configuration.
//!
//! A [`PluginConfig`] carries the credential set one platform plugin needs.
//! Credentials are validated at `initialize` time, before any network I/O;
//! the config is immutable afterwards.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required credential field is absent or empty.
    #[error("{0} is required")]
    MissingCredential(String),

    /// A credential is present but malformed.
    #[error("invalid {0}: {1}")]
    InvalidCredential(String, String),
}

/// Which platform a plugin connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    /// Slack Web API.
    Slack,
    /// Telegram Bot API.
    Telegram,
    /// Signal via signal-cli REST API.
    Signal,
    /// WhatsApp Cloud API.
    WhatsApp,
}

impl PluginKind {
    /// String representation matching channel ids.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Slack => "slack",
            Self::Telegram => "telegram",
            Self::Signal => "signal",
            Self::WhatsApp => "whatsapp",
        }
    }
}

/// Credential set for one platform connection.
///
/// The shape varies slightly by platform; each plugin's `initialize` names
/// the fields it requires and fails fast when one is missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// Bot/access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// App-level token (Slack socket mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_token: Option<String>,
    /// Base URL of a bridge API (signal-cli REST).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Registered phone number (Signal).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// Business phone number ID (WhatsApp Cloud API).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number_id: Option<String>,
}

impl Credentials {
    /// Fetch a credential field, failing with a descriptive error naming it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredential`] when the field is absent
    /// or blank.
    pub fn require<'a>(
        field: Option<&'a String>,
        what: &str,
    ) -> Result<&'a str, ConfigError> {
        field
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingCredential(what.to_string()))
    }
}

/// Configuration for one platform plugin instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Target platform.
    #[serde(rename = "type")]
    pub kind: PluginKind,
    /// Platform credentials.
    pub credentials: Credentials,
}

impl PluginConfig {
    /// Create a config for a platform with the given credentials.
    #[must_use]
    pub const fn new(kind: PluginKind, credentials: Credentials) -> Self {
        Self { kind, credentials }
    }
}
