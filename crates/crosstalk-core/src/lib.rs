//! # Crosstalk Core
//!
//! Shared building blocks for the Crosstalk channel subsystem.
//!
//! This crate provides:
//! - The unified message model every adapter converts to and from
//! - Plugin configuration with fail-fast credential validation
//! - Secret wrappers that keep tokens out of logs
//! - A fixed-window rate limiter keyed by operation name

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod ratelimit;
pub mod secrets;
pub mod types;

pub use config::{ConfigError, Credentials, PluginConfig, PluginKind};
pub use ratelimit::{RateDecision, RateLimiter};
pub use secrets::ApiKey;
pub use types::{
    Attachment, AttachmentKind, Button, ChannelId, ConnectionProbe, ContentKind, IncomingMessage,
    MediaRef, MessageContent, OutgoingKind, OutgoingMessage, UnifiedUser,
};

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::config::{Credentials, PluginConfig, PluginKind};
    pub use crate::ratelimit::RateLimiter;
    pub use crate::secrets::ApiKey;
    pub use crate::types::*;
}
