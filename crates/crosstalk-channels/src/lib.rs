//! # Crosstalk Channels
//!
//! Channel adapters and plugin lifecycle for messaging platforms.
//!
//! Each platform module carries typed raw-event structs, pure conversion
//! functions into the unified message model, and a lifecycle controller
//! implementing [`ChannelPlugin`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod traits;
mod registry;

/// Message chunking for platform length limits.
pub mod chunk;
/// Confirmation callback routing.
pub mod confirm;

/// Slack channel adapter.
pub mod slack;
/// Telegram channel adapter.
pub mod telegram;
/// Signal channel adapter.
pub mod signal;
/// WhatsApp channel adapter.
pub mod whatsapp;

pub use traits::{
    BoxError, ChannelCapabilities, ChannelError, ChannelPlugin, ConfirmHandler, MessageSink,
    PluginContext, PluginState,
};
pub use registry::PluginRegistry;
pub use chunk::split_message;
pub use confirm::{ConfirmAction, ConfirmationRouter, parse_action};

// Re-export plugin implementations
pub use slack::SlackPlugin;
pub use telegram::TelegramPlugin;
pub use signal::SignalPlugin;
pub use whatsapp::WhatsAppPlugin;
