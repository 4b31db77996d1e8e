//! Confirmation callback routing.
//!
//! The agent can ask a user to approve an action; the approval surface is
//! rendered as platform-native buttons whose action identifiers carry a
//! `"<verb>:<call_id>:<value>"` payload. This module turns those platform
//! callbacks back into generic decisions.

use std::sync::Arc;

use crosstalk_core::types::ChannelId;

use crate::traits::{BoxError, ConfirmHandler};

/// A parsed confirmation action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmAction {
    /// Identifier of the pending call being decided.
    pub call_id: String,
    /// Decision value (e.g. "allow_once", "deny").
    pub value: String,
}

/// Parse a colon-delimited action identifier.
///
/// Returns `None` when the identifier has fewer than three segments or its
/// verb does not match `prefix`; the event may belong to an unrelated
/// interactive element and is simply ignored. Colons inside the value are
/// preserved.
#[must_use]
pub fn parse_action(prefix: &str, action_id: &str) -> Option<ConfirmAction> {
    let mut parts = action_id.splitn(3, ':');
    let verb = parts.next()?;
    let call_id = parts.next()?;
    let value = parts.next()?;
    if verb != prefix || call_id.is_empty() {
        return None;
    }
    Some(ConfirmAction {
        call_id: call_id.to_string(),
        value: value.to_string(),
    })
}

/// Routes platform interactive callbacks to the injected handler.
///
/// Dispatch is decoupled from acknowledgment: the platform listener acks the
/// callback first, then hands the action here, where the handler runs on its
/// own task so a slow handler never causes a platform-visible timeout.
pub struct ConfirmationRouter {
    prefix: String,
    handler: Arc<dyn ConfirmHandler>,
}

impl ConfirmationRouter {
    /// Create a router matching action ids with the given verb prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>, handler: Arc<dyn ConfirmHandler>) -> Self {
        Self {
            prefix: prefix.into(),
            handler,
        }
    }

    /// Registered verb prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Route one callback. Returns whether the action id matched.
    ///
    /// On a match the handler is invoked asynchronously; handler errors are
    /// caught and logged, never surfaced to the listener loop.
    pub fn dispatch(&self, user_id: &str, channel: &ChannelId, action_id: &str) -> bool {
        let Some(action) = parse_action(&self.prefix, action_id) else {
            return false;
        };

        let handler = Arc::clone(&self.handler);
        let user_id = user_id.to_string();
        let channel = channel.clone();
        tokio::spawn(async move {
            if let Err(err) = handler
                .confirm(&user_id, &channel, &action.call_id, &action.value)
                .await
            {
                tracing::warn!(
                    channel = %channel,
                    call_id = %action.call_id,
                    error = %err,
                    "confirmation handler failed"
                );
            }
        });
        true
    }

    /// Apply a pre-approved decision without a platform round trip.
    ///
    /// Invoked by the host (e.g. for session-cached approvals), not by a
    /// platform event, so the handler is awaited directly.
    ///
    /// # Errors
    ///
    /// Propagates the handler's error.
    pub async fn auto_confirm(
        &self,
        user_id: &str,
        channel: &ChannelId,
        call_id: &str,
        value: &str,
    ) -> Result<(), BoxError> {
        self.handler.confirm(user_id, channel, call_id, value).await
    }
}
