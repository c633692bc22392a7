use crate::backend::{BackendError, ChatBackend};
use crate::models::{NewMessage, UserId};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// A write request was issued.
    Sent,
    /// Nothing to send: blank content, no peer, or no signed-in user.
    Skipped,
}

/// Request persistence of a new message. The thread view is not touched
/// here — the sender sees their own message when the subscription echoes it
/// back, like any other insert.
pub async fn send(
    backend: &Arc<dyn ChatBackend>,
    current_user: Option<UserId>,
    peer: Option<UserId>,
    content: &str,
) -> Result<SendOutcome, BackendError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(SendOutcome::Skipped);
    }
    let (Some(sender_id), Some(receiver_id)) = (current_user, peer) else {
        debug!("send without a selected peer or session, skipping");
        return Ok(SendOutcome::Skipped);
    };

    backend
        .insert_message(NewMessage {
            sender_id,
            receiver_id,
            content: trimmed.to_string(),
        })
        .await?;
    Ok(SendOutcome::Sent)
}
