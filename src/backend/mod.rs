pub mod memory;
pub mod session_file;
pub mod supabase;

use crate::models::{Message, NewMessage, Presence, Profile, UserId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

pub use memory::MemoryBackend;
pub use supabase::SupabaseBackend;

pub type SubscriptionId = u64;

/// An authenticated session as issued by the auth collaborator.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("no profile record for user {0}")]
    MissingProfile(UserId),
    #[error("request failed with status {status}: {detail}")]
    Request { status: u16, detail: String },
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("realtime channel error: {0}")]
    Realtime(String),
    #[error("malformed backend payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("session store error: {0}")]
    SessionStore(#[from] std::io::Error),
}

/// What a change subscription watches. Message subscriptions are
/// directional; a conversation holds one per direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeFilter {
    /// Any insert or update on the profile table.
    Profiles,
    /// Message inserts from `sender` to `receiver` only.
    MessageInserts { sender: UserId, receiver: UserId },
}

impl ChangeFilter {
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        match (self, event) {
            (ChangeFilter::Profiles, ChangeEvent::ProfileChanged) => true,
            (
                ChangeFilter::MessageInserts { sender, receiver },
                ChangeEvent::MessageInserted(msg),
            ) => msg.sender_id == *sender && msg.receiver_id == *receiver,
            _ => false,
        }
    }
}

/// A row-level change pushed by the backend to a subscriber.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    ProfileChanged,
    MessageInserted(Message),
}

/// The external collaborator surface: auth service, profile/message store,
/// and the change-subscription mechanism. Implemented over HTTP+websocket
/// by [`SupabaseBackend`] and in memory by [`MemoryBackend`].
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Restore a previously established session, if any.
    async fn restore_session(&self) -> Result<Option<Session>, BackendError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError>;
    /// Invalidate the current session. Best effort on the remote side; local
    /// state is always cleared.
    async fn sign_out(&self) -> Result<(), BackendError>;

    async fn profile(&self, id: UserId) -> Result<Option<Profile>, BackendError>;
    /// All profiles, ordered by username ascending.
    async fn list_profiles(&self) -> Result<Vec<Profile>, BackendError>;
    /// Write status and last-seen for a user. Callers treat failures as
    /// non-fatal.
    async fn update_presence(&self, id: UserId, status: Presence) -> Result<(), BackendError>;

    /// Every message exchanged between `a` and `b`, both directions, ordered
    /// by creation time ascending.
    async fn conversation_history(&self, a: UserId, b: UserId) -> Result<Vec<Message>, BackendError>;
    async fn insert_message(&self, draft: NewMessage) -> Result<(), BackendError>;

    /// Register a change subscription. Events are delivered on `tx` until
    /// [`ChatBackend::unsubscribe`] is called with the returned id.
    async fn subscribe(
        &self,
        filter: ChangeFilter,
        tx: UnboundedSender<ChangeEvent>,
    ) -> Result<SubscriptionId, BackendError>;
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BackendError>;
}

/// Handle for an active change subscription. Must be released explicitly on
/// every exit path; releasing before establishing a replacement is what keeps
/// stale deliveries out of the next view.
pub struct SubscriptionGuard {
    backend: Arc<dyn ChatBackend>,
    id: Option<SubscriptionId>,
}

impl SubscriptionGuard {
    pub fn new(backend: Arc<dyn ChatBackend>, id: SubscriptionId) -> Self {
        Self { backend, id: Some(id) }
    }

    pub async fn release(mut self) {
        if let Some(id) = self.id.take() {
            if let Err(e) = self.backend.unsubscribe(id).await {
                warn!("failed to release subscription {id}: {e}");
            }
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        // Unsubscribing needs an await, so a plain drop cannot do it.
        if let Some(id) = self.id {
            warn!("subscription {id} dropped without release");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_message_filter_is_directional() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let forward = ChangeFilter::MessageInserts { sender: a, receiver: b };
        let backward = ChangeFilter::MessageInserts { sender: b, receiver: a };

        let msg = ChangeEvent::MessageInserted(Message::new(a, b, "hi", Utc::now()));
        assert!(forward.matches(&msg));
        assert!(!backward.matches(&msg));
        assert!(!ChangeFilter::Profiles.matches(&msg));
    }

    #[test]
    fn test_profile_filter_matches_profile_changes() {
        assert!(ChangeFilter::Profiles.matches(&ChangeEvent::ProfileChanged));

        let a = Uuid::new_v4();
        let filter = ChangeFilter::MessageInserts { sender: a, receiver: a };
        assert!(!filter.matches(&ChangeEvent::ProfileChanged));
    }
}
