use crate::backend::ChatBackend;
use crate::models::{Presence, UserId};
use std::sync::Arc;
use tracing::debug;

/// Publishes the current user's presence: one `online` write when the
/// session is confirmed, one `offline` write on teardown or logout. Write
/// failures are deliberately silent beyond a debug log; presence is not
/// worth an error dialog and gets no retry.
pub struct PresencePublisher {
    backend: Arc<dyn ChatBackend>,
    user_id: UserId,
}

impl PresencePublisher {
    pub fn new(backend: Arc<dyn ChatBackend>, user_id: UserId) -> Self {
        Self { backend, user_id }
    }

    pub async fn went_online(&self) {
        if let Err(e) = self.backend.update_presence(self.user_id, Presence::Online).await {
            debug!("online presence write dropped: {e}");
        }
    }

    pub async fn went_offline(&self) {
        if let Err(e) = self.backend.update_presence(self.user_id, Presence::Offline).await {
            debug!("offline presence write dropped: {e}");
        }
    }
}
