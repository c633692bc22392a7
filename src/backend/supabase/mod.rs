mod auth;
mod realtime;
mod tables;

use crate::backend::{
    BackendError, ChangeEvent, ChangeFilter, ChatBackend, Session, SubscriptionId,
};
use crate::models::{Message, NewMessage, Presence, Profile, UserId};
use async_trait::async_trait;
use parking_lot::RwLock;
use realtime::RealtimeClient;
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedSender;

/// Client for a Supabase-style hosted backend: GoTrue auth, PostgREST row
/// access, and phoenix-channel change subscriptions over one websocket.
pub struct SupabaseBackend {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    session: RwLock<Option<Session>>,
    session_path: PathBuf,
    realtime: RealtimeClient,
}

impl SupabaseBackend {
    pub fn new(url: &str, anon_key: &str, session_path: PathBuf) -> Result<Self, BackendError> {
        let base_url = url.trim_end_matches('/').to_string();
        let realtime = RealtimeClient::new(&websocket_url(&base_url, anon_key));
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            base_url,
            anon_key: anon_key.to_string(),
            session: RwLock::new(None),
            session_path,
            realtime,
        })
    }

    /// Bearer token for REST calls: the session's access token once signed
    /// in, the anon key before that.
    fn bearer(&self) -> String {
        self.session
            .read()
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone())
    }
}

fn websocket_url(base_url: &str, anon_key: &str) -> String {
    let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("wss://{base_url}")
    };
    format!("{ws_base}/realtime/v1/websocket?apikey={anon_key}&vsn=1.0.0")
}

/// Map a non-success response to a [`BackendError::Request`] carrying the
/// body as detail.
pub(super) async fn check(resp: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let detail = resp.text().await.unwrap_or_default();
    Err(BackendError::Request { status: status.as_u16(), detail })
}

#[async_trait]
impl ChatBackend for SupabaseBackend {
    async fn restore_session(&self) -> Result<Option<Session>, BackendError> {
        self.refresh_stored_session().await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        self.password_sign_in(email, password).await
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.revoke_session().await
    }

    async fn profile(&self, id: UserId) -> Result<Option<Profile>, BackendError> {
        self.fetch_profile(id).await
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>, BackendError> {
        self.fetch_profiles().await
    }

    async fn update_presence(&self, id: UserId, status: Presence) -> Result<(), BackendError> {
        self.patch_presence(id, status).await
    }

    async fn conversation_history(&self, a: UserId, b: UserId) -> Result<Vec<Message>, BackendError> {
        self.fetch_messages_between(a, b).await
    }

    async fn insert_message(&self, draft: NewMessage) -> Result<(), BackendError> {
        self.create_message(&draft).await
    }

    async fn subscribe(
        &self,
        filter: ChangeFilter,
        tx: UnboundedSender<ChangeEvent>,
    ) -> Result<SubscriptionId, BackendError> {
        self.realtime.subscribe(filter, tx).await
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BackendError> {
        self.realtime.unsubscribe(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url_switches_scheme() {
        assert_eq!(
            websocket_url("https://proj.supabase.co", "key"),
            "wss://proj.supabase.co/realtime/v1/websocket?apikey=key&vsn=1.0.0"
        );
        assert_eq!(
            websocket_url("http://localhost:54321", "key"),
            "ws://localhost:54321/realtime/v1/websocket?apikey=key&vsn=1.0.0"
        );
    }
}
