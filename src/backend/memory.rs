use crate::backend::{
    BackendError, ChangeEvent, ChangeFilter, ChatBackend, Session, SubscriptionId,
};
use crate::models::{Message, NewMessage, Presence, Profile, UserId};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// In-memory rendition of the backend. Backs the test suite and the
/// `--offline` demo mode; accepts any password for a known email.
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

struct Inner {
    profiles: Vec<Profile>,
    messages: Vec<Message>,
    session: Option<Session>,
    subscriptions: HashMap<SubscriptionId, (ChangeFilter, UnboundedSender<ChangeEvent>)>,
    next_subscription: SubscriptionId,
    presence_writes: Vec<(UserId, Presence)>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                profiles: Vec::new(),
                messages: Vec::new(),
                session: None,
                subscriptions: HashMap::new(),
                next_subscription: 1,
                presence_writes: Vec::new(),
            }),
        }
    }

    /// Two seeded accounts for `--offline` runs. Sign in as either of them
    /// with any password.
    pub fn seed_demo() -> Self {
        let backend = Self::new();
        backend.upsert_profile(Profile::new("alice", "alice@duochat.local"));
        backend.upsert_profile(Profile::new("bob", "bob@duochat.local"));
        backend
    }

    /// Insert or replace a profile row and notify profile subscribers.
    pub fn upsert_profile(&self, profile: Profile) {
        let mut inner = self.inner.lock();
        match inner.profiles.iter_mut().find(|p| p.id == profile.id) {
            Some(existing) => *existing = profile,
            None => inner.profiles.push(profile),
        }
        inner.fan_out(ChangeEvent::ProfileChanged);
    }

    /// Insert a fully-formed message row, as if another client had written
    /// it, and notify matching subscribers.
    pub fn inject_message(&self, message: Message) {
        let mut inner = self.inner.lock();
        inner.messages.push(message.clone());
        inner.fan_out(ChangeEvent::MessageInserted(message));
    }

    /// Pretend a session was established out of band (e.g. a previous run).
    pub fn set_session(&self, session: Session) {
        self.inner.lock().session = Some(session);
    }

    pub fn message_count(&self) -> usize {
        self.inner.lock().messages.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.lock().subscriptions.len()
    }

    /// Every presence write issued so far, in order.
    pub fn presence_writes(&self) -> Vec<(UserId, Presence)> {
        self.inner.lock().presence_writes.clone()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn fan_out(&mut self, event: ChangeEvent) {
        // Closed receivers drop out of the map on the next delivery attempt.
        self.subscriptions
            .retain(|_, (filter, tx)| !filter.matches(&event) || tx.send(event.clone()).is_ok());
    }
}

fn session_for(profile: &Profile) -> Session {
    Session {
        user_id: profile.id,
        email: profile.email.clone(),
        access_token: format!("memory-access-{}", Uuid::new_v4()),
        refresh_token: format!("memory-refresh-{}", Uuid::new_v4()),
    }
}

#[async_trait]
impl ChatBackend for MemoryBackend {
    async fn restore_session(&self) -> Result<Option<Session>, BackendError> {
        Ok(self.inner.lock().session.clone())
    }

    async fn sign_in(&self, email: &str, _password: &str) -> Result<Session, BackendError> {
        let mut inner = self.inner.lock();
        let profile = inner
            .profiles
            .iter()
            .find(|p| p.email == email)
            .cloned()
            .ok_or_else(|| BackendError::Auth("invalid login credentials".to_string()))?;
        let session = session_for(&profile);
        inner.session = Some(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.inner.lock().session = None;
        Ok(())
    }

    async fn profile(&self, id: UserId) -> Result<Option<Profile>, BackendError> {
        Ok(self.inner.lock().profiles.iter().find(|p| p.id == id).cloned())
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>, BackendError> {
        let mut profiles = self.inner.lock().profiles.clone();
        profiles.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(profiles)
    }

    async fn update_presence(&self, id: UserId, status: Presence) -> Result<(), BackendError> {
        let mut inner = self.inner.lock();
        inner.presence_writes.push((id, status));
        if let Some(profile) = inner.profiles.iter_mut().find(|p| p.id == id) {
            profile.status = status;
            profile.last_seen = Utc::now();
        }
        inner.fan_out(ChangeEvent::ProfileChanged);
        Ok(())
    }

    async fn conversation_history(&self, a: UserId, b: UserId) -> Result<Vec<Message>, BackendError> {
        let mut messages: Vec<Message> = self
            .inner
            .lock()
            .messages
            .iter()
            .filter(|m| m.is_between(a, b))
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.ordering_key());
        Ok(messages)
    }

    async fn insert_message(&self, draft: NewMessage) -> Result<(), BackendError> {
        let message = Message {
            id: Uuid::new_v4(),
            sender_id: draft.sender_id,
            receiver_id: draft.receiver_id,
            content: draft.content,
            created_at: Utc::now(),
            is_read: false,
        };
        let mut inner = self.inner.lock();
        inner.messages.push(message.clone());
        inner.fan_out(ChangeEvent::MessageInserted(message));
        Ok(())
    }

    async fn subscribe(
        &self,
        filter: ChangeFilter,
        tx: UnboundedSender<ChangeEvent>,
    ) -> Result<SubscriptionId, BackendError> {
        let mut inner = self.inner.lock();
        let id = inner.next_subscription;
        inner.next_subscription += 1;
        inner.subscriptions.insert(id, (filter, tx));
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BackendError> {
        self.inner.lock().subscriptions.remove(&id);
        Ok(())
    }
}
