use crate::backend::{BackendError, ChangeEvent, ChangeFilter, ChatBackend, SubscriptionGuard};
use crate::models::{Profile, UserId};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

/// Keeps the full set of known profiles live. Any profile-table change
/// triggers an unconditional full re-fetch; redundant reads are the price of
/// never patching the list incrementally and it always converges on the
/// latest committed state.
pub struct Directory {
    backend: Arc<dyn ChatBackend>,
    current_user: UserId,
    users: Vec<Profile>,
    subscription: Option<SubscriptionGuard>,
}

impl Directory {
    pub fn new(backend: Arc<dyn ChatBackend>, current_user: UserId) -> Self {
        Self { backend, current_user, users: Vec::new(), subscription: None }
    }

    /// Initial fetch plus the change subscription whose deliveries should be
    /// answered with [`Directory::refresh`].
    pub async fn start(&mut self, tx: UnboundedSender<ChangeEvent>) -> Result<(), BackendError> {
        self.refresh().await;
        let id = self.backend.subscribe(ChangeFilter::Profiles, tx).await?;
        self.subscription = Some(SubscriptionGuard::new(self.backend.clone(), id));
        Ok(())
    }

    /// Full re-fetch. A failed read keeps the previous list.
    pub async fn refresh(&mut self) {
        match self.backend.list_profiles().await {
            Ok(mut users) => {
                // The store orders by username; sort anyway so the rendered
                // order never depends on it.
                users.sort_by(|a, b| a.username.cmp(&b.username));
                self.users = users;
            }
            Err(e) => warn!("directory refresh failed: {e}"),
        }
    }

    /// Everyone except the current user, in username order.
    pub fn others(&self) -> Vec<&Profile> {
        self.users.iter().filter(|p| p.id != self.current_user).collect()
    }

    pub fn get(&self, id: UserId) -> Option<&Profile> {
        self.users.iter().find(|p| p.id == id)
    }

    pub async fn shutdown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.release().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use tokio::sync::mpsc::unbounded_channel;

    fn seeded() -> (Arc<MemoryBackend>, Profile, Profile, Profile) {
        let backend = Arc::new(MemoryBackend::new());
        let alice = Profile::new("alice", "a@x");
        let bob = Profile::new("bob", "b@x");
        let carol = Profile::new("carol", "c@x");
        backend.upsert_profile(carol.clone());
        backend.upsert_profile(alice.clone());
        backend.upsert_profile(bob.clone());
        (backend, alice, bob, carol)
    }

    #[tokio::test]
    async fn test_others_excludes_current_user() {
        let (memory, alice, bob, carol) = seeded();
        let backend: Arc<dyn ChatBackend> = memory;

        let mut directory = Directory::new(backend, alice.id);
        directory.refresh().await;

        let names: Vec<&str> = directory.others().iter().map(|p| p.username.as_str()).collect();
        assert_eq!(names, vec!["bob", "carol"]);
        // The full fetched set still contains the current user.
        assert!(directory.get(alice.id).is_some());
        assert_eq!(directory.get(bob.id).unwrap().id, bob.id);
        assert_eq!(directory.get(carol.id).unwrap().id, carol.id);
    }

    #[tokio::test]
    async fn test_profile_change_signals_refresh() {
        let (memory, alice, _bob, _carol) = seeded();
        let backend: Arc<dyn ChatBackend> = memory.clone();

        let (tx, mut rx) = unbounded_channel();
        let mut directory = Directory::new(backend, alice.id);
        directory.start(tx).await.unwrap();
        assert_eq!(directory.others().len(), 2);

        memory.upsert_profile(Profile::new("dave", "d@x"));
        assert!(matches!(rx.try_recv(), Ok(ChangeEvent::ProfileChanged)));

        directory.refresh().await;
        assert_eq!(directory.others().len(), 3);

        directory.shutdown().await;
        assert_eq!(memory.subscription_count(), 0);
    }
}
