use crate::backend::{BackendError, ChangeEvent, ChangeFilter, ChatBackend, SubscriptionGuard};
use crate::models::{Message, UserId};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    /// No peer selected: no subscriptions, empty list.
    Idle,
    /// Peer selected, history fetch in flight.
    Loading,
    /// History loaded, both directional subscriptions active.
    Live,
}

/// The message thread between the current user and a selected peer.
///
/// Opening a peer always releases the previous subscriptions before
/// establishing new ones, so a late delivery for the old peer has nowhere to
/// land. Incoming events are additionally checked against the active pair,
/// deduplicated by id, and inserted in timestamp order — the transport's
/// delivery order is not a contract this type relies on.
pub struct Conversation {
    backend: Arc<dyn ChatBackend>,
    current_user: UserId,
    peer: Option<UserId>,
    state: ConversationState,
    messages: Vec<Message>,
    subscriptions: Vec<SubscriptionGuard>,
}

impl Conversation {
    pub fn new(backend: Arc<dyn ChatBackend>, current_user: UserId) -> Self {
        Self {
            backend,
            current_user,
            peer: None,
            state: ConversationState::Idle,
            messages: Vec::new(),
            subscriptions: Vec::new(),
        }
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn peer(&self) -> Option<UserId> {
        self.peer
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Whether the current user authored this message (the "sent" side of
    /// the thread view).
    pub fn is_sent(&self, message: &Message) -> bool {
        message.sender_id == self.current_user
    }

    /// Switch the thread to `peer`: drop the old subscriptions, load the
    /// history, then go live on both directions. Events arrive on `tx`; the
    /// caller owns the receiving end and should feed deliveries back through
    /// [`Conversation::apply`].
    pub async fn open(
        &mut self,
        peer: UserId,
        tx: UnboundedSender<ChangeEvent>,
    ) -> Result<(), BackendError> {
        // Release before anything else; see type docs.
        self.close().await;

        self.peer = Some(peer);
        self.state = ConversationState::Loading;

        // A failed history read leaves the thread empty rather than dead:
        // live messages still arrive once the subscriptions are up.
        match self.backend.conversation_history(self.current_user, peer).await {
            Ok(history) => self.messages = history,
            Err(e) => warn!("history fetch for peer {peer} failed: {e}"),
        }

        if let Err(e) = self.subscribe_both_directions(peer, tx).await {
            self.close().await;
            return Err(e);
        }
        self.state = ConversationState::Live;
        Ok(())
    }

    async fn subscribe_both_directions(
        &mut self,
        peer: UserId,
        tx: UnboundedSender<ChangeEvent>,
    ) -> Result<(), BackendError> {
        for filter in [
            ChangeFilter::MessageInserts { sender: self.current_user, receiver: peer },
            ChangeFilter::MessageInserts { sender: peer, receiver: self.current_user },
        ] {
            let id = self.backend.subscribe(filter, tx.clone()).await?;
            self.subscriptions.push(SubscriptionGuard::new(self.backend.clone(), id));
        }
        Ok(())
    }

    /// Fold a delivered change into the thread. Events that do not belong to
    /// the active pair are dropped: they are stale deliveries from a
    /// previous selection.
    pub fn apply(&mut self, event: ChangeEvent) {
        let ChangeEvent::MessageInserted(message) = event else { return };
        let Some(peer) = self.peer else { return };
        if !message.is_between(self.current_user, peer) {
            debug!("dropping stale delivery {} for another conversation", message.id);
            return;
        }
        if self.messages.iter().any(|m| m.id == message.id) {
            return;
        }
        let at = self
            .messages
            .partition_point(|m| m.ordering_key() <= message.ordering_key());
        self.messages.insert(at, message);
    }

    /// Back to Idle, releasing both subscriptions. Safe on every path,
    /// including error paths and repeated calls.
    pub async fn close(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.release().await;
        }
        self.peer = None;
        self.messages.clear();
        self.state = ConversationState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::models::Profile;
    use chrono::{Duration, Utc};
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    struct Fixture {
        memory: Arc<MemoryBackend>,
        backend: Arc<dyn ChatBackend>,
        alice: Profile,
        bob: Profile,
        carol: Profile,
    }

    fn fixture() -> Fixture {
        let memory = Arc::new(MemoryBackend::new());
        let alice = Profile::new("alice", "a@x");
        let bob = Profile::new("bob", "b@x");
        let carol = Profile::new("carol", "c@x");
        memory.upsert_profile(alice.clone());
        memory.upsert_profile(bob.clone());
        memory.upsert_profile(carol.clone());
        let backend: Arc<dyn ChatBackend> = memory.clone();
        Fixture { memory, backend, alice, bob, carol }
    }

    fn drain(convo: &mut Conversation, rx: &mut UnboundedReceiver<ChangeEvent>) {
        while let Ok(event) = rx.try_recv() {
            convo.apply(event);
        }
    }

    #[tokio::test]
    async fn test_history_filtered_and_ordered() {
        let f = fixture();
        let t0 = Utc::now();

        // Interleave messages from an unrelated pair.
        f.memory.inject_message(Message::new(f.alice.id, f.bob.id, "one", t0));
        f.memory.inject_message(Message::new(f.carol.id, f.alice.id, "noise", t0));
        f.memory.inject_message(Message::new(f.bob.id, f.alice.id, "two", t0 + Duration::seconds(1)));
        f.memory.inject_message(Message::new(f.alice.id, f.bob.id, "three", t0 + Duration::seconds(2)));

        let mut convo = Conversation::new(f.backend.clone(), f.alice.id);
        let (tx, _rx) = unbounded_channel();
        convo.open(f.bob.id, tx).await.unwrap();

        let contents: Vec<&str> = convo.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
        assert_eq!(convo.state(), ConversationState::Live);
    }

    #[tokio::test]
    async fn test_live_append_via_subscription() {
        let f = fixture();
        let mut convo = Conversation::new(f.backend.clone(), f.alice.id);
        let (tx, mut rx) = unbounded_channel();
        convo.open(f.bob.id, tx).await.unwrap();
        assert!(convo.messages().is_empty());

        f.memory.inject_message(Message::new(f.bob.id, f.alice.id, "hey", Utc::now()));
        drain(&mut convo, &mut rx);

        assert_eq!(convo.messages().len(), 1);
        assert_eq!(convo.messages()[0].content, "hey");
        assert!(!convo.is_sent(&convo.messages()[0]));
    }

    #[tokio::test]
    async fn test_out_of_order_delivery_resorted() {
        let f = fixture();
        let t0 = Utc::now();
        let mut convo = Conversation::new(f.backend.clone(), f.alice.id);
        let (tx, mut rx) = unbounded_channel();
        convo.open(f.bob.id, tx).await.unwrap();

        let late = Message::new(f.alice.id, f.bob.id, "late", t0 + Duration::seconds(5));
        let early = Message::new(f.bob.id, f.alice.id, "early", t0);
        f.memory.inject_message(late);
        f.memory.inject_message(early);
        drain(&mut convo, &mut rx);

        let contents: Vec<&str> = convo.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_applied_once() {
        let f = fixture();
        let mut convo = Conversation::new(f.backend.clone(), f.alice.id);
        let (tx, _rx) = unbounded_channel();
        convo.open(f.bob.id, tx).await.unwrap();

        let msg = Message::new(f.bob.id, f.alice.id, "hey", Utc::now());
        convo.apply(ChangeEvent::MessageInserted(msg.clone()));
        convo.apply(ChangeEvent::MessageInserted(msg));

        assert_eq!(convo.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_peer_switch_never_leaks_old_conversation() {
        let f = fixture();
        let mut convo = Conversation::new(f.backend.clone(), f.alice.id);

        let (bob_tx, mut bob_rx) = unbounded_channel();
        convo.open(f.bob.id, bob_tx).await.unwrap();
        assert_eq!(f.memory.subscription_count(), 2);

        // Switch to carol; the bob subscriptions must be gone before the
        // carol ones exist.
        let (carol_tx, mut carol_rx) = unbounded_channel();
        convo.open(f.carol.id, carol_tx).await.unwrap();
        assert_eq!(f.memory.subscription_count(), 2);

        // A bob-directed message lands after the switch.
        f.memory.inject_message(Message::new(f.bob.id, f.alice.id, "too late", Utc::now()));
        assert!(bob_rx.try_recv().is_err(), "released subscription still delivered");
        drain(&mut convo, &mut carol_rx);
        assert!(convo.messages().is_empty());

        // Even a delivery that somehow survived the release is dropped by
        // the pair check.
        convo.apply(ChangeEvent::MessageInserted(Message::new(
            f.bob.id,
            f.alice.id,
            "stale",
            Utc::now(),
        )));
        assert!(convo.messages().is_empty());
    }

    #[tokio::test]
    async fn test_send_echo_appears_once_in_both_views() {
        let f = fixture();

        let mut alice_view = Conversation::new(f.backend.clone(), f.alice.id);
        let (alice_tx, mut alice_rx) = unbounded_channel();
        alice_view.open(f.bob.id, alice_tx).await.unwrap();

        let mut bob_view = Conversation::new(f.backend.clone(), f.bob.id);
        let (bob_tx, mut bob_rx) = unbounded_channel();
        bob_view.open(f.alice.id, bob_tx).await.unwrap();

        let outcome = crate::sync::send(&f.backend, Some(f.alice.id), Some(f.bob.id), "hi bob")
            .await
            .unwrap();
        assert_eq!(outcome, crate::sync::SendOutcome::Sent);

        drain(&mut alice_view, &mut alice_rx);
        drain(&mut bob_view, &mut bob_rx);

        assert_eq!(alice_view.messages().len(), 1);
        assert_eq!(bob_view.messages().len(), 1);
        assert!(alice_view.is_sent(&alice_view.messages()[0]));
        assert!(!bob_view.is_sent(&bob_view.messages()[0]));
    }

    #[tokio::test]
    async fn test_two_user_exchange_scenario() {
        let f = fixture();
        let t1 = Utc::now();
        let t2 = t1 + Duration::seconds(10);

        f.memory.inject_message(Message::new(f.alice.id, f.bob.id, "hi", t1));

        let mut convo = Conversation::new(f.backend.clone(), f.alice.id);
        let (tx, mut rx) = unbounded_channel();
        convo.open(f.bob.id, tx).await.unwrap();

        assert_eq!(convo.messages().len(), 1);
        assert_eq!(convo.messages()[0].content, "hi");
        assert!(convo.is_sent(&convo.messages()[0]));

        f.memory.inject_message(Message::new(f.bob.id, f.alice.id, "hey", t2));
        drain(&mut convo, &mut rx);

        let rendered: Vec<(&str, bool)> = convo
            .messages()
            .iter()
            .map(|m| (m.content.as_str(), convo.is_sent(m)))
            .collect();
        assert_eq!(rendered, vec![("hi", true), ("hey", false)]);
    }

    #[tokio::test]
    async fn test_close_releases_everything() {
        let f = fixture();
        let mut convo = Conversation::new(f.backend.clone(), f.alice.id);
        let (tx, _rx) = unbounded_channel();
        convo.open(f.bob.id, tx).await.unwrap();

        convo.close().await;
        assert_eq!(convo.state(), ConversationState::Idle);
        assert!(convo.peer().is_none());
        assert!(convo.messages().is_empty());
        assert_eq!(f.memory.subscription_count(), 0);

        // Idempotent.
        convo.close().await;
        assert_eq!(f.memory.subscription_count(), 0);
    }
}
