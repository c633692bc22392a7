use crate::backend::{BackendError, ChangeEvent, ChangeFilter, SubscriptionId};
use crate::models::Message;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Phoenix-channel frame, the realtime wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PhoenixMessage {
    topic: String,
    event: String,
    #[serde(default)]
    payload: serde_json::Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

impl PhoenixMessage {
    fn join(topic: String, reference: u64) -> Self {
        Self {
            topic,
            event: "phx_join".to_string(),
            payload: serde_json::json!({}),
            reference: Some(reference.to_string()),
        }
    }

    fn leave(topic: String, reference: u64) -> Self {
        Self {
            topic,
            event: "phx_leave".to_string(),
            payload: serde_json::json!({}),
            reference: Some(reference.to_string()),
        }
    }

    fn heartbeat(reference: u64) -> Self {
        Self {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: serde_json::json!({}),
            reference: Some(reference.to_string()),
        }
    }
}

struct Route {
    topic: String,
    filter: ChangeFilter,
    tx: UnboundedSender<ChangeEvent>,
}

/// One websocket per backend; subscriptions join per-topic channels and a
/// reader task fans decoded row events out to subscriber channels. No
/// reconnect: a dead socket stays dead until the process restarts, matching
/// the no-retry policy of the rest of the client.
pub(super) struct RealtimeClient {
    url: String,
    routes: Arc<Mutex<HashMap<SubscriptionId, Route>>>,
    outgoing: tokio::sync::Mutex<Option<UnboundedSender<PhoenixMessage>>>,
    next_ref: AtomicU64,
    next_subscription: AtomicU64,
}

impl RealtimeClient {
    pub(super) fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            routes: Arc::new(Mutex::new(HashMap::new())),
            outgoing: tokio::sync::Mutex::new(None),
            next_ref: AtomicU64::new(1),
            next_subscription: AtomicU64::new(1),
        }
    }

    pub(super) async fn subscribe(
        &self,
        filter: ChangeFilter,
        tx: UnboundedSender<ChangeEvent>,
    ) -> Result<SubscriptionId, BackendError> {
        self.ensure_connected().await?;

        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let topic = topic_for(&filter);
        self.routes
            .lock()
            .insert(id, Route { topic: topic.clone(), filter, tx });

        debug!("joining realtime topic {topic}");
        self.send(PhoenixMessage::join(topic, self.next_ref())).await?;
        Ok(id)
    }

    pub(super) async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BackendError> {
        let Some(route) = self.routes.lock().remove(&id) else {
            return Ok(());
        };
        debug!("leaving realtime topic {}", route.topic);
        self.send(PhoenixMessage::leave(route.topic, self.next_ref())).await
    }

    fn next_ref(&self) -> u64 {
        self.next_ref.fetch_add(1, Ordering::Relaxed)
    }

    async fn send(&self, msg: PhoenixMessage) -> Result<(), BackendError> {
        let outgoing = self.outgoing.lock().await;
        let tx = outgoing
            .as_ref()
            .ok_or_else(|| BackendError::Realtime("socket not connected".to_string()))?;
        tx.send(msg)
            .map_err(|_| BackendError::Realtime("socket writer has shut down".to_string()))
    }

    async fn ensure_connected(&self) -> Result<(), BackendError> {
        let mut outgoing = self.outgoing.lock().await;
        if outgoing.is_some() {
            return Ok(());
        }

        let (ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| BackendError::Realtime(e.to_string()))?;
        info!("realtime socket connected");
        let (mut sink, mut source) = ws.split();

        let (out_tx, mut out_rx) = unbounded_channel::<PhoenixMessage>();

        // Writer: serialize outgoing frames onto the socket.
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("could not encode realtime frame: {e}");
                        continue;
                    }
                };
                if sink.send(WsMessage::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        // Reader: decode frames and route them to subscribers.
        let routes = Arc::clone(&self.routes);
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!("realtime socket error: {e}");
                        break;
                    }
                };
                let WsMessage::Text(text) = frame else { continue };
                match serde_json::from_str::<PhoenixMessage>(&text) {
                    Ok(msg) => dispatch(&routes, msg),
                    Err(e) => debug!("ignoring unparseable realtime frame: {e}"),
                }
            }
            info!("realtime socket closed");
        });

        // Heartbeat keeps the phoenix connection alive.
        let hb_tx = out_tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
            let mut n = 0u64;
            loop {
                interval.tick().await;
                n += 1;
                if hb_tx.send(PhoenixMessage::heartbeat(n)).is_err() {
                    break;
                }
            }
        });

        *outgoing = Some(out_tx);
        Ok(())
    }
}

/// Channel topic for a filter. Message topics carry the sender-side filter;
/// the receiver side is verified on every delivery in [`dispatch`].
fn topic_for(filter: &ChangeFilter) -> String {
    match filter {
        ChangeFilter::Profiles => "realtime:public:profiles".to_string(),
        ChangeFilter::MessageInserts { sender, .. } => {
            format!("realtime:public:messages:sender_id=eq.{sender}")
        }
    }
}

fn dispatch(routes: &Mutex<HashMap<SubscriptionId, Route>>, msg: PhoenixMessage) {
    match msg.event.as_str() {
        "INSERT" | "UPDATE" => {}
        "phx_reply" => {
            debug!("channel reply on {}", msg.topic);
            return;
        }
        "phx_error" => {
            warn!("channel error on {}", msg.topic);
            return;
        }
        _ => return,
    }

    let routes = routes.lock();
    for route in routes.values().filter(|r| r.topic == msg.topic) {
        let event = match &route.filter {
            ChangeFilter::Profiles => ChangeEvent::ProfileChanged,
            ChangeFilter::MessageInserts { sender, receiver } => {
                if msg.event != "INSERT" {
                    continue;
                }
                let Some(record) = msg.payload.get("record") else { continue };
                let message: Message = match serde_json::from_value(record.clone()) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("undecodable message record on {}: {e}", msg.topic);
                        continue;
                    }
                };
                // The topic narrows by sender only; enforce the full pair here.
                if message.sender_id != *sender || message.receiver_id != *receiver {
                    continue;
                }
                ChangeEvent::MessageInserted(message)
            }
        };
        if route.tx.send(event).is_err() {
            debug!("subscriber for {} is gone", msg.topic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_topic_for_filters() {
        let sender = Uuid::new_v4();
        let receiver = Uuid::new_v4();
        assert_eq!(topic_for(&ChangeFilter::Profiles), "realtime:public:profiles");
        assert_eq!(
            topic_for(&ChangeFilter::MessageInserts { sender, receiver }),
            format!("realtime:public:messages:sender_id=eq.{sender}")
        );
    }

    #[test]
    fn test_phoenix_frame_round_trip() {
        let frame = PhoenixMessage::join("realtime:public:profiles".to_string(), 7);
        let text = serde_json::to_string(&frame).unwrap();
        assert!(text.contains("\"ref\":\"7\""));

        let decoded: PhoenixMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded.event, "phx_join");
        assert_eq!(decoded.topic, "realtime:public:profiles");
    }

    #[test]
    fn test_dispatch_enforces_receiver() {
        let sender = Uuid::new_v4();
        let receiver = Uuid::new_v4();
        let other = Uuid::new_v4();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let routes = Mutex::new(HashMap::new());
        routes.lock().insert(
            1,
            Route {
                topic: topic_for(&ChangeFilter::MessageInserts { sender, receiver }),
                filter: ChangeFilter::MessageInserts { sender, receiver },
                tx,
            },
        );

        let insert_frame = |to: Uuid| PhoenixMessage {
            topic: format!("realtime:public:messages:sender_id=eq.{sender}"),
            event: "INSERT".to_string(),
            payload: serde_json::json!({
                "record": Message::new(sender, to, "hi", Utc::now())
            }),
            reference: None,
        };

        // Same sender but a different receiver must not be delivered.
        dispatch(&routes, insert_frame(other));
        assert!(rx.try_recv().is_err());

        dispatch(&routes, insert_frame(receiver));
        assert!(matches!(rx.try_recv(), Ok(ChangeEvent::MessageInserted(_))));
    }

    #[test]
    fn test_dispatch_ignores_replies() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let routes = Mutex::new(HashMap::new());
        routes.lock().insert(
            1,
            Route {
                topic: "realtime:public:profiles".to_string(),
                filter: ChangeFilter::Profiles,
                tx,
            },
        );

        dispatch(
            &routes,
            PhoenixMessage {
                topic: "realtime:public:profiles".to_string(),
                event: "phx_reply".to_string(),
                payload: serde_json::json!({"status": "ok"}),
                reference: Some("1".to_string()),
            },
        );
        assert!(rx.try_recv().is_err());

        dispatch(
            &routes,
            PhoenixMessage {
                topic: "realtime:public:profiles".to_string(),
                event: "UPDATE".to_string(),
                payload: serde_json::json!({"record": {}}),
                reference: None,
            },
        );
        assert!(matches!(rx.try_recv(), Ok(ChangeEvent::ProfileChanged)));
    }
}
