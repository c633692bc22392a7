use crate::models::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type MessageId = Uuid;

/// One direct message between two users. Immutable once created from this
/// client's point of view; `is_read` is stored but not otherwise used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

impl Message {
    pub fn new(sender_id: UserId, receiver_id: UserId, content: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            content: content.to_string(),
            created_at,
            is_read: false,
        }
    }

    /// Whether this message belongs to the conversation between `a` and `b`,
    /// in either direction.
    pub fn is_between(&self, a: UserId, b: UserId) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }

    /// Sort key for the thread view. Ties on `created_at` break on id so the
    /// order is total.
    pub fn ordering_key(&self) -> (DateTime<Utc>, MessageId) {
        (self.created_at, self.id)
    }
}

/// Insert payload for a new message. The backend assigns id and timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_between_both_directions() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        let msg = Message::new(a, b, "hi", Utc::now());
        assert!(msg.is_between(a, b));
        assert!(msg.is_between(b, a));
        assert!(!msg.is_between(a, c));
        assert!(!msg.is_between(b, c));
    }

    #[test]
    fn test_decodes_backend_row() {
        let raw = serde_json::json!({
            "id": Uuid::new_v4(),
            "sender_id": Uuid::new_v4(),
            "receiver_id": Uuid::new_v4(),
            "content": "hello",
            "created_at": "2026-08-01T10:00:00Z",
            "is_read": false
        });

        let msg: Message = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.content, "hello");
        assert!(!msg.is_read);
    }
}
