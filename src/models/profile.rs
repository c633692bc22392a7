use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type UserId = Uuid;

/// Online/offline marker stored on the profile row. The backend stores it
/// as a lowercase string column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    Offline,
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Presence::Online => write!(f, "Online"),
            Presence::Offline => write!(f, "Offline"),
        }
    }
}

/// A user's identity and presence record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub status: Presence,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl Profile {
    pub fn new(username: &str, email: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            status: Presence::Offline,
            last_seen: Utc::now(),
            avatar_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_wire_format() {
        assert_eq!(serde_json::to_string(&Presence::Online).unwrap(), "\"online\"");
        assert_eq!(
            serde_json::from_str::<Presence>("\"offline\"").unwrap(),
            Presence::Offline
        );
    }

    #[test]
    fn test_profile_decodes_without_avatar() {
        let raw = serde_json::json!({
            "id": Uuid::new_v4(),
            "username": "alice",
            "email": "alice@example.com",
            "status": "online",
            "last_seen": "2026-08-01T10:00:00Z"
        });

        let profile: Profile = serde_json::from_value(raw).unwrap();
        assert_eq!(profile.username, "alice");
        assert_eq!(profile.status, Presence::Online);
        assert!(profile.avatar_url.is_none());
    }
}
