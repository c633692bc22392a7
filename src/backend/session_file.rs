use crate::backend::Session;
use crate::models::UserId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use tracing::warn;

/// On-disk form of a session, so a restart can pick up where it left off
/// without asking for credentials again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub user_id: UserId,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
}

impl From<&Session> for StoredSession {
    fn from(session: &Session) -> Self {
        Self {
            user_id: session.user_id,
            email: session.email.clone(),
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
        }
    }
}

impl From<StoredSession> for Session {
    fn from(stored: StoredSession) -> Self {
        Self {
            user_id: stored.user_id,
            email: stored.email,
            access_token: stored.access_token,
            refresh_token: stored.refresh_token,
        }
    }
}

pub fn load(path: &Path) -> io::Result<Option<StoredSession>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    match serde_json::from_str(&raw) {
        Ok(session) => Ok(Some(session)),
        Err(e) => {
            // A corrupt file means re-login, not a crash.
            warn!("ignoring unreadable session file {}: {e}", path.display());
            Ok(None)
        }
    }
}

pub fn save(path: &Path, session: &StoredSession) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(session)?)
}

pub fn clear(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample() -> StoredSession {
        StoredSession {
            user_id: Uuid::new_v4(),
            email: "alice@example.com".to_string(),
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let session = sample();
        save(&path, &session).unwrap();

        let loaded = load(&path).unwrap().unwrap();
        assert_eq!(loaded.user_id, session.user_id);
        assert_eq!(loaded.refresh_token, session.refresh_token);
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("absent.json")).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();
        assert!(load(&path).unwrap().is_none());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        save(&path, &sample()).unwrap();

        clear(&path).unwrap();
        clear(&path).unwrap();
        assert!(load(&path).unwrap().is_none());
    }
}
