use crate::backend::{BackendError, ChatBackend};
use crate::models::Profile;
use std::sync::Arc;
use tracing::{info, warn};

/// Restore a previous session and resolve it to a profile. `None` means the
/// caller should present the sign-in view.
///
/// A session whose profile row is missing is treated as an auth failure: the
/// session is revoked and the user lands back at sign-in, rather than the
/// screen waiting forever for a row that will not appear.
pub async fn restore(backend: &Arc<dyn ChatBackend>) -> Result<Option<Profile>, BackendError> {
    let Some(session) = backend.restore_session().await? else {
        return Ok(None);
    };
    match backend.profile(session.user_id).await? {
        Some(profile) => {
            info!("restored session for {}", profile.username);
            Ok(Some(profile))
        }
        None => {
            warn!("session for {} has no profile record, revoking", session.user_id);
            if let Err(e) = backend.sign_out().await {
                warn!("could not revoke orphaned session: {e}");
            }
            Ok(None)
        }
    }
}

/// Interactive sign-in, with the same missing-profile policy as [`restore`].
pub async fn sign_in(
    backend: &Arc<dyn ChatBackend>,
    email: &str,
    password: &str,
) -> Result<Profile, BackendError> {
    let session = backend.sign_in(email, password).await?;
    match backend.profile(session.user_id).await? {
        Some(profile) => Ok(profile),
        None => {
            warn!("account {} has no profile record, revoking", session.user_id);
            if let Err(e) = backend.sign_out().await {
                warn!("could not revoke orphaned session: {e}");
            }
            Err(BackendError::MissingProfile(session.user_id))
        }
    }
}
