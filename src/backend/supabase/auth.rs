use crate::backend::session_file::{self, StoredSession};
use crate::backend::supabase::{check, SupabaseBackend};
use crate::backend::{BackendError, Session};
use crate::models::UserId;
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: UserId,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

impl SupabaseBackend {
    pub(super) async fn password_sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let resp = self
            .http
            .post(format!("{}/auth/v1/token?grant_type=password", self.base_url))
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        if resp.status().is_client_error() {
            return Err(BackendError::Auth(auth_error_detail(resp).await));
        }
        let token: TokenResponse = check(resp).await?.json().await?;
        let session = self.adopt(token, email);
        info!("signed in as {}", session.email);
        Ok(session)
    }

    /// Restore the in-memory session, or exchange the stored refresh token
    /// for a fresh one. A rejected refresh token clears the stored session
    /// and reports "no session" rather than an error.
    pub(super) async fn refresh_stored_session(&self) -> Result<Option<Session>, BackendError> {
        if let Some(session) = self.session.read().clone() {
            return Ok(Some(session));
        }
        let Some(stored) = session_file::load(&self.session_path)? else {
            return Ok(None);
        };

        let resp = self
            .http
            .post(format!("{}/auth/v1/token?grant_type=refresh_token", self.base_url))
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "refresh_token": stored.refresh_token }))
            .send()
            .await?;

        if resp.status().is_client_error() {
            info!("stored session was rejected, sign-in required");
            session_file::clear(&self.session_path)?;
            return Ok(None);
        }
        let token: TokenResponse = check(resp).await?.json().await?;
        let email = stored.email.clone();
        Ok(Some(self.adopt(token, &email)))
    }

    /// Best effort on the remote side; local session state is always cleared.
    pub(super) async fn revoke_session(&self) -> Result<(), BackendError> {
        let access_token = self.session.read().as_ref().map(|s| s.access_token.clone());
        if let Some(token) = access_token {
            let result = self
                .http
                .post(format!("{}/auth/v1/logout", self.base_url))
                .header("apikey", &self.anon_key)
                .bearer_auth(token)
                .send()
                .await;
            if let Err(e) = result {
                debug!("remote logout failed: {e}");
            }
        }
        *self.session.write() = None;
        session_file::clear(&self.session_path)?;
        Ok(())
    }

    fn adopt(&self, token: TokenResponse, fallback_email: &str) -> Session {
        let session = Session {
            user_id: token.user.id,
            email: token.user.email.unwrap_or_else(|| fallback_email.to_string()),
            access_token: token.access_token,
            refresh_token: token.refresh_token,
        };
        *self.session.write() = Some(session.clone());
        if let Err(e) = session_file::save(&self.session_path, &StoredSession::from(&session)) {
            debug!("could not persist session: {e}");
        }
        session
    }
}

async fn auth_error_detail(resp: reqwest::Response) -> String {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<AuthErrorBody>(&body) {
        Ok(parsed) => parsed
            .error_description
            .or(parsed.msg)
            .unwrap_or_else(|| format!("status {status}")),
        Err(_) => format!("status {status}"),
    }
}
