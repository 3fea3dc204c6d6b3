//! Service Identity Manager (§4.4).
//!
//! Maintains the chat backend's own machine credential for calling AS
//! endpoints that require identity (conversation lookup, bulk checks). A
//! `tokio::sync::Mutex` held across the refresh `.await` is the single-flight
//! guard: concurrent callers queue on the lock rather than each dialing the
//! AS's client-credentials endpoint.

use std::sync::Arc;

use chat_asclient::{error::AsClientError, AsHttpClient};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

/// A token is refreshed once its remaining lifetime drops to this floor, so
/// `get_service_token` never hands back something that could expire mid-call.
const REFRESH_MARGIN: Duration = Duration::minutes(5);

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to acquire service credential: {0}")]
    Acquisition(#[from] AsClientError),
}

#[derive(Debug, Clone)]
struct ServiceCredential {
    token: String,
    expires_at: DateTime<Utc>,
}

pub struct ServiceIdentityManager {
    client: Arc<AsHttpClient>,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    credential: Mutex<Option<ServiceCredential>>,
}

impl ServiceIdentityManager {
    pub fn new(
        client: Arc<AsHttpClient>,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: scope.into(),
            credential: Mutex::new(None),
        }
    }

    /// Return a valid service token, refreshing if the cached one is absent
    /// or within [`REFRESH_MARGIN`] of expiry. No fallback token exists:
    /// acquisition errors propagate to the caller.
    pub async fn get_service_token(&self) -> Result<String, IdentityError> {
        let mut guard = self.credential.lock().await;

        if let Some(cred) = guard.as_ref() {
            if cred.expires_at - Utc::now() > REFRESH_MARGIN {
                return Ok(cred.token.clone());
            }
        }

        info!("acquiring fresh service identity token");
        let resp = self
            .client
            .fetch_service_token(&self.token_url, &self.client_id, &self.client_secret, &self.scope)
            .await?;

        let cred = ServiceCredential {
            token: resp.access_token,
            expires_at: Utc::now() + Duration::seconds(resp.expires_in as i64),
        };
        let token = cred.token.clone();
        *guard = Some(cred);
        Ok(token)
    }
}
