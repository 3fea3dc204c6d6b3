//! Long-lived HTTP client for the external Authorization Service (§4.9).
//!
//! Owns its own connection pool, DNS cache, and connect/read timeouts so the
//! Permission Resolver and Service Identity Manager never pay per-call
//! client construction cost. No retries happen at this layer — the Circuit
//! Breaker and cache absorb intermittent failure (§4.9).

pub mod error;
pub mod types;

use std::time::Duration;

use tracing::debug;

use error::{AsClientError, Result};
use types::{
    CheckGroupRequest, CheckGroupResponse, CheckRequest, CheckResponse, GroupInfo, GroupMember,
    TokenResponse,
};

/// Total request ceiling; connect and read each have their own, tighter cap.
const TOTAL_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Per-host idle-connection ceiling — approximates the ≥200/host pool floor.
const POOL_MAX_IDLE_PER_HOST: usize = 200;

pub struct AsHttpClient {
    client: reqwest::Client,
    base_url: String,
}

impl AsHttpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(TOTAL_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .build()
            .expect("AS HTTP client configuration is static and always valid");

        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// `POST /authorization/check`. The AS always answers 200 even for a
    /// denial — only transport failure or a non-200 status is a Breaker
    /// failure.
    pub async fn check_permission(
        &self,
        service_token: &str,
        org_id: &str,
        user_id: &str,
        permission: &str,
    ) -> Result<CheckResponse> {
        let url = format!("{}/authorization/check", self.base_url);
        let body = CheckRequest {
            org_id,
            user_id,
            permission,
        };
        debug!(org_id, user_id, permission, "checking permission with AS");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(service_token)
            .json(&body)
            .send()
            .await?;

        self.decode(resp).await
    }

    /// `POST /authorization/check-group`.
    pub async fn check_group_permission(
        &self,
        service_token: &str,
        org_id: &str,
        user_id: &str,
        group_id: &str,
        permission: &str,
    ) -> Result<CheckGroupResponse> {
        let url = format!("{}/authorization/check-group", self.base_url);
        let body = CheckGroupRequest {
            org_id,
            user_id,
            group_id,
            permission,
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(service_token)
            .json(&body)
            .send()
            .await?;

        self.decode(resp).await
    }

    /// `GET /groups/{id}` — used only by the socket upgrade path.
    pub async fn get_group(&self, service_token: &str, group_id: &str) -> Result<GroupInfo> {
        let url = format!("{}/groups/{}", self.base_url, group_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(service_token)
            .send()
            .await?;
        self.decode(resp).await
    }

    /// `GET /groups/{id}/members`.
    pub async fn get_group_members(
        &self,
        service_token: &str,
        group_id: &str,
    ) -> Result<Vec<GroupMember>> {
        let url = format!("{}/groups/{}/members", self.base_url, group_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(service_token)
            .send()
            .await?;
        self.decode(resp).await
    }

    /// `POST /oauth/token` — client-credentials grant for the Service
    /// Identity Manager.
    pub async fn fetch_service_token(
        &self,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        scope: &str,
    ) -> Result<TokenResponse> {
        let resp = self
            .client
            .post(token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("scope", scope),
            ])
            .send()
            .await?;
        self.decode(resp).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(&self, resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            return Err(AsClientError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }
        resp.json::<T>()
            .await
            .map_err(|e| AsClientError::Parse(e.to_string()))
    }
}
