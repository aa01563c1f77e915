use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ApiError;
use crate::session::SessionStore;

/// One pool member as last observed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub url: String,
    #[serde(default)]
    pub alive: bool,
    #[serde(default)]
    pub last_test: String,
}

/// Per-proxy statistics, polled independently from the live pool list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyStatsRecord {
    pub url: String,
    #[serde(default)]
    pub alive: bool,
    #[serde(default)]
    pub last_test: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub fail_count: u64,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Allocation {
    pub allocated: String,
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// REST client for the proxy-pool backend.
///
/// Sole point of contact with the remote service. The bearer token is re-read
/// from the session store on every request; writes to the store only happen
/// at login and logout, never while requests are in flight.
pub struct PoolClient {
    base_url: Url,
    session: Arc<SessionStore>,
    http: Client,
}

impl PoolClient {
    pub fn new(base_url: Url, session: Arc<SessionStore>, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url,
            session,
            http,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    /// Issue one request. Non-2xx responses become a single `ApiError::Api`
    /// carrying the body text; a 2xx with an empty body yields `None`.
    async fn request<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Option<T>, ApiError> {
        let mut req = self.http.request(method, self.api_url(path));
        if let Some(token) = self.session.get() {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ApiError::Transport(format!("request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Transport(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            let message = text.trim();
            return Err(ApiError::Api(if message.is_empty() {
                "API error".to_string()
            } else {
                message.to_string()
            }));
        }

        if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&text)?))
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<TokenResponse, ApiError> {
        self.request(
            Method::POST,
            "/auth/login",
            Some(&AuthRequest { username, password }),
        )
        .await?
        .ok_or_else(|| ApiError::Internal("empty login response".into()))
    }

    /// Register a new account. The backend answers with an empty body.
    pub async fn register(&self, username: &str, password: &str) -> Result<(), ApiError> {
        self.request::<_, serde_json::Value>(
            Method::POST,
            "/auth/register",
            Some(&AuthRequest { username, password }),
        )
        .await?;
        Ok(())
    }

    /// List the pool's current membership.
    pub async fn list_proxies(&self) -> Result<Vec<ProxyRecord>, ApiError> {
        self.request::<(), Vec<ProxyRecord>>(Method::GET, "/proxies", None)
            .await?
            .ok_or_else(|| ApiError::Internal("empty proxy list response".into()))
    }

    /// Claim one proxy from the pool.
    pub async fn allocate(&self) -> Result<Allocation, ApiError> {
        self.request::<(), Allocation>(Method::POST, "/allocate", None)
            .await?
            .ok_or_else(|| ApiError::Internal("empty allocation response".into()))
    }

    /// Fetch historical per-proxy statistics.
    pub async fn stats(&self) -> Result<Vec<ProxyStatsRecord>, ApiError> {
        self.request::<(), Vec<ProxyStatsRecord>>(Method::GET, "/proxies/stats", None)
            .await?
            .ok_or_else(|| ApiError::Internal("empty stats response".into()))
    }
}
