//! HTTP client for the platform API
//!
//! `ApiClient` wraps a `reqwest::Client` with the `/api/v1` base URL, bearer
//! authentication and the platform's error conventions: non-success
//! responses carry `{"detail": ...}` where detail is a string or a list of
//! validation items. Requests are never retried, except once after a
//! successful token refresh.
//!
//! Endpoint groups live in submodules as inherent methods on `ApiClient`.

use crate::auth::AuthState;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

pub mod agents;
pub mod auth;
pub mod channels;
pub mod scheduler;
pub mod sessions;
pub mod stream;

/// Refresh the access token this long before it expires
const REFRESH_SKEW_SECS: i64 = 30;

/// Typed client for the platform's JSON API
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_base: String,
    request_timeout: Duration,
    auth: AuthState,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: config.api_base(),
            request_timeout: config.request_timeout(),
            auth: AuthState::new(),
        })
    }

    /// Use the given (possibly persisted) auth state
    pub fn with_auth(mut self, auth: AuthState) -> Self {
        self.auth = auth;
        self
    }

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// Send a request built by `build`, handling auth and error mapping
    ///
    /// `streaming` requests skip the per-request timeout so long-running
    /// event streams are never cut off client-side.
    pub(crate) async fn execute(
        &self,
        path: &str,
        streaming: bool,
        build: impl Fn(&reqwest::Client) -> RequestBuilder,
    ) -> Result<Response> {
        let is_auth_call = path.starts_with("/auth/login") || path.starts_with("/auth/refresh");

        if !is_auth_call
            && self.auth.refresh_token().is_some()
            && self.auth.needs_refresh(chrono::Duration::seconds(REFRESH_SKEW_SECS))
        {
            if let Err(e) = self.refresh_access_token().await {
                tracing::debug!(error = %e, "Proactive token refresh failed");
            }
        }

        let response = self.send_once(streaming, &build).await?;
        if response.status() != StatusCode::UNAUTHORIZED
            || is_auth_call
            || self.auth.refresh_token().is_none()
        {
            return check(response).await;
        }

        tracing::debug!(path = %path, "Access token rejected, refreshing");
        match self.refresh_access_token().await {
            Ok(()) => check(self.send_once(streaming, &build).await?).await,
            Err(e) => {
                tracing::info!(error = %e, "Token refresh failed, clearing credentials");
                self.auth.clear()?;
                Err(ClientError::Unauthorized(
                    "Session expired, please log in again".to_string(),
                ))
            }
        }
    }

    async fn send_once(
        &self,
        streaming: bool,
        build: &impl Fn(&reqwest::Client) -> RequestBuilder,
    ) -> Result<Response> {
        let mut request = build(&self.http);
        if !streaming {
            request = request.timeout(self.request_timeout);
        }
        if let Some(token) = self.auth.access_token() {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request_json::<(), T>(Method::GET, path, None, &[]).await
    }

    pub(crate) async fn get_json_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        self.request_json::<(), T>(Method::GET, path, None, query)
            .await
    }

    pub(crate) async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.request_json(Method::POST, path, Some(body), &[]).await
    }

    pub(crate) async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request_json::<(), T>(Method::POST, path, None, &[]).await
    }

    pub(crate) async fn put_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.request_json(Method::PUT, path, Some(body), &[]).await
    }

    /// DELETE, ignoring any response body
    pub(crate) async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path);
        self.execute(path, false, |http| http.delete(&url)).await?;
        Ok(())
    }

    async fn request_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.url(path);
        let body = body.map(serde_json::to_value).transpose()?;

        let response = self
            .execute(path, false, |http| {
                let mut request = http.request(method.clone(), &url);
                if !query.is_empty() {
                    request = request.query(query);
                }
                if let Some(body) = &body {
                    request = request.json(body);
                }
                request
            })
            .await?;

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return serde_json::from_value(serde_json::Value::Null).map_err(Into::into);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Map a non-success response to `ClientError`
pub(crate) async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = extract_detail(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string()
    });

    tracing::debug!(status = status.as_u16(), detail = %detail, "API request failed");
    Err(match status {
        StatusCode::NOT_FOUND => ClientError::NotFound(detail),
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized(detail),
        _ => ClientError::Api {
            status: status.as_u16(),
            detail,
        },
    })
}

/// Best-effort extraction of a human-readable error message
///
/// Accepts `{"detail": "..."}`, `{"detail": [{"msg": "..."}]}` (validation
/// errors), `{"message": "..."}` and `{"error": "..."}`; falls back to the
/// raw body when it is short plain text.
pub fn extract_detail(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return (body.len() <= 500 && !body.starts_with('<')).then(|| body.to_string());
    };

    match value.get("detail") {
        Some(serde_json::Value::String(s)) => return Some(s.clone()),
        Some(serde_json::Value::Array(items)) => {
            if let Some(msg) = items
                .first()
                .and_then(|item| item.get("msg"))
                .and_then(|m| m.as_str())
            {
                return Some(msg.to_string());
            }
        }
        Some(other) if !other.is_null() => return Some(other.to_string()),
        _ => {}
    }

    ["message", "error"]
        .iter()
        .find_map(|k| value.get(*k).and_then(|v| v.as_str()))
        .map(str::to_string)
}
