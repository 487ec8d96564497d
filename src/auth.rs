//! Authentication state container
//!
//! Holds the current token pair and user. Cloning shares the same state.
//! When a `SessionStore` is attached, every change is persisted under a
//! single key so a restarted client stays logged in.

use crate::client::auth::{LoginResponse, UserInfo};
use crate::error::Result;
use crate::session::SessionStore;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

const AUTH_STORAGE_KEY: &str = "skill-compose-auth";

/// Persisted authentication data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthData {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<UserInfo>,
    #[serde(default)]
    pub must_change_password: bool,
}

/// Shared, optionally persisted authentication state
#[derive(Clone, Default)]
pub struct AuthState {
    data: Arc<RwLock<AuthData>>,
    store: Option<Arc<dyn SessionStore>>,
}

impl AuthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State backed by a store, loading whatever was saved before
    pub fn with_store(store: Arc<dyn SessionStore>) -> Result<Self> {
        let data = match store.get(AUTH_STORAGE_KEY)? {
            Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Discarding unreadable auth state");
                AuthData::default()
            }),
            None => AuthData::default(),
        };
        Ok(Self {
            data: Arc::new(RwLock::new(data)),
            store: Some(store),
        })
    }

    /// Snapshot of the current data
    pub fn snapshot(&self) -> AuthData {
        self.data.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.snapshot().access_token
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.snapshot().refresh_token
    }

    pub fn user(&self) -> Option<UserInfo> {
        self.snapshot().user
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot().access_token.is_some()
    }

    pub fn must_change_password(&self) -> bool {
        self.snapshot().must_change_password
    }

    /// Record a successful login
    pub fn set_login(&self, login: &LoginResponse) -> Result<()> {
        self.modify(|data| {
            data.access_token = Some(login.access_token.clone());
            data.refresh_token = Some(login.refresh_token.clone());
            data.user = Some(login.user.clone());
            data.must_change_password = login.must_change_password;
        })
    }

    /// Replace the access token after a refresh
    pub fn set_access_token(&self, token: &str) -> Result<()> {
        self.modify(|data| data.access_token = Some(token.to_string()))
    }

    pub fn set_user(&self, user: UserInfo) -> Result<()> {
        self.modify(|data| data.user = Some(user))
    }

    pub fn clear_password_change(&self) -> Result<()> {
        self.modify(|data| data.must_change_password = false)
    }

    /// Forget all credentials
    pub fn clear(&self) -> Result<()> {
        self.modify(|data| *data = AuthData::default())
    }

    /// Expiry of the access token, read from its `exp` claim
    pub fn access_expires_at(&self) -> Option<DateTime<Utc>> {
        self.access_token().as_deref().and_then(token_expiry)
    }

    /// Whether the access token expires within `skew` (or already has)
    pub fn needs_refresh(&self, skew: Duration) -> bool {
        match self.access_expires_at() {
            Some(exp) => exp - skew <= Utc::now(),
            None => false,
        }
    }

    fn modify(&self, f: impl FnOnce(&mut AuthData)) -> Result<()> {
        let snapshot = {
            let mut data = self.data.write().unwrap_or_else(|p| p.into_inner());
            f(&mut data);
            data.clone()
        };
        if let Some(store) = &self.store {
            if snapshot == AuthData::default() {
                store.remove(AUTH_STORAGE_KEY)?;
            } else {
                store.set(AUTH_STORAGE_KEY, &serde_json::to_string(&snapshot)?)?;
            }
        }
        Ok(())
    }
}

/// Read the `exp` claim from a JWT without verifying it
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    Utc.timestamp_opt(exp, 0).single()
}
