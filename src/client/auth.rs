//! Authentication and user management endpoints (`/auth`)

use super::{check, ApiClient};
use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};

const MIN_PASSWORD_LEN: usize = 8;
const MAX_USERNAME_LEN: usize = 64;
const MIN_USERNAME_LEN: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStatus {
    pub auth_enabled: bool,
    pub has_users: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub role: String,
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserInfo,
    #[serde(default)]
    pub must_change_password: bool,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateUser {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub role: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    /// Admin password reset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Reject passwords shorter than the platform minimum
pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ClientError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Usernames: 1-64 characters of letters, digits, `_`, `.` and `-`
pub fn validate_username(username: &str) -> Result<()> {
    let username = username.trim();
    let len = username.chars().count();
    if len < MIN_USERNAME_LEN || len > MAX_USERNAME_LEN {
        return Err(ClientError::Validation(format!(
            "Username must be {}-{} characters",
            MIN_USERNAME_LEN, MAX_USERNAME_LEN
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(ClientError::Validation(
            "Username can only contain letters, numbers, underscores, dots, and hyphens"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_role(role: &str) -> Result<()> {
    match role {
        "admin" | "user" => Ok(()),
        other => Err(ClientError::Validation(format!(
            "Invalid role '{}': must be admin or user",
            other
        ))),
    }
}

impl ApiClient {
    pub async fn auth_status(&self) -> Result<AuthStatus> {
        self.get_json("/auth/status").await
    }

    /// Log in and store the returned tokens in this client's auth state
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(ClientError::Validation(
                "Username and password are required".to_string(),
            ));
        }

        let body = serde_json::json!({ "username": username.trim(), "password": password });
        let login: LoginResponse = self.post_json("/auth/login", &body).await?;
        self.auth.set_login(&login)?;
        tracing::info!(username = %login.user.username, "Logged in");
        Ok(login)
    }

    /// Exchange the stored refresh token for a new access token
    pub async fn refresh_access_token(&self) -> Result<()> {
        let refresh_token = self
            .auth
            .refresh_token()
            .ok_or_else(|| ClientError::Unauthorized("No refresh token".to_string()))?;

        // Sent directly: `execute` may call back into this method
        let response = self
            .http
            .post(self.url("/auth/refresh"))
            .timeout(self.request_timeout)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let refreshed: RefreshResponse = check(response).await?.json().await?;

        self.auth.set_access_token(&refreshed.access_token)?;
        tracing::debug!("Access token refreshed");
        Ok(())
    }

    pub fn logout(&self) -> Result<()> {
        self.auth.clear()
    }

    pub async fn me(&self) -> Result<UserInfo> {
        let user: UserInfo = self.get_json("/auth/me").await?;
        self.auth.set_user(user.clone())?;
        Ok(user)
    }

    pub async fn change_password(&self, current_password: &str, new_password: &str) -> Result<()> {
        validate_password(new_password)?;
        let body = serde_json::json!({
            "current_password": current_password,
            "new_password": new_password,
        });
        let _: serde_json::Value = self.post_json("/auth/change-password", &body).await?;
        self.auth.clear_password_change()
    }

    pub async fn list_users(&self) -> Result<Vec<UserInfo>> {
        self.get_json("/auth/users").await
    }

    pub async fn create_user(&self, user: &CreateUser) -> Result<UserInfo> {
        validate_username(&user.username)?;
        validate_password(&user.password)?;
        validate_role(&user.role)?;
        self.post_json("/auth/users", user).await
    }

    pub async fn update_user(&self, user_id: &str, update: &UpdateUser) -> Result<UserInfo> {
        if let Some(password) = &update.password {
            validate_password(password)?;
        }
        if let Some(role) = &update.role {
            validate_role(role)?;
        }
        self.put_json(&format!("/auth/users/{}", user_id), update)
            .await
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<()> {
        self.delete(&format!("/auth/users/{}", user_id)).await
    }
}
