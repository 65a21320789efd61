//! `/api/auth/*` routes

use super::{ApiClient, ApiRequest};
use crate::error::{Error, Result};
use crate::models::{Envelope, UserProfile};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Clone, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Registration form. Accounts start inactive until an admin enables them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub last_name: String,
    pub division: String,
}

impl RegisterRequest {
    /// Trim user-entered fields the way the backend expects them
    pub fn normalized(self) -> Self {
        Self {
            email: self.email.trim().to_string(),
            password: self.password,
            name: self.name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            division: self.division.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct LoginData {
    #[serde(default)]
    user: Option<LoginUser>,
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct LoginUser {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProfileData {
    user: UserProfile,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DisclaimerData {
    disclaimer_checked: bool,
}

/// Who logged in
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub name: String,
}

impl ApiClient {
    /// Log in and persist the returned token and user name
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome> {
        let body = LoginRequest {
            email: email.trim(),
            password,
        };
        let response: Envelope<Option<LoginData>> = self
            .fetch("/api/auth/login", ApiRequest::post().json(&body))
            .await?;

        let data = response.data.unwrap_or(LoginData {
            user: None,
            token: None,
        });
        let token = data.token.filter(|t| !t.is_empty());
        let name = data.user.and_then(|u| u.name).filter(|n| !n.is_empty());

        let (Some(token), Some(name)) = (token, name) else {
            return Err(Error::Other(
                "No token or user name received from the server".to_string(),
            ));
        };

        self.tokens().save(&token, &name)?;
        info!("Logged in as {}", name);
        Ok(LoginOutcome { name })
    }

    /// Register a new account; returns the backend's message
    pub async fn register(&self, request: RegisterRequest) -> Result<Option<String>> {
        let response: Envelope<Option<Value>> = self
            .fetch(
                "/api/auth/register",
                ApiRequest::post().json(&request.normalized()),
            )
            .await?;
        if !response.success {
            return Err(Error::Other(
                response
                    .message
                    .unwrap_or_else(|| "Registration failed".to_string()),
            ));
        }
        Ok(response.message)
    }

    /// Profile of the logged in user
    pub async fn fetch_me(&self) -> Result<UserProfile> {
        let response: Envelope<ProfileData> = self
            .fetch("/api/auth/fetchme", ApiRequest::get().authenticated())
            .await?;
        Ok(response.data.user)
    }

    /// Record whether the user accepted the usage disclaimer
    pub async fn set_disclaimer(&self, checked: bool) -> Result<bool> {
        let response: Envelope<DisclaimerData> = self
            .fetch(
                "/api/auth/disclaimer",
                ApiRequest::post()
                    .json(&json!({ "checked": checked }))
                    .authenticated(),
            )
            .await?;
        Ok(response.data.disclaimer_checked)
    }

    /// Forget the local session
    pub fn logout(&self) {
        self.tokens().remove();
        info!("Logged out");
    }
}
