//! Credential providers.
//!
//! The client core only ever reads the current token and, after a 401, asks the
//! provider to refresh it. Providers own the token and all of its lifecycle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::AuthError;

/// Default Identity Toolkit endpoint for email/password sign-in.
pub const DEFAULT_IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// Default Secure Token endpoint for refresh-token exchange.
pub const DEFAULT_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";

/// Source of the `auth` query parameter.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// The token to attach to the next request.
    async fn current_token(&self) -> String;

    /// Block until a new token is available or refreshing fails.
    async fn force_refresh(&self) -> Result<(), AuthError>;
}

/// A fixed credential: a database secret, a pre-minted ID token, or empty for
/// public rules. Refreshing is a no-op.
#[derive(Clone, Default)]
pub struct StaticToken {
    token: String,
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken")
            .field("token", &redacted(&self.token))
            .finish()
    }
}

impl StaticToken {
    /// Wrap a fixed token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// No credential at all.
    pub fn anonymous() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn current_token(&self) -> String {
        self.token.clone()
    }

    async fn force_refresh(&self) -> Result<(), AuthError> {
        debug!("static token cannot be refreshed; keeping current value");
        Ok(())
    }
}

#[derive(Clone, Default)]
struct TokenState {
    id_token: String,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for TokenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenState")
            .field("id_token", &redacted(&self.id_token))
            .field(
                "refresh_token",
                &self.refresh_token.as_deref().map(redacted),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Placeholder shown instead of a secret; empty secrets stay visibly empty.
fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "[REDACTED]"
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    refresh_token: Option<String>,
    expires_in: Option<String>,
}

#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: Option<String>,
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Email/password user account authenticated against the Identity Toolkit REST API.
///
/// `force_refresh` exchanges the refresh token first and falls back to a full
/// sign-in when there is none or the exchange is rejected.
pub struct PasswordAuth {
    client: Client,
    api_key: String,
    email: String,
    password: String,
    identity_url: String,
    token_url: String,
    state: RwLock<TokenState>,
}

impl std::fmt::Debug for PasswordAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordAuth")
            .field("api_key", &redacted(&self.api_key))
            .field("email", &self.email)
            .field("password", &redacted(&self.password))
            .field("identity_url", &self.identity_url)
            .field("token_url", &self.token_url)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl PasswordAuth {
    /// Create a provider for the given web API key and user account.
    pub fn new(
        api_key: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            email: email.into(),
            password: password.into(),
            identity_url: DEFAULT_IDENTITY_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            state: RwLock::new(TokenState::default()),
        }
    }

    /// Point the provider at other identity endpoints (emulators, tests).
    pub fn with_endpoints(
        mut self,
        identity_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        self.identity_url = identity_url.into().trim_end_matches('/').to_string();
        self.token_url = token_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// When the current token expires, if known.
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.expires_at
    }

    /// Whether the token is missing or expires within `margin`.
    pub async fn needs_refresh(&self, margin: Duration) -> bool {
        let state = self.state.read().await;
        if state.id_token.is_empty() {
            return true;
        }
        match state.expires_at {
            Some(expires_at) => {
                let margin = chrono::Duration::from_std(margin).unwrap_or_else(|_| chrono::Duration::zero());
                Utc::now() + margin >= expires_at
            }
            None => false,
        }
    }

    /// Full email/password sign-in.
    pub async fn sign_in(&self) -> Result<(), AuthError> {
        let url = format!(
            "{}/accounts:signInWithPassword?key={}",
            self.identity_url, self.api_key
        );
        let body = json!({
            "email": self.email,
            "password": self.password,
            "returnSecureToken": true,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        let response = check_status(response).await?;
        let parsed: SignInResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Malformed(e.to_string()))?;

        self.store(parsed.id_token, parsed.refresh_token, parsed.expires_in)
            .await;
        info!("signed in as {}", self.email);
        Ok(())
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<(), AuthError> {
        let url = format!("{}/token?key={}", self.token_url, self.api_key);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        let response = check_status(response).await?;
        let parsed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Malformed(e.to_string()))?;

        self.store(parsed.id_token, parsed.refresh_token, parsed.expires_in)
            .await;
        debug!("refresh token exchanged for a new ID token");
        Ok(())
    }

    async fn store(&self, id_token: String, refresh_token: Option<String>, expires_in: Option<String>) {
        let expires_at = expires_in
            .and_then(|secs| secs.parse::<i64>().ok())
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));

        let mut state = self.state.write().await;
        state.id_token = id_token;
        if refresh_token.is_some() {
            state.refresh_token = refresh_token;
        }
        state.expires_at = expires_at;
    }
}

#[async_trait]
impl CredentialProvider for PasswordAuth {
    async fn current_token(&self) -> String {
        self.state.read().await.id_token.clone()
    }

    async fn force_refresh(&self) -> Result<(), AuthError> {
        let refresh_token = self.state.read().await.refresh_token.clone();
        if let Some(refresh_token) = refresh_token {
            match self.exchange_refresh_token(&refresh_token).await {
                Ok(()) => return Ok(()),
                Err(e) => warn!("refresh token exchange failed, signing in again: {}", e),
            }
        }
        self.sign_in().await
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, AuthError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&text)
        .map(|envelope| envelope.error.message)
        .unwrap_or(text);
    Err(AuthError::Rejected { status, message })
}

/// Refresh `provider` every `interval`, independently of request traffic.
///
/// The first refresh happens one full interval after spawning. Failures are logged
/// and the loop keeps going; abort the handle to stop it.
pub fn spawn_refresh_loop(
    provider: Arc<dyn CredentialProvider>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            info!("periodic token refresh");
            match provider.force_refresh().await {
                Ok(()) => debug!("periodic token refresh ok"),
                Err(e) => warn!("periodic token refresh failed: {}", e),
            }
        }
    })
}
