//! Client configuration loaded from TOML or JSON.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RtdbError, RtdbResult};

/// How the client obtains its credential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum AuthConfig {
    /// Empty token, public rules only.
    #[default]
    Anonymous,
    /// A fixed database secret or pre-issued ID token.
    Static {
        /// The token sent as `auth=`.
        token: String,
    },
    /// Email/password user account.
    Password {
        /// Web API key of the project.
        api_key: String,
        /// Account email.
        email: String,
        /// Account password.
        password: String,
    },
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthConfig::Anonymous => write!(f, "Anonymous"),
            AuthConfig::Static { .. } => f
                .debug_struct("Static")
                .field("token", &"[REDACTED]")
                .finish(),
            AuthConfig::Password { email, .. } => f
                .debug_struct("Password")
                .field("api_key", &"[REDACTED]")
                .field("email", email)
                .field("password", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Connection settings for one database.
///
/// `Debug` output never contains credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Root URL, e.g. `https://demo-default-rtdb.firebaseio.com`.
    pub database_url: String,
    /// Transport timeout per exchange.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Pause between sibling deletions of a chunked delete.
    #[serde(default = "default_child_delete_pause_ms")]
    pub child_delete_pause_ms: u64,
    /// Pause between deletions of a day-based trim.
    #[serde(default = "default_trim_pause_ms")]
    pub trim_pause_ms: u64,
    /// Period of the proactive token refresh task.
    #[serde(default = "default_token_refresh_interval_secs")]
    pub token_refresh_interval_secs: u64,
    /// Credential source.
    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_child_delete_pause_ms() -> u64 {
    10
}

fn default_trim_pause_ms() -> u64 {
    20
}

fn default_token_refresh_interval_secs() -> u64 {
    3000
}

impl DatabaseConfig {
    /// Defaults for everything but the URL.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            request_timeout_secs: default_request_timeout_secs(),
            child_delete_pause_ms: default_child_delete_pause_ms(),
            trim_pause_ms: default_trim_pause_ms(),
            token_refresh_interval_secs: default_token_refresh_interval_secs(),
            auth: AuthConfig::default(),
        }
    }

    /// Load from a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> RtdbResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RtdbError::config(format!("{}: {}", path.display(), e)))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: DatabaseConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents).map_err(|e| RtdbError::config(e.to_string()))?,
            "json" => serde_json::from_str(&contents).map_err(|e| RtdbError::config(e.to_string()))?,
            _ => {
                return Err(RtdbError::config(format!(
                    "Unsupported config file extension: {}",
                    ext
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject unusable settings.
    pub fn validate(&self) -> RtdbResult<()> {
        let url = self.database_url.trim();
        if url.is_empty() {
            return Err(RtdbError::config("database_url is empty"));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(RtdbError::config(format!(
                "database_url must be http(s): {}",
                url
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(RtdbError::config("request_timeout_secs must be positive"));
        }
        Ok(())
    }

    /// Root URL without trailing slashes.
    pub fn base_url(&self) -> &str {
        self.database_url.trim().trim_end_matches('/')
    }

    /// Timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Pause between sibling deletions.
    pub fn child_delete_pause(&self) -> Duration {
        Duration::from_millis(self.child_delete_pause_ms)
    }

    /// Pause between trim deletions.
    pub fn trim_pause(&self) -> Duration {
        Duration::from_millis(self.trim_pause_ms)
    }

    /// Period of the proactive token refresh.
    pub fn token_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.token_refresh_interval_secs)
    }
}
