//! HTTP transport seam.
//!
//! The client core never talks to the network directly. It hands a fully built URL,
//! a method and a body to an [`HttpTransport`] and gets back a [`RequestOutcome`]
//! that keeps transport failures apart from HTTP-level failures.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use tracing::debug;

use crate::error::{RtdbError, RtdbResult};

/// HTTP methods understood by the database REST surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// Read a node, optionally shallow.
    Get,
    /// Overwrite a node.
    Put,
    /// Append a child under a server-generated push key.
    Post,
    /// Merge top-level keys; null deletes a key.
    Patch,
    /// Remove a node and all descendants.
    Delete,
}

impl HttpMethod {
    /// Upper-case method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    fn to_reqwest(self) -> Method {
        match self {
            HttpMethod::Get => Method::GET,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Post => Method::POST,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized result of one HTTP exchange. Created per request and consumed immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    /// Set when no usable response was obtained.
    pub transport_error: Option<String>,
    /// HTTP status code, 0 if the server never answered.
    pub status: u16,
    /// Raw response body.
    pub body: String,
}

impl RequestOutcome {
    /// An answered exchange.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            transport_error: None,
            status,
            body: body.into(),
        }
    }

    /// An exchange that produced no response.
    pub fn transport_failure(reason: impl Into<String>) -> Self {
        Self {
            transport_error: Some(reason.into()),
            status: 0,
            body: String::new(),
        }
    }

    /// Transport ok and status 200.
    pub fn is_success(&self) -> bool {
        self.transport_error.is_none() && self.status == 200
    }

    /// Transport ok and any 2xx status.
    pub fn is_2xx(&self) -> bool {
        self.transport_error.is_none() && (200..300).contains(&self.status)
    }

    /// The server rejected the credential.
    pub fn is_unauthorized(&self) -> bool {
        self.transport_error.is_none() && self.status == 401
    }

    /// Map the outcome onto the error taxonomy, yielding the body on success.
    pub fn into_result(self, method: HttpMethod, path: &str) -> RtdbResult<String> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(self.into_error(method, path))
        }
    }

    /// Classify a failed outcome. A non-200 2xx status is reported as `RequestFailed`.
    pub fn into_error(self, method: HttpMethod, path: &str) -> RtdbError {
        if let Some(reason) = self.transport_error {
            return RtdbError::Transport {
                method,
                path: path.to_string(),
                reason,
            };
        }
        match self.status {
            401 => RtdbError::Unauthorized {
                method,
                path: path.to_string(),
            },
            status => RtdbError::RequestFailed {
                method,
                path: path.to_string(),
                status,
            },
        }
    }
}

/// Performs one HTTP exchange.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue `method` against `url` with `body` (empty for none).
    async fn perform(&self, method: HttpMethod, url: &str, body: &str) -> RequestOutcome;
}

/// [`HttpTransport`] backed by a `reqwest` client.
///
/// Each response body is read into a fresh buffer owned by the returned outcome, so
/// nothing from one exchange is visible to the next.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> RtdbResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RtdbError::config(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn perform(&self, method: HttpMethod, url: &str, body: &str) -> RequestOutcome {
        let mut request = self
            .client
            .request(method.to_reqwest(), url)
            .header(CONTENT_TYPE, "application/json");
        if !body.is_empty() {
            request = request.body(body.to_owned());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return RequestOutcome::transport_failure(e.to_string()),
        };

        let status = response.status().as_u16();
        match response.text().await {
            Ok(text) => {
                debug!("{} exchange finished: status={} bytes={}", method, status, text.len());
                RequestOutcome::new(status, text)
            }
            Err(e) => RequestOutcome {
                transport_error: Some(format!("read error: {}", e)),
                status,
                body: String::new(),
            },
        }
    }
}
