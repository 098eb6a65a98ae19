//! Error types for the realtime database client.

use thiserror::Error;

use crate::transport::HttpMethod;

/// Result type alias for database operations.
pub type RtdbResult<T> = Result<T, RtdbError>;

/// Error variants for database operations.
#[derive(Debug, Error)]
pub enum RtdbError {
    /// No response was obtained (network, TLS, timeout).
    #[error("Transport error on {method} {path}: {reason}")]
    Transport {
        /// The HTTP method of the failed exchange.
        method: HttpMethod,
        /// The logical database path.
        path: String,
        /// Description reported by the transport.
        reason: String,
    },

    /// The server kept rejecting the credential after the one-shot refresh.
    #[error("Unauthorized {method} {path}: credential rejected after refresh")]
    Unauthorized {
        /// The HTTP method of the failed exchange.
        method: HttpMethod,
        /// The logical database path.
        path: String,
    },

    /// The node is too large to be deleted in a single exchange.
    #[error("Payload too large to delete at {path}")]
    PayloadTooLarge {
        /// The logical database path.
        path: String,
    },

    /// Any other non-success HTTP status.
    #[error("{method} {path} failed with status {status}")]
    RequestFailed {
        /// The HTTP method of the failed exchange.
        method: HttpMethod,
        /// The logical database path.
        path: String,
        /// The HTTP status code returned by the server.
        status: u16,
    },

    /// The response body is not the JSON shape the operation expects.
    #[error("Malformed response at {path}: {reason}")]
    MalformedResponse {
        /// The logical database path.
        path: String,
        /// Description of the parse failure.
        reason: String,
    },

    /// Chunked deletion removed only some children and the parent is still present.
    #[error("Partial delete at {path}: {deleted}/{total} children removed")]
    PartialDelete {
        /// The logical database path.
        path: String,
        /// Children successfully deleted.
        deleted: usize,
        /// Children found by the listing.
        total: usize,
    },

    /// A structured write body could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {reason}")]
    Config {
        /// Description of the problem.
        reason: String,
    },
}

impl RtdbError {
    /// HTTP status code carried by this error, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            RtdbError::Unauthorized { .. } => Some(401),
            RtdbError::PayloadTooLarge { .. } => Some(400),
            RtdbError::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the failure happened before any HTTP response was received.
    pub fn is_transport(&self) -> bool {
        matches!(self, RtdbError::Transport { .. })
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        RtdbError::Config {
            reason: reason.into(),
        }
    }
}

/// Failure of the credential collaborator.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The identity endpoint could not be reached.
    #[error("Auth transport error: {0}")]
    Transport(String),

    /// The identity endpoint refused the credentials or refresh token.
    #[error("Auth rejected with status {status}: {message}")]
    Rejected {
        /// HTTP status returned by the identity endpoint.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// The identity endpoint answered with an unexpected body.
    #[error("Malformed auth response: {0}")]
    Malformed(String),
}

/// Failure of a push-key batch trim, mirroring the two phases of the operation.
#[derive(Debug, Error)]
pub enum TrimError {
    /// The ordered listing of the oldest children failed.
    #[error("Listing oldest children failed: {0}")]
    Listing(#[source] RtdbError),

    /// The bulk tombstone patch failed.
    #[error("Removing oldest children failed: {0}")]
    Patch(#[source] RtdbError),
}

impl TrimError {
    /// Legacy integer code: -1 for a listing failure, -2 for a patch failure.
    pub fn sentinel(&self) -> i32 {
        match self {
            TrimError::Listing(_) => -1,
            TrimError::Patch(_) => -2,
        }
    }
}
