#![warn(missing_docs)]

//! Client for a hosted JSON-tree realtime database over its REST surface.
//!
//! Request path: Store/Retention → DeletionEngine → RequestDispatcher (auth + one-shot
//! 401 refresh) → HttpTransport
//!
//! Every node is addressed as `<root><path>.json?...&auth=<token>`. Deletes that are too
//! large for one exchange fall back to depth-first, child-by-child deletion.

pub mod auth;
pub mod client;
pub mod config;
pub mod deletion;
pub mod dispatcher;
pub mod error;
pub mod listing;
pub mod mock;
pub mod path;
pub mod policy;
pub mod retention;
pub mod store;
pub mod transport;

pub use auth::{CredentialProvider, PasswordAuth, StaticToken};
pub use client::RtdbClient;
pub use config::{AuthConfig, DatabaseConfig};
pub use deletion::DeletionEngine;
pub use dispatcher::{DispatcherStats, RequestDispatcher};
pub use error::{AuthError, RtdbError, RtdbResult, TrimError};
pub use listing::ChildKeySet;
pub use policy::AuthRetryPolicy;
pub use retention::{RetentionManager, TrimSummary};
pub use store::RecordStore;
pub use transport::{HttpMethod, HttpTransport, ReqwestTransport, RequestOutcome};
