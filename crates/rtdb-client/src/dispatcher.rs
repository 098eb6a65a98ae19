//! Request dispatch with one-shot credential refresh.
//!
//! Every HTTP exchange made by the client goes through [`RequestDispatcher::send`].
//! A 401 triggers one forced refresh and one re-issue with a freshly built URL; the
//! second outcome is final whatever it is.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::auth::CredentialProvider;
use crate::path::{build_url, QueryParam};
use crate::policy::AuthRetryPolicy;
use crate::transport::{HttpMethod, HttpTransport, RequestOutcome};

/// Snapshot of dispatcher counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStats {
    /// HTTP exchanges issued, retries included.
    pub exchanges: u64,
    /// Forced credential refreshes that succeeded.
    pub refreshes: u64,
    /// Forced credential refreshes that failed.
    pub refresh_failures: u64,
    /// Exchanges that produced no response.
    pub transport_errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    exchanges: AtomicU64,
    refreshes: AtomicU64,
    refresh_failures: AtomicU64,
    transport_errors: AtomicU64,
}

/// Issues requests against the database root, applying the auth retry policy.
pub struct RequestDispatcher {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<dyn CredentialProvider>,
    policy: AuthRetryPolicy,
    counters: Counters,
}

impl RequestDispatcher {
    /// Create a dispatcher with the default single-refresh policy.
    pub fn new(
        base_url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport,
            credentials,
            policy: AuthRetryPolicy::default(),
            counters: Counters::default(),
        }
    }

    /// Replace the auth retry policy.
    pub fn with_policy(mut self, policy: AuthRetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Database root URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The active auth retry policy.
    pub fn policy(&self) -> AuthRetryPolicy {
        self.policy
    }

    /// Counters since creation.
    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            exchanges: self.counters.exchanges.load(Ordering::Relaxed),
            refreshes: self.counters.refreshes.load(Ordering::Relaxed),
            refresh_failures: self.counters.refresh_failures.load(Ordering::Relaxed),
            transport_errors: self.counters.transport_errors.load(Ordering::Relaxed),
        }
    }

    /// Send one logical request and return the final outcome.
    ///
    /// The token is re-read before each exchange, so a retry always carries the
    /// refreshed credential.
    pub async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        body: &str,
        params: &[QueryParam],
    ) -> RequestOutcome {
        let mut refreshes_done = 0u32;
        let mut outcome = self.exchange(method, path, body, params).await;

        while self.policy.should_refresh(&outcome, refreshes_done) {
            warn!("{} {} returned 401, refreshing credential", method, path);
            refreshes_done += 1;
            if let Err(e) = self.credentials.force_refresh().await {
                self.counters.refresh_failures.fetch_add(1, Ordering::Relaxed);
                error!("credential refresh failed for {} {}: {}", method, path, e);
                return outcome;
            }
            self.counters.refreshes.fetch_add(1, Ordering::Relaxed);
            outcome = self.exchange(method, path, body, params).await;
        }

        if outcome.is_unauthorized() && refreshes_done > 0 {
            error!(
                "{} {} still unauthorized after refresh; check account credentials or database rules",
                method, path
            );
        }
        outcome
    }

    async fn exchange(
        &self,
        method: HttpMethod,
        path: &str,
        body: &str,
        params: &[QueryParam],
    ) -> RequestOutcome {
        let token = self.credentials.current_token().await;
        let url = build_url(&self.base_url, path, params, &token);

        self.counters.exchanges.fetch_add(1, Ordering::Relaxed);
        let outcome = self.transport.perform(method, &url, body).await;

        match &outcome.transport_error {
            Some(reason) => {
                self.counters.transport_errors.fetch_add(1, Ordering::Relaxed);
                warn!("{} {} transport error: {}", method, path, reason);
            }
            None => debug!("{} {} -> {}", method, path, outcome.status),
        }
        outcome
    }
}
