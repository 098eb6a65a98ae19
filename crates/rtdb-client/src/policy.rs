//! Credential-expiry retry policy.
//!
//! The dispatcher consults this policy after every exchange instead of carrying
//! per-operation retry logic, so the refresh budget is enforced in exactly one place.

use crate::transport::RequestOutcome;

/// Configuration for refresh-and-retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthRetryPolicy {
    /// Maximum forced refreshes per logical request (default: 1).
    pub max_refreshes: u32,
}

impl Default for AuthRetryPolicy {
    fn default() -> Self {
        Self { max_refreshes: 1 }
    }
}

impl AuthRetryPolicy {
    /// Never refresh; a 401 is final immediately.
    pub fn disabled() -> Self {
        Self { max_refreshes: 0 }
    }

    /// Whether the dispatcher should force a credential refresh and re-issue.
    ///
    /// True only for a non-success outcome whose status is 401 while refreshes
    /// remain in the budget.
    pub fn should_refresh(&self, outcome: &RequestOutcome, refreshes_done: u32) -> bool {
        !outcome.is_success() && outcome.status == 401 && refreshes_done < self.max_refreshes
    }

    /// Upper bound on exchanges for one logical request.
    pub fn max_exchanges(&self) -> u32 {
        self.max_refreshes + 1
    }
}
