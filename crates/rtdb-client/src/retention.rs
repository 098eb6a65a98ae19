//! Retention policies over the immediate children of a node.
//!
//! Two eviction strategies:
//! - [`RetentionManager::trim_days`] keeps the newest `max_days` children of a node
//!   whose keys are day identifiers, deleting the rest one by one. Newest means
//!   lexicographically greatest, so the key scheme must sort chronologically
//!   (`YY-MM-DD` works, `DD-MM-YY` does not).
//! - [`RetentionManager::trim_oldest_batch`] removes the `batch_size` smallest push
//!   keys with one ordered listing and one tombstone PATCH.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::deletion::DeletionEngine;
use crate::dispatcher::RequestDispatcher;
use crate::error::{RtdbResult, TrimError};
use crate::listing::{parse_body, shallow_listing, ChildKeySet};
use crate::path::{self, QueryParam};
use crate::transport::HttpMethod;

/// Default pause between deletions in [`RetentionManager::trim_days`].
pub const DEFAULT_TRIM_PAUSE: Duration = Duration::from_millis(20);

/// What a day-based trim did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimSummary {
    /// Children found under the root.
    pub examined: usize,
    /// Keys removed, oldest first.
    pub deleted: Vec<String>,
    /// Keys whose deletion failed.
    pub failed: Vec<String>,
}

impl TrimSummary {
    fn untouched(examined: usize) -> Self {
        Self {
            examined,
            ..Self::default()
        }
    }
}

/// Evicts the oldest children of a node.
#[derive(Clone)]
pub struct RetentionManager {
    dispatcher: Arc<RequestDispatcher>,
    deletion: DeletionEngine,
    trim_pause: Duration,
}

impl RetentionManager {
    /// Create a manager deleting through `deletion`.
    pub fn new(dispatcher: Arc<RequestDispatcher>, deletion: DeletionEngine) -> Self {
        Self {
            dispatcher,
            deletion,
            trim_pause: DEFAULT_TRIM_PAUSE,
        }
    }

    /// Set the pause between deletions in `trim_days`.
    pub fn with_trim_pause(mut self, pause: Duration) -> Self {
        self.trim_pause = pause;
        self
    }

    /// Keep at most `max_days` children under `root_path`, deleting the
    /// lexicographically smallest keys first.
    ///
    /// `max_days == 0` is treated as invalid input and deletes nothing. A failed
    /// listing is an error; individual deletion failures are recorded in the summary
    /// without failing the call.
    pub async fn trim_days(&self, root_path: &str, max_days: usize) -> RtdbResult<TrimSummary> {
        if max_days == 0 {
            warn!("trim_days on {} with max_days=0, nothing to do", root_path);
            return Ok(TrimSummary::default());
        }

        let Some(keys) = shallow_listing(&self.dispatcher, root_path).await? else {
            debug!("trim_days: {} has no children", root_path);
            return Ok(TrimSummary::default());
        };

        let examined = keys.len();
        if examined <= max_days {
            debug!("trim_days: {} has {} <= {} children", root_path, examined, max_days);
            return Ok(TrimSummary::untouched(examined));
        }

        let sorted = keys.sorted();
        let excess = examined - max_days;
        let mut summary = TrimSummary::untouched(examined);

        for (i, key) in sorted.into_iter().take(excess).enumerate() {
            let child = path::child(root_path, &key);
            match self.deletion.delete(&child).await {
                Ok(()) => summary.deleted.push(key),
                Err(e) => {
                    warn!("trim_days: failed to delete {}: {}", child, e);
                    summary.failed.push(key);
                }
            }
            if i + 1 < excess && !self.trim_pause.is_zero() {
                tokio::time::sleep(self.trim_pause).await;
            }
        }

        info!(
            "trim_days: {} kept {}, deleted {}, failed {}",
            root_path,
            max_days,
            summary.deleted.len(),
            summary.failed.len()
        );
        Ok(summary)
    }

    /// Remove the `batch_size` oldest children of `root_path` in one PATCH.
    ///
    /// Relies on push keys sorting in creation order. Returns the number of keys
    /// removed; fewer than `batch_size` when the node holds fewer children.
    pub async fn trim_oldest_batch(
        &self,
        root_path: &str,
        batch_size: usize,
    ) -> Result<usize, TrimError> {
        if batch_size == 0 {
            return Ok(0);
        }

        let params = [
            QueryParam::order_by_key(),
            QueryParam::limit_to_first(batch_size),
        ];
        let body = self
            .dispatcher
            .send(HttpMethod::Get, root_path, "", &params)
            .await
            .into_result(HttpMethod::Get, root_path)
            .map_err(|e| {
                error!("trim_oldest_batch: listing {} failed: {}", root_path, e);
                TrimError::Listing(e)
            })?;

        let keys = match parse_body(root_path, &body) {
            Ok(value) => ChildKeySet::from_value(&value),
            Err(e) => {
                warn!("trim_oldest_batch: unusable listing of {}: {}", root_path, e);
                None
            }
        };
        let keys = match keys {
            Some(keys) if !keys.is_empty() => keys,
            _ => {
                debug!("trim_oldest_batch: nothing to remove under {}", root_path);
                return Ok(0);
            }
        };

        let tombstones: Map<String, Value> = keys
            .iter()
            .map(|key| (key.clone(), Value::Null))
            .collect();
        let patch_body = Value::Object(tombstones).to_string();

        let outcome = self
            .dispatcher
            .send(
                HttpMethod::Patch,
                root_path,
                &patch_body,
                &[QueryParam::print_silent()],
            )
            .await;
        if !outcome.is_2xx() {
            error!(
                "trim_oldest_batch: PATCH {} failed (status={})",
                root_path, outcome.status
            );
            return Err(TrimError::Patch(outcome.into_error(HttpMethod::Patch, root_path)));
        }

        info!("trim_oldest_batch: removed {} from {}", keys.len(), root_path);
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use crate::mock::{MemoryDatabase, ScriptedTransport};
    use crate::transport::RequestOutcome;
    use serde_json::json;

    fn manager_over(db: Arc<MemoryDatabase>) -> RetentionManager {
        let dispatcher = Arc::new(RequestDispatcher::new(
            "http://db.local",
            db,
            Arc::new(StaticToken::anonymous()),
        ));
        let deletion = DeletionEngine::new(dispatcher.clone()).with_child_pause(Duration::ZERO);
        RetentionManager::new(dispatcher, deletion).with_trim_pause(Duration::ZERO)
    }

    fn scripted_manager(outcomes: Vec<RequestOutcome>) -> (RetentionManager, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(outcomes));
        let dispatcher = Arc::new(RequestDispatcher::new(
            "http://db.local",
            transport.clone(),
            Arc::new(StaticToken::anonymous()),
        ));
        let deletion = DeletionEngine::new(dispatcher.clone()).with_child_pause(Duration::ZERO);
        (
            RetentionManager::new(dispatcher, deletion).with_trim_pause(Duration::ZERO),
            transport,
        )
    }

    fn seed_days(db: &MemoryDatabase, root: &str, days: &[&str]) {
        for day in days {
            db.seed(&format!("{}/{}", root, day), json!({"pm2p5": 1.0}));
        }
    }

    #[tokio::test]
    async fn test_trim_days_keeps_newest() {
        let db = Arc::new(MemoryDatabase::new());
        seed_days(&db, "/dias", &["24-01-03", "24-01-01", "24-01-05", "24-01-02", "24-01-04"]);
        let manager = manager_over(db.clone());

        let summary = manager.trim_days("/dias", 2).await.unwrap();
        assert_eq!(summary.examined, 5);
        assert_eq!(summary.deleted, vec!["24-01-01", "24-01-02", "24-01-03"]);
        assert!(summary.failed.is_empty());
        assert_eq!(db.child_keys("/dias"), vec!["24-01-04", "24-01-05"]);
    }

    #[tokio::test]
    async fn test_trim_days_noop_when_within_limit() {
        let db = Arc::new(MemoryDatabase::new());
        seed_days(&db, "/dias", &["24-01-01", "24-01-02"]);
        let manager = manager_over(db.clone());

        let summary = manager.trim_days("/dias", 2).await.unwrap();
        assert_eq!(summary, TrimSummary::untouched(2));
        assert_eq!(db.child_keys("/dias").len(), 2);
    }

    #[tokio::test]
    async fn test_trim_days_zero_is_noop_without_requests() {
        let db = Arc::new(MemoryDatabase::new());
        seed_days(&db, "/dias", &["24-01-01"]);
        let manager = manager_over(db.clone());

        let summary = manager.trim_days("/dias", 0).await.unwrap();
        assert!(summary.deleted.is_empty());
        assert_eq!(db.request_count(), 0);
        assert_eq!(db.child_keys("/dias").len(), 1);
    }

    #[tokio::test]
    async fn test_trim_days_absent_root() {
        let db = Arc::new(MemoryDatabase::new());
        let manager = manager_over(db);
        assert_eq!(
            manager.trim_days("/nada", 3).await.unwrap(),
            TrimSummary::default()
        );
    }

    #[tokio::test]
    async fn test_trim_days_listing_failure_is_error() {
        let (manager, _) = scripted_manager(vec![RequestOutcome::new(500, "")]);
        assert!(manager.trim_days("/dias", 3).await.is_err());
    }

    #[tokio::test]
    async fn test_trim_days_records_failed_deletes() {
        let db = Arc::new(MemoryDatabase::new());
        seed_days(&db, "/dias", &["24-01-01", "24-01-02", "24-01-03"]);
        db.fail_on(HttpMethod::Delete, "/dias/24-01-01", 503);
        let manager = manager_over(db.clone());

        let summary = manager.trim_days("/dias", 1).await.unwrap();
        assert_eq!(summary.deleted, vec!["24-01-02"]);
        assert_eq!(summary.failed, vec!["24-01-01"]);
    }

    /// Day-first keys do not sort chronologically, so the policy evicts by string
    /// order rather than by date.
    #[tokio::test]
    async fn test_trim_days_only_works_for_lexicographic_day_keys() {
        let db = Arc::new(MemoryDatabase::new());
        // DD-MM-YY: chronologically 30-12-23 < 01-01-24 < 02-01-24
        seed_days(&db, "/dias", &["30-12-23", "01-01-24", "02-01-24"]);
        let manager = manager_over(db.clone());

        let summary = manager.trim_days("/dias", 2).await.unwrap();
        // The oldest day survives and the newest-but-one is evicted instead.
        assert_eq!(summary.deleted, vec!["01-01-24"]);
        assert_eq!(db.child_keys("/dias"), vec!["02-01-24", "30-12-23"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trim_days_paces_deletions() {
        let db = Arc::new(MemoryDatabase::new());
        seed_days(&db, "/dias", &["a", "b", "c", "d"]);
        let dispatcher = Arc::new(RequestDispatcher::new(
            "http://db.local",
            db,
            Arc::new(StaticToken::anonymous()),
        ));
        let manager = RetentionManager::new(dispatcher.clone(), DeletionEngine::new(dispatcher));

        let start = tokio::time::Instant::now();
        let summary = manager.trim_days("/dias", 1).await.unwrap();
        assert_eq!(summary.deleted.len(), 3);
        assert_eq!(start.elapsed(), DEFAULT_TRIM_PAUSE * 2);
    }

    #[tokio::test]
    async fn test_trim_oldest_batch_scenario() {
        let (manager, transport) = scripted_manager(vec![
            RequestOutcome::new(200, r#"{"k1":{"v":1},"k2":{"v":2}}"#),
            RequestOutcome::new(200, ""),
        ]);

        let removed = manager
            .trim_oldest_batch("/historial_mediciones", 2)
            .await
            .unwrap();
        assert_eq!(removed, 2);

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0].url,
            "http://db.local/historial_mediciones.json?orderBy=%22%24key%22&limitToFirst=2&auth="
        );
        assert_eq!(requests[1].method, HttpMethod::Patch);
        assert_eq!(requests[1].body, r#"{"k1":null,"k2":null}"#);
        assert_eq!(requests[1].query("print").as_deref(), Some("silent"));
    }

    #[tokio::test]
    async fn test_trim_oldest_batch_against_memory_database() {
        let db = Arc::new(MemoryDatabase::new());
        db.seed("/historial_mediciones", json!({"k1": 1, "k2": 2, "k3": 3}));
        let manager = manager_over(db.clone());

        assert_eq!(manager.trim_oldest_batch("/historial_mediciones", 2).await.unwrap(), 2);
        assert_eq!(db.child_keys("/historial_mediciones"), vec!["k3"]);
    }

    #[tokio::test]
    async fn test_trim_oldest_batch_fewer_children_than_batch() {
        let db = Arc::new(MemoryDatabase::new());
        db.seed("/h", json!({"k1": 1}));
        let manager = manager_over(db.clone());

        assert_eq!(manager.trim_oldest_batch("/h", 10).await.unwrap(), 1);
        assert_eq!(db.snapshot("/h"), Value::Null);
        assert_eq!(manager.trim_oldest_batch("/h", 10).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_trim_oldest_batch_zero_is_noop() {
        let (manager, transport) = scripted_manager(vec![]);
        assert_eq!(manager.trim_oldest_batch("/h", 0).await.unwrap(), 0);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_trim_oldest_batch_listing_failure() {
        let db = Arc::new(MemoryDatabase::new());
        db.seed("/h", json!({"k1": 1, "k2": 2}));
        db.fail_on(HttpMethod::Get, "/h", 500);
        let manager = manager_over(db.clone());

        let err = manager.trim_oldest_batch("/h", 1).await.unwrap_err();
        assert!(matches!(err, TrimError::Listing(_)));
        assert_eq!(err.sentinel(), -1);
        assert_eq!(db.child_keys("/h").len(), 2);
    }

    #[tokio::test]
    async fn test_trim_oldest_batch_patch_failure() {
        let db = Arc::new(MemoryDatabase::new());
        db.seed("/h", json!({"k1": 1, "k2": 2}));
        db.fail_on(HttpMethod::Patch, "/h", 500);
        let manager = manager_over(db.clone());

        let err = manager.trim_oldest_batch("/h", 1).await.unwrap_err();
        assert!(matches!(err, TrimError::Patch(_)));
        assert_eq!(err.sentinel(), -2);
    }

    #[tokio::test]
    async fn test_trim_oldest_batch_accepts_no_content() {
        let (manager, _) = scripted_manager(vec![
            RequestOutcome::new(200, r#"{"k1":true}"#),
            RequestOutcome::new(204, ""),
        ]);
        assert_eq!(manager.trim_oldest_batch("/h", 5).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_trim_oldest_batch_unusable_listing_removes_nothing() {
        let (manager, transport) = scripted_manager(vec![RequestOutcome::new(200, "not json")]);
        assert_eq!(manager.trim_oldest_batch("/h", 5).await.unwrap(), 0);
        assert_eq!(transport.request_count(), 1);
    }
}
