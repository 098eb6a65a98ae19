//! Size-aware subtree deletion.
//!
//! The database refuses to delete (or acknowledge deleting) a node whose subtree is
//! too large for one exchange and answers 400. In that case the engine lists the
//! immediate children, deletes each one recursively, then retries the parent.
//!
//! ```text
//! DELETE path ──200──▶ done
//!      │400
//!      ▼
//! GET path?shallow ──fail / not object──▶ DELETE path once more
//!      │keys
//!      ▼
//! delete(path/key) for each key (depth-first, paced)
//!      ▼
//! DELETE path ──200──▶ done
//!      │fail
//!      ▼
//! ok iff every child delete succeeded
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::dispatcher::RequestDispatcher;
use crate::error::{RtdbError, RtdbResult};
use crate::listing::shallow_listing;
use crate::path::{self, QueryParam};
use crate::transport::{HttpMethod, RequestOutcome};

/// Boxed future type for recursive async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Default pause between sibling deletions during a chunked delete.
pub const DEFAULT_CHILD_PAUSE: Duration = Duration::from_millis(10);

/// Deletes subtrees, falling back to child-by-child deletion when a node is too large.
#[derive(Clone)]
pub struct DeletionEngine {
    dispatcher: Arc<RequestDispatcher>,
    child_pause: Duration,
}

impl DeletionEngine {
    /// Create an engine with the default inter-child pause.
    pub fn new(dispatcher: Arc<RequestDispatcher>) -> Self {
        Self {
            dispatcher,
            child_pause: DEFAULT_CHILD_PAUSE,
        }
    }

    /// Set the pause inserted between sibling deletions.
    pub fn with_child_pause(mut self, pause: Duration) -> Self {
        self.child_pause = pause;
        self
    }

    /// The pause inserted between sibling deletions.
    pub fn child_pause(&self) -> Duration {
        self.child_pause
    }

    /// Delete `path` and everything below it.
    ///
    /// Deleting an absent node succeeds. Children are processed one at a time,
    /// depth-first, and all of them are settled before the final parent delete.
    pub fn delete<'a>(&'a self, path: &'a str) -> BoxFuture<'a, RtdbResult<()>> {
        Box::pin(async move {
            let outcome = self.direct_delete(path).await;
            if outcome.transport_error.is_some() || outcome.status != 400 {
                return match outcome.into_result(HttpMethod::Delete, path) {
                    Ok(_) => {
                        info!("DELETE {} successful", path);
                        Ok(())
                    }
                    Err(e) => {
                        error!("DELETE {} failed: {}", path, e);
                        Err(e)
                    }
                };
            }

            warn!("DELETE {} too large for one request, deleting children individually", path);
            self.chunked_delete(path).await
        })
    }

    async fn chunked_delete(&self, path: &str) -> RtdbResult<()> {
        let keys = match shallow_listing(&self.dispatcher, path).await {
            Ok(Some(keys)) => keys,
            Ok(None) => {
                warn!("shallow listing of {} is not an object, retrying direct delete", path);
                return self.retry_direct(path).await;
            }
            Err(e) => {
                warn!("shallow listing of {} failed ({}), retrying direct delete", path, e);
                return self.retry_direct(path).await;
            }
        };

        let total = keys.len();
        let mut deleted = 0usize;
        for (i, key) in keys.iter().enumerate() {
            let child_path = path::child(path, key);
            match self.delete(&child_path).await {
                Ok(()) => deleted += 1,
                Err(e) => warn!("failed to delete child {}: {}", child_path, e),
            }
            if i + 1 < total && !self.child_pause.is_zero() {
                tokio::time::sleep(self.child_pause).await;
            }
        }

        let final_outcome = self.direct_delete(path).await;
        if final_outcome.is_success() {
            info!("chunked DELETE {} successful ({}/{})", path, deleted, total);
            return Ok(());
        }

        error!(
            "final DELETE {} failed (status={}) after deleting children ({}/{})",
            path, final_outcome.status, deleted, total
        );
        if deleted == total {
            Ok(())
        } else {
            Err(RtdbError::PartialDelete {
                path: path.to_string(),
                deleted,
                total,
            })
        }
    }

    async fn retry_direct(&self, path: &str) -> RtdbResult<()> {
        let outcome = self.direct_delete(path).await;
        if outcome.is_success() {
            info!("DELETE {} successful on retry", path);
            return Ok(());
        }
        error!("DELETE {} failed after retry (status={})", path, outcome.status);
        if outcome.transport_error.is_none() && outcome.status == 400 {
            return Err(RtdbError::PayloadTooLarge {
                path: path.to_string(),
            });
        }
        Err(outcome.into_error(HttpMethod::Delete, path))
    }

    async fn direct_delete(&self, path: &str) -> RequestOutcome {
        self.dispatcher
            .send(HttpMethod::Delete, path, "", &[QueryParam::print_silent()])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use crate::mock::{MemoryDatabase, ScriptedTransport};
    use serde_json::{json, Value};

    fn engine_over(db: Arc<MemoryDatabase>) -> DeletionEngine {
        let dispatcher = Arc::new(RequestDispatcher::new(
            "http://db.local",
            db,
            Arc::new(StaticToken::anonymous()),
        ));
        DeletionEngine::new(dispatcher).with_child_pause(Duration::ZERO)
    }

    fn scripted_engine(outcomes: Vec<RequestOutcome>) -> (DeletionEngine, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(outcomes));
        let dispatcher = Arc::new(RequestDispatcher::new(
            "http://db.local",
            transport.clone(),
            Arc::new(StaticToken::anonymous()),
        ));
        (
            DeletionEngine::new(dispatcher).with_child_pause(Duration::ZERO),
            transport,
        )
    }

    #[tokio::test]
    async fn test_direct_delete_uses_silent_mode() {
        let db = Arc::new(MemoryDatabase::new());
        db.seed("/a", json!({"x": 1}));
        let engine = engine_over(db.clone());

        engine.delete("/a").await.unwrap();
        assert_eq!(db.snapshot("/a"), Value::Null);
        let requests = db.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].query("print").as_deref(), Some("silent"));
    }

    #[tokio::test]
    async fn test_delete_absent_node_is_success() {
        let db = Arc::new(MemoryDatabase::new());
        let engine = engine_over(db);
        assert!(engine.delete("/never/existed").await.is_ok());
    }

    #[tokio::test]
    async fn test_non_400_failure_is_terminal() {
        let (engine, transport) = scripted_engine(vec![RequestOutcome::new(403, "")]);
        let err = engine.delete("/a").await.unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_terminal() {
        let (engine, transport) = scripted_engine(vec![RequestOutcome::transport_failure("reset")]);
        let err = engine.delete("/a").await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_oversized_node_is_deleted_in_chunks() {
        let db = Arc::new(MemoryDatabase::new().with_delete_limit(4));
        db.seed(
            "/big",
            json!({
                "a": {"1": 1, "2": 2},
                "b": {"1": 1, "2": 2, "3": 3, "4": 4, "5": 5},
                "c": 3
            }),
        );
        let engine = engine_over(db.clone());

        engine.delete("/big").await.unwrap();
        assert_eq!(db.snapshot("/big"), Value::Null);

        let shallow_gets = db
            .requests()
            .iter()
            .filter(|r| r.method == HttpMethod::Get && r.query("shallow").is_some())
            .count();
        // /big and the nested oversized /big/b
        assert_eq!(shallow_gets, 2);
    }

    #[tokio::test]
    async fn test_chunked_order_children_before_final_delete() {
        let (engine, transport) = scripted_engine(vec![
            RequestOutcome::new(400, ""),
            RequestOutcome::new(200, r#"{"k1":true,"k2":true}"#),
            RequestOutcome::new(200, ""),
            RequestOutcome::new(200, ""),
            RequestOutcome::new(200, ""),
        ]);

        engine.delete("/root").await.unwrap();
        let paths: Vec<(HttpMethod, String)> = transport
            .requests()
            .iter()
            .map(|r| (r.method, r.path()))
            .collect();
        assert_eq!(
            paths,
            vec![
                (HttpMethod::Delete, "/root".to_string()),
                (HttpMethod::Get, "/root".to_string()),
                (HttpMethod::Delete, "/root/k1".to_string()),
                (HttpMethod::Delete, "/root/k2".to_string()),
                (HttpMethod::Delete, "/root".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_partial_children_and_failed_final_is_failure() {
        let db = Arc::new(MemoryDatabase::new());
        db.seed("/root", json!({"k1": 1, "k2": 2, "k3": 3}));
        db.fail_on(HttpMethod::Delete, "/root", 400);
        db.fail_on(HttpMethod::Delete, "/root/k2", 500);
        let engine = engine_over(db.clone());

        let err = engine.delete("/root").await.unwrap_err();
        match err {
            RtdbError::PartialDelete { deleted, total, .. } => {
                assert_eq!(deleted, 2);
                assert_eq!(total, 3);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(db.child_keys("/root"), vec!["k2"]);
    }

    #[tokio::test]
    async fn test_all_children_and_failed_final_is_success() {
        let db = Arc::new(MemoryDatabase::new());
        db.seed("/root", json!({"k1": 1, "k2": 2, "k3": 3}));
        db.fail_on(HttpMethod::Delete, "/root", 400);
        let engine = engine_over(db.clone());

        assert!(engine.delete("/root").await.is_ok());
        assert!(db.child_keys("/root").is_empty());
    }

    #[tokio::test]
    async fn test_listing_failure_falls_back_to_one_direct_retry() {
        let (engine, transport) = scripted_engine(vec![
            RequestOutcome::new(400, ""),
            RequestOutcome::new(500, ""),
            RequestOutcome::new(200, ""),
        ]);
        engine.delete("/root").await.unwrap();
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn test_scalar_listing_retry_failure_is_payload_too_large() {
        let (engine, transport) = scripted_engine(vec![
            RequestOutcome::new(400, ""),
            RequestOutcome::new(200, "\"a very long string\""),
            RequestOutcome::new(400, ""),
        ]);
        let err = engine.delete("/root").await.unwrap_err();
        assert!(matches!(err, RtdbError::PayloadTooLarge { .. }));
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_between_children() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            RequestOutcome::new(400, ""),
            RequestOutcome::new(200, r#"{"a":true,"b":true,"c":true}"#),
            RequestOutcome::new(200, ""),
            RequestOutcome::new(200, ""),
            RequestOutcome::new(200, ""),
            RequestOutcome::new(200, ""),
        ]));
        let dispatcher = Arc::new(RequestDispatcher::new(
            "http://db.local",
            transport,
            Arc::new(StaticToken::anonymous()),
        ));
        let engine = DeletionEngine::new(dispatcher);
        assert_eq!(engine.child_pause(), DEFAULT_CHILD_PAUSE);

        let start = tokio::time::Instant::now();
        engine.delete("/root").await.unwrap();
        assert_eq!(start.elapsed(), DEFAULT_CHILD_PAUSE * 2);
    }
}
