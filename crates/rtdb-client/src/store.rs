//! CRUD surface over the dispatcher.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::deletion::DeletionEngine;
use crate::dispatcher::RequestDispatcher;
use crate::error::RtdbResult;
use crate::listing::{self, ChildKeySet};
use crate::transport::HttpMethod;

/// Read, write and delete nodes by path.
///
/// Every call is an independent request/response cycle; nothing is cached.
#[derive(Clone)]
pub struct RecordStore {
    dispatcher: Arc<RequestDispatcher>,
    deletion: DeletionEngine,
}

impl RecordStore {
    /// Create a store whose deletes use a default [`DeletionEngine`].
    pub fn new(dispatcher: Arc<RequestDispatcher>) -> Self {
        let deletion = DeletionEngine::new(dispatcher.clone());
        Self {
            dispatcher,
            deletion,
        }
    }

    /// Create a store with a preconfigured deletion engine.
    pub fn with_deletion(dispatcher: Arc<RequestDispatcher>, deletion: DeletionEngine) -> Self {
        Self {
            dispatcher,
            deletion,
        }
    }

    /// The underlying dispatcher.
    pub fn dispatcher(&self) -> &Arc<RequestDispatcher> {
        &self.dispatcher
    }

    /// Read the value at `path`.
    ///
    /// `Ok(Value::Null)` means the node is genuinely absent; a failed exchange is an
    /// `Err`, never an empty value.
    pub async fn get(&self, path: &str) -> RtdbResult<Value> {
        let result = self
            .dispatcher
            .send(HttpMethod::Get, path, "", &[])
            .await
            .into_result(HttpMethod::Get, path)
            .and_then(|body| listing::parse_body(path, &body));

        match &result {
            Ok(_) => info!("data at {} acquired", path),
            Err(e) => error!("error getting data at {}: {}", path, e),
        }
        result
    }

    /// Read the value at `path`, mapping every failure to `Value::Null`.
    ///
    /// Failures are only visible in the logs.
    pub async fn get_or_null(&self, path: &str) -> Value {
        self.get(path).await.unwrap_or(Value::Null)
    }

    /// Immediate child keys of `path`, `None` if the node is absent or a scalar.
    pub async fn get_shallow(&self, path: &str) -> RtdbResult<Option<ChildKeySet>> {
        listing::shallow_listing(&self.dispatcher, path).await
    }

    /// Overwrite the node at `path` with `value`.
    pub async fn put<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> RtdbResult<()> {
        let body = serde_json::to_string(value)?;
        self.put_raw(path, &body).await
    }

    /// Overwrite the node at `path` with a pre-serialized document.
    pub async fn put_raw(&self, path: &str, json: &str) -> RtdbResult<()> {
        self.write(HttpMethod::Put, path, json).await.map(|_| ())
    }

    /// Append `value` under `path` with a server-generated push key.
    ///
    /// Returns the generated key when the server reports it.
    pub async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        value: &T,
    ) -> RtdbResult<Option<String>> {
        let body = serde_json::to_string(value)?;
        self.post_raw(path, &body).await
    }

    /// Append a pre-serialized document under `path`.
    pub async fn post_raw(&self, path: &str, json: &str) -> RtdbResult<Option<String>> {
        let body = self.write(HttpMethod::Post, path, json).await?;
        let name = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("name").and_then(Value::as_str).map(str::to_string));
        Ok(name)
    }

    /// Merge the top-level keys of `value` into the node at `path`; null removes a key.
    pub async fn patch<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> RtdbResult<()> {
        let body = serde_json::to_string(value)?;
        self.patch_raw(path, &body).await
    }

    /// Merge a pre-serialized document into the node at `path`.
    pub async fn patch_raw(&self, path: &str, json: &str) -> RtdbResult<()> {
        self.write(HttpMethod::Patch, path, json).await.map(|_| ())
    }

    /// Delete the node at `path` and all descendants, chunking if needed.
    pub async fn delete(&self, path: &str) -> RtdbResult<()> {
        self.deletion.delete(path).await
    }

    async fn write(&self, method: HttpMethod, path: &str, json: &str) -> RtdbResult<String> {
        let result = self
            .dispatcher
            .send(method, path, json, &[])
            .await
            .into_result(method, path);
        match &result {
            Ok(_) => info!("{} {} successful", method, path),
            Err(e) => error!("{} {} failed: {}", method, path, e),
        }
        result
    }
}
