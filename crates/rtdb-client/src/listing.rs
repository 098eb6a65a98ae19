//! Shallow listings and response-body parsing.

use serde_json::Value;
use tracing::debug;

use crate::dispatcher::RequestDispatcher;
use crate::error::{RtdbError, RtdbResult};
use crate::path::QueryParam;
use crate::transport::HttpMethod;

/// Immediate child key names of a node, in listing order.
///
/// Working state only; discarded once the deletion or trim that fetched it is done.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildKeySet {
    keys: Vec<String>,
}

impl ChildKeySet {
    /// Keys of a JSON object, `None` for any other shape.
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_object().map(|map| Self {
            keys: map.keys().cloned().collect(),
        })
    }

    /// Number of children.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether there are no children.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys in listing order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Iterate keys in listing order.
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.keys.iter()
    }

    /// Keys sorted ascending by byte-wise string comparison.
    pub fn sorted(&self) -> Vec<String> {
        let mut keys = self.keys.clone();
        keys.sort();
        keys
    }

    /// Take ownership of the keys.
    pub fn into_vec(self) -> Vec<String> {
        self.keys
    }
}

impl<'a> IntoIterator for &'a ChildKeySet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter()
    }
}

/// Parse a response body as JSON. An empty body reads as `null`.
pub fn parse_body(path: &str, body: &str) -> RtdbResult<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| RtdbError::MalformedResponse {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

/// Fetch the immediate child keys of `path` with `shallow=true`.
///
/// `Ok(None)` when the node is absent or holds a scalar.
pub async fn shallow_listing(
    dispatcher: &RequestDispatcher,
    path: &str,
) -> RtdbResult<Option<ChildKeySet>> {
    let body = dispatcher
        .send(HttpMethod::Get, path, "", &[QueryParam::shallow()])
        .await
        .into_result(HttpMethod::Get, path)?;
    let value = parse_body(path, &body)?;
    let keys = ChildKeySet::from_value(&value);
    debug!(
        "shallow listing of {}: {} children",
        path,
        keys.as_ref().map(ChildKeySet::len).unwrap_or(0)
    );
    Ok(keys)
}
