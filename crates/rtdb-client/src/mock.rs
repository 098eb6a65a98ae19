//! In-memory test doubles for the transport seam.
//!
//! [`ScriptedTransport`] replays canned outcomes and records every request.
//! [`MemoryDatabase`] interprets the REST contract against an in-memory JSON tree:
//! shallow listings, `print=silent`, `orderBy="$key"` + `limitToFirst`, token checks,
//! push keys, and a configurable size limit that rejects large deletes with 400.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::path::{AUTH_PARAM, RESOURCE_SUFFIX};
use crate::transport::{HttpMethod, HttpTransport, RequestOutcome};

/// One request as seen by a test double.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Full URL including the query string.
    pub url: String,
    /// Request body.
    pub body: String,
}

impl RecordedRequest {
    /// Logical database path: the URL path without host and `.json` suffix.
    pub fn path(&self) -> String {
        let without_query = self.url.split('?').next().unwrap_or_default();
        let after_scheme = without_query
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(without_query);
        let path = after_scheme
            .find('/')
            .map(|idx| &after_scheme[idx..])
            .unwrap_or("");
        path.strip_suffix(RESOURCE_SUFFIX).unwrap_or(path).to_string()
    }

    /// Decoded value of query parameter `name`.
    pub fn query(&self, name: &str) -> Option<String> {
        let (_, query) = self.url.split_once('?')?;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| {
                urlencoding::decode(value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| value.to_string())
            })
    }
}

/// Replays queued outcomes in order, then a fallback.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<RequestOutcome>>,
    fallback: RequestOutcome,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    /// Replay `outcomes`; once exhausted every request fails at the transport level.
    pub fn new(outcomes: Vec<RequestOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            fallback: RequestOutcome::transport_failure("no scripted response"),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every request with `outcome`.
    pub fn repeating(outcome: RequestOutcome) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: outcome,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn perform(&self, method: HttpMethod, url: &str, body: &str) -> RequestOutcome {
        self.requests.lock().unwrap().push(RecordedRequest {
            method,
            url: url.to_string(),
            body: body.to_string(),
        });
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// In-memory database speaking the REST contract.
pub struct MemoryDatabase {
    root: Mutex<Value>,
    required_token: Mutex<Option<String>>,
    delete_limit: Option<usize>,
    forced: Mutex<HashMap<(HttpMethod, String), u16>>,
    requests: Mutex<Vec<RecordedRequest>>,
    push_counter: AtomicU64,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    /// An empty database with public rules and no size limit.
    pub fn new() -> Self {
        Self {
            root: Mutex::new(Value::Null),
            required_token: Mutex::new(None),
            delete_limit: None,
            forced: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            push_counter: AtomicU64::new(0),
        }
    }

    /// Reject requests whose `auth` parameter differs from `token` with 401.
    pub fn with_required_token(self, token: impl Into<String>) -> Self {
        *self.required_token.lock().unwrap() = Some(token.into());
        self
    }

    /// Reject a DELETE with 400 when the subtree holds more than `nodes` nodes.
    pub fn with_delete_limit(mut self, nodes: usize) -> Self {
        self.delete_limit = Some(nodes);
        self
    }

    /// Rotate the accepted token, as an identity backend expiring a credential would.
    pub fn set_required_token(&self, token: impl Into<String>) {
        *self.required_token.lock().unwrap() = Some(token.into());
    }

    /// Answer `method` on `path` with `status` from now on. Status 0 simulates a
    /// transport failure.
    pub fn fail_on(&self, method: HttpMethod, path: &str, status: u16) {
        self.forced
            .lock()
            .unwrap()
            .insert((method, normalize(path)), status);
    }

    /// Remove a forced failure.
    pub fn clear_failure(&self, method: HttpMethod, path: &str) {
        self.forced.lock().unwrap().remove(&(method, normalize(path)));
    }

    /// Write `value` at `path` directly, bypassing the request log.
    pub fn seed(&self, path: &str, value: Value) {
        let mut root = self.root.lock().unwrap();
        write_at(&mut root, &segments(path), prune(value));
    }

    /// Current value at `path`, `Value::Null` if absent.
    pub fn snapshot(&self, path: &str) -> Value {
        let root = self.root.lock().unwrap();
        read_at(&root, &segments(path)).cloned().unwrap_or(Value::Null)
    }

    /// Immediate child keys of `path`, ascending.
    pub fn child_keys(&self, path: &str) -> Vec<String> {
        let mut keys: Vec<String> = match self.snapshot(path) {
            Value::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        };
        keys.sort();
        keys
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next_push_key(&self) -> String {
        let n = self.push_counter.fetch_add(1, Ordering::SeqCst);
        format!("-K{:012}", n)
    }

    fn handle(&self, request: &RecordedRequest) -> RequestOutcome {
        let path = normalize(&request.path());

        if let Some(status) = self.forced.lock().unwrap().get(&(request.method, path.clone())) {
            if *status == 0 {
                return RequestOutcome::transport_failure("forced transport failure");
            }
            return RequestOutcome::new(*status, json!({ "error": "forced failure" }).to_string());
        }

        if let Some(required) = self.required_token.lock().unwrap().as_ref() {
            if request.query(AUTH_PARAM).as_deref() != Some(required.as_str()) {
                return RequestOutcome::new(401, json!({ "error": "Permission denied" }).to_string());
            }
        }

        let silent = request.query("print").as_deref() == Some("silent");
        let segs = segments(&path);
        let mut root = self.root.lock().unwrap();

        match request.method {
            HttpMethod::Get => {
                let node = read_at(&root, &segs).cloned().unwrap_or(Value::Null);
                let body = if request.query("shallow").as_deref() == Some("true") {
                    shallow(node)
                } else if request.query("orderBy").as_deref() == Some("\"$key\"") {
                    let limit = request
                        .query("limitToFirst")
                        .and_then(|n| n.parse::<usize>().ok())
                        .unwrap_or(usize::MAX);
                    first_by_key(node, limit)
                } else {
                    node
                };
                RequestOutcome::new(200, body.to_string())
            }
            HttpMethod::Put => match serde_json::from_str::<Value>(&request.body) {
                Ok(value) => {
                    let value = prune(value);
                    write_at(&mut root, &segs, value.clone());
                    RequestOutcome::new(200, if silent { String::new() } else { value.to_string() })
                }
                Err(e) => bad_request(&e.to_string()),
            },
            HttpMethod::Post => match serde_json::from_str::<Value>(&request.body) {
                Ok(value) => {
                    let key = self.next_push_key();
                    let mut child_segs = segs.clone();
                    child_segs.push(key.clone());
                    write_at(&mut root, &child_segs, prune(value));
                    RequestOutcome::new(200, json!({ "name": key }).to_string())
                }
                Err(e) => bad_request(&e.to_string()),
            },
            HttpMethod::Patch => match serde_json::from_str::<Value>(&request.body) {
                Ok(Value::Object(updates)) => {
                    for (key, value) in updates {
                        let mut child_segs = segs.clone();
                        child_segs.extend(segments(&key));
                        write_at(&mut root, &child_segs, prune(value));
                    }
                    let body = if silent {
                        String::new()
                    } else {
                        read_at(&root, &segs).cloned().unwrap_or(Value::Null).to_string()
                    };
                    RequestOutcome::new(200, body)
                }
                Ok(_) => bad_request("PATCH body must be an object"),
                Err(e) => bad_request(&e.to_string()),
            },
            HttpMethod::Delete => {
                let size = read_at(&root, &segs).map(count_nodes).unwrap_or(0);
                if let Some(limit) = self.delete_limit {
                    if size > limit {
                        debug!("memory database rejecting delete of {} nodes at {}", size, path);
                        return bad_request("Data to write exceeds the maximum size that can be modified with a single request.");
                    }
                }
                write_at(&mut root, &segs, Value::Null);
                RequestOutcome::new(200, if silent { String::new() } else { "null".to_string() })
            }
        }
    }
}

#[async_trait]
impl HttpTransport for MemoryDatabase {
    async fn perform(&self, method: HttpMethod, url: &str, body: &str) -> RequestOutcome {
        let request = RecordedRequest {
            method,
            url: url.to_string(),
            body: body.to_string(),
        };
        let outcome = self.handle(&request);
        self.requests.lock().unwrap().push(request);
        outcome
    }
}

fn bad_request(message: &str) -> RequestOutcome {
    RequestOutcome::new(400, json!({ "error": message }).to_string())
}

fn normalize(path: &str) -> String {
    let joined = segments(path).join("/");
    format!("/{}", joined)
}

fn segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn read_at<'a>(node: &'a Value, segs: &[String]) -> Option<&'a Value> {
    let mut current = node;
    for seg in segs {
        current = current.as_object()?.get(seg)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Nulls and empty objects are never stored.
fn prune(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let kept: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, prune(v)))
                .filter(|(_, v)| !is_empty(v))
                .collect();
            if kept.is_empty() {
                Value::Null
            } else {
                Value::Object(kept)
            }
        }
        other => other,
    }
}

fn write_at(node: &mut Value, segs: &[String], value: Value) {
    let Some((first, rest)) = segs.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let now_empty = {
            let child = map.entry(first.clone()).or_insert(Value::Null);
            write_at(child, rest, value);
            is_empty(child)
        };
        if now_empty {
            map.remove(first);
        }
        if map.is_empty() {
            *node = Value::Null;
        }
    }
}

fn count_nodes(value: &Value) -> usize {
    match value {
        Value::Object(map) => 1 + map.values().map(count_nodes).sum::<usize>(),
        _ => 1,
    }
}

fn shallow(node: Value) -> Value {
    match node {
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, _)| (k, Value::Bool(true))).collect()),
        other => other,
    }
}

fn first_by_key(node: Value, limit: usize) -> Value {
    match node {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().take(limit).collect())
        }
        other => other,
    }
}
