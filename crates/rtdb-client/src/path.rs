//! Resource URL construction.
//!
//! A logical database path such as `/historial_mediciones/-Nx1` maps onto the REST
//! resource `<root>/historial_mediciones/-Nx1.json?...&auth=<token>`. Path characters
//! are not validated; malformed paths surface as server-side 4xx errors.

use std::fmt;

/// Suffix that turns a logical path into a REST resource.
pub const RESOURCE_SUFFIX: &str = ".json";

/// Name of the query parameter carrying the credential.
pub const AUTH_PARAM: &str = "auth";

/// A single `name=value` query parameter. Values are emitted verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParam {
    /// Parameter name.
    pub name: String,
    /// Parameter value, already URL-safe.
    pub value: String,
}

impl QueryParam {
    /// Create a parameter from a name and an already encoded value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Listing mode: only immediate child keys are returned.
    pub fn shallow() -> Self {
        Self::new("shallow", "true")
    }

    /// Suppress the echo of the written or deleted payload.
    pub fn print_silent() -> Self {
        Self::new("print", "silent")
    }

    /// Server-side ordering by child key (`orderBy="$key"`).
    pub fn order_by_key() -> Self {
        Self::new("orderBy", urlencoding::encode("\"$key\"").into_owned())
    }

    /// Keep only the first `n` children of an ordered query.
    pub fn limit_to_first(n: usize) -> Self {
        Self::new("limitToFirst", n.to_string())
    }
}

impl fmt::Display for QueryParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Strip trailing slashes so the resource suffix attaches to the node name.
pub fn normalize(path: &str) -> &str {
    path.trim_end_matches('/')
}

/// Join a parent path and a child key with exactly one separator.
pub fn child(parent: &str, key: &str) -> String {
    format!("{}/{}", normalize(parent), key.trim_start_matches('/'))
}

/// Build `<root><path>.json?<params>&auth=<token>`.
///
/// Root and path are joined with exactly one `/`. The `auth` parameter is always
/// present and always last.
pub fn build_url(root: &str, path: &str, params: &[QueryParam], token: &str) -> String {
    let path = normalize(path);
    let mut url = String::with_capacity(root.len() + path.len() + 64);
    url.push_str(root.trim_end_matches('/'));
    if !path.starts_with('/') {
        url.push('/');
    }
    url.push_str(path);
    url.push_str(RESOURCE_SUFFIX);
    url.push('?');
    for param in params {
        url.push_str(&param.to_string());
        url.push('&');
    }
    url.push_str(AUTH_PARAM);
    url.push('=');
    url.push_str(token);
    url
}
