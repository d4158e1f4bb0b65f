//! Inbound request model and route parsing.

use serde_json::Value;
use std::collections::HashMap;

/// A request handed to the engine by the HTTP front door.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    /// HTTP method as received (matched exactly against definitions)
    pub method: String,
    /// Full request path, optionally prefixed with a project id and
    /// optionally carrying a `?query` suffix
    pub path: String,
    /// Parsed query parameters
    pub query: HashMap<String, String>,
    /// Request headers (any case)
    pub headers: HashMap<String, String>,
    /// Parsed JSON body, `Null` when absent
    pub body: Value,
}

impl InboundRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Named query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Named top-level field of the JSON body.
    pub fn body_field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }
}

/// Routing information derived from the full request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Project scope taken from a leading all-digit segment
    pub project_id: Option<String>,
    /// Path used for pattern matching
    pub path: String,
    /// Raw query string split off the full path
    pub query_string: Option<String>,
}

impl Route {
    /// Parse `/<projectId>/rest/of/path?query` or `/rest/of/path?query`.
    pub fn parse(full_path: &str) -> Self {
        let (path, query_string) = match full_path.split_once('?') {
            Some((p, q)) => (p, Some(q.to_string())),
            None => (full_path, None),
        };

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if let Some(first) = segments.first() {
            if first.bytes().all(|b| b.is_ascii_digit()) {
                return Self {
                    project_id: Some(first.to_string()),
                    path: format!("/{}", segments[1..].join("/")),
                    query_string,
                };
            }
        }

        Self {
            project_id: None,
            path: path.to_string(),
            query_string,
        }
    }
}

/// Parse a raw query string into a map, percent-decoding values.
pub fn parse_query_string(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let Some(q) = query else {
        return params;
    };
    for pair in q.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = urlencoding::decode(key)
            .map(|k| k.into_owned())
            .unwrap_or_else(|_| key.to_string());
        let value = urlencoding::decode(&value.replace('+', " "))
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| value.to_string());
        params.insert(key, value);
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_with_project_prefix() {
        let route = Route::parse("/257490565556473856/auth/login");
        assert_eq!(route.project_id.as_deref(), Some("257490565556473856"));
        assert_eq!(route.path, "/auth/login");
        assert!(route.query_string.is_none());
    }

    #[test]
    fn test_route_without_project() {
        let route = Route::parse("/api/user/info");
        assert!(route.project_id.is_none());
        assert_eq!(route.path, "/api/user/info");
    }

    #[test]
    fn test_route_project_only() {
        let route = Route::parse("/42");
        assert_eq!(route.project_id.as_deref(), Some("42"));
        assert_eq!(route.path, "/");
    }

    #[test]
    fn test_route_mixed_segment_is_not_project() {
        let route = Route::parse("/42a/users");
        assert!(route.project_id.is_none());
        assert_eq!(route.path, "/42a/users");
    }

    #[test]
    fn test_route_splits_query() {
        let route = Route::parse("/7/users?page=2&size=10");
        assert_eq!(route.project_id.as_deref(), Some("7"));
        assert_eq!(route.path, "/users");
        assert_eq!(route.query_string.as_deref(), Some("page=2&size=10"));
    }

    #[test]
    fn test_parse_query_string() {
        let params = parse_query_string(Some("name=John%20Doe&flag&q=a+b"));
        assert_eq!(params.get("name").map(String::as_str), Some("John Doe"));
        assert_eq!(params.get("flag").map(String::as_str), Some(""));
        assert_eq!(params.get("q").map(String::as_str), Some("a b"));
        assert!(parse_query_string(None).is_empty());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = InboundRequest::new("GET", "/").with_header("X-Client-Id", "abc");
        assert_eq!(req.header("x-client-id"), Some("abc"));
        assert_eq!(req.header("X-CLIENT-ID"), Some("abc"));
        assert_eq!(req.header("missing"), None);
    }

    #[test]
    fn test_body_field() {
        let req = InboundRequest::new("POST", "/")
            .with_body(serde_json::json!({"user": "alice", "age": 30}));
        assert_eq!(req.body_field("user"), Some(&serde_json::json!("alice")));
        assert!(req.body_field("missing").is_none());

        let empty = InboundRequest::new("POST", "/");
        assert!(empty.body_field("user").is_none());
    }
}
