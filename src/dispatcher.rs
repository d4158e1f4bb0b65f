//! Request dispatcher.
//!
//! Runs one request through definition selection, rule selection, delay
//! and template expansion, producing a [`MatchOutcome`] for the caller to
//! respond with.

use crate::audit::{AuditSink, RequestSummary};
use crate::config::GlobalSettings;
use crate::matcher::{resolve_response, select_rule, Matcher};
use crate::request::{parse_query_string, InboundRequest, Route};
use crate::store::{MockStore, StoreError};
use crate::template::{TemplateEngine, TemplateError};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Response headers attached to every mocked response.
pub const MOCK_HEADERS: [(&str, &str); 2] = [
    ("X-Mock-Platform", "true"),
    ("Access-Control-Allow-Origin", "*"),
];

/// Terminal result of dispatching one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum MatchOutcome {
    /// No definition applies; the caller forwards or answers on its own.
    NoMatch,
    Matched(MatchedResponse),
}

impl MatchOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, MatchOutcome::Matched(_))
    }
}

/// A synthesized mock response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedResponse {
    pub status: u16,
    pub delay_ms: u64,
    pub body: Value,
    pub mock_id: i64,
    pub mock_name: String,
    pub mock_project_id: Option<String>,
    /// Override rule that applied, if any
    pub rule_name: Option<String>,
    pub headers: BTreeMap<String, String>,
}

/// Dispatch failures. Neither produces a partial response.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Identifier(#[from] TemplateError),
}

/// Counter snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchStats {
    pub requests_total: u64,
    pub requests_matched: u64,
    pub requests_unmatched: u64,
    /// Matches per mock id
    pub mock_matches: BTreeMap<i64, u64>,
}

/// Matches requests against stored mock definitions and synthesizes
/// responses.
pub struct Dispatcher {
    store: Arc<dyn MockStore>,
    engine: TemplateEngine,
    matcher: Matcher,
    audit: Arc<dyn AuditSink>,
    log_matches: bool,
    log_unmatched: bool,
    /// Match counts per mock id
    match_counts: Mutex<HashMap<i64, u64>>,
    /// Total requests processed.
    requests_total: AtomicU64,
    /// Total requests matched to a mock.
    requests_matched: AtomicU64,
    /// Total requests unmatched.
    requests_unmatched: AtomicU64,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn MockStore>,
        engine: TemplateEngine,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            engine,
            matcher: Matcher::new(),
            audit,
            log_matches: true,
            log_unmatched: true,
            match_counts: Mutex::new(HashMap::new()),
            requests_total: AtomicU64::new(0),
            requests_matched: AtomicU64::new(0),
            requests_unmatched: AtomicU64::new(0),
        }
    }

    /// Apply logging settings.
    pub fn with_settings(mut self, settings: &GlobalSettings) -> Self {
        self.log_matches = settings.log_matches;
        self.log_unmatched = settings.log_unmatched;
        self
    }

    /// Dispatch one request.
    ///
    /// A query string carried in `request.path` is merged into
    /// `request.query`; entries already present win. Dropping the returned
    /// future during the delay abandons the request without an outcome.
    /// A failed dispatch is still reported to the audit sink.
    pub async fn dispatch(
        &self,
        mut request: InboundRequest,
    ) -> Result<MatchOutcome, DispatchError> {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        let route = Route::parse(&request.path);
        for (key, value) in parse_query_string(route.query_string.as_deref()) {
            request.query.entry(key).or_insert(value);
        }
        let summary = RequestSummary {
            method: request.method.clone(),
            url: request.path.clone(),
            project_id: route.project_id.clone(),
        };

        match self.resolve(&request, &route).await {
            Ok(outcome) => Ok(self.finish(summary, outcome)),
            Err(e) => {
                error!(method = %request.method, path = %request.path, error = %e, "Dispatch failed");
                self.audit_failure(summary, e.to_string());
                Err(e)
            }
        }
    }

    async fn resolve(
        &self,
        request: &InboundRequest,
        route: &Route,
    ) -> Result<MatchOutcome, DispatchError> {
        if !self.store.is_serving_enabled().await? {
            debug!(path = %request.path, "Mock serving disabled, skipping match");
            return Ok(MatchOutcome::NoMatch);
        }

        let definitions = self.store.list_enabled_definitions().await?;
        let Some(definition) = self
            .matcher
            .find_match(&definitions, &request.method, route)
        else {
            if self.log_unmatched {
                warn!(
                    method = %request.method,
                    path = %request.path,
                    "No matching mock found"
                );
            }
            return Ok(MatchOutcome::NoMatch);
        };

        let rule = select_rule(definition, request);
        let resolved = resolve_response(definition, rule);

        if resolved.delay_ms > 0 {
            debug!(mock_id = definition.id, delay_ms = resolved.delay_ms, "Applying delay");
            tokio::time::sleep(tokio::time::Duration::from_millis(resolved.delay_ms)).await;
        }

        let body = self.engine.expand(resolved.response)?;

        if self.log_matches {
            info!(
                mock_id = definition.id,
                mock = %definition.name,
                rule = resolved.rule_name.unwrap_or("-"),
                method = %request.method,
                path = %request.path,
                status = resolved.status,
                "Request matched mock"
            );
        }

        Ok(MatchOutcome::Matched(MatchedResponse {
            status: resolved.status,
            delay_ms: resolved.delay_ms,
            body,
            mock_id: definition.id,
            mock_name: definition.name.clone(),
            mock_project_id: definition.project_id.clone(),
            rule_name: resolved.rule_name.map(str::to_string),
            headers: MOCK_HEADERS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }))
    }

    fn audit_failure(&self, request: RequestSummary, error: String) {
        let audit = Arc::clone(&self.audit);
        tokio::spawn(async move {
            if let Err(e) = audit.on_failure(&request, &error).await {
                warn!(error = %e, url = %request.url, "Failed to record audit entry");
            }
        });
    }

    /// Count the outcome and hand it to the audit sink in a detached task.
    fn finish(&self, request: RequestSummary, outcome: MatchOutcome) -> MatchOutcome {
        match &outcome {
            MatchOutcome::Matched(m) => {
                self.requests_matched.fetch_add(1, Ordering::Relaxed);
                *self.match_counts.lock().entry(m.mock_id).or_default() += 1;
            }
            MatchOutcome::NoMatch => {
                self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
            }
        }

        let audit = Arc::clone(&self.audit);
        let recorded = outcome.clone();
        tokio::spawn(async move {
            if let Err(e) = audit.on_outcome(&request, &recorded).await {
                warn!(error = %e, url = %request.url, "Failed to record audit entry");
            }
        });

        outcome
    }

    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn total_matched(&self) -> u64 {
        self.requests_matched.load(Ordering::Relaxed)
    }

    pub fn total_unmatched(&self) -> u64 {
        self.requests_unmatched.load(Ordering::Relaxed)
    }

    /// Number of requests served by one mock.
    pub fn match_count(&self, mock_id: i64) -> u64 {
        self.match_counts.lock().get(&mock_id).copied().unwrap_or(0)
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            requests_total: self.total_requests(),
            requests_matched: self.total_matched(),
            requests_unmatched: self.total_unmatched(),
            mock_matches: self
                .match_counts
                .lock()
                .iter()
                .map(|(id, count)| (*id, *count))
                .collect(),
        }
    }
}
