//! Audit hook for dispatch outcomes.
//!
//! The dispatcher hands every terminal outcome, and every failed dispatch,
//! to an [`AuditSink`] in a detached task. Sink failures are logged and
//! never reach the caller.

use crate::dispatcher::MatchOutcome;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{info, warn};

/// Audit persistence errors.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink rejected entry: {0}")]
    Rejected(String),
}

/// Request facts retained for auditing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    pub method: String,
    /// Full path as received, including project prefix and query string
    pub url: String,
    pub project_id: Option<String>,
}

/// One persisted audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub url: String,
    pub method: String,
    pub mock_name: Option<String>,
    pub status: Option<u16>,
    pub matched: bool,
    /// Matched mock's project, or the request's scope when nothing matched
    pub project_id: Option<String>,
    /// Set when dispatch failed before producing an outcome
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LogEntry {
    pub fn from_outcome(request: &RequestSummary, outcome: &MatchOutcome) -> Self {
        let (mock_name, status, project_id) = match outcome {
            MatchOutcome::Matched(m) => (
                Some(m.mock_name.clone()),
                Some(m.status),
                m.mock_project_id.clone(),
            ),
            MatchOutcome::NoMatch => (None, None, request.project_id.clone()),
        };

        Self {
            url: request.url.clone(),
            method: request.method.clone(),
            mock_name,
            status,
            matched: outcome.is_matched(),
            project_id,
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn from_failure(request: &RequestSummary, error: &str) -> Self {
        Self {
            url: request.url.clone(),
            method: request.method.clone(),
            mock_name: None,
            status: None,
            matched: false,
            project_id: request.project_id.clone(),
            error: Some(error.to_string()),
            created_at: Utc::now(),
        }
    }
}

/// Receives one call per dispatched request: `on_outcome` when an outcome
/// was produced, `on_failure` otherwise.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn on_outcome(
        &self,
        request: &RequestSummary,
        outcome: &MatchOutcome,
    ) -> Result<(), AuditError>;

    async fn on_failure(&self, _request: &RequestSummary, _error: &str) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Sink that only emits a tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn on_outcome(
        &self,
        request: &RequestSummary,
        outcome: &MatchOutcome,
    ) -> Result<(), AuditError> {
        let entry = LogEntry::from_outcome(request, outcome);
        info!(
            target: "mock_audit",
            method = %entry.method,
            url = %entry.url,
            matched = entry.matched,
            mock = entry.mock_name.as_deref().unwrap_or("-"),
            status = entry.status.unwrap_or_default(),
            "Request audited"
        );
        Ok(())
    }

    async fn on_failure(&self, request: &RequestSummary, error: &str) -> Result<(), AuditError> {
        warn!(
            target: "mock_audit",
            method = %request.method,
            url = %request.url,
            error,
            "Failed request audited"
        );
        Ok(())
    }
}

/// Bounded in-memory audit log. The oldest entries are dropped first.
pub struct MemoryAuditLog {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

impl MemoryAuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn push(&self, entry: LogEntry) {
        let mut entries = self.entries.lock();
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Snapshot of all entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Newest entries first, optionally restricted to one project.
    pub fn recent(&self, limit: usize, project_id: Option<&str>) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .rev()
            .filter(|e| project_id.is_none() || e.project_id.as_deref() == project_id)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for MemoryAuditLog {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn on_outcome(
        &self,
        request: &RequestSummary,
        outcome: &MatchOutcome,
    ) -> Result<(), AuditError> {
        self.push(LogEntry::from_outcome(request, outcome));
        Ok(())
    }

    async fn on_failure(&self, request: &RequestSummary, error: &str) -> Result<(), AuditError> {
        self.push(LogEntry::from_failure(request, error));
        Ok(())
    }
}
