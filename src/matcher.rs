//! Request matching logic.
//!
//! Selects the mock definition serving a request and the override rule, if
//! any, that applies to it. Selection is first-match in store order; there
//! is no ranking.

use crate::conditions;
use crate::config::{MockDefinition, Rule};
use crate::pattern::UrlPattern;
use crate::request::{InboundRequest, Route};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Distinct patterns kept compiled before the cache starts over.
const MAX_CACHED_PATTERNS: usize = 4_096;

/// Request matcher.
///
/// URL patterns are compiled on first use and cached by source text, so a
/// pattern is compiled once no matter how many snapshots carry it.
#[derive(Default)]
pub struct Matcher {
    patterns: Mutex<HashMap<String, Arc<UrlPattern>>>,
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the first definition serving `method` on `route`.
    ///
    /// Method and project scope are checked before the pattern, and the
    /// scan stops at the first hit, so only candidates up to the winner
    /// ever have their pattern compiled.
    pub fn find_match<'a>(
        &self,
        definitions: &'a [MockDefinition],
        method: &str,
        route: &Route,
    ) -> Option<&'a MockDefinition> {
        definitions.iter().find(|definition| {
            definition.enabled
                && definition.method == method
                && in_scope(definition, route)
                && self.pattern(&definition.url_pattern).matches(&route.path)
        })
    }

    /// Number of patterns currently compiled.
    pub fn compiled_count(&self) -> usize {
        self.patterns.lock().len()
    }

    fn pattern(&self, source: &str) -> Arc<UrlPattern> {
        let mut patterns = self.patterns.lock();
        if let Some(pattern) = patterns.get(source) {
            return Arc::clone(pattern);
        }
        if patterns.len() >= MAX_CACHED_PATTERNS {
            patterns.clear();
        }
        let pattern = Arc::new(UrlPattern::compile(source));
        patterns.insert(source.to_string(), Arc::clone(&pattern));
        pattern
    }
}

/// Global definitions serve every project; scoped ones only their own.
fn in_scope(definition: &MockDefinition, route: &Route) -> bool {
    match &definition.project_id {
        None => true,
        Some(project) => route.project_id.as_deref() == Some(project.as_str()),
    }
}

/// First enabled rule whose conditions all hold.
pub fn select_rule<'a>(definition: &'a MockDefinition, request: &InboundRequest) -> Option<&'a Rule> {
    definition
        .rules
        .iter()
        .find(|rule| rule.enabled && conditions::evaluate(rule, request))
}

/// Status, delay and response template after applying a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedResponse<'a> {
    pub status: u16,
    pub delay_ms: u64,
    pub response: &'a Value,
    pub rule_name: Option<&'a str>,
}

/// Merge a rule's overrides over the definition.
///
/// A status of 0 counts as unset. A delay counts as set whenever present,
/// including an explicit 0.
pub fn resolve_response<'a>(
    definition: &'a MockDefinition,
    rule: Option<&'a Rule>,
) -> ResolvedResponse<'a> {
    let Some(rule) = rule else {
        return ResolvedResponse {
            status: definition.status,
            delay_ms: definition.delay_ms,
            response: &definition.response,
            rule_name: None,
        };
    };

    ResolvedResponse {
        status: rule
            .status
            .filter(|s| *s != 0)
            .unwrap_or(definition.status),
        delay_ms: rule.delay_ms.unwrap_or(definition.delay_ms),
        response: rule.response.as_ref().unwrap_or(&definition.response),
        rule_name: Some(rule.name.as_str()),
    }
}
