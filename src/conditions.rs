//! Rule condition evaluation.
//!
//! Conditions compare the string form of a request value against the
//! string form of the expected value. A missing value compares as
//! `"undefined"`. Anything unrecognized fails closed.

use crate::config::{Condition, ConditionOperator, ConditionSource, Rule};
use crate::request::InboundRequest;
use serde_json::Value;
use std::borrow::Cow;

/// Evaluate a rule against a request.
///
/// A rule with no conditions never matches. Otherwise every condition must
/// hold.
pub fn evaluate(rule: &Rule, request: &InboundRequest) -> bool {
    if rule.conditions.is_empty() {
        return false;
    }
    rule.conditions
        .iter()
        .all(|condition| evaluate_condition(condition, request))
}

/// Placeholder compared against when the request lacks the value.
const UNDEFINED: &str = "undefined";

/// Evaluate a single condition.
pub fn evaluate_condition(condition: &Condition, request: &InboundRequest) -> bool {
    // (defined and non-null, string form)
    let (present, actual) = match condition.source {
        ConditionSource::Query => lookup(request.query_param(&condition.key)),
        ConditionSource::Header => lookup(request.header(&condition.key)),
        ConditionSource::Body => match request.body_field(&condition.key) {
            Some(value) => (!value.is_null(), stringify(value)),
            None => (false, Cow::Borrowed(UNDEFINED)),
        },
        ConditionSource::Unknown => return false,
    };

    let expected = || stringify(&condition.value);
    match condition.operator {
        ConditionOperator::Exists => present,
        ConditionOperator::NotExists => !present,
        ConditionOperator::Equals => actual == expected(),
        ConditionOperator::Contains => actual.contains(&*expected()),
        ConditionOperator::StartsWith => actual.starts_with(&*expected()),
        ConditionOperator::EndsWith => actual.ends_with(&*expected()),
        ConditionOperator::Unknown => false,
    }
}

fn lookup(value: Option<&str>) -> (bool, Cow<'_, str>) {
    match value {
        Some(v) => (true, Cow::Borrowed(v)),
        None => (false, Cow::Borrowed(UNDEFINED)),
    }
}

/// String form used for comparisons.
///
/// Follows JavaScript's `String()`: integral numbers print without a
/// fraction, arrays join their elements with `,` (null elements empty), and
/// objects print as `[object Object]`.
pub fn stringify(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s),
        Value::Null => Cow::Borrowed("null"),
        Value::Bool(true) => Cow::Borrowed("true"),
        Value::Bool(false) => Cow::Borrowed("false"),
        Value::Number(n) => Cow::Owned(number_string(n)),
        Value::Array(items) => Cow::Owned(
            items
                .iter()
                .map(|item| match item {
                    Value::Null => Cow::Borrowed(""),
                    other => stringify(other),
                })
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Cow::Borrowed("[object Object]"),
    }
}

fn number_string(n: &serde_json::Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e21 => {
            if f == 0.0 {
                "0".to_string()
            } else {
                format!("{f:.0}")
            }
        }
        _ => n.to_string(),
    }
}
