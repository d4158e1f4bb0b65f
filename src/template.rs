//! Template engine for synthesized responses.
//!
//! A response template is any JSON value. It is compiled into a [`Template`]
//! tree in which repeat directives and inline expressions are explicit
//! variants, then rendered into concrete JSON. Rendering re-runs every
//! generator, so each expansion yields fresh values.

use crate::expression::{self, GeneratorCall, Token};
use crate::generators::SynthesisProvider;
use crate::snowflake::{IdGenerator, SnowflakeError};
use rand::Rng;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Upper bound on copies produced by one repeat directive.
pub const MAX_REPEAT: u64 = 10_000;

/// Upper bound on copies produced by all repeat directives of one
/// expansion, nested ones included.
pub const MAX_TOTAL_REPEAT: u64 = 100_000;

/// Expansion errors. Malformed expressions never surface here; only a
/// failing identifier generator does.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TemplateError {
    #[error("identifier generation failed: {0}")]
    Identifier(#[from] SnowflakeError),
}

/// Compiled response template.
#[derive(Debug, Clone, PartialEq)]
pub enum Template {
    /// Emitted as-is (numbers, booleans, null, directive-free strings)
    Literal(Value),
    /// String containing at least one directive
    Text(Vec<Token>),
    /// Array expanded element by element
    Sequence(Vec<Template>),
    /// `["@repeat(min,max)", body]`
    Repeat {
        min: u64,
        max: u64,
        body: Box<Template>,
    },
    /// Object expanded value by value
    Mapping(Vec<(String, Template)>),
}

impl Template {
    /// Compile a JSON value.
    pub fn compile(value: &Value) -> Self {
        match value {
            Value::Array(items) => {
                if let (Some(Value::String(head)), Some(body)) = (items.first(), items.get(1)) {
                    if let Some((min, max)) = expression::parse_repeat(head) {
                        return Template::Repeat {
                            min,
                            max,
                            body: Box::new(Template::compile(body)),
                        };
                    }
                }
                Template::Sequence(items.iter().map(Template::compile).collect())
            }
            Value::Object(fields) => Template::Mapping(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Template::compile(v)))
                    .collect(),
            ),
            Value::String(s) => {
                let tokens = expression::tokenize(s);
                if expression::has_directives(&tokens) {
                    Template::Text(tokens)
                } else {
                    Template::Literal(value.clone())
                }
            }
            _ => Template::Literal(value.clone()),
        }
    }
}

/// Renders templates against an identifier generator and a synthesis
/// provider.
#[derive(Clone)]
pub struct TemplateEngine {
    ids: Arc<dyn IdGenerator>,
    provider: Arc<dyn SynthesisProvider>,
}

impl TemplateEngine {
    /// Create a new template engine.
    pub fn new(ids: Arc<dyn IdGenerator>, provider: Arc<dyn SynthesisProvider>) -> Self {
        Self { ids, provider }
    }

    /// Compile and render a JSON template.
    pub fn expand(&self, value: &Value) -> Result<Value, TemplateError> {
        self.render(&Template::compile(value))
    }

    /// Render a compiled template.
    pub fn render(&self, template: &Template) -> Result<Value, TemplateError> {
        let mut budget = MAX_TOTAL_REPEAT;
        self.render_with(template, &mut budget)
    }

    /// `budget` is the number of repeat copies still allowed.
    fn render_with(&self, template: &Template, budget: &mut u64) -> Result<Value, TemplateError> {
        match template {
            Template::Literal(value) => Ok(value.clone()),
            Template::Text(tokens) => self.render_text(tokens),
            Template::Sequence(items) => items
                .iter()
                .map(|item| self.render_with(item, budget))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Template::Repeat { min, max, body } => {
                let wanted = repeat_count(*min, *max);
                let count = wanted.min(*budget);
                if count < wanted {
                    warn!(
                        count = wanted,
                        remaining = *budget,
                        limit = MAX_TOTAL_REPEAT,
                        "Expansion repeat budget exhausted"
                    );
                }
                *budget -= count;
                (0..count)
                    .map(|_| self.render_with(body, budget))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            Template::Mapping(fields) => {
                let mut rendered = Map::new();
                for (key, value) in fields {
                    rendered.insert(key.clone(), self.render_with(value, budget)?);
                }
                Ok(Value::Object(rendered))
            }
        }
    }

    fn render_text(&self, tokens: &[Token]) -> Result<Value, TemplateError> {
        // A lone generator keeps its typed value.
        if let [Token::Generator(call)] = tokens {
            return Ok(self
                .generate(call)
                .unwrap_or_else(|| Value::String(call.raw.clone())));
        }

        let mut out = String::new();
        for token in tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Snowflake => out.push_str(&self.ids.next_id_string()?),
                Token::Generator(call) => match self.generate(call) {
                    Some(Value::String(s)) => out.push_str(&s),
                    Some(other) => out.push_str(&other.to_string()),
                    None => out.push_str(&call.raw),
                },
            }
        }
        Ok(Value::String(out))
    }

    /// Resolve one generator call; `None` leaves the source text in place.
    fn generate(&self, call: &GeneratorCall) -> Option<Value> {
        match self.provider.resolve(&call.category, &call.method, &call.args) {
            Some(Ok(value)) => Some(value),
            Some(Err(e)) => {
                warn!(expression = %call.raw, error = %e, "Generator failed, keeping expression");
                None
            }
            None => {
                warn!(
                    expression = %call.raw,
                    category = %call.category,
                    method = %call.method,
                    "Unknown generator, keeping expression"
                );
                None
            }
        }
    }
}

fn repeat_count(min: u64, max: u64) -> u64 {
    let count = if min == max {
        min
    } else {
        rand::thread_rng().gen_range(min..=max)
    };
    if count > MAX_REPEAT {
        warn!(count, limit = MAX_REPEAT, "Repeat count clamped");
        return MAX_REPEAT;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::GeneratorRegistry;
    use crate::snowflake::testing::{RolledBackClock, SequentialIds};
    use crate::snowflake::SnowflakeGenerator;
    use crate::config::SnowflakeSettings;
    use serde_json::json;

    fn engine() -> TemplateEngine {
        TemplateEngine::new(
            Arc::new(SequentialIds::default()),
            Arc::new(GeneratorRegistry::with_defaults()),
        )
    }

    #[test]
    fn test_static_values_pass_through() {
        let engine = engine();
        let template = json!({
            "message": "no directives here",
            "count": 3,
            "ok": true,
            "nothing": null,
            "list": [1, "two", 3.5]
        });
        assert_eq!(engine.expand(&template).unwrap(), template);
    }

    #[test]
    fn test_snowflake_is_fresh_per_occurrence() {
        let engine = engine();
        let result = engine
            .expand(&json!({"a": "@snowflake", "b": "@snowflake", "c": "id-@snowflake-@snowflake"}))
            .unwrap();
        assert_eq!(result["a"], "1");
        assert_eq!(result["b"], "2");
        assert_eq!(result["c"], "id-3-4");
    }

    #[test]
    fn test_two_expansions_differ_in_ids_only() {
        let engine = TemplateEngine::new(
            Arc::new(SnowflakeGenerator::new(&SnowflakeSettings::default()).unwrap()),
            Arc::new(GeneratorRegistry::with_defaults()),
        );
        let template = json!({"id": "@snowflake", "n": "@gen:number.int(1,1)"});

        let first = engine.expand(&template).unwrap();
        let second = engine.expand(&template).unwrap();
        assert_ne!(first["id"], second["id"]);
        assert!(first["id"].as_str().unwrap().parse::<u64>().is_ok());
        assert_eq!(first["n"], 1);
        assert_eq!(second["n"], 1);
    }

    #[test]
    fn test_repeat_fixed_count() {
        let engine = engine();
        let result = engine
            .expand(&json!(["@repeat(2,2)", {"x": "@gen:number.int(5,5)"}]))
            .unwrap();
        assert_eq!(result, json!([{"x": 5}, {"x": 5}]));
    }

    #[test]
    fn test_repeat_single_bound() {
        let engine = engine();
        let result = engine.expand(&json!(["@repeat(3)", "@snowflake"])).unwrap();
        assert_eq!(result, json!(["1", "2", "3"]));
    }

    #[test]
    fn test_repeat_range_and_independent_copies() {
        let engine = engine();
        for _ in 0..20 {
            let result = engine
                .expand(&json!(["@repeat(1,4)", {"id": "@snowflake"}]))
                .unwrap();
            let items = result.as_array().unwrap();
            assert!((1..=4).contains(&items.len()));
            let ids: std::collections::HashSet<_> =
                items.iter().map(|i| i["id"].as_str().unwrap().to_string()).collect();
            assert_eq!(ids.len(), items.len());
        }
    }

    #[test]
    fn test_repeat_zero_and_nested() {
        let engine = engine();
        assert_eq!(engine.expand(&json!(["@repeat(0)", {"a": 1}])).unwrap(), json!([]));

        let result = engine
            .expand(&json!({"rows": ["@repeat(2)", {"cells": ["@repeat(3)", "@gen:number.int(7,7)"]}]}))
            .unwrap();
        assert_eq!(result, json!({"rows": [{"cells": [7, 7, 7]}, {"cells": [7, 7, 7]}]}));
    }

    #[test]
    fn test_repeat_head_requires_second_element() {
        let engine = engine();
        let template = json!(["@repeat(2)"]);
        assert_eq!(engine.expand(&template).unwrap(), template);

        // Not a directive: expands elementwise.
        let result = engine
            .expand(&json!(["@repeat(x)", "@gen:number.int(1,1)"]))
            .unwrap();
        assert_eq!(result, json!(["@repeat(x)", 1]));
    }

    #[test]
    fn test_unknown_generator_left_verbatim() {
        let engine = engine();
        let result = engine
            .expand(&json!({"a": "@gen:bogus.thing", "b": "x @gen:bogus.thing(1) y"}))
            .unwrap();
        assert_eq!(result["a"], "@gen:bogus.thing");
        assert_eq!(result["b"], "x @gen:bogus.thing(1) y");
    }

    #[test]
    fn test_failing_generator_degrades_locally() {
        let engine = engine();
        let result = engine
            .expand(&json!({"bad": "@gen:number.int(9,1)", "good": "@gen:number.int(2,2)"}))
            .unwrap();
        assert_eq!(result["bad"], "@gen:number.int(9,1)");
        assert_eq!(result["good"], 2);
    }

    #[test]
    fn test_mixed_text_stringifies_values() {
        let engine = engine();
        let result = engine
            .expand(&json!("n=@gen:number.int(4,4), f=@gen:number.float(1.5,1.5)"))
            .unwrap();
        assert_eq!(result, json!("n=4, f=1.5"));
    }

    #[test]
    fn test_product_name_post_processing_applies() {
        let engine = engine();
        let result = engine.expand(&json!("@gen:commerce.productName")).unwrap();
        assert!(!result.as_str().unwrap().contains(' '));
    }

    #[test]
    fn test_identifier_failure_propagates() {
        let engine = TemplateEngine::new(
            Arc::new(RolledBackClock),
            Arc::new(GeneratorRegistry::with_defaults()),
        );
        let result = engine.expand(&json!({"id": "@snowflake"}));
        assert!(matches!(
            result,
            Err(TemplateError::Identifier(SnowflakeError::ClockMovedBackwards { .. }))
        ));

        // Templates without identifiers are unaffected.
        assert!(engine.expand(&json!({"n": "@gen:number.int(1,1)"})).is_ok());
    }

    #[test]
    fn test_compile_shapes() {
        let compiled = Template::compile(&json!(["@repeat(1,3)", {"name": "@gen:person.firstName"}]));
        match compiled {
            Template::Repeat { min, max, body } => {
                assert_eq!((min, max), (1, 3));
                assert!(matches!(*body, Template::Mapping(_)));
            }
            other => panic!("expected repeat, got {other:?}"),
        }
    }

    #[test]
    fn test_repeat_count_is_clamped() {
        assert_eq!(repeat_count(MAX_REPEAT + 5, MAX_REPEAT + 5), MAX_REPEAT);
        assert_eq!(repeat_count(4, 4), 4);
    }

    fn count_elements(value: &Value) -> u64 {
        match value {
            Value::Array(items) => items.len() as u64 + items.iter().map(count_elements).sum::<u64>(),
            Value::Object(fields) => fields.values().map(count_elements).sum(),
            _ => 0,
        }
    }

    #[test]
    fn test_nested_repeats_share_one_budget() {
        let engine = engine();
        let template = json!(["@repeat(10000)", ["@repeat(10000)", ["@repeat(10000)", 1]]]);
        let result = engine.expand(&template).unwrap();

        assert_eq!(result.as_array().unwrap().len() as u64, MAX_REPEAT);
        assert!(count_elements(&result) <= MAX_TOTAL_REPEAT);

        // The budget is per expansion, not per engine.
        let small = engine.expand(&json!(["@repeat(3)", 1])).unwrap();
        assert_eq!(small, json!([1, 1, 1]));
    }

    #[test]
    fn test_non_finite_float_range_left_verbatim() {
        let engine = engine();
        let result = engine
            .expand(&json!({
                "a": "@gen:number.float(0,inf)",
                "b": "@gen:commerce.price(NaN,5)",
                "c": "@gen:number.float(-1e308,1e308)",
                "d": "x @gen:number.float(0,1e309) y"
            }))
            .unwrap();
        assert_eq!(result["a"], "@gen:number.float(0,inf)");
        assert_eq!(result["b"], "@gen:commerce.price(NaN,5)");
        assert_eq!(result["c"], "@gen:number.float(-1e308,1e308)");
        assert_eq!(result["d"], "x @gen:number.float(0,1e309) y");
    }
}
