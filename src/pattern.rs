//! Wildcard URL patterns.
//!
//! A pattern is a literal path in which every `*` matches any run of
//! characters, `/` included. Matching is always against the whole path.

use regex::Regex;
use tracing::warn;

/// A compiled URL pattern.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    source: String,
    compiled: CompiledPattern,
}

#[derive(Debug, Clone)]
enum CompiledPattern {
    Regex(Regex),
    /// Only reached when the regex exceeds the engine's size limit.
    Literal(String),
}

impl UrlPattern {
    /// Compile a pattern. Any input string yields a usable matcher.
    pub fn compile(pattern: &str) -> Self {
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");

        let compiled = match Regex::new(&format!("^{body}$")) {
            Ok(regex) => CompiledPattern::Regex(regex),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Pattern too large for regex, using literal match");
                CompiledPattern::Literal(pattern.to_string())
            }
        };

        Self {
            source: pattern.to_string(),
            compiled,
        }
    }

    /// Check whether `path` matches the whole pattern.
    pub fn matches(&self, path: &str) -> bool {
        match &self.compiled {
            CompiledPattern::Regex(regex) => regex.is_match(path),
            CompiledPattern::Literal(value) => value == path,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}
