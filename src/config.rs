//! Configuration for the mock engine.
//!
//! Defines mock definitions, override rules, and engine settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::Path;

/// Main configuration for the mock engine.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockServerConfig {
    /// Mock definitions, in store iteration order
    #[serde(default)]
    pub mocks: Vec<MockDefinition>,

    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl MockServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (i, mock) in self.mocks.iter().enumerate() {
            mock.validate()
                .map_err(|e| anyhow::anyhow!("Mock {} ({}): {}", i, mock.name, e))?;
        }
        self.settings.validate()?;
        Ok(())
    }
}

/// A single mock definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockDefinition {
    /// Store-assigned identifier
    #[serde(default)]
    pub id: i64,

    /// Human readable name, reported on match
    #[serde(default)]
    pub name: String,

    /// Project scope (absent = global)
    #[serde(
        default,
        alias = "project_id",
        deserialize_with = "deserialize_project_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub project_id: Option<String>,

    /// HTTP method, compared exactly
    pub method: String,

    /// Path pattern with `*` wildcards
    #[serde(alias = "url")]
    pub url_pattern: String,

    /// HTTP status code
    #[serde(default = "default_status")]
    pub status: u16,

    /// Delay before responding, in milliseconds
    #[serde(default, alias = "delay")]
    pub delay_ms: u64,

    /// Whether this mock is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Response template
    #[serde(default)]
    pub response: Value,

    /// Override rules, first match wins
    #[serde(default)]
    pub rules: Vec<Rule>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

fn default_status() -> u16 {
    200
}

/// Project ids arrive as numbers or strings; both compare as decimal text.
fn deserialize_project_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Int(u64),
        Text(String),
    }

    Ok(match Option::<Repr>::deserialize(deserializer)? {
        Some(Repr::Int(n)) => Some(n.to_string()),
        Some(Repr::Text(s)) if !s.is_empty() => Some(s),
        _ => None,
    })
}

fn validate_status(status: u16) -> anyhow::Result<()> {
    if !(100..=599).contains(&status) {
        anyhow::bail!("Invalid status code: {}", status);
    }
    Ok(())
}

impl MockDefinition {
    /// Create an enabled definition with default status and no rules.
    pub fn new(
        name: impl Into<String>,
        method: impl Into<String>,
        url_pattern: impl Into<String>,
        response: Value,
    ) -> Self {
        Self {
            id: 0,
            name: name.into(),
            project_id: None,
            method: method.into(),
            url_pattern: url_pattern.into(),
            status: default_status(),
            delay_ms: 0,
            enabled: true,
            response,
            rules: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Validate the mock definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.method.is_empty() {
            anyhow::bail!("Method cannot be empty");
        }
        if self.url_pattern.is_empty() {
            anyhow::bail!("URL pattern cannot be empty");
        }
        validate_status(self.status)?;
        for rule in &self.rules {
            rule.validate()
                .map_err(|e| anyhow::anyhow!("Rule '{}': {}", rule.name, e))?;
        }
        Ok(())
    }
}

/// A conditional override of a mock's response, status, and delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(default)]
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// All conditions must hold; an empty list never matches
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Status override (0 or absent falls back to the mock's status)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Delay override; an explicit 0 disables the mock's delay
    #[serde(default, alias = "delay", skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,

    /// Response override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

impl Rule {
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(status) = self.status.filter(|s| *s != 0) {
            validate_status(status)?;
        }
        for condition in &self.conditions {
            if condition.key.is_empty() {
                anyhow::bail!("Condition key cannot be empty");
            }
        }
        Ok(())
    }
}

/// One test against the inbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub source: ConditionSource,

    pub key: String,

    pub operator: ConditionOperator,

    /// Expected value, unused by `exists`/`notExists`
    #[serde(default)]
    pub value: Value,
}

/// Where a condition reads its actual value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionSource {
    Query,
    Body,
    Header,
    #[serde(other)]
    Unknown,
}

/// Comparison applied to the actual value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    Exists,
    NotExists,
    #[serde(other)]
    Unknown,
}

/// Identifier generator settings, fixed at process start.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnowflakeSettings {
    /// Custom epoch in unix milliseconds
    #[serde(default = "default_epoch_ms")]
    pub epoch_ms: i64,

    /// Datacenter tag (0-31)
    #[serde(default = "default_node_id")]
    pub datacenter_id: u64,

    /// Worker tag (0-31)
    #[serde(default = "default_node_id")]
    pub worker_id: u64,
}

fn default_epoch_ms() -> i64 {
    // 2024-01-01T00:00:00Z
    1_704_067_200_000
}

fn default_node_id() -> u64 {
    1
}

impl Default for SnowflakeSettings {
    fn default() -> Self {
        Self {
            epoch_ms: default_epoch_ms(),
            datacenter_id: default_node_id(),
            worker_id: default_node_id(),
        }
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    /// Serve mocks at all; when false every request is a no-match
    #[serde(default = "default_true")]
    pub serving_enabled: bool,

    /// Log all matched mocks
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log unmatched requests
    #[serde(default = "default_true")]
    pub log_unmatched: bool,

    /// Number of audit entries retained in memory
    #[serde(default = "default_audit_capacity")]
    pub audit_log_capacity: usize,

    #[serde(default)]
    pub snowflake: SnowflakeSettings,
}

fn default_audit_capacity() -> usize {
    1000
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            serving_enabled: true,
            log_matches: true,
            log_unmatched: true,
            audit_log_capacity: default_audit_capacity(),
            snowflake: SnowflakeSettings::default(),
        }
    }
}

impl GlobalSettings {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.snowflake.datacenter_id > 31 {
            anyhow::bail!(
                "snowflake.datacenter_id must be 0-31, got {}",
                self.snowflake.datacenter_id
            );
        }
        if self.snowflake.worker_id > 31 {
            anyhow::bail!(
                "snowflake.worker_id must be 0-31, got {}",
                self.snowflake.worker_id
            );
        }
        if self.snowflake.epoch_ms < 0 {
            anyhow::bail!("snowflake.epoch_ms cannot be negative");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_simple_mock() {
        let yaml = r#"
mocks:
  - id: 1
    name: user-info
    method: GET
    urlPattern: /user/*
    response:
      ok: true
"#;
        let config: MockServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.mocks.len(), 1);
        let mock = &config.mocks[0];
        assert_eq!(mock.name, "user-info");
        assert_eq!(mock.status, 200);
        assert_eq!(mock.delay_ms, 0);
        assert!(mock.enabled);
        assert!(mock.project_id.is_none());
        assert_eq!(mock.response["ok"], true);
    }

    #[test]
    fn test_parse_store_record_aliases() {
        let json = serde_json::json!({
            "id": 9,
            "name": "login",
            "project_id": 257490565556473856u64,
            "method": "POST",
            "url": "/auth/login",
            "delay": 250,
            "response": {"token": "@snowflake"},
            "rules": [],
            "createdAt": "2024-05-01T10:00:00Z"
        });
        let mock: MockDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(mock.project_id.as_deref(), Some("257490565556473856"));
        assert_eq!(mock.url_pattern, "/auth/login");
        assert_eq!(mock.delay_ms, 250);
        assert!(mock.created_at.is_some());
    }

    #[test]
    fn test_project_id_string_and_empty() {
        let yaml = r#"
method: GET
urlPattern: /a
projectId: "77"
"#;
        let mock: MockDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(mock.project_id.as_deref(), Some("77"));

        let yaml = r#"
method: GET
urlPattern: /a
projectId: ""
"#;
        let mock: MockDefinition = serde_yaml::from_str(yaml).unwrap();
        assert!(mock.project_id.is_none());
    }

    #[test]
    fn test_parse_rules() {
        let yaml = r#"
method: GET
urlPattern: /orders
rules:
  - name: vip
    conditions:
      - type: header
        key: X-Tier
        operator: equals
        value: vip
      - type: query
        key: page
        operator: exists
    status: 201
    delay: 0
    response:
      tier: vip
"#;
        let mock: MockDefinition = serde_yaml::from_str(yaml).unwrap();
        let rule = &mock.rules[0];
        assert!(rule.enabled);
        assert_eq!(rule.conditions.len(), 2);
        assert_eq!(rule.conditions[0].source, ConditionSource::Header);
        assert_eq!(rule.conditions[1].operator, ConditionOperator::Exists);
        assert_eq!(rule.status, Some(201));
        assert_eq!(rule.delay_ms, Some(0));
        assert_eq!(rule.response.as_ref().unwrap()["tier"], "vip");
    }

    #[test]
    fn test_unknown_condition_kinds_parse_as_unknown() {
        let json = serde_json::json!({
            "type": "cookie",
            "key": "session",
            "operator": "matchesRegex",
            "value": ".*"
        });
        let condition: Condition = serde_json::from_value(json).unwrap();
        assert_eq!(condition.source, ConditionSource::Unknown);
        assert_eq!(condition.operator, ConditionOperator::Unknown);
    }

    #[test]
    fn test_validate_rejects_bad_status() {
        let mut mock = MockDefinition::new("bad", "GET", "/x", Value::Null);
        mock.status = 42;
        assert!(mock.validate().is_err());

        mock.status = 503;
        assert!(mock.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_condition_key() {
        let yaml = r#"
mocks:
  - method: GET
    urlPattern: /x
    rules:
      - name: broken
        conditions:
          - type: query
            key: ""
            operator: exists
"#;
        let config: MockServerConfig = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("broken"));
    }

    #[test]
    fn test_validate_snowflake_tags() {
        let mut settings = GlobalSettings::default();
        assert!(settings.validate().is_ok());
        settings.snowflake.worker_id = 32;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_default_settings() {
        let config: MockServerConfig = serde_yaml::from_str("mocks: []").unwrap();
        assert!(config.settings.serving_enabled);
        assert_eq!(config.settings.audit_log_capacity, 1000);
        assert_eq!(config.settings.snowflake.epoch_ms, 1_704_067_200_000);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
mocks:
  - name: health
    method: GET
    urlPattern: /health
    response: {{ status: up }}
settings:
  serving_enabled: false
"#
        )
        .unwrap();

        let config = MockServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.mocks[0].name, "health");
        assert!(!config.settings.serving_enabled);
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mocks:\n  - method: GET\n    urlPattern: /x\n    status: 1000").unwrap();
        assert!(MockServerConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_shipped_default_config() {
        let config: MockServerConfig =
            serde_yaml::from_str(include_str!("../demos/default-config.yaml")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.mocks.len(), 5);
        assert_eq!(config.mocks[1].rules.len(), 2);
        assert_eq!(config.mocks[4].project_id.as_deref(), Some("7"));
    }
}
