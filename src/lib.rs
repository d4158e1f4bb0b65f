//! Moka Mock Engine
//!
//! Matches inbound HTTP requests against stored mock definitions and
//! synthesizes JSON responses from templates.
//!
//! # Features
//!
//! - **Wildcard Routing**: `*` in URL patterns matches any run of characters
//! - **Project Scoping**: a leading numeric path segment selects a project
//! - **Override Rules**: conditional status/delay/response overrides keyed on
//!   query parameters, body fields and headers
//! - **Templated Responses**: `@repeat`, `@snowflake` and `@gen:` directives
//!   expand into fresh fake data on every request
//! - **Latency Simulation**: per-mock and per-rule delays
//! - **Audit Hook**: every outcome is handed to a pluggable sink
//!
//! # Example Configuration
//!
//! ```yaml
//! mocks:
//!   - name: user-detail
//!     method: GET
//!     urlPattern: /user/*
//!     delayMs: 100
//!     response:
//!       id: "@snowflake"
//!       name: "@gen:person.fullName"
//!       tags: ["@repeat(1,3)", "@gen:lorem.word"]
//!     rules:
//!       - name: missing-user
//!         conditions:
//!           - type: query
//!             key: missing
//!             operator: equals
//!             value: "true"
//!         status: 404
//!         response:
//!           error: not found
//! ```

pub mod audit;
pub mod conditions;
pub mod config;
pub mod dispatcher;
pub mod expression;
pub mod generators;
pub mod matcher;
pub mod pattern;
pub mod request;
pub mod snowflake;
pub mod store;
pub mod template;

pub use audit::{AuditSink, MemoryAuditLog, TracingAuditSink};
pub use config::MockServerConfig;
pub use dispatcher::{DispatchError, Dispatcher, MatchOutcome, MatchedResponse};
pub use generators::GeneratorRegistry;
pub use request::InboundRequest;
pub use snowflake::SnowflakeGenerator;
pub use store::{InMemoryStore, MockStore};
pub use template::TemplateEngine;
