//! Moka Mock Engine - CLI Entry Point

use anyhow::{bail, Context, Result};
use clap::Parser;
use moka_mock_engine::generators::SynthesisProvider;
use moka_mock_engine::{
    Dispatcher, GeneratorRegistry, InMemoryStore, InboundRequest, MemoryAuditLog,
    MockServerConfig, SnowflakeGenerator, TemplateEngine,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "moka-mock-engine",
    about = "Mock matching and response synthesis engine - wildcard routing, override rules and templated fake data",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mock-engine.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Print the generator catalog as JSON and exit
    #[arg(long)]
    catalog: bool,

    /// Dispatch a single request, e.g. "GET /12/user/42?role=admin"
    #[arg(short, long, value_name = "METHOD PATH")]
    request: Option<String>,

    /// Query parameter for --request (repeatable)
    #[arg(short, long = "query", value_name = "KEY=VALUE", value_parser = parse_query_pair)]
    query: Vec<(String, String)>,

    /// Header for --request (repeatable)
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE", value_parser = parse_header_pair)]
    header: Vec<(String, String)>,

    /// JSON body for --request
    #[arg(short, long, value_name = "JSON", value_parser = parse_json)]
    body: Option<Value>,
}

fn parse_query_pair(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))
}

fn parse_header_pair(s: &str) -> Result<(String, String), String> {
    s.split_once(':')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| format!("expected NAME:VALUE, got '{s}'"))
}

fn parse_json(s: &str) -> Result<Value, String> {
    serde_json::from_str(s).map_err(|e| format!("invalid JSON: {e}"))
}

/// Parse `<METHOD> <PATH> [JSON body]`.
fn parse_request_line(line: &str) -> Result<InboundRequest> {
    let mut parts = line.trim().splitn(3, char::is_whitespace);
    let method = parts
        .next()
        .filter(|m| !m.is_empty())
        .context("missing request method")?;
    let path = parts.next().context("missing request path")?;
    if !path.starts_with('/') {
        bail!("request path must start with '/': {path}");
    }

    let mut request = InboundRequest::new(method.to_ascii_uppercase(), path);
    if let Some(body) = parts.next().map(str::trim).filter(|b| !b.is_empty()) {
        request = request.with_body(serde_json::from_str(body).context("invalid JSON body")?);
    }
    Ok(request)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Print default config if requested
    if args.print_config {
        let default_config = include_str!("../demos/default-config.yaml");
        println!("{}", default_config);
        return Ok(());
    }

    if args.catalog {
        let catalog = GeneratorRegistry::with_defaults().catalog();
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }

    // Load configuration
    let config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        MockServerConfig::from_file(&args.config)?
    } else if args.validate {
        bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration (no mocks)");
        MockServerConfig::default()
    };

    // Validate and exit if requested
    if args.validate {
        config.validate()?;
        println!(
            "Configuration is valid ({} mocks defined)",
            config.mocks.len()
        );
        return Ok(());
    }

    let ids = SnowflakeGenerator::new(&config.settings.snowflake)?;
    let engine = TemplateEngine::new(Arc::new(ids), Arc::new(GeneratorRegistry::with_defaults()));
    let audit = Arc::new(MemoryAuditLog::new(config.settings.audit_log_capacity));
    let dispatcher = Dispatcher::new(
        Arc::new(InMemoryStore::from_config(&config)),
        engine,
        audit.clone(),
    )
    .with_settings(&config.settings);

    info!(
        mocks = config.mocks.len(),
        serving = config.settings.serving_enabled,
        "Mock engine initialized"
    );

    if let Some(line) = &args.request {
        let mut request = parse_request_line(line)?;
        for (key, value) in args.query {
            request = request.with_query(key, value);
        }
        for (name, value) in args.header {
            request = request.with_header(name, value);
        }
        if let Some(body) = args.body {
            request = request.with_body(body);
        }

        let outcome = dispatcher.dispatch(request).await?;
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    info!("Reading requests from stdin, one \"<METHOD> <PATH> [JSON]\" per line");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let request = match parse_request_line(&line) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!(error = %e, "Skipping malformed request line");
                        continue;
                    }
                };
                match dispatcher.dispatch(request).await {
                    Ok(outcome) => println!("{}", serde_json::to_string(&outcome)?),
                    Err(e) => error!(error = %e, "Dispatch failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    let stats = dispatcher.stats();
    info!(
        total = stats.requests_total,
        matched = stats.requests_matched,
        unmatched = stats.requests_unmatched,
        audited = audit.len(),
        "Mock engine stopped"
    );

    Ok(())
}
