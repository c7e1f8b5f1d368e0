//! Subcommand implementations

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use bson::{Bson, Document};
use clap::Args;
use docpool_connection::{HealthStatus, HealthThresholds, PoolRegistry, ping_connection};
use docpool_core::FindOptions;

use crate::output::{self, PingRow, StatsRow};

#[derive(Debug, Args)]
pub struct PingArgs {
    /// Pool to ping; every configured pool when omitted
    pub pool: Option<String>,

    /// Latency in milliseconds below which a pool is healthy
    #[arg(long, default_value = "50")]
    pub healthy_ms: u64,

    /// Latency in milliseconds below which a pool is degraded
    #[arg(long, default_value = "250")]
    pub degraded_ms: u64,
}

#[derive(Debug, Args)]
pub struct CountArgs {
    /// Collection name
    pub namespace: String,

    /// Filter as a JSON object
    #[arg(short, long, default_value = "{}")]
    pub filter: String,

    #[arg(short, long, default_value = "default")]
    pub pool: String,
}

#[derive(Debug, Args)]
pub struct FindArgs {
    /// Collection name
    pub namespace: String,

    /// Filter as a JSON object
    #[arg(short, long, default_value = "{}")]
    pub filter: String,

    /// Sort specification as a JSON object
    #[arg(long)]
    pub sort: Option<String>,

    #[arg(short, long, default_value = "20")]
    pub limit: i64,

    #[arg(long, default_value = "0")]
    pub skip: u64,

    /// Treat a string `_id` in the filter as an ObjectId hex string
    #[arg(long)]
    pub hex_ids: bool,

    #[arg(short, long, default_value = "default")]
    pub pool: String,
}

/// Parse a JSON object (extended JSON allowed) into a document
pub fn parse_document(json: &str) -> anyhow::Result<Document> {
    let value: serde_json::Value =
        serde_json::from_str(json).with_context(|| format!("invalid JSON: {}", json))?;
    match Bson::try_from(value).context("invalid extended JSON")? {
        Bson::Document(document) => Ok(document),
        other => bail!("expected a JSON object, got {:?}", other.element_type()),
    }
}

pub async fn ping(registry: &Arc<PoolRegistry>, args: &PingArgs) -> anyhow::Result<()> {
    let pools = match &args.pool {
        Some(pool) => vec![pool.clone()],
        None => registry.pool_names(),
    };
    if pools.is_empty() {
        bail!("no pools configured");
    }
    let thresholds = HealthThresholds::new(args.healthy_ms, args.degraded_ms);

    let mut rows = Vec::with_capacity(pools.len());
    let mut scope = registry.scope();
    for pool in pools {
        let row = match scope.connection(&pool).await {
            Ok(conn) => {
                let result = ping_connection(conn).await;
                PingRow {
                    status: HealthStatus::from_ping(&result, &thresholds),
                    latency: result.as_ref().ok().copied(),
                    error: result.err().map(|e| e.to_string()),
                    pool,
                }
            }
            Err(err) => {
                tracing::warn!(pool = %pool, error = %err, "could not connect");
                PingRow {
                    status: HealthStatus::Unhealthy,
                    latency: None,
                    error: Some(err.to_string()),
                    pool,
                }
            }
        };
        rows.push(row);
    }
    scope.finish();

    println!("{}", output::ping_table(&rows));
    if rows.iter().any(|row| !row.status.is_usable()) {
        bail!("one or more pools are unhealthy");
    }
    Ok(())
}

pub async fn stats(registry: &Arc<PoolRegistry>) -> anyhow::Result<()> {
    let mut rows = Vec::new();
    for name in registry.pool_names() {
        let pool = registry.get_pool(&name)?;
        let warmed = match pool.prewarm().await {
            Ok(opened) => Some(opened),
            Err(err) => {
                tracing::warn!(pool = %name, error = %err, "prewarm failed");
                None
            }
        };
        rows.push(StatsRow {
            pool: name,
            stats: pool.stats(),
            warmed,
        });
    }

    println!("{}", output::stats_table(&rows));
    Ok(())
}

pub async fn count(registry: &Arc<PoolRegistry>, args: &CountArgs) -> anyhow::Result<()> {
    let filter = parse_document(&args.filter)?;
    let mut scope = registry.scope();

    let total = scope
        .store(args.pool.as_str())
        .count(&args.namespace, filter)
        .await?;
    scope.finish();

    println!("{}", total);
    Ok(())
}

pub async fn find(registry: &Arc<PoolRegistry>, args: &FindArgs) -> anyhow::Result<()> {
    let filter = parse_document(&args.filter)?;
    let mut options = FindOptions::default()
        .with_limit(args.limit)
        .with_skip(args.skip)
        .with_hex_ids(args.hex_ids);
    if let Some(sort) = &args.sort {
        options = options.with_sort(parse_document(sort)?);
    }

    let started = Instant::now();
    let mut scope = registry.scope();
    let documents = scope
        .store(args.pool.as_str())
        .find_all(&args.namespace, filter, options)
        .await?;
    scope.finish();
    tracing::info!(
        namespace = %args.namespace,
        returned = documents.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "find completed"
    );

    for document in documents {
        println!("{}", output::document_json(document));
    }
    Ok(())
}

/// Milliseconds with one decimal, for latency columns
pub fn format_latency(latency: Duration) -> String {
    format!("{:.1}", latency.as_secs_f64() * 1000.0)
}
