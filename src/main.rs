use std::collections::BTreeMap;

use anyhow::{Context, Result};
use tracing::{info, warn, Level};

mod config;
mod db;
mod models;

use clap::Parser;
use config::Config;
use db::{new_adapter, DbAdapter};
use models::{Record, Status};

/// One pass over every operation of the contract with a single key.
async fn probe(db: &mut dyn DbAdapter, table: &str, key: &str) -> BTreeMap<&'static str, Status> {
    let mut report = BTreeMap::new();
    let values: Record = [
        ("field0".to_string(), b"kvbench".to_vec()),
        ("field1".to_string(), b"probe".to_vec()),
    ]
    .into();
    let changed: Record = [("field1".to_string(), b"updated".to_vec())].into();

    report.insert("insert", db.insert(table, key, &values).await);

    let mut first = Record::new();
    report.insert("read", db.read(table, key, None, &mut first).await);

    report.insert("update", db.update(table, key, &changed).await);

    let mut second = Record::new();
    report.insert("read_after_update", db.read(table, key, None, &mut second).await);
    if report["read_after_update"].is_ok() && second.get("field1") != changed.get("field1") {
        warn!("update of {} not visible to a following read", key);
    }

    let mut rows = Vec::new();
    report.insert("scan", db.scan(table, key, 1, None, &mut rows).await);

    report.insert("delete", db.delete(table, key).await);
    report
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    // 初始化日志
    let level: Level = config
        .log_level
        .parse()
        .with_context(|| format!("invalid log level \"{}\"", config.log_level))?;
    tracing_subscriber::fmt().with_max_level(level).init();

    let properties = config.properties();
    if properties.is_empty() {
        warn!("No adapter properties given; pass them with -p key=value");
    }
    info!(
        "Using {:?} adapter with {} properties",
        config.driver(),
        properties.len()
    );

    let mut db = new_adapter(config.driver(), properties);
    db.init()
        .await
        .with_context(|| format!("{} adapter failed to start", db.driver_name()))?;

    let report = probe(db.as_mut(), &config.table, &config.key).await;
    for (op, status) in &report {
        info!("{:<18} {}", op, status);
    }

    db.cleanup().await?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
