// src/bin/funded_feeds.rs
use alloy::primitives::{Bytes, B256};
use clap::Parser;
use funded_feeds::{
    catalog::FeedCatalog,
    config::ListenerConfig,
    filter::FundedFeedFilter,
    reporting::{EligibleFeedSink, StdoutSink},
    types::{FundedFeedDetails, FundedFeedParams, TimestampValue},
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Run one eligibility pass over a snapshot of funded feeds.
#[derive(Debug, Parser)]
#[command(name = "funded_feeds", version)]
struct Args {
    /// JSON snapshot: `{ "feeds": [...], "unclaimed": [...] }`
    #[arg(long)]
    feeds: PathBuf,
    /// Optional TOML config (`[[feeds]]` catalog, generic source types, timeouts)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Evaluation time (unix seconds); defaults to now
    #[arg(long)]
    now: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Snapshot {
    feeds: Vec<FeedRecord>,
    #[serde(default)]
    unclaimed: Vec<UnclaimedRecord>,
}

#[derive(Debug, Deserialize)]
struct FeedRecord {
    query_data: Bytes,
    params: FundedFeedParams,
    #[serde(default)]
    current_value_timestamp: u64, // 0 = never reported
    #[serde(default)]
    current_value: Bytes,
    #[serde(default)]
    history: Vec<TimestampValue>,
}

#[derive(Debug, Deserialize)]
struct UnclaimedRecord {
    feed_id: B256,
    query_id: B256,
    count: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cfg = ListenerConfig::load(args.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let raw = std::fs::read_to_string(&args.feeds)?;
    let snapshot: Snapshot = serde_json::from_str(&raw)?;

    let feeds: Vec<FundedFeedDetails> = snapshot
        .feeds
        .into_iter()
        .map(|r| {
            FundedFeedDetails::new(
                r.query_data,
                r.params,
                Some(r.current_value_timestamp).filter(|t| *t != 0),
                r.current_value,
                r.history,
            )
        })
        .collect();
    let unclaimed: HashMap<(B256, B256), u64> = snapshot
        .unclaimed
        .into_iter()
        .map(|u| ((u.feed_id, u.query_id), u.count))
        .collect();

    let now = args.now.unwrap_or_else(|| chrono::Utc::now().timestamp().max(0) as u64);
    let engine = FundedFeedFilter::new(Arc::new(FeedCatalog::from_config(&cfg)), cfg.fetch_timeout());
    let eligible = engine.run_pass(feeds, &unclaimed, now).await;

    StdoutSink.publish_eligible(now, &eligible).await?;
    Ok(())
}
