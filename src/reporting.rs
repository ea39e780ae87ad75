// src/reporting.rs
use crate::types::FundedFeedDetails;

/// Receives the eligible set at the end of each pass; the reporter behind it
/// decides what, if anything, to submit.
#[async_trait::async_trait]
pub trait EligibleFeedSink: Send + Sync + 'static {
    async fn publish_eligible(&self, now: u64, feeds: &[FundedFeedDetails]) -> anyhow::Result<()>;
}

/// Prints the eligible set as one JSON document.
pub struct StdoutSink;

#[async_trait::async_trait]
impl EligibleFeedSink for StdoutSink {
    async fn publish_eligible(&self, now: u64, feeds: &[FundedFeedDetails]) -> anyhow::Result<()> {
        let doc = serde_json::json!({ "now": now, "eligible": feeds });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        Ok(())
    }
}
