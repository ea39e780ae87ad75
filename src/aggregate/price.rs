// src/aggregate/price.rs
use chrono::Utc;
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;

use super::{aggregate, Algorithm};
use crate::sources::DataSource;
use crate::types::SourceReading;

/// Fans out to every source, then combines whatever came back.
pub struct PriceAggregator {
    pub asset: String,
    pub currency: String,
    pub algorithm: Algorithm,
    pub sources: Vec<Arc<dyn DataSource>>,
}

impl PriceAggregator {
    pub fn new<A: Into<String>, C: Into<String>>(
        asset: A,
        currency: C,
        algorithm: Algorithm,
        sources: Vec<Arc<dyn DataSource>>,
    ) -> Self {
        Self { asset: asset.into(), currency: currency.into(), algorithm, sources }
    }

    pub async fn update_sources(&self) -> Vec<SourceReading> {
        join_all(self.sources.iter().map(|s| s.fetch_new_datapoint())).await
    }
}

impl fmt::Display for PriceAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PriceAggregator {}/{} {}",
            self.asset.to_uppercase(),
            self.currency.to_uppercase(),
            self.algorithm
        )
    }
}

#[async_trait::async_trait]
impl DataSource for PriceAggregator {
    async fn fetch_new_datapoint(&self) -> SourceReading {
        let readings = self.update_sources().await;
        let used = readings.iter().filter(|r| r.usable().is_some()).count();

        match aggregate(&readings, self.algorithm) {
            Ok(Some((price, ts))) => {
                tracing::info!(
                    "{self}: {price} at {ts} from {used}/{} sources",
                    readings.len()
                );
                SourceReading::new(price, ts)
            }
            Ok(None) => {
                tracing::warn!("No prices retrieved for {self}");
                SourceReading::failed(Utc::now())
            }
            Err(e) => {
                tracing::warn!("{self}: {e}");
                SourceReading::failed(Utc::now())
            }
        }
    }
}
