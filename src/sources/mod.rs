// src/sources/mod.rs
use async_trait::async_trait;
use std::sync::Arc;

use crate::types::SourceReading;

pub mod env;

/// External value source for an asset/currency pair. A failed fetch is a
/// reading with `value == None`, never an error.
#[async_trait]
pub trait PriceService: Send + Sync {
    async fn fetch(&self, asset: &str, currency: &str) -> SourceReading;
}

/// A source already bound to what it fetches.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch_new_datapoint(&self) -> SourceReading;
}

/// Binds a [`PriceService`] to one pair.
pub struct PriceSource {
    pub asset: String,
    pub currency: String,
    pub service: Arc<dyn PriceService>,
}

impl PriceSource {
    pub fn new<A: Into<String>, C: Into<String>>(asset: A, currency: C, service: Arc<dyn PriceService>) -> Self {
        Self { asset: asset.into(), currency: currency.into(), service }
    }
}

#[async_trait]
impl DataSource for PriceSource {
    async fn fetch_new_datapoint(&self) -> SourceReading {
        self.service.fetch(&self.asset, &self.currency).await
    }
}
