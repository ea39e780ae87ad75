// src/catalog.rs
use alloy::primitives::{keccak256, B256};
use std::collections::HashMap;
use std::sync::Arc;

use crate::aggregate::{price::PriceAggregator, Algorithm};
use crate::config::{CatalogFeedConfig, ListenerConfig};
use crate::query::{decode_type_name, Query, SPOT_PRICE};
use crate::sources::{env::EnvPriceService, DataSource, PriceService, PriceSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub tag: String,
    pub query: Query,
}

/// A query paired with the source that can answer it.
#[derive(Clone)]
pub struct DataFeed {
    pub query: Query,
    pub source: Arc<dyn DataSource>,
}

/// Builds a source for a query type that is not cataloged but can be served
/// by a parametrised source (e.g. any `SpotPrice` pair).
pub trait GenericSourceBuilder: Send + Sync {
    fn build(&self, query: &Query) -> Option<Arc<dyn DataSource>>;
}

impl<F> GenericSourceBuilder for F
where
    F: Fn(&Query) -> Option<Arc<dyn DataSource>> + Send + Sync,
{
    fn build(&self, query: &Query) -> Option<Arc<dyn DataSource>> {
        self(query)
    }
}

#[derive(Default)]
pub struct FeedCatalog {
    queries: HashMap<B256, CatalogEntry>,
    feeds: HashMap<String, Arc<dyn DataSource>>,
    generic: HashMap<String, Arc<dyn GenericSourceBuilder>>,
}

impl FeedCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a known query under `tag`; `source` may be omitted for queries
    /// we know about but cannot price.
    pub fn register<T: Into<String>>(&mut self, tag: T, query: Query, source: Option<Arc<dyn DataSource>>) -> B256 {
        let tag = tag.into();
        let query_id = keccak256(query.query_data());
        if let Some(src) = source {
            self.feeds.insert(tag.clone(), src);
        }
        self.queries.insert(query_id, CatalogEntry { tag, query });
        query_id
    }

    /// Named feeds from `[[feeds]]` plus a generic builder per configured
    /// type, all priced through [`EnvPriceService`].
    pub fn from_config(cfg: &ListenerConfig) -> Self {
        let mut catalog = Self::new();
        for feed in &cfg.feeds {
            let query = Query::spot_price(feed.asset.clone(), feed.currency.clone());
            let query_id = catalog.register(feed.tag.clone(), query, Some(catalog_feed_source(feed)));
            tracing::debug!(tag = %feed.tag, %query_id, "registered catalog feed");
        }
        for type_name in &cfg.generic_source_types {
            if type_name == SPOT_PRICE {
                let algorithm = cfg.algorithm;
                let builder: Arc<dyn GenericSourceBuilder> = Arc::new(move |q: &Query| match q {
                    Query::SpotPrice { asset, currency } => {
                        Some(Arc::new(env_aggregator(asset, currency, algorithm, &[(currency.as_str(), None)]))
                            as Arc<dyn DataSource>)
                    }
                    _ => None,
                });
                catalog.register_generic(SPOT_PRICE, builder);
            }
        }
        catalog
    }

    pub fn register_generic<S: Into<String>>(&mut self, type_name: S, builder: Arc<dyn GenericSourceBuilder>) {
        self.generic.insert(type_name.into(), builder);
    }

    pub fn query_from_catalog(&self, query_id: &B256) -> Option<&CatalogEntry> {
        self.queries.get(query_id)
    }

    pub fn has_generic_source(&self, type_name: &str) -> bool {
        self.generic.contains_key(type_name)
    }

    /// Cataloged feed whose tag also has a source.
    pub fn feed_from_catalog(&self, query_data: &[u8]) -> Option<DataFeed> {
        let entry = self.queries.get(&keccak256(query_data))?;
        let source = self.feeds.get(&entry.tag)?;
        Some(DataFeed { query: entry.query.clone(), source: source.clone() })
    }

    /// Cheap support check: cataloged with a source, or a type name with a
    /// generic builder. Does not decode query args.
    pub fn supports(&self, query_data: &[u8]) -> bool {
        if self.feed_from_catalog(query_data).is_some() {
            return true;
        }
        match decode_type_name(query_data) {
            Ok(name) => self.has_generic_source(&name),
            Err(_) => false,
        }
    }

    /// Full resolution used when a price is actually needed.
    pub fn resolve(&self, query_data: &[u8]) -> Option<DataFeed> {
        let query_id = keccak256(query_data);
        if let Some(entry) = self.queries.get(&query_id) {
            let feed = self.feed_from_catalog(query_data);
            if feed.is_none() {
                tracing::info!("{} has no source needed for priceThreshold check", entry.tag);
            }
            return feed;
        }
        let query = match Query::from_query_data(query_data) {
            Ok(q) => q,
            Err(e) => {
                tracing::info!("Unable to decode query data 0x{}: {e}", hex::encode(query_data));
                return None;
            }
        };
        let source = self.generic.get(query.type_name()).and_then(|b| b.build(&query));
        if source.is_none() {
            tracing::info!("No API source found for {query_id} to check priceThreshold");
        }
        source.map(|source| DataFeed { query, source })
    }
}

fn catalog_feed_source(feed: &CatalogFeedConfig) -> Arc<dyn DataSource> {
    let legs: Vec<(&str, Option<f64>)> = if feed.sources.is_empty() {
        vec![(feed.currency.as_str(), None)]
    } else {
        feed.sources.iter().map(|s| (s.currency.as_str(), s.weight)).collect()
    };
    Arc::new(env_aggregator(&feed.asset, &feed.currency, feed.algorithm, &legs))
}

/// One `PriceSource` per quote currency, combined under `asset/currency`.
fn env_aggregator(asset: &str, currency: &str, algorithm: Algorithm, legs: &[(&str, Option<f64>)]) -> PriceAggregator {
    let sources: Vec<Arc<dyn DataSource>> = legs
        .iter()
        .map(|(quote, weight)| {
            let service: Arc<dyn PriceService> = Arc::new(EnvPriceService { weight: *weight });
            Arc::new(PriceSource::new(asset, *quote, service)) as Arc<dyn DataSource>
        })
        .collect();
    PriceAggregator::new(asset, currency, algorithm, sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceReading;
    use alloy::primitives::Bytes;
    use chrono::Utc;

    struct Nothing;

    #[async_trait::async_trait]
    impl DataSource for Nothing {
        async fn fetch_new_datapoint(&self) -> SourceReading {
            SourceReading::failed(Utc::now())
        }
    }

    fn spot_builder() -> Arc<dyn GenericSourceBuilder> {
        Arc::new(|q: &Query| match q {
            Query::SpotPrice { .. } => Some(Arc::new(Nothing) as Arc<dyn DataSource>),
            _ => None,
        })
    }

    #[test]
    fn cataloged_query_resolves_by_id() {
        let mut c = FeedCatalog::new();
        let q = Query::spot_price("eth", "usd");
        let id = c.register("eth-usd-spot", q.clone(), Some(Arc::new(Nothing)));
        assert_eq!(c.query_from_catalog(&id).unwrap().tag, "eth-usd-spot");
        assert!(c.supports(&q.query_data()));
        assert_eq!(c.resolve(&q.query_data()).unwrap().query, q);
    }

    #[test]
    fn cataloged_without_source_is_unsupported() {
        let mut c = FeedCatalog::new();
        c.register_generic("SpotPrice", spot_builder());
        let q = Query::spot_price("eth", "usd");
        c.register("eth-usd-spot", q.clone(), None);
        // a catalog hit without a source does not fall back to the generic builder
        assert!(c.resolve(&q.query_data()).is_none());
    }

    #[test]
    fn generic_type_supports_uncataloged_pairs() {
        let mut c = FeedCatalog::new();
        c.register_generic("SpotPrice", spot_builder());
        let qd = Query::spot_price("abc", "usd").query_data();
        assert!(c.supports(&qd));
        assert!(c.resolve(&qd).is_some());

        let other = Query::Other { type_name: "EVMCall".into(), args: Bytes::new() }.query_data();
        assert!(!c.supports(&other));
        assert!(c.resolve(&other).is_none());
    }

    #[tokio::test]
    async fn config_feeds_are_cataloged_and_weighted() {
        std::env::set_var("CATW_USDT_MOCK_PRICE", "1.0");
        std::env::set_var("CATW_DAI_MOCK_PRICE", "2.0");
        let cfg = ListenerConfig::from_toml_str(
            r#"
            generic_source_types = []
            [[feeds]]
            tag = "catw-usd-spot"
            asset = "catw"
            currency = "usd"
            algorithm = "weighted_average"
            sources = [{ currency = "usdt", weight = 3.0 }, { currency = "dai", weight = 1.0 }]
            "#,
        )
        .unwrap();
        let c = FeedCatalog::from_config(&cfg);
        let q = Query::spot_price("catw", "usd");

        let entry = c.query_from_catalog(&keccak256(q.query_data())).unwrap();
        assert_eq!(entry.tag, "catw-usd-spot");
        assert_eq!(entry.query, q);

        let feed = c.resolve(&q.query_data()).unwrap();
        assert_eq!(feed.source.fetch_new_datapoint().await.value, Some(1.25));

        // no generic builder configured
        assert!(!c.supports(&Query::spot_price("other", "usd").query_data()));
    }

    #[tokio::test]
    async fn config_generic_spot_price_uses_env() {
        std::env::set_var("CATG_USD_MOCK_PRICE", "7.5");
        let c = FeedCatalog::from_config(&ListenerConfig::default());
        let feed = c.resolve(&Query::spot_price("catg", "usd").query_data()).unwrap();
        assert_eq!(feed.source.fetch_new_datapoint().await.value, Some(7.5));
    }

    #[test]
    fn undecodable_query_data_is_unsupported() {
        let mut c = FeedCatalog::new();
        c.register_generic("SpotPrice", spot_builder());
        assert!(!c.supports(&[1, 2, 3]));
        assert!(c.resolve(&[1, 2, 3]).is_none());
    }
}
