// src/config.rs
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::aggregate::Algorithm;
use crate::query::SPOT_PRICE;

/// Query types that have a generic, parametrised source.
pub const GENERIC_SOURCE_TYPES: &[&str] = &[SPOT_PRICE];

pub const ENV_ALGORITHM: &str = "FUNDED_FEEDS_ALGORITHM";
pub const ENV_FETCH_TIMEOUT_MS: &str = "FUNDED_FEEDS_FETCH_TIMEOUT_MS";

#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    #[serde(default)]                            pub algorithm: Algorithm,
    #[serde(default = "d_fetch_timeout_ms")]     pub fetch_timeout_ms: u64,
    /// Subset of [`GENERIC_SOURCE_TYPES`]; anything else is rejected on load.
    #[serde(default = "d_generic_types")]        pub generic_source_types: Vec<String>,
    #[serde(default = "d_log_filter")]           pub log_filter: String,
    #[serde(default)]                            pub feeds: Vec<CatalogFeedConfig>,
}

/// A named spot-price feed, e.g.
///
/// ```toml
/// [[feeds]]
/// tag = "pls-usd-spot"
/// asset = "pls"
/// currency = "usd"
/// algorithm = "weighted_average"
/// sources = [{ currency = "usdt", weight = 0.6 }, { currency = "dai", weight = 0.4 }]
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogFeedConfig {
    pub tag: String,
    pub asset: String,
    pub currency: String,
    #[serde(default)]                            pub algorithm: Algorithm,
    /// Empty means one source quoting `asset` in `currency`.
    #[serde(default)]                            pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceConfig {
    pub currency: String,
    #[serde(default)]                            pub weight: Option<f64>,
}
fn d_fetch_timeout_ms() -> u64 { 10_000 }
fn d_generic_types() -> Vec<String> { vec!["SpotPrice".into()] }
fn d_log_filter() -> String { "info".into() }
#[inline]
pub fn ms(d: u64) -> Duration { Duration::from_millis(d) }

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            fetch_timeout_ms: d_fetch_timeout_ms(),
            generic_source_types: d_generic_types(),
            log_filter: d_log_filter(),
            feeds: Vec::new(),
        }
    }
}

impl ListenerConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let cfg: Self = toml::from_str(s).context("parse listener config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for t in &self.generic_source_types {
            if !GENERIC_SOURCE_TYPES.contains(&t.as_str()) {
                anyhow::bail!("no generic source for query type {t} (supported: {GENERIC_SOURCE_TYPES:?})");
            }
        }
        let mut tags = std::collections::HashSet::new();
        for f in &self.feeds {
            if !tags.insert(f.tag.as_str()) {
                anyhow::bail!("duplicate catalog feed tag {}", f.tag);
            }
            if f.algorithm == Algorithm::WeightedAverage
                && (f.sources.is_empty() || f.sources.iter().any(|s| s.weight.is_none()))
            {
                anyhow::bail!("feed {}: weighted_average needs a weight on every source", f.tag);
            }
        }
        Ok(())
    }

    /// Read `path` (defaults when None), load `.env` if present, then apply env overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        cfg.apply_env(|k| std::env::var(k).ok())?;
        Ok(cfg)
    }

    pub fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, get: F) -> anyhow::Result<()> {
        if let Some(a) = get(ENV_ALGORITHM) {
            self.algorithm = a.parse().with_context(|| format!("{ENV_ALGORITHM}={a}"))?;
        }
        if let Some(t) = get(ENV_FETCH_TIMEOUT_MS) {
            self.fetch_timeout_ms = t.trim().parse().with_context(|| format!("{ENV_FETCH_TIMEOUT_MS}={t}"))?;
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        ms(self.fetch_timeout_ms)
    }
}
