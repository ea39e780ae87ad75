// src/sources/env.rs
use super::PriceService;
use crate::types::SourceReading;
use chrono::Utc;

/// Offline price service: reads `<ASSET>_<CURRENCY>_MOCK_PRICE` from the
/// environment (e.g. `FETCH_USD_MOCK_PRICE=0.42`). Useful on testnets where
/// no market exists for the asset.
#[derive(Debug, Clone, Default)]
pub struct EnvPriceService {
    /// Optional weight attached to every reading.
    pub weight: Option<f64>,
}

impl EnvPriceService {
    pub fn var_name(asset: &str, currency: &str) -> String {
        format!("{}_{}_MOCK_PRICE", asset.to_uppercase(), currency.to_uppercase())
    }
}

#[async_trait::async_trait]
impl PriceService for EnvPriceService {
    async fn fetch(&self, asset: &str, currency: &str) -> SourceReading {
        let now = Utc::now();
        let key = Self::var_name(asset, currency);
        match std::env::var(&key).ok().map(|v| v.trim().parse::<f64>()) {
            Some(Ok(px)) if px.is_finite() => SourceReading { value: Some(px), timestamp: now, weight: self.weight },
            Some(_) => {
                tracing::error!("{key} is not a number");
                SourceReading::failed(now)
            }
            None => {
                tracing::error!("Price not found for {asset} in {currency} ({key} unset)");
                SourceReading::failed(now)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_price_from_env() {
        std::env::set_var("ENVTESTA_USD_MOCK_PRICE", "1.25");
        let r = EnvPriceService::default().fetch("envtesta", "usd").await;
        assert_eq!(r.value, Some(1.25));
        assert_eq!(r.weight, None);
    }

    #[tokio::test]
    async fn missing_or_bad_values_fail_the_fetch() {
        std::env::remove_var("ENVTESTB_USD_MOCK_PRICE");
        assert_eq!(EnvPriceService::default().fetch("envtestb", "usd").await.value, None);

        std::env::set_var("ENVTESTC_USD_MOCK_PRICE", "nope");
        assert_eq!(EnvPriceService::default().fetch("envtestc", "usd").await.value, None);
    }

    #[tokio::test]
    async fn attaches_configured_weight() {
        std::env::set_var("ENVTESTD_DAI_MOCK_PRICE", "3");
        let svc = EnvPriceService { weight: Some(0.5) };
        let r = svc.fetch("envtestd", "dai").await;
        assert_eq!((r.value, r.weight), (Some(3.0), Some(0.5)));
    }
}
