// src/aggregate/mod.rs
use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::SourceReading;

pub mod price;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AggregateError {
    #[error("weighted average needs a weight on every reading ({missing} of {total} missing)")]
    MissingWeights { missing: usize, total: usize },
    #[error("weights sum to zero")]
    ZeroWeight,
    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    Median,
    Mean,
    WeightedAverage,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Median => "median",
            Algorithm::Mean => "mean",
            Algorithm::WeightedAverage => "weighted_average",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = AggregateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "median" => Ok(Algorithm::Median),
            "mean" => Ok(Algorithm::Mean),
            "weighted_average" => Ok(Algorithm::WeightedAverage),
            other => Err(AggregateError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Middle value, or the average of the two middle values for an even count.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut v: Vec<OrderedFloat<f64>> = values.iter().copied().map(OrderedFloat).collect();
    v.sort_unstable();
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        Some((v[mid - 1].0 + v[mid].0) / 2.0)
    } else {
        Some(v[mid].0)
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// `Σ(v·w) / Σw`. Slices must have equal length.
pub fn weighted_average(values: &[f64], weights: &[f64]) -> Result<Option<f64>, AggregateError> {
    if values.is_empty() {
        return Ok(None);
    }
    let den: f64 = weights.iter().sum();
    if den == 0.0 {
        return Err(AggregateError::ZeroWeight);
    }
    let num: f64 = values.iter().zip(weights).map(|(v, w)| v * w).sum();
    Ok(Some(num / den))
}

/// Combine readings into one value stamped with the aggregation time.
///
/// Readings without a usable value are skipped. `Ok(None)` means no reading
/// survived; callers must not read that as a zero price.
pub fn aggregate(
    readings: &[SourceReading],
    algorithm: Algorithm,
) -> Result<Option<(f64, DateTime<Utc>)>, AggregateError> {
    let usable: Vec<(f64, Option<f64>)> = readings
        .iter()
        .filter_map(|r| r.usable().map(|v| (v, r.weight)))
        .collect();
    if usable.is_empty() {
        return Ok(None);
    }
    let values: Vec<f64> = usable.iter().map(|(v, _)| *v).collect();

    let result = match algorithm {
        Algorithm::Median => median(&values),
        Algorithm::Mean => mean(&values),
        Algorithm::WeightedAverage => {
            let weights: Vec<f64> = usable.iter().filter_map(|(_, w)| *w).collect();
            if weights.len() != values.len() {
                return Err(AggregateError::MissingWeights {
                    missing: values.len() - weights.len(),
                    total: values.len(),
                });
            }
            weighted_average(&values, &weights)?
        }
    };
    Ok(result.map(|v| (v, Utc::now())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(v: Option<f64>) -> SourceReading {
        SourceReading { value: v, timestamp: Utc::now(), weight: None }
    }

    fn w(v: f64, weight: f64) -> SourceReading {
        SourceReading::weighted(v, weight, Utc::now())
    }

    fn value(readings: &[SourceReading], algo: Algorithm) -> Option<f64> {
        aggregate(readings, algo).unwrap().map(|(v, _)| v)
    }

    #[test]
    fn mean_skips_failed_sources() {
        let rs = [r(Some(10.0)), r(None), r(Some(20.0))];
        assert_eq!(value(&rs, Algorithm::Mean), Some(15.0));
    }

    #[test]
    fn median_even_and_odd() {
        let even = [r(Some(4.0)), r(Some(1.0)), r(Some(3.0)), r(Some(2.0))];
        assert_eq!(value(&even, Algorithm::Median), Some(2.5));
        let odd = [r(Some(3.0)), r(Some(1.0)), r(Some(2.0))];
        assert_eq!(value(&odd, Algorithm::Median), Some(2.0));
    }

    #[test]
    fn all_failed_is_none_not_zero() {
        let rs = [r(None), r(None)];
        for algo in [Algorithm::Median, Algorithm::Mean, Algorithm::WeightedAverage] {
            assert_eq!(aggregate(&rs, algo), Ok(None));
        }
        assert_eq!(aggregate(&[], Algorithm::Median), Ok(None));
    }

    #[test]
    fn non_finite_values_are_unusable() {
        let rs = [r(Some(f64::NAN)), r(Some(5.0))];
        assert_eq!(value(&rs, Algorithm::Mean), Some(5.0));
    }

    #[test]
    fn weighted_average_uses_weights() {
        let rs = [w(10.0, 1.0), w(20.0, 3.0)];
        assert_eq!(value(&rs, Algorithm::WeightedAverage), Some(17.5));
    }

    #[test]
    fn weighted_average_ignores_failed_reading_weights() {
        let failed = SourceReading { value: None, timestamp: Utc::now(), weight: Some(100.0) };
        let rs = [w(10.0, 1.0), failed, w(20.0, 1.0)];
        assert_eq!(value(&rs, Algorithm::WeightedAverage), Some(15.0));
    }

    #[test]
    fn partial_weights_are_rejected() {
        let rs = [w(10.0, 1.0), r(Some(20.0))];
        assert_eq!(
            aggregate(&rs, Algorithm::WeightedAverage),
            Err(AggregateError::MissingWeights { missing: 1, total: 2 })
        );
    }

    #[test]
    fn zero_total_weight_is_rejected() {
        let rs = [w(10.0, 0.0), w(20.0, 0.0)];
        assert_eq!(aggregate(&rs, Algorithm::WeightedAverage), Err(AggregateError::ZeroWeight));
    }

    #[test]
    fn unweighted_algorithms_ignore_weights() {
        let rs = [w(10.0, 9.0), w(20.0, 1.0)];
        assert_eq!(value(&rs, Algorithm::Mean), Some(15.0));
    }

    #[test]
    fn output_is_stamped_at_aggregation_time() {
        let old = SourceReading::new(1.0, Utc::now() - chrono::Duration::hours(1));
        let before = Utc::now();
        let (_, ts) = aggregate(&[old], Algorithm::Median).unwrap().unwrap();
        assert!(ts >= before);
    }

    #[test]
    fn algorithm_names_parse() {
        assert_eq!("weighted_average".parse::<Algorithm>(), Ok(Algorithm::WeightedAverage));
        assert_eq!(" Median ".parse::<Algorithm>(), Ok(Algorithm::Median));
        assert!("mode".parse::<Algorithm>().is_err());
    }
}
