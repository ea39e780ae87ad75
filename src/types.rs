// src/types.rs
use alloy::primitives::{keccak256, Bytes, B256, U256};
use alloy::sol_types::SolValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// On-chain values are uint256 scaled by 1e18.
pub const VALUE_SCALE: f64 = 1e18;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceReading {
    pub value: Option<f64>, // None = failed fetch
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl SourceReading {
    pub fn new(value: f64, timestamp: DateTime<Utc>) -> Self {
        Self { value: Some(value), timestamp, weight: None }
    }

    pub fn weighted(value: f64, weight: f64, timestamp: DateTime<Utc>) -> Self {
        Self { value: Some(value), timestamp, weight: Some(weight) }
    }

    pub fn failed(timestamp: DateTime<Utc>) -> Self {
        Self { value: None, timestamp, weight: None }
    }

    /// Value if present and finite.
    pub fn usable(&self) -> Option<f64> {
        self.value.filter(|v| v.is_finite())
    }
}

/// Funding contract state for one feed. Field names follow the contract struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundedFeedParams {
    pub reward: U256,
    pub balance: U256,
    pub start_time: u64,
    pub interval: u64,
    pub window: u64,
    pub price_threshold: U256, // percent * 100
    pub reward_increase_per_second: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampValue {
    pub timestamp: u64,
    pub value: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundedFeedDetails {
    pub feed_id: B256,
    pub query_id: B256,
    pub query_data: Bytes,
    pub params: FundedFeedParams,
    /// Last submission time for the query id; None when nothing was ever reported.
    pub current_value_timestamp: Option<u64>,
    pub current_queryid_value: Bytes,
    /// Chronological, most recent last.
    pub queryid_timestamps_values_list: Vec<TimestampValue>,
}

impl FundedFeedDetails {
    pub fn new(
        query_data: Bytes,
        params: FundedFeedParams,
        current_value_timestamp: Option<u64>,
        current_queryid_value: Bytes,
        queryid_timestamps_values_list: Vec<TimestampValue>,
    ) -> Self {
        let (feed_id, query_id) = generate_ids(&query_data, &params);
        Self {
            feed_id,
            query_id,
            query_data,
            params,
            current_value_timestamp,
            current_queryid_value,
            queryid_timestamps_values_list,
        }
    }
}

/// Returns `(feed_id, query_id)`:
/// - query_id = keccak(query_data)
/// - feed_id  = keccak(abi.encode(queryId, reward, startTime, interval, window, priceThreshold, rewardIncreasePerSecond))
pub fn generate_ids(query_data: &[u8], params: &FundedFeedParams) -> (B256, B256) {
    let query_id = keccak256(query_data);
    let feed_data = (
        query_id,
        params.reward,
        U256::from(params.start_time),
        U256::from(params.interval),
        U256::from(params.window),
        params.price_threshold,
        params.reward_increase_per_second,
    )
        .abi_encode();
    (keccak256(feed_data), query_id)
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("value has {0} bytes, expected 1..=32")]
    Length(usize),
    #[error("value does not fit a finite float")]
    NotFinite,
}

/// Decode a stored 18-decimal uint256 into a float.
pub fn decode_value(raw: &[u8]) -> Result<f64, DecodeError> {
    if raw.is_empty() || raw.len() > 32 {
        return Err(DecodeError::Length(raw.len()));
    }
    let v = f64::from(U256::from_be_slice(raw)) / VALUE_SCALE;
    if !v.is_finite() {
        return Err(DecodeError::NotFinite);
    }
    Ok(v)
}

/// Same as [`decode_value`] but truncated to whole units, the way historical
/// submissions are compared.
pub fn decode_whole_units(raw: &[u8]) -> Result<f64, DecodeError> {
    decode_value(raw).map(f64::trunc)
}

/// Encode a float as an 18-decimal uint256 (big-endian, 32 bytes).
pub fn encode_value(v: f64) -> Bytes {
    let scaled = (v * VALUE_SCALE).round().max(0.0);
    let mut word = [0u8; 32];
    // saturates above u128::MAX
    word[16..].copy_from_slice(&(scaled as u128).to_be_bytes());
    Bytes::copy_from_slice(&word)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> FundedFeedParams {
        FundedFeedParams {
            reward: U256::from(1_000u64),
            balance: U256::from(10_000u64),
            start_time: 1_700_000_000,
            interval: 3600,
            window: 600,
            price_threshold: U256::from(500u64),
            reward_increase_per_second: U256::from(1u64),
        }
    }

    #[test]
    fn query_id_is_keccak_of_query_data() {
        let qd = b"query data";
        let (_, query_id) = generate_ids(qd, &params());
        assert_eq!(query_id, keccak256(qd));
    }

    #[test]
    fn feed_id_covers_every_param() {
        let qd = b"query data";
        let base = generate_ids(qd, &params()).0;

        let mut p = params();
        p.window = 601;
        assert_ne!(base, generate_ids(qd, &p).0);

        // balance is not part of the id
        let mut p = params();
        p.balance = U256::from(1u64);
        assert_eq!(base, generate_ids(qd, &p).0);
    }

    #[test]
    fn feed_id_matches_fixed_width_concatenation() {
        let qd = b"abc";
        let p = params();
        let query_id = keccak256(qd);
        let mut buf = Vec::with_capacity(7 * 32);
        buf.extend_from_slice(query_id.as_slice());
        for word in [
            p.reward,
            U256::from(p.start_time),
            U256::from(p.interval),
            U256::from(p.window),
            p.price_threshold,
            p.reward_increase_per_second,
        ] {
            buf.extend_from_slice(&word.to_be_bytes::<32>());
        }
        assert_eq!(generate_ids(qd, &p).0, keccak256(&buf));
    }

    #[test]
    fn decodes_eighteen_decimal_values() {
        let raw = encode_value(2.5);
        assert_eq!(raw.len(), 32);
        assert_eq!(decode_value(&raw).unwrap(), 2.5);
        assert_eq!(decode_whole_units(&raw).unwrap(), 2.0);

        let big = decode_value(&encode_value(1234.56)).unwrap();
        assert!((big - 1234.56).abs() < 1e-9);
    }

    #[test]
    fn decodes_values_above_u128() {
        let mut raw = [0u8; 32];
        raw[0] = 1; // 2^248
        let v = decode_value(&raw).unwrap();
        assert!((v / (2f64.powi(248) / VALUE_SCALE) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_empty_and_oversized_values() {
        assert_eq!(decode_value(&[]), Err(DecodeError::Length(0)));
        assert_eq!(decode_value(&[0u8; 33]), Err(DecodeError::Length(33)));
    }

    #[test]
    fn params_use_contract_field_names() {
        let json = serde_json::to_value(params()).unwrap();
        assert!(json.get("startTime").is_some());
        assert!(json.get("rewardIncreasePerSecond").is_some());
    }
}
