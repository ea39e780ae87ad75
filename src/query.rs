// src/query.rs
use alloy::primitives::Bytes;
use alloy::sol_types::SolValue;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SPOT_PRICE: &str = "SpotPrice";

#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    #[error("abi decode: {0}")]
    Abi(#[from] alloy::sol_types::Error),
}

/// Decoded query payload. `query_data` is `abi.encode(string queryType, bytes queryArgs)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Query {
    SpotPrice { asset: String, currency: String },
    Other { type_name: String, args: Bytes },
}

impl Query {
    pub fn spot_price(asset: impl Into<String>, currency: impl Into<String>) -> Self {
        Query::SpotPrice { asset: asset.into(), currency: currency.into() }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Query::SpotPrice { .. } => SPOT_PRICE,
            Query::Other { type_name, .. } => type_name,
        }
    }

    pub fn query_data(&self) -> Bytes {
        let args: Bytes = match self {
            Query::SpotPrice { asset, currency } => {
                (asset.clone(), currency.clone()).abi_encode_params().into()
            }
            Query::Other { args, .. } => args.clone(),
        };
        (self.type_name().to_string(), args).abi_encode_params().into()
    }

    pub fn from_query_data(query_data: &[u8]) -> Result<Self, QueryError> {
        let (type_name, args) = split(query_data)?;
        if type_name == SPOT_PRICE {
            let (asset, currency) = <(String, String)>::abi_decode_params(&args, true)?;
            return Ok(Query::SpotPrice { asset, currency });
        }
        Ok(Query::Other { type_name, args })
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::SpotPrice { asset, currency } => {
                write!(f, "{}/{}", asset.to_uppercase(), currency.to_uppercase())
            }
            Query::Other { type_name, args } => write!(f, "{}({} bytes)", type_name, args.len()),
        }
    }
}

/// Query type name without decoding the args.
pub fn decode_type_name(query_data: &[u8]) -> Result<String, QueryError> {
    split(query_data).map(|(name, _)| name)
}

fn split(query_data: &[u8]) -> Result<(String, Bytes), QueryError> {
    Ok(<(String, Bytes)>::abi_decode_params(query_data, true)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spot_price_survives_encoding() {
        let q = Query::spot_price("eth", "usd");
        let qd = q.query_data();
        assert_eq!(decode_type_name(&qd).unwrap(), "SpotPrice");
        assert_eq!(Query::from_query_data(&qd).unwrap(), q);
        assert_eq!(q.to_string(), "ETH/USD");
    }

    #[test]
    fn unknown_types_keep_raw_args() {
        let q = Query::Other { type_name: "EVMCall".into(), args: Bytes::from_static(&[1, 2, 3]) };
        let decoded = Query::from_query_data(&q.query_data()).unwrap();
        assert_eq!(decoded.type_name(), "EVMCall");
        assert_eq!(decoded, q);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decode_type_name(&[0xde, 0xad]).is_err());
    }
}
