//! # Price Oracle
//!
//! Reference-price retrieval with cached fallback. The live feed is a
//! collaborator behind [`PriceFeed`]; [`CachedPriceOracle`] implements the
//! contract the execution engine depends on: serve a live price when the
//! feed answers, fall back to the most recent cached price when it does
//! not, and fail with [`PricingError::Unavailable`] only when both paths
//! are exhausted.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod cached_oracle;

pub use cached_oracle::CachedPriceOracle;

#[derive(Debug, Error)]
pub enum PricingError {
    #[error("Price feed error: {0}")]
    FeedError(String),
    #[error("Price unavailable for {pair}: live fetch and cache fallback both failed")]
    Unavailable { pair: String },
}

/// Deposit/target asset pair priced by the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetPair {
    pub deposit: String,
    pub target: String,
}

impl AssetPair {
    pub fn new(deposit: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            deposit: deposit.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for AssetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.target, self.deposit)
    }
}

/// Where a quote came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Live,
    Cache,
}

/// One reference price: units of deposit asset per unit of target asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: BigDecimal,
    pub fetched_at: DateTime<Utc>,
    pub source: PriceSource,
}

/// Live market-data source.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn fetch_price(&self, pair: &AssetPair) -> Result<BigDecimal, PricingError>;

    fn feed_name(&self) -> &'static str;
}

/// Oracle contract consumed by the execution engine.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn current_price(&self, pair: &AssetPair) -> Result<PriceQuote, PricingError>;
}
