//! Caching wrapper around a live price feed.

use super::{AssetPair, PriceFeed, PriceOracle, PriceQuote, PriceSource, PricingError};
use crate::cache::CacheProvider;
use crate::constants::cache_keys;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Cached price payload. The price travels as a string to keep the exact
/// decimal representation.
#[derive(Debug, Serialize, Deserialize)]
struct CachedPrice {
    price: String,
    fetched_at: DateTime<Utc>,
}

pub struct CachedPriceOracle {
    feed: Arc<dyn PriceFeed>,
    cache: Arc<CacheProvider>,
    cache_ttl: Duration,
}

impl CachedPriceOracle {
    pub fn new(feed: Arc<dyn PriceFeed>, cache: Arc<CacheProvider>, cache_ttl: Duration) -> Self {
        Self {
            feed,
            cache,
            cache_ttl,
        }
    }

    async fn store_quote(&self, pair: &AssetPair, price: &BigDecimal, fetched_at: DateTime<Utc>) {
        let payload = CachedPrice {
            price: price.to_string(),
            fetched_at,
        };
        let serialized = match serde_json::to_string(&payload) {
            Ok(s) => s,
            Err(e) => {
                warn!(pair = %pair, error = %e, "failed to serialize price for cache");
                return;
            }
        };
        if let Err(e) = self
            .cache
            .set(&cache_keys::price(&pair.to_string()), &serialized, self.cache_ttl)
            .await
        {
            warn!(pair = %pair, error = %e, "failed to cache price");
        }
    }

    async fn cached_quote(&self, pair: &AssetPair) -> Option<PriceQuote> {
        let raw = self
            .cache
            .get(&cache_keys::price(&pair.to_string()))
            .await
            .ok()??;
        let payload: CachedPrice = serde_json::from_str(&raw).ok()?;
        let price = BigDecimal::from_str(&payload.price).ok()?;
        Some(PriceQuote {
            price,
            fetched_at: payload.fetched_at,
            source: PriceSource::Cache,
        })
    }
}

#[async_trait]
impl PriceOracle for CachedPriceOracle {
    async fn current_price(&self, pair: &AssetPair) -> Result<PriceQuote, PricingError> {
        match self.feed.fetch_price(pair).await {
            Ok(price) => {
                let fetched_at = Utc::now();
                self.store_quote(pair, &price, fetched_at).await;
                Ok(PriceQuote {
                    price,
                    fetched_at,
                    source: PriceSource::Live,
                })
            }
            Err(feed_error) => {
                warn!(
                    pair = %pair,
                    feed = self.feed.feed_name(),
                    error = %feed_error,
                    "live price fetch failed; trying cache fallback"
                );
                match self.cached_quote(pair).await {
                    Some(quote) => {
                        debug!(
                            pair = %pair,
                            fetched_at = %quote.fetched_at,
                            "served cached price fallback"
                        );
                        Ok(quote)
                    }
                    None => Err(PricingError::Unavailable {
                        pair: pair.to_string(),
                    }),
                }
            }
        }
    }
}
