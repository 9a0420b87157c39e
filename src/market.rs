//! Market data gateway for the coin gallery.
//!
//! Fetches ranked coin lists from the external market API and
//! normalizes the heterogeneous response nodes into uniform
//! [`CoinRecord`]s. Fetch failures surface as `None`, never as errors:
//! callers must distinguish `None` (fetch failed) from an empty list
//! (zero results).

use crate::config::VibeConfig;
use crate::types::{CoinRecord, RankCriterion, PLACEHOLDER_IMAGE};
use anyhow::{anyhow, Context, Result};
use moka::future::Cache;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio_retry::{strategy::ExponentialBackoff, Retry};
use tracing::{debug, instrument, warn};

/// Gateway for ranked coin lists with a short-TTL cache.
pub struct MarketDataGateway {
    http_client: Client,
    api_url: String,
    timeout: Duration,
    retry_attempts: usize,
    ranked_cache: Cache<(RankCriterion, u32), Vec<CoinRecord>>,
}

impl MarketDataGateway {
    /// Create a new gateway.
    pub fn new(http_client: Client, config: &VibeConfig) -> Self {
        let ranked_cache = Cache::builder()
            .max_capacity(config.market_cache_capacity)
            .time_to_live(Duration::from_secs(config.market_cache_ttl_secs))
            .build();

        Self {
            http_client,
            api_url: config.market_api_url.clone(),
            timeout: Duration::from_secs(config.http_timeout_secs),
            retry_attempts: config.market_retry_attempts,
            ranked_cache,
        }
    }

    /// Fetch the top `count` coins for a ranking criterion.
    ///
    /// Returns `None` when the fetch failed for any reason and
    /// `Some(records)` (possibly empty) otherwise.
    #[instrument(skip(self))]
    pub async fn fetch_ranked(
        &self,
        criterion: RankCriterion,
        count: u32,
    ) -> Option<Vec<CoinRecord>> {
        if count == 0 {
            warn!("Rejecting ranked fetch with count = 0");
            return None;
        }

        if let Some(cached) = self.ranked_cache.get(&(criterion, count)).await {
            debug!("Serving ranked list from cache");
            return Some(cached);
        }

        match self.fetch_page_with_retries(criterion, count, None).await {
            Ok(records) => {
                self.ranked_cache
                    .insert((criterion, count), records.clone())
                    .await;
                Some(records)
            }
            Err(e) => {
                warn!("Failed to fetch ranked coins: {:#}", e);
                None
            }
        }
    }

    /// Fetch a ranked page starting after a pagination cursor.
    ///
    /// Cursor-bearing fetches bypass the cache.
    #[instrument(skip(self))]
    pub async fn fetch_ranked_after(
        &self,
        criterion: RankCriterion,
        count: u32,
        after: &str,
    ) -> Option<Vec<CoinRecord>> {
        if count == 0 {
            warn!("Rejecting ranked fetch with count = 0");
            return None;
        }

        match self
            .fetch_page_with_retries(criterion, count, Some(after))
            .await
        {
            Ok(records) => Some(records),
            Err(e) => {
                warn!("Failed to fetch ranked coins after cursor: {:#}", e);
                None
            }
        }
    }

    async fn fetch_page_with_retries(
        &self,
        criterion: RankCriterion,
        count: u32,
        after: Option<&str>,
    ) -> Result<Vec<CoinRecord>> {
        let retry_strategy = ExponentialBackoff::from_millis(100)
            .max_delay(Duration::from_secs(2))
            .take(self.retry_attempts);

        Retry::spawn(retry_strategy, || self.fetch_page(criterion, count, after)).await
    }

    async fn fetch_page(
        &self,
        criterion: RankCriterion,
        count: u32,
        after: Option<&str>,
    ) -> Result<Vec<CoinRecord>> {
        let list_type = match criterion {
            RankCriterion::Volume24h => "TOP_VOLUME_24H",
            RankCriterion::Gainers => "TOP_GAINERS",
        };

        let url = format!("{}/explore", self.api_url);
        let mut query: Vec<(&str, String)> = vec![
            ("listType", list_type.to_string()),
            ("count", count.to_string()),
        ];
        if let Some(cursor) = after {
            query.push(("after", cursor.to_string()));
        }

        let response = self
            .http_client
            .get(&url)
            .query(&query)
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to reach market API")?;

        if !response.status().is_success() {
            return Err(anyhow!("Market API returned {}", response.status()));
        }

        let payload: Value = response
            .json()
            .await
            .context("Failed to parse market API response")?;

        let edges = payload
            .pointer("/data/exploreList/edges")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("No edges found in market API response"))?;

        let records = edges
            .iter()
            .filter_map(|edge| edge.get("node"))
            .map(normalize_node)
            .collect::<Vec<_>>();

        debug!("Fetched {} ranked coins ({})", records.len(), list_type);
        Ok(records)
    }
}

/// Normalize one response node into a [`CoinRecord`].
fn normalize_node(node: &Value) -> CoinRecord {
    let id = node
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            let address = node.get("address").and_then(Value::as_str).unwrap_or("");
            let chain = node
                .pointer("/networkInfo/chainId")
                .map(json_display)
                .unwrap_or_default();
            format!("{}-{}", address, chain)
        });

    CoinRecord {
        id,
        name: node.get("name").and_then(Value::as_str).map(str::to_string),
        symbol: node
            .get("symbol")
            .and_then(Value::as_str)
            .map(str::to_string),
        image_url: Some(resolve_image(node)),
        volume_24h: parse_number(node.get("volume24h")),
        market_cap: parse_number(node.get("marketCap")),
        unique_holders: parse_number(node.get("uniqueHolders")),
        market_cap_delta_24h: parse_number(node.get("marketCapDelta24h")),
    }
}

/// Pick the first usable image URL out of the known node layouts.
///
/// Resolution order: nested preview media (`mediaContent.previewImage`,
/// object or plain string form), generic `image`, contract metadata
/// image, metadata image, then the placeholder constant.
fn resolve_image(node: &Value) -> String {
    let candidates = [
        node.pointer("/mediaContent/previewImage/medium"),
        node.pointer("/mediaContent/previewImage"),
        node.get("image"),
        node.pointer("/contractMetadata/image"),
        node.pointer("/metadata/image"),
    ];

    candidates
        .into_iter()
        .flatten()
        .find_map(|value| value.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string())
}

/// Parse a numeric field that may arrive as a number or a string.
/// Anything unparsable becomes `None`.
fn parse_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn json_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
