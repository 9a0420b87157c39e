//! Identity resolution for connected wallets.
//!
//! Two independent sub-resolvers share one policy: lookups are
//! enrichment data, so every failure degrades to a well-defined empty
//! sentinel instead of an error. A wallet without a profile or account
//! is a normal situation for the rest of the system.

use crate::config::VibeConfig;
use crate::types::Address;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Profile resolved from the identity API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketProfile {
    /// Handle, `@`-prefixed when present
    pub handle: Option<String>,
    /// Avatar image URL
    pub avatar: Option<String>,
    /// The wallet address the profile was resolved for
    pub address: Address,
    /// True only when an avatar image was resolved
    pub exists: bool,
}

impl MarketProfile {
    /// The not-found sentinel for an address.
    pub fn empty(address: &Address) -> Self {
        Self {
            handle: None,
            avatar: None,
            address: address.clone(),
            exists: false,
        }
    }
}

/// Account record from the first-party backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "walletAddress")]
    pub wallet_address: Address,
    #[serde(rename = "isAutoMintEnabled", default)]
    pub auto_mint_enabled: bool,
    #[serde(rename = "isSentimentAnalysisEnabled", default)]
    pub sentiment_analysis_enabled: bool,
    #[serde(rename = "basePrompt", default)]
    pub base_prompt: String,
    #[serde(rename = "createdAt", default)]
    pub created_at: String,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: String,
}

impl AccountRecord {
    /// Default account used when the backend has no record (or is down).
    pub fn empty(address: &Address) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: String::new(),
            wallet_address: address.clone(),
            auto_mint_enabled: false,
            sentiment_analysis_enabled: false,
            base_prompt: String::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Resolver for profiles and backend accounts.
pub struct IdentityResolver {
    http_client: Client,
    identity_api_url: String,
    backend_api_url: String,
    timeout: Duration,
}

impl IdentityResolver {
    pub fn new(http_client: Client, config: &VibeConfig) -> Self {
        Self {
            http_client,
            identity_api_url: config.identity_api_url.clone(),
            backend_api_url: config.backend_api_url.clone(),
            timeout: Duration::from_secs(config.http_timeout_secs),
        }
    }

    /// Resolve the market profile for an address. Never fails; internal
    /// errors degrade to the empty sentinel.
    #[instrument(skip(self), fields(address = %address))]
    pub async fn resolve_market_profile(&self, address: &Address) -> MarketProfile {
        match self.fetch_market_profile(address).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Profile lookup degraded to sentinel: {:#}", e);
                MarketProfile::empty(address)
            }
        }
    }

    /// Resolve the backend account for an address. A 404 (no account
    /// yet) is not an error; the empty sentinel stands in.
    #[instrument(skip(self), fields(address = %address))]
    pub async fn resolve_account(&self, address: &Address) -> AccountRecord {
        match self.fetch_account(address).await {
            Ok(account) => account,
            Err(e) => {
                warn!("Account lookup degraded to sentinel: {:#}", e);
                AccountRecord::empty(address)
            }
        }
    }

    async fn fetch_market_profile(&self, address: &Address) -> Result<MarketProfile> {
        let url = format!("{}/profile", self.identity_api_url);

        let response = self
            .http_client
            .get(&url)
            .query(&[("identifier", address.as_str())])
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to reach identity API")?;

        if !response.status().is_success() {
            return Err(anyhow!("Identity API returned {}", response.status()));
        }

        let payload: Value = response
            .json()
            .await
            .context("Failed to parse identity API response")?;

        let Some(profile) = payload.get("profile").filter(|p| !p.is_null()) else {
            debug!("No profile data for {}", address);
            return Ok(MarketProfile::empty(address));
        };

        Ok(normalize_profile(profile, address))
    }

    async fn fetch_account(&self, address: &Address) -> Result<AccountRecord> {
        let url = format!("{}/api/users/by-wallet", self.backend_api_url);

        let response = self
            .http_client
            .get(&url)
            .query(&[("walletAddress", address.as_str())])
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to reach backend")?;

        if !response.status().is_success() {
            return Err(anyhow!("Backend returned {}", response.status()));
        }

        response
            .json::<AccountRecord>()
            .await
            .context("Failed to parse account record")
    }
}

/// Build a profile from the raw payload. `exists` follows the avatar:
/// a profile without a resolvable avatar image counts as not found.
fn normalize_profile(profile: &Value, address: &Address) -> MarketProfile {
    let avatar = [
        profile.pointer("/avatar/small"),
        profile.pointer("/avatar/preview"),
        profile.pointer("/avatar/large"),
        profile.pointer("/avatar/profile"),
        profile.pointer("/avatar/image"),
    ]
    .into_iter()
    .flatten()
    .find_map(Value::as_str)
    .map(str::to_string);

    let handle = profile
        .get("handle")
        .and_then(Value::as_str)
        .map(|h| format!("@{}", h));

    MarketProfile {
        handle,
        exists: avatar.is_some(),
        avatar,
        address: address.clone(),
    }
}
