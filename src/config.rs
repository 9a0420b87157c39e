//! Crate-wide configuration with environment-variable overrides.
//!
//! Every knob has a documented fallback default so the crate works out
//! of the box against the hosted backends (or the simulated ones in the
//! demo binary).

use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::env;

/// Chains the wallet session accepts: the production chain and a test chain.
pub const SUPPORTED_CHAIN_IDS: [u64; 2] = [1, 11_155_111];

/// Configuration for gateways, the generation pipeline, and minting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VibeConfig {
    /// First-party backend base URL (account lookup, content pinning)
    pub backend_api_url: String,
    /// Market data API base URL (ranked coin lists)
    pub market_api_url: String,
    /// Identity API base URL (profile lookup)
    pub identity_api_url: String,
    /// Generation backend API key; empty means generation fails fast
    pub gemini_api_key: String,
    /// Generation backend base URL
    pub gemini_api_base: String,
    /// Generation model identifier
    pub gemini_model: String,
    /// Relay prefix for reference images blocked by cross-origin rules
    pub image_proxy_url: String,
    /// Wallet-connection project identifier
    pub walletconnect_project_id: String,
    /// Referrer address attached to every mint
    pub platform_referrer: Address,
    /// Coin factory contract address (must be set per deployment)
    pub coin_factory_address: Address,
    /// Per-request HTTP timeout, seconds
    pub http_timeout_secs: u64,
    /// Transport retry attempts for market fetches
    pub market_retry_attempts: usize,
    /// TTL for cached ranked coin lists, seconds
    pub market_cache_ttl_secs: u64,
    /// Maximum cached ranked lists
    pub market_cache_capacity: u64,
    /// Generation backend quota, requests per minute
    pub generation_requests_per_minute: u32,
    /// How long the success state stays visible before completion fires, ms
    pub completion_display_delay_ms: u64,
}

impl Default for VibeConfig {
    fn default() -> Self {
        Self {
            backend_api_url: "https://api.vibe.example".to_string(),
            market_api_url: "https://api-sdk.vibe.example".to_string(),
            identity_api_url: "https://api-sdk.vibe.example".to_string(),
            gemini_api_key: String::new(),
            gemini_api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            gemini_model: "gemini-2.0-flash-exp-image-generation".to_string(),
            image_proxy_url: "https://corsproxy.io/?".to_string(),
            walletconnect_project_id: "YOUR_PROJECT_ID".to_string(),
            platform_referrer: "0x0000000000000000000000000000000000000000".to_string(),
            coin_factory_address: "0x0000000000000000000000000000000000000000".to_string(),
            http_timeout_secs: 10,
            market_retry_attempts: 3,
            market_cache_ttl_secs: 60,
            market_cache_capacity: 64,
            generation_requests_per_minute: 6,
            completion_display_delay_ms: 2000,
        }
    }
}

impl VibeConfig {
    /// Build a configuration from the environment, falling back to the
    /// defaults for anything unset or blank.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend_api_url: env_or("VIBE_BACKEND_API_URL", &defaults.backend_api_url),
            market_api_url: env_or("VIBE_MARKET_API_URL", &defaults.market_api_url),
            identity_api_url: env_or("VIBE_IDENTITY_API_URL", &defaults.identity_api_url),
            gemini_api_key: env_or("GEMINI_API_KEY", &defaults.gemini_api_key),
            gemini_api_base: env_or("GEMINI_API_BASE", &defaults.gemini_api_base),
            gemini_model: env_or("VIBE_GEMINI_MODEL", &defaults.gemini_model),
            image_proxy_url: env_or("VIBE_IMAGE_PROXY_URL", &defaults.image_proxy_url),
            walletconnect_project_id: env_or(
                "VIBE_WALLET_CONNECT_PROJECT_ID",
                &defaults.walletconnect_project_id,
            ),
            platform_referrer: env_or("VIBE_PLATFORM_REFERRER", &defaults.platform_referrer),
            coin_factory_address: env_or("VIBE_COIN_FACTORY", &defaults.coin_factory_address),
            ..defaults
        }
    }

    /// Whether a chain id is on the wallet allow-list.
    pub fn is_supported_chain(chain_id: u64) -> bool {
        SUPPORTED_CHAIN_IDS.contains(&chain_id)
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VibeConfig::default();

        assert_eq!(config.gemini_model, "gemini-2.0-flash-exp-image-generation");
        assert_eq!(config.image_proxy_url, "https://corsproxy.io/?");
        assert_eq!(config.market_retry_attempts, 3);
        assert_eq!(config.generation_requests_per_minute, 6);
        assert!(config.gemini_api_key.is_empty());
    }

    #[test]
    fn test_supported_chains() {
        assert!(VibeConfig::is_supported_chain(1));
        assert!(VibeConfig::is_supported_chain(11_155_111));
        assert!(!VibeConfig::is_supported_chain(1337));
    }
}
