//! Wallet session over an injected provider.
//!
//! The provider (browser extension, remote signer, simulation) sits
//! behind the [`WalletProvider`] trait; [`WalletSession`] adds
//! connection state, the chain allow-list check, and the signing and
//! contract-write capabilities the rest of the crate consumes.

use crate::config::VibeConfig;
use crate::types::{Address, ContractCall};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument};

/// Operations an injected wallet provider must offer.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Accounts the user granted access to; first entry is active.
    async fn request_accounts(&self) -> Result<Vec<Address>>;
    /// Chain the provider is currently on.
    async fn chain_id(&self) -> Result<u64>;
    /// Native balance of an address, in wei.
    async fn balance_of(&self, address: &Address) -> Result<u128>;
    /// Sign a human-readable message with an account's key.
    async fn sign_message(&self, address: &Address, message: &str) -> Result<String>;
    /// Submit a contract write; returns the transaction hash.
    async fn send_transaction(&self, from: &Address, call: &ContractCall) -> Result<String>;
}

/// Connect/disconnect/sign/balance wrapper around a provider.
pub struct WalletSession {
    provider: Arc<dyn WalletProvider>,
    connected: Mutex<Option<Address>>,
}

impl WalletSession {
    pub fn new(provider: Arc<dyn WalletProvider>) -> Self {
        Self {
            provider,
            connected: Mutex::new(None),
        }
    }

    /// Connect to the provider. Fails when the provider grants no
    /// accounts or sits on a chain outside the allow-list.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<Address> {
        let chain_id = self.provider.chain_id().await?;
        if !VibeConfig::is_supported_chain(chain_id) {
            return Err(anyhow!("Unsupported chain id {}", chain_id));
        }

        let accounts = self
            .provider
            .request_accounts()
            .await
            .context("Provider refused account access")?;
        let address = accounts
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Provider returned no accounts"))?;

        let mut connected = self.connected.lock().await;
        *connected = Some(address.clone());
        info!("Wallet connected: {}", format_address(&address));
        Ok(address)
    }

    pub async fn disconnect(&self) {
        let mut connected = self.connected.lock().await;
        *connected = None;
    }

    /// Active address, when connected.
    pub async fn address(&self) -> Option<Address> {
        self.connected.lock().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.connected.lock().await.is_some()
    }

    /// Sign a message with the connected account.
    pub async fn sign_message(&self, message: &str) -> Result<String> {
        let address = self.require_address().await?;
        self.provider.sign_message(&address, message).await
    }

    /// Native balance of the connected account, in wei.
    pub async fn balance(&self) -> Result<u128> {
        let address = self.require_address().await?;
        self.provider.balance_of(&address).await
    }

    /// Submit a contract write through the connected account.
    #[instrument(skip(self, call), fields(function = %call.function))]
    pub async fn write_contract(&self, call: &ContractCall) -> Result<String> {
        let address = self.require_address().await?;
        self.provider.send_transaction(&address, call).await
    }

    /// Build, sign, and package a canonical message envelope for a
    /// backend-bound payload.
    pub async fn sign_envelope(&self, action: &str, payload: Value) -> Result<SignedEnvelope> {
        let address = self.require_address().await?;
        let timestamp = Utc::now().timestamp_millis();
        let message = serde_json::to_string(&serde_json::json!({
            "app": "vibe-mint",
            "action": action,
            "timestamp": timestamp,
            "data": payload,
        }))?;

        let signature = self.provider.sign_message(&address, &message).await?;
        Ok(SignedEnvelope {
            address,
            message,
            signature,
            timestamp,
        })
    }

    async fn require_address(&self) -> Result<Address> {
        self.connected
            .lock()
            .await
            .clone()
            .ok_or_else(|| anyhow!("Wallet not connected"))
    }
}

/// A signed message envelope ready for submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub address: Address,
    pub message: String,
    pub signature: String,
    pub timestamp: i64,
}

/// Truncate an address for display: `0x1234…abcd`.
pub fn format_address(address: &str) -> String {
    if address.len() <= 10 {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

/// Format a wei amount as a decimal ether string with bounded precision.
pub fn format_eth(wei: u128, precision: usize) -> String {
    const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;
    let whole = wei / WEI_PER_ETH;
    let fraction = wei % WEI_PER_ETH;
    if fraction == 0 || precision == 0 {
        return whole.to_string();
    }

    let digits = format!("{:018}", fraction);
    let truncated = digits[..precision.min(18)].trim_end_matches('0');
    if truncated.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, truncated)
    }
}
