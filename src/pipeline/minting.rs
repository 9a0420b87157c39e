//! Coin minting stage: mint parameter construction, symbol derivation,
//! and the contract call handed to the wallet's write capability.
//!
//! One invocation of [`CoinMinter::mint`] is one on-chain submission.
//! This layer gives no idempotency guarantee; the orchestrator prevents
//! double submission by state-gating the mint action.

use crate::config::VibeConfig;
use crate::pipeline::types::{MintParameters, TxResult};
use crate::types::{Address, ContractCall};
use crate::wallet::WalletSession;
use anyhow::{anyhow, Result};
use tracing::{info, instrument, warn};

/// Longest derived symbol.
const MAX_SYMBOL_LEN: usize = 5;
/// Symbol of last resort when nothing derivable remains.
const FALLBACK_SYMBOL: &str = "VIBE";

impl MintParameters {
    /// Assemble mint parameters from upload metadata plus the connected
    /// wallet. A new wallet address or upload means a new value, never
    /// an in-place edit.
    pub fn assemble(
        name: &str,
        selected_symbols: &[String],
        content_uri: &str,
        payout_recipient: &Address,
        platform_referrer: &Address,
    ) -> Self {
        Self {
            name: name.to_string(),
            symbol: derive_symbol(name, selected_symbols),
            uri: content_uri.to_string(),
            payout_recipient: payout_recipient.clone(),
            platform_referrer: platform_referrer.clone(),
        }
    }
}

/// Derive a ticker symbol from a coin name: the uppercase initialism of
/// its significant words, capped at [`MAX_SYMBOL_LEN`]. Single-word
/// names take a 3-letter prefix. Names that yield nothing fall back to
/// the selected coins' symbol initials, then [`FALLBACK_SYMBOL`].
pub fn derive_symbol(name: &str, selected_symbols: &[String]) -> String {
    let words: Vec<&str> = name
        .split_whitespace()
        .filter(|word| word.chars().any(char::is_alphanumeric))
        .collect();

    let derived: String = match words.len() {
        0 => String::new(),
        1 => words[0]
            .chars()
            .filter(|c| c.is_alphanumeric())
            .take(3)
            .collect(),
        _ => words
            .iter()
            .filter_map(|word| word.chars().find(|c| c.is_alphanumeric()))
            .take(MAX_SYMBOL_LEN)
            .collect(),
    };

    let derived = derived.to_uppercase();
    if !derived.is_empty() {
        return derived;
    }

    let from_selection: String = selected_symbols
        .iter()
        .filter_map(|symbol| symbol.chars().find(|c| c.is_alphanumeric()))
        .take(MAX_SYMBOL_LEN)
        .collect::<String>()
        .to_uppercase();

    if from_selection.is_empty() {
        FALLBACK_SYMBOL.to_string()
    } else {
        from_selection
    }
}

/// Builds and submits coin creation calls through a wallet session.
pub struct CoinMinter {
    factory_address: Address,
}

impl CoinMinter {
    pub fn new(config: &VibeConfig) -> Self {
        Self {
            factory_address: config.coin_factory_address.clone(),
        }
    }

    /// Build the creation call descriptor. Fails when any required
    /// parameter is missing; never touches the chain.
    pub fn build_create_coin_call(&self, params: &MintParameters) -> Result<ContractCall> {
        if params.name.is_empty() {
            return Err(anyhow!("Mint parameters missing a coin name"));
        }
        if params.symbol.is_empty() {
            return Err(anyhow!("Mint parameters missing a symbol"));
        }
        if params.uri.is_empty() {
            return Err(anyhow!("Mint parameters missing a content URI"));
        }
        if params.payout_recipient.is_empty() {
            return Err(anyhow!("Mint parameters missing a payout recipient"));
        }

        Ok(ContractCall {
            address: self.factory_address.clone(),
            function: "deploy".to_string(),
            args: vec![
                params.name.clone(),
                params.symbol.clone(),
                params.uri.clone(),
                params.payout_recipient.clone(),
                params.platform_referrer.clone(),
            ],
        })
    }

    /// Submit one coin creation transaction. Every invocation submits;
    /// callers gate re-entry.
    #[instrument(skip(self, session, params), fields(name = %params.name, symbol = %params.symbol))]
    pub async fn mint(&self, session: &WalletSession, params: &MintParameters) -> TxResult {
        let call = match self.build_create_coin_call(params) {
            Ok(call) => call,
            Err(e) => {
                return TxResult::Rejected {
                    reason: format!("{}", e),
                }
            }
        };

        match session.write_contract(&call).await {
            Ok(tx_hash) => {
                info!("Coin creation submitted: {}", tx_hash);
                TxResult::Submitted { tx_hash }
            }
            Err(e) => {
                // Provider message goes through unparaphrased.
                warn!("Coin creation rejected: {:#}", e);
                TxResult::Rejected {
                    reason: format!("{:#}", e),
                }
            }
        }
    }
}
