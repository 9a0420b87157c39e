//! vibe-mint - coin-remix creation engine
//!
//! This crate sequences the creation flow behind the Vibe gallery UI:
//! pick up to two coins from the live market, generate a meme image
//! from their reference images and a prompt, pin it through the
//! backend, and mint the result as a new on-chain coin.

pub mod config;
pub mod identity;
pub mod market;
pub mod pipeline;
pub mod types;
pub mod wallet;

// Re-export main types for convenience
pub use config::VibeConfig;
pub use identity::{AccountRecord, IdentityResolver, MarketProfile};
pub use market::MarketDataGateway;
pub use pipeline::{
    CreationDialog, DialogBuilder, DialogEvent, DialogEventKind, DialogState, GenerationResult,
    MintParameters, TxResult, UploadOutcome,
};
pub use types::{Address, CoinRecord, RankCriterion, SelectionSet};
pub use wallet::{WalletProvider, WalletSession};
