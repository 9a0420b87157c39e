//! Creation pipeline: image generation, metadata upload, minting, and
//! the dialog orchestrator that sequences them.
//!
//! The pieces are wired together through [`DialogBuilder`]; every seam
//! (generation backend, metadata store, wallet provider) is a trait so
//! alternates and test doubles slot in without touching the flow.

pub mod image_gen;
pub mod minting;
pub mod orchestrator;
pub mod types;
pub mod upload;

// Re-export the main public types
pub use image_gen::{GeminiBackend, GenerationBackend, ImagePipeline};
pub use minting::{derive_symbol, CoinMinter};
pub use orchestrator::CreationDialog;
pub use types::{
    DialogEvent, DialogEventKind, DialogEventReceiver, DialogEventSender, DialogState,
    FailedStage, GenerationRequest, GenerationResult, InlineImage, MintParameters, TxResult,
    UploadOutcome,
};
pub use upload::{BackendUploader, MetadataStore, DEFAULT_COIN_DESCRIPTION, DEFAULT_COIN_NAME};

use crate::config::VibeConfig;
use crate::wallet::WalletSession;
use anyhow::{anyhow, Result};
use reqwest::Client;
use std::sync::Arc;

/// Builder assembling a [`CreationDialog`] with sensible defaults.
///
/// By default the Gemini backend serves both generation strategies and
/// the HTTP uploader talks to the configured first-party backend; any
/// seam can be overridden before `build`.
pub struct DialogBuilder {
    config: VibeConfig,
    wallet: Option<Arc<WalletSession>>,
    primary_backend: Option<Arc<dyn GenerationBackend>>,
    fallback_backend: Option<Arc<dyn GenerationBackend>>,
    store: Option<Arc<dyn MetadataStore>>,
}

impl DialogBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: VibeConfig::default(),
            wallet: None,
            primary_backend: None,
            fallback_backend: None,
            store: None,
        }
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: VibeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the wallet session (required).
    pub fn with_wallet(mut self, wallet: Arc<WalletSession>) -> Self {
        self.wallet = Some(wallet);
        self
    }

    /// Override the primary generation backend.
    pub fn with_backend(mut self, backend: Arc<dyn GenerationBackend>) -> Self {
        self.primary_backend = Some(backend);
        self
    }

    /// Override the fallback generation backend.
    pub fn with_fallback_backend(mut self, backend: Arc<dyn GenerationBackend>) -> Self {
        self.fallback_backend = Some(backend);
        self
    }

    /// Override the metadata store.
    pub fn with_store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the dialog, wiring defaults for anything not overridden.
    pub fn build(self, events: DialogEventSender) -> Result<CreationDialog> {
        let wallet = self
            .wallet
            .ok_or_else(|| anyhow!("A wallet session is required"))?;

        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(
                self.config.http_timeout_secs,
            ))
            .build()?;

        let primary = self.primary_backend.unwrap_or_else(|| {
            Arc::new(GeminiBackend::new(http_client.clone(), &self.config))
                as Arc<dyn GenerationBackend>
        });
        let fallback = self.fallback_backend.unwrap_or_else(|| primary.clone());

        let pipeline = Arc::new(ImagePipeline::new(
            http_client.clone(),
            primary,
            fallback,
            &self.config,
        ));

        let store = self.store.unwrap_or_else(|| {
            Arc::new(BackendUploader::new(http_client, &self.config)) as Arc<dyn MetadataStore>
        });

        let minter = CoinMinter::new(&self.config);

        Ok(CreationDialog::new(
            wallet,
            pipeline,
            store,
            minter,
            &self.config,
            events,
        ))
    }
}

impl Default for DialogBuilder {
    fn default() -> Self {
        Self::new()
    }
}
