//! Demo entry point for the vibe-mint creation pipeline.
//!
//! Runs the full select → generate → upload → mint flow against
//! simulated backends so the state machine and event stream can be
//! watched without any API keys or live services.

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, Level};
use vibe_mint::pipeline::{
    DialogBuilder, DialogEvent, GenerationBackend, InlineImage, MetadataStore, UploadOutcome,
};
use vibe_mint::types::{Address, CoinRecord, ContractCall};
use vibe_mint::wallet::{format_address, WalletProvider, WalletSession};
use vibe_mint::{SelectionSet, VibeConfig};

/// 1x1 transparent PNG, the stand-in for generated artwork.
const DEMO_IMAGE_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

/// Wallet provider simulation: one funded account on the test chain.
struct SimulatedProvider {
    address: Address,
}

impl SimulatedProvider {
    fn new() -> Self {
        let suffix: u64 = rand::thread_rng().gen();
        Self {
            address: format!("0x{:040x}", suffix),
        }
    }
}

#[async_trait]
impl WalletProvider for SimulatedProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>> {
        Ok(vec![self.address.clone()])
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(11_155_111)
    }

    async fn balance_of(&self, _address: &Address) -> Result<u128> {
        Ok(2_500_000_000_000_000_000)
    }

    async fn sign_message(&self, _address: &Address, message: &str) -> Result<String> {
        Ok(format!("0xsig{:x}", message.len()))
    }

    async fn send_transaction(&self, _from: &Address, _call: &ContractCall) -> Result<String> {
        // Simulate network latency on submission
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        let hash: u64 = rand::thread_rng().gen();
        Ok(format!("0x{:064x}", hash))
    }
}

/// Generation backend simulation with a short "rendering" delay.
struct SimulatedBackend;

#[async_trait]
impl GenerationBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn edit_image(
        &self,
        references: &[InlineImage],
        prompt: &str,
    ) -> Result<InlineImage> {
        info!(
            "Simulating image edit from {} reference(s), prompt: {:.40}",
            references.len(),
            prompt
        );
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        Ok(InlineImage::new("image/png", DEMO_IMAGE_BASE64))
    }

    async fn generate_from_text(&self, prompt: &str) -> Result<InlineImage> {
        info!("Simulating text-only generation, prompt: {:.40}", prompt);
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        Ok(InlineImage::new("image/png", DEMO_IMAGE_BASE64))
    }
}

/// Metadata store simulation: pins nothing, mints a fake content URI.
struct SimulatedStore;

#[async_trait]
impl MetadataStore for SimulatedStore {
    async fn upload(&self, image: &InlineImage, prompt: &str) -> UploadOutcome {
        let cid: u64 = rand::thread_rng().gen();
        UploadOutcome::Success {
            storage_uri: format!("ipfs://demo{:x}", cid),
            name: if prompt.is_empty() {
                "Vibe Coin".to_string()
            } else {
                "Rocket Moon Meme".to_string()
            },
            description: "Simulated pin of a generated meme".to_string(),
            preview: image.clone(),
        }
    }
}

fn demo_gallery() -> Vec<CoinRecord> {
    vec![
        CoinRecord {
            id: "0xAAA-1".to_string(),
            name: Some("Foo".to_string()),
            symbol: Some("FOO".to_string()),
            image_url: Some("https://img.vibe.example/foo.png".to_string()),
            volume_24h: Some(120_000.0),
            market_cap: Some(1_400_000.0),
            unique_holders: Some(812.0),
            market_cap_delta_24h: Some(12.5),
        },
        CoinRecord {
            id: "0xBBB-1".to_string(),
            name: Some("Bar".to_string()),
            symbol: Some("BAR".to_string()),
            image_url: Some("https://img.vibe.example/bar.png".to_string()),
            volume_24h: Some(64_000.0),
            market_cap: Some(380_000.0),
            unique_holders: Some(233.0),
            market_cap_delta_24h: Some(-3.1),
        },
    ]
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("Starting vibe-mint creation flow demo");

    let mut config = VibeConfig::from_env();
    config.completion_display_delay_ms = 500;
    // The proxy relay is not simulated; reference fetches fail fast and
    // the pipeline degrades to the text-only path.
    config.image_proxy_url = "http://127.0.0.1:9/?".to_string();

    // Connect the simulated wallet
    let session = Arc::new(WalletSession::new(Arc::new(SimulatedProvider::new())));
    let address = session.connect().await?;
    info!(
        "Connected as {} with balance {} wei",
        format_address(&address),
        session.balance().await?
    );

    // Select both demo coins
    let gallery = demo_gallery();
    let mut selection = SelectionSet::new();
    for coin in &gallery {
        selection.add(&coin.id);
    }
    let selected: Vec<CoinRecord> = selection
        .resolve(&gallery)
        .into_iter()
        .cloned()
        .collect();
    info!("Selected {} coins from the gallery", selected.len());

    // Subscribe to dialog events
    let (event_sender, mut event_receiver) = mpsc::channel::<DialogEvent>(64);
    let printer = tokio::spawn(async move {
        while let Some(event) = event_receiver.recv().await {
            info!("[event] {:?}", event.kind);
        }
    });

    let backend: Arc<dyn GenerationBackend> = Arc::new(SimulatedBackend);
    let dialog = Arc::new(
        DialogBuilder::new()
            .with_config(config)
            .with_wallet(session)
            .with_backend(backend.clone())
            .with_fallback_backend(backend)
            .with_store(Arc::new(SimulatedStore))
            .build(event_sender)?,
    );

    // Generate and pin
    dialog.begin(&selected, "rocket to the moon").await?;
    info!("Dialog state after pipeline: {:?}", dialog.state().await);

    // Confirm the mint
    dialog.confirm_mint().await?;
    info!("Dialog state after mint: {:?}", dialog.state().await);

    // Completion clears the selection on the presentation side
    selection.clear();
    dialog.close().await;

    drop(dialog);
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    printer.abort();

    info!("Demo completed");
    Ok(())
}
