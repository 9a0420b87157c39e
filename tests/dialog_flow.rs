//! Scenario tests for the creation dialog state machine: the full
//! select → generate → upload → mint flow, retry semantics, staleness
//! on abandonment, and the mint double-submission guard.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use vibe_mint::pipeline::{
    CoinMinter, DialogBuilder, DialogEvent, DialogEventKind, DialogState, FailedStage,
    GenerationBackend, InlineImage, MetadataStore, MintParameters, TxResult, UploadOutcome,
};
use vibe_mint::types::{Address, CoinRecord, ContractCall};
use vibe_mint::wallet::{WalletProvider, WalletSession};
use vibe_mint::VibeConfig;

const WALLET_ADDRESS: &str = "0x00000000000000000000000000000000000wa11e7";

struct CountingProvider {
    transactions_sent: AtomicUsize,
}

impl CountingProvider {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            transactions_sent: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl WalletProvider for CountingProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>> {
        Ok(vec![WALLET_ADDRESS.to_string()])
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(1)
    }

    async fn balance_of(&self, _address: &Address) -> Result<u128> {
        Ok(0)
    }

    async fn sign_message(&self, _address: &Address, _message: &str) -> Result<String> {
        Ok("sig".to_string())
    }

    async fn send_transaction(&self, _from: &Address, _call: &ContractCall) -> Result<String> {
        let n = self.transactions_sent.fetch_add(1, Ordering::SeqCst);
        Ok(format!("0xtx{}", n))
    }
}

/// Backend whose first call stalls and fails; later calls succeed
/// immediately. Used to race an abandoned run against a fresh one.
struct PhasedBackend {
    calls: AtomicUsize,
}

impl PhasedBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    async fn run(&self) -> Result<InlineImage> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            tokio::time::sleep(Duration::from_millis(300)).await;
            bail!("provider error on the abandoned run");
        }
        Ok(InlineImage::new("image/png", "T0s="))
    }
}

#[async_trait]
impl GenerationBackend for PhasedBackend {
    fn name(&self) -> &str {
        "phased"
    }

    async fn edit_image(&self, _references: &[InlineImage], _prompt: &str) -> Result<InlineImage> {
        self.run().await
    }

    async fn generate_from_text(&self, _prompt: &str) -> Result<InlineImage> {
        self.run().await
    }
}

/// Backend that always succeeds and counts calls.
struct InstantBackend {
    calls: AtomicUsize,
}

impl InstantBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl GenerationBackend for InstantBackend {
    fn name(&self) -> &str {
        "instant"
    }

    async fn edit_image(&self, _references: &[InlineImage], _prompt: &str) -> Result<InlineImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(InlineImage::new("image/png", "T0s="))
    }

    async fn generate_from_text(&self, _prompt: &str) -> Result<InlineImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(InlineImage::new("image/png", "T0s="))
    }
}

/// Store returning the canonical fixture metadata, optionally failing
/// the first `fail_first` uploads.
struct FixtureStore {
    uploads: AtomicUsize,
    fail_first: usize,
}

impl FixtureStore {
    fn new(fail_first: usize) -> Arc<Self> {
        Arc::new(Self {
            uploads: AtomicUsize::new(0),
            fail_first,
        })
    }
}

#[async_trait]
impl MetadataStore for FixtureStore {
    async fn upload(&self, image: &InlineImage, _prompt: &str) -> UploadOutcome {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_first {
            return UploadOutcome::Failure {
                reason: "Upload failed (502 Bad Gateway)".to_string(),
            };
        }
        UploadOutcome::Success {
            storage_uri: "ipfs://xyz".to_string(),
            name: "Foo Bar Meme".to_string(),
            description: "generated".to_string(),
            preview: image.clone(),
        }
    }
}

fn coin(id: &str, name: &str, symbol: &str) -> CoinRecord {
    CoinRecord {
        id: id.to_string(),
        name: Some(name.to_string()),
        symbol: Some(symbol.to_string()),
        image_url: None,
        volume_24h: None,
        market_cap: None,
        unique_holders: None,
        market_cap_delta_24h: None,
    }
}

fn selection() -> Vec<CoinRecord> {
    vec![coin("0xAAA", "Foo", "FOO"), coin("0xBBB", "Bar", "BAR")]
}

fn test_config() -> VibeConfig {
    let mut config = VibeConfig::default();
    config.completion_display_delay_ms = 0;
    config.generation_requests_per_minute = 60;
    config
}

struct Harness {
    dialog: Arc<vibe_mint::CreationDialog>,
    provider: Arc<CountingProvider>,
    events: mpsc::Receiver<DialogEvent>,
}

async fn harness(
    backend: Arc<dyn GenerationBackend>,
    store: Arc<dyn MetadataStore>,
) -> Harness {
    let provider = CountingProvider::new();
    let session = Arc::new(WalletSession::new(provider.clone()));
    session.connect().await.unwrap();

    let (sender, receiver) = mpsc::channel(64);
    let dialog = DialogBuilder::new()
        .with_config(test_config())
        .with_wallet(session.clone())
        .with_backend(backend.clone())
        .with_fallback_backend(backend)
        .with_store(store)
        .build(sender)
        .unwrap();

    Harness {
        dialog: Arc::new(dialog),
        provider,
        events: receiver,
    }
}

fn drain_kinds(events: &mut mpsc::Receiver<DialogEvent>) -> Vec<DialogEventKind> {
    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(event.kind);
    }
    kinds
}

#[tokio::test]
async fn test_end_to_end_mint_parameters() {
    let mut h = harness(InstantBackend::new(), FixtureStore::new(0)).await;

    h.dialog
        .begin(&selection(), "rocket to the moon")
        .await
        .unwrap();

    match h.dialog.state().await {
        DialogState::MintReady { params, .. } => {
            assert_eq!(params.name, "Foo Bar Meme");
            // Initialism of "Foo Bar Meme"
            assert_eq!(params.symbol, "FBM");
            assert_eq!(params.uri, "ipfs://xyz");
            assert_eq!(params.payout_recipient, WALLET_ADDRESS);
        }
        other => panic!("expected MintReady, got {:?}", other),
    }

    h.dialog.confirm_mint().await.unwrap();
    assert!(matches!(
        h.dialog.state().await,
        DialogState::Complete { .. }
    ));
    assert_eq!(h.provider.transactions_sent.load(Ordering::SeqCst), 1);

    let kinds = drain_kinds(&mut h.events);
    let expected = [
        "GenerationStarted",
        "PreviewReady",
        "UploadStarted",
        "MintReady",
        "MintSubmitted",
        "Completed",
    ];
    let observed: Vec<&str> = kinds
        .iter()
        .map(|kind| match kind {
            DialogEventKind::GenerationStarted => "GenerationStarted",
            DialogEventKind::PreviewReady { .. } => "PreviewReady",
            DialogEventKind::UploadStarted => "UploadStarted",
            DialogEventKind::MintReady { .. } => "MintReady",
            DialogEventKind::MintSubmitted { .. } => "MintSubmitted",
            DialogEventKind::Completed => "Completed",
            DialogEventKind::StageFailed { .. } => "StageFailed",
            DialogEventKind::Closed => "Closed",
        })
        .collect();
    assert_eq!(observed, expected);
}

#[tokio::test]
async fn test_upload_failure_retries_from_generation() {
    let backend = InstantBackend::new();
    let store = FixtureStore::new(1);
    let h = harness(backend.clone(), store.clone()).await;

    h.dialog.begin(&selection(), "rocket").await.unwrap();
    match h.dialog.state().await {
        DialogState::Failed { stage, .. } => assert_eq!(stage, FailedStage::Upload),
        other => panic!("expected Failed, got {:?}", other),
    }

    // Retry regenerates the artifact before re-uploading.
    h.dialog.retry().await.unwrap();
    assert!(matches!(
        h.dialog.state().await,
        DialogState::MintReady { .. }
    ));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.uploads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_abandoned_run_cannot_overwrite_new_state() {
    let h = harness(PhasedBackend::new(), FixtureStore::new(0)).await;
    let dialog = h.dialog.clone();

    // First run stalls inside the backend.
    let first = {
        let dialog = dialog.clone();
        let coins = selection();
        tokio::spawn(async move { dialog.begin(&coins, "first attempt").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(dialog.state().await, DialogState::GeneratingImage);

    // Abandon it and start over with a new selection.
    dialog.close().await;
    dialog
        .begin(&[coin("0xCCC", "Baz", "BAZ")], "second attempt")
        .await
        .unwrap();
    assert!(matches!(dialog.state().await, DialogState::MintReady { .. }));

    // Let the abandoned run's failure arrive; it must be discarded.
    first.await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(350)).await;
    match dialog.state().await {
        DialogState::MintReady { params, .. } => assert_eq!(params.payout_recipient, WALLET_ADDRESS),
        other => panic!("stale result overwrote state: {:?}", other),
    }
}

#[tokio::test]
async fn test_confirm_mint_is_single_shot() {
    let h = harness(InstantBackend::new(), FixtureStore::new(0)).await;

    h.dialog.begin(&selection(), "rocket").await.unwrap();
    h.dialog.confirm_mint().await.unwrap();
    assert_eq!(h.provider.transactions_sent.load(Ordering::SeqCst), 1);

    // The state gate refuses a second confirmation outright.
    assert!(h.dialog.confirm_mint().await.is_err());
    assert_eq!(h.provider.transactions_sent.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_mint_stage_itself_is_not_idempotent() {
    let provider = CountingProvider::new();
    let session = WalletSession::new(provider.clone());
    session.connect().await.unwrap();

    let minter = CoinMinter::new(&test_config());
    let params = MintParameters::assemble(
        "Foo Bar Meme",
        &[],
        "ipfs://xyz",
        &WALLET_ADDRESS.to_string(),
        &"0xREF".to_string(),
    );

    // Two invocations, two submissions: the orchestrator's state gate is
    // the only double-submission protection.
    let first = minter.mint(&session, &params).await;
    let second = minter.mint(&session, &params).await;
    assert!(matches!(first, TxResult::Submitted { .. }));
    assert!(matches!(second, TxResult::Submitted { .. }));
    assert_eq!(provider.transactions_sent.load(Ordering::SeqCst), 2);
}
