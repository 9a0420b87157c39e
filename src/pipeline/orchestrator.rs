//! Creation dialog orchestrator.
//!
//! Drives generate → upload → mint for one open dialog, tracks the
//! UI-visible state, and emits an event on every transition. One
//! instance per dialog; the instance owns an epoch counter so a run
//! abandoned by closing the dialog can never write its late results
//! over a newer run's state.

use crate::config::VibeConfig;
use crate::pipeline::image_gen::ImagePipeline;
use crate::pipeline::minting::CoinMinter;
use crate::pipeline::types::{
    now_ms, DialogEvent, DialogEventKind, DialogEventSender, DialogState, FailedStage,
    GenerationRequest, GenerationResult, MintParameters, TxResult, UploadOutcome,
};
use crate::pipeline::upload::MetadataStore;
use crate::types::{Address, CoinRecord};
use crate::wallet::WalletSession;
use anyhow::{anyhow, bail, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// State machine for one open creation dialog.
pub struct CreationDialog {
    wallet: Arc<WalletSession>,
    pipeline: Arc<ImagePipeline>,
    store: Arc<dyn MetadataStore>,
    minter: CoinMinter,
    platform_referrer: Address,
    completion_delay: Duration,
    state: Mutex<DialogState>,
    /// Bumped on close; runs carry the epoch they started under and
    /// drop any result that arrives after a bump.
    epoch: AtomicU64,
    last_request: Mutex<Option<(GenerationRequest, Vec<String>)>>,
    events: DialogEventSender,
}

impl CreationDialog {
    pub fn new(
        wallet: Arc<WalletSession>,
        pipeline: Arc<ImagePipeline>,
        store: Arc<dyn MetadataStore>,
        minter: CoinMinter,
        config: &VibeConfig,
        events: DialogEventSender,
    ) -> Self {
        Self {
            wallet,
            pipeline,
            store,
            minter,
            platform_referrer: config.platform_referrer.clone(),
            completion_delay: Duration::from_millis(config.completion_display_delay_ms),
            state: Mutex::new(DialogState::Idle),
            epoch: AtomicU64::new(0),
            last_request: Mutex::new(None),
            events,
        }
    }

    /// Current dialog state (cloned snapshot).
    pub async fn state(&self) -> DialogState {
        self.state.lock().await.clone()
    }

    /// Start a generation run for the selected coins. Valid from
    /// `Idle` and `Failed`; requires at least one coin and a connected
    /// wallet. Runs the pipeline through to `MintReady` or `Failed`.
    #[instrument(skip(self, coins, prompt), fields(coins = coins.len()))]
    pub async fn begin(&self, coins: &[CoinRecord], prompt: &str) -> Result<()> {
        if coins.is_empty() {
            bail!("Select at least one coin before generating");
        }
        let Some(payout_recipient) = self.wallet.address().await else {
            bail!("Wallet is not connected");
        };

        let selected: Vec<&CoinRecord> = coins.iter().collect();
        let request = GenerationRequest::from_selection(&selected, prompt);
        let symbols: Vec<String> = coins.iter().filter_map(|coin| coin.symbol.clone()).collect();

        self.enter_generating().await?;
        *self.last_request.lock().await = Some((request.clone(), symbols.clone()));

        let run = self.current_epoch();
        self.drive(run, request, symbols, payout_recipient).await;
        Ok(())
    }

    /// Re-run the last request from scratch. Valid only from `Failed`;
    /// upload failures regenerate the image rather than re-uploading a
    /// possibly malformed artifact.
    #[instrument(skip(self))]
    pub async fn retry(&self) -> Result<()> {
        let Some(payout_recipient) = self.wallet.address().await else {
            bail!("Wallet is not connected");
        };
        let (request, symbols) = self
            .last_request
            .lock()
            .await
            .clone()
            .ok_or_else(|| anyhow!("Nothing to retry"))?;

        {
            let state = self.state.lock().await;
            if !matches!(*state, DialogState::Failed { .. }) {
                bail!("Retry is only available after a failure");
            }
        }
        self.enter_generating().await?;

        let run = self.current_epoch();
        self.drive(run, request, symbols, payout_recipient).await;
        Ok(())
    }

    /// Submit the mint. Valid only from `MintReady`; entering `Minting`
    /// is what disables a second submission of the same parameters.
    #[instrument(skip(self))]
    pub async fn confirm_mint(&self) -> Result<()> {
        if !self.wallet.is_connected().await {
            bail!("Wallet is not connected");
        }

        let params = {
            let mut state = self.state.lock().await;
            match &*state {
                DialogState::MintReady { params, .. } => {
                    let params = params.clone();
                    *state = DialogState::Minting {
                        params: params.clone(),
                    };
                    params
                }
                _ => bail!("Minting is only available once metadata is ready"),
            }
        };

        let run = self.current_epoch();
        info!("Submitting mint for {} ({})", params.name, params.symbol);

        match self.minter.mint(&self.wallet, &params).await {
            TxResult::Submitted { tx_hash } => {
                if self.is_stale(run) {
                    debug!("Dialog closed during mint; submitted transaction stands");
                    return Ok(());
                }
                self.emit(DialogEventKind::MintSubmitted {
                    tx_hash: tx_hash.clone(),
                })
                .await;

                // Let the success state stay visible before completion
                // clears the selection.
                tokio::time::sleep(self.completion_delay).await;
                if self.is_stale(run) {
                    return Ok(());
                }
                self.set_state(DialogState::Complete {
                    tx_hash: tx_hash.clone(),
                })
                .await;
                self.emit(DialogEventKind::Completed).await;
            }
            TxResult::Rejected { reason } => {
                if self.is_stale(run) {
                    return Ok(());
                }
                self.fail(FailedStage::Mint, reason).await;
            }
        }
        Ok(())
    }

    /// Close the dialog. Always permitted; in-flight work is abandoned
    /// (its eventual results are discarded) but anything already
    /// committed externally stands.
    #[instrument(skip(self))]
    pub async fn close(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.state.lock().await;
            *state = DialogState::Idle;
        }
        self.emit(DialogEventKind::Closed).await;
    }

    async fn drive(
        &self,
        run: u64,
        request: GenerationRequest,
        symbols: Vec<String>,
        payout_recipient: Address,
    ) {
        let generated = self.pipeline.generate(&request).await;
        if self.is_stale(run) {
            debug!("Discarding generation result for abandoned run");
            return;
        }

        let image = match generated {
            GenerationResult::Success { image } => image,
            GenerationResult::Failure { reason } => {
                self.fail(FailedStage::Generation, reason).await;
                return;
            }
        };

        self.set_state(DialogState::UploadingMetadata).await;
        self.emit(DialogEventKind::PreviewReady {
            image: image.clone(),
        })
        .await;
        self.emit(DialogEventKind::UploadStarted).await;

        let uploaded = self.store.upload(&image, &request.prompt).await;
        if self.is_stale(run) {
            debug!("Discarding upload result for abandoned run");
            return;
        }

        match uploaded {
            UploadOutcome::Success {
                storage_uri, name, ..
            } => {
                let params = MintParameters::assemble(
                    &name,
                    &symbols,
                    &storage_uri,
                    &payout_recipient,
                    &self.platform_referrer,
                );
                self.set_state(DialogState::MintReady {
                    image,
                    params: params.clone(),
                })
                .await;
                self.emit(DialogEventKind::MintReady {
                    name: params.name,
                    symbol: params.symbol,
                })
                .await;
            }
            UploadOutcome::Failure { reason } => {
                self.fail(FailedStage::Upload, reason).await;
            }
        }
    }

    async fn enter_generating(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.accepts_new_run() {
            bail!("A generation run is already in progress");
        }
        *state = DialogState::GeneratingImage;
        drop(state);
        self.emit(DialogEventKind::GenerationStarted).await;
        Ok(())
    }

    async fn fail(&self, stage: FailedStage, reason: String) {
        warn!("Pipeline stage {:?} failed: {}", stage, reason);
        self.set_state(DialogState::Failed {
            stage,
            reason: reason.clone(),
        })
        .await;
        self.emit(DialogEventKind::StageFailed { stage, reason }).await;
    }

    async fn set_state(&self, next: DialogState) {
        let mut state = self.state.lock().await;
        *state = next;
    }

    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn is_stale(&self, run: u64) -> bool {
        self.current_epoch() != run
    }

    async fn emit(&self, kind: DialogEventKind) {
        let event = DialogEvent {
            at_ms: now_ms(),
            kind,
        };
        if self.events.send(event).await.is_err() {
            debug!("Dialog event receiver dropped");
        }
    }
}
