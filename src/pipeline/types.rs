//! Value objects and state machine vocabulary for the creation pipeline.

use crate::types::{Address, CoinRecord};
use serde::{Deserialize, Serialize};

/// A self-contained encoded image: MIME type plus base64 payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineImage {
    pub mime_type: String,
    /// Base64-encoded image bytes (no data-URL prefix)
    pub data: String,
}

impl InlineImage {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Render as a `data:` URL usable directly for display and upload.
    pub fn as_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// One generation attempt's input, constructed fresh per attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Reference image URLs, at most two, placeholders already filtered
    pub reference_images: Vec<String>,
    /// Free-text prompt; may be empty when references are present
    pub prompt: String,
    /// Display names of the selected coins, for prompt synthesis
    pub coin_names: Vec<String>,
}

impl GenerationRequest {
    /// Derive a request from the selected coins plus the user prompt.
    pub fn from_selection(coins: &[&CoinRecord], prompt: &str) -> Self {
        let reference_images = coins
            .iter()
            .filter_map(|coin| coin.usable_image())
            .take(crate::types::MAX_SELECTION)
            .map(str::to_string)
            .collect();

        let coin_names = coins
            .iter()
            .map(|coin| {
                coin.name
                    .clone()
                    .or_else(|| coin.symbol.clone())
                    .unwrap_or_else(|| coin.id.clone())
            })
            .collect();

        Self {
            reference_images,
            prompt: prompt.trim().to_string(),
            coin_names,
        }
    }

    /// A request with neither references nor prompt has nothing to
    /// generate from.
    pub fn is_empty(&self) -> bool {
        self.reference_images.is_empty() && self.prompt.is_empty()
    }
}

/// Outcome of the image generation pipeline. Exactly one variant,
/// never partially successful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    Success { image: InlineImage },
    Failure { reason: String },
}

/// Outcome of the metadata upload stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Success {
        /// Content-addressed storage URI returned by the backend
        storage_uri: String,
        /// Canonical coin name
        name: String,
        /// Canonical coin description
        description: String,
        /// The pinned image, echoed back for preview
        preview: InlineImage,
    },
    Failure {
        reason: String,
    },
}

/// Parameters for the coin creation contract call.
///
/// Constructed only when both upload metadata and a connected wallet
/// address are present; never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintParameters {
    pub name: String,
    pub symbol: String,
    /// Content URI from the upload stage
    pub uri: String,
    /// Connected wallet address receiving creator payouts
    pub payout_recipient: Address,
    /// Fixed platform referrer address from configuration
    pub platform_referrer: Address,
}

/// Outcome of one mint submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxResult {
    Submitted { tx_hash: String },
    Rejected { reason: String },
}

/// Stage a pipeline failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailedStage {
    Generation,
    Upload,
    Mint,
}

/// State of one open creation dialog.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogState {
    Idle,
    GeneratingImage,
    UploadingMetadata,
    MintReady {
        image: InlineImage,
        params: MintParameters,
    },
    Minting {
        params: MintParameters,
    },
    Complete {
        tx_hash: String,
    },
    Failed {
        stage: FailedStage,
        reason: String,
    },
}

impl DialogState {
    /// Whether a new run may start from this state.
    pub fn accepts_new_run(&self) -> bool {
        matches!(self, DialogState::Idle | DialogState::Failed { .. })
    }
}

/// Event emitted on every dialog state transition.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogEvent {
    /// Unix timestamp, milliseconds
    pub at_ms: u64,
    pub kind: DialogEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DialogEventKind {
    GenerationStarted,
    /// Generated image is available for display
    PreviewReady { image: InlineImage },
    UploadStarted,
    MintReady { name: String, symbol: String },
    MintSubmitted { tx_hash: String },
    /// Mint accepted and the display delay elapsed; the presentation
    /// layer clears selection and prompt on this event
    Completed,
    StageFailed { stage: FailedStage, reason: String },
    Closed,
}

// --- Communication channels for dialog subscribers ---

pub type DialogEventSender = tokio::sync::mpsc::Sender<DialogEvent>;
pub type DialogEventReceiver = tokio::sync::mpsc::Receiver<DialogEvent>;

pub(crate) fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PLACEHOLDER_IMAGE;

    fn coin(id: &str, name: Option<&str>, image: Option<&str>) -> CoinRecord {
        CoinRecord {
            id: id.to_string(),
            name: name.map(str::to_string),
            symbol: Some(id.to_uppercase()),
            image_url: image.map(str::to_string),
            volume_24h: None,
            market_cap: None,
            unique_holders: None,
            market_cap_delta_24h: None,
        }
    }

    #[test]
    fn test_data_url_rendering() {
        let image = InlineImage::new("image/png", "QUJD");
        assert_eq!(image.as_data_url(), "data:image/png;base64,QUJD");
    }

    #[test]
    fn test_request_filters_placeholder_references() {
        let a = coin("a", Some("Foo"), Some("https://img.example/a.png"));
        let b = coin("b", Some("Bar"), Some(PLACEHOLDER_IMAGE));
        let request = GenerationRequest::from_selection(&[&a, &b], "prompt");

        assert_eq!(request.reference_images, vec!["https://img.example/a.png"]);
        assert_eq!(request.coin_names, vec!["Foo", "Bar"]);
    }

    #[test]
    fn test_request_coin_name_fallbacks() {
        let unnamed = coin("0xdead", None, None);
        let request = GenerationRequest::from_selection(&[&unnamed], "");
        assert_eq!(request.coin_names, vec!["0XDEAD"]);
    }

    #[test]
    fn test_request_emptiness() {
        let a = coin("a", Some("Foo"), None);
        assert!(GenerationRequest::from_selection(&[&a], "  ").is_empty());
        assert!(!GenerationRequest::from_selection(&[&a], "rocket").is_empty());
    }

    #[test]
    fn test_dialog_state_run_gating() {
        assert!(DialogState::Idle.accepts_new_run());
        assert!(DialogState::Failed {
            stage: FailedStage::Upload,
            reason: "boom".to_string()
        }
        .accepts_new_run());
        assert!(!DialogState::GeneratingImage.accepts_new_run());
        assert!(!DialogState::UploadingMetadata.accepts_new_run());
    }
}
