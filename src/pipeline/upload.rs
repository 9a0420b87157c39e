//! Metadata upload stage: pin the generated image and obtain canonical
//! coin metadata from the first-party backend.
//!
//! The backend's response shape has drifted over time, so decoding is
//! presence-checked field path by field path with explicit defaults
//! rather than a rigid struct.

use crate::config::VibeConfig;
use crate::pipeline::types::{InlineImage, UploadOutcome};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Default coin name when the backend omits one.
pub const DEFAULT_COIN_NAME: &str = "Vibe Coin";
/// Default coin description when the backend omits one.
pub const DEFAULT_COIN_DESCRIPTION: &str = "Generated with Vibe";

/// Seam for the upload stage, so the orchestrator and tests can swap
/// the HTTP implementation out.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Pin one generated image plus its prompt. Tagged outcome, never
    /// an error.
    async fn upload(&self, image: &InlineImage, prompt: &str) -> UploadOutcome;
}

/// HTTP implementation against `POST /api/content/content`.
pub struct BackendUploader {
    http_client: Client,
    api_url: String,
    timeout: Duration,
}

impl BackendUploader {
    pub fn new(http_client: Client, config: &VibeConfig) -> Self {
        Self {
            http_client,
            api_url: config.backend_api_url.clone(),
            timeout: Duration::from_secs(config.http_timeout_secs),
        }
    }
}

#[async_trait]
impl MetadataStore for BackendUploader {
    #[instrument(skip(self, image, prompt))]
    async fn upload(&self, image: &InlineImage, prompt: &str) -> UploadOutcome {
        let url = format!("{}/api/content/content", self.api_url);
        let picture = image.as_data_url();

        // The backend expects a pictures array even for a single image.
        let request_body = json!({
            "prompt": prompt,
            "pictures": [picture],
        });

        let response = match self
            .http_client
            .post(&url)
            .json(&request_body)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Upload transport failure: {:#}", e);
                let reason = if e.is_connect() || e.is_timeout() {
                    format!(
                        "Could not reach the backend at {}. If the server is up, check its cross-origin configuration.",
                        self.api_url
                    )
                } else {
                    format!("Upload error: {}", e)
                };
                return UploadOutcome::Failure { reason };
            }
        };

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!("Upload rejected with {}: {}", status, detail);
            return UploadOutcome::Failure {
                reason: format!("Upload failed ({})", status),
            };
        }

        let payload: Value = match response.json().await {
            Ok(payload) => payload,
            Err(e) => {
                return UploadOutcome::Failure {
                    reason: format!("Unreadable upload response: {}", e),
                }
            }
        };

        debug!("Upload accepted by backend");
        success_from_payload(&payload, image)
    }
}

/// Shape-tolerant success construction. Known historical layouts:
/// `{ data: { ipfsUri, metadata: { name, description } } }`, the same
/// without the `data` wrapper, and a flat `{ ipfsMetadataUri, name,
/// description }`.
fn success_from_payload(payload: &Value, image: &InlineImage) -> UploadOutcome {
    let storage_uri = first_string(
        payload,
        &[
            &["data", "ipfsUri"],
            &["ipfsUri"],
            &["ipfsMetadataUri"],
        ],
    )
    .unwrap_or_default();

    let name = first_string(
        payload,
        &[
            &["data", "metadata", "name"],
            &["metadata", "name"],
            &["name"],
        ],
    )
    .unwrap_or_else(|| DEFAULT_COIN_NAME.to_string());

    let description = first_string(
        payload,
        &[
            &["data", "metadata", "description"],
            &["metadata", "description"],
            &["description"],
        ],
    )
    .unwrap_or_else(|| DEFAULT_COIN_DESCRIPTION.to_string());

    UploadOutcome::Success {
        storage_uri,
        name,
        description,
        preview: image.clone(),
    }
}

/// Walk the candidate field paths in order and take the first
/// non-empty string.
fn first_string(payload: &Value, paths: &[&[&str]]) -> Option<String> {
    for path in paths {
        let mut cursor = payload;
        let mut found = true;
        for key in *path {
            match cursor.get(key) {
                Some(next) => cursor = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if found {
            if let Some(value) = cursor.as_str().filter(|s| !s.is_empty()) {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image() -> InlineImage {
        InlineImage::new("image/png", "QUJD")
    }

    fn expect_success(outcome: UploadOutcome) -> (String, String, String) {
        match outcome {
            UploadOutcome::Success {
                storage_uri,
                name,
                description,
                ..
            } => (storage_uri, name, description),
            UploadOutcome::Failure { reason } => panic!("expected success, got: {}", reason),
        }
    }

    #[test]
    fn test_wrapped_response_shape() {
        let payload = json!({
            "data": {
                "ipfsUri": "ipfs://xyz",
                "metadata": { "name": "Foo Bar Meme", "description": "a meme" }
            }
        });

        let (uri, name, description) = expect_success(success_from_payload(&payload, &image()));
        assert_eq!(uri, "ipfs://xyz");
        assert_eq!(name, "Foo Bar Meme");
        assert_eq!(description, "a meme");
    }

    #[test]
    fn test_unwrapped_response_shape() {
        let payload = json!({
            "ipfsUri": "ipfs://abc",
            "metadata": { "name": "Alt", "description": "alt shape" }
        });

        let (uri, name, description) = expect_success(success_from_payload(&payload, &image()));
        assert_eq!(uri, "ipfs://abc");
        assert_eq!(name, "Alt");
        assert_eq!(description, "alt shape");
    }

    #[test]
    fn test_flat_legacy_response_shape() {
        let payload = json!({
            "ipfsMetadataUri": "ipfs://legacy",
            "name": "Legacy",
            "description": "old layout"
        });

        let (uri, name, description) = expect_success(success_from_payload(&payload, &image()));
        assert_eq!(uri, "ipfs://legacy");
        assert_eq!(name, "Legacy");
        assert_eq!(description, "old layout");
    }

    #[test]
    fn test_missing_metadata_falls_back_to_defaults() {
        let payload = json!({ "data": { "ipfsUri": "ipfs://bare" } });

        let (uri, name, description) = expect_success(success_from_payload(&payload, &image()));
        assert_eq!(uri, "ipfs://bare");
        assert_eq!(name, DEFAULT_COIN_NAME);
        assert_eq!(description, DEFAULT_COIN_DESCRIPTION);
    }

    #[test]
    fn test_success_echoes_preview_image() {
        let payload = json!({ "data": { "ipfsUri": "ipfs://x" } });
        match success_from_payload(&payload, &image()) {
            UploadOutcome::Success { preview, .. } => assert_eq!(preview, image()),
            UploadOutcome::Failure { .. } => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_mentions_cross_origin() {
        let mut config = VibeConfig::default();
        config.backend_api_url = "http://127.0.0.1:9".to_string();
        config.http_timeout_secs = 1;
        let uploader = BackendUploader::new(Client::new(), &config);

        match uploader.upload(&image(), "prompt").await {
            UploadOutcome::Failure { reason } => {
                assert!(reason.contains("cross-origin"), "reason was: {}", reason);
            }
            UploadOutcome::Success { .. } => panic!("expected failure"),
        }
    }
}
