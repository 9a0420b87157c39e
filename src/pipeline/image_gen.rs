//! Image generation pipeline with ordered provider fallback.
//!
//! Reference-image fetches are unreliable (cross-origin restrictions)
//! and any single backend call may fail or be refused by content
//! policy, so the pipeline degrades instead of aborting: fetch direct,
//! retry through the proxy relay, drop the image; try the image-edit
//! path, fall back to text-only generation; only then report failure.

use crate::config::VibeConfig;
use crate::pipeline::types::{GenerationRequest, GenerationResult, InlineImage};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// A generation backend offering the two strategies the pipeline
/// sequences: edit guided by reference images, and pure text-to-image.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Produce an image by editing/combining the references per the prompt.
    async fn edit_image(&self, references: &[InlineImage], prompt: &str) -> Result<InlineImage>;

    /// Produce an image from the prompt alone.
    async fn generate_from_text(&self, prompt: &str) -> Result<InlineImage>;
}

/// Gemini REST backend (`models/{model}:generateContent`).
pub struct GeminiBackend {
    http_client: Client,
    api_base: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl GeminiBackend {
    pub fn new(http_client: Client, config: &VibeConfig) -> Self {
        Self {
            http_client,
            api_base: config.gemini_api_base.trim_end_matches('/').to_string(),
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            timeout: Duration::from_secs(config.http_timeout_secs.max(30)),
        }
    }

    #[instrument(skip(self, references, prompt), fields(model = %self.model, references = references.len()))]
    async fn generate_content(
        &self,
        references: &[InlineImage],
        prompt: &str,
    ) -> Result<InlineImage> {
        if self.api_key.is_empty() {
            bail!("Generation API key is not configured");
        }

        let mut parts: Vec<Value> = references
            .iter()
            .map(|image| {
                json!({
                    "inlineData": {
                        "mimeType": image.mime_type,
                        "data": image.data,
                    }
                })
            })
            .collect();
        parts.push(json!({ "text": prompt }));

        let payload = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "temperature": 1.0,
                "topP": 0.95,
                "topK": 40,
                "maxOutputTokens": 8192,
            }
        });

        let endpoint = format!("{}/models/{}:generateContent", self.api_base, self.model);
        let response = self
            .http_client
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .context("Generation request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "Generation backend returned {}: {}",
                status,
                truncate_body(&body)
            );
        }

        let payload: Value = response
            .json()
            .await
            .context("Failed to parse generation response")?;

        extract_inline_image(&payload)
            .ok_or_else(|| anyhow!("Generation backend returned no image data"))
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn edit_image(&self, references: &[InlineImage], prompt: &str) -> Result<InlineImage> {
        self.generate_content(references, prompt).await
    }

    async fn generate_from_text(&self, prompt: &str) -> Result<InlineImage> {
        self.generate_content(&[], prompt).await
    }
}

/// Scan a generation response for the first inline image part.
/// Tolerates both `inlineData` and `inline_data` field spellings.
fn extract_inline_image(payload: &Value) -> Option<InlineImage> {
    let candidates = payload.get("candidates")?.as_array()?;
    for candidate in candidates {
        let Some(parts) = candidate.pointer("/content/parts").and_then(Value::as_array) else {
            continue;
        };
        for part in parts {
            let Some(inline) = part.get("inlineData").or_else(|| part.get("inline_data")) else {
                continue;
            };
            let data = inline.get("data").and_then(Value::as_str).unwrap_or("");
            if data.is_empty() {
                continue;
            }
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/jpeg");
            return Some(InlineImage::new(mime_type, data));
        }
    }
    None
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        body.to_string()
    } else {
        format!("{}...", &body[..MAX])
    }
}

/// Orchestrates reference materialization and the primary/fallback
/// generation strategies for one request at a time.
pub struct ImagePipeline {
    http_client: Client,
    primary: Arc<dyn GenerationBackend>,
    fallback: Arc<dyn GenerationBackend>,
    proxy_url: String,
    timeout: Duration,
    quota: DefaultDirectRateLimiter,
}

impl ImagePipeline {
    pub fn new(
        http_client: Client,
        primary: Arc<dyn GenerationBackend>,
        fallback: Arc<dyn GenerationBackend>,
        config: &VibeConfig,
    ) -> Self {
        let per_minute = NonZeroU32::new(config.generation_requests_per_minute)
            .unwrap_or(NonZeroU32::MIN);

        Self {
            http_client,
            primary,
            fallback,
            proxy_url: config.image_proxy_url.clone(),
            timeout: Duration::from_secs(config.http_timeout_secs),
            quota: RateLimiter::direct(Quota::per_minute(per_minute)),
        }
    }

    /// Run one generation request to a tagged outcome. Never errors out
    /// to the caller; at most two backend calls, strictly sequential.
    #[instrument(skip(self, request), fields(references = request.reference_images.len()))]
    pub async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        if request.is_empty() {
            return GenerationResult::Failure {
                reason: "Nothing to generate from: no reference images and an empty prompt"
                    .to_string(),
            };
        }

        let references = self.materialize_references(&request.reference_images).await;
        let prompt = if request.prompt.is_empty() {
            default_prompt(&request.coin_names)
        } else {
            request.prompt.clone()
        };

        // Primary path: edit guided by whatever references survived.
        if !references.is_empty() {
            match self.attempt_edit(&references, &prompt).await {
                Ok(image) => {
                    debug!("Primary generation path succeeded via {}", self.primary.name());
                    return GenerationResult::Success { image };
                }
                Err(e) => {
                    warn!("Primary generation path failed, trying text-only fallback: {:#}", e);
                }
            }
        }

        // Fallback path: text-only, with the coins named explicitly.
        let enriched = enriched_prompt(&request.coin_names, &prompt);
        match self.attempt_text(&enriched).await {
            Ok(image) => {
                debug!("Text-only generation path succeeded via {}", self.fallback.name());
                GenerationResult::Success { image }
            }
            Err(e) => GenerationResult::Failure {
                reason: format!("{:#}", e),
            },
        }
    }

    async fn attempt_edit(
        &self,
        references: &[InlineImage],
        prompt: &str,
    ) -> Result<InlineImage> {
        self.check_quota()?;
        self.primary.edit_image(references, prompt).await
    }

    async fn attempt_text(&self, prompt: &str) -> Result<InlineImage> {
        self.check_quota()?;
        self.fallback.generate_from_text(prompt).await
    }

    fn check_quota(&self) -> Result<()> {
        self.quota
            .check()
            .map_err(|_| anyhow!("Generation quota exceeded, try again in a minute"))
    }

    /// Materialize reference URLs as inline data. The two fetches run
    /// concurrently; a URL that fails both direct and proxied retrieval
    /// is dropped, never fatal.
    async fn materialize_references(&self, urls: &[String]) -> Vec<InlineImage> {
        let fetched = match urls {
            [] => Vec::new(),
            [only] => vec![self.materialize(only).await],
            [first, second, ..] => {
                let (a, b) = tokio::join!(self.materialize(first), self.materialize(second));
                vec![a, b]
            }
        };

        fetched.into_iter().flatten().collect()
    }

    async fn materialize(&self, image_url: &str) -> Option<InlineImage> {
        let mime_type = guess_mime(image_url);

        match self.fetch_inline(image_url, mime_type).await {
            Ok(image) => Some(image),
            Err(direct_err) => {
                debug!(
                    "Direct fetch failed for {}, retrying through proxy: {:#}",
                    image_url, direct_err
                );
                let proxied = format!("{}{}", self.proxy_url, encode_component(image_url));
                match self.fetch_inline(&proxied, mime_type).await {
                    Ok(image) => Some(image),
                    Err(proxy_err) => {
                        warn!(
                            "Dropping reference image {}: proxy fetch also failed: {:#}",
                            image_url, proxy_err
                        );
                        None
                    }
                }
            }
        }
    }

    async fn fetch_inline(&self, url: &str, mime_type: &str) -> Result<InlineImage> {
        let response = self
            .http_client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to fetch image")?;

        if !response.status().is_success() {
            return Err(anyhow!("Image fetch returned {}", response.status()));
        }

        let bytes = response.bytes().await.context("Failed to read image body")?;
        Ok(InlineImage::new(mime_type, BASE64.encode(&bytes)))
    }
}

/// Prompt used when the user typed nothing.
fn default_prompt(coin_names: &[String]) -> String {
    if coin_names.is_empty() {
        "Create a bold, funny meme image suitable for a new meme coin.".to_string()
    } else {
        format!(
            "Create a bold, funny meme image combining the crypto coins {}.",
            coin_names.join(" and ")
        )
    }
}

/// Fallback prompt naming the involved coins explicitly, since the
/// text-only path sees no reference images.
fn enriched_prompt(coin_names: &[String], prompt: &str) -> String {
    if coin_names.is_empty() {
        prompt.to_string()
    } else {
        format!(
            "{} The image should reference the crypto coins {}.",
            prompt,
            coin_names.join(" and ")
        )
    }
}

/// MIME type guessed from the URL extension, webp when unknown.
fn guess_mime(url: &str) -> &'static str {
    let lowered = url.to_lowercase();
    let path = lowered.split('?').next().unwrap_or(&lowered);
    if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".jpg") || path.ends_with(".jpeg") {
        "image/jpeg"
    } else if path.ends_with(".gif") {
        "image/gif"
    } else {
        "image/webp"
    }
}

fn encode_component(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime("https://x/img.PNG"), "image/png");
        assert_eq!(guess_mime("https://x/img.jpg"), "image/jpeg");
        assert_eq!(guess_mime("https://x/img.jpeg?width=2"), "image/jpeg");
        assert_eq!(guess_mime("https://x/img.gif"), "image/gif");
        assert_eq!(guess_mime("https://x/img"), "image/webp");
    }

    #[test]
    fn test_extract_inline_image_camel_case() {
        let payload = json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "here you go" },
                    { "inlineData": { "mimeType": "image/png", "data": "QUJD" } }
                ]}
            }]
        });

        let image = extract_inline_image(&payload).unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data, "QUJD");
    }

    #[test]
    fn test_extract_inline_image_snake_case() {
        let payload = json!({
            "candidates": [{
                "content": { "parts": [
                    { "inline_data": { "mime_type": "image/webp", "data": "QUJD" } }
                ]}
            }]
        });

        let image = extract_inline_image(&payload).unwrap();
        assert_eq!(image.mime_type, "image/webp");
    }

    #[test]
    fn test_extract_inline_image_text_only_is_none() {
        let payload = json!({
            "candidates": [{ "content": { "parts": [{ "text": "cannot draw that" }] } }]
        });
        assert!(extract_inline_image(&payload).is_none());
    }

    #[test]
    fn test_prompt_synthesis() {
        let names = vec!["Foo".to_string(), "Bar".to_string()];
        let default = default_prompt(&names);
        assert!(default.contains("Foo and Bar"));

        let enriched = enriched_prompt(&names, "rocket to the moon");
        assert!(enriched.starts_with("rocket to the moon"));
        assert!(enriched.contains("Foo and Bar"));
    }

    #[test]
    fn test_encode_component() {
        assert_eq!(
            encode_component("https://a/b?c=d"),
            "https%3A%2F%2Fa%2Fb%3Fc%3Dd"
        );
    }
}
