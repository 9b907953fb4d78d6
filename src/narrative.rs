//! Optional prose narrative from a hosted language model.
//!
//! Only the recommendation layer calls this; the ranked lineup never depends
//! on it. [`from_config`] returns `None` when the API key is not set.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use tokio::runtime::Handle;

use crate::config::NarrativeConfig;

/// Prompt in, prose out. Synchronous; async callers use `spawn_blocking`.
pub trait NarrativeGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Gemini `generateContent` over REST.
///
/// Requests go through the async client on the runtime captured at
/// construction. [`NarrativeGenerator::generate`] blocks on that runtime, so it
/// must run on a blocking-pool thread, never on an async worker.
pub struct GeminiNarrator {
    client: reqwest::Client,
    runtime: Handle,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GeminiNarrator {
    pub fn new(config: &NarrativeConfig, api_key: String) -> Result<Self> {
        let runtime = Handle::try_current().context("narrative generator needs a Tokio runtime")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            runtime,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    async fn request(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        anyhow::ensure!(status.is_success(), "narrative request failed with HTTP {status}");

        let parsed: GenerateResponse = response
            .json()
            .await
            .context("failed to parse narrative response")?;
        extract_text(parsed)
    }
}

impl NarrativeGenerator for GeminiNarrator {
    fn generate(&self, prompt: &str) -> Result<String> {
        self.runtime.block_on(self.request(prompt))
    }
}

fn extract_text(response: GenerateResponse) -> Result<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();
    anyhow::ensure!(!text.trim().is_empty(), "narrative response had no text");
    Ok(text)
}

/// Build the configured narrator, or `None` when disabled or the key is unset.
pub fn from_config(config: &NarrativeConfig) -> Result<Option<Box<dyn NarrativeGenerator>>> {
    if !config.enabled {
        return Ok(None);
    }
    match std::env::var(&config.api_key_env) {
        Ok(key) if !key.trim().is_empty() => {
            let narrator = GeminiNarrator::new(config, key)?;
            tracing::info!(model = %config.model, "narrative generator ready");
            Ok(Some(Box::new(narrator)))
        }
        _ => {
            tracing::info!(
                env = %config.api_key_env,
                "narrative generator disabled: API key not set"
            );
            Ok(None)
        }
    }
}
