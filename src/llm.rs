//! Language-model capability seams and the Ollama-backed client.
//!
//! The pipeline only ever sees two capabilities:
//! - [`Embedder`] — `embed(text) -> Vec<f32>` of fixed dimension
//! - [`Generator`] — `generate(prompt) -> String`
//!
//! [`OllamaClient`] implements both against an Ollama-compatible HTTP
//! API. Every call carries a bounded timeout and makes exactly one
//! attempt; callers handle failure by degrading, never by retrying.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;

/// Produces fixed-dimension embedding vectors for text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the embedding model identifier.
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality.
    fn dims(&self) -> usize;
    /// Embed a single text. One attempt, bounded timeout.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Produces free-form text from a prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the generation model identifier.
    fn model_name(&self) -> &str;
    /// Generate a completion. One attempt, bounded timeout.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Client for an Ollama-compatible HTTP API, implementing both
/// capabilities.
pub struct OllamaClient {
    base_url: String,
    model: String,
    embed_model: String,
    dims: usize,
    embed_timeout: Duration,
    generate_timeout: Duration,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            embed_model: config.embed_model.clone(),
            dims: config.embed_dims,
            embed_timeout: Duration::from_secs(config.embed_timeout_secs),
            generate_timeout: Duration::from_secs(config.generate_timeout_secs),
            client,
        })
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    fn model_name(&self) -> &str {
        &self.embed_model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.embed_model,
            "prompt": text,
        });

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .timeout(self.embed_timeout)
            .json(&body)
            .send()
            .await
            .context("embed request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("embed API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        let raw = json
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid embed response: missing embedding"))?;

        let vec: Vec<f32> = raw
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        if vec.len() != self.dims {
            bail!(
                "embed model returned {} dims, expected {}",
                vec.len(),
                self.dims
            );
        }

        Ok(l2_normalize(&vec))
    }
}

#[async_trait]
impl Generator for OllamaClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .timeout(self.generate_timeout)
            .json(&body)
            .send()
            .await
            .context("generate request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("generate API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid generate response: missing response field"))?;

        Ok(text.to_string())
    }
}

/// L2-normalize a vector so cosine and inner-product rankings agree.
/// Zero vectors are returned unchanged.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize_unit_norm() {
        let v = l2_normalize(&[3.0, 4.0]);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector_unchanged() {
        let v = l2_normalize(&[0.0, 0.0, 0.0]);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }
}
