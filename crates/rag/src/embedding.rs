use std::collections::hash_map::DefaultHasher;
use std::env;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::time::sleep;

use crate::error::{RagError, Result};

const EMBED_TIMEOUT_SECS: u64 = 30;
const MAX_RETRIES: usize = 5;
/// Bounded fan-out: at most this many embedding batches in flight.
const MAX_IN_FLIGHT: usize = 4;

/// Price per million tokens, used for ingest cost estimates.
fn price_per_million(model: &str) -> f64 {
    match model {
        "text-embedding-3-small" => 0.02,
        "text-embedding-3-large" => 0.13,
        "text-embedding-ada-002" => 0.10,
        _ => 0.02,
    }
}

/// Usage counters for an embedding client.
#[derive(Debug, Default)]
pub struct EmbedStats {
    pub texts: AtomicUsize,
    pub tokens: AtomicUsize,
    pub api_calls: AtomicUsize,
    pub errors: AtomicUsize,
}

impl EmbedStats {
    pub fn snapshot(&self) -> (usize, usize, usize, usize) {
        (
            self.texts.load(Ordering::Relaxed),
            self.tokens.load(Ordering::Relaxed),
            self.api_calls.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
        )
    }
}

/// Capability set of an embedding provider: turn texts into fixed-dimension
/// dense vectors. The engine depends on this trait, not a concrete provider.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        out.pop()
            .ok_or_else(|| RagError::Embedding("provider returned no vectors".to_string()))
    }

    fn dimensions(&self) -> usize;
    fn model_name(&self) -> &str;
    fn total_tokens(&self) -> usize;

    fn cost_estimate_usd(&self) -> f64 {
        (self.total_tokens() as f64 / 1_000_000.0) * price_per_million(self.model_name())
    }
}

/// OpenAI embeddings with batching, bounded fan-out and retry with
/// exponential backoff on transient errors.
pub struct OpenAiEmbedder {
    http: Client,
    model: String,
    api_key: String,
    batch_size: usize,
    dimensions: usize,
    stats: EmbedStats,
    limiter: Arc<Semaphore>,
}

impl OpenAiEmbedder {
    pub fn from_env(model: &str, batch_size: usize) -> Result<Self> {
        let api_key =
            env::var("OPENAI_API_KEY").map_err(|_| RagError::MissingCredentials("OPENAI_API_KEY"))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(EMBED_TIMEOUT_SECS))
            .build()?;
        let dimensions = match model {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        };
        Ok(Self {
            http,
            model: model.to_string(),
            api_key,
            batch_size: batch_size.clamp(1, 50),
            dimensions,
            stats: EmbedStats::default(),
            limiter: Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
        })
    }

    async fn embed_single_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let payload = serde_json::json!({
            "model": self.model,
            "input": batch,
        });
        let mut attempt = 0usize;
        let mut last = String::new();
        while attempt <= MAX_RETRIES {
            attempt += 1;
            let sent = self
                .http
                .post("https://api.openai.com/v1/embeddings")
                .bearer_auth(&self.api_key)
                .json(&payload)
                .send()
                .await;
            match sent {
                Ok(response) => {
                    let status = response.status();
                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
                        || status.is_server_error()
                    {
                        self.stats.errors.fetch_add(1, Ordering::Relaxed);
                        last = format!("status {status}");
                    } else if !status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        return Err(RagError::Embedding(format!("status {status}: {body}")));
                    } else {
                        let parsed: EmbeddingResponse = response.json().await?;
                        self.stats.api_calls.fetch_add(1, Ordering::Relaxed);
                        self.stats.texts.fetch_add(batch.len(), Ordering::Relaxed);
                        let token_count: usize = batch
                            .iter()
                            .map(|t| casecast_core::LegalChunker::count_tokens(t))
                            .sum();
                        self.stats.tokens.fetch_add(token_count, Ordering::Relaxed);
                        // The API may reorder; restore input order by index.
                        let mut out = vec![Vec::new(); batch.len()];
                        for item in parsed.data {
                            if item.index < out.len() {
                                out[item.index] = item.embedding;
                            }
                        }
                        return Ok(out);
                    }
                }
                Err(err) if err.is_timeout() || err.is_connect() => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    last = err.to_string();
                }
                Err(err) => return Err(err.into()),
            }
            let wait = Duration::from_secs(1u64 << (attempt.min(6) as u32 - 1));
            tracing::warn!(attempt, wait_secs = wait.as_secs(), error = %last, "embedding retry");
            sleep(wait).await;
        }
        Err(RagError::EmbeddingExhausted {
            attempts: attempt,
            last,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = vec![Vec::new(); texts.len()];
        let batches: Vec<(usize, &[String])> = texts
            .chunks(self.batch_size)
            .enumerate()
            .map(|(i, chunk)| (i * self.batch_size, chunk))
            .collect();

        // Fan batches out with a bounded number in flight. Futures are
        // polled concurrently but all borrow &self, so no task spawning.
        let mut pending = Vec::with_capacity(batches.len());
        for (offset, batch) in batches {
            let permit_pool = Arc::clone(&self.limiter);
            pending.push(async move {
                let _permit = permit_pool.acquire().await.expect("semaphore open");
                let vectors = self.embed_single_batch(batch).await?;
                Ok::<(usize, Vec<Vec<f32>>), RagError>((offset, vectors))
            });
        }
        for result in futures::future::join_all(pending).await {
            let (offset, vectors) = result?;
            for (i, vector) in vectors.into_iter().enumerate() {
                out[offset + i] = vector;
            }
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn total_tokens(&self) -> usize {
        self.stats.tokens.load(Ordering::Relaxed)
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Deterministic bag-of-words hash embedder. No network, stable across runs;
/// used by tests and offline smoke runs.
#[derive(Clone)]
pub struct HashEmbedder {
    dimensions: usize,
    seed: u64,
    tokens: Arc<AtomicUsize>,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(64, 1337)
    }
}

impl HashEmbedder {
    pub fn new(dimensions: usize, seed: u64) -> Self {
        Self {
            dimensions: dimensions.max(1),
            seed,
            tokens: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];
        let mut count = 0usize;
        for token in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            hasher.write_u64(self.seed);
            token.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() as usize) % self.dimensions] += 1.0;
            count += 1;
        }
        self.tokens.fetch_add(count, Ordering::Relaxed);
        normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "hash"
    }

    fn total_tokens(&self) -> usize {
        self.tokens.load(Ordering::Relaxed)
    }
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed_one("deposit protection failure").await.unwrap();
        let b = embedder.embed_one("deposit protection failure").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn hash_embedder_separates_topics() {
        let embedder = HashEmbedder::default();
        let deposit = embedder.embed_one("deposit protection scheme").await.unwrap();
        let same = embedder.embed_one("deposit protection scheme rules").await.unwrap();
        let other = embedder.embed_one("garden lawn overgrown patio").await.unwrap();
        let close = casecast_index::cosine_similarity(&deposit, &same);
        let far = casecast_index::cosine_similarity(&deposit, &other);
        assert!(close > far);
    }

    #[tokio::test]
    async fn batches_reassemble_in_order() {
        let embedder = HashEmbedder::default();
        let texts: Vec<String> = (0..7).map(|i| format!("text number {i}")).collect();
        let vectors = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors.len(), 7);
        for (i, text) in texts.iter().enumerate() {
            assert_eq!(vectors[i], embedder.embed_text(text));
        }
    }

    #[test]
    fn cost_scales_with_model() {
        assert!(price_per_million("text-embedding-3-large") > price_per_million("text-embedding-3-small"));
    }
}
