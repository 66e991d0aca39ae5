// ── Mentor Engine: Embeddings ──────────────────────────────────────────────
//
// Vector math, the BLOB codec for SQLite storage, and the two
// EmbeddingProvider implementations:
//   • HttpEmbeddingClient — Ollama (local, default) with an
//     OpenAI-compatible /v1/embeddings fallback
//   • HashEmbedder — deterministic offline bag-of-tokens embedder, used for
//     degraded operation and for reproducible tests

use crate::atoms::constants::HASH_EMBEDDER_DIM;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::EmbeddingProvider;
use crate::atoms::types::EmbeddingConfig;
use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════
// Vector math & BLOB codec
// ═══════════════════════════════════════════════════════════════════════════

/// Convert a byte slice (from a SQLite BLOB) to a Vec<f32>.
pub(crate) fn bytes_to_f32_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Convert a Vec<f32> to bytes for SQLite BLOB storage.
pub(crate) fn f32_vec_to_bytes(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Cosine similarity between two vectors. Returns 0.0 on length mismatch or
/// zero-length input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-12 {
        0.0
    } else {
        dot / denom
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HTTP embedding client
// ═══════════════════════════════════════════════════════════════════════════

/// Embedding client speaking the Ollama API with an OpenAI-compatible
/// fallback. Dimension is learned from the first successful call.
pub struct HttpEmbeddingClient {
    client: Client,
    base_url: String,
    model: String,
    dimension: std::sync::atomic::AtomicUsize,
}

impl HttpEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Self {
        HttpEmbeddingClient {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimension: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Ollama current API: POST /api/embed { model, input } → { embeddings: [[f32…]] }.
    /// Some Ollama versions return singular "embedding" even on /api/embed.
    async fn embed_ollama(&self, text: &str) -> Result<Vec<f32>, String> {
        let url = format!("{}/api/embed", self.base_url);
        let body = json!({ "model": self.model, "input": text });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Ollama not reachable at {}: {}", self.base_url, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("Ollama embed {}: {}", status, text));
        }

        let v: Value = resp.json().await.map_err(|e| format!("Ollama embed parse error: {}", e))?;

        if let Some(first) = v["embeddings"].as_array().and_then(|e| e.first()).and_then(|e| e.as_array()) {
            let vec: Vec<f32> = first.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect();
            if !vec.is_empty() {
                return Ok(vec);
            }
        }
        if let Some(embedding) = v["embedding"].as_array() {
            let vec: Vec<f32> = embedding.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect();
            if !vec.is_empty() {
                return Ok(vec);
            }
        }
        Err("No embedding array in Ollama response".into())
    }

    /// OpenAI-compatible format: POST /v1/embeddings { model, input }.
    async fn embed_openai(&self, text: &str) -> Result<Vec<f32>, String> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({ "model": self.model, "input": text });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Embedding endpoint not reachable at {}: {}", self.base_url, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("Embeddings API {}: {}", status, text));
        }

        let v: Value = resp.json().await.map_err(|e| format!("Embeddings parse error: {}", e))?;
        let embedding = v["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| "No 'data[0].embedding' array in response".to_string())?;
        let vec: Vec<f32> = embedding.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect();
        if vec.is_empty() {
            return Err("Empty embedding in response".into());
        }
        Ok(vec)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        let ollama_result = self.embed_ollama(text).await;
        let vec = match ollama_result {
            Ok(vec) => vec,
            Err(ollama_err) => match self.embed_openai(text).await {
                Ok(vec) => {
                    info!("[embedding] Ollama format failed, OpenAI format succeeded");
                    vec
                }
                Err(openai_err) => {
                    return Err(EngineError::embedding(format!(
                        "Ollama: {} | OpenAI: {}",
                        ollama_err, openai_err
                    )));
                }
            },
        };
        self.dimension.store(vec.len(), std::sync::atomic::Ordering::Relaxed);
        Ok(vec)
    }

    fn dimension(&self) -> usize {
        self.dimension.load(std::sync::atomic::Ordering::Relaxed)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Deterministic hash embedder
// ═══════════════════════════════════════════════════════════════════════════

/// Deterministic bag-of-tokens embedder: each lowercased alphanumeric token
/// is hashed (FNV-1a) into one of `HASH_EMBEDDER_DIM` buckets and the result
/// is L2-normalized. Identical texts always produce identical unit vectors
/// (self-similarity 1.0), and token overlap produces proportional cosine
/// similarity — enough structure for offline operation and exact-match
/// retrieval tests, with no network dependency.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashEmbedder;

impl HashEmbedder {
    pub fn new() -> Self {
        HashEmbedder
    }

    fn fnv1a(token: &str) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for b in token.bytes() {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }

    /// Synchronous core, shared by the trait impl and tests.
    pub fn embed_sync(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; HASH_EMBEDDER_DIM];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = (Self::fnv1a(token) % HASH_EMBEDDER_DIM as u64) as usize;
            v[bucket] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        Ok(Self::embed_sync(text))
    }

    fn dimension(&self) -> usize {
        HASH_EMBEDDER_DIM
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        let a = vec![1.0f32, 0.0];
        let b = vec![0.0f32, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_zero_and_mismatched() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        let empty: Vec<f32> = vec![];
        assert_eq!(cosine_similarity(&empty, &empty), 0.0);
    }

    #[test]
    fn bytes_f32_roundtrip() {
        let original = vec![1.0f32, -2.5, 3.14159, 0.0];
        let restored = bytes_to_f32_vec(&f32_vec_to_bytes(&original));
        assert_eq!(original, restored);
    }

    #[test]
    fn hash_embedder_deterministic_unit_vector() {
        let a = HashEmbedder::embed_sync("closures capture their environment");
        let b = HashEmbedder::embed_sync("closures capture their environment");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hash_embedder_similarity_ordering() {
        let base = HashEmbedder::embed_sync("rust ownership and borrowing rules");
        let near = HashEmbedder::embed_sync("ownership and borrowing in rust");
        let far = HashEmbedder::embed_sync("baking sourdough bread at home");
        let sim_near = cosine_similarity(&base, &near);
        let sim_far = cosine_similarity(&base, &far);
        assert!(sim_near > sim_far, "near={} far={}", sim_near, sim_far);
        assert!((cosine_similarity(&base, &base) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn hash_embedder_empty_text_is_zero_vector() {
        let v = HashEmbedder::embed_sync("   ");
        assert!(v.iter().all(|&x| x == 0.0));
    }
}
