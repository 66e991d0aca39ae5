// ── Mentor Providers: OpenAI-Compatible ────────────────────────────────────
//
// Speaks the `/v1/chat/completions` SSE wire format: OpenAI, OpenRouter,
// Ollama, and any compatible REST API.
//
// Single-attempt by design: retry policy lives in the orchestrator, which
// knows whether tokens have already been delivered downstream. This module
// only classifies failures (ProviderError) so the orchestrator can decide.

use crate::atoms::traits::{CompletionStream, ModelProvider, ProviderError, StreamDelta};
use crate::atoms::types::{ProviderConfig, ProviderKind};
use crate::engine::http::{parse_retry_after, CircuitBreaker};
use async_trait::async_trait;
use futures::StreamExt;
use log::{error, info};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::sync::mpsc;

/// Circuit breaker shared across all OpenAI-compatible requests.
static OPENAI_CIRCUIT: LazyLock<CircuitBreaker> = LazyLock::new(|| CircuitBreaker::new(5, 60));

pub struct OpenAiCompatProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    kind: ProviderKind,
}

impl OpenAiCompatProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| config.kind.default_base_url().to_string());
        Self {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            base_url,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            kind: config.kind,
        }
    }

    /// Parse one SSE data payload. `None` means no token in this chunk
    /// (role-only deltas, keep-alives).
    fn parse_sse_chunk(data: &str) -> Option<String> {
        let v: Value = serde_json::from_str(data).ok()?;
        v["choices"].get(0)?["delta"]["content"].as_str().map(|s| s.to_string())
    }
}

#[async_trait]
impl ModelProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn stream_completion(&self, prompt: &str) -> Result<CompletionStream, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": true,
        });

        info!("[provider] Request to {} model={}", url, self.model);

        // Reject immediately if too many recent failures
        if let Err(msg) = OPENAI_CIRCUIT.check() {
            return Err(ProviderError::Transport(msg));
        }

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                OPENAI_CIRCUIT.record_failure();
                ProviderError::Transport(format!("HTTP request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let body_text = response.text().await.unwrap_or_default();
            let message = format!("API error {}: {}", status, truncate(&body_text, 200));
            error!("[provider] {}", message);
            OPENAI_CIRCUIT.record_failure();

            return Err(match status {
                401 | 403 => ProviderError::Auth(message),
                429 => ProviderError::RateLimited { message, retry_after_secs: retry_after },
                _ => ProviderError::Api { status, message },
            });
        }

        // Lazy delivery: the producer task parses SSE lines as bytes arrive
        // and pushes deltas into a bounded channel. Dropping the receiver
        // makes `send` fail, which exits the task and releases the HTTP
        // connection — that is the cancellation path.
        let (tx, rx) = mpsc::channel::<Result<StreamDelta, ProviderError>>(64);
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(result) = byte_stream.next().await {
                let bytes = match result {
                    Ok(b) => b,
                    Err(e) => {
                        OPENAI_CIRCUIT.record_failure();
                        let _ = tx
                            .send(Err(ProviderError::Transport(format!(
                                "Stream read error: {}",
                                e
                            ))))
                            .await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete SSE lines
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if let Some(data) = line.strip_prefix("data: ") {
                        if data == "[DONE]" {
                            OPENAI_CIRCUIT.record_success();
                            let _ = tx.send(Ok(StreamDelta::Done)).await;
                            return;
                        }
                        if let Some(token) = Self::parse_sse_chunk(data) {
                            if tx.send(Ok(StreamDelta::Token(token))).await.is_err() {
                                // Receiver dropped — request cancelled.
                                return;
                            }
                        }
                    }
                }
            }

            // Stream ended without [DONE]; Ollama-style streams do this.
            OPENAI_CIRCUIT.record_success();
            let _ = tx.send(Ok(StreamDelta::Done)).await;
        });

        Ok(rx)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
