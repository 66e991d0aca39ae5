// ── Mentor Atoms: Trait Seams ──────────────────────────────────────────────
//
// The two external collaborators of the core, abstracted behind traits:
//   • EmbeddingProvider — text → fixed-dimension vector
//   • ModelProvider    — prompt → lazy, finite, non-restartable token stream
//
// Concrete implementations live in engine/embedding.rs and engine/providers/.
// ProviderError is the provider-edge taxonomy; it is mapped into EngineError
// at the orchestrator boundary so provider detail is logged, not surfaced.

use crate::atoms::error::EngineResult;
use crate::atoms::types::ProviderKind;
use async_trait::async_trait;
use thiserror::Error;

// ── Embeddings ─────────────────────────────────────────────────────────────

/// Converts text to a fixed-dimension numeric vector.
///
/// Failure semantics: an error during `MemoryStore::append` fails the whole
/// append; an error during retrieval degrades to empty context.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> EngineResult<Vec<f32>>;

    /// Dimension of the vectors this provider produces.
    fn dimension(&self) -> usize;
}

// ── Model streaming ────────────────────────────────────────────────────────

/// Whether an HTTP status code represents a transient, retryable failure.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504 | 529)
}

/// Provider-edge errors. Coarser than EngineError on purpose: the
/// orchestrator only needs to know whether a failure is worth retrying.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Connection-level failure (DNS, TLS, reset, closed before any data).
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status from the provider API.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Authentication / authorization failure. Never retried.
    #[error("auth error: {0}")]
    Auth(String),

    /// 429 with optional server-requested delay.
    #[error("rate limited: {message}")]
    RateLimited { message: String, retry_after_secs: Option<u64> },
}

impl ProviderError {
    /// Whether the orchestrator may retry this error (only before the first
    /// token has been emitted).
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transport(_) => true,
            ProviderError::RateLimited { .. } => true,
            ProviderError::Api { status, .. } => is_retryable_status(*status),
            ProviderError::Auth(_) => false,
        }
    }

    /// Server-requested retry delay, when the provider sent one.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_secs, .. } => *retry_after_secs,
            _ => None,
        }
    }
}

/// One unit of the completion stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamDelta {
    /// A chunk of generated text.
    Token(String),
    /// Explicit end-of-stream marker.
    Done,
}

/// A finite, non-restartable sequence of deltas. The receiver half of a
/// bounded channel: dropping it cancels the underlying HTTP stream because
/// the producer task's `send` fails and the task exits.
pub type CompletionStream = tokio::sync::mpsc::Receiver<Result<StreamDelta, ProviderError>>;

/// A single streaming-completion interface over any model-hosting provider.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Open a completion stream for a fully-assembled prompt.
    ///
    /// Errors returned here (as opposed to inside the stream) always occur
    /// before any token was produced, so they are safe to retry.
    async fn stream_completion(&self, prompt: &str) -> Result<CompletionStream, ProviderError>;
}
