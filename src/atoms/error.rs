// ── Mentor Atoms: Error Types ──────────────────────────────────────────────
// Single canonical error enum for the engine, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (I/O, DB, Embedding, Provider…).
//   • The `#[from]` attribute wires std/external error conversions automatically.
//   • Retrieval-side failures (Embedding during query, Index) are usually
//     *degraded* rather than propagated — see MemoryStore::query and
//     ContextRetriever::get_context.
//   • No variant carries secret material (API keys) in its message.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// SQLite / rusqlite database failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Embedding provider unreachable or rejected the input.
    /// Aborts an `append` (no partial record without an embedding);
    /// degrades a `query` to empty results.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Similarity index transiently unavailable. Queries degrade to empty
    /// rather than failing the request.
    #[error("Index error: {0}")]
    Index(String),

    /// Model provider HTTP or API-level failure (non-secret detail only).
    #[error("Provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    /// No token received within the streaming idle window.
    #[error("Stream timed out: no progress within the idle window")]
    Timeout,

    /// Caller-initiated cancellation. Terminal, but not an error to the caller.
    #[error("Cancelled")]
    Cancelled,

    /// Engine configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catch-all for errors that do not yet have a dedicated variant.
    /// Prefer adding a specific variant over using this in new code.
    #[error("{0}")]
    Other(String),
}

// ── Convenience constructors ───────────────────────────────────────────────

impl EngineError {
    /// Create a provider error with name and message.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider { provider: provider.into(), message: message.into() }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All engine operations should return this type.
pub type EngineResult<T> = Result<T, EngineError>;

// ── Conversion: EngineError → String ──────────────────────────────────────
// Lets API-boundary callers (`Result<T, String>`) convert without boilerplate.

impl From<EngineError> for String {
    fn from(e: EngineError) -> Self {
        e.to_string()
    }
}
