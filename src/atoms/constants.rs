// ── Mentor Atoms: Constants ────────────────────────────────────────────────
// All tunable policy values for the engine live here.
// Rationale: collecting constants in one place eliminates magic numbers and
// makes the retrieval/scoring/streaming policies auditable at a glance.

// ── Retrieval policy ───────────────────────────────────────────────────────

/// Nearest-neighbor results requested per memory type.
pub const RETRIEVAL_TOP_K: usize = 5;

/// Minimum cosine similarity for a record to qualify as context.
pub const MIN_SIMILARITY: f64 = 0.7;

/// Maximum context items returned across all memory types combined.
pub const CONTEXT_LIMIT: usize = 5;

/// Half-life of the retrieval recency weight. At equal similarity, a record
/// this old scores half of a brand-new one. Tunable; the decay curve itself
/// is a plain exponential (see `ContextRetriever::recency_weight`).
pub const RECENCY_HALF_LIFE_SECS: f64 = 7.0 * 86_400.0; // 7 days

// ── Streaming policy ───────────────────────────────────────────────────────

/// No-progress timeout, measured from the last received token — a slow but
/// progressing stream is never killed.
pub const STREAM_IDLE_TIMEOUT_SECS: u64 = 30;

/// Maximum retry attempts for transient provider errors before any token
/// has been emitted. Once streaming starts, failures are terminal.
pub const MAX_STREAM_RETRIES: u32 = 3;

/// Initial retry delay in milliseconds (doubles each attempt).
pub const RETRY_BASE_DELAY_MS: u64 = 1_000;

/// Retry delay cap in milliseconds.
pub const RETRY_MAX_DELAY_MS: u64 = 8_000;

// ── Proficiency scoring ────────────────────────────────────────────────────

/// Record count at which the frequency sub-score saturates to 1.0.
pub const FREQUENCY_SATURATION: f64 = 100.0;

/// Half-life of the proficiency recency sub-score. Skills untouched for
/// this long contribute half recency weight.
pub const PROFICIENCY_HALF_LIFE_SECS: f64 = 14.0 * 86_400.0; // 14 days

/// Weighted-sum coefficients for the proficiency formula.
pub const W_FREQUENCY: f64 = 0.3;
pub const W_RECENCY: f64 = 0.2;
pub const W_COMPLEXITY: f64 = 0.3;
pub const W_COMPREHENSION: f64 = 0.2;

// ── Conversation history ───────────────────────────────────────────────────

/// Recent conversation turns loaded for mode detection and prompt assembly.
pub const RECENT_HISTORY_LIMIT: usize = 10;

// ── Embeddings ─────────────────────────────────────────────────────────────

/// Dimension of the deterministic offline hash embedder.
pub const HASH_EMBEDDER_DIM: usize = 256;
