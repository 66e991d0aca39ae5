// ── Mentor Atoms: Core Types ───────────────────────────────────────────────
//
// Pure data types for the orchestration & memory engine — no logic beyond
// trivial accessors, no DB access, no I/O.
//
// Follows the project pattern: structs in atoms/, impls in engine/.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ═══════════════════════════════════════════════════════════════════════════
// Memory
// ═══════════════════════════════════════════════════════════════════════════

/// Partition of stored context by semantic purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// A fact the learner studied or practiced.
    Learning,
    /// Project ideas, decisions, and build history.
    Project,
    /// Conversational turns, scoped to a session.
    Conversation,
    /// The learner's profile text. Logically superseded, never mutated.
    Profile,
}

impl MemoryType {
    /// All memory types, in stable order.
    pub const ALL: [MemoryType; 4] = [
        MemoryType::Learning,
        MemoryType::Project,
        MemoryType::Conversation,
        MemoryType::Profile,
    ];

    /// Stable string tag used in the database and in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Learning => "learning",
            MemoryType::Project => "project",
            MemoryType::Conversation => "conversation",
            MemoryType::Profile => "profile",
        }
    }

    /// Parse the stable string tag. Unknown tags are rejected so a corrupted
    /// row never silently lands in the wrong partition.
    pub fn parse(s: &str) -> Option<MemoryType> {
        match s {
            "learning" => Some(MemoryType::Learning),
            "project" => Some(MemoryType::Project),
            "conversation" => Some(MemoryType::Conversation),
            "profile" => Some(MemoryType::Profile),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable memory record. Owned exclusively by `MemoryStore`; nothing
/// else mutates one after it is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub user_id: String,
    pub memory_type: MemoryType,
    pub content: String,
    /// Embedding vector. Never empty — an append without an embedding fails.
    pub embedding: Vec<f32>,
    /// Free-form JSON object (role, skill tags, source…).
    pub metadata: serde_json::Value,
    /// Session scope for conversation records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// Self-assessed comprehension in [0,1], for learning records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comprehension_level: Option<f64>,
    /// Material complexity in [0,1], for learning records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity_level: Option<f64>,
}

/// Parameters for `MemoryStore::append`. The optionals default to `None`
/// so call sites only name what they use.
#[derive(Debug, Clone, Default)]
pub struct NewMemory {
    pub content: String,
    pub metadata: serde_json::Value,
    pub session_id: Option<String>,
    pub comprehension_level: Option<f64>,
    pub complexity_level: Option<f64>,
}

impl NewMemory {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), metadata: serde_json::json!({}), ..Default::default() }
    }
}

/// A bounded scope for conversation memory. Destroyed logically when a new
/// session starts: the old session's conversation records become inert but
/// are not deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub created_at: String,
}

/// Transient retrieval result. `record_id` is carried for provenance and for
/// the deterministic tie-break in composite ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextItem {
    pub record_id: String,
    pub content: String,
    pub memory_type: MemoryType,
    /// Cosine similarity in [0,1], pre-recency-adjustment.
    pub similarity_score: f64,
    /// RFC 3339 timestamp of the underlying record.
    pub timestamp: String,
}

// ═══════════════════════════════════════════════════════════════════════════
// Modes
// ═══════════════════════════════════════════════════════════════════════════

/// The classified intent governing which prompt template applies.
/// A closed set — dispatch is an exhaustive match, never a string lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Tutor,
    Explainer,
    Debugger,
    ProjectBuilder,
    LearningPlanner,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Tutor => "tutor",
            Mode::Explainer => "explainer",
            Mode::Debugger => "debugger",
            Mode::ProjectBuilder => "project_builder",
            Mode::LearningPlanner => "learning_planner",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of mode detection. Detection never fails; `trigger_matches` is the
/// only confidence signal modeled (0 = defaulted, ≥1 = a trigger fired).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub mode: Mode,
    pub trigger_matches: usize,
}

impl Detection {
    /// Whether at least one trigger set matched. A caller-level policy may
    /// ask a clarifying question when this is false; the engine itself
    /// always proceeds with the returned mode.
    pub fn confident(&self) -> bool {
        self.trigger_matches > 0
    }
}

/// Who said a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of recent conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

// ═══════════════════════════════════════════════════════════════════════════
// Proficiency
// ═══════════════════════════════════════════════════════════════════════════

/// Derived skill mastery estimate. Recomputed on read — never the source of
/// truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillScore {
    pub skill: String,
    /// Weighted proficiency in [0,1].
    pub proficiency: f64,
    /// RFC 3339 timestamp of the most recent matching learning record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_practiced: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Streaming
// ═══════════════════════════════════════════════════════════════════════════

/// Event delivered to downstream consumers, one lazy finite sequence per
/// request. Non-restartable: once the channel closes the run is over.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    Token { text: String },
    Complete { text: String },
    Error { message: String },
}

/// Per-request orchestrator state. Single-owner: only the request's own task
/// transitions it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

// ═══════════════════════════════════════════════════════════════════════════
// Inbound request
// ═══════════════════════════════════════════════════════════════════════════

/// Inbound chat request from the web/API layer. `user_id` arrives already
/// verified — credential management is outside the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
    /// Separate error text, consumed by the debugger template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
    /// Explicit mode override — bypasses the detector entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode_override: Option<Mode>,
    /// Session scoping conversation memory. Absent → the user's active
    /// session is used (created if none exists).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════

/// Which model-provider wire format to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Ollama,
    OpenRouter,
    Custom,
}

impl ProviderKind {
    /// Default API base URL per provider.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com",
            ProviderKind::Ollama => "http://localhost:11434",
            ProviderKind::OpenRouter => "https://openrouter.ai/api",
            ProviderKind::Custom => "http://localhost:8080",
        }
    }
}

/// Model provider connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,
    /// Overrides `kind.default_base_url()` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::OpenAi,
            base_url: None,
            api_key: String::new(),
            model: "gpt-4o-mini".into(),
        }
    }
}

/// Embedding backend settings. Defaults to a local Ollama instance so the
/// engine works out of the box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "nomic-embed-text".into(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// SQLite database path. `None` → platform data dir (`dirs`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
}
