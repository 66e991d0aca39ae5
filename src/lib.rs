// ── Mentor Core ────────────────────────────────────────────────────────────
//
// Conversational learning engine: classifies what kind of help a message is
// asking for, retrieves the learner's relevant memory, assembles a
// mode-specific prompt, streams the model's reply, and keeps a per-user
// record of everything learned along the way.
//
// Layout follows the atoms/engine split: atoms/ holds pure types, errors,
// constants, and trait seams; engine/ holds every implementation.
//
// Typical embedding:
//
//   let engine = ChatEngine::from_config(&EngineConfig::default())?;
//   let cancel = CancelHandle::new();
//   let mut events = engine.handle_message(request, cancel.token()).await?;
//   while let Some(event) = events.recv().await { /* forward to the client */ }

pub mod atoms;
pub mod engine;

pub use atoms::error::{EngineError, EngineResult};
pub use atoms::traits::{
    CompletionStream, EmbeddingProvider, ModelProvider, ProviderError, StreamDelta,
};
pub use atoms::types::{
    ChatRequest, ContextItem, Detection, EmbeddingConfig, EngineConfig, HistoryMessage,
    MemoryRecord, MemoryType, Mode, NewMemory, ProviderConfig, ProviderKind, Role, RunState,
    Session, SkillScore, StreamEvent,
};

pub use engine::chat::ChatEngine;
pub use engine::embedding::{HashEmbedder, HttpEmbeddingClient};
pub use engine::memory::MemoryStore;
pub use engine::orchestrator::{CancelHandle, CancelToken, StreamingOrchestrator};
pub use engine::proficiency::ProficiencyEngine;
pub use engine::providers::{AnyProvider, OpenAiCompatProvider};
pub use engine::retrieval::ContextRetriever;
