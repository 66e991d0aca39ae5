// ── Mentor Engine ──────────────────────────────────────────────────────────
// Implementations behind the atoms/ types: memory, retrieval, mode
// detection, prompt assembly, streaming, proficiency, and the chat pipeline
// that composes them.

pub mod chat;
pub mod embedding;
pub mod http;
pub mod memory;
pub mod mode;
pub mod orchestrator;
pub mod proficiency;
pub mod prompt;
pub mod providers;
pub mod retrieval;
