// ── Mentor Engine: Chat Pipeline ───────────────────────────────────────────
//
// One inbound message, end to end:
//   session → recent history → mode detection → context retrieval →
//   profile → prompt → streaming run.
//
// Memory side effects: the user's message is appended to conversation
// memory before streaming begins; the assistant's reply is appended by the
// orchestrator on completion. Retrieval failures degrade to empty context —
// the conversation always proceeds.

use crate::atoms::constants::RECENT_HISTORY_LIMIT;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{
    ChatRequest, Detection, EngineConfig, MemoryType, NewMemory, StreamEvent,
};
use crate::engine::embedding::HttpEmbeddingClient;
use crate::engine::memory::MemoryStore;
use crate::engine::mode;
use crate::engine::orchestrator::{CancelToken, StreamRequest, StreamingOrchestrator};
use crate::engine::prompt::{self, ModeInput};
use crate::engine::providers::AnyProvider;
use crate::engine::retrieval::ContextRetriever;
use log::{info, warn};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct ChatEngine {
    store: Arc<MemoryStore>,
    retriever: ContextRetriever,
    orchestrator: StreamingOrchestrator,
}

impl ChatEngine {
    pub fn new(store: Arc<MemoryStore>, provider: Arc<AnyProvider>) -> Self {
        let retriever = ContextRetriever::new(Arc::clone(&store));
        let orchestrator = StreamingOrchestrator::new(Arc::clone(&store), provider);
        Self { store, retriever, orchestrator }
    }

    /// Build the whole stack from configuration: HTTP embedder, SQLite store
    /// at the configured (or platform-default) path, and the configured
    /// model provider.
    pub fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        let db_path = match &config.db_path {
            Some(path) => path.clone(),
            None => {
                let dir = dirs::data_dir()
                    .ok_or_else(|| EngineError::Config("no platform data directory".into()))?
                    .join("mentor");
                std::fs::create_dir_all(&dir)?;
                dir.join("mentor.db")
            }
        };
        info!("[chat] Opening memory store at {}", db_path.display());

        let embedder = Arc::new(HttpEmbeddingClient::new(&config.embedding));
        let store = Arc::new(MemoryStore::open(&db_path, embedder)?);
        let provider = Arc::new(AnyProvider::from_config(&config.provider));
        Ok(Self::new(store, provider))
    }

    /// The memory store backing this engine, for read-side callers
    /// (proficiency dashboards, session management).
    pub fn store(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.store)
    }

    /// Handle one chat message and return its event stream.
    ///
    /// Errors here are pre-stream only (session resolution, memory append).
    /// Once the receiver is returned, failures arrive as `StreamEvent::Error`.
    pub async fn handle_message(
        &self,
        request: ChatRequest,
        cancel: CancelToken,
    ) -> EngineResult<mpsc::Receiver<StreamEvent>> {
        let session_id = self.resolve_session(&request)?;

        let history = self
            .store
            .recent_conversation(&request.user_id, &session_id, RECENT_HISTORY_LIMIT)
            .unwrap_or_else(|e| {
                warn!("[chat] Failed to load history ({}) — proceeding without", e);
                Vec::new()
            });

        let detection = match request.mode_override {
            Some(m) => Detection { mode: m, trigger_matches: 1 },
            None => mode::detect(&request.message, &history),
        };
        info!(
            "[chat] user={} mode={} (confident={})",
            request.user_id,
            detection.mode,
            detection.confident()
        );

        let context = self
            .retriever
            .retrieve(&request.user_id, detection.mode, &request.message, Some(&session_id))
            .await;

        let profile = self.store.latest_profile(&request.user_id).unwrap_or_else(|e| {
            warn!("[chat] Failed to load profile ({}) — proceeding without", e);
            None
        });

        let input = ModeInput {
            message: request.message.clone(),
            error_text: request.error_text.clone(),
        };
        let prompt = prompt::build(detection.mode, &input, &context, profile.as_deref());

        // Record the user's turn before streaming so the reply lands after
        // it in history order.
        self.store
            .append(
                &request.user_id,
                MemoryType::Conversation,
                NewMemory {
                    metadata: json!({ "role": "user", "mode": detection.mode.as_str() }),
                    session_id: Some(session_id.clone()),
                    ..NewMemory::text(request.message.clone())
                },
            )
            .await?;

        let stream_request = StreamRequest {
            user_id: request.user_id,
            session_id: Some(session_id),
            prompt,
        };
        Ok(self.orchestrator.spawn(stream_request, cancel))
    }

    /// Use the requested session, else the user's active one, else start a
    /// fresh session.
    fn resolve_session(&self, request: &ChatRequest) -> EngineResult<String> {
        if let Some(id) = &request.session_id {
            return Ok(id.clone());
        }
        if let Some(session) = self.store.active_session(&request.user_id)? {
            return Ok(session.id);
        }
        Ok(self.store.start_session(&request.user_id)?.id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::traits::{CompletionStream, ModelProvider, ProviderError, StreamDelta};
    use crate::atoms::types::{Mode, ProviderKind, Role};
    use crate::engine::embedding::HashEmbedder;
    use crate::engine::orchestrator::CancelHandle;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Echoes a fixed reply; records every prompt it was given.
    struct EchoProvider {
        reply: &'static str,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ModelProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }
        fn kind(&self) -> ProviderKind {
            ProviderKind::Custom
        }
        async fn stream_completion(&self, prompt: &str) -> Result<CompletionStream, ProviderError> {
            self.prompts.lock().push(prompt.to_string());
            let reply = self.reply;
            let (tx, rx) = mpsc::channel(4);
            tokio::spawn(async move {
                let _ = tx.send(Ok(StreamDelta::Token(reply.to_string()))).await;
                let _ = tx.send(Ok(StreamDelta::Done)).await;
            });
            Ok(rx)
        }
    }

    fn engine(reply: &'static str) -> (ChatEngine, Arc<MemoryStore>, Arc<Mutex<Vec<String>>>) {
        let store = Arc::new(MemoryStore::open_in_memory(Arc::new(HashEmbedder::new())).unwrap());
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let provider = Arc::new(AnyProvider::from_boxed(Box::new(EchoProvider {
            reply,
            prompts: Arc::clone(&prompts),
        })));
        (ChatEngine::new(Arc::clone(&store), provider), store, prompts)
    }

    fn chat(message: &str) -> ChatRequest {
        ChatRequest {
            user_id: "u1".into(),
            message: message.into(),
            error_text: None,
            mode_override: None,
            session_id: None,
        }
    }

    async fn drain(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        events
    }

    #[tokio::test]
    async fn full_pipeline_persists_both_turns_in_order() {
        let (engine, store, _) = engine("a closure captures its environment");
        let rx = engine
            .handle_message(chat("what is a closure?"), CancelHandle::new().token())
            .await
            .unwrap();
        let events = drain(rx).await;
        assert!(matches!(events.last(), Some(StreamEvent::Complete { .. })));

        let session = store.active_session("u1").unwrap().unwrap();
        let turns = store.recent_conversation("u1", &session.id, 10).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "what is a closure?");
        assert_eq!(turns[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn session_is_created_when_absent_and_reused_after() {
        let (engine, store, _) = engine("ok");
        assert!(store.active_session("u1").unwrap().is_none());

        drain(engine.handle_message(chat("hello"), CancelHandle::new().token()).await.unwrap())
            .await;
        let first = store.active_session("u1").unwrap().unwrap();

        drain(engine.handle_message(chat("again"), CancelHandle::new().token()).await.unwrap())
            .await;
        let second = store.active_session("u1").unwrap().unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn mode_override_bypasses_detection() {
        let (engine, _store, prompts) = engine("ok");
        let mut request = chat("hello there");
        request.mode_override = Some(Mode::Debugger);
        drain(engine.handle_message(request, CancelHandle::new().token()).await.unwrap()).await;

        let seen = prompts.lock();
        assert!(seen[0].contains("debugging partner"), "prompt: {}", seen[0]);
    }

    #[tokio::test]
    async fn detected_mode_shapes_the_prompt() {
        let (engine, _store, prompts) = engine("ok");
        drain(
            engine
                .handle_message(chat("I want to build a todo app"), CancelHandle::new().token())
                .await
                .unwrap(),
        )
        .await;

        let seen = prompts.lock();
        assert!(seen[0].contains("project mentor"), "prompt: {}", seen[0]);
    }

    #[tokio::test]
    async fn retrieved_learning_context_reaches_the_prompt() {
        let (engine, store, prompts) = engine("ok");
        store
            .append(
                "u1",
                MemoryType::Learning,
                NewMemory::text("studied recursion and base cases"),
            )
            .await
            .unwrap();

        drain(
            engine
                .handle_message(
                    chat("explain recursion and base cases"),
                    CancelHandle::new().token(),
                )
                .await
                .unwrap(),
        )
        .await;

        let seen = prompts.lock();
        assert!(
            seen[0].contains("studied recursion and base cases"),
            "prompt: {}",
            seen[0]
        );
    }

    #[tokio::test]
    async fn profile_reaches_the_prompt() {
        let (engine, store, prompts) = engine("ok");
        store
            .append("u1", MemoryType::Profile, NewMemory::text("beginner, prefers analogies"))
            .await
            .unwrap();

        drain(engine.handle_message(chat("hi"), CancelHandle::new().token()).await.unwrap()).await;
        assert!(prompts.lock()[0].contains("beginner, prefers analogies"));
    }

    #[tokio::test]
    async fn error_text_feeds_the_debugger_template() {
        let (engine, _store, prompts) = engine("ok");
        let mut request = chat("my loop is broken");
        request.error_text = Some("panicked at index out of bounds".into());
        drain(engine.handle_message(request, CancelHandle::new().token()).await.unwrap()).await;

        let seen = prompts.lock();
        assert!(seen[0].contains("panicked at index out of bounds"));
    }
}
