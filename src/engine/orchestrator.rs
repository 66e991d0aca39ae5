// ── Mentor Engine: Streaming Orchestrator ──────────────────────────────────
//
// Owns one model-completion run end to end:
//
//   Pending ──first token──▶ Streaming ──▶ Completed | Failed
//      │                        │
//      └────────cancel──────────┴──▶ Cancelled
//
// Policy:
//   • Transient provider errors are retried (backoff, ≤3 attempts) only
//     while Pending — once a token has reached the consumer, re-issuing the
//     call would duplicate output, so any later failure is terminal.
//   • Inter-token timeout of 30s, measured from the last received token: a
//     slow but progressing stream is never killed.
//   • Cancellation is observed at every token-emission point. A cancelled
//     run emits nothing further; the event channel just closes.
//   • On Completed the assembled text is persisted as a conversation record.
//     Persistence failure is logged, not surfaced — the stream result stands.

use crate::atoms::constants::{MAX_STREAM_RETRIES, STREAM_IDLE_TIMEOUT_SECS};
use crate::atoms::traits::{ProviderError, StreamDelta};
use crate::atoms::types::{MemoryType, NewMemory, RunState, StreamEvent};
use crate::engine::http::retry_delay;
use crate::engine::memory::MemoryStore;
use crate::engine::providers::AnyProvider;
use log::{error, info, warn};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Message shown downstream when a run fails. Provider detail goes to the
/// log only.
const GENERIC_FAILURE: &str = "The assistant could not complete this response. Please try again.";

// ═══════════════════════════════════════════════════════════════════════════
// Cancellation
// ═══════════════════════════════════════════════════════════════════════════

/// Caller-held cancellation switch for one run. Cancelling is idempotent
/// and never blocks.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Run-side observer of the cancellation switch.
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken { rx: self.tx.subscribe() }
    }

    pub fn cancel(&self) {
        // send_replace stores the value even with no live receivers, so a
        // cancel issued before the run subscribes is not lost.
        self.tx.send_replace(true);
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when the handle fires. If the handle is dropped without
    /// firing, this pends forever — the run just proceeds to completion.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Orchestrator
// ═══════════════════════════════════════════════════════════════════════════

/// One streaming run's inputs.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub user_id: String,
    pub session_id: Option<String>,
    pub prompt: String,
}

pub struct StreamingOrchestrator {
    store: Arc<MemoryStore>,
    provider: Arc<AnyProvider>,
}

impl StreamingOrchestrator {
    pub fn new(store: Arc<MemoryStore>, provider: Arc<AnyProvider>) -> Self {
        Self { store, provider }
    }

    /// Spawn the run as its own task and hand back the event channel.
    /// Lazy, finite, non-restartable: the channel closes exactly once.
    pub fn spawn(&self, request: StreamRequest, cancel: CancelToken) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(64);
        let store = Arc::clone(&self.store);
        let provider = Arc::clone(&self.provider);
        tokio::spawn(async move {
            let state = run(&store, &provider, &request, cancel, &tx).await;
            info!(
                "[orchestrator] Run for user {} finished in state {:?}",
                request.user_id, state
            );
        });
        rx
    }
}

async fn run(
    store: &MemoryStore,
    provider: &AnyProvider,
    request: &StreamRequest,
    mut cancel: CancelToken,
    tx: &mpsc::Sender<StreamEvent>,
) -> RunState {
    let mut state = RunState::Pending;
    let mut assembled = String::new();
    let mut attempt: u32 = 0;

    'retry: loop {
        if cancel.is_cancelled() {
            return RunState::Cancelled;
        }

        let mut stream = match provider.stream_completion(&request.prompt).await {
            Ok(s) => s,
            Err(e) => {
                if e.is_transient() && attempt < MAX_STREAM_RETRIES {
                    let Some(delay) = backoff_or_cancel(attempt, e.retry_after(), &mut cancel).await
                    else {
                        return RunState::Cancelled;
                    };
                    attempt += 1;
                    warn!(
                        "[orchestrator] Transient provider error ({}) — retry {}/{} after {}ms",
                        e,
                        attempt,
                        MAX_STREAM_RETRIES,
                        delay.as_millis()
                    );
                    continue 'retry;
                }
                error!("[orchestrator] Provider error, giving up: {}", e);
                let _ = tx.send(StreamEvent::Error { message: GENERIC_FAILURE.into() }).await;
                return RunState::Failed;
            }
        };

        loop {
            let next = tokio::time::timeout(
                Duration::from_secs(STREAM_IDLE_TIMEOUT_SECS),
                stream.recv(),
            );
            let delta = tokio::select! {
                _ = cancel.cancelled() => {
                    // Dropping `stream` tears down the provider task and
                    // its HTTP connection.
                    return RunState::Cancelled;
                }
                result = next => match result {
                    Err(_) => {
                        error!(
                            "[orchestrator] No token for {}s — timing out",
                            STREAM_IDLE_TIMEOUT_SECS
                        );
                        let _ = tx
                            .send(StreamEvent::Error { message: GENERIC_FAILURE.into() })
                            .await;
                        return RunState::Failed;
                    }
                    Ok(maybe) => maybe,
                },
            };

            match delta {
                Some(Ok(StreamDelta::Token(text))) => {
                    state = RunState::Streaming;
                    assembled.push_str(&text);
                    if tx.send(StreamEvent::Token { text }).await.is_err() {
                        // Consumer hung up — same teardown as cancellation.
                        return RunState::Cancelled;
                    }
                }
                Some(Ok(StreamDelta::Done)) => {
                    return complete(store, request, assembled, tx).await;
                }
                Some(Err(e)) => {
                    if state == RunState::Pending && e.is_transient() && attempt < MAX_STREAM_RETRIES
                    {
                        drop(stream);
                        let Some(delay) =
                            backoff_or_cancel(attempt, e.retry_after(), &mut cancel).await
                        else {
                            return RunState::Cancelled;
                        };
                        attempt += 1;
                        warn!(
                            "[orchestrator] Stream error before first token ({}) — retry {}/{} after {}ms",
                            e,
                            attempt,
                            MAX_STREAM_RETRIES,
                            delay.as_millis()
                        );
                        continue 'retry;
                    }
                    error!("[orchestrator] Stream error, terminal: {}", e);
                    let _ = tx.send(StreamEvent::Error { message: GENERIC_FAILURE.into() }).await;
                    return RunState::Failed;
                }
                None => {
                    if state == RunState::Streaming {
                        // Channel closed after tokens were delivered:
                        // treated as a normal end of stream.
                        return complete(store, request, assembled, tx).await;
                    }
                    // Closed before any token — transient transport failure.
                    let e = ProviderError::Transport("stream closed before any token".into());
                    if attempt < MAX_STREAM_RETRIES {
                        let Some(delay) = backoff_or_cancel(attempt, None, &mut cancel).await
                        else {
                            return RunState::Cancelled;
                        };
                        attempt += 1;
                        warn!(
                            "[orchestrator] {} — retry {}/{} after {}ms",
                            e,
                            attempt,
                            MAX_STREAM_RETRIES,
                            delay.as_millis()
                        );
                        continue 'retry;
                    }
                    error!("[orchestrator] {} — retries exhausted", e);
                    let _ = tx.send(StreamEvent::Error { message: GENERIC_FAILURE.into() }).await;
                    return RunState::Failed;
                }
            }
        }
    }
}

/// Backoff before a retry, abandoned as soon as the run is cancelled.
/// `None` means the wait was interrupted by cancellation.
async fn backoff_or_cancel(
    attempt: u32,
    retry_after_secs: Option<u64>,
    cancel: &mut CancelToken,
) -> Option<Duration> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        delay = retry_delay(attempt, retry_after_secs) => Some(delay),
    }
}

/// Terminal success path: persist the assembled text, then emit `Complete`.
async fn complete(
    store: &MemoryStore,
    request: &StreamRequest,
    assembled: String,
    tx: &mpsc::Sender<StreamEvent>,
) -> RunState {
    let persist = store
        .append(
            &request.user_id,
            MemoryType::Conversation,
            NewMemory {
                metadata: json!({ "role": "assistant" }),
                session_id: request.session_id.clone(),
                ..NewMemory::text(assembled.clone())
            },
        )
        .await;
    if let Err(e) = persist {
        // Degraded persistence: the user still gets their answer.
        warn!("[orchestrator] Failed to persist completed response: {}", e);
    }

    let _ = tx.send(StreamEvent::Complete { text: assembled }).await;
    RunState::Completed
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
