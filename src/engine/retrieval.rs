// ── Mentor Engine: Context Retrieval ───────────────────────────────────────
//
// Pulls relevant memory into the prompt. Per request:
//   1. embed the query message,
//   2. search each memory type the active mode cares about,
//   3. re-rank by composite score (similarity × recency decay),
//   4. keep the best CONTEXT_LIMIT items overall.
//
// Read-only: retrieval never writes memory, and every failure along the way
// degrades to an empty context rather than failing the request.

use crate::atoms::constants::{
    CONTEXT_LIMIT, MIN_SIMILARITY, RECENCY_HALF_LIFE_SECS, RETRIEVAL_TOP_K,
};
use crate::atoms::traits::EmbeddingProvider;
use crate::atoms::types::{ContextItem, MemoryType, Mode};
use crate::engine::memory::MemoryStore;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::sync::Arc;

/// Which memory types feed context for a given mode. Conversation retrieval
/// is always scoped to the current session.
pub fn memory_types_for_mode(mode: Mode) -> &'static [MemoryType] {
    match mode {
        Mode::Tutor | Mode::Explainer => &[MemoryType::Learning, MemoryType::Conversation],
        Mode::Debugger => &[MemoryType::Project, MemoryType::Conversation],
        Mode::ProjectBuilder => &[MemoryType::Project, MemoryType::Profile],
        Mode::LearningPlanner => &[MemoryType::Learning, MemoryType::Profile],
    }
}

pub struct ContextRetriever {
    store: Arc<MemoryStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl ContextRetriever {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        let embedder = store.embedder();
        Self { store, embedder }
    }

    /// Retrieve the best context for a message under the given mode.
    /// Convenience over `get_context` with the mode's memory types.
    pub async fn retrieve(
        &self,
        user_id: &str,
        mode: Mode,
        message: &str,
        session_id: Option<&str>,
    ) -> Vec<ContextItem> {
        self.get_context(user_id, message, memory_types_for_mode(mode), session_id)
            .await
    }

    /// Embed `query_text` once and search each given memory type.
    ///
    /// Infallible by design: an embedding failure is logged and yields an
    /// empty context, and the caller proceeds without retrieved memory.
    pub async fn get_context(
        &self,
        user_id: &str,
        query_text: &str,
        memory_types: &[MemoryType],
        session_id: Option<&str>,
    ) -> Vec<ContextItem> {
        let query = match self.embedder.embed(query_text).await {
            Ok(v) => v,
            Err(e) => {
                warn!("[retrieval] Query embedding failed ({}) — proceeding without context", e);
                return Vec::new();
            }
        };

        let now = Utc::now();
        let mut candidates: Vec<(f64, ContextItem)> = Vec::new();

        for &memory_type in memory_types {
            let session_filter = match memory_type {
                MemoryType::Conversation => session_id,
                _ => None,
            };
            for item in self.store.query(
                user_id,
                memory_type,
                &query,
                RETRIEVAL_TOP_K,
                MIN_SIMILARITY,
                session_filter,
            ) {
                let composite = composite_score(&item, now);
                candidates.push((composite, item));
            }
        }

        // Composite rank across all types, ties broken by record id so the
        // same inputs always produce the same context.
        candidates.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.record_id.cmp(&b.1.record_id))
        });
        candidates.truncate(CONTEXT_LIMIT);

        debug!("[retrieval] user={} → {} context item(s)", user_id, candidates.len());
        candidates.into_iter().map(|(_, item)| item).collect()
    }
}

/// similarity × 0.5^(age / half-life). An unparseable timestamp gets zero
/// recency weight rather than infinite freshness.
fn composite_score(item: &ContextItem, now: DateTime<Utc>) -> f64 {
    item.similarity_score * recency_weight(&item.timestamp, now)
}

fn recency_weight(timestamp: &str, now: DateTime<Utc>) -> f64 {
    let Ok(created) = DateTime::parse_from_rfc3339(timestamp) else {
        warn!("[retrieval] Unparseable timestamp {:?}", timestamp);
        return 0.0;
    };
    let age_secs = (now - created.with_timezone(&Utc)).num_seconds().max(0) as f64;
    0.5_f64.powf(age_secs / RECENCY_HALF_LIFE_SECS)
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::NewMemory;
    use crate::engine::embedding::HashEmbedder;
    use chrono::Duration;

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::open_in_memory(Arc::new(HashEmbedder::new())).unwrap())
    }

    fn item(id: &str, score: f64, timestamp: &str) -> ContextItem {
        ContextItem {
            record_id: id.into(),
            content: "x".into(),
            memory_type: MemoryType::Learning,
            similarity_score: score,
            timestamp: timestamp.into(),
        }
    }

    #[test]
    fn mode_mapping_is_exhaustive_and_scoped() {
        assert_eq!(
            memory_types_for_mode(Mode::Debugger),
            &[MemoryType::Project, MemoryType::Conversation]
        );
        assert_eq!(
            memory_types_for_mode(Mode::LearningPlanner),
            &[MemoryType::Learning, MemoryType::Profile]
        );
        assert_eq!(
            memory_types_for_mode(Mode::Tutor),
            memory_types_for_mode(Mode::Explainer)
        );
    }

    #[test]
    fn fresh_record_keeps_full_similarity() {
        let now = Utc::now();
        let it = item("a", 0.9, &now.to_rfc3339());
        assert!((composite_score(&it, now) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn one_half_life_halves_the_score() {
        let now = Utc::now();
        let week_ago = (now - Duration::days(7)).to_rfc3339();
        let it = item("a", 0.8, &week_ago);
        let composite = composite_score(&it, now);
        assert!((composite - 0.4).abs() < 0.01, "composite = {}", composite);
    }

    #[test]
    fn recency_can_reorder_equal_similarity() {
        let now = Utc::now();
        let fresh = item("fresh", 0.85, &now.to_rfc3339());
        let stale = item("stale", 0.95, &(now - Duration::days(30)).to_rfc3339());
        // Older but more similar loses to newer and slightly less similar.
        assert!(composite_score(&fresh, now) > composite_score(&stale, now));
    }

    #[test]
    fn bad_timestamp_zeroes_recency() {
        let now = Utc::now();
        let it = item("a", 1.0, "not-a-timestamp");
        assert_eq!(composite_score(&it, now), 0.0);
    }

    #[tokio::test]
    async fn retrieve_returns_at_most_context_limit() {
        let store = store();
        for i in 0..8 {
            store
                .append(
                    "u1",
                    MemoryType::Learning,
                    NewMemory::text(format!("rust ownership and borrowing note {}", i)),
                )
                .await
                .unwrap();
        }

        let retriever = ContextRetriever::new(Arc::clone(&store));
        let items = retriever
            .retrieve("u1", Mode::Tutor, "rust ownership and borrowing note 3", None)
            .await;
        assert!(!items.is_empty());
        assert!(items.len() <= CONTEXT_LIMIT);
    }

    #[tokio::test]
    async fn retrieve_only_touches_mode_relevant_types() {
        let store = store();
        store
            .append("u1", MemoryType::Learning, NewMemory::text("closures capture environment"))
            .await
            .unwrap();
        store
            .append("u1", MemoryType::Project, NewMemory::text("closures capture environment"))
            .await
            .unwrap();

        let retriever = ContextRetriever::new(Arc::clone(&store));
        // Tutor mode reads learning + conversation — the project record with
        // identical content must not appear.
        let items = retriever
            .retrieve("u1", Mode::Tutor, "closures capture environment", None)
            .await;
        assert!(!items.is_empty());
        assert!(items.iter().all(|i| i.memory_type == MemoryType::Learning));
    }

    #[tokio::test]
    async fn empty_store_yields_empty_context() {
        let retriever = ContextRetriever::new(store());
        let items = retriever.retrieve("u1", Mode::Debugger, "my loop has a bug", None).await;
        assert!(items.is_empty());
    }
}
