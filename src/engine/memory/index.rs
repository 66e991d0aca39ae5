// ── Mentor Memory: Similarity Index ────────────────────────────────────────
//
// In-memory nearest-neighbor index over one memory type, keyed by user.
// Derived, rebuildable state: always a pure function of the non-superseded
// rows for its type. Crash recovery is rebuild-from-rows, never
// repair-in-place — the index is never the source of truth.
//
// Brute-force cosine scan. Per-user record counts here are thousands, not
// millions; a linear scan over contiguous vectors is fast enough and keeps
// the rebuild invariant trivial to uphold.

use crate::atoms::types::{ContextItem, MemoryType};
use crate::engine::embedding::cosine_similarity;
use std::collections::HashMap;

/// One indexed record. Carries enough to build a `ContextItem` without
/// touching the database, so queries still work if SQLite is busy.
#[derive(Debug, Clone)]
pub(crate) struct IndexEntry {
    pub record_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub created_at: String,
    pub session_id: Option<String>,
}

/// Nearest-neighbor index for a single memory type.
#[derive(Debug)]
pub(crate) struct SimilarityIndex {
    memory_type: MemoryType,
    /// user_id → entries, in insertion (append) order.
    entries: HashMap<String, Vec<IndexEntry>>,
}

impl SimilarityIndex {
    pub fn new(memory_type: MemoryType) -> Self {
        Self { memory_type, entries: HashMap::new() }
    }

    pub fn insert(&mut self, user_id: &str, entry: IndexEntry) {
        self.entries.entry(user_id.to_string()).or_default().push(entry);
    }

    /// Remove entries by record id (profile supersession).
    pub fn remove(&mut self, user_id: &str, record_id: &str) {
        if let Some(list) = self.entries.get_mut(user_id) {
            list.retain(|e| e.record_id != record_id);
        }
    }

    /// Drop all entries (prelude to a rebuild).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(|v| v.len()).sum()
    }

    /// Cosine nearest-neighbor search over one user's entries.
    ///
    /// Results are filtered to `score >= min_score`, sorted descending by
    /// score with ties broken by record id, and truncated to `top_k`.
    /// `session_filter` restricts conversation entries to one session.
    pub fn search(
        &self,
        user_id: &str,
        embedding: &[f32],
        top_k: usize,
        min_score: f64,
        session_filter: Option<&str>,
    ) -> Vec<ContextItem> {
        let Some(list) = self.entries.get(user_id) else {
            return Vec::new();
        };

        let mut hits: Vec<ContextItem> = list
            .iter()
            .filter(|e| match session_filter {
                Some(sid) => e.session_id.as_deref() == Some(sid),
                None => true,
            })
            .filter_map(|e| {
                let score = cosine_similarity(embedding, &e.embedding);
                if score >= min_score {
                    Some(ContextItem {
                        record_id: e.record_id.clone(),
                        content: e.content.clone(),
                        memory_type: self.memory_type,
                        similarity_score: score,
                        timestamp: e.created_at.clone(),
                    })
                } else {
                    None
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.record_id.cmp(&b.record_id))
        });
        hits.truncate(top_k);
        hits
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, embedding: Vec<f32>, session: Option<&str>) -> IndexEntry {
        IndexEntry {
            record_id: id.to_string(),
            content: format!("content-{}", id),
            embedding,
            created_at: "2026-01-01T00:00:00Z".into(),
            session_id: session.map(|s| s.to_string()),
        }
    }

    #[test]
    fn search_is_user_scoped() {
        let mut idx = SimilarityIndex::new(MemoryType::Learning);
        idx.insert("alice", entry("a1", vec![1.0, 0.0], None));
        idx.insert("bob", entry("b1", vec![1.0, 0.0], None));

        let hits = idx.search("alice", &[1.0, 0.0], 10, 0.5, None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record_id, "a1");
    }

    #[test]
    fn search_filters_by_min_score_and_sorts_descending() {
        let mut idx = SimilarityIndex::new(MemoryType::Learning);
        idx.insert("u", entry("exact", vec![1.0, 0.0], None));
        idx.insert("u", entry("near", vec![0.9, 0.4], None));
        idx.insert("u", entry("orthogonal", vec![0.0, 1.0], None));

        let hits = idx.search("u", &[1.0, 0.0], 10, 0.7, None);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record_id, "exact");
        assert!((hits[0].similarity_score - 1.0).abs() < 1e-6);
        assert!(hits[1].similarity_score >= 0.7);
    }

    #[test]
    fn ties_break_by_record_id() {
        let mut idx = SimilarityIndex::new(MemoryType::Project);
        idx.insert("u", entry("b", vec![1.0, 0.0], None));
        idx.insert("u", entry("a", vec![1.0, 0.0], None));

        let hits = idx.search("u", &[1.0, 0.0], 10, 0.0, None);
        assert_eq!(hits[0].record_id, "a");
        assert_eq!(hits[1].record_id, "b");
    }

    #[test]
    fn session_filter_restricts_conversation_entries() {
        let mut idx = SimilarityIndex::new(MemoryType::Conversation);
        idx.insert("u", entry("old", vec![1.0, 0.0], Some("s1")));
        idx.insert("u", entry("new", vec![1.0, 0.0], Some("s2")));

        let hits = idx.search("u", &[1.0, 0.0], 10, 0.0, Some("s2"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record_id, "new");
    }

    #[test]
    fn top_k_truncates() {
        let mut idx = SimilarityIndex::new(MemoryType::Learning);
        for i in 0..10 {
            idx.insert("u", entry(&format!("r{}", i), vec![1.0, 0.0], None));
        }
        let hits = idx.search("u", &[1.0, 0.0], 5, 0.0, None);
        assert_eq!(hits.len(), 5);
    }

    #[test]
    fn remove_drops_entry() {
        let mut idx = SimilarityIndex::new(MemoryType::Profile);
        idx.insert("u", entry("p1", vec![1.0], None));
        idx.insert("u", entry("p2", vec![1.0], None));
        idx.remove("u", "p1");
        assert_eq!(idx.len(), 1);
        let hits = idx.search("u", &[1.0], 10, 0.0, None);
        assert_eq!(hits[0].record_id, "p2");
    }
}
