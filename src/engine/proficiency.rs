// ── Mentor Engine: Proficiency Scoring ─────────────────────────────────────
//
// Derived skill mastery, recomputed from learning records on every read —
// never stored, so it can't drift from the records it summarizes.
//
//   proficiency = clamp(0.3·frequency + 0.2·recency
//                     + 0.3·complexity + 0.2·comprehension, 0, 1)
//
//   frequency     = min(count / 100, 1)
//   recency       = mean(0.5^(age / 14d))
//   complexity    = mean(complexity_level), missing fields skipped
//   comprehension = mean(comprehension_level), missing fields skipped

use crate::atoms::constants::{
    FREQUENCY_SATURATION, PROFICIENCY_HALF_LIFE_SECS, W_COMPLEXITY, W_COMPREHENSION, W_FREQUENCY,
    W_RECENCY,
};
use crate::atoms::error::EngineResult;
use crate::atoms::types::{MemoryRecord, SkillScore};
use crate::engine::memory::MemoryStore;
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct ProficiencyEngine {
    store: Arc<MemoryStore>,
}

impl ProficiencyEngine {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Proficiency for one skill. Zero matching records is not an error —
    /// it scores 0 with no `last_practiced`.
    pub fn score(&self, user_id: &str, skill: &str) -> EngineResult<SkillScore> {
        let records = self.store.learning_records(user_id)?;
        let matching: Vec<&MemoryRecord> =
            records.iter().filter(|r| record_matches_skill(r, skill)).collect();
        Ok(score_records(skill, &matching, Utc::now()))
    }

    /// Scores for every distinct skill tag the user's learning records
    /// carry, sorted by skill name.
    pub fn score_all(&self, user_id: &str) -> EngineResult<Vec<SkillScore>> {
        let records = self.store.learning_records(user_id)?;
        let skills: BTreeSet<String> =
            records.iter().flat_map(|r| skill_tags(r)).collect();

        let now = Utc::now();
        let scores = skills
            .into_iter()
            .map(|skill| {
                let matching: Vec<&MemoryRecord> =
                    records.iter().filter(|r| record_matches_skill(r, &skill)).collect();
                score_records(&skill, &matching, now)
            })
            .collect();
        Ok(scores)
    }
}

/// Skill tags on one record: `metadata.skill` plus every `metadata.tags`
/// entry.
fn skill_tags(record: &MemoryRecord) -> Vec<String> {
    let mut tags = Vec::new();
    if let Some(skill) = record.metadata["skill"].as_str() {
        tags.push(skill.to_string());
    }
    if let Some(list) = record.metadata["tags"].as_array() {
        tags.extend(list.iter().filter_map(|t| t.as_str().map(|s| s.to_string())));
    }
    tags
}

fn record_matches_skill(record: &MemoryRecord, skill: &str) -> bool {
    skill_tags(record).iter().any(|t| t == skill)
}

fn score_records(skill: &str, records: &[&MemoryRecord], now: DateTime<Utc>) -> SkillScore {
    if records.is_empty() {
        return SkillScore { skill: skill.to_string(), proficiency: 0.0, last_practiced: None };
    }

    let frequency = (records.len() as f64 / FREQUENCY_SATURATION).min(1.0);

    let recency = mean(records.iter().map(|r| {
        let age = age_secs(&r.created_at, now);
        0.5_f64.powf(age / PROFICIENCY_HALF_LIFE_SECS)
    }));

    // Missing level fields are skipped from the mean; all-missing scores 0.
    let complexity = mean_of_present(records.iter().map(|r| r.complexity_level));
    let comprehension = mean_of_present(records.iter().map(|r| r.comprehension_level));

    let proficiency = (W_FREQUENCY * frequency
        + W_RECENCY * recency
        + W_COMPLEXITY * complexity
        + W_COMPREHENSION * comprehension)
        .clamp(0.0, 1.0);

    let last_practiced = records.iter().map(|r| r.created_at.clone()).max();

    debug!(
        "[proficiency] skill={} n={} freq={:.2} rec={:.2} cplx={:.2} comp={:.2} → {:.2}",
        skill,
        records.len(),
        frequency,
        recency,
        complexity,
        comprehension,
        proficiency
    );

    SkillScore { skill: skill.to_string(), proficiency, last_practiced }
}

fn age_secs(timestamp: &str, now: DateTime<Utc>) -> f64 {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|t| (now - t.with_timezone(&Utc)).num_seconds().max(0) as f64)
        .unwrap_or(f64::INFINITY)
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

fn mean_of_present(values: impl Iterator<Item = Option<f64>>) -> f64 {
    mean(values.flatten())
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::{MemoryType, NewMemory};
    use crate::engine::embedding::HashEmbedder;
    use chrono::Duration;
    use serde_json::json;

    fn engine() -> (Arc<MemoryStore>, ProficiencyEngine) {
        let store = Arc::new(MemoryStore::open_in_memory(Arc::new(HashEmbedder::new())).unwrap());
        let engine = ProficiencyEngine::new(Arc::clone(&store));
        (store, engine)
    }

    fn record(skill: &str, age_days: i64, complexity: Option<f64>, comprehension: Option<f64>) -> MemoryRecord {
        MemoryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: "u1".into(),
            memory_type: MemoryType::Learning,
            content: "practiced".into(),
            embedding: vec![1.0],
            metadata: json!({ "skill": skill }),
            session_id: None,
            created_at: (Utc::now() - Duration::days(age_days)).to_rfc3339(),
            comprehension_level: comprehension,
            complexity_level: complexity,
        }
    }

    #[test]
    fn zero_records_scores_zero() {
        let (_store, engine) = engine();
        let score = engine.score("u1", "recursion").unwrap();
        assert_eq!(score.proficiency, 0.0);
        assert!(score.last_practiced.is_none());
    }

    #[test]
    fn fresh_complete_record_scores_each_component() {
        let r = record("recursion", 0, Some(0.8), Some(0.6));
        let score = score_records("recursion", &[&r], Utc::now());
        // freq = 1/100, recency ≈ 1, complexity = 0.8, comprehension = 0.6
        let expected = 0.3 * 0.01 + 0.2 * 1.0 + 0.3 * 0.8 + 0.2 * 0.6;
        assert!((score.proficiency - expected).abs() < 0.01, "got {}", score.proficiency);
        assert!(score.last_practiced.is_some());
    }

    #[test]
    fn recency_decays_with_half_life() {
        let fresh = record("s", 0, None, None);
        let stale = record("s", 14, None, None);
        let now = Utc::now();
        let fresh_score = score_records("s", &[&fresh], now).proficiency;
        let stale_score = score_records("s", &[&stale], now).proficiency;
        // Only the recency component differs: W_RECENCY·(1 − 0.5) apart.
        assert!((fresh_score - stale_score - W_RECENCY * 0.5).abs() < 0.01);
    }

    #[test]
    fn missing_level_fields_are_skipped_from_means() {
        let with = record("s", 0, Some(1.0), None);
        let without = record("s", 0, None, None);
        let score = score_records("s", &[&with, &without], Utc::now());
        // complexity mean over the one present value = 1.0; comprehension
        // all-missing = 0.
        let expected = 0.3 * 0.02 + 0.2 * 1.0 + 0.3 * 1.0 + 0.2 * 0.0;
        assert!((score.proficiency - expected).abs() < 0.01, "got {}", score.proficiency);
    }

    #[test]
    fn frequency_saturates_at_cap() {
        let records: Vec<MemoryRecord> =
            (0..150).map(|_| record("s", 0, Some(1.0), Some(1.0))).collect();
        let refs: Vec<&MemoryRecord> = records.iter().collect();
        let score = score_records("s", &refs, Utc::now());
        // All components at 1.0 → clamp holds the total at 1.0.
        assert!((score.proficiency - 1.0).abs() < 0.01);
    }

    #[test]
    fn tags_array_also_matches() {
        let mut r = record("unused", 0, None, None);
        r.metadata = json!({ "tags": ["ownership", "borrowing"] });
        assert!(record_matches_skill(&r, "borrowing"));
        assert!(!record_matches_skill(&r, "lifetimes"));
    }

    #[tokio::test]
    async fn score_reads_through_the_store() {
        let (store, engine) = engine();
        store
            .append(
                "u1",
                MemoryType::Learning,
                NewMemory {
                    metadata: json!({ "skill": "iterators" }),
                    comprehension_level: Some(0.9),
                    complexity_level: Some(0.7),
                    ..NewMemory::text("practiced iterator adapters")
                },
            )
            .await
            .unwrap();

        let score = engine.score("u1", "iterators").unwrap();
        assert!(score.proficiency > 0.0);
        assert_eq!(engine.score("u2", "iterators").unwrap().proficiency, 0.0);
    }

    #[tokio::test]
    async fn score_all_covers_every_tag() {
        let (store, engine) = engine();
        for (skill, text) in [("closures", "closures practice"), ("traits", "trait objects")] {
            store
                .append(
                    "u1",
                    MemoryType::Learning,
                    NewMemory {
                        metadata: json!({ "skill": skill }),
                        ..NewMemory::text(text)
                    },
                )
                .await
                .unwrap();
        }

        let scores = engine.score_all("u1").unwrap();
        let skills: Vec<&str> = scores.iter().map(|s| s.skill.as_str()).collect();
        assert_eq!(skills, vec!["closures", "traits"]);
        assert!(scores.iter().all(|s| s.proficiency > 0.0));
    }
}
