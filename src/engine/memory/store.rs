// ── Mentor Memory: Store ───────────────────────────────────────────────────
//
// The only owner of MemoryRecord rows. Records are append-only facts;
// `profile` records are logically superseded by a newer record rather than
// mutated in place (old rows kept for audit, excluded from the index).
//
// Concurrency:
//   • SQLite connection behind a parking_lot::Mutex — row inserts are single
//     statements under the lock, which gives per-user append linearizability.
//   • Similarity indexes behind a parking_lot::RwLock — entries are inserted
//     whole, so concurrent queries never observe a half-written record.
//   • The embedding call happens before any lock is taken; an embedding
//     failure aborts the whole append (no record without an embedding).

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::EmbeddingProvider;
use crate::atoms::types::{
    ContextItem, HistoryMessage, MemoryRecord, MemoryType, NewMemory, Role, Session,
};
use crate::engine::embedding::{bytes_to_f32_vec, f32_vec_to_bytes};
use crate::engine::memory::index::{IndexEntry, SimilarityIndex};
use crate::engine::memory::schema::run_migrations;
use chrono::Utc;
use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

pub struct MemoryStore {
    conn: Mutex<Connection>,
    indexes: RwLock<HashMap<MemoryType, SimilarityIndex>>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl MemoryStore {
    /// Open (or create) the store at `path` and rebuild all indexes from
    /// the stored rows.
    pub fn open(path: &Path, embedder: Arc<dyn EmbeddingProvider>) -> EngineResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, embedder)
    }

    /// In-memory store, used by tests and ephemeral deployments.
    pub fn open_in_memory(embedder: Arc<dyn EmbeddingProvider>) -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, embedder)
    }

    fn from_connection(conn: Connection, embedder: Arc<dyn EmbeddingProvider>) -> EngineResult<Self> {
        run_migrations(&conn)?;
        let store = Self {
            conn: Mutex::new(conn),
            indexes: RwLock::new(
                MemoryType::ALL
                    .into_iter()
                    .map(|mt| (mt, SimilarityIndex::new(mt)))
                    .collect(),
            ),
            embedder,
        };
        for mt in MemoryType::ALL {
            store.rebuild_index(mt)?;
        }
        Ok(store)
    }

    // ── Append ─────────────────────────────────────────────────────────

    /// Append a record: embed, persist the row, insert into the type's
    /// index. For `profile`, the user's previous profile record is marked
    /// superseded (kept for audit, dropped from the index).
    pub async fn append(
        &self,
        user_id: &str,
        memory_type: MemoryType,
        new: NewMemory,
    ) -> EngineResult<MemoryRecord> {
        // Embed first — outside any lock, and a failure aborts the append.
        let embedding = self.embedder.embed(&new.content).await?;
        let expected_dim = self.embedder.dimension();
        if expected_dim > 0 && embedding.len() != expected_dim {
            return Err(EngineError::embedding(format!(
                "embedder returned {} dims, expected {}",
                embedding.len(),
                expected_dim
            )));
        }

        let record = MemoryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            memory_type,
            content: new.content,
            embedding,
            metadata: new.metadata,
            session_id: new.session_id,
            created_at: Utc::now().to_rfc3339(),
            comprehension_level: new.comprehension_level,
            complexity_level: new.complexity_level,
        };

        {
            let conn = self.conn.lock();

            let superseded_ids: Vec<String> = if memory_type == MemoryType::Profile {
                let mut stmt = conn.prepare(
                    "SELECT id FROM memories
                     WHERE user_id = ?1 AND memory_type = 'profile' AND superseded = 0",
                )?;
                let ids: Vec<String> = stmt
                    .query_map(params![user_id], |row| row.get(0))?
                    .filter_map(|r| r.ok())
                    .collect();
                conn.execute(
                    "UPDATE memories SET superseded = 1
                     WHERE user_id = ?1 AND memory_type = 'profile' AND superseded = 0",
                    params![user_id],
                )?;
                ids
            } else {
                Vec::new()
            };

            conn.execute(
                "INSERT INTO memories (id, user_id, memory_type, content, embedding, metadata,
                                       session_id, comprehension_level, complexity_level, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.id,
                    record.user_id,
                    record.memory_type.as_str(),
                    record.content,
                    f32_vec_to_bytes(&record.embedding),
                    record.metadata.to_string(),
                    record.session_id,
                    record.comprehension_level,
                    record.complexity_level,
                    record.created_at,
                ],
            )?;

            // Index update happens before the connection lock is released.
            // Lock order is conn → index, the same as rebuild_index, so a
            // rebuild can never interleave between a row and its entry.
            let mut indexes = self.indexes.write();
            if let Some(index) = indexes.get_mut(&memory_type) {
                for id in &superseded_ids {
                    index.remove(user_id, id);
                }
                index.insert(
                    user_id,
                    IndexEntry {
                        record_id: record.id.clone(),
                        content: record.content.clone(),
                        embedding: record.embedding.clone(),
                        created_at: record.created_at.clone(),
                        session_id: record.session_id.clone(),
                    },
                );
            }
        }

        Ok(record)
    }

    // ── Query ──────────────────────────────────────────────────────────

    /// Nearest-neighbor search restricted to the user's own records of one
    /// type. Degrades to an empty result (never an error) so the rest of
    /// the pipeline proceeds with no retrieved context.
    pub fn query(
        &self,
        user_id: &str,
        memory_type: MemoryType,
        embedding: &[f32],
        top_k: usize,
        min_score: f64,
        session_id: Option<&str>,
    ) -> Vec<ContextItem> {
        let indexes = self.indexes.read();
        match indexes.get(&memory_type) {
            Some(index) => index.search(user_id, embedding, top_k, min_score, session_id),
            None => {
                warn!("[memory] No index for type {} — returning empty", memory_type);
                Vec::new()
            }
        }
    }

    // ── Index maintenance ──────────────────────────────────────────────

    /// Recompute the similarity index for a type from stored rows.
    /// Recovery path after index loss; returns the number of entries.
    pub fn rebuild_index(&self, memory_type: MemoryType) -> EngineResult<usize> {
        // The connection lock is held from the row scan through the index
        // swap (conn → index, same order as append): the published index is
        // always a pure function of the rows it was built from.
        let conn = self.conn.lock();
        let mut fresh = SimilarityIndex::new(memory_type);
        {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, content, embedding, session_id, created_at
                 FROM memories
                 WHERE memory_type = ?1 AND superseded = 0
                 ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt.query_map(params![memory_type.as_str()], |row| {
                let user_id: String = row.get(1)?;
                let blob: Vec<u8> = row.get(3)?;
                Ok((
                    user_id,
                    IndexEntry {
                        record_id: row.get(0)?,
                        content: row.get(2)?,
                        embedding: bytes_to_f32_vec(&blob),
                        session_id: row.get(4)?,
                        created_at: row.get(5)?,
                    },
                ))
            })?;
            for row in rows {
                let (user_id, entry) = row?;
                fresh.insert(&user_id, entry);
            }
        }

        let count = fresh.len();
        self.indexes.write().insert(memory_type, fresh);
        info!("[memory] Rebuilt {} index: {} entries", memory_type, count);
        Ok(count)
    }

    // ── Sessions ───────────────────────────────────────────────────────

    /// Start a new session for the user. The previous session is
    /// deactivated — its conversation memory becomes inert but is kept.
    pub fn start_session(&self, user_id: &str) -> EngineResult<Session> {
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now().to_rfc3339(),
        };
        let conn = self.conn.lock();
        conn.execute("UPDATE sessions SET active = 0 WHERE user_id = ?1", params![user_id])?;
        conn.execute(
            "INSERT INTO sessions (id, user_id, active, created_at) VALUES (?1, ?2, 1, ?3)",
            params![session.id, session.user_id, session.created_at],
        )?;
        info!("[memory] Started session {} for user {}", session.id, user_id);
        Ok(session)
    }

    /// The user's currently active session, if any.
    pub fn active_session(&self, user_id: &str) -> EngineResult<Option<Session>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, created_at FROM sessions
             WHERE user_id = ?1 AND active = 1
             ORDER BY created_at DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![user_id], |row| {
            Ok(Session { id: row.get(0)?, user_id: row.get(1)?, created_at: row.get(2)? })
        })?;
        Ok(rows.next().transpose()?)
    }

    // ── Read-side helpers ──────────────────────────────────────────────

    /// Recent conversation turns for a session, oldest first.
    /// Role comes from `metadata.role`; unknown roles default to user.
    pub fn recent_conversation(
        &self,
        user_id: &str,
        session_id: &str,
        limit: usize,
    ) -> EngineResult<Vec<HistoryMessage>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT content, metadata FROM memories
             WHERE user_id = ?1 AND memory_type = 'conversation' AND session_id = ?2
             ORDER BY created_at DESC, id DESC LIMIT ?3",
        )?;
        let mut turns: Vec<HistoryMessage> = stmt
            .query_map(params![user_id, session_id, limit as i64], |row| {
                let content: String = row.get(0)?;
                let metadata: String = row.get(1)?;
                Ok((content, metadata))
            })?
            .filter_map(|r| r.ok())
            .map(|(content, metadata)| {
                let role = serde_json::from_str::<serde_json::Value>(&metadata)
                    .ok()
                    .and_then(|m| m["role"].as_str().map(|s| s.to_string()));
                HistoryMessage {
                    role: match role.as_deref() {
                        Some("assistant") => Role::Assistant,
                        _ => Role::User,
                    },
                    content,
                }
            })
            .collect();
        turns.reverse();
        Ok(turns)
    }

    /// Content of the user's current (non-superseded) profile record.
    pub fn latest_profile(&self, user_id: &str) -> EngineResult<Option<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT content FROM memories
             WHERE user_id = ?1 AND memory_type = 'profile' AND superseded = 0
             ORDER BY created_at DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
        Ok(rows.next().transpose()?)
    }

    /// All learning records for a user, oldest first. Read path for the
    /// proficiency engine.
    pub fn learning_records(&self, user_id: &str) -> EngineResult<Vec<MemoryRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, memory_type, content, embedding, metadata,
                    session_id, comprehension_level, complexity_level, created_at
             FROM memories
             WHERE user_id = ?1 AND memory_type = 'learning'
             ORDER BY created_at ASC, id ASC",
        )?;
        let records = stmt
            .query_map(params![user_id], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Total stored rows for a user and type (superseded rows included —
    /// they remain part of the audit trail).
    pub fn record_count(&self, user_id: &str, memory_type: MemoryType) -> EngineResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE user_id = ?1 AND memory_type = ?2",
            params![user_id, memory_type.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// The embedder this store appends with. Shared with the retriever so
    /// query and record embeddings come from the same space.
    pub fn embedder(&self) -> Arc<dyn EmbeddingProvider> {
        Arc::clone(&self.embedder)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let type_tag: String = row.get(2)?;
    let blob: Vec<u8> = row.get(4)?;
    let metadata_raw: String = row.get(5)?;
    Ok(MemoryRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        memory_type: MemoryType::parse(&type_tag).unwrap_or(MemoryType::Conversation),
        content: row.get(3)?,
        embedding: bytes_to_f32_vec(&blob),
        metadata: serde_json::from_str(&metadata_raw).unwrap_or(serde_json::Value::Null),
        session_id: row.get(6)?,
        comprehension_level: row.get(7)?,
        complexity_level: row.get(8)?,
        created_at: row.get(9)?,
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
