// ── Mentor Memory: Database Schema ─────────────────────────────────────────
//
// Tables:
//   - memories: append-only per-user, per-type records with embedding BLOBs
//   - sessions: conversation scopes (one active per user)
//
// All statements are idempotent (CREATE IF NOT EXISTS); migrations run at
// store open. The similarity index is NOT persisted — it is derived state,
// rebuilt from these rows (see index.rs).

use crate::atoms::error::EngineResult;
use log::info;
use rusqlite::Connection;

/// Run schema migrations. Called from `MemoryStore::open*`.
pub fn run_migrations(conn: &Connection) -> EngineResult<()> {
    info!("[memory] Running schema migrations");
    conn.execute_batch(MEMORY_SCHEMA)?;
    info!("[memory] Schema migrations complete");
    Ok(())
}

const MEMORY_SCHEMA: &str = "
    -- ═══════════════════════════════════════════════════════════════
    -- Memories (append-only)
    -- Rows are never mutated after insert; profile rows are logically
    -- superseded (superseded = 1) and kept for audit.
    -- ═══════════════════════════════════════════════════════════════
    CREATE TABLE IF NOT EXISTS memories (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        memory_type TEXT NOT NULL,
        content TEXT NOT NULL,

        -- Embedding (f32 array serialized as little-endian BLOB)
        embedding BLOB NOT NULL,

        -- Free-form JSON object (role, skill tags, source…)
        metadata TEXT NOT NULL DEFAULT '{}',

        -- Session scope for conversation records
        session_id TEXT,

        -- Learning-record scores, both in [0,1]
        comprehension_level REAL,
        complexity_level REAL,

        superseded INTEGER NOT NULL DEFAULT 0,

        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_memories_user_type
        ON memories(user_id, memory_type);
    CREATE INDEX IF NOT EXISTS idx_memories_created_at
        ON memories(created_at);
    CREATE INDEX IF NOT EXISTS idx_memories_session
        ON memories(session_id);

    -- ═══════════════════════════════════════════════════════════════
    -- Sessions
    -- Starting a new session deactivates the previous one; old
    -- conversation rows stay in place but become inert for retrieval.
    -- ═══════════════════════════════════════════════════════════════
    CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_sessions_user_active
        ON sessions(user_id, active);
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        // Table exists and accepts a row
        conn.execute(
            "INSERT INTO memories (id, user_id, memory_type, content, embedding, created_at)
             VALUES ('m1', 'u1', 'learning', 'x', x'00000000', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
    }
}
