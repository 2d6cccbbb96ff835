// ── Engram: Database Schema ─────────────────────────────────────────────────
//
// Tables:
//   - memory_records: every memory with scoring, lifecycle and OCC columns
//   - memory_records_fts: FTS5 mirror of content for keyword candidates
//   - concepts / memory_concepts: the concept graph (many-to-many)
//   - memory_audit_log: append-only audit trail
//
// All statements are idempotent (CREATE IF NOT EXISTS).

use crate::atoms::error::EngineResult;
use log::info;
use rusqlite::Connection;

/// Run migrations on an open connection. Safe to call on every open.
pub fn run_migrations(conn: &Connection) -> EngineResult<()> {
    info!("[engram:sqlite] Running schema migrations");

    conn.execute_batch(SCHEMA)?;

    info!("[engram:sqlite] Schema migrations complete");
    Ok(())
}

const SCHEMA: &str = "
    -- ═══════════════════════════════════════════════════════════════
    -- Memory Records
    -- ═══════════════════════════════════════════════════════════════
    CREATE TABLE IF NOT EXISTS memory_records (
        memory_id TEXT PRIMARY KEY,
        content TEXT NOT NULL,
        memory_type TEXT NOT NULL,
        owner_id TEXT NOT NULL,
        agent_name TEXT NOT NULL DEFAULT '',

        -- Context at creation (immutable)
        context_level REAL NOT NULL DEFAULT 0.5,
        context_tag TEXT NOT NULL DEFAULT 'neutral',

        -- Scoring
        importance_score REAL NOT NULL,
        significance_score REAL NOT NULL,

        -- Embedding (f32 array serialized as BLOB)
        embedding BLOB,
        embedding_model TEXT,

        -- Temporal / access
        created_at TEXT NOT NULL,
        last_importance_update TEXT NOT NULL,
        access_frequency INTEGER NOT NULL DEFAULT 0,
        last_accessed_at TEXT,
        accesses_since_sweep INTEGER NOT NULL DEFAULT 0,
        last_decay_at TEXT,

        -- Lifecycle
        state TEXT NOT NULL DEFAULT 'active',
        archived_at TEXT,
        version INTEGER NOT NULL DEFAULT 0,

        metadata TEXT NOT NULL DEFAULT '{}'
    );

    CREATE INDEX IF NOT EXISTS idx_records_owner_created
        ON memory_records(owner_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_records_state
        ON memory_records(state);

    -- FTS5 index for keyword candidates
    CREATE VIRTUAL TABLE IF NOT EXISTS memory_records_fts USING fts5(
        memory_id UNINDEXED,
        content,
        owner_id UNINDEXED,
        content=memory_records,
        content_rowid=rowid,
        tokenize='porter unicode61'
    );

    CREATE TRIGGER IF NOT EXISTS memory_records_fts_insert AFTER INSERT ON memory_records
    BEGIN
        INSERT INTO memory_records_fts(rowid, memory_id, content, owner_id)
        VALUES (NEW.rowid, NEW.memory_id, NEW.content, NEW.owner_id);
    END;

    CREATE TRIGGER IF NOT EXISTS memory_records_fts_delete AFTER DELETE ON memory_records
    BEGIN
        INSERT INTO memory_records_fts(memory_records_fts, rowid, memory_id, content, owner_id)
        VALUES ('delete', OLD.rowid, OLD.memory_id, OLD.content, OLD.owner_id);
    END;

    CREATE TRIGGER IF NOT EXISTS memory_records_fts_update AFTER UPDATE OF content ON memory_records
    BEGIN
        INSERT INTO memory_records_fts(memory_records_fts, rowid, memory_id, content, owner_id)
        VALUES ('delete', OLD.rowid, OLD.memory_id, OLD.content, OLD.owner_id);
        INSERT INTO memory_records_fts(rowid, memory_id, content, owner_id)
        VALUES (NEW.rowid, NEW.memory_id, NEW.content, NEW.owner_id);
    END;

    -- ═══════════════════════════════════════════════════════════════
    -- Concept graph
    -- ═══════════════════════════════════════════════════════════════
    CREATE TABLE IF NOT EXISTS concepts (
        concept_id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS memory_concepts (
        memory_id TEXT NOT NULL,
        concept_id INTEGER NOT NULL,
        PRIMARY KEY (memory_id, concept_id)
    );

    CREATE INDEX IF NOT EXISTS idx_memory_concepts_concept
        ON memory_concepts(concept_id);

    -- ═══════════════════════════════════════════════════════════════
    -- Audit log (append-only)
    -- ═══════════════════════════════════════════════════════════════
    CREATE TABLE IF NOT EXISTS memory_audit_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        operation TEXT NOT NULL,
        memory_id TEXT NOT NULL,
        actor TEXT NOT NULL,
        detail TEXT,
        timestamp TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_audit_memory
        ON memory_audit_log(memory_id);
";
