// ── Engram: SQLite Graph Store ───────────────────────────────────────────────
//
// Reference GraphStore backed by rusqlite. Records, the concept graph and
// the audit log share one connection behind a parking_lot Mutex.
//
// rusqlite is synchronous: every call hands the connection to tokio's
// blocking pool, so a slow query or a held lock never stalls the async
// worker and callers' deadlines still fire.
//
// Vector search is a brute-force cosine scan over one owner's active,
// embedded records. Keyword candidates come from the FTS5 mirror. Both, and
// the temporal window listing, apply the caller's type / agent / window
// filters in SQL before the candidate limit.
//
// Schema lives in store/schema.rs. Column names here MUST match that schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{info, warn};
use parking_lot::Mutex;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::schema::run_migrations;
use super::vector::{blob_to_vector, cosine_similarity, vector_to_blob};
use super::{ts_from_sql, ts_to_sql};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{GraphStore, UpdateOutcome};
use crate::atoms::types::{
    AuditEntry, AuditOperation, MemoryMetadata, MemoryRecord, MemoryType, RecordScan,
    RecordState, RecordUpdate, RetrievalFilters, StoreStats,
};
use crate::engine::config::StoreSection;

const RECORD_COLUMNS: &str = "memory_id, content, memory_type, owner_id, agent_name,
    context_level, context_tag, importance_score, significance_score,
    embedding, embedding_model, created_at, last_importance_update,
    access_frequency, last_accessed_at, accesses_since_sweep, last_decay_at,
    state, archived_at, version, metadata";

/// Same columns, qualified with the `r.` alias for joins.
const RECORD_COLUMNS_R: &str = "r.memory_id, r.content, r.memory_type, r.owner_id, r.agent_name,
    r.context_level, r.context_tag, r.importance_score, r.significance_score,
    r.embedding, r.embedding_model, r.created_at, r.last_importance_update,
    r.access_frequency, r.last_accessed_at, r.accesses_since_sweep, r.last_decay_at,
    r.state, r.archived_at, r.version, r.metadata";

/// Thread-safe SQLite store.
pub struct SqliteGraphStore {
    /// The SQLite connection, shared with blocking-pool tasks.
    pub conn: Arc<Mutex<Connection>>,
    vector_index: AtomicBool,
}

impl SqliteGraphStore {
    /// Open (or create) a database file and run migrations.
    pub fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        info!("[engram:sqlite] Opening graph store at {:?}", path);
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        conn.execute_batch("PRAGMA foreign_keys = ON;").ok();
        Self::from_connection(conn)
    }

    /// Fresh in-memory database (tests, offline tooling).
    pub fn open_in_memory() -> EngineResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_config(section: &StoreSection) -> EngineResult<Self> {
        let store = match &section.path {
            Some(path) => Self::open(path)?,
            None => Self::open_in_memory()?,
        };
        store.set_vector_index(section.vector_index);
        Ok(store)
    }

    fn from_connection(conn: Connection) -> EngineResult<Self> {
        run_migrations(&conn)?;
        Ok(SqliteGraphStore {
            conn: Arc::new(Mutex::new(conn)),
            vector_index: AtomicBool::new(true),
        })
    }

    /// Enable or disable the vector similarity path.
    pub fn set_vector_index(&self, enabled: bool) {
        self.vector_index.store(enabled, Ordering::SeqCst);
    }

    /// Run `f` against the connection on the blocking pool.
    ///
    /// Dropping the returned future (a timeout elapsing) abandons the wait;
    /// the query itself finishes in the background.
    async fn with_conn<T, F>(&self, op: &'static str, f: F) -> EngineResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> EngineResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut *guard)
        })
        .await
        .map_err(|e| EngineError::Other(format!("sqlite {op} task failed: {e}")))?
    }

    fn record_from_row(row: &Row<'_>) -> rusqlite::Result<MemoryRecord> {
        let memory_id: String = row.get(0)?;
        let memory_type: String = row.get(2)?;
        let memory_type = memory_type
            .parse::<MemoryType>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
        let embedding: Option<Vec<u8>> = row.get(9)?;
        let metadata: String = row.get(20)?;
        let state: String = row.get(17)?;
        let access_frequency: i64 = row.get(13)?;
        let accesses_since_sweep: i64 = row.get(15)?;
        let version: i64 = row.get(19)?;

        let metadata = serde_json::from_str::<MemoryMetadata>(&metadata).unwrap_or_else(|e| {
            warn!("[engram:sqlite] bad metadata on {}, using defaults: {}", memory_id, e);
            MemoryMetadata::default()
        });

        Ok(MemoryRecord {
            memory_id,
            content: row.get(1)?,
            memory_type,
            owner_id: row.get(3)?,
            agent_name: row.get(4)?,
            context_level: row.get(5)?,
            context_tag: row.get(6)?,
            importance_score: row.get(7)?,
            significance_score: row.get(8)?,
            embedding: embedding.map(|b| blob_to_vector(&b)).filter(|v| !v.is_empty()),
            embedding_model: row.get(10)?,
            created_at: required_ts(row, 11)?,
            last_importance_update: required_ts(row, 12)?,
            access_frequency: access_frequency.max(0) as u64,
            last_accessed_at: optional_ts(row, 14)?,
            accesses_since_sweep: accesses_since_sweep.max(0) as u32,
            last_decay_at: optional_ts(row, 16)?,
            state: RecordState::parse(&state),
            archived_at: optional_ts(row, 18)?,
            version: version.max(0) as u64,
            metadata,
        })
    }

    fn query_records(
        conn: &Connection,
        sql: &str,
        values: &[Value],
    ) -> EngineResult<Vec<MemoryRecord>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), Self::record_from_row)?;
        Ok(collect_rows("memory_records", rows))
    }
}

/// Keep decodable rows; log and skip the rest.
fn collect_rows<T>(table: &str, rows: impl Iterator<Item = rusqlite::Result<T>>) -> Vec<T> {
    let mut out = Vec::new();
    for row in rows {
        match row {
            Ok(v) => out.push(v),
            Err(e) => warn!("[engram:sqlite] skipping undecodable {} row: {}", table, e),
        }
    }
    out
}

fn required_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    ts_from_sql(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("bad timestamp '{raw}'").into(),
        )
    })
}

fn optional_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    Ok(raw.as_deref().and_then(ts_from_sql))
}

/// FTS5 MATCH expression: each term quoted, OR-joined.
fn fts_match_expr(terms: &[String]) -> Option<String> {
    let quoted: Vec<String> = terms
        .iter()
        .map(|t| t.replace('"', ""))
        .filter(|t| !t.trim().is_empty())
        .map(|t| format!("\"{}\"", t.trim()))
        .collect();
    if quoted.is_empty() {
        None
    } else {
        Some(quoted.join(" OR "))
    }
}

fn opt_ts_value(dt: Option<&DateTime<Utc>>) -> Value {
    match dt {
        Some(d) => Value::Text(ts_to_sql(d)),
        None => Value::Null,
    }
}

/// Append retrieval filters as ` AND ...` clauses on the `r` alias.
fn push_filter_clauses(filters: &RetrievalFilters, sql: &mut String, values: &mut Vec<Value>) {
    if !filters.memory_types.is_empty() {
        let placeholders = vec!["?"; filters.memory_types.len()].join(", ");
        sql.push_str(&format!(" AND r.memory_type IN ({placeholders})"));
        values.extend(filters.memory_types.iter().map(|t| Value::Text(t.as_str().into())));
    }
    if let Some(agent) = &filters.agent_name {
        sql.push_str(" AND r.agent_name = ?");
        values.push(Value::Text(agent.clone()));
    }
    if let Some(window) = &filters.time_window {
        sql.push_str(" AND r.created_at >= ? AND r.created_at <= ?");
        values.push(Value::Text(ts_to_sql(&window.start)));
        values.push(Value::Text(ts_to_sql(&window.end)));
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// GraphStore impl
// ═════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn ping(&self) -> EngineResult<()> {
        self.with_conn("ping", |conn| {
            conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    async fn vector_index_available(&self) -> bool {
        self.vector_index.load(Ordering::SeqCst)
    }

    async fn insert_record(&self, r: &MemoryRecord) -> EngineResult<()> {
        let embedding_bytes = r.embedding.as_ref().map(|v| vector_to_blob(v));
        let metadata = serde_json::to_string(&r.metadata)?;
        let r = r.clone();
        self.with_conn("insert_record", move |conn| {
            conn.execute(
                "INSERT INTO memory_records (
                    memory_id, content, memory_type, owner_id, agent_name,
                    context_level, context_tag, importance_score, significance_score,
                    embedding, embedding_model, created_at, last_importance_update,
                    access_frequency, last_accessed_at, accesses_since_sweep, last_decay_at,
                    state, archived_at, version, metadata
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5,
                    ?6, ?7, ?8, ?9,
                    ?10, ?11, ?12, ?13,
                    ?14, ?15, ?16, ?17,
                    ?18, ?19, ?20, ?21
                )",
                params![
                    r.memory_id,
                    r.content,
                    r.memory_type.as_str(),
                    r.owner_id,
                    r.agent_name,
                    r.context_level,
                    r.context_tag,
                    r.importance_score,
                    r.significance_score,
                    embedding_bytes,
                    r.embedding_model,
                    ts_to_sql(&r.created_at),
                    ts_to_sql(&r.last_importance_update),
                    r.access_frequency as i64,
                    r.last_accessed_at.as_ref().map(ts_to_sql),
                    r.accesses_since_sweep as i64,
                    r.last_decay_at.as_ref().map(ts_to_sql),
                    r.state.as_str(),
                    r.archived_at.as_ref().map(ts_to_sql),
                    r.version as i64,
                    metadata,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_record(&self, memory_id: &str) -> EngineResult<Option<MemoryRecord>> {
        let memory_id = memory_id.to_string();
        self.with_conn("get_record", move |conn| {
            let sql = format!("SELECT {RECORD_COLUMNS} FROM memory_records WHERE memory_id = ?1");
            let record = conn
                .query_row(&sql, params![memory_id], Self::record_from_row)
                .optional()?;
            Ok(record)
        })
        .await
    }

    async fn get_records(&self, memory_ids: &[String]) -> EngineResult<Vec<MemoryRecord>> {
        if memory_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; memory_ids.len()].join(", ");
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM memory_records WHERE memory_id IN ({placeholders})"
        );
        let values: Vec<Value> = memory_ids.iter().map(|id| Value::Text(id.clone())).collect();
        self.with_conn("get_records", move |conn| Self::query_records(conn, &sql, &values))
            .await
    }

    async fn scan_records(&self, scan: &RecordScan) -> EngineResult<Vec<MemoryRecord>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(state) = scan.state {
            clauses.push("state = ?".into());
            values.push(Value::Text(state.as_str().into()));
        }
        if let Some(owner) = &scan.owner_id {
            clauses.push("owner_id = ?".into());
            values.push(Value::Text(owner.clone()));
        }
        if !scan.memory_types.is_empty() {
            let placeholders = vec!["?"; scan.memory_types.len()].join(", ");
            clauses.push(format!("memory_type IN ({placeholders})"));
            values.extend(scan.memory_types.iter().map(|t| Value::Text(t.as_str().into())));
        }
        if let Some(before) = &scan.created_before {
            clauses.push("created_at < ?".into());
            values.push(Value::Text(ts_to_sql(before)));
        }
        if let Some(before) = &scan.archived_before {
            clauses.push("archived_at IS NOT NULL AND archived_at < ?".into());
            values.push(Value::Text(ts_to_sql(before)));
        }
        match scan.with_embedding {
            Some(true) => clauses.push("embedding IS NOT NULL AND length(embedding) > 0".into()),
            Some(false) => clauses.push("(embedding IS NULL OR length(embedding) = 0)".into()),
            None => {}
        }
        if let Some((at, id)) = &scan.after {
            let at = ts_to_sql(at);
            clauses.push("(created_at > ? OR (created_at = ? AND memory_id > ?))".into());
            values.push(Value::Text(at.clone()));
            values.push(Value::Text(at));
            values.push(Value::Text(id.clone()));
        }

        let mut sql = format!("SELECT {RECORD_COLUMNS} FROM memory_records");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at ASC, memory_id ASC");
        if scan.limit > 0 {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(scan.limit as i64));
        }

        self.with_conn("scan_records", move |conn| Self::query_records(conn, &sql, &values))
            .await
    }

    async fn conditional_update(
        &self,
        u: &RecordUpdate,
        expected_version: u64,
    ) -> EngineResult<UpdateOutcome> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(v) = u.importance_score {
            sets.push("importance_score = MAX(0.0, MIN(1.0, ?))");
            values.push(Value::Real(v));
        }
        if let Some(v) = &u.last_importance_update {
            sets.push("last_importance_update = ?");
            values.push(Value::Text(ts_to_sql(v)));
        }
        if let Some(v) = u.access_frequency {
            sets.push("access_frequency = ?");
            values.push(Value::Integer(v as i64));
        }
        if let Some(v) = u.accesses_since_sweep {
            sets.push("accesses_since_sweep = ?");
            values.push(Value::Integer(v as i64));
        }
        if let Some(v) = &u.last_decay_at {
            sets.push("last_decay_at = ?");
            values.push(Value::Text(ts_to_sql(v)));
        }
        if let Some(v) = u.state {
            sets.push("state = ?");
            values.push(Value::Text(v.as_str().into()));
        }
        if u.archived_at.is_some() {
            sets.push("archived_at = ?");
            values.push(opt_ts_value(u.archived_at.as_ref()));
        }
        if let Some(m) = &u.metadata {
            sets.push("metadata = ?");
            values.push(Value::Text(serde_json::to_string(m)?));
        }
        if let Some((vector, model)) = &u.embedding {
            sets.push("embedding = ?");
            values.push(Value::Blob(vector_to_blob(vector)));
            sets.push("embedding_model = ?");
            values.push(Value::Text(model.clone()));
        }
        sets.push("version = version + 1");

        let sql = format!(
            "UPDATE memory_records SET {} WHERE memory_id = ? AND version = ?",
            sets.join(", ")
        );
        let memory_id = u.memory_id.clone();
        values.push(Value::Text(memory_id.clone()));
        values.push(Value::Integer(expected_version as i64));

        self.with_conn("conditional_update", move |conn| {
            let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
            if changed == 1 {
                return Ok(UpdateOutcome::Applied(expected_version + 1));
            }

            let exists: Option<i64> = conn
                .query_row(
                    "SELECT version FROM memory_records WHERE memory_id = ?1",
                    params![memory_id],
                    |r| r.get(0),
                )
                .optional()?;
            Ok(match exists {
                Some(_) => UpdateOutcome::Conflict,
                None => UpdateOutcome::Missing,
            })
        })
        .await
    }

    async fn delete_record(&self, memory_id: &str) -> EngineResult<bool> {
        let memory_id = memory_id.to_string();
        self.with_conn("delete_record", move |conn| {
            let tx = conn.transaction()?;
            let n = tx.execute("DELETE FROM memory_records WHERE memory_id = ?1", params![memory_id])?;
            tx.execute("DELETE FROM memory_concepts WHERE memory_id = ?1", params![memory_id])?;
            tx.commit()?;
            Ok(n > 0)
        })
        .await
    }

    async fn link_concepts(&self, memory_id: &str, concepts: &[String]) -> EngineResult<()> {
        if concepts.is_empty() {
            return Ok(());
        }
        let memory_id = memory_id.to_string();
        let concepts = concepts.to_vec();
        self.with_conn("link_concepts", move |conn| {
            let tx = conn.transaction()?;
            for name in &concepts {
                tx.execute("INSERT OR IGNORE INTO concepts (name) VALUES (?1)", params![name])?;
                let concept_id: i64 = tx.query_row(
                    "SELECT concept_id FROM concepts WHERE name = ?1",
                    params![name],
                    |r| r.get(0),
                )?;
                tx.execute(
                    "INSERT OR IGNORE INTO memory_concepts (memory_id, concept_id) VALUES (?1, ?2)",
                    params![memory_id, concept_id],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn concepts_for(&self, memory_id: &str) -> EngineResult<Vec<String>> {
        let memory_id = memory_id.to_string();
        self.with_conn("concepts_for", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT c.name FROM memory_concepts mc
                 JOIN concepts c ON c.concept_id = mc.concept_id
                 WHERE mc.memory_id = ?1
                 ORDER BY c.name",
            )?;
            let rows = stmt.query_map(params![memory_id], |r| r.get::<_, String>(0))?;
            Ok(collect_rows("concepts", rows))
        })
        .await
    }

    async fn keyword_candidates(
        &self,
        owner_id: &str,
        terms: &[String],
        filters: &RetrievalFilters,
        limit: usize,
    ) -> EngineResult<Vec<MemoryRecord>> {
        let Some(expr) = fts_match_expr(terms) else {
            return Ok(Vec::new());
        };
        let mut sql = format!(
            "SELECT {RECORD_COLUMNS_R} FROM memory_records_fts
             JOIN memory_records r ON r.rowid = memory_records_fts.rowid
             WHERE memory_records_fts MATCH ? AND r.owner_id = ? AND r.state = 'active'"
        );
        let mut values = vec![Value::Text(expr), Value::Text(owner_id.to_string())];
        push_filter_clauses(filters, &mut sql, &mut values);
        sql.push_str(" ORDER BY bm25(memory_records_fts), r.memory_id LIMIT ?");
        values.push(Value::Integer(limit as i64));

        self.with_conn("keyword_candidates", move |conn| Self::query_records(conn, &sql, &values))
            .await
    }

    async fn vector_top_k(
        &self,
        owner_id: &str,
        query: &[f32],
        filters: &RetrievalFilters,
        k: usize,
    ) -> EngineResult<Vec<(MemoryRecord, f64)>> {
        let mut sql = format!(
            "SELECT {RECORD_COLUMNS_R} FROM memory_records r
             WHERE r.owner_id = ? AND r.state = 'active' AND r.embedding IS NOT NULL"
        );
        let mut values = vec![Value::Text(owner_id.to_string())];
        push_filter_clauses(filters, &mut sql, &mut values);
        let query = query.to_vec();

        self.with_conn("vector_top_k", move |conn| {
            let records = Self::query_records(conn, &sql, &values)?;
            let mut scored: Vec<(MemoryRecord, f64)> = records
                .into_iter()
                .filter_map(|r| {
                    let sim = cosine_similarity(&query, r.embedding.as_deref()?);
                    Some((r, sim))
                })
                .collect();
            scored.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.memory_id.cmp(&b.0.memory_id))
            });
            scored.truncate(k);
            Ok(scored)
        })
        .await
    }

    async fn list_in_window(
        &self,
        owner_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filters: &RetrievalFilters,
        limit: usize,
    ) -> EngineResult<Vec<MemoryRecord>> {
        let mut sql = format!(
            "SELECT {RECORD_COLUMNS_R} FROM memory_records r
             WHERE r.owner_id = ? AND r.state = 'active' AND r.created_at >= ? AND r.created_at <= ?"
        );
        let mut values = vec![
            Value::Text(owner_id.to_string()),
            Value::Text(ts_to_sql(&start)),
            Value::Text(ts_to_sql(&end)),
        ];
        push_filter_clauses(filters, &mut sql, &mut values);
        sql.push_str(" ORDER BY r.created_at DESC, r.memory_id ASC LIMIT ?");
        values.push(Value::Integer(limit as i64));

        self.with_conn("list_in_window", move |conn| Self::query_records(conn, &sql, &values))
            .await
    }

    async fn record_access(&self, memory_ids: &[String], at: DateTime<Utc>) -> EngineResult<()> {
        if memory_ids.is_empty() {
            return Ok(());
        }
        let now = ts_to_sql(&at);
        let memory_ids = memory_ids.to_vec();
        self.with_conn("record_access", move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "UPDATE memory_records
                     SET access_frequency = access_frequency + 1,
                         accesses_since_sweep = accesses_since_sweep + 1,
                         last_accessed_at = ?2,
                         last_importance_update = ?2,
                         version = version + 1
                     WHERE memory_id = ?1 AND state = 'active'",
                )?;
                for id in &memory_ids {
                    stmt.execute(params![id, now])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn append_audit(&self, entry: &AuditEntry) -> EngineResult<()> {
        let entry = entry.clone();
        self.with_conn("append_audit", move |conn| {
            conn.execute(
                "INSERT INTO memory_audit_log (operation, memory_id, actor, detail, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.operation.as_str(),
                    entry.memory_id,
                    entry.actor,
                    entry.detail,
                    ts_to_sql(&entry.timestamp),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn audit_entries(
        &self,
        memory_id: Option<&str>,
        limit: usize,
    ) -> EngineResult<Vec<AuditEntry>> {
        let mut values: Vec<Value> = Vec::new();
        let mut sql = String::from(
            "SELECT operation, memory_id, actor, detail, timestamp FROM memory_audit_log",
        );
        if let Some(id) = memory_id {
            sql.push_str(" WHERE memory_id = ?");
            values.push(Value::Text(id.to_string()));
        }
        sql.push_str(" ORDER BY id ASC");
        if limit > 0 {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        self.with_conn("audit_entries", move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
                let op: String = row.get(0)?;
                let ts: String = row.get(4)?;
                Ok((
                    op,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    ts,
                ))
            })?;

            let entries = collect_rows("memory_audit_log", rows)
                .into_iter()
                .filter_map(|(op, memory_id, actor, detail, ts)| {
                    let (Some(operation), Some(timestamp)) =
                        (AuditOperation::parse(&op), ts_from_sql(&ts))
                    else {
                        warn!(
                            "[engram:sqlite] skipping audit entry for {} (operation '{}', timestamp '{}')",
                            memory_id, op, ts
                        );
                        return None;
                    };
                    Some(AuditEntry { operation, memory_id, actor, detail, timestamp })
                })
                .collect();
            Ok(entries)
        })
        .await
    }

    async fn stats(&self) -> EngineResult<StoreStats> {
        self.with_conn("stats", |conn| {
            let count = |sql: &str| -> EngineResult<usize> {
                let n: i64 = conn.query_row(sql, [], |r| r.get(0))?;
                Ok(n.max(0) as usize)
            };
            Ok(StoreStats {
                active_records: count("SELECT COUNT(*) FROM memory_records WHERE state = 'active'")?,
                archived_records: count(
                    "SELECT COUNT(*) FROM memory_records WHERE state = 'archived'",
                )?,
                without_embedding: count(
                    "SELECT COUNT(*) FROM memory_records
                     WHERE state = 'active' AND (embedding IS NULL OR length(embedding) = 0)",
                )?,
                concepts: count("SELECT COUNT(*) FROM concepts")?,
                concept_links: count("SELECT COUNT(*) FROM memory_concepts")?,
            })
        })
        .await
    }
}
