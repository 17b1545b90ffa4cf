//! Embedded relational store: one SQLite database per project, WAL mode,
//! a small idempotent migration set, and an FTS5 virtual table for the
//! lexical search tier.
//!
//! Grounded on the rusqlite + `CREATE VIRTUAL TABLE ... USING fts5` pattern
//! used across the retrieval pack's other code-index stores: a single
//! `Connection`, schema applied in one `execute_batch`, content/FTS kept in
//! sync by explicit `indexFts` calls (see `graph.rs`) rather than triggers,
//! since the spec's `indexFts` contract is delete-then-insert per node, not
//! a blanket table-level trigger.

use crate::error::{HermesError, Result};
use rusqlite::Connection;
use std::path::Path;

/// Linear, idempotent migration statements. Each is applied in order inside
/// one transaction; a failure names the offending statement's index.
const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS nodes (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        name TEXT NOT NULL,
        node_type TEXT NOT NULL,
        file_path TEXT,
        start_line INTEGER,
        end_line INTEGER,
        summary TEXT,
        content_hash TEXT,
        updated_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_nodes_project ON nodes(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_nodes_project_file ON nodes(project_id, file_path)",
    "CREATE INDEX IF NOT EXISTS idx_nodes_project_name ON nodes(project_id, name)",
    "CREATE TABLE IF NOT EXISTS edges (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        source_id TEXT NOT NULL,
        target_id TEXT NOT NULL,
        edge_type TEXT NOT NULL,
        weight REAL NOT NULL DEFAULT 1.0
    )",
    "CREATE INDEX IF NOT EXISTS idx_edges_project_source ON edges(project_id, source_id)",
    "CREATE INDEX IF NOT EXISTS idx_edges_project_target ON edges(project_id, target_id)",
    "CREATE VIRTUAL TABLE IF NOT EXISTS fts_content USING fts5(
        node_id UNINDEXED,
        project_id UNINDEXED,
        name,
        content,
        file_path UNINDEXED
    )",
    "CREATE TABLE IF NOT EXISTS file_hashes (
        project_id TEXT NOT NULL,
        key TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        indexed_at TEXT NOT NULL,
        PRIMARY KEY (project_id, key)
    )",
    "CREATE TABLE IF NOT EXISTS accounting (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id TEXT NOT NULL,
        session_id TEXT NOT NULL,
        query_text TEXT NOT NULL,
        pointer_tokens INTEGER NOT NULL,
        fetched_tokens INTEGER NOT NULL,
        traditional_est INTEGER NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_accounting_project ON accounting(project_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_accounting_session ON accounting(project_id, session_id)",
    "CREATE TABLE IF NOT EXISTS temporal_facts (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        node_id TEXT,
        fact_type TEXT NOT NULL,
        content TEXT NOT NULL,
        valid_from TEXT NOT NULL,
        valid_to TEXT,
        superseded_by TEXT,
        source_reference TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_facts_project_active ON temporal_facts(project_id, valid_to)",
    "CREATE INDEX IF NOT EXISTS idx_facts_node ON temporal_facts(project_id, node_id)",
];

pub struct Store {
    pub(crate) conn: Connection,
}

impl Store {
    /// Open (or create) a project database file: sets WAL journaling and
    /// normal fsync, then runs migrations. Failure to open or migrate is
    /// fatal — this is the one place in the crate where that's the contract.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        Self::configure(&conn)?;
        Self::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// In-memory database, used by tests and the `Store::open_in_memory()`
    /// fast path described in SPEC_FULL.md's test tooling section.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::migrate(&conn)?;
        Ok(Self { conn })
    }

    fn configure(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(())
    }

    fn migrate(conn: &Connection) -> Result<()> {
        for (idx, statement) in MIGRATIONS.iter().enumerate() {
            conn.execute_batch(statement).map_err(|e| HermesError::Init {
                statement: format!("migration[{idx}]: {statement}"),
                source: e,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_runs_migrations() {
        let store = Store::open_in_memory().unwrap();
        let count: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM nodes", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn open_on_disk_creates_parent_dirs_and_wal() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested/graph.db");
        let store = Store::open(&db_path).unwrap();
        let mode: String = store
            .conn
            .query_row("PRAGMA journal_mode", [], |r| r.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("graph.db");
        Store::open(&db_path).unwrap();
        // Reopening must not fail even though every table already exists.
        Store::open(&db_path).unwrap();
    }
}
