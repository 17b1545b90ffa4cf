//! Maps `path ↦ content hash` and `chunk-key ↦ content hash`; gates
//! re-ingestion. Content hash is hex-encoded SHA-256 (spec.md §4.4 pins the
//! algorithm explicitly — this is why the crate carries `sha2` rather than
//! the teacher's `xxhash-rust`, which is cache-only and not cryptographic).

use crate::error::Result;
use crate::store::Store;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256, always 64 characters.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Chunk keys have the shape `<path>::<chunk-name>`.
pub fn chunk_key(path: &str, chunk_name: &str) -> String {
    format!("{path}::{chunk_name}")
}

pub struct HashTracker<'a> {
    store: &'a Store,
}

impl<'a> HashTracker<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    fn stored_hash(&self, project_id: &str, key: &str) -> Result<Option<String>> {
        self.store
            .conn
            .query_row(
                "SELECT content_hash FROM file_hashes WHERE project_id = ?1 AND key = ?2",
                params![project_id, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Reads the stored hash for `path`, rereads the file from disk, and
    /// compares. Any I/O error forces re-ingestion (returns false).
    pub fn is_unchanged(&self, project_id: &str, path: &std::path::Path) -> bool {
        let key = path.to_string_lossy().to_string();
        let Ok(Some(stored)) = self.stored_hash(project_id, &key) else {
            return false;
        };
        let Ok(bytes) = std::fs::read(path) else {
            return false;
        };
        content_hash(&bytes) == stored
    }

    pub fn update_hash(&self, project_id: &str, key: &str, hash: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.store.conn.execute(
            "INSERT INTO file_hashes (project_id, key, content_hash, indexed_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(project_id, key) DO UPDATE SET
                content_hash = excluded.content_hash,
                indexed_at = excluded.indexed_at",
            params![project_id, key, hash, now],
        )?;
        Ok(())
    }

    pub fn update_chunk_hash(&self, project_id: &str, path: &str, chunk_name: &str, hash: &str) -> Result<()> {
        self.update_hash(project_id, &chunk_key(path, chunk_name), hash)
    }

    pub fn chunk_hash(&self, project_id: &str, path: &str, chunk_name: &str) -> Result<Option<String>> {
        self.stored_hash(project_id, &chunk_key(path, chunk_name))
    }

    pub fn delete_for_file(&self, project_id: &str, path: &str) -> Result<()> {
        self.store.conn.execute(
            "DELETE FROM file_hashes WHERE project_id = ?1 AND (key = ?2 OR key LIKE ?3 ESCAPE '\\')",
            params![project_id, path, format!("{path}::%")],
        )?;
        Ok(())
    }
}
