//! Append-only fact records with supersession chains. Facts are never
//! deleted: `invalidateFact` sets `validTo` and an optional supersession
//! link rather than removing the row.

use crate::error::Result;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::fmt;

use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactType {
    Architecture,
    ApiContract,
    Decision,
    ErrorPattern,
    Constraint,
    Learning,
}

impl FactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactType::Architecture => "architecture",
            FactType::ApiContract => "api_contract",
            FactType::Decision => "decision",
            FactType::ErrorPattern => "error_pattern",
            FactType::Constraint => "constraint",
            FactType::Learning => "learning",
        }
    }

    /// Lenient parse: unknown strings fall back to `decision` (spec.md §4.9).
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "architecture" => FactType::Architecture,
            "api_contract" => FactType::ApiContract,
            "error_pattern" => FactType::ErrorPattern,
            "constraint" => FactType::Constraint,
            "learning" => FactType::Learning,
            _ => FactType::Decision,
        }
    }
}

impl fmt::Display for FactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TemporalFact {
    pub id: String,
    pub node_id: Option<String>,
    pub fact_type: String,
    pub content: String,
    pub valid_from: String,
    pub valid_to: Option<String>,
    pub superseded_by: Option<String>,
    pub source_reference: Option<String>,
}

fn row_to_fact(row: &rusqlite::Row<'_>) -> rusqlite::Result<TemporalFact> {
    Ok(TemporalFact {
        id: row.get("id")?,
        node_id: row.get("node_id")?,
        fact_type: row.get("fact_type")?,
        content: row.get("content")?,
        valid_from: row.get("valid_from")?,
        valid_to: row.get("valid_to")?,
        superseded_by: row.get("superseded_by")?,
        source_reference: row.get("source_reference")?,
    })
}

pub struct TemporalStore<'a> {
    store: &'a Store,
}

impl<'a> TemporalStore<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn add_fact(
        &self,
        project_id: &str,
        fact_type: &str,
        content: &str,
        node_id: Option<&str>,
        source_reference: Option<&str>,
    ) -> Result<String> {
        let id = format!("fact-{}", uuid_like());
        let fact_type = FactType::parse_lenient(fact_type);
        let valid_from = Utc::now().to_rfc3339();
        self.store.conn.execute(
            "INSERT INTO temporal_facts (id, project_id, node_id, fact_type, content, valid_from, valid_to, superseded_by, source_reference)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, NULL, ?7)",
            params![id, project_id, node_id, fact_type.as_str(), content, valid_from, source_reference],
        )?;
        Ok(id)
    }

    pub fn invalidate_fact(&self, project_id: &str, id: &str, superseded_by: Option<&str>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.store.conn.execute(
            "UPDATE temporal_facts SET valid_to = ?1, superseded_by = ?2 WHERE project_id = ?3 AND id = ?4",
            params![now, superseded_by, project_id, id],
        )?;
        Ok(())
    }

    pub fn get_active_facts(&self, project_id: &str, fact_type: Option<&str>) -> Result<Vec<TemporalFact>> {
        let mut stmt = if fact_type.is_some() {
            self.store.conn.prepare(
                "SELECT * FROM temporal_facts WHERE project_id = ?1 AND valid_to IS NULL AND fact_type = ?2 ORDER BY valid_from DESC",
            )?
        } else {
            self.store.conn.prepare(
                "SELECT * FROM temporal_facts WHERE project_id = ?1 AND valid_to IS NULL ORDER BY valid_from DESC",
            )?
        };

        let rows = if let Some(ft) = fact_type {
            let normalized = FactType::parse_lenient(ft);
            stmt.query_map(params![project_id, normalized.as_str()], row_to_fact)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            stmt.query_map(params![project_id], row_to_fact)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
    }

    pub fn get_fact_history(&self, project_id: &str, node_id: &str) -> Result<Vec<TemporalFact>> {
        let mut stmt = self.store.conn.prepare(
            "SELECT * FROM temporal_facts WHERE project_id = ?1 AND node_id = ?2 ORDER BY valid_from DESC",
        )?;
        let rows = stmt
            .query_map(params![project_id, node_id], row_to_fact)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn get_fact(&self, project_id: &str, id: &str) -> Result<Option<TemporalFact>> {
        self.store
            .conn
            .query_row(
                "SELECT * FROM temporal_facts WHERE project_id = ?1 AND id = ?2",
                params![project_id, id],
                row_to_fact,
            )
            .optional()
            .map_err(Into::into)
    }
}

/// A process-unique identifier without pulling in a UUID crate: timestamp
/// plus a random suffix is sufficient for a locally-scoped fact id.
fn uuid_like() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or(0);
    format!("{nanos:x}{n:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalidate_fact_removes_it_from_active_set() {
        let store = Store::open_in_memory().unwrap();
        let facts = TemporalStore::new(&store);
        let id = facts
            .add_fact("p1", "decision", "use sqlite", None, None)
            .unwrap();
        assert_eq!(facts.get_active_facts("p1", None).unwrap().len(), 1);

        facts.invalidate_fact("p1", &id, None).unwrap();
        assert!(facts.get_active_facts("p1", None).unwrap().is_empty());

        let history = facts.get_fact(&"p1".to_string(), &id).unwrap().unwrap();
        assert!(history.valid_to.is_some());
    }

    #[test]
    fn unknown_fact_type_coerces_to_decision() {
        let store = Store::open_in_memory().unwrap();
        let facts = TemporalStore::new(&store);
        let id = facts
            .add_fact("p1", "not_a_real_type", "content", None, None)
            .unwrap();
        let fact = facts.get_fact("p1", &id).unwrap().unwrap();
        assert_eq!(fact.fact_type, "decision");
    }

    #[test]
    fn valid_to_null_iff_active_invariant_holds() {
        let store = Store::open_in_memory().unwrap();
        let facts = TemporalStore::new(&store);
        let id1 = facts.add_fact("p1", "learning", "a", None, None).unwrap();
        let id2 = facts.add_fact("p1", "learning", "b", None, None).unwrap();
        facts.invalidate_fact("p1", &id1, Some(&id2)).unwrap();

        let active = facts.get_active_facts("p1", Some("learning")).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, id2);
    }
}
