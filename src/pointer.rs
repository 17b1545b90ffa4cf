//! Pointer serialization, the token estimator, and the per-query
//! accounting journal. This is the module that makes Hermes's core claim
//! measurable: pointers cost far fewer tokens than the raw content they
//! stand in for.

use crate::error::Result;
use crate::graph::NodeType;
use crate::search::SearchResult;
use crate::store::Store;
use chrono::Utc;
use rusqlite::params;
use serde::Serialize;

/// Counterfactual multiplier: what shipping raw content instead of a
/// pointer would have cost, in tokens, per pointer token.
const TRADITIONAL_RAG_MULTIPLIER: i64 = 15;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Pointer {
    pub id: String,
    pub source: String,
    pub chunk: String,
    pub lines: String,
    pub relevance: f64,
    pub summary: String,
    pub node_type: String,
    pub last_modified: Option<String>,
}

/// `tokens ≈ (words · 4 + 2) / 3` where `words` counts maximal
/// non-whitespace runs.
pub fn estimate_tokens(s: &str) -> i64 {
    let words = s.split_whitespace().count() as i64;
    (words * 4 + 2) / 3
}

fn pointer_estimate(p: &Pointer) -> i64 {
    let joined = format!("{} {} {} {}", p.source, p.chunk, p.lines, p.summary);
    estimate_tokens(&joined) + 2
}

pub fn build_pointers(results: &[SearchResult]) -> Vec<Pointer> {
    results
        .iter()
        .map(|r| {
            let node = &r.node;
            let lines = match (node.start_line, node.end_line) {
                (Some(s), Some(e)) => format!("{s}-{e}"),
                _ => String::new(),
            };
            Pointer {
                id: node.id.clone(),
                source: node.file_path.clone().unwrap_or_default(),
                chunk: node.name.clone(),
                lines,
                relevance: r.score,
                summary: node.summary.clone().unwrap_or_default(),
                node_type: node.node_type.as_str().to_string(),
                last_modified: Some(node.updated_at.clone()),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Accounting {
    pub pointer_tokens: i64,
    pub fetched_tokens: i64,
    pub total: i64,
    pub traditional_estimate: i64,
    pub savings_pct: f64,
}

impl Accounting {
    pub fn new(pointer_tokens: i64, fetched_tokens: i64) -> Self {
        let total = pointer_tokens + fetched_tokens;
        let traditional_estimate = pointer_tokens * TRADITIONAL_RAG_MULTIPLIER;
        let savings_pct = if traditional_estimate > 0 {
            (1.0 - total as f64 / traditional_estimate as f64).max(0.0) * 100.0
        } else {
            0.0
        };
        Self {
            pointer_tokens,
            fetched_tokens,
            total,
            traditional_estimate,
            savings_pct,
        }
    }

    /// From a pre-summed set of rows — used for windowed/session aggregation,
    /// where `traditional_estimate` is the sum of each row's stored value
    /// (not recomputed from `pointer_tokens`, since historical rows may have
    /// been recorded before a multiplier change).
    pub fn from_sums(pointer_tokens: i64, fetched_tokens: i64, traditional_estimate: i64) -> Self {
        let total = pointer_tokens + fetched_tokens;
        let savings_pct = if traditional_estimate > 0 {
            (1.0 - total as f64 / traditional_estimate as f64).max(0.0) * 100.0
        } else {
            0.0
        };
        Self {
            pointer_tokens,
            fetched_tokens,
            total,
            traditional_estimate,
            savings_pct,
        }
    }
}

pub fn accounting_for_pointers(pointers: &[Pointer], fetched_tokens: i64) -> Accounting {
    let pointer_tokens: i64 = pointers.iter().map(pointer_estimate).sum();
    Accounting::new(pointer_tokens, fetched_tokens)
}

pub enum AggregationWindow {
    Hours(i64),
    Days(i64),
    Session(String),
    All,
}

/// Parses `"Nh"`, `"Nd"`, or `"all"` (case-insensitive). Anything else is
/// treated as `All` — a windowed stats query should never error out.
pub fn parse_since(s: &str) -> AggregationWindow {
    let lowered = s.to_lowercase();
    if lowered == "all" {
        return AggregationWindow::All;
    }
    if let Some(n) = lowered.strip_suffix('h').and_then(|n| n.parse::<i64>().ok()) {
        return AggregationWindow::Hours(n);
    }
    if let Some(n) = lowered.strip_suffix('d').and_then(|n| n.parse::<i64>().ok()) {
        return AggregationWindow::Days(n);
    }
    AggregationWindow::All
}

pub struct Accountant<'a> {
    store: &'a Store,
}

impl<'a> Accountant<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn record_query(
        &self,
        project_id: &str,
        session_id: &str,
        query_text: &str,
        accounting: &Accounting,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.store.conn.execute(
            "INSERT INTO accounting (project_id, session_id, query_text, pointer_tokens, fetched_tokens, traditional_est, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                project_id,
                session_id,
                query_text,
                accounting.pointer_tokens,
                accounting.fetched_tokens,
                accounting.traditional_estimate,
                now,
            ],
        )?;
        Ok(())
    }

    /// Cumulative sums over the project, optionally filtered by a
    /// wall-clock window or the current session. Never negative.
    pub fn aggregate(
        &self,
        project_id: &str,
        window: &AggregationWindow,
    ) -> Result<(i64, Accounting)> {
        let (clause, bind): (&str, Option<String>) = match window {
            AggregationWindow::All => ("", None),
            AggregationWindow::Hours(n) => (
                "AND created_at >= ?2",
                Some((Utc::now() - chrono::Duration::hours(*n)).to_rfc3339()),
            ),
            AggregationWindow::Days(n) => (
                "AND created_at >= ?2",
                Some((Utc::now() - chrono::Duration::days(*n)).to_rfc3339()),
            ),
            AggregationWindow::Session(session_id) => ("AND session_id = ?2", Some(session_id.clone())),
        };

        let sql = format!(
            "SELECT COUNT(*), COALESCE(SUM(pointer_tokens),0), COALESCE(SUM(fetched_tokens),0), COALESCE(SUM(traditional_est),0)
             FROM accounting WHERE project_id = ?1 {clause}"
        );

        let row = if let Some(bind) = bind {
            self.store
                .conn
                .query_row(&sql, params![project_id, bind], |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        r.get::<_, i64>(1)?,
                        r.get::<_, i64>(2)?,
                        r.get::<_, i64>(3)?,
                    ))
                })?
        } else {
            self.store.conn.query_row(&sql, params![project_id], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, i64>(1)?,
                    r.get::<_, i64>(2)?,
                    r.get::<_, i64>(3)?,
                ))
            })?
        };

        let (queries, pointer_tokens, fetched_tokens, traditional_estimate) = row;
        Ok((
            queries,
            Accounting::from_sums(pointer_tokens, fetched_tokens, traditional_estimate),
        ))
    }
}

pub fn node_type_name(t: NodeType) -> &'static str {
    t.as_str()
}
