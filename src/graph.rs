//! Typed nodes and edges scoped to a project, CRUD plus neighbor traversal,
//! and FTS index maintenance.
//!
//! The literal/FTS query shapes are grounded on the other pack's SQLite
//! code-index store (`sanitize_fts_query`, `keyword_search` ordered by
//! `rank`), adapted to the spec's two-phase prefix-then-contains literal
//! search and its exact delete ordering (FTS rows, then edges, then nodes).

use crate::error::{HermesError, Result};
use crate::store::Store;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    File,
    Module,
    Function,
    Struct,
    Impl,
    Trait,
    Enum,
    Concept,
    Document,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::File => "file",
            NodeType::Module => "module",
            NodeType::Function => "function",
            NodeType::Struct => "struct",
            NodeType::Impl => "impl",
            NodeType::Trait => "trait",
            NodeType::Enum => "enum",
            NodeType::Concept => "concept",
            NodeType::Document => "document",
        }
    }

    /// Lenient parse per spec §9: unknown strings fall back to `concept`.
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "file" => NodeType::File,
            "module" => NodeType::Module,
            "function" => NodeType::Function,
            "struct" => NodeType::Struct,
            "impl" => NodeType::Impl,
            "trait" => NodeType::Trait,
            "enum" => NodeType::Enum,
            "document" => NodeType::Document,
            _ => NodeType::Concept,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeType {
    Calls,
    Imports,
    Implements,
    DependsOn,
    Contains,
    Documents,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Calls => "calls",
            EdgeType::Imports => "imports",
            EdgeType::Implements => "implements",
            EdgeType::DependsOn => "depends_on",
            EdgeType::Contains => "contains",
            EdgeType::Documents => "documents",
        }
    }

    /// Lenient parse per spec §9: unknown strings fall back to `depends_on`.
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "calls" => EdgeType::Calls,
            "imports" => EdgeType::Imports,
            "implements" => EdgeType::Implements,
            "contains" => EdgeType::Contains,
            "documents" => EdgeType::Documents,
            _ => EdgeType::DependsOn,
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub node_type: NodeType,
    pub file_path: Option<String>,
    pub start_line: Option<i64>,
    pub end_line: Option<i64>,
    pub summary: Option<String>,
    pub content_hash: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: String,
    pub project_id: String,
    pub source_id: String,
    pub target_id: String,
    pub edge_type: EdgeType,
    pub weight: f64,
}

fn row_to_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<Node> {
    let node_type: String = row.get("node_type")?;
    Ok(Node {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        name: row.get("name")?,
        node_type: NodeType::parse_lenient(&node_type),
        file_path: row.get("file_path")?,
        start_line: row.get("start_line")?,
        end_line: row.get("end_line")?,
        summary: row.get("summary")?,
        content_hash: row.get("content_hash")?,
        updated_at: row.get("updated_at")?,
    })
}

pub struct Graph<'a> {
    store: &'a Store,
}

impl<'a> Graph<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Upsert by `id`, refreshing `updatedAt`.
    pub fn add_node(&self, node: &Node) -> Result<Node> {
        let updated_at = Utc::now().to_rfc3339();
        self.store.conn.execute(
            "INSERT INTO nodes (id, project_id, name, node_type, file_path, start_line, end_line, summary, content_hash, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                project_id = excluded.project_id,
                name = excluded.name,
                node_type = excluded.node_type,
                file_path = excluded.file_path,
                start_line = excluded.start_line,
                end_line = excluded.end_line,
                summary = excluded.summary,
                content_hash = excluded.content_hash,
                updated_at = excluded.updated_at",
            params![
                node.id,
                node.project_id,
                node.name,
                node.node_type.as_str(),
                node.file_path,
                node.start_line,
                node.end_line,
                node.summary,
                node.content_hash,
                updated_at,
            ],
        )?;
        Ok(Node {
            updated_at,
            ..node.clone()
        })
    }

    pub fn get_node(&self, project_id: &str, id: &str) -> Result<Option<Node>> {
        self.store
            .conn
            .query_row(
                "SELECT * FROM nodes WHERE project_id = ?1 AND id = ?2",
                params![project_id, id],
                row_to_node,
            )
            .optional()
            .map_err(HermesError::from)
    }

    /// Insert if absent: idempotent by `id`.
    pub fn add_edge(&self, edge: &Edge) -> Result<()> {
        self.store.conn.execute(
            "INSERT OR IGNORE INTO edges (id, project_id, source_id, target_id, edge_type, weight)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                edge.id,
                edge.project_id,
                edge.source_id,
                edge.target_id,
                edge.edge_type.as_str(),
                edge.weight,
            ],
        )?;
        Ok(())
    }

    /// Every edge touching `id`, paired with the other endpoint resolved as a node.
    pub fn get_neighbors(&self, project_id: &str, id: &str) -> Result<Vec<(Edge, Node)>> {
        let mut stmt = self.store.conn.prepare(
            "SELECT e.id as eid, e.project_id as eproject, e.source_id, e.target_id,
                    e.edge_type, e.weight, n.*
             FROM edges e
             JOIN nodes n ON n.id = (CASE WHEN e.source_id = ?2 THEN e.target_id ELSE e.source_id END)
             WHERE e.project_id = ?1 AND (e.source_id = ?2 OR e.target_id = ?2)",
        )?;
        let rows = stmt.query_map(params![project_id, id], |row| {
            let edge_type: String = row.get("edge_type")?;
            let edge = Edge {
                id: row.get("eid")?,
                project_id: row.get("eproject")?,
                source_id: row.get("source_id")?,
                target_id: row.get("target_id")?,
                edge_type: EdgeType::parse_lenient(&edge_type),
                weight: row.get("weight")?,
            };
            let node = row_to_node(row)?;
            Ok((edge, node))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Replace the node's FTS row atomically (delete then insert).
    pub fn index_fts(&self, node: &Node, content: &str) -> Result<()> {
        self.store
            .conn
            .execute("DELETE FROM fts_content WHERE node_id = ?1", params![node.id])?;
        self.store.conn.execute(
            "INSERT INTO fts_content (node_id, project_id, name, content, file_path)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                node.id,
                node.project_id,
                node.name,
                content,
                node.file_path,
            ],
        )?;
        Ok(())
    }

    /// Two-phase: prefix match first; only if empty, fall back to contains.
    /// Never mixed. Matching is done in Rust, not SQL `LOWER()`/`LIKE`, since
    /// SQLite's built-in `LOWER()` only folds ASCII and would miss e.g. a
    /// node named `ÉCLAIR` against the query `éclair`.
    pub fn literal_search_by_name(&self, project_id: &str, q: &str) -> Result<Vec<Node>> {
        let needle = q.to_lowercase();
        let mut candidates = self.all_nodes(project_id)?;
        candidates.sort_by(|a, b| a.name.cmp(&b.name));

        let prefix_hits: Vec<Node> = candidates
            .iter()
            .filter(|n| n.name.to_lowercase().starts_with(&needle))
            .cloned()
            .collect();
        if !prefix_hits.is_empty() {
            return Ok(prefix_hits);
        }

        let contains_hits: Vec<Node> = candidates
            .into_iter()
            .filter(|n| n.name.to_lowercase().contains(&needle))
            .collect();
        Ok(contains_hits)
    }

    /// Remove, in order: FTS rows, then edges, then nodes, for every node
    /// whose `file_path` matches.
    pub fn delete_nodes_for_file(&self, project_id: &str, path: &str) -> Result<()> {
        self.store.conn.execute(
            "DELETE FROM fts_content WHERE project_id = ?1 AND node_id IN
                (SELECT id FROM nodes WHERE project_id = ?1 AND file_path = ?2)",
            params![project_id, path],
        )?;
        self.store.conn.execute(
            "DELETE FROM edges WHERE project_id = ?1 AND (source_id IN
                (SELECT id FROM nodes WHERE project_id = ?1 AND file_path = ?2)
             OR target_id IN
                (SELECT id FROM nodes WHERE project_id = ?1 AND file_path = ?2))",
            params![project_id, path],
        )?;
        self.store.conn.execute(
            "DELETE FROM nodes WHERE project_id = ?1 AND file_path = ?2",
            params![project_id, path],
        )?;
        Ok(())
    }

    /// Every node scoped to `project_id`, used by the vector search tier
    /// which must score against the full candidate set.
    pub fn all_nodes(&self, project_id: &str) -> Result<Vec<Node>> {
        let mut stmt = self
            .store
            .conn
            .prepare("SELECT * FROM nodes WHERE project_id = ?1")?;
        let rows = stmt
            .query_map(params![project_id], row_to_node)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn stored_file_paths(&self, project_id: &str) -> Result<Vec<String>> {
        let mut stmt = self.store.conn.prepare(
            "SELECT DISTINCT file_path FROM nodes WHERE project_id = ?1 AND file_path IS NOT NULL",
        )?;
        let rows = stmt
            .query_map(params![project_id], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// BM25 ranked ascending (smaller is better) — callers normalize.
    pub fn fts_search(&self, project_id: &str, match_expr: &str, limit: usize) -> Result<Vec<(Node, f64)>> {
        let mut stmt = self.store.conn.prepare(
            "SELECT n.*, bm25(f) as rank
             FROM fts_content f
             JOIN nodes n ON n.id = f.node_id
             WHERE f.project_id = ?1 AND f MATCH ?2
             ORDER BY rank ASC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![project_id, match_expr, limit as i64], |row| {
            let node = row_to_node(row)?;
            let rank: f64 = row.get("rank")?;
            Ok((node, rank))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, name: &str, file_path: Option<&str>) -> Node {
        Node {
            id: id.to_string(),
            project_id: "p1".to_string(),
            name: name.to_string(),
            node_type: NodeType::Function,
            file_path: file_path.map(str::to_string),
            start_line: file_path.map(|_| 1),
            end_line: file_path.map(|_| 3),
            summary: None,
            content_hash: None,
            updated_at: String::new(),
        }
    }

    #[test]
    fn add_node_then_get_node_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let graph = Graph::new(&store);
        let n = node("n1", "fetch_alerts", Some("src/a.rs"));
        graph.add_node(&n).unwrap();
        let fetched = graph.get_node("p1", "n1").unwrap().unwrap();
        assert_eq!(fetched.name, "fetch_alerts");
        assert!(!fetched.updated_at.is_empty());
    }

    #[test]
    fn add_edge_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let graph = Graph::new(&store);
        graph.add_node(&node("n1", "a", None)).unwrap();
        graph.add_node(&node("n2", "b", None)).unwrap();
        let e = Edge {
            id: "e1".to_string(),
            project_id: "p1".to_string(),
            source_id: "n1".to_string(),
            target_id: "n2".to_string(),
            edge_type: EdgeType::Calls,
            weight: 1.0,
        };
        graph.add_edge(&e).unwrap();
        graph.add_edge(&e).unwrap();
        let count: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM edges WHERE id = 'e1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn literal_search_prefix_then_contains() {
        let store = Store::open_in_memory().unwrap();
        let graph = Graph::new(&store);
        graph.add_node(&node("n1", "fetch_alerts", None)).unwrap();
        graph.add_node(&node("n2", "process_alerts", None)).unwrap();

        let prefix_hits = graph.literal_search_by_name("p1", "fetch").unwrap();
        assert_eq!(prefix_hits.len(), 1);
        assert_eq!(prefix_hits[0].name, "fetch_alerts");

        let contains_hits = graph.literal_search_by_name("p1", "alert").unwrap();
        assert_eq!(contains_hits.len(), 2);
    }

    #[test]
    fn literal_search_treats_percent_and_underscore_literally() {
        let store = Store::open_in_memory().unwrap();
        let graph = Graph::new(&store);
        graph.add_node(&node("n1", "100%_done", None)).unwrap();
        graph.add_node(&node("n2", "xxxxxxxxxx", None)).unwrap();

        let hits = graph.literal_search_by_name("p1", "100%_done").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "100%_done");
    }

    #[test]
    fn literal_search_is_unicode_aware() {
        let store = Store::open_in_memory().unwrap();
        let graph = Graph::new(&store);
        graph.add_node(&node("n1", "ÉCLAIR", None)).unwrap();

        let hits = graph.literal_search_by_name("p1", "éclair").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "ÉCLAIR");
    }

    #[test]
    fn delete_nodes_for_file_removes_fts_edges_and_nodes() {
        let store = Store::open_in_memory().unwrap();
        let graph = Graph::new(&store);
        let n = node("n1", "a", Some("src/a.rs"));
        graph.add_node(&n).unwrap();
        graph.index_fts(&n, "fn a() {}").unwrap();
        graph.add_node(&node("n2", "b", None)).unwrap();
        graph
            .add_edge(&Edge {
                id: "e1".to_string(),
                project_id: "p1".to_string(),
                source_id: "n1".to_string(),
                target_id: "n2".to_string(),
                edge_type: EdgeType::Calls,
                weight: 1.0,
            })
            .unwrap();

        graph.delete_nodes_for_file("p1", "src/a.rs").unwrap();

        assert!(graph.get_node("p1", "n1").unwrap().is_none());
        let edge_count: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM edges", [], |r| r.get(0))
            .unwrap();
        assert_eq!(edge_count, 0);
        let fts_count: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM fts_content WHERE node_id = 'n1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(fts_count, 0);
    }

    #[test]
    fn fts_search_finds_indexed_content() {
        let store = Store::open_in_memory().unwrap();
        let graph = Graph::new(&store);
        let n = node("n1", "alert_handler", Some("src/a.rs"));
        graph.add_node(&n).unwrap();
        graph.index_fts(&n, "fn alert_handler() { dispatch() }").unwrap();

        let hits = graph.fts_search("p1", "\"dispatch\"", 20).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id, "n1");
    }
}
