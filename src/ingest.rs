//! Orchestrates crawl → chunk → hash-gate → upsert → stale-node sweep.
//!
//! The crawl step reuses the teacher's `ignore::WalkBuilder`-based
//! directory walk (`scanner.rs`), but configured against the spec's own
//! fixed ignore/extension sets (§6) instead of the teacher's
//! `.gitignore`-respecting repomix override list — this crate wants
//! deterministic crawl results independent of a repo's own VCS ignore
//! rules.

use crate::graph::{Edge, EdgeType, Graph, Node, NodeType};
use crate::hashes::{chunk_key, content_hash, HashTracker};
use crate::store::Store;
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const IGNORE_DIR_NAMES: &[&str] = &[
    "target",
    "node_modules",
    ".git",
    ".venv",
    ".mypy_cache",
    ".pytest_cache",
    ".ruff_cache",
    "dist",
    ".next",
    ".vite",
    "build",
    ".gradle",
    ".idea",
    "out",
];

pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "rs", "tsx", "ts", "jsx", "js", "md", "toml", "json", "css", "kt", "kts", "java", "py", "go",
    "yaml", "yml",
];

#[derive(Debug, Clone, Serialize, Default)]
pub struct IngestReport {
    pub total_files: usize,
    pub indexed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub nodes_created: usize,
}

/// Recursively walk `root`, skipping the hard-coded ignore directories and
/// keeping only supported extensions. Returns a sorted list of absolute paths.
pub fn crawl(root: &Path) -> Vec<PathBuf> {
    let mut overrides = OverrideBuilder::new(root);
    for dir in IGNORE_DIR_NAMES {
        let _ = overrides.add(&format!("!**/{dir}/**"));
        let _ = overrides.add(&format!("!{dir}/**"));
    }
    let overrides = overrides.build().unwrap_or_else(|_| OverrideBuilder::new(root).build().unwrap());

    let mut paths: Vec<PathBuf> = WalkBuilder::new(root)
        .standard_filters(false)
        .overrides(overrides)
        .hidden(false)
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .filter_map(|path| path.canonicalize().ok().or(Some(path)))
        .collect();
    paths.sort();
    paths.dedup();
    paths
}

pub struct IngestionPipeline<'a> {
    store: &'a Store,
    project_id: String,
    root: PathBuf,
    max_file_bytes: u64,
}

impl<'a> IngestionPipeline<'a> {
    pub fn new(store: &'a Store, project_id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            project_id: project_id.into(),
            root: root.into(),
            max_file_bytes: crate::config::ABSOLUTE_MAX_FILE_BYTES,
        }
    }

    /// Overrides the per-file size ceiling (still clamped to the crate's
    /// absolute safety ceiling so a misconfigured value can't disable it).
    pub fn with_max_file_bytes(mut self, max_file_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes.min(crate::config::ABSOLUTE_MAX_FILE_BYTES);
        self
    }

    pub fn run(&self) -> IngestReport {
        let graph = Graph::new(self.store);
        let hashes = HashTracker::new(self.store);
        let mut report = IngestReport::default();

        let crawled = crawl(&self.root);
        report.total_files = crawled.len();

        let mut crawled_keys: HashSet<String> = HashSet::new();

        for path in &crawled {
            let key = path.to_string_lossy().to_string();
            crawled_keys.insert(key.clone());

            let too_large = std::fs::metadata(path)
                .map(|m| m.len() > self.max_file_bytes)
                .unwrap_or(false);
            if too_large {
                tracing::warn!(path = %path.display(), "skipping file over the size ceiling");
                report.skipped += 1;
                continue;
            }

            if hashes.is_unchanged(&self.project_id, path) {
                report.skipped += 1;
                continue;
            }

            match self.ingest_file(&graph, &hashes, path) {
                Ok(created) => {
                    report.indexed += 1;
                    report.nodes_created += created;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to ingest file");
                    report.errors += 1;
                }
            }
        }

        match graph.stored_file_paths(&self.project_id) {
            Ok(stored) => {
                for stored_path in stored {
                    if !crawled_keys.contains(&stored_path) {
                        if let Err(e) = graph.delete_nodes_for_file(&self.project_id, &stored_path) {
                            tracing::warn!(path = %stored_path, error = %e, "failed to sweep stale file");
                        }
                        if let Err(e) = hashes.delete_for_file(&self.project_id, &stored_path) {
                            tracing::warn!(path = %stored_path, error = %e, "failed to sweep stale hashes");
                        }
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to list stored file paths for sweep"),
        }

        report
    }

    fn ingest_file(
        &self,
        graph: &Graph<'_>,
        hashes: &HashTracker<'_>,
        path: &Path,
    ) -> anyhow::Result<usize> {
        let bytes = std::fs::read(path)?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let rel = path.to_string_lossy().to_string();
        let file_hash = content_hash(&bytes);

        let mut created = 0usize;
        let file_id = format!("{}:{}", self.project_id, rel);
        let file_node = Node {
            id: file_id.clone(),
            project_id: self.project_id.clone(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| rel.clone()),
            node_type: NodeType::File,
            file_path: Some(rel.clone()),
            start_line: Some(1),
            end_line: Some(text.lines().count().max(1) as i64),
            summary: Some(text.lines().next().unwrap_or("").chars().take(80).collect()),
            content_hash: Some(file_hash.clone()),
            updated_at: String::new(),
        };
        graph.add_node(&file_node)?;
        graph.index_fts(&file_node, &text)?;
        created += 1;

        for chunk in crate::chunker::chunk_file(&rel, &text) {
            let chunk_hash = content_hash(chunk.text.as_bytes());
            let existing = hashes.chunk_hash(&self.project_id, &rel, &chunk.name)?;
            if existing.as_deref() == Some(chunk_hash.as_str()) {
                continue;
            }

            let chunk_id = format!("{}:{}", self.project_id, chunk_key(&rel, &chunk.name));
            let chunk_node = Node {
                id: chunk_id.clone(),
                project_id: self.project_id.clone(),
                name: chunk.name.clone(),
                node_type: chunk.node_type,
                file_path: Some(rel.clone()),
                start_line: Some(chunk.start_line as i64),
                end_line: Some(chunk.end_line as i64),
                summary: Some(chunk.summary.clone()),
                content_hash: Some(chunk_hash.clone()),
                updated_at: String::new(),
            };
            graph.add_node(&chunk_node)?;
            graph.index_fts(&chunk_node, &chunk.text)?;
            created += 1;

            let edge = Edge {
                id: format!("{file_id}->{chunk_id}"),
                project_id: self.project_id.clone(),
                source_id: file_id.clone(),
                target_id: chunk_id,
                edge_type: EdgeType::Contains,
                weight: 1.0,
            };
            graph.add_edge(&edge)?;

            hashes.update_chunk_hash(&self.project_id, &rel, &chunk.name, &chunk_hash)?;
        }

        hashes.update_hash(&self.project_id, &rel, &file_hash)?;
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crawl_skips_ignored_dirs_and_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("target/debug")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join("target/debug/out.rs"), "fn x() {}").unwrap();
        std::fs::write(dir.path().join("README.txt"), "not supported").unwrap();

        let found = crawl(dir.path());
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(names.contains(&"main.rs".to_string()));
        assert!(!names.iter().any(|n| n == "out.rs"));
        assert!(!names.contains(&"README.txt".to_string()));
    }

    #[test]
    fn run_indexes_new_files_and_skips_unchanged_on_rerun() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "pub fn hello() {\n  1\n}\n").unwrap();
        let store = Store::open_in_memory().unwrap();
        let pipeline = IngestionPipeline::new(&store, "p1", dir.path());

        let first = pipeline.run();
        assert_eq!(first.total_files, 1);
        assert_eq!(first.indexed, 1);
        assert_eq!(first.skipped, 0);
        assert!(first.nodes_created >= 1);

        let second = pipeline.run();
        assert_eq!(second.indexed, 0);
        assert_eq!(second.skipped, 1);
    }

    #[test]
    fn run_skips_files_over_the_size_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.rs"), "x".repeat(100)).unwrap();
        let store = Store::open_in_memory().unwrap();
        let pipeline = IngestionPipeline::new(&store, "p1", dir.path()).with_max_file_bytes(10);

        let report = pipeline.run();
        assert_eq!(report.total_files, 1);
        assert_eq!(report.indexed, 0);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn run_sweeps_deleted_files() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("a.rs");
        std::fs::write(&file_path, "fn a() {}").unwrap();
        let store = Store::open_in_memory().unwrap();
        let pipeline = IngestionPipeline::new(&store, "p1", dir.path());
        pipeline.run();

        std::fs::remove_file(&file_path).unwrap();
        pipeline.run();

        let graph = Graph::new(&store);
        let remaining = graph
            .literal_search_by_name("p1", "a")
            .unwrap();
        assert!(remaining.is_empty());
    }
}
