//! Fuses the three search tiers with a tier-bonus rank merge, enforces the
//! short-circuit policy, and owns the two process-local caches (search
//! results, fetched line ranges) — the only mutable state in the crate per
//! spec.md §9; everything else lives in the store.

use crate::graph::Graph;
use crate::search::{fts, literal, vector, SearchResult, SearchTier};
use crate::store::Store;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const RESULT_CACHE_TTL: Duration = Duration::from_secs(60);
const RESULT_CACHE_MAX_ENTRIES: usize = 256;
const FETCH_CACHE_CAPACITY: usize = 50;

struct CacheEntry {
    inserted_at: Instant,
    results: Vec<SearchResult>,
}

#[derive(Default)]
struct FetchCacheState {
    entries: HashMap<(String, i64, i64), String>,
    order: std::collections::VecDeque<(String, i64, i64)>,
}

impl FetchCacheState {
    fn get(&self, key: &(String, i64, i64)) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: (String, i64, i64), value: String) {
        if self.entries.contains_key(&key) {
            return;
        }
        if self.order.len() >= FETCH_CACHE_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
    }
}

pub struct FetchResult {
    pub node_id: String,
    pub content: String,
}

pub struct SearchEngine<'a> {
    store: &'a Store,
    project_id: String,
    embed: Box<dyn Fn(&str) -> Vec<f64> + Send + Sync>,
    result_cache: Mutex<HashMap<String, CacheEntry>>,
    fetch_cache: Mutex<FetchCacheState>,
}

impl<'a> SearchEngine<'a> {
    pub fn new(
        store: &'a Store,
        project_id: impl Into<String>,
        embed: Box<dyn Fn(&str) -> Vec<f64> + Send + Sync>,
    ) -> Self {
        Self {
            store,
            project_id: project_id.into(),
            embed,
            result_cache: Mutex::new(HashMap::new()),
            fetch_cache: Mutex::new(FetchCacheState::default()),
        }
    }

    fn cache_key(query: &str, top_k: usize) -> String {
        format!("{}:{top_k}", query.trim().to_lowercase())
    }

    /// Runs (a subset of) L0/L1/L2, fuses, and returns the top `top_k`
    /// results. Repeated identical queries within the TTL return an
    /// identical result set without rerunning any tier.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<SearchResult> {
        let key = Self::cache_key(query, top_k);

        {
            let cache = self.result_cache.lock().unwrap();
            if let Some(entry) = cache.get(&key) {
                if entry.inserted_at.elapsed() < RESULT_CACHE_TTL {
                    return entry.results.clone();
                }
            }
        }

        let graph = Graph::new(self.store);
        let l0 = literal::search(&graph, &self.project_id, query);

        let policy = short_circuit_policy(&l0, top_k);
        let l1 = if policy.run_l1 {
            fts::search(&graph, &self.project_id, query)
        } else {
            Vec::new()
        };
        let l2 = if policy.run_l2 {
            let nodes = graph.all_nodes(&self.project_id).unwrap_or_default();
            vector::search(&nodes, query, self.embed.as_ref())
        } else {
            Vec::new()
        };

        let fused = fuse(l0, l1, l2, top_k);

        let mut cache = self.result_cache.lock().unwrap();
        evict_if_needed(&mut cache);
        cache.insert(
            key,
            CacheEntry {
                inserted_at: Instant::now(),
                results: fused.clone(),
            },
        );
        fused
    }

    /// Loads the node, reads the underlying file, and slices lines
    /// `[startLine, endLine]` (1-based, inclusive). Out-of-range bounds are
    /// clamped; a missing file yields a placeholder rather than an error.
    pub fn fetch(&self, node_id: &str) -> Option<FetchResult> {
        let graph = Graph::new(self.store);
        let node = graph.get_node(&self.project_id, node_id).ok().flatten()?;
        let Some(file_path) = node.file_path.clone() else {
            return Some(FetchResult {
                node_id: node.id,
                content: String::new(),
            });
        };
        let start = node.start_line.unwrap_or(1).max(1);
        let end = node.end_line.unwrap_or(start).max(start);
        let cache_key = (file_path.clone(), start, end);

        if let Some(cached) = self.fetch_cache.lock().unwrap().get(&cache_key) {
            return Some(FetchResult {
                node_id: node.id,
                content: cached,
            });
        }

        let content = match std::fs::read_to_string(&file_path) {
            Ok(text) => {
                let lines: Vec<&str> = text.lines().collect();
                let start_idx = (start as usize).saturating_sub(1).min(lines.len());
                let end_idx = (end as usize).min(lines.len());
                if start_idx >= end_idx {
                    String::new()
                } else {
                    lines[start_idx..end_idx].join("\n")
                }
            }
            Err(_) => format!("[File not found: {file_path}]"),
        };

        self.fetch_cache.lock().unwrap().insert(cache_key, content.clone());
        Some(FetchResult {
            node_id: node.id,
            content,
        })
    }

    /// Invalidates both caches. Must be called whenever the ingestion
    /// pipeline completes a run (spec.md §9).
    pub fn invalidate(&self) {
        self.result_cache.lock().unwrap().clear();
        self.fetch_cache.lock().unwrap().clear_all();
    }
}

impl FetchCacheState {
    fn clear_all(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

fn evict_if_needed(cache: &mut HashMap<String, CacheEntry>) {
    if cache.len() < RESULT_CACHE_MAX_ENTRIES {
        return;
    }
    let expired_keys: Vec<String> = cache
        .iter()
        .filter(|(_, v)| v.inserted_at.elapsed() >= RESULT_CACHE_TTL)
        .map(|(k, _)| k.clone())
        .collect();
    if !expired_keys.is_empty() {
        for k in expired_keys {
            cache.remove(&k);
        }
        return;
    }
    if let Some(oldest_key) = cache
        .iter()
        .min_by_key(|(_, v)| v.inserted_at)
        .map(|(k, _)| k.clone())
    {
        cache.remove(&oldest_key);
    }
}

struct ShortCircuitPolicy {
    run_l1: bool,
    run_l2: bool,
}

/// After L0, if at least `top_k` results are present, inspect the minimum
/// raw score among the top `top_k` and decide which later tiers run.
fn short_circuit_policy(l0: &[SearchResult], top_k: usize) -> ShortCircuitPolicy {
    if l0.len() < top_k {
        return ShortCircuitPolicy {
            run_l1: true,
            run_l2: true,
        };
    }
    let mut sorted: Vec<f64> = l0.iter().map(|r| r.score).collect();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let min_of_top = sorted[top_k - 1];
    if min_of_top >= 0.9 {
        ShortCircuitPolicy {
            run_l1: false,
            run_l2: false,
        }
    } else if min_of_top >= 0.8 {
        ShortCircuitPolicy {
            run_l1: true,
            run_l2: false,
        }
    } else {
        ShortCircuitPolicy {
            run_l1: true,
            run_l2: true,
        }
    }
}

/// Boosted score = raw + tier bonus. Within a node id, the highest boosted
/// score wins (keeping that result's original tier/score). Survivors sort
/// by raw score descending and truncate to `top_k`.
fn fuse(
    l0: Vec<SearchResult>,
    l1: Vec<SearchResult>,
    l2: Vec<SearchResult>,
    top_k: usize,
) -> Vec<SearchResult> {
    let mut best: HashMap<String, (f64, SearchResult)> = HashMap::new();
    for result in l0.into_iter().chain(l1).chain(l2) {
        let boosted = result.score + result.tier.bonus();
        let id = result.node.id.clone();
        match best.get(&id) {
            Some((existing_boosted, _)) if *existing_boosted >= boosted => {}
            _ => {
                best.insert(id, (boosted, result));
            }
        }
    }
    let mut survivors: Vec<SearchResult> = best.into_values().map(|(_, r)| r).collect();
    survivors.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    survivors.truncate(top_k);
    survivors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Node, NodeType};
    use crate::search::vector::embed_hash;

    fn seed_node(store: &Store, id: &str, name: &str) {
        let graph = Graph::new(store);
        graph
            .add_node(&Node {
                id: id.to_string(),
                project_id: "p1".to_string(),
                name: name.to_string(),
                node_type: NodeType::Function,
                file_path: None,
                start_line: None,
                end_line: None,
                summary: Some(format!("{name} summary")),
                content_hash: None,
                updated_at: String::new(),
            })
            .unwrap();
    }

    #[test]
    fn repeated_query_within_ttl_returns_equal_response() {
        let store = Store::open_in_memory().unwrap();
        seed_node(&store, "n1", "fetch_alerts");
        let engine = SearchEngine::new(&store, "p1", Box::new(embed_hash));

        let first = engine.search("fetch_alerts", 10);
        let second = engine.search("fetch_alerts", 10);
        assert_eq!(first, second);
    }

    #[test]
    fn invalidate_clears_cached_search_results() {
        let store = Store::open_in_memory().unwrap();
        seed_node(&store, "n1", "fetch_alerts");
        let engine = SearchEngine::new(&store, "p1", Box::new(embed_hash));
        engine.search("fetch_alerts", 10);
        engine.invalidate();
        // No panic / still functions after invalidation.
        let results = engine.search("fetch_alerts", 10);
        assert!(!results.is_empty());
    }

    #[test]
    fn fetch_missing_file_yields_placeholder() {
        let store = Store::open_in_memory().unwrap();
        let graph = Graph::new(&store);
        graph
            .add_node(&Node {
                id: "n1".to_string(),
                project_id: "p1".to_string(),
                name: "ghost".to_string(),
                node_type: NodeType::Function,
                file_path: Some("/no/such/file.rs".to_string()),
                start_line: Some(1),
                end_line: Some(2),
                summary: None,
                content_hash: None,
                updated_at: String::new(),
            })
            .unwrap();
        let engine = SearchEngine::new(&store, "p1", Box::new(embed_hash));
        let result = engine.fetch("n1").unwrap();
        assert!(result.content.contains("File not found"));
    }

    #[test]
    fn short_circuit_skips_all_when_l0_confident() {
        let mut results = Vec::new();
        for i in 0..5 {
            results.push(SearchResult {
                node: crate::graph::Node {
                    id: format!("n{i}"),
                    project_id: "p1".to_string(),
                    name: "x".to_string(),
                    node_type: NodeType::Function,
                    file_path: None,
                    start_line: None,
                    end_line: None,
                    summary: None,
                    content_hash: None,
                    updated_at: String::new(),
                },
                score: 0.95,
                tier: SearchTier::Literal,
                matched_content: None,
            });
        }
        let policy = short_circuit_policy(&results, 5);
        assert!(!policy.run_l1);
        assert!(!policy.run_l2);
    }
}
