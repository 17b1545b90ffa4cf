//! L0: literal name match. Candidates come from `Graph::literal_search_by_name`
//! (the two-phase prefix-then-contains rule); this module only computes the
//! score per spec.md §4.6.

use super::{SearchResult, SearchTier, TIER_LIMIT};
use crate::graph::Graph;

pub fn search(graph: &Graph<'_>, project_id: &str, query: &str) -> Vec<SearchResult> {
    let lowered = query.to_lowercase();
    let candidates = match graph.literal_search_by_name(project_id, query) {
        Ok(nodes) => nodes,
        Err(_) => return Vec::new(),
    };

    let mut results: Vec<SearchResult> = candidates
        .into_iter()
        .map(|node| {
            let score = score_name(&node.name, &lowered);
            SearchResult {
                node,
                score,
                tier: SearchTier::Literal,
                matched_content: None,
            }
        })
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(TIER_LIMIT);
    results
}

fn score_name(name: &str, lowered_query: &str) -> f64 {
    let lowered_name = name.to_lowercase();
    if lowered_name == lowered_query {
        return 1.0;
    }
    if lowered_name.starts_with(lowered_query) || lowered_name.ends_with(lowered_query) {
        return 0.9;
    }
    let ratio = lowered_query.chars().count() as f64 / lowered_name.chars().count().max(1) as f64;
    (0.5 + ratio * 0.4).clamp(0.5, 0.9)
}
