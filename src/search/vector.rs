//! L2: semantic similarity. The offline default is a stable hashed
//! bag-of-words embedding; when an external provider is configured
//! (`crate::embedding`), its vector is used instead but the scoring code
//! here — cosine similarity, the 0.20 floor, the 20-result limit — does
//! not change (spec.md §4.6 note).

use super::{SearchResult, SearchTier, TIER_LIMIT};
use crate::graph::Node;

pub const DIMENSIONS: usize = 256;
const MIN_SCORE: f64 = 0.20;

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|t| t.to_lowercase())
        .filter(|t| t.chars().count() > 1)
        .collect()
}

/// Stable, non-negative hash of a token into `[0, 256)`. FNV-1a keeps this
/// deterministic across runs without depending on `std`'s randomized hasher.
fn hash_bin(token: &str) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in token.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % DIMENSIONS as u64) as usize
}

/// Offline hashed embedding: each token increments its bin, then the vector
/// is L2-normalized.
pub fn embed_hash(text: &str) -> Vec<f64> {
    let mut vector = vec![0.0f64; DIMENSIONS];
    for token in tokenize(text) {
        vector[hash_bin(&token)] += 1.0;
    }
    l2_normalize(&mut vector);
    vector
}

fn l2_normalize(vector: &mut [f64]) {
    let norm: f64 = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|v| v * v).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

fn node_text(node: &Node) -> String {
    format!(
        "{} {} {}",
        node.name,
        node.summary.as_deref().unwrap_or(""),
        node.file_path.as_deref().unwrap_or("")
    )
}

/// `embed` is injected so the engine can swap in a provider-supplied vector
/// without this module knowing about HTTP.
pub fn search(nodes: &[Node], query: &str, embed: &dyn Fn(&str) -> Vec<f64>) -> Vec<SearchResult> {
    let query_vec = embed(query);
    let mut results: Vec<SearchResult> = nodes
        .iter()
        .filter_map(|node| {
            let node_vec = embed(&node_text(node));
            let score = cosine_similarity(&query_vec, &node_vec);
            if score < MIN_SCORE {
                None
            } else {
                Some(SearchResult {
                    node: node.clone(),
                    score,
                    tier: SearchTier::Vector,
                    matched_content: None,
                })
            }
        })
        .collect();
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(TIER_LIMIT);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeType;

    fn node(name: &str, summary: &str) -> Node {
        Node {
            id: name.to_string(),
            project_id: "p1".to_string(),
            name: name.to_string(),
            node_type: NodeType::Function,
            file_path: None,
            start_line: None,
            end_line: None,
            summary: Some(summary.to_string()),
            content_hash: None,
            updated_at: String::new(),
        }
    }

    #[test]
    fn identical_text_scores_near_one() {
        let v1 = embed_hash("alert handler dispatch");
        let v2 = embed_hash("alert handler dispatch");
        assert!((cosine_similarity(&v1, &v2) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unrelated_text_scores_low() {
        let v1 = embed_hash("alert handler dispatch queue worker");
        let v2 = embed_hash("banana smoothie recipe blender");
        assert!(cosine_similarity(&v1, &v2) < 0.5);
    }

    #[test]
    fn search_drops_results_below_floor() {
        let nodes = vec![node("totally_unrelated", "nothing in common whatsoever")];
        let results = search(&nodes, "alert handler dispatch queue", &embed_hash);
        assert!(results.is_empty());
    }

    #[test]
    fn search_finds_and_ranks_matching_node() {
        let nodes = vec![
            node("alert_handler", "dispatches alerts to subscribers"),
            node("unrelated_thing", "completely different topic entirely"),
        ];
        let results = search(&nodes, "alert dispatch", &embed_hash);
        assert!(!results.is_empty());
        assert_eq!(results[0].node.name, "alert_handler");
    }
}
