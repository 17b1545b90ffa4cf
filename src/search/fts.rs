//! L1: full-text search via the store's FTS5 virtual table, BM25-ranked.
//! Token extraction and the three-strategy query construction follow
//! spec.md §4.6 exactly — this tier's behavior is pinned by the scenario
//! tests in spec.md §8.

use super::{SearchResult, SearchTier, TIER_LIMIT};
use crate::graph::Graph;

const MAX_TOKENS: usize = 10;
const RESERVED_WORDS: &[&str] = &["and", "or", "not", "near"];

fn is_cjk(c: char) -> bool {
    let cp = c as u32;
    (0x3040..=0x309F).contains(&cp) // Hiragana
        || (0x30A0..=0x30FF).contains(&cp) // Katakana
        || (0x4E00..=0x9FFF).contains(&cp) // CJK Unified
        || (0x3400..=0x4DBF).contains(&cp) // Extension A
        || (0xF900..=0xFAFF).contains(&cp) // Compatibility
        || (0xAC00..=0xD7A3).contains(&cp) // Hangul Syllables
}

/// Maximal runs of letters/digits/underscore become tokens; each CJK
/// character is its own token; reserved words are discarded; at most 10
/// tokens survive, in order.
pub fn extract_tokens(query: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut buf = String::new();

    let mut flush = |buf: &mut String, tokens: &mut Vec<String>| {
        if !buf.is_empty() {
            tokens.push(std::mem::take(buf));
        }
    };

    for ch in query.chars() {
        if is_cjk(ch) {
            flush(&mut buf, &mut tokens);
            tokens.push(ch.to_string());
        } else if ch.is_alphanumeric() || ch == '_' {
            buf.push(ch);
        } else {
            flush(&mut buf, &mut tokens);
        }
    }
    flush(&mut buf, &mut tokens);

    tokens
        .into_iter()
        .filter(|t| !RESERVED_WORDS.contains(&t.to_lowercase().as_str()))
        .take(MAX_TOKENS)
        .collect()
}

fn escape_quotes(token: &str) -> String {
    token.replace('"', "\"\"")
}

fn phrase_query(tokens: &[String]) -> String {
    format!("\"{}\"", tokens.iter().map(|t| escape_quotes(t)).collect::<Vec<_>>().join(" "))
}

fn prefix_and_query(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|t| format!("\"{}\"*", escape_quotes(t)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn or_query(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|t| format!("\"{}\"", escape_quotes(t)))
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn normalize_rank(rank: f64) -> f64 {
    if rank.abs() < 0.001 {
        return 0.5;
    }
    (1.0 - 1.0 / (1.0 + rank.abs())).clamp(0.0, 1.0)
}

pub fn search(graph: &Graph<'_>, project_id: &str, query: &str) -> Vec<SearchResult> {
    let tokens = extract_tokens(query);
    if tokens.is_empty() {
        return Vec::new();
    }

    let strategies = [phrase_query(&tokens), prefix_and_query(&tokens), or_query(&tokens)];

    let mut last_hits: Vec<(crate::graph::Node, f64)> = Vec::new();
    for expr in &strategies {
        let hits = graph.fts_search(project_id, expr, TIER_LIMIT).unwrap_or_default();
        if hits.len() >= 3 {
            return to_results(hits);
        }
        last_hits = hits;
    }
    to_results(last_hits)
}

fn to_results(hits: Vec<(crate::graph::Node, f64)>) -> Vec<SearchResult> {
    hits.into_iter()
        .map(|(node, rank)| SearchResult {
            node,
            score: normalize_rank(rank),
            tier: SearchTier::Fts,
            matched_content: None,
        })
        .collect()
}
