//! Pure `(path, text) -> Vec<Chunk>` dispatch by file extension. No I/O, no
//! failure mode: unsupported or pathological input degrades to a whole-file
//! chunk rather than an error, per spec.md §4.3 / §7.
//!
//! Brace-balance termination is string/comment-unaware by design (spec.md
//! §9 documents this as an accepted open question, not a bug).

use crate::graph::NodeType;

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub name: String,
    pub node_type: NodeType,
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
    pub summary: String,
}

fn summarize(text: &str, node_type: NodeType, name: &str) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    if first_line.chars().count() <= 80 {
        first_line.to_string()
    } else {
        format!("{node_type}: {name}")
    }
}

/// Lines are 1-based throughout this module, matching the store's schema.
pub fn chunk_file(path: &str, text: &str) -> Vec<Chunk> {
    if text.is_empty() {
        return Vec::new();
    }
    let ext = path.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "rs" => chunk_rust(text),
        "kt" | "kts" | "java" => chunk_jvm(text),
        "md" => chunk_markdown(text),
        "ts" | "tsx" | "js" | "jsx" => chunk_ts_js(text),
        _ => vec![whole_file_chunk(path, text)],
    }
}

fn whole_file_chunk(path: &str, text: &str) -> Chunk {
    let line_count = text.lines().count().max(1);
    let name = path.rsplit('/').next().unwrap_or(path).to_string();
    Chunk {
        summary: summarize(text, NodeType::File, &name),
        name,
        node_type: NodeType::File,
        start_line: 1,
        end_line: line_count,
        text: text.to_string(),
    }
}

const RUST_PREFIXES: &[(&str, NodeType)] = &[
    ("pub async fn ", NodeType::Function),
    ("async fn ", NodeType::Function),
    ("pub fn ", NodeType::Function),
    ("fn ", NodeType::Function),
    ("pub struct ", NodeType::Struct),
    ("struct ", NodeType::Struct),
    ("pub enum ", NodeType::Enum),
    ("enum ", NodeType::Enum),
    ("pub trait ", NodeType::Trait),
    ("trait ", NodeType::Trait),
    ("impl ", NodeType::Impl),
];

fn rust_chunk_name(trimmed: &str, prefix: &str, node_type: NodeType) -> String {
    let rest = &trimmed[prefix.len()..];
    if node_type == NodeType::Impl {
        if let Some(for_idx) = rest.find(" for ") {
            return strip_generics(rest[for_idx + 5..].trim());
        }
        return strip_generics(rest.trim());
    }
    let ident: String = rest
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    ident
}

fn strip_generics(s: &str) -> String {
    let end = s
        .find(['<', '(', '{', ' '])
        .unwrap_or(s.len());
    s[..end].to_string()
}

fn chunk_rust(text: &str) -> Vec<Chunk> {
    chunk_brace_balanced(text, RUST_PREFIXES, rust_chunk_name)
}

const JVM_CLASS_PREFIXES: &[&str] = &["class ", "abstract class ", "public class ", "final class "];

fn chunk_jvm(text: &str) -> Vec<Chunk> {
    let lines: Vec<&str> = text.lines().collect();
    let mut chunks = Vec::new();
    let mut i = 0usize;
    while i < lines.len() {
        let trimmed = lines[i].trim_start();
        let (node_type, name) = if let Some(rest) = trimmed.strip_prefix("fun ") {
            if trimmed.contains('(') {
                (NodeType::Function, take_ident(rest))
            } else {
                (NodeType::Concept, String::new())
            }
        } else if let Some(rest) = JVM_CLASS_PREFIXES
            .iter()
            .find_map(|p| trimmed.strip_prefix(p))
        {
            (NodeType::Struct, take_ident(rest))
        } else if let Some(rest) = trimmed.strip_prefix("interface ") {
            (NodeType::Trait, take_ident(rest))
        } else if trimmed.contains("enum class") {
            let rest = trimmed.split("enum class").nth(1).unwrap_or("").trim_start();
            (NodeType::Enum, take_ident(rest))
        } else if let Some(rest) = trimmed.strip_prefix("object ") {
            (NodeType::Module, take_ident(rest))
        } else {
            i += 1;
            continue;
        };
        if name.is_empty() {
            i += 1;
            continue;
        }
        let (end, block) = consume_brace_block(&lines, i);
        chunks.push(Chunk {
            summary: summarize(&block, node_type, &name),
            name,
            node_type,
            start_line: i + 1,
            end_line: end + 1,
            text: block,
        });
        i = end + 1;
    }
    chunks
}

fn take_ident(s: &str) -> String {
    s.chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

/// Shared Rust/JVM chunker: a chunk opens at a line matching one of
/// `prefixes` and closes at brace balance 0 after the first `{`; if no `{`
/// ever appears the chunk is bounded to exactly two lines (fallback).
fn chunk_brace_balanced(
    text: &str,
    prefixes: &[(&str, NodeType)],
    name_of: fn(&str, &str, NodeType) -> String,
) -> Vec<Chunk> {
    let lines: Vec<&str> = text.lines().collect();
    let mut chunks = Vec::new();
    let mut i = 0usize;
    while i < lines.len() {
        let trimmed = lines[i].trim_start();
        let Some((prefix, node_type)) = prefixes.iter().find(|(p, _)| trimmed.starts_with(p)) else {
            i += 1;
            continue;
        };
        let name = name_of(trimmed, prefix, *node_type);
        if name.is_empty() {
            i += 1;
            continue;
        }
        let (end, block) = consume_brace_block(&lines, i);
        chunks.push(Chunk {
            summary: summarize(&block, *node_type, &name),
            name,
            node_type: *node_type,
            start_line: i + 1,
            end_line: end + 1,
            text: block,
        });
        i = end + 1;
    }
    chunks
}

/// Starting at `start` (0-based), find the first `{` and consume lines until
/// brace balance returns to 0. If no `{` ever appears, the block is exactly
/// two lines (or one, if `start` is the last line).
fn consume_brace_block(lines: &[&str], start: usize) -> (usize, String) {
    let mut depth: i64 = 0;
    let mut seen_open = false;
    let mut end = start;
    for (offset, line) in lines.iter().enumerate().skip(start) {
        for ch in line.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    seen_open = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        end = offset;
        if seen_open && depth <= 0 {
            break;
        }
    }
    if !seen_open {
        end = (start + 1).min(lines.len().saturating_sub(1));
    }
    let block = lines[start..=end].join("\n");
    (end, block)
}

fn chunk_markdown(text: &str) -> Vec<Chunk> {
    let lines: Vec<&str> = text.lines().collect();
    let mut chunks = Vec::new();
    let mut current: Option<(String, usize)> = None;
    let mut section_lines: Vec<&str> = Vec::new();

    let flush = |current: &Option<(String, usize)>, section_lines: &[&str], end_line: usize, chunks: &mut Vec<Chunk>| {
        if let Some((name, start)) = current {
            let block = section_lines.join("\n");
            chunks.push(Chunk {
                summary: name.clone(),
                name: name.clone(),
                node_type: NodeType::Document,
                start_line: *start,
                end_line,
                text: block,
            });
        }
    };

    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("# ") || trimmed.starts_with("## ") {
            flush(&current, &section_lines, idx, &mut chunks);
            let heading = trimmed.trim_start_matches('#').trim().to_string();
            current = Some((heading, idx + 1));
            section_lines = vec![*line];
        } else if current.is_some() {
            section_lines.push(*line);
        }
    }
    flush(&current, &section_lines, lines.len(), &mut chunks);
    chunks
}

fn chunk_ts_js(text: &str) -> Vec<Chunk> {
    let lines: Vec<&str> = text.lines().collect();
    let mut chunks = Vec::new();
    let mut i = 0usize;
    while i < lines.len() {
        let trimmed = lines[i].trim_start();
        let rest_after_keyword = if let Some(r) = trimmed.strip_prefix("export default function ") {
            Some(r)
        } else if let Some(r) = trimmed.strip_prefix("export default class ") {
            Some(r)
        } else if let Some(r) = trimmed.strip_prefix("export function ") {
            Some(r)
        } else if let Some(r) = trimmed.strip_prefix("function ") {
            Some(r)
        } else if let Some(r) = trimmed.strip_prefix("export const ") {
            if rest_starts_arrow_or_call(r) {
                Some(r)
            } else {
                None
            }
        } else if let Some(r) = trimmed.strip_prefix("const ") {
            if rest_starts_arrow_or_call(r) {
                Some(r)
            } else {
                None
            }
        } else {
            None
        };

        let Some(rest) = rest_after_keyword else {
            i += 1;
            continue;
        };

        let ident = take_ident(rest);
        let name = if ident.is_empty() {
            format!("anonymous_{i}")
        } else {
            ident
        };

        let (end, block) = consume_brace_block(&lines, i);
        chunks.push(Chunk {
            summary: summarize(&block, NodeType::Function, &name),
            name,
            node_type: NodeType::Function,
            start_line: i + 1,
            end_line: end + 1,
            text: block,
        });
        i = end + 1;
    }
    chunks
}

fn rest_starts_arrow_or_call(rest: &str) -> bool {
    let ident_end = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    let after = rest[ident_end..].trim_start();
    after.starts_with('=') && (after.contains("=>") || after.starts_with("= ("))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_function_chunker() {
        let text = "pub fn hello(name: &str) -> String {\n    format!(\"Hello {name}\")\n}\n";
        let chunks = chunk_file("src/lib.rs", text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].name, "hello");
        assert_eq!(chunks[0].node_type, NodeType::Function);
        assert_eq!(chunks[0].start_line, 1);
    }

    #[test]
    fn markdown_sections() {
        let text = "# Title\nIntro\n## Section A\nContent A\n## Section B\nContent B\n";
        let chunks = chunk_file("README.md", text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].name, "Title");
        assert_eq!(chunks[1].name, "Section A");
        assert_eq!(chunks[2].name, "Section B");
        assert!(chunks.iter().all(|c| c.node_type == NodeType::Document));
    }

    #[test]
    fn rust_struct_and_impl_for() {
        let text = "pub struct Widget {\n    id: u32,\n}\n\nimpl Display for Widget {\n    fn fmt(&self) {}\n}\n";
        let chunks = chunk_file("src/widget.rs", text);
        // `impl Display for Widget` names the chunk after `for ` per spec.md
        // §4.3, so both chunks are named `Widget` — one struct, one impl.
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.name == "Widget"));
        assert!(chunks.iter().any(|c| c.node_type == NodeType::Struct));
        assert!(chunks.iter().any(|c| c.node_type == NodeType::Impl));
    }

    #[test]
    fn rust_fn_without_braces_falls_back_to_two_lines() {
        let text = "fn weird_decl_without_body\nsome_other_line\nanother_line\n";
        let chunks = chunk_file("src/odd.rs", text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 2);
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_file("src/empty.rs", "").is_empty());
    }

    #[test]
    fn unsupported_extension_is_whole_file() {
        let text = "hello\nworld\n";
        let chunks = chunk_file("data.csv", text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].node_type, NodeType::File);
    }

    #[test]
    fn ts_arrow_const_and_anonymous() {
        let text = "export const handler = (req) => {\n  return req;\n}\n";
        let chunks = chunk_file("src/handler.ts", text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].name, "handler");
    }
}
