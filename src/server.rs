//! The stdio tool-protocol loop: newline-delimited JSON requests in,
//! newline-delimited JSON responses out. This is a thin external-collaborator
//! surface per spec.md §1 — full JSON-RPC 2.0 envelope compliance is out of
//! scope, but malformed input still produces a well-formed error object
//! rather than crashing the loop, mirroring the teacher's
//! `run_stdio_server` read-dispatch-write shape.

use crate::config::Config;
use crate::embedding;
use crate::engine::SearchEngine;
use crate::ingest::IngestionPipeline;
use crate::pointer::{self, Accountant, AggregationWindow};
use crate::store::Store;
use crate::temporal::TemporalStore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ToolRequest {
    tool: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize)]
struct ToolResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn ok(result: Value) -> ToolResponse {
    ToolResponse {
        result: Some(result),
        error: None,
    }
}

fn err(message: impl Into<String>) -> ToolResponse {
    ToolResponse {
        result: None,
        error: Some(message.into()),
    }
}

pub struct ServerContext {
    pub project_id: String,
    pub project_root: PathBuf,
    pub db_path: PathBuf,
    pub session_id: String,
    pub config: Config,
}

/// Spawns the background auto-reindex worker described in SPEC_FULL.md §5.6:
/// it opens its own store connection (WAL makes this safe alongside the
/// main loop's connection) and raises `dirty` after each completed run so
/// the main loop knows to invalidate its caches.
fn spawn_auto_reindex(ctx: &ServerContext, dirty: Arc<AtomicBool>) {
    let interval = ctx.config.auto_reindex_interval_secs;
    if interval == 0 {
        return;
    }
    let db_path = ctx.db_path.clone();
    let project_root = ctx.project_root.clone();
    let project_id = ctx.project_id.clone();
    let max_file_bytes = ctx.config.max_file_bytes;
    std::thread::spawn(move || loop {
        std::thread::sleep(Duration::from_secs(interval));
        match Store::open(&db_path) {
            Ok(store) => {
                let pipeline = IngestionPipeline::new(&store, &project_id, &project_root)
                    .with_max_file_bytes(max_file_bytes);
                pipeline.run();
                dirty.store(true, Ordering::SeqCst);
            }
            Err(e) => {
                tracing::warn!(error = %e, "auto-reindex worker failed to open store");
            }
        }
    });
}

pub fn run_stdio_server(ctx: ServerContext) -> anyhow::Result<()> {
    let store = Store::open(&ctx.db_path)?;
    let embed = embedding::embedder(&ctx.config.embedding);
    let engine = SearchEngine::new(&store, ctx.project_id.clone(), embed);
    let dirty = Arc::new(AtomicBool::new(false));
    spawn_auto_reindex(&ctx, dirty.clone());

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if dirty.swap(false, Ordering::SeqCst) {
            engine.invalidate();
        }

        let response = match serde_json::from_str::<ToolRequest>(&line) {
            Ok(request) => dispatch(&ctx, &store, &engine, request),
            Err(e) => err(format!("malformed request: {e}")),
        };

        writeln!(out, "{}", serde_json::to_string(&response)?)?;
        out.flush()?;
    }
    Ok(())
}

fn dispatch(
    ctx: &ServerContext,
    store: &Store,
    engine: &SearchEngine<'_>,
    request: ToolRequest,
) -> ToolResponse {
    match request.tool.as_str() {
        "index" => tool_index(ctx, store, engine),
        "search" => tool_search(ctx, store, engine, &request.args),
        "fetch" => tool_fetch(ctx, store, engine, &request.args),
        "fact" => tool_fact(ctx, store, &request.args),
        "facts" => tool_facts(ctx, store, &request.args),
        "stats" => tool_stats(ctx, store, &request.args),
        other => err(format!("unknown tool: {other}")),
    }
}

fn tool_index(ctx: &ServerContext, store: &Store, engine: &SearchEngine<'_>) -> ToolResponse {
    let pipeline = IngestionPipeline::new(store, &ctx.project_id, &ctx.project_root)
        .with_max_file_bytes(ctx.config.max_file_bytes);
    let report = pipeline.run();
    engine.invalidate();
    ok(json!(report))
}

fn tool_search(
    ctx: &ServerContext,
    store: &Store,
    engine: &SearchEngine<'_>,
    args: &Value,
) -> ToolResponse {
    let Some(query) = args.get("query").and_then(Value::as_str) else {
        return err("missing required argument: query");
    };
    let top_k = args.get("topK").and_then(Value::as_u64).unwrap_or(10) as usize;

    let results = engine.search(query, top_k);
    let pointers = pointer::build_pointers(&results);
    let accounting = pointer::accounting_for_pointers(&pointers, 0);

    let accountant = Accountant::new(store);
    if let Err(e) = accountant.record_query(&ctx.project_id, &ctx.session_id, query, &accounting) {
        tracing::warn!(error = %e, "failed to record accounting journal entry");
    }

    ok(json!({ "pointers": pointers, "accounting": accounting }))
}

fn tool_fetch(
    ctx: &ServerContext,
    store: &Store,
    engine: &SearchEngine<'_>,
    args: &Value,
) -> ToolResponse {
    let Some(node_id) = args.get("nodeId").and_then(Value::as_str) else {
        return err("missing required argument: nodeId");
    };

    match engine.fetch(node_id) {
        Some(result) => {
            let fetched_tokens = pointer::estimate_tokens(&result.content);
            let traditional_estimate = fetched_tokens * 15;
            let accountant = Accountant::new(store);
            let accounting = pointer::Accounting::from_sums(0, fetched_tokens, traditional_estimate);
            if let Err(e) = accountant.record_query(&ctx.project_id, &ctx.session_id, node_id, &accounting) {
                tracing::warn!(error = %e, "failed to record fetch accounting entry");
            }
            ok(json!({
                "nodeId": result.node_id,
                "content": result.content,
                "tokenEstimate": fetched_tokens,
            }))
        }
        None => err(format!("node not found: {node_id}")),
    }
}

fn tool_fact(ctx: &ServerContext, store: &Store, args: &Value) -> ToolResponse {
    let Some(fact_type) = args.get("type").and_then(Value::as_str) else {
        return err("missing required argument: type");
    };
    let Some(content) = args.get("content").and_then(Value::as_str) else {
        return err("missing required argument: content");
    };
    let node_id = args.get("nodeId").and_then(Value::as_str);
    let source_reference = args.get("sourceReference").and_then(Value::as_str);

    let facts = TemporalStore::new(store);
    match facts.add_fact(&ctx.project_id, fact_type, content, node_id, source_reference) {
        Ok(id) => ok(json!({ "id": id, "status": "recorded" })),
        Err(e) => err(format!("failed to record fact: {e}")),
    }
}

fn tool_facts(ctx: &ServerContext, store: &Store, args: &Value) -> ToolResponse {
    let fact_type = args.get("type").and_then(Value::as_str);
    let facts = TemporalStore::new(store);
    match facts.get_active_facts(&ctx.project_id, fact_type) {
        Ok(rows) => ok(json!(rows)),
        Err(e) => err(format!("failed to list facts: {e}")),
    }
}

fn tool_stats(ctx: &ServerContext, store: &Store, args: &Value) -> ToolResponse {
    let since = args.get("since").and_then(Value::as_str).unwrap_or("all");
    let window = if since.eq_ignore_ascii_case("session") {
        AggregationWindow::Session(ctx.session_id.clone())
    } else {
        pointer::parse_since(since)
    };
    let accountant = Accountant::new(store);
    match accountant.aggregate(&ctx.project_id, &window) {
        Ok((queries, accounting)) => ok(json!({ "queries": queries, "accounting": accounting })),
        Err(e) => err(format!("failed to aggregate stats: {e}")),
    }
}
