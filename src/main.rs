use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hermes::config::load_config;
use hermes::embedding;
use hermes::engine::SearchEngine;
use hermes::ingest::IngestionPipeline;
use hermes::pointer::{self, Accountant, AggregationWindow};
use hermes::server::{run_stdio_server, ServerContext};
use hermes::store::Store;
use hermes::temporal::TemporalStore;
use std::path::PathBuf;

/// Hermes: a local knowledge-graph engine for AI coding assistants.
///
/// Each subcommand other than `serve` is a one-shot call into the library
/// that prints a JSON result to stdout — the CLI is a dispatcher, not the
/// tool protocol itself (that's the external JSON-RPC collaborator's job).
#[derive(Parser)]
#[command(name = "hermes", version, about)]
struct Cli {
    /// Project root to operate on. Defaults to the current directory.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Project identifier scoping all graph rows. Defaults to the
    /// canonicalized root path.
    #[arg(long, global = true)]
    project: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the ingestion pipeline and print the resulting report.
    Index,
    /// Run a search and print the pointer response.
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        top_k: usize,
    },
    /// Fetch full content for a node id.
    Fetch { node_id: String },
    /// Record a temporal fact.
    Fact { fact_type: String, content: String },
    /// List active temporal facts, optionally filtered by type.
    Facts { fact_type: Option<String> },
    /// Print session and cumulative accounting stats.
    Stats {
        #[arg(long)]
        since: Option<String>,
    },
    /// Start the stdio JSON-RPC tool-protocol loop.
    Serve,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let root = cli
        .root
        .unwrap_or(std::env::current_dir().context("resolving current directory")?);
    let root = root.canonicalize().unwrap_or(root);
    let project_id = cli.project.unwrap_or_else(|| root.to_string_lossy().to_string());

    let config = load_config(&root);
    let db_path = config.db_path_for(&root);

    match cli.command {
        Command::Serve => {
            let ctx = ServerContext {
                project_id,
                project_root: root,
                db_path,
                session_id: new_session_id(),
                config,
            };
            run_stdio_server(ctx)?;
        }
        Command::Index => {
            let store = Store::open(&db_path).context("opening store")?;
            let pipeline = IngestionPipeline::new(&store, &project_id, &root)
                .with_max_file_bytes(config.max_file_bytes);
            let report = pipeline.run();
            print_json(&report)?;
        }
        Command::Search { query, top_k } => {
            let store = Store::open(&db_path).context("opening store")?;
            let embed = embedding::embedder(&config.embedding);
            let engine = SearchEngine::new(&store, project_id.clone(), embed);
            let results = engine.search(&query, top_k);
            let pointers = pointer::build_pointers(&results);
            let accounting = pointer::accounting_for_pointers(&pointers, 0);

            let accountant = Accountant::new(&store);
            accountant.record_query(&project_id, &new_session_id(), &query, &accounting)?;

            print_json(&serde_json::json!({ "pointers": pointers, "accounting": accounting }))?;
        }
        Command::Fetch { node_id } => {
            let store = Store::open(&db_path).context("opening store")?;
            let embed = embedding::embedder(&config.embedding);
            let engine = SearchEngine::new(&store, project_id.clone(), embed);
            match engine.fetch(&node_id) {
                Some(result) => {
                    let fetched_tokens = pointer::estimate_tokens(&result.content);
                    let traditional_estimate = fetched_tokens * 15;
                    let accountant = Accountant::new(&store);
                    let accounting = pointer::Accounting::from_sums(0, fetched_tokens, traditional_estimate);
                    accountant.record_query(&project_id, &new_session_id(), &node_id, &accounting)?;
                    print_json(&serde_json::json!({
                        "nodeId": result.node_id,
                        "content": result.content,
                        "tokenEstimate": fetched_tokens,
                    }))?;
                }
                None => {
                    eprintln!("node not found: {node_id}");
                    std::process::exit(1);
                }
            }
        }
        Command::Fact { fact_type, content } => {
            let store = Store::open(&db_path).context("opening store")?;
            let facts = TemporalStore::new(&store);
            let id = facts.add_fact(&project_id, &fact_type, &content, None, None)?;
            print_json(&serde_json::json!({ "id": id, "status": "recorded" }))?;
        }
        Command::Facts { fact_type } => {
            let store = Store::open(&db_path).context("opening store")?;
            let facts = TemporalStore::new(&store);
            let rows = facts.get_active_facts(&project_id, fact_type.as_deref())?;
            print_json(&rows)?;
        }
        Command::Stats { since } => {
            let store = Store::open(&db_path).context("opening store")?;
            let window = since
                .as_deref()
                .map(pointer::parse_since)
                .unwrap_or(AggregationWindow::All);
            let accountant = Accountant::new(&store);
            let (queries, accounting) = accountant.aggregate(&project_id, &window)?;
            print_json(&serde_json::json!({ "queries": queries, "accounting": accounting }))?;
        }
    }

    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn new_session_id() -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);
    format!("session-{nanos:x}")
}
