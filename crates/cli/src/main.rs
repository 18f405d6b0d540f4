//! bspotlight CLI — command-line front end for the local search engine.
//!
//! Talks to `bspotlight-core` directly as a library; there is no server to
//! start first.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use bspotlight_core::config::{default_bsignore_path, default_data_dir, Config};
use bspotlight_core::engine::{Engine, FeedbackRequest, InteractionRequest};
use bspotlight_core::query_planner::QueryContext;
use bspotlight_core::types::{FeedbackAction, MatchType};

#[derive(Parser)]
#[command(name = "bspotlight", version, about = "Local content-aware search")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Override the data directory (defaults to the platform app-data dir).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the index.
    Search {
        query: String,
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Current working directory to use for proximity boosting.
        #[arg(long)]
        cwd: Option<String>,
        /// Frontmost application bundle id, for app-context boosting.
        #[arg(long)]
        app: Option<String>,
    },
    /// Indexer control.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
    /// Print index and service health.
    Health,
    /// Record a feedback action (open / pin / unpin) against a result.
    Feedback {
        item_id: i64,
        #[arg(value_enum)]
        action: FeedbackActionArg,
        #[arg(long, default_value = "")]
        query: String,
    },
    /// Record that a search result was selected, for feedback learning.
    RecordInteraction {
        query: String,
        item_id: i64,
        path: String,
        #[arg(value_enum)]
        match_type: MatchTypeArg,
        position: usize,
        #[arg(long)]
        app: Option<String>,
    },
    /// Print frequency/boost info for a single item.
    Frequency { item_id: i64 },
    /// Print the top directories by selection frequency.
    Preferences {
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Print the current file-type affinity profile.
    Affinity,
    /// Recompute frequency rows and prune old feedback/interaction history.
    Aggregate,
    /// Export the raw interaction log.
    Export,
}

#[derive(Subcommand)]
enum IndexAction {
    /// Start scanning and watching the given roots (defaults to the cwd).
    Start { roots: Vec<PathBuf> },
    /// Stop all indexing threads.
    Stop,
    Pause,
    Resume,
    /// Print queue depth and worker counts.
    Status,
    /// Re-index a single path immediately.
    Reindex { path: PathBuf },
    /// Clear the index and re-scan every watched root from scratch.
    Rebuild,
    /// Tell the engine whether the user is actively interacting (clamps
    /// prep workers to 1 while true).
    SetActive { active: bool },
}

#[derive(Clone, clap::ValueEnum)]
enum FeedbackActionArg {
    Open,
    Pin,
    Unpin,
}

impl From<FeedbackActionArg> for FeedbackAction {
    fn from(value: FeedbackActionArg) -> Self {
        match value {
            FeedbackActionArg::Open => FeedbackAction::Open,
            FeedbackActionArg::Pin => FeedbackAction::Pin,
            FeedbackActionArg::Unpin => FeedbackAction::Unpin,
        }
    }
}

#[derive(Clone, clap::ValueEnum)]
enum MatchTypeArg {
    ExactName,
    PrefixName,
    ContainsName,
    ExactPath,
    PrefixPath,
    Fuzzy,
    Content,
}

impl From<MatchTypeArg> for MatchType {
    fn from(value: MatchTypeArg) -> Self {
        match value {
            MatchTypeArg::ExactName => MatchType::ExactName,
            MatchTypeArg::PrefixName => MatchType::PrefixName,
            MatchTypeArg::ContainsName => MatchType::ContainsName,
            MatchTypeArg::ExactPath => MatchType::ExactPath,
            MatchTypeArg::PrefixPath => MatchType::PrefixPath,
            MatchTypeArg::Fuzzy => MatchType::Fuzzy,
            MatchTypeArg::Content => MatchType::Content,
        }
    }
}

fn resolve_data_dir(data_dir: Option<PathBuf>) -> PathBuf {
    data_dir.unwrap_or_else(|| default_data_dir().expect("could not determine platform data directory"))
}

fn build_engine(data_dir: &std::path::Path) -> Arc<Engine> {
    let config = Config::load_or_default(data_dir);
    let engine = Engine::new(config, data_dir.to_path_buf(), None).unwrap_or_else(|e| {
        eprintln!("failed to open index at {}: {e}", data_dir.display());
        std::process::exit(1);
    });
    Arc::new(engine)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("bspotlight=info".parse().unwrap()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir);
    let engine = build_engine(&data_dir);

    match cli.command {
        Commands::Search { query, limit, cwd, app } => run_search(&engine, &query, limit, cwd, app, cli.json),
        Commands::Index { action } => run_index_action(&engine, action, cli.json),
        Commands::Health => run_health(&engine, cli.json),
        Commands::Feedback { item_id, action, query } => run_feedback(&engine, item_id, action, query),
        Commands::RecordInteraction { query, item_id, path, match_type, position, app } => {
            run_record_interaction(&engine, query, item_id, path, match_type, position, app)
        }
        Commands::Frequency { item_id } => run_frequency(&engine, item_id, cli.json),
        Commands::Preferences { limit } => run_preferences(&engine, limit, cli.json),
        Commands::Affinity => run_affinity(&engine, cli.json),
        Commands::Aggregate => run_aggregate(&engine, cli.json),
        Commands::Export => run_export(&engine, cli.json),
    }
}

fn run_search(engine: &Engine, query: &str, limit: usize, cwd: Option<String>, app: Option<String>, json: bool) {
    let context = QueryContext { cwd_path: cwd, frontmost_app_bundle_id: app, recent_paths: Vec::new() };
    let started = std::time::Instant::now();
    let results = engine.search(query, limit, &context).unwrap_or_else(|e| {
        eprintln!("search failed: {e}");
        std::process::exit(1);
    });
    let query_time_ms = started.elapsed().as_millis() as u64;

    if json {
        let items: Vec<serde_json::Value> = results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "itemId": r.item_id,
                    "path": r.path,
                    "name": r.name,
                    "kind": r.kind.as_str(),
                    "matchType": match_type_str(r.match_type),
                    "score": r.score,
                    "snippet": r.snippet,
                    "isPinned": r.is_pinned,
                    "openCount": r.open_count,
                })
            })
            .collect();
        let envelope = serde_json::json!({
            "results": items,
            "queryTime": query_time_ms,
            "totalMatches": results.len(),
        });
        println!("{}", serde_json::to_string_pretty(&envelope).unwrap());
        return;
    }

    if results.is_empty() {
        eprintln!("No results for '{query}'");
        std::process::exit(1);
    }
    for r in &results {
        let pinned = if r.is_pinned { " *" } else { "" };
        println!("{:>7.1}  {}{}", r.score, r.path, pinned);
        if !r.snippet.is_empty() {
            println!("         {}", r.snippet);
        }
    }
    eprintln!("\n{} result(s)", results.len());
}

fn match_type_str(mt: MatchType) -> &'static str {
    match mt {
        MatchType::ExactName => "exact_name",
        MatchType::PrefixName => "prefix_name",
        MatchType::ContainsName => "contains_name",
        MatchType::ExactPath => "exact_path",
        MatchType::PrefixPath => "prefix_path",
        MatchType::Fuzzy => "fuzzy",
        MatchType::Content => "content",
    }
}

fn run_index_action(engine: &Engine, action: IndexAction, json: bool) {
    match action {
        IndexAction::Start { roots } => {
            let roots = if roots.is_empty() {
                vec![std::env::current_dir().expect("could not determine current directory")]
            } else {
                roots
            };
            let result = engine.start_indexing(roots);
            if json {
                println!(
                    "{}",
                    serde_json::json!({"success": result.success, "queuedPaths": result.queued_paths, "timestamp": result.timestamp})
                );
            } else {
                println!("Indexing started: {} root(s) queued", result.queued_paths);
            }
        }
        IndexAction::Stop => {
            engine.stop_indexing();
            println!("Indexing stopped");
        }
        IndexAction::Pause => {
            let result = engine.pause_indexing();
            println!("Paused ({} item(s) pending)", result.queued_paths);
        }
        IndexAction::Resume => {
            let result = engine.resume_indexing();
            println!("Resumed ({} item(s) pending)", result.queued_paths);
        }
        IndexAction::Status => {
            let status = engine.get_queue_status();
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "pending": status.pending,
                        "processing": status.processing,
                        "failed": status.failed,
                        "dropped": status.dropped,
                        "paused": status.paused,
                        "preparing": status.preparing,
                        "writing": status.writing,
                        "coalesced": status.coalesced,
                        "staleDropped": status.stale_dropped,
                        "prepWorkers": status.prep_workers,
                        "writerBatchDepth": status.writer_batch_depth,
                        "roots": status.roots,
                        "lastProgressReport": {"scanned": status.last_progress_report.scanned, "total": status.last_progress_report.total},
                        "bsignorePath": status.bsignore_path,
                        "bsignoreLoaded": status.bsignore_loaded,
                        "bsignorePatternCount": status.bsignore_pattern_count,
                        "bsignoreLastLoadedAtMs": status.bsignore_last_loaded_at_ms,
                    })
                );
            } else {
                println!("pending:    {}", status.pending);
                println!("processing: {}", status.processing);
                println!("failed:     {}", status.failed);
                println!("dropped:    {}", status.dropped);
                println!("paused:     {}", status.paused);
                println!("workers:    {}", status.prep_workers);
                println!("roots:      {}", status.roots.join(", "));
            }
        }
        IndexAction::Reindex { path } => {
            engine.reindex_path(path.clone()).unwrap_or_else(|e| {
                eprintln!("reindex failed: {e}");
                std::process::exit(1);
            });
            println!("Queued {}", path.display());
        }
        IndexAction::Rebuild => {
            let result = engine.rebuild_all().unwrap_or_else(|e| {
                eprintln!("rebuild failed: {e}");
                std::process::exit(1);
            });
            println!("Index cleared: {}, reindexing started: {}", result.cleared, result.reindexing_started);
        }
        IndexAction::SetActive { active } => {
            let result = engine.set_user_active(active);
            println!("user_active={} prep_workers={}", result.active, result.prep_workers);
        }
    }
}

fn run_health(engine: &Engine, json: bool) {
    let health = engine.get_health().unwrap_or_else(|e| {
        eprintln!("health check failed: {e}");
        std::process::exit(1);
    });

    if json {
        println!(
            "{}",
            serde_json::json!({
                "indexHealth": {
                    "isHealthy": health.index_health.is_healthy,
                    "totalIndexedItems": health.index_health.total_indexed_items,
                    "totalChunks": health.index_health.total_chunks,
                    "totalFailures": health.index_health.total_failures,
                    "lastIndexTime": health.index_health.last_index_time,
                    "ftsIndexSize": health.index_health.fts_index_size,
                    "itemsWithoutContent": health.index_health.items_without_content,
                },
                "serviceHealth": {
                    "pipelineRunning": health.service_health.pipeline_running,
                    "semanticAvailable": health.service_health.semantic_available,
                },
                "issues": health.issues,
            })
        );
        return;
    }

    println!("healthy:        {}", health.index_health.is_healthy);
    println!("indexed items:  {}", health.index_health.total_indexed_items);
    println!("chunks:         {}", health.index_health.total_chunks);
    println!("failures:       {}", health.index_health.total_failures);
    println!("pipeline running: {}", health.service_health.pipeline_running);
    println!("semantic search:  {}", health.service_health.semantic_available);
    for issue in &health.issues {
        println!("! {issue}");
    }
}

fn run_feedback(engine: &Engine, item_id: i64, action: FeedbackActionArg, query: String) {
    engine.record_feedback(FeedbackRequest { item_id, action: action.into(), query, position: 0 }).unwrap_or_else(|e| {
        eprintln!("record_feedback failed: {e}");
        std::process::exit(1);
    });
    println!("Recorded");
}

fn run_record_interaction(
    engine: &Engine,
    query: String,
    item_id: i64,
    path: String,
    match_type: MatchTypeArg,
    position: usize,
    app: Option<String>,
) {
    engine
        .record_interaction(InteractionRequest {
            query,
            selected_item_id: item_id,
            selected_path: path,
            match_type: match_type.into(),
            result_position: position,
            frontmost_app: app,
        })
        .unwrap_or_else(|e| {
            eprintln!("record_interaction failed: {e}");
            std::process::exit(1);
        });
    println!("Recorded");
}

fn run_frequency(engine: &Engine, item_id: i64, json: bool) {
    let freq = engine.get_frequency(item_id).unwrap_or_else(|e| {
        eprintln!("get_frequency failed: {e}");
        std::process::exit(1);
    });
    if json {
        println!(
            "{}",
            serde_json::json!({"openCount": freq.open_count, "lastOpenDate": freq.last_open_date, "frequencyTier": freq.frequency_tier, "boost": freq.boost})
        );
    } else {
        println!("open_count:     {}", freq.open_count);
        println!("frequency_tier: {}", freq.frequency_tier);
        println!("boost:          {:.2}", freq.boost);
    }
}

fn run_preferences(engine: &Engine, limit: usize, json: bool) {
    let dirs = engine.get_path_preferences(limit).unwrap_or_else(|e| {
        eprintln!("get_path_preferences failed: {e}");
        std::process::exit(1);
    });
    if json {
        let items: Vec<serde_json::Value> = dirs
            .iter()
            .map(|d| serde_json::json!({"directory": d.directory, "selectionCount": d.selection_count, "boost": d.boost}))
            .collect();
        println!("{}", serde_json::to_string_pretty(&items).unwrap());
    } else {
        for d in &dirs {
            println!("{:>5} {:>7.2}  {}", d.selection_count, d.boost, d.directory);
        }
    }
}

fn run_affinity(engine: &Engine, json: bool) {
    let stats = engine.get_file_type_affinity().unwrap_or_else(|e| {
        eprintln!("get_file_type_affinity failed: {e}");
        std::process::exit(1);
    });
    if json {
        println!(
            "{}",
            serde_json::json!({
                "codeOpens": stats.code_opens,
                "documentOpens": stats.document_opens,
                "mediaOpens": stats.media_opens,
                "otherOpens": stats.other_opens,
                "primaryAffinity": stats.primary_affinity.map(|c| format!("{c:?}").to_lowercase()),
            })
        );
    } else {
        println!("code:     {}", stats.code_opens);
        println!("document: {}", stats.document_opens);
        println!("media:    {}", stats.media_opens);
        println!("other:    {}", stats.other_opens);
        if let Some(primary) = stats.primary_affinity {
            println!("primary:  {primary:?}");
        }
    }
}

fn run_aggregate(engine: &Engine, json: bool) {
    let report = engine.run_aggregation().unwrap_or_else(|e| {
        eprintln!("run_aggregation failed: {e}");
        std::process::exit(1);
    });
    if json {
        println!(
            "{}",
            serde_json::json!({
                "aggregated": report.aggregated,
                "feedbackCleaned": report.feedback_cleaned,
                "interactionsCleaned": report.interactions_cleaned,
                "lastAggregation": report.last_aggregation,
            })
        );
    } else {
        println!("aggregated:           {}", report.aggregated);
        println!("feedback cleaned:     {}", report.feedback_cleaned);
        println!("interactions cleaned: {}", report.interactions_cleaned);
    }
}

fn run_export(engine: &Engine, json: bool) {
    let export = engine.export_interaction_data().unwrap_or_else(|e| {
        eprintln!("export_interaction_data failed: {e}");
        std::process::exit(1);
    });
    if json {
        let items: Vec<serde_json::Value> = export
            .interactions
            .iter()
            .map(|i| {
                serde_json::json!({
                    "query": i.normalized_query,
                    "itemId": i.item_id,
                    "path": i.path,
                    "matchType": match_type_str(i.match_type),
                    "resultPosition": i.result_position,
                    "timestamp": i.timestamp,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items).unwrap());
    } else {
        println!("{} interaction(s)", export.count);
        for i in export.interactions.iter().take(20) {
            println!("{:>5}  {}  {}", i.result_position, i.normalized_query, i.path);
        }
    }
}

// Unused in lexical-only builds; referenced to keep the bsignore path
// resolver reachable from the CLI surface without a dedicated subcommand.
#[allow(dead_code)]
fn bsignore_hint() -> Option<PathBuf> {
    default_bsignore_path().ok()
}
